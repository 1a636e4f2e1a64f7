//! The `Database` port: the only boundary the Controller crosses to reach
//! persistent storage. On-disk format, SQL dialect and trace ingestion all
//! live on the other side of this trait.

use async_trait::async_trait;

use crate::graph::{RawEvent, RawSample};
use crate::table::arguments::Arguments;
use crate::track::TrackId;

/// Lifecycle status reported alongside every progress update.
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub enum ProgressStatus {
    Running,
    Success,
    Busy,
    Error,
}

/// One update delivered to a caller-supplied progress callback. Fired at
/// least once on terminal state.
#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
pub struct ProgressUpdate {
    pub path: String,
    pub percent: u8,
    pub status: ProgressStatus,
    pub message: String,
}

/// Callback signature for long-running `Database` operations; boxed so
/// callers (typically a [`crate::future::Promise`]) can stash a closure that
/// forwards into a `tokio::sync::watch` channel.
pub type ProgressCallback = Box<dyn Fn(ProgressUpdate) + Send + Sync>;

/// Which on-demand per-event property collection is being requested.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EventPropertyKind {
    FlowTrace,
    StackTrace,
    ExtData,
}

/// Per-track metadata returned by `read_metadata_async`.
#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
pub struct TrackMetadata {
    pub track_id: TrackId,
    pub kind: crate::track::TrackKind,
    pub min_ts: i64,
    pub max_ts: i64,
    pub num_entries: u64,
}

/// The full binding structure populated by a metadata load.
#[derive(Debug, Clone, Default, serde::Serialize, serde::Deserialize)]
pub struct TraceMetadata {
    pub min_ts: i64,
    pub max_ts: i64,
    pub tracks: Vec<TrackMetadata>,
}

/// One chunk of rows streamed back from `read_slice_async`, tagged by track
/// so the Controller can route it into the matching `Graph`.
pub enum SliceChunk {
    Samples { track_id: TrackId, rows: Vec<RawSample> },
    Events { track_id: TrackId, rows: Vec<RawEvent> },
}

/// A single row pulled from `read_event_property_async`, pre-parsed enough
/// for the Controller to build a typed `CallStack`/`FlowControl`/`ExtData`.
pub enum EventPropertyRow {
    CallStack {
        file: String,
        pc: u64,
        symbol: String,
        line_name: String,
        line_address: u64,
    },
    FlowControl {
        start_ts: i64,
        end_ts: i64,
        track_id: u64,
        level: u8,
        op_type: String,
        name_str_index: u64,
        category_str_index: u64,
    },
    ExtData {
        category_str_index: u64,
        name_str_index: u64,
        value: crate::cell::DataCell,
        category_enum: crate::ext_data::ExtDataCategory,
        position: Option<u32>,
        arg_type: Option<u64>,
    },
}

/// One row of an arbitrary query result, keyed by column name to keep the
/// port storage-agnostic.
pub type QueryRow = std::collections::HashMap<String, crate::cell::DataCell>;

/// Column metadata returned immediately on first fetch, ahead of any rows.
#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
pub struct ColumnInfo {
    pub name: String,
    pub primitive: ColumnPrimitive,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub enum ColumnPrimitive {
    U64,
    F64,
    Str,
}

/// A stable hash of a query's text, used as a table's identity.
pub type TableId = u64;

/// Pure interface to persistent trace storage. The Controller never assumes
/// a specific file format or SQL dialect; every implementation (including
/// the in-memory fixture under `tests/`) only has to honor this contract.
#[async_trait]
pub trait Database: Send + Sync {
    async fn open(&self, path: &str) -> crate::error::Result<()>;
    async fn close(&self) -> crate::error::Result<()>;

    async fn read_metadata_async(
        &self,
        connection: u64,
        progress: ProgressCallback,
    ) -> crate::error::Result<TraceMetadata>;

    async fn read_slice_async(
        &self,
        connection: u64,
        start_ts: i64,
        end_ts: i64,
        tracks: &[TrackId],
        progress: ProgressCallback,
    ) -> crate::error::Result<Vec<SliceChunk>>;

    async fn read_event_property_async(
        &self,
        connection: u64,
        kind: EventPropertyKind,
        event_id: u64,
        progress: ProgressCallback,
    ) -> crate::error::Result<Vec<EventPropertyRow>>;

    async fn execute_query_async(
        &self,
        connection: u64,
        sql: &str,
        description: &str,
        args: &Arguments,
        progress: ProgressCallback,
    ) -> crate::error::Result<(TableId, Vec<ColumnInfo>, Vec<QueryRow>)>;

    async fn execute_compute_query_async(
        &self,
        connection: u64,
        use_case: &str,
        sql: &str,
        progress: ProgressCallback,
    ) -> crate::error::Result<(TableId, Vec<ColumnInfo>, Vec<QueryRow>)>;

    async fn trim_save_async(
        &self,
        connection: u64,
        start_ts: i64,
        end_ts: i64,
        new_path: &str,
        progress: ProgressCallback,
    ) -> crate::error::Result<()>;

    async fn export_csv_async(
        &self,
        connection: u64,
        sql: &str,
        out_path: &str,
        progress: ProgressCallback,
    ) -> crate::error::Result<()>;

    /// Requested by a `Controller` worker once it observes its promise's
    /// interrupt flag set while a query issued under `connection` is still
    /// in flight; implementations race this against the query itself.
    fn interrupt_query(&self, connection: u64);
}
