//! A hand-rolled, in-memory `Database` implementation used only by the
//! integration tests in this directory. Stands in for a real trace file on
//! disk: every query is served straight out of fields set up by the test.

use std::collections::HashMap;
use std::sync::Mutex;

use async_trait::async_trait;
use trace_controller::db::{
    ColumnInfo, Database, EventPropertyKind, EventPropertyRow, ProgressCallback, ProgressStatus,
    ProgressUpdate, QueryRow, SliceChunk, TableId, TraceMetadata,
};
use trace_controller::error::Result;
use trace_controller::graph::{RawEvent, RawSample};
use trace_controller::table::arguments::Arguments;
use trace_controller::track::TrackId;

fn fire(progress: &ProgressCallback, path: &str, percent: u8, status: ProgressStatus) {
    progress(ProgressUpdate {
        path: path.to_owned(),
        percent,
        status,
        message: String::new(),
    });
}

pub struct FixtureDb {
    pub metadata: TraceMetadata,
    pub samples_by_track: HashMap<TrackId, Vec<RawSample>>,
    pub events_by_track: HashMap<TrackId, Vec<RawEvent>>,
    pub flow_rows_by_event: HashMap<u64, Vec<EventPropertyRow>>,
    /// What `trim_save_async` hands back as the reopened trace's metadata.
    pub trimmed_metadata: Mutex<Option<TraceMetadata>>,
    pub progress_log: Mutex<Vec<ProgressUpdate>>,
    /// When set, `read_slice_async` sleeps this long before answering, long
    /// enough for a test to cancel the in-flight fetch.
    pub read_slice_delay: Mutex<Option<std::time::Duration>>,
    /// Connections `interrupt_query` was asked to cancel.
    pub interrupted_connections: Mutex<Vec<u64>>,
}

impl FixtureDb {
    pub fn new(metadata: TraceMetadata) -> Self {
        Self {
            metadata,
            samples_by_track: HashMap::new(),
            events_by_track: HashMap::new(),
            flow_rows_by_event: HashMap::new(),
            trimmed_metadata: Mutex::new(None),
            progress_log: Mutex::new(Vec::new()),
            read_slice_delay: Mutex::new(None),
            interrupted_connections: Mutex::new(Vec::new()),
        }
    }
}

#[async_trait]
impl Database for FixtureDb {
    async fn open(&self, _path: &str) -> Result<()> {
        Ok(())
    }

    async fn close(&self) -> Result<()> {
        Ok(())
    }

    async fn read_metadata_async(&self, _connection: u64, progress: ProgressCallback) -> Result<TraceMetadata> {
        fire(&progress, "metadata", 0, ProgressStatus::Running);
        let metadata = self
            .trimmed_metadata
            .lock()
            .unwrap()
            .clone()
            .unwrap_or_else(|| self.metadata.clone());
        fire(&progress, "metadata", 100, ProgressStatus::Success);
        Ok(metadata)
    }

    async fn read_slice_async(
        &self,
        _connection: u64,
        start_ts: i64,
        end_ts: i64,
        tracks: &[TrackId],
        progress: ProgressCallback,
    ) -> Result<Vec<SliceChunk>> {
        fire(&progress, "slice", 0, ProgressStatus::Running);
        if let Some(delay) = *self.read_slice_delay.lock().unwrap() {
            tokio::time::sleep(delay).await;
        }
        let mut chunks = Vec::new();
        for &track_id in tracks {
            if let Some(rows) = self.samples_by_track.get(&track_id) {
                let rows: Vec<RawSample> = rows
                    .iter()
                    .filter(|r| r.timestamp >= start_ts && r.timestamp <= end_ts)
                    .copied()
                    .collect();
                chunks.push(SliceChunk::Samples { track_id, rows });
            }
            if let Some(rows) = self.events_by_track.get(&track_id) {
                let rows: Vec<RawEvent> = rows
                    .iter()
                    .filter(|r| r.start_ts >= start_ts && r.end_ts <= end_ts)
                    .cloned()
                    .collect();
                chunks.push(SliceChunk::Events { track_id, rows });
            }
        }
        fire(&progress, "slice", 100, ProgressStatus::Success);
        Ok(chunks)
    }

    async fn read_event_property_async(
        &self,
        _connection: u64,
        _kind: EventPropertyKind,
        event_id: u64,
        progress: ProgressCallback,
    ) -> Result<Vec<EventPropertyRow>> {
        fire(&progress, "event_property", 0, ProgressStatus::Running);
        let rows = self.flow_rows_by_event.get(&event_id).cloned().unwrap_or_default();
        fire(&progress, "event_property", 100, ProgressStatus::Success);
        Ok(rows)
    }

    async fn execute_query_async(
        &self,
        _connection: u64,
        sql: &str,
        _description: &str,
        _args: &Arguments,
        progress: ProgressCallback,
    ) -> Result<(TableId, Vec<ColumnInfo>, Vec<QueryRow>)> {
        fire(&progress, "query", 0, ProgressStatus::Running);
        let table_id = {
            use std::hash::{Hash, Hasher};
            let mut hasher = std::collections::hash_map::DefaultHasher::new();
            sql.hash(&mut hasher);
            hasher.finish()
        };
        fire(&progress, "query", 100, ProgressStatus::Success);
        Ok((table_id, Vec::new(), Vec::new()))
    }

    async fn execute_compute_query_async(
        &self,
        connection: u64,
        _use_case: &str,
        sql: &str,
        progress: ProgressCallback,
    ) -> Result<(TableId, Vec<ColumnInfo>, Vec<QueryRow>)> {
        self.execute_query_async(connection, sql, "compute", &Arguments::default(), progress)
            .await
    }

    async fn trim_save_async(
        &self,
        _connection: u64,
        _start_ts: i64,
        _end_ts: i64,
        new_path: &str,
        progress: ProgressCallback,
    ) -> Result<()> {
        fire(&progress, new_path, 0, ProgressStatus::Running);
        self.progress_log.lock().unwrap().push(ProgressUpdate {
            path: new_path.to_owned(),
            percent: 0,
            status: ProgressStatus::Running,
            message: String::new(),
        });
        fire(&progress, new_path, 100, ProgressStatus::Success);
        self.progress_log.lock().unwrap().push(ProgressUpdate {
            path: new_path.to_owned(),
            percent: 100,
            status: ProgressStatus::Success,
            message: String::new(),
        });
        Ok(())
    }

    async fn export_csv_async(
        &self,
        _connection: u64,
        _sql: &str,
        _out_path: &str,
        progress: ProgressCallback,
    ) -> Result<()> {
        fire(&progress, "export", 100, ProgressStatus::Success);
        Ok(())
    }

    fn interrupt_query(&self, connection: u64) {
        self.interrupted_connections.lock().unwrap().push(connection);
    }
}
