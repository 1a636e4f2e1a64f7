//! The top-level object: owns the Timeline, Topology, Tables, String Table
//! and event arena for one loaded trace, and drives every subsequent
//! asynchronous fetch.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};

use tracing::{info, instrument, warn};

use crate::arena::EventArena;
use crate::array::Array;
use crate::call_stack::CallStackEntry;
use crate::cell::DataCell;
use crate::compute::metrics::{ScalarMetric, ScalarMetricKind};
use crate::compute::plots::{Plot, Series};
use crate::compute::tables::{ComputeTable, ComputeTableKind};
use crate::config::ControllerConfig;
use crate::db::{
    Database, EventPropertyKind, EventPropertyRow, ProgressCallback, ProgressUpdate, SliceChunk,
    TraceMetadata,
};
use crate::error::{ControllerError, Result};
use crate::event::Event;
use crate::ext_data::{ArgumentData, ExtData};
use crate::flow_control::{FlowControl, FlowDirection};
use crate::future::{Future, Promise};
use crate::graph::{Graph, GraphId};
use crate::handle::{Handle, MemoryUsage, ObjectKind};
use crate::string_table::StringTable;
use crate::table::arguments::Arguments;
use crate::table::{RowPage, Table, TableKind};
use crate::timeline::Timeline;
use crate::topology::Topology;
use crate::track::{Track, TrackId, TrackKind};

/// Races `fut` against `promise`'s interrupt flag. On cancellation, forwards
/// `connection` to the database port and returns `None`, leaving the
/// caller to mark the promise cancelled; otherwise returns `fut`'s output.
async fn race_interruptible<T, O, F>(
    db: &Arc<dyn Database>,
    connection: u64,
    promise: &Promise<T>,
    fut: F,
) -> Option<O>
where
    T: Clone + Send + Sync + 'static,
    F: std::future::Future<Output = O>,
{
    tokio::select! {
        biased;
        _ = promise.wait_for_cancel() => {
            db.interrupt_query(connection);
            None
        }
        result = fut => Some(result),
    }
}

/// Key a fetch is deduplicated on: identical `(track, window, max_entries)`
/// requests join the same in-flight `Future` instead of hitting the
/// Database port twice.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
struct GraphFetchKey {
    track_id: TrackId,
    start_ts: i64,
    end_ts: i64,
    max_entries: u64,
}

/// Which per-event property collection an `Array` in the cache holds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EventPropertyCacheKind {
    FlowTrace,
    StackTrace,
    ExtData,
}

#[derive(Default)]
struct State {
    timeline: Option<Timeline>,
    tracks: HashMap<TrackId, Track>,
    topology: Topology,
    tables: HashMap<u64, Table>,
    graphs: HashMap<GraphId, Arc<Mutex<Graph>>>,
}

/// Storage for the typed objects an event-property fetch resolves to. Kept
/// separate from `event_property_cache`'s `Array`s, which only hold
/// `Handle`s into these maps.
#[derive(Default)]
struct PropertyObjects {
    call_stacks: HashMap<u64, CallStackEntry>,
    flow_controls: HashMap<u64, FlowControl>,
    ext_data: HashMap<u64, ExtData>,
    argument_data: HashMap<u64, ArgumentData>,
}

/// Storage for compute-mode objects (§4.11-style analysis results), resolved
/// through the same `Handle`/`PropertyAccess` machinery as every other
/// object kind instead of a bespoke side channel.
#[derive(Default)]
struct ComputeObjects {
    compute_tables: HashMap<u64, ComputeTable>,
    plots: HashMap<u64, Plot>,
    series: HashMap<u64, Series>,
    scalar_metrics: HashMap<u64, ScalarMetric>,
}

pub struct Controller {
    config: ControllerConfig,
    db: Arc<dyn Database>,
    string_table: Arc<StringTable>,
    arena: Arc<EventArena>,
    state: Mutex<State>,
    track_locks: Mutex<HashMap<TrackId, Arc<tokio::sync::Mutex<()>>>>,
    in_flight_graph_fetches: Mutex<HashMap<GraphFetchKey, Future<Arc<Mutex<Graph>>>>>,
    event_property_cache: Mutex<HashMap<(u64, EventPropertyCacheKind), Array>>,
    property_objects: Mutex<PropertyObjects>,
    compute_objects: Mutex<ComputeObjects>,
    fetch_permits: Arc<tokio::sync::Semaphore>,
    next_graph_id: AtomicU64,
    next_property_object_id: AtomicU64,
    next_compute_object_id: AtomicU64,
    next_connection_id: AtomicU64,
}

fn progress_cb(future_path: &str, tag: &'static str) -> ProgressCallback {
    let path = future_path.to_owned();
    Box::new(move |update: ProgressUpdate| {
        info!(path = %path, tag, percent = update.percent, status = ?update.status, "database progress");
    })
}

impl Controller {
    pub fn new(db: Arc<dyn Database>, config: ControllerConfig) -> Self {
        let fetch_permits = Arc::new(tokio::sync::Semaphore::new(
            config.max_concurrent_fetches.max(1) as usize,
        ));
        Self {
            config,
            db,
            string_table: Arc::new(StringTable::new()),
            arena: Arc::new(EventArena::new()),
            state: Mutex::new(State::default()),
            track_locks: Mutex::new(HashMap::new()),
            in_flight_graph_fetches: Mutex::new(HashMap::new()),
            event_property_cache: Mutex::new(HashMap::new()),
            property_objects: Mutex::new(PropertyObjects::default()),
            compute_objects: Mutex::new(ComputeObjects::default()),
            fetch_permits,
            next_graph_id: AtomicU64::new(1),
            next_property_object_id: AtomicU64::new(1),
            next_compute_object_id: AtomicU64::new(1),
            next_connection_id: AtomicU64::new(1),
        }
    }

    pub fn string_table(&self) -> &Arc<StringTable> {
        &self.string_table
    }

    pub fn config(&self) -> &ControllerConfig {
        &self.config
    }

    fn next_connection(&self) -> u64 {
        self.next_connection_id.fetch_add(1, Ordering::Relaxed)
    }

    /// Schedules a metadata load. On success, `Timeline` and per-track
    /// metadata are populated and subsequent fetches may proceed.
    #[instrument(skip(self))]
    pub fn load_async(self: &Arc<Self>, path: String) -> Future<()> {
        let (future, promise) = Future::<()>::new_pair();
        let controller = self.clone();
        tokio::spawn(async move {
            controller.run_load(path, promise).await;
        });
        future
    }

    async fn run_load(&self, path: String, promise: Promise<()>) {
        let connection = self.next_connection();
        let started = chrono::Utc::now();
        let cb = progress_cb(&path, "load");
        if let Err(e) = self.db.open(&path).await {
            promise.reject(e);
            return;
        }
        promise.advance(10);
        let Some(result) = race_interruptible(
            &self.db,
            connection,
            &promise,
            self.db.read_metadata_async(connection, cb),
        )
        .await
        else {
            promise.mark_cancelled();
            return;
        };
        let metadata: TraceMetadata = match result {
            Ok(m) => m,
            Err(e) => {
                promise.reject(e);
                return;
            }
        };
        promise.advance(80);
        info!(path = %path, elapsed_ms = (chrono::Utc::now() - started).num_milliseconds(), "metadata loaded");
        {
            let mut state = self.state.lock().expect("poisoned");
            let timeline = Timeline::new(metadata.min_ts, metadata.max_ts);
            for t in metadata.tracks {
                let mut track = Track::new(t.track_id, t.kind, t.min_ts, t.max_ts);
                track.num_entries = t.num_entries;
                state.tracks.insert(t.track_id, track);
            }
            state.timeline = Some(timeline);
        }
        promise.advance(100);
        promise.resolve(());
    }

    pub fn timeline_snapshot(&self) -> Option<Timeline> {
        self.state.lock().expect("poisoned").timeline.clone()
    }

    pub fn topology_root(&self) -> Option<crate::topology::NodeId> {
        self.state.lock().expect("poisoned").topology.root_id()
    }

    pub fn topology_node(&self, id: crate::topology::NodeId) -> Option<crate::topology::TopologyNode> {
        self.state.lock().expect("poisoned").topology.node(id).cloned()
    }

    /// Gives a caller (the load path, or a test fixture) direct, exclusive
    /// access to the topology tree. The Controller is the tree's only owner;
    /// nothing else is allowed to build one.
    pub fn with_topology<R>(&self, f: impl FnOnce(&mut Topology, &mut HashMap<TrackId, Track>) -> R) -> R {
        let mut state = self.state.lock().expect("poisoned");
        let State { topology, tracks, .. } = &mut *state;
        f(topology, tracks)
    }

    async fn track_lock(&self, track_id: TrackId) -> Arc<tokio::sync::Mutex<()>> {
        let mut locks = self.track_locks.lock().expect("poisoned");
        locks
            .entry(track_id)
            .or_insert_with(|| Arc::new(tokio::sync::Mutex::new(())))
            .clone()
    }

    /// Fetches (or joins an in-flight fetch for) a viewport-bounded,
    /// LOD-coalesced slice of `track_id`. Two identical overlapping requests
    /// resolve to Graphs whose entries compare equal.
    #[instrument(skip(self))]
    pub fn graph_fetch_async(
        self: &Arc<Self>,
        track_id: TrackId,
        start_ts: i64,
        end_ts: i64,
        max_entries: u64,
    ) -> Result<Future<Arc<Mutex<Graph>>>> {
        if start_ts > end_ts {
            return Err(ControllerError::InvalidArgument(
                "start_ts must not exceed end_ts".to_owned(),
            ));
        }
        let key = GraphFetchKey {
            track_id,
            start_ts,
            end_ts,
            max_entries,
        };
        let mut in_flight = self.in_flight_graph_fetches.lock().expect("poisoned");
        if let Some(existing) = in_flight.get(&key) {
            return Ok(existing.clone());
        }
        let (future, promise) = Future::<Arc<Mutex<Graph>>>::new_pair();
        in_flight.insert(key, future.clone());
        drop(in_flight);

        let controller = self.clone();
        tokio::spawn(async move {
            controller.run_graph_fetch(key, promise).await;
            controller
                .in_flight_graph_fetches
                .lock()
                .expect("poisoned")
                .remove(&key);
        });
        Ok(future)
    }

    async fn run_graph_fetch(&self, key: GraphFetchKey, promise: Promise<Arc<Mutex<Graph>>>) {
        let Ok(_permit) = self.fetch_permits.clone().acquire_owned().await else {
            promise.reject(ControllerError::Unknown("fetch semaphore closed".to_owned()));
            return;
        };

        let track_kind = {
            let mut state = self.state.lock().expect("poisoned");
            match state.tracks.get_mut(&key.track_id) {
                Some(t) => {
                    t.begin_buffer_load();
                    t.kind
                }
                None => {
                    promise.reject(ControllerError::InvalidArgument(format!(
                        "unknown track id {}",
                        key.track_id
                    )));
                    return;
                }
            }
        };

        let lock = self.track_lock(key.track_id).await;
        let _guard = lock.lock().await;

        let connection = self.next_connection();
        let cb = progress_cb("graph_fetch", "graph");
        let Some(result) = race_interruptible(
            &self.db,
            connection,
            &promise,
            self.db
                .read_slice_async(connection, key.start_ts, key.end_ts, &[key.track_id], cb),
        )
        .await
        else {
            self.reset_track_buffer(key.track_id);
            promise.mark_cancelled();
            return;
        };
        let chunks = match result {
            Ok(c) => c,
            Err(e) => {
                self.reset_track_buffer(key.track_id);
                promise.reject(e);
                return;
            }
        };

        let graph_id = self.next_graph_id.fetch_add(1, Ordering::Relaxed);
        let expected_chunks = chunks.len().max(1) as u32;
        let mut graph = match track_kind {
            TrackKind::Samples => Graph::new_line_chart(
                graph_id,
                key.track_id,
                key.start_ts,
                key.end_ts,
                key.max_entries.max(1),
                expected_chunks,
            ),
            TrackKind::Events => Graph::new_flamegraph(
                graph_id,
                key.track_id,
                key.start_ts,
                key.end_ts,
                key.max_entries.max(1),
                expected_chunks,
                self.arena.clone(),
            ),
        };

        if chunks.is_empty() {
            graph.finish_chunk();
        }
        for chunk in chunks {
            match (track_kind, chunk) {
                (TrackKind::Samples, SliceChunk::Samples { rows, .. }) => {
                    if let Err(e) = graph.ingest_sample_chunk(rows) {
                        self.reset_track_buffer(key.track_id);
                        promise.reject(e);
                        return;
                    }
                }
                (TrackKind::Events, SliceChunk::Events { rows, .. }) => {
                    // Rows arrive as facts, not arena entries; the arena only
                    // learns about an event the first time some Graph sees it.
                    for row in &rows {
                        self.arena.insert(Event::new_leaf(
                            row.id,
                            row.start_ts,
                            row.end_ts,
                            row.name_str_index,
                            row.category_str_index,
                            row.level,
                        ));
                    }
                    if let Err(e) = graph.ingest_event_chunk(rows) {
                        self.reset_track_buffer(key.track_id);
                        promise.reject(e);
                        return;
                    }
                }
                _ => {
                    warn!("slice chunk kind did not match track kind, dropping");
                    continue;
                }
            }
            graph.finish_chunk();
        }

        let graph = Arc::new(Mutex::new(graph));
        let mut state = self.state.lock().expect("poisoned");
        state.graphs.insert(graph_id, graph.clone());
        if let Some(timeline) = state.timeline.as_mut() {
            timeline.push_graph(graph_id);
        }
        if let Some(track) = state.tracks.get_mut(&key.track_id) {
            track.finish_buffer_load();
        }
        drop(state);
        promise.resolve(graph);
    }

    fn reset_track_buffer(&self, track_id: TrackId) {
        let mut state = self.state.lock().expect("poisoned");
        if let Some(track) = state.tracks.get_mut(&track_id) {
            track.free_buffer(true);
        }
    }

    pub fn graph(&self, id: GraphId) -> Option<Arc<Mutex<Graph>>> {
        self.state.lock().expect("poisoned").graphs.get(&id).cloned()
    }

    /// Frees `track_id`'s data buffer and evicts any cached `Graph`s over
    /// it. A buffer still `Loading` is only freed when `force` is set;
    /// otherwise this returns `false` and leaves the track untouched.
    pub fn free_track_buffer(&self, track_id: TrackId, force: bool) -> bool {
        let mut state = self.state.lock().expect("poisoned");
        let Some(track) = state.tracks.get_mut(&track_id) else {
            return false;
        };
        if !track.free_buffer(force) {
            return false;
        }
        state.graphs.retain(|_, graph| graph.lock().expect("poisoned").track_id != track_id);
        true
    }

    pub fn event(&self, id: crate::arena::EventId) -> Option<Event> {
        self.arena.get(id)
    }

    /// Executes a table query and streams its first page; returns once
    /// column metadata and the requested page are available.
    #[instrument(skip(self, args))]
    pub fn table_fetch_async(
        self: &Arc<Self>,
        table_kind: TableKind,
        sql: String,
        args: Arguments,
    ) -> Future<u64> {
        let (future, promise) = Future::<u64>::new_pair();
        let controller = self.clone();
        tokio::spawn(async move {
            controller.run_table_fetch(table_kind, sql, args, promise).await;
        });
        future
    }

    async fn run_table_fetch(
        &self,
        table_kind: TableKind,
        sql: String,
        args: Arguments,
        promise: Promise<u64>,
    ) {
        let connection = self.next_connection();
        let cb = progress_cb("table_fetch", "table");
        let Some(result) = race_interruptible(
            &self.db,
            connection,
            &promise,
            self.db.execute_query_async(connection, &sql, "table_fetch", &args, cb),
        )
        .await
        else {
            promise.mark_cancelled();
            return;
        };
        let (db_table_id, columns, rows) = match result {
            Ok(r) => r,
            Err(e) => {
                promise.reject(e);
                return;
            }
        };
        let mut table = Table::new(db_table_id, table_kind, columns.clone());
        table.summary = args.summary;
        table.set_page(RowPage {
            row_offset: args.start_index,
            rows: rows
                .into_iter()
                .map(|row| {
                    columns
                        .iter()
                        .map(|c| row.get(&c.name).cloned().unwrap_or(DataCell::U64(0)))
                        .collect()
                })
                .collect(),
        });
        self.state
            .lock()
            .expect("poisoned")
            .tables
            .insert(db_table_id, table);
        promise.resolve(db_table_id);
    }

    pub fn table(&self, id: u64) -> Option<Table> {
        self.state.lock().expect("poisoned").tables.get(&id).cloned()
    }

    fn next_property_object_id(&self) -> u64 {
        self.next_property_object_id.fetch_add(1, Ordering::Relaxed)
    }

    pub fn call_stack_entry(&self, id: u64) -> Option<CallStackEntry> {
        self.property_objects.lock().expect("poisoned").call_stacks.get(&id).cloned()
    }

    pub fn flow_control(&self, id: u64) -> Option<FlowControl> {
        self.property_objects.lock().expect("poisoned").flow_controls.get(&id).cloned()
    }

    pub fn ext_data(&self, id: u64) -> Option<ExtData> {
        self.property_objects.lock().expect("poisoned").ext_data.get(&id).cloned()
    }

    pub fn argument_data(&self, id: u64) -> Option<ArgumentData> {
        self.property_objects.lock().expect("poisoned").argument_data.get(&id).cloned()
    }

    /// Fetches CallStack/FlowControl/ExtData for one event, caching the
    /// resulting `Array` keyed by `(event_id, kind)`.
    #[instrument(skip(self))]
    pub fn read_event_property_async(
        self: &Arc<Self>,
        kind: EventPropertyCacheKind,
        event_id: u64,
    ) -> Future<Array> {
        let (future, promise) = Future::<Array>::new_pair();
        let controller = self.clone();
        tokio::spawn(async move {
            controller.run_read_event_property(kind, event_id, promise).await;
        });
        future
    }

    async fn run_read_event_property(
        &self,
        kind: EventPropertyCacheKind,
        event_id: u64,
        promise: Promise<Array>,
    ) {
        if let Some(cached) = self
            .event_property_cache
            .lock()
            .expect("poisoned")
            .get(&(event_id, kind))
        {
            promise.resolve(cached.clone());
            return;
        }
        let db_kind = match kind {
            EventPropertyCacheKind::FlowTrace => EventPropertyKind::FlowTrace,
            EventPropertyCacheKind::StackTrace => EventPropertyKind::StackTrace,
            EventPropertyCacheKind::ExtData => EventPropertyKind::ExtData,
        };
        let connection = self.next_connection();
        let cb = progress_cb("read_event_property", "event_property");
        let Some(result) = race_interruptible(
            &self.db,
            connection,
            &promise,
            self.db.read_event_property_async(connection, db_kind, event_id, cb),
        )
        .await
        else {
            promise.mark_cancelled();
            return;
        };
        let rows = match result {
            Ok(r) => r,
            Err(e) => {
                promise.reject(e);
                return;
            }
        };

        let mut array = Array::new();
        let mut objects = self.property_objects.lock().expect("poisoned");
        for row in rows {
            let cell = match row {
                EventPropertyRow::CallStack {
                    file,
                    pc,
                    symbol,
                    line_name,
                    line_address,
                } => match CallStackEntry::from_parsed(file, pc, symbol, line_name, line_address) {
                    Some(entry) => {
                        let id = self.next_property_object_id();
                        objects.call_stacks.insert(id, entry);
                        DataCell::Handle(Handle::new(ObjectKind::CallStack, id))
                    }
                    None => continue,
                },
                EventPropertyRow::FlowControl {
                    start_ts,
                    end_ts,
                    track_id,
                    level,
                    op_type,
                    name_str_index,
                    category_str_index,
                } => {
                    let flow = FlowControl {
                        id: event_id,
                        start_ts,
                        end_ts,
                        track_id,
                        level,
                        direction: FlowDirection::from_op_type(&op_type),
                        name_str_index,
                        category_str_index,
                    };
                    let id = self.next_property_object_id();
                    objects.flow_controls.insert(id, flow);
                    DataCell::Handle(Handle::new(ObjectKind::FlowControl, id))
                }
                EventPropertyRow::ExtData {
                    category_str_index,
                    name_str_index,
                    value,
                    category_enum,
                    position,
                    arg_type,
                } => {
                    let ext = ExtData {
                        category_str_index,
                        name_str_index,
                        value,
                        category_enum,
                    };
                    match (position, arg_type) {
                        (Some(position), Some(arg_type)) => {
                            let id = self.next_property_object_id();
                            objects
                                .argument_data
                                .insert(id, ArgumentData { ext, position, arg_type });
                            DataCell::Handle(Handle::new(ObjectKind::ArgumentData, id))
                        }
                        _ => {
                            let id = self.next_property_object_id();
                            objects.ext_data.insert(id, ext);
                            DataCell::Handle(Handle::new(ObjectKind::ExtData, id))
                        }
                    }
                }
            };
            array.push(cell);
        }
        drop(objects);

        self.evict_event_property_cache_over_budget(array.memory_usage_inclusive());
        self.event_property_cache
            .lock()
            .expect("poisoned")
            .insert((event_id, kind), array.clone());
        promise.resolve(array);
    }

    /// Evicts cache entries until `incoming_bytes` plus the cache's current
    /// size fits under `event_property_cache_budget_bytes`. Eviction order
    /// isn't LRU — the cache keeps no access history — just whichever
    /// entries the map yields first.
    fn evict_event_property_cache_over_budget(&self, incoming_bytes: u64) {
        let budget = self.config.event_property_cache_budget_bytes;
        loop {
            let total: u64 = self
                .event_property_cache
                .lock()
                .expect("poisoned")
                .values()
                .map(MemoryUsage::memory_usage_inclusive)
                .sum();
            if total + incoming_bytes <= budget {
                return;
            }
            let Some((event_id, kind)) = self
                .event_property_cache
                .lock()
                .expect("poisoned")
                .keys()
                .next()
                .copied()
            else {
                return;
            };
            self.delete_event_property_for(kind, event_id);
        }
    }

    /// Releases a cached per-event property array and every typed object it
    /// referenced, matching the single-lock eviction contract.
    pub fn delete_event_property_for(&self, kind: EventPropertyCacheKind, event_id: u64) {
        let Some(array) = self
            .event_property_cache
            .lock()
            .expect("poisoned")
            .remove(&(event_id, kind))
        else {
            return;
        };
        let mut objects = self.property_objects.lock().expect("poisoned");
        for cell in array.iter() {
            let Some(handle) = cell.as_handle() else { continue };
            match handle.kind {
                ObjectKind::CallStack => {
                    objects.call_stacks.remove(&handle.id);
                }
                ObjectKind::FlowControl => {
                    objects.flow_controls.remove(&handle.id);
                }
                ObjectKind::ExtData => {
                    objects.ext_data.remove(&handle.id);
                }
                ObjectKind::ArgumentData => {
                    objects.argument_data.remove(&handle.id);
                }
                _ => {}
            }
        }
    }

    /// Copies `[start_ts, end_ts]` to a new database, deleting any existing
    /// file at `new_path` first.
    #[instrument(skip(self))]
    pub fn trim_save_async(self: &Arc<Self>, start_ts: i64, end_ts: i64, new_path: String) -> Future<()> {
        let (future, promise) = Future::<()>::new_pair();
        let controller = self.clone();
        tokio::spawn(async move {
            if std::path::Path::new(&new_path).exists() {
                if let Err(e) = std::fs::remove_file(&new_path) {
                    promise.reject(ControllerError::Unknown(e.to_string()));
                    return;
                }
            }
            let connection = controller.next_connection();
            let cb = progress_cb(&new_path, "trim_save");
            let Some(result) = race_interruptible(
                &controller.db,
                connection,
                &promise,
                controller.db.trim_save_async(connection, start_ts, end_ts, &new_path, cb),
            )
            .await
            else {
                promise.mark_cancelled();
                return;
            };
            match result {
                Ok(()) => promise.resolve(()),
                Err(e) => promise.reject(e),
            }
        });
        future
    }

    #[instrument(skip(self))]
    pub fn export_csv_async(self: &Arc<Self>, sql: String, out_path: String) -> Future<()> {
        let (future, promise) = Future::<()>::new_pair();
        let controller = self.clone();
        tokio::spawn(async move {
            let connection = controller.next_connection();
            let cb = progress_cb(&out_path, "export_csv");
            let Some(result) = race_interruptible(
                &controller.db,
                connection,
                &promise,
                controller.db.export_csv_async(connection, &sql, &out_path, cb),
            )
            .await
            else {
                promise.mark_cancelled();
                return;
            };
            match result {
                Ok(()) => promise.resolve(()),
                Err(e) => promise.reject(e),
            }
        });
        future
    }

    fn next_compute_id(&self) -> u64 {
        self.next_compute_object_id.fetch_add(1, Ordering::Relaxed)
    }

    pub fn compute_table(&self, id: u64) -> Option<ComputeTable> {
        self.compute_objects.lock().expect("poisoned").compute_tables.get(&id).cloned()
    }

    pub fn compute_plot(&self, id: u64) -> Option<Plot> {
        self.compute_objects.lock().expect("poisoned").plots.get(&id).cloned()
    }

    pub fn plot_series(&self, id: u64) -> Option<Series> {
        self.compute_objects.lock().expect("poisoned").series.get(&id).cloned()
    }

    pub fn scalar_metric(&self, id: u64) -> Option<ScalarMetric> {
        self.compute_objects.lock().expect("poisoned").scalar_metrics.get(&id).cloned()
    }

    /// Runs a compute-mode query and builds a `ComputeTable` from its rows,
    /// resolving to the table's id. Each row's `"colorize"`/`"highlight"`
    /// columns are optional booleans (absent means `false`); every other
    /// column becomes one `ComputeCell` in row order.
    #[instrument(skip(self))]
    pub fn compute_table_fetch_async(
        self: &Arc<Self>,
        kind: ComputeTableKind,
        title: String,
        use_case: String,
        sql: String,
    ) -> Future<u64> {
        let (future, promise) = Future::<u64>::new_pair();
        let controller = self.clone();
        tokio::spawn(async move {
            controller.run_compute_table_fetch(kind, title, use_case, sql, promise).await;
        });
        future
    }

    async fn run_compute_table_fetch(
        &self,
        kind: ComputeTableKind,
        title: String,
        use_case: String,
        sql: String,
        promise: Promise<u64>,
    ) {
        let connection = self.next_connection();
        let cb = progress_cb("compute_table_fetch", "compute_table");
        let Some(result) = race_interruptible(
            &self.db,
            connection,
            &promise,
            self.db.execute_compute_query_async(connection, &use_case, &sql, cb),
        )
        .await
        else {
            promise.mark_cancelled();
            return;
        };
        let (_, columns, rows) = match result {
            Ok(r) => r,
            Err(e) => {
                promise.reject(e);
                return;
            }
        };
        let column_names: Vec<String> = columns
            .iter()
            .map(|c| c.name.clone())
            .filter(|n| n != "colorize" && n != "highlight")
            .collect();
        let id = self.next_compute_id();
        let mut table = ComputeTable::new(id, kind, title, column_names.clone());
        table.rows = rows
            .into_iter()
            .map(|row| {
                let colorize = row.get("colorize").and_then(|c| c.as_u64()).unwrap_or(0) != 0;
                let highlight = row.get("highlight").and_then(|c| c.as_u64()).unwrap_or(0) != 0;
                column_names
                    .iter()
                    .map(|name| crate::compute::ComputeCell {
                        value: row.get(name).cloned().unwrap_or(DataCell::U64(0)),
                        colorize,
                        highlight,
                    })
                    .collect()
            })
            .collect();
        self.compute_objects
            .lock()
            .expect("poisoned")
            .compute_tables
            .insert(id, table);
        promise.resolve(id);
    }

    /// Runs a compute-mode query grouping rows into named series, building a
    /// `Plot` keyed on a `"series"` column; the remaining two numeric
    /// columns become each series' `(x, y)` points.
    #[instrument(skip(self))]
    pub fn compute_plot_fetch_async(
        self: &Arc<Self>,
        kind: crate::compute::plots::ComputePlotKind,
        x_axis_title: String,
        y_axis_title: String,
        use_case: String,
        sql: String,
    ) -> Future<u64> {
        let (future, promise) = Future::<u64>::new_pair();
        let controller = self.clone();
        tokio::spawn(async move {
            controller
                .run_compute_plot_fetch(kind, x_axis_title, y_axis_title, use_case, sql, promise)
                .await;
        });
        future
    }

    async fn run_compute_plot_fetch(
        &self,
        kind: crate::compute::plots::ComputePlotKind,
        x_axis_title: String,
        y_axis_title: String,
        use_case: String,
        sql: String,
        promise: Promise<u64>,
    ) {
        let connection = self.next_connection();
        let cb = progress_cb("compute_plot_fetch", "compute_plot");
        let Some(result) = race_interruptible(
            &self.db,
            connection,
            &promise,
            self.db.execute_compute_query_async(connection, &use_case, &sql, cb),
        )
        .await
        else {
            promise.mark_cancelled();
            return;
        };
        let (_, _, rows) = match result {
            Ok(r) => r,
            Err(e) => {
                promise.reject(e);
                return;
            }
        };

        let mut objects = self.compute_objects.lock().expect("poisoned");
        let mut by_name: HashMap<String, Series> = HashMap::new();
        let mut tick_labels = Vec::new();
        for row in rows {
            let name = row
                .get("series")
                .and_then(|c| c.as_str())
                .unwrap_or("series")
                .to_owned();
            let x = row.get("x").and_then(|c| c.as_f64()).unwrap_or(0.0);
            let y = row.get("y").and_then(|c| c.as_f64()).unwrap_or(0.0);
            if let Some(label) = row.get("tick_label").and_then(|c| c.as_str()) {
                tick_labels.push(label.to_owned());
            }
            let series_id = self.next_compute_id();
            let entry = by_name
                .entry(name.clone())
                .or_insert_with(|| Series::new(series_id, name));
            entry.points.push((x, y));
        }

        let plot_id = self.next_compute_id();
        let mut plot = Plot::new(plot_id, kind, x_axis_title, y_axis_title, tick_labels);
        for (_, series) in by_name {
            objects.series.insert(series.id, series.clone());
            plot.series.push(series);
        }
        objects.plots.insert(plot_id, plot);
        drop(objects);
        promise.resolve(plot_id);
    }

    /// Runs a compute-mode query expected to return exactly one `"value"`
    /// column in its first row.
    #[instrument(skip(self))]
    pub fn scalar_metric_fetch_async(
        self: &Arc<Self>,
        kind: ScalarMetricKind,
        use_case: String,
        sql: String,
    ) -> Future<u64> {
        let (future, promise) = Future::<u64>::new_pair();
        let controller = self.clone();
        tokio::spawn(async move {
            controller.run_scalar_metric_fetch(kind, use_case, sql, promise).await;
        });
        future
    }

    async fn run_scalar_metric_fetch(
        &self,
        kind: ScalarMetricKind,
        use_case: String,
        sql: String,
        promise: Promise<u64>,
    ) {
        let connection = self.next_connection();
        let cb = progress_cb("scalar_metric_fetch", "scalar_metric");
        let Some(result) = race_interruptible(
            &self.db,
            connection,
            &promise,
            self.db.execute_compute_query_async(connection, &use_case, &sql, cb),
        )
        .await
        else {
            promise.mark_cancelled();
            return;
        };
        let (_, _, rows) = match result {
            Ok(r) => r,
            Err(e) => {
                promise.reject(e);
                return;
            }
        };
        let value = rows
            .first()
            .and_then(|row| row.get("value"))
            .and_then(|c| c.as_f64())
            .unwrap_or(0.0);
        let id = self.next_compute_id();
        self.compute_objects
            .lock()
            .expect("poisoned")
            .scalar_metrics
            .insert(id, ScalarMetric::new(id, kind, value));
        promise.resolve(id);
    }
}
