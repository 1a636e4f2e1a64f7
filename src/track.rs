//! Track metadata. Entries are never returned directly
//! from a `Track`; callers build a [`crate::graph::Graph`] to fetch them.

use crate::error::{ControllerError, Result};
use crate::handle::{Handle, MemoryUsage, ObjectKind, PropertyAccess, PropertyId};

pub type TrackId = u64;

pub mod prop {
    use crate::handle::{ObjectKind, PROP_FIRST_RESERVED};

    pub const NUMBER_OF_ENTRIES: u32 = ObjectKind::Track.block_first() + PROP_FIRST_RESERVED;
    pub const MIN_TIMESTAMP: u32 = NUMBER_OF_ENTRIES + 1;
    pub const MAX_TIMESTAMP: u32 = NUMBER_OF_ENTRIES + 2;
    pub const MIN_VALUE: u32 = NUMBER_OF_ENTRIES + 3;
    pub const MAX_VALUE: u32 = NUMBER_OF_ENTRIES + 4;
    pub const TOPOLOGY_BACK_REF: u32 = NUMBER_OF_ENTRIES + 5;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub enum TrackKind {
    Samples,
    Events,
}

/// What this track hangs off of in the topology tree, if anything.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TrackTopologyRef {
    None,
    Thread(u64),
    Queue(u64),
    Stream(u64),
    Counter(u64),
}

/// Lifecycle of a track's data buffer. A buffer only reaches `Ready` once a
/// fetch completes; it may be freed early, but only under `force`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BufferState {
    Empty,
    Loading,
    Ready,
}

#[derive(Debug, Clone)]
pub struct Track {
    pub id: TrackId,
    pub kind: TrackKind,
    pub min_ts: i64,
    pub max_ts: i64,
    pub num_entries: u64,
    pub min_value: f64,
    pub max_value: f64,
    pub topology_ref: TrackTopologyRef,
    pub buffer_state: BufferState,
}

impl Track {
    pub fn new(id: TrackId, kind: TrackKind, min_ts: i64, max_ts: i64) -> Self {
        assert!(min_ts <= max_ts, "track min_ts must not exceed max_ts");
        Self {
            id,
            kind,
            min_ts,
            max_ts,
            num_entries: 0,
            min_value: 0.0,
            max_value: 0.0,
            topology_ref: TrackTopologyRef::None,
            buffer_state: BufferState::Empty,
        }
    }

    /// Widens `[min_value, max_value]` to include `value`, keeping counter
    /// extrema on the `Track`, never leaking into the `Timeline`'s
    /// timestamp extrema — the source format conflates the two, but they
    /// must stay separate here.
    pub fn observe_counter_value(&mut self, value: f64) {
        if self.num_entries == 0 {
            self.min_value = value;
            self.max_value = value;
        } else {
            self.min_value = self.min_value.min(value);
            self.max_value = self.max_value.max(value);
        }
        self.num_entries += 1;
    }

    pub fn begin_buffer_load(&mut self) {
        self.buffer_state = BufferState::Loading;
    }

    pub fn finish_buffer_load(&mut self) {
        self.buffer_state = BufferState::Ready;
    }

    /// Frees the track's data buffer. Refuses (returns `false`, leaving
    /// state untouched) when a load is still in flight and `force` is not
    /// set; a forced free drops a `Loading` buffer back to `Empty` too, so
    /// the in-flight fetch's result is discarded rather than cached.
    pub fn free_buffer(&mut self, force: bool) -> bool {
        if self.buffer_state == BufferState::Loading && !force {
            return false;
        }
        self.buffer_state = BufferState::Empty;
        true
    }
}

impl MemoryUsage for Track {
    fn memory_usage_inclusive(&self) -> u64 {
        self.memory_usage_exclusive()
    }

    fn memory_usage_exclusive(&self) -> u64 {
        std::mem::size_of::<Self>() as u64
    }
}

impl PropertyAccess for Track {
    fn kind(&self) -> ObjectKind {
        ObjectKind::Track
    }

    fn get_u64(&self, p: PropertyId) -> Result<u64> {
        if let Ok(v) = self.get_universal_u64(p) {
            return Ok(v);
        }
        match p.id {
            id if id == prop::NUMBER_OF_ENTRIES => Ok(self.num_entries),
            id if id == prop::MIN_TIMESTAMP => Ok(self.min_ts as u64),
            id if id == prop::MAX_TIMESTAMP => Ok(self.max_ts as u64),
            _ => Err(ControllerError::InvalidEnum(p.id)),
        }
    }

    fn get_f64(&self, p: PropertyId) -> Result<f64> {
        match p.id {
            id if id == prop::MIN_VALUE => Ok(self.min_value),
            id if id == prop::MAX_VALUE => Ok(self.max_value),
            _ => Err(ControllerError::InvalidEnum(p.id)),
        }
    }

    fn get_string(&self, p: PropertyId) -> Result<String> {
        Err(ControllerError::InvalidEnum(p.id))
    }

    fn get_object(&self, p: PropertyId) -> Result<Handle> {
        if p.id == prop::TOPOLOGY_BACK_REF {
            return match self.topology_ref {
                TrackTopologyRef::None => Err(ControllerError::NotLoaded),
                TrackTopologyRef::Thread(id) => Ok(Handle::new(ObjectKind::Thread, id)),
                TrackTopologyRef::Queue(id) => Ok(Handle::new(ObjectKind::Queue, id)),
                TrackTopologyRef::Stream(id) => Ok(Handle::new(ObjectKind::Stream, id)),
                TrackTopologyRef::Counter(id) => Ok(Handle::new(ObjectKind::Counter, id)),
            };
        }
        Err(ControllerError::InvalidEnum(p.id))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn counter_values_widen_min_max_value_not_timestamp() {
        let mut track = Track::new(1, TrackKind::Samples, 0, 1000);
        track.observe_counter_value(5.0);
        track.observe_counter_value(-2.0);
        track.observe_counter_value(9.0);
        assert_eq!(track.min_value, -2.0);
        assert_eq!(track.max_value, 9.0);
        // timestamp extrema must stay whatever they were set to at construction
        assert_eq!(track.min_ts, 0);
        assert_eq!(track.max_ts, 1000);
    }

    #[test]
    #[should_panic(expected = "min_ts must not exceed max_ts")]
    fn rejects_inverted_range() {
        Track::new(1, TrackKind::Events, 100, 0);
    }

    #[test]
    fn freeing_a_loading_buffer_without_force_is_refused() {
        let mut track = Track::new(1, TrackKind::Samples, 0, 1000);
        track.begin_buffer_load();
        assert!(!track.free_buffer(false));
        assert_eq!(track.buffer_state, BufferState::Loading);
    }

    #[test]
    fn forcing_a_free_drops_a_loading_buffer_to_empty() {
        let mut track = Track::new(1, TrackKind::Samples, 0, 1000);
        track.begin_buffer_load();
        assert!(track.free_buffer(true));
        assert_eq!(track.buffer_state, BufferState::Empty);
    }

    #[test]
    fn freeing_a_ready_buffer_never_needs_force() {
        let mut track = Track::new(1, TrackKind::Samples, 0, 1000);
        track.begin_buffer_load();
        track.finish_buffer_load();
        assert!(track.free_buffer(false));
        assert_eq!(track.buffer_state, BufferState::Empty);
    }
}
