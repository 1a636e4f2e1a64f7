//! The trace-wide timestamp range and its collection of live Graphs.

use crate::error::{ControllerError, Result};
use crate::graph::GraphId;
use crate::handle::{Handle, MemoryUsage, ObjectKind, PropertyAccess, PropertyId};

pub mod prop {
    use crate::handle::{ObjectKind, PROP_FIRST_RESERVED};

    pub const MIN_TIMESTAMP: u32 = ObjectKind::Timeline.block_first() + PROP_FIRST_RESERVED;
    pub const MAX_TIMESTAMP: u32 = MIN_TIMESTAMP + 1;
    pub const NUM_GRAPHS: u32 = MIN_TIMESTAMP + 2;
    pub const GRAPH_INDEXED: u32 = MIN_TIMESTAMP + 3;
}

/// Owns the set of Graphs alive for the current trace. A fresh `Timeline`
/// with no graphs yet fetched has `num_graphs == 0`, matching an empty-trace
/// load before any viewport has been requested.
#[derive(Debug, Clone, Default)]
pub struct Timeline {
    pub min_ts: i64,
    pub max_ts: i64,
    graphs: Vec<GraphId>,
}

impl Timeline {
    pub fn new(min_ts: i64, max_ts: i64) -> Self {
        assert!(min_ts <= max_ts, "timeline min_ts must not exceed max_ts");
        Self {
            min_ts,
            max_ts,
            graphs: Vec::new(),
        }
    }

    pub fn push_graph(&mut self, id: GraphId) {
        self.graphs.push(id);
    }

    pub fn num_graphs(&self) -> usize {
        self.graphs.len()
    }

    pub fn graph_ids(&self) -> &[GraphId] {
        &self.graphs
    }
}

impl MemoryUsage for Timeline {
    fn memory_usage_inclusive(&self) -> u64 {
        self.memory_usage_exclusive()
    }

    fn memory_usage_exclusive(&self) -> u64 {
        (std::mem::size_of::<Self>() + self.graphs.len() * std::mem::size_of::<GraphId>()) as u64
    }
}

impl PropertyAccess for Timeline {
    fn kind(&self) -> ObjectKind {
        ObjectKind::Timeline
    }

    fn get_u64(&self, p: PropertyId) -> Result<u64> {
        if let Ok(v) = self.get_universal_u64(p) {
            return Ok(v);
        }
        match p.id {
            id if id == prop::MIN_TIMESTAMP => Ok(self.min_ts as u64),
            id if id == prop::MAX_TIMESTAMP => Ok(self.max_ts as u64),
            id if id == prop::NUM_GRAPHS => Ok(self.graphs.len() as u64),
            _ => Err(ControllerError::InvalidEnum(p.id)),
        }
    }

    fn get_f64(&self, p: PropertyId) -> Result<f64> {
        Err(ControllerError::InvalidEnum(p.id))
    }

    fn get_string(&self, p: PropertyId) -> Result<String> {
        Err(ControllerError::InvalidEnum(p.id))
    }

    fn get_object(&self, p: PropertyId) -> Result<Handle> {
        if p.id == prop::GRAPH_INDEXED {
            let id = *self
                .graphs
                .get(p.index as usize)
                .ok_or(ControllerError::OutOfRange {
                    index: p.index,
                    num_entries: self.graphs.len() as u64,
                })?;
            return Ok(Handle::new(ObjectKind::Graph, id));
        }
        Err(ControllerError::InvalidEnum(p.id))
    }
}
