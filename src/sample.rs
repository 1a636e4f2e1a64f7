//! Sample-track leaves and their LOD bin aggregates.

use crate::error::{ControllerError, Result};
use crate::handle::{Handle, MemoryUsage, ObjectKind, PropertyAccess, PropertyId};

pub mod prop {
    use crate::handle::{ObjectKind, PROP_FIRST_RESERVED};

    pub const TIMESTAMP: u32 = ObjectKind::Sample.block_first() + PROP_FIRST_RESERVED;
    pub const VALUE: u32 = TIMESTAMP + 1;
    pub const MIN: u32 = TIMESTAMP + 2;
    pub const MEAN: u32 = TIMESTAMP + 3;
    pub const MEDIAN: u32 = TIMESTAMP + 4;
    pub const MAX: u32 = TIMESTAMP + 5;
    pub const MIN_TS: u32 = TIMESTAMP + 6;
    pub const MAX_TS: u32 = TIMESTAMP + 7;
}

/// Aggregates exposed by a synthetic bin Sample covering more than one
/// source sample.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SampleAggregate {
    pub min: f64,
    pub mean: f64,
    pub median: f64,
    pub max: f64,
    pub min_ts: i64,
    pub max_ts: i64,
}

/// A single scalar data point on a counter track, possibly a synthetic
/// bin-mean with aggregate children.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Sample {
    pub timestamp: i64,
    pub value: f64,
    /// `None` when this sample was not coalesced (a bin containing exactly
    /// one source sample).
    pub aggregate: Option<SampleAggregate>,
}

impl Sample {
    pub fn leaf(timestamp: i64, value: f64) -> Self {
        Self {
            timestamp,
            value,
            aggregate: None,
        }
    }
}

impl MemoryUsage for Sample {
    fn memory_usage_inclusive(&self) -> u64 {
        self.memory_usage_exclusive()
    }

    fn memory_usage_exclusive(&self) -> u64 {
        std::mem::size_of::<Self>() as u64
    }
}

impl PropertyAccess for Sample {
    fn kind(&self) -> ObjectKind {
        ObjectKind::Sample
    }

    fn get_u64(&self, p: PropertyId) -> Result<u64> {
        if let Ok(v) = self.get_universal_u64(p) {
            return Ok(v);
        }
        match p.id {
            id if id == prop::TIMESTAMP => Ok(self.timestamp as u64),
            id if id == prop::MIN_TS => self
                .aggregate
                .map(|a| a.min_ts as u64)
                .ok_or(ControllerError::NotLoaded),
            id if id == prop::MAX_TS => self
                .aggregate
                .map(|a| a.max_ts as u64)
                .ok_or(ControllerError::NotLoaded),
            _ => Err(ControllerError::InvalidEnum(p.id)),
        }
    }

    fn get_f64(&self, p: PropertyId) -> Result<f64> {
        match p.id {
            id if id == prop::VALUE => Ok(self.value),
            id if id == prop::MIN => self.aggregate.map(|a| a.min).ok_or(ControllerError::NotLoaded),
            id if id == prop::MEAN => self.aggregate.map(|a| a.mean).ok_or(ControllerError::NotLoaded),
            id if id == prop::MEDIAN => {
                self.aggregate.map(|a| a.median).ok_or(ControllerError::NotLoaded)
            }
            id if id == prop::MAX => self.aggregate.map(|a| a.max).ok_or(ControllerError::NotLoaded),
            _ => Err(ControllerError::InvalidEnum(p.id)),
        }
    }

    fn get_string(&self, p: PropertyId) -> Result<String> {
        Err(ControllerError::InvalidEnum(p.id))
    }

    fn get_object(&self, p: PropertyId) -> Result<Handle> {
        Err(ControllerError::InvalidEnum(p.id))
    }
}
