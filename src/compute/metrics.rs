//! The fixed enumeration of compute-mode scalar metrics.

use crate::error::{ControllerError, Result};
use crate::handle::{Handle, MemoryUsage, ObjectKind, PropertyAccess, PropertyId};

pub mod prop {
    use crate::handle::{ObjectKind, PROP_FIRST_RESERVED};

    pub const KIND: u32 = ObjectKind::ScalarMetric.block_first() + PROP_FIRST_RESERVED;
    pub const VALUE: u32 = KIND + 1;
    pub const UNIT: u32 = KIND + 2;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScalarMetricKind {
    L1CacheHitRate,
    L2CacheHitRate,
    FabricBandwidth,
    VgprCount,
    SgprCount,
    LdsUtilization,
}

impl ScalarMetricKind {
    pub const fn code(self) -> u64 {
        match self {
            ScalarMetricKind::L1CacheHitRate => 0,
            ScalarMetricKind::L2CacheHitRate => 1,
            ScalarMetricKind::FabricBandwidth => 2,
            ScalarMetricKind::VgprCount => 3,
            ScalarMetricKind::SgprCount => 4,
            ScalarMetricKind::LdsUtilization => 5,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ScalarMetric {
    pub id: u64,
    pub kind: ScalarMetricKind,
    pub value: f64,
    pub unit: &'static str,
}

impl ScalarMetric {
    pub fn new(id: u64, kind: ScalarMetricKind, value: f64) -> Self {
        let unit = match kind {
            ScalarMetricKind::L1CacheHitRate | ScalarMetricKind::L2CacheHitRate => "%",
            ScalarMetricKind::FabricBandwidth => "GB/s",
            ScalarMetricKind::VgprCount | ScalarMetricKind::SgprCount => "registers",
            ScalarMetricKind::LdsUtilization => "%",
        };
        Self { id, kind, value, unit }
    }
}

impl MemoryUsage for ScalarMetric {
    fn memory_usage_inclusive(&self) -> u64 {
        self.memory_usage_exclusive()
    }

    fn memory_usage_exclusive(&self) -> u64 {
        std::mem::size_of::<Self>() as u64
    }
}

impl PropertyAccess for ScalarMetric {
    fn kind(&self) -> ObjectKind {
        ObjectKind::ScalarMetric
    }

    fn get_u64(&self, p: PropertyId) -> Result<u64> {
        if let Ok(v) = self.get_universal_u64(p) {
            return Ok(v);
        }
        match p.id {
            id if id == prop::KIND => Ok(self.kind.code()),
            _ => Err(ControllerError::InvalidEnum(p.id)),
        }
    }

    fn get_f64(&self, p: PropertyId) -> Result<f64> {
        match p.id {
            id if id == prop::VALUE => Ok(self.value),
            _ => Err(ControllerError::InvalidEnum(p.id)),
        }
    }

    fn get_string(&self, p: PropertyId) -> Result<String> {
        match p.id {
            id if id == prop::UNIT => Ok(self.unit.to_owned()),
            _ => Err(ControllerError::InvalidEnum(p.id)),
        }
    }

    fn get_object(&self, p: PropertyId) -> Result<Handle> {
        Err(ControllerError::InvalidEnum(p.id))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn bandwidth_metric_carries_its_unit() {
        let m = ScalarMetric::new(1, ScalarMetricKind::FabricBandwidth, 512.0);
        assert_eq!(m.unit, "GB/s");
    }

    #[test]
    fn value_and_unit_are_reachable_through_property_dispatch() {
        let m = ScalarMetric::new(1, ScalarMetricKind::L1CacheHitRate, 92.5);
        assert_eq!(m.get_f64(PropertyId::scalar(prop::VALUE)).unwrap(), 92.5);
        assert_eq!(m.get_string(PropertyId::scalar(prop::UNIT)).unwrap(), "%");
    }
}
