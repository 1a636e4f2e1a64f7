//! Flow links between events, e.g. a kernel launch joined
//! to its execution on a device queue.

use crate::arena::EventId;
use crate::error::{ControllerError, Result};
use crate::handle::{Handle, MemoryUsage, ObjectKind, PropertyAccess, PropertyId};
use crate::string_table::StrIndex;

pub mod prop {
    use crate::handle::{ObjectKind, PROP_FIRST_RESERVED};

    pub const ID: u32 = ObjectKind::FlowControl.block_first() + PROP_FIRST_RESERVED;
    pub const START_TS: u32 = ID + 1;
    pub const END_TS: u32 = ID + 2;
    pub const TRACK_ID: u32 = ID + 3;
    pub const LEVEL: u32 = ID + 4;
    pub const DIRECTION: u32 = ID + 5;
    pub const NAME_STR_INDEX: u32 = ID + 6;
    pub const CATEGORY_STR_INDEX: u32 = ID + 7;
}

/// Launch operations are outgoing (0); everything else is incoming (1).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FlowDirection {
    Out = 0,
    In = 1,
}

impl FlowDirection {
    pub fn from_op_type(op_type: &str) -> Self {
        if op_type.eq_ignore_ascii_case("launch") {
            FlowDirection::Out
        } else {
            FlowDirection::In
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct FlowControl {
    pub id: EventId,
    pub start_ts: i64,
    pub end_ts: i64,
    pub track_id: u64,
    pub level: u8,
    pub direction: FlowDirection,
    pub name_str_index: StrIndex,
    pub category_str_index: StrIndex,
}

impl MemoryUsage for FlowControl {
    fn memory_usage_inclusive(&self) -> u64 {
        self.memory_usage_exclusive()
    }

    fn memory_usage_exclusive(&self) -> u64 {
        std::mem::size_of::<Self>() as u64
    }
}

impl PropertyAccess for FlowControl {
    fn kind(&self) -> ObjectKind {
        ObjectKind::FlowControl
    }

    fn get_u64(&self, p: PropertyId) -> Result<u64> {
        if let Ok(v) = self.get_universal_u64(p) {
            return Ok(v);
        }
        match p.id {
            id if id == prop::ID => Ok(self.id),
            id if id == prop::START_TS => Ok(self.start_ts as u64),
            id if id == prop::END_TS => Ok(self.end_ts as u64),
            id if id == prop::TRACK_ID => Ok(self.track_id),
            id if id == prop::LEVEL => Ok(self.level as u64),
            id if id == prop::DIRECTION => Ok(self.direction as u64),
            id if id == prop::NAME_STR_INDEX => Ok(self.name_str_index),
            id if id == prop::CATEGORY_STR_INDEX => Ok(self.category_str_index),
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
        Err(ControllerError::InvalidEnum(p.id))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn launch_is_outgoing() {
        assert_eq!(FlowDirection::from_op_type("launch"), FlowDirection::Out);
    }

    #[test]
    fn anything_else_is_incoming() {
        assert_eq!(FlowDirection::from_op_type("signal"), FlowDirection::In);
        assert_eq!(FlowDirection::from_op_type("wait"), FlowDirection::In);
    }
}
