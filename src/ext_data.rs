//! Schema-free key/value attachments on events, tracks, processors, etc.

use crate::cell::DataCell;
use crate::error::{ControllerError, Result};
use crate::handle::{Handle, MemoryUsage, ObjectKind, PropertyAccess, PropertyId};
use crate::string_table::StrIndex;

pub mod prop {
    use crate::handle::{ObjectKind, PROP_FIRST_RESERVED};

    pub const CATEGORY_STR_INDEX: u32 = ObjectKind::ExtData.block_first() + PROP_FIRST_RESERVED;
    pub const NAME_STR_INDEX: u32 = CATEGORY_STR_INDEX + 1;
    pub const VALUE_U64: u32 = CATEGORY_STR_INDEX + 2;
    pub const VALUE_F64: u32 = CATEGORY_STR_INDEX + 3;
    pub const VALUE_STR: u32 = CATEGORY_STR_INDEX + 4;
    pub const CATEGORY_ENUM: u32 = CATEGORY_STR_INDEX + 5;
    /// `ArgumentData`-only properties, laid out in its own block.
    pub const POSITION: u32 = ObjectKind::ArgumentData.block_first() + PROP_FIRST_RESERVED;
    pub const ARG_TYPE: u32 = POSITION + 1;
}

/// Which higher-level bucket an `ExtData` entry belongs to; mirrors a
/// closed enum in the source trace format rather than a free-text category.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExtDataCategory {
    Metadata = 0,
    Argument = 1,
    Annotation = 2,
    Counter = 3,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ExtData {
    pub category_str_index: StrIndex,
    pub name_str_index: StrIndex,
    pub value: DataCell,
    pub category_enum: ExtDataCategory,
}

impl MemoryUsage for ExtData {
    fn memory_usage_inclusive(&self) -> u64 {
        self.memory_usage_exclusive()
    }

    fn memory_usage_exclusive(&self) -> u64 {
        std::mem::size_of::<Self>() as u64
    }
}

impl PropertyAccess for ExtData {
    fn kind(&self) -> ObjectKind {
        ObjectKind::ExtData
    }

    fn get_u64(&self, p: PropertyId) -> Result<u64> {
        if let Ok(v) = self.get_universal_u64(p) {
            return Ok(v);
        }
        match p.id {
            id if id == prop::CATEGORY_STR_INDEX => Ok(self.category_str_index),
            id if id == prop::NAME_STR_INDEX => Ok(self.name_str_index),
            id if id == prop::VALUE_U64 => self.value.as_u64().ok_or(ControllerError::InvalidType),
            id if id == prop::CATEGORY_ENUM => Ok(self.category_enum as u64),
            _ => Err(ControllerError::InvalidEnum(p.id)),
        }
    }

    fn get_f64(&self, p: PropertyId) -> Result<f64> {
        if p.id == prop::VALUE_F64 {
            return self.value.as_f64().ok_or(ControllerError::InvalidType);
        }
        Err(ControllerError::InvalidEnum(p.id))
    }

    fn get_string(&self, p: PropertyId) -> Result<String> {
        if p.id == prop::VALUE_STR {
            return self
                .value
                .as_str()
                .map(str::to_owned)
                .ok_or(ControllerError::InvalidType);
        }
        Err(ControllerError::InvalidEnum(p.id))
    }

    fn get_object(&self, p: PropertyId) -> Result<Handle> {
        Err(ControllerError::InvalidEnum(p.id))
    }
}

/// `ExtData` carrying the two extra fields that distinguish a call argument
/// from arbitrary extended data, with its own object-kind tag so the UI can
/// tell them apart without inspecting `category_enum`.
#[derive(Debug, Clone, PartialEq)]
pub struct ArgumentData {
    pub ext: ExtData,
    pub position: u32,
    pub arg_type: StrIndex,
}

impl MemoryUsage for ArgumentData {
    fn memory_usage_inclusive(&self) -> u64 {
        self.memory_usage_exclusive()
    }

    fn memory_usage_exclusive(&self) -> u64 {
        std::mem::size_of::<Self>() as u64
    }
}

impl PropertyAccess for ArgumentData {
    fn kind(&self) -> ObjectKind {
        ObjectKind::ArgumentData
    }

    fn get_u64(&self, p: PropertyId) -> Result<u64> {
        match p.id {
            id if id == prop::POSITION => Ok(self.position as u64),
            id if id == prop::ARG_TYPE => Ok(self.arg_type),
            _ => self.ext.get_u64(p),
        }
    }

    fn get_f64(&self, p: PropertyId) -> Result<f64> {
        self.ext.get_f64(p)
    }

    fn get_string(&self, p: PropertyId) -> Result<String> {
        self.ext.get_string(p)
    }

    fn get_object(&self, p: PropertyId) -> Result<Handle> {
        self.ext.get_object(p)
    }
}
