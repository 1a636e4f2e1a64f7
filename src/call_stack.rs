//! Call stack entries, fetched on demand per event.

use crate::error::{ControllerError, Result};
use crate::handle::{Handle, MemoryUsage, ObjectKind, PropertyAccess, PropertyId};

pub mod prop {
    use crate::handle::{ObjectKind, PROP_FIRST_RESERVED};

    pub const FILE: u32 = ObjectKind::CallStack.block_first() + PROP_FIRST_RESERVED;
    pub const PC: u32 = FILE + 1;
    pub const SYMBOL: u32 = FILE + 2;
    pub const LINE_NAME: u32 = FILE + 3;
    pub const LINE_ADDRESS: u32 = FILE + 4;
}

/// One stack frame. Parsed from two JSON blobs in the trace: `symbol`
/// (`file`, `pc`, `name`) and `codeline` (`line_name`, `line_address`).
#[derive(Debug, Clone, Default, PartialEq)]
pub struct CallStackEntry {
    pub file: String,
    pub pc: u64,
    pub symbol: String,
    pub line_name: String,
    pub line_address: u64,
}

impl CallStackEntry {
    /// Builds an entry from the two source blobs' fields; returns `None` if
    /// every field ended up empty (a `CallStack` entry is only emitted when
    /// at least one field is non-empty).
    pub fn from_parsed(
        file: String,
        pc: u64,
        symbol: String,
        line_name: String,
        line_address: u64,
    ) -> Option<Self> {
        if file.is_empty() && pc == 0 && symbol.is_empty() && line_name.is_empty() && line_address == 0
        {
            return None;
        }
        Some(Self {
            file,
            pc,
            symbol,
            line_name,
            line_address,
        })
    }
}

impl MemoryUsage for CallStackEntry {
    fn memory_usage_inclusive(&self) -> u64 {
        self.memory_usage_exclusive()
    }

    fn memory_usage_exclusive(&self) -> u64 {
        (std::mem::size_of::<Self>() + self.file.len() + self.symbol.len() + self.line_name.len())
            as u64
    }
}

impl PropertyAccess for CallStackEntry {
    fn kind(&self) -> ObjectKind {
        ObjectKind::CallStack
    }

    fn get_u64(&self, p: PropertyId) -> Result<u64> {
        if let Ok(v) = self.get_universal_u64(p) {
            return Ok(v);
        }
        match p.id {
            id if id == prop::PC => Ok(self.pc),
            id if id == prop::LINE_ADDRESS => Ok(self.line_address),
            _ => Err(ControllerError::InvalidEnum(p.id)),
        }
    }

    fn get_f64(&self, p: PropertyId) -> Result<f64> {
        Err(ControllerError::InvalidEnum(p.id))
    }

    fn get_string(&self, p: PropertyId) -> Result<String> {
        match p.id {
            id if id == prop::FILE => Ok(self.file.clone()),
            id if id == prop::SYMBOL => Ok(self.symbol.clone()),
            id if id == prop::LINE_NAME => Ok(self.line_name.clone()),
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
    fn all_empty_fields_yield_no_entry() {
        assert!(CallStackEntry::from_parsed(String::new(), 0, String::new(), String::new(), 0)
            .is_none());
    }

    #[test]
    fn one_non_empty_field_is_enough() {
        assert!(CallStackEntry::from_parsed(
            String::new(),
            0,
            "main".to_owned(),
            String::new(),
            0
        )
        .is_some());
    }
}
