//! The fixed enumeration of compute-mode tables.

use super::ComputeCell;
use crate::error::{ControllerError, Result};
use crate::handle::{Handle, MemoryUsage, ObjectKind, PropertyAccess, PropertyId};

pub mod prop {
    use crate::handle::{ObjectKind, PROP_FIRST_RESERVED};

    pub const KIND: u32 = ObjectKind::ComputeTable.block_first() + PROP_FIRST_RESERVED;
    pub const SUBSYSTEM: u32 = KIND + 1;
    pub const TITLE: u32 = KIND + 2;
    pub const NUM_ROWS: u32 = KIND + 3;
    pub const NUM_COLUMNS: u32 = KIND + 4;
    pub const COLUMN_NAME_INDEXED: u32 = KIND + 5;
    /// `(row, column)` packed as `index = row * num_columns + column`.
    pub const CELL_INDEXED: u32 = KIND + 6;
    pub const CELL_COLORIZE_INDEXED: u32 = KIND + 7;
    pub const CELL_HIGHLIGHT_INDEXED: u32 = KIND + 8;
}

/// One entry per named GPU subsystem a block-level-stats table covers.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GpuSubsystem {
    L1Cache,
    L2Cache,
    Lds,
    VectorAlu,
    ScalarAlu,
    Fabric,
}

impl GpuSubsystem {
    pub const fn code(self) -> u64 {
        match self {
            GpuSubsystem::L1Cache => 0,
            GpuSubsystem::L2Cache => 1,
            GpuSubsystem::Lds => 2,
            GpuSubsystem::VectorAlu => 3,
            GpuSubsystem::ScalarAlu => 4,
            GpuSubsystem::Fabric => 5,
        }
    }
}

/// The fixed table enumeration; `BlockLevelStats` is parametrized by
/// subsystem rather than being one variant per subsystem.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ComputeTableKind {
    KernelList,
    DispatchList,
    SysInfo,
    SpeedOfLight,
    BlockLevelStats(GpuSubsystem),
    RooflineBenchmark,
    RooflineCounter,
}

impl ComputeTableKind {
    pub const fn code(self) -> u64 {
        match self {
            ComputeTableKind::KernelList => 0,
            ComputeTableKind::DispatchList => 1,
            ComputeTableKind::SysInfo => 2,
            ComputeTableKind::SpeedOfLight => 3,
            ComputeTableKind::BlockLevelStats(_) => 4,
            ComputeTableKind::RooflineBenchmark => 5,
            ComputeTableKind::RooflineCounter => 6,
        }
    }

    pub const fn subsystem(self) -> Option<GpuSubsystem> {
        match self {
            ComputeTableKind::BlockLevelStats(s) => Some(s),
            _ => None,
        }
    }
}

#[derive(Debug, Clone)]
pub struct ComputeTable {
    pub id: u64,
    pub kind: ComputeTableKind,
    pub title: String,
    pub columns: Vec<String>,
    pub rows: Vec<Vec<ComputeCell>>,
}

impl ComputeTable {
    pub fn new(id: u64, kind: ComputeTableKind, title: impl Into<String>, columns: Vec<String>) -> Self {
        Self {
            id,
            kind,
            title: title.into(),
            columns,
            rows: Vec::new(),
        }
    }

    pub fn num_rows(&self) -> usize {
        self.rows.len()
    }

    pub fn num_columns(&self) -> usize {
        self.columns.len()
    }

    fn cell_at(&self, row: usize, col: usize) -> Result<&ComputeCell> {
        self.rows
            .get(row)
            .and_then(|r| r.get(col))
            .ok_or(ControllerError::OutOfRange {
                index: (row * self.num_columns().max(1) + col) as u64,
                num_entries: (self.num_rows() * self.num_columns()) as u64,
            })
    }

    fn decode_cell_index(&self, packed: u64) -> (usize, usize) {
        let cols = self.num_columns().max(1) as u64;
        ((packed / cols) as usize, (packed % cols) as usize)
    }
}

impl MemoryUsage for ComputeTable {
    fn memory_usage_inclusive(&self) -> u64 {
        self.memory_usage_exclusive()
    }

    fn memory_usage_exclusive(&self) -> u64 {
        let rows_bytes = self.rows.len() * self.num_columns() * std::mem::size_of::<ComputeCell>();
        (std::mem::size_of::<Self>() + rows_bytes) as u64
    }
}

impl PropertyAccess for ComputeTable {
    fn kind(&self) -> ObjectKind {
        ObjectKind::ComputeTable
    }

    fn get_u64(&self, p: PropertyId) -> Result<u64> {
        if let Ok(v) = self.get_universal_u64(p) {
            return Ok(v);
        }
        match p.id {
            id if id == prop::KIND => Ok(self.kind.code()),
            id if id == prop::SUBSYSTEM => self
                .kind
                .subsystem()
                .map(|s| s.code())
                .ok_or(ControllerError::InvalidType),
            id if id == prop::NUM_ROWS => Ok(self.num_rows() as u64),
            id if id == prop::NUM_COLUMNS => Ok(self.num_columns() as u64),
            id if id == prop::CELL_INDEXED => {
                let (row, col) = self.decode_cell_index(p.index);
                self.cell_at(row, col)?.value.as_u64().ok_or(ControllerError::InvalidType)
            }
            id if id == prop::CELL_COLORIZE_INDEXED => {
                let (row, col) = self.decode_cell_index(p.index);
                Ok(self.cell_at(row, col)?.colorize as u64)
            }
            id if id == prop::CELL_HIGHLIGHT_INDEXED => {
                let (row, col) = self.decode_cell_index(p.index);
                Ok(self.cell_at(row, col)?.highlight as u64)
            }
            _ => Err(ControllerError::InvalidEnum(p.id)),
        }
    }

    fn get_f64(&self, p: PropertyId) -> Result<f64> {
        if p.id == prop::CELL_INDEXED {
            let (row, col) = self.decode_cell_index(p.index);
            return self.cell_at(row, col)?.value.as_f64().ok_or(ControllerError::InvalidType);
        }
        Err(ControllerError::InvalidEnum(p.id))
    }

    fn get_string(&self, p: PropertyId) -> Result<String> {
        match p.id {
            id if id == prop::TITLE => Ok(self.title.clone()),
            id if id == prop::COLUMN_NAME_INDEXED => self
                .columns
                .get(p.index as usize)
                .cloned()
                .ok_or(ControllerError::OutOfRange {
                    index: p.index,
                    num_entries: self.columns.len() as u64,
                }),
            id if id == prop::CELL_INDEXED => {
                let (row, col) = self.decode_cell_index(p.index);
                self.cell_at(row, col)?
                    .value
                    .as_str()
                    .map(str::to_owned)
                    .ok_or(ControllerError::InvalidType)
            }
            _ => Err(ControllerError::InvalidEnum(p.id)),
        }
    }

    fn get_object(&self, p: PropertyId) -> Result<Handle> {
        if p.id == prop::CELL_INDEXED {
            let (row, col) = self.decode_cell_index(p.index);
            return self.cell_at(row, col)?.value.as_handle().ok_or(ControllerError::InvalidType);
        }
        Err(ControllerError::InvalidEnum(p.id))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cell::DataCell;

    #[test]
    fn a_fresh_table_has_no_rows() {
        let t = ComputeTable::new(1, ComputeTableKind::KernelList, "Kernels", vec!["name".into()]);
        assert!(t.rows.is_empty());
    }

    #[test]
    fn block_level_stats_carries_its_subsystem() {
        let t = ComputeTable::new(
            1,
            ComputeTableKind::BlockLevelStats(GpuSubsystem::L2Cache),
            "L2 Cache",
            vec!["metric".into(), "value".into()],
        );
        assert_eq!(t.kind.subsystem(), Some(GpuSubsystem::L2Cache));
    }

    #[test]
    fn cell_indexed_packs_row_and_column() {
        let mut t = ComputeTable::new(1, ComputeTableKind::KernelList, "Kernels", vec!["a".into(), "b".into()]);
        t.rows.push(vec![ComputeCell::plain(DataCell::U64(1)), ComputeCell::plain(DataCell::U64(2))]);
        t.rows.push(vec![ComputeCell::plain(DataCell::U64(3)), ComputeCell::plain(DataCell::U64(4))]);
        let packed = 1 * t.num_columns() as u64 + 1;
        assert_eq!(t.get_u64(PropertyId::indexed(prop::CELL_INDEXED, packed)).unwrap(), 4);
    }

    #[test]
    fn subsystem_property_is_invalid_type_for_non_block_level_tables() {
        let t = ComputeTable::new(1, ComputeTableKind::KernelList, "Kernels", vec!["name".into()]);
        assert_eq!(t.get_u64(PropertyId::scalar(prop::SUBSYSTEM)), Err(ControllerError::InvalidType));
    }
}
