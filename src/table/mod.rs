//! Virtualized, SQL-backed row store with sort/filter/group/export.

pub mod arguments;
pub mod csv;
pub mod histogram;

use crate::cell::DataCell;
use crate::db::{ColumnInfo, TableId};
use crate::error::{ControllerError, Result};
use crate::handle::{Handle, MemoryUsage, ObjectKind, PropertyAccess, PropertyId};
use histogram::Histogram;

pub mod prop {
    use crate::handle::{ObjectKind, PROP_FIRST_RESERVED};

    pub const ID: u32 = ObjectKind::Table.block_first() + PROP_FIRST_RESERVED;
    pub const TABLE_TYPE: u32 = ID + 1;
    pub const NUM_ROWS: u32 = ID + 2;
    pub const NUM_COLUMNS: u32 = ID + 3;
    pub const ROW_OFFSET: u32 = ID + 4;
    pub const SUMMARY: u32 = ID + 5;
    pub const COLUMN_NAME_INDEXED: u32 = ID + 6;
    /// `(row, column)` packed as `index = row * num_columns + column`.
    pub const CELL_INDEXED: u32 = ID + 7;
    pub const BUCKET_DATA_VALUE_INDEXED: u32 = ID + 8;
}

/// Predefined event-table taxonomy; compute mode adds its own enumeration
/// (`crate::compute::tables::ComputeTableKind`).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TableKind {
    Events,
    Samples,
    SearchResults,
    Compute,
}

/// A page of rows already fetched from the Database port, numbered from the
/// server offset (`row_offset`) and never renumbered by the Table itself.
#[derive(Debug, Clone, Default)]
pub struct RowPage {
    pub row_offset: u64,
    pub rows: Vec<Vec<DataCell>>,
}

#[derive(Debug, Clone)]
pub struct Table {
    pub id: TableId,
    pub table_kind: TableKind,
    pub columns: Vec<ColumnInfo>,
    pub page: RowPage,
    pub summary: bool,
    pub histogram: Option<Histogram>,
}

impl Table {
    pub fn new(id: TableId, table_kind: TableKind, columns: Vec<ColumnInfo>) -> Self {
        Self {
            id,
            table_kind,
            columns,
            page: RowPage::default(),
            summary: false,
            histogram: None,
        }
    }

    pub fn num_rows(&self) -> usize {
        self.page.rows.len()
    }

    pub fn num_columns(&self) -> usize {
        self.columns.len()
    }

    /// Replaces the current page; rows keep the server-assigned numbering
    /// carried in `page.row_offset` rather than being renumbered from zero.
    pub fn set_page(&mut self, page: RowPage) {
        self.page = page;
    }

    fn cell_at(&self, row: usize, col: usize) -> Result<&DataCell> {
        self.page
            .rows
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

    /// Renders the current page plus header into CSV text, per the export
    /// format's quoting rules.
    pub fn to_csv(&self) -> String {
        let header: Vec<String> = self.columns.iter().map(|c| c.name.clone()).collect();
        let rows: Vec<Vec<String>> = self
            .page
            .rows
            .iter()
            .map(|row| row.iter().map(cell_to_csv_field).collect())
            .collect();
        csv::render(&header, &rows)
    }

    /// Renders the current page as a JSON array of row objects keyed by
    /// column name, for callers that want structured rather than flat text.
    pub fn to_json(&self) -> serde_json::Value {
        let rows: Vec<serde_json::Value> = self
            .page
            .rows
            .iter()
            .map(|row| {
                let mut obj = serde_json::Map::new();
                for (col, cell) in self.columns.iter().zip(row.iter()) {
                    obj.insert(col.name.clone(), cell_to_json_value(cell));
                }
                serde_json::Value::Object(obj)
            })
            .collect();
        serde_json::Value::Array(rows)
    }
}

fn cell_to_csv_field(cell: &DataCell) -> String {
    match cell {
        DataCell::U64(v) => v.to_string(),
        DataCell::F64(v) => v.to_string(),
        DataCell::Str(v) => v.clone(),
        DataCell::Handle(h) => format!("{:?}:{}", h.kind, h.id),
    }
}

fn cell_to_json_value(cell: &DataCell) -> serde_json::Value {
    match cell {
        DataCell::U64(v) => serde_json::Value::from(*v),
        DataCell::F64(v) => serde_json::Value::from(*v),
        DataCell::Str(v) => serde_json::Value::from(v.clone()),
        DataCell::Handle(h) => serde_json::Value::from(format!("{:?}:{}", h.kind, h.id)),
    }
}

impl MemoryUsage for Table {
    fn memory_usage_inclusive(&self) -> u64 {
        self.memory_usage_exclusive()
    }

    fn memory_usage_exclusive(&self) -> u64 {
        let rows_bytes = self.page.rows.len() * self.num_columns() * std::mem::size_of::<DataCell>();
        (std::mem::size_of::<Self>() + rows_bytes) as u64
    }
}

impl PropertyAccess for Table {
    fn kind(&self) -> ObjectKind {
        ObjectKind::Table
    }

    fn get_u64(&self, p: PropertyId) -> Result<u64> {
        if let Ok(v) = self.get_universal_u64(p) {
            return Ok(v);
        }
        match p.id {
            id if id == prop::ID => Ok(self.id),
            id if id == prop::TABLE_TYPE => Ok(self.table_kind as u64),
            id if id == prop::NUM_ROWS => Ok(self.num_rows() as u64),
            id if id == prop::NUM_COLUMNS => Ok(self.num_columns() as u64),
            id if id == prop::ROW_OFFSET => Ok(self.page.row_offset),
            id if id == prop::SUMMARY => Ok(self.summary as u64),
            id if id == prop::CELL_INDEXED => {
                let (row, col) = self.decode_cell_index(p.index);
                self.cell_at(row, col)?.as_u64().ok_or(ControllerError::InvalidType)
            }
            id if id == prop::BUCKET_DATA_VALUE_INDEXED => self
                .histogram
                .as_ref()
                .ok_or(ControllerError::NotLoaded)?
                .bucket_count_at(p.index),
            _ => Err(ControllerError::InvalidEnum(p.id)),
        }
    }

    fn get_f64(&self, p: PropertyId) -> Result<f64> {
        if p.id == prop::CELL_INDEXED {
            let (row, col) = self.decode_cell_index(p.index);
            return self.cell_at(row, col)?.as_f64().ok_or(ControllerError::InvalidType);
        }
        Err(ControllerError::InvalidEnum(p.id))
    }

    fn get_string(&self, p: PropertyId) -> Result<String> {
        match p.id {
            id if id == prop::COLUMN_NAME_INDEXED => self
                .columns
                .get(p.index as usize)
                .map(|c| c.name.clone())
                .ok_or(ControllerError::OutOfRange {
                    index: p.index,
                    num_entries: self.columns.len() as u64,
                }),
            id if id == prop::CELL_INDEXED => {
                let (row, col) = self.decode_cell_index(p.index);
                self.cell_at(row, col)?
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
            return self.cell_at(row, col)?.as_handle().ok_or(ControllerError::InvalidType);
        }
        Err(ControllerError::InvalidEnum(p.id))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::ColumnPrimitive;

    fn sample_table() -> Table {
        let columns = vec![
            ColumnInfo { name: "name".to_owned(), primitive: ColumnPrimitive::Str },
            ColumnInfo { name: "duration".to_owned(), primitive: ColumnPrimitive::U64 },
        ];
        let mut t = Table::new(1, TableKind::Events, columns);
        t.set_page(RowPage {
            row_offset: 100,
            rows: vec![
                vec![DataCell::Str("a".to_owned()), DataCell::U64(5)],
                vec![DataCell::Str("b".to_owned()), DataCell::U64(7)],
            ],
        });
        t
    }

    #[test]
    fn rows_keep_server_assigned_offset() {
        let t = sample_table();
        assert_eq!(t.page.row_offset, 100);
    }

    #[test]
    fn cell_indexed_packs_row_and_column() {
        let t = sample_table();
        let packed = 1 * t.num_columns() as u64 + 1;
        assert_eq!(t.get_u64(PropertyId::indexed(prop::CELL_INDEXED, packed)).unwrap(), 7);
    }

    #[test]
    fn csv_export_quotes_header_and_rows_consistently() {
        let t = sample_table();
        let csv = t.to_csv();
        assert_eq!(csv, "name,duration\na,5\nb,7\n");
    }

    #[test]
    fn json_export_keys_each_row_by_column_name() {
        let t = sample_table();
        let json = t.to_json();
        let rows = json.as_array().unwrap();
        assert_eq!(rows.len(), 2);
        assert_eq!(rows[0]["name"], "a");
        assert_eq!(rows[0]["duration"], 5);
        assert_eq!(rows[1]["name"], "b");
        assert_eq!(rows[1]["duration"], 7);
    }
}
