//! The query surface a `Table` fetch consumes.

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SortOrder {
    Ascending,
    Descending,
}

/// Everything needed to run one paginated table query. Cheap to clone so a
/// re-fetch (e.g. a changed sort column) can start from the previous
/// `Arguments` and only mutate the field that changed.
#[derive(Debug, Clone, Default)]
pub struct Arguments {
    pub track_ids: Vec<u64>,
    pub op_types: Vec<String>,
    pub start_ts: i64,
    pub end_ts: i64,
    pub where_clause: Option<String>,
    pub filter: Option<String>,
    pub group: bool,
    pub group_columns: Vec<String>,
    pub sort_column: Option<String>,
    pub sort_order: Option<SortOrder>,
    pub start_index: u64,
    pub row_count: u64,
    pub string_table_filters: Vec<u64>,
    pub summary: bool,
}

impl Arguments {
    pub fn paginated(start_index: u64, row_count: u64) -> Self {
        Self {
            start_index,
            row_count,
            ..Default::default()
        }
    }
}
