// ============================================================================
// Transaction Change Tracking
// ============================================================================
//
// Every write made while a memory driver transaction is open is recorded as
// a Change carrying enough of the previous state to revert it. Rollback
// replays the log backwards; commit simply drops it.
//
// ============================================================================

use crate::core::Fields;

/// A single reversible row change
#[derive(Debug, Clone, PartialEq)]
pub enum Change {
    /// A row was inserted under `row_id`
    InsertRow { table: String, row_id: usize },

    /// A row was overwritten; `old_row` is its prior content
    UpdateRow {
        table: String,
        row_id: usize,
        old_row: Fields,
    },

    /// A row was removed; `old_row` is its prior content
    DeleteRow {
        table: String,
        row_id: usize,
        old_row: Fields,
    },
}

impl Change {
    /// Get the table name affected by this change
    pub fn table_name(&self) -> &str {
        match self {
            Change::InsertRow { table, .. } => table,
            Change::UpdateRow { table, .. } => table,
            Change::DeleteRow { table, .. } => table,
        }
    }

    pub fn row_id(&self) -> usize {
        match self {
            Change::InsertRow { row_id, .. }
            | Change::UpdateRow { row_id, .. }
            | Change::DeleteRow { row_id, .. } => *row_id,
        }
    }
}
