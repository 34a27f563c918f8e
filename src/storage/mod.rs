// ============================================================================
// Storage Contracts
// ============================================================================
//
// Leaf commands talk to storage only through these two traits. A `Table`
// applies row-level operations; its `Driver` is the physical connection the
// executor opens, commits and rolls back transactions on.
//
// ============================================================================

pub mod change;
pub mod memory;
pub mod table;

use crate::core::{Fields, Result, Value};
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

pub use change::Change;
pub use memory::{DriverEvent, MemoryDriver};
pub use table::MemoryTable;

static NEXT_DRIVER_ID: AtomicU64 = AtomicU64::new(1);

/// Stable identity of one physical connection, used to group commands.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct DriverId(pub u64);

impl DriverId {
    /// Allocate a process-unique driver id
    pub fn next() -> Self {
        DriverId(NEXT_DRIVER_ID.fetch_add(1, Ordering::SeqCst))
    }
}

impl std::fmt::Display for DriverId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "driver_{}", self.0)
    }
}

/// Physical connection capable of transaction control.
pub trait Driver: Send + Sync {
    fn id(&self) -> DriverId;

    fn name(&self) -> &str;

    fn begin_transaction(&self) -> Result<()>;

    fn commit_transaction(&self) -> Result<()>;

    fn rollback_transaction(&self) -> Result<()>;
}

/// Row-level operations against one table.
pub trait Table: Send + Sync {
    fn name(&self) -> &str;

    /// Connection this table lives on
    fn driver(&self) -> Arc<dyn Driver>;

    /// Insert one row, returning the generated (or supplied) primary key
    fn insert(&self, data: &Fields) -> Result<Value>;

    /// Update all rows matching `where_clause`, returning the affected count
    fn update(&self, where_clause: &Fields, values: &Fields) -> Result<usize>;

    /// Delete all rows matching `where_clause`, returning the affected count
    fn delete(&self, where_clause: &Fields) -> Result<usize>;
}
