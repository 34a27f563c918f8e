// ============================================================================
// memorm Library
// ============================================================================
//
// Deferred write-command graph and transaction executor for an ORM.
//
// Entity code queues commands (insert, update, delete, callbacks, nested
// composites); values that do not exist yet, like a parent's generated
// primary key, flow to dependent commands through execute callbacks. A
// `Transaction` then runs the graph atomically across one or more drivers.
//
// ============================================================================

pub mod command;
pub mod config;
pub mod core;
pub mod lookup;
pub mod storage;
pub mod transaction;

pub use command::{
    CallbackCommand, Command, CommandNode, CommandState, ContextualCommand,
    ContextualDeleteCommand, DeleteCommand, InsertCommand, NullCommand, Stage,
    TransactionalCommand, UpdateCommand,
};
pub use config::TransactionConfig;
pub use core::{Column, DataType, DbError, Fields, Result, Schema, Value, merge_fields};
pub use lookup::{FieldSource, KeyMap, RecordView, RelationKey, forward_primary_key, lookup_key};
pub use storage::{Driver, DriverEvent, DriverId, MemoryDriver, MemoryTable, Table};
pub use transaction::{Persistable, Transaction};

/// Convenient glob import for entity and relation code
pub mod prelude {
    pub use crate::command::{
        CallbackCommand, Command, CommandNode, ContextualCommand, ContextualDeleteCommand,
        DeleteCommand, InsertCommand, NullCommand, TransactionalCommand, UpdateCommand,
    };
    pub use crate::core::{DbError, Fields, Result, Value};
    pub use crate::fields;
    pub use crate::storage::{Driver, Table};
    pub use crate::transaction::{Persistable, Transaction};
}
