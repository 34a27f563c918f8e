// ============================================================================
// Command Graph
// ============================================================================
//
// A command is one unit of deferred persistence work. Commands never look
// each other up: a producer hands values to a consumer through callbacks
// registered on its lifecycle (execute, complete, rollback), capturing the
// consumer handle. Composite commands group leaves and delegate their
// contextual queries to one leading child.
//
// ============================================================================

pub mod callback;
pub mod delete;
pub mod insert;
pub mod lifecycle;
pub mod node;
pub mod state;
pub mod transactional;
pub mod update;

use crate::core::{Fields, Result, Value};
use crate::storage::Driver;
use std::sync::Arc;

pub use callback::CallbackCommand;
pub use delete::{ContextualDeleteCommand, DeleteCommand};
pub use insert::InsertCommand;
pub use lifecycle::{Callback, Hooks, Lifecycle, Stage};
pub use node::{CommandNode, NullCommand};
pub use state::CommandState;
pub use transactional::TransactionalCommand;
pub use update::UpdateCommand;

/// Callback registered through the type-erased [`ContextualCommand::watch`]
pub type ContextCallback = Arc<dyn Fn(&dyn ContextualCommand) -> Result<()> + Send + Sync>;

/// Unit of persistence work with an execute / complete / rollback lifecycle.
pub trait Command: Send + Sync {
    /// Short name used in logs and errors
    fn label(&self) -> &'static str;

    fn state(&self) -> CommandState;

    /// Apply the side effect, then fire the execute callbacks
    fn execute(&self) -> Result<()>;

    /// Called after every driver committed
    fn complete(&self) -> Result<()>;

    /// Called when the batch is aborted after this command executed
    fn rollback(&self) -> Result<()>;

    /// Connection the command writes through, if it touches storage at all
    fn driver(&self) -> Option<Arc<dyn Driver>> {
        None
    }

    fn as_contextual(&self) -> Option<&dyn ContextualCommand> {
        None
    }
}

/// Command carrying a context bag and a promised primary key.
///
/// Composite commands answer these by delegating to their leading child and
/// fail with [`DbError::LeadingNotSet`](crate::DbError::LeadingNotSet) when
/// none was designated; leaf commands never fail the read-only queries.
pub trait ContextualCommand: Send + Sync {
    /// True when there is nothing to write
    fn is_empty(&self) -> Result<bool>;

    fn context(&self) -> Result<Fields>;

    /// Add a value to be merged into the row when the command executes.
    /// Fails once the command has executed.
    fn add_context(&self, name: &str, value: Value) -> Result<()>;

    /// `None` until the command has produced (or been given) its key
    fn primary_key(&self) -> Result<Option<Value>>;

    /// Register a callback without knowing the concrete command type
    fn watch(&self, stage: Stage, callback: ContextCallback) -> Result<()>;
}

/// Implements [`ContextualCommand::watch`] for a leaf whose `inner` holds a
/// `lifecycle`.
macro_rules! watch_via_lifecycle {
    () => {
        fn watch(
            &self,
            stage: $crate::command::Stage,
            callback: $crate::command::ContextCallback,
        ) -> $crate::core::Result<()> {
            self.inner
                .lifecycle
                .hooks()
                .register(stage, ::std::sync::Arc::new(move |command: &Self| callback(command)));
            Ok(())
        }
    };
}

pub(crate) use watch_via_lifecycle;
