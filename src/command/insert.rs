use super::lifecycle::{Lifecycle, command_hooks};
use super::{Command, CommandState, ContextualCommand, watch_via_lifecycle};
use crate::core::{Fields, Result, Value, merge_fields};
use crate::storage::{Driver, Table};
use std::sync::{Arc, Mutex, PoisonError};

const LABEL: &str = "insert";

/// Inserts one row; the generated key becomes the command's primary key.
///
/// Context values are merged over `data` at execution time, which is how
/// foreign keys produced by earlier commands reach the row.
#[derive(Clone)]
pub struct InsertCommand {
    inner: Arc<InsertInner>,
}

struct InsertInner {
    table: Arc<dyn Table>,
    data: Fields,
    context: Mutex<Fields>,
    insert_id: Mutex<Option<Value>>,
    lifecycle: Lifecycle<InsertCommand>,
}

impl InsertCommand {
    pub fn new(table: Arc<dyn Table>, data: Fields) -> Self {
        Self {
            inner: Arc::new(InsertInner {
                table,
                data,
                context: Mutex::new(Fields::new()),
                insert_id: Mutex::new(None),
                lifecycle: Lifecycle::new(),
            }),
        }
    }

    pub fn table(&self) -> &Arc<dyn Table> {
        &self.inner.table
    }

    pub fn data(&self) -> &Fields {
        &self.inner.data
    }

    /// Generated key, available once the command has executed
    pub fn insert_id(&self) -> Option<Value> {
        self.inner
            .insert_id
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// Data plus context, as it will be (or was) written
    pub fn row(&self) -> Result<Fields> {
        Ok(merge_fields(&*self.inner.context.lock()?, &self.inner.data))
    }
}

command_hooks!(InsertCommand);

impl std::fmt::Debug for InsertCommand {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("InsertCommand")
            .field("table", &self.inner.table.name())
            .field("data", &self.inner.data)
            .field("state", &self.inner.lifecycle.state())
            .finish()
    }
}

impl Command for InsertCommand {
    fn label(&self) -> &'static str {
        LABEL
    }

    fn state(&self) -> CommandState {
        self.inner.lifecycle.state()
    }

    fn execute(&self) -> Result<()> {
        self.inner.lifecycle.execute(self, LABEL, || {
            let row = self.row()?;
            let id = self.inner.table.insert(&row)?;
            *self.inner.insert_id.lock()? = Some(id);
            Ok(())
        })
    }

    fn complete(&self) -> Result<()> {
        self.inner.lifecycle.complete(self, LABEL)
    }

    fn rollback(&self) -> Result<()> {
        self.inner.lifecycle.rollback(self, LABEL)
    }

    fn driver(&self) -> Option<Arc<dyn Driver>> {
        Some(self.inner.table.driver())
    }

    fn as_contextual(&self) -> Option<&dyn ContextualCommand> {
        Some(self)
    }
}

impl ContextualCommand for InsertCommand {
    fn is_empty(&self) -> Result<bool> {
        Ok(self.inner.data.is_empty() && self.inner.context.lock()?.is_empty())
    }

    fn context(&self) -> Result<Fields> {
        Ok(self.inner.context.lock()?.clone())
    }

    fn add_context(&self, name: &str, value: Value) -> Result<()> {
        self.inner.lifecycle.while_pending(LABEL, "context", || {
            self.inner.context.lock()?.insert(name.to_string(), value);
            Ok(())
        })
    }

    fn primary_key(&self) -> Result<Option<Value>> {
        Ok(self.insert_id())
    }

    watch_via_lifecycle!();
}
