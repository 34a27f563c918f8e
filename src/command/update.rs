use super::lifecycle::{Lifecycle, command_hooks};
use super::{Command, CommandState, ContextualCommand, watch_via_lifecycle};
use crate::core::{Fields, Result, Value, merge_fields};
use crate::storage::{Driver, Table};
use std::sync::{Arc, Mutex, PoisonError};

const LABEL: &str = "update";

/// Updates the rows matching a where clause.
///
/// An update with neither values nor context is a no-op: it never touches
/// storage and reports no driver. The where clause and primary key stay
/// writable until execution, so an insert running earlier in the same batch
/// can point this update at the key it just generated.
#[derive(Clone)]
pub struct UpdateCommand {
    inner: Arc<UpdateInner>,
}

struct UpdateInner {
    table: Arc<dyn Table>,
    values: Fields,
    where_clause: Mutex<Fields>,
    context: Mutex<Fields>,
    primary_key: Mutex<Option<Value>>,
    affected: Mutex<Option<usize>>,
    lifecycle: Lifecycle<UpdateCommand>,
}

impl UpdateCommand {
    pub fn new(table: Arc<dyn Table>, where_clause: Fields, values: Fields) -> Self {
        Self::with_primary_key(table, where_clause, values, None)
    }

    pub fn with_primary_key(
        table: Arc<dyn Table>,
        where_clause: Fields,
        values: Fields,
        primary_key: Option<Value>,
    ) -> Self {
        Self {
            inner: Arc::new(UpdateInner {
                table,
                values,
                where_clause: Mutex::new(where_clause),
                context: Mutex::new(Fields::new()),
                primary_key: Mutex::new(primary_key),
                affected: Mutex::new(None),
                lifecycle: Lifecycle::new(),
            }),
        }
    }

    pub fn table(&self) -> &Arc<dyn Table> {
        &self.inner.table
    }

    pub fn values(&self) -> &Fields {
        &self.inner.values
    }

    pub fn where_clause(&self) -> Result<Fields> {
        Ok(self.inner.where_clause.lock()?.clone())
    }

    pub fn set_where(&self, where_clause: Fields) -> Result<()> {
        self.inner.lifecycle.while_pending(LABEL, "where clause", || {
            *self.inner.where_clause.lock()? = where_clause;
            Ok(())
        })
    }

    pub fn set_primary_key(&self, primary_key: Option<Value>) -> Result<()> {
        self.inner.lifecycle.while_pending(LABEL, "primary key", || {
            *self.inner.primary_key.lock()? = primary_key;
            Ok(())
        })
    }

    /// Rows touched by the executed update; `None` before execution or when
    /// the update was a no-op
    pub fn affected_rows(&self) -> Option<usize> {
        *self
            .inner
            .affected
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
    }

    fn has_changes(&self) -> Result<bool> {
        Ok(!self.inner.values.is_empty() || !self.inner.context.lock()?.is_empty())
    }
}

command_hooks!(UpdateCommand);

impl std::fmt::Debug for UpdateCommand {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("UpdateCommand")
            .field("table", &self.inner.table.name())
            .field("values", &self.inner.values)
            .field("state", &self.inner.lifecycle.state())
            .finish()
    }
}

impl Command for UpdateCommand {
    fn label(&self) -> &'static str {
        LABEL
    }

    fn state(&self) -> CommandState {
        self.inner.lifecycle.state()
    }

    fn execute(&self) -> Result<()> {
        self.inner.lifecycle.execute(self, LABEL, || {
            if !self.has_changes()? {
                return Ok(());
            }

            let values = merge_fields(&*self.inner.context.lock()?, &self.inner.values);
            let where_clause = self.inner.where_clause.lock()?.clone();
            let affected = self.inner.table.update(&where_clause, &values)?;
            *self.inner.affected.lock()? = Some(affected);
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
        match self.has_changes() {
            Ok(true) => Some(self.inner.table.driver()),
            _ => None,
        }
    }

    fn as_contextual(&self) -> Option<&dyn ContextualCommand> {
        Some(self)
    }
}

impl ContextualCommand for UpdateCommand {
    fn is_empty(&self) -> Result<bool> {
        Ok(!self.has_changes()?)
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
        Ok(self.inner.primary_key.lock()?.clone())
    }

    watch_via_lifecycle!();
}
