use super::lifecycle::{Lifecycle, command_hooks};
use super::{Command, CommandState, ContextualCommand, watch_via_lifecycle};
use crate::core::{Fields, Result, Value, merge_fields};
use crate::storage::{Driver, Table};
use std::sync::{Arc, Mutex, PoisonError};

/// Deletes the rows matching a where clause.
///
/// A delete without any criteria is treated as "nothing identified yet" and
/// skips storage rather than wiping the table.
#[derive(Clone)]
pub struct DeleteCommand {
    inner: Arc<DeleteInner>,
}

struct DeleteInner {
    table: Arc<dyn Table>,
    where_clause: Mutex<Fields>,
    affected: Mutex<Option<usize>>,
    lifecycle: Lifecycle<DeleteCommand>,
}

impl DeleteCommand {
    const LABEL: &'static str = "delete";

    pub fn new(table: Arc<dyn Table>, where_clause: Fields) -> Self {
        Self {
            inner: Arc::new(DeleteInner {
                table,
                where_clause: Mutex::new(where_clause),
                affected: Mutex::new(None),
                lifecycle: Lifecycle::new(),
            }),
        }
    }

    pub fn table(&self) -> &Arc<dyn Table> {
        &self.inner.table
    }

    pub fn where_clause(&self) -> Result<Fields> {
        Ok(self.inner.where_clause.lock()?.clone())
    }

    pub fn set_where(&self, where_clause: Fields) -> Result<()> {
        self.inner
            .lifecycle
            .while_pending(Self::LABEL, "where clause", || {
                *self.inner.where_clause.lock()? = where_clause;
                Ok(())
            })
    }

    pub fn affected_rows(&self) -> Option<usize> {
        *self
            .inner
            .affected
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
    }

    fn has_criteria(&self) -> bool {
        !self
            .inner
            .where_clause
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .is_empty()
    }
}

command_hooks!(DeleteCommand);

impl std::fmt::Debug for DeleteCommand {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DeleteCommand")
            .field("table", &self.inner.table.name())
            .field("state", &self.inner.lifecycle.state())
            .finish()
    }
}

impl Command for DeleteCommand {
    fn label(&self) -> &'static str {
        Self::LABEL
    }

    fn state(&self) -> CommandState {
        self.inner.lifecycle.state()
    }

    fn execute(&self) -> Result<()> {
        self.inner.lifecycle.execute(self, Self::LABEL, || {
            let where_clause = self.inner.where_clause.lock()?.clone();
            if where_clause.is_empty() {
                return Ok(());
            }

            let affected = self.inner.table.delete(&where_clause)?;
            *self.inner.affected.lock()? = Some(affected);
            Ok(())
        })
    }

    fn complete(&self) -> Result<()> {
        self.inner.lifecycle.complete(self, Self::LABEL)
    }

    fn rollback(&self) -> Result<()> {
        self.inner.lifecycle.rollback(self, Self::LABEL)
    }

    fn driver(&self) -> Option<Arc<dyn Driver>> {
        self.has_criteria().then(|| self.inner.table.driver())
    }
}

/// Delete whose target may only be known once a dependency has executed.
///
/// The effective criteria are the context merged over the explicit where
/// clause; with both empty the command is a no-op.
#[derive(Clone)]
pub struct ContextualDeleteCommand {
    inner: Arc<ContextualDeleteInner>,
}

struct ContextualDeleteInner {
    table: Arc<dyn Table>,
    where_clause: Mutex<Fields>,
    context: Mutex<Fields>,
    primary_key: Mutex<Option<Value>>,
    affected: Mutex<Option<usize>>,
    lifecycle: Lifecycle<ContextualDeleteCommand>,
}

impl ContextualDeleteCommand {
    const LABEL: &'static str = "contextual_delete";

    pub fn new(table: Arc<dyn Table>, where_clause: Fields) -> Self {
        Self {
            inner: Arc::new(ContextualDeleteInner {
                table,
                where_clause: Mutex::new(where_clause),
                context: Mutex::new(Fields::new()),
                primary_key: Mutex::new(None),
                affected: Mutex::new(None),
                lifecycle: Lifecycle::new(),
            }),
        }
    }

    pub fn table(&self) -> &Arc<dyn Table> {
        &self.inner.table
    }

    pub fn where_clause(&self) -> Result<Fields> {
        Ok(self.inner.where_clause.lock()?.clone())
    }

    pub fn set_where(&self, where_clause: Fields) -> Result<()> {
        self.inner
            .lifecycle
            .while_pending(Self::LABEL, "where clause", || {
                *self.inner.where_clause.lock()? = where_clause;
                Ok(())
            })
    }

    pub fn set_primary_key(&self, primary_key: Option<Value>) -> Result<()> {
        self.inner
            .lifecycle
            .while_pending(Self::LABEL, "primary key", || {
                *self.inner.primary_key.lock()? = primary_key;
                Ok(())
            })
    }

    pub fn affected_rows(&self) -> Option<usize> {
        *self
            .inner
            .affected
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
    }

    fn criteria(&self) -> Result<Fields> {
        Ok(merge_fields(
            &*self.inner.context.lock()?,
            &*self.inner.where_clause.lock()?,
        ))
    }
}

command_hooks!(ContextualDeleteCommand);

impl std::fmt::Debug for ContextualDeleteCommand {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ContextualDeleteCommand")
            .field("table", &self.inner.table.name())
            .field("state", &self.inner.lifecycle.state())
            .finish()
    }
}

impl Command for ContextualDeleteCommand {
    fn label(&self) -> &'static str {
        Self::LABEL
    }

    fn state(&self) -> CommandState {
        self.inner.lifecycle.state()
    }

    fn execute(&self) -> Result<()> {
        self.inner.lifecycle.execute(self, Self::LABEL, || {
            let criteria = self.criteria()?;
            if criteria.is_empty() {
                return Ok(());
            }

            let affected = self.inner.table.delete(&criteria)?;
            *self.inner.affected.lock()? = Some(affected);
            Ok(())
        })
    }

    fn complete(&self) -> Result<()> {
        self.inner.lifecycle.complete(self, Self::LABEL)
    }

    fn rollback(&self) -> Result<()> {
        self.inner.lifecycle.rollback(self, Self::LABEL)
    }

    fn driver(&self) -> Option<Arc<dyn Driver>> {
        match self.is_empty() {
            Ok(false) => Some(self.inner.table.driver()),
            _ => None,
        }
    }

    fn as_contextual(&self) -> Option<&dyn ContextualCommand> {
        Some(self)
    }
}

impl ContextualCommand for ContextualDeleteCommand {
    fn is_empty(&self) -> Result<bool> {
        Ok(self.criteria()?.is_empty())
    }

    fn context(&self) -> Result<Fields> {
        Ok(self.inner.context.lock()?.clone())
    }

    fn add_context(&self, name: &str, value: Value) -> Result<()> {
        self.inner.lifecycle.while_pending(Self::LABEL, "context", || {
            self.inner.context.lock()?.insert(name.to_string(), value);
            Ok(())
        })
    }

    fn primary_key(&self) -> Result<Option<Value>> {
        Ok(self.inner.primary_key.lock()?.clone())
    }

    watch_via_lifecycle!();
}
