use super::{Command, CommandNode, ContextCallback, ContextualCommand, Stage};
use crate::core::{DbError, Fields, Result, Value};
use std::sync::{Arc, Mutex, PoisonError};
use tracing::warn;

/// Groups commands that belong to one logical write, e.g. a record and the
/// relation commands queued around it.
///
/// The composite has no identity of its own: contextual queries and callback
/// registration are forwarded to the leading child, and the executor only
/// ever runs the flattened leaves. Handles are shared, so a clone added to a
/// transaction still sees commands added to the original afterwards.
#[derive(Clone, Default)]
pub struct TransactionalCommand {
    inner: Arc<Mutex<CompositeInner>>,
}

#[derive(Default)]
struct CompositeInner {
    commands: Vec<CommandNode>,
    leading: Option<CommandNode>,
}

impl TransactionalCommand {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a child; `NullCommand` is dropped silently.
    ///
    /// With `leading` set the child must be contextual and becomes the
    /// delegate for context and primary key queries. Designating a new
    /// leading child replaces the previous one.
    pub fn add_command(&self, command: impl Into<CommandNode>, leading: bool) -> Result<()> {
        let command = command.into();
        if command.is_null() {
            return Ok(());
        }

        if let CommandNode::Composite(child) = &command
            && child.reaches(&self.inner)
        {
            return Err(DbError::Configuration(
                "a transactional command cannot contain itself".into(),
            ));
        }

        if leading && command.as_contextual().is_none() {
            return Err(DbError::LeadingNotContextual);
        }

        let mut inner = self.inner.lock()?;
        if leading {
            if let Some(previous) = &inner.leading {
                warn!(
                    previous = ?previous,
                    replacement = ?command,
                    "leading command re-designated"
                );
            }
            inner.leading = Some(command.clone());
        }
        inner.commands.push(command);
        Ok(())
    }

    pub fn leading(&self) -> Result<CommandNode> {
        self.inner
            .lock()?
            .leading
            .clone()
            .ok_or(DbError::LeadingNotSet)
    }

    pub fn has_leading(&self) -> bool {
        self.lock_inner().leading.is_some()
    }

    /// Direct children, nested composites included as-is
    pub fn children(&self) -> Vec<CommandNode> {
        self.lock_inner().commands.clone()
    }

    pub fn child_count(&self) -> usize {
        self.lock_inner().commands.len()
    }

    /// Flattened leaf commands, depth-first in add order
    pub fn commands(&self) -> Vec<Arc<dyn Command>> {
        CommandNode::Composite(self.clone()).flatten()
    }

    pub fn on_execute<F>(&self, callback: F) -> Result<()>
    where
        F: Fn(&dyn ContextualCommand) -> Result<()> + Send + Sync + 'static,
    {
        self.watch(Stage::Execute, Arc::new(callback))
    }

    pub fn on_complete<F>(&self, callback: F) -> Result<()>
    where
        F: Fn(&dyn ContextualCommand) -> Result<()> + Send + Sync + 'static,
    {
        self.watch(Stage::Complete, Arc::new(callback))
    }

    pub fn on_rollback<F>(&self, callback: F) -> Result<()>
    where
        F: Fn(&dyn ContextualCommand) -> Result<()> + Send + Sync + 'static,
    {
        self.watch(Stage::Rollback, Arc::new(callback))
    }

    /// Nothing; only the flattened leaves are executed
    pub fn execute(&self) -> Result<()> {
        Ok(())
    }

    /// Nothing; only the flattened leaves are completed
    pub fn complete(&self) -> Result<()> {
        Ok(())
    }

    /// Nothing; only the flattened leaves are rolled back
    pub fn rollback(&self) -> Result<()> {
        Ok(())
    }

    fn with_leading<R>(&self, query: impl FnOnce(&dyn ContextualCommand) -> Result<R>) -> Result<R> {
        // Cloned out so the delegate may lock this composite again
        let leading = self.leading()?;
        let contextual = leading
            .as_contextual()
            .ok_or(DbError::LeadingNotContextual)?;
        query(contextual)
    }

    /// True if `target` is this composite or any composite nested below it.
    fn reaches(&self, target: &Arc<Mutex<CompositeInner>>) -> bool {
        if Arc::ptr_eq(&self.inner, target) {
            return true;
        }
        // Children are cloned out so no lock is held while descending
        self.children().iter().any(|child| match child {
            CommandNode::Composite(nested) => nested.reaches(target),
            _ => false,
        })
    }

    fn lock_inner(&self) -> std::sync::MutexGuard<'_, CompositeInner> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl std::fmt::Debug for TransactionalCommand {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let inner = self.lock_inner();
        f.debug_struct("TransactionalCommand")
            .field("commands", &inner.commands)
            .field("leading", &inner.leading)
            .finish()
    }
}

impl ContextualCommand for TransactionalCommand {
    fn is_empty(&self) -> Result<bool> {
        self.with_leading(|leading| leading.is_empty())
    }

    fn context(&self) -> Result<Fields> {
        self.with_leading(|leading| leading.context())
    }

    fn add_context(&self, name: &str, value: Value) -> Result<()> {
        self.with_leading(|leading| leading.add_context(name, value))
    }

    fn primary_key(&self) -> Result<Option<Value>> {
        self.with_leading(|leading| leading.primary_key())
    }

    fn watch(&self, stage: Stage, callback: ContextCallback) -> Result<()> {
        self.with_leading(|leading| leading.watch(stage, callback))
    }
}
