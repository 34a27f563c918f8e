use super::CommandState;
use crate::core::{DbError, Result};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

/// Lifecycle transition a callback is attached to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Stage {
    Execute,
    Complete,
    Rollback,
}

impl std::fmt::Display for Stage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Stage::Execute => write!(f, "execute"),
            Stage::Complete => write!(f, "complete"),
            Stage::Rollback => write!(f, "rollback"),
        }
    }
}

/// Callback receiving the concrete command it was registered on
pub type Callback<C> = Arc<dyn Fn(&C) -> Result<()> + Send + Sync>;

/// Insertion-ordered callback lists for the three lifecycle stages.
pub struct Hooks<C> {
    execute: Mutex<Vec<Callback<C>>>,
    complete: Mutex<Vec<Callback<C>>>,
    rollback: Mutex<Vec<Callback<C>>>,
}

impl<C> Default for Hooks<C> {
    fn default() -> Self {
        Self {
            execute: Mutex::new(Vec::new()),
            complete: Mutex::new(Vec::new()),
            rollback: Mutex::new(Vec::new()),
        }
    }
}

impl<C> Hooks<C> {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&self, stage: Stage, callback: Callback<C>) {
        relock(self.list(stage)).push(callback);
    }

    pub fn count(&self, stage: Stage) -> usize {
        relock(self.list(stage)).len()
    }

    /// Invoke every callback of `stage` in registration order, stopping at
    /// the first error.
    ///
    /// The list is copied out first so a callback may register further
    /// callbacks on the same command without deadlocking; those only run on
    /// a later transition.
    pub fn fire(&self, stage: Stage, command: &C) -> Result<()> {
        let callbacks = self.list(stage).lock()?.clone();
        for callback in callbacks {
            callback(command)?;
        }
        Ok(())
    }

    fn list(&self, stage: Stage) -> &Mutex<Vec<Callback<C>>> {
        match stage {
            Stage::Execute => &self.execute,
            Stage::Complete => &self.complete,
            Stage::Rollback => &self.rollback,
        }
    }
}

/// State tracking plus hooks shared by every leaf command.
pub struct Lifecycle<C> {
    state: Mutex<CommandState>,
    hooks: Hooks<C>,
}

impl<C> Default for Lifecycle<C> {
    fn default() -> Self {
        Self {
            state: Mutex::new(CommandState::Pending),
            hooks: Hooks::new(),
        }
    }
}

impl<C> Lifecycle<C> {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn state(&self) -> CommandState {
        *relock(&self.state)
    }

    pub fn hooks(&self) -> &Hooks<C> {
        &self.hooks
    }

    /// Run `mutate` only while the command is still pending.
    ///
    /// The state lock is held for the duration, so a concurrent execute
    /// cannot slip in between the check and the mutation.
    pub fn while_pending<R>(
        &self,
        label: &str,
        what: &str,
        mutate: impl FnOnce() -> Result<R>,
    ) -> Result<R> {
        let state = self.state.lock()?;
        if !state.is_pending() {
            return Err(DbError::ContextFrozen(format!(
                "cannot change {} of {} command in state {}",
                what, label, *state
            )));
        }
        mutate()
    }

    /// Apply the command's side effect once, then fan out to the execute
    /// callbacks.
    pub fn execute(&self, command: &C, label: &str, apply: impl FnOnce() -> Result<()>) -> Result<()> {
        {
            let mut state = self.state.lock()?;
            state.transition(CommandState::Executed, label)?;

            if let Err(err) = apply() {
                *state = CommandState::Failed;
                return Err(err);
            }
            *state = CommandState::Executed;
        }

        if let Err(err) = self.hooks.fire(Stage::Execute, command) {
            *self.state.lock()? = CommandState::Failed;
            return Err(err);
        }
        Ok(())
    }

    pub fn complete(&self, command: &C, label: &str) -> Result<()> {
        self.finish(CommandState::Completed, Stage::Complete, command, label)
    }

    pub fn rollback(&self, command: &C, label: &str) -> Result<()> {
        self.finish(CommandState::RolledBack, Stage::Rollback, command, label)
    }

    fn finish(&self, to: CommandState, stage: Stage, command: &C, label: &str) -> Result<()> {
        {
            let mut state = self.state.lock()?;
            *state = state.transition(to, label)?;
        }
        self.hooks.fire(stage, command)
    }
}

fn relock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Generates the typed `on_execute` / `on_complete` / `on_rollback`
/// registration methods for a leaf command whose `inner` holds a
/// `lifecycle: Lifecycle<Self>`.
macro_rules! command_hooks {
    ($command:ty) => {
        impl $command {
            /// Register a callback fired right after this command executes
            pub fn on_execute<F>(&self, callback: F)
            where
                F: Fn(&$command) -> $crate::core::Result<()> + Send + Sync + 'static,
            {
                self.inner
                    .lifecycle
                    .hooks()
                    .register($crate::command::Stage::Execute, ::std::sync::Arc::new(callback));
            }

            /// Register a callback fired once the batch has committed
            pub fn on_complete<F>(&self, callback: F)
            where
                F: Fn(&$command) -> $crate::core::Result<()> + Send + Sync + 'static,
            {
                self.inner
                    .lifecycle
                    .hooks()
                    .register($crate::command::Stage::Complete, ::std::sync::Arc::new(callback));
            }

            /// Register a callback fired when the batch is aborted after this
            /// command executed
            pub fn on_rollback<F>(&self, callback: F)
            where
                F: Fn(&$command) -> $crate::core::Result<()> + Send + Sync + 'static,
            {
                self.inner
                    .lifecycle
                    .hooks()
                    .register($crate::command::Stage::Rollback, ::std::sync::Arc::new(callback));
            }
        }
    };
}

pub(crate) use command_hooks;
