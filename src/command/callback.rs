use super::lifecycle::{Lifecycle, command_hooks};
use super::{Command, CommandState};
use crate::core::Result;
use std::sync::Arc;

type Action = Box<dyn Fn() -> Result<()> + Send + Sync>;

/// Runs an arbitrary closure as a step of the batch.
///
/// Has no driver, so it never causes a transaction to be opened on its own.
#[derive(Clone)]
pub struct CallbackCommand {
    inner: Arc<CallbackInner>,
}

struct CallbackInner {
    action: Action,
    lifecycle: Lifecycle<CallbackCommand>,
}

impl CallbackCommand {
    const LABEL: &'static str = "callback";

    pub fn new<F>(action: F) -> Self
    where
        F: Fn() -> Result<()> + Send + Sync + 'static,
    {
        Self {
            inner: Arc::new(CallbackInner {
                action: Box::new(action),
                lifecycle: Lifecycle::new(),
            }),
        }
    }
}

command_hooks!(CallbackCommand);

impl std::fmt::Debug for CallbackCommand {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CallbackCommand")
            .field("state", &self.inner.lifecycle.state())
            .finish()
    }
}

impl Command for CallbackCommand {
    fn label(&self) -> &'static str {
        Self::LABEL
    }

    fn state(&self) -> CommandState {
        self.inner.lifecycle.state()
    }

    fn execute(&self) -> Result<()> {
        self.inner
            .lifecycle
            .execute(self, Self::LABEL, || (self.inner.action)())
    }

    fn complete(&self) -> Result<()> {
        self.inner.lifecycle.complete(self, Self::LABEL)
    }

    fn rollback(&self) -> Result<()> {
        self.inner.lifecycle.rollback(self, Self::LABEL)
    }
}
