// ============================================================================
// Command Lifecycle State
// ============================================================================
//
// Every leaf command moves through a fixed lifecycle:
//
//   Pending ──execute──> Executed ──complete──> Completed
//      │                    │
//      │                    └──rollback──> RolledBack
//      └──execute fails──> Failed
//
// ============================================================================

use crate::core::{DbError, Result};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CommandState {
    /// Built, not executed yet; context and where clauses are still mutable
    Pending,

    /// Side effect applied, waiting for commit or rollback
    Executed,

    /// Batch committed and completion callbacks fired
    Completed,

    /// Batch aborted after this command had executed
    RolledBack,

    /// The command's own execute failed
    Failed,
}

impl CommandState {
    pub fn is_pending(&self) -> bool {
        matches!(self, CommandState::Pending)
    }

    /// Check if the command can no longer change state
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            CommandState::Completed | CommandState::RolledBack | CommandState::Failed
        )
    }

    /// Validate a transition, naming the command in the error
    pub fn transition(self, to: CommandState, command: &str) -> Result<CommandState> {
        let allowed = matches!(
            (self, to),
            (CommandState::Pending, CommandState::Executed)
                | (CommandState::Pending, CommandState::Failed)
                | (CommandState::Executed, CommandState::Completed)
                | (CommandState::Executed, CommandState::RolledBack)
        );

        if !allowed {
            return Err(DbError::InvalidState(format!(
                "{} cannot move from {} to {}",
                command, self, to
            )));
        }
        Ok(to)
    }
}

impl std::fmt::Display for CommandState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            CommandState::Pending => write!(f, "PENDING"),
            CommandState::Executed => write!(f, "EXECUTED"),
            CommandState::Completed => write!(f, "COMPLETED"),
            CommandState::RolledBack => write!(f, "ROLLED_BACK"),
            CommandState::Failed => write!(f, "FAILED"),
        }
    }
}
