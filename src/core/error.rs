use thiserror::Error;

#[derive(Error, Debug)]
pub enum DbError {
    #[error("Parse error: {0}")]
    ParseError(String),

    #[error("Only contextual commands can be used as leading")]
    LeadingNotContextual,

    #[error("Leading command is not set")]
    LeadingNotSet,

    #[error("Configuration error: {0}")]
    Configuration(String),

    #[error("Definition error: {0}")]
    Definition(String),

    #[error("Invalid command state: {0}")]
    InvalidState(String),

    #[error("Context is frozen: {0}")]
    ContextFrozen(String),

    #[error("Table '{0}' already exists")]
    TableExists(String),

    #[error("Table '{0}' not found")]
    TableNotFound(String),

    #[error("Column '{0}' not found in table '{1}'")]
    ColumnNotFound(String, String),

    #[error("Type mismatch: {0}")]
    TypeMismatch(String),

    #[error("Constraint violation: {0}")]
    ConstraintViolation(String),

    #[error("Transaction error: {0}")]
    Transaction(String),

    #[error("Execution error: {0}")]
    ExecutionError(String),

    #[error("Lock error: {0}")]
    LockError(String),
}

impl DbError {
    /// Errors raised by malformed command graphs rather than by storage.
    pub fn is_configuration(&self) -> bool {
        matches!(
            self,
            DbError::LeadingNotContextual
                | DbError::LeadingNotSet
                | DbError::Configuration(_)
                | DbError::Definition(_)
        )
    }
}

pub type Result<T> = std::result::Result<T, DbError>;

impl<T> From<std::sync::PoisonError<T>> for DbError {
    fn from(err: std::sync::PoisonError<T>) -> Self {
        Self::LockError(err.to_string())
    }
}

impl From<serde_json::Error> for DbError {
    fn from(err: serde_json::Error) -> Self {
        Self::ParseError(err.to_string())
    }
}
