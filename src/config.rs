use crate::core::Result;
use serde::Deserialize;

/// How a [`Transaction`](crate::Transaction) runs its batch
///
/// Similar to connection options: build it with the setters or load it from
/// JSON, then hand it to [`Transaction::with_config`](crate::Transaction::with_config).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct TransactionConfig {
    /// Open driver transactions even when the batch holds a single command
    pub force_transaction: bool,

    /// Forget the queued commands after a successful run
    pub clean: bool,
}

impl Default for TransactionConfig {
    fn default() -> Self {
        Self {
            force_transaction: false,
            clean: true,
        }
    }
}

impl TransactionConfig {
    pub fn new() -> Self {
        Self::default()
    }

    /// Set whether single-command batches still get a driver transaction
    pub fn force_transaction(mut self, force: bool) -> Self {
        self.force_transaction = force;
        self
    }

    /// Set whether queued commands are dropped after a successful run
    pub fn clean(mut self, clean: bool) -> Self {
        self.clean = clean;
        self
    }

    /// Parse from JSON; missing keys keep their defaults
    ///
    /// # Examples
    ///
    /// ```
    /// use memorm::TransactionConfig;
    ///
    /// let config = TransactionConfig::from_json(r#"{ "force_transaction": true }"#).unwrap();
    /// assert!(config.force_transaction);
    /// assert!(config.clean);
    /// ```
    pub fn from_json(json: &str) -> Result<Self> {
        Ok(serde_json::from_str(json)?)
    }
}
