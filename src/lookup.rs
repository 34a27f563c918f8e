// ============================================================================
// Key Lookup
// ============================================================================
//
// Relation code needs key values that may not exist yet. A value is taken,
// in order, from:
//   1. the context of the command queued for the record,
//   2. that command's promised primary key, when the key is the record's
//      primary column,
//   3. the in-memory record itself.
//
// This lets one relation implementation handle a parent that is already
// stored, stored in the same batch, or stored by an outer batch later on.
//
// ============================================================================

use crate::command::{ContextualCommand, Stage};
use crate::core::{DbError, Fields, Result, Value};
use std::collections::BTreeMap;
use std::sync::Arc;

/// Semantic key roles a relation definition maps onto columns
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum RelationKey {
    InnerKey,
    OuterKey,
    MorphKey,
    ThroughInnerKey,
    ThroughOuterKey,
    PrimaryKey,
}

/// Column names for the keys one relation uses
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct KeyMap {
    columns: BTreeMap<RelationKey, String>,
}

impl KeyMap {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, key: RelationKey, column: impl Into<String>) -> Self {
        self.columns.insert(key, column.into());
        self
    }

    pub fn column(&self, key: RelationKey) -> Result<&str> {
        self.columns
            .get(&key)
            .map(String::as_str)
            .ok_or_else(|| DbError::Definition(format!("relation key {:?} is not defined", key)))
    }
}

/// Read access to an in-memory record
pub trait FieldSource {
    fn field(&self, name: &str) -> Option<Value>;

    fn primary_column(&self) -> &str;
}

/// Borrowed record made of plain fields
#[derive(Debug, Clone, Copy)]
pub struct RecordView<'a> {
    pub primary_column: &'a str,
    pub fields: &'a Fields,
}

impl FieldSource for RecordView<'_> {
    fn field(&self, name: &str) -> Option<Value> {
        self.fields.get(name).cloned()
    }

    fn primary_column(&self) -> &str {
        self.primary_column
    }
}

/// Resolve the value of `key` for `record`, preferring what `command`
/// already knows or promises.
pub fn lookup_key(
    key: RelationKey,
    keys: &KeyMap,
    record: &dyn FieldSource,
    command: Option<&dyn ContextualCommand>,
) -> Result<Option<Value>> {
    let column = keys.column(key)?;

    if let Some(command) = command {
        if let Some(value) = command.context()?.get(column)
            && !value.is_blank()
        {
            return Ok(Some(value.clone()));
        }

        if column == record.primary_column() {
            return command.primary_key();
        }
    }

    Ok(record.field(column).filter(|value| !value.is_null()))
}

/// Once `producer` executes, copy its primary key into `consumer`'s context
/// under `column`.
///
/// The consumer has to run after the producer; if it already executed the
/// producer's execute fails with [`DbError::ContextFrozen`].
pub fn forward_primary_key<C>(
    producer: &dyn ContextualCommand,
    consumer: C,
    column: impl Into<String>,
) -> Result<()>
where
    C: ContextualCommand + 'static,
{
    let column = column.into();
    producer.watch(
        Stage::Execute,
        Arc::new(move |produced: &dyn ContextualCommand| match produced.primary_key()? {
            Some(key) => consumer.add_context(&column, key),
            None => Err(DbError::ExecutionError(format!(
                "no primary key produced for '{}'",
                column
            ))),
        }),
    )
}
