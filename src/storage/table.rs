use super::{Change, Driver, MemoryDriver, Table};
use crate::core::{DbError, Fields, Result, Schema, Value};
use std::collections::BTreeMap;
use std::sync::Arc;

/// Row storage for one table of a [`MemoryDriver`].
///
/// Rows are keyed by an internal slot id that never changes, so a row keeps
/// its identity in the undo log even when its primary key is rewritten.
#[derive(Debug, Clone)]
pub(crate) struct TableData {
    schema: Schema,
    rows: BTreeMap<usize, Fields>,
    next_row_id: usize,
    sequence: i64,
}

impl TableData {
    pub(crate) fn new(schema: Schema) -> Self {
        Self {
            schema,
            rows: BTreeMap::new(),
            next_row_id: 0,
            sequence: 0,
        }
    }

    pub(crate) fn schema(&self) -> &Schema {
        &self.schema
    }

    pub(crate) fn insert(&mut self, data: &Fields) -> Result<(usize, Value)> {
        self.schema.validate_row(data)?;

        let primary = self.schema.primary_column().to_string();
        let key = match data.get(&primary) {
            Some(value) if !value.is_null() => {
                if self.primary_taken(value, None) {
                    return Err(DbError::ConstraintViolation(format!(
                        "Duplicate primary key {} in table '{}'",
                        value,
                        self.schema.name()
                    )));
                }
                if let Some(id) = value.as_i64() {
                    self.sequence = self.sequence.max(id);
                }
                value.clone()
            }
            _ => {
                self.sequence = self.sequence.checked_add(1).ok_or_else(|| {
                    DbError::ConstraintViolation(format!(
                        "Primary key sequence of table '{}' is exhausted",
                        self.schema.name()
                    ))
                })?;
                Value::Integer(self.sequence)
            }
        };

        let mut row: Fields = self
            .schema
            .columns()
            .iter()
            .map(|col| (col.name.clone(), Value::Null))
            .collect();
        row.extend(data.iter().map(|(k, v)| (k.clone(), v.clone())));
        row.insert(primary, key.clone());

        let id = self.next_row_id;
        self.next_row_id += 1;
        self.rows.insert(id, row);

        Ok((id, key))
    }

    /// Returns the previous content of every updated row
    pub(crate) fn update(&mut self, where_clause: &Fields, values: &Fields) -> Result<Vec<(usize, Fields)>> {
        self.check_where(where_clause)?;
        self.schema.validate_values(values)?;

        let matched = self.matching(where_clause);
        if let Some(new_key) = values.get(self.schema.primary_column()) {
            if matched.len() > 1 {
                return Err(DbError::ConstraintViolation(format!(
                    "Update would assign primary key {} to {} rows in table '{}'",
                    new_key,
                    matched.len(),
                    self.schema.name()
                )));
            }
            if let Some(&only) = matched.first()
                && self.primary_taken(new_key, Some(only))
            {
                return Err(DbError::ConstraintViolation(format!(
                    "Duplicate primary key {} in table '{}'",
                    new_key,
                    self.schema.name()
                )));
            }
        }

        let mut previous = Vec::with_capacity(matched.len());
        for id in matched {
            if let Some(row) = self.rows.get_mut(&id) {
                previous.push((id, row.clone()));
                for (name, value) in values {
                    row.insert(name.clone(), value.clone());
                }
            }
        }
        Ok(previous)
    }

    /// Returns the removed rows
    pub(crate) fn delete(&mut self, where_clause: &Fields) -> Result<Vec<(usize, Fields)>> {
        self.check_where(where_clause)?;

        let matched = self.matching(where_clause);
        Ok(matched
            .into_iter()
            .filter_map(|id| self.rows.remove(&id).map(|row| (id, row)))
            .collect())
    }

    /// Reverts a single logged change
    pub(crate) fn revert(&mut self, change: Change) {
        match change {
            Change::InsertRow { row_id, .. } => {
                self.rows.remove(&row_id);
            }
            Change::UpdateRow { row_id, old_row, .. } | Change::DeleteRow { row_id, old_row, .. } => {
                self.rows.insert(row_id, old_row);
            }
        }
    }

    pub(crate) fn rows(&self) -> Vec<Fields> {
        self.rows.values().cloned().collect()
    }

    pub(crate) fn find(&self, where_clause: &Fields) -> Result<Vec<Fields>> {
        self.check_where(where_clause)?;
        Ok(self
            .matching(where_clause)
            .into_iter()
            .filter_map(|id| self.rows.get(&id).cloned())
            .collect())
    }

    pub(crate) fn row_count(&self) -> usize {
        self.rows.len()
    }

    fn check_where(&self, where_clause: &Fields) -> Result<()> {
        for name in where_clause.keys() {
            if self.schema.get_column(name).is_none() {
                return Err(DbError::ColumnNotFound(
                    name.clone(),
                    self.schema.name().to_string(),
                ));
            }
        }
        Ok(())
    }

    fn matching(&self, where_clause: &Fields) -> Vec<usize> {
        self.rows
            .iter()
            .filter(|(_, row)| {
                where_clause
                    .iter()
                    .all(|(name, value)| row.get(name).unwrap_or(&Value::Null) == value)
            })
            .map(|(id, _)| *id)
            .collect()
    }

    fn primary_taken(&self, key: &Value, except: Option<usize>) -> bool {
        let primary = self.schema.primary_column();
        self.rows
            .iter()
            .any(|(id, row)| Some(*id) != except && row.get(primary) == Some(key))
    }
}

/// Handle to one table of a [`MemoryDriver`].
///
/// Handles are cheap; every operation goes through the owning driver so
/// writes made inside an open transaction land in its undo log.
#[derive(Clone)]
pub struct MemoryTable {
    driver: Arc<MemoryDriver>,
    name: String,
}

impl MemoryTable {
    pub(crate) fn new(driver: Arc<MemoryDriver>, name: impl Into<String>) -> Self {
        Self {
            driver,
            name: name.into(),
        }
    }

    pub fn memory_driver(&self) -> &Arc<MemoryDriver> {
        &self.driver
    }

    pub fn schema(&self) -> Result<Schema> {
        self.driver.read_table(&self.name, |data| Ok(data.schema().clone()))
    }

    /// All rows in insertion order
    pub fn rows(&self) -> Result<Vec<Fields>> {
        self.driver.read_table(&self.name, |data| Ok(data.rows()))
    }

    pub fn find(&self, where_clause: &Fields) -> Result<Vec<Fields>> {
        self.driver.read_table(&self.name, |data| data.find(where_clause))
    }

    pub fn count(&self) -> Result<usize> {
        self.driver.read_table(&self.name, |data| Ok(data.row_count()))
    }
}

impl std::fmt::Debug for MemoryTable {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MemoryTable")
            .field("driver", &self.driver.id())
            .field("name", &self.name)
            .finish()
    }
}

impl Table for MemoryTable {
    fn name(&self) -> &str {
        &self.name
    }

    fn driver(&self) -> Arc<dyn Driver> {
        self.driver.clone()
    }

    fn insert(&self, data: &Fields) -> Result<Value> {
        self.driver.insert_row(&self.name, data)
    }

    fn update(&self, where_clause: &Fields, values: &Fields) -> Result<usize> {
        self.driver.update_rows(&self.name, where_clause, values)
    }

    fn delete(&self, where_clause: &Fields) -> Result<usize> {
        self.driver.delete_rows(&self.name, where_clause)
    }
}
