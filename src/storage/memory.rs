use super::table::TableData;
use super::{Change, Driver, DriverId, MemoryTable};
use crate::core::{DbError, Fields, Result, Schema, Value};
use log::debug;
use serde::Serialize;
use std::collections::HashMap;
use std::sync::{Arc, Mutex};

/// Transaction-control call observed by a [`MemoryDriver`]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum DriverEvent {
    Begin,
    Commit,
    Rollback,
}

#[derive(Default)]
struct DriverState {
    tables: HashMap<String, TableData>,
    /// Undo log of the open transaction; `None` when in autocommit mode
    undo: Option<Vec<Change>>,
    journal: Vec<DriverEvent>,
}

/// In-memory database connection.
///
/// Writes apply immediately. While a transaction is open every write is
/// also recorded as a [`Change`] so rollback can restore the previous rows.
/// Nested transactions are not supported.
pub struct MemoryDriver {
    id: DriverId,
    name: String,
    state: Mutex<DriverState>,
}

impl MemoryDriver {
    pub fn new(name: impl Into<String>) -> Arc<Self> {
        Arc::new(Self {
            id: DriverId::next(),
            name: name.into(),
            state: Mutex::new(DriverState::default()),
        })
    }

    /// Create a table
    pub fn create_table(self: &Arc<Self>, schema: Schema) -> Result<Arc<MemoryTable>> {
        let name = schema.name().to_string();
        let mut state = self.state.lock()?;

        if state.tables.contains_key(&name) {
            return Err(DbError::TableExists(name));
        }

        debug!("{}: created table '{}'", self.name, name);
        state.tables.insert(name.clone(), TableData::new(schema));
        Ok(Arc::new(MemoryTable::new(self.clone(), name)))
    }

    /// Get a handle to an existing table
    pub fn table(self: &Arc<Self>, name: &str) -> Result<Arc<MemoryTable>> {
        if !self.state.lock()?.tables.contains_key(name) {
            return Err(DbError::TableNotFound(name.to_string()));
        }
        Ok(Arc::new(MemoryTable::new(self.clone(), name)))
    }

    pub fn list_tables(&self) -> Result<Vec<String>> {
        let mut names: Vec<String> = self.state.lock()?.tables.keys().cloned().collect();
        names.sort();
        Ok(names)
    }

    pub fn in_transaction(&self) -> Result<bool> {
        Ok(self.state.lock()?.undo.is_some())
    }

    /// Every begin/commit/rollback seen so far, oldest first
    pub fn journal(&self) -> Result<Vec<DriverEvent>> {
        Ok(self.state.lock()?.journal.clone())
    }

    pub fn clear_journal(&self) -> Result<()> {
        self.state.lock()?.journal.clear();
        Ok(())
    }

    pub(crate) fn read_table<R>(
        &self,
        name: &str,
        read: impl FnOnce(&TableData) -> Result<R>,
    ) -> Result<R> {
        let state = self.state.lock()?;
        let data = state
            .tables
            .get(name)
            .ok_or_else(|| DbError::TableNotFound(name.to_string()))?;
        read(data)
    }

    pub(crate) fn insert_row(&self, name: &str, data: &Fields) -> Result<Value> {
        let mut guard = self.state.lock()?;
        let state = &mut *guard;
        let table = state
            .tables
            .get_mut(name)
            .ok_or_else(|| DbError::TableNotFound(name.to_string()))?;

        let (row_id, key) = table.insert(data)?;
        if let Some(undo) = state.undo.as_mut() {
            undo.push(Change::InsertRow {
                table: name.to_string(),
                row_id,
            });
        }

        debug!("{}: inserted {} into '{}'", self.name, key, name);
        Ok(key)
    }

    pub(crate) fn update_rows(&self, name: &str, where_clause: &Fields, values: &Fields) -> Result<usize> {
        let mut guard = self.state.lock()?;
        let state = &mut *guard;
        let table = state
            .tables
            .get_mut(name)
            .ok_or_else(|| DbError::TableNotFound(name.to_string()))?;

        let previous = table.update(where_clause, values)?;
        let affected = previous.len();
        if let Some(undo) = state.undo.as_mut() {
            undo.extend(previous.into_iter().map(|(row_id, old_row)| Change::UpdateRow {
                table: name.to_string(),
                row_id,
                old_row,
            }));
        }

        debug!("{}: updated {} row(s) in '{}'", self.name, affected, name);
        Ok(affected)
    }

    pub(crate) fn delete_rows(&self, name: &str, where_clause: &Fields) -> Result<usize> {
        let mut guard = self.state.lock()?;
        let state = &mut *guard;
        let table = state
            .tables
            .get_mut(name)
            .ok_or_else(|| DbError::TableNotFound(name.to_string()))?;

        let removed = table.delete(where_clause)?;
        let affected = removed.len();
        if let Some(undo) = state.undo.as_mut() {
            undo.extend(removed.into_iter().map(|(row_id, old_row)| Change::DeleteRow {
                table: name.to_string(),
                row_id,
                old_row,
            }));
        }

        debug!("{}: deleted {} row(s) from '{}'", self.name, affected, name);
        Ok(affected)
    }
}

impl std::fmt::Debug for MemoryDriver {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MemoryDriver")
            .field("id", &self.id)
            .field("name", &self.name)
            .finish()
    }
}

impl Driver for MemoryDriver {
    fn id(&self) -> DriverId {
        self.id
    }

    fn name(&self) -> &str {
        &self.name
    }

    fn begin_transaction(&self) -> Result<()> {
        let mut state = self.state.lock()?;
        if state.undo.is_some() {
            return Err(DbError::Transaction(format!(
                "{}: transaction already active",
                self.name
            )));
        }

        state.undo = Some(Vec::new());
        state.journal.push(DriverEvent::Begin);
        debug!("{}: begin", self.name);
        Ok(())
    }

    fn commit_transaction(&self) -> Result<()> {
        let mut state = self.state.lock()?;
        let undo = state.undo.take().ok_or_else(|| {
            DbError::Transaction(format!("{}: no active transaction to commit", self.name))
        })?;

        state.journal.push(DriverEvent::Commit);
        debug!("{}: commit ({} change(s))", self.name, undo.len());
        Ok(())
    }

    fn rollback_transaction(&self) -> Result<()> {
        let mut guard = self.state.lock()?;
        let state = &mut *guard;
        let undo = state.undo.take().ok_or_else(|| {
            DbError::Transaction(format!("{}: no active transaction to roll back", self.name))
        })?;

        let reverted = undo.len();
        for change in undo.into_iter().rev() {
            if let Some(table) = state.tables.get_mut(change.table_name()) {
                table.revert(change);
            }
        }

        state.journal.push(DriverEvent::Rollback);
        debug!("{}: rollback ({} change(s) reverted)", self.name, reverted);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::{Column, DataType};
    use crate::fields;
    use crate::storage::Table;

    fn users(driver: &Arc<MemoryDriver>) -> Arc<MemoryTable> {
        driver
            .create_table(Schema::new(
                "users",
                vec![Column::new("name", DataType::Text).not_null()],
            ))
            .unwrap()
    }

    #[test]
    fn test_autocommit_writes() {
        let driver = MemoryDriver::new("primary");
        let table = users(&driver);

        table.insert(&fields! { "name" => "Alice" }).unwrap();
        assert_eq!(table.count().unwrap(), 1);
        assert!(driver.journal().unwrap().is_empty());
    }

    #[test]
    fn test_rollback_restores_rows() {
        let driver = MemoryDriver::new("primary");
        let table = users(&driver);
        table.insert(&fields! { "name" => "Alice" }).unwrap();

        driver.begin_transaction().unwrap();
        table.insert(&fields! { "name" => "Bob" }).unwrap();
        table
            .update(&fields! { "name" => "Alice" }, &fields! { "name" => "Alicia" })
            .unwrap();
        table.delete(&fields! { "id" => 1 }).unwrap();
        driver.rollback_transaction().unwrap();

        assert_eq!(table.rows().unwrap(), vec![fields! { "id" => 1, "name" => "Alice" }]);
        assert_eq!(
            driver.journal().unwrap(),
            vec![DriverEvent::Begin, DriverEvent::Rollback]
        );
    }

    #[test]
    fn test_commit_keeps_rows() {
        let driver = MemoryDriver::new("primary");
        let table = users(&driver);

        driver.begin_transaction().unwrap();
        table.insert(&fields! { "name" => "Alice" }).unwrap();
        driver.commit_transaction().unwrap();

        assert_eq!(table.count().unwrap(), 1);
        assert!(!driver.in_transaction().unwrap());
    }

    #[test]
    fn test_nested_begin_rejected() {
        let driver = MemoryDriver::new("primary");
        driver.begin_transaction().unwrap();
        assert!(matches!(
            driver.begin_transaction(),
            Err(DbError::Transaction(_))
        ));
        assert!(matches!(
            MemoryDriver::new("other").commit_transaction(),
            Err(DbError::Transaction(_))
        ));
    }

    #[test]
    fn test_duplicate_table() {
        let driver = MemoryDriver::new("primary");
        users(&driver);
        assert!(matches!(
            driver.create_table(Schema::new("users", vec![])),
            Err(DbError::TableExists(_))
        ));
        assert!(matches!(driver.table("posts"), Err(DbError::TableNotFound(_))));
    }
}
