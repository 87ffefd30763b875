//! In-process collaborator implementations.
//!
//! [`MemoryDb`] and [`MemoryStore`] back the integration tests and small
//! demos; production deployments plug real driver-backed implementations
//! into the same traits.

use std::collections::{BTreeMap, HashMap};
use std::sync::Mutex;

use async_trait::async_trait;

use super::{CheckpointStore, Database, PK_COLUMN};
use crate::error::{ReshapeError, Result};
use crate::value::{Row, Value};

#[derive(Debug, Default)]
struct MemTable {
    next_id: i64,
    rows: BTreeMap<i64, Row>,
}

/// In-memory [`Database`] with auto-incrementing integer primary keys.
///
/// Tables are created implicitly on first insert. Scanning a table that was
/// never written is a query error, matching real-backend behavior; single-row
/// lookups treat an unknown table as empty, since destination tables only
/// come into existence with their first insert.
#[derive(Debug, Default)]
pub struct MemoryDb {
    tables: Mutex<HashMap<String, MemTable>>,
}

impl MemoryDb {
    /// Create an empty database.
    pub fn new() -> Self {
        Self::default()
    }

    /// Snapshot all rows of a table in primary-key order.
    ///
    /// Test helper; returns an empty vec for unknown tables.
    pub fn rows(&self, table: &str) -> Vec<Row> {
        let tables = self.tables.lock().expect("memory db lock poisoned");
        tables
            .get(table)
            .map(|t| t.rows.values().cloned().collect())
            .unwrap_or_default()
    }
}

#[async_trait]
impl Database for MemoryDb {
    async fn get_table_rows(&self, table: &str, after: Option<i64>) -> Result<Vec<Row>> {
        let tables = self.tables.lock().expect("memory db lock poisoned");
        let t = tables
            .get(table)
            .ok_or_else(|| ReshapeError::query(table, "no such table"))?;
        let start = after.map(|pk| pk + 1).unwrap_or(i64::MIN);
        Ok(t.rows.range(start..).map(|(_, row)| row.clone()).collect())
    }

    async fn get_table_row_count(&self, table: &str, after: Option<i64>) -> Result<i64> {
        let tables = self.tables.lock().expect("memory db lock poisoned");
        let t = tables
            .get(table)
            .ok_or_else(|| ReshapeError::query(table, "no such table"))?;
        let start = after.map(|pk| pk + 1).unwrap_or(i64::MIN);
        Ok(t.rows.range(start..).count() as i64)
    }

    async fn get_row_by_pk(&self, table: &str, pk: i64) -> Result<Option<Row>> {
        let tables = self.tables.lock().expect("memory db lock poisoned");
        Ok(tables.get(table).and_then(|t| t.rows.get(&pk).cloned()))
    }

    async fn get_row_by_field(
        &self,
        table: &str,
        field: &str,
        value: &Value,
    ) -> Result<Option<Row>> {
        let tables = self.tables.lock().expect("memory db lock poisoned");
        Ok(tables.get(table).and_then(|t| {
            t.rows
                .values()
                .find(|row| row.get(field) == Some(value))
                .cloned()
        }))
    }

    async fn insert_row(&self, table: &str, mut row: Row) -> Result<i64> {
        let mut tables = self.tables.lock().expect("memory db lock poisoned");
        let t = tables.entry(table.to_string()).or_default();
        t.next_id += 1;
        let pk = t.next_id;
        row.insert(PK_COLUMN.to_string(), Value::Int(pk));
        t.rows.insert(pk, row);
        Ok(pk)
    }
}

/// In-memory [`CheckpointStore`].
#[derive(Debug, Default)]
pub struct MemoryStore {
    entries: Mutex<HashMap<String, String>>,
}

impl MemoryStore {
    /// Create an empty store.
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl CheckpointStore for MemoryStore {
    async fn get(&self, key: &str) -> Result<Option<String>> {
        let entries = self.entries.lock().expect("memory store lock poisoned");
        Ok(entries.get(key).cloned())
    }

    async fn set(&self, key: &str, value: &str) -> Result<()> {
        let mut entries = self.entries.lock().expect("memory store lock poisoned");
        entries.insert(key.to_string(), value.to_string());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::value::row;

    #[tokio::test]
    async fn test_insert_assigns_ascending_pks() {
        let db = MemoryDb::new();
        let a = db
            .insert_row("author", row([("name", Value::from("King"))]))
            .await
            .unwrap();
        let b = db
            .insert_row("author", row([("name", Value::from("Herbert"))]))
            .await
            .unwrap();
        assert_eq!((a, b), (1, 2));
        assert_eq!(db.rows("author")[0].get(PK_COLUMN), Some(&Value::Int(1)));
    }

    #[tokio::test]
    async fn test_scan_after_bound() {
        let db = MemoryDb::new();
        for i in 0..5 {
            db.insert_row("t", row([("n", Value::Int(i))])).await.unwrap();
        }
        let rows = db.get_table_rows("t", Some(3)).await.unwrap();
        assert_eq!(rows.len(), 2);
        assert_eq!(rows[0].get("id"), Some(&Value::Int(4)));
        assert_eq!(db.get_table_row_count("t", Some(3)).await.unwrap(), 2);
    }

    #[tokio::test]
    async fn test_missing_table_is_query_error() {
        let db = MemoryDb::new();
        let err = db.get_table_rows("ghost", None).await.unwrap_err();
        assert!(matches!(err, ReshapeError::Query { table, .. } if table == "ghost"));
    }

    #[tokio::test]
    async fn test_get_row_by_field() {
        let db = MemoryDb::new();
        db.insert_row("author", row([("name", Value::from("King"))]))
            .await
            .unwrap();
        let found = db
            .get_row_by_field("author", "name", &Value::from("King"))
            .await
            .unwrap()
            .unwrap();
        assert_eq!(found.get("id"), Some(&Value::Int(1)));
        assert!(db
            .get_row_by_field("author", "name", &Value::from("Nobody"))
            .await
            .unwrap()
            .is_none());
    }

    #[tokio::test]
    async fn test_memory_store_round_trip() {
        let store = MemoryStore::new();
        assert_eq!(store.get("k").await.unwrap(), None);
        store.set("k", "12").await.unwrap();
        assert_eq!(store.get("k").await.unwrap().as_deref(), Some("12"));
    }
}
