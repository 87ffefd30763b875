//! External collaborator traits.
//!
//! The engine never talks to a database or checkpoint store directly; it
//! works against these traits. Source and destination are independent
//! instances of the same [`Database`] interface.
//!
//! # Thread Safety
//!
//! Implementations must be `Send + Sync` to allow sharing across async tasks.

mod memory;

pub use memory::{MemoryDb, MemoryStore};

use async_trait::async_trait;

use crate::error::Result;
use crate::value::{Row, Value};

/// Name of the generated primary-key column, on both sides.
///
/// [`Database::insert_row`] implementations store the generated key under
/// this column, and unique-key lookups read it back from there. The
/// *source* column the runner strips is configurable separately via
/// [`Runner::with_pk_column`](crate::runner::Runner::with_pk_column).
pub const PK_COLUMN: &str = "id";

/// Row-level access to one relational database.
///
/// Scans are ordered by primary key ascending so that resumable runs
/// advance their checkpoint monotonically.
#[async_trait]
pub trait Database: Send + Sync {
    /// Fetch all rows of a table, ordered by primary key ascending.
    ///
    /// When `after` is set, only rows with a primary key strictly greater
    /// than that value are returned (keyset resume).
    async fn get_table_rows(&self, table: &str, after: Option<i64>) -> Result<Vec<Row>>;

    /// Count the rows of a table, honoring the same `after` bound
    /// as [`get_table_rows`](Database::get_table_rows).
    async fn get_table_row_count(&self, table: &str, after: Option<i64>) -> Result<i64>;

    /// Fetch one row by primary key.
    async fn get_row_by_pk(&self, table: &str, pk: i64) -> Result<Option<Row>>;

    /// Fetch one row where `field` equals `value`.
    ///
    /// Used for unique-key lookups (get-or-create). The column is expected
    /// to hold at most one matching row.
    async fn get_row_by_field(&self, table: &str, field: &str, value: &Value)
        -> Result<Option<Row>>;

    /// Insert a row and return its generated primary key.
    async fn insert_row(&self, table: &str, row: Row) -> Result<i64>;
}

/// An opaque key→string store holding per-mapping resume checkpoints.
///
/// Keys are namespaced per mapping name by the engine; the store itself
/// attaches no meaning to them.
#[async_trait]
pub trait CheckpointStore: std::fmt::Debug + Send + Sync {
    /// Read the value stored under `key`, if any.
    async fn get(&self, key: &str) -> Result<Option<String>>;

    /// Store `value` under `key`, replacing any previous value.
    async fn set(&self, key: &str, value: &str) -> Result<()>;
}
