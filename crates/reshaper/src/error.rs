//! Error types for the reshaping engine.

use thiserror::Error;

/// Main error type for reshaping operations.
#[derive(Error, Debug)]
pub enum ReshapeError {
    /// Mapping or runtime configuration error (invalid YAML, missing
    /// unique key, relation field without a relation table, etc.)
    #[error("Configuration error: {0}")]
    Config(String),

    /// A backend could not be reached or opened: database connections in
    /// driver-backed [`Database`](crate::db::Database) implementations,
    /// or the checkpoint store behind a run.
    #[error("Connection error: {0}")]
    Connection(String),

    /// A query against a specific table failed.
    #[error("Query failed for table {table}: {message}")]
    Query { table: String, message: String },

    /// Checkpoint store error (unreachable store, unparsable stored value).
    #[error("Checkpoint error: {0}")]
    Checkpoint(String),

    /// IO error (file operations).
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// YAML serialization/deserialization error.
    #[error("YAML error: {0}")]
    Yaml(#[from] serde_yaml::Error),

    /// JSON serialization/deserialization error.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl ReshapeError {
    /// Create a Config error.
    pub fn config(message: impl Into<String>) -> Self {
        ReshapeError::Config(message.into())
    }

    /// Create a Connection error.
    pub fn connection(message: impl Into<String>) -> Self {
        ReshapeError::Connection(message.into())
    }

    /// Create a Query error tagged with the offending table.
    pub fn query(table: impl Into<String>, message: impl Into<String>) -> Self {
        ReshapeError::Query {
            table: table.into(),
            message: message.into(),
        }
    }

    /// Create a Checkpoint error.
    pub fn checkpoint(message: impl Into<String>) -> Self {
        ReshapeError::Checkpoint(message.into())
    }
}

/// Result type alias for reshaping operations.
pub type Result<T> = std::result::Result<T, ReshapeError>;
