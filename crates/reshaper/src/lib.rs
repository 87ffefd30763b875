//! # reshaper
//!
//! Declarative data migration between two differently-shaped relational
//! schemas.
//!
//! Rows are read from source tables, reshaped according to per-table
//! [`Mapping`] definitions, and written into the destination schema with:
//!
//! - **Recursive resolution** of foreign-key and relation-table graphs in
//!   strict bottom-up insert order
//! - **Get-or-create deduplication** via unique-key lookups
//! - **Deferred relation-table writes** once the parent's key is known
//! - **Resumable runs** checkpointed in an external key-value store
//!
//! ## Example
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use reshaper::{Field, Mapping, MemoryDb, Orchestrator, Runner};
//!
//! #[tokio::main]
//! async fn main() -> reshaper::Result<()> {
//!     let source = Arc::new(MemoryDb::new());
//!     let destination = Arc::new(MemoryDb::new());
//!
//!     let author = Arc::new(
//!         Mapping::new("author", "new_author")
//!             .source_table("author")
//!             .link_column("author_id")
//!             .field("author_name", Field::direct("name"))
//!             .field("author_age", Field::direct("age")),
//!     );
//!     let movie = Arc::new(
//!         Mapping::new("movie", "new_movie")
//!             .source_table("movie")
//!             .field("title", Field::direct("title"))
//!             .field(
//!                 "author_id",
//!                 Field::relation("author_id", "movie_author", "movie_id").via(author),
//!             ),
//!     );
//!
//!     let mut orchestrator = Orchestrator::new(Runner::new(source, destination));
//!     orchestrator.register(movie);
//!     let report = orchestrator.run_all().await?;
//!     println!("Processed {} rows", report.rows_processed);
//!     Ok(())
//! }
//! ```

pub mod checkpoint;
pub mod config;
pub mod db;
pub mod error;
pub mod mapping;
pub mod orchestrator;
pub mod resolver;
pub mod runner;
pub mod value;

// Re-exports for convenient access
pub use checkpoint::{Checkpoint, FileStore};
pub use config::{CheckpointConfig, Config, DbConfig};
pub use db::{CheckpointStore, Database, MemoryDb, MemoryStore, PK_COLUMN};
pub use error::{ReshapeError, Result};
pub use mapping::{Action, Dedup, Field, FieldKind, Filter, Mapping, RelationTarget};
pub use orchestrator::{MappingReport, Orchestrator, RunReport};
pub use resolver::{Resolved, Resolver};
pub use runner::Runner;
pub use value::{row, Row, Value};
