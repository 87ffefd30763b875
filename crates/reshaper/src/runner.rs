//! Resumable per-mapping execution loop.
//!
//! The runner scans a mapping's source table in ascending primary-key
//! order, resolves each row, and advances the mapping's checkpoint after
//! every successfully processed row. A failure aborts the run and leaves
//! the checkpoint at the last completed row, so a rerun resumes cleanly
//! past everything already migrated.

use std::sync::Arc;

use tracing::{debug, info};

use crate::checkpoint::Checkpoint;
use crate::db::{CheckpointStore, Database, PK_COLUMN};
use crate::error::{ReshapeError, Result};
use crate::mapping::Mapping;
use crate::resolver::{Resolved, Resolver};
use crate::value::Value;

/// Runs one mapping over its source table with optional resume support.
pub struct Runner {
    source: Arc<dyn Database>,
    resolver: Resolver,
    store: Option<Arc<dyn CheckpointStore>>,
    pk_column: String,
}

impl Runner {
    /// Create a runner over a source and a destination database.
    pub fn new(source: Arc<dyn Database>, destination: Arc<dyn Database>) -> Self {
        Self {
            resolver: Resolver::new(source.clone(), destination),
            source,
            store: None,
            pk_column: PK_COLUMN.to_string(),
        }
    }

    /// Enable resumable checkpointing backed by `store`.
    pub fn with_checkpoints(mut self, store: Arc<dyn CheckpointStore>) -> Self {
        self.store = Some(store);
        self
    }

    /// Override the source primary-key column name (default `id`).
    pub fn with_pk_column(mut self, column: impl Into<String>) -> Self {
        self.pk_column = column.into();
        self
    }

    /// Run `mapping` over its source table and return the number of rows
    /// processed.
    ///
    /// With checkpointing enabled, only rows with a primary key greater
    /// than the stored `last_source_index` are scanned; rows already
    /// migrated are never reprocessed or duplicated.
    pub async fn run(&self, mapping: &Mapping) -> Result<u64> {
        let name = mapping.name();
        let table = mapping.source().ok_or_else(|| {
            ReshapeError::config(format!("mapping {} declares no source table to run", name))
        })?;

        let mut checkpoint = match &self.store {
            Some(store) => Checkpoint::load(store.as_ref(), name).await?,
            None => Checkpoint::default(),
        };
        let after = self.store.as_ref().map(|_| checkpoint.last_source_key);

        let total = self.source.get_table_row_count(table, after).await?;
        info!(mapping = name, table, rows = total, "transforming");

        let rows = self.source.get_table_rows(table, after).await?;
        let mut count = 0u64;

        for mut row in rows {
            // The source key never travels into the destination payload
            // unless a field explicitly maps it.
            let source_pk = row
                .shift_remove(&self.pk_column)
                .as_ref()
                .and_then(Value::as_int);

            let resolved = self.resolver.insert(mapping, &row).await?;

            if let Some(pk) = source_pk {
                checkpoint.last_source_key = pk;
            }
            if let Resolved::Key(pk) = resolved {
                checkpoint.last_destination_key = pk;
            }
            count += 1;
            debug!(
                mapping = name,
                processed = count,
                last_source_key = checkpoint.last_source_key,
                "row transformed"
            );

            if let Some(store) = &self.store {
                checkpoint.store(store.as_ref(), name).await?;
            }
        }

        info!(mapping = name, rows = count, "transformation finished");
        Ok(count)
    }
}
