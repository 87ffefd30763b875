//! Batch orchestration over registered mappings.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::info;

use crate::error::Result;
use crate::mapping::Mapping;
use crate::runner::Runner;

/// Runs the execution loop over an ordered set of registered mappings.
///
/// Registration order is significant: the resolver recursively resolves
/// dependencies on demand, but running dependency tables first avoids
/// redundant re-resolution when get-or-create lookups are in play.
pub struct Orchestrator {
    runner: Runner,
    mappings: Vec<Arc<Mapping>>,
}

/// Summary of one `run_all` pass.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunReport {
    /// When the run started.
    pub started_at: DateTime<Utc>,

    /// When the run completed.
    pub completed_at: DateTime<Utc>,

    /// Total duration in seconds.
    pub duration_seconds: f64,

    /// Total rows processed across all mappings.
    pub rows_processed: u64,

    /// Per-mapping counts, in execution order.
    pub mappings: Vec<MappingReport>,
}

/// Per-mapping slice of a [`RunReport`].
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MappingReport {
    /// Mapping name.
    pub name: String,

    /// Rows processed for this mapping.
    pub rows_processed: u64,
}

impl Orchestrator {
    /// Create an orchestrator around a configured [`Runner`].
    pub fn new(runner: Runner) -> Self {
        Self {
            runner,
            mappings: Vec::new(),
        }
    }

    /// Register a mapping. Mappings run in registration order.
    pub fn register(&mut self, mapping: Arc<Mapping>) {
        self.mappings.push(mapping);
    }

    /// Run a single mapping and return the rows processed.
    pub async fn run_one(&self, mapping: &Mapping) -> Result<u64> {
        self.runner.run(mapping).await
    }

    /// Run every registered mapping in order.
    ///
    /// Fails fast: the first mapping error aborts the pass, leaving
    /// checkpoints at the last successfully processed rows.
    pub async fn run_all(&self) -> Result<RunReport> {
        let started_at = Utc::now();
        let mut reports = Vec::with_capacity(self.mappings.len());
        let mut rows_processed = 0u64;

        for mapping in &self.mappings {
            let rows = self.runner.run(mapping).await?;
            rows_processed += rows;
            reports.push(MappingReport {
                name: mapping.name().to_string(),
                rows_processed: rows,
            });
        }

        let completed_at = Utc::now();
        let duration_seconds = (completed_at - started_at).num_milliseconds() as f64 / 1000.0;
        info!(
            mappings = reports.len(),
            rows = rows_processed,
            duration_seconds,
            "run complete"
        );

        Ok(RunReport {
            started_at,
            completed_at,
            duration_seconds,
            rows_processed,
            mappings: reports,
        })
    }
}
