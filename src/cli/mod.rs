//! CLI command implementations.
//!
//! # Commands
//!
//! | Command | Description |
//! |---------|-------------|
//! | `run` | Execute one clustering run for a partition |
//! | `status` | Show store statistics and the active clusters |
//! | `history` | List recent runs for a partition |

use crate::llm::LlmProvider;
use crate::models::Partition;
use crate::pipeline::ClusteringPipeline;
use crate::storage::{GraphStore, SqliteGraphStore};
use crate::{Result, TopicgraphConfig};
use std::sync::Arc;

/// Run command handler.
pub struct RunCommand {
    partition: String,
    json: bool,
}

impl RunCommand {
    /// Creates a run command for the given partition.
    #[must_use]
    pub fn new(partition: impl Into<String>, json: bool) -> Self {
        Self {
            partition: partition.into(),
            json,
        }
    }

    /// Executes one clustering run and prints the summary.
    ///
    /// # Errors
    ///
    /// Returns an error when the store cannot be opened or a run
    /// precondition fails.
    pub fn execute(
        &self,
        config: &TopicgraphConfig,
        provider: Option<Arc<dyn LlmProvider>>,
    ) -> Result<String> {
        let store = SqliteGraphStore::new(&config.db_path)?;
        let mut pipeline = ClusteringPipeline::new(store, config.clone());
        if let Some(provider) = provider {
            pipeline = pipeline.with_llm(provider);
        }

        let summary = pipeline.run(&Partition::new(self.partition.clone()))?;
        if self.json {
            Ok(serde_json::to_string_pretty(&summary).unwrap_or_else(|_| summary.describe()))
        } else {
            Ok(summary.describe())
        }
    }
}

/// Status command handler.
pub struct StatusCommand {
    partition: String,
}

impl StatusCommand {
    /// Creates a status command for the given partition.
    #[must_use]
    pub fn new(partition: impl Into<String>) -> Self {
        Self {
            partition: partition.into(),
        }
    }

    /// Reports store statistics and the partition's active clusters.
    ///
    /// # Errors
    ///
    /// Returns an error when the store cannot be read.
    pub fn execute(&self, config: &TopicgraphConfig) -> Result<String> {
        let store = SqliteGraphStore::new(&config.db_path)?;
        let partition = Partition::new(self.partition.clone());
        let stats = store.stats()?;
        let clusters = store.active_clusters(&partition)?;

        let mut out = format!(
            "store: {} units, {} clusters ({} active), {} assignments ({} primary), \
             {} evolution edges, {} runs\n",
            stats.unit_count,
            stats.cluster_count,
            stats.active_cluster_count,
            stats.assignment_count,
            stats.primary_assignment_count,
            stats.edge_count,
            stats.run_count,
        );

        if let Some(run) = store.latest_run(&partition)? {
            out.push_str(&format!(
                "latest run for '{}': {} ({}), quality {:.2}\n",
                partition,
                run.id,
                run.status,
                run.quality_score
            ));
        } else {
            out.push_str(&format!("no runs recorded for '{partition}'\n"));
        }

        for cluster in clusters {
            out.push_str(&format!(
                "  {} \"{}\" ({} members, confidence {:.2})\n",
                cluster.id, cluster.label, cluster.member_count, cluster.avg_confidence
            ));
        }
        Ok(out)
    }
}

/// History command handler.
pub struct HistoryCommand {
    partition: String,
    limit: usize,
}

impl HistoryCommand {
    /// Creates a history command for the given partition.
    #[must_use]
    pub fn new(partition: impl Into<String>, limit: usize) -> Self {
        Self {
            partition: partition.into(),
            limit,
        }
    }

    /// Lists recent runs, most recent first.
    ///
    /// # Errors
    ///
    /// Returns an error when the store cannot be read.
    pub fn execute(&self, config: &TopicgraphConfig) -> Result<String> {
        let store = SqliteGraphStore::new(&config.db_path)?;
        let partition = Partition::new(self.partition.clone());
        let runs = store.run_history(&partition, self.limit.max(1))?;

        if runs.is_empty() {
            return Ok(format!("no runs recorded for '{partition}'"));
        }

        let mut out = String::new();
        for run in runs {
            out.push_str(&format!(
                "{} [{}] {}: {} clusters, {}/{} outliers, quality {:.2}, {}ms",
                run.id,
                run.period,
                run.status,
                run.cluster_count,
                run.outlier_count,
                run.total_units,
                run.quality_score,
                run.duration_ms,
            ));
            if let Some(detail) = &run.error_detail {
                out.push_str(&format!(" ({detail})"));
            }
            out.push('\n');
        }
        Ok(out)
    }
}
