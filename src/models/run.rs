//! Run states and run summaries.
//!
//! One [`RunState`] is recorded per orchestrator invocation and is immutable
//! once completed. The operator-visible outcome of every invocation is a
//! [`RunSummary`], never a raw error from deep inside the pipeline.

use crate::config::ClusteringParams;
use crate::models::unit::Partition;
use chrono::{TimeZone, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Unique identifier for a clustering run.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct RunId(String);

impl RunId {
    /// Creates a run ID from an existing string.
    #[must_use]
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Generates a new time-ordered run ID.
    #[must_use]
    pub fn generate() -> Self {
        Self(format!("run_{}", uuid::Uuid::now_v7().simple()))
    }

    /// Returns the run ID as a string slice.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Returns a short suffix suitable for embedding into cluster IDs.
    #[must_use]
    pub fn short_suffix(&self) -> &str {
        let s = self.0.strip_prefix("run_").unwrap_or(&self.0);
        &s[..s.len().min(8)]
    }
}

impl fmt::Display for RunId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl AsRef<str> for RunId {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

/// A run period in `YYYY-MM` form.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct RunPeriod(String);

impl RunPeriod {
    /// Creates a period from an existing string.
    #[must_use]
    pub fn new(period: impl Into<String>) -> Self {
        Self(period.into())
    }

    /// Derives the period containing the given Unix timestamp.
    #[must_use]
    pub fn from_timestamp(timestamp: u64) -> Self {
        let ts = i64::try_from(timestamp).unwrap_or(0);
        Utc.timestamp_opt(ts, 0).single().map_or_else(
            || Self("1970-01".to_string()),
            |dt| Self(dt.format("%Y-%m").to_string()),
        )
    }

    /// Derives the current period.
    #[must_use]
    pub fn current() -> Self {
        Self::from_timestamp(crate::current_timestamp())
    }

    /// Returns the period as a string slice.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for RunPeriod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Persisted status of a clustering run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RunStatus {
    /// The run is currently executing.
    InProgress,
    /// The run completed and committed its results.
    Completed,
    /// The run failed; no partial writes are visible.
    Failed,
}

impl RunStatus {
    /// Returns the status as a string slice.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::InProgress => "in_progress",
            Self::Completed => "completed",
            Self::Failed => "failed",
        }
    }

    /// Parses a status from a string.
    #[must_use]
    pub fn parse(s: &str) -> Option<Self> {
        match s.to_lowercase().as_str() {
            "in_progress" | "in-progress" => Some(Self::InProgress),
            "completed" => Some(Self::Completed),
            "failed" => Some(Self::Failed),
            _ => None,
        }
    }
}

impl fmt::Display for RunStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Persisted metadata for one clustering run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RunState {
    /// Unique identifier.
    pub id: RunId,
    /// Partition the run processed.
    pub partition: Partition,
    /// The run period.
    pub period: RunPeriod,
    /// Unix timestamp when the run started.
    pub timestamp: u64,
    /// Number of clusters produced.
    pub cluster_count: usize,
    /// Number of units marked as outliers.
    pub outlier_count: usize,
    /// Total units processed.
    pub total_units: usize,
    /// Fraction of units marked as outliers.
    pub outlier_ratio: f32,
    /// Mean cluster size.
    pub avg_cluster_size: f32,
    /// Algorithm parameters used.
    pub params: ClusteringParams,
    /// Execution duration in milliseconds.
    pub duration_ms: u64,
    /// Derived quality score in [0, 1].
    pub quality_score: f32,
    /// Run status.
    pub status: RunStatus,
    /// Error detail when the run failed.
    pub error_detail: Option<String>,
    /// Hash of the configuration used.
    pub config_hash: String,
    /// The run this one supersedes, when applicable.
    pub supersedes: Option<RunId>,
}

impl RunState {
    /// Creates a new in-progress run state.
    #[must_use]
    pub fn begin(partition: Partition, params: ClusteringParams, config_hash: String) -> Self {
        let timestamp = crate::current_timestamp();
        Self {
            id: RunId::generate(),
            partition,
            period: RunPeriod::from_timestamp(timestamp),
            timestamp,
            cluster_count: 0,
            outlier_count: 0,
            total_units: 0,
            outlier_ratio: 0.0,
            avg_cluster_size: 0.0,
            params,
            duration_ms: 0,
            quality_score: 0.0,
            status: RunStatus::InProgress,
            error_detail: None,
            config_hash,
            supersedes: None,
        }
    }

    /// Marks the run failed with the given error detail.
    #[must_use]
    pub fn failed(mut self, detail: impl Into<String>, duration_ms: u64) -> Self {
        self.status = RunStatus::Failed;
        self.error_detail = Some(detail.into());
        self.duration_ms = duration_ms;
        self
    }
}

/// Final disposition of one orchestrator invocation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RunOutcome {
    /// The pipeline ran to completion and committed.
    Completed,
    /// A guard condition skipped the run (not an error, nothing written).
    Skipped,
    /// The run failed and was recorded as failed.
    Failed,
}

impl RunOutcome {
    /// Returns the outcome as a string slice.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Completed => "completed",
            Self::Skipped => "skipped",
            Self::Failed => "failed",
        }
    }
}

impl fmt::Display for RunOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Structured summary of one orchestrator invocation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RunSummary {
    /// Partition the invocation targeted.
    pub partition: Partition,
    /// Run identifier, when a run state was written.
    pub run_id: Option<RunId>,
    /// Final disposition.
    pub outcome: RunOutcome,
    /// Why the run was skipped, when it was.
    pub skip_reason: Option<String>,
    /// Clusters created.
    pub clusters_created: usize,
    /// Total units considered.
    pub units_total: usize,
    /// Units assigned to clusters.
    pub units_clustered: usize,
    /// Units marked as outliers.
    pub outlier_count: usize,
    /// Fraction of units marked as outliers.
    pub outlier_ratio: f32,
    /// Execution time in milliseconds.
    pub duration_ms: u64,
    /// Split edges detected.
    pub splits: usize,
    /// Merge edges detected.
    pub merges: usize,
    /// Continuation edges detected.
    pub continuations: usize,
    /// Quality warnings raised during the run.
    pub warnings: Vec<String>,
    /// Error detail when the run failed.
    pub error_detail: Option<String>,
}

impl RunSummary {
    /// Creates a skip summary with the given reason.
    #[must_use]
    pub fn skipped(partition: Partition, reason: impl Into<String>, units_total: usize) -> Self {
        Self {
            partition,
            run_id: None,
            outcome: RunOutcome::Skipped,
            skip_reason: Some(reason.into()),
            clusters_created: 0,
            units_total,
            units_clustered: 0,
            outlier_count: 0,
            outlier_ratio: 0.0,
            duration_ms: 0,
            splits: 0,
            merges: 0,
            continuations: 0,
            warnings: Vec::new(),
            error_detail: None,
        }
    }

    /// Returns a human-readable one-line description.
    #[must_use]
    pub fn describe(&self) -> String {
        match self.outcome {
            RunOutcome::Skipped => format!(
                "skipped partition '{}': {}",
                self.partition,
                self.skip_reason.as_deref().unwrap_or("no reason recorded")
            ),
            RunOutcome::Failed => format!(
                "failed partition '{}': {}",
                self.partition,
                self.error_detail.as_deref().unwrap_or("unknown error")
            ),
            RunOutcome::Completed => format!(
                "partition '{}': {} clusters, {}/{} units clustered, {} outliers ({:.0}%), \
                 {} splits, {} merges, {} continuations in {}ms",
                self.partition,
                self.clusters_created,
                self.units_clustered,
                self.units_total,
                self.outlier_count,
                f64::from(self.outlier_ratio) * 100.0,
                self.splits,
                self.merges,
                self.continuations,
                self.duration_ms
            ),
        }
    }
}
