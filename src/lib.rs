//! # Topicgraph
//!
//! Density-based topic clustering and evolution tracking for embedded content.
//!
//! Topicgraph organizes a growing collection of embedded content units into
//! coherent topic clusters and tracks how those clusters split, merge, and
//! continue across successive runs, persisting the result as a versioned
//! graph of clusters, assignments, and evolution edges.
//!
//! ## Features
//!
//! - DBSCAN clustering over cosine distance with explicit outlier handling
//! - Centroid computation and nearest-to-centroid representative selection
//! - Human-readable cluster labels via a pluggable LLM provider, with a
//!   deterministic term-frequency fallback
//! - Split / merge / continuation detection between runs via transition
//!   matrices, with reproducible confidence scoring
//! - Transactional persistence to `SQLite` with full assignment history
//!
//! ## Example
//!
//! ```rust,ignore
//! use topicgraph::{ClusteringPipeline, TopicgraphConfig, Partition};
//! use topicgraph::storage::SqliteGraphStore;
//!
//! let store = SqliteGraphStore::new("topics.db")?;
//! let pipeline = ClusteringPipeline::new(store, TopicgraphConfig::default());
//! let summary = pipeline.run(&Partition::new("default"))?;
//! println!("{}", summary.describe());
//! ```

#![deny(clippy::all)]
#![warn(clippy::pedantic)]
#![warn(clippy::nursery)]
#![warn(missing_docs)]
#![forbid(unsafe_code)]
// multiple_crate_versions is inherently crate-level (detects duplicate transitive dependencies).
#![allow(clippy::multiple_crate_versions)]

use thiserror::Error as ThisError;

// Module declarations
pub mod cli;
pub mod clustering;
pub mod config;
pub mod evolution;
pub mod labeling;
pub mod llm;
pub mod models;
pub mod pipeline;
pub mod storage;

// Re-exports for convenience
pub use clustering::{ClusterOutcome, DensityClusterer};
pub use config::{ClusteringParams, MinClusterSize, TopicgraphConfig};
pub use evolution::EvolutionTracker;
pub use labeling::LabelSynthesizer;
pub use llm::LlmProvider;
pub use models::{
    Assignment, Cluster, ClusterId, ClusterStatus, ContentUnit, EvolutionEdge, EvolutionType,
    Partition, RunId, RunState, RunStatus, RunSummary, UnitId,
};
pub use pipeline::ClusteringPipeline;
pub use storage::{GraphStore, InMemoryGraphStore, SqliteGraphStore};

/// Error type for topicgraph operations.
///
/// Uses `thiserror` for automatic `Display` and `Error` trait implementations.
///
/// # Error Variant Triggers
///
/// | Variant | Raised When |
/// |---------|-------------|
/// | `InvalidInput` | Malformed configuration, empty partition names, bad parameters |
/// | `Extraction` | The graph store is unreachable while reading embedded units |
/// | `Clustering` | The density algorithm receives malformed embeddings |
/// | `LabelGeneration` | The text-generation provider fails for one cluster |
/// | `Persistence` | A graph store write fails (`transient` marks retryable failures) |
/// | `RunInProgress` | A run is started while another run for the partition is active |
#[derive(Debug, ThisError)]
pub enum Error {
    /// Invalid input was provided.
    ///
    /// Raised when:
    /// - Configuration values are out of range (e.g. epsilon <= 0)
    /// - A partition name is empty
    /// - Embeddings have inconsistent dimensionality at the API boundary
    #[error("invalid input: {0}")]
    InvalidInput(String),

    /// Reading embedded units from the graph store failed.
    ///
    /// This aborts the run before any write happens.
    #[error("extraction failed: {cause}")]
    Extraction {
        /// The underlying cause.
        cause: String,
    },

    /// The clustering algorithm failed internally.
    ///
    /// Raised when embeddings are malformed (NaN components, mismatched
    /// dimensions) in a way the clusterer cannot recover from. The run is
    /// recorded as failed.
    #[error("clustering failed: {cause}")]
    Clustering {
        /// The underlying cause.
        cause: String,
    },

    /// Label generation failed for a cluster.
    ///
    /// Always recovered via the deterministic fallback label; this variant
    /// never crosses the pipeline boundary.
    #[error("label generation failed for cluster '{cluster_id}': {cause}")]
    LabelGeneration {
        /// The cluster whose label could not be generated.
        cluster_id: String,
        /// The underlying cause.
        cause: String,
    },

    /// A graph store operation failed.
    ///
    /// `transient` failures (locked database, connection reset) are retried
    /// with exponential backoff by the persistence writer; persistent
    /// failures mark the run failed without partial writes.
    #[error("persistence operation '{operation}' failed: {cause}")]
    Persistence {
        /// The operation that failed.
        operation: String,
        /// The underlying cause.
        cause: String,
        /// Whether the failure is worth retrying.
        transient: bool,
    },

    /// Another run for the same partition is still in progress.
    ///
    /// Runs within one partition are serialized by checking the latest
    /// `RunState` status before starting. This is a fatal precondition
    /// failure, not something to retry.
    #[error("a run for partition '{partition}' is already in progress")]
    RunInProgress {
        /// The partition whose runs collided.
        partition: String,
    },
}

impl Error {
    /// Returns true if the error is a transient persistence failure.
    #[must_use]
    pub const fn is_transient(&self) -> bool {
        matches!(self, Self::Persistence { transient: true, .. })
    }
}

/// Result type alias for topicgraph operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Returns the current Unix timestamp in seconds.
///
/// Centralized utility to avoid duplicate implementations across the
/// codebase. Uses `SystemTime::now()` with fallback to 0 if the system
/// clock is before the Unix epoch.
///
/// # Examples
///
/// ```rust
/// use topicgraph::current_timestamp;
///
/// let ts = current_timestamp();
/// assert!(ts > 0);
/// ```
#[must_use]
pub fn current_timestamp() -> u64 {
    use std::time::{SystemTime, UNIX_EPOCH};
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs())
        .unwrap_or(0)
}
