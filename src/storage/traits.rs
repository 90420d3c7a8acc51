//! Graph store abstraction.

use crate::Result;
use crate::models::{
    Assignment, Cluster, ClusterId, ClusterStatus, ContentUnit, EvolutionEdge, Partition, RunState,
    UnitId,
};
use std::collections::HashMap;

/// Statistics about a graph store.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct GraphStoreStats {
    /// Total content units.
    pub unit_count: usize,
    /// Total clusters across all runs.
    pub cluster_count: usize,
    /// Clusters still marked active.
    pub active_cluster_count: usize,
    /// Total assignment edges, including archived ones.
    pub assignment_count: usize,
    /// Assignment edges currently marked primary.
    pub primary_assignment_count: usize,
    /// Evolution edges.
    pub edge_count: usize,
    /// Recorded runs.
    pub run_count: usize,
}

/// Everything a completed run writes, committed atomically.
///
/// The store must apply the whole commit in one transaction: archive the old
/// primary assignments for the affected units, insert the new clusters,
/// assignments, and evolution edges, transition superseded cluster statuses,
/// and record the run. No partial commit may ever be externally visible.
#[derive(Debug, Clone)]
pub struct RunCommit {
    /// The completed run state.
    pub run: RunState,
    /// Clusters discovered by the run.
    pub clusters: Vec<Cluster>,
    /// New primary assignments.
    pub assignments: Vec<Assignment>,
    /// Evolution edges detected against the previous run.
    pub edges: Vec<EvolutionEdge>,
    /// Old clusters whose status transitions (split or merged away).
    pub superseded_clusters: Vec<(ClusterId, ClusterStatus)>,
}

/// Backend trait for the versioned topic graph.
///
/// Implementations must be safe to share across threads; runs in distinct
/// partitions may execute concurrently against one store.
pub trait GraphStore: Send + Sync {
    /// Inserts or replaces a content unit.
    ///
    /// # Errors
    ///
    /// Returns an error if the write fails.
    fn insert_unit(&self, unit: &ContentUnit) -> Result<()>;

    /// Fetches all embedded units in a partition.
    ///
    /// # Errors
    ///
    /// Returns `Error::Extraction` if the store is unreachable.
    fn fetch_embedded_units(&self, partition: &Partition) -> Result<Vec<ContentUnit>>;

    /// Returns the most recent run for a partition, if any.
    ///
    /// # Errors
    ///
    /// Returns an error if the read fails.
    fn latest_run(&self, partition: &Partition) -> Result<Option<RunState>>;

    /// Returns up to `limit` runs for a partition, most recent first.
    ///
    /// # Errors
    ///
    /// Returns an error if the read fails.
    fn run_history(&self, partition: &Partition, limit: usize) -> Result<Vec<RunState>>;

    /// Returns the current primary assignment per unit in a partition.
    ///
    /// # Errors
    ///
    /// Returns an error if the read fails.
    fn primary_assignments(&self, partition: &Partition) -> Result<HashMap<UnitId, ClusterId>>;

    /// Fetches one cluster by ID.
    ///
    /// # Errors
    ///
    /// Returns an error if the read fails.
    fn get_cluster(&self, id: &ClusterId) -> Result<Option<Cluster>>;

    /// Returns all clusters still marked active in a partition.
    ///
    /// # Errors
    ///
    /// Returns an error if the read fails.
    fn active_clusters(&self, partition: &Partition) -> Result<Vec<Cluster>>;

    /// Returns the full assignment history for one unit, newest first.
    ///
    /// # Errors
    ///
    /// Returns an error if the read fails.
    fn assignments_for_unit(&self, unit_id: &UnitId) -> Result<Vec<Assignment>>;

    /// Returns all evolution edges recorded for a partition.
    ///
    /// # Errors
    ///
    /// Returns an error if the read fails.
    fn evolution_edges(&self, partition: &Partition) -> Result<Vec<EvolutionEdge>>;

    /// Applies a run commit atomically.
    ///
    /// # Errors
    ///
    /// Returns `Error::Persistence` on failure; `transient` marks failures
    /// worth retrying (locked database, connection reset). On error, no part
    /// of the commit is visible.
    fn commit_run(&self, commit: &RunCommit) -> Result<()>;

    /// Records a failed run without touching clusters or assignments.
    ///
    /// # Errors
    ///
    /// Returns an error if the write fails.
    fn record_failed_run(&self, run: &RunState) -> Result<()>;

    /// Returns store-wide statistics.
    ///
    /// # Errors
    ///
    /// Returns an error if the read fails.
    fn stats(&self) -> Result<GraphStoreStats>;
}
