//! In-memory graph store.
//!
//! Mirrors the `SQLite` store's semantics without touching disk. Used in
//! tests and as a scratch backend; supports injecting transient commit
//! failures to exercise the retry path.

use crate::models::{
    Assignment, Cluster, ClusterId, ContentUnit, EvolutionEdge, Partition, RunState, UnitId,
};
use crate::storage::traits::{GraphStore, GraphStoreStats, RunCommit};
use crate::{Error, Result};
use std::collections::HashMap;
use std::sync::RwLock;
use std::sync::atomic::{AtomicU32, Ordering};

#[derive(Debug, Default)]
struct Inner {
    units: Vec<ContentUnit>,
    runs: Vec<RunState>,
    clusters: HashMap<ClusterId, Cluster>,
    assignments: Vec<Assignment>,
    edges: Vec<(Partition, EvolutionEdge)>,
}

/// In-memory graph store.
#[derive(Debug, Default)]
pub struct InMemoryGraphStore {
    inner: RwLock<Inner>,
    /// Remaining commit attempts to fail with a transient error.
    transient_failures: AtomicU32,
}

impl InMemoryGraphStore {
    /// Creates an empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Makes the next `n` commit attempts fail with a transient
    /// persistence error.
    #[must_use]
    pub fn with_transient_failures(self, n: u32) -> Self {
        self.transient_failures.store(n, Ordering::SeqCst);
        self
    }

    fn read(&self) -> std::sync::RwLockReadGuard<'_, Inner> {
        self.inner.read().unwrap_or_else(std::sync::PoisonError::into_inner)
    }

    fn write(&self) -> std::sync::RwLockWriteGuard<'_, Inner> {
        self.inner.write().unwrap_or_else(std::sync::PoisonError::into_inner)
    }
}

impl GraphStore for InMemoryGraphStore {
    fn insert_unit(&self, unit: &ContentUnit) -> Result<()> {
        let mut inner = self.write();
        inner.units.retain(|u| u.id != unit.id);
        inner.units.push(unit.clone());
        Ok(())
    }

    fn fetch_embedded_units(&self, partition: &Partition) -> Result<Vec<ContentUnit>> {
        let inner = self.read();
        Ok(inner
            .units
            .iter()
            .filter(|u| u.partition == *partition)
            .cloned()
            .collect())
    }

    fn latest_run(&self, partition: &Partition) -> Result<Option<RunState>> {
        let inner = self.read();
        // Run ids are time-ordered, which breaks same-second timestamp ties.
        Ok(inner
            .runs
            .iter()
            .filter(|r| r.partition == *partition)
            .max_by(|a, b| {
                a.timestamp
                    .cmp(&b.timestamp)
                    .then_with(|| a.id.as_str().cmp(b.id.as_str()))
            })
            .cloned())
    }

    fn run_history(&self, partition: &Partition, limit: usize) -> Result<Vec<RunState>> {
        let inner = self.read();
        let mut runs: Vec<RunState> = inner
            .runs
            .iter()
            .filter(|r| r.partition == *partition)
            .cloned()
            .collect();
        runs.sort_by(|a, b| {
            b.timestamp
                .cmp(&a.timestamp)
                .then_with(|| b.id.as_str().cmp(a.id.as_str()))
        });
        runs.truncate(limit);
        Ok(runs)
    }

    fn primary_assignments(&self, partition: &Partition) -> Result<HashMap<UnitId, ClusterId>> {
        let inner = self.read();
        Ok(inner
            .assignments
            .iter()
            .filter(|a| a.is_primary)
            .filter(|a| {
                inner
                    .clusters
                    .get(&a.cluster_id)
                    .is_some_and(|c| c.partition == *partition)
            })
            .map(|a| (a.unit_id.clone(), a.cluster_id.clone()))
            .collect())
    }

    fn get_cluster(&self, id: &ClusterId) -> Result<Option<Cluster>> {
        Ok(self.read().clusters.get(id).cloned())
    }

    fn active_clusters(&self, partition: &Partition) -> Result<Vec<Cluster>> {
        let inner = self.read();
        let mut clusters: Vec<Cluster> = inner
            .clusters
            .values()
            .filter(|c| c.partition == *partition)
            .filter(|c| c.status == crate::models::ClusterStatus::Active)
            .cloned()
            .collect();
        clusters.sort_by(|a, b| a.id.as_str().cmp(b.id.as_str()));
        Ok(clusters)
    }

    fn assignments_for_unit(&self, unit_id: &UnitId) -> Result<Vec<Assignment>> {
        let inner = self.read();
        let mut assignments: Vec<Assignment> = inner
            .assignments
            .iter()
            .filter(|a| a.unit_id == *unit_id)
            .cloned()
            .collect();
        assignments.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        Ok(assignments)
    }

    fn evolution_edges(&self, partition: &Partition) -> Result<Vec<EvolutionEdge>> {
        let inner = self.read();
        Ok(inner
            .edges
            .iter()
            .filter(|(p, _)| p == partition)
            .map(|(_, e)| e.clone())
            .collect())
    }

    fn commit_run(&self, commit: &RunCommit) -> Result<()> {
        let remaining = self.transient_failures.load(Ordering::SeqCst);
        if remaining > 0 {
            self.transient_failures.store(remaining - 1, Ordering::SeqCst);
            return Err(Error::Persistence {
                operation: "commit_run".to_string(),
                cause: "injected transient failure".to_string(),
                transient: true,
            });
        }

        let mut inner = self.write();

        let reassigned: Vec<UnitId> = commit
            .assignments
            .iter()
            .map(|a| a.unit_id.clone())
            .collect();
        for assignment in &mut inner.assignments {
            if assignment.is_primary && reassigned.contains(&assignment.unit_id) {
                assignment.is_primary = false;
            }
        }

        for cluster in &commit.clusters {
            inner.clusters.insert(cluster.id.clone(), cluster.clone());
        }
        inner.assignments.extend(commit.assignments.iter().cloned());
        for edge in &commit.edges {
            inner
                .edges
                .push((commit.run.partition.clone(), edge.clone()));
        }
        for (cluster_id, status) in &commit.superseded_clusters {
            if let Some(cluster) = inner.clusters.get_mut(cluster_id) {
                cluster.status = *status;
            }
        }
        inner.runs.retain(|r| r.id != commit.run.id);
        inner.runs.push(commit.run.clone());
        Ok(())
    }

    fn record_failed_run(&self, run: &RunState) -> Result<()> {
        let mut inner = self.write();
        inner.runs.retain(|r| r.id != run.id);
        inner.runs.push(run.clone());
        Ok(())
    }

    fn stats(&self) -> Result<GraphStoreStats> {
        let inner = self.read();
        Ok(GraphStoreStats {
            unit_count: inner.units.len(),
            cluster_count: inner.clusters.len(),
            active_cluster_count: inner
                .clusters
                .values()
                .filter(|c| c.status == crate::models::ClusterStatus::Active)
                .count(),
            assignment_count: inner.assignments.len(),
            primary_assignment_count: inner
                .assignments
                .iter()
                .filter(|a| a.is_primary)
                .count(),
            edge_count: inner.edges.len(),
            run_count: inner.runs.len(),
        })
    }
}
