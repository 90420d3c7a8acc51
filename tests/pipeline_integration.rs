//! End-to-end pipeline tests over the in-memory and `SQLite` stores.
//!
//! Covers the full run lifecycle: guard conditions, clustering, labeling
//! fallback, evolution detection across successive runs, atomic commit
//! behavior, and the single-primary assignment invariant.

// Integration tests use expect/unwrap for simplicity - panics are acceptable in tests
#![allow(clippy::expect_used, clippy::unwrap_used)]

use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use tempfile::TempDir;
use topicgraph::config::{MinClusterSize, RetryPolicy};
use topicgraph::models::{EvolutionType, Partition, RunOutcome, RunStatus, UnitId};
use topicgraph::storage::{GraphStore, InMemoryGraphStore, SqliteGraphStore};
use topicgraph::{
    ClusteringPipeline, ContentUnit, Error, LlmProvider, Result, TopicgraphConfig,
};

// ============================================================================
// Test Helpers
// ============================================================================

/// A provider that always fails, exercising the fallback label path.
struct AlwaysFailingProvider;

impl LlmProvider for AlwaysFailingProvider {
    fn name(&self) -> &'static str {
        "always-failing"
    }

    fn complete(&self, _prompt: &str) -> Result<String> {
        Err(Error::LabelGeneration {
            cluster_id: String::new(),
            cause: "provider unavailable".to_string(),
        })
    }
}

/// A provider that counts calls and returns a fixed label.
struct CountingProvider {
    calls: AtomicUsize,
    label: &'static str,
}

impl CountingProvider {
    const fn new(label: &'static str) -> Self {
        Self {
            calls: AtomicUsize::new(0),
            label,
        }
    }
}

impl LlmProvider for CountingProvider {
    fn name(&self) -> &'static str {
        "counting"
    }

    fn complete(&self, _prompt: &str) -> Result<String> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        Ok(self.label.to_string())
    }
}

fn test_config() -> TopicgraphConfig {
    let mut config = TopicgraphConfig::default();
    config.clustering.min_cluster_size = MinClusterSize::Fixed(3);
    config.clustering.min_samples = 2;
    config.clustering.epsilon = 0.2;
    config.retry = RetryPolicy {
        max_attempts: 3,
        initial_backoff_ms: 1,
        backoff_multiplier: 1.0,
        max_backoff_ms: 1,
    };
    config
}

/// A tight group of `count` embeddings around a base direction.
fn seed_group(store: &dyn GraphStore, partition: &str, prefix: &str, base: [f32; 3], count: usize) {
    for i in 0..count {
        #[allow(clippy::cast_precision_loss)]
        let jitter = 0.01 * i as f32;
        let unit = ContentUnit::new(
            format!("{prefix}{i}"),
            Partition::new(partition),
            vec![base[0] + jitter, base[1] + jitter / 2.0, base[2]],
            format!("{prefix} summary about shared subject matter {i}"),
        );
        store.insert_unit(&unit).expect("insert unit");
    }
}

// ============================================================================
// Guard Conditions
// ============================================================================

#[test]
fn test_empty_partition_skips_without_run_state() {
    let store = InMemoryGraphStore::new();
    let pipeline = ClusteringPipeline::new(store, test_config());

    let summary = pipeline.run(&Partition::new("empty")).unwrap();
    assert_eq!(summary.outcome, RunOutcome::Skipped);
    assert!(summary.run_id.is_none());
    assert_eq!(pipeline.store().stats().unwrap().run_count, 0);
}

#[test]
fn test_below_double_min_cluster_size_skips_without_run_state() {
    let store = InMemoryGraphStore::new();
    // 5 units < 2 * min_cluster_size (3).
    seed_group(&store, "p", "u", [1.0, 0.0, 0.0], 5);
    let pipeline = ClusteringPipeline::new(store, test_config());

    let summary = pipeline.run(&Partition::new("p")).unwrap();
    assert_eq!(summary.outcome, RunOutcome::Skipped);
    assert_eq!(summary.units_total, 5);
    assert_eq!(summary.clusters_created, 0);
    assert_eq!(pipeline.store().stats().unwrap().run_count, 0);
}

#[test]
fn test_empty_partition_name_rejected() {
    let pipeline = ClusteringPipeline::new(InMemoryGraphStore::new(), test_config());
    let err = pipeline.run(&Partition::new("")).unwrap_err();
    assert!(matches!(err, Error::InvalidInput(_)));
}

// ============================================================================
// First Run
// ============================================================================

#[test]
fn test_first_run_two_groups_no_evolution_edges() {
    let store = InMemoryGraphStore::new();
    seed_group(&store, "p", "a", [1.0, 0.0, 0.0], 5);
    seed_group(&store, "p", "b", [0.0, 1.0, 0.0], 7);
    let pipeline = ClusteringPipeline::new(store, test_config());

    let summary = pipeline.run(&Partition::new("p")).unwrap();
    assert_eq!(summary.outcome, RunOutcome::Completed);
    assert_eq!(summary.clusters_created, 2);
    assert_eq!(summary.units_clustered, 12);
    assert_eq!(summary.outlier_count, 0);
    assert_eq!(summary.splits + summary.merges + summary.continuations, 0);

    let store = pipeline.store();
    assert!(store.evolution_edges(&Partition::new("p")).unwrap().is_empty());

    let run = store.latest_run(&Partition::new("p")).unwrap().unwrap();
    assert_eq!(run.status, RunStatus::Completed);
    assert_eq!(run.cluster_count, 2);
    assert!(run.quality_score > 0.5);
    assert!(!run.config_hash.is_empty());

    // Every cluster received a non-empty label even without a provider.
    for cluster in store.active_clusters(&Partition::new("p")).unwrap() {
        assert!(!cluster.label.is_empty());
    }
}

#[test]
fn test_failing_llm_still_completes_with_fallback_labels() {
    let store = InMemoryGraphStore::new();
    seed_group(&store, "p", "a", [1.0, 0.0, 0.0], 5);
    seed_group(&store, "p", "b", [0.0, 1.0, 0.0], 5);
    let pipeline = ClusteringPipeline::new(store, test_config())
        .with_llm(Arc::new(AlwaysFailingProvider));

    let summary = pipeline.run(&Partition::new("p")).unwrap();
    assert_eq!(summary.outcome, RunOutcome::Completed);

    let clusters = pipeline
        .store()
        .active_clusters(&Partition::new("p"))
        .unwrap();
    assert_eq!(clusters.len(), 2);
    for cluster in &clusters {
        assert!(!cluster.label.is_empty());
    }
}

#[test]
fn test_duplicate_generated_labels_are_disambiguated() {
    let store = InMemoryGraphStore::new();
    seed_group(&store, "p", "a", [1.0, 0.0, 0.0], 5);
    seed_group(&store, "p", "b", [0.0, 1.0, 0.0], 5);
    let pipeline = ClusteringPipeline::new(store, test_config())
        .with_llm(Arc::new(CountingProvider::new("Same Label")));

    pipeline.run(&Partition::new("p")).unwrap();

    let clusters = pipeline
        .store()
        .active_clusters(&Partition::new("p"))
        .unwrap();
    let mut labels: Vec<String> = clusters.iter().map(|c| c.label.clone()).collect();
    labels.sort();
    assert_eq!(labels.len(), 2);
    assert_ne!(labels[0], labels[1]);
    assert!(labels.iter().any(|l| l == "Same Label"));
}

// ============================================================================
// Evolution Across Runs
// ============================================================================

#[test]
fn test_rerun_continuation_and_single_primary_invariant() {
    let store = InMemoryGraphStore::new();
    seed_group(&store, "p", "a", [1.0, 0.0, 0.0], 6);
    seed_group(&store, "p", "b", [0.0, 1.0, 0.0], 6);
    let pipeline = ClusteringPipeline::new(store, test_config());

    let first = pipeline.run(&Partition::new("p")).unwrap();
    assert_eq!(first.outcome, RunOutcome::Completed);

    // Identical data clusters identically: both clusters continue.
    let second = pipeline.run(&Partition::new("p")).unwrap();
    assert_eq!(second.outcome, RunOutcome::Completed);
    assert_eq!(second.continuations, 2);
    assert_eq!(second.splits, 0);
    assert_eq!(second.merges, 0);

    let store = pipeline.store();
    // Single-primary invariant: one primary per unit even after re-runs.
    for i in 0..6 {
        for prefix in ["a", "b"] {
            let history = store
                .assignments_for_unit(&UnitId::new(format!("{prefix}{i}")))
                .unwrap();
            assert_eq!(history.len(), 2, "unit {prefix}{i} has full history");
            assert_eq!(
                history.iter().filter(|a| a.is_primary).count(),
                1,
                "unit {prefix}{i} has exactly one primary"
            );
        }
    }

    let stats = store.stats().unwrap();
    assert_eq!(stats.cluster_count, 4);
    assert_eq!(stats.primary_assignment_count, 12);
}

#[test]
fn test_split_detected_when_group_diverges() {
    let store = InMemoryGraphStore::new();
    // One cohesive group of 20.
    seed_group(&store, "p", "u", [1.0, 0.0, 0.0], 20);
    let pipeline = ClusteringPipeline::new(store, test_config());
    let first = pipeline.run(&Partition::new("p")).unwrap();
    assert_eq!(first.clusters_created, 1);

    // Drift 8 of the 20 to a new direction, then re-run.
    for i in 12..20 {
        #[allow(clippy::cast_precision_loss)]
        let jitter = 0.01 * (i - 12) as f32;
        let moved = ContentUnit::new(
            format!("u{i}"),
            Partition::new("p"),
            vec![jitter, 1.0, jitter / 2.0],
            format!("u drifted summary {i}"),
        );
        pipeline.store().insert_unit(&moved).unwrap();
    }

    let second = pipeline.run(&Partition::new("p")).unwrap();
    assert_eq!(second.outcome, RunOutcome::Completed);
    assert_eq!(second.clusters_created, 2);
    assert_eq!(second.splits, 2, "one split edge per destination");

    let edges = pipeline
        .store()
        .evolution_edges(&Partition::new("p"))
        .unwrap();
    let split_edges: Vec<_> = edges
        .iter()
        .filter(|e| e.evolution_type == EvolutionType::Split)
        .collect();
    assert_eq!(split_edges.len(), 2);

    let total: f32 = split_edges.iter().map(|e| e.proportion).sum();
    assert!(
        (total - 1.0).abs() < 0.1,
        "split proportions sum to {total}"
    );
    let mut proportions: Vec<f32> = split_edges.iter().map(|e| e.proportion).collect();
    proportions.sort_by(f32::total_cmp);
    assert!((proportions[0] - 0.4).abs() < 1e-6);
    assert!((proportions[1] - 0.6).abs() < 1e-6);

    // The old cluster is no longer active.
    let active = pipeline
        .store()
        .active_clusters(&Partition::new("p"))
        .unwrap();
    assert_eq!(active.len(), 2);
}

#[test]
fn test_merge_detected_when_groups_converge() {
    let store = InMemoryGraphStore::new();
    seed_group(&store, "p", "a", [1.0, 0.0, 0.0], 6);
    seed_group(&store, "p", "b", [0.0, 1.0, 0.0], 6);
    let pipeline = ClusteringPipeline::new(store, test_config());
    let first = pipeline.run(&Partition::new("p")).unwrap();
    assert_eq!(first.clusters_created, 2);

    // Pull every unit to one shared direction.
    for prefix in ["a", "b"] {
        for i in 0..6 {
            #[allow(clippy::cast_precision_loss)]
            let jitter = 0.01 * i as f32;
            let moved = ContentUnit::new(
                format!("{prefix}{i}"),
                Partition::new("p"),
                vec![0.5 + jitter, 0.5 - jitter, 0.0],
                format!("{prefix} converged summary {i}"),
            );
            pipeline.store().insert_unit(&moved).unwrap();
        }
    }

    let second = pipeline.run(&Partition::new("p")).unwrap();
    assert_eq!(second.outcome, RunOutcome::Completed);
    assert_eq!(second.clusters_created, 1);
    assert_eq!(second.merges, 2, "one merge edge per source");
    assert_eq!(second.continuations, 0);
}

// ============================================================================
// Failure Handling
// ============================================================================

#[test]
fn test_transient_commit_failures_are_retried() {
    let store = InMemoryGraphStore::new().with_transient_failures(2);
    seed_group(&store, "p", "a", [1.0, 0.0, 0.0], 6);
    seed_group(&store, "p", "b", [0.0, 1.0, 0.0], 6);
    let pipeline = ClusteringPipeline::new(store, test_config());

    let summary = pipeline.run(&Partition::new("p")).unwrap();
    assert_eq!(summary.outcome, RunOutcome::Completed);
    assert_eq!(pipeline.store().stats().unwrap().cluster_count, 2);
}

#[test]
fn test_persistent_commit_failure_records_failed_run() {
    // More injected failures than retry attempts.
    let store = InMemoryGraphStore::new().with_transient_failures(10);
    seed_group(&store, "p", "a", [1.0, 0.0, 0.0], 6);
    seed_group(&store, "p", "b", [0.0, 1.0, 0.0], 6);
    let pipeline = ClusteringPipeline::new(store, test_config());

    let summary = pipeline.run(&Partition::new("p")).unwrap();
    assert_eq!(summary.outcome, RunOutcome::Failed);
    assert!(summary.error_detail.is_some());

    let run = pipeline
        .store()
        .latest_run(&Partition::new("p"))
        .unwrap()
        .unwrap();
    assert_eq!(run.status, RunStatus::Failed);
    // No partial writes: failed commits leave no clusters behind.
    assert_eq!(pipeline.store().stats().unwrap().cluster_count, 0);
}

#[test]
fn test_malformed_embeddings_fail_run_cleanly() {
    let store = InMemoryGraphStore::new();
    seed_group(&store, "p", "a", [1.0, 0.0, 0.0], 6);
    let bad = ContentUnit::new(
        "bad",
        Partition::new("p"),
        vec![f32::NAN, 0.0, 0.0],
        "bad embedding",
    );
    store.insert_unit(&bad).unwrap();

    let pipeline = ClusteringPipeline::new(store, test_config());
    let summary = pipeline.run(&Partition::new("p")).unwrap();
    assert_eq!(summary.outcome, RunOutcome::Failed);

    let run = pipeline
        .store()
        .latest_run(&Partition::new("p"))
        .unwrap()
        .unwrap();
    assert_eq!(run.status, RunStatus::Failed);
    assert!(run.error_detail.unwrap().contains("non-finite"));
}

#[test]
fn test_in_progress_run_blocks_new_run() {
    let store = InMemoryGraphStore::new();
    seed_group(&store, "p", "a", [1.0, 0.0, 0.0], 6);

    // Simulate a crashed run left in progress.
    let stale = topicgraph::models::RunState::begin(
        Partition::new("p"),
        test_config().clustering,
        "hash".to_string(),
    );
    store.record_failed_run(&stale).unwrap();

    let pipeline = ClusteringPipeline::new(store, test_config());
    let err = pipeline.run(&Partition::new("p")).unwrap_err();
    assert!(matches!(err, Error::RunInProgress { .. }));
}

// ============================================================================
// Partition Isolation and SQLite Parity
// ============================================================================

#[test]
fn test_partitions_are_isolated() {
    let store = InMemoryGraphStore::new();
    seed_group(&store, "p1", "a", [1.0, 0.0, 0.0], 4);
    seed_group(&store, "p1", "b", [0.0, 1.0, 0.0], 4);
    seed_group(&store, "p2", "c", [0.0, 0.0, 1.0], 4);
    let pipeline = ClusteringPipeline::new(store, test_config());

    let summary = pipeline.run(&Partition::new("p1")).unwrap();
    assert_eq!(summary.outcome, RunOutcome::Completed);
    assert_eq!(summary.units_total, 8);

    assert!(pipeline
        .store()
        .latest_run(&Partition::new("p2"))
        .unwrap()
        .is_none());
    assert!(pipeline
        .store()
        .primary_assignments(&Partition::new("p2"))
        .unwrap()
        .is_empty());
}

#[test]
fn test_full_lifecycle_on_sqlite() {
    let dir = TempDir::new().unwrap();
    let store = SqliteGraphStore::new(dir.path().join("graph.db")).unwrap();
    seed_group(&store, "p", "a", [1.0, 0.0, 0.0], 5);
    seed_group(&store, "p", "b", [0.0, 1.0, 0.0], 7);

    let pipeline = ClusteringPipeline::new(store, test_config());
    let first = pipeline.run(&Partition::new("p")).unwrap();
    assert_eq!(first.outcome, RunOutcome::Completed);
    assert_eq!(first.clusters_created, 2);

    let second = pipeline.run(&Partition::new("p")).unwrap();
    assert_eq!(second.outcome, RunOutcome::Completed);
    assert_eq!(second.continuations, 2);

    let store = pipeline.store();
    let stats = store.stats().unwrap();
    assert_eq!(stats.run_count, 2);
    assert_eq!(stats.primary_assignment_count, 12);
    assert_eq!(stats.assignment_count, 24);
    assert_eq!(stats.active_cluster_count, 2);

    let history = store.run_history(&Partition::new("p"), 10).unwrap();
    assert_eq!(history.len(), 2);
    assert_eq!(history[0].supersedes, Some(history[1].id.clone()));
}
