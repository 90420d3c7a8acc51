//! Run orchestration.
//!
//! Sequences extraction, clustering, labeling, evolution detection, and the
//! atomic commit for one partition. The operator-visible outcome is always a
//! [`RunSummary`]; errors escape only for preconditions that fail before any
//! write could happen (bad input, a run already in progress, or the store
//! being unreachable during extraction).

use crate::clustering::DensityClusterer;
use crate::config::TopicgraphConfig;
use crate::evolution::{EvolutionInput, EvolutionReport, EvolutionTracker};
use crate::labeling::LabelSynthesizer;
use crate::llm::LlmProvider;
use crate::models::{
    Assignment, Cluster, ClusterId, ContentUnit, EvolutionType, Partition, RunOutcome, RunState,
    RunStatus, RunSummary,
};
use crate::storage::{GraphStore, RunCommit, execute_with_retry};
use crate::{Error, Result};
use std::collections::{BTreeSet, HashMap};
use std::sync::Arc;
use std::time::Instant;
use tracing::{error, info, instrument, warn};

/// Orchestrates clustering runs against one graph store.
pub struct ClusteringPipeline<S> {
    store: S,
    config: TopicgraphConfig,
    synthesizer: LabelSynthesizer,
    tracker: EvolutionTracker,
}

impl<S: GraphStore> ClusteringPipeline<S> {
    /// Creates a pipeline over the given store and configuration.
    ///
    /// Without an attached provider, all labels use the deterministic
    /// fallback.
    #[must_use]
    pub fn new(store: S, config: TopicgraphConfig) -> Self {
        let synthesizer = LabelSynthesizer::new(config.labeling.clone());
        let tracker = EvolutionTracker::new(config.evolution.clone());
        Self {
            store,
            config,
            synthesizer,
            tracker,
        }
    }

    /// Attaches a text-generation provider for label synthesis.
    #[must_use]
    pub fn with_llm(mut self, provider: Arc<dyn LlmProvider>) -> Self {
        self.synthesizer =
            LabelSynthesizer::new(self.config.labeling.clone()).with_provider(provider);
        self
    }

    /// Returns the underlying store.
    pub const fn store(&self) -> &S {
        &self.store
    }

    /// Executes one clustering run for the partition.
    ///
    /// Guard conditions (no units, too few units) return a skip summary
    /// without writing anything. Failures after extraction record a failed
    /// run and return a failure summary rather than an error.
    ///
    /// # Errors
    ///
    /// Returns `InvalidInput` for an empty partition name, `RunInProgress`
    /// when another run for the partition has not finished, and
    /// `Extraction` (or a store read error) when state cannot be loaded
    /// before the run starts.
    #[instrument(skip(self), fields(partition = %partition))]
    pub fn run(&self, partition: &Partition) -> Result<RunSummary> {
        if partition.is_empty() {
            return Err(Error::InvalidInput("partition name is empty".to_string()));
        }

        // Runs within one partition are serialized; advisory check against
        // the latest recorded run.
        let previous_run = self.store.latest_run(partition)?;
        if previous_run
            .as_ref()
            .is_some_and(|r| r.status == RunStatus::InProgress)
        {
            return Err(Error::RunInProgress {
                partition: partition.as_str().to_string(),
            });
        }

        let units = self.store.fetch_embedded_units(partition)?;
        if units.is_empty() {
            info!("no embedded units, skipping run");
            return Ok(RunSummary::skipped(
                partition.clone(),
                "no embedded units",
                0,
            ));
        }

        let n = units.len();
        let min_cluster_size = self.config.clustering.min_cluster_size.resolve(n);
        if n < 2 * min_cluster_size {
            info!(
                units = n,
                min_cluster_size, "too few units for a meaningful run, skipping"
            );
            return Ok(RunSummary::skipped(
                partition.clone(),
                format!("{n} units is below 2x the minimum cluster size {min_cluster_size}"),
                n,
            ));
        }

        let started = Instant::now();
        let mut run = RunState::begin(
            partition.clone(),
            self.config.clustering.clone(),
            self.config.config_hash(),
        );
        run.total_units = n;
        run.supersedes = previous_run
            .as_ref()
            .filter(|r| r.status == RunStatus::Completed)
            .map(|r| r.id.clone());

        let embeddings: Vec<Vec<f32>> = units.iter().map(|u| u.embedding.clone()).collect();
        let clusterer = DensityClusterer::new(self.config.clustering.clone());
        let outcome = match clusterer.cluster(&embeddings) {
            Ok(outcome) => outcome,
            Err(e) => return self.fail_run(run, started, &e),
        };

        let member_refs: Vec<&ContentUnit> = units.iter().collect();
        let (clusters, assignments) = self.materialize_clusters(&run, &member_refs, &outcome);

        let report =
            match self.detect_evolution(partition, previous_run.as_ref(), &run, &assignments, &clusters) {
                Ok(report) => report,
                Err(e) => return self.fail_run(run, started, &e),
            };

        finalize_run_state(&mut run, &outcome, &clusters, started);

        let commit = RunCommit {
            run: run.clone(),
            clusters,
            assignments,
            edges: report.edges,
            superseded_clusters: report.superseded,
        };
        if let Err(e) = execute_with_retry(&self.config.retry, "commit_run", || {
            self.store.commit_run(&commit)
        }) {
            return self.fail_run(run, started, &e);
        }

        metrics::counter!("topicgraph_runs_total", "outcome" => "completed").increment(1);
        metrics::histogram!("topicgraph_run_duration_ms").record(run.duration_ms as f64);

        let summary = RunSummary {
            partition: partition.clone(),
            run_id: Some(run.id.clone()),
            outcome: RunOutcome::Completed,
            skip_reason: None,
            clusters_created: run.cluster_count,
            units_total: n,
            units_clustered: outcome.clustered_count(),
            outlier_count: outcome.outlier_count,
            outlier_ratio: outcome.outlier_ratio,
            duration_ms: run.duration_ms,
            splits: commit
                .edges
                .iter()
                .filter(|e| e.evolution_type == EvolutionType::Split)
                .count(),
            merges: commit
                .edges
                .iter()
                .filter(|e| e.evolution_type == EvolutionType::Merge)
                .count(),
            continuations: commit
                .edges
                .iter()
                .filter(|e| e.evolution_type == EvolutionType::Continuation)
                .count(),
            warnings: outcome.warnings,
            error_detail: None,
        };
        info!("{}", summary.describe());
        Ok(summary)
    }

    /// Turns discovered clusters into persistable clusters and assignments,
    /// labeling each one.
    fn materialize_clusters(
        &self,
        run: &RunState,
        units: &[&ContentUnit],
        outcome: &crate::clustering::ClusterOutcome,
    ) -> (Vec<Cluster>, Vec<Assignment>) {
        let mut clusters = Vec::with_capacity(outcome.clusters.len());
        let mut assignments = Vec::new();
        let mut used_labels = BTreeSet::new();

        for (seq, discovered) in outcome.clusters.iter().enumerate() {
            let cluster_id = ClusterId::from_parts(&run.period, run.id.short_suffix(), seq);
            let members: Vec<&ContentUnit> = discovered
                .member_indices
                .iter()
                .map(|&idx| units[idx])
                .collect();

            let label = self.synthesizer.label_cluster(
                &cluster_id,
                &members,
                &discovered.centroid,
                &mut used_labels,
            );

            for ((member, &confidence), &distance) in members
                .iter()
                .zip(discovered.confidences.iter())
                .zip(discovered.distances.iter())
            {
                assignments.push(Assignment::new(
                    member.id.clone(),
                    cluster_id.clone(),
                    confidence,
                    run.period.clone(),
                    distance,
                ));
            }

            clusters.push(
                Cluster::new(
                    cluster_id,
                    run.partition.clone(),
                    discovered.centroid.clone(),
                    members.len(),
                    discovered.avg_confidence(),
                    run.params.clone(),
                )
                .with_label(label.label),
            );
        }

        (clusters, assignments)
    }

    /// Compares the new assignments against the previous run's primaries.
    ///
    /// The first completed run for a partition has nothing to compare
    /// against and yields an empty report.
    fn detect_evolution(
        &self,
        partition: &Partition,
        previous_run: Option<&RunState>,
        run: &RunState,
        assignments: &[Assignment],
        clusters: &[Cluster],
    ) -> Result<EvolutionReport> {
        if previous_run.is_none_or(|r| r.status != RunStatus::Completed) {
            info!("first completed run for partition, skipping evolution detection");
            return Ok(EvolutionReport::default());
        }

        let previous = self.store.primary_assignments(partition)?;
        if previous.is_empty() {
            return Ok(EvolutionReport::default());
        }

        let current: HashMap<_, _> = assignments
            .iter()
            .map(|a| (a.unit_id.clone(), a.cluster_id.clone()))
            .collect();
        let new_centroids: HashMap<_, _> = clusters
            .iter()
            .map(|c| (c.id.clone(), c.centroid.clone()))
            .collect();

        let mut old_centroids = HashMap::new();
        let old_ids: BTreeSet<&ClusterId> = previous.values().collect();
        for old_id in old_ids {
            if let Some(old) = self.store.get_cluster(old_id)? {
                old_centroids.insert(old.id.clone(), old.centroid);
            }
        }

        let input = EvolutionInput {
            previous: &previous,
            current: &current,
            old_centroids: &old_centroids,
            new_centroids: &new_centroids,
            period: run.period.clone(),
        };
        Ok(self.tracker.compare(&input))
    }

    /// Records a failed run and reports it as a failure summary.
    ///
    /// The recording itself is best-effort: if even that write fails, the
    /// failure is logged and the summary still carries the original error.
    fn fail_run(&self, run: RunState, started: Instant, cause: &Error) -> Result<RunSummary> {
        let duration_ms = u64::try_from(started.elapsed().as_millis()).unwrap_or(u64::MAX);
        let failed = run.failed(cause.to_string(), duration_ms);
        error!(run_id = %failed.id, error = %cause, "run failed");
        metrics::counter!("topicgraph_runs_total", "outcome" => "failed").increment(1);

        if let Err(record_err) = self.store.record_failed_run(&failed) {
            warn!(error = %record_err, "could not record failed run state");
        }

        Ok(RunSummary {
            partition: failed.partition.clone(),
            run_id: Some(failed.id.clone()),
            outcome: RunOutcome::Failed,
            skip_reason: None,
            clusters_created: 0,
            units_total: failed.total_units,
            units_clustered: 0,
            outlier_count: 0,
            outlier_ratio: 0.0,
            duration_ms,
            splits: 0,
            merges: 0,
            continuations: 0,
            warnings: Vec::new(),
            error_detail: failed.error_detail,
        })
    }
}

/// Fills in the derived fields of a completed run state.
fn finalize_run_state(
    run: &mut RunState,
    outcome: &crate::clustering::ClusterOutcome,
    clusters: &[Cluster],
    started: Instant,
) {
    run.cluster_count = clusters.len();
    run.outlier_count = outcome.outlier_count;
    run.outlier_ratio = outcome.outlier_ratio;
    #[allow(clippy::cast_precision_loss)]
    {
        run.avg_cluster_size = if clusters.is_empty() {
            0.0
        } else {
            outcome.clustered_count() as f32 / clusters.len() as f32
        };
    }
    run.quality_score = quality_score(outcome.outlier_ratio, clusters);
    run.duration_ms = u64::try_from(started.elapsed().as_millis()).unwrap_or(u64::MAX);
    run.status = RunStatus::Completed;
}

/// Derived run quality in [0, 1]: half from how few units ended up as
/// outliers, half from the mean assignment confidence across clusters.
fn quality_score(outlier_ratio: f32, clusters: &[Cluster]) -> f32 {
    #[allow(clippy::cast_precision_loss)]
    let avg_confidence = if clusters.is_empty() {
        0.0
    } else {
        clusters.iter().map(|c| c.avg_confidence).sum::<f32>() / clusters.len() as f32
    };
    (0.5 * (1.0 - outlier_ratio) + 0.5 * avg_confidence).clamp(0.0, 1.0)
}
