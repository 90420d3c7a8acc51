//! Temporal evolution detection between successive clustering runs.
//!
//! Builds a transition matrix from the previous run's primary assignments to
//! the current run's assignments and classifies per-cluster changes as
//! split, merge, or continuation. The thresholds (20% participation, 80%
//! capture) and confidence weights (0.4/0.3/0.3) are heuristic constants
//! from the original design, kept as named defaults in
//! [`crate::config::EvolutionConfig`] rather than tuned.

use crate::clustering::cosine_similarity;
use crate::config::EvolutionConfig;
use crate::models::{ClusterId, ClusterStatus, EvolutionEdge, EvolutionType, RunPeriod, UnitId};
use std::collections::{BTreeMap, HashMap};
use tracing::debug;

/// Maximum population variance of values in [0, 1], used to normalize the
/// separation factor of edge confidence.
const MAX_PROPORTION_VARIANCE: f32 = 0.25;

/// Inputs for one evolution comparison.
#[derive(Debug)]
pub struct EvolutionInput<'a> {
    /// Previous run's primary assignments (unit → old cluster).
    pub previous: &'a HashMap<UnitId, ClusterId>,
    /// Current run's assignments (unit → new cluster).
    pub current: &'a HashMap<UnitId, ClusterId>,
    /// Centroids of the previous run's clusters.
    pub old_centroids: &'a HashMap<ClusterId, Vec<f32>>,
    /// Centroids of the current run's clusters.
    pub new_centroids: &'a HashMap<ClusterId, Vec<f32>>,
    /// The period in which the evolution is being detected.
    pub period: RunPeriod,
}

/// Result of one evolution comparison.
#[derive(Debug, Default)]
pub struct EvolutionReport {
    /// Detected evolution edges.
    pub edges: Vec<EvolutionEdge>,
    /// Old clusters whose status must transition (split or merged away).
    pub superseded: Vec<(ClusterId, ClusterStatus)>,
}

impl EvolutionReport {
    /// Counts edges of the given type.
    #[must_use]
    pub fn count(&self, evolution_type: EvolutionType) -> usize {
        self.edges
            .iter()
            .filter(|e| e.evolution_type == evolution_type)
            .count()
    }
}

/// Detects split / merge / continuation relationships between runs.
#[derive(Debug, Clone)]
pub struct EvolutionTracker {
    config: EvolutionConfig,
}

impl EvolutionTracker {
    /// Creates a tracker with the given thresholds and weights.
    #[must_use]
    pub const fn new(config: EvolutionConfig) -> Self {
        Self { config }
    }

    /// Compares two runs and returns the detected evolution edges.
    ///
    /// Only units present in both runs participate; units that were dropped
    /// or newly ingested between runs do not contribute to the matrix.
    #[must_use]
    pub fn compare(&self, input: &EvolutionInput<'_>) -> EvolutionReport {
        let matrix = build_transition_matrix(input.previous, input.current);
        if matrix.is_empty() {
            return EvolutionReport::default();
        }

        let mut report = EvolutionReport::default();
        let column_totals = column_totals(&matrix);

        for (old_cluster, row) in &matrix {
            let row_total: usize = row.values().sum();
            if row_total == 0 {
                continue;
            }
            let proportions = row_proportions(row, row_total);

            let qualifying: Vec<(&ClusterId, f32, usize)> = row
                .iter()
                .map(|(new_cluster, &count)| (new_cluster, proportions[new_cluster], count))
                .filter(|(_, proportion, _)| *proportion >= self.config.split_threshold)
                .collect();

            if qualifying.len() >= 2 {
                self.emit_split_edges(input, old_cluster, &proportions, &qualifying, &mut report);
            }
        }

        self.emit_merge_edges(input, &matrix, &column_totals, &mut report);
        self.emit_continuations(input, &matrix, &mut report);

        debug!(
            splits = report.count(EvolutionType::Split),
            merges = report.count(EvolutionType::Merge),
            continuations = report.count(EvolutionType::Continuation),
            "evolution comparison complete"
        );
        report
    }

    fn emit_split_edges(
        &self,
        input: &EvolutionInput<'_>,
        old_cluster: &ClusterId,
        proportions: &HashMap<ClusterId, f32>,
        qualifying: &[(&ClusterId, f32, usize)],
        report: &mut EvolutionReport,
    ) {
        let separation = separation_factor(&proportions.values().copied().collect::<Vec<_>>());
        for &(new_cluster, proportion, count) in qualifying {
            let similarity = centroid_similarity(input, old_cluster, new_cluster);
            let confidence = self.edge_confidence(separation, count, similarity);
            report.edges.push(
                EvolutionEdge::new(
                    old_cluster.clone(),
                    new_cluster.clone(),
                    EvolutionType::Split,
                    input.period.clone(),
                    proportion,
                    count,
                )
                .with_confidence(confidence)
                .with_centroid_similarity(similarity)
                .with_reason(format!(
                    "received {:.0}% of source cluster",
                    f64::from(proportion) * 100.0
                )),
            );
        }
        report
            .superseded
            .push((old_cluster.clone(), ClusterStatus::Split));
    }

    fn emit_merge_edges(
        &self,
        input: &EvolutionInput<'_>,
        matrix: &BTreeMap<ClusterId, BTreeMap<ClusterId, usize>>,
        column_totals: &HashMap<ClusterId, usize>,
        report: &mut EvolutionReport,
    ) {
        // Transposed view: which old clusters fed each new cluster.
        let mut columns: BTreeMap<&ClusterId, Vec<(&ClusterId, usize)>> = BTreeMap::new();
        for (old_cluster, row) in matrix {
            for (new_cluster, &count) in row {
                columns
                    .entry(new_cluster)
                    .or_default()
                    .push((old_cluster, count));
            }
        }

        for (new_cluster, sources) in columns {
            let total = column_totals.get(new_cluster).copied().unwrap_or(0);
            if total == 0 {
                continue;
            }

            #[allow(clippy::cast_precision_loss)]
            let contributions: Vec<f32> = sources
                .iter()
                .map(|(_, count)| *count as f32 / total as f32)
                .collect();
            let qualifying: Vec<(&ClusterId, usize, f32)> = sources
                .iter()
                .zip(contributions.iter())
                .filter(|(_, contribution)| **contribution >= self.config.split_threshold)
                .map(|(&(old, count), &contribution)| (old, count, contribution))
                .collect();

            if qualifying.len() < 2 {
                continue;
            }

            let separation = separation_factor(&contributions);
            let source_count = qualifying.len();
            for (old_cluster, count, _) in qualifying {
                let row_total: usize = matrix
                    .get(old_cluster)
                    .map(|row| row.values().sum())
                    .unwrap_or(0);
                #[allow(clippy::cast_precision_loss)]
                let proportion = if row_total == 0 {
                    0.0
                } else {
                    count as f32 / row_total as f32
                };
                let similarity = centroid_similarity(input, old_cluster, new_cluster);
                let confidence = self.edge_confidence(separation, count, similarity);
                report.edges.push(
                    EvolutionEdge::new(
                        old_cluster.clone(),
                        new_cluster.clone(),
                        EvolutionType::Merge,
                        input.period.clone(),
                        proportion,
                        count,
                    )
                    .with_confidence(confidence)
                    .with_centroid_similarity(similarity)
                    .with_reason(format!("merge of {source_count} source clusters")),
                );
                if !report
                    .superseded
                    .iter()
                    .any(|(id, _)| id == old_cluster)
                {
                    report
                        .superseded
                        .push((old_cluster.clone(), ClusterStatus::Merged));
                }
            }
        }
    }

    fn emit_continuations(
        &self,
        input: &EvolutionInput<'_>,
        matrix: &BTreeMap<ClusterId, BTreeMap<ClusterId, usize>>,
        report: &mut EvolutionReport,
    ) {
        for (old_cluster, row) in matrix {
            // Split/merge already explains this cluster's movement.
            if report.superseded.iter().any(|(id, _)| id == old_cluster) {
                continue;
            }

            let row_total: usize = row.values().sum();
            if row_total == 0 {
                continue;
            }
            let Some((new_cluster, &count)) = row.iter().max_by_key(|&(_, &count)| count) else {
                continue;
            };
            #[allow(clippy::cast_precision_loss)]
            let proportion = count as f32 / row_total as f32;
            if proportion < self.config.continuation_threshold {
                continue;
            }
            // A destination already explained as a merge target cannot also
            // be a clean continuation of this source.
            if report.edges.iter().any(|e| {
                e.evolution_type == EvolutionType::Merge && e.to_cluster == *new_cluster
            }) {
                continue;
            }

            let proportions = row_proportions(row, row_total);
            let separation = separation_factor(&proportions.values().copied().collect::<Vec<_>>());
            let similarity = centroid_similarity(input, old_cluster, new_cluster);
            let confidence = self.edge_confidence(separation, count, similarity);
            report.edges.push(
                EvolutionEdge::new(
                    old_cluster.clone(),
                    new_cluster.clone(),
                    EvolutionType::Continuation,
                    input.period.clone(),
                    proportion,
                    count,
                )
                .with_confidence(confidence)
                .with_centroid_similarity(similarity)
                .with_reason(format!(
                    "captured {:.0}% of source cluster",
                    f64::from(proportion) * 100.0
                )),
            );
        }
    }

    /// Combines the three confidence factors with the configured weights.
    ///
    /// All factors are normalized to [0, 1] before weighting; the result is
    /// clamped to [0, 1]. The formula is deliberately explicit so detection
    /// behavior is reproducible in tests.
    fn edge_confidence(&self, separation: f32, units: usize, centroid_similarity: f32) -> f32 {
        #[allow(clippy::cast_precision_loss)]
        let count_factor =
            (units as f32 / self.config.count_saturation.max(1) as f32).clamp(0.0, 1.0);
        let similarity_factor = centroid_similarity.clamp(0.0, 1.0);

        (self.config.separation_weight * separation
            + self.config.count_weight * count_factor
            + self.config.centroid_weight * similarity_factor)
            .clamp(0.0, 1.0)
    }

}

/// Cosine similarity between the source and destination centroids, or 0.0
/// when either centroid is missing.
fn centroid_similarity(
    input: &EvolutionInput<'_>,
    old_cluster: &ClusterId,
    new_cluster: &ClusterId,
) -> f32 {
    match (
        input.old_centroids.get(old_cluster),
        input.new_centroids.get(new_cluster),
    ) {
        (Some(old), Some(new)) => cosine_similarity(old, new),
        _ => 0.0,
    }
}

/// Builds the transition matrix over units present in both runs.
fn build_transition_matrix(
    previous: &HashMap<UnitId, ClusterId>,
    current: &HashMap<UnitId, ClusterId>,
) -> BTreeMap<ClusterId, BTreeMap<ClusterId, usize>> {
    let mut matrix: BTreeMap<ClusterId, BTreeMap<ClusterId, usize>> = BTreeMap::new();
    for (unit_id, old_cluster) in previous {
        if let Some(new_cluster) = current.get(unit_id) {
            *matrix
                .entry(old_cluster.clone())
                .or_default()
                .entry(new_cluster.clone())
                .or_default() += 1;
        }
    }
    matrix
}

/// Total units received per new cluster.
fn column_totals(
    matrix: &BTreeMap<ClusterId, BTreeMap<ClusterId, usize>>,
) -> HashMap<ClusterId, usize> {
    let mut totals: HashMap<ClusterId, usize> = HashMap::new();
    for row in matrix.values() {
        for (new_cluster, &count) in row {
            *totals.entry(new_cluster.clone()).or_default() += count;
        }
    }
    totals
}

/// Per-destination proportions for one old cluster's row.
fn row_proportions(
    row: &BTreeMap<ClusterId, usize>,
    row_total: usize,
) -> HashMap<ClusterId, f32> {
    #[allow(clippy::cast_precision_loss)]
    row.iter()
        .map(|(new_cluster, &count)| (new_cluster.clone(), count as f32 / row_total as f32))
        .collect()
}

/// Normalized separation factor: lower variance of proportions → higher
/// confidence that the classification is clean.
fn separation_factor(proportions: &[f32]) -> f32 {
    if proportions.len() <= 1 {
        return 1.0;
    }
    #[allow(clippy::cast_precision_loss)]
    let n = proportions.len() as f32;
    let mean = proportions.iter().sum::<f32>() / n;
    let variance = proportions.iter().map(|p| (p - mean).powi(2)).sum::<f32>() / n;
    (1.0 - variance / MAX_PROPORTION_VARIANCE).clamp(0.0, 1.0)
}
