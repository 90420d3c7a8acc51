//! Density clustering of embedded content units.
//!
//! Wraps the DBSCAN core with input validation, the minimum-cluster-size
//! post-filter, membership confidence scoring, and outlier accounting.

mod centroid;
mod dbscan;

pub use centroid::centroid;
pub use dbscan::{cosine_distance, cosine_similarity};

use crate::config::ClusteringParams;
use crate::{Error, Result};
use tracing::debug;

/// One discovered cluster before persistence.
#[derive(Debug, Clone)]
pub struct DiscoveredCluster {
    /// Indices of member units (into the clusterer's input slice).
    pub member_indices: Vec<usize>,
    /// Mean embedding of the members.
    pub centroid: Vec<f32>,
    /// Per-member assignment confidence in [0, 1], parallel to `member_indices`.
    pub confidences: Vec<f32>,
    /// Per-member cosine distance to the centroid, parallel to `member_indices`.
    pub distances: Vec<f32>,
}

impl DiscoveredCluster {
    /// Returns the mean assignment confidence.
    #[must_use]
    pub fn avg_confidence(&self) -> f32 {
        if self.confidences.is_empty() {
            return 0.0;
        }
        #[allow(clippy::cast_precision_loss)]
        let n = self.confidences.len() as f32;
        self.confidences.iter().sum::<f32>() / n
    }
}

/// Result of one clustering pass.
#[derive(Debug, Clone)]
pub struct ClusterOutcome {
    /// Per-unit assignment: the cluster index, or `None` for outliers.
    pub assignments: Vec<Option<usize>>,
    /// Discovered clusters, indexed by assignment values.
    pub clusters: Vec<DiscoveredCluster>,
    /// Number of units marked as outliers.
    pub outlier_count: usize,
    /// Fraction of units marked as outliers.
    pub outlier_ratio: f32,
    /// Quality warnings raised during clustering.
    pub warnings: Vec<String>,
}

impl ClusterOutcome {
    /// Builds an all-outlier outcome for degenerate inputs.
    #[must_use]
    fn all_outliers(n: usize) -> Self {
        Self {
            assignments: vec![None; n],
            clusters: Vec::new(),
            outlier_count: n,
            outlier_ratio: if n == 0 { 0.0 } else { 1.0 },
            warnings: Vec::new(),
        }
    }

    /// Returns the number of units assigned to clusters.
    #[must_use]
    pub fn clustered_count(&self) -> usize {
        self.assignments.iter().filter(|a| a.is_some()).count()
    }
}

/// Density-based clusterer over cosine distance.
#[derive(Debug, Clone)]
pub struct DensityClusterer {
    params: ClusteringParams,
}

impl DensityClusterer {
    /// Creates a clusterer with the given parameters.
    #[must_use]
    pub const fn new(params: ClusteringParams) -> Self {
        Self { params }
    }

    /// Returns the parameters in use.
    #[must_use]
    pub const fn params(&self) -> &ClusteringParams {
        &self.params
    }

    /// Clusters the given embeddings.
    ///
    /// Inputs with fewer units than the resolved minimum cluster size
    /// short-circuit to "all outliers, zero clusters" instead of erroring.
    /// Clusters smaller than the minimum cluster size are dissolved back
    /// into outliers.
    ///
    /// # Errors
    ///
    /// Returns `Clustering` if parameters are invalid or embeddings are
    /// malformed (empty, non-finite, or mismatched dimensionality).
    pub fn cluster(&self, embeddings: &[Vec<f32>]) -> Result<ClusterOutcome> {
        self.params.validate().map_err(|e| Error::Clustering {
            cause: e.to_string(),
        })?;
        validate_embeddings(embeddings)?;

        let n = embeddings.len();
        let min_cluster_size = self.params.min_cluster_size.resolve(n);
        if n < min_cluster_size {
            debug!(
                units = n,
                min_cluster_size, "degenerate input, marking all units as outliers"
            );
            return Ok(ClusterOutcome::all_outliers(n));
        }

        let labels = dbscan::dbscan(embeddings, self.params.epsilon, self.params.min_samples);

        // Collect raw clusters, then dissolve undersized ones into outliers.
        let mut by_label: std::collections::BTreeMap<i32, Vec<usize>> =
            std::collections::BTreeMap::new();
        for (idx, &label) in labels.iter().enumerate() {
            if label != dbscan::NOISE {
                by_label.entry(label).or_default().push(idx);
            }
        }

        let mut assignments: Vec<Option<usize>> = vec![None; n];
        let mut clusters = Vec::new();
        for members in by_label.into_values() {
            if members.len() < min_cluster_size {
                continue;
            }
            let cluster_index = clusters.len();
            for &idx in &members {
                assignments[idx] = Some(cluster_index);
            }
            clusters.push(self.build_cluster(embeddings, members));
        }

        let outlier_count = assignments.iter().filter(|a| a.is_none()).count();
        #[allow(clippy::cast_precision_loss)]
        let outlier_ratio = if n == 0 {
            0.0
        } else {
            outlier_count as f32 / n as f32
        };

        let mut warnings = Vec::new();
        if outlier_ratio > self.params.outlier_warning_ratio {
            warnings.push(format!(
                "outlier ratio {:.2} exceeds warning threshold {:.2}",
                outlier_ratio, self.params.outlier_warning_ratio
            ));
        }

        Ok(ClusterOutcome {
            assignments,
            clusters,
            outlier_count,
            outlier_ratio,
            warnings,
        })
    }

    /// Builds a discovered cluster with centroid and member confidences.
    ///
    /// Membership confidence is derived from the member's cosine distance to
    /// the centroid relative to epsilon: members at the centroid score 1.0,
    /// members at or beyond epsilon score 0.0.
    fn build_cluster(&self, embeddings: &[Vec<f32>], member_indices: Vec<usize>) -> DiscoveredCluster {
        let members: Vec<&[f32]> = member_indices
            .iter()
            .map(|&idx| embeddings[idx].as_slice())
            .collect();
        let center = centroid::centroid(&members);

        let distances: Vec<f32> = members
            .iter()
            .map(|m| dbscan::cosine_distance(m, &center))
            .collect();
        let confidences: Vec<f32> = distances
            .iter()
            .map(|d| (1.0 - d / self.params.epsilon).clamp(0.0, 1.0))
            .collect();

        DiscoveredCluster {
            member_indices,
            centroid: center,
            confidences,
            distances,
        }
    }
}

/// Validates that embeddings are non-empty, finite, and uniformly sized.
fn validate_embeddings(embeddings: &[Vec<f32>]) -> Result<()> {
    let Some(first) = embeddings.first() else {
        return Ok(());
    };
    let dims = first.len();
    if dims == 0 {
        return Err(Error::Clustering {
            cause: "embeddings have zero dimensionality".to_string(),
        });
    }
    for (idx, embedding) in embeddings.iter().enumerate() {
        if embedding.len() != dims {
            return Err(Error::Clustering {
                cause: format!(
                    "embedding {idx} has {} dimensions, expected {dims}",
                    embedding.len()
                ),
            });
        }
        if embedding.iter().any(|x| !x.is_finite()) {
            return Err(Error::Clustering {
                cause: format!("embedding {idx} contains non-finite components"),
            });
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::MinClusterSize;

    fn tight_group(base: &[f32; 3], count: usize) -> Vec<Vec<f32>> {
        (0..count)
            .map(|i| {
                #[allow(clippy::cast_precision_loss)]
                let jitter = 0.01 * i as f32;
                vec![base[0] + jitter, base[1] + jitter / 2.0, base[2]]
            })
            .collect()
    }

    fn params(min_cluster_size: usize, min_samples: usize, epsilon: f32) -> ClusteringParams {
        ClusteringParams {
            min_cluster_size: MinClusterSize::Fixed(min_cluster_size),
            min_samples,
            epsilon,
            outlier_warning_ratio: 0.3,
        }
    }

    #[test]
    fn test_two_tight_groups() {
        // Two well-separated groups of 5 and 7, no true outliers.
        let mut embeddings = tight_group(&[1.0, 0.0, 0.0], 5);
        embeddings.extend(tight_group(&[0.0, 1.0, 0.0], 7));

        let clusterer = DensityClusterer::new(params(5, 2, 0.3));
        let outcome = clusterer.cluster(&embeddings).unwrap();

        assert_eq!(outcome.clusters.len(), 2);
        assert_eq!(outcome.outlier_count, 0);
        let mut sizes: Vec<usize> = outcome
            .clusters
            .iter()
            .map(|c| c.member_indices.len())
            .collect();
        sizes.sort_unstable();
        assert_eq!(sizes, vec![5, 7]);
    }

    #[test]
    fn test_degenerate_input_short_circuits() {
        let embeddings = tight_group(&[1.0, 0.0, 0.0], 3);
        let clusterer = DensityClusterer::new(params(5, 2, 0.3));
        let outcome = clusterer.cluster(&embeddings).unwrap();

        assert!(outcome.clusters.is_empty());
        assert_eq!(outcome.outlier_count, 3);
        assert!((outcome.outlier_ratio - 1.0).abs() < f32::EPSILON);
    }

    #[test]
    fn test_empty_input() {
        let clusterer = DensityClusterer::new(params(2, 2, 0.3));
        let outcome = clusterer.cluster(&[]).unwrap();
        assert!(outcome.assignments.is_empty());
        assert_eq!(outcome.outlier_count, 0);
        assert!(outcome.outlier_ratio.abs() < f32::EPSILON);
    }

    #[test]
    fn test_undersized_cluster_dissolved_to_outliers() {
        // A pair of close points forms a dense region of 2, below the
        // minimum cluster size of 3, so both become outliers.
        let mut embeddings = tight_group(&[1.0, 0.0, 0.0], 4);
        embeddings.push(vec![0.0, 1.0, 0.0]);
        embeddings.push(vec![0.0, 0.99, 0.05]);

        let clusterer = DensityClusterer::new(params(3, 2, 0.2));
        let outcome = clusterer.cluster(&embeddings).unwrap();

        assert_eq!(outcome.clusters.len(), 1);
        assert_eq!(outcome.outlier_count, 2);
    }

    #[test]
    fn test_outlier_warning_raised() {
        let mut embeddings = tight_group(&[1.0, 0.0, 0.0], 3);
        // Mutually-distant points that cannot cluster.
        embeddings.push(vec![0.0, 1.0, 0.0]);
        embeddings.push(vec![0.0, 0.0, 1.0]);
        embeddings.push(vec![-1.0, 0.0, 0.0]);
        embeddings.push(vec![0.0, -1.0, 0.0]);

        let clusterer = DensityClusterer::new(params(3, 2, 0.2));
        let outcome = clusterer.cluster(&embeddings).unwrap();

        assert!(outcome.outlier_ratio > 0.3);
        assert_eq!(outcome.warnings.len(), 1);
        assert!(outcome.warnings[0].contains("outlier ratio"));
    }

    #[test]
    fn test_confidences_within_bounds() {
        let mut embeddings = tight_group(&[1.0, 0.0, 0.0], 6);
        embeddings.extend(tight_group(&[0.0, 1.0, 0.0], 6));

        let clusterer = DensityClusterer::new(params(3, 2, 0.3));
        let outcome = clusterer.cluster(&embeddings).unwrap();

        for cluster in &outcome.clusters {
            for &c in &cluster.confidences {
                assert!((0.0..=1.0).contains(&c));
            }
            assert!((0.0..=1.0).contains(&cluster.avg_confidence()));
        }
    }

    #[test]
    fn test_malformed_embeddings_rejected() {
        let embeddings = vec![vec![1.0, 0.0], vec![0.5]];
        let clusterer = DensityClusterer::new(params(2, 2, 0.3));
        let err = clusterer.cluster(&embeddings).unwrap_err();
        assert!(matches!(err, Error::Clustering { .. }));

        let nan = vec![vec![1.0, f32::NAN]; 4];
        let err = clusterer.cluster(&nan).unwrap_err();
        assert!(matches!(err, Error::Clustering { .. }));
    }

    #[test]
    fn test_formula_min_cluster_size() {
        // sqrt(16)/2 = 2, so pairs are allowed to cluster.
        let mut embeddings = tight_group(&[1.0, 0.0, 0.0], 14);
        embeddings.push(vec![0.0, 1.0, 0.0]);
        embeddings.push(vec![0.0, 0.99, 0.05]);

        let clusterer = DensityClusterer::new(ClusteringParams {
            min_cluster_size: MinClusterSize::SqrtFraction { divisor: 2.0 },
            min_samples: 2,
            epsilon: 0.2,
            outlier_warning_ratio: 0.3,
        });
        let outcome = clusterer.cluster(&embeddings).unwrap();
        assert_eq!(outcome.clusters.len(), 2);
        assert_eq!(outcome.outlier_count, 0);
    }
}
