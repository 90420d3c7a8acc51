//! Evolution edges between clusters of successive runs.

use crate::models::cluster::ClusterId;
use crate::models::run::RunPeriod;
use serde::{Deserialize, Serialize};
use std::fmt;

/// How a cluster from one run relates to a cluster in a later run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EvolutionType {
    /// The old cluster's units dispersed into several new clusters.
    Split,
    /// Several old clusters' units converged into one new cluster.
    Merge,
    /// The old cluster carried over largely intact.
    Continuation,
}

impl EvolutionType {
    /// Returns all evolution type variants.
    #[must_use]
    pub const fn all() -> &'static [Self] {
        &[Self::Split, Self::Merge, Self::Continuation]
    }

    /// Returns the evolution type as a string slice.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Split => "split",
            Self::Merge => "merge",
            Self::Continuation => "continuation",
        }
    }

    /// Parses an evolution type from a string.
    #[must_use]
    pub fn parse(s: &str) -> Option<Self> {
        match s.to_lowercase().as_str() {
            "split" => Some(Self::Split),
            "merge" | "merged" => Some(Self::Merge),
            "continuation" | "continued" => Some(Self::Continuation),
            _ => None,
        }
    }
}

impl fmt::Display for EvolutionType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// A directed cluster→cluster evolution edge.
///
/// `proportion` is the fraction of the *source* cluster's units that moved
/// to the destination, so the proportions of all outgoing split edges from
/// one source sum to ≈1.0. Edges never form cycles: they always point from
/// an earlier run's cluster to a later run's cluster.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EvolutionEdge {
    /// Source cluster (earlier run).
    pub from_cluster: ClusterId,
    /// Destination cluster (later run).
    pub to_cluster: ClusterId,
    /// Kind of evolution detected.
    pub evolution_type: EvolutionType,
    /// The run period in which the evolution was detected.
    pub period: RunPeriod,
    /// Fraction of the source cluster's units transferred, in (0, 1].
    pub proportion: f32,
    /// Detection confidence in [0, 1].
    pub confidence: f32,
    /// Number of units involved in the transfer.
    pub units_transferred: usize,
    /// Cosine similarity between old and new centroids.
    pub centroid_similarity: f32,
    /// Short reason tag describing why the edge was emitted.
    pub reason: String,
}

impl EvolutionEdge {
    /// Creates a new evolution edge.
    #[must_use]
    pub fn new(
        from_cluster: ClusterId,
        to_cluster: ClusterId,
        evolution_type: EvolutionType,
        period: RunPeriod,
        proportion: f32,
        units_transferred: usize,
    ) -> Self {
        Self {
            from_cluster,
            to_cluster,
            evolution_type,
            period,
            proportion: proportion.clamp(0.0, 1.0),
            confidence: 0.0,
            units_transferred,
            centroid_similarity: 0.0,
            reason: String::new(),
        }
    }

    /// Sets the detection confidence.
    #[must_use]
    pub fn with_confidence(mut self, confidence: f32) -> Self {
        self.confidence = confidence.clamp(0.0, 1.0);
        self
    }

    /// Sets the centroid similarity.
    #[must_use]
    pub const fn with_centroid_similarity(mut self, similarity: f32) -> Self {
        self.centroid_similarity = similarity;
        self
    }

    /// Sets the reason tag.
    #[must_use]
    pub fn with_reason(mut self, reason: impl Into<String>) -> Self {
        self.reason = reason.into();
        self
    }
}

#[cfg(test)]
#[allow(clippy::float_cmp)]
mod tests {
    use super::*;

    #[test]
    fn test_evolution_type_parse() {
        assert_eq!(EvolutionType::parse("split"), Some(EvolutionType::Split));
        assert_eq!(EvolutionType::parse("MERGE"), Some(EvolutionType::Merge));
        assert_eq!(
            EvolutionType::parse("continuation"),
            Some(EvolutionType::Continuation)
        );
        assert_eq!(EvolutionType::parse("mutation"), None);
        assert_eq!(EvolutionType::all().len(), 3);
    }

    #[test]
    fn test_edge_builder_clamps() {
        let edge = EvolutionEdge::new(
            ClusterId::new("2026-07_x_c0"),
            ClusterId::new("2026-08_y_c1"),
            EvolutionType::Split,
            RunPeriod::new("2026-08"),
            1.5,
            12,
        )
        .with_confidence(2.0)
        .with_centroid_similarity(0.83)
        .with_reason("split 60% of source");

        assert_eq!(edge.proportion, 1.0);
        assert_eq!(edge.confidence, 1.0);
        assert_eq!(edge.centroid_similarity, 0.83);
        assert_eq!(edge.reason, "split 60% of source");
    }
}
