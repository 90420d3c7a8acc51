//! Content units and partitions.
//!
//! A content unit is a semantically coherent chunk of source material with a
//! precomputed embedding. Units are produced by an external ingestion
//! pipeline and consumed read-only by the clustering core.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Unique identifier for a content unit.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct UnitId(String);

impl UnitId {
    /// Creates a new unit ID from a string.
    #[must_use]
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Returns the unit ID as a string slice.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for UnitId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl AsRef<str> for UnitId {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

/// An independent dataset scope for clustering runs.
///
/// Runs across distinct partitions may execute concurrently with no shared
/// state; runs within the same partition are serialized.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Partition(String);

impl Partition {
    /// Creates a new partition from a name.
    #[must_use]
    pub fn new(name: impl Into<String>) -> Self {
        Self(name.into())
    }

    /// Returns the partition name as a string slice.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Returns true if the partition name is empty.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl fmt::Display for Partition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl AsRef<str> for Partition {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

/// A content unit with its precomputed embedding.
///
/// Never created or mutated by the clustering core; the ingestion pipeline
/// owns the unit lifecycle.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ContentUnit {
    /// Unique identifier for this unit.
    pub id: UnitId,
    /// Partition the unit belongs to.
    pub partition: Partition,
    /// Dense embedding vector (fixed dimensionality per partition).
    pub embedding: Vec<f32>,
    /// Free-text summary of the unit's content.
    pub summary: String,
    /// Unix timestamp when the unit was created upstream.
    pub created_at: u64,
}

impl ContentUnit {
    /// Creates a new content unit.
    #[must_use]
    pub fn new(
        id: impl Into<String>,
        partition: Partition,
        embedding: Vec<f32>,
        summary: impl Into<String>,
    ) -> Self {
        Self {
            id: UnitId::new(id),
            partition,
            embedding,
            summary: summary.into(),
            created_at: crate::current_timestamp(),
        }
    }

    /// Sets the creation timestamp.
    #[must_use]
    pub const fn with_created_at(mut self, created_at: u64) -> Self {
        self.created_at = created_at;
        self
    }

    /// Returns the embedding dimensionality.
    #[must_use]
    pub fn dimensions(&self) -> usize {
        self.embedding.len()
    }

    /// Returns true if every embedding component is finite.
    #[must_use]
    pub fn has_valid_embedding(&self) -> bool {
        !self.embedding.is_empty() && self.embedding.iter().all(|x| x.is_finite())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_unit_id_roundtrip() {
        let id = UnitId::new("unit-42");
        assert_eq!(id.as_str(), "unit-42");
        assert_eq!(id.to_string(), "unit-42");
    }

    #[test]
    fn test_partition_name() {
        let p = Partition::new("tenant-a");
        assert_eq!(p.as_str(), "tenant-a");
        assert!(!p.is_empty());
        assert!(Partition::new("").is_empty());
    }

    #[test]
    fn test_content_unit_creation() {
        let unit = ContentUnit::new(
            "u1",
            Partition::new("default"),
            vec![0.1, 0.2, 0.3],
            "a short summary",
        );
        assert_eq!(unit.dimensions(), 3);
        assert!(unit.has_valid_embedding());
        assert!(unit.created_at > 0);
    }

    #[test]
    fn test_invalid_embeddings_detected() {
        let nan = ContentUnit::new("u1", Partition::new("p"), vec![0.1, f32::NAN], "s");
        assert!(!nan.has_valid_embedding());

        let empty = ContentUnit::new("u2", Partition::new("p"), vec![], "s");
        assert!(!empty.has_valid_embedding());
    }
}
