//! Clusters and unit→cluster assignments.

use crate::config::ClusteringParams;
use crate::models::run::RunPeriod;
use crate::models::unit::{Partition, UnitId};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Unique identifier for a cluster.
///
/// Encodes the run period and a per-run sequence number, plus a short run
/// suffix so that two runs within the same period cannot collide:
/// `{period}_{run_suffix}_c{seq}`, e.g. `2026-08_a1b2c3_c0`.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct ClusterId(String);

impl ClusterId {
    /// Creates a cluster ID from an existing string.
    #[must_use]
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Builds a cluster ID from its parts.
    #[must_use]
    pub fn from_parts(period: &RunPeriod, run_suffix: &str, seq: usize) -> Self {
        Self(format!("{}_{run_suffix}_c{seq}", period.as_str()))
    }

    /// Returns the cluster ID as a string slice.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ClusterId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl AsRef<str> for ClusterId {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

/// Lifecycle status of a cluster.
///
/// A cluster starts `Active`; a later run's evolution detection may mark it
/// `Split` or `Merged`, after which the cluster is historical.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ClusterStatus {
    /// The cluster holds current primary assignments.
    Active,
    /// A later run split this cluster into several successors.
    Split,
    /// A later run merged this cluster into a larger successor.
    Merged,
}

impl ClusterStatus {
    /// Returns the status as a string slice.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Active => "active",
            Self::Split => "split",
            Self::Merged => "merged",
        }
    }

    /// Parses a status from a string.
    #[must_use]
    pub fn parse(s: &str) -> Option<Self> {
        match s.to_lowercase().as_str() {
            "active" => Some(Self::Active),
            "split" => Some(Self::Split),
            "merged" => Some(Self::Merged),
            _ => None,
        }
    }
}

impl fmt::Display for ClusterStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// A discovered topic cluster.
///
/// Immutable once created except for `status` and `label` (the label may be
/// regenerated when validation fails, the status transitions when evolution
/// detection finds the cluster was split or merged away).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Cluster {
    /// Unique identifier.
    pub id: ClusterId,
    /// Partition the cluster belongs to.
    pub partition: Partition,
    /// Human-readable label.
    pub label: String,
    /// Number of member units.
    pub member_count: usize,
    /// Mean assignment confidence across members.
    pub avg_confidence: f32,
    /// Lifecycle status.
    pub status: ClusterStatus,
    /// Mean embedding vector of the members.
    pub centroid: Vec<f32>,
    /// Density-algorithm parameters that produced this cluster.
    pub params: ClusteringParams,
    /// Unix timestamp when the cluster was created.
    pub created_at: u64,
}

impl Cluster {
    /// Creates a new active cluster.
    #[must_use]
    pub fn new(
        id: ClusterId,
        partition: Partition,
        centroid: Vec<f32>,
        member_count: usize,
        avg_confidence: f32,
        params: ClusteringParams,
    ) -> Self {
        Self {
            id,
            partition,
            label: String::new(),
            member_count,
            avg_confidence: avg_confidence.clamp(0.0, 1.0),
            status: ClusterStatus::Active,
            centroid,
            params,
            created_at: crate::current_timestamp(),
        }
    }

    /// Sets the label.
    #[must_use]
    pub fn with_label(mut self, label: impl Into<String>) -> Self {
        self.label = label.into();
        self
    }

    /// Sets the status.
    #[must_use]
    pub const fn with_status(mut self, status: ClusterStatus) -> Self {
        self.status = status;
        self
    }
}

/// How a unit→cluster assignment was produced.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AssignmentMethod {
    /// Produced by the density clustering algorithm.
    Clustered,
    /// Assigned manually by an operator.
    Manual,
    /// Inherited from a previous run without re-clustering.
    Inherited,
}

impl AssignmentMethod {
    /// Returns the method as a string slice.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Clustered => "clustered",
            Self::Manual => "manual",
            Self::Inherited => "inherited",
        }
    }

    /// Parses a method from a string.
    #[must_use]
    pub fn parse(s: &str) -> Option<Self> {
        match s.to_lowercase().as_str() {
            "clustered" | "algorithmic" => Some(Self::Clustered),
            "manual" => Some(Self::Manual),
            "inherited" => Some(Self::Inherited),
            _ => None,
        }
    }
}

impl fmt::Display for AssignmentMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// A unit→cluster assignment edge.
///
/// At most one assignment per unit has `is_primary = true` at any time.
/// When a new run supersedes an old one, the old primary edges are flipped
/// to non-primary (archived), never deleted.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Assignment {
    /// The assigned unit.
    pub unit_id: UnitId,
    /// The cluster it was assigned to.
    pub cluster_id: ClusterId,
    /// Assignment confidence in [0, 1].
    pub confidence: f32,
    /// The run period this assignment was made in.
    pub period: RunPeriod,
    /// Whether this is the unit's currently-active assignment.
    pub is_primary: bool,
    /// Cosine distance from the unit embedding to the cluster centroid.
    pub distance: f32,
    /// How the assignment was produced.
    pub method: AssignmentMethod,
    /// Unix timestamp when the assignment was recorded.
    pub created_at: u64,
}

impl Assignment {
    /// Creates a new primary, algorithmic assignment.
    #[must_use]
    pub fn new(
        unit_id: UnitId,
        cluster_id: ClusterId,
        confidence: f32,
        period: RunPeriod,
        distance: f32,
    ) -> Self {
        Self {
            unit_id,
            cluster_id,
            confidence: confidence.clamp(0.0, 1.0),
            period,
            is_primary: true,
            distance,
            method: AssignmentMethod::Clustered,
            created_at: crate::current_timestamp(),
        }
    }

    /// Sets the assignment method.
    #[must_use]
    pub const fn with_method(mut self, method: AssignmentMethod) -> Self {
        self.method = method;
        self
    }

    /// Marks the assignment as archived (non-primary).
    #[must_use]
    pub const fn archived(mut self) -> Self {
        self.is_primary = false;
        self
    }
}
