//! Data models for topicgraph.
//!
//! This module contains the core data structures shared by the clustering,
//! evolution, and persistence layers: content units (consumed read-only),
//! clusters, unit→cluster assignments, run states, and evolution edges.

mod cluster;
mod evolution;
mod run;
mod unit;

pub use cluster::{Assignment, AssignmentMethod, Cluster, ClusterId, ClusterStatus};
pub use evolution::{EvolutionEdge, EvolutionType};
pub use run::{RunId, RunOutcome, RunPeriod, RunState, RunStatus, RunSummary};
pub use unit::{ContentUnit, Partition, UnitId};
