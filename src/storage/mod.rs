//! Storage backends for the versioned topic graph.
//!
//! The [`GraphStore`] trait abstracts over persistence; [`SqliteGraphStore`]
//! is the production backend, [`InMemoryGraphStore`] serves tests and
//! scratch use.

mod memory;
mod retry;
mod sqlite;
pub mod traits;

pub use memory::InMemoryGraphStore;
pub use retry::execute_with_retry;
pub use sqlite::SqliteGraphStore;
pub use traits::{GraphStore, GraphStoreStats, RunCommit};
