//! `SQLite` graph store.
//!
//! Persists units, runs, clusters, assignments, and evolution edges in a
//! single database file. The single-primary invariant is enforced at the
//! schema level by a partial unique index over primary assignments.

// SQLite returns i64; counts and offsets here are non-negative and small.
#![allow(clippy::cast_possible_truncation)]
#![allow(clippy::cast_sign_loss)]
#![allow(clippy::cast_possible_wrap)]

use crate::models::{
    Assignment, AssignmentMethod, Cluster, ClusterId, ClusterStatus, ContentUnit, EvolutionEdge,
    EvolutionType, Partition, RunId, RunPeriod, RunState, RunStatus, UnitId,
};
use crate::storage::traits::{GraphStore, GraphStoreStats, RunCommit};
use crate::{Error, Result};
use rusqlite::{Connection, OptionalExtension, Row, params};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::{Mutex, MutexGuard};
use tracing::instrument;

/// Helper to acquire mutex lock with poison recovery.
fn acquire_lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    match mutex.lock() {
        Ok(guard) => guard,
        Err(poisoned) => {
            tracing::warn!("graph store mutex was poisoned, recovering");
            metrics::counter!("topicgraph_store_mutex_poison_recovery_total").increment(1);
            poisoned.into_inner()
        },
    }
}

/// Maps a rusqlite error to `Error::Persistence`, marking lock contention
/// as transient.
fn persistence_error(operation: &str, e: &rusqlite::Error) -> Error {
    let transient = matches!(
        e.sqlite_error_code(),
        Some(rusqlite::ErrorCode::DatabaseBusy | rusqlite::ErrorCode::DatabaseLocked)
    );
    Error::Persistence {
        operation: operation.to_string(),
        cause: e.to_string(),
        transient,
    }
}

/// `SQLite`-backed graph store.
///
/// # Concurrency Model
///
/// Uses a `Mutex<Connection>` for thread-safe access. WAL mode and
/// `busy_timeout` handle concurrent access gracefully.
///
/// # Schema
///
/// Five tables hold the versioned topic graph:
/// - `units`: embedded content units (written by the ingestion surface)
/// - `runs`: one row per clustering run
/// - `clusters`: discovered clusters, linked to the run that produced them
/// - `assignments`: unit→cluster edges with full history
/// - `evolution_edges`: cluster→cluster split/merge/continuation edges
pub struct SqliteGraphStore {
    /// Connection to the `SQLite` database.
    conn: Mutex<Connection>,
    /// Path to the database (None for in-memory).
    db_path: Option<PathBuf>,
}

impl SqliteGraphStore {
    /// Opens (or creates) a graph store at the given path.
    ///
    /// # Errors
    ///
    /// Returns an error if the database cannot be opened or initialized.
    pub fn new(db_path: impl Into<PathBuf>) -> Result<Self> {
        let db_path = db_path.into();
        let conn = Connection::open(&db_path)
            .map_err(|e| persistence_error("open_graph_store", &e))?;

        let store = Self {
            conn: Mutex::new(conn),
            db_path: Some(db_path),
        };

        store.initialize()?;
        Ok(store)
    }

    /// Creates an in-memory graph store (useful for testing).
    ///
    /// # Errors
    ///
    /// Returns an error if the database cannot be initialized.
    pub fn in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory()
            .map_err(|e| persistence_error("open_graph_store_memory", &e))?;

        let store = Self {
            conn: Mutex::new(conn),
            db_path: None,
        };

        store.initialize()?;
        Ok(store)
    }

    /// Returns the database path.
    #[must_use]
    pub fn db_path(&self) -> Option<&Path> {
        self.db_path.as_deref()
    }

    /// Initializes the database schema.
    fn initialize(&self) -> Result<()> {
        let conn = acquire_lock(&self.conn);

        let _ = conn.pragma_update(None, "journal_mode", "WAL");
        let _ = conn.pragma_update(None, "synchronous", "NORMAL");
        let _ = conn.pragma_update(None, "busy_timeout", "5000");

        conn.execute_batch(
            "CREATE TABLE IF NOT EXISTS units (
                id TEXT PRIMARY KEY,
                partition TEXT NOT NULL,
                embedding TEXT NOT NULL,
                summary TEXT NOT NULL DEFAULT '',
                created_at INTEGER NOT NULL
            );

            CREATE TABLE IF NOT EXISTS runs (
                id TEXT PRIMARY KEY,
                partition TEXT NOT NULL,
                period TEXT NOT NULL,
                timestamp INTEGER NOT NULL,
                cluster_count INTEGER NOT NULL DEFAULT 0,
                outlier_count INTEGER NOT NULL DEFAULT 0,
                total_units INTEGER NOT NULL DEFAULT 0,
                outlier_ratio REAL NOT NULL DEFAULT 0.0,
                avg_cluster_size REAL NOT NULL DEFAULT 0.0,
                params TEXT NOT NULL,
                duration_ms INTEGER NOT NULL DEFAULT 0,
                quality_score REAL NOT NULL DEFAULT 0.0,
                status TEXT NOT NULL,
                error_detail TEXT,
                config_hash TEXT NOT NULL DEFAULT '',
                supersedes TEXT
            );

            CREATE TABLE IF NOT EXISTS clusters (
                id TEXT PRIMARY KEY,
                run_id TEXT NOT NULL,
                partition TEXT NOT NULL,
                label TEXT NOT NULL DEFAULT '',
                member_count INTEGER NOT NULL DEFAULT 0,
                avg_confidence REAL NOT NULL DEFAULT 0.0,
                status TEXT NOT NULL DEFAULT 'active',
                centroid TEXT NOT NULL,
                params TEXT NOT NULL,
                created_at INTEGER NOT NULL
            );

            CREATE TABLE IF NOT EXISTS assignments (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                unit_id TEXT NOT NULL,
                cluster_id TEXT NOT NULL,
                confidence REAL NOT NULL,
                period TEXT NOT NULL,
                is_primary INTEGER NOT NULL DEFAULT 0,
                distance REAL NOT NULL DEFAULT 0.0,
                method TEXT NOT NULL DEFAULT 'clustered',
                created_at INTEGER NOT NULL
            );

            CREATE TABLE IF NOT EXISTS evolution_edges (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                from_cluster TEXT NOT NULL,
                to_cluster TEXT NOT NULL,
                evolution_type TEXT NOT NULL,
                partition TEXT NOT NULL,
                period TEXT NOT NULL,
                proportion REAL NOT NULL,
                confidence REAL NOT NULL,
                units_transferred INTEGER NOT NULL DEFAULT 0,
                centroid_similarity REAL NOT NULL DEFAULT 0.0,
                reason TEXT NOT NULL DEFAULT ''
            );

            CREATE INDEX IF NOT EXISTS idx_units_partition ON units(partition);
            CREATE INDEX IF NOT EXISTS idx_runs_partition ON runs(partition, timestamp DESC);
            CREATE INDEX IF NOT EXISTS idx_clusters_partition ON clusters(partition, status);
            CREATE INDEX IF NOT EXISTS idx_assignments_unit ON assignments(unit_id);
            CREATE INDEX IF NOT EXISTS idx_assignments_cluster ON assignments(cluster_id);
            CREATE UNIQUE INDEX IF NOT EXISTS idx_assignments_single_primary
                ON assignments(unit_id) WHERE is_primary = 1;
            CREATE INDEX IF NOT EXISTS idx_edges_partition ON evolution_edges(partition);",
        )
        .map_err(|e| persistence_error("initialize_schema", &e))?;

        Ok(())
    }

    fn parse_unit_row(row: &Row<'_>) -> rusqlite::Result<ContentUnit> {
        let id: String = row.get("id")?;
        let partition: String = row.get("partition")?;
        let embedding_json: String = row.get("embedding")?;
        let summary: String = row.get("summary")?;
        let created_at: i64 = row.get("created_at")?;

        let embedding: Vec<f32> = serde_json::from_str(&embedding_json).unwrap_or_default();
        Ok(ContentUnit::new(id, Partition::new(partition), embedding, summary)
            .with_created_at(created_at as u64))
    }

    fn parse_run_row(row: &Row<'_>) -> rusqlite::Result<RunState> {
        let params_json: String = row.get("params")?;
        let status: String = row.get("status")?;
        let supersedes: Option<String> = row.get("supersedes")?;
        let timestamp: i64 = row.get("timestamp")?;
        let duration_ms: i64 = row.get("duration_ms")?;
        let cluster_count: i64 = row.get("cluster_count")?;
        let outlier_count: i64 = row.get("outlier_count")?;
        let total_units: i64 = row.get("total_units")?;

        Ok(RunState {
            id: RunId::new(row.get::<_, String>("id")?),
            partition: Partition::new(row.get::<_, String>("partition")?),
            period: RunPeriod::new(row.get::<_, String>("period")?),
            timestamp: timestamp as u64,
            cluster_count: cluster_count as usize,
            outlier_count: outlier_count as usize,
            total_units: total_units as usize,
            outlier_ratio: row.get("outlier_ratio")?,
            avg_cluster_size: row.get("avg_cluster_size")?,
            params: serde_json::from_str(&params_json).unwrap_or_default(),
            duration_ms: duration_ms as u64,
            quality_score: row.get("quality_score")?,
            status: RunStatus::parse(&status).unwrap_or(RunStatus::Failed),
            error_detail: row.get("error_detail")?,
            config_hash: row.get("config_hash")?,
            supersedes: supersedes.map(RunId::new),
        })
    }

    fn parse_cluster_row(row: &Row<'_>) -> rusqlite::Result<Cluster> {
        let centroid_json: String = row.get("centroid")?;
        let params_json: String = row.get("params")?;
        let status: String = row.get("status")?;
        let member_count: i64 = row.get("member_count")?;
        let created_at: i64 = row.get("created_at")?;

        let mut cluster = Cluster::new(
            ClusterId::new(row.get::<_, String>("id")?),
            Partition::new(row.get::<_, String>("partition")?),
            serde_json::from_str(&centroid_json).unwrap_or_default(),
            member_count as usize,
            row.get("avg_confidence")?,
            serde_json::from_str(&params_json).unwrap_or_default(),
        )
        .with_label(row.get::<_, String>("label")?)
        .with_status(ClusterStatus::parse(&status).unwrap_or(ClusterStatus::Active));
        cluster.created_at = created_at as u64;
        Ok(cluster)
    }

    fn parse_assignment_row(row: &Row<'_>) -> rusqlite::Result<Assignment> {
        let method: String = row.get("method")?;
        let is_primary: i64 = row.get("is_primary")?;
        let created_at: i64 = row.get("created_at")?;

        let mut assignment = Assignment::new(
            UnitId::new(row.get::<_, String>("unit_id")?),
            ClusterId::new(row.get::<_, String>("cluster_id")?),
            row.get("confidence")?,
            RunPeriod::new(row.get::<_, String>("period")?),
            row.get("distance")?,
        )
        .with_method(AssignmentMethod::parse(&method).unwrap_or(AssignmentMethod::Clustered));
        assignment.is_primary = is_primary != 0;
        assignment.created_at = created_at as u64;
        Ok(assignment)
    }

    fn parse_edge_row(row: &Row<'_>) -> rusqlite::Result<EvolutionEdge> {
        let evolution_type: String = row.get("evolution_type")?;
        let units_transferred: i64 = row.get("units_transferred")?;

        Ok(EvolutionEdge::new(
            ClusterId::new(row.get::<_, String>("from_cluster")?),
            ClusterId::new(row.get::<_, String>("to_cluster")?),
            EvolutionType::parse(&evolution_type).unwrap_or(EvolutionType::Continuation),
            RunPeriod::new(row.get::<_, String>("period")?),
            row.get("proportion")?,
            units_transferred as usize,
        )
        .with_confidence(row.get("confidence")?)
        .with_centroid_similarity(row.get("centroid_similarity")?)
        .with_reason(row.get::<_, String>("reason")?))
    }

    fn insert_run_row(conn: &Connection, run: &RunState) -> rusqlite::Result<()> {
        let params_json = serde_json::to_string(&run.params).unwrap_or_default();
        conn.execute(
            "INSERT OR REPLACE INTO runs (
                id, partition, period, timestamp, cluster_count, outlier_count, total_units,
                outlier_ratio, avg_cluster_size, params, duration_ms, quality_score, status,
                error_detail, config_hash, supersedes
            ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14, ?15, ?16)",
            params![
                run.id.as_str(),
                run.partition.as_str(),
                run.period.as_str(),
                run.timestamp as i64,
                run.cluster_count as i64,
                run.outlier_count as i64,
                run.total_units as i64,
                run.outlier_ratio,
                run.avg_cluster_size,
                params_json,
                run.duration_ms as i64,
                run.quality_score,
                run.status.as_str(),
                run.error_detail,
                run.config_hash,
                run.supersedes.as_ref().map(RunId::as_str),
            ],
        )?;
        Ok(())
    }
}

impl GraphStore for SqliteGraphStore {
    #[instrument(skip(self, unit), fields(unit_id = %unit.id))]
    fn insert_unit(&self, unit: &ContentUnit) -> Result<()> {
        let conn = acquire_lock(&self.conn);
        let embedding_json = serde_json::to_string(&unit.embedding).unwrap_or_default();
        conn.execute(
            "INSERT OR REPLACE INTO units (id, partition, embedding, summary, created_at)
             VALUES (?1, ?2, ?3, ?4, ?5)",
            params![
                unit.id.as_str(),
                unit.partition.as_str(),
                embedding_json,
                unit.summary,
                unit.created_at as i64,
            ],
        )
        .map_err(|e| persistence_error("insert_unit", &e))?;
        Ok(())
    }

    fn fetch_embedded_units(&self, partition: &Partition) -> Result<Vec<ContentUnit>> {
        let conn = acquire_lock(&self.conn);
        let mut stmt = conn
            .prepare(
                "SELECT id, partition, embedding, summary, created_at
                 FROM units WHERE partition = ?1 ORDER BY created_at, id",
            )
            .map_err(|e| Error::Extraction { cause: e.to_string() })?;

        let units = stmt
            .query_map(params![partition.as_str()], Self::parse_unit_row)
            .map_err(|e| Error::Extraction { cause: e.to_string() })?
            .collect::<rusqlite::Result<Vec<_>>>()
            .map_err(|e| Error::Extraction { cause: e.to_string() })?;
        Ok(units)
    }

    fn latest_run(&self, partition: &Partition) -> Result<Option<RunState>> {
        let conn = acquire_lock(&self.conn);
        conn.query_row(
            "SELECT * FROM runs WHERE partition = ?1 ORDER BY timestamp DESC, id DESC LIMIT 1",
            params![partition.as_str()],
            Self::parse_run_row,
        )
        .optional()
        .map_err(|e| persistence_error("latest_run", &e))
    }

    fn run_history(&self, partition: &Partition, limit: usize) -> Result<Vec<RunState>> {
        let conn = acquire_lock(&self.conn);
        let mut stmt = conn
            .prepare(
                "SELECT * FROM runs WHERE partition = ?1
                 ORDER BY timestamp DESC, id DESC LIMIT ?2",
            )
            .map_err(|e| persistence_error("run_history", &e))?;

        stmt.query_map(params![partition.as_str(), limit as i64], Self::parse_run_row)
            .map_err(|e| persistence_error("run_history", &e))?
            .collect::<rusqlite::Result<Vec<_>>>()
            .map_err(|e| persistence_error("run_history", &e))
    }

    fn primary_assignments(&self, partition: &Partition) -> Result<HashMap<UnitId, ClusterId>> {
        let conn = acquire_lock(&self.conn);
        let mut stmt = conn
            .prepare(
                "SELECT a.unit_id, a.cluster_id FROM assignments a
                 JOIN clusters c ON c.id = a.cluster_id
                 WHERE a.is_primary = 1 AND c.partition = ?1",
            )
            .map_err(|e| persistence_error("primary_assignments", &e))?;

        let rows = stmt
            .query_map(params![partition.as_str()], |row| {
                Ok((
                    UnitId::new(row.get::<_, String>(0)?),
                    ClusterId::new(row.get::<_, String>(1)?),
                ))
            })
            .map_err(|e| persistence_error("primary_assignments", &e))?
            .collect::<rusqlite::Result<HashMap<_, _>>>()
            .map_err(|e| persistence_error("primary_assignments", &e))?;
        Ok(rows)
    }

    fn get_cluster(&self, id: &ClusterId) -> Result<Option<Cluster>> {
        let conn = acquire_lock(&self.conn);
        conn.query_row(
            "SELECT * FROM clusters WHERE id = ?1",
            params![id.as_str()],
            Self::parse_cluster_row,
        )
        .optional()
        .map_err(|e| persistence_error("get_cluster", &e))
    }

    fn active_clusters(&self, partition: &Partition) -> Result<Vec<Cluster>> {
        let conn = acquire_lock(&self.conn);
        let mut stmt = conn
            .prepare(
                "SELECT * FROM clusters WHERE partition = ?1 AND status = 'active'
                 ORDER BY created_at DESC, id",
            )
            .map_err(|e| persistence_error("active_clusters", &e))?;

        stmt.query_map(params![partition.as_str()], Self::parse_cluster_row)
            .map_err(|e| persistence_error("active_clusters", &e))?
            .collect::<rusqlite::Result<Vec<_>>>()
            .map_err(|e| persistence_error("active_clusters", &e))
    }

    fn assignments_for_unit(&self, unit_id: &UnitId) -> Result<Vec<Assignment>> {
        let conn = acquire_lock(&self.conn);
        let mut stmt = conn
            .prepare(
                "SELECT * FROM assignments WHERE unit_id = ?1
                 ORDER BY created_at DESC, id DESC",
            )
            .map_err(|e| persistence_error("assignments_for_unit", &e))?;

        stmt.query_map(params![unit_id.as_str()], Self::parse_assignment_row)
            .map_err(|e| persistence_error("assignments_for_unit", &e))?
            .collect::<rusqlite::Result<Vec<_>>>()
            .map_err(|e| persistence_error("assignments_for_unit", &e))
    }

    fn evolution_edges(&self, partition: &Partition) -> Result<Vec<EvolutionEdge>> {
        let conn = acquire_lock(&self.conn);
        let mut stmt = conn
            .prepare(
                "SELECT * FROM evolution_edges WHERE partition = ?1 ORDER BY id",
            )
            .map_err(|e| persistence_error("evolution_edges", &e))?;

        stmt.query_map(params![partition.as_str()], Self::parse_edge_row)
            .map_err(|e| persistence_error("evolution_edges", &e))?
            .collect::<rusqlite::Result<Vec<_>>>()
            .map_err(|e| persistence_error("evolution_edges", &e))
    }

    #[instrument(skip(self, commit), fields(run_id = %commit.run.id, partition = %commit.run.partition))]
    fn commit_run(&self, commit: &RunCommit) -> Result<()> {
        let mut conn = acquire_lock(&self.conn);
        let tx = conn
            .transaction()
            .map_err(|e| persistence_error("commit_run_begin", &e))?;

        (|| -> rusqlite::Result<()> {
            Self::insert_run_row(&tx, &commit.run)?;

            // Archive old primary assignments for the units reassigned by
            // this run, before the new primaries go in. The partial unique
            // index rejects any run that would break the invariant.
            for assignment in &commit.assignments {
                tx.execute(
                    "UPDATE assignments SET is_primary = 0
                     WHERE unit_id = ?1 AND is_primary = 1",
                    params![assignment.unit_id.as_str()],
                )?;
            }

            for cluster in &commit.clusters {
                let centroid_json = serde_json::to_string(&cluster.centroid).unwrap_or_default();
                let params_json = serde_json::to_string(&cluster.params).unwrap_or_default();
                tx.execute(
                    "INSERT INTO clusters (
                        id, run_id, partition, label, member_count, avg_confidence,
                        status, centroid, params, created_at
                    ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10)",
                    params![
                        cluster.id.as_str(),
                        commit.run.id.as_str(),
                        cluster.partition.as_str(),
                        cluster.label,
                        cluster.member_count as i64,
                        cluster.avg_confidence,
                        cluster.status.as_str(),
                        centroid_json,
                        params_json,
                        cluster.created_at as i64,
                    ],
                )?;
            }

            for assignment in &commit.assignments {
                tx.execute(
                    "INSERT INTO assignments (
                        unit_id, cluster_id, confidence, period, is_primary,
                        distance, method, created_at
                    ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)",
                    params![
                        assignment.unit_id.as_str(),
                        assignment.cluster_id.as_str(),
                        assignment.confidence,
                        assignment.period.as_str(),
                        i64::from(assignment.is_primary),
                        assignment.distance,
                        assignment.method.as_str(),
                        assignment.created_at as i64,
                    ],
                )?;
            }

            for edge in &commit.edges {
                tx.execute(
                    "INSERT INTO evolution_edges (
                        from_cluster, to_cluster, evolution_type, partition, period,
                        proportion, confidence, units_transferred, centroid_similarity, reason
                    ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10)",
                    params![
                        edge.from_cluster.as_str(),
                        edge.to_cluster.as_str(),
                        edge.evolution_type.as_str(),
                        commit.run.partition.as_str(),
                        edge.period.as_str(),
                        edge.proportion,
                        edge.confidence,
                        edge.units_transferred as i64,
                        edge.centroid_similarity,
                        edge.reason,
                    ],
                )?;
            }

            for (cluster_id, status) in &commit.superseded_clusters {
                tx.execute(
                    "UPDATE clusters SET status = ?1 WHERE id = ?2",
                    params![status.as_str(), cluster_id.as_str()],
                )?;
            }

            Ok(())
        })()
        .map_err(|e| persistence_error("commit_run", &e))?;

        tx.commit()
            .map_err(|e| persistence_error("commit_run_commit", &e))?;

        metrics::counter!("topicgraph_runs_committed_total").increment(1);
        Ok(())
    }

    fn record_failed_run(&self, run: &RunState) -> Result<()> {
        let conn = acquire_lock(&self.conn);
        Self::insert_run_row(&conn, run).map_err(|e| persistence_error("record_failed_run", &e))?;
        metrics::counter!("topicgraph_runs_failed_total").increment(1);
        Ok(())
    }

    fn stats(&self) -> Result<GraphStoreStats> {
        let conn = acquire_lock(&self.conn);
        let count = |sql: &str| -> rusqlite::Result<usize> {
            conn.query_row(sql, [], |row| row.get::<_, i64>(0))
                .map(|n| n as usize)
        };

        (|| -> rusqlite::Result<GraphStoreStats> {
            Ok(GraphStoreStats {
                unit_count: count("SELECT COUNT(*) FROM units")?,
                cluster_count: count("SELECT COUNT(*) FROM clusters")?,
                active_cluster_count: count(
                    "SELECT COUNT(*) FROM clusters WHERE status = 'active'",
                )?,
                assignment_count: count("SELECT COUNT(*) FROM assignments")?,
                primary_assignment_count: count(
                    "SELECT COUNT(*) FROM assignments WHERE is_primary = 1",
                )?,
                edge_count: count("SELECT COUNT(*) FROM evolution_edges")?,
                run_count: count("SELECT COUNT(*) FROM runs")?,
            })
        })()
        .map_err(|e| persistence_error("stats", &e))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ClusteringParams;
    use crate::models::RunSummary;

    fn test_unit(id: &str, partition: &str, embedding: Vec<f32>) -> ContentUnit {
        ContentUnit::new(id, Partition::new(partition), embedding, format!("summary {id}"))
    }

    fn test_commit(partition: &str, units: &[&ContentUnit]) -> RunCommit {
        let run = RunState {
            status: RunStatus::Completed,
            cluster_count: 1,
            total_units: units.len(),
            ..RunState::begin(
                Partition::new(partition),
                ClusteringParams::default(),
                "hash".to_string(),
            )
        };
        let cluster_id = ClusterId::from_parts(&run.period, run.id.short_suffix(), 0);
        let cluster = Cluster::new(
            cluster_id.clone(),
            Partition::new(partition),
            vec![1.0, 0.0],
            units.len(),
            0.9,
            ClusteringParams::default(),
        )
        .with_label("Test Topic");

        let assignments = units
            .iter()
            .map(|u| {
                Assignment::new(u.id.clone(), cluster_id.clone(), 0.9, run.period.clone(), 0.1)
            })
            .collect();

        RunCommit {
            run,
            clusters: vec![cluster],
            assignments,
            edges: Vec::new(),
            superseded_clusters: Vec::new(),
        }
    }

    #[test]
    fn test_insert_and_fetch_units() {
        let store = SqliteGraphStore::in_memory().unwrap();
        store.insert_unit(&test_unit("u1", "p", vec![1.0, 0.0])).unwrap();
        store.insert_unit(&test_unit("u2", "p", vec![0.0, 1.0])).unwrap();
        store.insert_unit(&test_unit("u3", "other", vec![0.5, 0.5])).unwrap();

        let units = store.fetch_embedded_units(&Partition::new("p")).unwrap();
        assert_eq!(units.len(), 2);
        assert_eq!(units[0].embedding, vec![1.0, 0.0]);

        let empty = store.fetch_embedded_units(&Partition::new("missing")).unwrap();
        assert!(empty.is_empty());
    }

    #[test]
    fn test_commit_run_roundtrip() {
        let store = SqliteGraphStore::in_memory().unwrap();
        let u1 = test_unit("u1", "p", vec![1.0, 0.0]);
        let u2 = test_unit("u2", "p", vec![0.99, 0.1]);
        store.insert_unit(&u1).unwrap();
        store.insert_unit(&u2).unwrap();

        let commit = test_commit("p", &[&u1, &u2]);
        store.commit_run(&commit).unwrap();

        let latest = store.latest_run(&Partition::new("p")).unwrap().unwrap();
        assert_eq!(latest.id, commit.run.id);
        assert_eq!(latest.status, RunStatus::Completed);

        let cluster = store.get_cluster(&commit.clusters[0].id).unwrap().unwrap();
        assert_eq!(cluster.label, "Test Topic");
        assert_eq!(cluster.member_count, 2);
        assert_eq!(cluster.centroid, vec![1.0, 0.0]);

        let primaries = store.primary_assignments(&Partition::new("p")).unwrap();
        assert_eq!(primaries.len(), 2);
        assert_eq!(primaries[&UnitId::new("u1")], commit.clusters[0].id);
    }

    #[test]
    fn test_recommit_archives_old_primaries() {
        let store = SqliteGraphStore::in_memory().unwrap();
        let u1 = test_unit("u1", "p", vec![1.0, 0.0]);
        store.insert_unit(&u1).unwrap();

        let first = test_commit("p", &[&u1]);
        store.commit_run(&first).unwrap();
        let second = test_commit("p", &[&u1]);
        store.commit_run(&second).unwrap();

        let history = store.assignments_for_unit(&UnitId::new("u1")).unwrap();
        assert_eq!(history.len(), 2);
        assert_eq!(history.iter().filter(|a| a.is_primary).count(), 1);

        let primaries = store.primary_assignments(&Partition::new("p")).unwrap();
        assert_eq!(primaries[&UnitId::new("u1")], second.clusters[0].id);
    }

    #[test]
    fn test_superseded_cluster_status_transition() {
        let store = SqliteGraphStore::in_memory().unwrap();
        let u1 = test_unit("u1", "p", vec![1.0, 0.0]);
        store.insert_unit(&u1).unwrap();

        let first = test_commit("p", &[&u1]);
        store.commit_run(&first).unwrap();

        let mut second = test_commit("p", &[&u1]);
        second.superseded_clusters =
            vec![(first.clusters[0].id.clone(), ClusterStatus::Split)];
        store.commit_run(&second).unwrap();

        let old = store.get_cluster(&first.clusters[0].id).unwrap().unwrap();
        assert_eq!(old.status, ClusterStatus::Split);

        let active = store.active_clusters(&Partition::new("p")).unwrap();
        assert_eq!(active.len(), 1);
        assert_eq!(active[0].id, second.clusters[0].id);
    }

    #[test]
    fn test_evolution_edges_roundtrip() {
        let store = SqliteGraphStore::in_memory().unwrap();
        let u1 = test_unit("u1", "p", vec![1.0, 0.0]);
        store.insert_unit(&u1).unwrap();

        let mut commit = test_commit("p", &[&u1]);
        commit.edges.push(
            EvolutionEdge::new(
                ClusterId::new("2026-07_x_c0"),
                commit.clusters[0].id.clone(),
                EvolutionType::Continuation,
                commit.run.period.clone(),
                0.92,
                11,
            )
            .with_confidence(0.8)
            .with_centroid_similarity(0.95)
            .with_reason("captured 92% of source cluster"),
        );
        store.commit_run(&commit).unwrap();

        let edges = store.evolution_edges(&Partition::new("p")).unwrap();
        assert_eq!(edges.len(), 1);
        assert_eq!(edges[0].evolution_type, EvolutionType::Continuation);
        assert_eq!(edges[0].units_transferred, 11);
        assert!((edges[0].proportion - 0.92).abs() < 1e-6);

        let other = store.evolution_edges(&Partition::new("other")).unwrap();
        assert!(other.is_empty());
    }

    #[test]
    fn test_record_failed_run() {
        let store = SqliteGraphStore::in_memory().unwrap();
        let run = RunState::begin(
            Partition::new("p"),
            ClusteringParams::default(),
            "hash".to_string(),
        )
        .failed("clustering exploded", 17);
        store.record_failed_run(&run).unwrap();

        let latest = store.latest_run(&Partition::new("p")).unwrap().unwrap();
        assert_eq!(latest.status, RunStatus::Failed);
        assert_eq!(latest.error_detail.as_deref(), Some("clustering exploded"));

        let stats = store.stats().unwrap();
        assert_eq!(stats.run_count, 1);
        assert_eq!(stats.cluster_count, 0);
    }

    #[test]
    fn test_run_history_order_and_limit() {
        let store = SqliteGraphStore::in_memory().unwrap();
        for i in 0..3 {
            let mut run = RunState::begin(
                Partition::new("p"),
                ClusteringParams::default(),
                "hash".to_string(),
            );
            run.timestamp = 1_000 + i;
            run.status = RunStatus::Completed;
            store.record_failed_run(&run).unwrap();
        }

        let history = store.run_history(&Partition::new("p"), 2).unwrap();
        assert_eq!(history.len(), 2);
        assert!(history[0].timestamp >= history[1].timestamp);
    }

    #[test]
    fn test_stats_counts() {
        let store = SqliteGraphStore::in_memory().unwrap();
        let u1 = test_unit("u1", "p", vec![1.0, 0.0]);
        store.insert_unit(&u1).unwrap();
        store.commit_run(&test_commit("p", &[&u1])).unwrap();

        let stats = store.stats().unwrap();
        assert_eq!(stats.unit_count, 1);
        assert_eq!(stats.cluster_count, 1);
        assert_eq!(stats.active_cluster_count, 1);
        assert_eq!(stats.primary_assignment_count, 1);
    }

    #[test]
    fn test_summary_serializes() {
        // RunSummary must stay serializable for the CLI's JSON output.
        let summary = RunSummary::skipped(Partition::new("p"), "no units", 0);
        let json = serde_json::to_string(&summary).unwrap();
        assert!(json.contains("skipped"));
    }
}
