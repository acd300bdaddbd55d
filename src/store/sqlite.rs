//! SQLite-backed `OutcomeStore`: WAL-mode database, prepared statements,
//! soft retention eviction.
//!
//! Runs with `synchronous = FULL` rather than the more common `NORMAL`,
//! because outcome durability feeds the learning loop directly and a lost
//! row silently skews future weights.

#![allow(missing_docs)]

use std::path::{Path, PathBuf};

use rusqlite::{params, Connection, OpenFlags};

use crate::core::errors::{DrnError, Result};
use crate::store::{DeploymentOutcome, OutcomeStore};

/// SQLite-backed outcome log.
pub struct SqliteOutcomeStore {
    conn: parking_lot::Mutex<Connection>,
    path: PathBuf,
    max_rows: u64,
}

impl SqliteOutcomeStore {
    /// Open (or create) the database at `path`, applying schema and PRAGMAs.
    pub fn open(path: &Path, max_rows: u64) -> Result<Self> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).map_err(|source| DrnError::io(parent, source))?;
        }

        let conn = Connection::open_with_flags(
            path,
            OpenFlags::SQLITE_OPEN_READ_WRITE
                | OpenFlags::SQLITE_OPEN_CREATE
                | OpenFlags::SQLITE_OPEN_NO_MUTEX,
        )?;

        apply_pragmas(&conn)?;
        apply_schema(&conn)?;

        Ok(Self {
            conn: parking_lot::Mutex::new(conn),
            path: path.to_path_buf(),
            max_rows,
        })
    }

    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Check that WAL mode is active (diagnostics / tests).
    pub fn is_wal_mode(&self) -> bool {
        self.conn
            .lock()
            .query_row("PRAGMA journal_mode", [], |row| row.get::<_, String>(0))
            .map(|mode| mode.eq_ignore_ascii_case("wal"))
            .unwrap_or(false)
    }

    /// Evict the oldest rows once the table exceeds `max_rows` (the
    /// optional retention cap; `max_rows == 0` disables eviction).
    fn enforce_retention(&self, conn: &Connection) -> Result<()> {
        if self.max_rows == 0 {
            return Ok(());
        }
        let total: i64 = conn.query_row("SELECT COUNT(*) FROM outcomes", [], |row| row.get(0))?;
        let overflow = total.saturating_sub(self.max_rows as i64);
        if overflow > 0 {
            conn.execute(
                "DELETE FROM outcomes WHERE id IN (
                    SELECT id FROM outcomes ORDER BY id ASC LIMIT ?1
                )",
                params![overflow],
            )?;
        }
        Ok(())
    }
}

impl OutcomeStore for SqliteOutcomeStore {
    fn save(&self, outcome: &DeploymentOutcome) -> Result<()> {
        let conn = self.conn.lock();
        conn.prepare_cached(
            "INSERT INTO outcomes (
                deployment_id, timestamp, heuristic_score, ml_score, final_score,
                actual_error_rate_percent, actual_latency_change_percent, rollback_triggered
            ) VALUES (?1,?2,?3,?4,?5,?6,?7,?8)",
        )?
        .execute(params![
            outcome.deployment_id,
            outcome.timestamp.to_rfc3339_opts(chrono::SecondsFormat::Millis, true),
            outcome.heuristic_score,
            outcome.ml_score,
            outcome.final_score,
            outcome.actual_error_rate_percent,
            outcome.actual_latency_change_percent,
            i32::from(outcome.rollback_triggered),
        ])?;
        self.enforce_retention(&conn)?;
        Ok(())
    }

    fn recent(&self, limit: u32) -> Result<Vec<DeploymentOutcome>> {
        if limit == 0 {
            return Ok(Vec::new());
        }
        let conn = self.conn.lock();
        let mut stmt = conn.prepare_cached(
            "SELECT deployment_id, timestamp, heuristic_score, ml_score, final_score,
                    actual_error_rate_percent, actual_latency_change_percent, rollback_triggered
             FROM outcomes ORDER BY id DESC LIMIT ?1",
        )?;
        let rows = stmt
            .query_map(params![limit], |row| {
                let timestamp_raw: String = row.get(1)?;
                let rollback_triggered: i32 = row.get(7)?;
                Ok(DeploymentOutcome {
                    deployment_id: row.get(0)?,
                    timestamp: chrono::DateTime::parse_from_rfc3339(&timestamp_raw)
                        .map(|dt| dt.with_timezone(&chrono::Utc))
                        .unwrap_or_else(|_| chrono::Utc::now()),
                    heuristic_score: row.get(2)?,
                    ml_score: row.get(3)?,
                    final_score: row.get(4)?,
                    actual_error_rate_percent: row.get(5)?,
                    actual_latency_change_percent: row.get(6)?,
                    rollback_triggered: rollback_triggered != 0,
                })
            })?
            .collect::<std::result::Result<Vec<_>, _>>()?;
        Ok(rows)
    }

    fn count(&self) -> Result<u64> {
        let conn = self.conn.lock();
        let count: i64 = conn.query_row("SELECT COUNT(*) FROM outcomes", [], |row| row.get(0))?;
        Ok(count as u64)
    }
}

fn apply_pragmas(conn: &Connection) -> Result<()> {
    conn.execute_batch(
        "PRAGMA journal_mode = WAL;
         PRAGMA synchronous = FULL;
         PRAGMA cache_size = -8000;
         PRAGMA temp_store = MEMORY;
         PRAGMA busy_timeout = 5000;",
    )?;
    let mode: String = conn.query_row("PRAGMA journal_mode", [], |row| row.get(0))?;
    if !mode.eq_ignore_ascii_case("wal") {
        eprintln!("[DRN-STORE] WARNING: requested WAL mode but got '{mode}'");
    }
    Ok(())
}

fn apply_schema(conn: &Connection) -> Result<()> {
    conn.execute_batch(
        "CREATE TABLE IF NOT EXISTS outcomes (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            deployment_id TEXT NOT NULL,
            timestamp TEXT NOT NULL,
            heuristic_score REAL NOT NULL,
            ml_score REAL NOT NULL,
            final_score REAL NOT NULL,
            actual_error_rate_percent REAL NOT NULL,
            actual_latency_change_percent REAL NOT NULL,
            rollback_triggered INTEGER NOT NULL DEFAULT 0
        );

        CREATE INDEX IF NOT EXISTS idx_outcomes_deployment_id ON outcomes(deployment_id);
        CREATE INDEX IF NOT EXISTS idx_outcomes_timestamp ON outcomes(timestamp);",
    )?;
    Ok(())
}
