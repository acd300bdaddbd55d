//! Outcome Store (C1): a durable, append-mostly log of `DeploymentOutcome`
//! records addressable by insertion order.

#[cfg(feature = "sqlite")]
pub mod sqlite;

use serde::{Deserialize, Serialize};

use crate::core::errors::Result;

/// A persisted record of an observed deployment outcome.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct DeploymentOutcome {
    pub deployment_id: String,
    pub timestamp: chrono::DateTime<chrono::Utc>,
    pub heuristic_score: f64,
    pub ml_score: f64,
    pub final_score: f64,
    pub actual_error_rate_percent: f64,
    pub actual_latency_change_percent: f64,
    pub rollback_triggered: bool,
}

impl DeploymentOutcome {
    /// The *actual risk proxy*: a 0.0-1.0 blend of the three observed
    /// signals, used both by the tuner's training target and by the
    /// ensemble's historical-calibration term.
    #[must_use]
    pub fn actual_risk_proxy(&self) -> f64 {
        let rollback_term = if self.rollback_triggered { 0.5 } else { 0.0 };
        let error_term = 0.3 * (self.actual_error_rate_percent / 1.0);
        let latency_term = 0.2 * (self.actual_latency_change_percent / 50.0);
        (rollback_term + error_term + latency_term).clamp(0.0, 1.0)
    }
}

/// Durable, single-writer-safe log abstraction. Implemented
/// by `sqlite::SqliteOutcomeStore` in production and by `InMemoryOutcomeStore`
/// in tests that don't need a real database.
pub trait OutcomeStore: Send + Sync {
    /// Atomic insert; must be durable before returning success.
    fn save(&self, outcome: &DeploymentOutcome) -> Result<()>;

    /// Up to `limit` most recent rows, newest first. `limit == 0` returns
    /// an empty vector without touching storage.
    fn recent(&self, limit: u32) -> Result<Vec<DeploymentOutcome>>;

    /// Total row count.
    fn count(&self) -> Result<u64>;
}

/// In-memory mock store for unit/integration tests: a
/// `parking_lot::Mutex<Vec<_>>`, the same serialize-writers idiom used for
/// the real SQLite connection, without a filesystem dependency.
#[derive(Debug, Default)]
pub struct InMemoryOutcomeStore {
    rows: parking_lot::Mutex<Vec<DeploymentOutcome>>,
}

impl InMemoryOutcomeStore {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }
}

impl OutcomeStore for InMemoryOutcomeStore {
    fn save(&self, outcome: &DeploymentOutcome) -> Result<()> {
        self.rows.lock().push(outcome.clone());
        Ok(())
    }

    fn recent(&self, limit: u32) -> Result<Vec<DeploymentOutcome>> {
        if limit == 0 {
            return Ok(Vec::new());
        }
        let rows = self.rows.lock();
        Ok(rows
            .iter()
            .rev()
            .take(limit as usize)
            .cloned()
            .collect())
    }

    fn count(&self) -> Result<u64> {
        Ok(self.rows.lock().len() as u64)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_outcome(deployment_id: &str) -> DeploymentOutcome {
        DeploymentOutcome {
            deployment_id: deployment_id.to_string(),
            timestamp: chrono::Utc::now(),
            heuristic_score: 40.0,
            ml_score: 45.0,
            final_score: 42.0,
            actual_error_rate_percent: 0.1,
            actual_latency_change_percent: 5.0,
            rollback_triggered: false,
        }
    }

    #[test]
    fn in_memory_store_returns_newest_first() {
        let store = InMemoryOutcomeStore::new();
        store.save(&sample_outcome("d1")).unwrap();
        store.save(&sample_outcome("d2")).unwrap();
        let recent = store.recent(10).unwrap();
        assert_eq!(recent[0].deployment_id, "d2");
        assert_eq!(recent[1].deployment_id, "d1");
    }

    #[test]
    fn in_memory_store_limit_zero_is_empty() {
        let store = InMemoryOutcomeStore::new();
        store.save(&sample_outcome("d1")).unwrap();
        assert!(store.recent(0).unwrap().is_empty());
    }

    #[test]
    fn in_memory_store_count_tracks_saves() {
        let store = InMemoryOutcomeStore::new();
        assert_eq!(store.count().unwrap(), 0);
        store.save(&sample_outcome("d1")).unwrap();
        assert_eq!(store.count().unwrap(), 1);
    }

    #[test]
    fn actual_risk_proxy_combines_signals_and_clamps() {
        let mut outcome = sample_outcome("d1");
        outcome.rollback_triggered = true;
        outcome.actual_error_rate_percent = 10.0;
        outcome.actual_latency_change_percent = 200.0;
        assert_eq!(outcome.actual_risk_proxy(), 1.0);

        outcome.rollback_triggered = false;
        outcome.actual_error_rate_percent = 0.0;
        outcome.actual_latency_change_percent = 0.0;
        assert_eq!(outcome.actual_risk_proxy(), 0.0);
    }
}
