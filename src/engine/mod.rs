//! Assessment Service (C9): the request entry point. Builds a
//! `RiskAssessment` and `CanaryPolicy` from a `DeploymentContext`, and
//! exposes `record_outcome`/`recent_outcomes` as the other two external
//! operations.
//!
//! There is no HTTP layer here: the concurrency model is request-per-thread,
//! not async, so `Engine` is a plain library API a transport adapter or the
//! `drn` CLI calls directly.

#![allow(missing_docs)]

use std::sync::Arc;
use std::time::{Duration, Instant};

use crate::core::config::Config;
use crate::core::errors::{DrnError, Result};
use crate::logger::dual::{self, ActivityEvent, ActivityLoggerHandle, EventLoggerConfig};
use crate::logger::jsonl::JsonlConfig;
use crate::outcome::{self, RecordError};
use crate::policy::{self, CanaryPolicy};
use crate::risk::{DeploymentContext, EnsemblePredictor, EnsembleWeights, RiskAssessment};
use crate::scheduler::{self, SchedulerHandle};
use crate::store::{DeploymentOutcome, OutcomeStore};
use crate::tuner::{self, WeightTuner};

/// Combined response of the `assess` operation.
#[derive(Debug, Clone, serde::Serialize, serde::Deserialize, PartialEq)]
pub struct AssessmentResult {
    pub risk_assessment: RiskAssessment,
    pub canary_policy: CanaryPolicy,
}

/// Response shape of `record_outcome`.
#[derive(Debug, Clone, serde::Serialize, serde::Deserialize, PartialEq)]
pub struct RecordOutcomeResponse {
    pub status: &'static str,
    pub deployment_id: String,
    pub final_score: f64,
    pub timestamp: chrono::DateTime<chrono::Utc>,
}

/// Maximum `limit` accepted by `recent_outcomes`.
const MAX_RECENT_LIMIT: u32 = 500;
const DEFAULT_RECENT_LIMIT: u32 = 20;

/// The assessment service. Owns the store, the ensemble predictor, and
/// (optionally) the background tuning scheduler.
pub struct Engine {
    store: Arc<dyn OutcomeStore>,
    predictor: Arc<EnsemblePredictor>,
    tuner: Arc<WeightTuner>,
    scheduler: Option<SchedulerHandle>,
    logger: ActivityLoggerHandle,
    logger_join: Option<std::thread::JoinHandle<()>>,
}

impl Engine {
    /// Build an engine from a loaded `Config`: opens the SQLite store, seeds
    /// the ensemble with the configured initial weights, and starts the
    /// scheduler if enabled.
    #[cfg(feature = "sqlite")]
    pub fn new(config: &Config) -> Result<Self> {
        let store: Arc<dyn OutcomeStore> = Arc::new(crate::store::sqlite::SqliteOutcomeStore::open(
            &config.store.db_path,
            config.store.max_rows,
        )?);
        Self::with_store(config, store)
    }

    /// Build an engine from an explicit store (used by tests to substitute
    /// `InMemoryOutcomeStore`).
    pub fn with_store(config: &Config, store: Arc<dyn OutcomeStore>) -> Result<Self> {
        let predictor = Arc::new(EnsemblePredictor::new(EnsembleWeights::new(
            config.ensemble.heuristic_weight_init,
            config.ensemble.ml_weight_init,
        )));
        let tuner = Arc::new(WeightTuner::new(
            config.tuner.max_outcomes_per_tune,
            config.tuner.min_outcomes_required,
            config.tuner.smoothing_factor,
            config.ml.learning_rate,
            config.ml.l2_lambda,
        ));

        let (logger, logger_join) = dual::spawn_logger(EventLoggerConfig {
            jsonl_config: JsonlConfig {
                path: config.paths.event_log.clone(),
                ..JsonlConfig::default()
            },
            ..EventLoggerConfig::default()
        })?;

        let scheduler = if config.scheduler.enabled {
            Some(scheduler::spawn(
                Duration::from_secs(config.scheduler.interval_secs),
                Arc::clone(&store),
                Arc::clone(&predictor),
                Arc::clone(&tuner),
                logger.clone(),
            ))
        } else {
            None
        };

        Ok(Self {
            store,
            predictor,
            tuner,
            scheduler,
            logger,
            logger_join: Some(logger_join),
        })
    }

    /// Entry operation `assess`: validate, score, generate
    /// a policy. Pure and deterministic relative to the current weights
    /// snapshot — no persistence, no I/O.
    pub fn assess(&self, context: &DeploymentContext) -> Result<AssessmentResult> {
        context
            .validate()
            .map_err(|details| DrnError::Validation { details })?;

        let calibration_history = self.calibration_history()?;
        let risk_assessment = self.predictor.assess(context, &calibration_history);
        let canary_policy = policy::generate(&risk_assessment, context);

        self.logger.send(ActivityEvent::AssessmentComputed {
            deployment_id: context.deployment_id.clone(),
            risk_score: risk_assessment.risk_score,
            risk_level: risk_assessment.risk_level.to_string(),
        });

        Ok(AssessmentResult {
            risk_assessment,
            canary_policy,
        })
    }

    /// `assess` with a caller-supplied deadline: the assessment itself is
    /// CPU-only, but this still lets a slow
    /// calibration-history read (I/O against the store) surface as a
    /// timeout rather than hanging the caller indefinitely.
    pub fn assess_with_deadline(
        &self,
        context: &DeploymentContext,
        budget: Duration,
    ) -> Result<AssessmentResult> {
        let start = Instant::now();
        let result = self.assess(context);
        let elapsed = start.elapsed();
        if elapsed > budget {
            return Err(DrnError::Timeout {
                elapsed_ms: elapsed.as_millis() as u64,
                budget_ms: budget.as_millis() as u64,
            });
        }
        result
    }

    /// `record` operation: synthesizes a minimal context
    /// when the caller supplies only a `deployment_id`.
    pub fn record_outcome(
        &self,
        deployment_id: &str,
        actual_error_rate_percent: f64,
        actual_latency_change_percent: f64,
        rollback_triggered: bool,
    ) -> std::result::Result<RecordOutcomeResponse, RecordError> {
        let context = DeploymentContext::synthetic(deployment_id);
        self.logger.send(ActivityEvent::SyntheticContextUsed {
            deployment_id: deployment_id.to_string(),
        });
        let outcome = outcome::record(
            self.store.as_ref(),
            self.predictor.as_ref(),
            &context,
            actual_error_rate_percent,
            actual_latency_change_percent,
            rollback_triggered,
        )?;
        self.logger.send(ActivityEvent::OutcomeRecorded {
            deployment_id: outcome.deployment_id.clone(),
            final_score: outcome.final_score,
        });

        Ok(RecordOutcomeResponse {
            status: "success",
            deployment_id: outcome.deployment_id,
            final_score: outcome.final_score,
            timestamp: outcome.timestamp,
        })
    }

    /// Record an outcome against a full, caller-supplied context (used
    /// when the caller has one on hand rather than just an id).
    pub fn record_outcome_with_context(
        &self,
        context: &DeploymentContext,
        actual_error_rate_percent: f64,
        actual_latency_change_percent: f64,
        rollback_triggered: bool,
    ) -> std::result::Result<DeploymentOutcome, RecordError> {
        let outcome = outcome::record(
            self.store.as_ref(),
            self.predictor.as_ref(),
            context,
            actual_error_rate_percent,
            actual_latency_change_percent,
            rollback_triggered,
        )?;
        self.logger.send(ActivityEvent::OutcomeRecorded {
            deployment_id: outcome.deployment_id.clone(),
            final_score: outcome.final_score,
        });
        Ok(outcome)
    }

    /// `List Recent Outcomes`: `limit` defaults to 20,
    /// capped at 500.
    pub fn recent_outcomes(&self, limit: Option<u32>) -> Result<(u64, Vec<DeploymentOutcome>)> {
        let limit = limit.unwrap_or(DEFAULT_RECENT_LIMIT).min(MAX_RECENT_LIMIT);
        let outcomes = self.store.recent(limit)?;
        let total = self.store.count()?;
        Ok((total, outcomes))
    }

    /// Run one tuning pass synchronously (used by the `drn tune` CLI
    /// subcommand, independent of the background scheduler).
    pub fn tune_now(&self) -> Result<Option<tuner::TuneResult>> {
        let start = Instant::now();
        let result = self.tuner.tune(self.store.as_ref(), self.predictor.as_ref())?;
        let duration_ms = start.elapsed().as_millis() as u64;
        match &result {
            Some(r) => self.logger.send(ActivityEvent::TuneCompleted {
                heuristic_weight: r.new_heuristic_weight,
                ml_weight: r.new_ml_weight,
                samples_used: r.samples_used,
                duration_ms,
            }),
            None => self.logger.send(ActivityEvent::TuneSkipped {
                details: "a tune was already in flight".to_string(),
            }),
        }
        Ok(result)
    }

    #[must_use]
    pub fn current_weights(&self) -> EnsembleWeights {
        *self.predictor.current_weights()
    }

    /// Cleanly stop the background scheduler, if one is running, and drain
    /// the event logger.
    pub fn shutdown(&mut self) {
        if let Some(handle) = self.scheduler.take() {
            handle.shutdown();
        }
        self.logger.shutdown();
        if let Some(join) = self.logger_join.take() {
            let _ = join.join();
        }
    }

    fn calibration_history(&self) -> Result<Vec<crate::risk::CalibrationSample>> {
        let outcomes = self.store.recent(100)?;
        Ok(tuner::calibration_samples(&outcomes))
    }
}

impl Drop for Engine {
    fn drop(&mut self) {
        self.shutdown();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::InMemoryOutcomeStore;

    fn test_config() -> Config {
        let mut cfg = Config::default();
        cfg.scheduler.enabled = false;
        cfg.paths.event_log = tempfile::tempdir().unwrap().path().join("events.jsonl");
        cfg
    }

    fn engine_with_memory_store() -> Engine {
        let store: Arc<dyn OutcomeStore> = Arc::new(InMemoryOutcomeStore::new());
        Engine::with_store(&test_config(), store).unwrap()
    }

    #[test]
    fn assess_rejects_invalid_context() {
        let engine = engine_with_memory_store();
        let mut ctx = DeploymentContext::synthetic("d1");
        ctx.current_error_rate_percent = -5.0;
        let result = engine.assess(&ctx);
        assert!(matches!(result, Err(DrnError::Validation { .. })));
    }

    #[test]
    fn assess_returns_assessment_and_policy_for_valid_context() {
        let engine = engine_with_memory_store();
        let ctx = DeploymentContext::synthetic("d1");
        let result = engine.assess(&ctx).unwrap();
        assert!(result.canary_policy.satisfies_invariants());
    }

    #[test]
    fn record_outcome_synthesizes_context_from_id() {
        let engine = engine_with_memory_store();
        let response = engine.record_outcome("d1", 0.1, 2.0, false).unwrap();
        assert_eq!(response.deployment_id, "d1");
        assert_eq!(response.status, "success");
    }

    #[test]
    fn recent_outcomes_defaults_to_twenty_and_caps_at_five_hundred() {
        let engine = engine_with_memory_store();
        for i in 0..3 {
            engine
                .record_outcome(&format!("d{i}"), 0.0, 0.0, false)
                .unwrap();
        }
        let (total, outcomes) = engine.recent_outcomes(None).unwrap();
        assert_eq!(total, 3);
        assert_eq!(outcomes.len(), 3);

        let (_, capped) = engine.recent_outcomes(Some(10_000)).unwrap();
        assert!(capped.len() <= MAX_RECENT_LIMIT as usize);
    }

    #[test]
    fn record_outcome_then_recent_outcomes_observes_it_immediately() {
        let engine = engine_with_memory_store();
        engine.record_outcome("d1", 0.0, 0.0, false).unwrap();
        let (total, outcomes) = engine.recent_outcomes(Some(1)).unwrap();
        assert_eq!(total, 1);
        assert_eq!(outcomes[0].deployment_id, "d1");
    }

    #[test]
    fn tune_now_runs_synchronously_without_the_scheduler() {
        let engine = engine_with_memory_store();
        for i in 0..10 {
            engine
                .record_outcome(&format!("d{i}"), 0.0, 0.0, false)
                .unwrap();
        }
        let result = engine.tune_now().unwrap();
        assert!(result.is_some());
    }
}
