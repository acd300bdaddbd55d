//! Outcome Recorder (C6): validates caller-reported metrics, re-scores the
//! context at recording time, and persists a `DeploymentOutcome`.

#![allow(missing_docs)]

use std::sync::Arc;

use thiserror::Error;

use crate::risk::{DeploymentContext, EnsemblePredictor};
use crate::store::{DeploymentOutcome, OutcomeStore};

/// Failure cause for `record`, distinguishing validation from storage
/// faults
#[derive(Debug, Error)]
pub enum RecordError {
    #[error("invalid outcome input: {details}")]
    Validation { details: String },

    #[error("failed to persist outcome: {0}")]
    Storage(#[from] crate::core::errors::DrnError),
}

impl RecordError {
    /// Coarse status class, delegating to the wrapped `DrnError` for the
    /// storage case so callers get one consistent mapping regardless of
    /// which layer rejected the outcome.
    #[must_use]
    pub fn status_class(&self) -> crate::core::errors::StatusClass {
        match self {
            Self::Validation { .. } => crate::core::errors::StatusClass::BadRequest,
            Self::Storage(source) => source.status_class(),
        }
    }
}

/// Record an outcome: validate, re-score, persist, return.
///
/// 1. Re-run the ensemble predictor on `context` to capture the score *at
///    recording time* (the original prediction is not retained across the
///    process, so the record is self-consistent with whatever weights the
///    caller used then).
/// 2. Build the `DeploymentOutcome`.
/// 3. Validate the reported metrics.
/// 4. Persist via the store.
pub fn record(
    store: &dyn OutcomeStore,
    predictor: &EnsemblePredictor,
    context: &DeploymentContext,
    actual_error_rate_percent: f64,
    actual_latency_change_percent: f64,
    rollback_triggered: bool,
) -> Result<DeploymentOutcome, RecordError> {
    validate_metrics(actual_error_rate_percent, actual_latency_change_percent)?;

    let assessment = predictor.assess(context, &[]);
    let outcome = DeploymentOutcome {
        deployment_id: context.deployment_id.clone(),
        timestamp: chrono::Utc::now(),
        heuristic_score: assessment.heuristic_score,
        ml_score: assessment.ml_score,
        final_score: assessment.risk_score,
        actual_error_rate_percent,
        actual_latency_change_percent,
        rollback_triggered,
    };

    store.save(&outcome)?;
    Ok(outcome)
}

/// `Arc`-taking convenience wrapper for callers that hold shared ownership
/// of the store and predictor (the common case: `engine::Engine`).
pub fn record_shared(
    store: &Arc<dyn OutcomeStore>,
    predictor: &Arc<EnsemblePredictor>,
    context: &DeploymentContext,
    actual_error_rate_percent: f64,
    actual_latency_change_percent: f64,
    rollback_triggered: bool,
) -> Result<DeploymentOutcome, RecordError> {
    record(
        store.as_ref(),
        predictor.as_ref(),
        context,
        actual_error_rate_percent,
        actual_latency_change_percent,
        rollback_triggered,
    )
}

fn validate_metrics(
    actual_error_rate_percent: f64,
    actual_latency_change_percent: f64,
) -> Result<(), RecordError> {
    if actual_error_rate_percent.is_nan() || actual_latency_change_percent.is_nan() {
        return Err(RecordError::Validation {
            details: "actual metrics must not be NaN".to_string(),
        });
    }
    if actual_error_rate_percent < 0.0 {
        return Err(RecordError::Validation {
            details: format!(
                "actual_error_rate_percent must be >= 0, got {actual_error_rate_percent}"
            ),
        });
    }
    Ok(())
}
