//! Weight Tuner (C7): grid-searches ensemble weights against recent
//! outcomes, smooths the result, and trains the ML scorer over the same
//! window.

#![allow(missing_docs)]

use std::sync::atomic::{AtomicBool, Ordering};

use serde::{Deserialize, Serialize};

use crate::risk::ensemble::CalibrationSample;
use crate::risk::{EnsemblePredictor, EnsembleWeights};
use crate::store::{DeploymentOutcome, OutcomeStore};

/// Candidate grid step for `w_h` over `{0.0, 0.1, ..., 1.0}`.
const GRID_STEP: u32 = 10;

/// Outcome of a `tune()` call.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
pub struct TuneResult {
    pub new_heuristic_weight: f64,
    pub new_ml_weight: f64,
    pub samples_used: usize,
}

/// Drives one weight-tuning pass. Owns the in-flight guard that keeps
/// concurrent `tune()` calls from racing each other: at most one tune runs
/// at a time.
#[derive(Debug)]
pub struct WeightTuner {
    max_outcomes_per_tune: usize,
    min_outcomes_required: usize,
    smoothing_factor: f64,
    learning_rate: f64,
    l2_lambda: f64,
    in_flight: AtomicBool,
}

impl WeightTuner {
    #[must_use]
    pub fn new(
        max_outcomes_per_tune: usize,
        min_outcomes_required: usize,
        smoothing_factor: f64,
        learning_rate: f64,
        l2_lambda: f64,
    ) -> Self {
        Self {
            max_outcomes_per_tune,
            min_outcomes_required,
            smoothing_factor,
            learning_rate,
            l2_lambda,
            in_flight: AtomicBool::new(false),
        }
    }

    /// Run one tuning pass. Returns `Ok(None)` (not an error) if another
    /// tune is already in flight — the scheduler treats that as "skip this
    /// tick"'s concurrency contract.
    pub fn tune(
        &self,
        store: &dyn OutcomeStore,
        predictor: &EnsemblePredictor,
    ) -> crate::core::errors::Result<Option<TuneResult>> {
        if self
            .in_flight
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_err()
        {
            return Ok(None);
        }
        let result = self.tune_inner(store, predictor);
        self.in_flight.store(false, Ordering::Release);
        result.map(Some)
    }

    fn tune_inner(
        &self,
        store: &dyn OutcomeStore,
        predictor: &EnsemblePredictor,
    ) -> crate::core::errors::Result<TuneResult> {
        let outcomes = store.recent(self.max_outcomes_per_tune as u32)?;
        let current = predictor.current_weights();

        if outcomes.len() < self.min_outcomes_required {
            return Ok(TuneResult {
                new_heuristic_weight: current.heuristic_weight,
                new_ml_weight: current.ml_weight,
                samples_used: outcomes.len(),
            });
        }

        let chosen = grid_search(&outcomes, *current);
        let smoothed = smooth(chosen, *current, self.smoothing_factor);

        predictor.replace_weights(smoothed);
        self.train_ml(predictor, &outcomes);

        Ok(TuneResult {
            new_heuristic_weight: smoothed.heuristic_weight,
            new_ml_weight: smoothed.ml_weight,
            samples_used: outcomes.len(),
        })
    }

    fn train_ml(&self, predictor: &EnsemblePredictor, outcomes: &[DeploymentOutcome]) {
        // The tuner has no direct line to the contexts that produced these
        // outcomes (only the final scores are retained), so training uses
        // the recorded heuristic/ml scores as a synthetic feature proxy: a
        // single-dimensional feature of the heuristic score standing in for
        // the full extractor. This keeps the model moving toward the
        // observed proxy without requiring context replay.
        let samples: Vec<_> = outcomes
            .iter()
            .map(|outcome| {
                let mut features = [0.0_f64; crate::risk::ml::FEATURE_COUNT];
                features[1] = (outcome.heuristic_score / 100.0).clamp(0.0, 1.0);
                (
                    crate::risk::ml::FeatureVector(features),
                    outcome.actual_risk_proxy(),
                )
            })
            .collect();
        predictor
            .ml_scorer()
            .update(&samples, self.learning_rate, self.l2_lambda);
    }
}

/// Mean squared error of `w_h * heuristic + w_m * ml` vs `proxy * 100` over
/// the sample window, for one candidate weight pair.
fn mse(outcomes: &[DeploymentOutcome], weights: EnsembleWeights) -> f64 {
    let n = outcomes.len() as f64;
    outcomes
        .iter()
        .map(|outcome| {
            let predicted = weights.heuristic_weight * outcome.heuristic_score
                + weights.ml_weight * outcome.ml_score;
            let target = outcome.actual_risk_proxy() * 100.0;
            (predicted - target).powi(2)
        })
        .sum::<f64>()
        / n
}

/// Grid search over `w_h in {0.0, 0.1, ..., 1.0}`, tie-broken by L1
/// distance to the current weights.
fn grid_search(outcomes: &[DeploymentOutcome], current: EnsembleWeights) -> EnsembleWeights {
    let mut best = EnsembleWeights::new(current.heuristic_weight, current.ml_weight);
    let mut best_mse = f64::INFINITY;
    let mut best_l1 = f64::INFINITY;

    for step in 0..=GRID_STEP {
        let heuristic_weight = f64::from(step) / f64::from(GRID_STEP);
        let ml_weight = 1.0 - heuristic_weight;
        let candidate = EnsembleWeights::new(heuristic_weight, ml_weight);
        let candidate_mse = mse(outcomes, candidate);
        let l1_distance = (heuristic_weight - current.heuristic_weight).abs()
            + (ml_weight - current.ml_weight).abs();

        let better = candidate_mse < best_mse - f64::EPSILON
            || ((candidate_mse - best_mse).abs() <= f64::EPSILON && l1_distance < best_l1);

        if better {
            best = candidate;
            best_mse = candidate_mse;
            best_l1 = l1_distance;
        }
    }
    best
}

/// Exponential smoothing: blend the grid-search winner with the current
/// weights, then renormalize to sum to 1.
fn smooth(chosen: EnsembleWeights, current: EnsembleWeights, factor: f64) -> EnsembleWeights {
    let heuristic_weight = factor.mul_add(
        chosen.heuristic_weight,
        (1.0 - factor) * current.heuristic_weight,
    );
    let ml_weight = factor.mul_add(chosen.ml_weight, (1.0 - factor) * current.ml_weight);
    let sum = heuristic_weight + ml_weight;
    if sum <= f64::EPSILON {
        return current;
    }
    EnsembleWeights::new(heuristic_weight / sum, ml_weight / sum)
}

/// Build a `CalibrationSample` window from recent outcomes, used by
/// `EnsemblePredictor::assess`'s historical-calibration term.
#[must_use]
pub fn calibration_samples(outcomes: &[DeploymentOutcome]) -> Vec<CalibrationSample> {
    outcomes
        .iter()
        .map(|outcome| CalibrationSample {
            predicted_risk_score: outcome.final_score,
            actual_risk_score: outcome.actual_risk_proxy() * 100.0,
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn outcome(heuristic_score: f64, ml_score: f64, actual_error_rate_percent: f64) -> DeploymentOutcome {
        DeploymentOutcome {
            deployment_id: "d1".to_string(),
            timestamp: chrono::Utc::now(),
            heuristic_score,
            ml_score,
            final_score: (heuristic_score + ml_score) / 2.0,
            actual_error_rate_percent,
            actual_latency_change_percent: 0.0,
            rollback_triggered: false,
        }
    }

    #[test]
    fn too_few_outcomes_returns_unchanged_weights() {
        let tuner = WeightTuner::new(100, 5, 0.7, 0.05, 1e-3);
        let store = crate::store::InMemoryOutcomeStore::new();
        store.save(&outcome(50.0, 50.0, 0.0)).unwrap();
        let predictor = EnsemblePredictor::new(EnsembleWeights::new(0.6, 0.4));

        let result = tuner.tune(&store, &predictor).unwrap().unwrap();
        assert_eq!(result.new_heuristic_weight, 0.6);
        assert_eq!(result.samples_used, 1);
    }

    #[test]
    fn grid_search_prefers_lower_mse_member() {
        let outcomes: Vec<_> = (0..10)
            .map(|_| outcome(90.0, 10.0, 0.0))
            .collect();
        // actual_risk_proxy is 0 here (no rollback, 0 error, 0 latency), so
        // the heuristic's 90 is farther from truth than the ml score's 10;
        // the grid search should favor w_h near 0.
        let chosen = grid_search(&outcomes, EnsembleWeights::new(0.6, 0.4));
        assert!(chosen.heuristic_weight < 0.5, "{chosen:?}");
    }

    #[test]
    fn smoothing_moves_partway_toward_chosen() {
        let current = EnsembleWeights::new(0.6, 0.4);
        let chosen = EnsembleWeights::new(0.0, 1.0);
        let smoothed = smooth(chosen, current, 0.7);
        assert!((smoothed.heuristic_weight - 0.18).abs() < 1e-9);
    }

    #[test]
    fn tune_updates_predictor_weights_when_enough_samples() {
        let tuner = WeightTuner::new(100, 5, 0.7, 0.05, 1e-3);
        let store = crate::store::InMemoryOutcomeStore::new();
        for _ in 0..10 {
            store.save(&outcome(20.0, 80.0, 0.0)).unwrap();
        }
        let predictor = EnsemblePredictor::new(EnsembleWeights::new(0.6, 0.4));
        let before = *predictor.current_weights();

        tuner.tune(&store, &predictor).unwrap();
        let after = *predictor.current_weights();
        assert_ne!(before, after);
    }

    #[test]
    fn concurrent_tune_skips_when_already_in_flight() {
        let tuner = WeightTuner::new(100, 5, 0.7, 0.05, 1e-3);
        tuner.in_flight.store(true, Ordering::Release);

        let store = crate::store::InMemoryOutcomeStore::new();
        let predictor = EnsemblePredictor::new(EnsembleWeights::new(0.6, 0.4));
        let result = tuner.tune(&store, &predictor).unwrap();
        assert!(result.is_none());
    }
}
