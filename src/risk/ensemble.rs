//! Ensemble predictor (C4): blends the heuristic and ML scores under a
//! live-tunable weight pair, published behind `ArcSwap` the same way the
//! ML scorer publishes its parameters (see `risk::ml`).

#![allow(missing_docs)]

use std::sync::Arc;

use arc_swap::ArcSwap;
use serde::{Deserialize, Serialize};

use crate::risk::assessment::RiskAssessment;
use crate::risk::assessment::RiskLevel;
use crate::risk::context::DeploymentContext;
use crate::risk::heuristic;
use crate::risk::ml::MlScorer;

/// The ensemble's current blend, `heuristic_weight + ml_weight == 1.0`.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
pub struct EnsembleWeights {
    pub heuristic_weight: f64,
    pub ml_weight: f64,
}

impl EnsembleWeights {
    #[must_use]
    pub fn new(heuristic_weight: f64, ml_weight: f64) -> Self {
        Self {
            heuristic_weight,
            ml_weight,
        }
    }
}

/// Rolling calibration input: how far past predictions landed from actual
/// outcomes, used by the confidence formula's historical term.
#[derive(Debug, Clone, Copy, Default)]
pub struct CalibrationSample {
    pub predicted_risk_score: f64,
    pub actual_risk_score: f64,
}

/// Minimum sample count before historical calibration is trusted: below 5
/// samples confidence falls back to a flat 50%; the rolling window holds
/// the most recent 20.
const CALIBRATION_WINDOW: usize = 20;
const CALIBRATION_MIN_SAMPLES: usize = 5;
const CALIBRATION_FALLBACK_PERCENT: f64 = 50.0;

/// Combines the heuristic and ML scorers under a shared, hot-swappable
/// weight pair.
#[derive(Debug)]
pub struct EnsemblePredictor {
    ml: MlScorer,
    weights: ArcSwap<EnsembleWeights>,
}

impl EnsemblePredictor {
    #[must_use]
    pub fn new(initial_weights: EnsembleWeights) -> Self {
        Self {
            ml: MlScorer::default(),
            weights: ArcSwap::from_pointee(initial_weights),
        }
    }

    #[must_use]
    pub fn ml_scorer(&self) -> &MlScorer {
        &self.ml
    }

    #[must_use]
    pub fn current_weights(&self) -> Arc<EnsembleWeights> {
        self.weights.load_full()
    }

    pub fn replace_weights(&self, new_weights: EnsembleWeights) {
        self.weights.store(Arc::new(new_weights));
    }

    /// Produce a `RiskAssessment` for a context, optionally informed by a
    /// rolling window of recent calibration samples.
    #[must_use]
    pub fn assess(
        &self,
        context: &DeploymentContext,
        calibration_history: &[CalibrationSample],
    ) -> RiskAssessment {
        let heuristic_output = heuristic::score(context);
        let ml_score = self.ml.score(context);
        let weights = self.weights.load();

        let risk_score = (weights.heuristic_weight * heuristic_output.score
            + weights.ml_weight * ml_score)
            .clamp(0.0, 100.0);

        let agreement = agreement_percent(heuristic_output.score, ml_score);
        let historical_calibration = historical_calibration_percent(calibration_history);
        let confidence_percent = (0.6 * agreement
            + 0.2 * heuristic_output.confidence_percent
            + 0.2 * historical_calibration)
            .clamp(0.0, 100.0);

        RiskAssessment {
            risk_score,
            risk_level: RiskLevel::from_score(risk_score),
            confidence_percent,
            identified_factors: heuristic_output.matched_tags,
            predicted_error_rate_increase_percent: heuristic_output
                .predicted_error_rate_increase_percent,
            predicted_p95_latency_increase_percent: heuristic_output
                .predicted_p95_latency_increase_percent,
            heuristic_score: heuristic_output.score,
            ml_score,
        }
    }
}

/// How closely the two scorers agree, expressed as a 0-100 percentage
/// (100 = identical scores, 0 = maximally apart on the 0-100 scale).
fn agreement_percent(heuristic_score: f64, ml_score: f64) -> f64 {
    (100.0 - (heuristic_score - ml_score).abs()).clamp(0.0, 100.0)
}

/// Historical calibration term: how close past predictions were to actual
/// outcomes over the most recent `CALIBRATION_WINDOW` samples. Falls back
/// to a neutral 50% when there isn't enough history to trust (cold start).
fn historical_calibration_percent(history: &[CalibrationSample]) -> f64 {
    let window: Vec<&CalibrationSample> = history
        .iter()
        .rev()
        .take(CALIBRATION_WINDOW)
        .collect();
    if window.len() < CALIBRATION_MIN_SAMPLES {
        return CALIBRATION_FALLBACK_PERCENT;
    }
    let mean_abs_error: f64 = window
        .iter()
        .map(|s| (s.predicted_risk_score - s.actual_risk_score).abs())
        .sum::<f64>()
        / window.len() as f64;
    (100.0 - mean_abs_error).clamp(0.0, 100.0)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::risk::context::{ChangeDescriptor, ChangeType, RiskTag};

    fn sample_context() -> DeploymentContext {
        let mut ctx = DeploymentContext::synthetic("d1");
        ctx.changes.push(ChangeDescriptor {
            file_path: "migrations/001.sql".to_string(),
            change_type: ChangeType::Add,
            lines_changed: 80,
            risk_tags: [RiskTag::DatabaseSchema].into_iter().collect(),
            description: "adds a schema migration".to_string(),
        });
        ctx
    }

    #[test]
    fn assess_blends_heuristic_and_ml_by_weight() {
        let predictor = EnsemblePredictor::new(EnsembleWeights::new(1.0, 0.0));
        let ctx = sample_context();
        let assessment = predictor.assess(&ctx, &[]);
        assert_eq!(assessment.risk_score, assessment.heuristic_score);
    }

    #[test]
    fn cold_start_confidence_falls_back_to_fifty_percent_term() {
        let predictor = EnsemblePredictor::new(EnsembleWeights::new(0.6, 0.4));
        let ctx = sample_context();
        let assessment = predictor.assess(&ctx, &[]);
        assert!(assessment.confidence_percent >= 0.0 && assessment.confidence_percent <= 100.0);
    }

    #[test]
    fn risk_level_is_derived_from_score() {
        let predictor = EnsemblePredictor::new(EnsembleWeights::new(1.0, 0.0));
        let ctx = sample_context();
        let assessment = predictor.assess(&ctx, &[]);
        assert_eq!(assessment.risk_level, RiskLevel::from_score(assessment.risk_score));
    }

    #[test]
    fn historical_calibration_needs_minimum_samples() {
        let few = vec![CalibrationSample {
            predicted_risk_score: 50.0,
            actual_risk_score: 50.0,
        }; 2];
        assert_eq!(historical_calibration_percent(&few), CALIBRATION_FALLBACK_PERCENT);
    }

    #[test]
    fn historical_calibration_reflects_recent_accuracy() {
        let samples = vec![
            CalibrationSample {
                predicted_risk_score: 50.0,
                actual_risk_score: 50.0,
            };
            10
        ];
        assert_eq!(historical_calibration_percent(&samples), 100.0);
    }

    #[test]
    fn agreement_is_one_hundred_when_scores_match() {
        assert_eq!(agreement_percent(42.0, 42.0), 100.0);
    }

    #[test]
    fn weights_can_be_hot_swapped() {
        let predictor = EnsemblePredictor::new(EnsembleWeights::new(0.6, 0.4));
        predictor.replace_weights(EnsembleWeights::new(0.2, 0.8));
        assert_eq!(predictor.current_weights().ml_weight, 0.8);
    }
}
