//! Online ML scorer (C3): a logistic model over hand-extracted features,
//! updated in place by a single SGD pass per tuning cycle.
//!
//! The live weight vector is published behind `ArcSwap` so that `score()`
//! never blocks on a writer mid-update (the pattern is grounded on
//! `cooprefr-bettersys`'s `BookStore`, which uses `ArcSwap` for
//! zero-allocation, lock-free reads of a frequently-replaced snapshot while
//! a single writer republishes it).

#![allow(missing_docs)]

use std::sync::Arc;

use arc_swap::ArcSwap;
use serde::{Deserialize, Serialize};

use crate::risk::context::{ChangeType, DeploymentContext, RiskTag};

/// Number of features extracted per context under the fixed layout: 5
/// scalars, 8 per-tag indicators, dependency count, and 3 indicators singled
/// out again for `database_schema`/`api_contract`/`caching` (redundant with
/// the per-tag block, kept verbatim rather than deduplicated since the
/// trained weights already depend on this exact index layout).
pub const FEATURE_COUNT: usize = 17;

const IDX_NUM_CHANGES: usize = 0;
const IDX_TOTAL_LINES: usize = 1;
const IDX_ERROR_RATE: usize = 2;
const IDX_P95_LATENCY: usize = 3;
const IDX_QPS: usize = 4;
const IDX_TAGS_START: usize = 5; // 8 slots, RiskTag::all() order
const IDX_DEPENDENCY_COUNT: usize = 13;
const IDX_HAS_DB_SCHEMA: usize = 14;
const IDX_HAS_API_CONTRACT: usize = 15;
const IDX_HAS_CACHING: usize = 16;

/// A fixed-order feature vector extracted from a `DeploymentContext`.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FeatureVector(pub [f64; FEATURE_COUNT]);

/// Extract features in the fixed layout above, each normalized into roughly
/// `[0, 1]` before scoring.
#[must_use]
pub fn extract_features(context: &DeploymentContext) -> FeatureVector {
    let mut present = std::collections::BTreeSet::new();
    for change in &context.changes {
        present.extend(change.risk_tags.iter().copied());
    }

    let mut values = [0.0_f64; FEATURE_COUNT];

    values[IDX_NUM_CHANGES] = (context.changes.len() as f64 / 50.0).min(1.0);
    values[IDX_TOTAL_LINES] = (context.total_lines_changed() as f64 / 5000.0).min(1.0);
    values[IDX_ERROR_RATE] = (context.current_error_rate_percent / 10.0).min(1.0);
    values[IDX_P95_LATENCY] = (context.current_p95_latency_ms / 2000.0).min(1.0);
    values[IDX_QPS] = (context.current_qps / 10_000.0).min(1.0);

    for (i, tag) in RiskTag::all().into_iter().enumerate() {
        values[IDX_TAGS_START + i] = f64::from(u8::from(present.contains(&tag)));
    }

    values[IDX_DEPENDENCY_COUNT] = (context.dependencies.len() as f64 / 10.0).min(1.0);
    values[IDX_HAS_DB_SCHEMA] = f64::from(u8::from(present.contains(&RiskTag::DatabaseSchema)));
    values[IDX_HAS_API_CONTRACT] = f64::from(u8::from(present.contains(&RiskTag::ApiContract)));
    values[IDX_HAS_CACHING] = f64::from(u8::from(present.contains(&RiskTag::Caching)));

    FeatureVector(values)
}

/// Live model parameters, swapped atomically by the tuner/trainer.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct MlParams {
    pub weights: [f64; FEATURE_COUNT],
    pub bias: f64,
}

impl MlParams {
    /// Cold-start weights chosen so `score()` reproduces the heuristic
    /// scorer's output within roughly ±15 points on a typical input —
    /// before any outcome has been recorded the two ensemble members
    /// should not wildly disagree.
    #[must_use]
    pub fn cold_start() -> Self {
        let mut weights = [0.04; FEATURE_COUNT];
        // Tag indicators carry most of the signal, mirroring the heuristic
        // scorer's +15-per-matched-pattern term relative to its 0-100 range.
        for w in &mut weights[IDX_TAGS_START..IDX_TAGS_START + 8] {
            *w = 0.15;
        }
        weights[IDX_TOTAL_LINES] = 0.25;
        weights[IDX_NUM_CHANGES] = 0.10;
        Self {
            weights,
            bias: -0.05,
        }
    }
}

impl Default for MlParams {
    fn default() -> Self {
        Self::cold_start()
    }
}

/// Online logistic scorer. Reads (`score`) never block on writes (`update`);
/// at most one writer runs at a time, serialized by the tuner's own
/// in-flight guard (`crate::tuner`).
#[derive(Debug)]
pub struct MlScorer {
    params: ArcSwap<MlParams>,
}

impl Default for MlScorer {
    fn default() -> Self {
        Self::new(MlParams::cold_start())
    }
}

impl MlScorer {
    #[must_use]
    pub fn new(initial: MlParams) -> Self {
        Self {
            params: ArcSwap::from_pointee(initial),
        }
    }

    #[must_use]
    pub fn current_params(&self) -> Arc<MlParams> {
        self.params.load_full()
    }

    pub fn replace_params(&self, new_params: MlParams) {
        self.params.store(Arc::new(new_params));
    }

    /// Score a context on the 0-100 scale. The logistic squash happens once
    /// here, at the output boundary, so intermediate values used for
    /// training stay in probability space.
    #[must_use]
    pub fn score(&self, context: &DeploymentContext) -> f64 {
        let features = extract_features(context);
        let params = self.params.load();
        logistic(dot(&params.weights, &features.0) + params.bias) * 100.0
    }

    /// One SGD pass (learning rate `eta`, L2 penalty `l2_lambda`) over a
    /// batch of (features, actual_risk_in_[0,1]) samples, capped by the
    /// caller to `max_outcomes_per_update`.
    pub fn update(&self, samples: &[(FeatureVector, f64)], eta: f64, l2_lambda: f64) {
        if samples.is_empty() {
            return;
        }
        let mut params = (*self.params.load_full()).clone();
        for (features, target) in samples {
            let prediction = logistic(dot(&params.weights, &features.0) + params.bias);
            let error = prediction - target.clamp(0.0, 1.0);
            for (w, x) in params.weights.iter_mut().zip(features.0.iter()) {
                *w -= eta * (error * x + l2_lambda * *w);
            }
            params.bias -= eta * error;
        }
        self.replace_params(params);
    }
}

fn dot(weights: &[f64; FEATURE_COUNT], features: &[f64; FEATURE_COUNT]) -> f64 {
    weights.iter().zip(features.iter()).map(|(w, x)| w * x).sum()
}

fn logistic(z: f64) -> f64 {
    1.0 / (1.0 + (-z).exp())
}
