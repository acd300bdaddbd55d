//! Output types shared by the ensemble predictor (C4) and canary generator (C5).

use std::collections::BTreeSet;

use serde::{Deserialize, Serialize};

use crate::risk::context::RiskTag;

/// Risk band derived from the numeric risk score.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RiskLevel {
    Low,
    Moderate,
    High,
    Critical,
}

impl RiskLevel {
    /// Classify a 0-100 risk score into its band using the engine's fixed
    /// thresholds.
    #[must_use]
    pub fn from_score(score: f64) -> Self {
        if score >= 70.0 {
            Self::Critical
        } else if score >= 50.0 {
            Self::High
        } else if score >= 30.0 {
            Self::Moderate
        } else {
            Self::Low
        }
    }
}

impl std::fmt::Display for RiskLevel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Low => write!(f, "low"),
            Self::Moderate => write!(f, "moderate"),
            Self::High => write!(f, "high"),
            Self::Critical => write!(f, "critical"),
        }
    }
}

/// Confidence band used by the canary stage-template matrix.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConfidenceBand {
    High,
    Medium,
    Low,
}

impl ConfidenceBand {
    #[must_use]
    pub fn from_percent(confidence_percent: f64) -> Self {
        if confidence_percent >= 80.0 {
            Self::High
        } else if confidence_percent >= 60.0 {
            Self::Medium
        } else {
            Self::Low
        }
    }
}

/// Output of the ensemble predictor: a scored, banded risk assessment.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct RiskAssessment {
    pub risk_score: f64,
    pub risk_level: RiskLevel,
    pub confidence_percent: f64,
    pub identified_factors: BTreeSet<RiskTag>,
    pub predicted_error_rate_increase_percent: f64,
    pub predicted_p95_latency_increase_percent: f64,
    pub heuristic_score: f64,
    pub ml_score: f64,
}

impl RiskAssessment {
    #[must_use]
    pub fn confidence_band(&self) -> ConfidenceBand {
        ConfidenceBand::from_percent(self.confidence_percent)
    }
}
