//! Canary Policy Generator (C5): a pure function of (`RiskAssessment`,
//! `DeploymentContext`) that selects a staged rollout template and
//! guardrail thresholds from the risk-band × confidence-band matrix.

#![allow(missing_docs)]

use serde::{Deserialize, Serialize};

use crate::risk::{ConfidenceBand, DeploymentContext, RiskAssessment, RiskLevel, RiskTag};

/// One segment of a staged rollout.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Stage {
    pub index: u32,
    pub name: &'static str,
    pub traffic_percent: f64,
    pub duration_seconds: u64,
}

/// Output of the canary policy generator.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct CanaryPolicy {
    pub stages: Vec<Stage>,
    pub error_rate_threshold_percent: f64,
    pub latency_threshold_ms: f64,
    pub rollback_on_violation: bool,
}

impl CanaryPolicy {
    /// Check the structural invariants: non-empty, final stage at 100%,
    /// strictly increasing traffic.
    #[must_use]
    pub fn satisfies_invariants(&self) -> bool {
        let Some(last) = self.stages.last() else {
            return false;
        };
        if (last.traffic_percent - 100.0).abs() > f64::EPSILON {
            return false;
        }
        self.stages
            .windows(2)
            .all(|pair| pair[0].traffic_percent < pair[1].traffic_percent)
    }
}

#[derive(Debug, Clone, Copy)]
struct BaseStage {
    name: &'static str,
    traffic_percent: f64,
    duration_seconds: u64,
}

const THREE_STAGE: [BaseStage; 3] = [
    BaseStage {
        name: "smoke",
        traffic_percent: 10.0,
        duration_seconds: 180,
    },
    BaseStage {
        name: "majority",
        traffic_percent: 50.0,
        duration_seconds: 300,
    },
    BaseStage {
        name: "full",
        traffic_percent: 100.0,
        duration_seconds: 300,
    },
];

const FOUR_STAGE: [BaseStage; 4] = [
    BaseStage {
        name: "smoke",
        traffic_percent: 5.0,
        duration_seconds: 300,
    },
    BaseStage {
        name: "light",
        traffic_percent: 25.0,
        duration_seconds: 420,
    },
    BaseStage {
        name: "majority",
        traffic_percent: 50.0,
        duration_seconds: 420,
    },
    BaseStage {
        name: "full",
        traffic_percent: 100.0,
        duration_seconds: 300,
    },
];

const FIVE_STAGE: [BaseStage; 5] = [
    BaseStage {
        name: "smoke",
        traffic_percent: 5.0,
        duration_seconds: 300,
    },
    BaseStage {
        name: "light",
        traffic_percent: 10.0,
        duration_seconds: 420,
    },
    BaseStage {
        name: "half",
        traffic_percent: 25.0,
        duration_seconds: 600,
    },
    BaseStage {
        name: "majority",
        traffic_percent: 50.0,
        duration_seconds: 600,
    },
    BaseStage {
        name: "full",
        traffic_percent: 100.0,
        duration_seconds: 300,
    },
];

#[derive(Debug, Clone, Copy)]
struct Template {
    base: &'static [BaseStage],
    duration_multiplier: f64,
}

/// The (risk band, confidence band) matrix that picks a rollout template.
fn select_template(risk_level: RiskLevel, confidence_band: ConfidenceBand) -> Template {
    use ConfidenceBand::{High, Low, Medium};
    use RiskLevel::{Critical, High as HighRisk, Low as LowRisk, Moderate};

    let (base, duration_multiplier): (&'static [BaseStage], f64) =
        match (risk_level, confidence_band) {
            (LowRisk, High) => (&THREE_STAGE, 0.8),
            (LowRisk, Medium) => (&FOUR_STAGE, 1.0),
            (LowRisk, Low) => (&FIVE_STAGE, 1.2),
            (Moderate, High) => (&FOUR_STAGE, 1.0),
            (Moderate, Medium) => (&FOUR_STAGE, 1.2),
            (Moderate, Low) => (&FIVE_STAGE, 1.5),
            (HighRisk, High) => (&FOUR_STAGE, 1.2),
            (HighRisk, Medium) => (&FIVE_STAGE, 1.5),
            (HighRisk, Low) => (&FIVE_STAGE, 1.8),
            (Critical, High) => (&FIVE_STAGE, 1.5),
            (Critical, Medium) => (&FIVE_STAGE, 1.8),
            (Critical, Low) => (&FIVE_STAGE, 2.0),
        };
    Template {
        base,
        duration_multiplier,
    }
}

/// Guardrail thresholds by risk band, before the
/// caching-specific latency cap.
fn base_guardrails(risk_level: RiskLevel) -> (f64, f64) {
    match risk_level {
        RiskLevel::Critical => (0.2, 200.0),
        RiskLevel::High => (0.3, 250.0),
        RiskLevel::Moderate | RiskLevel::Low => (0.5, 500.0),
    }
}

/// Generate the canary policy for an assessment.
#[must_use]
pub fn generate(assessment: &RiskAssessment, context: &DeploymentContext) -> CanaryPolicy {
    let template = select_template(assessment.risk_level, assessment.confidence_band());

    let stages = template
        .base
        .iter()
        .enumerate()
        .map(|(i, stage)| Stage {
            index: i as u32,
            name: stage.name,
            traffic_percent: stage.traffic_percent,
            duration_seconds: scale_duration(stage.duration_seconds, template.duration_multiplier),
        })
        .collect();

    let (error_rate_threshold_percent, mut latency_threshold_ms) =
        base_guardrails(assessment.risk_level);

    if assessment.identified_factors.contains(&RiskTag::Caching) {
        latency_threshold_ms = latency_threshold_ms.min(200.0);
    }

    let rollback_on_violation = context.rollback_capability
        && matches!(assessment.risk_level, RiskLevel::High | RiskLevel::Critical);

    CanaryPolicy {
        stages,
        error_rate_threshold_percent,
        latency_threshold_ms,
        rollback_on_violation,
    }
}

fn scale_duration(base_seconds: u64, multiplier: f64) -> u64 {
    ((base_seconds as f64) * multiplier).round() as u64
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::BTreeSet;

    fn assessment_with(risk_level: RiskLevel, confidence_percent: f64) -> RiskAssessment {
        RiskAssessment {
            risk_score: 0.0,
            risk_level,
            confidence_percent,
            identified_factors: BTreeSet::new(),
            predicted_error_rate_increase_percent: 0.0,
            predicted_p95_latency_increase_percent: 0.0,
            heuristic_score: 0.0,
            ml_score: 0.0,
        }
    }

    #[test]
    fn low_risk_high_confidence_uses_three_stage_template() {
        let assessment = assessment_with(RiskLevel::Low, 90.0);
        let ctx = DeploymentContext::synthetic("d1");
        let policy = generate(&assessment, &ctx);
        assert_eq!(policy.stages.len(), 3);
        assert_eq!(policy.stages[0].duration_seconds, 144); // 180 * 0.8
    }

    #[test]
    fn critical_risk_low_confidence_uses_five_stage_with_max_multiplier() {
        let assessment = assessment_with(RiskLevel::Critical, 10.0);
        let ctx = DeploymentContext::synthetic("d1");
        let policy = generate(&assessment, &ctx);
        assert_eq!(policy.stages.len(), 5);
        assert_eq!(policy.stages[0].duration_seconds, 600); // 300 * 2.0
    }

    #[test]
    fn all_policies_satisfy_structural_invariants() {
        for risk_level in [
            RiskLevel::Low,
            RiskLevel::Moderate,
            RiskLevel::High,
            RiskLevel::Critical,
        ] {
            for confidence in [10.0, 65.0, 95.0] {
                let assessment = assessment_with(risk_level, confidence);
                let ctx = DeploymentContext::synthetic("d1");
                let policy = generate(&assessment, &ctx);
                assert!(
                    policy.satisfies_invariants(),
                    "invariant violated for {risk_level:?}/{confidence}"
                );
            }
        }
    }

    #[test]
    fn caching_factor_caps_latency_threshold_at_200ms() {
        let mut assessment = assessment_with(RiskLevel::Low, 90.0);
        assessment.identified_factors.insert(RiskTag::Caching);
        let ctx = DeploymentContext::synthetic("d1");
        let policy = generate(&assessment, &ctx);
        assert!(policy.latency_threshold_ms <= 200.0);
    }

    #[test]
    fn rollback_on_violation_requires_capability_and_high_risk() {
        let mut ctx = DeploymentContext::synthetic("d1");
        ctx.rollback_capability = true;
        let high = assessment_with(RiskLevel::High, 50.0);
        assert!(generate(&high, &ctx).rollback_on_violation);

        let low = assessment_with(RiskLevel::Low, 50.0);
        assert!(!generate(&low, &ctx).rollback_on_violation);

        ctx.rollback_capability = false;
        assert!(!generate(&high, &ctx).rollback_on_violation);
    }

    #[test]
    fn guardrails_tighten_as_risk_band_rises() {
        let ctx = DeploymentContext::synthetic("d1");
        let low = generate(&assessment_with(RiskLevel::Low, 90.0), &ctx);
        let critical = generate(&assessment_with(RiskLevel::Critical, 90.0), &ctx);
        assert!(critical.error_rate_threshold_percent < low.error_rate_threshold_percent);
        assert!(critical.latency_threshold_ms < low.latency_threshold_ms);
    }
}
