//! Request-side data model: `DeploymentContext`, `ChangeDescriptor`, and the
//! risk-tag vocabulary shared by the heuristic and ML scorers.

use std::collections::BTreeSet;

use serde::{Deserialize, Serialize};

/// A single known risk-tag family. Unknown tags found on the wire are
/// tolerated and ignored, never rejected.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RiskTag {
    Caching,
    DatabaseSchema,
    ApiContract,
    Traffic,
    Permissions,
    Encryption,
    LoadBalancing,
    Storage,
}

impl RiskTag {
    /// All known tags, in a stable order (used by the ML feature extractor's
    /// fixed-order indicator block).
    #[must_use]
    pub const fn all() -> [Self; 8] {
        [
            Self::Caching,
            Self::DatabaseSchema,
            Self::ApiContract,
            Self::Traffic,
            Self::Permissions,
            Self::Encryption,
            Self::LoadBalancing,
            Self::Storage,
        ]
    }

    /// Wire-format label, also used as the keyword-matcher tag name.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Caching => "caching",
            Self::DatabaseSchema => "database_schema",
            Self::ApiContract => "api_contract",
            Self::Traffic => "traffic",
            Self::Permissions => "permissions",
            Self::Encryption => "encryption",
            Self::LoadBalancing => "load_balancing",
            Self::Storage => "storage",
        }
    }
}

/// How a file changed in this deployment.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ChangeType {
    Add,
    Modify,
    Delete,
}

/// One changed file within a proposed deployment.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ChangeDescriptor {
    pub file_path: String,
    pub change_type: ChangeType,
    pub lines_changed: u64,
    #[serde(default)]
    pub risk_tags: BTreeSet<RiskTag>,
    #[serde(default)]
    pub description: String,
}

/// Immutable input to one assessment call.
///
/// `dependencies` and `risk_tags` are `BTreeSet` rather than `HashSet` so
/// that serialization (and therefore the "heuristic scorer is pure"
/// property exercised in tests) is not at the mercy of hash-iteration order.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct DeploymentContext {
    pub deployment_id: String,
    #[serde(default = "default_unknown")]
    pub service_name: String,
    #[serde(default = "default_unknown")]
    pub environment: String,
    #[serde(default)]
    pub version: String,
    #[serde(default)]
    pub changes: Vec<ChangeDescriptor>,
    pub current_error_rate_percent: f64,
    pub current_p95_latency_ms: f64,
    #[serde(default)]
    pub target_error_rate_percent: f64,
    #[serde(default)]
    pub target_p95_latency_ms: f64,
    #[serde(default)]
    pub current_qps: f64,
    #[serde(default)]
    pub rollback_capability: bool,
    #[serde(default)]
    pub dependencies: BTreeSet<String>,
}

fn default_unknown() -> String {
    "unknown".to_string()
}

impl DeploymentContext {
    /// Build the minimal context synthesized server-side when a `record`
    /// caller supplies only a `deployment_id`.
    #[must_use]
    pub fn synthetic(deployment_id: impl Into<String>) -> Self {
        Self {
            deployment_id: deployment_id.into(),
            service_name: "unknown".to_string(),
            environment: "unknown".to_string(),
            version: String::new(),
            changes: Vec::new(),
            current_error_rate_percent: 0.0,
            current_p95_latency_ms: 0.0,
            target_error_rate_percent: 0.0,
            target_p95_latency_ms: 0.0,
            current_qps: 0.0,
            rollback_capability: false,
            dependencies: BTreeSet::new(),
        }
    }

    /// Total lines touched across all changes.
    #[must_use]
    pub fn total_lines_changed(&self) -> u64 {
        self.changes.iter().map(|c| c.lines_changed).sum()
    }

    /// Validate the numeric invariants that cause a `ValidationError`: no
    /// negative rates/latencies/qps, no NaN.
    pub fn validate(&self) -> Result<(), String> {
        if self.deployment_id.trim().is_empty() {
            return Err("deployment_id must not be empty".to_string());
        }
        let fields: [(&str, f64); 5] = [
            (
                "current_error_rate_percent",
                self.current_error_rate_percent,
            ),
            ("current_p95_latency_ms", self.current_p95_latency_ms),
            (
                "target_error_rate_percent",
                self.target_error_rate_percent,
            ),
            ("target_p95_latency_ms", self.target_p95_latency_ms),
            ("current_qps", self.current_qps),
        ];
        for (name, value) in fields {
            if value.is_nan() {
                return Err(format!("{name} must not be NaN"));
            }
            if value < 0.0 {
                return Err(format!("{name} must be >= 0, got {value}"));
            }
        }
        if self.current_error_rate_percent > 100.0 {
            return Err(format!(
                "current_error_rate_percent must be <= 100, got {}",
                self.current_error_rate_percent
            ));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn synthetic_context_has_empty_changes_and_unknown_tags() {
        let ctx = DeploymentContext::synthetic("d1");
        assert!(ctx.changes.is_empty());
        assert_eq!(ctx.service_name, "unknown");
        assert_eq!(ctx.environment, "unknown");
    }

    #[test]
    fn validate_rejects_negative_error_rate() {
        let mut ctx = DeploymentContext::synthetic("d1");
        ctx.current_error_rate_percent = -1.0;
        assert!(ctx.validate().is_err());
    }

    #[test]
    fn validate_rejects_nan() {
        let mut ctx = DeploymentContext::synthetic("d1");
        ctx.current_p95_latency_ms = f64::NAN;
        assert!(ctx.validate().is_err());
    }

    #[test]
    fn validate_accepts_well_formed_context() {
        let ctx = DeploymentContext::synthetic("d1");
        assert!(ctx.validate().is_ok());
    }

    #[test]
    fn all_risk_tags_have_distinct_labels() {
        let labels: BTreeSet<&str> = RiskTag::all().iter().map(|t| t.as_str()).collect();
        assert_eq!(labels.len(), RiskTag::all().len());
    }
}
