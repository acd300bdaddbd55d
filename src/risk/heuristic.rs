//! Heuristic scorer (C2): a compiled rule table matched against free-text
//! change descriptions and risk tags.
//!
//! A `Vec` of statically-described rules built once and matched by simple
//! substring/tag tests rather than a full regex engine: the match key is a
//! risk tag plus a set of keywords.

#![allow(missing_docs)]

use std::sync::OnceLock;

use crate::risk::context::{DeploymentContext, RiskTag};

/// One compiled rule: a risk-tag family with its keyword list and the
/// predicted-impact contribution it carries when matched.
#[derive(Debug, Clone, Copy)]
struct RiskRule {
    tag: RiskTag,
    keywords: &'static [&'static str],
    error_rate_increase_percent: f64,
    p95_latency_increase_percent: f64,
}

fn rule_table() -> &'static Vec<RiskRule> {
    static TABLE: OnceLock<Vec<RiskRule>> = OnceLock::new();
    TABLE.get_or_init(|| {
        vec![
            RiskRule {
                tag: RiskTag::Caching,
                keywords: &["cache", "ttl", "eviction", "invalidat"],
                error_rate_increase_percent: 0.5,
                p95_latency_increase_percent: 15.0,
            },
            RiskRule {
                tag: RiskTag::DatabaseSchema,
                keywords: &["migration", "schema", "alter table", "index", "column"],
                error_rate_increase_percent: 2.0,
                p95_latency_increase_percent: 10.0,
            },
            RiskRule {
                tag: RiskTag::ApiContract,
                keywords: &["breaking", "endpoint", "request body", "response shape", "api"],
                error_rate_increase_percent: 3.0,
                p95_latency_increase_percent: 5.0,
            },
            RiskRule {
                tag: RiskTag::Traffic,
                keywords: &["rate limit", "throttle", "traffic shaping", "qps"],
                error_rate_increase_percent: 1.5,
                p95_latency_increase_percent: 8.0,
            },
            RiskRule {
                tag: RiskTag::Permissions,
                keywords: &["permission", "acl", "authoriz", "role"],
                error_rate_increase_percent: 1.0,
                p95_latency_increase_percent: 2.0,
            },
            RiskRule {
                tag: RiskTag::Encryption,
                keywords: &["encrypt", "tls", "cipher", "certificate", "key rotation"],
                error_rate_increase_percent: 1.5,
                p95_latency_increase_percent: 6.0,
            },
            RiskRule {
                tag: RiskTag::LoadBalancing,
                keywords: &["load balancer", "upstream", "routing weight", "failover"],
                error_rate_increase_percent: 2.0,
                p95_latency_increase_percent: 12.0,
            },
            RiskRule {
                tag: RiskTag::Storage,
                keywords: &["disk", "volume", "retention", "compaction", "storage engine"],
                error_rate_increase_percent: 1.0,
                p95_latency_increase_percent: 9.0,
            },
        ]
    })
}

impl RiskRule {
    fn matches(&self, tags: &std::collections::BTreeSet<RiskTag>, description_lower: &str) -> bool {
        tags.contains(&self.tag)
            || self
                .keywords
                .iter()
                .any(|keyword| description_lower.contains(keyword))
    }
}

/// Piecewise-linear size contribution to the base score.
fn size_factor(total_lines_changed: u64) -> f64 {
    if total_lines_changed == 0 {
        0.0
    } else if total_lines_changed <= 50 {
        0.0
    } else if total_lines_changed <= 500 {
        10.0
    } else {
        25.0
    }
}

/// Heuristic assessment: a deterministic, side-effect-free function of
/// `DeploymentContext`.
#[derive(Debug, Clone, PartialEq)]
pub struct HeuristicOutput {
    pub score: f64,
    pub confidence_percent: f64,
    pub matched_tags: std::collections::BTreeSet<RiskTag>,
    pub predicted_error_rate_increase_percent: f64,
    pub predicted_p95_latency_increase_percent: f64,
}

/// Score a deployment context using the compiled rule table.
///
/// Pure: calling twice with the same (structurally equal) context produces
/// bit-identical output, which is what makes the scorer unit-testable
/// without a live store or clock.
#[must_use]
pub fn score(context: &DeploymentContext) -> HeuristicOutput {
    let table = rule_table();

    let mut matched_tags = std::collections::BTreeSet::new();
    let mut error_rate_increase = 0.0_f64;
    let mut latency_increase = 0.0_f64;

    for change in &context.changes {
        let description_lower = change.description.to_ascii_lowercase();
        let tags = if change.risk_tags.is_empty() {
            &context_wide_tags(context)
        } else {
            &change.risk_tags
        };
        for rule in table {
            if rule.matches(tags, &description_lower) {
                matched_tags.insert(rule.tag);
                error_rate_increase += rule.error_rate_increase_percent;
                latency_increase += rule.p95_latency_increase_percent;
            }
        }
    }

    let matched_patterns = matched_tags.len() as f64;
    let change_count = context.changes.len() as f64;
    let base = change_count.mul_add(2.0, matched_patterns * 15.0)
        + size_factor(context.total_lines_changed());

    let multi_service_bonus = if context.dependencies.len() >= 2 {
        10.0
    } else {
        0.0
    };

    let score = (base + multi_service_bonus).clamp(0.0, 100.0);
    let confidence_percent = (50.0 + 10.0 * matched_patterns).clamp(0.0, 95.0);

    HeuristicOutput {
        score,
        confidence_percent,
        matched_tags,
        predicted_error_rate_increase_percent: error_rate_increase.clamp(0.0, 100.0),
        predicted_p95_latency_increase_percent: latency_increase.clamp(0.0, 100.0),
    }
}

/// Fallback tag set for a change that carries no explicit `risk_tags`: the
/// context's own dependency-derived hints are not enough to infer a tag, so
/// an empty set is used rather than guessing.
fn context_wide_tags(_context: &DeploymentContext) -> std::collections::BTreeSet<RiskTag> {
    std::collections::BTreeSet::new()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::risk::context::{ChangeDescriptor, ChangeType};

    fn ctx_with_change(description: &str, lines_changed: u64) -> DeploymentContext {
        let mut ctx = DeploymentContext::synthetic("d1");
        ctx.changes.push(ChangeDescriptor {
            file_path: "src/lib.rs".to_string(),
            change_type: ChangeType::Modify,
            lines_changed,
            risk_tags: std::collections::BTreeSet::new(),
            description: description.to_string(),
        });
        ctx
    }

    #[test]
    fn empty_context_scores_zero() {
        let ctx = DeploymentContext::synthetic("empty");
        let out = score(&ctx);
        assert_eq!(out.score, 0.0);
        assert!(out.matched_tags.is_empty());
    }

    #[test]
    fn scoring_is_pure() {
        let ctx = ctx_with_change("adds a new database migration for the users table", 120);
        let a = score(&ctx);
        let b = score(&ctx);
        assert_eq!(a, b);
    }

    #[test]
    fn keyword_match_sets_the_risk_tag() {
        let ctx = ctx_with_change("rotates the TLS certificate and cipher suite", 10);
        let out = score(&ctx);
        assert!(out.matched_tags.contains(&RiskTag::Encryption));
    }

    #[test]
    fn explicit_tag_is_honored_without_keyword_match() {
        let mut ctx = DeploymentContext::synthetic("d2");
        ctx.changes.push(ChangeDescriptor {
            file_path: "a.rs".to_string(),
            change_type: ChangeType::Modify,
            lines_changed: 5,
            risk_tags: [RiskTag::Storage].into_iter().collect(),
            description: String::new(),
        });
        let out = score(&ctx);
        assert!(out.matched_tags.contains(&RiskTag::Storage));
    }

    #[test]
    fn multi_service_dependency_adds_bonus() {
        let mut ctx = ctx_with_change("a small tweak", 5);
        ctx.dependencies = ["svc-a".to_string(), "svc-b".to_string()].into_iter().collect();
        let with_bonus = score(&ctx);

        let mut ctx_single = ctx_with_change("a small tweak", 5);
        ctx_single.dependencies = ["svc-a".to_string()].into_iter().collect();
        let without_bonus = score(&ctx_single);

        assert!(with_bonus.score > without_bonus.score);
    }

    #[test]
    fn score_never_exceeds_one_hundred() {
        let mut ctx = DeploymentContext::synthetic("big");
        for i in 0..50 {
            ctx.changes.push(ChangeDescriptor {
                file_path: format!("file_{i}.rs"),
                change_type: ChangeType::Modify,
                lines_changed: 1000,
                risk_tags: RiskTag::all().into_iter().collect(),
                description: "migration schema breaking endpoint encrypt disk".to_string(),
            });
        }
        let out = score(&ctx);
        assert!(out.score <= 100.0);
        assert!(out.confidence_percent <= 95.0);
    }

    #[test]
    fn predicted_deltas_never_exceed_one_hundred() {
        let mut ctx = DeploymentContext::synthetic("big");
        for i in 0..50 {
            ctx.changes.push(ChangeDescriptor {
                file_path: format!("file_{i}.rs"),
                change_type: ChangeType::Modify,
                lines_changed: 1000,
                risk_tags: RiskTag::all().into_iter().collect(),
                description: "migration schema breaking endpoint encrypt disk".to_string(),
            });
        }
        let out = score(&ctx);
        assert!(out.predicted_error_rate_increase_percent <= 100.0);
        assert!(out.predicted_p95_latency_increase_percent <= 100.0);
    }

    #[test]
    fn confidence_baseline_matches_formula() {
        let ctx = ctx_with_change("adds caching ttl logic", 10);
        let out = score(&ctx);
        let expected = (50.0 + 10.0 * out.matched_tags.len() as f64).clamp(0.0, 95.0);
        assert_eq!(out.confidence_percent, expected);
    }
}
