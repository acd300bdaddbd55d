//! Property-based tests over arbitrary `DeploymentContext`s and risk
//! assessments: quantified invariants from the component design rather than
//! literal worked examples.

use std::collections::BTreeSet;
use std::sync::Arc;

use drn_engine::prelude::*;
use drn_engine::risk::heuristic;
use drn_engine::store::InMemoryOutcomeStore;
use proptest::prelude::*;

fn arb_risk_tag() -> impl Strategy<Value = RiskTag> {
    prop_oneof![
        Just(RiskTag::Caching),
        Just(RiskTag::DatabaseSchema),
        Just(RiskTag::ApiContract),
        Just(RiskTag::Traffic),
        Just(RiskTag::Permissions),
        Just(RiskTag::Encryption),
        Just(RiskTag::LoadBalancing),
        Just(RiskTag::Storage),
    ]
}

fn arb_change() -> impl Strategy<Value = ChangeDescriptor> {
    (
        prop::collection::vec(arb_risk_tag(), 0..3),
        0u64..2000,
        prop::sample::select(vec![
            "",
            "small tweak",
            "adds a database migration",
            "breaking api endpoint change",
        ]),
    )
        .prop_map(|(tags, lines_changed, description)| ChangeDescriptor {
            file_path: "src/changed.rs".to_string(),
            change_type: ChangeType::Modify,
            lines_changed,
            risk_tags: tags.into_iter().collect::<BTreeSet<_>>(),
            description: description.to_string(),
        })
}

fn arb_context() -> impl Strategy<Value = DeploymentContext> {
    (
        prop::collection::vec(arb_change(), 0..6),
        0.0f64..20.0,
        0.0f64..3000.0,
        0usize..4,
    )
        .prop_map(
            |(changes, current_error_rate_percent, current_p95_latency_ms, dep_count)| {
                DeploymentContext {
                    deployment_id: "prop-ctx".to_string(),
                    service_name: "svc".to_string(),
                    environment: "staging".to_string(),
                    version: "0.0.0".to_string(),
                    changes,
                    current_error_rate_percent,
                    current_p95_latency_ms,
                    target_error_rate_percent: 0.0,
                    target_p95_latency_ms: 0.0,
                    current_qps: 0.0,
                    rollback_capability: dep_count % 2 == 0,
                    dependencies: (0..dep_count).map(|i| format!("dep-{i}")).collect(),
                }
            },
        )
}

fn engine_with_memory_store() -> Engine {
    let mut cfg = Config::default();
    cfg.scheduler.enabled = false;
    cfg.paths.event_log = tempfile::tempdir().unwrap().path().join("events.jsonl");
    let store: Arc<dyn OutcomeStore> = Arc::new(InMemoryOutcomeStore::new());
    Engine::with_store(&cfg, store).unwrap()
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(200))]

    /// The heuristic scorer is a pure function of its input.
    #[test]
    fn heuristic_scorer_is_pure(ctx in arb_context()) {
        let a = heuristic::score(&ctx);
        let b = heuristic::score(&ctx);
        prop_assert_eq!(a, b);
    }

    /// Every assessment of a valid context stays within its declared ranges,
    /// and the canary policy it produces always satisfies its own structural
    /// invariants.
    #[test]
    fn assessment_and_policy_stay_within_declared_bounds(ctx in arb_context()) {
        let engine = engine_with_memory_store();
        let result = engine.assess(&ctx).unwrap();

        prop_assert!((0.0..=100.0).contains(&result.risk_assessment.risk_score));
        prop_assert!((0.0..=100.0).contains(&result.risk_assessment.confidence_percent));
        prop_assert!((0.0..=100.0).contains(&result.risk_assessment.predicted_error_rate_increase_percent));
        prop_assert!((0.0..=100.0).contains(&result.risk_assessment.predicted_p95_latency_increase_percent));
        prop_assert!(result.canary_policy.satisfies_invariants());

        if result
            .risk_assessment
            .identified_factors
            .contains(&RiskTag::Caching)
        {
            prop_assert!(result.canary_policy.latency_threshold_ms <= 200.0);
        }
        if result.risk_assessment.risk_level == RiskLevel::Critical {
            prop_assert_eq!(result.canary_policy.stages.len(), 5);
        }
    }

    /// Assessing the same context twice against an unchanged weight snapshot
    /// produces bit-identical output.
    #[test]
    fn assessing_the_same_context_twice_is_idempotent(ctx in arb_context()) {
        let engine = engine_with_memory_store();
        let first = engine.assess(&ctx).unwrap();
        let second = engine.assess(&ctx).unwrap();
        prop_assert_eq!(first, second);
    }
}
