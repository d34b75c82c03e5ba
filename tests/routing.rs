use std::sync::Arc;

use serde_json::json;
use tokio_util::sync::CancellationToken;

use switchyard_core::config::AppConfig;
use switchyard_core::event::OrchestrationEvent;
use switchyard_core::graph::{TaskGraph, TaskNode};
use switchyard_core::policy::{Condition, Operator, PolicyRule, RuleAction, RuleCategory};
use switchyard_core::types::{CandidateMatch, CandidatePool, RiskLevel, RunId, SemanticSignal};
use switchyard_decision::{DecisionContext, DecisionEngine};
use switchyard_planner::{validate, HeuristicProposer};
use switchyard_policy::{evaluate_rules, PolicyContext, PolicyEngine};
use switchyard_runtime::{DagExecutor, RouteRequest, RouteStatus, Router};
use switchyard_test_utils::{
    chain_graph, parallel_graph, pool_for, wide_graph, MemoryStore, MockAuthorizer,
    ScriptedDispatcher, StaticProposer,
};

fn pool() -> CandidatePool {
    CandidatePool {
        agents: vec![
            CandidateMatch::agent("fs", 0.8)
                .with_capabilities(vec!["read_file".into(), "write_file".into()]),
            CandidateMatch::agent("conv", 0.7).with_capabilities(vec!["convert_file".into()]),
        ],
        tools: vec![CandidateMatch::tool("pandoc", 0.9)],
        models: vec![CandidateMatch::model("small", 0.6)],
    }
}

#[test]
fn acyclic_whitelisted_graph_validates() {
    let graph = chain_graph();
    let report = validate(&graph, &pool_for(&graph));
    assert!(report.is_valid());
    assert!(report.errors().is_empty());
}

#[test]
fn cycle_report_names_both_nodes() {
    let graph = TaskGraph::new(vec![
        TaskNode::new("T1", "read", "fs").after(&["T2"]),
        TaskNode::new("T2", "read", "fs").after(&["T1"]),
    ]);
    let report = validate(&graph, &pool_for(&graph));
    assert!(!report.is_valid());
    let cycle = report
        .errors()
        .into_iter()
        .find(|e| e.starts_with("cycle:"))
        .expect("cycle reported");
    assert!(cycle.contains("T1") && cycle.contains("T2"));
}

#[tokio::test]
async fn chain_and_parallel_wave_shapes() {
    let executor = DagExecutor::new(
        Arc::new(ScriptedDispatcher::new()),
        AppConfig::default().executor,
    );
    let cancel = CancellationToken::new();

    let chain = executor
        .execute(&RunId::new(), &chain_graph(), &json!({}), &cancel)
        .await;
    assert_eq!(chain.waves, vec![vec!["T1"], vec!["T2"], vec!["T3"]]);

    let parallel = executor
        .execute(&RunId::new(), &parallel_graph(), &json!({}), &cancel)
        .await;
    assert_eq!(parallel.waves.len(), 1);
    assert_eq!(parallel.waves[0].len(), 2);
}

#[test]
fn and_rule_deny_property() {
    let rule = PolicyRule::new(
        "r",
        RuleCategory::Risk,
        Condition::and(vec![
            Condition::leaf("task_count", Operator::Gt, json!(5)),
            Condition::leaf("has_sensitive", Operator::Eq, json!(true)),
        ]),
        RuleAction::Deny,
    );
    let eval = evaluate_rules(&[rule], &json!({"task_count": 10, "has_sensitive": true}));
    assert_eq!(eval.action, RuleAction::Deny);
}

#[tokio::test]
async fn risk_score_properties() {
    let engine = PolicyEngine::new(AppConfig::default().policy);
    let ctx = PolicyContext::new("tester");

    let plain = engine.validate(&wide_graph(15, "read"), &ctx).await;
    assert_eq!(plain.metadata["risk_score"], 3);
    assert_eq!(plain.risk_level, RiskLevel::Mid);

    let mut graph = wide_graph(15, "read");
    graph.nodes.push(TaskNode::new("d", "delete", "fs"));
    let sensitive = engine.validate(&graph, &ctx).await;
    assert_eq!(sensitive.metadata["risk_score"], 6);
    assert_eq!(sensitive.risk_level, RiskLevel::High);
    assert!(sensitive.requires_confirmation);
    assert!(sensitive.allowed);
}

#[test]
fn decision_floor_properties() {
    let engine = DecisionEngine::default();
    let signal = SemanticSignal::default();
    let ctx = DecisionContext::default();

    let low = vec![CandidateMatch::agent("a", 0.2), CandidateMatch::agent("b", 0.45)];
    assert_eq!(engine.decide(&signal, &low, &[], &[], &ctx).agent, None);

    let edge = vec![CandidateMatch::agent("edge", 0.5)];
    assert_eq!(
        engine.decide(&signal, &edge, &[], &[], &ctx).agent.as_deref(),
        Some("edge")
    );
}

#[tokio::test]
async fn validate_and_decide_are_idempotent() {
    let graph = wide_graph(12, "delete_file");
    let engine = PolicyEngine::new(AppConfig::default().policy);
    let ctx = PolicyContext::new("tester");
    assert_eq!(
        engine.validate(&graph, &ctx).await,
        engine.validate(&graph, &ctx).await
    );

    let p = pool();
    let decision = DecisionEngine::default();
    let signal = SemanticSignal::default();
    let dctx = DecisionContext::default();
    assert_eq!(
        decision.decide(&signal, &p.agents, &p.tools, &p.models, &dctx),
        decision.decide(&signal, &p.agents, &p.tools, &p.models, &dctx)
    );
}

#[tokio::test]
async fn heuristic_router_end_to_end() {
    let store = Arc::new(MemoryStore::new());
    let router = Router::new(
        &AppConfig::default(),
        Arc::new(HeuristicProposer::new()),
        Arc::new(ScriptedDispatcher::new()),
    )
    .with_store(store.clone());
    let mut events = router.events().subscribe();

    let signal = SemanticSignal::default().with_actions(vec![
        "read file".into(),
        "convert".into(),
        "write".into(),
    ]);
    let request = RouteRequest::new("convert notes.md to pdf", signal, pool());
    let outcome = router.route(&request, &CancellationToken::new()).await;

    assert_eq!(outcome.status, RouteStatus::Completed);
    assert_eq!(outcome.graph.len(), 3);
    assert_eq!(outcome.waves.len(), 3);
    let decision = outcome.decision.expect("decision");
    assert_eq!(decision.agent.as_deref(), Some("fs"));
    assert_eq!(decision.tools, vec!["pandoc"]);
    assert_eq!(store.records().len(), 1);

    let mut kinds = Vec::new();
    while let Ok(event) = events.try_recv() {
        kinds.push(match event {
            OrchestrationEvent::PlanReady { .. } => "plan",
            OrchestrationEvent::PolicyEvaluated { .. } => "policy",
            OrchestrationEvent::DecisionMade { .. } => "decision",
            OrchestrationEvent::WaveStarted { .. } => "wave",
            OrchestrationEvent::NodeFinished { .. } => "node",
            OrchestrationEvent::RunFinished { .. } => "finished",
            OrchestrationEvent::PlanRejected { .. } => "rejected",
        });
    }
    assert_eq!(kinds.first(), Some(&"plan"));
    assert_eq!(kinds.last(), Some(&"finished"));
    assert_eq!(kinds.iter().filter(|k| **k == "wave").count(), 3);
}

#[tokio::test]
async fn authorizer_denial_stops_routing() {
    let graph = chain_graph();
    let router = Router::new(
        &AppConfig::default(),
        Arc::new(StaticProposer::graph(&graph)),
        Arc::new(ScriptedDispatcher::new()),
    )
    .with_authorizer(Arc::new(MockAuthorizer::Deny("outside business hours".into())));

    let request = RouteRequest::new("sync files", SemanticSignal::default(), pool_for(&graph));
    let outcome = router.route(&request, &CancellationToken::new()).await;
    assert_eq!(outcome.status, RouteStatus::Denied);
    assert!(outcome.reasons[0].contains("outside business hours"));
    assert!(outcome.report.is_none());
}

#[tokio::test]
async fn rules_added_at_runtime_apply_to_next_route() {
    let graph = chain_graph();
    let router = Router::new(
        &AppConfig::default(),
        Arc::new(StaticProposer::graph(&graph)),
        Arc::new(ScriptedDispatcher::new()),
    );
    let request = RouteRequest::new("sync files", SemanticSignal::default(), pool_for(&graph));

    router.policy().add_rule(
        PolicyRule::new(
            "freeze",
            RuleCategory::Permission,
            Condition::leaf("context.env", Operator::Eq, json!("prod")),
            RuleAction::Deny,
        )
        .with_reason("change freeze in prod"),
    );

    let mut prod = request.clone();
    prod.context = json!({"env": "prod"});
    let outcome = router.route(&prod, &CancellationToken::new()).await;
    assert_eq!(outcome.status, RouteStatus::Denied);

    let outcome = router.route(&request, &CancellationToken::new()).await;
    assert_eq!(outcome.status, RouteStatus::Completed);
}
