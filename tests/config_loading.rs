use std::io::Write;

use serde_json::json;

use switchyard_core::config::{AppConfig, Tier};
use switchyard_core::policy::{Condition, RuleAction, RuleCategory};
use switchyard_core::types::RiskLevel;
use switchyard_policy::{evaluate_rules, PolicyEngine};

fn write_config(content: &str) -> tempfile::NamedTempFile {
    let mut tmp = tempfile::NamedTempFile::new().expect("create temp file");
    tmp.write_all(content.as_bytes()).expect("write toml");
    tmp
}

#[test]
fn test_load_full_config_from_file() {
    let toml_content = r#"
[planner]
max_nodes = 25

[policy]
fail_open = false
block_at = "high"
knowledge_limit = 3

[policy.risk]
task_count = [{ above = 20.0, weight = 4 }, { above = 8.0, weight = 2 }]
sensitive_weight = 5
high_at = 6
include_estimate = true

[policy.risk.sensitive_categories]
destructive = ["delete", "shred"]
export = ["export", "download_all"]

[policy.limits]
max_concurrent_tasks = 4
max_daily_executions = 50

[[policy.rules]]
id = "no-bulk-sensitive"
category = "risk"
action = "deny"
risk = "high"
reason = "bulk sensitive plans are blocked"

[policy.rules.condition]
and = [
    { leaf = { field = "task_count", op = ">", value = 5 } },
    { leaf = { field = "has_sensitive", op = "==", value = true } },
]

[[policy.rules]]
id = "review-exports"
action = "require_confirmation"
condition = { leaf = { field = "sensitive_categories", op = "contains", value = "export" } }

[decision]
agent_floor = 0.6
max_tools = 2
banned = ["legacy-agent"]

[decision.extension_overrides]
docx = "doc-agent"
pdf = "pdf-agent"

[strategy]
complexity_threshold = 60.0
graph_engine = "stateful"

[executor]
node_timeout_secs = 30
max_concurrency = 8
"#;

    let tmp = write_config(toml_content);
    let config = AppConfig::load(tmp.path()).expect("load config");

    assert_eq!(config.planner.max_nodes, 25);
    assert!(!config.policy.fail_open);
    assert_eq!(config.policy.block_at, Some(RiskLevel::High));
    assert_eq!(config.policy.knowledge_limit, 3);
    assert_eq!(config.policy.risk.task_count[0], Tier::new(20.0, 4));
    assert_eq!(config.policy.risk.sensitive_weight, 5);
    assert_eq!(config.policy.risk.mid_at, 2);
    assert!(config.policy.risk.include_estimate);
    assert_eq!(config.policy.risk.sensitive_categories.len(), 2);
    assert_eq!(config.policy.limits.max_concurrent_tasks, 4);
    assert_eq!(config.policy.limits.max_storage_mb, 10_240);

    assert_eq!(config.policy.rules.len(), 2);
    let deny = &config.policy.rules[0];
    assert_eq!(deny.category, RuleCategory::Risk);
    assert_eq!(deny.action, RuleAction::Deny);
    assert_eq!(deny.risk, Some(RiskLevel::High));
    assert!(matches!(deny.condition, Condition::And(ref c) if c.len() == 2));
    assert_eq!(config.policy.rules[1].category, RuleCategory::Permission);

    assert_eq!(config.decision.agent_floor, 0.6);
    assert_eq!(config.decision.tool_floor, 0.5);
    assert_eq!(config.decision.max_tools, 2);
    assert_eq!(config.decision.extension_overrides.len(), 2);
    assert_eq!(config.strategy.complexity_threshold, 60.0);
    assert_eq!(config.strategy.graph_engine, "stateful");
    assert_eq!(config.strategy.linear_engine, "linear");
    assert_eq!(config.executor.node_timeout_secs, 30);
    assert_eq!(config.executor.max_concurrency, Some(8));
}

#[test]
fn test_rules_from_config_evaluate() {
    let toml_content = r#"
[[policy.rules]]
id = "no-bulk-sensitive"
category = "risk"
action = "deny"

[policy.rules.condition]
and = [
    { leaf = { field = "task_count", op = ">", value = 5 } },
    { leaf = { field = "has_sensitive", op = "==", value = true } },
]
"#;
    let tmp = write_config(toml_content);
    let config = AppConfig::load(tmp.path()).expect("load config");

    let eval = evaluate_rules(
        &config.policy.rules,
        &json!({"task_count": 10, "has_sensitive": true}),
    );
    assert_eq!(eval.action, RuleAction::Deny);

    let engine = PolicyEngine::new(config.policy);
    assert_eq!(engine.rules().len(), 1);
    let eval = engine.evaluate_rules(&json!({"task_count": 3, "has_sensitive": true}));
    assert_eq!(eval.action, RuleAction::Allow);
}

#[test]
fn test_env_var_expansion_in_config() {
    std::env::set_var("SWITCHYARD_TEST_GRAPH_ENGINE", "temporal");

    let toml_content = r#"
[strategy]
graph_engine = "${SWITCHYARD_TEST_GRAPH_ENGINE}"
"#;

    let tmp = write_config(toml_content);
    let config = AppConfig::load(tmp.path()).expect("load config");
    assert_eq!(config.strategy.graph_engine, "temporal");

    std::env::remove_var("SWITCHYARD_TEST_GRAPH_ENGINE");
}

#[test]
fn test_minimal_config_uses_defaults() {
    let tmp = write_config("[executor]\nnode_timeout_secs = 10\n");
    let config = AppConfig::load(tmp.path()).expect("load config");

    assert_eq!(config.executor.node_timeout_secs, 10);
    assert_eq!(config.planner.max_nodes, 50);
    assert!(config.policy.fail_open);
    assert!(config.policy.rules.is_empty());
    assert_eq!(config.policy.risk.high_at, 5);
    assert!(!config.policy.risk.include_estimate);
    assert_eq!(config.decision.override_score, 0.99);
    assert_eq!(config.strategy.max_single_steps, 10);
}

#[test]
fn test_invalid_config_is_config_error() {
    let tmp = write_config("[policy]\nblock_at = \"catastrophic\"\n");
    let err = AppConfig::load(tmp.path()).unwrap_err();
    assert!(err.to_string().starts_with("Config error"));
}
