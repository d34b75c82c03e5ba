use std::collections::{BTreeMap, HashMap};
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::{Result, SwitchyardError};
use crate::policy::PolicyRule;
use crate::types::{RiskLevel, ScoreWeights};

/// Top-level Switchyard configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AppConfig {
    #[serde(default)]
    pub planner: PlannerConfig,
    #[serde(default)]
    pub policy: PolicyConfig,
    #[serde(default)]
    pub decision: DecisionConfig,
    #[serde(default)]
    pub strategy: StrategyConfig,
    #[serde(default)]
    pub executor: ExecutorConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PlannerConfig {
    /// Proposed graphs larger than this fall back to the safe empty plan.
    #[serde(default = "default_max_nodes")]
    pub max_nodes: usize,
}

impl Default for PlannerConfig {
    fn default() -> Self {
        Self {
            max_nodes: default_max_nodes(),
        }
    }
}

fn default_max_nodes() -> usize { 50 }

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PolicyConfig {
    /// Allow submission when the authorization service is unreachable.
    #[serde(default = "default_fail_open")]
    pub fail_open: bool,
    /// Risk level at which validation is denied outright. Unset: risk only
    /// gates confirmation.
    #[serde(default)]
    pub block_at: Option<RiskLevel>,
    /// Maximum policy snippets requested from knowledge retrieval.
    #[serde(default = "default_knowledge_limit")]
    pub knowledge_limit: usize,
    #[serde(default)]
    pub risk: RiskConfig,
    #[serde(default)]
    pub limits: ResourceLimits,
    /// Initial rule set.
    #[serde(default)]
    pub rules: Vec<PolicyRule>,
}

impl Default for PolicyConfig {
    fn default() -> Self {
        Self {
            fail_open: default_fail_open(),
            block_at: None,
            knowledge_limit: default_knowledge_limit(),
            risk: RiskConfig::default(),
            limits: ResourceLimits::default(),
            rules: vec![],
        }
    }
}

fn default_fail_open() -> bool { true }
fn default_knowledge_limit() -> usize { 5 }

/// A `(threshold, weight)` pair: scores `weight` when a measure exceeds `threshold`.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Tier {
    pub above: f64,
    pub weight: u32,
}

impl Tier {
    pub const fn new(above: f64, weight: u32) -> Self {
        Self { above, weight }
    }
}

/// Weights and thresholds of the local risk score.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RiskConfig {
    /// Task-count tiers, highest first; the first exceeded tier scores.
    #[serde(default = "default_task_count_tiers")]
    pub task_count: Vec<Tier>,
    #[serde(default = "default_api_call_tiers")]
    pub api_calls: Vec<Tier>,
    #[serde(default = "default_duration_tiers")]
    pub duration_secs: Vec<Tier>,
    #[serde(default = "default_depth_tiers")]
    pub depth: Vec<Tier>,
    /// Score per sensitive-operation category that matches.
    #[serde(default = "default_sensitive_weight")]
    pub sensitive_weight: u32,
    /// Sensitive vocabulary, grouped by category.
    #[serde(default = "default_sensitive_categories")]
    pub sensitive_categories: BTreeMap<String, Vec<String>>,
    #[serde(default = "default_knowledge_high_weight")]
    pub knowledge_high_weight: u32,
    #[serde(default = "default_knowledge_mid_weight")]
    pub knowledge_mid_weight: u32,
    /// Score at or above which the level is high.
    #[serde(default = "default_high_at")]
    pub high_at: u32,
    /// Score at or above which the level is mid.
    #[serde(default = "default_mid_at")]
    pub mid_at: u32,
    /// Estimated external calls per task.
    #[serde(default = "default_api_calls_per_task")]
    pub api_calls_per_task: u32,
    /// Estimated wall time per task.
    #[serde(default = "default_secs_per_task")]
    pub secs_per_task: u32,
    /// Score projected call volume and wall time even when the caller
    /// supplies no estimate.
    #[serde(default)]
    pub include_estimate: bool,
}

impl Default for RiskConfig {
    fn default() -> Self {
        Self {
            task_count: default_task_count_tiers(),
            api_calls: default_api_call_tiers(),
            duration_secs: default_duration_tiers(),
            depth: default_depth_tiers(),
            sensitive_weight: default_sensitive_weight(),
            sensitive_categories: default_sensitive_categories(),
            knowledge_high_weight: default_knowledge_high_weight(),
            knowledge_mid_weight: default_knowledge_mid_weight(),
            high_at: default_high_at(),
            mid_at: default_mid_at(),
            api_calls_per_task: default_api_calls_per_task(),
            secs_per_task: default_secs_per_task(),
            include_estimate: false,
        }
    }
}

fn default_task_count_tiers() -> Vec<Tier> { vec![Tier::new(10.0, 3), Tier::new(5.0, 1)] }
fn default_api_call_tiers() -> Vec<Tier> { vec![Tier::new(50.0, 2), Tier::new(20.0, 1)] }
fn default_duration_tiers() -> Vec<Tier> { vec![Tier::new(60.0, 2), Tier::new(30.0, 1)] }
fn default_depth_tiers() -> Vec<Tier> { vec![Tier::new(5.0, 2), Tier::new(3.0, 1)] }
fn default_sensitive_weight() -> u32 { 3 }
fn default_knowledge_high_weight() -> u32 { 2 }
fn default_knowledge_mid_weight() -> u32 { 1 }
fn default_high_at() -> u32 { 5 }
fn default_mid_at() -> u32 { 2 }
fn default_api_calls_per_task() -> u32 { 2 }
fn default_secs_per_task() -> u32 { 5 }

fn default_sensitive_categories() -> BTreeMap<String, Vec<String>> {
    let words = |ws: &[&str]| ws.iter().map(|w| w.to_string()).collect::<Vec<_>>();
    BTreeMap::from([
        (
            "destructive".to_string(),
            words(&["delete", "drop", "destroy", "remove", "purge", "truncate", "wipe", "erase"]),
        ),
        (
            "privilege".to_string(),
            words(&["sudo", "grant", "escalate", "chmod", "chown"]),
        ),
        (
            "financial".to_string(),
            words(&["payment", "refund", "wire_transfer", "charge_card"]),
        ),
    ])
}

/// Ceilings for the resource-limit check.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ResourceLimits {
    #[serde(default = "default_max_concurrent_tasks")]
    pub max_concurrent_tasks: u64,
    #[serde(default = "default_max_daily_executions")]
    pub max_daily_executions: u64,
    #[serde(default = "default_max_daily_external_calls")]
    pub max_daily_external_calls: u64,
    #[serde(default = "default_max_storage_mb")]
    pub max_storage_mb: u64,
}

impl Default for ResourceLimits {
    fn default() -> Self {
        Self {
            max_concurrent_tasks: default_max_concurrent_tasks(),
            max_daily_executions: default_max_daily_executions(),
            max_daily_external_calls: default_max_daily_external_calls(),
            max_storage_mb: default_max_storage_mb(),
        }
    }
}

fn default_max_concurrent_tasks() -> u64 { 20 }
fn default_max_daily_executions() -> u64 { 1_000 }
fn default_max_daily_external_calls() -> u64 { 10_000 }
fn default_max_storage_mb() -> u64 { 10_240 }

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DecisionConfig {
    /// Minimum total score for an agent to be chosen.
    #[serde(default = "default_floor")]
    pub agent_floor: f64,
    /// Minimum total score for a tool to be chosen.
    #[serde(default = "default_floor")]
    pub tool_floor: f64,
    #[serde(default = "default_max_tools")]
    pub max_tools: usize,
    /// Aggregate below this degrades to a bare-model answer.
    #[serde(default = "default_floor")]
    pub fallback_threshold: f64,
    /// Aggregate reported when nothing was chosen.
    #[serde(default = "default_floor")]
    pub neutral_score: f64,
    /// Score given to an agent named by a deterministic override.
    #[serde(default = "default_override_score")]
    pub override_score: f64,
    /// Minimum cost sub-score under a low cost ceiling.
    #[serde(default = "default_low_cost_min")]
    pub low_cost_min: f64,
    /// Minimum cost sub-score under a medium cost ceiling.
    #[serde(default = "default_medium_cost_min")]
    pub medium_cost_min: f64,
    /// Deprecated or banned candidate ids.
    #[serde(default)]
    pub banned: Vec<String>,
    /// File extension (without dot) to agent id.
    #[serde(default)]
    pub extension_overrides: HashMap<String, String>,
    #[serde(default)]
    pub weights: ScoreWeights,
}

impl Default for DecisionConfig {
    fn default() -> Self {
        Self {
            agent_floor: default_floor(),
            tool_floor: default_floor(),
            max_tools: default_max_tools(),
            fallback_threshold: default_floor(),
            neutral_score: default_floor(),
            override_score: default_override_score(),
            low_cost_min: default_low_cost_min(),
            medium_cost_min: default_medium_cost_min(),
            banned: vec![],
            extension_overrides: HashMap::new(),
            weights: ScoreWeights::default(),
        }
    }
}

fn default_floor() -> f64 { 0.5 }
fn default_max_tools() -> usize { 3 }
fn default_override_score() -> f64 { 0.99 }
fn default_low_cost_min() -> f64 { 0.7 }
fn default_medium_cost_min() -> f64 { 0.5 }

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StrategyConfig {
    /// Complexity score (0-100) at or above which a hybrid strategy is used.
    #[serde(default = "default_complexity_threshold")]
    pub complexity_threshold: f64,
    /// Step counts above this use a hybrid strategy.
    #[serde(default = "default_max_single_steps")]
    pub max_single_steps: usize,
    /// Recent failures at or above this use a hybrid strategy.
    #[serde(default = "default_failure_threshold")]
    pub failure_threshold: u32,
    /// Stateful engine with checkpoints and tracing.
    #[serde(default = "default_graph_engine")]
    pub graph_engine: String,
    /// Lightweight sequential engine.
    #[serde(default = "default_linear_engine")]
    pub linear_engine: String,
    #[serde(default = "default_error_rate_threshold")]
    pub error_rate_threshold: f64,
    #[serde(default = "default_cost_threshold")]
    pub cost_threshold: f64,
    #[serde(default = "default_cooldown_secs")]
    pub cooldown_secs: u64,
}

impl Default for StrategyConfig {
    fn default() -> Self {
        Self {
            complexity_threshold: default_complexity_threshold(),
            max_single_steps: default_max_single_steps(),
            failure_threshold: default_failure_threshold(),
            graph_engine: default_graph_engine(),
            linear_engine: default_linear_engine(),
            error_rate_threshold: default_error_rate_threshold(),
            cost_threshold: default_cost_threshold(),
            cooldown_secs: default_cooldown_secs(),
        }
    }
}

fn default_complexity_threshold() -> f64 { 70.0 }
fn default_max_single_steps() -> usize { 10 }
fn default_failure_threshold() -> u32 { 3 }
fn default_graph_engine() -> String { "graph".to_string() }
fn default_linear_engine() -> String { "linear".to_string() }
fn default_error_rate_threshold() -> f64 { 0.3 }
fn default_cost_threshold() -> f64 { 1.0 }
fn default_cooldown_secs() -> u64 { 300 }

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExecutorConfig {
    /// Timeout for a single node dispatch.
    #[serde(default = "default_node_timeout")]
    pub node_timeout_secs: u64,
    /// Cap on nodes running at once within a wave. Unset: whole wave at once.
    #[serde(default)]
    pub max_concurrency: Option<usize>,
}

impl Default for ExecutorConfig {
    fn default() -> Self {
        Self {
            node_timeout_secs: default_node_timeout(),
            max_concurrency: None,
        }
    }
}

fn default_node_timeout() -> u64 { 120 }

impl AppConfig {
    /// Load config from a TOML file, with env var expansion.
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .map_err(|_| SwitchyardError::ConfigNotFound(path.display().to_string()))?;

        let expanded = expand_env_vars(&content);

        toml::from_str(&expanded).map_err(|e| SwitchyardError::Config(e.to_string()))
    }
}

/// Expand `${ENV_VAR}` patterns in a string.
fn expand_env_vars(input: &str) -> String {
    let mut result = String::with_capacity(input.len());
    let mut chars = input.chars().peekable();

    while let Some(c) = chars.next() {
        if c == '$' && chars.peek() == Some(&'{') {
            chars.next(); // consume '{'
            let mut var_name = String::new();
            for c in chars.by_ref() {
                if c == '}' {
                    break;
                }
                var_name.push(c);
            }
            match std::env::var(&var_name) {
                Ok(val) => result.push_str(&val),
                // Keep original if env var not set
                Err(_) => result.push_str(&format!("${{{}}}", var_name)),
            }
        } else {
            result.push(c);
        }
    }
    result
}
