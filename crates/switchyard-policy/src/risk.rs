use serde::Serialize;

use switchyard_core::config::{RiskConfig, Tier};
use switchyard_core::graph::TaskGraph;
use switchyard_core::types::{PolicyKnowledge, RiskLevel};
use switchyard_planner::dag_depth;

/// Projected external-call volume and wall time of a graph.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize)]
pub struct ResourceEstimate {
    pub api_calls: u64,
    pub duration_secs: u64,
}

impl ResourceEstimate {
    pub fn from_graph(graph: &TaskGraph, config: &RiskConfig) -> Self {
        let tasks = graph.len() as u64;
        Self {
            api_calls: tasks * u64::from(config.api_calls_per_task),
            duration_secs: tasks * u64::from(config.secs_per_task),
        }
    }
}

/// One contribution to the risk score.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RiskFactor {
    pub name: String,
    pub points: u32,
    pub detail: String,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RiskAssessment {
    pub score: u32,
    pub level: RiskLevel,
    pub factors: Vec<RiskFactor>,
    /// Sensitive categories that matched some node.
    pub sensitive: Vec<String>,
    pub depth: usize,
}

impl RiskAssessment {
    pub fn has_sensitive(&self) -> bool {
        !self.sensitive.is_empty()
    }

    pub fn requires_confirmation(&self) -> bool {
        self.level >= RiskLevel::Mid
    }
}

/// Score a graph locally. Pure: same inputs, same assessment.
pub fn assess_risk(
    graph: &TaskGraph,
    knowledge: &[PolicyKnowledge],
    estimate: Option<&ResourceEstimate>,
    config: &RiskConfig,
) -> RiskAssessment {
    let mut factors = Vec::new();

    let tasks = graph.len();
    if let Some(tier) = first_exceeded(&config.task_count, tasks as f64) {
        factors.push(RiskFactor {
            name: "task_count".into(),
            points: tier.weight,
            detail: format!("{} tasks (> {})", tasks, tier.above),
        });
    }

    let sensitive = sensitive_categories(graph, config);
    for category in &sensitive {
        factors.push(RiskFactor {
            name: format!("sensitive:{}", category),
            points: config.sensitive_weight,
            detail: format!("{} operation in plan", category),
        });
    }

    if let Some(est) = estimate {
        if let Some(tier) = first_exceeded(&config.api_calls, est.api_calls as f64) {
            factors.push(RiskFactor {
                name: "api_calls".into(),
                points: tier.weight,
                detail: format!("~{} external calls (> {})", est.api_calls, tier.above),
            });
        }
        if let Some(tier) = first_exceeded(&config.duration_secs, est.duration_secs as f64) {
            factors.push(RiskFactor {
                name: "duration".into(),
                points: tier.weight,
                detail: format!("~{}s wall time (> {})", est.duration_secs, tier.above),
            });
        }
    }

    let depth = dag_depth(graph);
    if let Some(tier) = first_exceeded(&config.depth, depth as f64) {
        factors.push(RiskFactor {
            name: "depth".into(),
            points: tier.weight,
            detail: format!("dependency depth {} (> {})", depth, tier.above),
        });
    }

    for snippet in knowledge {
        let points = match snippet.risk {
            RiskLevel::High => config.knowledge_high_weight,
            RiskLevel::Mid => config.knowledge_mid_weight,
            RiskLevel::Low => 0,
        };
        if points > 0 {
            factors.push(RiskFactor {
                name: "knowledge".into(),
                points,
                detail: format!("{} risk policy: {}", snippet.risk, snippet.text),
            });
        }
    }

    let score = factors.iter().map(|f| f.points).sum();
    RiskAssessment {
        score,
        level: level_for(score, config),
        factors,
        sensitive,
        depth,
    }
}

fn level_for(score: u32, config: &RiskConfig) -> RiskLevel {
    if score >= config.high_at {
        RiskLevel::High
    } else if score >= config.mid_at {
        RiskLevel::Mid
    } else {
        RiskLevel::Low
    }
}

/// Highest tier whose threshold the measure exceeds.
fn first_exceeded(tiers: &[Tier], measure: f64) -> Option<&Tier> {
    tiers
        .iter()
        .filter(|t| measure > t.above)
        .max_by(|a, b| a.above.total_cmp(&b.above))
}

/// Categories whose vocabulary appears in any node's capability or description.
fn sensitive_categories(graph: &TaskGraph, config: &RiskConfig) -> Vec<String> {
    let haystacks: Vec<String> = graph
        .nodes
        .iter()
        .map(|n| {
            let mut text = n.capability.to_lowercase();
            if let Some(desc) = &n.description {
                text.push(' ');
                text.push_str(&desc.to_lowercase());
            }
            text
        })
        .collect();

    config
        .sensitive_categories
        .iter()
        .filter(|(_, words)| {
            words.iter().any(|w| {
                let w = w.to_lowercase();
                !w.is_empty() && haystacks.iter().any(|h| h.contains(&w))
            })
        })
        .map(|(category, _)| category.clone())
        .collect()
}
