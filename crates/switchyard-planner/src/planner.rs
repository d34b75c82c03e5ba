use std::sync::Arc;

use tracing::{debug, info, warn};

use switchyard_core::config::PlannerConfig;
use switchyard_core::error::{DagIssue, Result, SwitchyardError};
use switchyard_core::graph::TaskGraph;
use switchyard_core::traits::PlanProposer;
use switchyard_core::types::{CandidatePool, PlanRequest, SemanticSignal};

use crate::heuristic::HeuristicProposer;
use crate::validator::validate;

/// Builds task graphs restricted to the candidate whitelist.
///
/// `plan` never fails: every problem (no candidates, proposer outage,
/// unparseable or invalid proposal) yields an empty graph whose reasoning
/// says why.
pub struct Planner {
    proposer: Arc<dyn PlanProposer>,
    config: PlannerConfig,
}

impl Planner {
    pub fn new(proposer: Arc<dyn PlanProposer>, config: PlannerConfig) -> Self {
        Self { proposer, config }
    }

    /// Planner backed by the offline `HeuristicProposer`.
    pub fn heuristic(config: PlannerConfig) -> Self {
        Self::new(Arc::new(HeuristicProposer::new()), config)
    }

    pub async fn plan(
        &self,
        query: &str,
        signal: &SemanticSignal,
        pool: &CandidatePool,
    ) -> TaskGraph {
        let allowed = allowed_pairs(pool);
        if allowed.is_empty() {
            info!(query = %query, "No candidate capabilities retrieved, returning empty plan");
            return TaskGraph::empty("no candidate capabilities were retrieved for this query");
        }

        let request = PlanRequest {
            query: query.to_string(),
            signal: signal.clone(),
            allowed,
        };

        let raw = match self.proposer.propose(&request).await {
            Ok(raw) => raw,
            Err(e) => {
                warn!(error = %e, "Plan proposer unavailable, returning empty plan");
                return TaskGraph::empty(format!("planner unavailable: {}", e));
            }
        };

        let graph = match parse_plan(&raw) {
            Ok(graph) => graph,
            Err(e) => {
                warn!(error = %e, "Could not parse proposed plan");
                return TaskGraph::empty(format!("could not parse proposed plan: {}", e));
            }
        };

        if graph.is_empty() {
            let why = graph
                .reasoning
                .unwrap_or_else(|| "no steps proposed".to_string());
            return TaskGraph::empty(format!("planner proposed no tasks: {}", why));
        }

        if graph.len() > self.config.max_nodes {
            let issue = DagIssue::TooLarge {
                nodes: graph.len(),
                limit: self.config.max_nodes,
            };
            warn!(%issue, "Proposed plan too large");
            return TaskGraph::empty(format!("proposed plan rejected: {}", issue));
        }

        let report = validate(&graph, pool);
        if !report.is_valid() {
            let errors = report.errors();
            warn!(errors = ?errors, "Proposed plan failed structural validation");
            let mut rejected =
                TaskGraph::empty(format!("proposed plan rejected: {}", errors.join("; ")));
            rejected
                .metadata
                .insert("rejected_errors".into(), serde_json::json!(errors));
            return rejected;
        }

        info!(tasks = graph.len(), "Plan ready");
        debug!(reasoning = ?graph.reasoning, "Planner reasoning");
        graph
    }
}

/// Whitelisted `(agent, capability)` pairs, best-scoring agent first.
fn allowed_pairs(pool: &CandidatePool) -> Vec<(String, String)> {
    let mut agents: Vec<_> = pool.agents.iter().collect();
    agents.sort_by(|a, b| {
        b.total_score
            .partial_cmp(&a.total_score)
            .unwrap_or(std::cmp::Ordering::Equal)
            .then_with(|| a.id.cmp(&b.id))
    });
    agents
        .into_iter()
        .flat_map(|a| a.capabilities.iter().map(move |c| (a.id.clone(), c.clone())))
        .collect()
}

/// Convert a proposer's raw text into a graph.
///
/// Tolerates markdown code fences and prose around the JSON.
pub fn parse_plan(raw: &str) -> Result<TaskGraph> {
    let json_str = extract_json(raw);
    let value: serde_json::Value = serde_json::from_str(json_str)
        .map_err(|e| SwitchyardError::PlanParse(e.to_string()))?;
    TaskGraph::from_value(value)
}

/// Extract JSON from a response that may contain markdown code fences.
fn extract_json(text: &str) -> &str {
    let trimmed = text.trim();
    if let Some(start) = trimmed.find("```json") {
        let after = &trimmed[start + 7..];
        if let Some(end) = after.find("```") {
            return after[..end].trim();
        }
    }
    if let Some(start) = trimmed.find("```") {
        let after = &trimmed[start + 3..];
        if let Some(end) = after.find("```") {
            return after[..end].trim();
        }
    }
    let open = trimmed.find(['{', '[']);
    let close = trimmed.rfind(['}', ']']);
    if let (Some(start), Some(end)) = (open, close) {
        if start < end {
            return &trimmed[start..=end];
        }
    }
    trimmed
}
