use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use switchyard_core::config::{AppConfig, StrategyConfig};
use switchyard_core::event::{EventBus, OrchestrationEvent};
use switchyard_core::graph::TaskGraph;
use switchyard_core::traits::{
    AgentDispatcher, Authorizer, ExecutionStore, KnowledgeRetriever, PlanProposer,
};
use switchyard_core::types::{CandidatePool, RunId, SemanticSignal};
use switchyard_decision::{
    decide_strategy, DecisionContext, DecisionEngine, DecisionResult, WorkflowStrategy,
};
use switchyard_planner::{execution_waves, validate, Planner};
use switchyard_policy::{
    PolicyContext, PolicyEngine, PolicyValidationResult, ResourceUsage, Verdict,
};

use crate::executor::{DagExecutor, ExecutionReport};

/// One request to route, as handed over by the semantic-understanding step.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RouteRequest {
    pub query: String,
    #[serde(default)]
    pub signal: SemanticSignal,
    #[serde(default)]
    pub pool: CandidatePool,
    /// Principal the plan is authorized for.
    #[serde(default)]
    pub subject: String,
    /// Run context passed to every node and visible to rules as `context`.
    #[serde(default)]
    pub context: serde_json::Value,
    #[serde(default)]
    pub usage: ResourceUsage,
    #[serde(default)]
    pub decision: DecisionContext,
    /// The user already confirmed a plan flagged for confirmation.
    #[serde(default)]
    pub confirmed: bool,
    /// Task complexity, 0-100.
    #[serde(default)]
    pub complexity: f64,
    #[serde(default)]
    pub recent_failures: u32,
    #[serde(default)]
    pub needs_observability: bool,
    #[serde(default)]
    pub needs_long_horizon: bool,
    #[serde(default)]
    pub trace_id: Option<String>,
    /// Stop after policy and decision; report the wave plan without dispatching.
    #[serde(default)]
    pub dry_run: bool,
}

impl RouteRequest {
    pub fn new(query: impl Into<String>, signal: SemanticSignal, pool: CandidatePool) -> Self {
        Self {
            query: query.into(),
            signal,
            pool,
            ..Default::default()
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum RouteStatus {
    /// Nothing to do: no candidates, planner outage, or no steps proposed.
    Empty,
    /// The proposed plan failed structural validation.
    Rejected,
    Denied,
    NeedsConfirmation,
    /// Dry run: planned and approved, nothing dispatched.
    Planned,
    /// No confident agent: nothing dispatched, answer with the model only.
    Fallback,
    Completed,
    /// Executed, but at least one node did not complete.
    Failed,
}

/// Structured result of a routed request. `reasons` is never empty.
#[derive(Debug, Clone, Serialize)]
pub struct RouteOutcome {
    pub run_id: RunId,
    pub status: RouteStatus,
    pub graph: TaskGraph,
    pub policy: Option<PolicyValidationResult>,
    pub decision: Option<DecisionResult>,
    pub strategy: Option<WorkflowStrategy>,
    /// Wave partition; predicted on dry runs, actual after execution.
    pub waves: Vec<Vec<String>>,
    pub report: Option<ExecutionReport>,
    pub reasons: Vec<String>,
}

impl RouteOutcome {
    fn new(run_id: RunId, status: RouteStatus, graph: TaskGraph) -> Self {
        Self {
            run_id,
            status,
            graph,
            policy: None,
            decision: None,
            strategy: None,
            waves: vec![],
            report: None,
            reasons: vec![],
        }
    }
}

/// Plan → decide → assign agents → validate → policy → execute → record.
pub struct Router {
    planner: Planner,
    policy: PolicyEngine,
    decision: DecisionEngine,
    executor: DagExecutor,
    strategy: StrategyConfig,
    store: Option<Arc<dyn ExecutionStore>>,
    events: Arc<EventBus>,
}

impl Router {
    pub fn new(
        config: &AppConfig,
        proposer: Arc<dyn PlanProposer>,
        dispatcher: Arc<dyn AgentDispatcher>,
    ) -> Self {
        let events = Arc::new(EventBus::default());
        Self {
            planner: Planner::new(proposer, config.planner.clone()),
            policy: PolicyEngine::new(config.policy.clone()),
            decision: DecisionEngine::new(config.decision.clone()),
            executor: DagExecutor::new(dispatcher, config.executor.clone())
                .with_events(events.clone()),
            strategy: config.strategy.clone(),
            store: None,
            events,
        }
    }

    pub fn with_authorizer(mut self, authorizer: Arc<dyn Authorizer>) -> Self {
        self.policy = self.policy.with_authorizer(authorizer);
        self
    }

    pub fn with_knowledge(mut self, knowledge: Arc<dyn KnowledgeRetriever>) -> Self {
        self.policy = self.policy.with_knowledge(knowledge);
        self
    }

    pub fn with_store(mut self, store: Arc<dyn ExecutionStore>) -> Self {
        self.store = Some(store);
        self
    }

    pub fn events(&self) -> Arc<EventBus> {
        self.events.clone()
    }

    /// Rule administration goes through the policy engine.
    pub fn policy(&self) -> &PolicyEngine {
        &self.policy
    }

    pub async fn route(&self, request: &RouteRequest, cancel: &CancellationToken) -> RouteOutcome {
        let run_id = RunId::new();
        info!(run_id = %run_id, query = %request.query, "Routing request");

        // Plan
        let planned = self
            .planner
            .plan(&request.query, &request.signal, &request.pool)
            .await;
        if planned.is_empty() {
            return self.empty_plan(run_id, planned);
        }
        self.events.publish(OrchestrationEvent::PlanReady {
            run_id: run_id.clone(),
            task_count: planned.len(),
        });

        // Decide
        let decision = self.decision.decide(
            &request.signal,
            &request.pool.agents,
            &request.pool.tools,
            &request.pool.models,
            &request.decision,
        );
        self.events.publish(OrchestrationEvent::DecisionMade {
            run_id: run_id.clone(),
            agent: decision.agent.clone(),
            fallback_used: decision.fallback_used,
        });
        let strategy = decide_strategy(
            request.complexity,
            planned.len(),
            request.recent_failures,
            request.needs_observability,
            request.needs_long_horizon,
            &self.strategy,
        );
        let (graph, unassigned) = self.assign_agents(planned, request);
        if decision.fallback_used || !unassigned.is_empty() {
            return self.fallback(run_id, graph, decision, strategy, &unassigned);
        }

        // Policy and execution both see exactly this graph.
        let report = validate(&graph, &request.pool);
        if !report.is_valid() {
            let errors = report.errors();
            warn!(run_id = %run_id, errors = ?errors, "Assigned plan failed structural validation");
            self.events.publish(OrchestrationEvent::PlanRejected {
                run_id: run_id.clone(),
                errors: errors.clone(),
            });
            let mut outcome = RouteOutcome::new(run_id, RouteStatus::Rejected, graph);
            outcome.reasons = errors;
            outcome.decision = Some(decision);
            outcome.strategy = Some(strategy);
            return outcome;
        }

        // Policy
        let ctx = PolicyContext::new(request.subject.clone())
            .with_query(request.query.clone())
            .with_usage(request.usage)
            .with_field("context", request.context.clone());
        let policy = self.policy.validate(&graph, &ctx).await;
        self.events.publish(OrchestrationEvent::PolicyEvaluated {
            run_id: run_id.clone(),
            allowed: policy.allowed,
            requires_confirmation: policy.requires_confirmation,
            risk_level: policy.risk_level,
        });

        let gate = match policy.verdict() {
            Verdict::Denied => Some(RouteStatus::Denied),
            Verdict::NeedsConfirmation if !request.confirmed => {
                Some(RouteStatus::NeedsConfirmation)
            }
            _ => None,
        };

        let mut outcome = RouteOutcome::new(run_id.clone(), RouteStatus::Planned, graph);
        outcome.reasons.extend(policy.reasons.iter().cloned());
        if let Some(status) = gate {
            info!(run_id = %run_id, status = ?status, "Plan stopped at policy gate");
            outcome.status = status;
            if outcome.reasons.is_empty() {
                outcome.reasons.push(format!("policy verdict: {:?}", policy.verdict()));
            }
        }
        outcome.policy = Some(policy);
        outcome.decision = Some(decision);
        outcome.strategy = Some(strategy);
        if gate.is_some() {
            return outcome;
        }

        if request.dry_run {
            let preview = execution_waves(&outcome.graph);
            outcome.waves = preview.waves;
            outcome.reasons.push(format!(
                "dry run: {} tasks in {} waves",
                outcome.graph.len(),
                outcome.waves.len()
            ));
            return outcome;
        }

        // Execute
        let report = self
            .executor
            .execute(&run_id, &outcome.graph, &request.context, cancel)
            .await;
        self.events.publish(OrchestrationEvent::RunFinished {
            run_id: run_id.clone(),
            success: report.success,
            elapsed_ms: report.elapsed_ms,
        });

        if let Some(store) = &self.store {
            let record = report
                .clone()
                .into_record(request.query.clone(), request.trace_id.clone());
            if let Err(e) = store.save(&record).await {
                warn!(run_id = %run_id, error = %e, "Failed to persist execution record");
            }
        }

        outcome.status = if report.success {
            RouteStatus::Completed
        } else {
            RouteStatus::Failed
        };
        if let Some(err) = &report.error {
            outcome.reasons.push(err.clone());
        }
        for failed in report.outcomes.iter().filter(|o| o.error.is_some()) {
            outcome.reasons.push(format!(
                "{}: {}",
                failed.node_id,
                failed.error.as_deref().unwrap_or_default()
            ));
        }
        if outcome.reasons.is_empty() {
            outcome
                .reasons
                .push(format!("{} tasks completed", report.outcomes.len()));
        }
        outcome.waves = report.waves.clone();
        outcome.report = Some(report);
        outcome
    }

    /// Nothing is dispatched; the caller answers with the chosen model alone.
    fn fallback(
        &self,
        run_id: RunId,
        graph: TaskGraph,
        decision: DecisionResult,
        strategy: WorkflowStrategy,
        unassigned: &[String],
    ) -> RouteOutcome {
        info!(
            run_id = %run_id,
            model = ?decision.model,
            unassigned = ?unassigned,
            "Low confidence, falling back to a model-only answer"
        );
        let mut outcome = RouteOutcome::new(run_id, RouteStatus::Fallback, graph);
        if decision.fallback_used {
            outcome
                .reasons
                .push(format!("low-confidence decision: {}", decision.reasoning));
        }
        if !unassigned.is_empty() {
            outcome.reasons.push(format!(
                "no agent cleared the score floor for {}",
                unassigned.join(", ")
            ));
        }
        outcome.decision = Some(decision);
        outcome.strategy = Some(strategy);
        outcome
    }

    fn empty_plan(&self, run_id: RunId, graph: TaskGraph) -> RouteOutcome {
        let rejected: Vec<String> = graph
            .metadata
            .get("rejected_errors")
            .and_then(|v| serde_json::from_value(v.clone()).ok())
            .unwrap_or_default();
        let reasoning = graph
            .reasoning
            .clone()
            .unwrap_or_else(|| "empty plan".to_string());

        let status = if rejected.is_empty() {
            RouteStatus::Empty
        } else {
            RouteStatus::Rejected
        };
        self.events.publish(OrchestrationEvent::PlanRejected {
            run_id: run_id.clone(),
            errors: if rejected.is_empty() {
                vec![reasoning.clone()]
            } else {
                rejected.clone()
            },
        });
        info!(run_id = %run_id, status = ?status, reason = %reasoning, "No executable plan");

        let mut outcome = RouteOutcome::new(run_id, status, graph);
        outcome.reasons = if rejected.is_empty() {
            vec![reasoning]
        } else {
            rejected
        };
        outcome
    }

    /// Pick the best agent per node among candidates offering its capability.
    /// Also returns the ids of nodes where no candidate clears the floor.
    fn assign_agents(
        &self,
        mut graph: TaskGraph,
        request: &RouteRequest,
    ) -> (TaskGraph, Vec<String>) {
        let mut unassigned = Vec::new();
        for node in &mut graph.nodes {
            let candidates = request.pool.agents_for(&node.capability);
            let choice = self
                .decision
                .decide(&request.signal, &candidates, &[], &[], &request.decision);
            match choice.agent {
                Some(agent) if agent != node.agent => {
                    debug!(
                        node = %node.id,
                        planned = %node.agent,
                        chosen = %agent,
                        "Reassigned node agent"
                    );
                    node.agent = agent;
                }
                Some(_) => {}
                None => unassigned.push(node.id.clone()),
            }
        }
        (graph, unassigned)
    }
}
