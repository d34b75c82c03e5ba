//! Wave-based DAG execution.
//!
//! Each iteration computes the ready set (pending nodes whose dependencies
//! all completed), dispatches it concurrently and waits for the whole wave
//! before looking again. Node status is only written between waves.

use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use serde::Serialize;
use tokio::sync::Semaphore;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use switchyard_core::config::ExecutorConfig;
use switchyard_core::error::SwitchyardError;
use switchyard_core::event::{EventBus, OrchestrationEvent};
use switchyard_core::graph::TaskGraph;
use switchyard_core::record::{ExecutionRecord, NodeStatus, TaskOutcome};
use switchyard_core::traits::AgentDispatcher;
use switchyard_core::types::{NodeRequest, RunId};

/// Everything that happened during one run.
#[derive(Debug, Clone, Serialize)]
pub struct ExecutionReport {
    pub run_id: RunId,
    /// Node ids dispatched in each wave, in order.
    pub waves: Vec<Vec<String>>,
    /// Final status of every node.
    pub states: BTreeMap<String, NodeStatus>,
    /// One entry per dispatched node, in completion order within each wave.
    pub outcomes: Vec<TaskOutcome>,
    /// True only if every node completed.
    pub success: bool,
    /// Why the run stopped early or failed.
    pub error: Option<String>,
    pub elapsed_ms: u64,
}

impl ExecutionReport {
    pub fn failed_nodes(&self) -> Vec<&str> {
        self.nodes_in(NodeStatus::Failed)
    }

    /// Nodes that never ran because an upstream node failed (or a cycle slipped through).
    pub fn blocked_nodes(&self) -> Vec<&str> {
        self.nodes_in(NodeStatus::Pending)
    }

    fn nodes_in(&self, status: NodeStatus) -> Vec<&str> {
        self.states
            .iter()
            .filter(|(_, s)| **s == status)
            .map(|(id, _)| id.as_str())
            .collect()
    }

    pub fn into_record(
        self,
        intent: impl Into<String>,
        trace_id: Option<String>,
    ) -> ExecutionRecord {
        ExecutionRecord {
            run_id: self.run_id,
            trace_id,
            intent: intent.into(),
            task_count: self.states.len(),
            success: self.success,
            results: self.outcomes,
            latency_ms: self.elapsed_ms,
            finished_at: Utc::now(),
        }
    }
}

/// Runs a validated graph against an agent dispatcher.
pub struct DagExecutor {
    dispatcher: Arc<dyn AgentDispatcher>,
    config: ExecutorConfig,
    events: Option<Arc<EventBus>>,
}

impl DagExecutor {
    pub fn new(dispatcher: Arc<dyn AgentDispatcher>, config: ExecutorConfig) -> Self {
        Self {
            dispatcher,
            config,
            events: None,
        }
    }

    pub fn with_events(mut self, events: Arc<EventBus>) -> Self {
        self.events = Some(events);
        self
    }

    fn publish(&self, event: OrchestrationEvent) {
        if let Some(bus) = &self.events {
            bus.publish(event);
        }
    }

    /// Execute the graph to completion, or until it stalls or is cancelled.
    ///
    /// Node failures never abort sibling branches. A failed node never
    /// satisfies its dependents, so they stay pending and the run ends with
    /// "no ready tasks". Cancellation is observed between waves only.
    pub async fn execute(
        &self,
        run_id: &RunId,
        graph: &TaskGraph,
        context: &serde_json::Value,
        cancel: &CancellationToken,
    ) -> ExecutionReport {
        let start = Instant::now();
        let index = graph.index();
        let mut status: Vec<NodeStatus> = vec![NodeStatus::Pending; graph.nodes.len()];
        let mut outputs: HashMap<String, serde_json::Value> = HashMap::new();
        let mut waves: Vec<Vec<String>> = Vec::new();
        let mut outcomes: Vec<TaskOutcome> = Vec::new();
        let mut error: Option<String> = None;

        let node_timeout = Duration::from_secs(self.config.node_timeout_secs);
        let limiter = self
            .config
            .max_concurrency
            .filter(|n| *n > 0)
            .map(|n| Arc::new(Semaphore::new(n)));

        loop {
            if !status.contains(&NodeStatus::Pending) {
                break;
            }
            if cancel.is_cancelled() {
                warn!(run_id = %run_id, "Run cancelled before wave {}", waves.len());
                error = Some(SwitchyardError::Cancelled.to_string());
                break;
            }

            let ready: Vec<usize> = (0..graph.nodes.len())
                .filter(|&i| status[i] == NodeStatus::Pending)
                .filter(|&i| {
                    graph.nodes[i].depends_on.iter().all(|d| {
                        index
                            .get(d.as_str())
                            .is_some_and(|&j| status[j] == NodeStatus::Completed)
                    })
                })
                .collect();

            if ready.is_empty() {
                let stuck: Vec<&str> = (0..graph.nodes.len())
                    .filter(|&i| status[i] == NodeStatus::Pending)
                    .map(|i| graph.nodes[i].id.as_str())
                    .collect();
                warn!(run_id = %run_id, blocked = ?stuck, "No ready tasks, aborting run");
                error = Some(format!(
                    "no ready tasks: {} blocked by failed or unresolved dependencies ({})",
                    stuck.len(),
                    stuck.join(", ")
                ));
                break;
            }

            let wave = waves.len();
            let ids: Vec<String> = ready.iter().map(|&i| graph.nodes[i].id.clone()).collect();
            info!(run_id = %run_id, wave, nodes = ?ids, "Starting wave");
            self.publish(OrchestrationEvent::WaveStarted {
                run_id: run_id.clone(),
                wave,
                nodes: ids.clone(),
            });
            for &i in &ready {
                status[i] = NodeStatus::Running;
            }

            let futs: Vec<_> = ready
                .iter()
                .map(|&i| {
                    let node = &graph.nodes[i];
                    let upstream = node
                        .depends_on
                        .iter()
                        .filter_map(|d| outputs.get(d).map(|v| (d.clone(), v.clone())))
                        .collect();
                    let request = NodeRequest {
                        run_id: run_id.clone(),
                        node_id: node.id.clone(),
                        agent: node.agent.clone(),
                        capability: node.capability.clone(),
                        description: node.description.clone(),
                        context: context.clone(),
                        upstream,
                    };
                    let limiter = limiter.clone();
                    async move {
                        let _permit = match &limiter {
                            Some(sem) => sem.acquire().await.ok(),
                            None => None,
                        };
                        let started = Instant::now();
                        let dispatch = self.dispatcher.dispatch(request);
                        let result = tokio::time::timeout(node_timeout, dispatch).await;
                        (i, result, started.elapsed().as_millis() as u64)
                    }
                })
                .collect();

            let results = futures::future::join_all(futs).await;

            for (i, result, elapsed_ms) in results {
                let node = &graph.nodes[i];
                let (node_status, output, err) = match result {
                    Ok(Ok(Some(value))) => (NodeStatus::Completed, Some(value), None),
                    Ok(Ok(None)) => (
                        NodeStatus::Failed,
                        None,
                        Some(format!("agent {} returned no result", node.agent)),
                    ),
                    Ok(Err(e)) => (NodeStatus::Failed, None, Some(e.to_string())),
                    Err(_) => (
                        NodeStatus::Failed,
                        None,
                        Some(
                            SwitchyardError::NodeTimeout {
                                node: node.id.clone(),
                                timeout_secs: self.config.node_timeout_secs,
                            }
                            .to_string(),
                        ),
                    ),
                };

                match &err {
                    Some(e) => warn!(
                        run_id = %run_id,
                        node = %node.id,
                        agent = %node.agent,
                        error = %e,
                        "Task failed"
                    ),
                    None => debug!(run_id = %run_id, node = %node.id, elapsed_ms, "Task completed"),
                }

                status[i] = node_status;
                if let Some(value) = &output {
                    outputs.insert(node.id.clone(), value.clone());
                }
                self.publish(OrchestrationEvent::NodeFinished {
                    run_id: run_id.clone(),
                    node_id: node.id.clone(),
                    status: node_status,
                    elapsed_ms,
                });
                outcomes.push(TaskOutcome {
                    node_id: node.id.clone(),
                    agent: node.agent.clone(),
                    capability: node.capability.clone(),
                    status: node_status,
                    output,
                    error: err,
                    elapsed_ms,
                    wave,
                });
            }

            waves.push(ids);
        }

        let success = status.iter().all(|s| *s == NodeStatus::Completed);
        if !success && error.is_none() {
            let failed = status.iter().filter(|s| **s == NodeStatus::Failed).count();
            error = Some(format!("{} of {} tasks failed", failed, status.len()));
        }

        let elapsed_ms = start.elapsed().as_millis() as u64;
        info!(run_id = %run_id, success, waves = waves.len(), elapsed_ms, "Run finished");

        ExecutionReport {
            run_id: run_id.clone(),
            waves,
            states: graph
                .nodes
                .iter()
                .zip(status)
                .map(|(n, s)| (n.id.clone(), s))
                .collect(),
            outcomes,
            success,
            error,
            elapsed_ms,
        }
    }
}
