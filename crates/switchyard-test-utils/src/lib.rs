use std::collections::HashSet;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;
use std::time::Duration;

use futures::future::BoxFuture;
use serde_json::json;

use switchyard_core::error::{Result, SwitchyardError};
use switchyard_core::graph::{TaskGraph, TaskNode};
use switchyard_core::record::ExecutionRecord;
use switchyard_core::traits::{
    AgentDispatcher, Authorizer, ExecutionStore, KnowledgeRetriever, PlanProposer,
};
use switchyard_core::types::{
    AuthorizationDecision, CandidateMatch, CandidatePool, NodeRequest, PlanRequest,
    PolicyKnowledge,
};

// ---------------------------------------------------------------------------
// Proposers
// ---------------------------------------------------------------------------

/// Always proposes the same raw text.
pub struct StaticProposer {
    raw: String,
}

impl StaticProposer {
    pub fn new(raw: &str) -> Self {
        Self {
            raw: raw.to_string(),
        }
    }

    /// Propose exactly this graph.
    pub fn graph(graph: &TaskGraph) -> Self {
        Self {
            raw: graph.to_value().to_string(),
        }
    }
}

impl PlanProposer for StaticProposer {
    fn propose(&self, _request: &PlanRequest) -> BoxFuture<'_, Result<String>> {
        Box::pin(async move { Ok(self.raw.clone()) })
    }
}

/// Proposer whose backing model is down.
pub struct FailingProposer;

impl PlanProposer for FailingProposer {
    fn propose(&self, _request: &PlanRequest) -> BoxFuture<'_, Result<String>> {
        Box::pin(async { Err(SwitchyardError::upstream("planner", "model endpoint unreachable")) })
    }
}

// ---------------------------------------------------------------------------
// Authorization and knowledge
// ---------------------------------------------------------------------------

/// Authorizer with a fixed answer, or an outage.
pub enum MockAuthorizer {
    Allow,
    Deny(String),
    /// Deny any graph that puts a node on this agent.
    DenyAgent(String),
    Unavailable,
}

impl Authorizer for MockAuthorizer {
    fn authorize(
        &self,
        _subject: &str,
        graph: &TaskGraph,
    ) -> BoxFuture<'_, Result<AuthorizationDecision>> {
        let agents: Vec<String> = graph.nodes.iter().map(|n| n.agent.clone()).collect();
        Box::pin(async move {
            match self {
                Self::Allow => Ok(AuthorizationDecision::allow()),
                Self::Deny(reason) => Ok(AuthorizationDecision::deny(reason.clone())),
                Self::DenyAgent(agent) if agents.contains(agent) => Ok(
                    AuthorizationDecision::deny(format!("agent {} is not permitted", agent)),
                ),
                Self::DenyAgent(_) => Ok(AuthorizationDecision::allow()),
                Self::Unavailable => Err(SwitchyardError::upstream("authz", "connection refused")),
            }
        })
    }
}

/// Knowledge retriever returning canned snippets, or an outage when `None`.
pub struct MockKnowledge {
    snippets: Option<Vec<PolicyKnowledge>>,
}

impl MockKnowledge {
    pub fn new(snippets: Vec<PolicyKnowledge>) -> Self {
        Self {
            snippets: Some(snippets),
        }
    }

    pub fn unavailable() -> Self {
        Self { snippets: None }
    }
}

impl KnowledgeRetriever for MockKnowledge {
    fn retrieve(&self, _query: &str, limit: usize) -> BoxFuture<'_, Result<Vec<PolicyKnowledge>>> {
        Box::pin(async move {
            match &self.snippets {
                Some(s) => Ok(s.iter().take(limit).cloned().collect()),
                None => Err(SwitchyardError::upstream("knowledge", "index offline")),
            }
        })
    }
}

// ---------------------------------------------------------------------------
// Dispatchers
// ---------------------------------------------------------------------------

/// Dispatcher with scripted per-node behaviour.
///
/// Nodes in `fail` return an error, nodes in `empty` return `Ok(None)`,
/// everything else echoes its request. Tracks the peak number of nodes in
/// flight and the order in which nodes started.
#[derive(Default)]
pub struct ScriptedDispatcher {
    fail: HashSet<String>,
    empty: HashSet<String>,
    hang: HashSet<String>,
    delay: Duration,
    in_flight: AtomicUsize,
    peak: AtomicUsize,
    started: Mutex<Vec<String>>,
}

impl ScriptedDispatcher {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn failing(mut self, ids: &[&str]) -> Self {
        self.fail.extend(ids.iter().map(|s| s.to_string()));
        self
    }

    pub fn empty_for(mut self, ids: &[&str]) -> Self {
        self.empty.extend(ids.iter().map(|s| s.to_string()));
        self
    }

    /// Nodes that sleep for an hour.
    pub fn hanging(mut self, ids: &[&str]) -> Self {
        self.hang.extend(ids.iter().map(|s| s.to_string()));
        self
    }

    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }

    pub fn peak_in_flight(&self) -> usize {
        self.peak.load(Ordering::SeqCst)
    }

    pub fn started(&self) -> Vec<String> {
        self.started.lock().map(|s| s.clone()).unwrap_or_default()
    }
}

impl AgentDispatcher for ScriptedDispatcher {
    fn dispatch(&self, request: NodeRequest) -> BoxFuture<'_, Result<Option<serde_json::Value>>> {
        Box::pin(async move {
            if let Ok(mut started) = self.started.lock() {
                started.push(request.node_id.clone());
            }
            let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
            self.peak.fetch_max(now, Ordering::SeqCst);

            if self.hang.contains(&request.node_id) {
                tokio::time::sleep(Duration::from_secs(3600)).await;
            } else if !self.delay.is_zero() {
                tokio::time::sleep(self.delay).await;
            }
            self.in_flight.fetch_sub(1, Ordering::SeqCst);

            if self.fail.contains(&request.node_id) {
                return Err(SwitchyardError::NodeFailure {
                    node: request.node_id,
                    message: "scripted failure".into(),
                });
            }
            if self.empty.contains(&request.node_id) {
                return Ok(None);
            }
            Ok(Some(json!({
                "node": request.node_id,
                "agent": request.agent,
                "capability": request.capability,
                "upstream": request.upstream.keys().cloned().collect::<Vec<_>>(),
            })))
        })
    }
}

// ---------------------------------------------------------------------------
// Store
// ---------------------------------------------------------------------------

/// In-memory execution store.
#[derive(Default)]
pub struct MemoryStore {
    records: Mutex<Vec<ExecutionRecord>>,
    fail: bool,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn failing() -> Self {
        Self {
            records: Mutex::new(vec![]),
            fail: true,
        }
    }

    pub fn records(&self) -> Vec<ExecutionRecord> {
        self.records.lock().map(|r| r.clone()).unwrap_or_default()
    }
}

impl ExecutionStore for MemoryStore {
    fn save(&self, record: &ExecutionRecord) -> BoxFuture<'_, Result<()>> {
        let record = record.clone();
        Box::pin(async move {
            if self.fail {
                return Err(SwitchyardError::upstream("store", "disk full"));
            }
            if let Ok(mut records) = self.records.lock() {
                records.push(record);
            }
            Ok(())
        })
    }
}

// ---------------------------------------------------------------------------
// Fixtures
// ---------------------------------------------------------------------------

/// `{T1: []; T2: [T1]; T3: [T2]}`
pub fn chain_graph() -> TaskGraph {
    TaskGraph::new(vec![
        TaskNode::new("T1", "read", "fs"),
        TaskNode::new("T2", "convert", "conv").after(&["T1"]),
        TaskNode::new("T3", "write", "fs").after(&["T2"]),
    ])
}

/// `{T1: []; T2: []}`
pub fn parallel_graph() -> TaskGraph {
    TaskGraph::new(vec![
        TaskNode::new("T1", "read", "fs"),
        TaskNode::new("T2", "convert", "conv"),
    ])
}

/// `n` independent nodes using the same capability.
pub fn wide_graph(n: usize, capability: &str) -> TaskGraph {
    TaskGraph::new(
        (0..n)
            .map(|i| TaskNode::new(format!("t{}", i), capability, "fs"))
            .collect(),
    )
}

/// A pool whitelisting every `(agent, capability)` pair used by `graph`.
pub fn pool_for(graph: &TaskGraph) -> CandidatePool {
    let mut agents: Vec<CandidateMatch> = Vec::new();
    for node in &graph.nodes {
        match agents.iter_mut().find(|a| a.id == node.agent) {
            Some(agent) => {
                if !agent.offers(&node.capability) {
                    agent.capabilities.push(node.capability.clone());
                }
            }
            None => agents.push(
                CandidateMatch::agent(node.agent.clone(), 0.8)
                    .with_capabilities(vec![node.capability.clone()]),
            ),
        }
    }
    CandidatePool {
        agents,
        ..Default::default()
    }
}
