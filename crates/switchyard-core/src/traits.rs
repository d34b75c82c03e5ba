use futures::future::BoxFuture;

use crate::error::Result;
use crate::graph::TaskGraph;
use crate::record::ExecutionRecord;
use crate::types::{AuthorizationDecision, NodeRequest, PlanRequest, PolicyKnowledge};

/// Planning model: proposes a task structure as raw text (usually JSON).
pub trait PlanProposer: Send + Sync + 'static {
    fn propose(&self, request: &PlanRequest) -> BoxFuture<'_, Result<String>>;
}

/// Authorization service consulted by the permission check.
pub trait Authorizer: Send + Sync + 'static {
    fn authorize(
        &self,
        subject: &str,
        graph: &TaskGraph,
    ) -> BoxFuture<'_, Result<AuthorizationDecision>>;
}

/// Knowledge retrieval for policy snippets relevant to a query.
pub trait KnowledgeRetriever: Send + Sync + 'static {
    fn retrieve(&self, query: &str, limit: usize) -> BoxFuture<'_, Result<Vec<PolicyKnowledge>>>;
}

/// Agent runtime: performs the business logic of one node.
///
/// `Ok(None)` means the agent produced nothing and counts as a failure.
pub trait AgentDispatcher: Send + Sync + 'static {
    fn dispatch(&self, request: NodeRequest) -> BoxFuture<'_, Result<Option<serde_json::Value>>>;
}

/// Storage for finished runs.
pub trait ExecutionStore: Send + Sync + 'static {
    fn save(&self, record: &ExecutionRecord) -> BoxFuture<'_, Result<()>>;
}
