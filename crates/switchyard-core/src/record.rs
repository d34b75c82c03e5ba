use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::types::RunId;

/// Lifecycle of a node during execution.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum NodeStatus {
    Pending,
    Running,
    Completed,
    Failed,
}

impl std::fmt::Display for NodeStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Pending => write!(f, "pending"),
            Self::Running => write!(f, "running"),
            Self::Completed => write!(f, "completed"),
            Self::Failed => write!(f, "failed"),
        }
    }
}

/// Result of one dispatched node.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TaskOutcome {
    pub node_id: String,
    pub agent: String,
    pub capability: String,
    pub status: NodeStatus,
    #[serde(default)]
    pub output: Option<serde_json::Value>,
    #[serde(default)]
    pub error: Option<String>,
    pub elapsed_ms: u64,
    /// Zero-based wave in which the node ran.
    pub wave: usize,
}

/// Summary of a run, handed to an external store.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExecutionRecord {
    pub run_id: RunId,
    #[serde(default)]
    pub trace_id: Option<String>,
    pub intent: String,
    pub task_count: usize,
    pub success: bool,
    pub results: Vec<TaskOutcome>,
    pub latency_ms: u64,
    pub finished_at: DateTime<Utc>,
}

impl ExecutionRecord {
    pub fn completed_count(&self) -> usize {
        self.results
            .iter()
            .filter(|r| r.status == NodeStatus::Completed)
            .count()
    }
}
