use std::fmt;

use thiserror::Error;

#[derive(Debug, Error)]
pub enum SwitchyardError {
    // Planning errors
    #[error("Structural DAG error: {}", join_issues(.0))]
    StructuralDag(Vec<DagIssue>),

    #[error("Plan parse error: {0}")]
    PlanParse(String),

    // Policy outcomes surfaced as errors at the CLI boundary
    #[error("Policy denied: {0}")]
    PolicyDenied(String),

    #[error("Confirmation required: {0}")]
    ConfirmationRequired(String),

    // Execution errors
    #[error("Node {node} failed: {message}")]
    NodeFailure { node: String, message: String },

    #[error("Node {node} timed out after {timeout_secs}s")]
    NodeTimeout { node: String, timeout_secs: u64 },

    #[error("Run cancelled")]
    Cancelled,

    // Collaborator errors
    #[error("Upstream unavailable: {service}: {message}")]
    UpstreamUnavailable { service: String, message: String },

    // Config errors
    #[error("Config error: {0}")]
    Config(String),

    #[error("Config file not found: {0}")]
    ConfigNotFound(String),

    // I/O errors
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    // JSON errors
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl SwitchyardError {
    /// Shorthand for a collaborator outage.
    pub fn upstream(service: impl Into<String>, message: impl fmt::Display) -> Self {
        Self::UpstreamUnavailable {
            service: service.into(),
            message: message.to_string(),
        }
    }
}

pub type Result<T> = std::result::Result<T, SwitchyardError>;

/// A single structural problem found while validating a task graph.
///
/// The `Display` form is the human-readable string reported in validation
/// error lists.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DagIssue {
    EmptyGraph,
    DuplicateId(String),
    MissingDependency { node: String, dependency: String },
    Hallucinated { node: String, agent: String, capability: String },
    Cycle { from: String, to: String },
    EmptyField { node: String, field: &'static str },
    TooLarge { nodes: usize, limit: usize },
}

impl fmt::Display for DagIssue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::EmptyGraph => write!(f, "empty graph: no tasks"),
            Self::DuplicateId(id) => write!(f, "duplicate task id: {}", id),
            Self::MissingDependency { node, dependency } => {
                write!(f, "task {} depends on unknown task {}", node, dependency)
            }
            Self::Hallucinated {
                node,
                agent,
                capability,
            } => write!(
                f,
                "hallucinated capability: task {} uses {}/{} which is not in the candidate pool",
                node, agent, capability
            ),
            Self::Cycle { from, to } => write!(f, "cycle: {} -> {}", from, to),
            Self::EmptyField { node, field } => write!(f, "task {} has empty {}", node, field),
            Self::TooLarge { nodes, limit } => {
                write!(f, "graph has {} tasks, limit is {}", nodes, limit)
            }
        }
    }
}

fn join_issues(issues: &[DagIssue]) -> String {
    issues
        .iter()
        .map(|i| i.to_string())
        .collect::<Vec<_>>()
        .join("; ")
}
