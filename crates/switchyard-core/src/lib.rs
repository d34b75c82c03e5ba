pub mod config;
pub mod error;
pub mod event;
pub mod graph;
pub mod policy;
pub mod record;
pub mod traits;
pub mod types;

pub use config::AppConfig;
pub use error::{DagIssue, Result, SwitchyardError};
pub use event::{EventBus, OrchestrationEvent};
pub use graph::{TaskGraph, TaskNode};
pub use policy::{Condition, Operator, PolicyRule, RuleAction, RuleCategory};
pub use record::{ExecutionRecord, NodeStatus, TaskOutcome};
pub use types::*;
