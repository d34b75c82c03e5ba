use std::collections::HashMap;

use serde::{Deserialize, Serialize};

use crate::error::{Result, SwitchyardError};

/// A single capability invocation in the graph.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TaskNode {
    /// Unique within its graph.
    #[serde(alias = "task_id")]
    pub id: String,
    pub capability: String,
    /// Agent identifier that will run this node.
    pub agent: String,
    /// Ids of nodes that must complete first.
    #[serde(default, alias = "dependencies")]
    pub depends_on: Vec<String>,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub metadata: HashMap<String, serde_json::Value>,
}

impl TaskNode {
    pub fn new(
        id: impl Into<String>,
        capability: impl Into<String>,
        agent: impl Into<String>,
    ) -> Self {
        Self {
            id: id.into(),
            capability: capability.into(),
            agent: agent.into(),
            depends_on: vec![],
            description: None,
            metadata: HashMap::new(),
        }
    }

    /// Set the dependencies.
    pub fn after(mut self, deps: &[&str]) -> Self {
        self.depends_on = deps.iter().map(|d| d.to_string()).collect();
        self
    }

    /// Set the description.
    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }

    pub fn with_metadata(mut self, key: impl Into<String>, value: serde_json::Value) -> Self {
        self.metadata.insert(key.into(), value);
        self
    }
}

/// Ordered collection of task nodes plus planner reasoning.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TaskGraph {
    #[serde(default, alias = "tasks")]
    pub nodes: Vec<TaskNode>,
    #[serde(default)]
    pub reasoning: Option<String>,
    #[serde(default)]
    pub metadata: HashMap<String, serde_json::Value>,
}

impl TaskGraph {
    pub fn new(nodes: Vec<TaskNode>) -> Self {
        Self {
            nodes,
            reasoning: None,
            metadata: HashMap::new(),
        }
    }

    /// A graph with no nodes and an explanation of why.
    pub fn empty(reasoning: impl Into<String>) -> Self {
        Self {
            nodes: vec![],
            reasoning: Some(reasoning.into()),
            metadata: HashMap::new(),
        }
    }

    pub fn with_reasoning(mut self, reasoning: impl Into<String>) -> Self {
        self.reasoning = Some(reasoning.into());
        self
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    /// Look up a node by id (first match if ids are duplicated).
    pub fn get(&self, id: &str) -> Option<&TaskNode> {
        self.nodes.iter().find(|n| n.id == id)
    }

    pub fn ids(&self) -> impl Iterator<Item = &str> {
        self.nodes.iter().map(|n| n.id.as_str())
    }

    /// Position of each node id in `nodes`. Later duplicates are ignored.
    pub fn index(&self) -> HashMap<&str, usize> {
        let mut index = HashMap::with_capacity(self.nodes.len());
        for (i, node) in self.nodes.iter().enumerate() {
            index.entry(node.id.as_str()).or_insert(i);
        }
        index
    }

    /// Convert an externally supplied value into a canonical graph.
    ///
    /// Accepts `{"nodes": [...]}`, `{"tasks": [...]}` or a bare array of nodes.
    pub fn from_value(value: serde_json::Value) -> Result<Self> {
        match value {
            serde_json::Value::Array(_) => {
                let nodes: Vec<TaskNode> = serde_json::from_value(value)?;
                Ok(Self::new(nodes))
            }
            serde_json::Value::Object(_) => Ok(serde_json::from_value(value)?),
            other => Err(SwitchyardError::PlanParse(format!(
                "expected a task graph object or array, got {}",
                type_name(&other)
            ))),
        }
    }

    pub fn to_value(&self) -> serde_json::Value {
        serde_json::to_value(self).unwrap_or(serde_json::Value::Null)
    }
}

fn type_name(v: &serde_json::Value) -> &'static str {
    match v {
        serde_json::Value::Null => "null",
        serde_json::Value::Bool(_) => "bool",
        serde_json::Value::Number(_) => "number",
        serde_json::Value::String(_) => "string",
        serde_json::Value::Array(_) => "array",
        serde_json::Value::Object(_) => "object",
    }
}
