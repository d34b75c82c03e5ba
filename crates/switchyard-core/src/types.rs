use std::collections::{HashMap, HashSet};
use std::fmt;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Unique identifier for one routed run.
#[derive(Debug, Clone, Hash, Eq, PartialEq, Serialize, Deserialize)]
pub struct RunId(pub String);

impl RunId {
    pub fn new() -> Self {
        Self(Uuid::new_v4().to_string())
    }

    pub fn from_str(s: &str) -> Self {
        Self(s.to_string())
    }
}

impl Default for RunId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for RunId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Severity shared by risk assessment, rule labels and candidate metadata.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RiskLevel {
    #[default]
    Low,
    #[serde(alias = "medium")]
    Mid,
    High,
}

impl fmt::Display for RiskLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Low => write!(f, "low"),
            Self::Mid => write!(f, "mid"),
            Self::High => write!(f, "high"),
        }
    }
}

impl std::str::FromStr for RiskLevel {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "low" => Ok(Self::Low),
            "mid" | "medium" => Ok(Self::Mid),
            "high" => Ok(Self::High),
            other => Err(format!("unknown risk level: {}", other)),
        }
    }
}

/// How the user phrased the request.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Modality {
    #[default]
    Instruction,
    Question,
    Conversation,
    Command,
}

/// Output of the upstream semantic-understanding step.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SemanticSignal {
    #[serde(default)]
    pub topics: Vec<String>,
    #[serde(default)]
    pub entities: Vec<String>,
    #[serde(default)]
    pub action_signals: Vec<String>,
    #[serde(default)]
    pub modality: Modality,
    /// Classifier confidence, 0.0 to 1.0.
    #[serde(default)]
    pub certainty: f64,
}

impl SemanticSignal {
    pub fn with_actions(mut self, actions: Vec<String>) -> Self {
        self.action_signals = actions;
        self
    }

    pub fn with_topics(mut self, topics: Vec<String>) -> Self {
        self.topics = topics;
        self
    }
}

/// Kind of an execution candidate.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CandidateKind {
    Agent,
    Tool,
    Model,
}

impl fmt::Display for CandidateKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Agent => write!(f, "agent"),
            Self::Tool => write!(f, "tool"),
            Self::Model => write!(f, "model"),
        }
    }
}

/// The five independent sub-scores of a candidate, each in 0.0..=1.0.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct SubScores {
    #[serde(default)]
    pub capability: f64,
    /// Higher is cheaper.
    #[serde(default)]
    pub cost: f64,
    /// Higher is faster.
    #[serde(default)]
    pub latency: f64,
    #[serde(default)]
    pub success: f64,
    #[serde(default)]
    pub stability: f64,
}

/// Weights used to fold sub-scores into a total score.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ScoreWeights {
    #[serde(default = "default_capability_weight")]
    pub capability: f64,
    #[serde(default = "default_cost_weight")]
    pub cost: f64,
    #[serde(default = "default_latency_weight")]
    pub latency: f64,
    #[serde(default = "default_success_weight")]
    pub success: f64,
    #[serde(default = "default_stability_weight")]
    pub stability: f64,
}

fn default_capability_weight() -> f64 { 0.4 }
fn default_cost_weight() -> f64 { 0.15 }
fn default_latency_weight() -> f64 { 0.15 }
fn default_success_weight() -> f64 { 0.2 }
fn default_stability_weight() -> f64 { 0.1 }

impl Default for ScoreWeights {
    fn default() -> Self {
        Self {
            capability: default_capability_weight(),
            cost: default_cost_weight(),
            latency: default_latency_weight(),
            success: default_success_weight(),
            stability: default_stability_weight(),
        }
    }
}

impl ScoreWeights {
    /// Weighted mean of the sub-scores, normalized by the weight sum.
    pub fn total(&self, s: &SubScores) -> f64 {
        let sum = self.capability + self.cost + self.latency + self.success + self.stability;
        if sum <= 0.0 {
            return 0.0;
        }
        let raw = s.capability * self.capability
            + s.cost * self.cost
            + s.latency * self.latency
            + s.success * self.success
            + s.stability * self.stability;
        (raw / sum).clamp(0.0, 1.0)
    }
}

/// A scored agent, tool, or model from the capability-retrieval collaborator.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CandidateMatch {
    pub id: String,
    pub kind: CandidateKind,
    #[serde(default)]
    pub scores: SubScores,
    #[serde(default)]
    pub total_score: f64,
    /// Capabilities this candidate can fulfil (agents only).
    #[serde(default)]
    pub capabilities: Vec<String>,
    /// Free-form metadata; `risk` carries the candidate's risk label.
    #[serde(default)]
    pub metadata: HashMap<String, serde_json::Value>,
}

impl CandidateMatch {
    /// Build a candidate whose total is derived from the sub-scores.
    pub fn scored(
        id: impl Into<String>,
        kind: CandidateKind,
        scores: SubScores,
        weights: &ScoreWeights,
    ) -> Self {
        Self {
            id: id.into(),
            kind,
            total_score: weights.total(&scores),
            scores,
            capabilities: vec![],
            metadata: HashMap::new(),
        }
    }

    /// Build a candidate with an explicit total score.
    pub fn with_total(id: impl Into<String>, kind: CandidateKind, total_score: f64) -> Self {
        Self {
            id: id.into(),
            kind,
            scores: SubScores::default(),
            total_score,
            capabilities: vec![],
            metadata: HashMap::new(),
        }
    }

    pub fn agent(id: impl Into<String>, total_score: f64) -> Self {
        Self::with_total(id, CandidateKind::Agent, total_score)
    }

    pub fn tool(id: impl Into<String>, total_score: f64) -> Self {
        Self::with_total(id, CandidateKind::Tool, total_score)
    }

    pub fn model(id: impl Into<String>, total_score: f64) -> Self {
        Self::with_total(id, CandidateKind::Model, total_score)
    }

    pub fn with_capabilities(mut self, caps: Vec<String>) -> Self {
        self.capabilities = caps;
        self
    }

    pub fn with_cost(mut self, cost: f64) -> Self {
        self.scores.cost = cost;
        self
    }

    pub fn with_risk(mut self, risk: RiskLevel) -> Self {
        self.metadata
            .insert("risk".into(), serde_json::Value::String(risk.to_string()));
        self
    }

    /// Declared risk label, if any. Unparseable labels are treated as absent.
    pub fn risk_label(&self) -> Option<RiskLevel> {
        self.metadata
            .get("risk")
            .and_then(|v| v.as_str())
            .and_then(|s| s.parse().ok())
    }

    pub fn offers(&self, capability: &str) -> bool {
        self.capabilities.iter().any(|c| c == capability)
    }
}

/// All candidates retrieved for one query.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CandidatePool {
    #[serde(default)]
    pub agents: Vec<CandidateMatch>,
    #[serde(default)]
    pub tools: Vec<CandidateMatch>,
    #[serde(default)]
    pub models: Vec<CandidateMatch>,
}

impl CandidatePool {
    pub fn is_empty(&self) -> bool {
        self.agents.is_empty() && self.tools.is_empty() && self.models.is_empty()
    }

    /// `(agent, capability)` pairs a plan is allowed to reference.
    pub fn whitelist(&self) -> HashSet<(String, String)> {
        self.agents
            .iter()
            .flat_map(|a| a.capabilities.iter().map(move |c| (a.id.clone(), c.clone())))
            .collect()
    }

    pub fn allows(&self, agent: &str, capability: &str) -> bool {
        self.agents
            .iter()
            .any(|a| a.id == agent && a.offers(capability))
    }

    /// Agent candidates that offer a given capability.
    pub fn agents_for(&self, capability: &str) -> Vec<CandidateMatch> {
        self.agents
            .iter()
            .filter(|a| a.offers(capability))
            .cloned()
            .collect()
    }
}

/// A retrieved policy snippet folded into risk scoring.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PolicyKnowledge {
    pub text: String,
    #[serde(default)]
    pub risk: RiskLevel,
    #[serde(default)]
    pub source: Option<String>,
}

/// Answer from the external authorization collaborator.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuthorizationDecision {
    pub allowed: bool,
    #[serde(default)]
    pub reason: Option<String>,
}

impl AuthorizationDecision {
    pub fn allow() -> Self {
        Self {
            allowed: true,
            reason: None,
        }
    }

    pub fn deny(reason: impl Into<String>) -> Self {
        Self {
            allowed: false,
            reason: Some(reason.into()),
        }
    }
}

/// Input handed to a plan proposer.
#[derive(Debug, Clone, Serialize)]
pub struct PlanRequest {
    pub query: String,
    pub signal: SemanticSignal,
    /// `(agent, capability)` pairs the proposer may use.
    pub allowed: Vec<(String, String)>,
}

/// Everything an agent runtime needs to run one node.
#[derive(Debug, Clone, Serialize)]
pub struct NodeRequest {
    pub run_id: RunId,
    pub node_id: String,
    pub agent: String,
    pub capability: String,
    pub description: Option<String>,
    /// Caller-supplied run context.
    pub context: serde_json::Value,
    /// Outputs of the node's direct dependencies, keyed by node id.
    pub upstream: HashMap<String, serde_json::Value>,
}
