use serde::{Deserialize, Serialize};
use tracing::debug;

use switchyard_core::config::DecisionConfig;
use switchyard_core::types::{CandidateMatch, RiskLevel};

/// How much the caller is willing to spend.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CostCeiling {
    Low,
    Medium,
    #[default]
    High,
}

impl CostCeiling {
    /// Minimum cost sub-score a candidate needs under this ceiling.
    pub fn min_cost_score(self, config: &DecisionConfig) -> Option<f64> {
        match self {
            Self::Low => Some(config.low_cost_min),
            Self::Medium => Some(config.medium_cost_min),
            Self::High => None,
        }
    }
}

/// Per-request constraints on candidate selection.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct DecisionContext {
    /// Candidates labelled above this risk are dropped. Unset: no risk filter.
    #[serde(default)]
    pub max_risk: Option<RiskLevel>,
    #[serde(default)]
    pub cost_ceiling: CostCeiling,
    /// Agent the caller insists on.
    #[serde(default)]
    pub forced_agent: Option<String>,
    /// Extension of the file being worked on, matched against `extension_overrides`.
    #[serde(default)]
    pub file_extension: Option<String>,
}

impl DecisionContext {
    pub fn with_max_risk(mut self, risk: RiskLevel) -> Self {
        self.max_risk = Some(risk);
        self
    }

    pub fn with_cost_ceiling(mut self, ceiling: CostCeiling) -> Self {
        self.cost_ceiling = ceiling;
        self
    }

    pub fn forcing(mut self, agent: impl Into<String>) -> Self {
        self.forced_agent = Some(agent.into());
        self
    }

    pub fn with_file_extension(mut self, ext: impl Into<String>) -> Self {
        self.file_extension = Some(ext.into());
        self
    }
}

/// Drop banned candidates, candidates riskier than allowed, and candidates
/// too expensive for the cost ceiling. Order is preserved.
pub fn apply_hard_filters(
    candidates: &[CandidateMatch],
    ctx: &DecisionContext,
    config: &DecisionConfig,
) -> Vec<CandidateMatch> {
    let min_cost = ctx.cost_ceiling.min_cost_score(config);
    candidates
        .iter()
        .filter(|c| {
            if config.banned.iter().any(|b| b == &c.id) {
                debug!(candidate = %c.id, "Dropped banned candidate");
                return false;
            }
            if let (Some(max), Some(label)) = (ctx.max_risk, c.risk_label()) {
                if label > max {
                    debug!(
                        candidate = %c.id,
                        risk = %label,
                        "Dropped candidate above risk ceiling"
                    );
                    return false;
                }
            }
            if let Some(min) = min_cost {
                if c.scores.cost < min {
                    debug!(
                        candidate = %c.id,
                        cost = c.scores.cost,
                        "Dropped candidate above cost ceiling"
                    );
                    return false;
                }
            }
            true
        })
        .cloned()
        .collect()
}
