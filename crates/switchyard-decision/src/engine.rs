use serde::Serialize;
use tracing::{debug, info, warn};

use switchyard_core::config::DecisionConfig;
use switchyard_core::types::{CandidateMatch, SemanticSignal};

use crate::filters::{apply_hard_filters, DecisionContext};

/// Final selection for one decision cycle.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DecisionResult {
    pub agent: Option<String>,
    pub tools: Vec<String>,
    pub model: Option<String>,
    /// Mean score of whatever was chosen.
    pub score: f64,
    /// Agent and tools were dropped because confidence was too low.
    pub fallback_used: bool,
    pub reasoning: String,
}

/// Filters, ranks and selects candidates. Holds only configuration, so every
/// call with the same inputs gives the same result.
#[derive(Debug, Clone, Default)]
pub struct DecisionEngine {
    config: DecisionConfig,
}

impl DecisionEngine {
    pub fn new(config: DecisionConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &DecisionConfig {
        &self.config
    }

    pub fn decide(
        &self,
        signal: &SemanticSignal,
        agents: &[CandidateMatch],
        tools: &[CandidateMatch],
        models: &[CandidateMatch],
        ctx: &DecisionContext,
    ) -> DecisionResult {
        let cfg = &self.config;
        let mut notes: Vec<String> = Vec::new();

        let mut agent_pool = apply_hard_filters(agents, ctx, cfg);
        let tool_pool = apply_hard_filters(tools, ctx, cfg);
        let model_pool = apply_hard_filters(models, ctx, cfg);
        let dropped = (agents.len() - agent_pool.len())
            + (tools.len() - tool_pool.len())
            + (models.len() - model_pool.len());
        if dropped > 0 {
            notes.push(format!("{} candidates removed by hard filters", dropped));
        }

        if let Some(forced) = self.override_agent(agents, ctx, &mut notes) {
            agent_pool.retain(|c| c.id != forced.id);
            agent_pool.insert(0, forced);
        }

        // Agent
        let agent = best(&agent_pool).filter(|a| a.total_score >= cfg.agent_floor);
        match (agent, best(&agent_pool)) {
            (Some(a), _) => notes.push(format!("agent {} ({:.2})", a.id, a.total_score)),
            (None, Some(top)) => notes.push(format!(
                "best agent {} scored {:.2}, below floor {:.2}",
                top.id, top.total_score, cfg.agent_floor
            )),
            (None, None) => notes.push("no agent candidates".into()),
        }

        // Tools
        let mut ranked_tools: Vec<&CandidateMatch> = tool_pool
            .iter()
            .filter(|t| t.total_score >= cfg.tool_floor)
            .collect();
        ranked_tools.sort_by(|a, b| {
            b.total_score
                .partial_cmp(&a.total_score)
                .unwrap_or(std::cmp::Ordering::Equal)
        });
        ranked_tools.truncate(cfg.max_tools);
        if !ranked_tools.is_empty() {
            let names: Vec<&str> = ranked_tools.iter().map(|t| t.id.as_str()).collect();
            notes.push(format!("tools {}", names.join(", ")));
        }

        // Model
        let model = best(&model_pool);
        if let Some(m) = model {
            notes.push(format!("model {} ({:.2})", m.id, m.total_score));
        }

        // Aggregate
        let mut components: Vec<f64> = Vec::new();
        if let Some(a) = agent {
            components.push(a.total_score);
        }
        if !ranked_tools.is_empty() {
            let sum: f64 = ranked_tools.iter().map(|t| t.total_score).sum();
            components.push(sum / ranked_tools.len() as f64);
        }
        if let Some(m) = model {
            components.push(m.total_score);
        }
        let score = if components.is_empty() {
            cfg.neutral_score
        } else {
            components.iter().sum::<f64>() / components.len() as f64
        };

        let mut result = DecisionResult {
            agent: agent.map(|a| a.id.clone()),
            tools: ranked_tools.iter().map(|t| t.id.clone()).collect(),
            model: model.map(|m| m.id.clone()),
            score,
            fallback_used: false,
            reasoning: String::new(),
        };

        if score < cfg.fallback_threshold {
            info!(
                score,
                threshold = cfg.fallback_threshold,
                "Low-confidence decision, falling back to model-only answer"
            );
            notes.push(format!(
                "aggregate {:.2} below {:.2}, answering with the model only",
                score, cfg.fallback_threshold
            ));
            result.agent = None;
            result.tools.clear();
            result.fallback_used = true;
        }

        if !signal.topics.is_empty() {
            notes.push(format!("topics: {}", signal.topics.join(", ")));
        }
        result.reasoning = notes.join("; ");
        debug!(agent = ?result.agent, score = result.score, "Decision made");
        result
    }

    /// Resolve a forced agent (explicit, or by file extension). Only agents
    /// present among the retrieved candidates and not banned qualify.
    fn override_agent(
        &self,
        agents: &[CandidateMatch],
        ctx: &DecisionContext,
        notes: &mut Vec<String>,
    ) -> Option<CandidateMatch> {
        let cfg = &self.config;
        let (wanted, source) = match (&ctx.forced_agent, &ctx.file_extension) {
            (Some(agent), _) => (agent.clone(), "caller".to_string()),
            (None, Some(ext)) => {
                let ext = ext.trim().trim_start_matches('.').to_lowercase();
                let agent = cfg.extension_overrides.get(&ext)?;
                (agent.clone(), format!("extension .{}", ext))
            }
            (None, None) => return None,
        };

        if cfg.banned.contains(&wanted) {
            warn!(agent = %wanted, "Override names a banned agent, ignoring");
            notes.push(format!("override {} ignored: banned", wanted));
            return None;
        }
        let Some(found) = agents.iter().find(|a| a.id == wanted) else {
            warn!(agent = %wanted, "Override names an agent that was not retrieved, ignoring");
            notes.push(format!("override {} ignored: not a retrieved candidate", wanted));
            return None;
        };

        debug!(agent = %wanted, source = %source, "Deterministic agent override");
        notes.push(format!("override {} from {}", wanted, source));
        let mut forced = found.clone();
        forced.total_score = cfg.override_score;
        Some(forced)
    }
}

/// Highest total score; the earliest candidate wins ties.
fn best(candidates: &[CandidateMatch]) -> Option<&CandidateMatch> {
    candidates.iter().fold(None, |acc: Option<&CandidateMatch>, c| match acc {
        Some(b) if b.total_score >= c.total_score => Some(b),
        _ => Some(c),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use switchyard_core::types::RiskLevel;

    fn engine() -> DecisionEngine {
        DecisionEngine::default()
    }

    fn signal() -> SemanticSignal {
        SemanticSignal::default()
    }

    fn ctx() -> DecisionContext {
        DecisionContext::default()
    }

    #[test]
    fn agents_below_floor_are_not_chosen() {
        let agents = vec![
            CandidateMatch::agent("a", 0.3),
            CandidateMatch::agent("b", 0.49),
        ];
        let result = engine().decide(&signal(), &agents, &[], &[], &ctx());
        assert_eq!(result.agent, None);
        assert!(!result.fallback_used);
        assert_eq!(result.score, 0.5);
    }

    #[test]
    fn agent_at_exactly_floor_is_chosen() {
        let agents = vec![CandidateMatch::agent("edge", 0.5)];
        let result = engine().decide(&signal(), &agents, &[], &[], &ctx());
        assert_eq!(result.agent.as_deref(), Some("edge"));
        assert!(!result.fallback_used);
    }

    #[test]
    fn ties_go_to_first_candidate() {
        let agents = vec![
            CandidateMatch::agent("first", 0.8),
            CandidateMatch::agent("second", 0.8),
        ];
        let result = engine().decide(&signal(), &agents, &[], &[], &ctx());
        assert_eq!(result.agent.as_deref(), Some("first"));
    }

    #[test]
    fn tools_are_capped_and_floored() {
        let tools = vec![
            CandidateMatch::tool("t1", 0.55),
            CandidateMatch::tool("t2", 0.9),
            CandidateMatch::tool("t3", 0.4),
            CandidateMatch::tool("t4", 0.7),
            CandidateMatch::tool("t5", 0.6),
        ];
        let result = engine().decide(&signal(), &[], &tools, &[], &ctx());
        assert_eq!(result.tools, vec!["t2", "t4", "t5"]);
    }

    #[test]
    fn model_has_no_floor_and_triggers_fallback() {
        let agents = vec![CandidateMatch::agent("doc", 0.6)];
        let tools = vec![CandidateMatch::tool("grep", 0.5)];
        let models = vec![CandidateMatch::model("small", 0.1)];
        let result = engine().decide(&signal(), &agents, &tools, &models, &ctx());
        // (0.6 + 0.5 + 0.1) / 3 = 0.4
        assert!(result.fallback_used);
        assert_eq!(result.agent, None);
        assert!(result.tools.is_empty());
        assert_eq!(result.model.as_deref(), Some("small"));
        assert!((result.score - 0.4).abs() < 1e-9);
    }

    #[test]
    fn aggregate_is_mean_of_chosen() {
        let agents = vec![CandidateMatch::agent("doc", 0.9)];
        let tools = vec![CandidateMatch::tool("a", 0.6), CandidateMatch::tool("b", 0.8)];
        let models = vec![CandidateMatch::model("big", 0.7)];
        let result = engine().decide(&signal(), &agents, &tools, &models, &ctx());
        assert!(!result.fallback_used);
        assert!((result.score - (0.9 + 0.7 + 0.7) / 3.0).abs() < 1e-9);
    }

    #[test]
    fn forced_agent_bypasses_risk_filter() {
        let agents = vec![
            CandidateMatch::agent("safe", 0.8),
            CandidateMatch::agent("special", 0.2).with_risk(RiskLevel::High),
        ];
        let ctx = ctx().with_max_risk(RiskLevel::Low).forcing("special");
        let result = engine().decide(&signal(), &agents, &[], &[], &ctx);
        assert_eq!(result.agent.as_deref(), Some("special"));
        assert!((result.score - 0.99).abs() < 1e-9);
        assert!(result.reasoning.contains("override special from caller"));
    }

    #[test]
    fn override_must_name_a_retrieved_agent() {
        let agents = vec![CandidateMatch::agent("safe", 0.8)];
        let result = engine().decide(&signal(), &agents, &[], &[], &ctx().forcing("ghost"));
        assert_eq!(result.agent.as_deref(), Some("safe"));
        assert!(result.reasoning.contains("override ghost ignored"));
    }

    #[test]
    fn banned_agent_cannot_be_forced() {
        let engine = DecisionEngine::new(DecisionConfig {
            banned: vec!["old".into()],
            ..Default::default()
        });
        let agents = vec![CandidateMatch::agent("old", 0.9)];
        let result = engine.decide(&signal(), &agents, &[], &[], &ctx().forcing("old"));
        assert_eq!(result.agent, None);
    }

    #[test]
    fn extension_override() {
        let mut config = DecisionConfig::default();
        config
            .extension_overrides
            .insert("docx".into(), "doc-agent".into());
        let agents = vec![
            CandidateMatch::agent("generic", 0.9),
            CandidateMatch::agent("doc-agent", 0.3),
        ];
        let result = DecisionEngine::new(config).decide(
            &signal(),
            &agents,
            &[],
            &[],
            &ctx().with_file_extension(".DOCX"),
        );
        assert_eq!(result.agent.as_deref(), Some("doc-agent"));
    }

    #[test]
    fn decide_is_deterministic() {
        let agents = vec![
            CandidateMatch::agent("a", 0.7),
            CandidateMatch::agent("b", 0.75),
        ];
        let tools = vec![CandidateMatch::tool("t", 0.8)];
        let models = vec![CandidateMatch::model("m", 0.6)];
        let first = engine().decide(&signal(), &agents, &tools, &models, &ctx());
        let second = engine().decide(&signal(), &agents, &tools, &models, &ctx());
        assert_eq!(first, second);
    }
}
