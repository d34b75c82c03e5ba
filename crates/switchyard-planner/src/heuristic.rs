use futures::future::BoxFuture;
use serde_json::json;

use switchyard_core::error::Result;
use switchyard_core::traits::PlanProposer;
use switchyard_core::types::PlanRequest;

/// Offline proposer that needs no planning model.
///
/// Each action signal (or topic, when there are no actions) is matched
/// against the allowed capabilities; matches are chained in signal order so
/// every step depends on the previous one. Allowed pairs are expected
/// best-agent-first, so the first pair offering a capability wins.
#[derive(Debug, Clone, Default)]
pub struct HeuristicProposer;

impl HeuristicProposer {
    pub fn new() -> Self {
        Self
    }

    fn build(request: &PlanRequest) -> serde_json::Value {
        let cues: &[String] = if request.signal.action_signals.is_empty() {
            &request.signal.topics
        } else {
            &request.signal.action_signals
        };

        let mut tasks = Vec::new();
        let mut used: Vec<&str> = Vec::new();
        for cue in cues {
            let cue = normalize(cue);
            if cue.is_empty() {
                continue;
            }
            let hit = request.allowed.iter().find(|(_, cap)| {
                let cap_norm = normalize(cap);
                !used.contains(&cap.as_str())
                    && (cap_norm.contains(&cue) || cue.contains(&cap_norm))
            });
            if let Some((agent, capability)) = hit {
                let id = format!("t{}", tasks.len() + 1);
                let depends_on: Vec<String> = if tasks.is_empty() {
                    vec![]
                } else {
                    vec![format!("t{}", tasks.len())]
                };
                tasks.push(json!({
                    "id": id,
                    "capability": capability,
                    "agent": agent,
                    "depends_on": depends_on,
                    "description": format!("{} ({})", capability, request.query),
                }));
                used.push(capability.as_str());
            }
        }

        json!({
            "reasoning": format!(
                "matched {} of {} signals against {} allowed capabilities",
                tasks.len(),
                cues.len(),
                request.allowed.len()
            ),
            "tasks": tasks,
        })
    }
}

fn normalize(s: &str) -> String {
    s.trim().to_lowercase().replace(['-', ' '], "_")
}

impl PlanProposer for HeuristicProposer {
    fn propose(&self, request: &PlanRequest) -> BoxFuture<'_, Result<String>> {
        let plan = Self::build(request).to_string();
        Box::pin(async move { Ok(plan) })
    }
}
