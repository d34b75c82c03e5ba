use serde::Serialize;

use crate::record::NodeStatus;
use crate::types::{RiskLevel, RunId};

/// Progress and audit events emitted while routing a request.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum OrchestrationEvent {
    PlanReady {
        run_id: RunId,
        task_count: usize,
    },
    PlanRejected {
        run_id: RunId,
        errors: Vec<String>,
    },
    PolicyEvaluated {
        run_id: RunId,
        allowed: bool,
        requires_confirmation: bool,
        risk_level: RiskLevel,
    },
    DecisionMade {
        run_id: RunId,
        agent: Option<String>,
        fallback_used: bool,
    },
    WaveStarted {
        run_id: RunId,
        wave: usize,
        nodes: Vec<String>,
    },
    NodeFinished {
        run_id: RunId,
        node_id: String,
        status: NodeStatus,
        elapsed_ms: u64,
    },
    RunFinished {
        run_id: RunId,
        success: bool,
        elapsed_ms: u64,
    },
}

/// Event bus using tokio broadcast channel.
/// All subscribers receive all events.
pub struct EventBus {
    tx: tokio::sync::broadcast::Sender<OrchestrationEvent>,
}

impl EventBus {
    pub fn new(capacity: usize) -> Self {
        let (tx, _) = tokio::sync::broadcast::channel(capacity);
        Self { tx }
    }

    pub fn publish(&self, event: OrchestrationEvent) {
        // No receivers is fine
        let _ = self.tx.send(event);
    }

    pub fn subscribe(&self) -> tokio::sync::broadcast::Receiver<OrchestrationEvent> {
        self.tx.subscribe()
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new(256)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn subscribers_receive_events() {
        let bus = EventBus::default();
        let mut rx = bus.subscribe();
        bus.publish(OrchestrationEvent::PlanReady {
            run_id: RunId::from_str("r1"),
            task_count: 2,
        });
        match rx.recv().await.unwrap() {
            OrchestrationEvent::PlanReady { task_count, .. } => assert_eq!(task_count, 2),
            other => panic!("unexpected event: {:?}", other),
        }
    }

    #[test]
    fn publish_without_subscribers_is_silent() {
        let bus = EventBus::new(4);
        bus.publish(OrchestrationEvent::RunFinished {
            run_id: RunId::new(),
            success: true,
            elapsed_ms: 0,
        });
    }
}
