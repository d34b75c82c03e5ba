use std::sync::{Arc, PoisonError, RwLock};

use serde::Serialize;
use tracing::debug;

use switchyard_core::policy::{PolicyRule, RuleAction};
use switchyard_core::types::RiskLevel;

use crate::evaluator::evaluate;

/// Result of running the rule set against one context.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct RuleEvaluation {
    /// Effective action: deny if any deny rule matched, otherwise the first
    /// matching rule's action, otherwise allow.
    pub action: RuleAction,
    /// Rule that decided `action`.
    pub deciding_rule: Option<String>,
    /// Every rule that matched, in evaluation order.
    pub matched: Vec<String>,
    /// Reasons from every matched rule.
    pub reasons: Vec<String>,
    /// Highest risk label among matched rules.
    pub risk: Option<RiskLevel>,
}

/// Evaluate rules in priority order.
///
/// Deny rules are checked first, then confirmation, then allow; within an
/// action, permission rules precede risk rules, which precede resource rules.
/// Declaration order breaks remaining ties. A matching deny stops evaluation.
pub fn evaluate_rules(rules: &[PolicyRule], context: &serde_json::Value) -> RuleEvaluation {
    let mut ordered: Vec<&PolicyRule> = rules.iter().collect();
    ordered.sort_by_key(|r| (r.action.priority(), r.category.priority()));

    let mut eval = RuleEvaluation::default();
    let mut first: Option<RuleAction> = None;

    for rule in ordered {
        if !evaluate(&rule.condition, context) {
            continue;
        }
        debug!(rule = %rule.id, action = %rule.action, "Policy rule matched");

        eval.matched.push(rule.id.clone());
        eval.reasons.push(rule.describe());
        if let Some(level) = rule.risk {
            eval.risk = eval.risk.max(Some(level));
        }

        if rule.action == RuleAction::Deny {
            eval.action = RuleAction::Deny;
            eval.deciding_rule = Some(rule.id.clone());
            return eval;
        }
        if first.is_none() {
            first = Some(rule.action);
            eval.deciding_rule = Some(rule.id.clone());
        }
    }

    eval.action = first.unwrap_or_default();
    eval
}

/// Process-wide rule set.
///
/// Readers take an immutable snapshot; writers build a new list and swap it
/// in, so an in-flight evaluation never sees a partially updated set.
#[derive(Debug, Default)]
pub struct RuleStore {
    rules: RwLock<Arc<Vec<PolicyRule>>>,
}

impl RuleStore {
    pub fn new(rules: Vec<PolicyRule>) -> Self {
        Self {
            rules: RwLock::new(Arc::new(rules)),
        }
    }

    pub fn snapshot(&self) -> Arc<Vec<PolicyRule>> {
        self.rules
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// Add a rule, replacing any existing rule with the same id.
    pub fn add(&self, rule: PolicyRule) {
        let mut guard = self.rules.write().unwrap_or_else(PoisonError::into_inner);
        let mut next: Vec<PolicyRule> = guard.iter().filter(|r| r.id != rule.id).cloned().collect();
        next.push(rule);
        *guard = Arc::new(next);
    }

    /// Remove a rule by id, returning it if present.
    pub fn remove(&self, id: &str) -> Option<PolicyRule> {
        let mut guard = self.rules.write().unwrap_or_else(PoisonError::into_inner);
        let removed = guard.iter().find(|r| r.id == id).cloned()?;
        let next: Vec<PolicyRule> = guard.iter().filter(|r| r.id != id).cloned().collect();
        *guard = Arc::new(next);
        Some(removed)
    }

    pub fn list(&self) -> Vec<PolicyRule> {
        self.snapshot().as_ref().clone()
    }

    pub fn len(&self) -> usize {
        self.snapshot().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
