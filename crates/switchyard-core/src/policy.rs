use std::fmt;

use serde::{Deserialize, Serialize};

use crate::types::RiskLevel;

/// What a matched rule does to the validation.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RuleAction {
    #[default]
    Allow,
    Deny,
    RequireConfirmation,
}

impl RuleAction {
    /// Evaluation order: deny first, then confirmation, then allow.
    pub fn priority(self) -> u8 {
        match self {
            Self::Deny => 0,
            Self::RequireConfirmation => 1,
            Self::Allow => 2,
        }
    }
}

impl fmt::Display for RuleAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Allow => write!(f, "allow"),
            Self::Deny => write!(f, "deny"),
            Self::RequireConfirmation => write!(f, "require_confirmation"),
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RuleCategory {
    #[default]
    Permission,
    Risk,
    Resource,
}

impl RuleCategory {
    /// Tie-break order within the same action.
    pub fn priority(self) -> u8 {
        match self {
            Self::Permission => 0,
            Self::Risk => 1,
            Self::Resource => 2,
        }
    }
}

/// Comparison applied by a leaf condition.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Operator {
    #[serde(rename = "==", alias = "eq")]
    Eq,
    #[serde(rename = "!=", alias = "ne")]
    Ne,
    #[serde(rename = ">", alias = "gt")]
    Gt,
    #[serde(rename = ">=", alias = "gte")]
    Gte,
    #[serde(rename = "<", alias = "lt")]
    Lt,
    #[serde(rename = "<=", alias = "lte")]
    Lte,
    #[serde(rename = "in")]
    In,
    #[serde(rename = "not_in")]
    NotIn,
    #[serde(rename = "regex", alias = "matches")]
    Regex,
    #[serde(rename = "contains")]
    Contains,
    #[serde(rename = "starts_with")]
    StartsWith,
    #[serde(rename = "ends_with")]
    EndsWith,
}

/// Boolean condition tree evaluated against a context map.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Condition {
    Leaf {
        /// Dot-path into the context, e.g. `graph.nodes.0.capability`.
        field: String,
        #[serde(alias = "operator")]
        op: Operator,
        value: serde_json::Value,
    },
    And(Vec<Condition>),
    Or(Vec<Condition>),
    Not(Box<Condition>),
}

impl Condition {
    pub fn leaf(field: impl Into<String>, op: Operator, value: serde_json::Value) -> Self {
        Self::Leaf {
            field: field.into(),
            op,
            value,
        }
    }

    pub fn and(conditions: Vec<Condition>) -> Self {
        Self::And(conditions)
    }

    pub fn or(conditions: Vec<Condition>) -> Self {
        Self::Or(conditions)
    }

    #[allow(clippy::should_implement_trait)]
    pub fn not(condition: Condition) -> Self {
        Self::Not(Box::new(condition))
    }
}

/// A process-wide policy rule.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PolicyRule {
    pub id: String,
    #[serde(default)]
    pub category: RuleCategory,
    pub condition: Condition,
    pub action: RuleAction,
    /// Risk label contributed when the rule matches.
    #[serde(default)]
    pub risk: Option<RiskLevel>,
    /// Human-readable reason reported when the rule matches.
    #[serde(default)]
    pub reason: Option<String>,
}

impl PolicyRule {
    pub fn new(
        id: impl Into<String>,
        category: RuleCategory,
        condition: Condition,
        action: RuleAction,
    ) -> Self {
        Self {
            id: id.into(),
            category,
            condition,
            action,
            risk: None,
            reason: None,
        }
    }

    pub fn with_risk(mut self, risk: RiskLevel) -> Self {
        self.risk = Some(risk);
        self
    }

    pub fn with_reason(mut self, reason: impl Into<String>) -> Self {
        self.reason = Some(reason.into());
        self
    }

    /// Text surfaced in validation reasons when this rule matches.
    pub fn describe(&self) -> String {
        match &self.reason {
            Some(reason) => format!("rule {} ({}): {}", self.id, self.action, reason),
            None => format!("rule {} matched: {}", self.id, self.action),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn condition_tree_from_json() {
        let raw = json!({
            "and": [
                {"leaf": {"field": "task_count", "op": ">", "value": 5}},
                {"not": {"leaf": {"field": "user.role", "operator": "in", "value": ["admin"]}}}
            ]
        });
        let cond: Condition = serde_json::from_value(raw).unwrap();
        match cond {
            Condition::And(children) => {
                assert_eq!(children.len(), 2);
                assert!(matches!(
                    children[0],
                    Condition::Leaf { op: Operator::Gt, .. }
                ));
                assert!(matches!(children[1], Condition::Not(_)));
            }
            other => panic!("expected and, got {:?}", other),
        }
    }

    #[test]
    fn operator_aliases() {
        let op: Operator = serde_json::from_str("\"gte\"").unwrap();
        assert_eq!(op, Operator::Gte);
        let op: Operator = serde_json::from_str("\"not_in\"").unwrap();
        assert_eq!(op, Operator::NotIn);
    }

    #[test]
    fn rule_from_toml() {
        let rule: PolicyRule = toml::from_str(
            r#"
id = "no-bulk-delete"
category = "risk"
action = "deny"
risk = "high"
reason = "bulk destructive plans are blocked"

[condition]
and = [
  { leaf = { field = "task_count", op = ">", value = 5 } },
  { leaf = { field = "has_sensitive", op = "==", value = true } },
]
"#,
        )
        .unwrap();
        assert_eq!(rule.action, RuleAction::Deny);
        assert_eq!(rule.category, RuleCategory::Risk);
        assert_eq!(rule.risk, Some(RiskLevel::High));
        assert!(rule.describe().contains("bulk destructive"));
    }

    #[test]
    fn action_priority_puts_deny_first() {
        assert!(RuleAction::Deny.priority() < RuleAction::RequireConfirmation.priority());
        assert!(RuleAction::RequireConfirmation.priority() < RuleAction::Allow.priority());
        assert!(RuleCategory::Permission.priority() < RuleCategory::Resource.priority());
    }
}
