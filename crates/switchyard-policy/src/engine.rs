use std::sync::Arc;

use serde::Serialize;
use serde_json::{json, Map, Value};
use tracing::{debug, info, warn};

use switchyard_core::config::PolicyConfig;
use switchyard_core::graph::TaskGraph;
use switchyard_core::policy::{PolicyRule, RuleAction};
use switchyard_core::traits::{Authorizer, KnowledgeRetriever};
use switchyard_core::types::{PolicyKnowledge, RiskLevel};

use crate::resource::{check_resources, ResourceUsage};
use crate::risk::{assess_risk, ResourceEstimate, RiskAssessment};
use crate::rules::{evaluate_rules, RuleEvaluation, RuleStore};

/// Caller-side inputs to a validation.
#[derive(Debug, Clone, Default)]
pub struct PolicyContext {
    /// Principal submitting the graph, passed to the authorizer.
    pub subject: String,
    /// Query used for policy-knowledge retrieval. Falls back to the graph's capabilities.
    pub query: String,
    pub usage: ResourceUsage,
    /// When present, projected call volume and wall time count toward risk.
    pub estimate: Option<ResourceEstimate>,
    /// Extra fields visible to rule conditions.
    pub fields: Map<String, Value>,
}

impl PolicyContext {
    pub fn new(subject: impl Into<String>) -> Self {
        Self {
            subject: subject.into(),
            ..Default::default()
        }
    }

    pub fn with_query(mut self, query: impl Into<String>) -> Self {
        self.query = query.into();
        self
    }

    pub fn with_usage(mut self, usage: ResourceUsage) -> Self {
        self.usage = usage;
        self
    }

    pub fn with_estimate(mut self, estimate: ResourceEstimate) -> Self {
        self.estimate = Some(estimate);
        self
    }

    pub fn with_field(mut self, key: impl Into<String>, value: Value) -> Self {
        self.fields.insert(key.into(), value);
        self
    }

    /// The map rule conditions are evaluated against: caller fields plus
    /// derived values. Derived keys win over caller fields of the same name.
    pub fn rule_context(&self, graph: &TaskGraph, risk: &RiskAssessment) -> Value {
        let mut map = self.fields.clone();
        map.insert("subject".into(), json!(self.subject));
        map.insert("task_count".into(), json!(graph.len()));
        map.insert("has_sensitive".into(), json!(risk.has_sensitive()));
        map.insert("sensitive_categories".into(), json!(risk.sensitive));
        map.insert("dag_depth".into(), json!(risk.depth));
        map.insert("risk_score".into(), json!(risk.score));
        map.insert("risk_level".into(), json!(risk.level));
        map.insert("usage".into(), json!(self.usage));
        map.insert("graph".into(), graph.to_value());
        Value::Object(map)
    }
}

/// Outcome of one validation.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PolicyValidationResult {
    pub allowed: bool,
    pub requires_confirmation: bool,
    pub risk_level: RiskLevel,
    pub reasons: Vec<String>,
    pub metadata: Map<String, Value>,
}

/// Three-way reading of a validation result. Denial wins over confirmation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Verdict {
    Allowed,
    NeedsConfirmation,
    Denied,
}

impl PolicyValidationResult {
    pub fn verdict(&self) -> Verdict {
        if !self.allowed {
            Verdict::Denied
        } else if self.requires_confirmation {
            Verdict::NeedsConfirmation
        } else {
            Verdict::Allowed
        }
    }
}

/// Combines authorization, risk, resource and rule checks into one decision.
///
/// Stateless per call apart from the rule store, which is read through a
/// snapshot so concurrent rule edits never affect an in-flight validation.
pub struct PolicyEngine {
    rules: RuleStore,
    authorizer: Option<Arc<dyn Authorizer>>,
    knowledge: Option<Arc<dyn KnowledgeRetriever>>,
    config: PolicyConfig,
}

impl PolicyEngine {
    pub fn new(config: PolicyConfig) -> Self {
        Self {
            rules: RuleStore::new(config.rules.clone()),
            authorizer: None,
            knowledge: None,
            config,
        }
    }

    pub fn with_authorizer(mut self, authorizer: Arc<dyn Authorizer>) -> Self {
        self.authorizer = Some(authorizer);
        self
    }

    pub fn with_knowledge(mut self, knowledge: Arc<dyn KnowledgeRetriever>) -> Self {
        self.knowledge = Some(knowledge);
        self
    }

    pub fn config(&self) -> &PolicyConfig {
        &self.config
    }

    pub fn add_rule(&self, rule: PolicyRule) {
        info!(rule = %rule.id, action = %rule.action, "Policy rule added");
        self.rules.add(rule);
    }

    pub fn remove_rule(&self, id: &str) -> Option<PolicyRule> {
        let removed = self.rules.remove(id);
        if removed.is_some() {
            info!(rule = %id, "Policy rule removed");
        }
        removed
    }

    pub fn rules(&self) -> Vec<PolicyRule> {
        self.rules.list()
    }

    /// Run only the rule set against an arbitrary context.
    pub fn evaluate_rules(&self, context: &Value) -> RuleEvaluation {
        evaluate_rules(&self.rules.snapshot(), context)
    }

    pub async fn validate(&self, graph: &TaskGraph, ctx: &PolicyContext) -> PolicyValidationResult {
        let mut reasons = Vec::new();
        let mut metadata = Map::new();

        // Permission
        let permission_ok = match &self.authorizer {
            None => {
                metadata.insert("authorization".into(), json!("not_configured"));
                true
            }
            Some(authorizer) => match authorizer.authorize(&ctx.subject, graph).await {
                Ok(decision) if decision.allowed => {
                    metadata.insert("authorization".into(), json!("allowed"));
                    true
                }
                Ok(decision) => {
                    metadata.insert("authorization".into(), json!("denied"));
                    reasons.push(format!(
                        "permission denied: {}",
                        decision.reason.as_deref().unwrap_or("no reason given")
                    ));
                    false
                }
                Err(e) if self.config.fail_open => {
                    warn!(error = %e, "Authorization unavailable, failing open");
                    metadata.insert("authorization".into(), json!("unavailable_fail_open"));
                    reasons.push(
                        "authorization service unavailable; allowed by fail-open policy".into(),
                    );
                    true
                }
                Err(e) => {
                    warn!(error = %e, "Authorization unavailable, failing closed");
                    metadata.insert("authorization".into(), json!("unavailable_fail_closed"));
                    reasons.push(format!("authorization service unavailable: {}", e));
                    false
                }
            },
        };

        // Risk
        let knowledge = self.retrieve_knowledge(graph, ctx).await;
        let estimate = ctx.estimate.or_else(|| {
            self.config
                .risk
                .include_estimate
                .then(|| ResourceEstimate::from_graph(graph, &self.config.risk))
        });
        let risk = assess_risk(graph, &knowledge, estimate.as_ref(), &self.config.risk);
        let risk_allows = match self.config.block_at {
            Some(block) if risk.level >= block => {
                reasons.push(format!(
                    "risk level {} (score {}) is at or above the blocking level {}",
                    risk.level, risk.score, block
                ));
                false
            }
            _ => true,
        };
        if risk.requires_confirmation() {
            let details: Vec<&str> =
                risk.factors.iter().map(|f| f.detail.as_str()).collect();
            reasons.push(format!(
                "{} risk (score {}): {}",
                risk.level,
                risk.score,
                details.join(", ")
            ));
        }
        metadata.insert("risk_score".into(), json!(risk.score));
        metadata.insert("risk_factors".into(), json!(risk.factors));
        metadata.insert("knowledge_snippets".into(), json!(knowledge.len()));

        // Resources
        let resources = check_resources(&ctx.usage, &self.config.limits);
        let violations = resources.violations();
        if !violations.is_empty() {
            reasons.push(format!("resource limit reached: {}", violations.join(", ")));
            metadata.insert("resource_violations".into(), json!(violations));
        }

        // Rules
        let rule_ctx = ctx.rule_context(graph, &risk);
        let rule_eval = self.evaluate_rules(&rule_ctx);
        reasons.extend(rule_eval.reasons.iter().cloned());
        if !rule_eval.matched.is_empty() {
            metadata.insert("matched_rules".into(), json!(rule_eval.matched));
        }
        if let Some(rule) = &rule_eval.deciding_rule {
            metadata.insert("deciding_rule".into(), json!(rule));
        }

        let allowed = permission_ok
            && risk_allows
            && resources.passed()
            && rule_eval.action != RuleAction::Deny;
        let requires_confirmation =
            risk.requires_confirmation() || rule_eval.action == RuleAction::RequireConfirmation;
        let risk_level = risk.level.max(rule_eval.risk.unwrap_or_default());

        info!(
            allowed,
            requires_confirmation,
            risk_level = %risk_level,
            risk_score = risk.score,
            "Policy evaluated"
        );

        PolicyValidationResult {
            allowed,
            requires_confirmation,
            risk_level,
            reasons,
            metadata,
        }
    }

    /// Policy snippets for the query. An outage degrades to no knowledge.
    async fn retrieve_knowledge(
        &self,
        graph: &TaskGraph,
        ctx: &PolicyContext,
    ) -> Vec<PolicyKnowledge> {
        let Some(retriever) = &self.knowledge else {
            return vec![];
        };
        let query = if ctx.query.trim().is_empty() {
            graph
                .nodes
                .iter()
                .map(|n| n.capability.as_str())
                .collect::<Vec<_>>()
                .join(" ")
        } else {
            ctx.query.clone()
        };
        match retriever.retrieve(&query, self.config.knowledge_limit).await {
            Ok(snippets) => {
                debug!(count = snippets.len(), "Policy knowledge retrieved");
                snippets
            }
            Err(e) => {
                warn!(error = %e, "Policy knowledge unavailable, scoring without it");
                vec![]
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use switchyard_core::graph::TaskNode;
    use switchyard_core::policy::{Condition, Operator, RuleCategory};
    use switchyard_test_utils::{chain_graph, wide_graph, MockAuthorizer, MockKnowledge};

    fn engine() -> PolicyEngine {
        PolicyEngine::new(PolicyConfig::default())
    }

    fn ctx() -> PolicyContext {
        PolicyContext::new("user-1").with_query("convert a report")
    }

    #[tokio::test]
    async fn configured_estimate_adds_volume_factors() {
        let graph = wide_graph(15, "read");
        let plain = engine().validate(&graph, &ctx()).await;
        assert_eq!(plain.metadata["risk_score"], 3);

        let mut config = PolicyConfig::default();
        config.risk.include_estimate = true;
        let result = PolicyEngine::new(config).validate(&graph, &ctx()).await;
        // 15 tasks +3, 30 calls +1, 75s +2
        assert_eq!(result.metadata["risk_score"], 6);
        assert_eq!(result.risk_level, RiskLevel::High);
        assert!(result.requires_confirmation);
    }

    #[tokio::test]
    async fn low_risk_graph_is_allowed() {
        let result = engine().validate(&chain_graph(), &ctx()).await;
        assert!(result.allowed);
        assert!(!result.requires_confirmation);
        assert_eq!(result.risk_level, RiskLevel::Low);
        assert_eq!(result.verdict(), Verdict::Allowed);
        assert_eq!(result.metadata["authorization"], "not_configured");
    }

    #[tokio::test]
    async fn risk_gates_confirmation_not_permission() {
        let mut graph = wide_graph(15, "read");
        graph.nodes.push(TaskNode::new("del", "delete_file", "fs"));
        let result = engine().validate(&graph, &ctx()).await;
        assert!(result.allowed);
        assert!(result.requires_confirmation);
        assert_eq!(result.risk_level, RiskLevel::High);
        assert_eq!(result.metadata["risk_score"], 6);
        assert_eq!(result.verdict(), Verdict::NeedsConfirmation);
    }

    #[tokio::test]
    async fn block_at_turns_risk_into_denial() {
        let config = PolicyConfig {
            block_at: Some(RiskLevel::High),
            ..Default::default()
        };
        let graph = wide_graph(16, "delete_file");
        let result = PolicyEngine::new(config).validate(&graph, &ctx()).await;
        assert!(!result.allowed);
        assert_eq!(result.verdict(), Verdict::Denied);
    }

    #[tokio::test]
    async fn authorizer_denial_blocks() {
        let engine =
            engine().with_authorizer(Arc::new(MockAuthorizer::Deny("not a member".into())));
        let result = engine.validate(&chain_graph(), &ctx()).await;
        assert!(!result.allowed);
        assert!(result.reasons[0].contains("not a member"));
    }

    #[tokio::test]
    async fn authorizer_outage_fails_open_by_default() {
        let engine = engine().with_authorizer(Arc::new(MockAuthorizer::Unavailable));
        let result = engine.validate(&chain_graph(), &ctx()).await;
        assert!(result.allowed);
        assert_eq!(result.metadata["authorization"], "unavailable_fail_open");
    }

    #[tokio::test]
    async fn authorizer_outage_fails_closed_when_configured() {
        let config = PolicyConfig {
            fail_open: false,
            ..Default::default()
        };
        let engine =
            PolicyEngine::new(config).with_authorizer(Arc::new(MockAuthorizer::Unavailable));
        let result = engine.validate(&chain_graph(), &ctx()).await;
        assert!(!result.allowed);
    }

    #[tokio::test]
    async fn knowledge_raises_risk_and_outage_is_ignored() {
        let snippet = PolicyKnowledge {
            text: "conversions of financial reports need sign-off".into(),
            risk: RiskLevel::High,
            source: Some("handbook".into()),
        };
        let engine = engine().with_knowledge(Arc::new(MockKnowledge::new(vec![snippet])));
        let result = engine.validate(&chain_graph(), &ctx()).await;
        assert_eq!(result.risk_level, RiskLevel::Mid);
        assert!(result.requires_confirmation);

        let degraded = PolicyEngine::new(PolicyConfig::default())
            .with_knowledge(Arc::new(MockKnowledge::unavailable()));
        let result = degraded.validate(&chain_graph(), &ctx()).await;
        assert_eq!(result.risk_level, RiskLevel::Low);
        assert!(result.allowed);
    }

    #[tokio::test]
    async fn exhausted_resources_deny() {
        let usage = ResourceUsage {
            daily_executions: 1_000,
            ..Default::default()
        };
        let result = engine().validate(&chain_graph(), &ctx().with_usage(usage)).await;
        assert!(!result.allowed);
        assert_eq!(result.metadata["resource_violations"][0], "daily_executions");
    }

    #[tokio::test]
    async fn deny_rule_over_derived_fields() {
        let engine = engine();
        engine.add_rule(
            PolicyRule::new(
                "no-bulk-sensitive",
                RuleCategory::Risk,
                Condition::and(vec![
                    Condition::leaf("task_count", Operator::Gt, json!(5)),
                    Condition::leaf("has_sensitive", Operator::Eq, json!(true)),
                ]),
                RuleAction::Deny,
            )
            .with_reason("bulk destructive plans are not allowed"),
        );
        let result = engine.validate(&wide_graph(10, "delete_file"), &ctx()).await;
        assert!(!result.allowed);
        assert_eq!(result.metadata["deciding_rule"], "no-bulk-sensitive");

        engine.remove_rule("no-bulk-sensitive");
        let result = engine.validate(&wide_graph(10, "delete_file"), &ctx()).await;
        assert!(result.allowed);
    }

    #[tokio::test]
    async fn rule_risk_label_and_confirmation() {
        let engine = engine();
        engine.add_rule(
            PolicyRule::new(
                "review-conversions",
                RuleCategory::Permission,
                Condition::leaf("graph.nodes.1.capability", Operator::Eq, json!("convert")),
                RuleAction::RequireConfirmation,
            )
            .with_risk(RiskLevel::High),
        );
        let result = engine.validate(&chain_graph(), &ctx()).await;
        assert!(result.allowed);
        assert!(result.requires_confirmation);
        assert_eq!(result.risk_level, RiskLevel::High);
    }

    #[tokio::test]
    async fn caller_fields_reach_rules() {
        let engine = engine();
        engine.add_rule(PolicyRule::new(
            "guests-readonly",
            RuleCategory::Permission,
            Condition::leaf("role", Operator::In, json!(["guest"])),
            RuleAction::Deny,
        ));
        let guest = ctx().with_field("role", json!("guest"));
        assert!(!engine.validate(&chain_graph(), &guest).await.allowed);
        assert!(engine.validate(&chain_graph(), &ctx()).await.allowed);
    }

    #[tokio::test]
    async fn validation_is_repeatable() {
        let graph = wide_graph(15, "read");
        let engine = engine();
        let a = engine.validate(&graph, &ctx()).await;
        let b = engine.validate(&graph, &ctx()).await;
        assert_eq!(a, b);
    }
}
