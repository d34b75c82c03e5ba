pub mod engine;
pub mod evaluator;
pub mod resource;
pub mod risk;
pub mod rules;

pub use engine::{PolicyContext, PolicyEngine, PolicyValidationResult, Verdict};
pub use evaluator::{evaluate, lookup};
pub use resource::{check_resources, ResourceCheck, ResourceUsage};
pub use risk::{assess_risk, ResourceEstimate, RiskAssessment, RiskFactor};
pub use rules::{evaluate_rules, RuleEvaluation, RuleStore};
