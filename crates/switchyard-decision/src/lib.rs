pub mod engine;
pub mod filters;
pub mod strategy;

pub use engine::{DecisionEngine, DecisionResult};
pub use filters::{apply_hard_filters, CostCeiling, DecisionContext};
pub use strategy::{decide_strategy, StrategyMode, SwitchConditions, WorkflowStrategy};
