pub mod depth;
pub mod heuristic;
pub mod planner;
pub mod validator;

pub use depth::{dag_depth, execution_waves, WavePlan};
pub use heuristic::HeuristicProposer;
pub use planner::{parse_plan, Planner};
pub use validator::{find_cycle, validate, ValidationReport};
