pub mod executor;
pub mod router;

pub use executor::{DagExecutor, ExecutionReport};
pub use router::{RouteOutcome, RouteRequest, RouteStatus, Router};
