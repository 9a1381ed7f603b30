pub mod db;
pub mod error;
pub mod memory;
pub mod models;
pub mod planner;
pub mod shopping;
pub mod store;

pub use error::{PlanError, PlanResult};
pub use planner::Planner;
