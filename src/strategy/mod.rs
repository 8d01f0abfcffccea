pub mod covariance;
pub mod error;
pub mod expected_returns;
pub mod optimizer;
pub mod performance;
pub mod strategy_constants;
pub mod types;

pub use error::OptimizationError;
pub use types::{Objective, OptimizedPortfolio, PortfolioPerformance};
