pub mod config;
pub mod execution;
pub mod logging;
pub mod market_data;
pub mod pipeline;
pub mod report;
pub mod strategy;
