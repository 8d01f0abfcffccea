use thiserror::Error;

#[derive(Debug, Error)]
pub enum OptimizationError {
    #[error("insufficient price history: need at least {required} returns, got {available}")]
    InsufficientHistory { required: usize, available: usize },
    #[error("invalid optimizer input: {0}")]
    InvalidInput(String),
    #[error("no portfolio satisfies the request: {0}")]
    Infeasible(String),
    #[error("solver failed: {0}")]
    Solver(String),
}
