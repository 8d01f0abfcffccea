// --- ESTIMATION ---
/// Minimum number of daily returns before estimates are attempted
pub const MIN_RETURN_OBSERVATIONS: usize = 2;

// --- SOLVER ---
/// Iteration cap for the steepest descent run
pub const MAX_SOLVER_ITERS: u64 = 2000;
/// Armijo sufficient-decrease parameter for the backtracking line search
pub const ARMIJO_C: f64 = 1e-4;
/// Starting weight of the quadratic penalty enforcing target return / volatility
pub const TARGET_PENALTY: f64 = 1e3;
/// Penalty multiplier applied each time a target is still missed
pub const PENALTY_GROWTH: f64 = 10.0;
/// Stop stiffening the penalty past this point
pub const MAX_TARGET_PENALTY: f64 = 1e7;
/// Halvings used to pull an over-target portfolio back under its volatility cap
pub const VOLATILITY_BISECTION_STEPS: usize = 60;
/// Slack allowed on target return / volatility constraints
pub const FEASIBILITY_TOLERANCE: f64 = 1e-6;

// --- WEIGHT CLEANING ---
/// Weights below this are treated as zero
pub const WEIGHT_CUTOFF: f64 = 1e-4;
/// Decimal places kept on cleaned weights
pub const WEIGHT_ROUNDING_DP: u32 = 5;
