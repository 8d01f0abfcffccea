use argmin::core::{CostFunction, Executor, Gradient, State};
use argmin::solver::gradientdescent::SteepestDescent;
use argmin::solver::linesearch::{BacktrackingLineSearch, condition::ArmijoCondition};
use ndarray::{Array1, Array2};
use tracing::{debug, instrument};

use super::error::OptimizationError;
use super::strategy_constants::{
    ARMIJO_C, FEASIBILITY_TOLERANCE, MAX_SOLVER_ITERS, MAX_TARGET_PENALTY, PENALTY_GROWTH, TARGET_PENALTY,
    VOLATILITY_BISECTION_STEPS, WEIGHT_CUTOFF,
};
use super::types::{Objective, OptimizedPortfolio};

/// Long-only, fully invested mean-variance optimisation.
///
/// Weights are parameterised as `w_i = z_i^2 / sum(z^2)` so every iterate is a valid
/// portfolio; target constraints are enforced with quadratic penalties.
#[instrument(skip_all, fields(objective = %objective, n_assets = symbols.len()))]
pub fn optimize(
    symbols: Vec<String>,
    expected_returns: Array1<f64>,
    covariance_matrix: Array2<f64>,
    objective: Objective,
    risk_free_rate: f64,
) -> Result<OptimizedPortfolio, OptimizationError> {
    validate_inputs(&symbols, &expected_returns, &covariance_matrix, objective, risk_free_rate)?;
    check_feasibility(&expected_returns, &covariance_matrix, objective, risk_free_rate)?;

    let weights = solve(&expected_returns, &covariance_matrix, objective, risk_free_rate)?;
    debug!(?weights, "Optimal weights found");

    Ok(OptimizedPortfolio::new(symbols, expected_returns, covariance_matrix, weights))
}

fn validate_inputs(
    symbols: &[String],
    expected_returns: &Array1<f64>,
    covariance_matrix: &Array2<f64>,
    objective: Objective,
    risk_free_rate: f64,
) -> Result<(), OptimizationError> {
    let n_assets = expected_returns.len();

    if n_assets == 0 {
        return Err(OptimizationError::InvalidInput("no assets to optimize".to_string()));
    }
    if symbols.len() != n_assets {
        return Err(OptimizationError::InvalidInput(format!(
            "{} symbols but {} expected returns",
            symbols.len(),
            n_assets
        )));
    }
    if covariance_matrix.nrows() != n_assets || covariance_matrix.ncols() != n_assets {
        return Err(OptimizationError::InvalidInput(
            "covariance matrix dimensions don't match expected returns".to_string(),
        ));
    }
    if !risk_free_rate.is_finite()
        || expected_returns.iter().any(|v| !v.is_finite())
        || covariance_matrix.iter().any(|v| !v.is_finite())
    {
        return Err(OptimizationError::InvalidInput("inputs contain non-finite values".to_string()));
    }
    // Positive diagonal is the cheap necessary condition for positive definiteness
    for i in 0..n_assets {
        if covariance_matrix[[i, i]] <= 0.0 {
            return Err(OptimizationError::InvalidInput(format!(
                "covariance matrix is not positive definite ({} has no variance)",
                symbols[i]
            )));
        }
    }

    match objective {
        Objective::TargetReturn(r) if !r.is_finite() => Err(OptimizationError::InvalidInput(
            "target return must be a finite number".to_string(),
        )),
        Objective::TargetVolatility(v) if !v.is_finite() || v <= 0.0 => Err(
            OptimizationError::InvalidInput("target volatility must be positive".to_string()),
        ),
        _ => Ok(()),
    }
}

fn check_feasibility(
    expected_returns: &Array1<f64>,
    covariance_matrix: &Array2<f64>,
    objective: Objective,
    risk_free_rate: f64,
) -> Result<(), OptimizationError> {
    let best_return = expected_returns.iter().copied().fold(f64::NEG_INFINITY, f64::max);

    match objective {
        Objective::TargetReturn(target) if target > best_return => Err(OptimizationError::Infeasible(format!(
            "target return {:.2}% exceeds the best achievable {:.2}%",
            target * 100.0,
            best_return * 100.0
        ))),
        Objective::TargetVolatility(target) => {
            let min_vol_weights = solve(expected_returns, covariance_matrix, Objective::MinVolatility, risk_free_rate)?;
            let min_vol = portfolio_variance(&min_vol_weights, covariance_matrix).sqrt();
            if target + FEASIBILITY_TOLERANCE < min_vol {
                Err(OptimizationError::Infeasible(format!(
                    "target volatility {:.2}% is below the minimum achievable {:.2}%",
                    target * 100.0,
                    min_vol * 100.0
                )))
            } else {
                Ok(())
            }
        }
        Objective::MaxSharpe if best_return <= risk_free_rate => Err(OptimizationError::Infeasible(format!(
            "at least one asset must have an expected return above the risk-free rate {:.2}%",
            risk_free_rate * 100.0
        ))),
        _ => Ok(()),
    }
}

/// Run steepest descent from the equal-weight portfolio and map the result back to weights.
///
/// Target objectives are re-solved with a stiffer penalty while the target is missed, then the
/// remaining gap is closed exactly by blending towards a portfolio that meets it.
fn solve(
    expected_returns: &Array1<f64>,
    covariance_matrix: &Array2<f64>,
    objective: Objective,
    risk_free_rate: f64,
) -> Result<Array1<f64>, OptimizationError> {
    let n = expected_returns.len();
    if n == 1 {
        return Ok(Array1::ones(1));
    }

    let mut problem = PortfolioProblem {
        expected_returns: expected_returns.clone(),
        covariance_matrix: covariance_matrix.clone(),
        objective,
        risk_free_rate,
        penalty: TARGET_PENALTY,
    };
    let mut param = run_descent(&problem, vec![1.0 / (n as f64).sqrt(); n])?;
    let mut weights = weights_from_param(&param)
        .ok_or_else(|| OptimizationError::Solver("solver collapsed to an empty portfolio".to_string()))?;

    while target_gap(&weights, expected_returns, covariance_matrix, objective) > FEASIBILITY_TOLERANCE
        && problem.penalty < MAX_TARGET_PENALTY
    {
        problem.penalty *= PENALTY_GROWTH;
        debug!(penalty = problem.penalty, "Target missed, re-solving with a stiffer penalty");
        // A stalled stiff run leaves the previous weights for the blend below to finish
        let Some((next_param, next_weights)) = run_descent(&problem, param.clone())
            .ok()
            .and_then(|p| weights_from_param(&p).map(|w| (p, w)))
        else {
            break;
        };
        param = next_param;
        weights = next_weights;
    }

    let weights = drop_dust(weights)?;
    let weights = match objective {
        Objective::TargetReturn(target) => lift_return(weights, expected_returns, target),
        Objective::TargetVolatility(target) => {
            let floor = solve(expected_returns, covariance_matrix, Objective::MinVolatility, risk_free_rate)?;
            cap_volatility(weights, &floor, covariance_matrix, target)
        }
        Objective::MinVolatility | Objective::MaxSharpe => weights,
    };

    let gap = target_gap(&weights, expected_returns, covariance_matrix, objective);
    if gap > FEASIBILITY_TOLERANCE {
        return Err(OptimizationError::Solver(format!(
            "{objective} missed by {:.4}%",
            gap * 100.0
        )));
    }

    Ok(weights)
}

fn run_descent(problem: &PortfolioProblem, init_param: Vec<f64>) -> Result<Vec<f64>, OptimizationError> {
    let linesearch = BacktrackingLineSearch::new(
        ArmijoCondition::new(ARMIJO_C)
            .map_err(|e| OptimizationError::Solver(format!("Failed to create Armijo condition: {}", e)))?,
    );
    let solver = SteepestDescent::new(linesearch);

    let result = Executor::new(problem.clone(), solver)
        .configure(|state| state.param(init_param).max_iters(MAX_SOLVER_ITERS))
        .run()
        .map_err(|e| OptimizationError::Solver(e.to_string()))?;

    result
        .state()
        .get_best_param()
        .cloned()
        .ok_or_else(|| OptimizationError::Solver("solver produced no parameters".to_string()))
}

/// Positions the solver is still shrinking towards zero are dropped outright
fn drop_dust(mut weights: Array1<f64>) -> Result<Array1<f64>, OptimizationError> {
    weights.mapv_inplace(|w| if w < WEIGHT_CUTOFF { 0.0 } else { w });
    let total = weights.sum();
    if total <= 0.0 {
        return Err(OptimizationError::Solver("all weights fell below the cutoff".to_string()));
    }
    Ok(weights / total)
}

/// How far the weights fall short of a target constraint, zero when it holds
fn target_gap(
    weights: &Array1<f64>,
    expected_returns: &Array1<f64>,
    covariance_matrix: &Array2<f64>,
    objective: Objective,
) -> f64 {
    match objective {
        Objective::TargetReturn(target) => (target - weights.dot(expected_returns)).max(0.0),
        Objective::TargetVolatility(target) => {
            (portfolio_variance(weights, covariance_matrix).sqrt() - target).max(0.0)
        }
        Objective::MinVolatility | Objective::MaxSharpe => 0.0,
    }
}

/// Shift just enough weight onto the best-returning asset to reach `target`
fn lift_return(weights: Array1<f64>, expected_returns: &Array1<f64>, target: f64) -> Array1<f64> {
    let current = weights.dot(expected_returns);
    let Some((best, best_return)) = expected_returns
        .iter()
        .copied()
        .enumerate()
        .max_by(|a, b| a.1.total_cmp(&b.1))
    else {
        return weights;
    };
    if current >= target || best_return <= current {
        return weights;
    }

    let shift = ((target - current) / (best_return - current)).min(1.0);
    let mut lifted = weights * (1.0 - shift);
    lifted[best] += shift;
    lifted
}

/// Blend towards the minimum-volatility portfolio until volatility is within `target`.
/// Variance is convex along the blend, so the feasible part is a single interval.
fn cap_volatility(
    weights: Array1<f64>,
    floor: &Array1<f64>,
    covariance_matrix: &Array2<f64>,
    target: f64,
) -> Array1<f64> {
    let within = |w: &Array1<f64>| portfolio_variance(w, covariance_matrix).sqrt() <= target;
    if within(&weights) {
        return weights;
    }

    let step = &weights - floor;
    let (mut lo, mut hi) = (0.0, 1.0);
    for _ in 0..VOLATILITY_BISECTION_STEPS {
        let mid = 0.5 * (lo + hi);
        if within(&(floor + &(&step * mid))) {
            lo = mid;
        } else {
            hi = mid;
        }
    }
    floor + &(&step * lo)
}

fn weights_from_param(z: &[f64]) -> Option<Array1<f64>> {
    let squared = Array1::from_iter(z.iter().map(|v| v * v));
    let total = squared.sum();
    if !total.is_finite() || total <= 0.0 {
        return None;
    }
    Some(squared / total)
}

fn portfolio_variance(weights: &Array1<f64>, covariance_matrix: &Array2<f64>) -> f64 {
    weights.dot(&covariance_matrix.dot(weights)).max(0.0)
}

#[derive(Clone)]
struct PortfolioProblem {
    expected_returns: Array1<f64>,
    covariance_matrix: Array2<f64>,
    objective: Objective,
    risk_free_rate: f64,
    penalty: f64, // Weight of the quadratic target penalty
}

impl PortfolioProblem {
    /// Objective value and its gradient with respect to the weights
    fn evaluate(&self, w: &Array1<f64>) -> (f64, Array1<f64>) {
        let sigma_w = self.covariance_matrix.dot(w);
        let variance = w.dot(&sigma_w).max(0.0);
        let portfolio_return = w.dot(&self.expected_returns);

        match self.objective {
            Objective::MinVolatility => (variance, sigma_w * 2.0),
            Objective::MaxSharpe => {
                if variance <= f64::EPSILON {
                    return (0.0, Array1::zeros(w.len()));
                }
                let volatility = variance.sqrt();
                let excess = portfolio_return - self.risk_free_rate;
                // d(-excess / vol) = -(mu * vol - excess * sigma_w / vol) / var
                let gradient = (&self.expected_returns * volatility - &sigma_w * (excess / volatility)) * (-1.0 / variance);
                (-excess / volatility, gradient)
            }
            Objective::TargetReturn(target) => {
                let shortfall = (target - portfolio_return).max(0.0);
                let cost = variance + self.penalty * shortfall * shortfall;
                let gradient = sigma_w * 2.0 - &self.expected_returns * (2.0 * self.penalty * shortfall);
                (cost, gradient)
            }
            Objective::TargetVolatility(target) => {
                let volatility = variance.sqrt();
                let excess = (volatility - target).max(0.0);
                let cost = -portfolio_return + self.penalty * excess * excess;
                let mut gradient = -&self.expected_returns;
                if excess > 0.0 && volatility > 0.0 {
                    gradient = gradient + sigma_w * (2.0 * self.penalty * excess / volatility);
                }
                (cost, gradient)
            }
        }
    }
}

impl CostFunction for PortfolioProblem {
    type Param = Vec<f64>;
    type Output = f64;

    fn cost(&self, z: &Self::Param) -> Result<Self::Output, argmin::core::Error> {
        let w = weights_from_param(z).ok_or_else(|| argmin::core::Error::msg("degenerate parameters"))?;
        Ok(self.evaluate(&w).0)
    }
}

impl Gradient for PortfolioProblem {
    type Param = Vec<f64>;
    type Gradient = Vec<f64>;

    fn gradient(&self, z: &Self::Param) -> Result<Self::Gradient, argmin::core::Error> {
        let w = weights_from_param(z).ok_or_else(|| argmin::core::Error::msg("degenerate parameters"))?;
        let (_, grad_w) = self.evaluate(&w);
        let norm: f64 = z.iter().map(|v| v * v).sum();
        let weighted_mean = w.dot(&grad_w);

        // Chain rule through w_i = z_i^2 / |z|^2
        Ok(z
            .iter()
            .zip(grad_w.iter())
            .map(|(zi, gi)| 2.0 * zi / norm * (gi - weighted_mean))
            .collect())
    }
}
