use ndarray::Array2;
use tracing::debug;

use super::error::OptimizationError;
use super::strategy_constants::MIN_RETURN_OBSERVATIONS;
use crate::market_data::PriceTable;

/// Annualised sample covariance of daily returns, same column order as the table
pub fn sample_covariance(table: &PriceTable, frequency: u32) -> Result<Array2<f64>, OptimizationError> {
    let returns = table.returns();
    let observations = returns.nrows();
    if observations < MIN_RETURN_OBSERVATIONS {
        return Err(OptimizationError::InsufficientHistory {
            required: MIN_RETURN_OBSERVATIONS,
            available: observations,
        });
    }

    let n_assets = returns.ncols();
    let columns: Vec<Vec<f64>> = returns.columns().into_iter().map(|c| c.to_vec()).collect();

    let mut cov_matrix = Array2::zeros((n_assets, n_assets));
    for i in 0..n_assets {
        for j in i..n_assets {
            let covariance = calculate_covariance(&columns[i], &columns[j]) * frequency as f64;
            cov_matrix[[i, j]] = covariance;
            cov_matrix[[j, i]] = covariance;
        }
    }
    debug!(n_assets, observations, "Covariance matrix estimated");

    Ok(cov_matrix)
}

/// Sample covariance between two return series (divides by n - 1)
fn calculate_covariance(returns_x: &[f64], returns_y: &[f64]) -> f64 {
    if returns_x.len() != returns_y.len() || returns_x.len() < 2 {
        return 0.0;
    }

    let n = returns_x.len() as f64;
    let mean_x = returns_x.iter().sum::<f64>() / n;
    let mean_y = returns_y.iter().sum::<f64>() / n;

    returns_x
        .iter()
        .zip(returns_y.iter())
        .map(|(x, y)| (x - mean_x) * (y - mean_y))
        .sum::<f64>()
        / (n - 1.0)
}
