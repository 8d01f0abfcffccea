use ndarray::{Array1, Axis};
use tracing::debug;

use super::error::OptimizationError;
use super::strategy_constants::MIN_RETURN_OBSERVATIONS;
use crate::market_data::PriceTable;

/// Annualised compounded mean of daily returns, one entry per table column:
/// `(prod(1 + r_t)) ^ (frequency / T) - 1`
pub fn mean_historical_return(table: &PriceTable, frequency: u32) -> Result<Array1<f64>, OptimizationError> {
    let returns = table.returns();
    let observations = returns.nrows();
    if observations < MIN_RETURN_OBSERVATIONS {
        return Err(OptimizationError::InsufficientHistory {
            required: MIN_RETURN_OBSERVATIONS,
            available: observations,
        });
    }

    let growth = (returns + 1.0).map_axis(Axis(0), |column| column.product());
    let exponent = frequency as f64 / observations as f64;
    let expected = growth.mapv(|g| g.powf(exponent) - 1.0);
    debug!(?expected, "Expected returns estimated");

    Ok(expected)
}
