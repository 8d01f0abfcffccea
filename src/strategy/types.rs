use std::fmt;

use ndarray::{Array1, Array2};
use rust_decimal::Decimal;
use rust_decimal::prelude::*;
use serde::Serialize;
use tracing::info;

use super::strategy_constants::{WEIGHT_CUTOFF, WEIGHT_ROUNDING_DP};
use crate::execution::AssetWeight;

/// What the optimizer should aim for. Targets are annualised fractions (0.10 = 10%).
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
#[serde(tag = "kind", content = "target", rename_all = "snake_case")]
pub enum Objective {
    /// Minimise volatility while returning at least the target
    TargetReturn(f64),
    /// Maximise return while keeping volatility at or below the target
    TargetVolatility(f64),
    MinVolatility,
    MaxSharpe,
}

impl Objective {
    pub fn as_str(&self) -> &'static str {
        match self {
            Objective::TargetReturn(_) => "target_return",
            Objective::TargetVolatility(_) => "target_volatility",
            Objective::MinVolatility => "min_volatility",
            Objective::MaxSharpe => "max_sharpe",
        }
    }
}

impl fmt::Display for Objective {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Objective::TargetReturn(r) => write!(f, "target return {:.2}%", r * 100.0),
            Objective::TargetVolatility(v) => write!(f, "target volatility {:.2}%", v * 100.0),
            Objective::MinVolatility => write!(f, "minimum volatility"),
            Objective::MaxSharpe => write!(f, "maximum Sharpe ratio"),
        }
    }
}

/// Annualised figures for a set of weights
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct PortfolioPerformance {
    pub expected_return: f64,
    pub volatility: f64,
    pub sharpe_ratio: f64,
}

/// Optimizer output with inputs kept in the same symbol order as the weights
#[derive(Debug, Clone)]
pub struct OptimizedPortfolio {
    pub symbols: Vec<String>,
    pub expected_returns: Array1<f64>,
    pub covariance_matrix: Array2<f64>,
    pub weights: Array1<f64>,
}

impl OptimizedPortfolio {
    pub fn new(
        symbols: Vec<String>,
        expected_returns: Array1<f64>,
        covariance_matrix: Array2<f64>,
        weights: Array1<f64>,
    ) -> Self {
        assert_eq!(symbols.len(), expected_returns.len());
        assert_eq!(symbols.len(), covariance_matrix.nrows());
        assert_eq!(symbols.len(), covariance_matrix.ncols());
        assert_eq!(symbols.len(), weights.len());

        Self {
            symbols,
            expected_returns,
            covariance_matrix,
            weights,
        }
    }

    pub fn get_index(&self, symbol: &str) -> Option<usize> {
        self.symbols.iter().position(|s| s == symbol)
    }

    pub fn get_weight(&self, symbol: &str) -> Option<f64> {
        let index = self.get_index(symbol)?;
        Some(self.weights[index])
    }

    /// Zero out weights below the cutoff, round the rest and keep only positive positions
    pub fn clean_weights(&self) -> Vec<AssetWeight> {
        self.symbols
            .iter()
            .zip(self.weights.iter())
            .filter(|(_, w)| w.abs() >= WEIGHT_CUTOFF)
            .filter_map(|(symbol, w)| {
                let weight = Decimal::from_f64(*w)?.round_dp(WEIGHT_ROUNDING_DP);
                (weight > Decimal::ZERO).then(|| AssetWeight::new(symbol.clone(), weight))
            })
            .collect()
    }

    pub fn performance(&self, risk_free_rate: f64) -> PortfolioPerformance {
        let expected_return = self.weights.dot(&self.expected_returns);
        let volatility = self
            .weights
            .dot(&self.covariance_matrix.dot(&self.weights))
            .max(0.0)
            .sqrt();
        let sharpe_ratio = if volatility > 0.0 {
            (expected_return - risk_free_rate) / volatility
        } else {
            0.0
        };

        PortfolioPerformance {
            expected_return,
            volatility,
            sharpe_ratio,
        }
    }

    pub fn log_portfolio_data(&self, risk_free_rate: f64) {
        let mut rows: Vec<(String, f64, f64, f64)> = self
            .symbols
            .iter()
            .enumerate()
            .map(|(i, symbol)| {
                let vol = self.covariance_matrix[[i, i]].max(0.0).sqrt();
                (symbol.clone(), self.weights[i], self.expected_returns[i], vol)
            })
            .collect();
        rows.sort_by(|a, b| b.1.partial_cmp(&a.1).unwrap_or(std::cmp::Ordering::Equal));

        let summary = rows
            .iter()
            .map(|(symbol, weight, ret, vol)| {
                format!(
                    "{}: Weight={:.2}%, Return={:.2}%, Vol={:.2}%",
                    symbol,
                    weight * 100.0,
                    ret * 100.0,
                    vol * 100.0
                )
            })
            .collect::<Vec<_>>()
            .join("\n  ");

        let perf = self.performance(risk_free_rate);
        info!(
            "Optimal Portfolio (sorted by weight):\n  {}\n\nPortfolio Summary:\n  Expected Return: {:.2}%\n  Volatility: {:.2}%\n  Sharpe Ratio: {:.3}",
            summary,
            perf.expected_return * 100.0,
            perf.volatility * 100.0,
            perf.sharpe_ratio
        );
    }
}
