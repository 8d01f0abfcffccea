use std::fmt;

use chrono::NaiveDate;
use rust_decimal::Decimal;
use serde::Serialize;
use thiserror::Error;
use tracing::{Instrument, info, info_span, warn};

use crate::execution::{self, AllocationError, AllocationPlan, AssetWeight};
use crate::market_data::{DataError, PriceSource};
use crate::strategy::performance::{CumulativePoint, cumulative_returns};
use crate::strategy::{
    Objective, OptimizationError, PortfolioPerformance, covariance, expected_returns, optimizer,
};

/// Everything one optimisation run needs, passed explicitly instead of living in UI state
#[derive(Debug, Clone, Serialize)]
pub struct PortfolioRequest {
    pub tickers: Vec<String>,
    pub start: NaiveDate,
    pub end: NaiveDate,
    pub objective: Objective,
    pub budget: Decimal,
    pub risk_free_rate: f64,
    pub frequency: u32, // Trading days per year used to annualise
}

impl PortfolioRequest {
    /// Split a comma-separated ticker list: trimmed, uppercased, blanks and repeats removed
    pub fn parse_tickers(input: &str) -> Vec<String> {
        let mut tickers: Vec<String> = Vec::new();
        for raw in input.split(',') {
            let ticker = raw.trim().to_uppercase();
            if !ticker.is_empty() && !tickers.contains(&ticker) {
                tickers.push(ticker);
            }
        }
        tickers
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stage {
    DataFetch,
    Optimization,
    Allocation,
}

impl Stage {
    pub fn as_str(&self) -> &'static str {
        match self {
            Stage::DataFetch => "data fetch",
            Stage::Optimization => "optimization",
            Stage::Allocation => "allocation",
        }
    }
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Failure of one request, tagged with the stage that produced it
#[derive(Debug, Error)]
pub enum PipelineError {
    #[error("data fetch failed: {0}")]
    DataFetch(#[from] DataError),
    #[error("optimization failed: {0}")]
    Optimization(#[from] OptimizationError),
    #[error("allocation failed: {0}")]
    Allocation(#[from] AllocationError),
}

impl PipelineError {
    pub fn stage(&self) -> Stage {
        match self {
            PipelineError::DataFetch(_) => Stage::DataFetch,
            PipelineError::Optimization(_) => Stage::Optimization,
            PipelineError::Allocation(_) => Stage::Allocation,
        }
    }
}

/// Terminal output of a run, handed to a renderer
#[derive(Debug, Clone, Serialize)]
pub struct PortfolioReport {
    pub request: PortfolioRequest,
    pub weights: Vec<AssetWeight>,
    pub performance: Option<PortfolioPerformance>,
    pub plan: AllocationPlan,
    pub cumulative_returns: Vec<CumulativePoint>,
}

/// Fetch prices, estimate, optimise, allocate and build the performance series for one request
pub async fn run_pipeline<S: PriceSource>(
    source: &S,
    request: &PortfolioRequest,
) -> Result<PortfolioReport, PipelineError> {
    info!(
        tickers = ?request.tickers,
        objective = %request.objective,
        budget = %request.budget,
        source = source.name(),
        "Running portfolio request"
    );

    if request.budget <= Decimal::ZERO {
        return Err(AllocationError::InvalidBudget.into());
    }

    if request.tickers.is_empty() {
        warn!("No tickers selected, returning an uninvested plan");
        return Ok(PortfolioReport {
            request: request.clone(),
            weights: Vec::new(),
            performance: None,
            plan: AllocationPlan::uninvested(request.budget),
            cumulative_returns: Vec::new(),
        });
    }

    let table = source
        .fetch_prices(&request.tickers, request.start, request.end)
        .instrument(info_span!("fetch_prices", timed = true))
        .await?;
    info!(rows = table.len(), "Price history loaded");

    let portfolio = info_span!("optimize", timed = true).in_scope(|| {
        let mu = expected_returns::mean_historical_return(&table, request.frequency)?;
        let cov = covariance::sample_covariance(&table, request.frequency)?;
        optimizer::optimize(
            table.symbols().to_vec(),
            mu,
            cov,
            request.objective,
            request.risk_free_rate,
        )
    })?;
    portfolio.log_portfolio_data(request.risk_free_rate);

    let weights = portfolio.clean_weights();
    let plan = info_span!("allocate", timed = true)
        .in_scope(|| execution::allocate(&weights, &table.latest_price_map(), request.budget))?;
    info!(spent = %plan.spent(), leftover = %plan.leftover_cash, "Allocation ready");

    let cumulative = cumulative_returns(&table, &plan);

    Ok(PortfolioReport {
        request: request.clone(),
        weights,
        performance: Some(portfolio.performance(request.risk_free_rate)),
        plan,
        cumulative_returns: cumulative,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn tickers_are_normalised() {
        assert_eq!(
            PortfolioRequest::parse_tickers(" aapl, goog,,MSFT ,AAPL"),
            vec!["AAPL", "GOOG", "MSFT"]
        );
        assert!(PortfolioRequest::parse_tickers(" , ").is_empty());
    }

    #[test]
    fn errors_name_their_stage() {
        let err = PipelineError::from(DataError::DataUnavailable("XYZ".to_string()));
        assert_eq!(err.stage(), Stage::DataFetch);
        assert_eq!(err.to_string(), "data fetch failed: no price data available for XYZ");

        let err = PipelineError::from(AllocationError::InvalidPrice("A".to_string()));
        assert_eq!(err.stage(), Stage::Allocation);
        assert!(err.to_string().starts_with("allocation failed"));
    }
}
