use chrono::NaiveDate;
use ndarray::{Array1, Axis};
use rust_decimal::prelude::*;
use serde::Serialize;

use crate::execution::AllocationPlan;
use crate::market_data::PriceTable;

/// Growth of one unit invested at the start of the history
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct CumulativePoint {
    pub date: NaiveDate,
    pub portfolio: f64,
    pub benchmark: f64, // Equal-weight basket of every requested symbol
}

/// Replay the allocated holdings over the price history.
///
/// Each holding is weighted by its share of the budget at the latest prices; leftover cash
/// earns nothing.
pub fn cumulative_returns(table: &PriceTable, plan: &AllocationPlan) -> Vec<CumulativePoint> {
    let returns = table.returns();
    if returns.nrows() == 0 || table.symbols().is_empty() {
        return Vec::new();
    }

    let budget = plan.budget.to_f64().unwrap_or(0.0);
    let held_weights = Array1::from_iter(table.symbols().iter().map(|symbol| {
        plan.positions
            .iter()
            .find(|p| &p.symbol == symbol)
            .and_then(|p| p.cost().to_f64())
            .filter(|_| budget > 0.0)
            .map_or(0.0, |cost| cost / budget)
    }));

    let portfolio_returns = returns.dot(&held_weights);
    let benchmark_returns = returns
        .mean_axis(Axis(1))
        .unwrap_or_else(|| Array1::zeros(returns.nrows()));

    let mut portfolio = 1.0;
    let mut benchmark = 1.0;
    table
        .return_dates()
        .iter()
        .zip(portfolio_returns.iter().zip(benchmark_returns.iter()))
        .map(|(date, (p, b))| {
            portfolio *= 1.0 + p;
            benchmark *= 1.0 + b;
            CumulativePoint {
                date: *date,
                portfolio,
                benchmark,
            }
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::execution::Position;
    use crate::market_data::price_table::PriceSeries;
    use rust_decimal::Decimal;
    use rust_decimal::dec;

    fn table() -> PriceTable {
        let day = |d| NaiveDate::from_ymd_opt(2021, 6, d).unwrap();
        let a: PriceSeries = [(day(1), 100.0), (day(2), 110.0), (day(3), 99.0)].into_iter().collect();
        let b: PriceSeries = [(day(1), 50.0), (day(2), 50.0), (day(3), 55.0)].into_iter().collect();
        PriceTable::from_series(vec![("A".to_string(), a), ("B".to_string(), b)]).unwrap()
    }

    fn plan(shares_a: u64, budget: Decimal) -> AllocationPlan {
        let position = Position {
            symbol: "A".to_string(),
            shares: shares_a,
            price: dec!(99),
            target_weight: Decimal::ONE,
        };
        let leftover_cash = budget - position.cost();
        AllocationPlan {
            budget,
            positions: vec![position],
            leftover_cash,
        }
    }

    #[test]
    fn fully_invested_tracks_the_asset() {
        let points = cumulative_returns(&table(), &plan(10, dec!(990)));

        assert_eq!(points.len(), 2);
        assert!((points[0].portfolio - 1.10).abs() < 1e-12);
        assert!((points[1].portfolio - 0.99).abs() < 1e-12);
    }

    #[test]
    fn cash_dampens_returns() {
        let points = cumulative_returns(&table(), &plan(5, dec!(990)));
        assert!((points[0].portfolio - 1.05).abs() < 1e-12);
    }

    #[test]
    fn benchmark_is_equal_weighted() {
        let points = cumulative_returns(&table(), &plan(10, dec!(990)));

        // Day 2: (+10% + 0%) / 2, day 3: (-10% + 10%) / 2
        assert!((points[0].benchmark - 1.05).abs() < 1e-12);
        assert!((points[1].benchmark - 1.05).abs() < 1e-12);
    }

    #[test]
    fn empty_plan_stays_flat() {
        let points = cumulative_returns(&table(), &AllocationPlan::uninvested(dec!(1000)));
        assert!(points.iter().all(|p| p.portfolio == 1.0));
    }
}
