use std::collections::BTreeMap;

use chrono::{Days, NaiveDate};
use rust_decimal::Decimal;
use rust_decimal::dec;

use portfolio_optimizer::market_data::price_table::PriceSeries;
use portfolio_optimizer::market_data::{LocalPriceSource, PriceSource, write_price_file};
use portfolio_optimizer::pipeline::{PortfolioRequest, Stage, run_pipeline};
use portfolio_optimizer::strategy::Objective;

const DAYS: u64 = 250;

fn start() -> NaiveDate {
    NaiveDate::from_ymd_opt(2020, 1, 1).unwrap()
}

fn synthetic_series(base: f64, drift: f64, wiggle: f64, freq: f64, phase: f64) -> PriceSeries {
    (0..DAYS)
        .map(|i| {
            let t = i as f64;
            let price = base * (drift * t + wiggle * (freq * t + phase).sin()).exp();
            (start() + Days::new(i), price)
        })
        .collect()
}

fn source() -> LocalPriceSource {
    let mut series = BTreeMap::new();
    series.insert("AAA".to_string(), synthetic_series(100.0, 0.0008, 0.010, 0.70, 0.0));
    series.insert("BBB".to_string(), synthetic_series(50.0, 0.0004, 0.015, 1.30, 1.0));
    series.insert("CCC".to_string(), synthetic_series(20.0, 0.0002, 0.008, 0.37, 2.0));
    LocalPriceSource::new(series)
}

fn request(tickers: &str, objective: Objective, budget: Decimal) -> PortfolioRequest {
    PortfolioRequest {
        tickers: PortfolioRequest::parse_tickers(tickers),
        start: start(),
        end: start() + Days::new(DAYS),
        objective,
        budget,
        risk_free_rate: 0.02,
        frequency: 252,
    }
}

#[tokio::test]
async fn max_sharpe_run_stays_within_budget() {
    let budget = dec!(10000);
    let report = run_pipeline(&source(), &request("aaa,bbb,ccc", Objective::MaxSharpe, budget))
        .await
        .unwrap();

    let weight_sum: Decimal = report.weights.iter().map(|w| w.weight).sum();
    assert!((weight_sum - Decimal::ONE).abs() < dec!(0.001));

    let plan = &report.plan;
    assert!(!plan.is_empty());
    assert!(plan.spent() <= budget);
    assert_eq!(plan.spent() + plan.leftover_cash, budget);
    assert!(plan.positions.iter().all(|p| p.price > Decimal::ZERO));

    let perf = report.performance.unwrap();
    assert!(perf.volatility > 0.0);
    assert!(perf.sharpe_ratio.is_finite());

    assert_eq!(report.cumulative_returns.len(), DAYS as usize - 1);
}

#[tokio::test]
async fn min_volatility_run_from_a_price_file() {
    let table = source()
        .fetch_prices(&PortfolioRequest::parse_tickers("AAA,BBB,CCC"), start(), start() + Days::new(DAYS))
        .await
        .unwrap();
    let path = std::env::temp_dir().join(format!("pipeline_prices_{}.json", std::process::id()));
    write_price_file(&path, &table).unwrap();
    let file_source = LocalPriceSource::from_file(&path).unwrap();
    std::fs::remove_file(&path).ok();

    let budget = dec!(2500.50);
    let report = run_pipeline(&file_source, &request("AAA,BBB,CCC", Objective::MinVolatility, budget))
        .await
        .unwrap();

    assert!(report.plan.spent() <= budget);
    assert!(report.plan.leftover_cash >= Decimal::ZERO);
}

#[tokio::test]
async fn no_tickers_keeps_the_budget_as_cash() {
    let report = run_pipeline(&source(), &request(" , ", Objective::MaxSharpe, dec!(500)))
        .await
        .unwrap();

    assert!(report.plan.is_empty());
    assert_eq!(report.plan.leftover_cash, dec!(500));
    assert!(report.performance.is_none());
    assert!(report.cumulative_returns.is_empty());
}

#[tokio::test]
async fn unknown_ticker_fails_at_data_fetch() {
    let err = run_pipeline(&source(), &request("AAA,ZZZ", Objective::MaxSharpe, dec!(1000)))
        .await
        .unwrap_err();

    assert_eq!(err.stage(), Stage::DataFetch);
    assert!(err.to_string().contains("ZZZ"));
}

#[tokio::test]
async fn unreachable_return_target_fails_at_optimization() {
    let err = run_pipeline(&source(), &request("AAA,BBB", Objective::TargetReturn(5.0), dec!(1000)))
        .await
        .unwrap_err();

    assert_eq!(err.stage(), Stage::Optimization);
}

#[tokio::test]
async fn zero_budget_fails_at_allocation() {
    let err = run_pipeline(&source(), &request("AAA,BBB", Objective::MinVolatility, Decimal::ZERO))
        .await
        .unwrap_err();

    assert_eq!(err.stage(), Stage::Allocation);
}
