use std::collections::{BTreeMap, BTreeSet, HashMap};

use chrono::NaiveDate;
use ndarray::{Array2, s};
use rust_decimal::Decimal;
use rust_decimal::prelude::*;
use tracing::debug;

use super::DataError;
use crate::execution::PriceQuote;

/// Date-keyed adjusted close prices for a single symbol
pub type PriceSeries = BTreeMap<NaiveDate, f64>;

/// Decimal places kept when a float close becomes a tradable quote
const QUOTE_DP: u32 = 6;

pub const DATE_FORMAT: &str = "%Y-%m-%d";

/// Adjusted close prices aligned on the dates every symbol has a valid price for
#[derive(Debug, Clone, PartialEq)]
pub struct PriceTable {
    symbols: Vec<String>,
    dates: Vec<NaiveDate>,
    prices: Array2<f64>, // rows = dates, columns = symbols
}

impl PriceTable {
    /// Join per-symbol series on their dates, dropping any date where a symbol is missing
    /// or has a non-finite / non-positive price. Column order follows `series`.
    pub fn from_series(series: Vec<(String, PriceSeries)>) -> Result<Self, DataError> {
        if let Some((symbol, _)) = series.iter().find(|(_, s)| s.is_empty()) {
            return Err(DataError::DataUnavailable(symbol.clone()));
        }

        let all_dates: BTreeSet<NaiveDate> = series
            .iter()
            .flat_map(|(_, s)| s.keys().copied())
            .collect();

        let mut dates = Vec::with_capacity(all_dates.len());
        let mut values = Vec::with_capacity(all_dates.len() * series.len());
        let mut dropped = 0usize;

        for date in all_dates {
            let row: Option<Vec<f64>> = series
                .iter()
                .map(|(_, s)| s.get(&date).copied().filter(|p| p.is_finite() && *p > 0.0))
                .collect();
            match row {
                Some(row) => {
                    dates.push(date);
                    values.extend(row);
                }
                None => dropped += 1,
            }
        }

        let symbols: Vec<String> = series.into_iter().map(|(symbol, _)| symbol).collect();
        let prices = Array2::from_shape_vec((dates.len(), symbols.len()), values)
            .map_err(|e| DataError::Parse(e.to_string()))?;

        debug!(symbols = symbols.len(), rows = dates.len(), dropped, "Price table assembled");

        Ok(Self {
            symbols,
            dates,
            prices,
        })
    }

    pub fn symbols(&self) -> &[String] {
        &self.symbols
    }

    pub fn dates(&self) -> &[NaiveDate] {
        &self.dates
    }

    pub fn prices(&self) -> &Array2<f64> {
        &self.prices
    }

    /// Number of aligned dates
    pub fn len(&self) -> usize {
        self.dates.len()
    }

    pub fn is_empty(&self) -> bool {
        self.dates.is_empty()
    }

    /// Simple daily returns, one row per date after the first
    pub fn returns(&self) -> Array2<f64> {
        if self.len() < 2 {
            return Array2::zeros((0, self.symbols.len()));
        }
        let previous = self.prices.slice(s![..-1, ..]);
        let current = self.prices.slice(s![1.., ..]);
        &current / &previous - 1.0
    }

    /// Dates matching the rows of [`PriceTable::returns`]
    pub fn return_dates(&self) -> &[NaiveDate] {
        if self.dates.is_empty() {
            &self.dates
        } else {
            &self.dates[1..]
        }
    }

    /// Last known price per symbol
    pub fn latest_quotes(&self) -> Vec<PriceQuote> {
        let Some(last) = self.len().checked_sub(1) else {
            return Vec::new();
        };
        self.symbols
            .iter()
            .zip(self.prices.row(last).iter())
            .filter_map(|(symbol, price)| {
                Decimal::from_f64(*price).map(|p| PriceQuote::new(symbol.clone(), p.round_dp(QUOTE_DP)))
            })
            .collect()
    }

    pub fn latest_price_map(&self) -> HashMap<String, Decimal> {
        self.latest_quotes()
            .into_iter()
            .map(|q| (q.symbol, q.price))
            .collect()
    }

    /// Symbol -> ("YYYY-MM-DD" -> price), the on-disk price file layout
    pub fn to_series_map(&self) -> BTreeMap<String, BTreeMap<String, f64>> {
        self.symbols
            .iter()
            .enumerate()
            .map(|(j, symbol)| {
                let column = self
                    .dates
                    .iter()
                    .zip(self.prices.column(j).iter())
                    .map(|(date, price)| (date.format(DATE_FORMAT).to_string(), *price))
                    .collect();
                (symbol.clone(), column)
            })
            .collect()
    }
}
