pub mod local;
pub mod price_table;
pub mod yahoo;

use std::future::Future;

use chrono::NaiveDate;
use thiserror::Error;

pub use local::{LocalPriceSource, write_price_file};
pub use price_table::PriceTable;
pub use yahoo::YahooPriceSource;

/// Anything that can deliver a date x symbol table of adjusted close prices
pub trait PriceSource {
    fn name(&self) -> &'static str;

    fn fetch_prices(
        &self,
        symbols: &[String],
        start: NaiveDate,
        end: NaiveDate,
    ) -> impl Future<Output = Result<PriceTable, DataError>> + Send;
}

#[derive(Debug, Error)]
pub enum DataError {
    #[error("no price data available for {0}")]
    DataUnavailable(String),
    #[error("invalid date range {start} .. {end}")]
    InvalidRange { start: NaiveDate, end: NaiveDate },
    #[error("http request failed: {0}")]
    Http(String),
    #[error("failed to parse price data: {0}")]
    Parse(String),
    #[error("price file error: {0}")]
    Io(#[from] std::io::Error),
}

impl From<reqwest_middleware::Error> for DataError {
    fn from(err: reqwest_middleware::Error) -> Self {
        DataError::Http(err.to_string())
    }
}

impl From<reqwest::Error> for DataError {
    fn from(err: reqwest::Error) -> Self {
        DataError::Http(err.to_string())
    }
}

impl From<serde_json::Error> for DataError {
    fn from(err: serde_json::Error) -> Self {
        DataError::Parse(err.to_string())
    }
}
