use std::collections::BTreeMap;
use std::fs;
use std::path::Path;

use chrono::NaiveDate;
use tracing::{info, instrument};

use super::price_table::{DATE_FORMAT, PriceSeries, PriceTable};
use super::{DataError, PriceSource};

/// Price source backed by series held in memory, usually loaded from a JSON price file:
/// `{ "AAPL": { "2021-01-04": 129.41, ... }, ... }`
#[derive(Debug, Clone, Default)]
pub struct LocalPriceSource {
    series: BTreeMap<String, PriceSeries>,
}

impl LocalPriceSource {
    pub fn new(series: BTreeMap<String, PriceSeries>) -> Self {
        Self { series }
    }

    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, DataError> {
        let raw = fs::read_to_string(path.as_ref())?;
        let source = Self::from_json(&raw)?;
        info!(path = %path.as_ref().display(), symbols = source.series.len(), "Loaded price file");
        Ok(source)
    }

    pub fn from_json(raw: &str) -> Result<Self, DataError> {
        let parsed: BTreeMap<String, BTreeMap<String, f64>> = serde_json::from_str(raw)?;

        let mut series = BTreeMap::new();
        for (symbol, points) in parsed {
            let mut symbol_series = PriceSeries::new();
            for (date, price) in points {
                let date = NaiveDate::parse_from_str(&date, DATE_FORMAT)
                    .map_err(|e| DataError::Parse(format!("{symbol} date {date:?}: {e}")))?;
                symbol_series.insert(date, price);
            }
            series.insert(symbol.to_uppercase(), symbol_series);
        }

        Ok(Self { series })
    }

    pub fn symbols(&self) -> impl Iterator<Item = &str> {
        self.series.keys().map(String::as_str)
    }
}

impl PriceSource for LocalPriceSource {
    fn name(&self) -> &'static str {
        "local"
    }

    #[instrument(skip(self), fields(source = "local"))]
    async fn fetch_prices(
        &self,
        symbols: &[String],
        start: NaiveDate,
        end: NaiveDate,
    ) -> Result<PriceTable, DataError> {
        if start > end {
            return Err(DataError::InvalidRange { start, end });
        }

        let mut selected = Vec::with_capacity(symbols.len());
        for symbol in symbols {
            let series = self
                .series
                .get(symbol)
                .ok_or_else(|| DataError::DataUnavailable(symbol.clone()))?;
            let in_range: PriceSeries = series
                .range(start..=end)
                .map(|(date, price)| (*date, *price))
                .collect();
            selected.push((symbol.clone(), in_range));
        }

        PriceTable::from_series(selected)
    }
}

/// Write a price table in the layout [`LocalPriceSource::from_file`] reads
pub fn write_price_file(path: impl AsRef<Path>, table: &PriceTable) -> Result<(), DataError> {
    let body = serde_json::to_string_pretty(&table.to_series_map())?;
    fs::write(path.as_ref(), body)?;
    info!(path = %path.as_ref().display(), rows = table.len(), "Wrote price file");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    const PRICES: &str = r#"{
        "aapl": { "2021-01-04": 129.41, "2021-01-05": 131.01, "2021-01-06": 126.60 },
        "MSFT": { "2021-01-04": 217.69, "2021-01-05": 217.90, "2021-01-06": 212.25 }
    }"#;

    fn day(d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(2021, 1, d).unwrap()
    }

    #[tokio::test]
    async fn fetch_filters_to_date_range() {
        let source = LocalPriceSource::from_json(PRICES).unwrap();
        let symbols = vec!["AAPL".to_string(), "MSFT".to_string()];

        let table = source.fetch_prices(&symbols, day(5), day(6)).await.unwrap();
        assert_eq!(table.dates(), &[day(5), day(6)]);
        assert_eq!(table.prices()[[0, 0]], 131.01);
    }

    #[tokio::test]
    async fn unknown_symbol_is_unavailable() {
        let source = LocalPriceSource::from_json(PRICES).unwrap();
        let symbols = vec!["AAPL".to_string(), "ZZZZ".to_string()];

        let err = source.fetch_prices(&symbols, day(4), day(6)).await.unwrap_err();
        assert!(matches!(err, DataError::DataUnavailable(s) if s == "ZZZZ"));
    }

    #[tokio::test]
    async fn symbol_without_prices_in_range_is_unavailable() {
        let source = LocalPriceSource::from_json(PRICES).unwrap();
        let symbols = vec!["AAPL".to_string()];
        let later = NaiveDate::from_ymd_opt(2022, 1, 3).unwrap();

        let err = source.fetch_prices(&symbols, later, later).await.unwrap_err();
        assert!(matches!(err, DataError::DataUnavailable(_)));
    }

    #[tokio::test]
    async fn reversed_range_is_rejected() {
        let source = LocalPriceSource::from_json(PRICES).unwrap();
        let symbols = vec!["AAPL".to_string()];

        let err = source.fetch_prices(&symbols, day(6), day(4)).await.unwrap_err();
        assert!(matches!(err, DataError::InvalidRange { start, end } if start == day(6) && end == day(4)));
    }

    #[test]
    fn malformed_date_is_a_parse_error() {
        let err = LocalPriceSource::from_json(r#"{ "A": { "04/01/2021": 1.0 } }"#).unwrap_err();
        assert!(matches!(err, DataError::Parse(_)));
    }

    #[tokio::test]
    async fn price_file_round_trips_through_disk() {
        let source = LocalPriceSource::from_json(PRICES).unwrap();
        let symbols = vec!["AAPL".to_string(), "MSFT".to_string()];
        let table = source.fetch_prices(&symbols, day(4), day(6)).await.unwrap();

        let path = std::env::temp_dir().join(format!("prices-{}.json", std::process::id()));
        write_price_file(&path, &table).unwrap();
        let reloaded = LocalPriceSource::from_file(&path).unwrap();
        fs::remove_file(&path).ok();

        let again = reloaded.fetch_prices(&symbols, day(4), day(6)).await.unwrap();
        assert_eq!(again, table);
    }
}
