use std::num::NonZeroU32;
use std::sync::Arc;

use chrono::{DateTime, Duration, NaiveDate};
use futures::future::try_join_all;
use governor::{DefaultDirectRateLimiter, Quota};
use nonzero_ext::*;
use reqwest::StatusCode;
use reqwest_middleware::{ClientBuilder, ClientWithMiddleware};
use reqwest_retry::{RetryTransientMiddleware, policies::ExponentialBackoff};
use serde::Deserialize;
use tracing::{debug, instrument, warn};
use url::Url;

use super::price_table::{PriceSeries, PriceTable};
use super::{DataError, PriceSource};
use crate::config::YahooSettings;

const USER_AGENT: &str = concat!(env!("CARGO_PKG_NAME"), "/", env!("CARGO_PKG_VERSION"));

struct YahooRateLimiter {
    rate_limiter: Arc<DefaultDirectRateLimiter>,
}

impl reqwest_ratelimit::RateLimiter for YahooRateLimiter {
    async fn acquire_permit(&self) {
        self.rate_limiter.until_ready().await;
    }
}

/// Daily adjusted closes from the Yahoo Finance chart API
#[derive(Debug, Clone)]
pub struct YahooPriceSource {
    http_client: ClientWithMiddleware,
    base_url: Url,
}

impl YahooPriceSource {
    pub fn new(settings: &YahooSettings) -> Result<Self, DataError> {
        let reqwest_client = reqwest::Client::builder()
            .timeout(settings.timeout)
            .user_agent(USER_AGENT)
            .build()?;

        let retry_policy = ExponentialBackoff::builder()
            .retry_bounds(std::time::Duration::from_millis(500), std::time::Duration::from_secs(4))
            .build_with_max_retries(settings.max_retries);

        let per_second = NonZeroU32::new(settings.requests_per_second).unwrap_or(nonzero!(2u32));
        let rate_limiter = YahooRateLimiter {
            rate_limiter: Arc::new(DefaultDirectRateLimiter::direct(Quota::per_second(per_second))),
        };

        let http_client = ClientBuilder::new(reqwest_client)
            .with(RetryTransientMiddleware::new_with_policy(retry_policy))
            .with(reqwest_ratelimit::all(rate_limiter))
            .build();

        Ok(Self {
            http_client,
            base_url: settings.base_url.clone(),
        })
    }

    fn chart_url(&self, symbol: &str) -> Result<Url, DataError> {
        let mut url = self.base_url.clone();
        url.path_segments_mut()
            .map_err(|_| DataError::Http(format!("unusable base url {}", self.base_url)))?
            .pop_if_empty()
            .extend(["v8", "finance", "chart", symbol]);
        Ok(url)
    }

    #[instrument(skip(self))]
    async fn fetch_series(
        &self,
        symbol: &str,
        start: NaiveDate,
        end: NaiveDate,
    ) -> Result<PriceSeries, DataError> {
        let url = self.chart_url(symbol)?;
        let period1 = start.and_hms_opt(0, 0, 0).map(|t| t.and_utc().timestamp()).unwrap_or_default();
        let period2 = end
            .checked_add_signed(Duration::days(1))
            .ok_or(DataError::InvalidRange { start, end })?
            .and_hms_opt(0, 0, 0)
            .map(|t| t.and_utc().timestamp())
            .unwrap_or_default();
        let params = [
            ("period1", period1.to_string()),
            ("period2", period2.to_string()),
            ("interval", "1d".to_string()),
            ("events", "div,split".to_string()),
            ("includeAdjustedClose", "true".to_string()),
        ];

        let response = self.http_client.get(url).query(&params).send().await?;
        if response.status() == StatusCode::NOT_FOUND {
            warn!(symbol, "Yahoo has no chart for symbol");
            return Err(DataError::DataUnavailable(symbol.to_string()));
        }
        let body = response.error_for_status()?.text().await?;

        let series: PriceSeries = parse_chart_response(symbol, &body)?
            .into_iter()
            .filter(|(date, _)| *date >= start && *date <= end)
            .collect();
        debug!(symbol, points = series.len(), "Fetched daily closes");

        Ok(series)
    }
}

impl PriceSource for YahooPriceSource {
    fn name(&self) -> &'static str {
        "yahoo"
    }

    async fn fetch_prices(
        &self,
        symbols: &[String],
        start: NaiveDate,
        end: NaiveDate,
    ) -> Result<PriceTable, DataError> {
        if start > end {
            return Err(DataError::InvalidRange { start, end });
        }

        let fetched = try_join_all(symbols.iter().map(|s| self.fetch_series(s, start, end))).await?;
        PriceTable::from_series(symbols.iter().cloned().zip(fetched).collect())
    }
}

#[derive(Debug, Deserialize)]
struct ChartEnvelope {
    chart: Chart,
}

#[derive(Debug, Deserialize)]
struct Chart {
    result: Option<Vec<ChartResult>>,
    error: Option<ChartError>,
}

#[derive(Debug, Deserialize)]
struct ChartError {
    code: Option<String>,
    description: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ChartResult {
    meta: Option<ChartMeta>,
    timestamp: Option<Vec<i64>>,
    indicators: Indicators,
}

#[derive(Debug, Deserialize)]
struct ChartMeta {
    gmtoffset: Option<i64>, // Exchange offset from UTC in seconds
}

#[derive(Debug, Deserialize)]
struct Indicators {
    #[serde(default)]
    quote: Vec<QuoteIndicator>,
    adjclose: Option<Vec<AdjCloseIndicator>>,
}

#[derive(Debug, Deserialize)]
struct QuoteIndicator {
    close: Option<Vec<Option<f64>>>,
}

#[derive(Debug, Deserialize)]
struct AdjCloseIndicator {
    adjclose: Vec<Option<f64>>,
}

/// Turn a chart API body into exchange-local dated closes, adjusted where available
fn parse_chart_response(symbol: &str, body: &str) -> Result<PriceSeries, DataError> {
    let envelope: ChartEnvelope = serde_json::from_str(body)?;

    if let Some(error) = envelope.chart.error {
        warn!(
            symbol,
            code = error.code.as_deref().unwrap_or_default(),
            description = error.description.as_deref().unwrap_or_default(),
            "Yahoo returned a chart error"
        );
        return Err(DataError::DataUnavailable(symbol.to_string()));
    }

    let Some(result) = envelope.chart.result.and_then(|r| r.into_iter().next()) else {
        return Err(DataError::DataUnavailable(symbol.to_string()));
    };

    let offset = result.meta.and_then(|m| m.gmtoffset).unwrap_or(0);
    let timestamps = result.timestamp.unwrap_or_default();
    let closes = result
        .indicators
        .adjclose
        .and_then(|a| a.into_iter().next())
        .map(|a| a.adjclose)
        .or_else(|| result.indicators.quote.into_iter().next().and_then(|q| q.close))
        .ok_or_else(|| DataError::Parse(format!("{symbol}: chart has no close prices")))?;

    if closes.len() != timestamps.len() {
        return Err(DataError::Parse(format!(
            "{symbol}: {} timestamps but {} closes",
            timestamps.len(),
            closes.len()
        )));
    }

    let mut series = PriceSeries::new();
    for (ts, close) in timestamps.into_iter().zip(closes) {
        let (Some(close), Some(at)) = (close, DateTime::from_timestamp(ts + offset, 0)) else {
            continue;
        };
        series.insert(at.date_naive(), close);
    }

    if series.is_empty() {
        return Err(DataError::DataUnavailable(symbol.to_string()));
    }

    Ok(series)
}
