use dotenvy::dotenv;
use eyre::{Result, WrapErr, eyre};
use std::env;
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;
use url::Url;

pub const DEFAULT_YAHOO_BASE_URL: &str = "https://query1.finance.yahoo.com";
pub const DEFAULT_RISK_FREE_RATE: f64 = 0.02;
pub const DEFAULT_TRADING_DAYS_PER_YEAR: u32 = 252;

/// Where price history comes from
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PriceSourceKind {
    Yahoo,
    File(PathBuf),
}

#[derive(Debug, Clone)]
pub struct YahooSettings {
    pub base_url: Url,
    pub timeout: Duration,
    pub max_retries: u32,
    pub requests_per_second: u32,
}

impl Default for YahooSettings {
    fn default() -> Self {
        Self {
            base_url: Url::parse(DEFAULT_YAHOO_BASE_URL).expect("default Yahoo url is valid"),
            timeout: Duration::from_secs(10),
            max_retries: 3,
            requests_per_second: 2,
        }
    }
}

#[derive(Debug, Clone)]
pub struct Config {
    pub price_source: PriceSourceKind,
    pub yahoo: YahooSettings,
    pub risk_free_rate: f64,
    pub trading_days_per_year: u32,
}

impl Config {
    /// Load from the process environment, reading `.env` first when present
    pub fn load() -> Result<Self> {
        dotenv().ok();
        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Build from any key lookup, so tests do not have to touch the real environment
    pub fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let price_source = match lookup("PRICE_SOURCE").as_deref().unwrap_or("yahoo") {
            "yahoo" => PriceSourceKind::Yahoo,
            "file" => {
                let path = lookup("PRICE_FILE").ok_or_else(|| eyre!("Missing PRICE_FILE (required when PRICE_SOURCE=file)"))?;
                PriceSourceKind::File(PathBuf::from(path))
            }
            other => return Err(eyre!("Invalid PRICE_SOURCE value {other:?} (must be 'yahoo' or 'file')")),
        };

        let defaults = YahooSettings::default();
        let base_url = match lookup("YAHOO_BASE_URL") {
            Some(raw) => Url::parse(&raw).wrap_err_with(|| format!("Invalid YAHOO_BASE_URL {raw:?}"))?,
            None => defaults.base_url,
        };
        let timeout_secs: u64 = parse_or(&lookup, "HTTP_TIMEOUT_SECS", defaults.timeout.as_secs())?;
        let max_retries = parse_or(&lookup, "HTTP_MAX_RETRIES", defaults.max_retries)?;
        let requests_per_second = parse_or(&lookup, "REQUESTS_PER_SECOND", defaults.requests_per_second)?;
        if requests_per_second == 0 {
            return Err(eyre!("REQUESTS_PER_SECOND must be at least 1"));
        }

        let risk_free_rate = parse_or(&lookup, "RISK_FREE_RATE", DEFAULT_RISK_FREE_RATE)?;
        if !risk_free_rate.is_finite() {
            return Err(eyre!("RISK_FREE_RATE must be a finite number"));
        }
        let trading_days_per_year = parse_or(&lookup, "TRADING_DAYS_PER_YEAR", DEFAULT_TRADING_DAYS_PER_YEAR)?;
        if trading_days_per_year == 0 {
            return Err(eyre!("TRADING_DAYS_PER_YEAR must be at least 1"));
        }

        Ok(Config {
            price_source,
            yahoo: YahooSettings {
                base_url,
                timeout: Duration::from_secs(timeout_secs),
                max_retries,
                requests_per_second,
            },
            risk_free_rate,
            trading_days_per_year,
        })
    }
}

fn parse_or<F, T>(lookup: &F, key: &str, default: T) -> Result<T>
where
    F: Fn(&str) -> Option<String>,
    T: FromStr,
    T::Err: std::fmt::Display,
{
    match lookup(key) {
        Some(raw) => raw
            .trim()
            .parse::<T>()
            .map_err(|e| eyre!("Invalid {key} value {raw:?}: {e}")),
        None => Ok(default),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn config_from(vars: &[(&str, &str)]) -> Result<Config> {
        let vars: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        Config::from_lookup(|key| vars.get(key).cloned())
    }

    #[test]
    fn defaults_to_yahoo() {
        let cfg = config_from(&[]).unwrap();

        assert_eq!(cfg.price_source, PriceSourceKind::Yahoo);
        assert_eq!(cfg.yahoo.base_url.as_str(), "https://query1.finance.yahoo.com/");
        assert_eq!(cfg.risk_free_rate, 0.02);
        assert_eq!(cfg.trading_days_per_year, 252);
    }

    #[test]
    fn file_source_needs_a_path() {
        assert!(config_from(&[("PRICE_SOURCE", "file")]).is_err());

        let cfg = config_from(&[("PRICE_SOURCE", "file"), ("PRICE_FILE", "prices.json")]).unwrap();
        assert_eq!(cfg.price_source, PriceSourceKind::File(PathBuf::from("prices.json")));
    }

    #[test]
    fn bad_numbers_name_the_variable() {
        let err = config_from(&[("RISK_FREE_RATE", "two percent")]).unwrap_err();
        assert!(err.to_string().contains("RISK_FREE_RATE"));

        assert!(config_from(&[("REQUESTS_PER_SECOND", "0")]).is_err());
        assert!(config_from(&[("PRICE_SOURCE", "bloomberg")]).is_err());
    }
}
