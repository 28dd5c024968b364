//! Configuration loader and application settings.

use crate::arbitrage::{DEFAULT_MIN_PROFIT_PCT, DEFAULT_TIME_WINDOW_SECS, DetectorConfig};
use crate::errors::{AppError, Result};
use crate::source::bitquery::BITQUERY_EAP_ENDPOINT;
use std::str::FromStr;
use std::time::Duration;
use url::Url;

/// Wrapped SOL mint, scanned when `ASSETS` is not set.
pub const DEFAULT_ASSET: &str = "So11111111111111111111111111111111111111112";

/// Consolidated application configuration.
#[derive(Debug, Clone)]
pub struct AppConfig {
    /// API key sent as `X-API-KEY`.
    pub api_key: String,
    /// GraphQL endpoint of the trade provider.
    pub endpoint: Url,
    /// Mint addresses to scan.
    pub assets: Vec<String>,
    pub detector: DetectorConfig,
    /// Trades requested per fetch.
    pub fetch_limit: u32,
    /// Opportunities reported per asset and cycle.
    pub top_k: usize,
    /// Scan cadence; `None` runs a single pass.
    pub poll_interval: Option<Duration>,
    /// Lookback for the price history report; `None` disables it.
    pub history_days: Option<u32>,
    /// Number of recent Jupiter swaps to log at startup; `None` disables it.
    pub jupiter_limit: Option<u32>,
    /// Also emit ranked opportunities as JSON.
    pub log_json: bool,
}

impl AppConfig {
    /// Load configuration from process environment variables.
    pub fn load() -> Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Load configuration through an arbitrary key lookup.
    pub fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| lookup(key).map(|v| v.trim().to_string()).filter(|v| !v.is_empty());

        let api_key = get("BITQUERY_API_KEY").ok_or_else(|| {
            AppError::InvalidConfiguration(
                "Set BITQUERY_API_KEY env var to your Bitquery API key".into(),
            )
        })?;
        let endpoint = Url::parse(
            &get("BITQUERY_ENDPOINT").unwrap_or_else(|| BITQUERY_EAP_ENDPOINT.to_string()),
        )?;

        let assets: Vec<String> = get("ASSETS")
            .unwrap_or_else(|| DEFAULT_ASSET.to_string())
            .split(',')
            .map(str::trim)
            .filter(|a| !a.is_empty())
            .map(String::from)
            .collect();
        if assets.is_empty() {
            return Err(AppError::InvalidConfiguration(
                "ASSETS must list at least one mint address".into(),
            ));
        }

        let time_window_secs: f64 = parse_or(&get, "TIME_WINDOW_SECS", DEFAULT_TIME_WINDOW_SECS as f64)?;
        let min_profit_pct: f64 = parse_or(&get, "MIN_PROFIT_PCT", DEFAULT_MIN_PROFIT_PCT)?;
        let detector = DetectorConfig::from_secs(time_window_secs, min_profit_pct)?;

        let fetch_limit: u32 = parse_or(&get, "FETCH_LIMIT", 100)?;
        if fetch_limit == 0 {
            return Err(AppError::InvalidConfiguration(
                "FETCH_LIMIT must be greater than zero".into(),
            ));
        }
        let top_k: usize = parse_or(&get, "TOP_K", 5)?;
        let poll_secs: u64 = parse_or(&get, "POLL_INTERVAL_SECS", 60)?;
        let history_days: u32 = parse_or(&get, "HISTORY_DAYS", 0)?;
        let jupiter_limit: u32 = parse_or(&get, "JUPITER_LIMIT", 0)?;
        let log_json = get("LOG_JSON").is_some_and(|v| v == "1" || v.eq_ignore_ascii_case("true"));

        Ok(Self {
            api_key,
            endpoint,
            assets,
            detector,
            fetch_limit,
            top_k,
            poll_interval: (poll_secs > 0).then(|| Duration::from_secs(poll_secs)),
            history_days: (history_days > 0).then_some(history_days),
            jupiter_limit: (jupiter_limit > 0).then_some(jupiter_limit),
            log_json,
        })
    }
}

/// Parse `key` if set, otherwise use `default`. Unparseable values are errors.
fn parse_or<T, G>(get: &G, key: &str, default: T) -> Result<T>
where
    T: FromStr,
    T::Err: std::fmt::Display,
    G: Fn(&str) -> Option<String>,
{
    match get(key) {
        None => Ok(default),
        Some(raw) => raw.parse().map_err(|e: T::Err| {
            AppError::InvalidConfiguration(format!("{key}={raw:?} is invalid: {e}"))
        }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeDelta;
    use std::collections::HashMap;

    fn load(vars: &[(&str, &str)]) -> Result<AppConfig> {
        let map: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        AppConfig::from_lookup(|key| map.get(key).cloned())
    }

    #[test]
    fn defaults_apply_when_only_key_is_set() {
        let config = load(&[("BITQUERY_API_KEY", "abc")]).unwrap();
        assert_eq!(config.api_key, "abc");
        assert_eq!(config.endpoint.as_str(), BITQUERY_EAP_ENDPOINT);
        assert_eq!(config.assets, vec![DEFAULT_ASSET.to_string()]);
        assert_eq!(config.detector.time_window(), TimeDelta::seconds(300));
        assert_eq!(config.detector.min_profit_pct(), 1.0);
        assert_eq!(config.fetch_limit, 100);
        assert_eq!(config.top_k, 5);
        assert_eq!(config.poll_interval, Some(Duration::from_secs(60)));
        assert_eq!(config.history_days, None);
        assert_eq!(config.jupiter_limit, None);
        assert!(!config.log_json);
    }

    #[test]
    fn missing_api_key_is_rejected() {
        assert!(matches!(load(&[]), Err(AppError::InvalidConfiguration(_))));
        assert!(matches!(
            load(&[("BITQUERY_API_KEY", "   ")]),
            Err(AppError::InvalidConfiguration(_))
        ));
    }

    #[test]
    fn overrides_are_parsed() {
        let config = load(&[
            ("BITQUERY_API_KEY", "abc"),
            ("ASSETS", " mintA, ,mintB "),
            ("TIME_WINDOW_SECS", "30"),
            ("MIN_PROFIT_PCT", "0.5"),
            ("FETCH_LIMIT", "250"),
            ("TOP_K", "10"),
            ("POLL_INTERVAL_SECS", "0"),
            ("HISTORY_DAYS", "7"),
            ("JUPITER_LIMIT", "50"),
            ("LOG_JSON", "true"),
        ])
        .unwrap();
        assert_eq!(config.assets, vec!["mintA".to_string(), "mintB".to_string()]);
        assert_eq!(config.detector.time_window(), TimeDelta::seconds(30));
        assert_eq!(config.detector.min_profit_pct(), 0.5);
        assert_eq!(config.fetch_limit, 250);
        assert_eq!(config.top_k, 10);
        assert_eq!(config.poll_interval, None);
        assert_eq!(config.history_days, Some(7));
        assert_eq!(config.jupiter_limit, Some(50));
        assert!(config.log_json);
    }

    #[test]
    fn negative_detector_settings_are_not_clamped() {
        let err = load(&[("BITQUERY_API_KEY", "abc"), ("TIME_WINDOW_SECS", "-5")]).unwrap_err();
        assert!(matches!(err, AppError::InvalidConfiguration(_)));
        let err = load(&[("BITQUERY_API_KEY", "abc"), ("MIN_PROFIT_PCT", "-1")]).unwrap_err();
        assert!(matches!(err, AppError::InvalidConfiguration(_)));
    }

    #[test]
    fn garbage_values_fail_fast() {
        let err = load(&[("BITQUERY_API_KEY", "abc"), ("TOP_K", "many")]).unwrap_err();
        assert!(err.to_string().contains("TOP_K"));
        assert!(load(&[("BITQUERY_API_KEY", "abc"), ("FETCH_LIMIT", "0")]).is_err());
        assert!(matches!(
            load(&[("BITQUERY_API_KEY", "abc"), ("BITQUERY_ENDPOINT", "not a url")]),
            Err(AppError::UrlParse(_))
        ));
        assert!(load(&[("BITQUERY_API_KEY", "abc"), ("ASSETS", " , ")]).is_err());
    }
}
