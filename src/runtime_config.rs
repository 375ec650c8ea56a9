// =============================================================================
// Runtime Configuration — feeds to run and exchange endpoints
// =============================================================================
//
// Loaded from a JSON file; every field carries a serde default so a partial
// (or empty) file is valid. Environment variables override the feed list
// after loading:
//   CANDLES_TRADING_PAIRS  comma-separated pairs, e.g. "BTC-BRL,ETH-BRL"
//   CANDLES_INTERVALS      comma-separated labels, e.g. "1m,1h"
//   CANDLES_MAX_RECORDS    buffer capacity per feed
// =============================================================================

use std::path::Path;
use std::time::Duration;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::error::FeedError;
use crate::exchange::foxbit;
use crate::types::Interval;

// =============================================================================
// Default-value helpers (required by serde `default = "..."` attribute)
// =============================================================================

fn default_trading_pairs() -> Vec<String> {
    vec!["BTC-BRL".to_string()]
}

fn default_intervals() -> Vec<Interval> {
    vec![Interval::OneMinute]
}

fn default_max_records() -> usize {
    foxbit::MAX_RESULTS_PER_REQUEST
}

fn default_retry_interval_ms() -> u64 {
    1_000
}

fn default_request_timeout_secs() -> u64 {
    10
}

fn default_feed_start_delay_ms() -> u64 {
    1_000
}

fn default_rest_url() -> String {
    foxbit::REST_URL.to_string()
}

fn default_rest_v2_url() -> String {
    foxbit::REST_V2_URL.to_string()
}

fn default_wss_url() -> String {
    foxbit::WSS_URL.to_string()
}

// =============================================================================
// ExchangeConfig
// =============================================================================

/// Exchange endpoints. Defaults point at the public Foxbit API.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExchangeConfig {
    #[serde(default = "default_rest_url")]
    pub rest_url: String,

    /// Legacy API host serving the instrument list.
    #[serde(default = "default_rest_v2_url")]
    pub rest_v2_url: String,

    #[serde(default = "default_wss_url")]
    pub wss_url: String,
}

impl Default for ExchangeConfig {
    fn default() -> Self {
        Self {
            rest_url: default_rest_url(),
            rest_v2_url: default_rest_v2_url(),
            wss_url: default_wss_url(),
        }
    }
}

// =============================================================================
// FeedConfig
// =============================================================================

/// Immutable identity and capacity of one candle feed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FeedConfig {
    trading_pair: String,
    interval: Interval,
    max_records: usize,
}

impl FeedConfig {
    pub fn new(
        trading_pair: impl Into<String>,
        interval: Interval,
        max_records: usize,
    ) -> Result<Self, FeedError> {
        let trading_pair = trading_pair.into().trim().to_uppercase();
        if trading_pair.is_empty() {
            return Err(FeedError::InvalidConfig("trading pair is empty".into()));
        }
        if max_records == 0 {
            return Err(FeedError::InvalidConfig(format!(
                "max_records must be positive for {trading_pair}"
            )));
        }
        Ok(Self {
            trading_pair,
            interval,
            max_records,
        })
    }

    pub fn trading_pair(&self) -> &str {
        &self.trading_pair
    }

    pub fn interval(&self) -> Interval {
        self.interval
    }

    pub fn max_records(&self) -> usize {
        self.max_records
    }
}

// =============================================================================
// RuntimeConfig
// =============================================================================

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RuntimeConfig {
    /// Pairs in `BASE-QUOTE` form.
    #[serde(default = "default_trading_pairs")]
    pub trading_pairs: Vec<String>,

    #[serde(default = "default_intervals")]
    pub intervals: Vec<Interval>,

    /// Buffer capacity of every feed.
    #[serde(default = "default_max_records")]
    pub max_records: usize,

    /// Fixed backoff between retries of failed fetches and subscriptions.
    #[serde(default = "default_retry_interval_ms")]
    pub retry_interval_ms: u64,

    #[serde(default = "default_request_timeout_secs")]
    pub request_timeout_secs: u64,

    /// Pause between starting consecutive feeds.
    #[serde(default = "default_feed_start_delay_ms")]
    pub feed_start_delay_ms: u64,

    #[serde(default)]
    pub exchange: ExchangeConfig,
}

impl Default for RuntimeConfig {
    fn default() -> Self {
        Self {
            trading_pairs: default_trading_pairs(),
            intervals: default_intervals(),
            max_records: default_max_records(),
            retry_interval_ms: default_retry_interval_ms(),
            request_timeout_secs: default_request_timeout_secs(),
            feed_start_delay_ms: default_feed_start_delay_ms(),
            exchange: ExchangeConfig::default(),
        }
    }
}

impl RuntimeConfig {
    /// Load configuration from a JSON file at `path`.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();

        let content = std::fs::read_to_string(path)
            .with_context(|| format!("failed to read runtime config from {}", path.display()))?;

        let config: Self = serde_json::from_str(&content)
            .with_context(|| format!("failed to parse runtime config from {}", path.display()))?;

        info!(
            path = %path.display(),
            trading_pairs = ?config.trading_pairs,
            max_records = config.max_records,
            "runtime config loaded"
        );

        Ok(config)
    }

    /// Apply `CANDLES_*` overrides from the process environment.
    pub fn with_env_overrides(self) -> Result<Self> {
        self.with_overrides(|name| std::env::var(name).ok())
    }

    fn with_overrides(mut self, var: impl Fn(&str) -> Option<String>) -> Result<Self> {
        if let Some(pairs) = var("CANDLES_TRADING_PAIRS") {
            self.trading_pairs = split_list(&pairs)
                .map(str::to_uppercase)
                .collect();
        }
        if let Some(intervals) = var("CANDLES_INTERVALS") {
            self.intervals = split_list(&intervals)
                .map(str::parse::<Interval>)
                .collect::<Result<Vec<_>, _>>()
                .context("invalid CANDLES_INTERVALS")?;
        }
        if let Some(max) = var("CANDLES_MAX_RECORDS") {
            self.max_records = max
                .trim()
                .parse()
                .with_context(|| format!("invalid CANDLES_MAX_RECORDS: {max}"))?;
        }
        Ok(self)
    }

    pub fn retry_interval(&self) -> Duration {
        Duration::from_millis(self.retry_interval_ms)
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }

    pub fn feed_start_delay(&self) -> Duration {
        Duration::from_millis(self.feed_start_delay_ms)
    }

    /// One feed per (pair, interval) combination.
    pub fn feed_configs(&self) -> Result<Vec<FeedConfig>, FeedError> {
        if self.trading_pairs.is_empty() || self.intervals.is_empty() {
            warn!("no trading pairs or intervals configured");
        }
        let mut feeds = Vec::with_capacity(self.trading_pairs.len() * self.intervals.len());
        for pair in &self.trading_pairs {
            for interval in &self.intervals {
                feeds.push(FeedConfig::new(pair.as_str(), *interval, self.max_records)?);
            }
        }
        Ok(feeds)
    }
}

fn split_list(raw: &str) -> impl Iterator<Item = &str> {
    raw.split(',').map(str::trim).filter(|s| !s.is_empty())
}

// =============================================================================
// Tests
// =============================================================================
#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    #[test]
    fn default_config_has_expected_values() {
        let cfg = RuntimeConfig::default();
        assert_eq!(cfg.trading_pairs, vec!["BTC-BRL"]);
        assert_eq!(cfg.intervals, vec![Interval::OneMinute]);
        assert_eq!(cfg.max_records, 500);
        assert_eq!(cfg.retry_interval(), Duration::from_secs(1));
        assert_eq!(cfg.exchange.wss_url, "wss://api.foxbit.com.br");
    }

    #[test]
    fn deserialise_partial_json_fills_defaults() {
        let json = r#"{ "intervals": ["1h", "1M"], "max_records": 4 }"#;
        let cfg: RuntimeConfig = serde_json::from_str(json).unwrap();
        assert_eq!(cfg.intervals, vec![Interval::OneHour, Interval::OneMonth]);
        assert_eq!(cfg.max_records, 4);
        assert_eq!(cfg.trading_pairs, vec!["BTC-BRL"]);
        assert_eq!(cfg.exchange.rest_url, foxbit::REST_URL);
    }

    #[test]
    fn unknown_interval_fails_to_parse() {
        let json = r#"{ "intervals": ["7m"] }"#;
        assert!(serde_json::from_str::<RuntimeConfig>(json).is_err());
    }

    #[test]
    fn env_overrides_replace_feed_list() {
        let vars: HashMap<&str, &str> = [
            ("CANDLES_TRADING_PAIRS", "shib-brl, eth-brl,"),
            ("CANDLES_INTERVALS", "5m,1h"),
            ("CANDLES_MAX_RECORDS", "1000"),
        ]
        .into_iter()
        .collect();
        let cfg = RuntimeConfig::default()
            .with_overrides(|name| vars.get(name).map(|v| v.to_string()))
            .unwrap();
        assert_eq!(cfg.trading_pairs, vec!["SHIB-BRL", "ETH-BRL"]);
        assert_eq!(cfg.intervals, vec![Interval::FiveMinutes, Interval::OneHour]);
        assert_eq!(cfg.max_records, 1000);
        assert_eq!(cfg.feed_configs().unwrap().len(), 4);
    }

    #[test]
    fn bad_env_override_is_an_error() {
        let result = RuntimeConfig::default().with_overrides(|name| {
            (name == "CANDLES_MAX_RECORDS").then(|| "lots".to_string())
        });
        assert!(result.is_err());
    }

    #[test]
    fn feed_config_rejects_zero_capacity() {
        assert!(matches!(
            FeedConfig::new("BTC-BRL", Interval::OneHour, 0),
            Err(FeedError::InvalidConfig(_))
        ));
        let fc = FeedConfig::new(" btc-brl ", Interval::OneHour, 4).unwrap();
        assert_eq!(fc.trading_pair(), "BTC-BRL");
        assert_eq!(fc.max_records(), 4);
    }
}
