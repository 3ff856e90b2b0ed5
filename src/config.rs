//! Configuration management
//!
//! Handles loading and parsing of JSON configuration files with environment
//! variable support for API credentials. Every section has a working default,
//! so a config file is optional.

use anyhow::{bail, Context, Result};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::source::ExpirationWindow;
use crate::universe::MarketCapFilter;

pub const ENV_CLIENT_ID: &str = "TDAMERITRADE_CLIENT_ID";
pub const ENV_REFRESH_TOKEN: &str = "TDAMERITRADE_REFRESH_TOKEN";

/// Upper bound for any single rate-limit pause
pub const MAX_BACKOFF_SECS: u64 = 24 * 60 * 60;

/// Main configuration structure
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub api: ApiConfig,
    pub screen: ScreenConfig,
    pub universe: UniverseConfig,
    pub retry: RetryConfig,
}

impl Config {
    /// Load configuration from JSON file
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let contents = fs::read_to_string(path.as_ref()).context("Failed to read config file")?;
        let mut config: Config =
            serde_json::from_str(&contents).context("Failed to parse config JSON")?;
        config.apply_env();
        config.validate()?;
        Ok(config)
    }

    /// Load from `path` when given, otherwise start from defaults
    pub fn load(path: Option<impl AsRef<Path>>) -> Result<Self> {
        match path {
            Some(path) => Self::from_file(path),
            None => {
                let mut config = Config::default();
                config.apply_env();
                config.validate()?;
                Ok(config)
            }
        }
    }

    /// Reject settings that would hang or panic at run time
    pub fn validate(&self) -> Result<()> {
        if self.api.requests_per_minute == 0 {
            bail!("api.requests_per_minute must be at least 1");
        }
        self.retry.validate()
    }

    /// Load API credentials from environment, overriding the file
    pub fn apply_env(&mut self) {
        if let Ok(client_id) = std::env::var(ENV_CLIENT_ID) {
            self.api.client_id = Some(client_id);
        }
        if let Ok(refresh_token) = std::env::var(ENV_REFRESH_TOKEN) {
            self.api.refresh_token = Some(refresh_token);
        }
    }
}

/// Market data API configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ApiConfig {
    pub base_url: String,
    pub token_url: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub client_id: Option<String>,
    #[serde(skip_serializing)]
    pub refresh_token: Option<String>,
    pub timeout_secs: u64,
    /// Client-side request budget; the remote quota is 120/min
    pub requests_per_minute: u32,
}

impl Default for ApiConfig {
    fn default() -> Self {
        ApiConfig {
            base_url: "https://api.tdameritrade.com/v1".to_string(),
            token_url: "https://api.tdameritrade.com/v1/oauth2/token".to_string(),
            client_id: None,
            refresh_token: None,
            timeout_secs: 30,
            requests_per_minute: 110,
        }
    }
}

impl ApiConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }
}

/// Inclusive delta bounds for one leg
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct DeltaRange {
    pub min: f64,
    pub max: f64,
}

impl DeltaRange {
    pub fn new(min: f64, max: f64) -> Self {
        Self { min, max }
    }

    #[inline]
    pub fn contains(&self, delta: f64) -> bool {
        delta >= self.min && delta <= self.max
    }
}

/// Screening parameters
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ScreenConfig {
    /// Window the blended IV is read from
    pub iv_window: ExpirationWindow,
    /// Window candidate legs are drawn from
    pub chain_window: ExpirationWindow,
    /// Legs need strictly more than this traded volume
    pub min_volume: u64,
    pub call_delta: DeltaRange,
    pub put_delta: DeltaRange,
    /// Pairs qualify while |call.delta + put.delta| stays below this
    pub max_delta_imbalance: f64,
    pub contract_multiplier: i64,
    pub std_dev_multiple: f64,
    pub days_per_year: f64,
}

impl Default for ScreenConfig {
    fn default() -> Self {
        ScreenConfig {
            iv_window: ExpirationWindow::new(23, 37, 2),
            chain_window: ExpirationWindow::new(25, 50, 100),
            min_volume: 100,
            call_delta: DeltaRange::new(0.10, 0.40),
            put_delta: DeltaRange::new(-0.40, -0.10),
            max_delta_imbalance: 0.05,
            contract_multiplier: 100,
            std_dev_multiple: 2.0,
            days_per_year: 365.0,
        }
    }
}

/// Ticker universe configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct UniverseConfig {
    /// Exchange CSV exports, screened in order
    pub files: Vec<PathBuf>,
    pub symbol_column: usize,
    pub market_cap_column: usize,
    /// Minimum market cap in dollars
    pub min_market_cap: f64,
    pub filter: MarketCapFilter,
}

impl Default for UniverseConfig {
    fn default() -> Self {
        UniverseConfig {
            files: vec![
                PathBuf::from("amex.csv"),
                PathBuf::from("nasdaq.csv"),
                PathBuf::from("nyse.csv"),
            ],
            symbol_column: 0,
            market_cap_column: 3,
            min_market_cap: 3_000_000_000.0,
            filter: MarketCapFilter::Numeric,
        }
    }
}

/// Retry and backoff configuration for the universe driver
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RetryConfig {
    /// First pause after a rate-limit response
    pub initial_backoff_secs: u64,
    pub backoff_multiplier: f64,
    pub max_backoff_secs: u64,
    /// Rate-limit responses tolerated per ticker before giving up on it
    pub max_rate_limit_attempts: u32,
    /// Retry passes over the queue after the universe pass
    pub max_retry_passes: u32,
}

impl RetryConfig {
    pub fn validate(&self) -> Result<()> {
        if self.max_backoff_secs > MAX_BACKOFF_SECS {
            bail!(
                "retry.max_backoff_secs is {}, the limit is {}",
                self.max_backoff_secs,
                MAX_BACKOFF_SECS
            );
        }
        if self.initial_backoff_secs > self.max_backoff_secs {
            bail!("retry.initial_backoff_secs exceeds retry.max_backoff_secs");
        }
        if !self.backoff_multiplier.is_finite() || self.backoff_multiplier < 1.0 {
            bail!(
                "retry.backoff_multiplier must be a finite value >= 1, got {}",
                self.backoff_multiplier
            );
        }
        Ok(())
    }
}

impl Default for RetryConfig {
    fn default() -> Self {
        RetryConfig {
            initial_backoff_secs: 30,
            backoff_multiplier: 2.0,
            max_backoff_secs: 300,
            max_rate_limit_attempts: 8,
            max_retry_passes: 5,
        }
    }
}
