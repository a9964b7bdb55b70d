//! Application configuration loading and validation.
//!
//! Provides the main [`Config`] struct that aggregates all settings. It is
//! loaded from a TOML file; feed and API endpoints can be overridden from the
//! environment (`.env` files are honoured by the binary through `dotenvy`):
//!
//! | Variable                    | Overrides                    |
//! |-----------------------------|------------------------------|
//! | `ODDSYNC_CONDITIONS_WS_URL` | `feeds.conditions.ws_url`    |
//! | `ODDSYNC_STATISTICS_WS_URL` | `feeds.statistics.ws_url`    |
//! | `ODDSYNC_API_URL`           | `api.base_url`               |
//!
//! # Example
//!
//! ```no_run
//! use oddsync::infrastructure::config::Config;
//!
//! fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let config = Config::load("config.toml")?;
//!     config.init_logging();
//!     Ok(())
//! }
//! ```

use std::path::Path;
use std::time::Duration;

use rust_decimal::Decimal;
use serde::Deserialize;
use url::Url;

use super::logging::LoggingConfig;
use crate::error::{ConfigError, Result};

pub const CONDITIONS_WS_URL_ENV: &str = "ODDSYNC_CONDITIONS_WS_URL";
pub const STATISTICS_WS_URL_ENV: &str = "ODDSYNC_STATISTICS_WS_URL";
pub const API_URL_ENV: &str = "ODDSYNC_API_URL";

/// Endpoint of one real-time feed.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct FeedEndpoint {
    pub ws_url: String,
}

/// Both real-time feeds.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct FeedsConfig {
    pub conditions: FeedEndpoint,
    pub statistics: FeedEndpoint,
}

/// Batch lookup endpoints.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct ApiConfig {
    /// Base URL for `POST <base>/<resource>` batch lookups.
    pub base_url: String,
    /// GraphQL endpoint; takes precedence over `base_url` when set.
    pub graphql_url: Option<String>,
    /// Query sent to `graphql_url` with `$ids` and `$environment`.
    pub graphql_query: Option<String>,
}

/// Debounce windows in milliseconds.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct TimingConfig {
    pub watcher_quiet_ms: u64,
    pub batch_window_ms: u64,
    pub subscription_window_ms: u64,
}

impl Default for TimingConfig {
    fn default() -> Self {
        Self {
            watcher_quiet_ms: 200,
            batch_window_ms: 50,
            subscription_window_ms: 100,
        }
    }
}

impl TimingConfig {
    #[must_use]
    pub const fn quiet_period(&self) -> Duration {
        Duration::from_millis(self.watcher_quiet_ms)
    }

    #[must_use]
    pub const fn batch_window(&self) -> Duration {
        Duration::from_millis(self.batch_window_ms)
    }

    #[must_use]
    pub const fn subscription_window(&self) -> Duration {
        Duration::from_millis(self.subscription_window_ms)
    }
}

/// Pricing settings.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct PricingConfig {
    /// Core address of live markets; other cores are prematch.
    pub live_core_address: String,
    /// Slippage used for minimum odds when none is given.
    pub default_slippage_percent: Decimal,
}

impl Default for PricingConfig {
    fn default() -> Self {
        Self {
            live_core_address: String::new(),
            default_slippage_percent: Decimal::new(5, 0),
        }
    }
}

/// Main application configuration.
///
/// Load from a TOML file using [`Config::load`] or parse directly with
/// [`Config::parse_toml`].
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Logging and tracing configuration.
    pub logging: LoggingConfig,
    /// Real-time feed endpoints.
    pub feeds: FeedsConfig,
    /// Batch lookup endpoints.
    pub api: ApiConfig,
    /// Debounce windows.
    pub timing: TimingConfig,
    /// Live pricing settings.
    pub pricing: PricingConfig,
}

impl Config {
    /// Parse configuration from TOML content, apply environment overrides
    /// and validate.
    ///
    /// # Errors
    ///
    /// Returns an error if the TOML is malformed or validation fails.
    pub fn parse_toml(content: &str) -> Result<Self> {
        Self::parse_with_env(content, |name| std::env::var(name).ok())
    }

    /// Like [`Config::parse_toml`] with an explicit environment lookup.
    ///
    /// # Errors
    ///
    /// Returns an error if the TOML is malformed or validation fails.
    pub fn parse_with_env(content: &str, env: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let mut config: Self = toml::from_str(content).map_err(ConfigError::Parse)?;
        config.apply_overrides(env);
        config.validate()?;
        Ok(config)
    }

    /// Load configuration from a TOML file.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read, the TOML is malformed or
    /// validation fails.
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = std::fs::read_to_string(path).map_err(ConfigError::ReadFile)?;
        Self::parse_toml(&content)
    }

    fn apply_overrides(&mut self, env: impl Fn(&str) -> Option<String>) {
        let non_empty = |name: &str| env(name).filter(|value| !value.trim().is_empty());

        if let Some(url) = non_empty(CONDITIONS_WS_URL_ENV) {
            self.feeds.conditions.ws_url = url;
        }
        if let Some(url) = non_empty(STATISTICS_WS_URL_ENV) {
            self.feeds.statistics.ws_url = url;
        }
        if let Some(url) = non_empty(API_URL_ENV) {
            self.api.base_url = url;
        }
    }

    /// Validate configuration values.
    fn validate(&self) -> Result<()> {
        self.logging.validate()?;

        validate_url(
            "feeds.conditions.ws_url",
            &self.feeds.conditions.ws_url,
            &["ws", "wss"],
        )?;
        validate_url(
            "feeds.statistics.ws_url",
            &self.feeds.statistics.ws_url,
            &["ws", "wss"],
        )?;
        if !self.api.base_url.is_empty() {
            validate_url("api.base_url", &self.api.base_url, &["http", "https"])?;
        }
        if let Some(graphql_url) = &self.api.graphql_url {
            validate_url("api.graphql_url", graphql_url, &["http", "https"])?;
            let query = self.api.graphql_query.as_deref().unwrap_or_default();
            if query.trim().is_empty() {
                return Err(ConfigError::MissingField {
                    field: "api.graphql_query",
                }
                .into());
            }
        }

        for (field, value) in [
            ("timing.watcher_quiet_ms", self.timing.watcher_quiet_ms),
            ("timing.batch_window_ms", self.timing.batch_window_ms),
            ("timing.subscription_window_ms", self.timing.subscription_window_ms),
        ] {
            if value == 0 {
                return Err(ConfigError::InvalidValue {
                    field,
                    reason: "must be greater than 0".to_string(),
                }
                .into());
            }
        }

        let slippage = self.pricing.default_slippage_percent;
        if slippage < Decimal::ZERO || slippage > Decimal::ONE_HUNDRED {
            return Err(ConfigError::InvalidValue {
                field: "pricing.default_slippage_percent",
                reason: "must be between 0 and 100".to_string(),
            }
            .into());
        }
        Ok(())
    }

    /// Initialize logging with the configured settings.
    pub fn init_logging(&self) {
        self.logging.init();
    }
}

fn validate_url(field: &'static str, value: &str, schemes: &[&str]) -> Result<()> {
    if value.trim().is_empty() {
        return Err(ConfigError::MissingField { field }.into());
    }
    let url = Url::parse(value).map_err(|e| ConfigError::InvalidValue {
        field,
        reason: e.to_string(),
    })?;
    if !schemes.contains(&url.scheme()) {
        return Err(ConfigError::InvalidValue {
            field,
            reason: format!("scheme must be one of {}", schemes.join(", ")),
        }
        .into());
    }
    Ok(())
}
