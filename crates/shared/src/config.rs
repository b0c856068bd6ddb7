//! Application configuration management.

use std::collections::HashMap;

use rust_decimal::Decimal;
use serde::Deserialize;

/// Application configuration.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct AppConfig {
    /// Back-office service connection.
    #[serde(default)]
    pub gateway: GatewayConfig,
    /// Return valuation policy.
    #[serde(default)]
    pub valuation: ValuationConfig,
    /// Batch search behaviour.
    #[serde(default)]
    pub search: SearchConfig,
    /// Settlement validation rules.
    #[serde(default)]
    pub settlement: SettlementConfig,
}

/// Back-office service connection configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct GatewayConfig {
    /// Base URL of the back-office API.
    #[serde(default = "default_base_url")]
    pub base_url: String,
    /// Request timeout in seconds.
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
    /// Access token used by command-line tools to build a request context.
    ///
    /// Library code never reads this; credentials are passed explicitly.
    #[serde(default)]
    pub access_token: Option<String>,
}

impl Default for GatewayConfig {
    fn default() -> Self {
        Self {
            base_url: default_base_url(),
            timeout_secs: default_timeout_secs(),
            access_token: None,
        }
    }
}

fn default_base_url() -> String {
    "http://localhost:8000".to_string()
}

fn default_timeout_secs() -> u64 {
    30
}

/// Return valuation configuration.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ValuationConfig {
    /// Margin applied when the shop has none configured, in percent.
    #[serde(default)]
    pub default_shop_margin_percentage: Decimal,
    /// Deduction percentage per quality status name (e.g. `DAMAGED = 25`).
    #[serde(default)]
    pub quality_deductions: HashMap<String, Decimal>,
    /// Quality status names that disqualify a batch from being returned.
    #[serde(default)]
    pub non_returnable: Vec<String>,
}

/// Batch search configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct SearchConfig {
    /// Queries shorter than this are answered with no results.
    #[serde(default = "default_min_query_length")]
    pub min_query_length: usize,
    /// Maximum number of cached search results.
    #[serde(default = "default_cache_capacity")]
    pub cache_capacity: u64,
    /// Time-to-live for cached search results in seconds.
    #[serde(default = "default_cache_ttl_secs")]
    pub cache_ttl_secs: u64,
}

impl Default for SearchConfig {
    fn default() -> Self {
        Self {
            min_query_length: default_min_query_length(),
            cache_capacity: default_cache_capacity(),
            cache_ttl_secs: default_cache_ttl_secs(),
        }
    }
}

fn default_min_query_length() -> usize {
    2
}

fn default_cache_capacity() -> u64 {
    256
}

fn default_cache_ttl_secs() -> u64 {
    30
}

/// Settlement validation configuration.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct SettlementConfig {
    /// Block cheque and bank-transfer payments that lack a reference number
    /// instead of only warning about them.
    #[serde(default)]
    pub require_reference_numbers: bool,
}

impl AppConfig {
    /// Loads configuration from environment and config files.
    ///
    /// # Errors
    ///
    /// Returns an error if configuration cannot be loaded.
    pub fn load() -> Result<Self, config::ConfigError> {
        let run_mode = std::env::var("RUN_MODE").unwrap_or_else(|_| "development".to_string());

        let config = config::Config::builder()
            .add_source(config::File::with_name("config/default").required(false))
            .add_source(config::File::with_name(&format!("config/{run_mode}")).required(false))
            .add_source(config::Environment::with_prefix("STOCKFLOW").separator("__"))
            .build()?;

        config.try_deserialize()
    }
}
