//! Configuration module for the PIX charge gateway.
//!
//! Configuration is a JSON file (path via `--config` / `CONFIG`), with serde
//! defaults that fall back to environment variables, then to hardcoded
//! defaults. The acquirer list, fee table, and rate-limit policy are read
//! once per request and treated as immutable for that request's duration.

use clap::Parser;
use serde::{Deserialize, Serialize};
use std::fs;
use std::net::IpAddr;
use std::path::{Path, PathBuf};

use rust_decimal::Decimal;

use crate::types::{AcquirerName, FeeSchedule};

/// CLI arguments for the gateway server.
#[derive(Parser, Debug)]
#[command(name = "pix-gateway")]
#[command(about = "PIX charge-creation gateway HTTP server")]
struct CliArgs {
    /// Path to the JSON configuration file
    #[arg(long, short, env = "CONFIG", default_value = "config.json")]
    config: PathBuf,
}

/// Server configuration.
///
/// Fields use serde defaults that fall back to environment variables,
/// then to hardcoded defaults.
#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    #[serde(default = "config_defaults::default_port")]
    port: u16,
    #[serde(default = "config_defaults::default_host")]
    host: IpAddr,
    #[serde(default)]
    acquirers: Vec<AcquirerConfig>,
    #[serde(default)]
    fees: Vec<FeeConfig>,
    #[serde(default)]
    merchants: Vec<MerchantConfig>,
    #[serde(default)]
    rate_limit: RateLimitPolicy,
    #[serde(default)]
    failover: FailoverConfig,
}

/// One configured acquirer backend.
///
/// `priority` orders failover attempts (lower first); `is_default` marks the
/// acquirer used in degenerate single-call mode when failover is disabled.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AcquirerConfig {
    pub name: AcquirerName,
    #[serde(default = "config_defaults::default_true")]
    pub enabled: bool,
    #[serde(default)]
    pub priority: u32,
    #[serde(default)]
    pub is_default: bool,
    /// Base URL of the backend API.
    pub base_url: String,
    #[serde(default)]
    pub credentials: AcquirerCredentials,
}

/// Backend auth schemes vary per acquirer; the adapter picks the matching
/// variant at construction time.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", tag = "scheme")]
pub enum AcquirerCredentials {
    #[default]
    None,
    /// Static API key sent on a backend-specific header.
    ApiKey { api_key: String },
    /// OAuth2 client-credentials grant exchanged for a bearer token.
    OauthClient {
        client_id: String,
        client_secret: String,
    },
    /// HTTP Basic auth.
    Basic { username: String, password: String },
}

/// Per-merchant overrides. `preferred_acquirer` is honored in single-call
/// mode (failover disabled); under failover the priority order rules.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MerchantConfig {
    pub merchant_id: String,
    #[serde(default)]
    pub preferred_acquirer: Option<AcquirerName>,
}

/// Fee configuration row: a merchant-scoped override when `merchant_id` is
/// set, or the platform default when `is_default` is true.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FeeConfig {
    #[serde(default)]
    pub merchant_id: Option<String>,
    pub percentage: Decimal,
    pub fixed: Decimal,
    #[serde(default)]
    pub is_default: bool,
}

impl FeeConfig {
    pub fn schedule(&self) -> FeeSchedule {
        FeeSchedule {
            percentage: self.percentage,
            fixed: self.fixed,
        }
    }
}

/// Runtime-configurable admission policy. Defaults apply when the config
/// file has no `rate_limit` section.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RateLimitPolicy {
    #[serde(default = "config_defaults::default_true")]
    pub enabled: bool,
    #[serde(default = "config_defaults::default_max_unpaid")]
    pub max_unpaid: u32,
    #[serde(default = "config_defaults::default_window_hours")]
    pub window_hours: u64,
    #[serde(default = "config_defaults::default_cooldown_seconds")]
    pub cooldown_seconds: u64,
}

impl RateLimitPolicy {
    pub fn window_secs(&self) -> u64 {
        self.window_hours * 3600
    }
}

impl Default for RateLimitPolicy {
    fn default() -> Self {
        RateLimitPolicy {
            enabled: true,
            max_unpaid: config_defaults::default_max_unpaid(),
            window_hours: config_defaults::default_window_hours(),
            cooldown_seconds: config_defaults::default_cooldown_seconds(),
        }
    }
}

/// Failover orchestration knobs.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FailoverConfig {
    #[serde(default = "config_defaults::default_true")]
    pub enabled: bool,
    /// Global attempt budget for one orchestration run.
    #[serde(default = "config_defaults::default_max_retries")]
    pub max_retries: u32,
    /// Delay between consecutive attempts against the same acquirer.
    #[serde(default = "config_defaults::default_retry_delay_ms")]
    pub retry_delay_ms: u64,
}

impl Default for FailoverConfig {
    fn default() -> Self {
        FailoverConfig {
            enabled: true,
            max_retries: config_defaults::default_max_retries(),
            retry_delay_ms: config_defaults::default_retry_delay_ms(),
        }
    }
}

pub mod config_defaults {
    use std::env;
    use std::net::IpAddr;

    pub const DEFAULT_PORT: u16 = 8080;
    pub const DEFAULT_HOST: &str = "0.0.0.0";

    /// Returns the default port value with fallback: $PORT env var -> 8080
    pub fn default_port() -> u16 {
        env::var("PORT")
            .ok()
            .and_then(|s| s.parse().ok())
            .unwrap_or(DEFAULT_PORT)
    }

    /// Returns the default host value with fallback: $HOST env var -> "0.0.0.0"
    pub fn default_host() -> IpAddr {
        env::var("HOST")
            .ok()
            .and_then(|s| s.parse().ok())
            .unwrap_or(IpAddr::V4(DEFAULT_HOST.parse().unwrap()))
    }

    pub fn default_true() -> bool {
        true
    }

    pub fn default_max_unpaid() -> u32 {
        2
    }

    pub fn default_window_hours() -> u64 {
        36
    }

    pub fn default_cooldown_seconds() -> u64 {
        30
    }

    pub fn default_max_retries() -> u32 {
        4
    }

    pub fn default_retry_delay_ms() -> u64 {
        2000
    }
}

impl Default for Config {
    fn default() -> Self {
        Config {
            port: config_defaults::default_port(),
            host: config_defaults::default_host(),
            acquirers: Vec::new(),
            fees: Vec::new(),
            merchants: Vec::new(),
            rate_limit: RateLimitPolicy::default(),
            failover: FailoverConfig::default(),
        }
    }
}

/// Configuration error types.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Failed to read config file at {0}: {1}")]
    FileRead(PathBuf, std::io::Error),
    #[error("Failed to parse config file: {0}")]
    JsonParse(#[from] serde_json::Error),
}

impl Config {
    pub fn port(&self) -> u16 {
        self.port
    }

    pub fn host(&self) -> IpAddr {
        self.host
    }

    /// Configured acquirers sorted by ascending priority. The orchestrator
    /// consumes this order as-is; disabled entries are filtered there, not here.
    pub fn acquirers_by_priority(&self) -> Vec<AcquirerConfig> {
        let mut acquirers = self.acquirers.clone();
        acquirers.sort_by_key(|a| a.priority);
        acquirers
    }

    pub fn fees(&self) -> &[FeeConfig] {
        &self.fees
    }

    /// The merchant's preferred acquirer, when one is configured.
    pub fn preferred_acquirer(&self, merchant_id: Option<&str>) -> Option<&AcquirerName> {
        let merchant_id = merchant_id?;
        self.merchants
            .iter()
            .find(|merchant| merchant.merchant_id == merchant_id)
            .and_then(|merchant| merchant.preferred_acquirer.as_ref())
    }

    pub fn rate_limit(&self) -> &RateLimitPolicy {
        &self.rate_limit
    }

    pub fn failover(&self) -> &FailoverConfig {
        &self.failover
    }

    /// Load configuration from CLI arguments and JSON file.
    ///
    /// The config file path is determined by:
    /// 1. `--config <path>` CLI argument
    /// 2. `./config.json` (if it exists)
    ///
    /// Values not present in the config file will be resolved via
    /// environment variables or defaults during deserialization.
    pub fn load() -> Result<Self, ConfigError> {
        let cli_args = CliArgs::parse();
        let config_path = Path::new(&cli_args.config)
            .canonicalize()
            .map_err(|e| ConfigError::FileRead(cli_args.config, e))?;
        Self::load_from_path(config_path)
    }

    fn load_from_path(path: PathBuf) -> Result<Self, ConfigError> {
        let content = fs::read_to_string(&path).map_err(|e| ConfigError::FileRead(path, e))?;
        let config: Config = serde_json::from_str(&content)?;
        Ok(config)
    }
}
