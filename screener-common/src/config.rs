//! Configuration management for the stock screener.
//!
//! The service reads a single JSON document, by default at
//! `~/.stock-screener/config.json`. A missing file means "all defaults".
//!
//! # Configuration Priority
//!
//! 1. Environment variables (listed below)
//! 2. Explicit config file values
//! 3. Default values
//!
//! # Environment Variable Mapping
//!
//! - `STOCK_SCREENER_CONFIG` → path of the config file itself
//! - `STOCK_SCREENER_PORT` → network.port
//! - `STOCK_SCREENER_BIND_ADDRESS` → network.bind
//! - `STOCK_SCREENER_LOG_LEVEL` → observability.log_level
//! - `STOCK_SCREENER_DATA_PROVIDER` → data.provider
//! - `STOCK_SCREENER_DB_PATH` → storage.db_path
//! - `ALPHA_VANTAGE_API_KEY` → secrets.alpha_vantage_api_key

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

/// Get the configuration directory path.
pub fn config_dir() -> PathBuf {
    directories::UserDirs::new().map_or_else(
        || PathBuf::from(".stock-screener"),
        |dirs| dirs.home_dir().join(".stock-screener"),
    )
}

/// Get the configuration file path.
pub fn config_path() -> PathBuf {
    std::env::var_os("STOCK_SCREENER_CONFIG")
        .map(PathBuf::from)
        .unwrap_or_else(|| config_dir().join("config.json"))
}

// ============================================================================
// Root Configuration
// ============================================================================

/// Root configuration structure.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct Config {
    /// HTTP bind address and port
    #[serde(default)]
    pub network: NetworkConfig,

    /// Logging configuration
    #[serde(default)]
    pub observability: ObservabilityConfig,

    /// API keys
    #[serde(default)]
    pub secrets: SecretsConfig,

    /// Market data provider selection and tuning
    #[serde(default)]
    pub data: DataConfig,

    /// EMA screening path
    #[serde(default)]
    pub screener: ScreenerConfig,

    /// Ingestion path
    #[serde(default)]
    pub ingest: IngestConfig,

    /// Observation store
    #[serde(default)]
    pub storage: StorageConfig,
}

impl Config {
    /// Load configuration from the default path.
    pub fn load() -> Result<Self> {
        let path = config_path();
        if !path.exists() {
            tracing::info!("Config file not found, using defaults");
            return Ok(Self::default());
        }

        Self::load_from(&path)
    }

    /// Load configuration from a specific path.
    pub fn load_from(path: &Path) -> Result<Self> {
        let content = fs::read_to_string(path)
            .with_context(|| format!("Failed to read config from {}", path.display()))?;

        serde_json::from_str(&content)
            .with_context(|| format!("Failed to parse config from {}", path.display()))
    }

    /// Load configuration with environment variable overrides.
    pub fn load_with_env() -> Result<Self> {
        let mut config = Self::load()?;
        config.apply_env_overrides();
        Ok(config)
    }

    /// Apply environment variable overrides to the configuration.
    pub fn apply_env_overrides(&mut self) {
        self.apply_overrides_from(|key| std::env::var(key).ok());
    }

    /// Apply overrides from an arbitrary key lookup.
    ///
    /// Empty values are ignored so that `FOO=` does not blank out a setting.
    pub fn apply_overrides_from<F>(&mut self, lookup: F)
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

        if let Some(port) = get("STOCK_SCREENER_PORT") {
            match port.trim().parse() {
                Ok(p) => self.network.port = p,
                Err(_) => tracing::warn!(value = %port, "Ignoring invalid STOCK_SCREENER_PORT"),
            }
        }

        if let Some(bind) = get("STOCK_SCREENER_BIND_ADDRESS") {
            self.network.bind = bind;
        }

        if let Some(level) = get("STOCK_SCREENER_LOG_LEVEL") {
            self.observability.log_level = level;
        }

        if let Some(provider) = get("STOCK_SCREENER_DATA_PROVIDER") {
            self.data.provider = provider.to_lowercase();
        }

        if let Some(path) = get("STOCK_SCREENER_DB_PATH") {
            self.storage.db_path = PathBuf::from(path);
        }

        if let Some(key) = get("ALPHA_VANTAGE_API_KEY") {
            self.secrets.alpha_vantage_api_key = Some(key);
        }
    }

    /// Alpha Vantage API key, if one is configured and non-empty.
    pub fn alpha_vantage_api_key(&self) -> Option<&str> {
        self.secrets
            .alpha_vantage_api_key
            .as_deref()
            .filter(|k| !k.trim().is_empty())
    }

    /// `host:port` string the HTTP service binds to.
    pub fn bind_address(&self) -> String {
        format!("{}:{}", self.network.bind, self.network.port)
    }
}

// ============================================================================
// Network Configuration
// ============================================================================

/// Network configuration.
///
/// Default is `127.0.0.1` (local only). Set `bind` to `0.0.0.0` to allow
/// remote access.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NetworkConfig {
    #[serde(default = "default_bind_address")]
    pub bind: String,

    #[serde(default = "default_port")]
    pub port: u16,
}

impl Default for NetworkConfig {
    fn default() -> Self {
        Self {
            bind: default_bind_address(),
            port: default_port(),
        }
    }
}

fn default_bind_address() -> String {
    "127.0.0.1".into()
}

fn default_port() -> u16 {
    4480
}

// ============================================================================
// Observability Configuration
// ============================================================================

/// Logging configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ObservabilityConfig {
    /// Log level (trace, debug, info, warn, error)
    #[serde(default = "default_log_level", alias = "level")]
    pub log_level: String,

    /// Log format (json, pretty)
    #[serde(default = "default_log_format", alias = "format")]
    pub log_format: String,

    /// Additional module targets to hold at `warn`.
    #[serde(default)]
    pub excluded_targets: Vec<String>,
}

impl Default for ObservabilityConfig {
    fn default() -> Self {
        Self {
            log_level: default_log_level(),
            log_format: default_log_format(),
            excluded_targets: Vec::new(),
        }
    }
}

fn default_log_level() -> String {
    "info".into()
}

fn default_log_format() -> String {
    "pretty".into()
}

// ============================================================================
// Secrets
// ============================================================================

/// API keys. Never hardcoded; supplied by file or environment.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct SecretsConfig {
    #[serde(default)]
    pub alpha_vantage_api_key: Option<String>,
}

// ============================================================================
// Data Provider Configuration
// ============================================================================

/// Market data provider configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DataConfig {
    /// Provider name: "yahoo", "alphavantage" or "local"
    #[serde(default = "default_provider")]
    pub provider: String,

    #[serde(default = "default_yahoo_base_url")]
    pub yahoo_base_url: String,

    #[serde(default = "default_alpha_vantage_base_url")]
    pub alpha_vantage_base_url: String,

    /// Per-request timeout in seconds
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,

    /// Outbound requests per minute for the selected provider
    #[serde(default = "default_rate_limit_rpm")]
    pub rate_limit_rpm: u32,

    /// Directory of saved provider documents for the "local" provider
    #[serde(default = "default_local_data_dir")]
    pub local_data_dir: PathBuf,
}

impl Default for DataConfig {
    fn default() -> Self {
        Self {
            provider: default_provider(),
            yahoo_base_url: default_yahoo_base_url(),
            alpha_vantage_base_url: default_alpha_vantage_base_url(),
            timeout_secs: default_timeout_secs(),
            rate_limit_rpm: default_rate_limit_rpm(),
            local_data_dir: default_local_data_dir(),
        }
    }
}

/// Provider names accepted by `data.provider`.
pub const KNOWN_PROVIDERS: &[&str] = &["yahoo", "alphavantage", "local"];

fn default_provider() -> String {
    "yahoo".into()
}

fn default_yahoo_base_url() -> String {
    "https://query2.finance.yahoo.com".into()
}

fn default_alpha_vantage_base_url() -> String {
    "https://www.alphavantage.co".into()
}

fn default_timeout_secs() -> u64 {
    10
}

fn default_rate_limit_rpm() -> u32 {
    120
}

fn default_local_data_dir() -> PathBuf {
    PathBuf::from("feed/data")
}

// ============================================================================
// Screener Configuration
// ============================================================================

/// One index membership list scraped from an HTML page.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct IndexSourceConfig {
    /// Display name used in logs
    pub name: String,
    /// Page URL
    pub url: String,
    /// Zero-based position of the table on the page
    #[serde(default)]
    pub table_index: usize,
    /// Header of the column holding the symbols
    #[serde(default = "default_symbol_column")]
    pub column: String,
}

fn default_symbol_column() -> String {
    "Symbol".into()
}

/// EMA screening configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScreenerConfig {
    /// EMA spans, shortest first
    #[serde(default = "default_spans")]
    pub spans: Vec<u32>,

    /// History window in calendar days (six months by default)
    #[serde(default = "default_screen_lookback_days")]
    pub lookback_days: u32,

    /// Bar interval (e.g. "1d", "1wk", "60min")
    #[serde(default = "default_screen_interval")]
    pub interval: String,

    /// Maximum symbols fetched at once
    #[serde(default = "default_screen_concurrency")]
    pub max_concurrency: usize,

    /// Index membership lists
    #[serde(default = "default_index_sources")]
    pub index_sources: Vec<IndexSourceConfig>,
}

impl Default for ScreenerConfig {
    fn default() -> Self {
        Self {
            spans: default_spans(),
            lookback_days: default_screen_lookback_days(),
            interval: default_screen_interval(),
            max_concurrency: default_screen_concurrency(),
            index_sources: default_index_sources(),
        }
    }
}

fn default_spans() -> Vec<u32> {
    vec![20, 25, 30, 35, 40]
}

fn default_screen_lookback_days() -> u32 {
    183
}

fn default_screen_interval() -> String {
    "1d".into()
}

fn default_screen_concurrency() -> usize {
    8
}

/// S&P 500, Dow Jones Industrial Average and NASDAQ-100 membership tables.
pub fn default_index_sources() -> Vec<IndexSourceConfig> {
    vec![
        IndexSourceConfig {
            name: "S&P 500".into(),
            url: "https://en.wikipedia.org/wiki/List_of_S%26P_500_companies".into(),
            table_index: 0,
            column: "Symbol".into(),
        },
        IndexSourceConfig {
            name: "Dow Jones Industrial Average".into(),
            url: "https://en.wikipedia.org/wiki/Dow_Jones_Industrial_Average".into(),
            table_index: 1,
            column: "Symbol".into(),
        },
        IndexSourceConfig {
            name: "NASDAQ-100".into(),
            url: "https://en.wikipedia.org/wiki/NASDAQ-100".into(),
            table_index: 3,
            column: "Ticker".into(),
        },
    ]
}

// ============================================================================
// Ingestion Configuration
// ============================================================================

/// Fetch-and-store batch configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IngestConfig {
    /// Newline-delimited symbol list
    #[serde(default = "default_symbols_file")]
    pub symbols_file: PathBuf,

    /// Bar interval for ingestion
    #[serde(default = "default_ingest_interval")]
    pub interval: String,

    /// History window in calendar days
    #[serde(default = "default_ingest_lookback_days")]
    pub lookback_days: u32,

    /// Maximum symbols fetched at once
    #[serde(default = "default_ingest_concurrency")]
    pub max_concurrency: usize,
}

impl Default for IngestConfig {
    fn default() -> Self {
        Self {
            symbols_file: default_symbols_file(),
            interval: default_ingest_interval(),
            lookback_days: default_ingest_lookback_days(),
            max_concurrency: default_ingest_concurrency(),
        }
    }
}

fn default_symbols_file() -> PathBuf {
    PathBuf::from("sp500_symbols.txt")
}

fn default_ingest_interval() -> String {
    "5min".into()
}

fn default_ingest_lookback_days() -> u32 {
    5
}

fn default_ingest_concurrency() -> usize {
    4
}

// ============================================================================
// Storage Configuration
// ============================================================================

/// Observation store configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StorageConfig {
    /// Path to the SQLite database
    #[serde(default = "default_db_path")]
    pub db_path: PathBuf,

    /// Reject a second row for the same (symbol, timestamp)
    #[serde(default = "default_true")]
    pub unique_observations: bool,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            db_path: default_db_path(),
            unique_observations: true,
        }
    }
}

fn default_db_path() -> PathBuf {
    config_dir().join("observations.db")
}

fn default_true() -> bool {
    true
}
