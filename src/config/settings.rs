//! Configuration structures for deserialisation.
//!
//! These structures map directly to the JSON configuration file format.

use std::path::PathBuf;

use serde::Deserialize;

use crate::error::ConfigError;

/// Log levels accepted in `logging.level` and `MCP_LOG_LEVEL`.
const LOG_LEVELS: [&str; 5] = ["trace", "debug", "info", "warn", "error"];

/// Root configuration structure.
///
/// This is the top-level structure that matches the JSON config file.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Config {
    /// Optional JSON schema reference (ignored during parsing).
    #[serde(rename = "$schema", default)]
    _schema: Option<String>,

    /// Optional comment field (ignored during parsing).
    #[serde(rename = "_comment", default)]
    _comment: Option<String>,

    /// HTTP listener settings.
    #[serde(default)]
    pub server: ServerConfig,

    /// API key settings.
    #[serde(default)]
    pub auth: AuthConfig,

    /// Rate limiter settings.
    #[serde(default)]
    pub rate_limit: RateLimitConfig,

    /// Request monitoring settings.
    #[serde(default)]
    pub monitoring: MonitoringConfig,

    /// Directories the file tools may touch. Empty means unrestricted.
    #[serde(default)]
    pub allowed_paths: Vec<PathBuf>,

    /// Logging settings.
    #[serde(default)]
    pub logging: LoggingConfig,
}

impl Config {
    /// Validates the configuration.
    ///
    /// # Errors
    ///
    /// Returns an error if any validation checks fail.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.rate_limit.limit == 0 {
            return Err(ConfigError::ValidationError {
                message: "rate_limit.limit must be at least 1".to_string(),
            });
        }
        if self.rate_limit.window_secs == 0 {
            return Err(ConfigError::ValidationError {
                message: "rate_limit.window_secs must be at least 1".to_string(),
            });
        }
        if self.server.max_body_bytes == 0 {
            return Err(ConfigError::ValidationError {
                message: "server.max_body_bytes must be at least 1".to_string(),
            });
        }
        let level = self.logging.level.to_lowercase();
        if !LOG_LEVELS.contains(&level.as_str()) {
            return Err(ConfigError::ValidationError {
                message: format!(
                    "Invalid log level '{}'. Must be one of: {}",
                    self.logging.level,
                    LOG_LEVELS.join(", ")
                ),
            });
        }
        Ok(())
    }

    /// Applies environment variable overrides on top of file values.
    ///
    /// # Errors
    ///
    /// Returns an error if a numeric or boolean variable cannot be parsed.
    pub fn apply_env_overrides(&mut self) -> Result<(), ConfigError> {
        self.apply_overrides_from(|name| std::env::var(name).ok())
    }

    /// Applies overrides using `lookup` to resolve variable names.
    ///
    /// # Errors
    ///
    /// Returns an error if a numeric or boolean variable cannot be parsed.
    pub fn apply_overrides_from<F>(&mut self, lookup: F) -> Result<(), ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(keys) = lookup("MCP_API_KEYS") {
            self.auth.api_keys = split_list(&keys);
        }
        if let Some(host) = lookup("HOST") {
            self.server.host = host;
        }
        if let Some(port) = lookup("PORT") {
            self.server.port = parse_env("PORT", &port)?;
        }
        if let Some(limit) = lookup("MCP_RATE_LIMIT") {
            self.rate_limit.limit = parse_env("MCP_RATE_LIMIT", &limit)?;
        }
        if let Some(window) = lookup("MCP_RATE_WINDOW") {
            self.rate_limit.window_secs = parse_env("MCP_RATE_WINDOW", &window)?;
        }
        if let Some(level) = lookup("MCP_LOG_LEVEL") {
            self.logging.level = level.to_lowercase();
        }
        if let Some(enabled) = lookup("MCP_ENABLE_MONITORING") {
            self.monitoring.enabled = parse_bool("MCP_ENABLE_MONITORING", &enabled)?;
        }
        if let Some(origins) = lookup("MCP_CORS_ORIGINS") {
            self.server.cors_origins = split_list(&origins);
        }
        Ok(())
    }
}

fn split_list(raw: &str) -> Vec<String> {
    raw.split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
        .collect()
}

fn parse_env<T: std::str::FromStr>(name: &'static str, raw: &str) -> Result<T, ConfigError> {
    raw.trim()
        .parse()
        .map_err(|_| ConfigError::InvalidEnv { name })
}

fn parse_bool(name: &'static str, raw: &str) -> Result<bool, ConfigError> {
    match raw.trim().to_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Ok(true),
        "0" | "false" | "no" | "off" => Ok(false),
        _ => Err(ConfigError::InvalidEnv { name }),
    }
}

/// HTTP listener configuration.
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ServerConfig {
    /// Bind address.
    #[serde(default = "default_host")]
    pub host: String,

    /// Bind port.
    #[serde(default = "default_port")]
    pub port: u16,

    /// Largest accepted request body in bytes.
    #[serde(default = "default_max_body_bytes")]
    pub max_body_bytes: usize,

    /// Upper bound on a single dispatch, in seconds. `0` disables the bound.
    #[serde(default = "default_tool_timeout")]
    pub tool_timeout_secs: u64,

    /// Origins allowed by CORS. `*` allows any origin.
    #[serde(default = "default_cors_origins")]
    pub cors_origins: Vec<String>,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
            max_body_bytes: default_max_body_bytes(),
            tool_timeout_secs: default_tool_timeout(),
            cors_origins: default_cors_origins(),
        }
    }
}

fn default_host() -> String {
    "127.0.0.1".to_string()
}

const fn default_port() -> u16 {
    8443
}

const fn default_max_body_bytes() -> usize {
    1024 * 1024
}

const fn default_tool_timeout() -> u64 {
    30
}

fn default_cors_origins() -> Vec<String> {
    vec!["*".to_string()]
}

/// API key configuration.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct AuthConfig {
    /// Accepted bearer tokens.
    #[serde(default)]
    pub api_keys: Vec<String>,
}

/// Rate limiter configuration.
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct RateLimitConfig {
    /// Requests allowed per client per window.
    #[serde(default = "default_rate_limit")]
    pub limit: usize,

    /// Window length in seconds.
    #[serde(default = "default_window_secs")]
    pub window_secs: u64,

    /// How often idle clients are dropped, in seconds.
    #[serde(default = "default_prune_interval")]
    pub prune_interval_secs: u64,
}

impl Default for RateLimitConfig {
    fn default() -> Self {
        Self {
            limit: default_rate_limit(),
            window_secs: default_window_secs(),
            prune_interval_secs: default_prune_interval(),
        }
    }
}

const fn default_rate_limit() -> usize {
    100
}

const fn default_window_secs() -> u64 {
    60
}

const fn default_prune_interval() -> u64 {
    300
}

/// Monitoring configuration.
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct MonitoringConfig {
    /// Whether request outcomes are recorded.
    #[serde(default = "default_true")]
    pub enabled: bool,

    /// Number of request records kept in memory.
    #[serde(default = "default_max_records")]
    pub max_records: usize,

    /// How often a stats summary is logged, in seconds (0 disables it).
    #[serde(default = "default_stats_interval")]
    pub stats_interval_secs: u64,
}

impl Default for MonitoringConfig {
    fn default() -> Self {
        Self {
            enabled: default_true(),
            max_records: default_max_records(),
            stats_interval_secs: default_stats_interval(),
        }
    }
}

const fn default_true() -> bool {
    true
}

const fn default_max_records() -> usize {
    1000
}

const fn default_stats_interval() -> u64 {
    60
}

/// Logging configuration.
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct LoggingConfig {
    /// Log level (trace, debug, info, warn, error).
    #[serde(default = "default_log_level")]
    pub level: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
        }
    }
}

fn default_log_level() -> String {
    "warn".to_string()
}
