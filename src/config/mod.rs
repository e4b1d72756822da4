//! Configuration file loading and parsing.
//!
//! This module handles loading the configuration file from disk and parsing
//! it into validated, type-safe structures.
//!
//! # Configuration File Locations
//!
//! The configuration file is searched in the following order:
//!
//! 1. Path given as the `CONFIG_FILE` CLI argument
//! 2. Default location:
//!    - **Linux/macOS:** `~/.secure-mcp-server/config.json`
//!    - **Windows:** `%USERPROFILE%\.secure-mcp-server\config.json`
//!
//! When no path is given and the default file does not exist, built-in
//! defaults are used. Environment variables (`MCP_API_KEYS`, `PORT`, ...)
//! are applied on top of whatever was loaded.

mod settings;

pub use settings::{
    AuthConfig, Config, LoggingConfig, MonitoringConfig, RateLimitConfig, ServerConfig,
};

use std::path::{Path, PathBuf};

use crate::error::ConfigError;

/// Returns the default configuration directory.
///
/// - **Linux/macOS:** `~/.secure-mcp-server/`
/// - **Windows:** `%USERPROFILE%\.secure-mcp-server\`
#[must_use]
pub fn default_config_dir() -> Option<PathBuf> {
    dirs::home_dir().map(|p| p.join(".secure-mcp-server"))
}

/// Returns the platform-specific default configuration file path.
#[must_use]
pub fn default_config_path() -> Option<PathBuf> {
    default_config_dir().map(|p| p.join("config.json"))
}

/// Loads and parses the configuration file, then applies environment overrides.
///
/// If `path` is `None`, uses the platform-specific default location, falling
/// back to built-in defaults when that file does not exist.
///
/// # Errors
///
/// Returns an error if:
/// - An explicitly given configuration file cannot be found
/// - The file cannot be read
/// - The JSON is malformed
/// - An environment override is malformed
/// - Required fields are missing or invalid
pub fn load_config(path: Option<&Path>) -> Result<Config, ConfigError> {
    let mut config = match path {
        Some(p) => read_config_file(p)?,
        None => match default_config_path() {
            Some(default_path) if default_path.exists() => read_config_file(&default_path)?,
            _ => Config::default(),
        },
    };

    config.apply_env_overrides()?;

    // Validate the configuration
    config.validate()?;

    Ok(config)
}

/// Reads and parses a single configuration file without overrides.
///
/// # Errors
///
/// Returns an error if the file is missing, unreadable or malformed.
pub fn read_config_file(config_path: &Path) -> Result<Config, ConfigError> {
    if !config_path.exists() {
        return Err(ConfigError::NotFound {
            path: config_path.to_path_buf(),
        });
    }

    let contents = std::fs::read_to_string(config_path).map_err(|e| ConfigError::ReadError {
        path: config_path.to_path_buf(),
        source: e,
    })?;

    serde_json::from_str(&contents).map_err(|e| ConfigError::ParseError {
        path: config_path.to_path_buf(),
        source: e,
    })
}
