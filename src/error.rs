//! Error types for secure-mcp-server.
//!
//! # Security Note
//!
//! Error messages are carefully crafted to NEVER include credentials.
//! All error variants that could potentially contain sensitive data
//! use generic descriptions instead of including the actual values.

use std::path::PathBuf;

use thiserror::Error;

/// Errors that can occur during configuration operations.
#[derive(Error, Debug)]
pub enum ConfigError {
    /// Configuration file could not be read.
    #[error("failed to read configuration file: {path}")]
    ReadError {
        /// Path to the configuration file.
        path: PathBuf,
        /// The underlying IO error.
        #[source]
        source: std::io::Error,
    },

    /// Configuration file could not be parsed.
    #[error("failed to parse configuration file: {path}")]
    ParseError {
        /// Path to the configuration file.
        path: PathBuf,
        /// The underlying JSON error.
        #[source]
        source: serde_json::Error,
    },

    /// Configuration file not found.
    #[error("configuration file not found: {path}")]
    NotFound {
        /// Path where the configuration file was expected.
        path: PathBuf,
    },

    /// An environment variable held a value that could not be used.
    #[error("invalid value for environment variable {name}")]
    InvalidEnv {
        /// Name of the offending variable.
        name: &'static str,
    },

    /// Configuration validation failed.
    #[error("configuration validation failed: {message}")]
    ValidationError {
        /// Description of the validation failure.
        message: String,
    },
}

/// Errors raised at the tool invocation boundary.
///
/// Whatever a handler fails with is flattened into [`ToolError::Execution`]
/// so callers never see the handler's own error type.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ToolError {
    /// No tool is registered under the requested name.
    #[error("tool not found: {name}")]
    NotFound {
        /// The requested tool name.
        name: String,
    },

    /// The tool's handler reported a failure.
    #[error("tool execution error: {message}")]
    Execution {
        /// Human-readable failure description.
        message: String,
    },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn config_error_display() {
        let error = ConfigError::NotFound {
            path: PathBuf::from("/path/to/config.json"),
        };
        let msg = error.to_string();
        assert!(msg.contains("not found"));
        assert!(msg.contains("config.json"));
    }

    #[test]
    fn validation_error_display() {
        let error = ConfigError::ValidationError {
            message: "invalid setting".to_string(),
        };
        let msg = error.to_string();
        assert!(msg.contains("invalid setting"));
    }

    #[test]
    fn invalid_env_does_not_leak_value() {
        let error = ConfigError::InvalidEnv { name: "PORT" };
        assert_eq!(error.to_string(), "invalid value for environment variable PORT");
    }

    #[test]
    fn tool_error_display() {
        let not_found = ToolError::NotFound {
            name: "missing".to_string(),
        };
        assert_eq!(not_found.to_string(), "tool not found: missing");

        let failed = ToolError::Execution {
            message: "disk on fire".to_string(),
        };
        assert!(failed.to_string().contains("disk on fire"));
    }
}
