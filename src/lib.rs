//! secure-mcp-server: an MCP tool server with API-key authentication and
//! per-client rate limiting.
//!
//! Tools are registered by name with a JSON schema and a handler, then
//! listed and invoked through JSON-RPC 2.0 over stdio or HTTP. The HTTP
//! transport checks the client's rate limit, then its bearer key, before
//! any request reaches the dispatcher.
//!
//! # Modules
//!
//! - [`auth`] — API key generation and constant-time verification
//! - [`config`] — Configuration loading and validation
//! - [`error`] — Error types
//! - [`mcp`] — JSON-RPC protocol, dispatcher and transports
//! - [`monitoring`] — Bounded request log and statistics
//! - [`rate_limit`] — Sliding-window rate limiter
//! - [`tools`] — Tool registry and built-in tools

pub mod auth;
pub mod config;
pub mod error;
pub mod mcp;
pub mod monitoring;
pub mod rate_limit;
pub mod tools;
