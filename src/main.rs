//! secure-mcp-server: MCP tool server with API-key authentication and rate
//! limiting.
//!
//! Serves the built-in tools over stdio (default) or HTTP.

use std::net::{IpAddr, SocketAddr};
use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;

use clap::{Parser, Subcommand};
use tracing::{error, info, Level};
use tracing_subscriber::EnvFilter;

use secure_mcp_server::auth::Authenticator;
use secure_mcp_server::config::{self, Config};
use secure_mcp_server::mcp::http::{self, AppState};
use secure_mcp_server::mcp::{Dispatcher, StdioServer};
use secure_mcp_server::tools::builtin::builtin_registry;
use secure_mcp_server::tools::paths::PathGuard;

/// MCP tool server with API-key authentication and rate limiting.
#[derive(Parser, Debug)]
#[command(name = "secure-mcp-server")]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Path to configuration file
    #[arg(value_name = "CONFIG_FILE")]
    config: Option<PathBuf>,

    /// Increase logging verbosity (-v for info, -vv for debug, -vvv for trace)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    verbose: u8,

    /// Decrease logging verbosity (only show errors)
    #[arg(short, long, global = true)]
    quiet: bool,

    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Serve JSON-RPC over stdin/stdout (default)
    Stdio,

    /// Serve JSON-RPC over HTTP with authentication and rate limiting
    Http {
        /// Address to bind, overrides `server.host`
        #[arg(long)]
        host: Option<String>,

        /// Port to bind, overrides `server.port`
        #[arg(long)]
        port: Option<u16>,
    },

    /// Print freshly generated API keys
    GenerateKey {
        /// Number of keys to generate
        #[arg(long, default_value_t = 1)]
        count: usize,
    },
}

/// Determines the log level from CLI arguments.
#[allow(clippy::match_same_arms)] // Explicit "warn" arm for clarity
fn get_log_level(verbose: u8, quiet: bool, config_level: &str) -> Level {
    if quiet {
        return Level::ERROR;
    }

    match verbose {
        0 => match config_level.to_lowercase().as_str() {
            "trace" => Level::TRACE,
            "debug" => Level::DEBUG,
            "info" => Level::INFO,
            "warn" => Level::WARN,
            "error" => Level::ERROR,
            _ => Level::WARN, // Default to warn for unknown levels
        },
        1 => Level::INFO,
        2 => Level::DEBUG,
        _ => Level::TRACE,
    }
}

/// Initialises the tracing subscriber for logging.
fn init_tracing(level: Level) {
    let filter = EnvFilter::from_default_env().add_directive(level.into());

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();
}

/// Entry point for the secure-mcp-server.
fn main() -> ExitCode {
    let args = Args::parse();
    let command = args.command.unwrap_or(Command::Stdio);

    if let Command::GenerateKey { count } = command {
        for _ in 0..count {
            println!("{}", Authenticator::generate_key());
        }
        return ExitCode::SUCCESS;
    }

    // Load configuration
    let config_path = args.config.as_deref();
    let cfg = match config::load_config(config_path) {
        Ok(cfg) => cfg,
        Err(e) => {
            eprintln!("Configuration error: {e}");
            if config_path.is_none() {
                if let Some(default_path) = config::default_config_path() {
                    eprintln!("\nDefault config path: {}", default_path.display());
                }
            }
            return ExitCode::FAILURE;
        }
    };

    // Initialise logging
    let log_level = get_log_level(args.verbose, args.quiet, &cfg.logging.level);
    init_tracing(log_level);

    info!(
        version = env!("CARGO_PKG_VERSION"),
        "Starting secure-mcp-server"
    );
    info!(allowed_paths = ?cfg.allowed_paths, "Allowed paths configured");

    let registry = builtin_registry(PathGuard::new(cfg.allowed_paths.clone()));
    info!(tools = registry.len(), "Tools registered");
    let dispatcher = Dispatcher::new(Arc::new(registry));

    let result = match command {
        Command::Http { host, port } => run_http(dispatcher, cfg, host, port),
        Command::Stdio | Command::GenerateKey { .. } => run_stdio(dispatcher),
    };

    match result {
        Ok(()) => {
            info!("Server shut down gracefully");
            ExitCode::SUCCESS
        }
        Err(e) => {
            error!(error = %e, "Server error");
            ExitCode::FAILURE
        }
    }
}

fn run_stdio(dispatcher: Dispatcher) -> std::io::Result<()> {
    let runtime = tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()?;

    info!("MCP server ready on stdio, waiting for client connection...");
    runtime.block_on(async { StdioServer::stdio(dispatcher).run().await })
}

fn run_http(
    dispatcher: Dispatcher,
    mut cfg: Config,
    host: Option<String>,
    port: Option<u16>,
) -> std::io::Result<()> {
    if let Some(host) = host {
        cfg.server.host = host;
    }
    if let Some(port) = port {
        cfg.server.port = port;
    }

    let ip: IpAddr = cfg.server.host.parse().map_err(|e| {
        std::io::Error::new(
            std::io::ErrorKind::InvalidInput,
            format!("invalid host '{}': {e}", cfg.server.host),
        )
    })?;
    let addr = SocketAddr::new(ip, cfg.server.port);

    info!(
        keys = cfg.auth.api_keys.len(),
        limit = cfg.rate_limit.limit,
        window_secs = cfg.rate_limit.window_secs,
        "HTTP security configured"
    );

    let state = Arc::new(AppState::new(dispatcher, &cfg));

    let runtime = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()?;

    runtime.block_on(http::serve(state, addr))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn verify_cli() {
        use clap::CommandFactory;
        Args::command().debug_assert();
    }

    #[test]
    fn default_command_is_stdio() {
        let args = Args::try_parse_from(["secure-mcp-server"]).unwrap();
        assert!(args.command.is_none());
    }

    #[test]
    fn http_overrides_parse() {
        let args =
            Args::try_parse_from(["secure-mcp-server", "http", "--host", "0.0.0.0", "--port", "9000"])
                .unwrap();
        match args.command {
            Some(Command::Http { host, port }) => {
                assert_eq!(host.as_deref(), Some("0.0.0.0"));
                assert_eq!(port, Some(9000));
            }
            other => panic!("unexpected command: {other:?}"),
        }
    }

    #[test]
    fn generate_key_count() {
        let args = Args::try_parse_from(["secure-mcp-server", "generate-key", "--count", "3"]).unwrap();
        assert!(matches!(args.command, Some(Command::GenerateKey { count: 3 })));
    }

    #[test]
    fn log_level_precedence() {
        assert_eq!(get_log_level(0, true, "trace"), Level::ERROR);
        assert_eq!(get_log_level(2, false, "error"), Level::DEBUG);
        assert_eq!(get_log_level(0, false, "info"), Level::INFO);
        assert_eq!(get_log_level(0, false, "bogus"), Level::WARN);
    }
}
