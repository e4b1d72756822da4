//! stdio MCP server loop.
//!
//! Reads one JSON-RPC message per line, dispatches it and writes the reply.
//! The loop ends on EOF or on SIGINT/SIGTERM (Ctrl+C on Windows). This path
//! is a local process pipe and carries no authentication.

use std::io;

use tokio::io::{AsyncBufRead, AsyncWrite};

use crate::mcp::dispatcher::Dispatcher;
use crate::mcp::transport::StdioTransport;

/// MCP server over a newline-delimited stream.
pub struct StdioServer<R, W> {
    dispatcher: Dispatcher,
    transport: StdioTransport<R, W>,
}

impl StdioServer<tokio::io::BufReader<tokio::io::Stdin>, tokio::io::Stdout> {
    /// Creates a server bound to the process stdin and stdout.
    #[must_use]
    pub fn stdio(dispatcher: Dispatcher) -> Self {
        Self::new(dispatcher, StdioTransport::stdio())
    }

    /// Runs the server until stdin closes or a shutdown signal arrives.
    ///
    /// # Errors
    ///
    /// Returns an error if reading or writing fails.
    pub async fn run(&mut self) -> io::Result<()> {
        self.run_with_shutdown().await
    }

    /// Runs the main loop and handles shutdown.
    #[cfg(unix)]
    async fn run_with_shutdown(&mut self) -> io::Result<()> {
        use tokio::signal::unix::{signal, SignalKind};

        let mut sigint = signal(SignalKind::interrupt()).map_err(io::Error::other)?;
        let mut sigterm = signal(SignalKind::terminate()).map_err(io::Error::other)?;

        loop {
            tokio::select! {
                _ = sigint.recv() => {
                    tracing::info!("Received SIGINT, initiating graceful shutdown");
                    return Ok(());
                }

                _ = sigterm.recv() => {
                    tracing::info!("Received SIGTERM, initiating graceful shutdown");
                    return Ok(());
                }

                line_result = self.transport.read_line() => {
                    if self.handle_transport_result(line_result).await? {
                        return Ok(());
                    }
                }
            }
        }
    }

    /// Runs the main loop and handles shutdown.
    #[cfg(windows)]
    async fn run_with_shutdown(&mut self) -> io::Result<()> {
        let ctrl_c = tokio::signal::ctrl_c();
        tokio::pin!(ctrl_c);

        loop {
            tokio::select! {
                _ = &mut ctrl_c => {
                    tracing::info!("Received Ctrl+C, initiating graceful shutdown");
                    return Ok(());
                }

                line_result = self.transport.read_line() => {
                    if self.handle_transport_result(line_result).await? {
                        return Ok(());
                    }
                }
            }
        }
    }
}

impl<R, W> StdioServer<R, W>
where
    R: AsyncBufRead + Unpin,
    W: AsyncWrite + Unpin,
{
    /// Creates a server over an arbitrary transport.
    pub const fn new(dispatcher: Dispatcher, transport: StdioTransport<R, W>) -> Self {
        Self {
            dispatcher,
            transport,
        }
    }

    /// Serves messages until the input reaches EOF, without signal handling.
    ///
    /// # Errors
    ///
    /// Returns an error if reading or writing fails.
    pub async fn run_until_eof(&mut self) -> io::Result<()> {
        loop {
            let line_result = self.transport.read_line().await;
            if self.handle_transport_result(line_result).await? {
                return Ok(());
            }
        }
    }

    /// Consumes the server, returning the transport's writer.
    pub fn into_writer(self) -> W {
        self.transport.into_writer()
    }

    /// Handles the result from transport read.
    ///
    /// Returns `true` if the server should shut down.
    async fn handle_transport_result(
        &mut self,
        line_result: io::Result<Option<Vec<u8>>>,
    ) -> io::Result<bool> {
        let Some(line) = line_result? else {
            tracing::info!("Input closed, shutting down");
            return Ok(true);
        };

        if line.iter().all(u8::is_ascii_whitespace) {
            return Ok(false);
        }

        if let Some(reply) = self.dispatcher.handle_bytes(&line) {
            self.transport.write_reply(&reply).await?;
        }

        Ok(false)
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use serde_json::Value;

    use super::*;
    use crate::tools::builtin::builtin_registry;
    use crate::tools::paths::PathGuard;

    async fn run_script(input: &str) -> Vec<Value> {
        let dispatcher = Dispatcher::new(Arc::new(builtin_registry(PathGuard::default())));
        let transport = StdioTransport::new(input.as_bytes(), Vec::new());
        let mut server = StdioServer::new(dispatcher, transport);
        server.run_until_eof().await.unwrap();

        let output = String::from_utf8(server.into_writer()).unwrap();
        output
            .lines()
            .map(|l| serde_json::from_str(l).unwrap())
            .collect()
    }

    #[tokio::test]
    async fn answers_each_request_in_order() {
        let replies = run_script(concat!(
            r#"{"jsonrpc":"2.0","id":1,"method":"initialize","params":{}}"#,
            "\n",
            r#"{"jsonrpc":"2.0","method":"notifications/initialized"}"#,
            "\n",
            "\n",
            r#"{"jsonrpc":"2.0","id":2,"method":"tools/call","params":{"name":"echo","arguments":{"message":"hi"}}}"#,
            "\n",
            "not json\n",
        ))
        .await;

        assert_eq!(replies.len(), 3);
        assert_eq!(replies[0]["id"], 1);
        assert!(replies[0]["result"]["serverInfo"].is_object());
        assert_eq!(replies[1]["result"]["content"][0]["text"], "hi");
        assert_eq!(replies[2]["id"], Value::Null);
        assert_eq!(replies[2]["error"]["code"], -32700);
    }

    #[tokio::test]
    async fn empty_input_produces_nothing() {
        assert!(run_script("").await.is_empty());
    }
}
