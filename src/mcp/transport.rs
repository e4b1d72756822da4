//! stdio transport for the MCP server.
//!
//! - Messages are UTF-8 encoded JSON-RPC
//! - Messages are delimited by newlines
//! - Messages must not contain embedded newlines
//! - stdin: receives messages from client
//! - stdout: sends replies to client
//! - stderr: logging only

use std::io;

use tokio::io::{AsyncBufRead, AsyncBufReadExt, AsyncWrite, AsyncWriteExt, BufReader};

use crate::mcp::protocol::JsonRpcReply;

/// A newline-delimited JSON-RPC transport.
///
/// Generic over the reader and writer so tests can drive it from memory;
/// [`StdioTransport::stdio`] wires it to the process streams.
pub struct StdioTransport<R, W> {
    reader: R,
    writer: W,
}

impl StdioTransport<BufReader<tokio::io::Stdin>, tokio::io::Stdout> {
    /// Creates a transport over the process stdin and stdout.
    #[must_use]
    pub fn stdio() -> Self {
        Self::new(BufReader::new(tokio::io::stdin()), tokio::io::stdout())
    }
}

impl<R, W> StdioTransport<R, W>
where
    R: AsyncBufRead + Unpin,
    W: AsyncWrite + Unpin,
{
    /// Creates a transport over arbitrary streams.
    pub const fn new(reader: R, writer: W) -> Self {
        Self { reader, writer }
    }

    /// Reads the next message line.
    ///
    /// Returns `None` if the input is closed (EOF).
    ///
    /// # Errors
    ///
    /// Returns an error if reading fails.
    pub async fn read_line(&mut self) -> io::Result<Option<Vec<u8>>> {
        let mut line = Vec::new();
        let bytes_read = self.reader.read_until(b'\n', &mut line).await?;

        if bytes_read == 0 {
            return Ok(None);
        }

        if line.last() == Some(&b'\n') {
            line.pop();
            if line.last() == Some(&b'\r') {
                line.pop();
            }
        }

        Ok(Some(line))
    }

    /// Writes a JSON-RPC reply, terminated with a newline.
    ///
    /// # Errors
    ///
    /// Returns an error if serialisation or writing fails.
    pub async fn write_reply(&mut self, reply: &JsonRpcReply) -> io::Result<()> {
        let json = serde_json::to_string(reply)
            .map_err(|e| io::Error::new(io::ErrorKind::InvalidData, e))?;

        self.write_raw(&json).await
    }

    async fn write_raw(&mut self, json: &str) -> io::Result<()> {
        // Framing relies on serde_json's compact output
        debug_assert!(
            !json.contains('\n'),
            "JSON message must not contain embedded newlines"
        );

        self.writer.write_all(json.as_bytes()).await?;
        self.writer.write_all(b"\n").await?;
        self.writer.flush().await?;

        Ok(())
    }

    /// Consumes the transport, returning the writer.
    pub fn into_writer(self) -> W {
        self.writer
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mcp::protocol::{JsonRpcError, JsonRpcResponse, RequestId};

    #[tokio::test]
    async fn reads_lines_and_strips_terminators() {
        let input: &[u8] = b"first\r\nsecond\nthird";
        let mut transport = StdioTransport::new(input, Vec::new());

        assert_eq!(transport.read_line().await.unwrap(), Some(b"first".to_vec()));
        assert_eq!(transport.read_line().await.unwrap(), Some(b"second".to_vec()));
        assert_eq!(transport.read_line().await.unwrap(), Some(b"third".to_vec()));
        assert_eq!(transport.read_line().await.unwrap(), None);
    }

    #[tokio::test]
    async fn keeps_invalid_utf8_bytes() {
        let input: &[u8] = b"\xff\xfe\n";
        let mut transport = StdioTransport::new(input, Vec::new());
        assert_eq!(transport.read_line().await.unwrap(), Some(vec![0xff, 0xfe]));
    }

    #[tokio::test]
    async fn writes_one_line_per_reply() {
        let mut transport = StdioTransport::new(&b""[..], Vec::new());

        let ok = JsonRpcResponse::success(
            RequestId::Number(1),
            serde_json::json!({"message": "hello\nworld", "nested": {"key": "value"}}),
        );
        transport.write_reply(&ok.into()).await.unwrap();
        let err = JsonRpcError::method_not_found(RequestId::Number(2), "test/method");
        transport.write_reply(&err.into()).await.unwrap();

        let output = String::from_utf8(transport.into_writer()).unwrap();
        let lines: Vec<&str> = output.lines().collect();
        assert_eq!(lines.len(), 2);
        assert!(output.ends_with('\n'));

        let first: serde_json::Value = serde_json::from_str(lines[0]).unwrap();
        assert_eq!(first["result"]["message"], "hello\nworld");
        let second: serde_json::Value = serde_json::from_str(lines[1]).unwrap();
        assert_eq!(second["error"]["code"], -32601);
    }
}
