//! Model Context Protocol (MCP) server implementation.
//!
//! A single [`Dispatcher`] turns JSON-RPC 2.0 messages into tool and
//! resource calls. Two transports feed it:
//!
//! ```text
//! ┌──────────────────────────────────────────────────────────────┐
//! │   ┌──────────────┐                                           │
//! │   │ stdio (line) │──────────────┐                            │
//! │   └──────────────┘              ▼                            │
//! │   ┌──────────────┐    ┌──────────────────┐   ┌────────────┐  │
//! │   │ HTTP (axum)  │───▶│    Dispatcher    │──▶│   Tools /  │  │
//! │   │ rate → auth  │    │ (method routing) │   │  Resources │  │
//! │   └──────────────┘    └──────────────────┘   └────────────┘  │
//! └──────────────────────────────────────────────────────────────┘
//! ```
//!
//! # Protocol Version
//!
//! This implementation targets MCP protocol version 2024-11-05.

pub mod dispatcher;
pub mod http;
pub mod protocol;
pub mod resources;
pub mod server;
pub mod transport;

pub use dispatcher::Dispatcher;
pub use protocol::{JsonRpcError, JsonRpcReply, JsonRpcRequest, JsonRpcResponse, MCP_PROTOCOL_VERSION};
pub use server::StdioServer;
pub use transport::StdioTransport;
