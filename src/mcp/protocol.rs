//! JSON-RPC 2.0 message types for MCP protocol.
//!
//! This module defines the core message types used in the Model Context Protocol.
//! All messages follow the JSON-RPC 2.0 specification with MCP-specific extensions.
//!
//! # Message Types
//!
//! - **Request**: A message expecting a response
//! - **Response**: A reply to a request (success or error)
//! - **Notification**: A one-way `notifications/*` message without an `id`
//!
//! # Request IDs
//!
//! The `id` is echoed back unchanged, whatever JSON value it holds. A request
//! that omits it (and is not a notification) is answered with `"id": null`,
//! as are requests whose `id` cannot be recovered at all.

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// The MCP protocol version this implementation supports.
pub const MCP_PROTOCOL_VERSION: &str = "2024-11-05";

/// Server name for capability negotiation.
pub const SERVER_NAME: &str = "secure-mcp-server";

/// Method prefix reserved for notifications.
const NOTIFICATION_PREFIX: &str = "notifications/";

/// A JSON-RPC 2.0 request ID.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum RequestId {
    /// Integer request ID.
    Number(i64),
    /// String request ID.
    String(String),
    /// Explicit `null`, or an ID that was absent or unrecoverable.
    #[default]
    Null,
    /// Any other JSON value (fractions, integers beyond `i64`, booleans,
    /// arrays, objects), echoed verbatim.
    Other(Value),
}

impl From<Value> for RequestId {
    fn from(value: Value) -> Self {
        match value {
            Value::Null => Self::Null,
            Value::String(s) => Self::String(s),
            Value::Number(n) => match n.as_i64() {
                Some(i) => Self::Number(i),
                None => Self::Other(Value::Number(n)),
            },
            other => Self::Other(other),
        }
    }
}

impl std::fmt::Display for RequestId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Number(n) => write!(f, "{n}"),
            Self::String(s) => write!(f, "{s}"),
            Self::Null => write!(f, "null"),
            Self::Other(v) => write!(f, "{v}"),
        }
    }
}

/// A JSON-RPC 2.0 request message.
///
/// Requests expect a response from the server.
#[derive(Debug, Clone, Deserialize)]
pub struct JsonRpcRequest {
    /// Must be "2.0".
    pub jsonrpc: String,

    /// Request identifier, `Null` when absent.
    #[serde(default)]
    pub id: RequestId,

    /// The method to invoke.
    pub method: String,

    /// Optional parameters for the method.
    #[serde(default)]
    pub params: Option<Value>,
}

impl JsonRpcRequest {
    /// Validates that this is a well-formed JSON-RPC 2.0 request.
    ///
    /// Returns an error message if validation fails.
    #[must_use]
    pub fn validate(&self) -> Option<&'static str> {
        if self.jsonrpc != "2.0" {
            return Some("jsonrpc field must be \"2.0\"");
        }
        if self.method.is_empty() {
            return Some("method field cannot be empty");
        }
        None
    }
}

/// A JSON-RPC 2.0 notification message (incoming).
///
/// Notifications do not have an ID and do not expect a response.
#[derive(Debug, Clone, Deserialize)]
pub struct JsonRpcNotification {
    /// Must be "2.0".
    pub jsonrpc: String,

    /// The notification method.
    pub method: String,

    /// Optional parameters for the notification.
    #[serde(default)]
    pub params: Option<Value>,
}

/// A successful JSON-RPC 2.0 response.
#[derive(Debug, Clone, Serialize)]
pub struct JsonRpcResponse {
    /// Always "2.0".
    pub jsonrpc: &'static str,

    /// The request ID this response corresponds to.
    pub id: RequestId,

    /// The result of the method call.
    pub result: Value,
}

impl JsonRpcResponse {
    /// Creates a new success response.
    #[must_use]
    #[allow(clippy::missing_const_for_fn)] // Value is not const-compatible
    pub fn success(id: RequestId, result: Value) -> Self {
        Self {
            jsonrpc: "2.0",
            id,
            result,
        }
    }
}

/// Standard JSON-RPC 2.0 error codes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorCode {
    /// Invalid JSON was received by the server.
    ParseError,
    /// The JSON sent is not a valid Request object.
    InvalidRequest,
    /// The method does not exist or is not available.
    MethodNotFound,
    /// Invalid method parameters.
    InvalidParams,
    /// Internal JSON-RPC error.
    InternalError,
}

impl ErrorCode {
    /// Returns the numeric code for this error.
    #[must_use]
    pub const fn code(self) -> i32 {
        match self {
            Self::ParseError => -32700,
            Self::InvalidRequest => -32600,
            Self::MethodNotFound => -32601,
            Self::InvalidParams => -32602,
            Self::InternalError => -32603,
        }
    }

    /// Returns the default message for this error code.
    #[must_use]
    pub const fn default_message(self) -> &'static str {
        match self {
            Self::ParseError => "Parse error",
            Self::InvalidRequest => "Invalid Request",
            Self::MethodNotFound => "Method not found",
            Self::InvalidParams => "Invalid params",
            Self::InternalError => "Internal error",
        }
    }
}

/// A JSON-RPC 2.0 error object.
#[derive(Debug, Clone, Serialize)]
pub struct JsonRpcErrorData {
    /// The error code.
    pub code: i32,

    /// A short description of the error.
    pub message: String,
}

impl JsonRpcErrorData {
    /// Creates a new error from an error code.
    #[must_use]
    pub fn from_code(code: ErrorCode) -> Self {
        Self {
            code: code.code(),
            message: code.default_message().to_string(),
        }
    }

    /// Creates a new error with a custom message.
    #[must_use]
    pub fn with_message(code: ErrorCode, message: impl Into<String>) -> Self {
        Self {
            code: code.code(),
            message: message.into(),
        }
    }
}

/// A JSON-RPC 2.0 error response.
#[derive(Debug, Clone, Serialize)]
pub struct JsonRpcError {
    /// Always "2.0".
    pub jsonrpc: &'static str,

    /// The request ID this error corresponds to (`null` if unknown).
    pub id: RequestId,

    /// The error details.
    pub error: JsonRpcErrorData,
}

impl JsonRpcError {
    /// Creates a new error response.
    #[must_use]
    #[allow(clippy::missing_const_for_fn)] // JsonRpcErrorData contains String
    pub fn new(id: RequestId, error: JsonRpcErrorData) -> Self {
        Self {
            jsonrpc: "2.0",
            id,
            error,
        }
    }

    /// Creates a parse error response (ID cannot be determined).
    #[must_use]
    pub fn parse_error() -> Self {
        Self::new(
            RequestId::Null,
            JsonRpcErrorData::from_code(ErrorCode::ParseError),
        )
    }

    /// Creates an invalid request error response.
    #[must_use]
    pub fn invalid_request(id: RequestId, message: impl Into<String>) -> Self {
        Self::new(
            id,
            JsonRpcErrorData::with_message(ErrorCode::InvalidRequest, message),
        )
    }

    /// Creates a method not found error response.
    #[must_use]
    pub fn method_not_found(id: RequestId, method: &str) -> Self {
        Self::new(
            id,
            JsonRpcErrorData::with_message(
                ErrorCode::MethodNotFound,
                format!("Method not found: {method}"),
            ),
        )
    }

    /// Creates an invalid params error response.
    #[must_use]
    pub fn invalid_params(id: RequestId, message: impl Into<String>) -> Self {
        Self::new(
            id,
            JsonRpcErrorData::with_message(ErrorCode::InvalidParams, message),
        )
    }

    /// Creates an internal error response.
    #[must_use]
    pub fn internal_error(id: RequestId, message: impl Into<String>) -> Self {
        Self::new(
            id,
            JsonRpcErrorData::with_message(ErrorCode::InternalError, message),
        )
    }
}

/// Any outgoing reply: a result or an error.
#[derive(Debug, Clone, Serialize)]
#[serde(untagged)]
pub enum JsonRpcReply {
    /// A successful response.
    Success(JsonRpcResponse),
    /// An error response.
    Error(JsonRpcError),
}

impl JsonRpcReply {
    /// The echoed request ID.
    #[must_use]
    pub const fn id(&self) -> &RequestId {
        match self {
            Self::Success(resp) => &resp.id,
            Self::Error(err) => &err.id,
        }
    }

    /// The error code, if this is an error reply.
    #[must_use]
    pub const fn error_code(&self) -> Option<i32> {
        match self {
            Self::Success(_) => None,
            Self::Error(err) => Some(err.error.code),
        }
    }
}

impl From<JsonRpcResponse> for JsonRpcReply {
    fn from(resp: JsonRpcResponse) -> Self {
        Self::Success(resp)
    }
}

impl From<JsonRpcError> for JsonRpcReply {
    fn from(err: JsonRpcError) -> Self {
        Self::Error(err)
    }
}

impl From<Result<JsonRpcResponse, JsonRpcError>> for JsonRpcReply {
    fn from(result: Result<JsonRpcResponse, JsonRpcError>) -> Self {
        match result {
            Ok(resp) => Self::Success(resp),
            Err(err) => Self::Error(err),
        }
    }
}

/// An incoming message that could be either a request or notification.
#[derive(Debug, Clone)]
pub enum IncomingMessage {
    /// A request expecting a response.
    Request(JsonRpcRequest),
    /// A notification (no response expected).
    Notification(JsonRpcNotification),
}

/// Parses raw bytes into an incoming message.
///
/// Non-UTF-8 input is treated as malformed JSON.
///
/// # Errors
///
/// Returns a `JsonRpcError` if the bytes are not a valid message.
pub fn parse_bytes(bytes: &[u8]) -> Result<IncomingMessage, JsonRpcError> {
    let text = std::str::from_utf8(bytes).map_err(|_| JsonRpcError::parse_error())?;
    parse_message(text)
}

/// Parses a JSON string into an incoming message.
///
/// # Errors
///
/// Returns a `JsonRpcError` if the JSON is malformed or not a valid message.
pub fn parse_message(json: &str) -> Result<IncomingMessage, JsonRpcError> {
    // First, try to parse as generic JSON to check structure
    let value: Value = serde_json::from_str(json).map_err(|_| JsonRpcError::parse_error())?;

    // Check if it's an object
    let obj = value
        .as_object()
        .ok_or_else(|| JsonRpcError::invalid_request(RequestId::Null, "Request must be an object"))?;

    // Recover the ID early so later errors can echo it
    let has_id = obj.contains_key("id");
    let id = obj.get("id").cloned().map(RequestId::from).unwrap_or_default();

    // Check for jsonrpc field
    let jsonrpc = obj.get("jsonrpc").and_then(Value::as_str);
    if jsonrpc != Some("2.0") {
        return Err(JsonRpcError::invalid_request(
            id,
            "jsonrpc field must be \"2.0\"",
        ));
    }

    let Some(method) = obj.get("method").and_then(Value::as_str) else {
        return Err(JsonRpcError::invalid_request(
            id,
            "method field must be a string",
        ));
    };

    if !has_id && method.starts_with(NOTIFICATION_PREFIX) {
        let notification: JsonRpcNotification = serde_json::from_value(value)
            .map_err(|_| JsonRpcError::invalid_request(RequestId::Null, "Malformed notification"))?;
        return Ok(IncomingMessage::Notification(notification));
    }

    let request: JsonRpcRequest = serde_json::from_value(value)
        .map_err(|_| JsonRpcError::invalid_request(id.clone(), "Malformed request"))?;

    if let Some(problem) = request.validate() {
        return Err(JsonRpcError::invalid_request(request.id, problem));
    }

    Ok(IncomingMessage::Request(request))
}

/// Best-effort recovery of the request ID from raw bytes.
///
/// Used when a reply must be produced without the dispatcher's help, such as
/// after a timeout. Anything unrecoverable yields `RequestId::Null`.
#[must_use]
pub fn peek_id(bytes: &[u8]) -> RequestId {
    serde_json::from_slice::<Value>(bytes)
        .ok()
        .and_then(|value| value.get("id").cloned())
        .map(RequestId::from)
        .unwrap_or_default()
}
