//! JSON-RPC method dispatch.
//!
//! Every request is an independent transaction: parse, resolve the method,
//! execute, and turn the outcome into a JSON-RPC reply. Nothing carries over
//! between requests, so one `Dispatcher` is shared by every transport and
//! connection.

use std::sync::Arc;

use serde::{Deserialize, Serialize};
use serde_json::{json, Map, Value};

use crate::error::ToolError;
use crate::mcp::protocol::{
    parse_bytes, parse_message, IncomingMessage, JsonRpcError, JsonRpcNotification,
    JsonRpcReply, JsonRpcRequest, JsonRpcResponse, RequestId, MCP_PROTOCOL_VERSION, SERVER_NAME,
};
use crate::mcp::resources;
use crate::tools::ToolRegistry;

/// Methods this server understands.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Method {
    /// `initialize`
    Initialize,
    /// `ping`
    Ping,
    /// `tools/list`
    ToolsList,
    /// `tools/call`
    ToolsCall,
    /// `resources/list`
    ResourcesList,
    /// `resources/read`
    ResourcesRead,
}

impl Method {
    /// Resolves a method name.
    #[must_use]
    pub fn from_name(name: &str) -> Option<Self> {
        match name {
            "initialize" => Some(Self::Initialize),
            "ping" => Some(Self::Ping),
            "tools/list" => Some(Self::ToolsList),
            "tools/call" => Some(Self::ToolsCall),
            "resources/list" => Some(Self::ResourcesList),
            "resources/read" => Some(Self::ResourcesRead),
            _ => None,
        }
    }

    /// The wire name of this method.
    #[must_use]
    pub const fn name(self) -> &'static str {
        match self {
            Self::Initialize => "initialize",
            Self::Ping => "ping",
            Self::ToolsList => "tools/list",
            Self::ToolsCall => "tools/call",
            Self::ResourcesList => "resources/list",
            Self::ResourcesRead => "resources/read",
        }
    }
}

/// Server capabilities advertised during initialisation.
#[derive(Debug, Clone, Default, Serialize)]
pub struct ServerCapabilities {
    /// Tool-related capabilities.
    pub tools: ListCapability,
    /// Resource-related capabilities.
    pub resources: ListCapability,
}

/// Capability flags for a listable feature.
#[derive(Debug, Clone, Default, Serialize)]
pub struct ListCapability {
    /// Whether the list can change during the session.
    #[serde(rename = "listChanged", skip_serializing_if = "is_false")]
    pub list_changed: bool,
}

#[allow(clippy::trivially_copy_pass_by_ref)] // serde's skip_serializing_if requires a predicate fn(&T) -> bool, so we must take &bool here
const fn is_false(b: &bool) -> bool {
    !*b
}

/// Server information for initialisation response.
#[derive(Debug, Clone, Serialize)]
pub struct ServerInfo {
    /// Server name.
    pub name: String,
    /// Server version.
    pub version: String,
}

impl Default for ServerInfo {
    fn default() -> Self {
        Self {
            name: SERVER_NAME.to_string(),
            version: env!("CARGO_PKG_VERSION").to_string(),
        }
    }
}

/// Parameters for tools/call request.
#[derive(Debug, Clone, Deserialize)]
struct ToolCallParams {
    #[serde(default)]
    name: Option<String>,
    #[serde(default)]
    arguments: Option<Value>,
}

/// Parameters for resources/read request.
#[derive(Debug, Clone, Deserialize)]
struct ResourceReadParams {
    #[serde(default)]
    uri: Option<String>,
}

/// Routes JSON-RPC requests to the tool registry and resources.
#[derive(Debug, Clone)]
pub struct Dispatcher {
    registry: Arc<ToolRegistry>,
}

impl Dispatcher {
    /// Creates a dispatcher over `registry`.
    #[must_use]
    pub const fn new(registry: Arc<ToolRegistry>) -> Self {
        Self { registry }
    }

    /// The registry this dispatcher invokes.
    #[must_use]
    pub fn registry(&self) -> &ToolRegistry {
        &self.registry
    }

    /// Handles raw request bytes.
    ///
    /// Returns `None` for notifications, which get no reply.
    #[must_use]
    pub fn handle_bytes(&self, bytes: &[u8]) -> Option<JsonRpcReply> {
        match parse_bytes(bytes) {
            Ok(msg) => self.dispatch(msg),
            Err(error) => Some(error.into()),
        }
    }

    /// Handles a single line of input.
    ///
    /// Returns `None` for notifications, which get no reply.
    #[must_use]
    pub fn handle_line(&self, line: &str) -> Option<JsonRpcReply> {
        match parse_message(line) {
            Ok(msg) => self.dispatch(msg),
            Err(error) => Some(error.into()),
        }
    }

    /// Handles a parsed incoming message.
    #[must_use]
    pub fn dispatch(&self, msg: IncomingMessage) -> Option<JsonRpcReply> {
        match msg {
            IncomingMessage::Request(req) => Some(self.handle_request(&req)),
            IncomingMessage::Notification(ref notif) => {
                Self::handle_notification(notif);
                None
            }
        }
    }

    /// Handles an incoming request.
    #[must_use]
    pub fn handle_request(&self, req: &JsonRpcRequest) -> JsonRpcReply {
        tracing::debug!(method = %req.method, id = %req.id, "Dispatching request");

        let Some(method) = Method::from_name(&req.method) else {
            return JsonRpcError::method_not_found(req.id.clone(), &req.method).into();
        };

        let result = match method {
            Method::Initialize => Ok(Self::handle_initialize(req)),
            Method::Ping => Ok(JsonRpcResponse::success(req.id.clone(), json!({}))),
            Method::ToolsList => Ok(self.handle_tools_list(req)),
            Method::ToolsCall => self.handle_tools_call(req),
            Method::ResourcesList => Ok(Self::handle_resources_list(req)),
            Method::ResourcesRead => Self::handle_resources_read(req),
        };

        if let Err(ref error) = result {
            tracing::debug!(
                method = method.name(),
                code = error.error.code,
                message = %error.error.message,
                "Request failed"
            );
        }

        result.into()
    }

    /// Handles an incoming notification.
    fn handle_notification(notif: &JsonRpcNotification) {
        tracing::debug!(method = %notif.method, "Notification received");
    }

    /// Handles the initialize request.
    fn handle_initialize(req: &JsonRpcRequest) -> JsonRpcResponse {
        if let Some(client) = req
            .params
            .as_ref()
            .and_then(|p| p.get("clientInfo"))
            .and_then(|c| c.get("name"))
            .and_then(Value::as_str)
        {
            tracing::info!(client, "Client initialised");
        }

        let result = json!({
            "protocolVersion": MCP_PROTOCOL_VERSION,
            "capabilities": ServerCapabilities::default(),
            "serverInfo": ServerInfo::default(),
        });

        JsonRpcResponse::success(req.id.clone(), result)
    }

    /// Handles the tools/list request.
    fn handle_tools_list(&self, req: &JsonRpcRequest) -> JsonRpcResponse {
        let result = json!({
            "tools": self.registry.list(),
        });

        JsonRpcResponse::success(req.id.clone(), result)
    }

    /// Handles the tools/call request.
    fn handle_tools_call(&self, req: &JsonRpcRequest) -> Result<JsonRpcResponse, JsonRpcError> {
        let params: ToolCallParams = parse_params(req)?;

        let name = params
            .name
            .filter(|n| !n.trim().is_empty())
            .ok_or_else(|| {
                JsonRpcError::invalid_params(req.id.clone(), "Missing tool name in parameters")
            })?;

        let arguments = match params.arguments {
            None | Some(Value::Null) => Map::new(),
            Some(Value::Object(map)) => map,
            Some(_) => {
                return Err(JsonRpcError::invalid_params(
                    req.id.clone(),
                    "Tool arguments must be an object",
                ))
            }
        };

        let result = self
            .registry
            .invoke(&name, &arguments)
            .map_err(|e| match e {
                ToolError::NotFound { name } => JsonRpcError::method_not_found(
                    req.id.clone(),
                    &format!("tool '{name}'"),
                ),
                ToolError::Execution { message } => JsonRpcError::internal_error(
                    req.id.clone(),
                    format!("Tool execution error: {message}"),
                ),
            })?;

        let result_value = serde_json::to_value(&result).map_err(|e| {
            tracing::error!(error = %e, "Failed to serialise tool call result");
            JsonRpcError::internal_error(
                req.id.clone(),
                "Internal error: failed to serialise result",
            )
        })?;

        Ok(JsonRpcResponse::success(req.id.clone(), result_value))
    }

    /// Handles the resources/list request.
    fn handle_resources_list(req: &JsonRpcRequest) -> JsonRpcResponse {
        JsonRpcResponse::success(
            req.id.clone(),
            json!({ "resources": resources::list_resources() }),
        )
    }

    /// Handles the resources/read request.
    fn handle_resources_read(req: &JsonRpcRequest) -> Result<JsonRpcResponse, JsonRpcError> {
        let params: ResourceReadParams = parse_params(req)?;
        let uri = params.uri.unwrap_or_default();

        let contents = resources::read_resource(&uri).ok_or_else(|| {
            JsonRpcError::invalid_params(req.id.clone(), format!("Unknown resource: {uri}"))
        })?;

        Ok(JsonRpcResponse::success(
            req.id.clone(),
            json!({ "contents": [contents] }),
        ))
    }
}

/// Deserialises request params, treating absent params as an empty object.
fn parse_params<T>(req: &JsonRpcRequest) -> Result<T, JsonRpcError>
where
    T: for<'de> Deserialize<'de>,
{
    let params = match &req.params {
        None | Some(Value::Null) => Value::Object(Map::new()),
        Some(p) => p.clone(),
    };
    serde_json::from_value(params).map_err(|_| {
        JsonRpcError::invalid_params(req.id.clone(), "Params must be an object")
    })
}

/// Convenience for callers that only hold an ID.
#[must_use]
pub fn timeout_reply(id: RequestId) -> JsonRpcReply {
    JsonRpcError::internal_error(id, "Request timed out").into()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mcp::protocol::ErrorCode;
    use crate::tools::builtin::builtin_registry;
    use crate::tools::paths::PathGuard;
    use crate::tools::ToolCallResult;

    fn dispatcher() -> Dispatcher {
        let mut registry = builtin_registry(PathGuard::default());
        registry.register("broken", "Always fails", json!({"type": "object"}), |_| {
            Err("handler exploded".to_string())
        });
        registry.register("counter", "Counts args", json!({"type": "object"}), |args| {
            Ok(ToolCallResult::text(args.len().to_string()))
        });
        Dispatcher::new(Arc::new(registry))
    }

    fn reply(line: &str) -> Value {
        let reply = dispatcher().handle_line(line).expect("expected a reply");
        serde_json::to_value(reply).unwrap()
    }

    #[test]
    fn method_table_round_trips() {
        for method in [
            Method::Initialize,
            Method::Ping,
            Method::ToolsList,
            Method::ToolsCall,
            Method::ResourcesList,
            Method::ResourcesRead,
        ] {
            assert_eq!(Method::from_name(method.name()), Some(method));
        }
        assert_eq!(Method::from_name("foo/bar"), None);
        assert_eq!(Method::from_name("Tools/List"), None);
    }

    #[test]
    fn initialize_returns_capabilities() {
        let value = reply(
            r#"{"jsonrpc":"2.0","id":1,"method":"initialize","params":{"protocolVersion":"2024-11-05","clientInfo":{"name":"t"}}}"#,
        );
        assert_eq!(value["id"], 1);
        assert_eq!(value["result"]["protocolVersion"], MCP_PROTOCOL_VERSION);
        assert_eq!(value["result"]["serverInfo"]["name"], SERVER_NAME);
        assert!(value["result"]["capabilities"]["tools"].is_object());
        assert!(value["result"]["capabilities"]["resources"].is_object());
    }

    #[test]
    fn initialize_without_params() {
        let value = reply(r#"{"jsonrpc":"2.0","id":2,"method":"initialize"}"#);
        assert!(value["result"].is_object());
    }

    #[test]
    fn ping_returns_empty_object() {
        let value = reply(r#"{"jsonrpc":"2.0","id":"p","method":"ping"}"#);
        assert_eq!(value["result"], json!({}));
    }

    #[test]
    fn tools_list_contains_registered_tools() {
        let value = reply(r#"{"jsonrpc":"2.0","id":1,"method":"tools/list"}"#);
        let tools = value["result"]["tools"].as_array().unwrap();
        let names: Vec<&str> = tools.iter().filter_map(|t| t["name"].as_str()).collect();
        assert!(names.contains(&"echo"));
        assert!(names.contains(&"calculate"));
        assert!(tools.iter().all(|t| t.get("handler").is_none()));
    }

    #[test]
    fn tools_call_echo() {
        let value = reply(
            r#"{"jsonrpc":"2.0","id":"1","method":"tools/call","params":{"name":"echo","arguments":{"message":"hi"}}}"#,
        );
        assert_eq!(value["jsonrpc"], "2.0");
        assert_eq!(value["id"], "1");
        assert_eq!(value["result"]["content"][0]["text"], "hi");
        assert!(value.get("error").is_none());
    }

    #[test]
    fn tools_call_defaults_arguments() {
        let value = reply(r#"{"jsonrpc":"2.0","id":1,"method":"tools/call","params":{"name":"counter"}}"#);
        assert_eq!(value["result"]["content"][0]["text"], "0");
    }

    #[test]
    fn tools_call_unknown_tool() {
        let value = reply(r#"{"jsonrpc":"2.0","id":5,"method":"tools/call","params":{"name":"nope"}}"#);
        assert_eq!(value["id"], 5);
        assert_eq!(value["error"]["code"], ErrorCode::MethodNotFound.code());
    }

    #[test]
    fn tools_call_missing_name() {
        for line in [
            r#"{"jsonrpc":"2.0","id":6,"method":"tools/call","params":{}}"#,
            r#"{"jsonrpc":"2.0","id":6,"method":"tools/call"}"#,
            r#"{"jsonrpc":"2.0","id":6,"method":"tools/call","params":{"name":"  "}}"#,
            r#"{"jsonrpc":"2.0","id":6,"method":"tools/call","params":[1,2]}"#,
        ] {
            let value = reply(line);
            assert_eq!(value["error"]["code"], ErrorCode::InvalidParams.code(), "{line}");
        }
    }

    #[test]
    fn tools_call_non_object_arguments() {
        let value = reply(
            r#"{"jsonrpc":"2.0","id":7,"method":"tools/call","params":{"name":"echo","arguments":"hi"}}"#,
        );
        assert_eq!(value["error"]["code"], ErrorCode::InvalidParams.code());
    }

    #[test]
    fn tools_call_handler_failure() {
        let value = reply(r#"{"jsonrpc":"2.0","id":8,"method":"tools/call","params":{"name":"broken"}}"#);
        assert_eq!(value["error"]["code"], ErrorCode::InternalError.code());
        assert!(value["error"]["message"]
            .as_str()
            .unwrap()
            .contains("handler exploded"));
    }

    #[test]
    fn tools_call_user_fault_is_result() {
        let value = reply(
            r#"{"jsonrpc":"2.0","id":9,"method":"tools/call","params":{"name":"calculate","arguments":{"expression":"2+a"}}}"#,
        );
        assert!(value.get("error").is_none());
        assert_eq!(value["result"]["isError"], true);
    }

    #[test]
    fn resources_list_and_read() {
        let listed = reply(r#"{"jsonrpc":"2.0","id":1,"method":"resources/list"}"#);
        let uri = listed["result"]["resources"][0]["uri"].as_str().unwrap().to_string();

        let read = reply(&format!(
            r#"{{"jsonrpc":"2.0","id":2,"method":"resources/read","params":{{"uri":"{uri}"}}}}"#
        ));
        assert_eq!(read["result"]["contents"][0]["uri"], uri);
        assert!(read["result"]["contents"][0]["text"].is_string());
    }

    #[test]
    fn resources_read_unknown_uri() {
        let value = reply(
            r#"{"jsonrpc":"2.0","id":3,"method":"resources/read","params":{"uri":"file:///etc"}}"#,
        );
        assert_eq!(value["error"]["code"], ErrorCode::InvalidParams.code());

        let missing = reply(r#"{"jsonrpc":"2.0","id":4,"method":"resources/read"}"#);
        assert_eq!(missing["error"]["code"], ErrorCode::InvalidParams.code());
    }

    #[test]
    fn unknown_method_echoes_id() {
        let value = reply(r#"{"jsonrpc":"2.0","id":"abc","method":"foo/bar"}"#);
        assert_eq!(value["id"], "abc");
        assert_eq!(value["error"]["code"], -32601);
    }

    #[test]
    fn malformed_json_has_null_id() {
        let value = reply(r#"{"jsonrpc":"2.0","id":1,"method":"#);
        assert_eq!(value["id"], Value::Null);
        assert_eq!(value["error"]["code"], -32700);
    }

    #[test]
    fn missing_id_is_answered_with_null() {
        let value = reply(r#"{"jsonrpc":"2.0","method":"tools/list"}"#);
        assert_eq!(value["id"], Value::Null);
        assert!(value["result"]["tools"].is_array());
    }

    #[test]
    fn notifications_get_no_reply() {
        let reply = dispatcher()
            .handle_line(r#"{"jsonrpc":"2.0","method":"notifications/initialized"}"#);
        assert!(reply.is_none());
    }

    #[test]
    fn handle_bytes_rejects_invalid_utf8() {
        let reply = dispatcher().handle_bytes(&[0xff, 0xfe]).unwrap();
        assert_eq!(reply.error_code(), Some(-32700));
        assert_eq!(reply.id(), &RequestId::Null);
    }

    #[test]
    fn timeout_reply_is_internal_error() {
        let reply = timeout_reply(RequestId::Number(4));
        assert_eq!(reply.error_code(), Some(ErrorCode::InternalError.code()));
        assert_eq!(reply.id(), &RequestId::Number(4));
    }
}
