//! Tool registry.
//!
//! Tools are registered explicitly at startup and shared read-only behind an
//! `Arc` afterwards. Each tool pairs a JSON schema (advisory metadata shown to
//! clients) with a handler that turns an argument object into a
//! [`ToolCallResult`].
//!
//! Handlers report two kinds of failure:
//!
//! - User-facing problems (missing argument, file not found, bad expression)
//!   are returned as `Ok(ToolCallResult::error(..))` so the client always
//!   receives a textual explanation.
//! - Faults in the handler itself are returned as `Err(message)` and surface
//!   from [`ToolRegistry::invoke`] as [`ToolError::Execution`]. A handler
//!   that panics is caught there and reported the same way.

pub mod builtin;
pub mod calculator;
pub mod paths;

use std::any::Any;
use std::fmt;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::Arc;

use indexmap::IndexMap;
use serde::Serialize;
use serde_json::{json, Map, Value};

use crate::error::ToolError;

/// Argument object passed to a tool handler.
pub type Arguments = Map<String, Value>;

/// Shared tool handler.
pub type ToolHandler = Arc<dyn Fn(&Arguments) -> Result<ToolCallResult, String> + Send + Sync>;

/// A registered tool.
#[derive(Clone)]
pub struct Tool {
    /// Unique tool name.
    pub name: String,
    /// Human-readable description.
    pub description: String,
    /// JSON Schema for the tool's input parameters.
    pub input_schema: Value,
    handler: ToolHandler,
}

impl Tool {
    /// Returns the client-facing definition (without the handler).
    #[must_use]
    pub fn definition(&self) -> ToolDefinition {
        ToolDefinition {
            name: self.name.clone(),
            description: self.description.clone(),
            input_schema: self.input_schema.clone(),
        }
    }
}

impl fmt::Debug for Tool {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Tool")
            .field("name", &self.name)
            .field("description", &self.description)
            .field("input_schema", &self.input_schema)
            .finish_non_exhaustive()
    }
}

/// A tool definition for tools/list response.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ToolDefinition {
    /// Unique tool name.
    pub name: String,
    /// Human-readable description.
    pub description: String,
    /// JSON Schema for the tool's input parameters.
    pub input_schema: Value,
}

/// Content item in a tool call response.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum ToolContent {
    /// Text content.
    Text {
        /// The text content.
        text: String,
    },
}

/// Result of a tool call.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ToolCallResult {
    /// Content returned by the tool.
    pub content: Vec<ToolContent>,
    /// Whether the tool call resulted in an error.
    #[serde(skip_serializing_if = "is_false")]
    pub is_error: bool,
}

#[allow(clippy::trivially_copy_pass_by_ref)] // serde's skip_serializing_if requires a predicate fn(&T) -> bool, so we must take &bool here
const fn is_false(b: &bool) -> bool {
    !*b
}

impl ToolCallResult {
    /// Creates a successful text result.
    #[must_use]
    pub fn text(text: impl Into<String>) -> Self {
        Self {
            content: vec![ToolContent::Text { text: text.into() }],
            is_error: false,
        }
    }

    /// Creates an error text result.
    #[must_use]
    pub fn error(message: impl Into<String>) -> Self {
        Self {
            content: vec![ToolContent::Text {
                text: message.into(),
            }],
            is_error: true,
        }
    }

    /// Concatenated text of all content items.
    #[must_use]
    pub fn joined_text(&self) -> String {
        self.content
            .iter()
            .map(|ToolContent::Text { text }| text.as_str())
            .collect::<Vec<_>>()
            .join("\n")
    }
}

/// Insertion-ordered collection of tools.
///
/// Registering a name twice replaces the earlier tool in place.
#[derive(Debug, Default, Clone)]
pub struct ToolRegistry {
    tools: IndexMap<String, Tool>,
}

impl ToolRegistry {
    /// Creates an empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a tool, replacing any tool with the same name.
    ///
    /// A schema that is not a JSON object is replaced with an empty object
    /// schema.
    pub fn register<F>(
        &mut self,
        name: impl Into<String>,
        description: impl Into<String>,
        input_schema: Value,
        handler: F,
    ) where
        F: Fn(&Arguments) -> Result<ToolCallResult, String> + Send + Sync + 'static,
    {
        let name = name.into();
        let input_schema = if input_schema.is_object() {
            input_schema
        } else {
            tracing::warn!(tool = %name, "Tool schema is not an object, using empty object schema");
            json!({ "type": "object" })
        };

        let tool = Tool {
            name: name.clone(),
            description: description.into(),
            input_schema,
            handler: Arc::new(handler),
        };

        if self.tools.insert(name.clone(), tool).is_some() {
            tracing::warn!(tool = %name, "Tool re-registered, previous definition replaced");
        } else {
            tracing::debug!(tool = %name, "Tool registered");
        }
    }

    /// Looks up a tool by name.
    #[must_use]
    pub fn get(&self, name: &str) -> Option<&Tool> {
        self.tools.get(name)
    }

    /// Whether a tool with `name` is registered.
    #[must_use]
    pub fn contains(&self, name: &str) -> bool {
        self.tools.contains_key(name)
    }

    /// Number of registered tools.
    #[must_use]
    pub fn len(&self) -> usize {
        self.tools.len()
    }

    /// Whether no tools are registered.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.tools.is_empty()
    }

    /// Definitions of all tools in registration order.
    #[must_use]
    pub fn list(&self) -> Vec<ToolDefinition> {
        self.tools.values().map(Tool::definition).collect()
    }

    /// Runs the named tool with `arguments`.
    ///
    /// # Errors
    ///
    /// Returns [`ToolError::NotFound`] if no such tool is registered, or
    /// [`ToolError::Execution`] if its handler fails or panics.
    pub fn invoke(&self, name: &str, arguments: &Arguments) -> Result<ToolCallResult, ToolError> {
        let tool = self.get(name).ok_or_else(|| ToolError::NotFound {
            name: name.to_string(),
        })?;

        tracing::debug!(tool = %name, "Invoking tool");
        let outcome = catch_unwind(AssertUnwindSafe(|| (tool.handler)(arguments)))
            .unwrap_or_else(|payload| {
                let message = panic_message(&*payload);
                tracing::error!(tool = %name, panic = %message, "Tool handler panicked");
                Err(format!("handler panicked: {message}"))
            });

        outcome.map_err(|message| {
            tracing::warn!(tool = %name, error = %message, "Tool execution failed");
            ToolError::Execution { message }
        })
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    payload
        .downcast_ref::<&str>()
        .map(|s| (*s).to_string())
        .or_else(|| payload.downcast_ref::<String>().cloned())
        .unwrap_or_else(|| "unknown panic".to_string())
}

/// Reads a string argument, treating blank strings as absent.
pub(crate) fn string_arg<'a>(arguments: &'a Arguments, name: &str) -> Option<&'a str> {
    arguments
        .get(name)
        .and_then(Value::as_str)
        .filter(|s| !s.trim().is_empty())
}
