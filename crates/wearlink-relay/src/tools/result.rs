//! Tool call inputs, outputs and the failure taxonomy.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use thiserror::Error;
use tracing::error;

/// A tool invocation as received from a device.
#[derive(Debug, Clone)]
pub struct ToolCall {
    /// Provider hint supplied by the client (`serverId`).
    pub server_id: Option<String>,
    /// Provider-qualified tool name, e.g. `gmail.get_unread`.
    pub tool_name: String,
    pub arguments: Map<String, Value>,
}

impl ToolCall {
    pub fn new(tool_name: impl Into<String>, arguments: Map<String, Value>) -> Self {
        Self {
            server_id: None,
            tool_name: tool_name.into(),
            arguments,
        }
    }

    #[must_use]
    pub fn with_server(mut self, server_id: impl Into<String>) -> Self {
        self.server_id = Some(server_id.into());
        self
    }

    /// Provider prefix and action name.
    ///
    /// `gmail.get_unread` splits into `("gmail", "get_unread")`. A name with
    /// no dot is an action on the `serverId` provider.
    pub fn route(&self) -> (&str, &str) {
        match self.tool_name.split_once('.') {
            Some((provider, action)) => (provider, action),
            None => (
                self.server_id.as_deref().unwrap_or_default(),
                self.tool_name.as_str(),
            ),
        }
    }
}

/// Outcome returned to the device for every tool call.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ToolResult {
    pub success: bool,
    pub is_error: bool,
    pub content: String,
}

impl ToolResult {
    pub fn ok(content: impl Into<String>) -> Self {
        Self {
            success: true,
            is_error: false,
            content: content.into(),
        }
    }

    pub fn failure(content: impl Into<String>) -> Self {
        Self {
            success: false,
            is_error: true,
            content: content.into(),
        }
    }
}

/// A single argument that failed validation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FieldError {
    pub field: String,
    pub message: String,
}

impl FieldError {
    pub fn new(field: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            field: field.into(),
            message: message.into(),
        }
    }
}

/// Everything that can go wrong inside tool execution.
///
/// Never crosses the orchestrator boundary: it is always folded into a
/// [`ToolResult`] by [`ToolError::into_result`].
#[derive(Debug, Error)]
pub enum ToolError {
    #[error("This device is not linked to an account. Link it from the companion app first.")]
    NotLinked,

    #[error("Invalid arguments: {}", describe_fields(.0))]
    InvalidArguments(Vec<FieldError>),

    #[error("Your account needs to be re-authenticated. Please sign in again.")]
    ReauthRequired,

    #[error("Unknown tool: {0}")]
    UnknownTool(String),

    #[error("Access denied to service {0}")]
    AccessDenied(String),

    #[error("Upstream error from {service}: {detail}")]
    Upstream { service: String, detail: String },

    #[error("internal error: {0}")]
    Internal(String),
}

const GENERIC_ERROR: &str = "An unexpected error occurred";

fn describe_fields(fields: &[FieldError]) -> String {
    fields
        .iter()
        .map(|f| format!("{} {}", f.field, f.message))
        .collect::<Vec<_>>()
        .join("; ")
}

impl ToolError {
    /// Convert to the structured result sent to the caller. Internal details
    /// are logged here and replaced by a generic message.
    pub fn into_result(self) -> ToolResult {
        match self {
            Self::Internal(detail) => {
                error!(detail = %detail, "Tool execution failed internally");
                ToolResult::failure(GENERIC_ERROR)
            }
            other => ToolResult::failure(other.to_string()),
        }
    }
}

impl From<crate::storage::DatabaseError> for ToolError {
    fn from(e: crate::storage::DatabaseError) -> Self {
        Self::Internal(e.to_string())
    }
}
