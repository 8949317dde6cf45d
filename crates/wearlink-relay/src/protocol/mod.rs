//! JSON frames exchanged with devices over the WebSocket.
//!
//! One JSON object per text frame, discriminated by `type`. Field names are
//! camelCase on the wire.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use thiserror::Error;

use crate::storage::Identity;
use crate::tools::{ServerInfo, ToolResult};

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ClientMessage {
    #[serde(rename_all = "camelCase")]
    ToolExecute {
        request_id: String,
        #[serde(default)]
        server_id: Option<String>,
        tool_name: String,
        #[serde(default)]
        arguments: Map<String, Value>,
    },
    #[serde(rename_all = "camelCase")]
    GetServers { request_id: String },
    #[serde(rename_all = "camelCase")]
    LinkDevice {
        request_id: String,
        link_token: String,
        #[serde(default)]
        device_id: Option<String>,
        #[serde(default)]
        device_name: Option<String>,
    },
    #[serde(rename_all = "camelCase")]
    UnlinkDevice {
        request_id: String,
        #[serde(default)]
        device_id: Option<String>,
    },
    #[serde(rename_all = "camelCase")]
    GetUserAccount {
        request_id: String,
        #[serde(default)]
        device_id: Option<String>,
    },
}

/// Account summary sent to devices.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserSummary {
    pub id: String,
    pub email: String,
    pub name: String,
}

impl From<Identity> for UserSummary {
    fn from(identity: Identity) -> Self {
        Self {
            id: identity.id,
            email: identity.email,
            name: identity.display_name,
        }
    }
}

pub const PROGRESS_STATUS: &str = "executing";

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ServerMessage {
    #[serde(rename_all = "camelCase")]
    ToolProgress {
        request_id: String,
        status: &'static str,
        tool_name: String,
        message: String,
    },
    #[serde(rename_all = "camelCase")]
    ToolResult {
        request_id: String,
        result: ToolResult,
    },
    #[serde(rename_all = "camelCase")]
    ServersList {
        request_id: String,
        servers: Vec<ServerInfo>,
    },
    #[serde(rename_all = "camelCase")]
    LinkResult {
        request_id: String,
        user: UserSummary,
    },
    #[serde(rename_all = "camelCase")]
    UnlinkResult { request_id: String, success: bool },
    #[serde(rename_all = "camelCase")]
    UserAccount {
        request_id: String,
        user: Option<UserSummary>,
    },
    #[serde(rename_all = "camelCase")]
    Error {
        #[serde(skip_serializing_if = "Option::is_none")]
        request_id: Option<String>,
        error: String,
    },
}

impl ServerMessage {
    pub fn error(request_id: Option<String>, error: impl Into<String>) -> Self {
        Self::Error {
            request_id,
            error: error.into(),
        }
    }

    /// Serialize to a text frame.
    pub fn to_frame(&self) -> Result<String, ProtocolError> {
        serde_json::to_string(self).map_err(|e| ProtocolError::Encode(e.to_string()))
    }
}

/// Problems with an inbound frame, reported back as an `error` frame.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ProtocolError {
    #[error("Malformed JSON: {0}")]
    MalformedJson(String),

    #[error("Frame must be a JSON object with a string \"type\"")]
    MissingType,

    #[error("Unknown message type: {0}")]
    UnknownType(String),

    #[error("Invalid {kind} message: {detail}")]
    InvalidMessage { kind: String, detail: String },

    #[error("Binary frames are not supported")]
    Binary,

    #[error("failed to encode frame: {0}")]
    Encode(String),
}

const KNOWN_TYPES: [&str; 5] = [
    "tool_execute",
    "get_servers",
    "link_device",
    "unlink_device",
    "get_user_account",
];

/// A parse outcome that keeps the request id when it could be read.
#[derive(Debug)]
pub struct ParseFailure {
    pub request_id: Option<String>,
    pub error: ProtocolError,
}

/// Decode one inbound text frame.
pub fn parse_client_message(text: &str) -> Result<ClientMessage, ParseFailure> {
    let value: Value = serde_json::from_str(text).map_err(|e| ParseFailure {
        request_id: None,
        error: ProtocolError::MalformedJson(e.to_string()),
    })?;

    let request_id = value
        .get("requestId")
        .and_then(Value::as_str)
        .map(str::to_string);
    let fail = |error| ParseFailure {
        request_id: request_id.clone(),
        error,
    };

    let kind = value
        .get("type")
        .and_then(Value::as_str)
        .ok_or_else(|| fail(ProtocolError::MissingType))?
        .to_string();
    if !KNOWN_TYPES.contains(&kind.as_str()) {
        return Err(fail(ProtocolError::UnknownType(kind)));
    }

    serde_json::from_value(value).map_err(|e| {
        fail(ProtocolError::InvalidMessage {
            kind,
            detail: e.to_string(),
        })
    })
}
