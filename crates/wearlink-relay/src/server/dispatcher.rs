//! Turns inbound device frames into correlated responses.
//!
//! `tool_execute` runs in its own task, so several calls on one connection
//! may finish in any order. Everything else is answered inline.

use std::sync::Arc;

use tokio::task::JoinHandle;
use tracing::{debug, error, instrument, warn};

use crate::link::{LinkError, LinkService};
use crate::protocol::{
    ClientMessage, PROGRESS_STATUS, ProtocolError, ServerMessage, UserSummary,
    parse_client_message,
};
use crate::registry::DeviceConnection;
use crate::storage::RelayDatabase;
use crate::tools::{ToolCall, ToolOrchestrator};

const GENERIC_ERROR: &str = "An unexpected error occurred";
const NOT_LINKED: &str = "Device is not linked to an account";
const DEVICE_MISMATCH: &str = "deviceId does not match this connection";

#[derive(Clone)]
pub struct Dispatcher {
    db: RelayDatabase,
    orchestrator: Arc<ToolOrchestrator>,
    links: LinkService,
}

impl Dispatcher {
    pub const fn new(
        db: RelayDatabase,
        orchestrator: Arc<ToolOrchestrator>,
        links: LinkService,
    ) -> Self {
        Self {
            db,
            orchestrator,
            links,
        }
    }

    /// Handle one text frame. Returns the task handle for a spawned tool
    /// call.
    #[instrument(skip_all, fields(device_id = %conn.device_id))]
    pub async fn handle_text(
        &self,
        conn: &Arc<DeviceConnection>,
        text: &str,
    ) -> Option<JoinHandle<()>> {
        let msg = match parse_client_message(text) {
            Ok(msg) => msg,
            Err(failure) => {
                debug!(error = %failure.error, "Rejected inbound frame");
                send(conn, &ServerMessage::error(failure.request_id, failure.error.to_string()))
                    .await;
                return None;
            }
        };

        let reply = match msg {
            ClientMessage::ToolExecute {
                request_id,
                server_id,
                tool_name,
                arguments,
            } => {
                let call = ToolCall {
                    server_id,
                    tool_name,
                    arguments,
                };
                return Some(self.spawn_tool_call(Arc::clone(conn), request_id, call));
            }
            ClientMessage::GetServers { request_id } => {
                self.get_servers(&conn.device_id, request_id).await
            }
            ClientMessage::LinkDevice {
                request_id,
                link_token,
                device_id,
                device_name,
            } => {
                if !claims_match(device_id.as_deref(), &conn.device_id) {
                    return reply_now(conn, request_id, DEVICE_MISMATCH).await;
                }
                self.link_device(&conn.device_id, request_id, &link_token, device_name.as_deref())
                    .await
            }
            ClientMessage::UnlinkDevice {
                request_id,
                device_id,
            } => {
                if !claims_match(device_id.as_deref(), &conn.device_id) {
                    return reply_now(conn, request_id, DEVICE_MISMATCH).await;
                }
                self.unlink_device(&conn.device_id, request_id).await
            }
            ClientMessage::GetUserAccount {
                request_id,
                device_id,
            } => {
                if !claims_match(device_id.as_deref(), &conn.device_id) {
                    return reply_now(conn, request_id, DEVICE_MISMATCH).await;
                }
                self.user_account(&conn.device_id, request_id).await
            }
        };

        send(conn, &reply).await;
        None
    }

    /// Send a protocol error that was detected outside JSON parsing, such
    /// as a binary frame.
    pub async fn reject(&self, conn: &DeviceConnection, error: &ProtocolError) {
        send(conn, &ServerMessage::error(None, error.to_string())).await;
    }

    fn spawn_tool_call(
        &self,
        conn: Arc<DeviceConnection>,
        request_id: String,
        call: ToolCall,
    ) -> JoinHandle<()> {
        let orchestrator = Arc::clone(&self.orchestrator);
        tokio::spawn(async move {
            let progress = ServerMessage::ToolProgress {
                request_id: request_id.clone(),
                status: PROGRESS_STATUS,
                tool_name: call.tool_name.clone(),
                message: ToolOrchestrator::progress_message(&call).to_string(),
            };
            send(&conn, &progress).await;

            let result = orchestrator.execute(&conn.device_id, &call).await;
            let delivered = send(
                &conn,
                &ServerMessage::ToolResult {
                    request_id: request_id.clone(),
                    result,
                },
            )
            .await;
            if !delivered {
                debug!(
                    request_id = %request_id,
                    connection_id = %conn.id,
                    "Connection closed before tool result, dropping"
                );
            }
        })
    }

    async fn link_device(
        &self,
        device_id: &str,
        request_id: String,
        link_token: &str,
        device_name: Option<&str>,
    ) -> ServerMessage {
        match self.links.consume_token(link_token, device_id, device_name).await {
            Ok(identity) => ServerMessage::LinkResult {
                request_id,
                user: identity.into(),
            },
            Err(LinkError::InvalidToken) => {
                ServerMessage::error(Some(request_id), LinkError::InvalidToken.to_string())
            }
            Err(e) => internal(request_id, &e),
        }
    }

    async fn unlink_device(&self, device_id: &str, request_id: String) -> ServerMessage {
        match self.links.unlink(device_id).await {
            Ok(success) => ServerMessage::UnlinkResult {
                request_id,
                success,
            },
            Err(e) => internal(request_id, &e),
        }
    }

    async fn user_account(&self, device_id: &str, request_id: String) -> ServerMessage {
        match self.db.get_device_owner(device_id).await {
            Ok(owner) => ServerMessage::UserAccount {
                request_id,
                user: owner.map(UserSummary::from),
            },
            Err(e) => internal(request_id, &e),
        }
    }

    async fn get_servers(&self, device_id: &str, request_id: String) -> ServerMessage {
        let owner = match self.db.get_device_owner(device_id).await {
            Ok(Some(owner)) => owner,
            Ok(None) => return ServerMessage::error(Some(request_id), NOT_LINKED),
            Err(e) => return internal(request_id, &e),
        };
        match self.orchestrator.list_servers(&owner.id).await {
            Ok(servers) => ServerMessage::ServersList {
                request_id,
                servers,
            },
            Err(e) => internal(request_id, &e),
        }
    }
}

async fn reply_now(
    conn: &DeviceConnection,
    request_id: String,
    error: &str,
) -> Option<JoinHandle<()>> {
    send(conn, &ServerMessage::error(Some(request_id), error)).await;
    None
}

fn claims_match(claimed: Option<&str>, actual: &str) -> bool {
    claimed.is_none_or(|c| c == actual)
}

fn internal(request_id: String, detail: &dyn std::fmt::Display) -> ServerMessage {
    error!(request_id = %request_id, detail = %detail, "Request failed");
    ServerMessage::error(Some(request_id), GENERIC_ERROR)
}

/// Queue `msg` on the connection. False when it is no longer open.
async fn send(conn: &DeviceConnection, msg: &ServerMessage) -> bool {
    match msg.to_frame() {
        Ok(frame) => conn.send_frame(frame).await,
        Err(e) => {
            warn!(error = %e, "Dropping unencodable frame");
            false
        }
    }
}
