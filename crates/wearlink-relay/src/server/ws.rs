//! WebSocket endpoint for devices.
//!
//! One reader loop per socket feeds the dispatcher; a writer task drains the
//! connection's outbound queue so frames are never interleaved.

use std::sync::Arc;

use axum::body::Bytes;
use axum::extract::ws::{CloseFrame, Message, WebSocket, WebSocketUpgrade};
use axum::extract::{Query, State};
use axum::http::{HeaderMap, StatusCode};
use axum::response::{IntoResponse, Response};
use futures::stream::{SplitSink, StreamExt};
use futures::SinkExt;
use serde::Deserialize;
use tokio::sync::mpsc;
use tracing::{debug, error, info, warn};

use super::AppState;
use crate::protocol::ProtocolError;
use crate::registry::{DeviceConnection, Outbound, Registration};

pub const DEVICE_ID_HEADER: &str = "x-device-id";
const MAX_DEVICE_ID_LEN: usize = 128;

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConnectParams {
    #[serde(default)]
    device_id: Option<String>,
    #[serde(default)]
    model: Option<String>,
}

fn device_id_from(params: &ConnectParams, headers: &HeaderMap) -> Option<String> {
    params
        .device_id
        .clone()
        .or_else(|| {
            headers
                .get(DEVICE_ID_HEADER)
                .and_then(|v| v.to_str().ok())
                .map(str::to_string)
        })
        .map(|id| id.trim().to_string())
        .filter(|id| !id.is_empty() && id.len() <= MAX_DEVICE_ID_LEN)
}

/// `GET /ws?deviceId=...`
pub async fn ws_handler(
    ws: WebSocketUpgrade,
    State(state): State<AppState>,
    Query(params): Query<ConnectParams>,
    headers: HeaderMap,
) -> Response {
    let Some(device_id) = device_id_from(&params, &headers) else {
        return (StatusCode::BAD_REQUEST, "missing or invalid deviceId").into_response();
    };

    // The device record must exist before the socket is registered.
    if let Err(e) = state
        .db
        .get_or_create_device(&device_id, params.model.as_deref())
        .await
    {
        error!(device_id = %device_id, error = %e, "Failed to load device record");
        return StatusCode::INTERNAL_SERVER_ERROR.into_response();
    }

    ws.on_upgrade(move |socket| handle_socket(socket, state, device_id))
}

async fn handle_socket(socket: WebSocket, state: AppState, device_id: String) {
    let Registration {
        connection,
        outbound,
    } = state.registry.register(&device_id).await;
    let (sink, mut stream) = socket.split();
    let mut terminated = connection.termination();
    let mut writer = tokio::spawn(write_loop(sink, outbound));

    loop {
        tokio::select! {
            frame = stream.next() => match frame {
                Some(Ok(Message::Text(text))) => {
                    // Tool calls run detached; nothing to await here.
                    let _ = state.dispatcher.handle_text(&connection, text.as_str()).await;
                }
                Some(Ok(Message::Binary(_))) => {
                    state.dispatcher.reject(&connection, &ProtocolError::Binary).await;
                }
                Some(Ok(Message::Pong(_))) => on_pong(&state, &connection).await,
                Some(Ok(Message::Ping(_))) => {}
                Some(Ok(Message::Close(_))) | None => {
                    debug!(connection_id = %connection.id, "Peer closed socket");
                    break;
                }
                Some(Err(e)) => {
                    debug!(connection_id = %connection.id, error = %e, "Socket read failed");
                    break;
                }
            },
            _ = terminated.changed() => {
                info!(connection_id = %connection.id, "Terminating zombie socket");
                break;
            }
            _ = &mut writer => {
                debug!(connection_id = %connection.id, "Writer finished");
                break;
            }
        }
    }

    state.registry.unregister(&connection).await;
    writer.abort();
}

async fn on_pong(state: &AppState, connection: &Arc<DeviceConnection>) {
    connection.mark_alive();
    if let Err(e) = state.db.touch_device_heartbeat(&connection.device_id).await {
        warn!(device_id = %connection.device_id, error = %e, "Failed to record heartbeat");
    }
}

async fn write_loop(
    mut sink: SplitSink<WebSocket, Message>,
    mut outbound: mpsc::Receiver<Outbound>,
) {
    while let Some(item) = outbound.recv().await {
        let (message, last) = match item {
            Outbound::Frame(text) => (Message::Text(text.into()), false),
            Outbound::Ping => (Message::Ping(Bytes::new()), false),
            Outbound::Close { code, reason } => (
                Message::Close(Some(CloseFrame {
                    code,
                    reason: reason.into(),
                })),
                true,
            ),
        };
        if let Err(e) = sink.send(message).await {
            debug!(error = %e, "Socket write failed");
            return;
        }
        if last {
            return;
        }
    }
}
