//! `GET /health` for load balancers and monitoring.

use axum::Json;
use axum::extract::State;
use serde::Serialize;

use super::AppState;

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct HealthStatus {
    pub status: &'static str,
    pub connections: usize,
    pub online_devices: usize,
}

pub async fn health(State(state): State<AppState>) -> Json<HealthStatus> {
    // Reaching this handler means the relay is accepting connections.
    Json(HealthStatus {
        status: "serving",
        connections: state.registry.count_connections().await,
        online_devices: state.registry.count_online_devices().await,
    })
}
