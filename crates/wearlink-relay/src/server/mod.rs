//! HTTP front end: the device WebSocket and a health probe.

mod dispatcher;
mod health;
mod ws;

#[cfg(test)]
mod dispatcher_tests;

use axum::Router;
use axum::routing::get;

pub use dispatcher::Dispatcher;
pub use health::HealthStatus;
pub use ws::DEVICE_ID_HEADER;

use crate::registry::ConnectionRegistry;
use crate::storage::RelayDatabase;

/// Shared handles for every request.
#[derive(Clone)]
pub struct AppState {
    pub db: RelayDatabase,
    pub registry: ConnectionRegistry,
    pub dispatcher: Dispatcher,
}

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/ws", get(ws::ws_handler))
        .route("/health", get(health::health))
        .with_state(state)
}
