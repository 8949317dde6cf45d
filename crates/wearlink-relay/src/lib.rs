//! `WearLink` Relay Server Library
//!
//! Core functionality for the `WearLink` relay:
//! - WebSocket gateway and JSON protocol for wearable devices
//! - Connection registry with per-device limits and heartbeats
//! - Tool orchestration over built-in Google providers and third-party services
//! - Encrypted OAuth credentials with single-flight refresh
//! - Device pairing through one-time link tokens
//! - SQLite storage

pub mod credentials;
pub mod link;
pub mod protocol;
pub mod registry;
pub mod server;
pub mod storage;
pub mod tools;
