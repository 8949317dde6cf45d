//! Data models for `WearLink` relay storage.

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct Identity {
    pub id: String,
    pub provider_id: String,
    pub email: String,
    pub display_name: String,
    pub created_at: i64,
}

#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct Device {
    pub id: String,
    pub owner_id: Option<String>,
    pub display_name: Option<String>,
    pub model: Option<String>,
    pub last_seen: i64,
    pub last_heartbeat: Option<i64>,
    pub linked_at: Option<i64>,
    pub created_at: i64,
}

/// Credential row as stored: token columns are ciphertext.
#[derive(Debug, Clone, sqlx::FromRow)]
pub struct StoredCredential {
    pub identity_id: String,
    pub access_token: String,
    pub refresh_token: Option<String>,
    pub scope: String,
    pub expires_at: i64,
    pub updated_at: i64,
}

#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct LinkToken {
    pub token_hash: String,
    pub identity_id: String,
    pub expires_at: i64,
    pub used_at: Option<i64>,
    pub device_id: Option<String>,
    pub created_at: i64,
}

impl LinkToken {
    /// Pending: never consumed and not yet expired at `now`.
    pub const fn is_pending(&self, now: i64) -> bool {
        self.used_at.is_none() && self.expires_at > now
    }
}

/// Registered third-party service. `api_key` is ciphertext when present.
#[derive(Debug, Clone, sqlx::FromRow)]
pub struct Service {
    pub id: String,
    pub owner_id: String,
    pub name: String,
    pub endpoint: String,
    pub api_key: Option<String>,
    pub created_at: i64,
}
