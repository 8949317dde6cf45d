//! Link token lifecycle.
//!
//! Pending -> Consumed, or Pending -> Expired -> Purged. Only the SHA-256 of
//! a token is stored, and consumption is a single conditional update so a
//! token can bind at most one device.

use std::fmt;
use std::time::Duration;

use thiserror::Error;
use tracing::{info, instrument, warn};
use wearlink_core::db::{unix_timestamp, unix_timestamp_after};
use wearlink_crypto::{generate_link_secret, hash_token};

use crate::storage::{DatabaseError, Identity, RelayDatabase};

#[derive(Debug, Error)]
pub enum LinkError {
    #[error("Invalid or expired link token")]
    InvalidToken,

    #[error("storage error: {0}")]
    Storage(#[from] DatabaseError),
}

/// A token handed to the account owner once. The plaintext is not retained.
pub struct GeneratedLink {
    pub token: String,
    pub expires_at: i64,
    pub pairing_uri: String,
}

impl fmt::Debug for GeneratedLink {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("GeneratedLink")
            .field("expires_at", &self.expires_at)
            .finish_non_exhaustive()
    }
}

#[derive(Clone)]
pub struct LinkService {
    db: RelayDatabase,
    ttl: Duration,
    pairing_uri_base: String,
}

impl LinkService {
    pub fn new(db: RelayDatabase, ttl: Duration, pairing_uri_base: impl Into<String>) -> Self {
        Self {
            db,
            ttl,
            pairing_uri_base: pairing_uri_base.into(),
        }
    }

    #[instrument(skip(self))]
    pub async fn generate_token(&self, identity_id: &str) -> Result<GeneratedLink, LinkError> {
        let secret = generate_link_secret();
        let now = unix_timestamp();
        let expires_at = unix_timestamp_after(self.ttl);

        self.db
            .create_link_token(secret.hash(), identity_id, expires_at, now)
            .await?;
        info!(expires_at, "Issued link token");

        Ok(GeneratedLink {
            token: secret.plain().to_string(),
            expires_at,
            pairing_uri: format!("{}?token={}", self.pairing_uri_base, secret.plain()),
        })
    }

    /// Owning identity id, or `None` when unknown, consumed or expired.
    pub async fn validate_token(&self, plain_token: &str) -> Result<Option<String>, LinkError> {
        let row = self.db.get_link_token(&hash_token(plain_token)).await?;
        Ok(row
            .filter(|t| t.is_pending(unix_timestamp()))
            .map(|t| t.identity_id))
    }

    /// Bind `device_id` to the token's identity. A second attempt on the same
    /// token fails with [`LinkError::InvalidToken`].
    #[instrument(skip(self, plain_token))]
    pub async fn consume_token(
        &self,
        plain_token: &str,
        device_id: &str,
        display_name: Option<&str>,
    ) -> Result<Identity, LinkError> {
        let hash = hash_token(plain_token);
        self.db.get_or_create_device(device_id, None).await?;
        let Some(identity_id) = self
            .db
            .redeem_link_token(&hash, device_id, display_name, unix_timestamp())
            .await?
        else {
            warn!("Link token unknown, expired or already used");
            return Err(LinkError::InvalidToken);
        };

        let identity = self.db.get_identity(&identity_id).await?;
        info!(identity_id = %identity.id, "Device linked");
        Ok(identity)
    }

    /// Clear the device owner. Returns whether it was linked.
    #[instrument(skip(self))]
    pub async fn unlink(&self, device_id: &str) -> Result<bool, LinkError> {
        let was_linked = self.db.clear_device_owner(device_id).await?;
        if was_linked {
            info!("Device unlinked");
        }
        Ok(was_linked)
    }

    /// Delete expired, never-consumed tokens. Returns the number removed.
    pub async fn sweep_expired(&self) -> Result<u64, LinkError> {
        Ok(self.db.delete_expired_link_tokens(unix_timestamp()).await?)
    }
}
