//! OAuth credential storage and single-flight refresh.

mod coordinator;
mod refresher;


use std::fmt;

use thiserror::Error;

pub use coordinator::CredentialCoordinator;
pub use refresher::{OAuthRefresher, RefreshedTokens, TokenRefresher};

/// Credential failures. `Clone` because one refresh outcome is handed to
/// every caller waiting on it.
#[derive(Debug, Clone, Error)]
pub enum CredentialError {
    #[error("no credential stored")]
    Missing,

    #[error("credential has no refresh token")]
    NoRefreshToken,

    #[error("token refresh failed: {0}")]
    Refresh(String),

    #[error("storage error: {0}")]
    Storage(String),

    #[error("crypto error: {0}")]
    Crypto(String),

    #[error("refresh task ended abnormally: {0}")]
    Aborted(String),
}

impl CredentialError {
    /// True when the only remedy is the user signing in again.
    pub const fn needs_reauth(&self) -> bool {
        matches!(self, Self::Missing | Self::NoRefreshToken | Self::Refresh(_))
    }
}

impl From<crate::storage::DatabaseError> for CredentialError {
    fn from(e: crate::storage::DatabaseError) -> Self {
        Self::Storage(e.to_string())
    }
}

impl From<wearlink_crypto::CryptoError> for CredentialError {
    fn from(e: wearlink_crypto::CryptoError) -> Self {
        Self::Crypto(e.to_string())
    }
}

/// Tokens as issued by the provider at sign-in.
#[derive(Clone)]
pub struct OAuthTokens {
    pub access_token: String,
    pub refresh_token: Option<String>,
    pub scope: String,
    /// Unix seconds.
    pub expires_at: i64,
}

impl fmt::Debug for OAuthTokens {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("OAuthTokens")
            .field("scope", &self.scope)
            .field("expires_at", &self.expires_at)
            .finish_non_exhaustive()
    }
}

/// A decrypted access token that was fresh when handed out.
#[derive(Clone)]
pub struct AccessToken {
    token: String,
    expires_at: i64,
}

impl AccessToken {
    pub(crate) const fn new(token: String, expires_at: i64) -> Self {
        Self { token, expires_at }
    }

    pub fn secret(&self) -> &str {
        &self.token
    }

    pub const fn expires_at(&self) -> i64 {
        self.expires_at
    }
}

impl fmt::Debug for AccessToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AccessToken")
            .field("token", &"[redacted]")
            .field("expires_at", &self.expires_at)
            .finish()
    }
}
