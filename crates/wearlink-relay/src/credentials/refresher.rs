//! Upstream `refresh_token` grant.

use std::fmt;
use std::time::Duration;

use async_trait::async_trait;
use serde::Deserialize;
use wearlink_core::config::CredentialConfig;

use super::CredentialError;

/// Result of one successful refresh grant.
#[derive(Clone)]
pub struct RefreshedTokens {
    pub access_token: String,
    /// Lifetime in seconds from now.
    pub expires_in: i64,
    /// Present only when the provider rotated the refresh token.
    pub refresh_token: Option<String>,
}

impl fmt::Debug for RefreshedTokens {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RefreshedTokens")
            .field("expires_in", &self.expires_in)
            .field("rotated", &self.refresh_token.is_some())
            .finish_non_exhaustive()
    }
}

#[async_trait]
pub trait TokenRefresher: Send + Sync {
    async fn refresh(&self, refresh_token: &str) -> Result<RefreshedTokens, CredentialError>;
}

#[derive(Deserialize)]
struct TokenResponse {
    access_token: String,
    #[serde(default = "default_expires_in")]
    expires_in: i64,
    #[serde(default)]
    refresh_token: Option<String>,
}

const fn default_expires_in() -> i64 {
    3600
}

#[derive(Deserialize)]
struct TokenErrorResponse {
    error: String,
}

/// Form-encoded `grant_type=refresh_token` against a standard token endpoint.
///
/// Requests are bounded by `refresh_timeout_secs` so a hung endpoint settles
/// the in-flight refresh with an error.
pub struct OAuthRefresher {
    http: reqwest::Client,
    token_endpoint: String,
    client_id: String,
    client_secret: String,
}

impl OAuthRefresher {
    pub fn new(config: &CredentialConfig) -> Result<Self, reqwest::Error> {
        // reqwest is built with rustls-no-provider; Err means already installed.
        let _ = rustls::crypto::ring::default_provider().install_default();
        Ok(Self {
            http: reqwest::Client::builder()
                .timeout(Duration::from_secs(config.refresh_timeout_secs.max(1)))
                .build()?,
            token_endpoint: config.token_endpoint.clone(),
            client_id: config.client_id.clone(),
            client_secret: config.client_secret.clone(),
        })
    }
}

#[async_trait]
impl TokenRefresher for OAuthRefresher {
    async fn refresh(&self, refresh_token: &str) -> Result<RefreshedTokens, CredentialError> {
        let resp = self
            .http
            .post(&self.token_endpoint)
            .form(&[
                ("grant_type", "refresh_token"),
                ("refresh_token", refresh_token),
                ("client_id", self.client_id.as_str()),
                ("client_secret", self.client_secret.as_str()),
            ])
            .send()
            .await
            .map_err(|e| CredentialError::Refresh(e.to_string()))?;

        let status = resp.status();
        if !status.is_success() {
            let reason = resp
                .json::<TokenErrorResponse>()
                .await
                .map_or_else(|_| "unknown".to_string(), |body| body.error);
            return Err(CredentialError::Refresh(format!(
                "HTTP {}: {reason}",
                status.as_u16()
            )));
        }

        let body: TokenResponse = resp
            .json()
            .await
            .map_err(|e| CredentialError::Refresh(format!("malformed token response: {e}")))?;
        Ok(RefreshedTokens {
            access_token: body.access_token,
            expires_in: body.expires_in,
            refresh_token: body.refresh_token,
        })
    }
}
