//! Shared HTTP client for the Google REST APIs.

use std::time::Duration;

use reqwest::StatusCode;
use serde::de::DeserializeOwned;

use crate::tools::provider::ProviderError;

/// API roots. Overridable so tests can point at a local mock server.
#[derive(Debug, Clone)]
pub struct GoogleEndpoints {
    pub gmail: String,
    pub calendar: String,
}

impl Default for GoogleEndpoints {
    fn default() -> Self {
        Self {
            gmail: "https://gmail.googleapis.com".to_string(),
            calendar: "https://www.googleapis.com".to_string(),
        }
    }
}

#[derive(Debug, Clone)]
pub struct GoogleClient {
    http: reqwest::Client,
    endpoints: GoogleEndpoints,
}

impl GoogleClient {
    /// `timeout` bounds each request end to end.
    pub fn new(endpoints: GoogleEndpoints, timeout: Duration) -> Result<Self, ProviderError> {
        // reqwest is built with rustls-no-provider; Err means already installed.
        let _ = rustls::crypto::ring::default_provider().install_default();
        let http = reqwest::Client::builder().timeout(timeout).build()?;
        Ok(Self::with_http(http, endpoints))
    }

    pub fn with_http(http: reqwest::Client, endpoints: GoogleEndpoints) -> Self {
        let endpoints = GoogleEndpoints {
            gmail: endpoints.gmail.trim_end_matches('/').to_string(),
            calendar: endpoints.calendar.trim_end_matches('/').to_string(),
        };
        Self { http, endpoints }
    }

    pub(crate) fn gmail_url(&self, path: &str) -> String {
        format!("{}/gmail/v1/users/me{path}", self.endpoints.gmail)
    }

    pub(crate) fn calendar_url(&self, path: &str) -> String {
        format!("{}/calendar/v3{path}", self.endpoints.calendar)
    }

    pub(crate) async fn get_json<T: DeserializeOwned>(
        &self,
        url: &str,
        query: &[(&str, String)],
        access_token: &str,
    ) -> Result<T, ProviderError> {
        let resp = self
            .http
            .get(url)
            .bearer_auth(access_token)
            .query(query)
            .send()
            .await?;
        Self::check_status(&resp)?;
        Ok(resp.json().await?)
    }

    fn check_status(resp: &reqwest::Response) -> Result<(), ProviderError> {
        let status = resp.status();
        if status == StatusCode::UNAUTHORIZED {
            return Err(ProviderError::Unauthorized);
        }
        if !status.is_success() {
            return Err(ProviderError::Api {
                status: status.as_u16(),
                message: status.canonical_reason().unwrap_or("Unknown").into(),
            });
        }
        Ok(())
    }
}
