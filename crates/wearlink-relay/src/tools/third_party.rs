//! HTTP proxy for registered third-party tool services.
//!
//! One fixed call shape: `POST {endpoint}/tools/call` with
//! `{"name": .., "arguments": ..}` and an optional bearer key.

use std::time::Duration;

use serde::Serialize;
use serde_json::{Map, Value};
use tracing::{debug, warn};

use super::result::ToolError;

#[derive(Debug, Serialize)]
struct CallBody<'a> {
    name: &'a str,
    arguments: &'a Map<String, Value>,
}

/// A call bound for one registered service.
#[derive(Debug)]
pub struct ServiceCall<'a> {
    pub service_id: &'a str,
    pub endpoint: &'a str,
    pub api_key: Option<&'a str>,
    pub name: &'a str,
    pub arguments: &'a Map<String, Value>,
}

const DEFAULT_MAX_BODY_BYTES: usize = 1024 * 1024;

#[derive(Debug, Clone)]
pub struct ThirdPartyClient {
    http: reqwest::Client,
    max_body_bytes: usize,
}

impl ThirdPartyClient {
    pub fn new(timeout: Duration) -> Result<Self, reqwest::Error> {
        // reqwest is built with rustls-no-provider; Err means already installed.
        let _ = rustls::crypto::ring::default_provider().install_default();
        let http = reqwest::Client::builder().timeout(timeout).build()?;
        Ok(Self {
            http,
            max_body_bytes: DEFAULT_MAX_BODY_BYTES,
        })
    }

    /// Reject response bodies larger than `bytes`.
    #[must_use]
    pub fn with_max_body(mut self, bytes: usize) -> Self {
        self.max_body_bytes = bytes.max(1);
        self
    }

    pub async fn call(&self, call: &ServiceCall<'_>) -> Result<String, ToolError> {
        let url = format!("{}/tools/call", call.endpoint.trim_end_matches('/'));
        let upstream = |detail: String| ToolError::Upstream {
            service: call.service_id.to_string(),
            detail,
        };

        let mut request = self.http.post(&url).json(&CallBody {
            name: call.name,
            arguments: call.arguments,
        });
        if let Some(key) = call.api_key {
            request = request.bearer_auth(key);
        }

        let mut resp = request.send().await.map_err(|e| {
            warn!(service = %call.service_id, error = %e, "Third-party call failed");
            if e.is_timeout() {
                upstream("timed out".to_string())
            } else {
                upstream("request failed".to_string())
            }
        })?;

        let status = resp.status();
        if !status.is_success() {
            return Err(upstream(format!("HTTP {}", status.as_u16())));
        }

        let too_large = || {
            warn!(
                service = %call.service_id,
                limit = self.max_body_bytes,
                "Response body too large"
            );
            upstream("response too large".to_string())
        };
        if resp
            .content_length()
            .is_some_and(|len| len > u64::try_from(self.max_body_bytes).unwrap_or(u64::MAX))
        {
            return Err(too_large());
        }

        let mut raw = Vec::new();
        while let Some(chunk) = resp.chunk().await.map_err(|e| {
            if e.is_timeout() {
                upstream("timed out".to_string())
            } else {
                upstream(format!("failed to read response: {e}"))
            }
        })? {
            if raw.len() + chunk.len() > self.max_body_bytes {
                return Err(too_large());
            }
            raw.extend_from_slice(&chunk);
        }
        let body = String::from_utf8_lossy(&raw).into_owned();
        debug!(service = %call.service_id, bytes = body.len(), "Third-party call completed");

        match parse_content(&body) {
            Some(Parsed { text, is_error: true }) => Err(upstream(text)),
            Some(Parsed { text, .. }) => Ok(text),
            None => Ok(body),
        }
    }
}

struct Parsed {
    text: String,
    is_error: bool,
}

/// Join `content[].text`; `None` when the body is not that shape.
fn parse_content(body: &str) -> Option<Parsed> {
    let value: Value = serde_json::from_str(body).ok()?;
    let items = value.get("content")?.as_array()?;
    let text = items
        .iter()
        .filter_map(|item| item.get("text").and_then(Value::as_str))
        .collect::<Vec<_>>()
        .join("\n");
    Some(Parsed {
        text,
        is_error: value.get("isError").and_then(Value::as_bool).unwrap_or(false),
    })
}
