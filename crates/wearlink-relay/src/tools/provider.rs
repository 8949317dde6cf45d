//! Built-in provider adapter boundary.

use async_trait::async_trait;
use serde_json::{Map, Value};
use thiserror::Error;

/// Errors from a built-in provider call.
#[derive(Debug, Error)]
pub enum ProviderError {
    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("API error ({status}): {message}")]
    Api { status: u16, message: String },

    /// The provider rejected the access token.
    #[error("access token rejected")]
    Unauthorized,

    #[error("unsupported action: {0}")]
    UnsupportedAction(String),

    #[error("missing argument: {0}")]
    MissingArgument(&'static str),

    #[error("invalid argument: {0}")]
    InvalidArgument(&'static str),
}

/// An owned integration reached with the identity's OAuth access token.
///
/// `args` have already been validated and coerced against the tool schema.
#[async_trait]
pub trait BuiltinProvider: Send + Sync {
    async fn invoke(
        &self,
        action: &str,
        args: &Map<String, Value>,
        access_token: &str,
    ) -> Result<String, ProviderError>;
}

pub(crate) fn int_arg(args: &Map<String, Value>, name: &str, default: i64) -> i64 {
    args.get(name).and_then(Value::as_i64).unwrap_or(default)
}

pub(crate) fn str_arg<'a>(
    args: &'a Map<String, Value>,
    name: &'static str,
) -> Result<&'a str, ProviderError> {
    args.get(name)
        .and_then(Value::as_str)
        .ok_or(ProviderError::MissingArgument(name))
}
