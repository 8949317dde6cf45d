//! Configuration resolution for `WearLink`.
//!
//! Implements hierarchical config resolution:
//! 1. Built-in defaults
//! 2. Global config (~/.config/wearlink/relay.json)
//! 3. Explicit config file (`--config`)
//! 4. Environment variables
//! 5. CLI arguments (applied by the binary, highest priority)

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use crate::error::{Error, Result};

/// Complete relay configuration.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct Config {
    pub server: ServerConfig,
    pub connections: ConnectionConfig,
    pub tools: ToolConfig,
    pub credentials: CredentialConfig,
    pub linking: LinkConfig,
}

/// Listener and storage settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    pub addr: String,
    pub database_path: Option<PathBuf>,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            addr: "0.0.0.0:8080".to_string(),
            database_path: None,
        }
    }
}

/// Per-device connection limits and heartbeat cadence.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ConnectionConfig {
    pub max_per_device: usize,
    pub heartbeat_interval_secs: u64,
}

impl Default for ConnectionConfig {
    fn default() -> Self {
        Self {
            max_per_device: 5,
            heartbeat_interval_secs: 30,
        }
    }
}

/// Tool execution tuning.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ToolConfig {
    pub cache_ttl_secs: u64,
    pub cache_capacity: usize,
    pub max_result_bytes: usize,
    pub third_party_timeout_secs: u64,
    pub builtin_timeout_secs: u64,
}

impl Default for ToolConfig {
    fn default() -> Self {
        Self {
            cache_ttl_secs: 300,
            cache_capacity: 1000,
            max_result_bytes: 10 * 1024, // 10 KiB
            third_party_timeout_secs: 30,
            builtin_timeout_secs: 30,
        }
    }
}

/// OAuth client settings for the built-in provider.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CredentialConfig {
    pub refresh_buffer_secs: u64,
    /// Upper bound on one refresh grant request.
    pub refresh_timeout_secs: u64,
    pub token_endpoint: String,
    pub client_id: String,
    pub client_secret: String,
}

impl Default for CredentialConfig {
    fn default() -> Self {
        Self {
            refresh_buffer_secs: 300,
            refresh_timeout_secs: 15,
            token_endpoint: "https://oauth2.googleapis.com/token".to_string(),
            client_id: String::new(),
            client_secret: String::new(),
        }
    }
}

/// Device pairing settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LinkConfig {
    pub token_ttl_secs: u64,
    pub sweep_interval_secs: u64,
    pub pairing_uri_base: String,
}

impl Default for LinkConfig {
    fn default() -> Self {
        Self {
            token_ttl_secs: 300,
            sweep_interval_secs: 60,
            pairing_uri_base: "wearlink://link".to_string(),
        }
    }
}

/// Load configuration with hierarchical resolution.
///
/// A missing global file is skipped; a missing explicit file is an error.
/// An explicit file replaces the global one rather than merging with it.
pub fn load_config(explicit: Option<&Path>) -> Result<Config> {
    let mut config = match global_config_path() {
        Some(global_path) if global_path.exists() => load_config_file(&global_path)?,
        _ => Config::default(),
    };

    if let Some(path) = explicit {
        if !path.exists() {
            return Err(Error::Config(format!(
                "Config file {} does not exist",
                path.display()
            )));
        }
        config = load_config_file(path)?;
    }

    apply_env_overrides(&mut config, |key| std::env::var(key).ok());

    Ok(config)
}

/// Get the global config file path.
pub fn global_config_path() -> Option<PathBuf> {
    dirs::config_dir().map(|p| p.join("wearlink").join("relay.json"))
}

/// Default location of the relay database.
pub fn default_database_path() -> Option<PathBuf> {
    dirs::data_dir().map(|p| p.join("wearlink").join("relay.db"))
}

/// Parse a config file. Sections and fields omitted from the file keep their
/// defaults.
pub fn load_config_file(path: &Path) -> Result<Config> {
    let content = std::fs::read_to_string(path).map_err(|e| {
        Error::Config(format!("Failed to read config file {}: {}", path.display(), e))
    })?;
    serde_json::from_str(&content).map_err(|e| {
        Error::Config(format!("Failed to parse config file {}: {}", path.display(), e))
    })
}

fn apply_env_overrides(config: &mut Config, var: impl Fn(&str) -> Option<String>) {
    if let Some(val) = var("WEARLINK_ADDR") {
        config.server.addr = val;
    }
    if let Some(val) = var("WEARLINK_DATABASE_PATH") {
        config.server.database_path = Some(PathBuf::from(val));
    }
    if let Some(n) = var("WEARLINK_MAX_CONNECTIONS_PER_DEVICE").and_then(|v| v.parse().ok()) {
        config.connections.max_per_device = n;
    }
    if let Some(n) = var("WEARLINK_HEARTBEAT_INTERVAL_SECS").and_then(|v| v.parse().ok()) {
        config.connections.heartbeat_interval_secs = n;
    }
    if let Some(n) = var("WEARLINK_CACHE_TTL_SECS").and_then(|v| v.parse().ok()) {
        config.tools.cache_ttl_secs = n;
    }
    if let Some(val) = var("WEARLINK_OAUTH_TOKEN_ENDPOINT") {
        config.credentials.token_endpoint = val;
    }
    if let Some(val) = var("WEARLINK_OAUTH_CLIENT_ID") {
        config.credentials.client_id = val;
    }
    if let Some(val) = var("WEARLINK_OAUTH_CLIENT_SECRET") {
        config.credentials.client_secret = val;
    }
    if let Some(val) = var("WEARLINK_PAIRING_URI_BASE") {
        config.linking.pairing_uri_base = val;
    }
}
