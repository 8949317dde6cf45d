//! Tool execution pipeline.
//!
//! identity -> cache -> validate -> route (built-in or third-party) ->
//! truncate -> cache. Every failure ends up as a structured [`ToolResult`].

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use serde::Serialize;
use tracing::{debug, instrument, warn};
use wearlink_crypto::FieldCipher;

use super::cache::{ResultCache, cache_key};
use super::progress::progress_phrase;
use super::provider::{BuiltinProvider, ProviderError};
use super::result::{FieldError, ToolCall, ToolError, ToolResult};
use super::schema::SchemaRegistry;
use super::third_party::{ServiceCall, ThirdPartyClient};
use super::truncate::truncate_content;
use crate::credentials::CredentialCoordinator;
use crate::storage::{DatabaseError, Identity, RelayDatabase, Service, ServiceParams};

/// Tunables taken from `[tools]` config.
#[derive(Debug, Clone)]
pub struct OrchestratorOptions {
    pub cache_capacity: usize,
    pub cache_ttl: Duration,
    pub max_result_bytes: usize,
}

impl Default for OrchestratorOptions {
    fn default() -> Self {
        Self {
            cache_capacity: 1000,
            cache_ttl: Duration::from_secs(300),
            max_result_bytes: 10 * 1024,
        }
    }
}

/// Entry in a `servers_list` response.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ServerInfo {
    pub id: String,
    pub name: String,
    pub built_in: bool,
    pub tools: Vec<String>,
}

struct Builtin {
    name: String,
    provider: Arc<dyn BuiltinProvider>,
}

pub struct ToolOrchestrator {
    db: RelayDatabase,
    credentials: CredentialCoordinator,
    cipher: FieldCipher,
    third_party: ThirdPartyClient,
    schemas: SchemaRegistry,
    builtins: HashMap<String, Builtin>,
    cache: ResultCache,
    max_result_bytes: usize,
}

impl ToolOrchestrator {
    pub fn new(
        db: RelayDatabase,
        credentials: CredentialCoordinator,
        cipher: FieldCipher,
        third_party: ThirdPartyClient,
        options: &OrchestratorOptions,
    ) -> Self {
        Self {
            db,
            credentials,
            cipher,
            third_party,
            schemas: SchemaRegistry::builtin(),
            builtins: HashMap::new(),
            cache: ResultCache::new(options.cache_capacity, options.cache_ttl),
            max_result_bytes: options.max_result_bytes,
        }
    }

    /// Serve tools prefixed `id.` from `provider`.
    #[must_use]
    pub fn with_builtin(
        mut self,
        id: &str,
        name: &str,
        provider: Arc<dyn BuiltinProvider>,
    ) -> Self {
        self.builtins.insert(
            id.to_string(),
            Builtin {
                name: name.to_string(),
                provider,
            },
        );
        self
    }

    pub const fn cache(&self) -> &ResultCache {
        &self.cache
    }

    /// Phrase to show while `call` runs.
    pub fn progress_message(call: &ToolCall) -> &'static str {
        let (provider, action) = call.route();
        progress_phrase(provider, action)
    }

    /// Run one tool call for `device_id`. Never fails; errors are folded into
    /// the returned result.
    #[instrument(skip(self, call), fields(tool = %call.tool_name))]
    pub async fn execute(&self, device_id: &str, call: &ToolCall) -> ToolResult {
        match self.run(device_id, call).await {
            Ok(content) => ToolResult::ok(content),
            Err(e) => {
                debug!(error = %e, "Tool call failed");
                e.into_result()
            }
        }
    }

    async fn run(&self, device_id: &str, call: &ToolCall) -> Result<String, ToolError> {
        let identity = self
            .db
            .get_device_owner(device_id)
            .await?
            .ok_or(ToolError::NotLinked)?;

        let (provider, action) = call.route();
        let builtin = self.builtins.get(provider);
        let target = match builtin {
            Some(_) => provider,
            None => third_party_target(call, provider),
        };
        if target.is_empty() {
            return Err(ToolError::UnknownTool(call.tool_name.clone()));
        }

        let key = cache_key(&identity.id, target, action, &call.arguments);
        if let Some(hit) = self.cache.get(&key) {
            debug!("Serving cached result");
            return Ok(hit);
        }

        let content = match builtin {
            Some(builtin) => {
                self.call_builtin(&identity, &builtin.provider, provider, action, call)
                    .await?
            }
            None => self.call_third_party(&identity, target, action, call).await?,
        };

        let content = truncate_content(&content, self.max_result_bytes);
        self.cache.insert(key, content.clone());
        Ok(content)
    }

    async fn call_builtin(
        &self,
        identity: &Identity,
        provider: &Arc<dyn BuiltinProvider>,
        provider_id: &str,
        action: &str,
        call: &ToolCall,
    ) -> Result<String, ToolError> {
        let args = self
            .schemas
            .validate(&format!("{provider_id}.{action}"), &call.arguments)?;

        let token = match self.credentials.get_valid_token(&identity.id).await {
            Ok(Some(token)) => token,
            Ok(None) => return Err(ToolError::ReauthRequired),
            Err(e) if e.needs_reauth() => return Err(ToolError::ReauthRequired),
            Err(e) => return Err(ToolError::Internal(e.to_string())),
        };

        provider
            .invoke(action, &args, token.secret())
            .await
            .map_err(|e| match e {
                ProviderError::Unauthorized => ToolError::ReauthRequired,
                ProviderError::InvalidArgument(field) => {
                    ToolError::InvalidArguments(vec![FieldError::new(field, "is invalid")])
                }
                other => {
                    warn!(provider = %provider_id, error = %other, "Built-in provider failed");
                    ToolError::Upstream {
                        service: provider_id.to_string(),
                        detail: other.to_string(),
                    }
                }
            })
    }

    async fn call_third_party(
        &self,
        identity: &Identity,
        service_id: &str,
        action: &str,
        call: &ToolCall,
    ) -> Result<String, ToolError> {
        let service = self
            .db
            .get_service(service_id)
            .await?
            .ok_or_else(|| ToolError::UnknownTool(call.tool_name.clone()))?;
        if service.owner_id != identity.id {
            warn!(service = %service.id, "Service not owned by caller");
            return Err(ToolError::AccessDenied(service.id));
        }

        let api_key = service
            .api_key
            .as_deref()
            .map(|sealed| self.cipher.decrypt(sealed))
            .transpose()
            .map_err(|e| ToolError::Internal(e.to_string()))?;

        self.third_party
            .call(&ServiceCall {
                service_id: &service.id,
                endpoint: &service.endpoint,
                api_key: api_key.as_deref(),
                name: action,
                arguments: &call.arguments,
            })
            .await
    }

    /// Record a third-party service for `owner_id`, sealing its API key.
    #[instrument(skip(self, api_key))]
    pub async fn register_service(
        &self,
        id: &str,
        owner_id: &str,
        name: &str,
        endpoint: &str,
        api_key: Option<&str>,
    ) -> Result<Service, ToolError> {
        if self.builtins.contains_key(id) {
            return Err(ToolError::InvalidArguments(vec![FieldError::new(
                "id",
                "is reserved",
            )]));
        }
        let sealed = api_key
            .map(|k| self.cipher.encrypt(k))
            .transpose()
            .map_err(|e| ToolError::Internal(e.to_string()))?;
        self.db
            .create_service(&ServiceParams {
                id,
                owner_id,
                name,
                endpoint,
                api_key: sealed.as_deref(),
            })
            .await
            .map_err(|e| match e {
                DatabaseError::Conflict(_) => {
                    ToolError::InvalidArguments(vec![FieldError::new("id", "already exists")])
                }
                other => other.into(),
            })
    }

    /// Built-in servers followed by the identity's registered services.
    pub async fn list_servers(&self, identity_id: &str) -> Result<Vec<ServerInfo>, ToolError> {
        let mut servers: Vec<ServerInfo> = self
            .builtins
            .iter()
            .map(|(id, builtin)| ServerInfo {
                id: id.clone(),
                name: builtin.name.clone(),
                built_in: true,
                tools: self
                    .schemas
                    .tools_for(id)
                    .into_iter()
                    .map(str::to_string)
                    .collect(),
            })
            .collect();
        servers.sort_by(|a, b| a.id.cmp(&b.id));

        servers.extend(
            self.db
                .list_services(identity_id)
                .await?
                .into_iter()
                .map(|s| ServerInfo {
                    id: s.id,
                    name: s.name,
                    built_in: false,
                    tools: Vec::new(),
                }),
        );
        Ok(servers)
    }
}

/// Service id a non-built-in call is sent to: `serverId` when given,
/// otherwise the tool name prefix.
fn third_party_target<'a>(call: &'a ToolCall, provider: &'a str) -> &'a str {
    call.server_id
        .as_deref()
        .filter(|s| !s.is_empty())
        .unwrap_or(provider)
}
