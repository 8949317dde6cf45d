#![allow(clippy::unwrap_used)]

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use serde_json::{Map, Value, json};
use wearlink_core::db::unix_timestamp;
use wearlink_crypto::FieldCipher;
use wiremock::matchers::{body_json, header, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

use super::truncate::TRUNCATION_MARKER;
use super::*;
use crate::credentials::{
    CredentialCoordinator, CredentialError, OAuthTokens, RefreshedTokens, TokenRefresher,
};
use crate::storage::RelayDatabase;
use crate::tools::third_party::ThirdPartyClient;

#[derive(Clone)]
enum Behavior {
    Reply(String),
    Fail,
    Unauthorized,
}

struct FakeProvider {
    calls: AtomicUsize,
    behavior: Mutex<Behavior>,
    last: Mutex<Option<(String, Map<String, Value>, String)>>,
}

impl FakeProvider {
    fn replying(text: &str) -> Arc<Self> {
        Arc::new(Self {
            calls: AtomicUsize::new(0),
            behavior: Mutex::new(Behavior::Reply(text.to_string())),
            last: Mutex::new(None),
        })
    }

    fn set(&self, behavior: Behavior) {
        *self.behavior.lock().unwrap() = behavior;
    }

    fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    fn last_args(&self) -> Map<String, Value> {
        self.last.lock().unwrap().clone().unwrap().1
    }
}

#[async_trait]
impl BuiltinProvider for FakeProvider {
    async fn invoke(
        &self,
        action: &str,
        args: &Map<String, Value>,
        access_token: &str,
    ) -> Result<String, ProviderError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        *self.last.lock().unwrap() =
            Some((action.to_string(), args.clone(), access_token.to_string()));
        match self.behavior.lock().unwrap().clone() {
            Behavior::Reply(text) => Ok(text),
            Behavior::Fail => Err(ProviderError::Api {
                status: 500,
                message: "Internal Server Error".into(),
            }),
            Behavior::Unauthorized => Err(ProviderError::Unauthorized),
        }
    }
}

struct NoRefresh;

#[async_trait]
impl TokenRefresher for NoRefresh {
    async fn refresh(&self, _: &str) -> Result<RefreshedTokens, CredentialError> {
        Err(CredentialError::Refresh("revoked".into()))
    }
}

fn cipher() -> FieldCipher {
    FieldCipher::new(&[3u8; 32]).unwrap()
}

struct Harness {
    db: RelayDatabase,
    credentials: CredentialCoordinator,
    gmail: Arc<FakeProvider>,
    orchestrator: ToolOrchestrator,
}

async fn harness(options: OrchestratorOptions) -> Harness {
    let db = RelayDatabase::open_in_memory().await.unwrap();
    db.upsert_identity("u1", "google-1", "alice@example.com", "Alice")
        .await
        .unwrap();
    db.upsert_identity("u2", "google-2", "bob@example.com", "Bob")
        .await
        .unwrap();
    db.get_or_create_device("d1", None).await.unwrap();
    let now = unix_timestamp();
    db.create_link_token("link-d1", "u1", now + 300, now).await.unwrap();
    db.redeem_link_token("link-d1", "d1", None, now).await.unwrap();
    db.get_or_create_device("unlinked", None).await.unwrap();

    let credentials =
        CredentialCoordinator::new(db.clone(), cipher(), Arc::new(NoRefresh), Duration::from_secs(300));
    credentials
        .store_credential(
            "u1",
            &OAuthTokens {
                access_token: "google-access".into(),
                refresh_token: Some("google-refresh".into()),
                scope: "gmail.readonly".into(),
                expires_at: unix_timestamp() + 3600,
            },
        )
        .await
        .unwrap();

    let gmail = FakeProvider::replying("You have 3 unread email(s):");
    let orchestrator = ToolOrchestrator::new(
        db.clone(),
        credentials.clone(),
        cipher(),
        ThirdPartyClient::new(Duration::from_secs(5)).unwrap(),
        &options,
    )
    .with_builtin("gmail", "Gmail", gmail.clone())
    .with_builtin("calendar", "Google Calendar", FakeProvider::replying("No events."));

    Harness {
        db,
        credentials,
        gmail,
        orchestrator,
    }
}

fn call(tool: &str, args: Value) -> ToolCall {
    ToolCall::new(tool, args.as_object().cloned().unwrap())
}

#[tokio::test]
async fn unlinked_device_fails_fast() {
    let h = harness(OrchestratorOptions::default()).await;
    let result = h
        .orchestrator
        .execute("unlinked", &call("gmail.get_unread", json!({})))
        .await;

    assert!(result.is_error);
    assert!(result.content.contains("not linked"));
    assert_eq!(h.gmail.calls(), 0);

    let unknown = h
        .orchestrator
        .execute("never-seen", &call("gmail.get_unread", json!({})))
        .await;
    assert!(unknown.content.contains("not linked"));
}

#[tokio::test]
async fn success_passes_coerced_args_and_token() {
    let h = harness(OrchestratorOptions::default()).await;
    let result = h
        .orchestrator
        .execute("d1", &call("gmail.get_unread", json!({"maxResults": "10"})))
        .await;

    assert_eq!(result, ToolResult::ok("You have 3 unread email(s):"));
    let (action, args, token) = h.gmail.last.lock().unwrap().clone().unwrap();
    assert_eq!(action, "get_unread");
    assert_eq!(args["maxResults"], json!(10));
    assert_eq!(token, "google-access");
}

#[tokio::test]
async fn repeated_call_is_served_from_cache() {
    let h = harness(OrchestratorOptions::default()).await;
    let mut first = Map::new();
    first.insert("query".into(), json!("invoice"));
    first.insert("maxResults".into(), json!(5));
    let mut second = Map::new();
    second.insert("maxResults".into(), json!(5));
    second.insert("query".into(), json!("invoice"));

    let a = h.orchestrator.execute("d1", &ToolCall::new("gmail.search", first)).await;
    h.gmail.set(Behavior::Fail);
    let b = h.orchestrator.execute("d1", &ToolCall::new("gmail.search", second)).await;

    assert!(a.success);
    assert_eq!(a, b);
    assert_eq!(h.gmail.calls(), 1);
}

#[tokio::test]
async fn failures_are_not_cached() {
    let h = harness(OrchestratorOptions::default()).await;
    h.gmail.set(Behavior::Fail);
    let req = call("gmail.get_unread", json!({}));

    let failed = h.orchestrator.execute("d1", &req).await;
    assert!(failed.is_error);
    assert!(failed.content.contains("Upstream error from gmail"));
    assert!(h.orchestrator.cache().is_empty());

    h.gmail.set(Behavior::Reply("ok now".into()));
    let ok = h.orchestrator.execute("d1", &req).await;
    assert_eq!(ok.content, "ok now");
    assert_eq!(h.gmail.calls(), 2);
    assert_eq!(h.orchestrator.cache().len(), 1);
}

#[tokio::test]
async fn out_of_range_argument_is_rejected_before_provider() {
    let h = harness(OrchestratorOptions::default()).await;
    let result = h
        .orchestrator
        .execute("d1", &call("gmail.get_unread", json!({"maxResults": "999"})))
        .await;

    assert!(result.is_error);
    assert!(result.content.contains("maxResults"));
    assert_eq!(h.gmail.calls(), 0);
}

#[tokio::test]
async fn unknown_builtin_action_is_unknown_tool() {
    let h = harness(OrchestratorOptions::default()).await;
    let result = h
        .orchestrator
        .execute("d1", &call("gmail.delete_all", json!({})))
        .await;
    assert!(result.content.starts_with("Unknown tool: gmail.delete_all"));
}

#[tokio::test]
async fn missing_credential_requires_reauth() {
    let h = harness(OrchestratorOptions::default()).await;
    h.db.delete_credential("u1").await.unwrap();

    let result = h
        .orchestrator
        .execute("d1", &call("gmail.get_unread", json!({})))
        .await;
    assert!(result.content.contains("re-authenticated"));
    assert_eq!(h.gmail.calls(), 0);
}

#[tokio::test]
async fn unrefreshable_credential_requires_reauth() {
    let h = harness(OrchestratorOptions::default()).await;
    h.credentials
        .store_credential(
            "u1",
            &OAuthTokens {
                access_token: "old".into(),
                refresh_token: Some("revoked".into()),
                scope: String::new(),
                expires_at: unix_timestamp() + 10,
            },
        )
        .await
        .unwrap();

    let result = h
        .orchestrator
        .execute("d1", &call("gmail.get_unread", json!({})))
        .await;
    assert!(result.content.contains("re-authenticated"));
}

#[tokio::test]
async fn rejected_token_requires_reauth() {
    let h = harness(OrchestratorOptions::default()).await;
    h.gmail.set(Behavior::Unauthorized);
    let result = h
        .orchestrator
        .execute("d1", &call("gmail.get_unread", json!({})))
        .await;
    assert!(result.content.contains("re-authenticated"));
}

#[tokio::test]
async fn long_content_is_truncated_then_cached() {
    let options = OrchestratorOptions {
        max_result_bytes: 100,
        ..OrchestratorOptions::default()
    };
    let h = harness(options).await;
    h.gmail.set(Behavior::Reply("word ".repeat(100)));

    let req = call("gmail.get_unread", json!({}));
    let result = h.orchestrator.execute("d1", &req).await;
    assert!(result.content.ends_with(TRUNCATION_MARKER));
    assert!(result.content.len() <= 100 + TRUNCATION_MARKER.len());

    let again = h.orchestrator.execute("d1", &req).await;
    assert_eq!(again.content, result.content);
    assert_eq!(h.gmail.calls(), 1);
}

#[tokio::test]
async fn tool_without_prefix_routes_by_server_id() {
    let h = harness(OrchestratorOptions::default()).await;
    let req = call("get_unread", json!({"maxResults": 3})).with_server("gmail");
    let result = h.orchestrator.execute("d1", &req).await;

    assert!(result.success);
    assert_eq!(h.gmail.last_args()["maxResults"], json!(3));
}

#[tokio::test]
async fn unknown_prefix_without_service_is_unknown_tool() {
    let h = harness(OrchestratorOptions::default()).await;
    let result = h
        .orchestrator
        .execute("d1", &call("weather.forecast", json!({})))
        .await;
    assert!(result.is_error);
    assert!(result.content.starts_with("Unknown tool"));

    let bare = h.orchestrator.execute("d1", &call("forecast", json!({}))).await;
    assert!(bare.content.starts_with("Unknown tool"));
}

#[tokio::test]
async fn foreign_service_is_denied_without_http_call() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(200))
        .expect(0)
        .mount(&server)
        .await;

    let h = harness(OrchestratorOptions::default()).await;
    h.orchestrator
        .register_service("weather", "u2", "Weather", &server.uri(), None)
        .await
        .unwrap();

    let req = call("weather.forecast", json!({"city": "Oslo"})).with_server("weather");
    let result = h.orchestrator.execute("d1", &req).await;
    assert!(result.is_error);
    assert!(result.content.contains("Access denied"));
}

#[tokio::test]
async fn owned_service_is_called_with_decrypted_key() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/tools/call"))
        .and(header("authorization", "Bearer wx-key"))
        .and(body_json(json!({"name": "forecast", "arguments": {"city": "Oslo"}})))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "content": [{"type": "text", "text": "Rain"}]
        })))
        .expect(1)
        .mount(&server)
        .await;

    let h = harness(OrchestratorOptions::default()).await;
    let service = h
        .orchestrator
        .register_service("weather", "u1", "Weather", &server.uri(), Some("wx-key"))
        .await
        .unwrap();
    assert_ne!(service.api_key.as_deref(), Some("wx-key"));

    let req = call("weather.forecast", json!({"city": "Oslo"})).with_server("weather");
    let result = h.orchestrator.execute("d1", &req).await;
    assert_eq!(result, ToolResult::ok("Rain"));
}

async fn mount_reply(server: &MockServer, text: &str) {
    Mock::given(method("POST"))
        .and(path("/tools/call"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "content": [{"type": "text", "text": text}]
        })))
        .expect(1)
        .mount(server)
        .await;
}

#[tokio::test]
async fn cache_is_scoped_to_the_resolved_service() {
    let north = MockServer::start().await;
    let south = MockServer::start().await;
    mount_reply(&north, "Snow").await;
    mount_reply(&south, "Sun").await;

    let h = harness(OrchestratorOptions::default()).await;
    h.orchestrator
        .register_service("north", "u1", "North", &north.uri(), None)
        .await
        .unwrap();
    h.orchestrator
        .register_service("south", "u1", "South", &south.uri(), None)
        .await
        .unwrap();

    let from_north = call("forecast", json!({})).with_server("north");
    let from_south = call("forecast", json!({})).with_server("south");
    assert_eq!(h.orchestrator.execute("d1", &from_north).await, ToolResult::ok("Snow"));
    assert_eq!(h.orchestrator.execute("d1", &from_south).await, ToolResult::ok("Sun"));

    // Repeats are cache hits, each against its own service.
    assert_eq!(h.orchestrator.execute("d1", &from_north).await, ToolResult::ok("Snow"));
    assert_eq!(h.orchestrator.execute("d1", &from_south).await, ToolResult::ok("Sun"));
}

#[tokio::test]
async fn builtin_ids_cannot_be_registered() {
    let h = harness(OrchestratorOptions::default()).await;
    let err = h
        .orchestrator
        .register_service("gmail", "u1", "Fake", "http://localhost", None)
        .await
        .unwrap_err();
    assert!(matches!(err, ToolError::InvalidArguments(_)));
}

#[tokio::test]
async fn servers_list_has_builtins_and_owned_services() {
    let h = harness(OrchestratorOptions::default()).await;
    h.orchestrator
        .register_service("notes", "u1", "Notes", "http://localhost:1", None)
        .await
        .unwrap();
    h.orchestrator
        .register_service("other", "u2", "Other", "http://localhost:2", None)
        .await
        .unwrap();

    let servers = h.orchestrator.list_servers("u1").await.unwrap();
    let ids: Vec<&str> = servers.iter().map(|s| s.id.as_str()).collect();
    assert_eq!(ids, vec!["calendar", "gmail", "notes"]);
    assert!(servers[1].tools.contains(&"gmail.search".to_string()));
    assert!(!servers[2].built_in);
}

#[test]
fn progress_message_uses_route() {
    let req = call("get_unread", json!({})).with_server("gmail");
    assert_eq!(ToolOrchestrator::progress_message(&req), "Checking your emails...");
    let req = call("weather.forecast", json!({}));
    assert_eq!(ToolOrchestrator::progress_message(&req), "Working on it...");
}
