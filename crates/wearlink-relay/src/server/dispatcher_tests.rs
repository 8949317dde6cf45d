#![allow(clippy::unwrap_used)]

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use serde_json::{Map, Value, json};
use tokio::sync::mpsc;
use wearlink_core::db::unix_timestamp;
use wearlink_crypto::FieldCipher;

use super::Dispatcher;
use crate::credentials::{
    CredentialCoordinator, CredentialError, OAuthTokens, RefreshedTokens, TokenRefresher,
};
use crate::link::LinkService;
use crate::registry::{ConnectionRegistry, DeviceConnection, Outbound};
use crate::storage::RelayDatabase;
use crate::tools::third_party::ThirdPartyClient;
use crate::tools::{BuiltinProvider, OrchestratorOptions, ProviderError, ToolOrchestrator};

struct Echo;

#[async_trait]
impl BuiltinProvider for Echo {
    async fn invoke(
        &self,
        action: &str,
        _args: &Map<String, Value>,
        _access_token: &str,
    ) -> Result<String, ProviderError> {
        Ok(format!("ran {action}"))
    }
}

struct NoRefresh;

#[async_trait]
impl TokenRefresher for NoRefresh {
    async fn refresh(&self, _: &str) -> Result<RefreshedTokens, CredentialError> {
        Err(CredentialError::Refresh("revoked".into()))
    }
}

struct Fixture {
    dispatcher: Dispatcher,
    links: LinkService,
    registry: ConnectionRegistry,
}

async fn fixture() -> Fixture {
    let db = RelayDatabase::open_in_memory().await.unwrap();
    db.upsert_identity("u1", "google-1", "alice@example.com", "Alice")
        .await
        .unwrap();
    db.get_or_create_device("watch-1", None).await.unwrap();

    let cipher = FieldCipher::new(&[9u8; 32]).unwrap();
    let credentials = CredentialCoordinator::new(
        db.clone(),
        cipher.clone(),
        Arc::new(NoRefresh),
        Duration::from_secs(300),
    );
    credentials
        .store_credential(
            "u1",
            &OAuthTokens {
                access_token: "access".into(),
                refresh_token: None,
                scope: String::new(),
                expires_at: unix_timestamp() + 3600,
            },
        )
        .await
        .unwrap();

    let orchestrator = ToolOrchestrator::new(
        db.clone(),
        credentials,
        cipher,
        ThirdPartyClient::new(Duration::from_secs(5)).unwrap(),
        &OrchestratorOptions::default(),
    )
    .with_builtin("gmail", "Gmail", Arc::new(Echo));

    let links = LinkService::new(db.clone(), Duration::from_secs(300), "wearlink://link");
    Fixture {
        dispatcher: Dispatcher::new(db, Arc::new(orchestrator), links.clone()),
        links,
        registry: ConnectionRegistry::new(5),
    }
}

async fn connect(f: &Fixture) -> (Arc<DeviceConnection>, mpsc::Receiver<Outbound>) {
    let reg = f.registry.register("watch-1").await;
    (reg.connection, reg.outbound)
}

async fn next_json(rx: &mut mpsc::Receiver<Outbound>) -> Value {
    match rx.recv().await.unwrap() {
        Outbound::Frame(text) => serde_json::from_str(&text).unwrap(),
        other => panic!("expected a frame, got {other:?}"),
    }
}

async fn link(f: &Fixture, conn: &Arc<DeviceConnection>, rx: &mut mpsc::Receiver<Outbound>) {
    let generated = f.links.generate_token("u1").await.unwrap();
    let frame = json!({
        "type": "link_device",
        "requestId": "link",
        "linkToken": generated.token,
    });
    f.dispatcher.handle_text(conn, &frame.to_string()).await;
    assert_eq!(next_json(rx).await["type"], "link_result");
}

#[tokio::test]
async fn malformed_frame_reports_error_without_request_id() {
    let f = fixture().await;
    let (conn, mut rx) = connect(&f).await;

    assert!(f.dispatcher.handle_text(&conn, "{nope").await.is_none());
    let reply = next_json(&mut rx).await;
    assert_eq!(reply["type"], "error");
    assert!(reply.get("requestId").is_none());
}

#[tokio::test]
async fn unknown_type_echoes_request_id() {
    let f = fixture().await;
    let (conn, mut rx) = connect(&f).await;

    f.dispatcher
        .handle_text(&conn, r#"{"type":"dance","requestId":"r9"}"#)
        .await;
    let reply = next_json(&mut rx).await;
    assert_eq!(reply["type"], "error");
    assert_eq!(reply["requestId"], "r9");
}

#[tokio::test]
async fn account_is_null_until_linked() {
    let f = fixture().await;
    let (conn, mut rx) = connect(&f).await;

    f.dispatcher
        .handle_text(&conn, r#"{"type":"get_user_account","requestId":"a1"}"#)
        .await;
    let reply = next_json(&mut rx).await;
    assert_eq!(reply["type"], "user_account");
    assert_eq!(reply["requestId"], "a1");
    assert!(reply["user"].is_null());

    link(&f, &conn, &mut rx).await;

    f.dispatcher
        .handle_text(&conn, r#"{"type":"get_user_account","requestId":"a2"}"#)
        .await;
    let reply = next_json(&mut rx).await;
    assert_eq!(reply["user"]["email"], "alice@example.com");
    assert_eq!(reply["user"]["name"], "Alice");
}

#[tokio::test]
async fn link_token_works_once() {
    let f = fixture().await;
    let (conn, mut rx) = connect(&f).await;
    let generated = f.links.generate_token("u1").await.unwrap();
    let frame = json!({
        "type": "link_device",
        "requestId": "l1",
        "linkToken": generated.token,
        "deviceName": "Left wrist",
    })
    .to_string();

    f.dispatcher.handle_text(&conn, &frame).await;
    let reply = next_json(&mut rx).await;
    assert_eq!(reply["type"], "link_result");
    assert_eq!(reply["user"]["id"], "u1");

    f.dispatcher.handle_text(&conn, &frame).await;
    let reply = next_json(&mut rx).await;
    assert_eq!(reply["type"], "error");
    assert_eq!(reply["requestId"], "l1");
    assert_eq!(reply["error"], "Invalid or expired link token");
}

#[tokio::test]
async fn foreign_device_id_is_refused() {
    let f = fixture().await;
    let (conn, mut rx) = connect(&f).await;
    link(&f, &conn, &mut rx).await;

    f.dispatcher
        .handle_text(
            &conn,
            r#"{"type":"unlink_device","requestId":"u1","deviceId":"someone-else"}"#,
        )
        .await;
    let reply = next_json(&mut rx).await;
    assert_eq!(reply["type"], "error");

    f.dispatcher
        .handle_text(
            &conn,
            r#"{"type":"unlink_device","requestId":"u2","deviceId":"watch-1"}"#,
        )
        .await;
    let reply = next_json(&mut rx).await;
    assert_eq!(reply["type"], "unlink_result");
    assert_eq!(reply["success"], true);
}

#[tokio::test]
async fn servers_require_a_link() {
    let f = fixture().await;
    let (conn, mut rx) = connect(&f).await;

    f.dispatcher
        .handle_text(&conn, r#"{"type":"get_servers","requestId":"s1"}"#)
        .await;
    assert_eq!(next_json(&mut rx).await["type"], "error");

    link(&f, &conn, &mut rx).await;
    f.dispatcher
        .handle_text(&conn, r#"{"type":"get_servers","requestId":"s2"}"#)
        .await;
    let reply = next_json(&mut rx).await;
    assert_eq!(reply["type"], "servers_list");
    assert_eq!(reply["servers"][0]["id"], "gmail");
    assert_eq!(reply["servers"][0]["builtIn"], true);
}

#[tokio::test]
async fn tool_execute_sends_progress_then_result() {
    let f = fixture().await;
    let (conn, mut rx) = connect(&f).await;
    link(&f, &conn, &mut rx).await;

    let handle = f
        .dispatcher
        .handle_text(
            &conn,
            r#"{"type":"tool_execute","requestId":"t1","toolName":"gmail.get_unread"}"#,
        )
        .await
        .unwrap();
    handle.await.unwrap();

    let progress = next_json(&mut rx).await;
    assert_eq!(progress["type"], "tool_progress");
    assert_eq!(progress["requestId"], "t1");
    assert_eq!(progress["status"], "executing");
    assert_eq!(progress["message"], "Checking your emails...");

    let result = next_json(&mut rx).await;
    assert_eq!(result["type"], "tool_result");
    assert_eq!(result["requestId"], "t1");
    assert_eq!(result["result"]["success"], true);
    assert_eq!(result["result"]["content"], "ran get_unread");
}

#[tokio::test]
async fn tool_result_after_close_is_dropped() {
    let f = fixture().await;
    let (conn, mut rx) = connect(&f).await;
    link(&f, &conn, &mut rx).await;
    f.registry.unregister(&conn).await;

    let handle = f
        .dispatcher
        .handle_text(
            &conn,
            r#"{"type":"tool_execute","requestId":"t2","toolName":"gmail.get_unread"}"#,
        )
        .await
        .unwrap();
    handle.await.unwrap();

    assert!(rx.try_recv().is_err());
}
