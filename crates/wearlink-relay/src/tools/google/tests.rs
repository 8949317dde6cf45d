#![allow(clippy::unwrap_used)]

use std::time::Duration;

use serde_json::{Map, Value, json};
use wiremock::matchers::{header, method, path, query_param};
use wiremock::{Mock, MockServer, ResponseTemplate};

use super::{CalendarProvider, GmailProvider, GoogleClient, GoogleEndpoints};
use crate::tools::provider::{BuiltinProvider, ProviderError};

fn client_with_timeout(server: &MockServer, timeout: Duration) -> GoogleClient {
    GoogleClient::new(
        GoogleEndpoints {
            gmail: server.uri(),
            calendar: format!("{}/", server.uri()),
        },
        timeout,
    )
    .unwrap()
}

fn client_for(server: &MockServer) -> GoogleClient {
    client_with_timeout(server, Duration::from_secs(5))
}

fn args(v: Value) -> Map<String, Value> {
    v.as_object().cloned().unwrap()
}

async fn mount_message(server: &MockServer, id: &str, from: &str, subject: &str) {
    Mock::given(method("GET"))
        .and(path(format!("/gmail/v1/users/me/messages/{id}")))
        .and(query_param("format", "metadata"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "id": id,
            "snippet": format!("snippet of {id}"),
            "payload": {"headers": [
                {"name": "From", "value": from},
                {"name": "Subject", "value": subject},
            ]}
        })))
        .mount(server)
        .await;
}

#[tokio::test]
async fn unread_lists_each_message() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/gmail/v1/users/me/messages"))
        .and(query_param("q", "is:unread"))
        .and(query_param("maxResults", "5"))
        .and(header("authorization", "Bearer tok"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "messages": [{"id": "m1"}, {"id": "m2"}]
        })))
        .expect(1)
        .mount(&server)
        .await;
    mount_message(&server, "m1", "alice@example.com", "Lunch").await;
    mount_message(&server, "m2", "bob@example.com", "Report").await;

    let gmail = GmailProvider::new(client_for(&server));
    let text = gmail
        .invoke("get_unread", &args(json!({"maxResults": 5})), "tok")
        .await
        .unwrap();

    assert!(text.starts_with("You have 2 unread email(s):"));
    assert!(text.contains("From: alice@example.com | Subject: Lunch"));
    assert!(text.contains("snippet of m2"));
}

#[tokio::test]
async fn empty_inbox() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/gmail/v1/users/me/messages"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"resultSizeEstimate": 0})))
        .mount(&server)
        .await;

    let gmail = GmailProvider::new(client_for(&server));
    let text = gmail.invoke("get_unread", &Map::new(), "tok").await.unwrap();
    assert_eq!(text, "You have no unread emails.");
}

#[tokio::test]
async fn search_passes_query() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/gmail/v1/users/me/messages"))
        .and(query_param("q", "from:carol invoice"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"messages": []})))
        .expect(1)
        .mount(&server)
        .await;

    let gmail = GmailProvider::new(client_for(&server));
    let text = gmail
        .invoke("search", &args(json!({"query": "from:carol invoice"})), "tok")
        .await
        .unwrap();
    assert_eq!(text, "No emails found matching \"from:carol invoice\".");
}

#[tokio::test]
async fn rejected_token_is_unauthorized() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .respond_with(ResponseTemplate::new(401))
        .mount(&server)
        .await;

    let gmail = GmailProvider::new(client_for(&server));
    let err = gmail
        .invoke("get_email", &args(json!({"messageId": "m1"})), "stale")
        .await
        .unwrap_err();
    assert!(matches!(err, ProviderError::Unauthorized));
}

#[tokio::test]
async fn server_error_carries_status() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .respond_with(ResponseTemplate::new(503))
        .mount(&server)
        .await;

    let calendar = CalendarProvider::new(client_for(&server));
    let err = calendar.invoke("get_today", &Map::new(), "tok").await.unwrap_err();
    assert!(matches!(err, ProviderError::Api { status: 503, .. }));
}

#[tokio::test]
async fn calendar_renders_events() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/calendar/v3/calendars/primary/events"))
        .and(query_param("singleEvents", "true"))
        .and(query_param("maxResults", "3"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "items": [
                {"summary": "Standup", "location": "Room 1",
                 "start": {"dateTime": "2026-03-16T09:00:00Z"}},
                {"summary": "Offsite", "start": {"date": "2026-03-18"}},
                {"start": {"dateTime": "2026-03-19T14:30:00+01:00"}}
            ]
        })))
        .mount(&server)
        .await;

    let calendar = CalendarProvider::new(client_for(&server));
    let text = calendar
        .invoke("list_events", &args(json!({"days": 7, "maxResults": 3})), "tok")
        .await
        .unwrap();

    assert!(text.starts_with("You have 3 event(s) in the next 7 day(s):"));
    assert!(text.contains("- Mon Mar 16 09:00 Standup @ Room 1"));
    assert!(text.contains("- 2026-03-18 (all day) Offsite"));
    assert!(text.contains("14:30 (no title)"));
}

#[tokio::test]
async fn unknown_action_is_rejected() {
    let server = MockServer::start().await;
    let calendar = CalendarProvider::new(client_for(&server));
    let err = calendar.invoke("delete_all", &Map::new(), "tok").await.unwrap_err();
    assert!(matches!(err, ProviderError::UnsupportedAction(a) if a == "delete_all"));
}

#[tokio::test]
async fn message_id_cannot_escape_the_messages_path() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({})))
        .expect(0)
        .mount(&server)
        .await;

    let gmail = GmailProvider::new(client_for(&server));
    let err = gmail
        .invoke("get_email", &args(json!({"messageId": "../settings/filters"})), "tok")
        .await
        .unwrap_err();
    assert!(matches!(err, ProviderError::InvalidArgument("messageId")));
}

#[tokio::test]
async fn slow_api_times_out() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_json(json!({"items": []}))
                .set_delay(Duration::from_secs(30)),
        )
        .mount(&server)
        .await;

    let calendar = CalendarProvider::new(client_with_timeout(&server, Duration::from_millis(100)));
    let err = tokio::time::timeout(
        Duration::from_secs(5),
        calendar.invoke("get_today", &Map::new(), "tok"),
    )
    .await
    .unwrap()
    .unwrap_err();
    assert!(matches!(err, ProviderError::Http(e) if e.is_timeout()));
}
