use std::fmt::Write;

use async_trait::async_trait;
use futures::future::try_join_all;
use serde_json::{Map, Value};

use super::client::GoogleClient;
use super::types::{Message, MessageList};
use crate::tools::provider::{BuiltinProvider, ProviderError, int_arg, str_arg};
use crate::tools::schema::is_identifier;

const METADATA_HEADERS: [&str; 4] = ["From", "To", "Subject", "Date"];

#[derive(Debug, Clone)]
pub struct GmailProvider {
    client: GoogleClient,
}

impl GmailProvider {
    pub const fn new(client: GoogleClient) -> Self {
        Self { client }
    }

    async fn list(
        &self,
        query: &str,
        max_results: i64,
        token: &str,
    ) -> Result<Vec<Message>, ProviderError> {
        let list: MessageList = self
            .client
            .get_json(
                &self.client.gmail_url("/messages"),
                &[("q", query.to_string()), ("maxResults", max_results.to_string())],
                token,
            )
            .await?;
        try_join_all(list.messages.iter().map(|m| self.fetch(&m.id, token))).await
    }

    async fn fetch(&self, id: &str, token: &str) -> Result<Message, ProviderError> {
        if !is_identifier(id) {
            return Err(ProviderError::InvalidArgument("messageId"));
        }
        let mut query = vec![("format", "metadata".to_string())];
        query.extend(METADATA_HEADERS.iter().map(|h| ("metadataHeaders", (*h).to_string())));
        self.client
            .get_json(&self.client.gmail_url(&format!("/messages/{id}")), &query, token)
            .await
    }
}

fn render_list(heading: &str, messages: &[Message]) -> String {
    let mut out = String::from(heading);
    for (i, m) in messages.iter().enumerate() {
        let _ = write!(
            out,
            "\n{}. [{}] From: {} | Subject: {}",
            i + 1,
            m.id,
            m.header("From"),
            m.header("Subject")
        );
        if !m.snippet.is_empty() {
            let _ = write!(out, "\n   {}", m.snippet);
        }
    }
    out
}

fn render_message(m: &Message) -> String {
    let mut out = String::new();
    for name in METADATA_HEADERS {
        let _ = writeln!(out, "{name}: {}", m.header(name));
    }
    out.push('\n');
    out.push_str(&m.snippet);
    out
}

#[async_trait]
impl BuiltinProvider for GmailProvider {
    async fn invoke(
        &self,
        action: &str,
        args: &Map<String, Value>,
        access_token: &str,
    ) -> Result<String, ProviderError> {
        let max_results = int_arg(args, "maxResults", 10);
        match action {
            "get_unread" => {
                let messages = self.list("is:unread", max_results, access_token).await?;
                Ok(if messages.is_empty() {
                    "You have no unread emails.".to_string()
                } else {
                    render_list(
                        &format!("You have {} unread email(s):", messages.len()),
                        &messages,
                    )
                })
            }
            "search" => {
                let query = str_arg(args, "query")?;
                let messages = self.list(query, max_results, access_token).await?;
                Ok(if messages.is_empty() {
                    format!("No emails found matching \"{query}\".")
                } else {
                    render_list(
                        &format!("Found {} email(s) matching \"{query}\":", messages.len()),
                        &messages,
                    )
                })
            }
            "get_email" => {
                let id = str_arg(args, "messageId")?;
                Ok(render_message(&self.fetch(id, access_token).await?))
            }
            other => Err(ProviderError::UnsupportedAction(other.to_string())),
        }
    }
}
