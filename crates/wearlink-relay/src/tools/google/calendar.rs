use std::fmt::Write;

use async_trait::async_trait;
use chrono::{DateTime, Duration, NaiveTime, Utc};
use serde_json::{Map, Value};

use super::client::GoogleClient;
use super::types::{Event, EventList};
use crate::tools::provider::{BuiltinProvider, ProviderError, int_arg};

const TODAY_MAX_RESULTS: i64 = 25;

#[derive(Debug, Clone)]
pub struct CalendarProvider {
    client: GoogleClient,
}

impl CalendarProvider {
    pub const fn new(client: GoogleClient) -> Self {
        Self { client }
    }

    async fn events(
        &self,
        from: DateTime<Utc>,
        until: DateTime<Utc>,
        max_results: i64,
        token: &str,
    ) -> Result<Vec<Event>, ProviderError> {
        let list: EventList = self
            .client
            .get_json(
                &self.client.calendar_url("/calendars/primary/events"),
                &[
                    ("timeMin", from.to_rfc3339()),
                    ("timeMax", until.to_rfc3339()),
                    ("singleEvents", "true".to_string()),
                    ("orderBy", "startTime".to_string()),
                    ("maxResults", max_results.to_string()),
                ],
                token,
            )
            .await?;
        Ok(list.items)
    }
}

fn end_of_day(now: DateTime<Utc>) -> DateTime<Utc> {
    now.date_naive()
        .succ_opt()
        .map_or(now + Duration::days(1), |d| d.and_time(NaiveTime::MIN).and_utc())
}

fn start_label(event: &Event) -> String {
    let Some(start) = &event.start else {
        return "?".to_string();
    };
    if let Some(dt) = start
        .date_time
        .as_deref()
        .and_then(|s| DateTime::parse_from_rfc3339(s).ok())
    {
        return dt.format("%a %b %-d %H:%M").to_string();
    }
    start
        .date
        .as_deref()
        .map_or_else(|| "?".to_string(), |d| format!("{d} (all day)"))
}

fn render(heading: &str, events: &[Event]) -> String {
    let mut out = String::from(heading);
    for event in events {
        let _ = write!(
            out,
            "\n- {} {}",
            start_label(event),
            event.summary.as_deref().unwrap_or("(no title)")
        );
        if let Some(location) = event.location.as_deref().filter(|l| !l.is_empty()) {
            let _ = write!(out, " @ {location}");
        }
    }
    out
}

#[async_trait]
impl BuiltinProvider for CalendarProvider {
    async fn invoke(
        &self,
        action: &str,
        args: &Map<String, Value>,
        access_token: &str,
    ) -> Result<String, ProviderError> {
        let now = Utc::now();
        match action {
            "get_today" => {
                let events = self
                    .events(now, end_of_day(now), TODAY_MAX_RESULTS, access_token)
                    .await?;
                Ok(if events.is_empty() {
                    "Nothing else on your calendar today.".to_string()
                } else {
                    render(&format!("You have {} event(s) today:", events.len()), &events)
                })
            }
            "list_events" => {
                let days = int_arg(args, "days", 7);
                let max_results = int_arg(args, "maxResults", 10);
                let events = self
                    .events(now, now + Duration::days(days), max_results, access_token)
                    .await?;
                Ok(if events.is_empty() {
                    format!("No events in the next {days} day(s).")
                } else {
                    render(
                        &format!("You have {} event(s) in the next {days} day(s):", events.len()),
                        &events,
                    )
                })
            }
            other => Err(ProviderError::UnsupportedAction(other.to_string())),
        }
    }
}
