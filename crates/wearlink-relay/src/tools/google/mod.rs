//! Gmail and Google Calendar adapters.
//!
//! Both share one [`GoogleClient`] and the identity's Google OAuth token.
//! Output is a compact line-per-item rendering.

mod calendar;
mod client;
mod gmail;
mod types;

#[cfg(test)]
mod tests;

pub use calendar::CalendarProvider;
pub use client::{GoogleClient, GoogleEndpoints};
pub use gmail::GmailProvider;
