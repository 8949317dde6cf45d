//! SQLite storage for the `WearLink` relay.
//!
//! Provides persistence for identities, devices, encrypted OAuth credentials,
//! link tokens and registered third-party services. Device records are the
//! source of truth after a restart; live connection state is never stored.

mod db;
mod models;
mod queries;
mod queries_credentials;
mod queries_links;
mod queries_services;


pub use db::{DatabaseError, RelayDatabase};
pub use models::*;
pub use queries_credentials::CredentialParams;
pub use queries_services::ServiceParams;
