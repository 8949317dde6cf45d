//! SQLite database for the `WearLink` relay.

pub use wearlink_core::db::DatabaseError;

wearlink_core::define_database!(RelayDatabase, "Relay database migrations complete");
