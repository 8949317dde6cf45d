//! Identity and device queries for the `WearLink` relay.

use wearlink_core::db::unix_timestamp;

use super::db::{DatabaseError, RelayDatabase};
use super::models::{Device, Identity};

impl RelayDatabase {
    // =========================================================================
    // Identity queries
    // =========================================================================

    /// Create an identity on first external authentication, or refresh the
    /// profile of an existing one. The external provider id never changes.
    pub async fn upsert_identity(
        &self,
        id: &str,
        provider_id: &str,
        email: &str,
        display_name: &str,
    ) -> Result<Identity, DatabaseError> {
        let now = unix_timestamp();

        sqlx::query(
            "INSERT INTO identities (id, provider_id, email, display_name, created_at) VALUES (?, ?, ?, ?, ?)
             ON CONFLICT(provider_id) DO UPDATE SET email = excluded.email, display_name = excluded.display_name",
        )
        .bind(id)
        .bind(provider_id)
        .bind(email)
        .bind(display_name)
        .bind(now)
        .execute(self.pool())
        .await?;

        self.get_identity_by_provider(provider_id).await
    }

    /// Get an identity by ID.
    pub async fn get_identity(&self, id: &str) -> Result<Identity, DatabaseError> {
        sqlx::query_as::<_, Identity>("SELECT * FROM identities WHERE id = ?")
            .bind(id)
            .fetch_optional(self.pool())
            .await?
            .ok_or_else(|| DatabaseError::NotFound(format!("Identity {id}")))
    }

    /// Get an identity by its external provider id.
    pub async fn get_identity_by_provider(
        &self,
        provider_id: &str,
    ) -> Result<Identity, DatabaseError> {
        sqlx::query_as::<_, Identity>("SELECT * FROM identities WHERE provider_id = ?")
            .bind(provider_id)
            .fetch_optional(self.pool())
            .await?
            .ok_or_else(|| DatabaseError::NotFound(format!("Identity for provider {provider_id}")))
    }

    // =========================================================================
    // Device queries
    // =========================================================================

    /// Get a device, creating its record on first contact.
    ///
    /// An existing record only has `last_seen` refreshed (and `model` filled
    /// in if it was unknown).
    pub async fn get_or_create_device(
        &self,
        id: &str,
        model: Option<&str>,
    ) -> Result<Device, DatabaseError> {
        let now = unix_timestamp();

        sqlx::query(
            "INSERT INTO devices (id, model, last_seen, created_at) VALUES (?, ?, ?, ?)
             ON CONFLICT(id) DO UPDATE SET last_seen = excluded.last_seen,
                 model = COALESCE(devices.model, excluded.model)",
        )
        .bind(id)
        .bind(model)
        .bind(now)
        .bind(now)
        .execute(self.pool())
        .await?;

        self.get_device(id).await
    }

    /// Get a device by ID.
    pub async fn get_device(&self, id: &str) -> Result<Device, DatabaseError> {
        sqlx::query_as::<_, Device>("SELECT * FROM devices WHERE id = ?")
            .bind(id)
            .fetch_optional(self.pool())
            .await?
            .ok_or_else(|| DatabaseError::NotFound(format!("Device {id}")))
    }

    /// Resolve the identity that currently owns a device, if any.
    pub async fn get_device_owner(
        &self,
        device_id: &str,
    ) -> Result<Option<Identity>, DatabaseError> {
        let owner = sqlx::query_as::<_, Identity>(
            "SELECT i.* FROM identities i JOIN devices d ON d.owner_id = i.id WHERE d.id = ?",
        )
        .bind(device_id)
        .fetch_optional(self.pool())
        .await?;

        Ok(owner)
    }

    /// Remove a device's owner. Returns `false` if the device was not linked.
    pub async fn clear_device_owner(&self, device_id: &str) -> Result<bool, DatabaseError> {
        let result = sqlx::query(
            "UPDATE devices SET owner_id = NULL, linked_at = NULL WHERE id = ? AND owner_id IS NOT NULL",
        )
        .bind(device_id)
        .execute(self.pool())
        .await?;

        Ok(result.rows_affected() > 0)
    }

    /// Record a heartbeat answer: refreshes both `last_heartbeat` and `last_seen`.
    pub async fn touch_device_heartbeat(&self, id: &str) -> Result<(), DatabaseError> {
        let now = unix_timestamp();

        sqlx::query("UPDATE devices SET last_heartbeat = ?, last_seen = ? WHERE id = ?")
            .bind(now)
            .bind(now)
            .bind(id)
            .execute(self.pool())
            .await?;

        Ok(())
    }
}
