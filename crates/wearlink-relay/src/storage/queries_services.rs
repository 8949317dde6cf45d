//! Registered third-party service queries.

use wearlink_core::db::unix_timestamp;

use super::db::{DatabaseError, RelayDatabase};
use super::models::Service;

/// Parameters for registering a service. `api_key` must already be sealed.
pub struct ServiceParams<'a> {
    pub id: &'a str,
    pub owner_id: &'a str,
    pub name: &'a str,
    pub endpoint: &'a str,
    pub api_key: Option<&'a str>,
}

impl RelayDatabase {
    /// Register a third-party service for an identity.
    pub async fn create_service(&self, params: &ServiceParams<'_>) -> Result<Service, DatabaseError> {
        let now = unix_timestamp();

        sqlx::query(
            "INSERT INTO services (id, owner_id, name, endpoint, api_key, created_at) VALUES (?, ?, ?, ?, ?, ?)",
        )
        .bind(params.id)
        .bind(params.owner_id)
        .bind(params.name)
        .bind(params.endpoint)
        .bind(params.api_key)
        .bind(now)
        .execute(self.pool())
        .await?;

        self.get_service(params.id)
            .await?
            .ok_or_else(|| DatabaseError::NotFound(format!("Service {}", params.id)))
    }

    /// Get a service by ID.
    pub async fn get_service(&self, id: &str) -> Result<Option<Service>, DatabaseError> {
        let row = sqlx::query_as::<_, Service>("SELECT * FROM services WHERE id = ?")
            .bind(id)
            .fetch_optional(self.pool())
            .await?;

        Ok(row)
    }

    /// List services owned by an identity, oldest first.
    pub async fn list_services(&self, owner_id: &str) -> Result<Vec<Service>, DatabaseError> {
        let rows = sqlx::query_as::<_, Service>(
            "SELECT * FROM services WHERE owner_id = ? ORDER BY created_at ASC, id ASC",
        )
        .bind(owner_id)
        .fetch_all(self.pool())
        .await?;

        Ok(rows)
    }

    /// Remove a service. Returns whether a row was removed.
    pub async fn remove_service(&self, id: &str) -> Result<bool, DatabaseError> {
        let result = sqlx::query("DELETE FROM services WHERE id = ?")
            .bind(id)
            .execute(self.pool())
            .await?;

        Ok(result.rows_affected() > 0)
    }
}
