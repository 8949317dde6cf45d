//! OAuth credential queries. Callers pass ciphertext; this layer never sees
//! plaintext tokens.

use wearlink_core::db::unix_timestamp;

use super::db::{DatabaseError, RelayDatabase};
use super::models::StoredCredential;

/// Parameters for writing a credential row.
pub struct CredentialParams<'a> {
    pub identity_id: &'a str,
    pub access_token: &'a str,
    pub refresh_token: Option<&'a str>,
    pub scope: &'a str,
    pub expires_at: i64,
}

impl RelayDatabase {
    /// Insert or replace the single credential row for an identity.
    pub async fn upsert_credential(
        &self,
        params: &CredentialParams<'_>,
    ) -> Result<(), DatabaseError> {
        let now = unix_timestamp();

        sqlx::query(
            "INSERT INTO oauth_credentials (identity_id, access_token, refresh_token, scope, expires_at, updated_at)
             VALUES (?, ?, ?, ?, ?, ?)
             ON CONFLICT(identity_id) DO UPDATE SET access_token = excluded.access_token,
                 refresh_token = excluded.refresh_token, scope = excluded.scope,
                 expires_at = excluded.expires_at, updated_at = excluded.updated_at",
        )
        .bind(params.identity_id)
        .bind(params.access_token)
        .bind(params.refresh_token)
        .bind(params.scope)
        .bind(params.expires_at)
        .bind(now)
        .execute(self.pool())
        .await?;

        Ok(())
    }

    /// Get the credential row for an identity, if one exists.
    pub async fn get_credential(
        &self,
        identity_id: &str,
    ) -> Result<Option<StoredCredential>, DatabaseError> {
        let row = sqlx::query_as::<_, StoredCredential>(
            "SELECT * FROM oauth_credentials WHERE identity_id = ?",
        )
        .bind(identity_id)
        .fetch_optional(self.pool())
        .await?;

        Ok(row)
    }

    /// Persist a refresh outcome in place.
    ///
    /// The stored refresh token is kept when `refresh_token` is `None`.
    pub async fn update_refreshed_credential(
        &self,
        identity_id: &str,
        access_token: &str,
        refresh_token: Option<&str>,
        expires_at: i64,
    ) -> Result<(), DatabaseError> {
        let now = unix_timestamp();

        let result = sqlx::query(
            "UPDATE oauth_credentials SET access_token = ?, refresh_token = COALESCE(?, refresh_token),
                 expires_at = ?, updated_at = ?
             WHERE identity_id = ?",
        )
        .bind(access_token)
        .bind(refresh_token)
        .bind(expires_at)
        .bind(now)
        .bind(identity_id)
        .execute(self.pool())
        .await?;

        if result.rows_affected() == 0 {
            return Err(DatabaseError::NotFound(format!(
                "Credential for identity {identity_id}"
            )));
        }
        Ok(())
    }

    /// Delete an identity's credential. Returns whether a row was removed.
    pub async fn delete_credential(&self, identity_id: &str) -> Result<bool, DatabaseError> {
        let result = sqlx::query("DELETE FROM oauth_credentials WHERE identity_id = ?")
            .bind(identity_id)
            .execute(self.pool())
            .await?;

        Ok(result.rows_affected() > 0)
    }
}
