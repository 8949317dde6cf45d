//! Link token queries. Rows are keyed by token hash only.

use super::db::{DatabaseError, RelayDatabase};
use super::models::LinkToken;

impl RelayDatabase {
    /// Store a new pending link token.
    pub async fn create_link_token(
        &self,
        token_hash: &str,
        identity_id: &str,
        expires_at: i64,
        now: i64,
    ) -> Result<(), DatabaseError> {
        sqlx::query(
            "INSERT INTO link_tokens (token_hash, identity_id, expires_at, created_at) VALUES (?, ?, ?, ?)",
        )
        .bind(token_hash)
        .bind(identity_id)
        .bind(expires_at)
        .bind(now)
        .execute(self.pool())
        .await?;

        Ok(())
    }

    /// Look up a link token row by hash regardless of state.
    pub async fn get_link_token(
        &self,
        token_hash: &str,
    ) -> Result<Option<LinkToken>, DatabaseError> {
        let row = sqlx::query_as::<_, LinkToken>("SELECT * FROM link_tokens WHERE token_hash = ?")
            .bind(token_hash)
            .fetch_optional(self.pool())
            .await?;

        Ok(row)
    }

    /// Consume a pending token and bind `device_id` to its identity.
    ///
    /// Both writes share one transaction: the token is only spent if the
    /// device was bound. The state check and the token write are a single
    /// conditional statement, so concurrent redeemers cannot both succeed.
    /// Returns the identity id, or `None` if the token was already used,
    /// expired or unknown.
    pub async fn redeem_link_token(
        &self,
        token_hash: &str,
        device_id: &str,
        display_name: Option<&str>,
        now: i64,
    ) -> Result<Option<String>, DatabaseError> {
        let mut tx = self.pool().begin().await?;

        let consumed = sqlx::query(
            "UPDATE link_tokens SET used_at = ?, device_id = ?
             WHERE token_hash = ? AND used_at IS NULL AND expires_at > ?",
        )
        .bind(now)
        .bind(device_id)
        .bind(token_hash)
        .bind(now)
        .execute(&mut *tx)
        .await?;
        if consumed.rows_affected() != 1 {
            return Ok(None);
        }

        let identity_id: String =
            sqlx::query_scalar("SELECT identity_id FROM link_tokens WHERE token_hash = ?")
                .bind(token_hash)
                .fetch_one(&mut *tx)
                .await?;

        let bound = sqlx::query(
            "UPDATE devices SET owner_id = ?, linked_at = ?, display_name = COALESCE(?, display_name)
             WHERE id = ?",
        )
        .bind(&identity_id)
        .bind(now)
        .bind(display_name)
        .bind(device_id)
        .execute(&mut *tx)
        .await?;
        if bound.rows_affected() == 0 {
            // Dropping `tx` rolls the token write back.
            return Err(DatabaseError::NotFound(format!("Device {device_id}")));
        }

        tx.commit().await?;
        Ok(Some(identity_id))
    }

    /// Delete tokens that expired without ever being used.
    pub async fn delete_expired_link_tokens(&self, now: i64) -> Result<u64, DatabaseError> {
        let result =
            sqlx::query("DELETE FROM link_tokens WHERE expires_at <= ? AND used_at IS NULL")
                .bind(now)
                .execute(self.pool())
                .await?;

        Ok(result.rows_affected())
    }
}
