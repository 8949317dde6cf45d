//! Per-identity token cache in front of the credential table.
//!
//! A token is handed out only while `expires_at - now` exceeds the refresh
//! buffer. Past that, callers for the same identity share one refresh: the
//! first caller spawns it and records it in the in-flight map, later callers
//! await the recorded future. The spawned task removes its own entry when it
//! settles, so the next stale read starts a new attempt.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use futures::FutureExt;
use futures::future::{BoxFuture, Shared};
use tracing::{debug, info, instrument, warn};
use wearlink_core::db::unix_timestamp;
use wearlink_crypto::FieldCipher;

use super::refresher::TokenRefresher;
use super::{AccessToken, CredentialError, OAuthTokens};
use crate::storage::{CredentialParams, RelayDatabase};

type RefreshFuture = Shared<BoxFuture<'static, Result<AccessToken, CredentialError>>>;

struct InFlight {
    generation: u64,
    future: RefreshFuture,
}

struct Inner {
    db: RelayDatabase,
    cipher: FieldCipher,
    refresher: Arc<dyn TokenRefresher>,
    buffer_secs: i64,
    in_flight: Mutex<HashMap<String, InFlight>>,
    generation: AtomicU64,
}

/// Cheap to clone; clones share the in-flight map.
#[derive(Clone)]
pub struct CredentialCoordinator {
    inner: Arc<Inner>,
}

impl CredentialCoordinator {
    pub fn new(
        db: RelayDatabase,
        cipher: FieldCipher,
        refresher: Arc<dyn TokenRefresher>,
        refresh_buffer: Duration,
    ) -> Self {
        Self {
            inner: Arc::new(Inner {
                db,
                cipher,
                refresher,
                buffer_secs: i64::try_from(refresh_buffer.as_secs()).unwrap_or(i64::MAX),
                in_flight: Mutex::new(HashMap::new()),
                generation: AtomicU64::new(0),
            }),
        }
    }

    /// Encrypt and store the credential for `identity_id`, replacing any
    /// previous one.
    #[instrument(skip(self, tokens))]
    pub async fn store_credential(
        &self,
        identity_id: &str,
        tokens: &OAuthTokens,
    ) -> Result<(), CredentialError> {
        let cipher = &self.inner.cipher;
        let access = cipher.encrypt(&tokens.access_token)?;
        let refresh = tokens
            .refresh_token
            .as_deref()
            .map(|t| cipher.encrypt(t))
            .transpose()?;

        self.inner
            .db
            .upsert_credential(&CredentialParams {
                identity_id,
                access_token: &access,
                refresh_token: refresh.as_deref(),
                scope: &tokens.scope,
                expires_at: tokens.expires_at,
            })
            .await?;
        info!("Stored OAuth credential");
        Ok(())
    }

    /// A usable access token for `identity_id`, refreshing first when the
    /// stored one is inside the buffer. `Ok(None)` when nothing is stored.
    #[instrument(skip(self))]
    pub async fn get_valid_token(
        &self,
        identity_id: &str,
    ) -> Result<Option<AccessToken>, CredentialError> {
        let Some(row) = self.inner.db.get_credential(identity_id).await? else {
            return Ok(None);
        };
        if self.inner.is_fresh(row.expires_at, unix_timestamp()) {
            let token = self.inner.cipher.decrypt(&row.access_token)?;
            return Ok(Some(AccessToken::new(token, row.expires_at)));
        }

        debug!("Access token inside refresh buffer");
        self.shared_refresh(identity_id).await.map(Some)
    }

    /// Number of refreshes currently running.
    pub fn in_flight(&self) -> usize {
        self.inner.lock_in_flight().len()
    }

    fn shared_refresh(&self, identity_id: &str) -> RefreshFuture {
        let mut in_flight = self.inner.lock_in_flight();
        if let Some(existing) = in_flight.get(identity_id) {
            debug!("Joining in-flight refresh");
            return existing.future.clone();
        }

        let generation = self.inner.generation.fetch_add(1, Ordering::Relaxed);
        let inner = Arc::clone(&self.inner);
        let id = identity_id.to_string();
        let handle = tokio::spawn(async move {
            let result = inner.refresh(&id).await;
            inner.settle(&id, generation);
            result
        });

        let future = async move {
            handle
                .await
                .unwrap_or_else(|e| Err(CredentialError::Aborted(e.to_string())))
        }
        .boxed()
        .shared();

        in_flight.insert(
            identity_id.to_string(),
            InFlight {
                generation,
                future: future.clone(),
            },
        );
        future
    }
}

impl Inner {
    const fn is_fresh(&self, expires_at: i64, now: i64) -> bool {
        expires_at.saturating_sub(now) > self.buffer_secs
    }

    fn lock_in_flight(&self) -> MutexGuard<'_, HashMap<String, InFlight>> {
        self.in_flight.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Drop the in-flight entry, unless a newer attempt already replaced it.
    fn settle(&self, identity_id: &str, generation: u64) {
        let mut in_flight = self.lock_in_flight();
        if in_flight
            .get(identity_id)
            .is_some_and(|entry| entry.generation == generation)
        {
            in_flight.remove(identity_id);
        }
    }

    async fn refresh(&self, identity_id: &str) -> Result<AccessToken, CredentialError> {
        let row = self
            .db
            .get_credential(identity_id)
            .await?
            .ok_or(CredentialError::Missing)?;

        // A refresh that settled just before this one may already have
        // written a fresh token.
        if self.is_fresh(row.expires_at, unix_timestamp()) {
            let token = self.cipher.decrypt(&row.access_token)?;
            return Ok(AccessToken::new(token, row.expires_at));
        }

        let sealed_refresh = row.refresh_token.ok_or(CredentialError::NoRefreshToken)?;
        let refresh_token = self.cipher.decrypt(&sealed_refresh)?;

        let tokens = self.refresher.refresh(&refresh_token).await.map_err(|e| {
            warn!(identity_id = %identity_id, error = %e, "OAuth refresh failed");
            e
        })?;

        let expires_at = unix_timestamp().saturating_add(tokens.expires_in);
        let sealed_access = self.cipher.encrypt(&tokens.access_token)?;
        let sealed_new_refresh = tokens
            .refresh_token
            .as_deref()
            .map(|t| self.cipher.encrypt(t))
            .transpose()?;

        self.db
            .update_refreshed_credential(
                identity_id,
                &sealed_access,
                sealed_new_refresh.as_deref(),
                expires_at,
            )
            .await?;

        info!(
            identity_id = %identity_id,
            rotated = sealed_new_refresh.is_some(),
            "Refreshed OAuth credential"
        );
        Ok(AccessToken::new(tokens.access_token, expires_at))
    }
}
