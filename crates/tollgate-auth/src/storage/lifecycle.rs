//! Clock-aware access to persisted grants.
//!
//! Stores return whatever they hold; [`PersistedGrants`] applies the
//! lifecycle rules on top:
//!
//! - an expired grant reads exactly like a missing one (and is removed on access)
//! - handles are hashed before they reach the store
//!
//! Expired grants that are never read again are removed by the background
//! sweeper started with [`spawn_expiry_sweeper`].

use std::sync::Arc;
use std::time::Duration;

use time::OffsetDateTime;
use tokio::task::JoinHandle;

use crate::AuthResult;
use crate::clock::Clock;
use crate::storage::PersistedGrantStore;
use crate::types::{GrantData, PersistedGrant, PersistedGrantType};

/// Grant store plus the clock used to judge expiry.
#[derive(Clone)]
pub struct PersistedGrants {
    store: Arc<dyn PersistedGrantStore>,
    clock: Arc<dyn Clock>,
}

impl PersistedGrants {
    pub fn new(store: Arc<dyn PersistedGrantStore>, clock: Arc<dyn Clock>) -> Self {
        Self { store, clock }
    }

    /// The underlying store.
    #[must_use]
    pub fn store(&self) -> &Arc<dyn PersistedGrantStore> {
        &self.store
    }

    #[must_use]
    pub fn now(&self) -> OffsetDateTime {
        self.clock.now()
    }

    /// Looks up a live grant by the handle given to the client.
    ///
    /// Missing, expired and wrong-type grants all return `None`. Consumed
    /// grants are returned so the caller can detect replay.
    ///
    /// # Errors
    ///
    /// Returns an error if the storage operation fails.
    pub async fn find(
        &self,
        handle: &str,
        grant_type: PersistedGrantType,
    ) -> AuthResult<Option<PersistedGrant>> {
        let key = PersistedGrant::key_for(handle, grant_type);
        let Some(grant) = self.store.get(&key).await? else {
            return Ok(None);
        };

        if grant.grant_type != grant_type {
            return Ok(None);
        }

        if grant.is_expired(self.clock.now()) {
            tracing::debug!(grant_type = %grant_type, "Removing expired grant on access");
            self.store.remove(&key).await?;
            return Ok(None);
        }

        Ok(Some(grant))
    }

    /// Creates a new grant and returns the handle for the client.
    ///
    /// # Errors
    ///
    /// Returns an error if the data cannot be serialized or stored.
    pub async fn issue(
        &self,
        grant_type: PersistedGrantType,
        client_id: &str,
        data: &GrantData,
        lifetime: time::Duration,
    ) -> AuthResult<String> {
        let now = self.clock.now();
        let handle = PersistedGrant::generate_handle();
        let grant = PersistedGrant::new(&handle, grant_type, client_id, data, now, now + lifetime)
            .map_err(|e| crate::AuthError::internal(e.to_string()))?;
        self.store.create(&grant).await?;
        Ok(handle)
    }

    /// Removes the grant behind a handle. Unknown handles are ignored.
    ///
    /// # Errors
    ///
    /// Returns an error if the storage operation fails.
    pub async fn remove(&self, handle: &str, grant_type: PersistedGrantType) -> AuthResult<()> {
        self.store
            .remove(&PersistedGrant::key_for(handle, grant_type))
            .await
    }
}

/// Periodically removes expired grants from `store`.
///
/// The first sweep runs immediately. Errors are logged and the loop keeps
/// going; abort the returned handle to stop it.
pub fn spawn_expiry_sweeper(
    store: Arc<dyn PersistedGrantStore>,
    clock: Arc<dyn Clock>,
    interval: Duration,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(interval);
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
        loop {
            ticker.tick().await;
            match store.remove_expired(clock.now()).await {
                Ok(0) => {}
                Ok(removed) => tracing::info!(removed, "Swept expired persisted grants"),
                Err(e) => tracing::warn!(error = %e, "Expired grant sweep failed"),
            }
        }
    })
}
