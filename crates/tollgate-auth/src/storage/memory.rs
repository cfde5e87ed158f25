//! In-memory implementations of the storage traits.
//!
//! Suitable for tests, single-process deployments and the CLI. Grants are
//! lost on restart.

use async_trait::async_trait;
use dashmap::DashMap;
use dashmap::mapref::entry::Entry;
use serde::{Deserialize, Serialize};
use time::OffsetDateTime;

use crate::claims::{Claim, Principal, claim_types};
use crate::password::verify_password;
use crate::storage::{ClientStore, PersistedGrantStore, ResourceOwnerValidator};
use crate::types::{Client, PersistedGrant};
use crate::{AuthError, AuthResult};

// =============================================================================
// Grants
// =============================================================================

/// Grant store backed by a concurrent hash map.
///
/// Per-key mutations happen under the map's shard lock, which makes
/// [`consume`](PersistedGrantStore::consume) a compare-and-set.
#[derive(Debug, Default)]
pub struct InMemoryGrantStore {
    grants: DashMap<String, PersistedGrant>,
}

impl InMemoryGrantStore {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of stored grants, including expired and consumed ones.
    #[must_use]
    pub fn len(&self) -> usize {
        self.grants.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.grants.is_empty()
    }

    fn retain_counting(&self, mut keep: impl FnMut(&PersistedGrant) -> bool) -> u64 {
        let mut removed = 0u64;
        self.grants.retain(|_, grant| {
            let kept = keep(grant);
            if !kept {
                removed += 1;
            }
            kept
        });
        removed
    }
}

#[async_trait]
impl PersistedGrantStore for InMemoryGrantStore {
    async fn create(&self, grant: &PersistedGrant) -> AuthResult<String> {
        match self.grants.entry(grant.key.clone()) {
            Entry::Occupied(_) => Err(AuthError::storage("duplicate persisted grant key")),
            Entry::Vacant(slot) => {
                slot.insert(grant.clone());
                Ok(grant.key.clone())
            }
        }
    }

    async fn get(&self, key: &str) -> AuthResult<Option<PersistedGrant>> {
        Ok(self.grants.get(key).map(|g| g.value().clone()))
    }

    async fn consume(&self, key: &str, at: OffsetDateTime) -> AuthResult<bool> {
        let Some(mut grant) = self.grants.get_mut(key) else {
            return Ok(false);
        };
        if grant.consumed_time.is_some() {
            return Ok(false);
        }
        grant.consumed_time = Some(at);
        Ok(true)
    }

    async fn rotate(
        &self,
        old_key: &str,
        at: OffsetDateTime,
        replacement: &PersistedGrant,
    ) -> AuthResult<bool> {
        // Fail before touching the old grant so a key clash cannot strand it consumed.
        if self.grants.contains_key(&replacement.key) {
            return Err(AuthError::storage("duplicate persisted grant key"));
        }
        if !self.consume(old_key, at).await? {
            return Ok(false);
        }
        self.grants
            .insert(replacement.key.clone(), replacement.clone());
        Ok(true)
    }

    async fn slide(&self, key: &str, expiration: OffsetDateTime) -> AuthResult<bool> {
        let Some(mut grant) = self.grants.get_mut(key) else {
            return Ok(false);
        };
        if grant.consumed_time.is_some() {
            return Ok(false);
        }
        grant.expiration = expiration;
        Ok(true)
    }

    async fn remove(&self, key: &str) -> AuthResult<()> {
        self.grants.remove(key);
        Ok(())
    }

    async fn remove_all(&self, subject_id: &str, client_id: &str) -> AuthResult<u64> {
        Ok(self.retain_counting(|g| {
            !(g.client_id == client_id && g.subject_id.as_deref() == Some(subject_id))
        }))
    }

    async fn remove_expired(&self, now: OffsetDateTime) -> AuthResult<u64> {
        Ok(self.retain_counting(|g| !g.is_expired(now)))
    }
}

// =============================================================================
// Clients
// =============================================================================

/// Fixed client registry.
#[derive(Debug, Default)]
pub struct InMemoryClientStore {
    clients: DashMap<String, Client>,
}

impl InMemoryClientStore {
    pub fn new(clients: impl IntoIterator<Item = Client>) -> Self {
        Self {
            clients: clients
                .into_iter()
                .map(|c| (c.client_id.clone(), c))
                .collect(),
        }
    }

    /// Registers or replaces a client.
    pub fn insert(&self, client: Client) {
        self.clients.insert(client.client_id.clone(), client);
    }
}

#[async_trait]
impl ClientStore for InMemoryClientStore {
    async fn find_client(&self, client_id: &str) -> AuthResult<Option<Client>> {
        Ok(self.clients.get(client_id).map(|c| c.value().clone()))
    }
}

// =============================================================================
// Users
// =============================================================================

/// Resource owner record for [`InMemoryUserStore`].
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InMemoryUser {
    /// Stable subject identifier (`sub`).
    pub subject_id: String,
    pub username: String,
    /// Argon2 PHC hash, see [`crate::password::hash_password`].
    pub password_hash: String,
    /// Additional identity claims (name, email, role, ...).
    #[serde(default)]
    pub claims: Vec<Claim>,
}

/// Resource owner validator over a fixed user list.
#[derive(Debug, Default)]
pub struct InMemoryUserStore {
    users: DashMap<String, InMemoryUser>,
}

impl InMemoryUserStore {
    pub fn new(users: impl IntoIterator<Item = InMemoryUser>) -> Self {
        Self {
            users: users
                .into_iter()
                .map(|u| (u.username.clone(), u))
                .collect(),
        }
    }
}

#[async_trait]
impl ResourceOwnerValidator for InMemoryUserStore {
    async fn validate(&self, username: &str, password: &str) -> AuthResult<Option<Principal>> {
        let Some(user) = self.users.get(username).map(|u| u.value().clone()) else {
            return Ok(None);
        };

        let valid = verify_password(password, &user.password_hash)
            .map_err(|e| AuthError::internal(format!("stored password hash unreadable: {e}")))?;
        if !valid {
            return Ok(None);
        }

        let principal = Principal::new("password", vec![Claim::new(claim_types::SUBJECT, user.subject_id)])
            .with_claims(user.claims);
        Ok(Some(principal))
    }
}
