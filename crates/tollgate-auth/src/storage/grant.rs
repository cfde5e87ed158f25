//! Persisted grant storage trait.
//!
//! This is the only shared mutable state of the token pipeline. Stores only
//! ever see hashed keys (see [`PersistedGrant::key_for`]).
//!
//! # Concurrency
//!
//! Operations on different keys are unordered. For a single key,
//! implementations must provide read-your-writes and an atomic
//! [`consume`](PersistedGrantStore::consume): when several callers race to
//! consume the same grant, exactly one of them observes `true`.

use async_trait::async_trait;
use time::OffsetDateTime;

use crate::AuthResult;
use crate::types::PersistedGrant;

/// Storage trait for persisted grants.
///
/// Stores are not clock-aware: [`get`](Self::get) returns expired grants.
/// Use [`PersistedGrants`](crate::storage::PersistedGrants) for lookups that
/// treat expired grants as missing.
///
/// # Implementations
///
/// - [`InMemoryGrantStore`](crate::storage::InMemoryGrantStore)
/// - `tollgate-auth-postgres` - PostgreSQL storage backend
#[async_trait]
pub trait PersistedGrantStore: Send + Sync {
    /// Stores a new grant and returns its key.
    ///
    /// # Errors
    ///
    /// Returns an error if a grant with the same key exists or the storage
    /// is unavailable.
    async fn create(&self, grant: &PersistedGrant) -> AuthResult<String>;

    /// Finds a grant by key, regardless of expiration or consumption.
    ///
    /// # Errors
    ///
    /// Returns an error if the storage operation fails.
    async fn get(&self, key: &str) -> AuthResult<Option<PersistedGrant>>;

    /// Marks a grant consumed at `at`.
    ///
    /// # Returns
    ///
    /// `true` if this call moved the grant from unconsumed to consumed,
    /// `false` if it was already consumed or does not exist.
    ///
    /// # Errors
    ///
    /// Returns an error if the storage operation fails.
    async fn consume(&self, key: &str, at: OffsetDateTime) -> AuthResult<bool>;

    /// Consumes `old_key` and stores `replacement` as one logical operation.
    ///
    /// Returns `false` without creating anything when the old grant was
    /// already consumed or missing. The default implementation is only
    /// safe for stores whose `create` cannot fail after a successful
    /// `consume`; transactional stores should override it.
    ///
    /// # Errors
    ///
    /// Returns an error if the storage operation fails.
    async fn rotate(
        &self,
        old_key: &str,
        at: OffsetDateTime,
        replacement: &PersistedGrant,
    ) -> AuthResult<bool> {
        if !self.consume(old_key, at).await? {
            return Ok(false);
        }
        self.create(replacement).await?;
        Ok(true)
    }

    /// Moves the expiration of an unconsumed grant.
    ///
    /// # Returns
    ///
    /// `true` if the grant exists, is unconsumed and was updated.
    ///
    /// # Errors
    ///
    /// Returns an error if the storage operation fails.
    async fn slide(&self, key: &str, expiration: OffsetDateTime) -> AuthResult<bool>;

    /// Deletes a grant. Deleting a missing key is not an error.
    ///
    /// # Errors
    ///
    /// Returns an error if the storage operation fails.
    async fn remove(&self, key: &str) -> AuthResult<()>;

    /// Deletes every grant for a subject/client pair.
    ///
    /// Used for replay detection: when a consumed one-time grant is
    /// presented again, the whole family is revoked.
    ///
    /// # Returns
    ///
    /// The number of grants removed.
    ///
    /// # Errors
    ///
    /// Returns an error if the storage operation fails.
    async fn remove_all(&self, subject_id: &str, client_id: &str) -> AuthResult<u64>;

    /// Deletes every grant whose expiration is at or before `now`.
    ///
    /// # Returns
    ///
    /// The number of grants removed.
    ///
    /// # Errors
    ///
    /// Returns an error if the storage operation fails.
    async fn remove_expired(&self, now: OffsetDateTime) -> AuthResult<u64>;
}
