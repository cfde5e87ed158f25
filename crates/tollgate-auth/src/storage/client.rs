//! Client registry trait.

use async_trait::async_trait;

use crate::AuthResult;
use crate::oauth::ClientCredential;
use crate::types::{Client, hash_client_secret};

/// Registry of OAuth clients.
///
/// Only [`find_client`](Self::find_client) is required; the default
/// [`authenticate`](Self::authenticate) compares against the hashed secret
/// stored on the [`Client`].
///
/// # Example
///
/// ```ignore
/// use tollgate_auth::storage::ClientStore;
///
/// async fn example(store: &impl ClientStore) {
///     let client = store.find_client("my-app").await?;
/// }
/// ```
#[async_trait]
pub trait ClientStore: Send + Sync {
    /// Finds a client by its client ID, enabled or not.
    ///
    /// # Errors
    ///
    /// Returns an error if the storage operation fails.
    async fn find_client(&self, client_id: &str) -> AuthResult<Option<Client>>;

    /// Authenticates a client.
    ///
    /// # Returns
    ///
    /// `Some(client)` when the client exists, is enabled and the credential
    /// is acceptable; `None` otherwise. Clients that require a secret must
    /// present it; public clients may present nothing, but a presented
    /// secret must still match.
    ///
    /// # Errors
    ///
    /// Returns an error if the storage operation fails.
    async fn authenticate(
        &self,
        client_id: &str,
        credential: &ClientCredential,
    ) -> AuthResult<Option<Client>> {
        let Some(client) = self.find_client(client_id).await? else {
            return Ok(None);
        };
        if !client.enabled {
            return Ok(None);
        }

        let accepted = match (credential, client.client_secret.as_deref()) {
            (ClientCredential::Secret(secret), Some(stored)) => {
                hash_client_secret(secret) == stored
            }
            (ClientCredential::Secret(_), None) => false,
            (ClientCredential::None, _) => !client.require_client_secret,
        };

        Ok(accepted.then_some(client))
    }
}
