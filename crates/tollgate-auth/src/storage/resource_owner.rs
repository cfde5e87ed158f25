//! Resource owner credential validation.

use async_trait::async_trait;

use crate::AuthResult;
use crate::claims::Principal;

/// Verifies resource owner credentials for the password grant.
#[async_trait]
pub trait ResourceOwnerValidator: Send + Sync {
    /// Checks `username`/`password`.
    ///
    /// # Returns
    ///
    /// The owner's principal (at least a `sub` claim) on success, `None` for
    /// unknown users or wrong passwords. Both cases must look the same.
    ///
    /// # Errors
    ///
    /// Returns an error only if the backing user store fails.
    async fn validate(&self, username: &str, password: &str) -> AuthResult<Option<Principal>>;
}
