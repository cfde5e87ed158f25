//! Grant validators.
//!
//! Each grant type is handled by one [`GrantValidator`]. Built-in validators
//! cover `client_credentials`, `password`, `refresh_token` and
//! `authorization_code`; callers add extension grants through
//! [`GrantRegistry::register_extension`].
//!
//! The [`GrantRegistry`] is assembled once at startup and only read
//! afterwards.

pub mod authorization_code;
pub mod client_credentials;
pub mod password;
pub mod refresh_token;

use std::collections::{BTreeSet, HashMap};
use std::sync::Arc;

use async_trait::async_trait;
use time::OffsetDateTime;

use crate::clock::Clock;
use crate::oauth::{GrantValidationOutcome, TokenRequest};
use crate::types::Client;

pub use authorization_code::{AuthorizationCodeGrantValidator, AuthorizationCodeRequest};
pub use client_credentials::ClientCredentialsGrantValidator;
pub use password::PasswordGrantValidator;
pub use refresh_token::RefreshTokenGrantValidator;

/// Input handed to a grant validator after client authentication.
pub struct GrantContext<'a> {
    /// The raw request.
    pub request: &'a TokenRequest,
    /// The authenticated client.
    pub client: &'a Client,
    /// Requested scopes after defaulting to the client's allowed scopes.
    /// Already checked against the client registration.
    pub scopes: BTreeSet<String>,
    pub(crate) clock: &'a dyn Clock,
}

impl GrantContext<'_> {
    #[must_use]
    pub fn now(&self) -> OffsetDateTime {
        self.clock.now()
    }
}

/// Validates requests of one grant type.
///
/// Validators report every problem as a
/// [`GrantValidationOutcome::Failure`]; they do not return errors.
#[async_trait]
pub trait GrantValidator: Send + Sync {
    /// The `grant_type` value this validator handles.
    fn grant_type(&self) -> &str;

    /// Validates the request.
    async fn validate(&self, ctx: &GrantContext<'_>) -> GrantValidationOutcome;
}

/// Grant type → validator table.
#[derive(Clone, Default)]
pub struct GrantRegistry {
    built_in: HashMap<String, Arc<dyn GrantValidator>>,
    extensions: HashMap<String, Arc<dyn GrantValidator>>,
}

impl GrantRegistry {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a built-in validator.
    pub fn register_built_in(&mut self, validator: Arc<dyn GrantValidator>) {
        self.built_in
            .insert(validator.grant_type().to_string(), validator);
    }

    /// Registers an extension validator. It wins over a built-in validator
    /// for the same grant type.
    pub fn register_extension(&mut self, validator: Arc<dyn GrantValidator>) {
        let grant_type = validator.grant_type().to_string();
        if self.built_in.contains_key(&grant_type) {
            tracing::info!(grant_type = %grant_type, "Extension grant overrides built-in validator");
        }
        self.extensions.insert(grant_type, validator);
    }

    /// Finds the validator for a grant type, extensions first.
    #[must_use]
    pub fn lookup(&self, grant_type: &str) -> Option<&Arc<dyn GrantValidator>> {
        self.extensions
            .get(grant_type)
            .or_else(|| self.built_in.get(grant_type))
    }

    /// All registered grant types, sorted.
    #[must_use]
    pub fn grant_types(&self) -> Vec<&str> {
        let mut types: Vec<&str> = self
            .built_in
            .keys()
            .chain(self.extensions.keys())
            .map(String::as_str)
            .collect();
        types.sort_unstable();
        types.dedup();
        types
    }
}

impl std::fmt::Debug for GrantRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GrantRegistry")
            .field("grant_types", &self.grant_types())
            .finish()
    }
}
