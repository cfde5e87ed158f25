//! Grant validation outcomes.

use std::collections::BTreeSet;

use serde_json::{Map, Value};

use crate::claims::Principal;
use crate::grants::GrantContext;
use crate::oauth::token::TokenErrorCode;
use crate::types::{Client, PersistedGrant};

/// Result of validating a token request.
#[derive(Debug, Clone)]
pub enum GrantValidationOutcome {
    Success(ValidatedGrant),
    Failure(GrantFailure),
}

impl GrantValidationOutcome {
    /// Shorthand for a failure without description.
    #[must_use]
    pub fn failure(error: TokenErrorCode) -> Self {
        Self::Failure(GrantFailure::new(error))
    }

    #[must_use]
    pub fn is_success(&self) -> bool {
        matches!(self, Self::Success(_))
    }

    /// The custom response payload of either variant.
    #[must_use]
    pub fn custom_response(&self) -> Option<&Map<String, Value>> {
        match self {
            Self::Success(grant) => grant.custom_response.as_ref(),
            Self::Failure(failure) => failure.custom_response.as_ref(),
        }
    }
}

impl From<GrantFailure> for GrantValidationOutcome {
    fn from(failure: GrantFailure) -> Self {
        Self::Failure(failure)
    }
}

/// A request that passed validation.
#[derive(Debug, Clone)]
pub struct ValidatedGrant {
    /// Grant type that produced this outcome.
    pub grant_type: String,

    /// Authenticated client.
    pub client: Client,

    /// Subject of the tokens. Carries no `sub` for client-only grants.
    pub subject: Principal,

    /// Scopes the tokens will carry.
    pub granted_scopes: BTreeSet<String>,

    /// Extra response fields supplied by the validator.
    pub custom_response: Option<Map<String, Value>>,

    /// OpenID Connect nonce to echo into the identity token.
    pub nonce: Option<String>,

    /// Refresh token being redeemed (refresh_token grant only).
    pub(crate) refresh: Option<RefreshSource>,
}

/// The persisted grant behind a redeemed refresh token.
#[derive(Debug, Clone)]
pub(crate) struct RefreshSource {
    pub(crate) handle: String,
    pub(crate) grant: PersistedGrant,
}

impl ValidatedGrant {
    /// Success for `subject` with the scopes requested in `ctx`.
    #[must_use]
    pub fn new(ctx: &GrantContext<'_>, subject: Principal) -> Self {
        Self {
            grant_type: ctx.request.grant_type.clone(),
            client: ctx.client.clone(),
            subject,
            granted_scopes: ctx.scopes.clone(),
            custom_response: None,
            nonce: None,
            refresh: None,
        }
    }

    /// Replaces the granted scopes.
    #[must_use]
    pub fn with_scopes(mut self, scopes: BTreeSet<String>) -> Self {
        self.granted_scopes = scopes;
        self
    }

    /// Attaches custom response fields.
    #[must_use]
    pub fn with_custom_response(mut self, fields: Map<String, Value>) -> Self {
        self.custom_response = Some(fields);
        self
    }

    #[must_use]
    pub fn with_nonce(mut self, nonce: Option<String>) -> Self {
        self.nonce = nonce;
        self
    }

    #[must_use]
    pub(crate) fn with_refresh(mut self, handle: String, grant: PersistedGrant) -> Self {
        self.refresh = Some(RefreshSource { handle, grant });
        self
    }

    /// Returns `true` if the scope was granted.
    #[must_use]
    pub fn has_scope(&self, scope: &str) -> bool {
        self.granted_scopes.contains(scope)
    }

    /// Granted scopes as a space-separated string.
    #[must_use]
    pub fn scope_string(&self) -> String {
        self.granted_scopes
            .iter()
            .map(String::as_str)
            .collect::<Vec<_>>()
            .join(" ")
    }
}

/// A request that failed validation.
#[derive(Debug, Clone, PartialEq)]
pub struct GrantFailure {
    pub error: TokenErrorCode,
    pub description: Option<String>,
    /// Extra response fields supplied by the validator.
    pub custom_response: Option<Map<String, Value>>,
}

impl GrantFailure {
    #[must_use]
    pub fn new(error: TokenErrorCode) -> Self {
        Self {
            error,
            description: None,
            custom_response: None,
        }
    }

    #[must_use]
    pub fn with_description(error: TokenErrorCode, description: impl Into<String>) -> Self {
        Self {
            error,
            description: Some(description.into()),
            custom_response: None,
        }
    }

    /// `invalid_grant` with a description.
    #[must_use]
    pub fn invalid_grant(description: impl Into<String>) -> Self {
        Self::with_description(TokenErrorCode::InvalidGrant, description)
    }

    /// `invalid_request` with a description.
    #[must_use]
    pub fn invalid_request(description: impl Into<String>) -> Self {
        Self::with_description(TokenErrorCode::InvalidRequest, description)
    }

    /// The generic internal failure.
    #[must_use]
    pub fn internal() -> Self {
        Self::with_description(TokenErrorCode::Internal, "internal error")
    }

    /// Attaches custom response fields.
    #[must_use]
    pub fn with_custom_response(mut self, fields: Map<String, Value>) -> Self {
        self.custom_response = Some(fields);
        self
    }
}
