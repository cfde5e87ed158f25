//! Resource owner password credentials grant (RFC 6749 Section 4.3).

use std::sync::Arc;

use async_trait::async_trait;

use crate::claims::{Claim, claim_types};
use crate::grants::{GrantContext, GrantValidator};
use crate::oauth::{GrantFailure, GrantValidationOutcome, ValidatedGrant};
use crate::storage::ResourceOwnerValidator;
use crate::types::GrantType;

/// Description returned for unknown users and wrong passwords alike.
pub const INVALID_CREDENTIAL: &str = "invalid_credential";

/// Identity provider recorded for locally authenticated users.
pub const LOCAL_IDP: &str = "local";

/// Checks username/password with a [`ResourceOwnerValidator`].
pub struct PasswordGrantValidator {
    users: Arc<dyn ResourceOwnerValidator>,
}

impl PasswordGrantValidator {
    pub fn new(users: Arc<dyn ResourceOwnerValidator>) -> Self {
        Self { users }
    }
}

#[async_trait]
impl GrantValidator for PasswordGrantValidator {
    fn grant_type(&self) -> &str {
        GrantType::Password.as_str()
    }

    async fn validate(&self, ctx: &GrantContext<'_>) -> GrantValidationOutcome {
        let (Some(username), Some(password)) = (
            ctx.request.parameter("username"),
            ctx.request.parameter("password"),
        ) else {
            return GrantFailure::invalid_request("username and password are required").into();
        };

        let owner = match self.users.validate(username, password).await {
            Ok(Some(owner)) => owner,
            Ok(None) => {
                tracing::warn!(client_id = %ctx.client.client_id, "Resource owner authentication failed");
                return GrantFailure::invalid_grant(INVALID_CREDENTIAL).into();
            }
            Err(e) => {
                tracing::error!(error = %e, "Resource owner validator failed");
                return GrantFailure::internal().into();
            }
        };

        let mut extra = Vec::new();
        if !owner.has_claim(claim_types::AUTHENTICATION_METHOD) {
            extra.push(Claim::new(claim_types::AUTHENTICATION_METHOD, "password"));
        }
        if !owner.has_claim(claim_types::AUTHENTICATION_TIME) {
            extra.push(Claim::integer(
                claim_types::AUTHENTICATION_TIME,
                ctx.now().unix_timestamp(),
            ));
        }
        if !owner.has_claim(claim_types::IDENTITY_PROVIDER) {
            extra.push(Claim::new(claim_types::IDENTITY_PROVIDER, LOCAL_IDP));
        }
        let subject = owner.with_claims(extra);

        tracing::debug!(
            client_id = %ctx.client.client_id,
            subject = subject.subject_id().unwrap_or_default(),
            "Resource owner authenticated"
        );
        GrantValidationOutcome::Success(ValidatedGrant::new(ctx, subject))
    }
}
