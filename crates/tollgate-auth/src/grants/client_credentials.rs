//! Client credentials grant (RFC 6749 Section 4.4).

use async_trait::async_trait;

use crate::claims::Principal;
use crate::grants::{GrantContext, GrantValidator};
use crate::oauth::{GrantValidationOutcome, ValidatedGrant};
use crate::types::GrantType;

/// The client acts on its own behalf; there is no resource owner.
///
/// Client authentication and scope checks already happened in the
/// dispatcher, so this validator always succeeds. The resulting principal
/// has no `sub` claim.
#[derive(Debug, Default, Clone, Copy)]
pub struct ClientCredentialsGrantValidator;

#[async_trait]
impl GrantValidator for ClientCredentialsGrantValidator {
    fn grant_type(&self) -> &str {
        GrantType::ClientCredentials.as_str()
    }

    async fn validate(&self, ctx: &GrantContext<'_>) -> GrantValidationOutcome {
        tracing::debug!(client_id = %ctx.client.client_id, "Client credentials grant");
        let subject = Principal::new(GrantType::ClientCredentials.as_str(), Vec::new());
        GrantValidationOutcome::Success(ValidatedGrant::new(ctx, subject))
    }
}
