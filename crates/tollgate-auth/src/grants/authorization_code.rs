//! Authorization code grant (RFC 6749 Section 4.1, RFC 7636).
//!
//! Codes are minted by the interactive login/consent flow, which lives
//! outside this crate, through [`AuthorizationCodeRequest::store`]. The token
//! endpoint side redeems them here. A code can be redeemed once; a second
//! attempt revokes everything issued to that subject and client.

use async_trait::async_trait;

use crate::AuthResult;
use crate::claims::Principal;
use crate::grants::{GrantContext, GrantValidator};
use crate::oauth::pkce::verify_code_challenge;
use crate::oauth::{GrantFailure, GrantValidationOutcome, TokenErrorCode, ValidatedGrant};
use crate::storage::PersistedGrants;
use crate::types::{GrantData, GrantType, PersistedGrantType};

/// Everything the consent flow knows when it issues a code.
#[derive(Debug, Clone)]
pub struct AuthorizationCodeRequest {
    pub client_id: String,
    pub subject: Principal,
    pub scopes: Vec<String>,
    pub redirect_uri: String,
    pub code_challenge: Option<String>,
    pub code_challenge_method: Option<String>,
    pub nonce: Option<String>,
}

impl AuthorizationCodeRequest {
    /// Persists the code and returns the handle to send to the client.
    ///
    /// # Errors
    ///
    /// Returns an error if the grant cannot be stored.
    pub async fn store(
        self,
        grants: &PersistedGrants,
        lifetime: time::Duration,
    ) -> AuthResult<String> {
        let mut data = GrantData::new(self.subject, self.scopes);
        data.redirect_uri = Some(self.redirect_uri);
        data.code_challenge = self.code_challenge;
        data.code_challenge_method = self.code_challenge_method;
        data.nonce = self.nonce;

        grants
            .issue(
                PersistedGrantType::AuthorizationCode,
                &self.client_id,
                &data,
                lifetime,
            )
            .await
    }
}

/// Redeems authorization codes.
pub struct AuthorizationCodeGrantValidator {
    grants: PersistedGrants,
}

impl AuthorizationCodeGrantValidator {
    pub fn new(grants: PersistedGrants) -> Self {
        Self { grants }
    }
}

#[async_trait]
impl GrantValidator for AuthorizationCodeGrantValidator {
    fn grant_type(&self) -> &str {
        GrantType::AuthorizationCode.as_str()
    }

    async fn validate(&self, ctx: &GrantContext<'_>) -> GrantValidationOutcome {
        let (Some(code), Some(redirect_uri)) = (
            ctx.request.parameter("code"),
            ctx.request.parameter("redirect_uri"),
        ) else {
            return GrantFailure::invalid_request("code and redirect_uri are required").into();
        };
        let invalid = || GrantValidationOutcome::failure(TokenErrorCode::InvalidGrant);

        let grant = match self.grants.find(code, PersistedGrantType::AuthorizationCode).await {
            Ok(Some(grant)) if grant.client_id == ctx.client.client_id => grant,
            Ok(_) => {
                tracing::warn!(client_id = %ctx.client.client_id, "Unknown, expired or foreign authorization code");
                return invalid();
            }
            Err(e) => {
                tracing::error!(error = %e, "Authorization code lookup failed");
                return GrantFailure::internal().into();
            }
        };

        // 1. Consume first: a code is dead after its first presentation.
        match self.grants.store().consume(&grant.key, ctx.now()).await {
            Ok(true) => {}
            Ok(false) => {
                if let Some(subject_id) = grant.subject_id.as_deref() {
                    if let Err(e) = self
                        .grants
                        .store()
                        .remove_all(subject_id, &grant.client_id)
                        .await
                    {
                        tracing::error!(error = %e, "Failed to revoke grants after code replay");
                    }
                }
                tracing::warn!(client_id = %grant.client_id, "Authorization code replayed");
                return invalid();
            }
            Err(e) => {
                tracing::error!(error = %e, "Failed to consume authorization code");
                return GrantFailure::internal().into();
            }
        }

        let data = match grant.grant_data() {
            Ok(data) => data,
            Err(e) => {
                tracing::error!(error = %e, "Stored authorization code data is unreadable");
                return GrantFailure::internal().into();
            }
        };

        // 2. Redirect URI must match the one used at the authorize endpoint.
        if data.redirect_uri.as_deref() != Some(redirect_uri) {
            tracing::warn!(client_id = %ctx.client.client_id, "Redirect URI mismatch");
            return invalid();
        }

        // 3. PKCE
        match data.code_challenge.as_deref() {
            Some(challenge) => {
                let Some(verifier) = ctx.request.parameter("code_verifier") else {
                    return invalid();
                };
                if let Err(e) = verify_code_challenge(
                    challenge,
                    data.code_challenge_method.as_deref(),
                    verifier,
                ) {
                    tracing::warn!(client_id = %ctx.client.client_id, error = %e, "PKCE verification failed");
                    return invalid();
                }
            }
            None if ctx.client.require_pkce => {
                tracing::warn!(client_id = %ctx.client.client_id, "Code issued without PKCE for a PKCE client");
                return invalid();
            }
            None => {}
        }

        GrantValidationOutcome::Success(
            ValidatedGrant::new(ctx, data.subject)
                .with_scopes(data.scopes.into_iter().collect())
                .with_nonce(data.nonce),
        )
    }
}
