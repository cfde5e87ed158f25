//! Refresh token grant (RFC 6749 Section 6).
//!
//! Validation only checks the presented token. Rotation (one-time use) or
//! sliding happens in the issuance engine, which receives the source grant
//! through the outcome.
//!
//! Every failure caused by the token itself is a bare `invalid_grant`: a
//! missing, expired, replayed or foreign token cannot be told apart.

use std::collections::BTreeSet;

use async_trait::async_trait;

use crate::config::RefreshTokenPolicy;
use crate::grants::{GrantContext, GrantValidator};
use crate::oauth::{GrantFailure, GrantValidationOutcome, TokenErrorCode, ValidatedGrant};
use crate::storage::PersistedGrants;
use crate::types::{GrantType, PersistedGrantType};

/// Validates presented refresh tokens against the grant store.
pub struct RefreshTokenGrantValidator {
    grants: PersistedGrants,
    policy: RefreshTokenPolicy,
}

impl RefreshTokenGrantValidator {
    pub fn new(grants: PersistedGrants, policy: RefreshTokenPolicy) -> Self {
        Self { grants, policy }
    }

    fn invalid() -> GrantValidationOutcome {
        GrantValidationOutcome::failure(TokenErrorCode::InvalidGrant)
    }
}

#[async_trait]
impl GrantValidator for RefreshTokenGrantValidator {
    fn grant_type(&self) -> &str {
        GrantType::RefreshToken.as_str()
    }

    async fn validate(&self, ctx: &GrantContext<'_>) -> GrantValidationOutcome {
        let Some(handle) = ctx.request.parameter("refresh_token") else {
            return GrantFailure::invalid_request("refresh_token is required").into();
        };

        let grant = match self.grants.find(handle, PersistedGrantType::RefreshToken).await {
            Ok(Some(grant)) => grant,
            Ok(None) => {
                tracing::warn!(client_id = %ctx.client.client_id, "Unknown or expired refresh token");
                return Self::invalid();
            }
            Err(e) => {
                tracing::error!(error = %e, "Refresh token lookup failed");
                return GrantFailure::internal().into();
            }
        };

        if grant.client_id != ctx.client.client_id {
            tracing::warn!(
                client_id = %ctx.client.client_id,
                "Refresh token presented by a different client"
            );
            return Self::invalid();
        }

        if grant.is_consumed() {
            if self.policy == RefreshTokenPolicy::OneTimeUse {
                if let Some(subject_id) = grant.subject_id.as_deref() {
                    match self
                        .grants
                        .store()
                        .remove_all(subject_id, &grant.client_id)
                        .await
                    {
                        Ok(removed) => tracing::warn!(
                            client_id = %grant.client_id,
                            removed,
                            "Consumed refresh token replayed, revoked all grants for subject"
                        ),
                        Err(e) => tracing::error!(error = %e, "Failed to revoke grants after replay"),
                    }
                }
            } else {
                tracing::warn!(client_id = %grant.client_id, "Revoked refresh token presented");
            }
            return Self::invalid();
        }

        let data = match grant.grant_data() {
            Ok(data) => data,
            Err(e) => {
                tracing::error!(error = %e, "Stored refresh token data is unreadable");
                return GrantFailure::internal().into();
            }
        };

        let original: BTreeSet<String> = data.scopes.into_iter().collect();
        let scopes = if ctx.request.scopes.is_empty() {
            original
        } else if ctx.request.scopes.is_subset(&original) {
            ctx.request.scopes.clone()
        } else {
            return GrantFailure::with_description(
                TokenErrorCode::InvalidScope,
                "requested scope exceeds the original grant",
            )
            .into();
        };

        GrantValidationOutcome::Success(
            ValidatedGrant::new(ctx, data.subject)
                .with_scopes(scopes)
                .with_refresh(handle.to_string(), grant),
        )
    }
}
