//! Token request dispatcher.
//!
//! Authenticates the client, checks the grant type and scopes against the
//! client registration, then hands the request to the registered
//! [`GrantValidator`](crate::grants::GrantValidator).

use std::collections::BTreeSet;
use std::sync::Arc;

use crate::clock::Clock;
use crate::grants::{GrantContext, GrantRegistry};
use crate::oauth::{GrantFailure, GrantValidationOutcome, TokenErrorCode, TokenRequest};
use crate::storage::ClientStore;
use crate::types::GrantType;

/// Validates token requests.
#[derive(Clone)]
pub struct TokenRequestValidator {
    clients: Arc<dyn ClientStore>,
    registry: Arc<GrantRegistry>,
    clock: Arc<dyn Clock>,
}

impl TokenRequestValidator {
    pub fn new(
        clients: Arc<dyn ClientStore>,
        registry: Arc<GrantRegistry>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self {
            clients,
            registry,
            clock,
        }
    }

    /// The grant registry used for dispatch.
    #[must_use]
    pub fn registry(&self) -> &GrantRegistry {
        &self.registry
    }

    /// Validates a token request.
    ///
    /// The outcome of the grant validator is returned unchanged.
    pub async fn validate(&self, request: &TokenRequest) -> GrantValidationOutcome {
        // 0. Structural checks
        if request.grant_type.is_empty() {
            return GrantFailure::invalid_request("grant_type is required").into();
        }
        if request.client_id.is_empty() {
            return GrantValidationOutcome::failure(TokenErrorCode::InvalidClient);
        }

        // 1. Authenticate the client
        let client = match self
            .clients
            .authenticate(&request.client_id, &request.client_credential)
            .await
        {
            Ok(Some(client)) => client,
            Ok(None) => {
                tracing::warn!(client_id = %request.client_id, "Client authentication failed");
                return GrantValidationOutcome::failure(TokenErrorCode::InvalidClient);
            }
            Err(e) => {
                tracing::error!(error = %e, client_id = %request.client_id, "Client store failed");
                return GrantFailure::internal().into();
            }
        };

        // 2. Grant type and scopes must be allowed for this client
        if !client.is_grant_type_allowed(&request.grant_type) {
            tracing::warn!(
                client_id = %client.client_id,
                grant_type = %request.grant_type,
                "Grant type not allowed for client"
            );
            return GrantValidationOutcome::failure(TokenErrorCode::UnauthorizedClient);
        }

        if let Some(scope) = request.scopes.iter().find(|s| !client.is_scope_allowed(s)) {
            tracing::warn!(client_id = %client.client_id, scope = %scope, "Scope not allowed for client");
            return GrantValidationOutcome::failure(TokenErrorCode::InvalidScope);
        }

        // An empty refresh request means "the scopes originally granted",
        // which only the refresh validator knows.
        let scopes: BTreeSet<String> = if request.scopes.is_empty()
            && request.grant_type != GrantType::RefreshToken.as_str()
        {
            client.allowed_scopes.iter().cloned().collect()
        } else {
            request.scopes.clone()
        };

        // 3. Select the validator
        let Some(validator) = self.registry.lookup(&request.grant_type) else {
            tracing::warn!(grant_type = %request.grant_type, "Unsupported grant type");
            return GrantValidationOutcome::failure(TokenErrorCode::UnsupportedGrantType);
        };

        tracing::debug!(
            client_id = %client.client_id,
            grant_type = %request.grant_type,
            "Dispatching token request"
        );

        // 4. Invoke it
        let ctx = GrantContext {
            request,
            client: &client,
            scopes,
            clock: self.clock.as_ref(),
        };
        validator.validate(&ctx).await
    }
}
