//! Token issuance engine.
//!
//! [`TokenService::issue_token`] is the single entry point for the token
//! endpoint:
//!
//! 1. validate the request (client, grant type, scopes, grant validator)
//! 2. resolve lifetimes (client override, else configuration)
//! 3. draft access and identity token claims
//! 4. run the response hook and apply its claims
//! 5. rotate or slide the presented refresh token
//! 6. sign the access token, or store it as a reference token
//! 7. store a new refresh token when `offline_access` was granted
//! 8. assemble the response
//!
//! # Usage
//!
//! ```ignore
//! use tollgate_auth::token::TokenService;
//!
//! let service = TokenService::builder(config)
//!     .with_clients(clients)
//!     .with_resource_owners(users)
//!     .build()?;
//!
//! let response = service.issue_token(&request).await?;
//! ```

use std::sync::Arc;

use serde_json::{Map, Value};
use time::{Duration, OffsetDateTime};
use tokio::task::JoinHandle;

use crate::AuthResult;
use crate::claims::Claim;
use crate::clock::{Clock, SystemClock};
use crate::config::{AuthConfig, RefreshTokenPolicy};
use crate::error::AuthError;
use crate::grants::{
    AuthorizationCodeGrantValidator, AuthorizationCodeRequest, ClientCredentialsGrantValidator,
    GrantRegistry, GrantValidator, PasswordGrantValidator, RefreshTokenGrantValidator,
};
use crate::oauth::outcome::RefreshSource;
use crate::oauth::{
    GrantFailure, GrantValidationOutcome, IssuedTokens, TokenError, TokenErrorCode, TokenRequest,
    TokenRequestValidator, TokenResponse, ValidatedGrant, is_standard_response_field,
};
use crate::storage::{
    ClientStore, InMemoryGrantStore, PersistedGrantStore, PersistedGrants, ProfileService,
    ResourceOwnerValidator, ScopeClaimsProfile, spawn_expiry_sweeper,
};
use crate::token::content::{TokenContent, TokenContentBuilder, apply_claim_overrides};
use crate::token::hook::{DraftTokens, HookContext, TokenResponseHook, run_hook};
use crate::token::jwt::{Jwks, JwtSigner, TokenKind, TokenSigner};
use crate::token::payload::JwtPayload;
use crate::token::revocation::{RevocationRequest, TokenTypeHint};
use crate::types::{AccessTokenType, GrantData, GrantType, PersistedGrant, PersistedGrantType};

const OPENID_SCOPE: &str = "openid";
const OFFLINE_ACCESS_SCOPE: &str = "offline_access";

/// Upper bound for any lifetime, keeps timestamp arithmetic in range.
const MAX_LIFETIME_SECS: u64 = i32::MAX as u64;

/// Token issuance engine.
///
/// Cheap to share: wrap it in an `Arc` and call it from any number of tasks.
pub struct TokenService {
    config: AuthConfig,
    clients: Arc<dyn ClientStore>,
    validator: TokenRequestValidator,
    content: TokenContentBuilder,
    profile: Arc<dyn ProfileService>,
    grants: PersistedGrants,
    signer: Arc<dyn TokenSigner>,
    hook: Option<Arc<dyn TokenResponseHook>>,
    clock: Arc<dyn Clock>,
}

impl TokenService {
    /// Starts building a service for `config`.
    #[must_use]
    pub fn builder(config: AuthConfig) -> TokenServiceBuilder {
        TokenServiceBuilder::new(config)
    }

    #[must_use]
    pub fn config(&self) -> &AuthConfig {
        &self.config
    }

    /// The lifecycle view of the grant store.
    #[must_use]
    pub fn grants(&self) -> &PersistedGrants {
        &self.grants
    }

    /// Grant types this service accepts.
    #[must_use]
    pub fn grant_types(&self) -> Vec<&str> {
        self.validator.registry().grant_types()
    }

    /// Handles a token request.
    ///
    /// # Errors
    ///
    /// Returns the OAuth error response for rejected requests. Store and
    /// signer failures are reported as `server_error` with a generic
    /// description.
    pub async fn issue_token(&self, request: &TokenRequest) -> Result<TokenResponse, TokenError> {
        let outcome = self.validator.validate(request).await;
        match &outcome {
            GrantValidationOutcome::Success(grant) => self.issue(&outcome, grant).await,
            GrantValidationOutcome::Failure(failure) => {
                let error = self.reject(&outcome, failure).await;
                tracing::warn!(
                    client_id = %request.client_id,
                    grant_type = %request.grant_type,
                    error = %error.error,
                    "Token request rejected"
                );
                Err(error)
            }
        }
    }

    async fn reject(&self, outcome: &GrantValidationOutcome, failure: &GrantFailure) -> TokenError {
        let mut error = TokenError {
            error: failure.error,
            error_description: failure.description.clone(),
            custom: Map::new(),
        };
        if let Some(fields) = &failure.custom_response {
            merge_response_fields(&mut error.custom, fields.clone());
        }

        if let Some(hook) = &self.hook {
            let ctx = HookContext {
                outcome,
                draft: None,
                response_fields: &error.custom,
            };
            let (augmentation, warning) = run_hook(hook.as_ref(), &ctx).await;
            if let Some(warning) = warning {
                tracing::warn!(warning = %warning, "Token response hook");
            }
            merge_response_fields(&mut error.custom, augmentation.response_fields);
        }

        error
    }

    async fn issue(
        &self,
        outcome: &GrantValidationOutcome,
        grant: &ValidatedGrant,
    ) -> Result<TokenResponse, TokenError> {
        let client = &grant.client;
        let now = self.clock.now();

        // 2. Lifetimes
        let access_lifetime = client
            .access_token_lifetime
            .unwrap_or(self.config.tokens.access_token_lifetime.as_secs())
            .min(MAX_LIFETIME_SECS);
        let identity_lifetime = client
            .identity_token_lifetime
            .unwrap_or(self.config.tokens.identity_token_lifetime.as_secs())
            .min(MAX_LIFETIME_SECS);

        // 3. Drafts
        let scopes: Vec<String> = grant.granted_scopes.iter().cloned().collect();
        let profile_claims = self
            .profile
            .get_claims(&grant.subject, &scopes)
            .await
            .map_err(|e| internal("Profile service failed", &e))?;

        let access_claims = self.content.access_token_claims(&TokenContent {
            grant,
            profile_claims: &profile_claims,
            issued_at: now,
            lifetime: seconds(access_lifetime),
        });
        let identity_claims = (grant.has_scope(OPENID_SCOPE) && grant.subject.subject_id().is_some())
            .then(|| {
                self.content.identity_token_claims(&TokenContent {
                    grant,
                    profile_claims: &profile_claims,
                    issued_at: now,
                    lifetime: seconds(identity_lifetime),
                })
            });
        let issues_refresh_token = grant.refresh.is_some()
            || (grant.has_scope(OFFLINE_ACCESS_SCOPE)
                && grant.grant_type != GrantType::ClientCredentials.as_str());

        let mut draft = DraftTokens {
            access_token_claims: access_claims,
            access_token_type: client.access_token_type,
            access_token_lifetime: access_lifetime,
            identity_token_claims: identity_claims,
            identity_token_lifetime: identity_lifetime,
            issues_refresh_token,
        };

        // 4. Hook
        let mut response_fields = Map::new();
        if let Some(fields) = &grant.custom_response {
            merge_response_fields(&mut response_fields, fields.clone());
        }
        if let Some(hook) = &self.hook {
            let ctx = HookContext {
                outcome,
                draft: Some(&draft),
                response_fields: &response_fields,
            };
            let (augmentation, warning) = run_hook(hook.as_ref(), &ctx).await;
            if let Some(warning) = warning {
                tracing::warn!(client_id = %client.client_id, warning = %warning, "Token response hook");
            }

            if !augmentation.claims.is_empty() {
                let (claims, ignored) = apply_claim_overrides(
                    std::mem::take(&mut draft.access_token_claims),
                    augmentation.claims,
                );
                if !ignored.is_empty() {
                    tracing::warn!(
                        client_id = %client.client_id,
                        claim_types = ?ignored,
                        "Ignoring hook claims of reserved types"
                    );
                }
                draft.access_token_claims = claims;
            }
            merge_response_fields(&mut response_fields, augmentation.response_fields);
        }

        // 5. Refresh token being redeemed
        let mut refresh_handle = match &grant.refresh {
            Some(source) => Some(self.redeem_refresh_token(source, now).await?),
            None => None,
        };

        // 6. Access token
        let access_token = match draft.access_token_type {
            AccessTokenType::Jwt => self.sign(&draft.access_token_claims, TokenKind::AccessToken)?,
            AccessTokenType::Reference => {
                let mut data = GrantData::new(grant.subject.clone(), scopes.clone());
                data.claims = Some(draft.access_token_claims.clone());
                self.grants
                    .issue(
                        PersistedGrantType::ReferenceToken,
                        &client.client_id,
                        &data,
                        seconds(access_lifetime),
                    )
                    .await
                    .map_err(|e| internal("Failed to store reference token", &e))?
            }
        };

        let identity_token = match &draft.identity_token_claims {
            Some(claims) => Some(self.sign(claims, TokenKind::IdentityToken)?),
            None => None,
        };

        // 7. New refresh token
        if refresh_handle.is_none() && draft.issues_refresh_token {
            let mut data = GrantData::new(grant.subject.clone(), scopes);
            data.nonce = grant.nonce.clone();
            let handle = self
                .grants
                .issue(
                    PersistedGrantType::RefreshToken,
                    &client.client_id,
                    &data,
                    seconds(self.config.refresh.absolute_lifetime.as_secs()),
                )
                .await
                .map_err(|e| internal("Failed to store refresh token", &e))?;
            refresh_handle = Some(handle);
        }

        // 8. Response
        let mut tokens = IssuedTokens::new(access_token, access_lifetime);
        if !grant.granted_scopes.is_empty() {
            tokens = tokens.with_scope(grant.scope_string());
        }
        if let Some(handle) = refresh_handle {
            tokens = tokens.with_refresh_token(handle);
        }
        if let Some(token) = identity_token {
            tokens = tokens.with_id_token(token);
        }

        tracing::info!(
            client_id = %client.client_id,
            grant_type = %grant.grant_type,
            scope = %grant.scope_string(),
            refresh_token = tokens.refresh_token.is_some(),
            id_token = tokens.id_token.is_some(),
            "Tokens issued"
        );

        Ok(TokenResponse {
            tokens,
            custom: response_fields,
        })
    }

    /// Applies the refresh policy to a redeemed token and returns the handle
    /// for the response.
    async fn redeem_refresh_token(
        &self,
        source: &RefreshSource,
        now: OffsetDateTime,
    ) -> Result<String, TokenError> {
        let old = &source.grant;
        let store = self.grants.store();

        match self.config.refresh.policy {
            RefreshTokenPolicy::OneTimeUse => {
                let handle = PersistedGrant::generate_handle();
                let replacement = PersistedGrant {
                    key: PersistedGrant::key_for(&handle, PersistedGrantType::RefreshToken),
                    grant_type: PersistedGrantType::RefreshToken,
                    client_id: old.client_id.clone(),
                    subject_id: old.subject_id.clone(),
                    creation_time: old.creation_time,
                    expiration: old.expiration,
                    consumed_time: None,
                    data: old.data.clone(),
                };

                let rotated = store
                    .rotate(&old.key, now, &replacement)
                    .await
                    .map_err(|e| internal("Refresh token rotation failed", &e))?;
                if !rotated {
                    self.revoke_family(old).await;
                    tracing::warn!(
                        client_id = %old.client_id,
                        "Refresh token already used, revoked all grants for subject"
                    );
                    return Err(TokenError::new(TokenErrorCode::InvalidGrant));
                }

                tracing::debug!(client_id = %old.client_id, "Refresh token rotated");
                Ok(handle)
            }
            RefreshTokenPolicy::Sliding => {
                let refresh = &self.config.refresh;
                let expiration = (now + seconds(refresh.sliding_lifetime.as_secs()))
                    .min(old.creation_time + seconds(refresh.absolute_lifetime.as_secs()));

                let slid = store
                    .slide(&old.key, expiration)
                    .await
                    .map_err(|e| internal("Refresh token slide failed", &e))?;
                if !slid {
                    tracing::warn!(client_id = %old.client_id, "Refresh token revoked during use");
                    return Err(TokenError::new(TokenErrorCode::InvalidGrant));
                }

                tracing::debug!(client_id = %old.client_id, expiration = %expiration, "Refresh token extended");
                Ok(source.handle.clone())
            }
        }
    }

    async fn revoke_family(&self, grant: &PersistedGrant) {
        let Some(subject_id) = grant.subject_id.as_deref() else {
            return;
        };
        if let Err(e) = self
            .grants
            .store()
            .remove_all(subject_id, &grant.client_id)
            .await
        {
            tracing::error!(error = %e, "Failed to revoke grants after refresh token reuse");
        }
    }

    fn sign(&self, claims: &[Claim], kind: TokenKind) -> Result<String, TokenError> {
        self.signer
            .sign(&JwtPayload::from_claims(claims), kind)
            .map_err(|e| {
                tracing::error!(error = %e, kind = ?kind, "Token signing failed");
                TokenError::internal()
            })
    }

    /// Revokes a refresh token or reference access token (RFC 7009).
    ///
    /// Unknown tokens and tokens of other clients are ignored.
    ///
    /// # Errors
    ///
    /// `invalid_client` if the client does not authenticate, `server_error`
    /// if the store fails.
    pub async fn revoke_token(&self, request: &RevocationRequest) -> Result<(), TokenError> {
        let client = match self
            .clients
            .authenticate(&request.client_id, &request.client_credential)
            .await
        {
            Ok(Some(client)) => client,
            Ok(None) => return Err(TokenError::new(TokenErrorCode::InvalidClient)),
            Err(e) => return Err(internal("Client store failed", &e)),
        };

        let order = match request.token_type_hint {
            Some(TokenTypeHint::AccessToken) => [
                PersistedGrantType::ReferenceToken,
                PersistedGrantType::RefreshToken,
            ],
            Some(TokenTypeHint::RefreshToken) | None => [
                PersistedGrantType::RefreshToken,
                PersistedGrantType::ReferenceToken,
            ],
        };

        for grant_type in order {
            let grant = self
                .grants
                .find(&request.token, grant_type)
                .await
                .map_err(|e| internal("Grant lookup failed", &e))?;
            let Some(grant) = grant else {
                continue;
            };

            if grant.client_id != client.client_id {
                tracing::warn!(
                    client_id = %client.client_id,
                    "Ignoring revocation of a token issued to another client"
                );
                return Ok(());
            }

            self.grants
                .remove(&request.token, grant_type)
                .await
                .map_err(|e| internal("Failed to remove grant", &e))?;
            tracing::info!(client_id = %client.client_id, grant_type = %grant_type, "Token revoked");
            return Ok(());
        }

        Ok(())
    }

    /// Looks up the claims behind a reference access token.
    ///
    /// Returns `None` for unknown, expired and revoked handles alike.
    ///
    /// # Errors
    ///
    /// Returns an error if the store fails or the stored data is unreadable.
    pub async fn resolve_reference_token(&self, handle: &str) -> AuthResult<Option<Vec<Claim>>> {
        let Some(grant) = self
            .grants
            .find(handle, PersistedGrantType::ReferenceToken)
            .await?
        else {
            return Ok(None);
        };

        let data = grant
            .grant_data()
            .map_err(|e| AuthError::internal(e.to_string()))?;
        Ok(Some(data.claims.unwrap_or_default()))
    }

    /// Stores an authorization code for the consent flow and returns the
    /// code to hand to the client.
    ///
    /// # Errors
    ///
    /// Unknown client, unregistered redirect URI or a missing PKCE
    /// challenge for a PKCE client are rejected.
    pub async fn create_authorization_code(
        &self,
        request: AuthorizationCodeRequest,
    ) -> AuthResult<String> {
        let client = self
            .clients
            .find_client(&request.client_id)
            .await?
            .filter(|c| c.enabled)
            .ok_or_else(|| AuthError::invalid_client("unknown client"))?;

        if !client.is_grant_type_allowed(GrantType::AuthorizationCode.as_str()) {
            return Err(AuthError::unauthorized_client(
                "authorization_code not allowed for client",
            ));
        }
        if !client.is_redirect_uri_allowed(&request.redirect_uri) {
            return Err(AuthError::invalid_request("redirect_uri not registered"));
        }
        if client.require_pkce && request.code_challenge.is_none() {
            return Err(AuthError::invalid_request("code_challenge required"));
        }

        request
            .store(
                &self.grants,
                seconds(self.config.tokens.authorization_code_lifetime.as_secs()),
            )
            .await
    }

    /// Public signing keys for verifying parties.
    #[must_use]
    pub fn jwks(&self) -> Jwks {
        self.signer.jwks()
    }

    /// Starts the background sweep of expired grants at the configured interval.
    pub fn spawn_sweeper(&self) -> JoinHandle<()> {
        spawn_expiry_sweeper(
            self.grants.store().clone(),
            self.clock.clone(),
            self.config.sweep_interval,
        )
    }
}

/// Adds custom fields to a response, skipping standard OAuth fields.
fn merge_response_fields(target: &mut Map<String, Value>, fields: Map<String, Value>) {
    for (name, value) in fields {
        if is_standard_response_field(&name) {
            tracing::warn!(field = %name, "Ignoring custom response field that shadows a standard field");
            continue;
        }
        target.insert(name, value);
    }
}

fn internal(context: &str, error: &AuthError) -> TokenError {
    tracing::error!(error = %error, "{context}");
    TokenError::internal()
}

fn seconds(secs: u64) -> Duration {
    Duration::seconds(secs.min(MAX_LIFETIME_SECS) as i64)
}

// =============================================================================
// Builder
// =============================================================================

/// Assembles a [`TokenService`] from its collaborators.
///
/// Only the client store is required. Defaults: in-memory grant store,
/// system clock, [`ScopeClaimsProfile::standard`], a [`JwtSigner`] built from
/// the signing configuration, no hook. The password grant is registered
/// only when a resource owner validator is supplied.
pub struct TokenServiceBuilder {
    config: AuthConfig,
    clients: Option<Arc<dyn ClientStore>>,
    resource_owners: Option<Arc<dyn ResourceOwnerValidator>>,
    profile: Option<Arc<dyn ProfileService>>,
    grant_store: Option<Arc<dyn PersistedGrantStore>>,
    signer: Option<Arc<dyn TokenSigner>>,
    clock: Option<Arc<dyn Clock>>,
    hook: Option<Arc<dyn TokenResponseHook>>,
    extensions: Vec<Arc<dyn GrantValidator>>,
}

impl TokenServiceBuilder {
    #[must_use]
    pub fn new(config: AuthConfig) -> Self {
        Self {
            config,
            clients: None,
            resource_owners: None,
            profile: None,
            grant_store: None,
            signer: None,
            clock: None,
            hook: None,
            extensions: Vec::new(),
        }
    }

    #[must_use]
    pub fn with_clients(mut self, clients: Arc<dyn ClientStore>) -> Self {
        self.clients = Some(clients);
        self
    }

    #[must_use]
    pub fn with_resource_owners(mut self, validator: Arc<dyn ResourceOwnerValidator>) -> Self {
        self.resource_owners = Some(validator);
        self
    }

    #[must_use]
    pub fn with_profile(mut self, profile: Arc<dyn ProfileService>) -> Self {
        self.profile = Some(profile);
        self
    }

    #[must_use]
    pub fn with_grant_store(mut self, store: Arc<dyn PersistedGrantStore>) -> Self {
        self.grant_store = Some(store);
        self
    }

    #[must_use]
    pub fn with_signer(mut self, signer: Arc<dyn TokenSigner>) -> Self {
        self.signer = Some(signer);
        self
    }

    #[must_use]
    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = Some(clock);
        self
    }

    #[must_use]
    pub fn with_hook(mut self, hook: Arc<dyn TokenResponseHook>) -> Self {
        self.hook = Some(hook);
        self
    }

    /// Registers an extension grant. It takes precedence over a built-in
    /// validator with the same grant type.
    #[must_use]
    pub fn with_extension_grant(mut self, validator: Arc<dyn GrantValidator>) -> Self {
        self.extensions.push(validator);
        self
    }

    /// Validates the configuration and builds the service.
    ///
    /// # Errors
    ///
    /// Returns a configuration error if the configuration is invalid, no
    /// client store was supplied, or the signing key cannot be loaded.
    pub fn build(self) -> AuthResult<TokenService> {
        self.config
            .validate()
            .map_err(|e| AuthError::configuration(e.to_string()))?;

        let clients = self
            .clients
            .ok_or_else(|| AuthError::configuration("a client store is required"))?;
        let clock = self.clock.unwrap_or_else(|| Arc::new(SystemClock));
        let store = self
            .grant_store
            .unwrap_or_else(|| Arc::new(InMemoryGrantStore::new()));
        let grants = PersistedGrants::new(store, clock.clone());
        let signer = match self.signer {
            Some(signer) => signer,
            None => Arc::new(
                JwtSigner::from_config(&self.config.signing, &self.config.issuer)
                    .map_err(|e| AuthError::configuration(e.to_string()))?,
            ),
        };
        let profile = self
            .profile
            .unwrap_or_else(|| Arc::new(ScopeClaimsProfile::standard()));

        let mut registry = GrantRegistry::new();
        registry.register_built_in(Arc::new(ClientCredentialsGrantValidator));
        registry.register_built_in(Arc::new(RefreshTokenGrantValidator::new(
            grants.clone(),
            self.config.refresh.policy,
        )));
        registry.register_built_in(Arc::new(AuthorizationCodeGrantValidator::new(
            grants.clone(),
        )));
        if let Some(users) = self.resource_owners {
            registry.register_built_in(Arc::new(PasswordGrantValidator::new(users)));
        }
        for extension in self.extensions {
            registry.register_extension(extension);
        }

        tracing::info!(
            issuer = %self.config.issuer,
            refresh_policy = %self.config.refresh.policy,
            grant_types = ?registry.grant_types(),
            "Token service ready"
        );

        let validator = TokenRequestValidator::new(clients.clone(), Arc::new(registry), clock.clone());
        let content = TokenContentBuilder::new(
            self.config.issuer.clone(),
            self.config.audiences.clone(),
        );

        Ok(TokenService {
            config: self.config,
            clients,
            validator,
            content,
            profile,
            grants,
            signer,
            hook: self.hook,
            clock,
        })
    }
}

