//! OAuth 2.0 client registration types.

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

use crate::claims::Claim;

// =============================================================================
// Grant Type
// =============================================================================

/// Built-in OAuth 2.0 grant types.
///
/// Extension grants are identified by their raw `grant_type` string and have
/// no variant here.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum GrantType {
    /// Authorization Code flow (with optional PKCE).
    AuthorizationCode,
    /// Client Credentials flow.
    ClientCredentials,
    /// Refresh Token flow.
    RefreshToken,
    /// Resource Owner Password Credentials flow.
    Password,
}

impl GrantType {
    /// All built-in grant types.
    pub const ALL: [GrantType; 4] = [
        Self::AuthorizationCode,
        Self::ClientCredentials,
        Self::RefreshToken,
        Self::Password,
    ];

    /// Returns the OAuth 2.0 grant_type parameter value.
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::AuthorizationCode => "authorization_code",
            Self::ClientCredentials => "client_credentials",
            Self::RefreshToken => "refresh_token",
            Self::Password => "password",
        }
    }

    /// Parses a built-in grant type. Returns `None` for extension grants.
    #[must_use]
    pub fn parse(value: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|g| g.as_str() == value)
    }
}

impl std::fmt::Display for GrantType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// How access tokens are handed to a client.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AccessTokenType {
    /// Self-contained signed JWT.
    #[default]
    Jwt,
    /// Opaque handle; the claims stay in the grant store.
    Reference,
}

// =============================================================================
// Client
// =============================================================================

/// Registered OAuth client.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Client {
    /// Unique client identifier used in OAuth flows.
    pub client_id: String,

    /// Hex SHA-256 of the client secret (see [`hash_client_secret`]).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub client_secret: Option<String>,

    /// Human-readable display name.
    #[serde(default)]
    pub name: String,

    /// Grant types this client may use. Extension grants are listed by
    /// their `grant_type` string.
    pub allowed_grant_types: Vec<String>,

    /// Scopes this client may request.
    #[serde(default)]
    pub allowed_scopes: Vec<String>,

    /// Whether the client must authenticate with its secret.
    #[serde(default = "default_true")]
    pub require_client_secret: bool,

    /// Whether this client is currently active and can be used.
    #[serde(default = "default_true")]
    pub enabled: bool,

    /// Access token lifetime in seconds. Overrides the configured default.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub access_token_lifetime: Option<u64>,

    /// Identity token lifetime in seconds. Overrides the configured default.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub identity_token_lifetime: Option<u64>,

    /// JWT or reference access tokens.
    #[serde(default)]
    pub access_token_type: AccessTokenType,

    /// Claims describing the client itself, copied into access tokens.
    #[serde(default)]
    pub claims: Vec<Claim>,

    /// Send client claims for every grant, not only client_credentials.
    #[serde(default)]
    pub always_send_client_claims: bool,

    /// Prefix prepended to client claim types.
    #[serde(default = "default_client_claims_prefix")]
    pub client_claims_prefix: String,

    /// Allowed redirect URIs for the authorization code flow.
    #[serde(default)]
    pub redirect_uris: Vec<String>,

    /// Whether authorization codes must carry a PKCE challenge.
    #[serde(default)]
    pub require_pkce: bool,
}

fn default_true() -> bool {
    true
}

fn default_client_claims_prefix() -> String {
    "client_".to_string()
}

impl Client {
    /// Creates an enabled confidential client with no grants or scopes.
    pub fn new(client_id: impl Into<String>) -> Self {
        let client_id = client_id.into();
        Self {
            name: client_id.clone(),
            client_id,
            client_secret: None,
            allowed_grant_types: Vec::new(),
            allowed_scopes: Vec::new(),
            require_client_secret: true,
            enabled: true,
            access_token_lifetime: None,
            identity_token_lifetime: None,
            access_token_type: AccessTokenType::Jwt,
            claims: Vec::new(),
            always_send_client_claims: false,
            client_claims_prefix: default_client_claims_prefix(),
            redirect_uris: Vec::new(),
            require_pkce: false,
        }
    }

    /// Sets the secret, storing only its hash.
    #[must_use]
    pub fn with_secret(mut self, secret: &str) -> Self {
        self.client_secret = Some(hash_client_secret(secret));
        self
    }

    /// Marks the client as public (no secret required).
    #[must_use]
    pub fn public(mut self) -> Self {
        self.require_client_secret = false;
        self.client_secret = None;
        self
    }

    /// Adds an allowed grant type.
    #[must_use]
    pub fn with_grant_type(mut self, grant_type: impl Into<String>) -> Self {
        self.allowed_grant_types.push(grant_type.into());
        self
    }

    /// Adds allowed scopes.
    #[must_use]
    pub fn with_scopes<I, S>(mut self, scopes: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.allowed_scopes.extend(scopes.into_iter().map(Into::into));
        self
    }

    /// Adds a client claim.
    #[must_use]
    pub fn with_claim(mut self, claim: Claim) -> Self {
        self.claims.push(claim);
        self
    }

    /// Sets the access token type.
    #[must_use]
    pub fn with_access_token_type(mut self, token_type: AccessTokenType) -> Self {
        self.access_token_type = token_type;
        self
    }

    /// Adds an allowed redirect URI.
    #[must_use]
    pub fn with_redirect_uri(mut self, uri: impl Into<String>) -> Self {
        self.redirect_uris.push(uri.into());
        self
    }

    /// Returns `true` if the client may use the given grant type.
    #[must_use]
    pub fn is_grant_type_allowed(&self, grant_type: &str) -> bool {
        self.allowed_grant_types.iter().any(|g| g == grant_type)
    }

    /// Returns `true` if the client may request the given scope.
    #[must_use]
    pub fn is_scope_allowed(&self, scope: &str) -> bool {
        self.allowed_scopes.iter().any(|s| s == scope)
    }

    /// Returns `true` if `redirect_uri` exactly matches a registered URI.
    #[must_use]
    pub fn is_redirect_uri_allowed(&self, redirect_uri: &str) -> bool {
        self.redirect_uris.iter().any(|u| u == redirect_uri)
    }

    /// Validates the client registration.
    ///
    /// # Errors
    ///
    /// Returns an error if the registration is inconsistent.
    pub fn validate(&self) -> Result<(), ClientValidationError> {
        if self.client_id.is_empty() {
            return Err(ClientValidationError::EmptyClientId);
        }

        if self.allowed_grant_types.is_empty() {
            return Err(ClientValidationError::NoGrantTypes);
        }

        if self.require_client_secret && self.client_secret.is_none() {
            return Err(ClientValidationError::MissingSecret);
        }

        if !self.require_client_secret
            && self.is_grant_type_allowed(GrantType::ClientCredentials.as_str())
        {
            return Err(ClientValidationError::PublicClientCredentials);
        }

        if self.is_grant_type_allowed(GrantType::AuthorizationCode.as_str())
            && self.redirect_uris.is_empty()
        {
            return Err(ClientValidationError::MissingRedirectUri);
        }

        Ok(())
    }
}

/// Hashes a client secret for storage and comparison.
#[must_use]
pub fn hash_client_secret(secret: &str) -> String {
    hex::encode(Sha256::digest(secret.as_bytes()))
}

/// Client validation errors.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ClientValidationError {
    /// Client ID is empty.
    #[error("client_id cannot be empty")]
    EmptyClientId,

    /// No grant types configured.
    #[error("client must allow at least one grant type")]
    NoGrantTypes,

    /// Confidential client without a secret.
    #[error("client requires a secret but none is configured")]
    MissingSecret,

    /// Public client configured for client_credentials.
    #[error("public clients cannot use client_credentials")]
    PublicClientCredentials,

    /// Authorization code client without redirect URIs.
    #[error("authorization_code clients need at least one redirect URI")]
    MissingRedirectUri,
}
