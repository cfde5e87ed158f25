//! Token endpoint request and response types.
//!
//! Transport layers build a [`TokenRequest`] from the form body and
//! serialize [`TokenResponse`] or [`TokenError`] as the JSON reply.

use std::collections::{BTreeSet, HashMap};
use std::fmt;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Response fields owned by the protocol. Custom fields may never replace them.
pub const STANDARD_RESPONSE_FIELDS: &[&str] = &[
    "access_token",
    "id_token",
    "refresh_token",
    "token_type",
    "expires_in",
    "scope",
    "error",
    "error_description",
];

/// Returns `true` if `name` is a protocol-owned response field.
#[must_use]
pub fn is_standard_response_field(name: &str) -> bool {
    STANDARD_RESPONSE_FIELDS.contains(&name)
}

// =============================================================================
// Request
// =============================================================================

/// How the client proved its identity.
#[derive(Clone, PartialEq, Eq, Default)]
pub enum ClientCredential {
    /// Public client, nothing presented.
    #[default]
    None,
    /// Shared secret (`client_secret`).
    Secret(String),
}

impl fmt::Debug for ClientCredential {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::None => write!(f, "None"),
            Self::Secret(_) => write!(f, "Secret(***)"),
        }
    }
}

/// Token request as received at the token endpoint (RFC 6749 Section 4).
///
/// `scopes` holds the parsed `scope` parameter; every other grant-specific
/// parameter (`username`, `refresh_token`, `code`, extension parameters)
/// stays in `parameters`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TokenRequest {
    pub grant_type: String,
    pub client_id: String,
    pub client_credential: ClientCredential,
    pub scopes: BTreeSet<String>,
    pub parameters: HashMap<String, String>,
}

impl TokenRequest {
    /// Creates a request for a public client with no scopes or parameters.
    pub fn new(grant_type: impl Into<String>, client_id: impl Into<String>) -> Self {
        Self {
            grant_type: grant_type.into(),
            client_id: client_id.into(),
            client_credential: ClientCredential::None,
            scopes: BTreeSet::new(),
            parameters: HashMap::new(),
        }
    }

    /// Builds a request from decoded form pairs.
    ///
    /// `grant_type`, `client_id`, `client_secret` and `scope` are lifted
    /// into their fields; everything else lands in `parameters`.
    pub fn from_form<I, K, V>(pairs: I) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<String>,
    {
        let mut request = Self::new(String::new(), String::new());
        for (key, value) in pairs {
            let (key, value) = (key.into(), value.into());
            match key.as_str() {
                "grant_type" => request.grant_type = value,
                "client_id" => request.client_id = value,
                "client_secret" if !value.is_empty() => {
                    request.client_credential = ClientCredential::Secret(value);
                }
                "client_secret" => {}
                "scope" => request = request.with_scope(&value),
                _ => {
                    request.parameters.insert(key, value);
                }
            }
        }
        request
    }

    /// Sets the client secret.
    #[must_use]
    pub fn with_secret(mut self, secret: impl Into<String>) -> Self {
        self.client_credential = ClientCredential::Secret(secret.into());
        self
    }

    /// Adds space-separated scopes.
    #[must_use]
    pub fn with_scope(mut self, scope: &str) -> Self {
        self.scopes
            .extend(scope.split_whitespace().map(str::to_string));
        self
    }

    /// Adds a grant-specific parameter.
    #[must_use]
    pub fn with_parameter(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.parameters.insert(name.into(), value.into());
        self
    }

    /// Returns a non-empty parameter value.
    #[must_use]
    pub fn parameter(&self, name: &str) -> Option<&str> {
        self.parameters
            .get(name)
            .map(String::as_str)
            .filter(|v| !v.is_empty())
    }
}

// =============================================================================
// Response
// =============================================================================

/// Tokens produced by a successful request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct IssuedTokens {
    /// JWT or reference handle.
    pub access_token: String,

    /// Always "Bearer".
    pub token_type: String,

    /// Access token lifetime in seconds.
    pub expires_in: u64,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub refresh_token: Option<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub id_token: Option<String>,

    /// Granted scopes (space-separated).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub scope: Option<String>,
}

impl IssuedTokens {
    /// Creates a bearer token result.
    #[must_use]
    pub fn new(access_token: String, expires_in: u64) -> Self {
        Self {
            access_token,
            token_type: "Bearer".to_string(),
            expires_in,
            refresh_token: None,
            id_token: None,
            scope: None,
        }
    }

    #[must_use]
    pub fn with_refresh_token(mut self, token: String) -> Self {
        self.refresh_token = Some(token);
        self
    }

    #[must_use]
    pub fn with_id_token(mut self, token: String) -> Self {
        self.id_token = Some(token);
        self
    }

    #[must_use]
    pub fn with_scope(mut self, scope: String) -> Self {
        self.scope = Some(scope);
        self
    }
}

/// Successful token response (RFC 6749 Section 5.1).
///
/// ```json
/// {
///   "access_token": "eyJhbGciOiJSUzI1NiIs...",
///   "token_type": "Bearer",
///   "expires_in": 3600,
///   "scope": "api1 offline_access",
///   "refresh_token": "tGzv3JOkF0XG5Qx2TlKWIA",
///   "custom": "custom"
/// }
/// ```
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TokenResponse {
    #[serde(flatten)]
    pub tokens: IssuedTokens,

    /// Custom fields from grant validators and the response hook.
    #[serde(flatten)]
    pub custom: Map<String, Value>,
}

impl TokenResponse {
    #[must_use]
    pub fn new(tokens: IssuedTokens) -> Self {
        Self {
            tokens,
            custom: Map::new(),
        }
    }

    /// HTTP status for this response.
    #[must_use]
    pub fn http_status(&self) -> u16 {
        200
    }
}

/// Error response (RFC 6749 Section 5.2).
///
/// ```json
/// {
///   "error": "invalid_grant",
///   "error_description": "invalid_credential"
/// }
/// ```
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TokenError {
    /// OAuth 2.0 error code.
    pub error: TokenErrorCode,

    /// Human-readable error description. Never carries internal detail.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error_description: Option<String>,

    /// Custom fields from grant validators and the response hook.
    #[serde(flatten)]
    pub custom: Map<String, Value>,
}

impl TokenError {
    /// Creates a new token error.
    #[must_use]
    pub fn new(error: TokenErrorCode) -> Self {
        Self {
            error,
            error_description: None,
            custom: Map::new(),
        }
    }

    /// Creates a new token error with description.
    #[must_use]
    pub fn with_description(error: TokenErrorCode, description: impl Into<String>) -> Self {
        Self {
            error,
            error_description: Some(description.into()),
            custom: Map::new(),
        }
    }

    /// Creates an invalid_grant error.
    #[must_use]
    pub fn invalid_grant(description: impl Into<String>) -> Self {
        Self::with_description(TokenErrorCode::InvalidGrant, description)
    }

    /// Creates the generic internal error.
    #[must_use]
    pub fn internal() -> Self {
        Self::with_description(TokenErrorCode::Internal, "internal error")
    }

    /// HTTP status for this error.
    #[must_use]
    pub fn http_status(&self) -> u16 {
        self.error.http_status()
    }
}

impl fmt::Display for TokenError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.error_description {
            Some(description) => write!(f, "{}: {description}", self.error),
            None => write!(f, "{}", self.error),
        }
    }
}

impl std::error::Error for TokenError {}

/// OAuth 2.0 token error codes.
///
/// Defined in RFC 6749 Section 5.2, plus `server_error` for store and
/// signer failures.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TokenErrorCode {
    /// The request is missing a required parameter or is otherwise malformed.
    InvalidRequest,

    /// Client authentication failed.
    InvalidClient,

    /// The grant or refresh token is invalid, expired, revoked, or was
    /// issued to another client.
    InvalidGrant,

    /// The client is not authorized to use this grant type.
    UnauthorizedClient,

    /// No validator is registered for the grant type.
    UnsupportedGrantType,

    /// The requested scope is invalid or exceeds what is allowed.
    InvalidScope,

    /// Store or signer failure.
    #[serde(rename = "server_error")]
    Internal,
}

impl TokenErrorCode {
    /// Returns the string representation of the error code.
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::InvalidRequest => "invalid_request",
            Self::InvalidClient => "invalid_client",
            Self::InvalidGrant => "invalid_grant",
            Self::UnauthorizedClient => "unauthorized_client",
            Self::UnsupportedGrantType => "unsupported_grant_type",
            Self::InvalidScope => "invalid_scope",
            Self::Internal => "server_error",
        }
    }

    /// Returns the HTTP status code for this error.
    #[must_use]
    pub fn http_status(&self) -> u16 {
        match self {
            Self::InvalidClient => 401,
            Self::Internal => 500,
            Self::InvalidRequest
            | Self::InvalidGrant
            | Self::UnauthorizedClient
            | Self::UnsupportedGrantType
            | Self::InvalidScope => 400,
        }
    }
}

impl fmt::Display for TokenErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}
