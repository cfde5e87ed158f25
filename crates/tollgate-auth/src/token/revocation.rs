//! Token revocation request types (RFC 7009).
//!
//! Revocation is performed by
//! [`TokenService::revoke_token`](crate::token::TokenService::revoke_token).
//! Per RFC 7009 Section 2.2 unknown tokens are not an error.

use crate::oauth::ClientCredential;

/// Hint about the type of the token being revoked.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TokenTypeHint {
    /// The token is a (reference) access token.
    AccessToken,
    /// The token is a refresh token.
    RefreshToken,
}

impl TokenTypeHint {
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::AccessToken => "access_token",
            Self::RefreshToken => "refresh_token",
        }
    }

    /// Parses a `token_type_hint` value. Unknown hints are ignored by callers.
    #[must_use]
    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "access_token" => Some(Self::AccessToken),
            "refresh_token" => Some(Self::RefreshToken),
            _ => None,
        }
    }
}

impl std::fmt::Display for TokenTypeHint {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Revocation request as received at the revocation endpoint.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RevocationRequest {
    pub token: String,
    pub token_type_hint: Option<TokenTypeHint>,
    pub client_id: String,
    pub client_credential: ClientCredential,
}

impl RevocationRequest {
    pub fn new(client_id: impl Into<String>, token: impl Into<String>) -> Self {
        Self {
            token: token.into(),
            token_type_hint: None,
            client_id: client_id.into(),
            client_credential: ClientCredential::None,
        }
    }

    #[must_use]
    pub fn with_secret(mut self, secret: impl Into<String>) -> Self {
        self.client_credential = ClientCredential::Secret(secret.into());
        self
    }

    #[must_use]
    pub fn with_hint(mut self, hint: TokenTypeHint) -> Self {
        self.token_type_hint = Some(hint);
        self
    }

    /// Builds a request from decoded form pairs. Unknown fields are ignored.
    pub fn from_form<I, K, V>(pairs: I) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: AsRef<str>,
        V: Into<String>,
    {
        let mut request = Self::new(String::new(), String::new());
        for (key, value) in pairs {
            let value = value.into();
            match key.as_ref() {
                "token" => request.token = value,
                "token_type_hint" => request.token_type_hint = TokenTypeHint::parse(&value),
                "client_id" => request.client_id = value,
                "client_secret" if !value.is_empty() => {
                    request.client_credential = ClientCredential::Secret(value);
                }
                _ => {}
            }
        }
        request
    }
}
