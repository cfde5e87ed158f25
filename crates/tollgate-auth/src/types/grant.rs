//! Persisted grant types.
//!
//! A persisted grant backs every refresh token, reference token and
//! authorization code. The handle handed to the client is never stored:
//! the store key is a SHA-256 hash of the handle and the grant type.

use serde::{Deserialize, Serialize};
use time::OffsetDateTime;

use crate::claims::{Claim, Principal};

/// Current version of the [`GrantData`] document.
pub const GRANT_DATA_VERSION: u32 = 1;

/// Kind of persisted grant.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PersistedGrantType {
    RefreshToken,
    ReferenceToken,
    AuthorizationCode,
}

impl PersistedGrantType {
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::RefreshToken => "refresh_token",
            Self::ReferenceToken => "reference_token",
            Self::AuthorizationCode => "authorization_code",
        }
    }

    /// Parses the stored representation.
    #[must_use]
    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "refresh_token" => Some(Self::RefreshToken),
            "reference_token" => Some(Self::ReferenceToken),
            "authorization_code" => Some(Self::AuthorizationCode),
            _ => None,
        }
    }
}

impl std::fmt::Display for PersistedGrantType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Durable record backing a refresh token, reference token or authorization code.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PersistedGrant {
    /// Hashed handle, see [`PersistedGrant::key_for`].
    pub key: String,

    #[serde(rename = "type")]
    pub grant_type: PersistedGrantType,

    pub client_id: String,

    /// Subject the grant was issued for (None for client-only grants).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub subject_id: Option<String>,

    #[serde(with = "time::serde::rfc3339")]
    pub creation_time: OffsetDateTime,

    #[serde(with = "time::serde::rfc3339")]
    pub expiration: OffsetDateTime,

    /// When the grant was consumed (None = still usable).
    #[serde(
        default,
        skip_serializing_if = "Option::is_none",
        with = "time::serde::rfc3339::option"
    )]
    pub consumed_time: Option<OffsetDateTime>,

    /// Serialized [`GrantData`].
    pub data: String,
}

impl PersistedGrant {
    /// Builds a new unconsumed grant for `handle`.
    ///
    /// # Errors
    ///
    /// Returns an error if the grant data cannot be serialized.
    pub fn new(
        handle: &str,
        grant_type: PersistedGrantType,
        client_id: impl Into<String>,
        data: &GrantData,
        creation_time: OffsetDateTime,
        expiration: OffsetDateTime,
    ) -> Result<Self, GrantDataError> {
        Ok(Self {
            key: Self::key_for(handle, grant_type),
            grant_type,
            client_id: client_id.into(),
            subject_id: data.subject.subject_id().map(str::to_string),
            creation_time,
            expiration,
            consumed_time: None,
            data: data.to_json()?,
        })
    }

    /// Derives the store key for a handle.
    ///
    /// The grant type is part of the hash, so a refresh handle can never be
    /// looked up as a reference token or code.
    #[must_use]
    pub fn key_for(handle: &str, grant_type: PersistedGrantType) -> String {
        use sha2::{Digest, Sha256};
        let mut hasher = Sha256::new();
        hasher.update(handle.as_bytes());
        hasher.update(b":");
        hasher.update(grant_type.as_str().as_bytes());
        hex::encode(hasher.finalize())
    }

    /// Generates a cryptographically secure random handle.
    ///
    /// Returns a 256-bit random value encoded as base64url (43 characters).
    #[must_use]
    pub fn generate_handle() -> String {
        use base64::Engine;
        use base64::engine::general_purpose::URL_SAFE_NO_PAD;

        let mut bytes = [0u8; 32];
        rand::Rng::fill(&mut rand::thread_rng(), &mut bytes);
        URL_SAFE_NO_PAD.encode(bytes)
    }

    /// Returns `true` if the grant is past its expiration at `now`.
    #[must_use]
    pub fn is_expired(&self, now: OffsetDateTime) -> bool {
        now >= self.expiration
    }

    #[must_use]
    pub fn is_consumed(&self) -> bool {
        self.consumed_time.is_some()
    }

    /// Decodes the grant payload.
    ///
    /// # Errors
    ///
    /// Returns an error if the payload is corrupt or of an unknown version.
    pub fn grant_data(&self) -> Result<GrantData, GrantDataError> {
        GrantData::from_json(&self.data)
    }
}

/// Payload stored with a persisted grant.
///
/// The subject is embedded in the claims codec representation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GrantData {
    pub version: u32,

    /// The principal the grant was issued for.
    pub subject: Principal,

    /// Scopes granted at issuance.
    pub scopes: Vec<String>,

    /// Access token claims (reference tokens only).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub claims: Option<Vec<Claim>>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub redirect_uri: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub code_challenge: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub code_challenge_method: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub nonce: Option<String>,
}

impl GrantData {
    pub fn new(subject: Principal, scopes: impl IntoIterator<Item = String>) -> Self {
        Self {
            version: GRANT_DATA_VERSION,
            subject,
            scopes: scopes.into_iter().collect(),
            claims: None,
            redirect_uri: None,
            code_challenge: None,
            code_challenge_method: None,
            nonce: None,
        }
    }

    /// Serializes the payload.
    ///
    /// # Errors
    ///
    /// Returns an error if a claim has an empty type or serialization fails.
    pub fn to_json(&self) -> Result<String, GrantDataError> {
        self.check_claim_types()?;
        Ok(serde_json::to_string(self)?)
    }

    /// Parses a payload, checking the version and the embedded principal.
    ///
    /// # Errors
    ///
    /// Returns an error for malformed JSON, unknown versions or invalid claims.
    pub fn from_json(input: &str) -> Result<Self, GrantDataError> {
        let data: Self = serde_json::from_str(input)?;
        if data.version != GRANT_DATA_VERSION {
            return Err(GrantDataError::UnsupportedVersion(data.version));
        }
        data.check_claim_types()?;
        Ok(data)
    }

    /// Grant data never holds a claim without a type, in the subject or in
    /// the stored access token claims.
    fn check_claim_types(&self) -> Result<(), GrantDataError> {
        if let Some(index) = self
            .subject
            .claims()
            .iter()
            .position(|c| c.claim_type().is_empty())
        {
            return Err(GrantDataError::EmptyClaimType { index });
        }
        if self
            .claims
            .iter()
            .flatten()
            .any(|c| c.claim_type().is_empty())
        {
            return Err(GrantDataError::EmptyTokenClaimType);
        }
        Ok(())
    }
}

/// Errors reading or writing [`GrantData`].
#[derive(Debug, thiserror::Error)]
pub enum GrantDataError {
    #[error("invalid grant data: {0}")]
    Json(#[from] serde_json::Error),

    #[error("unsupported grant data version {0}")]
    UnsupportedVersion(u32),

    #[error("subject claim at index {index} has an empty type")]
    EmptyClaimType { index: usize },

    #[error("stored token claim has an empty type")]
    EmptyTokenClaimType,
}
