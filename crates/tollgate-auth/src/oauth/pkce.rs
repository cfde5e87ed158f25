//! PKCE (Proof Key for Code Exchange, RFC 7636).
//!
//! Supports the `S256` and `plain` challenge methods. A code stored without
//! a method uses `plain`, as the RFC prescribes.
//!
//! # Example
//!
//! ```
//! use tollgate_auth::oauth::pkce::{PkceChallengeMethod, PkceVerifier, verify_code_challenge};
//!
//! let verifier = PkceVerifier::generate();
//! let challenge = PkceChallengeMethod::S256.challenge_for(&verifier);
//! assert!(verify_code_challenge(&challenge, Some("S256"), verifier.as_str()).is_ok());
//! ```

use base64::{Engine, engine::general_purpose::URL_SAFE_NO_PAD};
use sha2::{Digest, Sha256};

/// Errors that can occur during PKCE verification.
#[derive(Debug, thiserror::Error)]
pub enum PkceError {
    /// Verifier length is outside the valid range (43-128 characters).
    #[error("Invalid verifier length: must be 43-128 characters, got {0}")]
    InvalidVerifierLength(usize),

    /// Verifier contains invalid characters.
    #[error("Invalid verifier characters: must be [A-Za-z0-9-._~]")]
    InvalidVerifierCharacters,

    /// Unknown challenge method.
    #[error("Unsupported challenge method: {0}")]
    UnsupportedMethod(String),

    /// The verifier doesn't match the challenge.
    #[error("PKCE verification failed: verifier does not match challenge")]
    VerificationFailed,
}

impl PkceError {
    /// Get the OAuth 2.0 error code for this error.
    #[must_use]
    pub fn oauth_error_code(&self) -> &'static str {
        match self {
            Self::InvalidVerifierLength(_)
            | Self::InvalidVerifierCharacters
            | Self::UnsupportedMethod(_) => "invalid_request",
            Self::VerificationFailed => "invalid_grant",
        }
    }
}

/// PKCE challenge method.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum PkceChallengeMethod {
    /// Challenge equals the verifier.
    #[default]
    Plain,
    /// `BASE64URL(SHA256(ASCII(code_verifier)))`.
    S256,
}

impl PkceChallengeMethod {
    /// Parse challenge method from string.
    ///
    /// # Errors
    ///
    /// Returns `PkceError::UnsupportedMethod` for anything but `plain`/`S256`.
    pub fn parse(method: &str) -> Result<Self, PkceError> {
        match method {
            "S256" => Ok(Self::S256),
            "plain" => Ok(Self::Plain),
            other => Err(PkceError::UnsupportedMethod(other.to_string())),
        }
    }

    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Plain => "plain",
            Self::S256 => "S256",
        }
    }

    /// Computes the challenge a client would send for `verifier`.
    #[must_use]
    pub fn challenge_for(&self, verifier: &PkceVerifier) -> String {
        match self {
            Self::Plain => verifier.0.clone(),
            Self::S256 => URL_SAFE_NO_PAD.encode(Sha256::digest(verifier.0.as_bytes())),
        }
    }
}

impl std::fmt::Display for PkceChallengeMethod {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// PKCE code verifier.
///
/// 43-128 characters from `[A-Z] / [a-z] / [0-9] / "-" / "." / "_" / "~"`
/// (RFC 7636 Section 4.1).
#[derive(Debug, Clone)]
pub struct PkceVerifier(String);

impl PkceVerifier {
    /// Create a new verifier from a string.
    ///
    /// # Errors
    ///
    /// Returns an error if the length or character set is invalid.
    pub fn new(verifier: impl Into<String>) -> Result<Self, PkceError> {
        let verifier = verifier.into();
        let len = verifier.len();

        if !(43..=128).contains(&len) {
            return Err(PkceError::InvalidVerifierLength(len));
        }

        if !verifier
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || matches!(c, '-' | '.' | '_' | '~'))
        {
            return Err(PkceError::InvalidVerifierCharacters);
        }

        Ok(Self(verifier))
    }

    /// Generate a cryptographically random verifier (43 characters).
    #[must_use]
    pub fn generate() -> Self {
        use rand::Rng;
        let bytes: [u8; 32] = rand::thread_rng().r#gen();
        Self(URL_SAFE_NO_PAD.encode(bytes))
    }

    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

/// Checks a presented verifier against a stored challenge.
///
/// # Errors
///
/// Returns `PkceError` if the method is unknown, the verifier is malformed,
/// or it does not match.
pub fn verify_code_challenge(
    challenge: &str,
    method: Option<&str>,
    verifier: &str,
) -> Result<(), PkceError> {
    let method = method
        .map(PkceChallengeMethod::parse)
        .transpose()?
        .unwrap_or_default();
    let verifier = PkceVerifier::new(verifier)?;

    if method.challenge_for(&verifier) == challenge {
        Ok(())
    } else {
        Err(PkceError::VerificationFailed)
    }
}
