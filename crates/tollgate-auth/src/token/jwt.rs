//! JWT signing and verification.
//!
//! Tokens are signed with RSA keys (RS256 or RS384). The payload is the
//! merged claim object produced by [`JwtPayload::from_claims`]; access tokens
//! carry `typ: at+jwt` (RFC 9068), identity tokens `typ: JWT`.
//!
//! ## Example
//!
//! ```ignore
//! use tollgate_auth::token::jwt::{JwtSigner, SigningAlgorithm, SigningKeyPair, TokenKind};
//!
//! let key_pair = SigningKeyPair::generate_rsa(SigningAlgorithm::RS256)?;
//! let signer = JwtSigner::new(key_pair, "https://auth.example.com");
//!
//! let token = signer.sign(&payload, TokenKind::AccessToken)?;
//! let verified = signer.decode(&token)?;
//! ```

use std::fmt;
use std::path::Path;

use base64::{Engine, engine::general_purpose::URL_SAFE_NO_PAD};
use jsonwebtoken::{Algorithm, DecodingKey, EncodingKey, Header, Validation, decode, encode};
use rand::rngs::OsRng;
use rsa::pkcs1::DecodeRsaPrivateKey;
use rsa::pkcs8::{DecodePrivateKey, EncodePrivateKey, EncodePublicKey, LineEnding};
use rsa::traits::PublicKeyParts;
use rsa::{RsaPrivateKey, RsaPublicKey};
use serde::{Deserialize, Serialize};

use crate::config::SigningConfig;
use crate::token::payload::JwtPayload;

const RSA_KEY_BITS: usize = 2048;

// ============================================================================
// Error Types
// ============================================================================

/// Errors that can occur during JWT operations.
#[derive(Debug, thiserror::Error)]
pub enum JwtError {
    /// Failed to encode a token.
    #[error("Failed to encode token: {message}")]
    EncodingError { message: String },

    /// Failed to decode a token.
    #[error("Failed to decode token: {message}")]
    DecodingError { message: String },

    /// The token has expired.
    #[error("Token expired")]
    Expired,

    /// The token signature is invalid.
    #[error("Invalid signature")]
    InvalidSignature,

    /// The token claims are invalid.
    #[error("Invalid claims: {message}")]
    InvalidClaims { message: String },

    /// Failed to generate a cryptographic key.
    #[error("Key generation error: {message}")]
    KeyGenerationError { message: String },

    /// Invalid key format or data.
    #[error("Invalid key: {message}")]
    InvalidKey { message: String },
}

impl JwtError {
    #[must_use]
    pub fn encoding_error(message: impl Into<String>) -> Self {
        Self::EncodingError {
            message: message.into(),
        }
    }

    #[must_use]
    pub fn decoding_error(message: impl Into<String>) -> Self {
        Self::DecodingError {
            message: message.into(),
        }
    }

    #[must_use]
    pub fn invalid_claims(message: impl Into<String>) -> Self {
        Self::InvalidClaims {
            message: message.into(),
        }
    }

    #[must_use]
    pub fn key_generation_error(message: impl Into<String>) -> Self {
        Self::KeyGenerationError {
            message: message.into(),
        }
    }

    #[must_use]
    pub fn invalid_key(message: impl Into<String>) -> Self {
        Self::InvalidKey {
            message: message.into(),
        }
    }

    /// Returns `true` if the token itself was rejected (expired, bad signature, bad claims).
    #[must_use]
    pub fn is_validation_error(&self) -> bool {
        matches!(
            self,
            Self::Expired | Self::InvalidSignature | Self::InvalidClaims { .. }
        )
    }

    /// Returns `true` if this is a key-related error.
    #[must_use]
    pub fn is_key_error(&self) -> bool {
        matches!(
            self,
            Self::KeyGenerationError { .. } | Self::InvalidKey { .. }
        )
    }
}

impl From<jsonwebtoken::errors::Error> for JwtError {
    fn from(err: jsonwebtoken::errors::Error) -> Self {
        use jsonwebtoken::errors::ErrorKind;

        match err.kind() {
            ErrorKind::ExpiredSignature => Self::Expired,
            ErrorKind::InvalidSignature => Self::InvalidSignature,
            ErrorKind::InvalidAudience
            | ErrorKind::InvalidIssuer
            | ErrorKind::InvalidSubject
            | ErrorKind::ImmatureSignature
            | ErrorKind::MissingRequiredClaim(_) => Self::invalid_claims(err.to_string()),
            ErrorKind::InvalidRsaKey(_) | ErrorKind::InvalidKeyFormat => {
                Self::invalid_key(err.to_string())
            }
            _ => Self::decoding_error(err.to_string()),
        }
    }
}

// ============================================================================
// Signing Algorithm
// ============================================================================

/// Supported signing algorithms.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SigningAlgorithm {
    /// RSA with SHA-256 (widely compatible, the default).
    RS256,
    /// RSA with SHA-384.
    RS384,
}

impl SigningAlgorithm {
    #[must_use]
    pub fn to_jwt_algorithm(self) -> Algorithm {
        match self {
            Self::RS256 => Algorithm::RS256,
            Self::RS384 => Algorithm::RS384,
        }
    }

    /// Returns the algorithm name as used in JWK/JWT headers.
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::RS256 => "RS256",
            Self::RS384 => "RS384",
        }
    }

    /// Parses a header algorithm name.
    #[must_use]
    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "RS256" => Some(Self::RS256),
            "RS384" => Some(Self::RS384),
            _ => None,
        }
    }
}

impl fmt::Display for SigningAlgorithm {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

// ============================================================================
// Token Kind
// ============================================================================

/// Which token a payload is signed as.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TokenKind {
    AccessToken,
    IdentityToken,
}

impl TokenKind {
    /// The JOSE `typ` header value.
    #[must_use]
    pub fn typ(&self) -> &'static str {
        match self {
            Self::AccessToken => "at+jwt",
            Self::IdentityToken => "JWT",
        }
    }
}

// ============================================================================
// JWKS
// ============================================================================

/// JSON Web Key Set.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Jwks {
    pub keys: Vec<Jwk>,
}

/// RSA JSON Web Key (public part only).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Jwk {
    /// Key type, always "RSA".
    pub kty: String,

    pub kid: String,

    /// Key use ("sig").
    #[serde(rename = "use")]
    pub use_: String,

    pub alg: String,

    /// Modulus (base64url).
    pub n: String,

    /// Exponent (base64url).
    pub e: String,
}

// ============================================================================
// Signing Key Pair
// ============================================================================

/// An RSA key pair with its key ID.
pub struct SigningKeyPair {
    pub kid: String,
    pub algorithm: SigningAlgorithm,
    encoding_key: EncodingKey,
    decoding_key: DecodingKey,
    public_key: RsaPublicKey,
}

impl fmt::Debug for SigningKeyPair {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SigningKeyPair")
            .field("kid", &self.kid)
            .field("algorithm", &self.algorithm)
            .finish_non_exhaustive()
    }
}

impl SigningKeyPair {
    /// Generates a fresh RSA key pair with a random key ID.
    ///
    /// # Errors
    /// Returns an error if key generation fails.
    pub fn generate_rsa(algorithm: SigningAlgorithm) -> Result<Self, JwtError> {
        let private_pem = generate_rsa_private_key_pem()?;
        Self::from_pem(uuid::Uuid::new_v4().to_string(), algorithm, &private_pem)
    }

    /// Loads a key pair from a PEM private key (PKCS#8 or PKCS#1).
    ///
    /// The public half is derived from the private key.
    ///
    /// # Errors
    /// Returns an error if the PEM data is not an RSA private key.
    pub fn from_pem(
        kid: impl Into<String>,
        algorithm: SigningAlgorithm,
        private_pem: &str,
    ) -> Result<Self, JwtError> {
        let private_key = RsaPrivateKey::from_pkcs8_pem(private_pem)
            .or_else(|_| RsaPrivateKey::from_pkcs1_pem(private_pem))
            .map_err(|e| JwtError::invalid_key(e.to_string()))?;
        let public_key = private_key.to_public_key();

        let encoding_key = EncodingKey::from_rsa_pem(private_pem.as_bytes())
            .map_err(|e| JwtError::invalid_key(e.to_string()))?;

        let public_pem = public_key
            .to_public_key_pem(LineEnding::LF)
            .map_err(|e| JwtError::invalid_key(e.to_string()))?;
        let decoding_key = DecodingKey::from_rsa_pem(public_pem.as_bytes())
            .map_err(|e| JwtError::invalid_key(e.to_string()))?;

        Ok(Self {
            kid: kid.into(),
            algorithm,
            encoding_key,
            decoding_key,
            public_key,
        })
    }

    /// Loads a key pair from a PEM file.
    ///
    /// # Errors
    /// Returns an error if the file cannot be read or is not an RSA key.
    pub fn from_pem_file(
        kid: impl Into<String>,
        algorithm: SigningAlgorithm,
        path: impl AsRef<Path>,
    ) -> Result<Self, JwtError> {
        let path = path.as_ref();
        let pem = std::fs::read_to_string(path)
            .map_err(|e| JwtError::invalid_key(format!("{}: {e}", path.display())))?;
        Self::from_pem(kid, algorithm, &pem)
    }

    /// Exports the public key as a JWK.
    #[must_use]
    pub fn to_jwk(&self) -> Jwk {
        Jwk {
            kty: "RSA".to_string(),
            kid: self.kid.clone(),
            use_: "sig".to_string(),
            alg: self.algorithm.as_str().to_string(),
            n: URL_SAFE_NO_PAD.encode(self.public_key.n().to_bytes_be()),
            e: URL_SAFE_NO_PAD.encode(self.public_key.e().to_bytes_be()),
        }
    }
}

/// Generates a new RSA private key and returns it as PKCS#8 PEM.
///
/// # Errors
/// Returns an error if key generation or encoding fails.
pub fn generate_rsa_private_key_pem() -> Result<String, JwtError> {
    let private_key = RsaPrivateKey::new(&mut OsRng, RSA_KEY_BITS)
        .map_err(|e| JwtError::key_generation_error(e.to_string()))?;
    let pem = private_key
        .to_pkcs8_pem(LineEnding::LF)
        .map_err(|e| JwtError::key_generation_error(e.to_string()))?;
    Ok(pem.to_string())
}

// ============================================================================
// Signer
// ============================================================================

/// Produces compact JWS tokens from a claim payload.
pub trait TokenSigner: Send + Sync {
    /// Signs `payload` as a token of the given kind.
    ///
    /// # Errors
    /// Returns an error if the signing key is unusable.
    fn sign(&self, payload: &JwtPayload, kind: TokenKind) -> Result<String, JwtError>;

    /// Public keys verifying parties use to check signatures.
    fn jwks(&self) -> Jwks;
}

/// [`TokenSigner`] backed by a single RSA key pair.
///
/// Thread-safe (`Send + Sync`); share it behind an `Arc`.
#[derive(Debug)]
pub struct JwtSigner {
    signing_key: SigningKeyPair,
    issuer: String,
}

impl JwtSigner {
    #[must_use]
    pub fn new(signing_key: SigningKeyPair, issuer: impl Into<String>) -> Self {
        Self {
            signing_key,
            issuer: issuer.into(),
        }
    }

    /// Builds a signer from configuration.
    ///
    /// Loads the key from `private_key_path` when set, otherwise generates an
    /// ephemeral key (tokens stop verifying after a restart).
    ///
    /// # Errors
    /// Returns an error if the algorithm is unknown or the key cannot be loaded.
    pub fn from_config(config: &SigningConfig, issuer: impl Into<String>) -> Result<Self, JwtError> {
        let algorithm = SigningAlgorithm::parse(&config.algorithm).ok_or_else(|| {
            JwtError::invalid_key(format!("unsupported algorithm {}", config.algorithm))
        })?;

        let key_pair = match &config.private_key_path {
            Some(path) => {
                let kid = config
                    .key_id
                    .clone()
                    .unwrap_or_else(|| uuid::Uuid::new_v4().to_string());
                SigningKeyPair::from_pem_file(kid, algorithm, path)?
            }
            None => {
                tracing::warn!("No signing key configured, generating an ephemeral key");
                let mut key_pair = SigningKeyPair::generate_rsa(algorithm)?;
                if let Some(kid) = &config.key_id {
                    key_pair.kid = kid.clone();
                }
                key_pair
            }
        };

        Ok(Self::new(key_pair, issuer))
    }

    /// Verifies a token signed by this signer and returns its payload.
    ///
    /// Checks signature, issuer and expiration; audience is left to the caller.
    ///
    /// # Errors
    /// Returns an error if the token is malformed, expired or not ours.
    pub fn decode(&self, token: &str) -> Result<JwtPayload, JwtError> {
        self.decode_with(token, true)
    }

    /// Like [`decode`](Self::decode) but accepts expired tokens.
    ///
    /// # Errors
    /// Returns an error if the token is malformed or not ours.
    pub fn decode_allow_expired(&self, token: &str) -> Result<JwtPayload, JwtError> {
        self.decode_with(token, false)
    }

    fn decode_with(&self, token: &str, validate_exp: bool) -> Result<JwtPayload, JwtError> {
        let mut validation = Validation::new(self.signing_key.algorithm.to_jwt_algorithm());
        validation.set_issuer(&[&self.issuer]);
        validation.validate_exp = validate_exp;
        validation.validate_aud = false;
        if !validate_exp {
            validation.required_spec_claims.remove("exp");
        }

        let data = decode::<JwtPayload>(token, &self.signing_key.decoding_key, &validation)?;
        Ok(data.claims)
    }

    #[must_use]
    pub fn current_kid(&self) -> &str {
        &self.signing_key.kid
    }

    #[must_use]
    pub fn issuer(&self) -> &str {
        &self.issuer
    }
}

impl TokenSigner for JwtSigner {
    fn sign(&self, payload: &JwtPayload, kind: TokenKind) -> Result<String, JwtError> {
        let mut header = Header::new(self.signing_key.algorithm.to_jwt_algorithm());
        header.typ = Some(kind.typ().to_string());
        header.kid = Some(self.signing_key.kid.clone());

        encode(&header, payload, &self.signing_key.encoding_key)
            .map_err(|e| JwtError::encoding_error(e.to_string()))
    }

    fn jwks(&self) -> Jwks {
        Jwks {
            keys: vec![self.signing_key.to_jwk()],
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::claims::Claim;
    use serde_json::json;

    fn payload(issuer: &str, exp_offset: i64) -> JwtPayload {
        let now = time::OffsetDateTime::now_utc().unix_timestamp();
        JwtPayload::from_claims(&[
            Claim::new("iss", issuer),
            Claim::new("aud", "api"),
            Claim::integer("exp", now + exp_offset),
            Claim::new("client_id", "client"),
            Claim::new("scope", "api1"),
        ])
    }

    fn header_of(token: &str) -> serde_json::Value {
        let header = token.split('.').next().unwrap();
        serde_json::from_slice(&URL_SAFE_NO_PAD.decode(header).unwrap()).unwrap()
    }

    #[test]
    fn test_sign_and_decode_access_token() {
        let key_pair = SigningKeyPair::generate_rsa(SigningAlgorithm::RS256).unwrap();
        let kid = key_pair.kid.clone();
        let signer = JwtSigner::new(key_pair, "https://auth.example.com");

        let token = signer
            .sign(&payload("https://auth.example.com", 3600), TokenKind::AccessToken)
            .unwrap();
        assert_eq!(token.split('.').count(), 3);

        let header = header_of(&token);
        assert_eq!(header["typ"], "at+jwt");
        assert_eq!(header["alg"], "RS256");
        assert_eq!(header["kid"], kid.as_str());

        let decoded = signer.decode(&token).unwrap();
        assert_eq!(decoded.get("client_id"), Some(&json!("client")));
        assert_eq!(decoded.get("scope"), Some(&json!(["api1"])));
    }

    #[test]
    fn test_identity_token_typ_and_rs384() {
        let key_pair = SigningKeyPair::generate_rsa(SigningAlgorithm::RS384).unwrap();
        let signer = JwtSigner::new(key_pair, "https://auth.example.com");

        let token = signer
            .sign(&payload("https://auth.example.com", 300), TokenKind::IdentityToken)
            .unwrap();
        let header = header_of(&token);
        assert_eq!(header["typ"], "JWT");
        assert_eq!(header["alg"], "RS384");
        assert!(signer.decode(&token).is_ok());
    }

    #[test]
    fn test_expired_token_rejected() {
        let key_pair = SigningKeyPair::generate_rsa(SigningAlgorithm::RS256).unwrap();
        let signer = JwtSigner::new(key_pair, "https://auth.example.com");

        let token = signer
            .sign(&payload("https://auth.example.com", -3600), TokenKind::AccessToken)
            .unwrap();

        assert!(matches!(signer.decode(&token), Err(JwtError::Expired)));
        assert!(signer.decode_allow_expired(&token).is_ok());
    }

    #[test]
    fn test_foreign_issuer_and_signature_rejected() {
        let signer1 = JwtSigner::new(
            SigningKeyPair::generate_rsa(SigningAlgorithm::RS256).unwrap(),
            "https://auth.example.com",
        );
        let signer2 = JwtSigner::new(
            SigningKeyPair::generate_rsa(SigningAlgorithm::RS256).unwrap(),
            "https://auth.example.com",
        );

        let token = signer1
            .sign(&payload("https://auth.example.com", 3600), TokenKind::AccessToken)
            .unwrap();
        assert!(matches!(signer2.decode(&token), Err(JwtError::InvalidSignature)));

        let token = signer1
            .sign(&payload("https://elsewhere.example.com", 3600), TokenKind::AccessToken)
            .unwrap();
        let err = signer1.decode(&token).unwrap_err();
        assert!(err.is_validation_error());
    }

    #[test]
    fn test_from_pem_roundtrip_and_jwks() {
        let pem = generate_rsa_private_key_pem().unwrap();
        let key_pair = SigningKeyPair::from_pem("key-1", SigningAlgorithm::RS256, &pem).unwrap();
        let signer = JwtSigner::new(key_pair, "https://auth.example.com");

        let jwks = signer.jwks();
        assert_eq!(jwks.keys.len(), 1);
        let jwk = &jwks.keys[0];
        assert_eq!(jwk.kty, "RSA");
        assert_eq!(jwk.kid, "key-1");
        assert_eq!(jwk.use_, "sig");
        assert_eq!(jwk.e, "AQAB");

        let json = serde_json::to_value(&jwks).unwrap();
        assert_eq!(json["keys"][0]["use"], "sig");
    }

    #[test]
    fn test_from_pem_rejects_garbage() {
        let err = SigningKeyPair::from_pem("kid", SigningAlgorithm::RS256, "not a key").unwrap_err();
        assert!(err.is_key_error());
    }

    #[test]
    fn test_signing_algorithm_parse() {
        assert_eq!(SigningAlgorithm::parse("RS256"), Some(SigningAlgorithm::RS256));
        assert_eq!(SigningAlgorithm::parse("RS384"), Some(SigningAlgorithm::RS384));
        assert_eq!(SigningAlgorithm::parse("HS256"), None);
        assert_eq!(SigningAlgorithm::RS384.to_string(), "RS384");
    }
}
