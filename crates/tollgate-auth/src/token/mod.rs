//! Token content, signing and issuance.
//!
//! - [`content`] - access/identity token claim assembly
//! - [`payload`] - claim list to JWT payload (duplicate types become arrays)
//! - [`jwt`] - RSA signing, verification and JWKS
//! - [`hook`] - custom response extensibility hook
//! - [`service`] - the issuance engine behind the token endpoint
//! - [`revocation`] - token revocation requests (RFC 7009)

pub mod content;
pub mod hook;
pub mod jwt;
pub mod payload;
pub mod revocation;
pub mod service;

pub use content::{RESERVED_CLAIMS, TokenContent, TokenContentBuilder, apply_claim_overrides};
pub use hook::{
    Augmentation, DraftTokens, HookContext, HookError, HookWarning, TokenResponseHook, run_hook,
};
pub use jwt::{
    Jwk, Jwks, JwtError, JwtSigner, SigningAlgorithm, SigningKeyPair, TokenKind, TokenSigner,
    generate_rsa_private_key_pem,
};
pub use payload::JwtPayload;
pub use revocation::{RevocationRequest, TokenTypeHint};
pub use service::{TokenService, TokenServiceBuilder};
