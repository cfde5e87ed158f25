//! # tollgate-auth
//!
//! OAuth 2.0 / OpenID Connect token request validation and issuance.
//!
//! This crate provides:
//! - Token request validation with pluggable grant validators
//! - Access, identity and refresh token issuance
//! - A stable JSON codec for claims and principals
//! - Persisted grant storage with rotation, sliding expiry and replay detection
//! - A hook for custom response fields and claims
//!
//! HTTP transport, consent UI and key management are left to the caller;
//! the crate consumes them through the traits in [`storage`] and
//! [`token::jwt::TokenSigner`].
//!
//! ## Modules
//!
//! - [`claims`] - claims, principals and their codec
//! - [`config`] - issuer, lifetimes, refresh policy and signing configuration
//! - [`grants`] - built-in grant validators and the grant registry
//! - [`oauth`] - token endpoint wire types and request validation
//! - [`storage`] - collaborator traits and in-memory implementations
//! - [`token`] - claim assembly, signing and the issuance engine
//! - [`types`] - clients and persisted grants

pub mod claims;
pub mod clock;
pub mod config;
pub mod error;
pub mod grants;
pub mod oauth;
pub mod password;
pub mod storage;
pub mod token;
pub mod types;

pub use config::{AuthConfig, ConfigError, RefreshTokenPolicy};
pub use error::{AuthError, ErrorCategory};
pub use token::{TokenService, TokenServiceBuilder};
pub use types::{Client, ClientValidationError, GrantType};

/// Type alias for authentication/authorization results.
pub type AuthResult<T> = Result<T, AuthError>;

/// Prelude module for convenient imports.
///
/// ```ignore
/// use tollgate_auth::prelude::*;
/// ```
pub mod prelude {
    pub use crate::AuthResult;
    pub use crate::claims::{Claim, Principal, claim_types, value_types};
    pub use crate::clock::{Clock, ManualClock, SystemClock};
    pub use crate::config::{AuthConfig, ConfigError, RefreshTokenPolicy};
    pub use crate::error::{AuthError, ErrorCategory};
    pub use crate::grants::{GrantContext, GrantValidator};
    pub use crate::oauth::{
        ClientCredential, GrantFailure, GrantValidationOutcome, TokenError, TokenErrorCode,
        TokenRequest, TokenResponse, ValidatedGrant,
    };
    pub use crate::storage::{
        ClientStore, PersistedGrantStore, ProfileService, ResourceOwnerValidator,
    };
    pub use crate::token::{
        Augmentation, HookContext, HookError, TokenResponseHook, TokenService, TokenSigner,
    };
    pub use crate::types::{AccessTokenType, Client, GrantType, PersistedGrant, PersistedGrantType};
}
