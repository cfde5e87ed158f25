//! OAuth 2.0 token endpoint protocol types and request validation.
//!
//! - [`token`] - request/response/error wire types
//! - [`outcome`] - grant validation outcomes
//! - [`validator`] - client authentication and grant dispatch
//! - [`pkce`] - RFC 7636 verification for authorization codes

pub mod outcome;
pub mod pkce;
pub mod token;
pub mod validator;

pub use outcome::{GrantFailure, GrantValidationOutcome, ValidatedGrant};
pub use pkce::{PkceChallengeMethod, PkceError, PkceVerifier};
pub use token::{
    ClientCredential, IssuedTokens, STANDARD_RESPONSE_FIELDS, TokenError, TokenErrorCode,
    TokenRequest, TokenResponse, is_standard_response_field,
};
pub use validator::TokenRequestValidator;
