//! Domain types shared across the crate.
//!
//! - [`Client`] - OAuth 2.0 client registration
//! - [`GrantType`] - Built-in OAuth grant types
//! - [`PersistedGrant`] - Stored state behind refresh/reference tokens and codes

pub mod client;
pub mod grant;

pub use client::{AccessTokenType, Client, ClientValidationError, GrantType, hash_client_secret};
pub use grant::{GRANT_DATA_VERSION, GrantData, GrantDataError, PersistedGrant, PersistedGrantType};
