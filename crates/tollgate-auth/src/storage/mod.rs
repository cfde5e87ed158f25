//! Storage and collaborator traits.
//!
//! This module defines the interfaces the token pipeline consumes:
//!
//! - [`ClientStore`] - OAuth client registry and authentication
//! - [`ResourceOwnerValidator`] - username/password checks for the password grant
//! - [`ProfileService`] - scope-filtered subject claims
//! - [`PersistedGrantStore`] - refresh tokens, reference tokens and codes
//!
//! # Implementations
//!
//! - [`memory`] - in-memory implementations of every trait
//! - `tollgate-auth-postgres` - PostgreSQL grant store

pub mod client;
pub mod grant;
pub mod lifecycle;
pub mod memory;
pub mod profile;
pub mod resource_owner;

pub use client::ClientStore;
pub use grant::PersistedGrantStore;
pub use lifecycle::{PersistedGrants, spawn_expiry_sweeper};
pub use memory::{
    InMemoryClientStore, InMemoryGrantStore, InMemoryUser, InMemoryUserStore,
};
pub use profile::{ProfileService, ScopeClaimsProfile};
pub use resource_owner::ResourceOwnerValidator;
