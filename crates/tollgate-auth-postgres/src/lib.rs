//! PostgreSQL storage backend for tollgate-auth.
//!
//! Provides [`PostgresGrantStore`], a [`PersistedGrantStore`] backed by the
//! `persisted_grants` table. Consumption and rotation are single
//! conditional statements (or one transaction), so concurrent redemptions
//! of the same refresh token or code resolve to exactly one winner.
//!
//! # Example
//!
//! ```ignore
//! use std::sync::Arc;
//! use tollgate_auth_postgres::PostgresGrantStore;
//!
//! let store = PostgresGrantStore::connect("postgres://localhost/tollgate").await?;
//! store.migrate().await?;
//!
//! let service = TokenService::builder(config)
//!     .with_clients(clients)
//!     .with_grant_store(Arc::new(store))
//!     .build()?;
//! ```
//!
//! [`PersistedGrantStore`]: tollgate_auth::storage::PersistedGrantStore

pub mod grant;
pub mod migrations;

use sqlx_core::pool::Pool;
use sqlx_postgres::Postgres;
use tollgate_auth::AuthError;

/// PostgreSQL connection pool type alias.
pub type PgPool = Pool<Postgres>;

pub use grant::PostgresGrantStore;

// =============================================================================
// Error Types
// =============================================================================

/// Errors that can occur during grant storage operations.
#[derive(Debug, thiserror::Error)]
pub enum StorageError {
    /// Database operation failed.
    #[error("Database error: {0}")]
    Database(#[from] sqlx_core::Error),

    /// A grant with the same key already exists.
    #[error("Conflict: {0}")]
    Conflict(String),

    /// A stored row could not be mapped back to a grant.
    #[error("Invalid row: {0}")]
    InvalidRow(String),

    /// Schema migration failed.
    #[error("Migration failed: {0}")]
    Migration(String),
}

impl StorageError {
    /// Create a `Conflict` error.
    #[must_use]
    pub fn conflict(message: impl Into<String>) -> Self {
        Self::Conflict(message.into())
    }

    /// Create an `InvalidRow` error.
    #[must_use]
    pub fn invalid_row(message: impl Into<String>) -> Self {
        Self::InvalidRow(message.into())
    }

    /// Returns `true` if this is a `Conflict` error.
    #[must_use]
    pub fn is_conflict(&self) -> bool {
        matches!(self, Self::Conflict(_))
    }

    /// Returns `true` if this is a database error.
    #[must_use]
    pub fn is_database_error(&self) -> bool {
        matches!(self, Self::Database(_))
    }
}

impl From<StorageError> for AuthError {
    fn from(e: StorageError) -> Self {
        AuthError::storage(e.to_string())
    }
}

/// Result type for storage operations.
pub type StorageResult<T> = Result<T, StorageError>;
