//! Password and client secret helpers.
//!
//! - Resource owner passwords are hashed with Argon2id (PHC strings)
//! - Client secrets are random 256-bit values; clients store their SHA-256
//!   (see [`crate::types::hash_client_secret`])
//!
//! # Example
//!
//! ```
//! use tollgate_auth::password::{hash_password, verify_password};
//!
//! let hash = hash_password("bob").unwrap();
//! assert!(verify_password("bob", &hash).unwrap());
//! assert!(!verify_password("alice", &hash).unwrap());
//! ```

use argon2::{
    Argon2,
    password_hash::{PasswordHash, PasswordHasher, PasswordVerifier, SaltString, rand_core::OsRng},
};
use rand::Rng;

/// Generates a new client secret.
///
/// 32 random bytes, hex encoded (64 characters).
#[must_use]
pub fn generate_client_secret() -> String {
    let bytes: [u8; 32] = rand::thread_rng().r#gen();
    hex::encode(bytes)
}

/// Hashes a password with Argon2id and a random salt.
///
/// # Errors
///
/// Returns `argon2::password_hash::Error` if hashing fails (rare).
pub fn hash_password(password: &str) -> Result<String, argon2::password_hash::Error> {
    let salt = SaltString::generate(&mut OsRng);
    let hash = Argon2::default().hash_password(password.as_bytes(), &salt)?;
    Ok(hash.to_string())
}

/// Verifies a password against a PHC-formatted Argon2 hash.
///
/// Returns `Ok(false)` on mismatch and `Err` only if the hash is malformed.
///
/// # Errors
///
/// Returns `argon2::password_hash::Error` if `hash` cannot be parsed.
pub fn verify_password(password: &str, hash: &str) -> Result<bool, argon2::password_hash::Error> {
    let parsed = PasswordHash::new(hash)?;
    Ok(Argon2::default()
        .verify_password(password.as_bytes(), &parsed)
        .is_ok())
}
