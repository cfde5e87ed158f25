//! Profile service: which subject claims a set of scopes unlocks.

use std::collections::{HashMap, HashSet};

use async_trait::async_trait;

use crate::AuthResult;
use crate::claims::{Claim, Principal};

/// Maps a subject and its granted scopes to the claims it may expose.
#[async_trait]
pub trait ProfileService: Send + Sync {
    /// Returns the subject's claims visible under `scopes`.
    ///
    /// # Errors
    ///
    /// Returns an error if the profile source fails.
    async fn get_claims(&self, subject: &Principal, scopes: &[String]) -> AuthResult<Vec<Claim>>;
}

/// Profile service backed by a static scope → claim types table.
///
/// Claims are taken from the subject principal itself, in principal order.
#[derive(Debug, Clone, Default)]
pub struct ScopeClaimsProfile {
    scopes: HashMap<String, Vec<String>>,
}

impl ScopeClaimsProfile {
    /// Creates an empty table; no claims are released.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Table with the OpenID Connect `profile` and `email` scopes.
    #[must_use]
    pub fn standard() -> Self {
        Self::new()
            .with_scope(
                "profile",
                [
                    "name",
                    "family_name",
                    "given_name",
                    "preferred_username",
                    "website",
                ],
            )
            .with_scope("email", ["email", "email_verified"])
    }

    /// Maps `scope` to the claim types it releases.
    #[must_use]
    pub fn with_scope<I, S>(mut self, scope: impl Into<String>, claim_types: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.scopes
            .entry(scope.into())
            .or_default()
            .extend(claim_types.into_iter().map(Into::into));
        self
    }

    fn released_types<'a>(&'a self, scopes: &'a [String]) -> HashSet<&'a str> {
        scopes
            .iter()
            .filter_map(|s| self.scopes.get(s))
            .flatten()
            .map(String::as_str)
            .collect()
    }
}

#[async_trait]
impl ProfileService for ScopeClaimsProfile {
    async fn get_claims(&self, subject: &Principal, scopes: &[String]) -> AuthResult<Vec<Claim>> {
        let released = self.released_types(scopes);
        Ok(subject
            .claims()
            .iter()
            .filter(|c| released.contains(c.claim_type()))
            .cloned()
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn bob() -> Principal {
        Principal::new(
            "password",
            vec![
                Claim::new("sub", "bob"),
                Claim::new("name", "Bob Smith"),
                Claim::new("email", "bob@example.com"),
                Claim::new("role", "admin"),
                Claim::new("role", "user"),
            ],
        )
    }

    #[tokio::test]
    async fn test_releases_only_mapped_claims() {
        let profile = ScopeClaimsProfile::standard();
        let claims = profile
            .get_claims(&bob(), &["profile".to_string()])
            .await
            .unwrap();
        assert_eq!(claims, vec![Claim::new("name", "Bob Smith")]);
    }

    #[tokio::test]
    async fn test_unknown_scope_releases_nothing() {
        let profile = ScopeClaimsProfile::standard();
        let claims = profile
            .get_claims(&bob(), &["api1".to_string()])
            .await
            .unwrap();
        assert!(claims.is_empty());
    }

    #[tokio::test]
    async fn test_duplicate_types_are_kept() {
        let profile = ScopeClaimsProfile::new().with_scope("roles", ["role"]);
        let claims = profile
            .get_claims(&bob(), &["roles".to_string(), "api1".to_string()])
            .await
            .unwrap();
        assert_eq!(claims.len(), 2);
        assert_eq!(claims[1].value(), "user");
    }
}
