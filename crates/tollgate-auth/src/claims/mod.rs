//! Claims and principals.
//!
//! A [`Claim`] is an immutable `(type, value, valueType)` triple. A
//! [`Principal`] is an authentication type plus an ordered list of claims,
//! where several claims may share a type (`role`, `amr`, ...).
//!
//! Both are plain values with a stable JSON representation, see [`codec`].

pub mod codec;

use serde::{Deserialize, Serialize};

pub use codec::{
    CodecError, decode_claim, decode_principal, encode_claim, encode_principal,
};

/// Well-known claim types.
pub mod claim_types {
    pub const SUBJECT: &str = "sub";
    pub const ISSUER: &str = "iss";
    pub const AUDIENCE: &str = "aud";
    pub const EXPIRATION: &str = "exp";
    pub const NOT_BEFORE: &str = "nbf";
    pub const ISSUED_AT: &str = "iat";
    pub const JWT_ID: &str = "jti";
    pub const CLIENT_ID: &str = "client_id";
    pub const SCOPE: &str = "scope";
    pub const AUTHENTICATION_METHOD: &str = "amr";
    pub const AUTHENTICATION_TIME: &str = "auth_time";
    pub const IDENTITY_PROVIDER: &str = "idp";
    pub const NONCE: &str = "nonce";
    pub const NAME: &str = "name";
    pub const EMAIL: &str = "email";
    pub const ROLE: &str = "role";
}

/// Value type URIs carried in [`Claim::value_type`].
pub mod value_types {
    pub const STRING: &str = "http://www.w3.org/2001/XMLSchema#string";
    pub const INTEGER: &str = "http://www.w3.org/2001/XMLSchema#integer";
    pub const INTEGER32: &str = "http://www.w3.org/2001/XMLSchema#integer32";
    pub const INTEGER64: &str = "http://www.w3.org/2001/XMLSchema#integer64";
    pub const BOOLEAN: &str = "http://www.w3.org/2001/XMLSchema#boolean";
    pub const DOUBLE: &str = "http://www.w3.org/2001/XMLSchema#double";
    /// Value is a serialized JSON document (object or array).
    pub const JSON: &str = "json";
}

/// A typed assertion about a subject.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Claim {
    #[serde(rename = "type")]
    claim_type: String,
    value: String,
    #[serde(rename = "valueType", default = "default_value_type")]
    value_type: String,
}

fn default_value_type() -> String {
    value_types::STRING.to_string()
}

impl Claim {
    /// Creates a string-valued claim.
    pub fn new(claim_type: impl Into<String>, value: impl Into<String>) -> Self {
        Self::typed(claim_type, value, value_types::STRING)
    }

    /// Creates a claim with an explicit value type.
    pub fn typed(
        claim_type: impl Into<String>,
        value: impl Into<String>,
        value_type: impl Into<String>,
    ) -> Self {
        Self {
            claim_type: claim_type.into(),
            value: value.into(),
            value_type: value_type.into(),
        }
    }

    /// Creates an integer-valued claim (timestamps, counters).
    pub fn integer(claim_type: impl Into<String>, value: i64) -> Self {
        Self::typed(claim_type, value.to_string(), value_types::INTEGER64)
    }

    /// Creates a boolean-valued claim.
    pub fn boolean(claim_type: impl Into<String>, value: bool) -> Self {
        Self::typed(claim_type, value.to_string(), value_types::BOOLEAN)
    }

    /// Creates a claim holding a JSON document.
    pub fn json(claim_type: impl Into<String>, value: &serde_json::Value) -> Self {
        Self::typed(claim_type, value.to_string(), value_types::JSON)
    }

    pub fn claim_type(&self) -> &str {
        &self.claim_type
    }

    pub fn value(&self) -> &str {
        &self.value
    }

    pub fn value_type(&self) -> &str {
        &self.value_type
    }
}

/// An authenticated subject and its claims.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Principal {
    #[serde(default)]
    authentication_type: String,
    #[serde(default)]
    claims: Vec<Claim>,
}

impl Principal {
    /// Creates a principal from an authentication type and claims.
    pub fn new(authentication_type: impl Into<String>, claims: Vec<Claim>) -> Self {
        Self {
            authentication_type: authentication_type.into(),
            claims,
        }
    }

    /// Returns a copy of this principal with `claim` appended.
    #[must_use]
    pub fn with_claim(mut self, claim: Claim) -> Self {
        self.claims.push(claim);
        self
    }

    /// Returns a copy of this principal with `claims` appended in order.
    #[must_use]
    pub fn with_claims(mut self, claims: impl IntoIterator<Item = Claim>) -> Self {
        self.claims.extend(claims);
        self
    }

    pub fn authentication_type(&self) -> &str {
        &self.authentication_type
    }

    pub fn claims(&self) -> &[Claim] {
        &self.claims
    }

    /// The `sub` claim, if the principal has one.
    pub fn subject_id(&self) -> Option<&str> {
        self.find_first(claim_types::SUBJECT).map(Claim::value)
    }

    /// First claim of the given type.
    pub fn find_first(&self, claim_type: &str) -> Option<&Claim> {
        self.claims.iter().find(|c| c.claim_type == claim_type)
    }

    /// All claims of the given type, in order.
    pub fn find_all<'a>(&'a self, claim_type: &'a str) -> impl Iterator<Item = &'a Claim> + 'a {
        self.claims.iter().filter(move |c| c.claim_type == claim_type)
    }

    pub fn has_claim(&self, claim_type: &str) -> bool {
        self.find_first(claim_type).is_some()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_claim_constructors() {
        let claim = Claim::new("role", "admin");
        assert_eq!(claim.claim_type(), "role");
        assert_eq!(claim.value(), "admin");
        assert_eq!(claim.value_type(), value_types::STRING);

        assert_eq!(Claim::integer("exp", 42).value_type(), value_types::INTEGER64);
        assert_eq!(Claim::boolean("email_verified", true).value(), "true");
        assert_eq!(
            Claim::json("address", &serde_json::json!({"city": "Oslo"})).value(),
            r#"{"city":"Oslo"}"#
        );
    }

    #[test]
    fn test_principal_lookup() {
        let principal = Principal::new(
            "pwd",
            vec![
                Claim::new("sub", "bob"),
                Claim::new("role", "admin"),
                Claim::new("role", "user"),
            ],
        );

        assert_eq!(principal.subject_id(), Some("bob"));
        assert!(principal.has_claim("role"));
        assert!(!principal.has_claim("email"));
        let roles: Vec<&str> = principal.find_all("role").map(Claim::value).collect();
        assert_eq!(roles, vec!["admin", "user"]);
    }

    #[test]
    fn test_principal_without_subject() {
        let principal = Principal::new("client_credentials", Vec::new());
        assert_eq!(principal.subject_id(), None);
        assert!(principal.claims().is_empty());
    }

    #[test]
    fn test_with_claims_preserves_order() {
        let principal = Principal::new("custom", vec![Claim::new("sub", "alice")])
            .with_claim(Claim::new("amr", "custom"))
            .with_claims([Claim::new("idp", "local"), Claim::new("amr", "mfa")]);
        let types: Vec<&str> = principal.claims().iter().map(Claim::claim_type).collect();
        assert_eq!(types, vec!["sub", "amr", "idp", "amr"]);
    }
}
