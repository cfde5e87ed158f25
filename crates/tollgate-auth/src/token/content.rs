//! Token content assembly.
//!
//! Builds the ordered claim list for access and identity tokens. The list
//! may contain several claims of one type; [`JwtPayload::from_claims`]
//! merges them when the token is signed.
//!
//! Access token order:
//!
//! 1. `iss`, `aud` (one per audience), `nbf`, `iat`, `exp`, `client_id`,
//!    `jti`, then `sub`, `auth_time` and `idp` when the subject has them
//! 2. client claims (prefixed), then profile claims released by the scopes
//! 3. one `scope` claim per granted scope
//! 4. one `amr` claim per authentication method
//! 5. hook claims, see [`apply_claim_overrides`]
//!
//! [`JwtPayload::from_claims`]: crate::token::payload::JwtPayload::from_claims

use std::collections::HashSet;

use time::{Duration, OffsetDateTime};

use crate::claims::{Claim, claim_types};
use crate::oauth::ValidatedGrant;
use crate::types::GrantType;

/// Claim types the pipeline sets itself. Profile claims of these types are dropped.
const PROTOCOL_CLAIMS: &[&str] = &[
    claim_types::ISSUER,
    claim_types::AUDIENCE,
    claim_types::NOT_BEFORE,
    claim_types::ISSUED_AT,
    claim_types::EXPIRATION,
    claim_types::CLIENT_ID,
    claim_types::JWT_ID,
    claim_types::SUBJECT,
    claim_types::AUTHENTICATION_TIME,
    claim_types::IDENTITY_PROVIDER,
    claim_types::SCOPE,
    claim_types::AUTHENTICATION_METHOD,
    claim_types::NONCE,
];

/// Claim types a hook may not touch.
pub const RESERVED_CLAIMS: &[&str] = &[
    claim_types::ISSUER,
    claim_types::NOT_BEFORE,
    claim_types::ISSUED_AT,
    claim_types::EXPIRATION,
    claim_types::JWT_ID,
];

/// Inputs for one token.
#[derive(Debug, Clone, Copy)]
pub struct TokenContent<'a> {
    pub grant: &'a ValidatedGrant,
    /// Claims returned by the profile service for the granted scopes.
    pub profile_claims: &'a [Claim],
    pub issued_at: OffsetDateTime,
    pub lifetime: Duration,
}

impl TokenContent<'_> {
    fn expires_at(&self) -> OffsetDateTime {
        self.issued_at + self.lifetime
    }
}

/// Assembles token claim lists for one issuer.
#[derive(Debug, Clone)]
pub struct TokenContentBuilder {
    issuer: String,
    audiences: Vec<String>,
}

impl TokenContentBuilder {
    pub fn new(issuer: impl Into<String>, audiences: Vec<String>) -> Self {
        Self {
            issuer: issuer.into(),
            audiences,
        }
    }

    #[must_use]
    pub fn issuer(&self) -> &str {
        &self.issuer
    }

    /// Claims for an access token, steps 1 to 4.
    #[must_use]
    pub fn access_token_claims(&self, content: &TokenContent<'_>) -> Vec<Claim> {
        let grant = content.grant;
        let client = &grant.client;
        let mut claims = Vec::new();

        // 1. Protocol claims
        claims.push(Claim::new(claim_types::ISSUER, &self.issuer));
        claims.extend(
            self.audiences
                .iter()
                .map(|aud| Claim::new(claim_types::AUDIENCE, aud)),
        );
        self.push_validity(&mut claims, content);
        claims.push(Claim::new(claim_types::CLIENT_ID, &client.client_id));
        claims.push(Claim::new(
            claim_types::JWT_ID,
            uuid::Uuid::new_v4().simple().to_string(),
        ));
        push_subject_claims(&mut claims, grant);

        // 2. Client and profile claims
        let send_client_claims = client.always_send_client_claims
            || grant.grant_type == GrantType::ClientCredentials.as_str();
        if send_client_claims {
            claims.extend(client.claims.iter().map(|c| {
                Claim::typed(
                    format!("{}{}", client.client_claims_prefix, c.claim_type()),
                    c.value(),
                    c.value_type(),
                )
            }));
        }
        claims.extend(profile_claims(content.profile_claims));

        // 3. Scopes
        claims.extend(
            grant
                .granted_scopes
                .iter()
                .map(|scope| Claim::new(claim_types::SCOPE, scope)),
        );

        // 4. Authentication methods
        claims.extend(
            grant
                .subject
                .find_all(claim_types::AUTHENTICATION_METHOD)
                .cloned(),
        );

        claims
    }

    /// Claims for an OpenID Connect identity token.
    #[must_use]
    pub fn identity_token_claims(&self, content: &TokenContent<'_>) -> Vec<Claim> {
        let grant = content.grant;
        let mut claims = vec![
            Claim::new(claim_types::ISSUER, &self.issuer),
            Claim::new(claim_types::AUDIENCE, &grant.client.client_id),
        ];
        self.push_validity(&mut claims, content);
        push_subject_claims(&mut claims, grant);
        claims.extend(
            grant
                .subject
                .find_all(claim_types::AUTHENTICATION_METHOD)
                .cloned(),
        );
        if let Some(nonce) = &grant.nonce {
            claims.push(Claim::new(claim_types::NONCE, nonce));
        }
        claims.extend(profile_claims(content.profile_claims));
        claims
    }

    fn push_validity(&self, claims: &mut Vec<Claim>, content: &TokenContent<'_>) {
        let issued_at = content.issued_at.unix_timestamp();
        claims.push(Claim::integer(claim_types::NOT_BEFORE, issued_at));
        claims.push(Claim::integer(claim_types::ISSUED_AT, issued_at));
        claims.push(Claim::integer(
            claim_types::EXPIRATION,
            content.expires_at().unix_timestamp(),
        ));
    }
}

fn push_subject_claims(claims: &mut Vec<Claim>, grant: &ValidatedGrant) {
    for claim_type in [
        claim_types::SUBJECT,
        claim_types::AUTHENTICATION_TIME,
        claim_types::IDENTITY_PROVIDER,
    ] {
        if let Some(claim) = grant.subject.find_first(claim_type) {
            claims.push(claim.clone());
        }
    }
}

fn profile_claims(claims: &[Claim]) -> impl Iterator<Item = Claim> + '_ {
    claims
        .iter()
        .filter(|c| !PROTOCOL_CLAIMS.contains(&c.claim_type()))
        .cloned()
}

/// Applies hook claims to an assembled claim list.
///
/// Each hook claim type replaces every earlier claim of that type; several
/// hook claims of one type are all kept. Claims of a [reserved](RESERVED_CLAIMS)
/// type are not applied and their types are returned.
#[must_use]
pub fn apply_claim_overrides(
    mut claims: Vec<Claim>,
    overrides: Vec<Claim>,
) -> (Vec<Claim>, Vec<String>) {
    let (rejected, accepted): (Vec<Claim>, Vec<Claim>) = overrides
        .into_iter()
        .partition(|c| RESERVED_CLAIMS.contains(&c.claim_type()));

    let replaced: HashSet<String> = accepted
        .iter()
        .map(|c| c.claim_type().to_string())
        .collect();
    claims.retain(|c| !replaced.contains(c.claim_type()));
    claims.extend(accepted);

    let ignored = rejected
        .into_iter()
        .map(|c| c.claim_type().to_string())
        .collect();
    (claims, ignored)
}
