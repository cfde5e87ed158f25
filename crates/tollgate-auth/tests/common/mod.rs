//! Shared fixtures for the token endpoint tests.

#![allow(dead_code)]

use std::sync::{Arc, OnceLock};

use async_trait::async_trait;
use serde_json::{Map, Value, json};
use tollgate_auth::claims::{Claim, Principal};
use tollgate_auth::clock::Clock;
use tollgate_auth::config::{AuthConfig, RefreshTokenPolicy};
use tollgate_auth::grants::{GrantContext, GrantValidator};
use tollgate_auth::oauth::{GrantFailure, GrantValidationOutcome, ValidatedGrant};
use tollgate_auth::password::hash_password;
use tollgate_auth::storage::{InMemoryClientStore, InMemoryGrantStore, InMemoryUser, InMemoryUserStore};
use tollgate_auth::token::{
    Augmentation, HookContext, HookError, JwtSigner, SigningAlgorithm, SigningKeyPair,
    TokenResponseHook, TokenService, TokenServiceBuilder,
};
use tollgate_auth::types::{AccessTokenType, Client};

pub const ISSUER: &str = "https://auth.example.com";
pub const REDIRECT_URI: &str = "https://web.example.com/callback";

/// One RSA key for the whole test binary; key generation is slow.
pub fn signer() -> Arc<JwtSigner> {
    static SIGNER: OnceLock<Arc<JwtSigner>> = OnceLock::new();
    SIGNER
        .get_or_init(|| {
            let key_pair = SigningKeyPair::generate_rsa(SigningAlgorithm::RS256)
                .expect("generate signing key");
            Arc::new(JwtSigner::new(key_pair, ISSUER))
        })
        .clone()
}

fn bob() -> InMemoryUser {
    static HASH: OnceLock<String> = OnceLock::new();
    InMemoryUser {
        subject_id: "818727".to_string(),
        username: "bob".to_string(),
        password_hash: HASH
            .get_or_init(|| hash_password("bob").expect("hash password"))
            .clone(),
        claims: vec![
            Claim::new("name", "Bob Smith"),
            Claim::new("role", "reader"),
            Claim::new("role", "writer"),
        ],
    }
}

pub fn clients() -> InMemoryClientStore {
    InMemoryClientStore::new([
        Client::new("client")
            .with_secret("secret")
            .with_grant_type("client_credentials")
            .with_scopes(["api1", "api2"]),
        Client::new("roclient")
            .with_secret("secret")
            .with_grant_type("password")
            .with_grant_type("refresh_token")
            .with_scopes(["api1", "api2", "openid", "profile", "offline_access"]),
        Client::new("reference")
            .with_secret("secret")
            .with_grant_type("client_credentials")
            .with_grant_type("password")
            .with_scopes(["api1", "offline_access"])
            .with_access_token_type(AccessTokenType::Reference),
        Client::new("custom")
            .with_secret("secret")
            .with_grant_type("custom")
            .with_scopes(["api1"]),
        {
            let mut web = Client::new("web")
                .public()
                .with_grant_type("authorization_code")
                .with_grant_type("refresh_token")
                .with_scopes(["openid", "profile", "api1", "offline_access"])
                .with_redirect_uri(REDIRECT_URI);
            web.require_pkce = true;
            web
        },
    ])
}

pub fn config(policy: RefreshTokenPolicy) -> AuthConfig {
    AuthConfig::new(ISSUER, policy).with_audience("api")
}

/// Builder with clients, bob, the shared signer and the `custom` extension grant.
pub fn builder(policy: RefreshTokenPolicy, store: Arc<InMemoryGrantStore>) -> TokenServiceBuilder {
    TokenService::builder(config(policy))
        .with_clients(Arc::new(clients()))
        .with_resource_owners(Arc::new(InMemoryUserStore::new([bob()])))
        .with_grant_store(store)
        .with_signer(signer())
        .with_extension_grant(Arc::new(CustomGrantValidator))
}

pub fn service(policy: RefreshTokenPolicy) -> (TokenService, Arc<InMemoryGrantStore>) {
    let store = Arc::new(InMemoryGrantStore::new());
    let service = builder(policy, store.clone()).build().expect("build service");
    (service, store)
}

pub fn service_with_clock(
    policy: RefreshTokenPolicy,
    clock: Arc<dyn Clock>,
    hook: Option<Arc<dyn TokenResponseHook>>,
) -> (TokenService, Arc<InMemoryGrantStore>) {
    let store = Arc::new(InMemoryGrantStore::new());
    let mut builder = builder(policy, store.clone()).with_clock(clock);
    if let Some(hook) = hook {
        builder = builder.with_hook(hook);
    }
    (builder.build().expect("build service"), store)
}

/// Fields the `custom` grant returns on success and failure.
pub fn custom_fields() -> Map<String, Value> {
    let Value::Object(fields) = json!({
        "custom": "custom",
        "string_value": "some_string",
        "int_value": 42,
        "dto": {
            "string_property": "string_value",
            "int_property": 42,
            "nested": {"string_property": "string_value", "int_property": 43}
        }
    }) else {
        unreachable!()
    };
    fields
}

/// Extension grant driven by the `outcome` parameter.
pub struct CustomGrantValidator;

#[async_trait]
impl GrantValidator for CustomGrantValidator {
    fn grant_type(&self) -> &str {
        "custom"
    }

    async fn validate(&self, ctx: &GrantContext<'_>) -> GrantValidationOutcome {
        match ctx.request.parameter("outcome") {
            Some("succeed") => GrantValidationOutcome::Success(
                ValidatedGrant::new(
                    ctx,
                    Principal::new("custom", vec![Claim::new("sub", "818727")]),
                )
                .with_custom_response(custom_fields()),
            ),
            _ => GrantFailure::invalid_grant("invalid_credential")
                .with_custom_response(custom_fields())
                .into(),
        }
    }
}

/// Hook adding one response field and one access token claim.
pub struct TenantHook;

#[async_trait]
impl TokenResponseHook for TenantHook {
    async fn augment(&self, _ctx: &HookContext<'_>) -> Result<Augmentation, HookError> {
        Ok(Augmentation::default()
            .with_field("tenant", "acme")
            .with_field("token_type", "MAC")
            .with_claim(Claim::new("role", "admin"))
            .with_claim(Claim::new("exp", "0")))
    }
}

/// Hook that always fails.
pub struct BrokenHook;

#[async_trait]
impl TokenResponseHook for BrokenHook {
    async fn augment(&self, _ctx: &HookContext<'_>) -> Result<Augmentation, HookError> {
        Err(HookError::new("profile backend down"))
    }
}

/// Decodes the payload segment of a JWT without verifying it.
pub fn jwt_payload(token: &str) -> Map<String, Value> {
    use base64::Engine;
    use base64::engine::general_purpose::URL_SAFE_NO_PAD;

    let segment = token.split('.').nth(1).expect("payload segment");
    let bytes = URL_SAFE_NO_PAD.decode(segment).expect("base64url payload");
    serde_json::from_slice(&bytes).expect("json payload")
}
