//! End-to-end token endpoint behavior over the in-memory stores.

mod common;

use std::sync::Arc;

use async_trait::async_trait;
use serde_json::json;
use time::macros::datetime;
use tollgate_auth::TokenService;
use tollgate_auth::claims::{Claim, Principal};
use tollgate_auth::clock::{ManualClock, SystemClock};
use tollgate_auth::config::RefreshTokenPolicy;
use tollgate_auth::grants::{AuthorizationCodeRequest, GrantContext, GrantValidator};
use tollgate_auth::oauth::pkce::{PkceChallengeMethod, PkceVerifier};
use tollgate_auth::oauth::{GrantValidationOutcome, TokenErrorCode, TokenRequest, ValidatedGrant};
use tollgate_auth::storage::InMemoryGrantStore;
use tollgate_auth::token::{RevocationRequest, TokenTypeHint};
use tollgate_auth::types::{GrantData, PersistedGrantType};

use common::*;

fn password_request(scope: &str) -> TokenRequest {
    TokenRequest::new("password", "roclient")
        .with_secret("secret")
        .with_scope(scope)
        .with_parameter("username", "bob")
        .with_parameter("password", "bob")
}

fn refresh_request(client_id: &str, refresh_token: &str) -> TokenRequest {
    let request = TokenRequest::new("refresh_token", client_id)
        .with_parameter("refresh_token", refresh_token);
    if client_id == "web" {
        request
    } else {
        request.with_secret("secret")
    }
}

// =============================================================================
// Client credentials
// =============================================================================

#[tokio::test]
async fn client_credentials_token_has_client_id_and_no_subject() {
    let (service, store) = service(RefreshTokenPolicy::OneTimeUse);
    let request = TokenRequest::new("client_credentials", "client")
        .with_secret("secret")
        .with_scope("api1");

    let response = service.issue_token(&request).await.expect("token issued");
    assert_eq!(response.tokens.token_type, "Bearer");
    assert_eq!(response.tokens.expires_in, 3600);
    assert_eq!(response.tokens.scope.as_deref(), Some("api1"));
    assert!(response.tokens.refresh_token.is_none());
    assert!(response.tokens.id_token.is_none());

    let payload = signer()
        .decode(&response.tokens.access_token)
        .expect("valid signature");
    assert_eq!(payload.get("client_id"), Some(&json!("client")));
    assert_eq!(payload.get("scope"), Some(&json!(["api1"])));
    assert_eq!(payload.get("aud"), Some(&json!("api")));
    assert_eq!(payload.get("iss"), Some(&json!(ISSUER)));
    assert!(payload.get("sub").is_none());
    assert!(store.is_empty());
}

#[tokio::test]
async fn client_credentials_with_wrong_secret_is_invalid_client() {
    let (service, _) = service(RefreshTokenPolicy::OneTimeUse);
    let request = TokenRequest::new("client_credentials", "client").with_secret("wrong");

    let error = service.issue_token(&request).await.unwrap_err();
    assert_eq!(error.error, TokenErrorCode::InvalidClient);
    assert_eq!(error.http_status(), 401);
}

#[tokio::test]
async fn unknown_grant_type_for_client_is_unauthorized() {
    let (service, _) = service(RefreshTokenPolicy::OneTimeUse);
    let request = TokenRequest::new("password", "client")
        .with_secret("secret")
        .with_parameter("username", "bob")
        .with_parameter("password", "bob");

    let error = service.issue_token(&request).await.unwrap_err();
    assert_eq!(error.error, TokenErrorCode::UnauthorizedClient);
}

// =============================================================================
// Password and refresh
// =============================================================================

#[tokio::test]
async fn password_access_token_payload() {
    let (service, _) = service(RefreshTokenPolicy::OneTimeUse);

    let response = service
        .issue_token(&password_request("api1 offline_access"))
        .await
        .expect("token issued");
    assert_eq!(response.tokens.expires_in, 3600);
    assert_eq!(response.tokens.scope.as_deref(), Some("api1 offline_access"));

    let payload = jwt_payload(&response.tokens.access_token);
    assert_eq!(payload.len(), 12, "unexpected claims: {payload:?}");
    assert_eq!(payload["iss"], json!(ISSUER));
    assert_eq!(payload["aud"], json!("api"));
    assert_eq!(payload["client_id"], json!("roclient"));
    assert_eq!(payload["sub"], json!("818727"));
    assert_eq!(payload["idp"], json!("local"));
    assert_eq!(payload["amr"], json!(["password"]));
    assert_eq!(payload["scope"], json!(["api1", "offline_access"]));
    assert!(payload["auth_time"].is_i64());
    assert!(payload["jti"].is_string());
    assert_eq!(
        payload["exp"].as_i64().unwrap() - payload["nbf"].as_i64().unwrap(),
        3600
    );
}

#[tokio::test]
async fn password_with_openid_issues_identity_token() {
    let (service, _) = service(RefreshTokenPolicy::OneTimeUse);

    let response = service
        .issue_token(&password_request("openid profile api1"))
        .await
        .expect("token issued");
    let id_token = response.tokens.id_token.expect("id_token");
    assert!(response.tokens.refresh_token.is_none());

    let payload = jwt_payload(&id_token);
    assert_eq!(payload["aud"], json!("roclient"));
    assert_eq!(payload["sub"], json!("818727"));
    assert_eq!(payload["name"], json!("Bob Smith"));

    let access = jwt_payload(&response.tokens.access_token);
    assert_eq!(access["name"], json!("Bob Smith"));
    assert_eq!(access["scope"], json!(["api1", "openid", "profile"]));
}

#[tokio::test]
async fn refresh_rotates_and_old_token_is_dead() {
    let (service, _) = service(RefreshTokenPolicy::OneTimeUse);

    let first = service
        .issue_token(&password_request("api1 offline_access"))
        .await
        .expect("token issued");
    let refresh_token = first.tokens.refresh_token.expect("refresh token");

    let second = service
        .issue_token(&refresh_request("roclient", &refresh_token))
        .await
        .expect("refreshed");
    let rotated = second.tokens.refresh_token.expect("rotated refresh token");
    assert_ne!(rotated, refresh_token);
    assert_ne!(second.tokens.access_token, first.tokens.access_token);
    assert_eq!(second.tokens.scope.as_deref(), Some("api1 offline_access"));
    assert_eq!(jwt_payload(&second.tokens.access_token)["sub"], json!("818727"));

    let replay = service
        .issue_token(&refresh_request("roclient", &refresh_token))
        .await
        .unwrap_err();
    assert_eq!(replay.error, TokenErrorCode::InvalidGrant);

    // Replay revokes the whole family, including the rotated token.
    let after_replay = service
        .issue_token(&refresh_request("roclient", &rotated))
        .await
        .unwrap_err();
    assert_eq!(after_replay.error, TokenErrorCode::InvalidGrant);
    assert_eq!(replay.error_description, after_replay.error_description);
}

#[tokio::test]
async fn refresh_can_narrow_but_not_widen_scopes() {
    let (service, _) = service(RefreshTokenPolicy::OneTimeUse);
    let first = service
        .issue_token(&password_request("api1 offline_access"))
        .await
        .unwrap();
    let refresh_token = first.tokens.refresh_token.unwrap();

    let widened = service
        .issue_token(&refresh_request("roclient", &refresh_token).with_scope("api2"))
        .await
        .unwrap_err();
    assert_eq!(widened.error, TokenErrorCode::InvalidScope);

    let narrowed = service
        .issue_token(&refresh_request("roclient", &refresh_token).with_scope("api1"))
        .await
        .expect("narrowed refresh");
    assert_eq!(narrowed.tokens.scope.as_deref(), Some("api1"));
    assert!(narrowed.tokens.refresh_token.is_some());
}

#[tokio::test]
async fn unknown_and_foreign_refresh_tokens_look_the_same() {
    let (service, _) = service(RefreshTokenPolicy::OneTimeUse);
    let first = service
        .issue_token(&password_request("api1 offline_access"))
        .await
        .unwrap();
    let refresh_token = first.tokens.refresh_token.unwrap();

    let unknown = service
        .issue_token(&refresh_request("roclient", "never-issued"))
        .await
        .unwrap_err();
    let foreign = service
        .issue_token(&refresh_request("web", &refresh_token))
        .await
        .unwrap_err();

    assert_eq!(unknown, foreign);
    assert_eq!(unknown.error, TokenErrorCode::InvalidGrant);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn concurrent_refresh_succeeds_at_most_once() {
    let (service, _) = service(RefreshTokenPolicy::OneTimeUse);
    let service = Arc::new(service);
    let first = service
        .issue_token(&password_request("api1 offline_access"))
        .await
        .unwrap();
    let refresh_token = first.tokens.refresh_token.unwrap();

    let tasks: Vec<_> = (0..8)
        .map(|_| {
            let service = service.clone();
            let request = refresh_request("roclient", &refresh_token);
            tokio::spawn(async move { service.issue_token(&request).await })
        })
        .collect();

    let mut successes = 0;
    for task in tasks {
        match task.await.expect("task") {
            Ok(_) => successes += 1,
            Err(error) => assert_eq!(error.error, TokenErrorCode::InvalidGrant),
        }
    }
    assert_eq!(successes, 1);
}

#[tokio::test]
async fn expired_refresh_token_reads_as_unknown() {
    let clock = Arc::new(ManualClock::new(datetime!(2024-05-01 10:00 UTC)));
    let (service, store) = service_with_clock(RefreshTokenPolicy::OneTimeUse, clock.clone(), None);

    let first = service
        .issue_token(&password_request("api1 offline_access"))
        .await
        .unwrap();
    let refresh_token = first.tokens.refresh_token.unwrap();

    clock.advance(time::Duration::days(31));

    let expired = service
        .issue_token(&refresh_request("roclient", &refresh_token))
        .await
        .unwrap_err();
    let unknown = service
        .issue_token(&refresh_request("roclient", "never-issued"))
        .await
        .unwrap_err();
    assert_eq!(expired, unknown);
    assert!(store.is_empty(), "expired grant removed on access");
}

#[tokio::test]
async fn sliding_refresh_keeps_handle_and_extends_expiry() {
    let clock = Arc::new(ManualClock::new(datetime!(2024-05-01 10:00 UTC)));
    let mut config = config(RefreshTokenPolicy::Sliding);
    config.refresh.sliding_lifetime = std::time::Duration::from_secs(3600);
    config.refresh.absolute_lifetime = std::time::Duration::from_secs(3 * 3600);
    let service = TokenService::builder(config)
        .with_clients(Arc::new(clients()))
        .with_grant_store(Arc::new(InMemoryGrantStore::new()))
        .with_signer(signer())
        .with_clock(clock.clone())
        .build()
        .unwrap();

    // Seed a refresh token through the public grant API.
    let handle = service
        .grants()
        .issue(
            PersistedGrantType::RefreshToken,
            "roclient",
            &GrantData::new(
                Principal::new("password", vec![Claim::new("sub", "818727")]),
                vec!["api1".to_string(), "offline_access".to_string()],
            ),
            time::Duration::hours(3),
        )
        .await
        .unwrap();

    // +50m: extended to +110m
    clock.advance(time::Duration::minutes(50));
    let response = service
        .issue_token(&refresh_request("roclient", &handle))
        .await
        .expect("first slide");
    assert_eq!(response.tokens.refresh_token.as_deref(), Some(handle.as_str()));

    // +100m: still valid, extended to min(+160m, +180m)
    clock.advance(time::Duration::minutes(50));
    service
        .issue_token(&refresh_request("roclient", &handle))
        .await
        .expect("second slide");

    // +170m: past the sliding window
    clock.advance(time::Duration::minutes(70));
    let error = service
        .issue_token(&refresh_request("roclient", &handle))
        .await
        .unwrap_err();
    assert_eq!(error.error, TokenErrorCode::InvalidGrant);
}

#[tokio::test]
async fn service_sweeper_removes_expired_grants() {
    let clock = Arc::new(ManualClock::new(datetime!(2024-05-01 10:00 UTC)));
    let mut config = config(RefreshTokenPolicy::OneTimeUse);
    config.sweep_interval = std::time::Duration::from_millis(10);
    let store = Arc::new(InMemoryGrantStore::new());
    let service = TokenService::builder(config)
        .with_clients(Arc::new(clients()))
        .with_grant_store(store.clone())
        .with_signer(signer())
        .with_clock(clock.clone())
        .build()
        .unwrap();

    let data = GrantData::new(
        Principal::new("password", vec![Claim::new("sub", "818727")]),
        vec!["api1".to_string(), "offline_access".to_string()],
    );
    for lifetime in [time::Duration::minutes(1), time::Duration::days(1)] {
        service
            .grants()
            .issue(PersistedGrantType::RefreshToken, "roclient", &data, lifetime)
            .await
            .unwrap();
    }
    clock.advance(time::Duration::minutes(5));

    let sweeper = service.spawn_sweeper();
    for _ in 0..100 {
        if store.len() == 1 {
            break;
        }
        tokio::time::sleep(std::time::Duration::from_millis(10)).await;
    }
    sweeper.abort();
    assert_eq!(store.len(), 1);
}

#[tokio::test]
async fn wrong_password_issues_nothing() {
    let (service, store) = service(RefreshTokenPolicy::OneTimeUse);
    let request = TokenRequest::new("password", "roclient")
        .with_secret("secret")
        .with_scope("api1 offline_access")
        .with_parameter("username", "bob")
        .with_parameter("password", "wrong");

    let error = service.issue_token(&request).await.unwrap_err();
    assert_eq!(error.error, TokenErrorCode::InvalidGrant);
    assert_eq!(error.error_description.as_deref(), Some("invalid_credential"));
    assert!(store.is_empty());
}

/// Password grant replacement whose principal carries a claim without a type.
struct UntypedClaimPasswordValidator;

#[async_trait]
impl GrantValidator for UntypedClaimPasswordValidator {
    fn grant_type(&self) -> &str {
        "password"
    }

    async fn validate(&self, ctx: &GrantContext<'_>) -> GrantValidationOutcome {
        GrantValidationOutcome::Success(ValidatedGrant::new(
            ctx,
            Principal::new(
                "pwd",
                vec![Claim::new("sub", "alice"), Claim::new("", "x")],
            ),
        ))
    }
}

#[tokio::test]
async fn untyped_subject_claim_fails_before_refresh_token_is_issued() {
    let store = Arc::new(InMemoryGrantStore::new());
    let service = builder(RefreshTokenPolicy::OneTimeUse, store.clone())
        .with_extension_grant(Arc::new(UntypedClaimPasswordValidator))
        .build()
        .expect("build service");

    let error = service
        .issue_token(&password_request("api1 offline_access"))
        .await
        .unwrap_err();
    assert_eq!(error.error, TokenErrorCode::Internal);
    assert!(store.is_empty());
}

// =============================================================================
// Extension grants and the hook
// =============================================================================

#[tokio::test]
async fn extension_grant_success_carries_custom_response() {
    let (service, _) = service(RefreshTokenPolicy::OneTimeUse);
    let request = TokenRequest::new("custom", "custom")
        .with_secret("secret")
        .with_scope("api1")
        .with_parameter("outcome", "succeed");

    let response = service.issue_token(&request).await.expect("token issued");
    let body = serde_json::to_value(&response).unwrap();
    assert_eq!(body["custom"], json!("custom"));
    assert_eq!(body["int_value"], json!(42));
    assert_eq!(body["dto"]["nested"]["int_property"], json!(43));
    assert_eq!(body["token_type"], json!("Bearer"));
    assert_eq!(jwt_payload(&response.tokens.access_token)["sub"], json!("818727"));
}

#[tokio::test]
async fn extension_grant_failure_keeps_custom_and_hook_fields() {
    let clock = Arc::new(ManualClock::new(datetime!(2024-05-01 10:00 UTC)));
    let (service, _) = service_with_clock(
        RefreshTokenPolicy::OneTimeUse,
        clock,
        Some(Arc::new(TenantHook)),
    );
    let request = TokenRequest::new("custom", "custom")
        .with_secret("secret")
        .with_parameter("outcome", "fail");

    let error = service.issue_token(&request).await.unwrap_err();
    assert_eq!(error.error, TokenErrorCode::InvalidGrant);
    assert_eq!(error.error_description.as_deref(), Some("invalid_credential"));

    let body = serde_json::to_value(&error).unwrap();
    assert_eq!(body["error"], json!("invalid_grant"));
    assert_eq!(body["custom"], json!("custom"));
    assert_eq!(body["string_value"], json!("some_string"));
    assert_eq!(body["tenant"], json!("acme"));
    assert!(body.get("token_type").is_none());
}

#[tokio::test]
async fn hook_overrides_claims_but_not_reserved_ones() {
    let (service, _) = service_with_clock(
        RefreshTokenPolicy::OneTimeUse,
        Arc::new(SystemClock),
        Some(Arc::new(TenantHook)),
    );

    let response = service
        .issue_token(&password_request("api1"))
        .await
        .expect("token issued");
    assert_eq!(response.custom.get("tenant"), Some(&json!("acme")));
    assert_eq!(response.tokens.token_type, "Bearer");

    let body = serde_json::to_value(&response).unwrap();
    assert_eq!(body["token_type"], json!("Bearer"));

    let payload = signer().decode(&response.tokens.access_token).expect("valid");
    assert_eq!(payload.get("role"), Some(&json!("admin")));
    assert_ne!(payload.get("exp"), Some(&json!(0)));
}

#[tokio::test]
async fn failing_hook_does_not_break_issuance() {
    let (service, _) = service_with_clock(
        RefreshTokenPolicy::OneTimeUse,
        Arc::new(SystemClock),
        Some(Arc::new(BrokenHook)),
    );

    let response = service
        .issue_token(&password_request("api1 offline_access"))
        .await
        .expect("token issued despite hook failure");
    assert!(response.custom.is_empty());
    assert!(response.tokens.refresh_token.is_some());
}

// =============================================================================
// Reference tokens and revocation
// =============================================================================

#[tokio::test]
async fn reference_token_resolves_and_revokes() {
    let (service, store) = service(RefreshTokenPolicy::OneTimeUse);
    let request = TokenRequest::new("client_credentials", "reference")
        .with_secret("secret")
        .with_scope("api1");

    let response = service.issue_token(&request).await.expect("token issued");
    let handle = response.tokens.access_token;
    assert_eq!(handle.split('.').count(), 1, "reference tokens are opaque");
    assert_eq!(store.len(), 1);

    let claims = service
        .resolve_reference_token(&handle)
        .await
        .unwrap()
        .expect("stored claims");
    assert!(claims.contains(&Claim::new("client_id", "reference")));
    assert!(claims.contains(&Claim::new("scope", "api1")));

    // Another client cannot revoke it.
    service
        .revoke_token(&RevocationRequest::new("client", handle.clone()).with_secret("secret"))
        .await
        .unwrap();
    assert!(service.resolve_reference_token(&handle).await.unwrap().is_some());

    service
        .revoke_token(
            &RevocationRequest::new("reference", handle.clone())
                .with_secret("secret")
                .with_hint(TokenTypeHint::AccessToken),
        )
        .await
        .unwrap();
    assert!(service.resolve_reference_token(&handle).await.unwrap().is_none());
}

#[tokio::test]
async fn revoked_refresh_token_is_invalid_grant() {
    let (service, _) = service(RefreshTokenPolicy::OneTimeUse);
    let first = service
        .issue_token(&password_request("api1 offline_access"))
        .await
        .unwrap();
    let refresh_token = first.tokens.refresh_token.unwrap();

    service
        .revoke_token(&RevocationRequest::new("roclient", refresh_token.clone()).with_secret("secret"))
        .await
        .unwrap();

    let error = service
        .issue_token(&refresh_request("roclient", &refresh_token))
        .await
        .unwrap_err();
    assert_eq!(error.error, TokenErrorCode::InvalidGrant);

    let bad_client = service
        .revoke_token(&RevocationRequest::new("roclient", "x").with_secret("nope"))
        .await
        .unwrap_err();
    assert_eq!(bad_client.error, TokenErrorCode::InvalidClient);
}

// =============================================================================
// Authorization code
// =============================================================================

async fn issue_code(service: &TokenService, verifier: &PkceVerifier) -> String {
    service
        .create_authorization_code(AuthorizationCodeRequest {
            client_id: "web".to_string(),
            subject: Principal::new(
                "password",
                vec![Claim::new("sub", "818727"), Claim::new("name", "Bob Smith")],
            ),
            scopes: vec!["openid".to_string(), "profile".to_string(), "offline_access".to_string()],
            redirect_uri: REDIRECT_URI.to_string(),
            code_challenge: Some(PkceChallengeMethod::S256.challenge_for(verifier)),
            code_challenge_method: Some("S256".to_string()),
            nonce: Some("n-0S6_WzA2Mj".to_string()),
        })
        .await
        .expect("code stored")
}

fn code_request(code: &str, verifier: &str) -> TokenRequest {
    TokenRequest::new("authorization_code", "web")
        .with_parameter("code", code)
        .with_parameter("redirect_uri", REDIRECT_URI)
        .with_parameter("code_verifier", verifier)
}

#[tokio::test]
async fn authorization_code_with_pkce() {
    let (service, _) = service(RefreshTokenPolicy::OneTimeUse);
    let verifier = PkceVerifier::generate();
    let code = issue_code(&service, &verifier).await;

    let response = service
        .issue_token(&code_request(&code, verifier.as_str()))
        .await
        .expect("code redeemed");
    assert_eq!(response.tokens.scope.as_deref(), Some("offline_access openid profile"));
    assert!(response.tokens.refresh_token.is_some());

    let id_token = jwt_payload(&response.tokens.id_token.expect("id_token"));
    assert_eq!(id_token["nonce"], json!("n-0S6_WzA2Mj"));
    assert_eq!(id_token["aud"], json!("web"));
    assert_eq!(id_token["name"], json!("Bob Smith"));

    let replay = service
        .issue_token(&code_request(&code, verifier.as_str()))
        .await
        .unwrap_err();
    assert_eq!(replay.error, TokenErrorCode::InvalidGrant);
}

#[tokio::test]
async fn authorization_code_with_wrong_verifier_fails() {
    let (service, _) = service(RefreshTokenPolicy::OneTimeUse);
    let verifier = PkceVerifier::generate();
    let code = issue_code(&service, &verifier).await;

    let other = PkceVerifier::generate();
    let error = service
        .issue_token(&code_request(&code, other.as_str()))
        .await
        .unwrap_err();
    assert_eq!(error.error, TokenErrorCode::InvalidGrant);
}

#[tokio::test]
async fn authorization_code_requires_registered_redirect() {
    let (service, _) = service(RefreshTokenPolicy::OneTimeUse);
    let result = service
        .create_authorization_code(AuthorizationCodeRequest {
            client_id: "web".to_string(),
            subject: Principal::new("password", vec![Claim::new("sub", "818727")]),
            scopes: vec!["openid".to_string()],
            redirect_uri: "https://evil.example.com/cb".to_string(),
            code_challenge: Some("challenge".to_string()),
            code_challenge_method: Some("plain".to_string()),
            nonce: None,
        })
        .await;
    assert!(result.is_err());
}

#[tokio::test]
async fn jwks_exposes_the_signing_key() {
    let (service, _) = service(RefreshTokenPolicy::OneTimeUse);
    let jwks = service.jwks();
    assert_eq!(jwks.keys.len(), 1);
    assert_eq!(jwks.keys[0].kid, signer().current_kid());
}
