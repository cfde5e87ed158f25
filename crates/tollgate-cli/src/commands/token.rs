use anyhow::{Result, bail};
use colored::Colorize;
use tollgate_auth::oauth::TokenRequest;
use tollgate_auth::token::{RevocationRequest, TokenTypeHint};

use crate::cli::{DecodeArgs, HintArg, IssueArgs, RevokeArgs};
use crate::config::DeploymentFile;
use crate::output::{print_error, print_json, print_success};

/// Builds the token request the endpoint would have parsed from a form.
pub fn token_request(args: &IssueArgs) -> TokenRequest {
    let mut request = TokenRequest::new(&args.grant_type, &args.client_id);
    if let Some(secret) = &args.client_secret {
        request = request.with_secret(secret);
    }
    if let Some(scope) = &args.scope {
        request = request.with_scope(scope);
    }
    for (name, value) in &args.params {
        request = request.with_parameter(name, value);
    }
    request
}

pub async fn issue(deployment: &DeploymentFile, args: &IssueArgs) -> Result<()> {
    let service = deployment.build_service(deployment.signer()?).await?;

    match service.issue_token(&token_request(args)).await {
        Ok(response) => print_json(&response),
        Err(error) => {
            print_json(&error)?;
            bail!("Token request rejected with {} (HTTP {})", error.error, error.http_status())
        }
    }
}

pub async fn revoke(deployment: &DeploymentFile, args: &RevokeArgs) -> Result<()> {
    if deployment.database_url.is_none() {
        bail!("Revocation needs database_url in the deployment file");
    }
    let service = deployment.build_service(deployment.signer()?).await?;

    let mut request = RevocationRequest::new(&args.client_id, &args.token);
    if let Some(secret) = &args.client_secret {
        request = request.with_secret(secret);
    }
    if let Some(hint) = args.hint {
        request = request.with_hint(match hint {
            HintArg::AccessToken => TokenTypeHint::AccessToken,
            HintArg::RefreshToken => TokenTypeHint::RefreshToken,
        });
    }

    match service.revoke_token(&request).await {
        Ok(()) => {
            print_success("Token revoked (unknown tokens are ignored)");
            Ok(())
        }
        Err(error) => bail!("Revocation rejected with {}", error.error),
    }
}

pub fn decode(deployment: &DeploymentFile, args: &DecodeArgs) -> Result<()> {
    if deployment.auth.signing.private_key_path.is_none() {
        print_error(&format!(
            "{} no signing key configured, only tokens from this invocation would verify",
            "warning:".yellow()
        ));
    }
    let signer = deployment.signer()?;
    let payload = if args.allow_expired {
        signer.decode_allow_expired(&args.token)?
    } else {
        signer.decode(&args.token)?
    };
    print_json(&payload)
}

pub fn jwks(deployment: &DeploymentFile) -> Result<()> {
    use tollgate_auth::token::TokenSigner;
    print_json(&deployment.signer()?.jwks())
}
