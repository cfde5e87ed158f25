//! Deployment file loading and service assembly.
//!
//! ```toml
//! database_url = "postgres://localhost/tollgate"   # optional
//!
//! [auth]
//! issuer = "https://auth.example.com"
//! audiences = ["api"]
//! [auth.refresh]
//! policy = "one_time_use"
//! [auth.signing]
//! private_key_path = "signing.pem"
//!
//! [scopes]
//! profile = ["name", "given_name", "family_name"]
//!
//! [[clients]]
//! client_id = "roclient"
//! client_secret = "<hash from `tollgate generate-secret`>"
//! allowed_grant_types = ["password", "refresh_token"]
//! allowed_scopes = ["api1", "offline_access"]
//!
//! [[users]]
//! subject_id = "818727"
//! username = "bob"
//! password_hash = "<hash from `tollgate hash-password`>"
//! ```

use std::collections::BTreeMap;
use std::fs;
use std::path::Path;
use std::sync::Arc;

use anyhow::{Context, Result, bail};
use serde::Deserialize;
use tollgate_auth::AuthConfig;
use tollgate_auth::storage::{
    InMemoryClientStore, InMemoryUser, InMemoryUserStore, PersistedGrantStore, ScopeClaimsProfile,
};
use tollgate_auth::token::JwtSigner;
use tollgate_auth::{Client, TokenService};
use tollgate_auth_postgres::PostgresGrantStore;

#[derive(Debug, Deserialize)]
pub struct DeploymentFile {
    pub auth: AuthConfig,
    /// Durable grant store. Without it grants live only for one command.
    #[serde(default)]
    pub database_url: Option<String>,
    /// Scope to released claim types. Empty means the standard OIDC mapping.
    #[serde(default)]
    pub scopes: BTreeMap<String, Vec<String>>,
    #[serde(default)]
    pub clients: Vec<Client>,
    #[serde(default)]
    pub users: Vec<InMemoryUser>,
}

impl DeploymentFile {
    pub fn load(path: &Path) -> Result<Self> {
        let content = fs::read_to_string(path)
            .with_context(|| format!("Cannot read deployment file {}", path.display()))?;
        Self::parse(&content).with_context(|| format!("Invalid deployment file {}", path.display()))
    }

    pub fn parse(content: &str) -> Result<Self> {
        let file: DeploymentFile = toml::from_str(content)?;
        file.auth.validate()?;
        for client in &file.clients {
            client
                .validate()
                .with_context(|| format!("Client '{}'", client.client_id))?;
        }
        Ok(file)
    }

    pub fn profile(&self) -> ScopeClaimsProfile {
        if self.scopes.is_empty() {
            return ScopeClaimsProfile::standard();
        }
        self.scopes
            .iter()
            .fold(ScopeClaimsProfile::new(), |profile, (scope, claim_types)| {
                profile.with_scope(scope.clone(), claim_types.iter().cloned())
            })
    }

    pub fn signer(&self) -> Result<Arc<JwtSigner>> {
        let signer = JwtSigner::from_config(&self.auth.signing, &self.auth.issuer)
            .context("Cannot load signing key")?;
        Ok(Arc::new(signer))
    }

    /// Connects to `database_url` and applies migrations.
    pub async fn postgres_store(&self) -> Result<PostgresGrantStore> {
        let Some(url) = self.database_url.as_deref() else {
            bail!("This command needs database_url in the deployment file");
        };
        let store = PostgresGrantStore::connect(url)
            .await
            .context("Cannot connect to the grant database")?;
        store.migrate().await?;
        Ok(store)
    }

    pub async fn build_service(&self, signer: Arc<JwtSigner>) -> Result<TokenService> {
        let mut builder = TokenService::builder(self.auth.clone())
            .with_clients(Arc::new(InMemoryClientStore::new(self.clients.clone())))
            .with_resource_owners(Arc::new(InMemoryUserStore::new(self.users.clone())))
            .with_profile(Arc::new(self.profile()))
            .with_signer(signer);

        if self.database_url.is_some() {
            let store: Arc<dyn PersistedGrantStore> = Arc::new(self.postgres_store().await?);
            builder = builder.with_grant_store(store);
        } else {
            tracing::warn!("No database_url configured, refresh and reference tokens will not outlive this command");
        }

        Ok(builder.build()?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tollgate_auth::RefreshTokenPolicy;
    use tollgate_auth::claims::{Claim, Principal};
    use tollgate_auth::storage::ProfileService;

    const DEPLOYMENT: &str = r#"
        [auth]
        issuer = "https://auth.example.com"
        audiences = ["api"]
        [auth.refresh]
        policy = "one_time_use"

        [scopes]
        profile = ["name"]

        [[clients]]
        client_id = "client"
        client_secret = "2bb80d537b1da3e38bd30361aa855686bde0eacd7162fef6a25fe97bf527a25b"
        allowed_grant_types = ["client_credentials"]
        allowed_scopes = ["api1"]

        [[users]]
        subject_id = "818727"
        username = "bob"
        password_hash = "$argon2id$v=19$m=19456,t=2,p=1$c2FsdHNhbHQ$aGFzaA"
        claims = [{ type = "name", value = "Bob Smith" }]
    "#;

    #[test]
    fn test_parse_deployment() {
        let file = DeploymentFile::parse(DEPLOYMENT).unwrap();
        assert_eq!(file.auth.refresh.policy, RefreshTokenPolicy::OneTimeUse);
        assert!(file.database_url.is_none());
        assert_eq!(file.clients.len(), 1);
        assert_eq!(file.clients[0].client_claims_prefix, "client_");
        assert_eq!(file.users[0].claims.len(), 1);
    }

    #[test]
    fn test_load_from_file() {
        let mut tmp = tempfile::NamedTempFile::new().unwrap();
        tmp.write_all(DEPLOYMENT.as_bytes()).unwrap();

        let file = DeploymentFile::load(tmp.path()).unwrap();
        assert_eq!(file.auth.audiences, vec!["api".to_string()]);
    }

    #[test]
    fn test_missing_file() {
        let dir = tempfile::tempdir().unwrap();
        let err = DeploymentFile::load(&dir.path().join("missing.toml")).unwrap_err();
        assert!(format!("{err:#}").contains("Cannot read deployment file"));
    }

    #[test]
    fn test_policy_is_required() {
        let err = DeploymentFile::parse(
            r#"
            [auth]
            issuer = "https://auth.example.com"
            "#,
        )
        .unwrap_err();
        assert!(format!("{err:#}").contains("refresh"));
    }

    #[test]
    fn test_invalid_client_is_rejected() {
        let err = DeploymentFile::parse(
            r#"
            [auth]
            issuer = "https://auth.example.com"
            [auth.refresh]
            policy = "sliding"

            [[clients]]
            client_id = "web"
            allowed_grant_types = ["authorization_code"]
            "#,
        )
        .unwrap_err();
        assert!(format!("{err:#}").contains("Client 'web'"));
    }

    #[tokio::test]
    async fn test_scope_mapping_feeds_profile() {
        let file = DeploymentFile::parse(DEPLOYMENT).unwrap();
        let subject = Principal::new(
            "password",
            vec![
                Claim::new("sub", "818727"),
                Claim::new("name", "Bob Smith"),
                Claim::new("email", "bob@example.com"),
            ],
        );

        let claims = file
            .profile()
            .get_claims(&subject, &["profile".to_string()])
            .await
            .unwrap();
        assert_eq!(claims.len(), 1);
        assert_eq!(claims[0].value(), "Bob Smith");
    }
}
