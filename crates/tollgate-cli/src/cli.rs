use std::path::PathBuf;

use clap::{Parser, Subcommand, ValueEnum};

#[derive(Parser)]
#[command(name = "tollgate")]
#[command(about = "Tollgate CLI: issue, inspect and revoke OAuth 2.0 tokens")]
#[command(version)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,

    /// Deployment file (auth config, clients, users, scopes)
    #[arg(short, long, global = true, env = "TOLLGATE_CONFIG", default_value = "tollgate.toml")]
    pub config: PathBuf,

    /// Log level used when RUST_LOG is not set
    #[arg(long, global = true, env = "TOLLGATE_LOG", default_value = "warn")]
    pub log_level: String,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Run a token request through the token endpoint pipeline
    Issue(IssueArgs),
    /// Revoke a refresh or reference token (needs database_url)
    Revoke(RevokeArgs),
    /// Verify a JWT with the configured signing key and print its payload
    Decode(DecodeArgs),
    /// Print the public signing keys as a JWK set
    Jwks,
    /// Remove expired grants from the store (needs database_url)
    Sweep,
    /// Apply grant store migrations (needs database_url)
    Migrate,
    /// Generate an RSA private key (PKCS#8 PEM)
    GenerateKey(GenerateKeyArgs),
    /// Generate a client secret and the hash to put in the deployment file
    GenerateSecret,
    /// Hash a user password for the deployment file
    HashPassword(HashPasswordArgs),
}

#[derive(clap::Args)]
pub struct IssueArgs {
    /// Grant type (client_credentials, password, refresh_token, ...)
    #[arg(short, long)]
    pub grant_type: String,
    /// Client identifier
    #[arg(long)]
    pub client_id: String,
    /// Client secret (omit for public clients)
    #[arg(long, env = "TOLLGATE_CLIENT_SECRET")]
    pub client_secret: Option<String>,
    /// Space-separated scopes
    #[arg(long)]
    pub scope: Option<String>,
    /// Extra request parameters as key=value (e.g. username=bob)
    #[arg(short = 'P', long = "param", value_parser = parse_key_value)]
    pub params: Vec<(String, String)>,
}

#[derive(Clone, Copy, ValueEnum)]
pub enum HintArg {
    AccessToken,
    RefreshToken,
}

#[derive(clap::Args)]
pub struct RevokeArgs {
    /// The token to revoke
    pub token: String,
    /// Client identifier
    #[arg(long)]
    pub client_id: String,
    /// Client secret (omit for public clients)
    #[arg(long, env = "TOLLGATE_CLIENT_SECRET")]
    pub client_secret: Option<String>,
    /// Token type hint
    #[arg(long)]
    pub hint: Option<HintArg>,
}

#[derive(clap::Args)]
pub struct DecodeArgs {
    /// The JWT to verify
    pub token: String,
    /// Accept tokens past their expiration
    #[arg(long)]
    pub allow_expired: bool,
}

#[derive(clap::Args)]
pub struct GenerateKeyArgs {
    /// Write the key to this file instead of stdout
    #[arg(short, long)]
    pub out: Option<PathBuf>,
}

#[derive(clap::Args)]
pub struct HashPasswordArgs {
    /// Password to hash
    #[arg(env = "TOLLGATE_PASSWORD")]
    pub password: String,
}

fn parse_key_value(input: &str) -> Result<(String, String), String> {
    let (key, value) = input
        .split_once('=')
        .ok_or_else(|| format!("expected key=value, got '{input}'"))?;
    if key.is_empty() {
        return Err(format!("empty key in '{input}'"));
    }
    Ok((key.to_string(), value.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_key_value() {
        assert_eq!(
            parse_key_value("username=bob"),
            Ok(("username".to_string(), "bob".to_string()))
        );
        assert_eq!(
            parse_key_value("password=a=b"),
            Ok(("password".to_string(), "a=b".to_string()))
        );
        assert!(parse_key_value("novalue").is_err());
        assert!(parse_key_value("=x").is_err());
    }

    #[test]
    fn test_issue_args() {
        let cli = Cli::try_parse_from([
            "tollgate",
            "issue",
            "--grant-type",
            "password",
            "--client-id",
            "roclient",
            "--scope",
            "api1 offline_access",
            "-P",
            "username=bob",
            "--param",
            "password=bob",
        ])
        .unwrap();

        let Commands::Issue(args) = cli.command else {
            panic!("expected issue");
        };
        assert_eq!(args.grant_type, "password");
        assert_eq!(args.params.len(), 2);
        assert_eq!(args.params[1], ("password".to_string(), "bob".to_string()));
    }

    #[test]
    fn verify_cli() {
        use clap::CommandFactory;
        Cli::command().debug_assert();
    }
}
