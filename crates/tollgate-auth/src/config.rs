//! Token issuance configuration.
//!
//! Configuration is deserialized from TOML (or any serde format) and then
//! checked with [`AuthConfig::validate`]. Durations use humantime notation
//! (`"1h"`, `"30d"`).
//!
//! The refresh token policy has no default: every deployment must state
//! whether refresh tokens are one-time-use or sliding.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Root configuration for the token service.
///
/// # Example (TOML)
///
/// ```toml
/// issuer = "https://id.example.com"
/// audiences = ["api"]
///
/// [tokens]
/// access_token_lifetime = "1h"
///
/// [refresh]
/// policy = "one_time_use"
/// absolute_lifetime = "30d"
/// ```
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct AuthConfig {
    /// Issuer URL (used in the `iss` claim).
    pub issuer: String,

    /// Audiences placed in every access token (`aud` claim).
    #[serde(default)]
    pub audiences: Vec<String>,

    /// Token lifetimes.
    #[serde(default)]
    pub tokens: TokenLifetimes,

    /// Refresh token handling.
    pub refresh: RefreshTokenConfig,

    /// Token signing configuration.
    #[serde(default)]
    pub signing: SigningConfig,

    /// How often expired persisted grants are swept from the store.
    #[serde(default = "default_sweep_interval", with = "humantime_serde")]
    pub sweep_interval: Duration,
}

/// Default lifetimes for issued tokens. Clients may override them.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct TokenLifetimes {
    /// Access token lifetime.
    #[serde(with = "humantime_serde")]
    pub access_token_lifetime: Duration,

    /// Identity token lifetime.
    #[serde(with = "humantime_serde")]
    pub identity_token_lifetime: Duration,

    /// Authorization code lifetime.
    /// Codes should be short-lived.
    #[serde(with = "humantime_serde")]
    pub authorization_code_lifetime: Duration,
}

impl Default for TokenLifetimes {
    fn default() -> Self {
        Self {
            access_token_lifetime: Duration::from_secs(3600), // 1 hour
            identity_token_lifetime: Duration::from_secs(300), // 5 minutes
            authorization_code_lifetime: Duration::from_secs(300), // 5 minutes
        }
    }
}

/// What happens to a refresh token when it is used.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum RefreshTokenPolicy {
    /// Each use consumes the token and issues a new one. Presenting a
    /// consumed token again is treated as replay.
    OneTimeUse,
    /// The same token stays valid; each use extends its expiration.
    Sliding,
}

impl RefreshTokenPolicy {
    /// Returns the configuration spelling of the policy.
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::OneTimeUse => "one_time_use",
            Self::Sliding => "sliding",
        }
    }
}

impl std::fmt::Display for RefreshTokenPolicy {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Refresh token configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct RefreshTokenConfig {
    /// Rotation policy. Required.
    pub policy: RefreshTokenPolicy,

    /// Lifetime measured from first issuance. A token family never outlives it.
    #[serde(default = "default_absolute_lifetime", with = "humantime_serde")]
    pub absolute_lifetime: Duration,

    /// Extension applied on each use under the sliding policy.
    #[serde(default = "default_sliding_lifetime", with = "humantime_serde")]
    pub sliding_lifetime: Duration,
}

impl RefreshTokenConfig {
    /// Creates a refresh configuration with default lifetimes.
    #[must_use]
    pub fn new(policy: RefreshTokenPolicy) -> Self {
        Self {
            policy,
            absolute_lifetime: default_absolute_lifetime(),
            sliding_lifetime: default_sliding_lifetime(),
        }
    }
}

/// Token signing configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct SigningConfig {
    /// Signing algorithm.
    /// Supported: "RS256", "RS384"
    pub algorithm: String,

    /// Key id placed in the JWT header. Derived from the key when absent.
    pub key_id: Option<String>,

    /// PKCS#8 PEM file with the RSA private key.
    /// A fresh key is generated at startup when absent.
    pub private_key_path: Option<PathBuf>,
}

impl Default for SigningConfig {
    fn default() -> Self {
        Self {
            algorithm: "RS256".to_string(),
            key_id: None,
            private_key_path: None,
        }
    }
}

fn default_sweep_interval() -> Duration {
    Duration::from_secs(300)
}

fn default_absolute_lifetime() -> Duration {
    Duration::from_secs(30 * 24 * 3600) // 30 days
}

fn default_sliding_lifetime() -> Duration {
    Duration::from_secs(15 * 24 * 3600) // 15 days
}

/// Configuration errors.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// An invalid configuration value was provided.
    #[error("Invalid configuration value: {0}")]
    InvalidValue(String),

    /// A required configuration value is missing.
    #[error("Missing required configuration: {0}")]
    Missing(String),

    /// The configuration document could not be parsed.
    #[error("Failed to parse configuration: {0}")]
    Parse(String),

    /// The configuration file could not be read.
    #[error("Failed to read configuration file {path}: {source}")]
    Io {
        /// Path that was being read.
        path: PathBuf,
        /// Underlying I/O error.
        source: std::io::Error,
    },
}

impl AuthConfig {
    /// Creates a configuration with default lifetimes and signing settings.
    #[must_use]
    pub fn new(issuer: impl Into<String>, policy: RefreshTokenPolicy) -> Self {
        Self {
            issuer: issuer.into(),
            audiences: Vec::new(),
            tokens: TokenLifetimes::default(),
            refresh: RefreshTokenConfig::new(policy),
            signing: SigningConfig::default(),
            sweep_interval: default_sweep_interval(),
        }
    }

    /// Adds an access token audience.
    #[must_use]
    pub fn with_audience(mut self, audience: impl Into<String>) -> Self {
        self.audiences.push(audience.into());
        self
    }

    /// Parses and validates a TOML document.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError::Parse` for malformed documents (including a
    /// missing `[refresh]` policy) and any error from [`Self::validate`].
    pub fn from_toml_str(input: &str) -> Result<Self, ConfigError> {
        let config: Self =
            toml::from_str(input).map_err(|e| ConfigError::Parse(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    /// Reads, parses and validates a TOML configuration file.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError::Io` if the file cannot be read, otherwise the
    /// same errors as [`Self::from_toml_str`].
    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_toml_str(&content)
    }

    /// Validates the configuration.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError::Missing` if the issuer is empty and
    /// `ConfigError::InvalidValue` if:
    /// - The issuer is not an absolute URL
    /// - The signing algorithm is not supported
    /// - A token lifetime is under one second or the sweep interval is zero
    /// - The sliding lifetime exceeds the absolute lifetime
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.issuer.is_empty() {
            return Err(ConfigError::Missing("issuer".to_string()));
        }
        url::Url::parse(&self.issuer).map_err(|e| {
            ConfigError::InvalidValue(format!("issuer '{}' is not a URL: {e}", self.issuer))
        })?;

        let valid_algorithms = ["RS256", "RS384"];
        if !valid_algorithms.contains(&self.signing.algorithm.as_str()) {
            return Err(ConfigError::InvalidValue(format!(
                "Invalid signing algorithm '{}'. Must be one of: {:?}",
                self.signing.algorithm, valid_algorithms
            )));
        }

        let lifetimes = [
            ("tokens.access_token_lifetime", self.tokens.access_token_lifetime),
            ("tokens.identity_token_lifetime", self.tokens.identity_token_lifetime),
            (
                "tokens.authorization_code_lifetime",
                self.tokens.authorization_code_lifetime,
            ),
            ("refresh.absolute_lifetime", self.refresh.absolute_lifetime),
            ("refresh.sliding_lifetime", self.refresh.sliding_lifetime),
        ];
        // Token lifetimes are issued in whole seconds.
        for (name, value) in lifetimes {
            if value.as_secs() == 0 {
                return Err(ConfigError::InvalidValue(format!(
                    "{name} must be at least 1s"
                )));
            }
        }
        if self.sweep_interval.is_zero() {
            return Err(ConfigError::InvalidValue(
                "sweep_interval must be > 0".to_string(),
            ));
        }

        if self.refresh.policy == RefreshTokenPolicy::Sliding
            && self.refresh.sliding_lifetime > self.refresh.absolute_lifetime
        {
            return Err(ConfigError::InvalidValue(
                "refresh.sliding_lifetime cannot exceed refresh.absolute_lifetime".to_string(),
            ));
        }

        Ok(())
    }
}
