//! Custom token response hook.
//!
//! A [`TokenResponseHook`] sees every token request once, after grant
//! validation and before signing. It may add response fields and access
//! token claims. It can never break issuance: errors and panics turn into
//! "no augmentation" plus a [`HookWarning`] that the caller logs.

use std::any::Any;
use std::fmt;
use std::panic::AssertUnwindSafe;

use async_trait::async_trait;
use futures_util::FutureExt;
use serde_json::{Map, Value};

use crate::claims::Claim;
use crate::oauth::{GrantValidationOutcome, is_standard_response_field};
use crate::types::AccessTokenType;

/// Unsigned token content, available to the hook on success.
#[derive(Debug, Clone)]
pub struct DraftTokens {
    pub access_token_claims: Vec<Claim>,
    pub access_token_type: AccessTokenType,
    pub access_token_lifetime: u64,
    /// Present when an identity token will be issued.
    pub identity_token_claims: Option<Vec<Claim>>,
    pub identity_token_lifetime: u64,
    pub issues_refresh_token: bool,
}

/// What the hook is told about the request.
#[derive(Debug, Clone, Copy)]
pub struct HookContext<'a> {
    pub outcome: &'a GrantValidationOutcome,
    /// `None` for failed requests.
    pub draft: Option<&'a DraftTokens>,
    /// Custom fields already headed for the response.
    pub response_fields: &'a Map<String, Value>,
}

/// Additions requested by the hook.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Augmentation {
    /// Extra response fields. Standard OAuth fields are never replaced.
    pub response_fields: Map<String, Value>,
    /// Access token claims. Each type replaces earlier claims of that type.
    pub claims: Vec<Claim>,
}

impl Augmentation {
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.response_fields.is_empty() && self.claims.is_empty()
    }

    #[must_use]
    pub fn with_field(mut self, name: impl Into<String>, value: impl Into<Value>) -> Self {
        self.response_fields.insert(name.into(), value.into());
        self
    }

    #[must_use]
    pub fn with_claim(mut self, claim: Claim) -> Self {
        self.claims.push(claim);
        self
    }
}

/// Error reported by a hook implementation.
#[derive(Debug, Clone, thiserror::Error)]
#[error("{message}")]
pub struct HookError {
    message: String,
}

impl HookError {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }
}

/// Why (part of) an augmentation was not applied.
#[derive(Debug, Clone, PartialEq)]
pub enum HookWarning {
    /// The hook returned an error; nothing was applied.
    Failed(String),
    /// The hook panicked; nothing was applied.
    Panicked(String),
    /// Parts of the augmentation were dropped.
    Discarded {
        /// Response fields colliding with standard fields.
        fields: Vec<String>,
        /// Claims returned for a failed request.
        claims: usize,
    },
}

impl fmt::Display for HookWarning {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Failed(message) => write!(f, "token response hook failed: {message}"),
            Self::Panicked(message) => write!(f, "token response hook panicked: {message}"),
            Self::Discarded { fields, claims } => write!(
                f,
                "token response hook output discarded (standard fields: [{}], claims on failure: {claims})",
                fields.join(", ")
            ),
        }
    }
}

/// Extension point for custom response fields and claims.
#[async_trait]
pub trait TokenResponseHook: Send + Sync {
    async fn augment(&self, ctx: &HookContext<'_>) -> Result<Augmentation, HookError>;
}

/// Calls the hook and enforces its contract.
///
/// Never fails: errors and panics yield an empty augmentation with a
/// warning. Standard response fields are removed from the result, as are
/// claims when the request failed.
pub async fn run_hook(
    hook: &dyn TokenResponseHook,
    ctx: &HookContext<'_>,
) -> (Augmentation, Option<HookWarning>) {
    let mut augmentation = match AssertUnwindSafe(hook.augment(ctx)).catch_unwind().await {
        Ok(Ok(augmentation)) => augmentation,
        Ok(Err(e)) => {
            return (Augmentation::default(), Some(HookWarning::Failed(e.to_string())));
        }
        Err(panic) => {
            return (
                Augmentation::default(),
                Some(HookWarning::Panicked(panic_message(panic.as_ref()))),
            );
        }
    };

    let fields: Vec<String> = augmentation
        .response_fields
        .keys()
        .filter(|name| is_standard_response_field(name))
        .cloned()
        .collect();
    for name in &fields {
        augmentation.response_fields.remove(name);
    }

    let claims = if ctx.draft.is_none() {
        std::mem::take(&mut augmentation.claims).len()
    } else {
        0
    };

    let warning = (!fields.is_empty() || claims > 0)
        .then_some(HookWarning::Discarded { fields, claims });
    (augmentation, warning)
}

fn panic_message(panic: &(dyn Any + Send)) -> String {
    if let Some(message) = panic.downcast_ref::<&str>() {
        (*message).to_string()
    } else if let Some(message) = panic.downcast_ref::<String>() {
        message.clone()
    } else {
        "unknown panic".to_string()
    }
}
