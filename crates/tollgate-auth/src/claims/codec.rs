//! Stable JSON representation of claims and principals.
//!
//! ```json
//! {
//!   "authenticationType": "pwd",
//!   "claims": [
//!     { "type": "sub", "value": "bob", "valueType": "http://www.w3.org/2001/XMLSchema#string" }
//!   ]
//! }
//! ```
//!
//! This is the format embedded in persisted grant data, so it must not change
//! between store implementations. `valueType` is always written; when it is
//! missing on read the string type is assumed.

use serde_json::Value;

use super::{Claim, Principal};

/// Errors produced when decoding claims or principals.
#[derive(Debug, thiserror::Error)]
pub enum CodecError {
    /// The document does not have the expected shape.
    #[error("malformed claim document: {0}")]
    Malformed(#[from] serde_json::Error),
}

/// Encodes a single claim.
#[must_use]
pub fn encode_claim(claim: &Claim) -> Value {
    serde_json::json!({
        "type": claim.claim_type(),
        "value": claim.value(),
        "valueType": claim.value_type(),
    })
}

/// Decodes a single claim.
///
/// # Errors
///
/// Returns `CodecError::Malformed` if `type` or `value` is missing or not a
/// string.
pub fn decode_claim(value: &Value) -> Result<Claim, CodecError> {
    Ok(serde_json::from_value(value.clone())?)
}

/// Encodes a principal, preserving claim order and duplicates.
#[must_use]
pub fn encode_principal(principal: &Principal) -> Value {
    serde_json::json!({
        "authenticationType": principal.authentication_type(),
        "claims": principal.claims().iter().map(encode_claim).collect::<Vec<_>>(),
    })
}

/// Decodes a principal.
///
/// # Errors
///
/// Returns `CodecError::Malformed` for documents of the wrong shape.
pub fn decode_principal(value: &Value) -> Result<Principal, CodecError> {
    Ok(serde_json::from_value(value.clone())?)
}
