//! Claim list → JWT payload conversion.
//!
//! Verifying parties expect one JSON member per claim type. Claims sharing a
//! type are merged into a single array (first-seen order); `scope` and `amr`
//! are arrays even when only one value is present.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Number, Value};

use crate::claims::{Claim, claim_types, value_types};

/// Claim types that are always encoded as arrays.
const ARRAY_CLAIMS: &[&str] = &[claim_types::SCOPE, claim_types::AUTHENTICATION_METHOD];

/// JSON object carried in the payload segment of a JWT.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct JwtPayload(Map<String, Value>);

impl JwtPayload {
    /// Builds the payload from an assembled claim list.
    #[must_use]
    pub fn from_claims(claims: &[Claim]) -> Self {
        let mut map = Map::new();
        for claim in claims {
            let value = claim_value(claim);
            let name = claim.claim_type();

            match map.get_mut(name) {
                Some(Value::Array(values)) => values.push(value),
                Some(existing) => {
                    let first = existing.take();
                    *existing = Value::Array(vec![first, value]);
                }
                None if ARRAY_CLAIMS.contains(&name) => {
                    map.insert(name.to_string(), Value::Array(vec![value]));
                }
                None => {
                    map.insert(name.to_string(), value);
                }
            }
        }
        Self(map)
    }

    #[must_use]
    pub fn get(&self, name: &str) -> Option<&Value> {
        self.0.get(name)
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.0.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

/// Converts a claim value according to its value type.
///
/// Values that do not parse as their declared type are kept as strings.
fn claim_value(claim: &Claim) -> Value {
    let raw = claim.value();
    let fallback = || Value::String(raw.to_string());

    match claim.value_type() {
        value_types::INTEGER | value_types::INTEGER32 | value_types::INTEGER64 => {
            if let Ok(n) = raw.parse::<i64>() {
                Value::Number(n.into())
            } else if let Ok(n) = raw.parse::<u64>() {
                Value::Number(n.into())
            } else {
                fallback()
            }
        }
        value_types::BOOLEAN => {
            if raw.eq_ignore_ascii_case("true") {
                Value::Bool(true)
            } else if raw.eq_ignore_ascii_case("false") {
                Value::Bool(false)
            } else {
                fallback()
            }
        }
        value_types::DOUBLE => raw
            .parse::<f64>()
            .ok()
            .and_then(Number::from_f64)
            .map_or_else(fallback, Value::Number),
        value_types::JSON => serde_json::from_str(raw).unwrap_or_else(|_| fallback()),
        _ => fallback(),
    }
}
