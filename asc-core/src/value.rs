//! Recursive value tree used to represent opaque tool arguments.
//!
//! Tool arguments arrive from the host as arbitrary, dynamically-typed data.
//! The controller never interprets their meaning; it only needs to compare,
//! hash, and diff them structurally. [`Value`] is the canonical in-memory
//! shape every comparison and fingerprint operates on.

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::cmp::Ordering;
use std::collections::BTreeMap;
use std::fmt::Write as _;

/// A structural, source-independent representation of tool arguments.
///
/// Two argument trees that are structurally equal must produce the same
/// [`canonical_string`] and the same [`args_hash`], regardless of the key
/// order or number formatting used by whatever produced them.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Value {
    Null,
    Bool(bool),
    Number(f64),
    String(String),
    Array(Vec<Value>),
    Object(BTreeMap<String, Value>),
}

impl Value {
    #[must_use]
    pub fn object(pairs: impl IntoIterator<Item = (String, Value)>) -> Self {
        Self::Object(pairs.into_iter().collect())
    }

    #[must_use]
    pub fn as_str(&self) -> Option<&str> {
        match self {
            Self::String(s) => Some(s.as_str()),
            _ => None,
        }
    }

    #[must_use]
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Self::Number(n) => Some(*n),
            _ => None,
        }
    }

    #[must_use]
    pub fn as_object(&self) -> Option<&BTreeMap<String, Value>> {
        match self {
            Self::Object(map) => Some(map),
            _ => None,
        }
    }

    #[must_use]
    pub fn as_array(&self) -> Option<&[Value]> {
        match self {
            Self::Array(items) => Some(items),
            _ => None,
        }
    }

    /// Best-effort conversion from a `serde_json::Value`.
    #[must_use]
    pub fn from_json(value: &serde_json::Value) -> Self {
        match value {
            serde_json::Value::Null => Self::Null,
            serde_json::Value::Bool(b) => Self::Bool(*b),
            serde_json::Value::Number(n) => Self::Number(n.as_f64().unwrap_or(0.0)),
            serde_json::Value::String(s) => Self::String(s.clone()),
            serde_json::Value::Array(items) => {
                Self::Array(items.iter().map(Self::from_json).collect())
            }
            serde_json::Value::Object(map) => Self::Object(
                map.iter()
                    .map(|(k, v)| (k.clone(), Self::from_json(v)))
                    .collect(),
            ),
        }
    }

    /// Serialize into a canonical string: keys sorted at every nesting
    /// level, numbers in a stable format, strings verbatim.
    ///
    /// This is the basis for both `args_hash` and checkpoint hashing: two
    /// trees that are structurally equal produce byte-identical output.
    #[must_use]
    pub fn canonical_string(&self) -> String {
        let mut out = String::new();
        self.write_canonical(&mut out);
        out
    }

    fn write_canonical(&self, out: &mut String) {
        match self {
            Self::Null => out.push_str("null"),
            Self::Bool(b) => out.push_str(if *b { "true" } else { "false" }),
            Self::Number(n) => {
                let _ = write!(out, "{}", canonical_number(*n));
            }
            Self::String(s) => {
                out.push('"');
                for c in s.chars() {
                    match c {
                        '"' => out.push_str("\\\""),
                        '\\' => out.push_str("\\\\"),
                        '\n' => out.push_str("\\n"),
                        _ => out.push(c),
                    }
                }
                out.push('"');
            }
            Self::Array(items) => {
                out.push('[');
                for (i, item) in items.iter().enumerate() {
                    if i > 0 {
                        out.push(',');
                    }
                    item.write_canonical(out);
                }
                out.push(']');
            }
            Self::Object(map) => {
                out.push('{');
                // BTreeMap already iterates in lexicographic key order.
                for (i, (key, value)) in map.iter().enumerate() {
                    if i > 0 {
                        out.push(',');
                    }
                    out.push('"');
                    out.push_str(key);
                    out.push_str("\":");
                    value.write_canonical(out);
                }
                out.push('}');
            }
        }
    }
}

/// Stable textual form of a float: integral values print without a
/// trailing `.0`, others use the shortest round-trippable representation.
fn canonical_number(n: f64) -> String {
    if n.fract() == 0.0 && n.abs() < 1e15 {
        format!("{n:.0}")
    } else {
        format!("{n}")
    }
}

/// 16-hex-character SHA-256 prefix of a value's canonical serialization.
///
/// Truncating to 16 hex chars (64 bits) is a deliberate tradeoff: the
/// fingerprint only needs to distinguish recently-seen argument shapes
/// within one process, not serve as a collision-resistant identifier.
#[must_use]
pub fn args_hash(value: &Value) -> String {
    let canonical = value.canonical_string();
    let digest = Sha256::digest(canonical.as_bytes());
    let mut hex = String::with_capacity(16);
    for byte in digest.iter().take(8) {
        let _ = write!(hex, "{byte:02x}");
    }
    hex
}

/// Structural equality ordering used when deciding array alignment during
/// similarity comparison (see [`crate::similarity`]).
#[must_use]
pub fn value_kind_order(value: &Value) -> u8 {
    match value {
        Value::Null => 0,
        Value::Bool(_) => 1,
        Value::Number(_) => 2,
        Value::String(_) => 3,
        Value::Array(_) => 4,
        Value::Object(_) => 5,
    }
}

#[must_use]
pub fn compare_values(a: &Value, b: &Value) -> Ordering {
    value_kind_order(a).cmp(&value_kind_order(b))
}
