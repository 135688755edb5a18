use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// A hashable, totally ordered decision value.
///
/// Opaque payloads stay opaque everywhere else in the system; only the
/// collaboration engine needs equality and ordering to count votes and
/// break ties, so decisions are constrained to this variant. The derived
/// order (`Int < Text < Map`, each compared internally) is the tie-break
/// order used by the voting rules.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Decision {
    Int(i64),
    Text(String),
    Map(BTreeMap<String, Decision>),
}

impl Decision {
    pub fn text(value: impl Into<String>) -> Self {
        Decision::Text(value.into())
    }

    pub fn int(value: i64) -> Self {
        Decision::Int(value)
    }

    /// Canonicalize an arbitrary JSON value into a decision. Values with
    /// no natural mapping (floats, booleans, arrays, null) become their
    /// JSON text so they still compare and hash consistently.
    pub fn from_value(value: &serde_json::Value) -> Self {
        match value {
            serde_json::Value::Number(n) if n.is_i64() => {
                Decision::Int(n.as_i64().expect("checked i64"))
            }
            serde_json::Value::String(s) => Decision::Text(s.clone()),
            serde_json::Value::Object(map) => Decision::Map(
                map.iter()
                    .map(|(k, v)| (k.clone(), Decision::from_value(v)))
                    .collect(),
            ),
            other => Decision::Text(other.to_string()),
        }
    }

    pub fn to_value(&self) -> serde_json::Value {
        match self {
            Decision::Int(n) => serde_json::Value::from(*n),
            Decision::Text(s) => serde_json::Value::from(s.clone()),
            Decision::Map(map) => serde_json::Value::Object(
                map.iter().map(|(k, v)| (k.clone(), v.to_value())).collect(),
            ),
        }
    }
}

impl std::fmt::Display for Decision {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Decision::Int(n) => write!(f, "{n}"),
            Decision::Text(s) => write!(f, "{s}"),
            Decision::Map(_) => write!(f, "{}", self.to_value()),
        }
    }
}

impl From<&str> for Decision {
    fn from(value: &str) -> Self {
        Decision::Text(value.to_string())
    }
}

impl From<i64> for Decision {
    fn from(value: i64) -> Self {
        Decision::Int(value)
    }
}
