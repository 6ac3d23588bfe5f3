//! Opaque monitor identity.

use std::cmp::Ordering;
use std::fmt;

use serde::{Deserialize, Deserializer, Serialize, Serializer};
use serde_json::Value;

/// Identity of a monitor on the backend.
///
/// Monitor lists are keyed by stringified integers while heartbeats carry
/// numeric ids, so the id is kept in a canonical string form: integers are
/// re-rendered without leading zeros or whitespace, anything else is kept
/// verbatim. Two ids are equal exactly when their canonical forms are.
///
/// Ordering is numeric when both ids are integers, lexical otherwise.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct MonitorId(String);

impl MonitorId {
    /// Create an id from its raw textual form.
    pub fn new(raw: impl AsRef<str>) -> Self {
        let trimmed = raw.as_ref().trim();
        match trimmed.parse::<i64>() {
            Ok(n) => Self(n.to_string()),
            Err(_) => Self(trimmed.to_string()),
        }
    }

    /// The canonical string form, as used for list keys.
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// The integer form, if the id is numeric.
    pub fn as_i64(&self) -> Option<i64> {
        self.0.parse().ok()
    }

    /// Render the id the way the backend expects it in RPC payloads.
    ///
    /// Numeric ids become JSON numbers, anything else a JSON string.
    pub fn to_value(&self) -> Value {
        match self.as_i64() {
            Some(n) => Value::from(n),
            None => Value::String(self.0.clone()),
        }
    }

    /// Parse an id out of a JSON value.
    ///
    /// Accepts integers, integral floats and non-empty strings. Returns `None`
    /// for everything else, including `0` and `""` which the backend never
    /// hands out.
    pub fn from_value(value: &Value) -> Option<Self> {
        match value {
            Value::Number(n) => {
                let int = n
                    .as_i64()
                    .or_else(|| n.as_f64().filter(|f| f.fract() == 0.0).map(|f| f as i64))?;
                (int != 0).then(|| Self(int.to_string()))
            }
            Value::String(s) if !s.trim().is_empty() => Some(Self::new(s)),
            _ => None,
        }
    }
}

impl PartialOrd for MonitorId {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for MonitorId {
    fn cmp(&self, other: &Self) -> Ordering {
        match (self.as_i64(), other.as_i64()) {
            (Some(a), Some(b)) => a.cmp(&b),
            (Some(_), None) => Ordering::Less,
            (None, Some(_)) => Ordering::Greater,
            (None, None) => self.0.cmp(&other.0),
        }
    }
}

impl fmt::Display for MonitorId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<i64> for MonitorId {
    fn from(id: i64) -> Self {
        Self(id.to_string())
    }
}

impl From<i32> for MonitorId {
    fn from(id: i32) -> Self {
        Self(id.to_string())
    }
}

impl From<&str> for MonitorId {
    fn from(id: &str) -> Self {
        Self::new(id)
    }
}

impl From<String> for MonitorId {
    fn from(id: String) -> Self {
        Self::new(id)
    }
}

impl Serialize for MonitorId {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        match self.as_i64() {
            Some(n) => serializer.serialize_i64(n),
            None => serializer.serialize_str(&self.0),
        }
    }
}

impl<'de> Deserialize<'de> for MonitorId {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let value = Value::deserialize(deserializer)?;
        Self::from_value(&value)
            .ok_or_else(|| serde::de::Error::custom(format!("invalid monitor id: {}", value)))
    }
}
