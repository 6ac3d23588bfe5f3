//! Monitor records and the monitor list.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::MonitorId;

/// A monitor's configuration as last reported by the backend.
///
/// The backend owns the schema, so the record keeps the full attribute map
/// (name, type, hostname/url/port, interval, retries, notification list and
/// all type-specific fields) and only interprets the fields that drive
/// status derivation.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(transparent)]
pub struct MonitorRecord {
    attributes: Map<String, Value>,
}

impl MonitorRecord {
    /// Wrap an attribute map.
    pub fn new(attributes: Map<String, Value>) -> Self {
        Self { attributes }
    }

    /// Build a record from a JSON value; only objects qualify.
    pub fn from_value(value: Value) -> Option<Self> {
        match value {
            Value::Object(attributes) => Some(Self { attributes }),
            _ => None,
        }
    }

    /// All backend attributes.
    pub fn attributes(&self) -> &Map<String, Value> {
        &self.attributes
    }

    /// Look up a raw attribute.
    pub fn get(&self, key: &str) -> Option<&Value> {
        self.attributes.get(key)
    }

    /// The id the record carries itself, if any.
    pub fn id(&self) -> Option<MonitorId> {
        self.get("id").and_then(MonitorId::from_value)
    }

    pub fn name(&self) -> Option<&str> {
        self.get("name").and_then(Value::as_str)
    }

    /// `true` only when `active` is literally `false`.
    ///
    /// A missing flag, `null` or `0` do not count as inactive.
    pub fn is_explicitly_inactive(&self) -> bool {
        matches!(self.get("active"), Some(Value::Bool(false)))
    }

    /// `true` only when `forceInactive` is literally `true`.
    pub fn is_force_inactive(&self) -> bool {
        matches!(self.get("forceInactive"), Some(Value::Bool(true)))
    }

    /// Whether the `maintenance` attribute is truthy.
    pub fn in_maintenance(&self) -> bool {
        self.get("maintenance").is_some_and(is_truthy)
    }

    /// The numeric `weight`, if it is a JSON number.
    pub fn weight(&self) -> Option<f64> {
        match self.get("weight") {
            Some(Value::Number(n)) => n.as_f64(),
            _ => None,
        }
    }

    /// Attach an id unless the record already carries one.
    pub fn with_id(mut self, id: &MonitorId) -> Self {
        self.attributes
            .entry("id".to_string())
            .or_insert_with(|| id.to_value());
        self
    }
}

impl From<Map<String, Value>> for MonitorRecord {
    fn from(attributes: Map<String, Value>) -> Self {
        Self::new(attributes)
    }
}

/// JavaScript-style truthiness of a JSON value.
///
/// `null`, `false`, `0`, `NaN` and `""` are falsy; every other value,
/// including empty arrays and objects, is truthy.
pub fn is_truthy(value: &Value) -> bool {
    match value {
        Value::Null => false,
        Value::Bool(b) => *b,
        Value::Number(n) => n.as_f64().is_some_and(|f| f != 0.0 && !f.is_nan()),
        Value::String(s) => !s.is_empty(),
        Value::Array(_) | Value::Object(_) => true,
    }
}

/// The complete set of monitors known at the last refresh.
#[derive(Debug, Clone, PartialEq, Default, Serialize)]
#[serde(transparent)]
pub struct MonitorList {
    monitors: BTreeMap<MonitorId, MonitorRecord>,
}

impl MonitorList {
    /// Create an empty list.
    pub fn new() -> Self {
        Self::default()
    }

    /// Parse a `monitorList` payload: an object keyed by monitor id.
    ///
    /// Returns `None` for anything that is not an object (arrays included).
    /// Entries whose key is not a usable id or whose value is not an object
    /// are skipped.
    pub fn from_value(value: &Value) -> Option<Self> {
        let obj = value.as_object()?;

        let monitors = obj
            .iter()
            .filter_map(|(key, record)| {
                let id = MonitorId::from_value(&Value::String(key.clone()))?;
                let record = MonitorRecord::from_value(record.clone())?;
                Some((id, record))
            })
            .collect();

        Some(Self { monitors })
    }

    pub fn len(&self) -> usize {
        self.monitors.len()
    }

    pub fn is_empty(&self) -> bool {
        self.monitors.is_empty()
    }

    pub fn get(&self, id: &MonitorId) -> Option<&MonitorRecord> {
        self.monitors.get(id)
    }

    pub fn contains(&self, id: &MonitorId) -> bool {
        self.monitors.contains_key(id)
    }

    /// Iterate in id order.
    pub fn iter(&self) -> impl Iterator<Item = (&MonitorId, &MonitorRecord)> {
        self.monitors.iter()
    }

    /// All records, each with its list key attached as `id`.
    pub fn records(&self) -> Vec<MonitorRecord> {
        self.monitors
            .iter()
            .map(|(id, record)| record.clone().with_id(id))
            .collect()
    }
}

impl FromIterator<(MonitorId, MonitorRecord)> for MonitorList {
    fn from_iter<I: IntoIterator<Item = (MonitorId, MonitorRecord)>>(iter: I) -> Self {
        Self {
            monitors: iter.into_iter().collect(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn record(value: Value) -> MonitorRecord {
        MonitorRecord::from_value(value).unwrap()
    }

    #[test]
    fn test_truthiness_matches_javascript() {
        assert!(!is_truthy(&json!(null)));
        assert!(!is_truthy(&json!(0)));
        assert!(!is_truthy(&json!("")));
        assert!(!is_truthy(&json!(false)));
        assert!(is_truthy(&json!(1)));
        assert!(is_truthy(&json!("no")));
        assert!(is_truthy(&json!([])));
        assert!(is_truthy(&json!({})));
    }

    #[test]
    fn test_active_flag_is_strict() {
        assert!(record(json!({ "active": false })).is_explicitly_inactive());
        assert!(!record(json!({ "active": 0 })).is_explicitly_inactive());
        assert!(!record(json!({})).is_explicitly_inactive());
        assert!(record(json!({ "forceInactive": true })).is_force_inactive());
        assert!(!record(json!({ "forceInactive": 1 })).is_force_inactive());
    }

    #[test]
    fn test_weight_requires_a_number() {
        assert_eq!(record(json!({ "weight": 2500 })).weight(), Some(2500.0));
        assert_eq!(record(json!({ "weight": "2500" })).weight(), None);
    }

    #[test]
    fn test_with_id_keeps_existing_id() {
        let r = record(json!({ "id": 9, "name": "a" })).with_id(&MonitorId::from(3));
        assert_eq!(r.id(), Some(MonitorId::from(9)));

        let r = record(json!({ "name": "a" })).with_id(&MonitorId::from(3));
        assert_eq!(r.get("id"), Some(&json!(3)));
    }

    #[test]
    fn test_monitor_list_skips_non_object_entries() {
        let list = MonitorList::from_value(&json!({
            "1": { "name": "a" },
            "2": null,
            "3": "garbage",
            "10": { "name": "b" },
        }))
        .unwrap();

        assert_eq!(list.len(), 2);
        let ids: Vec<_> = list.iter().map(|(id, _)| id.clone()).collect();
        assert_eq!(ids, vec![MonitorId::from(1), MonitorId::from(10)]);
    }

    #[test]
    fn test_monitor_list_rejects_arrays() {
        assert!(MonitorList::from_value(&json!([{ "name": "a" }])).is_none());
        assert!(MonitorList::from_value(&json!(null)).is_none());
    }

    #[test]
    fn test_records_attach_list_keys() {
        let list = MonitorList::from_value(&json!({ "5": { "name": "a" } })).unwrap();
        let records = list.records();
        assert_eq!(records[0].id(), Some(MonitorId::from(5)));
    }
}
