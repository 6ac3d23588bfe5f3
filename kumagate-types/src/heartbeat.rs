//! Heartbeat samples pushed by the backend.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::MonitorId;

/// Status code carried by a heartbeat.
///
/// The backend uses `0` for down, `1` for up and `2` for pending. Newer
/// backends also emit `3` while a monitor is under maintenance; any other
/// code is preserved as [`HeartbeatStatus::Unknown`].
///
/// A status that was sent but is not an integer (`null`, a string, `1.5`)
/// is kept as [`HeartbeatStatus::UNREADABLE`] so it still counts as a
/// reported, not-up status.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(from = "i64", into = "i64")]
pub enum HeartbeatStatus {
    Down,
    Up,
    Pending,
    Maintenance,
    Unknown(i64),
}

impl HeartbeatStatus {
    /// Stand-in for a status field that is present but unreadable.
    pub const UNREADABLE: HeartbeatStatus = HeartbeatStatus::Unknown(-1);

    /// Map a raw status code.
    pub fn from_code(code: i64) -> Self {
        match code {
            0 => HeartbeatStatus::Down,
            1 => HeartbeatStatus::Up,
            2 => HeartbeatStatus::Pending,
            3 => HeartbeatStatus::Maintenance,
            other => HeartbeatStatus::Unknown(other),
        }
    }

    /// The raw status code.
    pub fn code(self) -> i64 {
        match self {
            HeartbeatStatus::Down => 0,
            HeartbeatStatus::Up => 1,
            HeartbeatStatus::Pending => 2,
            HeartbeatStatus::Maintenance => 3,
            HeartbeatStatus::Unknown(code) => code,
        }
    }

    /// Only code `1` counts as up.
    pub fn is_up(self) -> bool {
        self == HeartbeatStatus::Up
    }
}

impl From<i64> for HeartbeatStatus {
    fn from(code: i64) -> Self {
        Self::from_code(code)
    }
}

impl From<HeartbeatStatus> for i64 {
    fn from(status: HeartbeatStatus) -> Self {
        status.code()
    }
}

/// A single health measurement for one monitor.
///
/// Samples are overwritten in place in the cache: whichever sample arrives
/// last wins, regardless of its `time`.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct HealthSample {
    /// Monitor this sample belongs to. Samples inside a `heartbeatList`
    /// push may omit it, the id is then carried by the event itself.
    #[serde(rename = "monitorID", default, skip_serializing_if = "Option::is_none")]
    pub monitor_id: Option<MonitorId>,

    /// Status code, absent when the backend did not send one.
    #[serde(default)]
    pub status: Option<HeartbeatStatus>,

    /// Backend timestamp of the measurement, passed through untouched.
    #[serde(default)]
    pub time: Option<String>,

    /// Round-trip latency in milliseconds.
    #[serde(default)]
    pub ping: Option<f64>,
}

impl HealthSample {
    /// Create a sample with just a status.
    pub fn new(status: HeartbeatStatus) -> Self {
        Self {
            status: Some(status),
            ..Default::default()
        }
    }

    /// Set the monitor id.
    pub fn with_monitor(mut self, id: impl Into<MonitorId>) -> Self {
        self.monitor_id = Some(id.into());
        self
    }

    /// Set the timestamp.
    pub fn with_time(mut self, time: impl Into<String>) -> Self {
        self.time = Some(time.into());
        self
    }

    /// Parse a sample out of a push payload.
    ///
    /// Returns `None` unless the payload is an object. A `status` key that
    /// is present always yields a status, unreadable values included. Other
    /// fields of the wrong type are dropped rather than failing the sample,
    /// and a zero ping is treated as "no measurement".
    pub fn from_value(value: &Value) -> Option<Self> {
        let obj = value.as_object()?;

        let status = obj.get("status").map(|s| {
            s.as_i64()
                .or_else(|| s.as_f64().filter(|f| f.fract() == 0.0).map(|f| f as i64))
                .map_or(HeartbeatStatus::UNREADABLE, HeartbeatStatus::from_code)
        });

        let time = obj.get("time").and_then(|t| match t {
            Value::String(s) => Some(s.clone()),
            Value::Number(n) => Some(n.to_string()),
            _ => None,
        });

        let ping = obj
            .get("ping")
            .and_then(Value::as_f64)
            .filter(|p| *p != 0.0 && !p.is_nan());

        Some(Self {
            monitor_id: obj.get("monitorID").and_then(MonitorId::from_value),
            status,
            time,
            ping,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_status_codes_round_trip_through_enum() {
        for code in [0, 1, 2, 3, 9] {
            assert_eq!(HeartbeatStatus::from_code(code).code(), code);
        }
        assert!(HeartbeatStatus::Up.is_up());
        assert!(!HeartbeatStatus::Pending.is_up());
    }

    #[test]
    fn test_from_value_reads_backend_payload() {
        let sample = HealthSample::from_value(&json!({
            "monitorID": 4,
            "status": 0,
            "time": "2024-05-01 10:00:00.000",
            "ping": 35,
            "msg": "timeout",
        }))
        .unwrap();

        assert_eq!(sample.monitor_id, Some(MonitorId::from(4)));
        assert_eq!(sample.status, Some(HeartbeatStatus::Down));
        assert_eq!(sample.time.as_deref(), Some("2024-05-01 10:00:00.000"));
        assert_eq!(sample.ping, Some(35.0));
    }

    #[test]
    fn test_from_value_tolerates_missing_fields() {
        let sample = HealthSample::from_value(&json!({ "ping": 0 })).unwrap();
        assert_eq!(sample.monitor_id, None);
        assert_eq!(sample.status, None);
        assert_eq!(sample.ping, None);

        assert!(HealthSample::from_value(&json!([1, 2])).is_none());
    }

    #[test]
    fn test_present_but_unreadable_status_is_kept() {
        for raw in [json!(null), json!("1"), json!(true), json!(1.5)] {
            let sample = HealthSample::from_value(&json!({ "monitorID": 1, "status": raw })).unwrap();
            assert_eq!(sample.status, Some(HeartbeatStatus::UNREADABLE), "status {raw}");
            assert!(!sample.status.unwrap().is_up());
        }

        let sample = HealthSample::from_value(&json!({ "status": 1.0 })).unwrap();
        assert_eq!(sample.status, Some(HeartbeatStatus::Up));
    }

    #[test]
    fn test_serializes_with_backend_field_names() {
        let sample = HealthSample::new(HeartbeatStatus::Up).with_monitor(2).with_time("t");
        let value = serde_json::to_value(&sample).unwrap();
        assert_eq!(value["monitorID"], json!(2));
        assert_eq!(value["status"], json!(1));
    }
}
