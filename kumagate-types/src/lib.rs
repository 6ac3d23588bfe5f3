//! # kumagate-types
//!
//! Core types shared by the kumagate crates. This crate defines the data
//! model the gateway keeps about a remote Uptime Kuma instance: monitor
//! records, heartbeat samples, and the derived statuses handed back to
//! callers.
//!
//! ## Design Goals
//!
//! - **Opaque identities**: monitor ids arrive as integers in some payloads and
//!   as string keys in others; [`MonitorId`] normalizes both into one key
//! - **Backend-owned records**: a [`MonitorRecord`] keeps the backend's attribute
//!   map as-is, with typed accessors for the handful of fields we interpret
//! - **Lenient ingestion**: push payloads are parsed with `from_value` helpers
//!   that skip malformed entries instead of failing the whole event
//!
//! ## Example
//!
//! ```rust
//! use kumagate_types::{HealthSample, HeartbeatStatus, MonitorId, MonitorList};
//! use serde_json::json;
//!
//! let list = MonitorList::from_value(&json!({
//!     "1": { "name": "Example", "type": "http", "active": true },
//!     "2": { "name": "Database", "type": "port", "active": false },
//! }))
//! .unwrap();
//! assert_eq!(list.len(), 2);
//!
//! let sample = HealthSample::from_value(&json!({ "monitorID": 1, "status": 1 })).unwrap();
//! assert_eq!(sample.monitor_id, Some(MonitorId::from(1)));
//! assert_eq!(sample.status, Some(HeartbeatStatus::Up));
//! ```

mod heartbeat;
mod id;
mod monitor;
mod status;

pub use heartbeat::*;
pub use id::*;
pub use monitor::*;
pub use status::*;
