//! Derived statuses and session state reported to callers.

use serde::{Deserialize, Serialize};

use crate::MonitorId;

/// The simplified "is this monitor up" answer for one monitor.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MonitorStatus {
    pub id: MonitorId,
    /// Monitor name, `"Unknown"` when the record has none.
    pub name: String,
    /// `true` means operational.
    pub status: bool,
    /// Timestamp of the cached heartbeat the verdict was based on.
    pub last_check: Option<String>,
}

/// Snapshot of the shared backend session.
///
/// `authenticated` implies `connected`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct SessionState {
    pub connected: bool,
    pub authenticated: bool,
    /// A connect + login sequence is in flight.
    pub connecting: bool,
}
