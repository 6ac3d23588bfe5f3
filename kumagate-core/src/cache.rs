//! In-memory view of the backend's monitors and their latest heartbeats.

use std::collections::BTreeMap;

use kumagate_types::{HealthSample, MonitorId, MonitorList, MonitorRecord};
use parking_lot::RwLock;
use tracing::debug;

/// Process-wide cache fed by push events.
///
/// The monitor list is replaced wholesale; heartbeats are overwritten per
/// monitor, last write wins. Nothing expires: the whole cache is dropped when
/// the session disconnects.
#[derive(Debug, Default)]
pub struct StateCache {
    monitors: RwLock<Option<MonitorList>>,
    heartbeats: RwLock<BTreeMap<MonitorId, HealthSample>>,
}

impl StateCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// The monitor list as of the last refresh, if any.
    pub fn monitor_list(&self) -> Option<MonitorList> {
        self.monitors.read().clone()
    }

    /// A single cached record.
    pub fn monitor(&self, id: &MonitorId) -> Option<MonitorRecord> {
        self.monitors
            .read()
            .as_ref()
            .and_then(|list| list.get(id).cloned())
    }

    /// The last sample received for a monitor.
    pub fn heartbeat(&self, id: &MonitorId) -> Option<HealthSample> {
        self.heartbeats.read().get(id).cloned()
    }

    /// Every cached sample.
    pub fn heartbeats(&self) -> BTreeMap<MonitorId, HealthSample> {
        self.heartbeats.read().clone()
    }

    /// Store a single heartbeat. Samples without a monitor id are dropped.
    pub fn ingest_heartbeat(&self, sample: HealthSample) -> bool {
        let Some(id) = sample.monitor_id.clone() else {
            return false;
        };
        debug!(monitor_id = %id, status = ?sample.status, "Heartbeat");
        self.heartbeats.write().insert(id, sample);
        true
    }

    /// Store the newest entry of a heartbeat history (index 0).
    pub fn ingest_heartbeat_list(&self, id: MonitorId, samples: &[HealthSample]) -> bool {
        let Some(latest) = samples.first() else {
            return false;
        };
        debug!(monitor_id = %id, count = samples.len(), "Heartbeat list");
        self.heartbeats.write().insert(id, latest.clone());
        true
    }

    /// Replace the monitor list.
    pub fn ingest_monitor_list(&self, list: MonitorList) {
        debug!(count = list.len(), "Monitor list cached");
        *self.monitors.write() = Some(list);
    }

    /// Drop the monitor list and every heartbeat.
    pub fn invalidate_all(&self) {
        *self.monitors.write() = None;
        self.heartbeats.write().clear();
        debug!("Cache invalidated");
    }

    /// Drop the monitor list, keeping heartbeats.
    pub fn invalidate_monitor_list(&self) {
        *self.monitors.write() = None;
    }

    /// Forget everything cached about a deleted monitor.
    pub fn forget_monitor(&self, id: &MonitorId) {
        self.invalidate_monitor_list();
        self.heartbeats.write().remove(id);
    }
}
