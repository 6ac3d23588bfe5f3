//! Boolean "is this monitor up" verdict.

use kumagate_types::{HealthSample, MonitorRecord};

/// Weight at or above which a monitor without a heartbeat counts as up.
pub const WEIGHT_UP_THRESHOLD: f64 = 2000.0;

/// Decide whether a monitor is operational.
///
/// First matching rule wins:
///
/// 1. `active` is `false` or `forceInactive` is `true`: down
/// 2. `maintenance` is truthy: down
/// 3. a sample carrying any status (even `null`): up only for status 1
/// 4. a numeric `weight`: up when at least 2000
/// 5. otherwise down
pub fn derive_status(record: &MonitorRecord, sample: Option<&HealthSample>) -> bool {
    if record.is_explicitly_inactive() || record.is_force_inactive() {
        return false;
    }
    if record.in_maintenance() {
        return false;
    }
    if let Some(status) = sample.and_then(|s| s.status) {
        return status.is_up();
    }
    match record.weight() {
        Some(weight) => weight >= WEIGHT_UP_THRESHOLD,
        None => false,
    }
}
