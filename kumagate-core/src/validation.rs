//! Checks and defaults for monitors created through the service.

use kumagate_client::defaults::fill_if_falsy;
use kumagate_types::is_truthy;
use serde_json::{json, Map, Value};

use crate::error::{Error, Result};

fn has(fields: &Map<String, Value>, key: &str) -> bool {
    fields.get(key).is_some_and(is_truthy)
}

/// Reject a new monitor that lacks the fields its type needs.
pub fn validate_new_monitor(fields: &Map<String, Value>) -> Result<()> {
    if !has(fields, "type") || !has(fields, "name") {
        return Err(Error::Validation(
            "Missing required fields: type and name are required".to_string(),
        ));
    }

    match fields.get("type").and_then(Value::as_str) {
        Some("port") => {
            for field in ["hostname", "port"] {
                if !has(fields, field) {
                    return Err(Error::Validation(format!(
                        "Missing required field for port monitor: {} is required",
                        field
                    )));
                }
            }
        }
        Some("http") | Some("https") => {
            if !has(fields, "url") {
                return Err(Error::Validation(
                    "Missing required field for http/https monitor: url is required".to_string(),
                ));
            }
        }
        _ => {}
    }

    Ok(())
}

/// Fill the settings every monitor created here starts with.
///
/// `active` is only set when absent; an explicit `false` or `null` is kept.
pub fn apply_caller_defaults(fields: &mut Map<String, Value>) {
    fill_if_falsy(fields, "conditions", json!([]));
    if !fields.contains_key("active") {
        fields.insert("active".to_string(), Value::Bool(true));
    }
    fill_if_falsy(fields, "interval", json!(60));
    fill_if_falsy(fields, "maxretries", json!(3));
    fill_if_falsy(fields, "notificationIDList", json!([]));
}

/// Validate, then apply defaults.
pub fn prepare_new_monitor(mut fields: Map<String, Value>) -> Result<Map<String, Value>> {
    validate_new_monitor(&fields)?;
    apply_caller_defaults(&mut fields);
    Ok(fields)
}
