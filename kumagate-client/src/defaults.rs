//! Field defaults the backend expects on every `add` request.

use kumagate_types::is_truthy;
use serde_json::{json, Map, Value};

/// String fields of the protocol-specific monitor types that default to `""`.
const EMPTY_STRING_FIELDS: &[&str] = &[
    "mqttUsername",
    "mqttPassword",
    "mqttTopic",
    "mqttSuccessMessage",
    "databaseConnectionString",
    "databaseQuery",
    "grpcUrl",
    "grpcProtobuf",
    "grpcServiceName",
    "grpcMethod",
    "grpcBody",
    "grpcMetadata",
    "radiusUsername",
    "radiusPassword",
    "radiusSecret",
    "radiusCalledStationId",
    "radiusCallingStationId",
];

/// Set `key` to `default` unless it already holds a truthy value.
pub fn fill_if_falsy(fields: &mut Map<String, Value>, key: &str, default: Value) {
    if !fields.get(key).is_some_and(is_truthy) {
        fields.insert(key.to_string(), default);
    }
}

/// Populate every field a new monitor must carry.
pub fn apply_backend_defaults(fields: &mut Map<String, Value>) {
    fill_if_falsy(fields, "notificationIDList", json!([]));
    fill_if_falsy(fields, "conditions", json!([]));
    fill_if_falsy(fields, "accepted_statuscodes", json!(["200-299"]));
    fill_if_falsy(fields, "dns_resolve_type", json!("A"));
    fill_if_falsy(fields, "dns_resolve_server", json!("1.1.1.1"));
    fill_if_falsy(fields, "proxyId", Value::Null);
    fill_if_falsy(fields, "authMethod", Value::Null);
    fill_if_falsy(fields, "grpcEnableTls", Value::Bool(false));

    for key in EMPTY_STRING_FIELDS {
        fill_if_falsy(fields, key, json!(""));
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn fields(value: Value) -> Map<String, Value> {
        match value {
            Value::Object(map) => map,
            _ => unreachable!(),
        }
    }

    #[test]
    fn test_fills_missing_and_falsy_fields() {
        let mut data = fields(json!({
            "type": "http",
            "name": "Example",
            "dns_resolve_type": "",
            "accepted_statuscodes": null,
        }));

        apply_backend_defaults(&mut data);

        assert_eq!(data["accepted_statuscodes"], json!(["200-299"]));
        assert_eq!(data["dns_resolve_type"], json!("A"));
        assert_eq!(data["dns_resolve_server"], json!("1.1.1.1"));
        assert_eq!(data["proxyId"], Value::Null);
        assert_eq!(data["grpcEnableTls"], json!(false));
        assert_eq!(data["radiusSecret"], json!(""));
        assert_eq!(data["notificationIDList"], json!([]));
    }

    #[test]
    fn test_keeps_truthy_caller_values() {
        let mut data = fields(json!({
            "dns_resolve_server": "8.8.8.8",
            "proxyId": 4,
            "grpcEnableTls": true,
            "mqttTopic": "status/door",
            "notificationIDList": { "1": true },
        }));

        apply_backend_defaults(&mut data);

        assert_eq!(data["dns_resolve_server"], json!("8.8.8.8"));
        assert_eq!(data["proxyId"], json!(4));
        assert_eq!(data["grpcEnableTls"], json!(true));
        assert_eq!(data["mqttTopic"], json!("status/door"));
        assert_eq!(data["notificationIDList"], json!({ "1": true }));
    }

    #[test]
    fn test_empty_array_counts_as_truthy() {
        let mut data = fields(json!({ "conditions": [] }));
        fill_if_falsy(&mut data, "conditions", json!(["replaced"]));
        assert_eq!(data["conditions"], json!([]));
    }
}
