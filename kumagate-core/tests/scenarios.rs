//! End-to-end behaviour of the monitor service against a scripted backend.

use std::sync::Arc;
use std::time::Duration;

use kumagate_client::mock::{MockTransport, Step};
use kumagate_client::ClientError;
use kumagate_core::{derive_status, Error, MonitorService};
use kumagate_types::{HealthSample, HeartbeatStatus, MonitorId, MonitorRecord};
use serde_json::{json, Value};

fn service(mock: &Arc<MockTransport>) -> MonitorService {
    MonitorService::builder()
        .credentials("admin", "admin123")
        .transport_factory(mock.factory())
        .build()
}

fn list_reply(list: Value) -> Value {
    json!({ "ok": true, "monitorList": list })
}

#[tokio::test(start_paused = true)]
async fn test_create_merges_defaults_and_invalidates_list() {
    let mock = MockTransport::new();
    mock.reply("getMonitorList", list_reply(json!({ "1": { "name": "Existing" } })));
    mock.reply("add", json!({ "ok": true, "msg": "Added Successfully.", "monitorID": 7 }));
    let service = service(&mock);
    service.start().await;
    assert!(service.cache().monitor_list().is_some());

    let reply = service
        .create_monitor(json!({ "type": "http", "name": "Example", "url": "https://example.com" }))
        .await
        .unwrap();

    assert_eq!(reply["monitorID"], json!(7));
    let sent = &mock.calls_to("add")[0][0];
    assert_eq!(sent["active"], json!(true));
    assert_eq!(sent["interval"], json!(60));
    assert_eq!(sent["maxretries"], json!(3));
    assert_eq!(sent["notificationIDList"], json!([]));
    assert_eq!(sent["conditions"], json!([]));
    assert_eq!(sent["accepted_statuscodes"], json!(["200-299"]));
    assert!(service.cache().monitor_list().is_none());
}

#[tokio::test(start_paused = true)]
async fn test_invalid_port_monitor_never_reaches_backend() {
    let mock = MockTransport::new();
    let service = service(&mock);

    let err = service
        .create_monitor(json!({ "type": "port", "name": "X" }))
        .await
        .unwrap_err();

    match err {
        Error::Validation(msg) => assert!(msg.contains("hostname")),
        other => panic!("expected validation error, got {:?}", other),
    }
    assert!(mock.calls().is_empty());
    assert_eq!(mock.open_count(), 0);
}

#[test]
fn test_inactive_monitor_is_down_despite_healthy_heartbeat() {
    let record = MonitorRecord::from_value(json!({ "active": false })).unwrap();
    let sample = HealthSample::new(HeartbeatStatus::Up);
    assert!(!derive_status(&record, Some(&sample)));
}

#[test]
fn test_heavy_monitor_without_heartbeat_is_up() {
    let record = MonitorRecord::from_value(json!({ "weight": 2500 })).unwrap();
    assert!(derive_status(&record, None));
}

#[tokio::test(start_paused = true)]
async fn test_statuses_combine_list_and_heartbeats() {
    let mock = MockTransport::new();
    mock.reply(
        "getMonitorList",
        list_reply(json!({
            "1": { "name": "Web", "active": true },
            "2": { "name": "", "active": true, "weight": 2500 },
            "3": { "name": "Paused", "active": false },
        })),
    );
    let service = service(&mock);
    service.start().await;

    mock.emit(
        "heartbeat",
        vec![json!({ "monitorID": 1, "status": 1, "time": "2024-05-01 10:00:00" })],
    );
    mock.emit(
        "heartbeatList",
        vec![json!(3), json!([{ "status": 1, "time": "b" }, { "status": 0, "time": "a" }])],
    );

    let statuses = service.get_monitor_statuses().await.unwrap();
    let view: Vec<_> = statuses
        .iter()
        .map(|s| (s.id.as_str().to_string(), s.name.clone(), s.status, s.last_check.clone()))
        .collect();

    assert_eq!(
        view,
        vec![
            ("1".into(), "Web".into(), true, Some("2024-05-01 10:00:00".into())),
            ("2".into(), "Unknown".into(), true, None),
            ("3".into(), "Paused".into(), false, Some("b".into())),
        ]
    );
}

#[tokio::test(start_paused = true)]
async fn test_heartbeat_for_unlisted_monitor_is_tolerated() {
    let mock = MockTransport::new();
    mock.reply("getMonitorList", list_reply(json!({ "1": { "name": "Web" } })));
    mock.reply("getMonitor", json!({ "ok": true, "monitor": { "id": 99, "name": "Late", "weight": 2500 } }));
    let service = service(&mock);
    service.start().await;

    mock.emit("heartbeat", vec![json!({ "monitorID": 99, "status": 0 })]);
    assert!(service.cache().heartbeat(&MonitorId::from(99)).is_some());

    // The record comes from the backend; the cached sample still applies.
    let status = service.get_monitor_status(&MonitorId::from(99)).await.unwrap();
    assert_eq!(status.name, "Late");
    assert!(!status.status);
}

#[tokio::test(start_paused = true)]
async fn test_status_of_cached_monitor_needs_no_rpc() {
    let mock = MockTransport::new();
    mock.reply("getMonitorList", list_reply(json!({ "4": { "name": "Db", "weight": 2500 } })));
    let service = service(&mock);
    service.start().await;

    let status = service.get_monitor_status(&MonitorId::from(4)).await.unwrap();

    assert!(status.status);
    assert!(mock.calls_to("getMonitor").is_empty());
}

#[tokio::test(start_paused = true)]
async fn test_concurrent_first_requests_share_one_login() {
    let mock = MockTransport::new();
    mock.delay_open(Duration::from_millis(200));
    mock.reply("getMonitorList", list_reply(json!({ "1": { "name": "Web" } })));
    let service = service(&mock);

    let handles: Vec<_> = (0..5)
        .map(|_| {
            let service = service.clone();
            tokio::spawn(async move { service.get_monitors().await })
        })
        .collect();

    for handle in handles {
        assert_eq!(handle.await.unwrap().unwrap().len(), 1);
    }
    assert_eq!(mock.open_count(), 1);
    assert_eq!(mock.calls_to("login").len(), 1);
}

#[tokio::test(start_paused = true)]
async fn test_delete_forgets_monitor_and_its_heartbeat() {
    let mock = MockTransport::new();
    mock.reply("getMonitorList", list_reply(json!({ "5": { "name": "Old" } })));
    let service = service(&mock);
    service.start().await;
    mock.emit("heartbeat", vec![json!({ "monitorID": 5, "status": 1 })]);

    service.delete_monitor(&MonitorId::from(5)).await.unwrap();

    assert!(service.cache().monitor_list().is_none());
    assert!(service.cache().heartbeat(&MonitorId::from(5)).is_none());
    assert_eq!(mock.calls_to("deleteMonitor")[0], vec![json!(5)]);
}

#[tokio::test(start_paused = true)]
async fn test_update_sends_id_with_fields() {
    let mock = MockTransport::new();
    let service = service(&mock);

    service
        .update_monitor(&MonitorId::from(3), json!({ "name": "Renamed", "type": "http" }))
        .await
        .unwrap();

    let sent = &mock.calls_to("editMonitor")[0][0];
    assert_eq!(sent["id"], json!(3));
    assert_eq!(sent["name"], json!("Renamed"));
}

#[tokio::test(start_paused = true)]
async fn test_mutation_failures_reach_the_caller() {
    let mock = MockTransport::new();
    mock.on("resumeMonitor", vec![Step::Hang]);
    let service = MonitorService::builder()
        .transport_factory(mock.factory())
        .rpc_timeout(Duration::from_secs(2))
        .build();

    let err = service.resume_monitor(&MonitorId::from(1)).await.unwrap_err();

    assert!(matches!(err, Error::Client(ClientError::RpcTimeout { .. })));
}

#[tokio::test(start_paused = true)]
async fn test_disconnect_clears_cache_and_next_call_reconnects() {
    let mock = MockTransport::new();
    mock.reply("getMonitorList", list_reply(json!({ "1": { "name": "Web" } })));
    let service = service(&mock);
    service.start().await;
    mock.emit("heartbeat", vec![json!({ "monitorID": 1, "status": 1 })]);

    mock.drop_connection();

    assert!(service.cache().monitor_list().is_none());
    assert!(service.cache().heartbeats().is_empty());
    assert!(!service.session_state().connected);

    let monitors = service.get_monitors().await.unwrap();
    assert_eq!(monitors.len(), 1);
    assert_eq!(mock.calls_to("login").len(), 2);
}
