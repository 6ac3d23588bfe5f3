//! Monitor list retrieval.
//!
//! Depending on the server version, `getMonitorList` is answered either with
//! the list inside the acknowledgement, or with a bare acknowledgement
//! followed by a separate `monitorList` push. [`fetch_monitor_list`] accepts
//! whichever arrives first and gives up after a deadline.

use std::time::Duration;

use kumagate_types::{is_truthy, MonitorList};
use serde_json::Value;
use tracing::debug;

use crate::transport::Transport;
use crate::ClientError;

/// Push event carrying the full monitor list.
pub const MONITOR_LIST_EVENT: &str = "monitorList";

/// Call requesting the full monitor list.
pub const GET_MONITOR_LIST: &str = "getMonitorList";

pub const DEFAULT_LIST_TIMEOUT: Duration = Duration::from_secs(10);

const REJECTED_FALLBACK: &str = "Failed to get monitor list";

/// What a `getMonitorList` acknowledgement means for the pending fetch.
#[derive(Debug, PartialEq)]
enum AckOutcome {
    Resolved(MonitorList),
    Rejected(String),
    Failed(ClientError),
    /// No list in the acknowledgement; keep waiting for the push.
    Wait,
}

/// Fetch the complete monitor list.
///
/// Resolves with the first of the acknowledgement payload or the
/// `monitorList` push. Fails with [`ClientError::ListFetchRejected`] when the
/// server declines, and with [`ClientError::ListFetchTimeout`] when neither
/// arrives within `timeout`. The one-shot push handler is removed on every
/// exit path.
pub async fn fetch_monitor_list(
    transport: &dyn Transport,
    timeout: Duration,
) -> Result<MonitorList, ClientError> {
    let (_guard, mut event) = transport.events().once(MONITOR_LIST_EVENT);

    let deadline = tokio::time::sleep(timeout);
    tokio::pin!(deadline);
    let ack = transport.call(GET_MONITOR_LIST, Vec::new(), timeout);
    tokio::pin!(ack);

    let mut event_open = true;
    let mut ack_pending = true;

    loop {
        tokio::select! {
            biased;

            pushed = &mut event, if event_open => match pushed {
                Ok(args) => {
                    let list = list_from_event(&args);
                    debug!(count = list.len(), "Monitor list resolved from event");
                    return Ok(list);
                }
                Err(_) => event_open = false,
            },

            reply = &mut ack, if ack_pending => {
                ack_pending = false;
                match interpret_ack(reply) {
                    AckOutcome::Resolved(list) => {
                        debug!(count = list.len(), "Monitor list resolved from acknowledgement");
                        return Ok(list);
                    }
                    AckOutcome::Rejected(message) => return Err(ClientError::ListFetchRejected(message)),
                    AckOutcome::Failed(err) => return Err(err),
                    AckOutcome::Wait => debug!("Waiting for monitorList event"),
                }
            }

            _ = &mut deadline => return Err(ClientError::ListFetchTimeout),
        }
    }
}

/// A non-object push payload resolves to an empty list.
fn list_from_event(args: &[Value]) -> MonitorList {
    args.first()
        .and_then(MonitorList::from_value)
        .unwrap_or_default()
}

fn interpret_ack(reply: Result<Vec<Value>, ClientError>) -> AckOutcome {
    let args = match reply {
        Ok(args) => args,
        Err(ClientError::Disconnected) => return AckOutcome::Failed(ClientError::Disconnected),
        Err(err) => {
            debug!(error = %err, "getMonitorList call failed, still waiting for event");
            return AckOutcome::Wait;
        }
    };

    match args.first() {
        Some(Value::Object(body)) if body.get("ok").is_some_and(is_truthy) => body
            .get("monitorList")
            .and_then(MonitorList::from_value)
            .map_or(AckOutcome::Wait, AckOutcome::Resolved),
        Some(Value::Object(body)) => AckOutcome::Rejected(
            body.get("msg")
                .and_then(Value::as_str)
                .filter(|msg| !msg.is_empty())
                .unwrap_or(REJECTED_FALLBACK)
                .to_string(),
        ),
        Some(other) if is_truthy(other) => AckOutcome::Rejected(REJECTED_FALLBACK.to_string()),
        _ => AckOutcome::Wait,
    }
}
