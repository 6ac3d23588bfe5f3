//! Authenticated session over a [`Transport`].

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use kumagate_types::{is_truthy, MonitorId, MonitorList, MonitorRecord};
use serde_json::{json, Map, Value};
use tracing::{debug, info, warn};

use crate::defaults::apply_backend_defaults;
use crate::events::SubscriptionId;
use crate::list_fetch::{fetch_monitor_list, DEFAULT_LIST_TIMEOUT};
use crate::transport::{Transport, DISCONNECT_EVENT};
use crate::ClientError;

pub const DEFAULT_RPC_TIMEOUT: Duration = Duration::from_secs(10);

/// A logged-in session.
///
/// The authenticated flag is raised by a successful [`Session::login`] and
/// forced down whenever the transport reports a disconnect. Every monitor
/// call checks it locally and fails with [`ClientError::NotAuthenticated`]
/// without touching the network.
#[derive(Debug)]
pub struct Session {
    transport: Arc<dyn Transport>,
    authenticated: Arc<AtomicBool>,
    rpc_timeout: Duration,
    list_timeout: Duration,
    disconnect_sub: SubscriptionId,
}

impl Session {
    pub fn new(transport: Arc<dyn Transport>) -> Self {
        Self::with_timeouts(transport, DEFAULT_RPC_TIMEOUT, DEFAULT_LIST_TIMEOUT)
    }

    pub fn with_timeouts(
        transport: Arc<dyn Transport>,
        rpc_timeout: Duration,
        list_timeout: Duration,
    ) -> Self {
        let authenticated = Arc::new(AtomicBool::new(false));

        let flag = authenticated.clone();
        let disconnect_sub = transport.events().subscribe(DISCONNECT_EVENT, move |_| {
            if flag.swap(false, Ordering::SeqCst) {
                debug!("Session lost its login");
            }
        });

        Self {
            transport,
            authenticated,
            rpc_timeout,
            list_timeout,
            disconnect_sub,
        }
    }

    pub fn transport(&self) -> &Arc<dyn Transport> {
        &self.transport
    }

    /// Logged in and still connected.
    pub fn is_authenticated(&self) -> bool {
        self.authenticated.load(Ordering::SeqCst) && self.transport.is_connected()
    }

    /// Log in with a username and password.
    pub async fn login(&self, username: &str, password: &str) -> Result<(), ClientError> {
        let credentials = json!({
            "username": username,
            "password": password,
            "token": null,
        });
        let reply = self
            .transport
            .call("login", vec![credentials], self.rpc_timeout)
            .await?;

        let body = reply.first();
        if body.and_then(|b| b.get("ok")).is_some_and(is_truthy) {
            self.authenticated.store(true, Ordering::SeqCst);
            info!(username, "Logged in");
            Ok(())
        } else {
            let message = body
                .and_then(|b| b.get("msg"))
                .and_then(Value::as_str)
                .unwrap_or("Login rejected")
                .to_string();
            warn!(username, reason = %message, "Login failed");
            Err(ClientError::Auth(message))
        }
    }

    /// Create a monitor. Returns the server's reply, which carries the new
    /// `monitorID`.
    pub async fn add_monitor(
        &self,
        mut fields: Map<String, Value>,
    ) -> Result<Map<String, Value>, ClientError> {
        apply_backend_defaults(&mut fields);
        let reply = self
            .privileged("add", vec![Value::Object(fields)], "Failed to add monitor")
            .await?;
        info!(monitor_id = ?reply.get("monitorID"), "Monitor added");
        Ok(reply)
    }

    /// Fetch the full monitor list.
    pub async fn get_monitor_list(&self) -> Result<MonitorList, ClientError> {
        self.ensure_authenticated()?;
        fetch_monitor_list(self.transport.as_ref(), self.list_timeout).await
    }

    /// Fetch one monitor. The returned record always carries its id.
    pub async fn get_monitor(&self, id: &MonitorId) -> Result<MonitorRecord, ClientError> {
        let mut reply = self
            .privileged("getMonitor", vec![id.to_value()], "Failed to get monitor")
            .await?;

        reply
            .remove("monitor")
            .and_then(MonitorRecord::from_value)
            .map(|record| record.with_id(id))
            .ok_or_else(|| ClientError::Protocol("getMonitor reply carried no monitor".to_string()))
    }

    /// Replace a monitor's configuration. `fields` must carry the `id`.
    pub async fn edit_monitor(
        &self,
        fields: Map<String, Value>,
    ) -> Result<Map<String, Value>, ClientError> {
        self.privileged("editMonitor", vec![Value::Object(fields)], "Failed to update monitor")
            .await
    }

    pub async fn delete_monitor(&self, id: &MonitorId) -> Result<(), ClientError> {
        self.privileged("deleteMonitor", vec![id.to_value()], "Failed to delete monitor")
            .await
            .map(drop)
    }

    pub async fn pause_monitor(&self, id: &MonitorId) -> Result<(), ClientError> {
        self.privileged("pauseMonitor", vec![id.to_value()], "Failed to pause monitor")
            .await
            .map(drop)
    }

    pub async fn resume_monitor(&self, id: &MonitorId) -> Result<(), ClientError> {
        self.privileged("resumeMonitor", vec![id.to_value()], "Failed to resume monitor")
            .await
            .map(drop)
    }

    fn ensure_authenticated(&self) -> Result<(), ClientError> {
        if self.is_authenticated() {
            Ok(())
        } else {
            Err(ClientError::NotAuthenticated)
        }
    }

    /// Issue a call that requires a login and unwrap its `{ok, msg}` reply.
    async fn privileged(
        &self,
        verb: &str,
        args: Vec<Value>,
        fallback: &str,
    ) -> Result<Map<String, Value>, ClientError> {
        self.ensure_authenticated()?;

        let reply = self.transport.call(verb, args, self.rpc_timeout).await?;
        let body = match reply.into_iter().next() {
            Some(Value::Object(body)) => body,
            _ => Map::new(),
        };

        if body.get("ok").is_some_and(is_truthy) {
            return Ok(body);
        }

        let message = body
            .get("msg")
            .and_then(Value::as_str)
            .filter(|msg| !msg.is_empty())
            .unwrap_or(fallback)
            .to_string();
        Err(ClientError::RpcRejected {
            verb: verb.to_string(),
            message,
        })
    }
}

impl Drop for Session {
    fn drop(&mut self) {
        self.transport.events().unsubscribe(self.disconnect_sub);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mock::{MockTransport, Step};

    async fn logged_in() -> (Arc<MockTransport>, Session) {
        let mock = MockTransport::new();
        mock.open().await.unwrap();
        let session = Session::new(mock.clone());
        session.login("admin", "admin123").await.unwrap();
        (mock, session)
    }

    #[tokio::test]
    async fn test_login_sends_credentials() {
        let (mock, session) = logged_in().await;

        assert!(session.is_authenticated());
        assert_eq!(
            mock.calls_to("login"),
            vec![vec![json!({ "username": "admin", "password": "admin123", "token": null })]]
        );
    }

    #[tokio::test]
    async fn test_rejected_login_is_auth_error() {
        let mock = MockTransport::new();
        mock.reply("login", json!({ "ok": false, "msg": "Incorrect username or password." }));
        mock.open().await.unwrap();

        let session = Session::new(mock.clone());
        let err = session.login("admin", "wrong").await.unwrap_err();

        assert_eq!(err, ClientError::Auth("Incorrect username or password.".into()));
        assert!(!session.is_authenticated());
    }

    #[tokio::test]
    async fn test_calls_before_login_fail_locally() {
        let mock = MockTransport::new();
        mock.open().await.unwrap();
        let session = Session::new(mock.clone());

        let err = session.pause_monitor(&MonitorId::from(1)).await.unwrap_err();
        assert_eq!(err, ClientError::NotAuthenticated);
        assert_eq!(session.get_monitor_list().await.unwrap_err(), ClientError::NotAuthenticated);
        assert!(mock.calls().is_empty());
    }

    #[tokio::test]
    async fn test_disconnect_forces_logout() {
        let (mock, session) = logged_in().await;

        mock.drop_connection();
        mock.restore_connection();

        assert!(!session.is_authenticated());
        assert_eq!(
            session.delete_monitor(&MonitorId::from(2)).await.unwrap_err(),
            ClientError::NotAuthenticated
        );
    }

    #[tokio::test]
    async fn test_add_fills_backend_defaults() {
        let (mock, session) = logged_in().await;
        mock.reply("add", json!({ "ok": true, "msg": "Added Successfully.", "monitorID": 12 }));

        let mut fields = Map::new();
        fields.insert("type".into(), json!("http"));
        fields.insert("name".into(), json!("Example"));
        let reply = session.add_monitor(fields).await.unwrap();

        assert_eq!(reply["monitorID"], json!(12));
        let sent = &mock.calls_to("add")[0][0];
        assert_eq!(sent["accepted_statuscodes"], json!(["200-299"]));
        assert_eq!(sent["dns_resolve_server"], json!("1.1.1.1"));
        assert_eq!(sent["name"], json!("Example"));
    }

    #[tokio::test]
    async fn test_get_monitor_attaches_id() {
        let (mock, session) = logged_in().await;
        mock.reply("getMonitor", json!({ "ok": true, "monitor": { "name": "Web", "type": "http" } }));

        let record = session.get_monitor(&MonitorId::from(5)).await.unwrap();

        assert_eq!(record.id(), Some(MonitorId::from(5)));
        assert_eq!(record.name(), Some("Web"));
        assert_eq!(mock.calls_to("getMonitor"), vec![vec![json!(5)]]);
    }

    #[tokio::test]
    async fn test_rejection_uses_fallback_message() {
        let (mock, session) = logged_in().await;
        mock.reply("editMonitor", json!({ "ok": false }));
        mock.reply("getMonitor", json!({ "ok": false, "msg": "Monitor not found" }));

        let mut fields = Map::new();
        fields.insert("id".into(), json!(3));
        let err = session.edit_monitor(fields).await.unwrap_err();
        assert_eq!(
            err,
            ClientError::RpcRejected {
                verb: "editMonitor".into(),
                message: "Failed to update monitor".into(),
            }
        );

        let err = session.get_monitor(&MonitorId::from(3)).await.unwrap_err();
        assert_eq!(err.to_string(), "Monitor not found");
    }

    #[tokio::test(start_paused = true)]
    async fn test_unanswered_call_times_out() {
        let mock = MockTransport::new();
        mock.open().await.unwrap();
        let session = Session::with_timeouts(mock.clone(), Duration::from_secs(2), DEFAULT_LIST_TIMEOUT);
        session.login("admin", "admin123").await.unwrap();
        mock.on("resumeMonitor", vec![Step::Hang]);

        let err = session.resume_monitor(&MonitorId::from(1)).await.unwrap_err();
        assert!(matches!(err, ClientError::RpcTimeout { ref verb, .. } if verb == "resumeMonitor"));
    }

    #[tokio::test]
    async fn test_drop_unsubscribes_disconnect_handler() {
        let mock = MockTransport::new();
        let session = Session::new(mock.clone());
        assert_eq!(mock.events().handler_count(DISCONNECT_EVENT), 1);

        drop(session);
        assert_eq!(mock.events().handler_count(DISCONNECT_EVENT), 0);
    }
}
