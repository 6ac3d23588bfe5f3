//! The monitor service: request/response answers over the push session.

use std::sync::Arc;
use std::time::Duration;

use kumagate_client::socketio::SocketIoTransport;
use kumagate_client::{Session, TransportFactory};
use kumagate_types::{
    HealthSample, MonitorId, MonitorList, MonitorRecord, MonitorStatus, SessionState,
};
use serde_json::{Map, Value};
use tracing::{debug, info, warn};

use crate::cache::StateCache;
use crate::error::{Error, Result};
use crate::status::derive_status;
use crate::supervisor::{ConnectionSupervisor, SupervisorConfig};
use crate::validation::prepare_new_monitor;

/// Request/response access to an Uptime Kuma instance.
///
/// Owns the shared session and the cache. Reads are answered from the cache
/// where possible; mutations always go to the backend and drop the cached
/// monitor list afterwards.
///
/// # Example
///
/// ```rust,no_run
/// use kumagate_core::MonitorService;
///
/// #[tokio::main]
/// async fn main() -> Result<(), Box<dyn std::error::Error>> {
///     let service = MonitorService::builder()
///         .url("http://localhost:3001")
///         .credentials("admin", "admin123")
///         .build();
///
///     service.start().await;
///
///     for status in service.get_monitor_statuses().await? {
///         println!("{} {}", status.name, if status.status { "up" } else { "down" });
///     }
///
///     service.stop().await;
///     Ok(())
/// }
/// ```
#[derive(Debug, Clone)]
pub struct MonitorService {
    supervisor: ConnectionSupervisor,
    cache: Arc<StateCache>,
}

impl MonitorService {
    /// Create a builder for configuring the service.
    pub fn builder() -> MonitorServiceBuilder {
        MonitorServiceBuilder::default()
    }

    /// Connect eagerly. Failure is logged and retried on the next call.
    pub async fn start(&self) {
        match self.supervisor.ensure_connection().await {
            Ok(_) => info!("Monitor service started"),
            Err(e) => warn!(error = %e, "Failed to connect on startup, will retry on first request"),
        }
    }

    /// Close the session and drop cached state.
    pub async fn stop(&self) {
        self.supervisor.stop().await;
    }

    pub fn session_state(&self) -> SessionState {
        self.supervisor.session_state()
    }

    pub fn cache(&self) -> &Arc<StateCache> {
        &self.cache
    }

    /// Every known monitor, each carrying its id.
    pub async fn get_monitors(&self) -> Result<Vec<MonitorRecord>> {
        let result = self.monitor_list().await.map(|list| list.records());
        self.observe(result)
    }

    /// The derived status of every known monitor.
    pub async fn get_monitor_statuses(&self) -> Result<Vec<MonitorStatus>> {
        let result = self.monitor_list().await.map(|list| {
            list.iter()
                .map(|(id, record)| {
                    let sample = self.cache.heartbeat(id);
                    status_of(id.clone(), Some(record), sample)
                })
                .collect()
        });
        self.observe(result)
    }

    /// One monitor, always fetched from the backend.
    pub async fn get_monitor(&self, id: &MonitorId) -> Result<MonitorRecord> {
        let result = self.fetch_monitor(id).await;
        self.observe(result)
    }

    /// The derived status of one monitor. Uses the cached record when there
    /// is one, the backend otherwise.
    pub async fn get_monitor_status(&self, id: &MonitorId) -> Result<MonitorStatus> {
        let result = self.monitor_status(id).await;
        self.observe(result)
    }

    /// Validate, fill defaults and create a monitor. Returns the backend's
    /// reply, including the new `monitorID`.
    pub async fn create_monitor(&self, fields: Value) -> Result<Map<String, Value>> {
        let result = self.add_monitor(fields).await;
        self.observe(result)
    }

    /// Replace a monitor's configuration.
    pub async fn update_monitor(&self, id: &MonitorId, fields: Value) -> Result<Map<String, Value>> {
        let result = self.edit_monitor(id, fields).await;
        self.observe(result)
    }

    pub async fn delete_monitor(&self, id: &MonitorId) -> Result<()> {
        let result = self.remove_monitor(id).await;
        self.observe(result)
    }

    pub async fn pause_monitor(&self, id: &MonitorId) -> Result<()> {
        let result = self.toggle_monitor(id, false).await;
        self.observe(result)
    }

    pub async fn resume_monitor(&self, id: &MonitorId) -> Result<()> {
        let result = self.toggle_monitor(id, true).await;
        self.observe(result)
    }

    async fn session(&self) -> Result<Arc<Session>> {
        Ok(self.supervisor.ensure_connection().await?)
    }

    /// The cached list, or a fresh one when the cache is absent or empty.
    async fn monitor_list(&self) -> Result<MonitorList> {
        let session = self.session().await?;

        if let Some(list) = self.cache.monitor_list().filter(|l| !l.is_empty()) {
            debug!(count = list.len(), "Using cached monitor list");
            return Ok(list);
        }

        debug!("Cache empty, requesting monitor list");
        let list = session.get_monitor_list().await?;
        self.cache.ingest_monitor_list(list.clone());
        Ok(list)
    }

    async fn fetch_monitor(&self, id: &MonitorId) -> Result<MonitorRecord> {
        let session = self.session().await?;
        Ok(session.get_monitor(id).await?)
    }

    async fn monitor_status(&self, id: &MonitorId) -> Result<MonitorStatus> {
        let session = self.session().await?;

        let record = match self.cache.monitor(id) {
            Some(record) => record,
            None => session.get_monitor(id).await?,
        };
        Ok(status_of(id.clone(), Some(&record), self.cache.heartbeat(id)))
    }

    async fn add_monitor(&self, fields: Value) -> Result<Map<String, Value>> {
        let fields = prepare_new_monitor(into_fields(fields)?)?;
        let session = self.session().await?;

        let reply = session.add_monitor(fields).await?;
        self.cache.invalidate_monitor_list();
        Ok(reply)
    }

    async fn edit_monitor(&self, id: &MonitorId, fields: Value) -> Result<Map<String, Value>> {
        let mut fields = into_fields(fields)?;
        fields.insert("id".to_string(), id.to_value());
        let session = self.session().await?;

        let reply = session.edit_monitor(fields).await?;
        self.cache.invalidate_monitor_list();
        info!(monitor_id = %id, "Monitor updated");
        Ok(reply)
    }

    async fn remove_monitor(&self, id: &MonitorId) -> Result<()> {
        let session = self.session().await?;

        session.delete_monitor(id).await?;
        self.cache.forget_monitor(id);
        info!(monitor_id = %id, "Monitor deleted");
        Ok(())
    }

    async fn toggle_monitor(&self, id: &MonitorId, active: bool) -> Result<()> {
        let session = self.session().await?;

        if active {
            session.resume_monitor(id).await?;
        } else {
            session.pause_monitor(id).await?;
        }
        self.cache.invalidate_monitor_list();
        info!(monitor_id = %id, active, "Monitor toggled");
        Ok(())
    }

    /// Kick off a background reconnect when a failure means the session is
    /// gone. The failure itself is returned unchanged.
    fn observe<T>(&self, result: Result<T>) -> Result<T> {
        if let Err(Error::Client(e)) = &result {
            if e.is_dead_session() {
                warn!(error = %e, "Session unusable, reconnecting in background");
                self.supervisor.reconnect_in_background();
            }
        }
        result
    }
}

fn into_fields(value: Value) -> Result<Map<String, Value>> {
    match value {
        Value::Object(fields) => Ok(fields),
        other => Err(Error::InvalidPayload(format!(
            "monitor fields must be a JSON object, got {}",
            json_kind(&other)
        ))),
    }
}

fn json_kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "a boolean",
        Value::Number(_) => "a number",
        Value::String(_) => "a string",
        Value::Array(_) => "an array",
        Value::Object(_) => "an object",
    }
}

fn status_of(
    id: MonitorId,
    record: Option<&MonitorRecord>,
    sample: Option<HealthSample>,
) -> MonitorStatus {
    let status = record.is_some_and(|r| derive_status(r, sample.as_ref()));
    let name = record
        .and_then(MonitorRecord::name)
        .filter(|n| !n.is_empty())
        .unwrap_or("Unknown")
        .to_string();

    MonitorStatus {
        id,
        name,
        status,
        last_check: sample.and_then(|s| s.time),
    }
}

/// Builder for configuring a MonitorService.
#[derive(Default)]
pub struct MonitorServiceBuilder {
    url: Option<String>,
    config: SupervisorConfig,
    factory: Option<TransportFactory>,
}

impl std::fmt::Debug for MonitorServiceBuilder {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MonitorServiceBuilder")
            .field("url", &self.url)
            .field("username", &self.config.username)
            .field("custom_transport", &self.factory.is_some())
            .finish()
    }
}

impl MonitorServiceBuilder {
    /// Set the backend base URL.
    ///
    /// Defaults to `http://localhost:3001`.
    pub fn url(mut self, url: impl Into<String>) -> Self {
        self.url = Some(url.into());
        self
    }

    /// Set the login credentials.
    pub fn credentials(mut self, username: impl Into<String>, password: impl Into<String>) -> Self {
        self.config.username = username.into();
        self.config.password = password.into();
        self
    }

    /// Set the acknowledgement timeout for monitor calls.
    pub fn rpc_timeout(mut self, timeout: Duration) -> Self {
        self.config.rpc_timeout = timeout;
        self
    }

    /// Set how long a monitor list fetch may take.
    pub fn list_timeout(mut self, timeout: Duration) -> Self {
        self.config.list_timeout = timeout;
        self
    }

    /// Use a custom transport instead of Socket.IO. The URL is then ignored.
    pub fn transport_factory(mut self, factory: TransportFactory) -> Self {
        self.factory = Some(factory);
        self
    }

    /// Build the service. No connection is made until it is needed.
    pub fn build(self) -> MonitorService {
        let factory = self.factory.unwrap_or_else(|| {
            SocketIoTransport::factory(self.url.unwrap_or_else(|| "http://localhost:3001".to_string()))
        });
        let cache = Arc::new(StateCache::new());
        let supervisor = ConnectionSupervisor::new(factory, self.config, cache.clone());

        MonitorService { supervisor, cache }
    }
}
