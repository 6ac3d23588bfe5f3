//! Single-flight management of the shared backend session.
//!
//! ```text
//!            ensure_connection()
//!   Idle ───────────────────────▶ Connecting ──── open + subscribe + login ───▶ Ready
//!    ▲                               │                 (+ list prefetch)          │
//!    │          failure              │                                            │
//!    ├───────────────────────────────┘                                            │
//!    │                         disconnect event / stop()                          │
//!    └────────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! The connect sequence runs in its own task and publishes its outcome on a
//! watch channel, so every caller that arrives while it is in flight shares
//! the same result. Each attempt gets a generation number; event handlers
//! and results belonging to a superseded generation are ignored.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Weak};
use std::time::Duration;

use kumagate_client::list_fetch::{DEFAULT_LIST_TIMEOUT, MONITOR_LIST_EVENT};
use kumagate_client::session::DEFAULT_RPC_TIMEOUT;
use kumagate_client::{
    ClientError, Session, SubscriptionId, Transport, TransportFactory, DISCONNECT_EVENT,
};
use kumagate_types::{HealthSample, MonitorId, MonitorList, SessionState};
use parking_lot::Mutex;
use serde_json::Value;
use tokio::sync::watch;
use tracing::{debug, info, warn};

use crate::cache::StateCache;

/// Push event carrying one heartbeat.
pub const HEARTBEAT_EVENT: &str = "heartbeat";

/// Push event carrying the recent heartbeats of one monitor, newest first.
pub const HEARTBEAT_LIST_EVENT: &str = "heartbeatList";

/// Credentials and timeouts for each connect attempt.
#[derive(Debug, Clone)]
pub struct SupervisorConfig {
    pub username: String,
    pub password: String,
    pub rpc_timeout: Duration,
    pub list_timeout: Duration,
}

impl Default for SupervisorConfig {
    fn default() -> Self {
        Self {
            username: "admin".to_string(),
            password: "admin123".to_string(),
            rpc_timeout: DEFAULT_RPC_TIMEOUT,
            list_timeout: DEFAULT_LIST_TIMEOUT,
        }
    }
}

type Outcome = Option<Result<Arc<Session>, ClientError>>;

/// A logged-in session together with the cache subscriptions on its
/// transport.
#[derive(Debug)]
struct Attached {
    session: Arc<Session>,
    subscriptions: Vec<SubscriptionId>,
}

impl Attached {
    fn detach(&self) {
        let events = self.session.transport().events();
        for id in &self.subscriptions {
            events.unsubscribe(*id);
        }
    }
}

#[derive(Debug)]
enum State {
    Idle,
    Connecting(watch::Receiver<Outcome>),
    Ready(Attached),
}

struct Inner {
    factory: TransportFactory,
    config: SupervisorConfig,
    cache: Arc<StateCache>,
    state: Mutex<State>,
    generation: AtomicU64,
}

impl std::fmt::Debug for Inner {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Inner")
            .field("username", &self.config.username)
            .field("generation", &self.generation)
            .finish_non_exhaustive()
    }
}

/// Owner of the one shared session.
#[derive(Debug, Clone)]
pub struct ConnectionSupervisor {
    inner: Arc<Inner>,
}

impl ConnectionSupervisor {
    pub fn new(factory: TransportFactory, config: SupervisorConfig, cache: Arc<StateCache>) -> Self {
        Self {
            inner: Arc::new(Inner {
                factory,
                config,
                cache,
                state: Mutex::new(State::Idle),
                generation: AtomicU64::new(0),
            }),
        }
    }

    pub fn cache(&self) -> &Arc<StateCache> {
        &self.inner.cache
    }

    /// Return the live session, connecting first if needed.
    ///
    /// A ready, authenticated session is returned without touching the
    /// network. Callers arriving while a connect is in flight wait for it
    /// and share its outcome. There is no overall timeout: a transport that
    /// never opens keeps its waiters suspended.
    pub async fn ensure_connection(&self) -> Result<Arc<Session>, ClientError> {
        loop {
            let rx = {
                let mut state = self.inner.state.lock();
                if let State::Ready(attached) = &*state {
                    if attached.session.is_authenticated() {
                        return Ok(attached.session.clone());
                    }
                }
                let in_flight = match &*state {
                    State::Connecting(rx) => Some(rx.clone()),
                    _ => None,
                };
                match in_flight {
                    Some(rx) => rx,
                    None => {
                        let stale = match std::mem::replace(&mut *state, State::Idle) {
                            State::Ready(attached) => {
                                debug!("Session lost its login, reconnecting");
                                Some(attached)
                            }
                            _ => None,
                        };
                        self.begin_attempt(&mut state, stale)
                    }
                }
            };

            if let Some(result) = Self::wait(rx).await {
                return result;
            }
        }
    }

    /// Drop the current session and connect again.
    ///
    /// If a connect is already in flight, joins it instead of starting a
    /// second one.
    pub async fn reconnect(&self) -> Result<Arc<Session>, ClientError> {
        let rx = {
            let mut state = self.inner.state.lock();
            match std::mem::replace(&mut *state, State::Idle) {
                State::Connecting(rx) => {
                    *state = State::Connecting(rx.clone());
                    rx
                }
                State::Ready(attached) => {
                    info!("Reconnecting to backend");
                    self.begin_attempt(&mut state, Some(attached))
                }
                State::Idle => self.begin_attempt(&mut state, None),
            }
        };

        match Self::wait(rx).await {
            Some(result) => result,
            None => self.ensure_connection().await,
        }
    }

    /// Close the live session and return to Idle. Cached state is dropped.
    pub async fn stop(&self) {
        let previous = {
            let mut state = self.inner.state.lock();
            self.inner.generation.fetch_add(1, Ordering::SeqCst);
            std::mem::replace(&mut *state, State::Idle)
        };
        self.inner.cache.invalidate_all();

        if let State::Ready(attached) = previous {
            attached.detach();
            if let Err(e) = attached.session.transport().close().await {
                debug!(error = %e, "Error while closing transport");
            }
            info!("Disconnected from backend");
        }
    }

    /// Snapshot of the connection flags.
    pub fn session_state(&self) -> SessionState {
        match &*self.inner.state.lock() {
            State::Idle => SessionState::default(),
            State::Connecting(_) => SessionState {
                connecting: true,
                ..SessionState::default()
            },
            State::Ready(attached) => SessionState {
                connected: attached.session.transport().is_connected(),
                authenticated: attached.session.is_authenticated(),
                connecting: false,
            },
        }
    }

    /// Spawn a reconnect without waiting for it.
    pub fn reconnect_in_background(&self) {
        let supervisor = self.clone();
        tokio::spawn(async move {
            if let Err(e) = supervisor.reconnect().await {
                warn!(error = %e, "Background reconnect failed");
            }
        });
    }

    /// `None` when the attempt vanished without publishing a result.
    async fn wait(mut rx: watch::Receiver<Outcome>) -> Outcome {
        match rx.wait_for(Option::is_some).await {
            Ok(outcome) => outcome.clone(),
            Err(_) => None,
        }
    }

    /// Move to Connecting and spawn the connect sequence. `stale` is closed
    /// before the new transport is opened.
    fn begin_attempt(
        &self,
        state: &mut State,
        stale: Option<Attached>,
    ) -> watch::Receiver<Outcome> {
        let generation = self.inner.generation.fetch_add(1, Ordering::SeqCst) + 1;
        let (tx, rx) = watch::channel(None);
        *state = State::Connecting(rx.clone());

        let inner = self.inner.clone();
        tokio::spawn(async move {
            let mut guard = AttemptGuard {
                inner: inner.clone(),
                generation,
                finished: false,
            };

            if let Some(stale) = stale {
                stale.detach();
                let _ = stale.session.transport().close().await;
            }

            let result = inner.connect(generation).await;
            let result = inner.finish(generation, result);
            guard.finished = true;
            let _ = tx.send(Some(result));
        });

        rx
    }
}

impl Inner {
    fn is_current(&self, generation: u64) -> bool {
        self.generation.load(Ordering::SeqCst) == generation
    }

    async fn connect(self: &Arc<Self>, generation: u64) -> Result<Attached, ClientError> {
        let transport = (self.factory)();
        info!("Connecting to backend");

        if let Err(e) = transport.open().await {
            warn!(error = %e, "Failed to connect to backend");
            return Err(e);
        }

        let session = Arc::new(Session::with_timeouts(
            transport.clone(),
            self.config.rpc_timeout,
            self.config.list_timeout,
        ));
        // Subscribed before login so pushes sent right after it are kept.
        let attached = Attached {
            subscriptions: self.subscribe(transport.as_ref(), generation),
            session,
        };

        if let Err(e) = attached
            .session
            .login(&self.config.username, &self.config.password)
            .await
        {
            attached.detach();
            let _ = transport.close().await;
            return Err(e);
        }

        match attached.session.get_monitor_list().await {
            Ok(list) if self.is_current(generation) => {
                info!(count = list.len(), "Initial monitor list cached");
                self.cache.ingest_monitor_list(list);
            }
            Ok(_) => {}
            Err(e) => warn!(error = %e, "Could not fetch initial monitor list"),
        }

        Ok(attached)
    }

    /// Publish the outcome of an attempt in the state machine.
    ///
    /// A session that lost its login before the attempt finished, for
    /// example to a disconnect during the prefetch, is never published as
    /// Ready.
    fn finish(
        &self,
        generation: u64,
        result: Result<Attached, ClientError>,
    ) -> Result<Arc<Session>, ClientError> {
        let mut state = self.state.lock();

        if !self.is_current(generation) {
            drop(state);
            if let Ok(attached) = result {
                debug!("Discarding session of a superseded connect attempt");
                attached.detach();
                retire(attached.session);
            }
            return Err(ClientError::Disconnected);
        }

        match result {
            Ok(attached) if !attached.session.is_authenticated() => {
                *state = State::Idle;
                drop(state);
                warn!("Backend connection lost while connecting");
                attached.detach();
                retire(attached.session);
                Err(ClientError::Disconnected)
            }
            Ok(attached) => {
                let session = attached.session.clone();
                *state = State::Ready(attached);
                info!("Connected to backend");
                Ok(session)
            }
            Err(e) => {
                *state = State::Idle;
                Err(e)
            }
        }
    }

    /// Feed push events from `transport` into the cache.
    fn subscribe(self: &Arc<Self>, transport: &dyn Transport, generation: u64) -> Vec<SubscriptionId> {
        let events = transport.events();
        let mut ids = Vec::with_capacity(4);

        let weak = Arc::downgrade(self);
        ids.push(events.subscribe(HEARTBEAT_EVENT, move |args| {
            if let Some(inner) = live(&weak, generation) {
                if let Some(sample) = args.first().and_then(HealthSample::from_value) {
                    inner.cache.ingest_heartbeat(sample);
                }
            }
        }));

        let weak = Arc::downgrade(self);
        ids.push(events.subscribe(HEARTBEAT_LIST_EVENT, move |args| {
            if let Some(inner) = live(&weak, generation) {
                let id = args.first().and_then(MonitorId::from_value);
                let samples = args.get(1).and_then(Value::as_array);
                if let (Some(id), Some(samples)) = (id, samples) {
                    let samples: Vec<HealthSample> = samples
                        .iter()
                        .map(|s| HealthSample::from_value(s).unwrap_or_default())
                        .collect();
                    inner.cache.ingest_heartbeat_list(id, &samples);
                }
            }
        }));

        let weak = Arc::downgrade(self);
        ids.push(events.subscribe(MONITOR_LIST_EVENT, move |args| {
            if let Some(inner) = live(&weak, generation) {
                match args.first().and_then(MonitorList::from_value) {
                    Some(list) => inner.cache.ingest_monitor_list(list),
                    None => debug!("Ignoring malformed monitorList push"),
                }
            }
        }));

        let weak = Arc::downgrade(self);
        ids.push(events.subscribe(DISCONNECT_EVENT, move |_| {
            if let Some(inner) = live(&weak, generation) {
                inner.on_disconnect();
            }
        }));

        ids
    }

    fn on_disconnect(&self) {
        warn!("Backend connection lost, will reconnect on next request");
        self.cache.invalidate_all();

        let previous = {
            let mut state = self.state.lock();
            if matches!(&*state, State::Ready(_)) {
                Some(std::mem::replace(&mut *state, State::Idle))
            } else {
                None
            }
        };
        // Dropped outside the lock; the transport shuts down with it.
        if let Some(State::Ready(attached)) = previous {
            attached.detach();
        }
    }
}

fn live(weak: &Weak<Inner>, generation: u64) -> Option<Arc<Inner>> {
    weak.upgrade().filter(|inner| inner.is_current(generation))
}

/// Close a session's transport in the background.
fn retire(session: Arc<Session>) {
    if let Ok(handle) = tokio::runtime::Handle::try_current() {
        handle.spawn(async move {
            let _ = session.transport().close().await;
        });
    }
}

/// Returns the state machine to Idle if a connect task ends without
/// publishing a result.
struct AttemptGuard {
    inner: Arc<Inner>,
    generation: u64,
    finished: bool,
}

impl Drop for AttemptGuard {
    fn drop(&mut self) {
        if self.finished || !self.inner.is_current(self.generation) {
            return;
        }
        let mut state = self.inner.state.lock();
        if matches!(&*state, State::Connecting(_)) {
            *state = State::Idle;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use kumagate_client::mock::{MockTransport, Step};
    use kumagate_types::HeartbeatStatus;
    use serde_json::json;

    fn supervisor(mock: &Arc<MockTransport>) -> ConnectionSupervisor {
        ConnectionSupervisor::new(
            mock.factory(),
            SupervisorConfig::default(),
            Arc::new(StateCache::new()),
        )
    }

    #[tokio::test(start_paused = true)]
    async fn test_concurrent_callers_share_one_attempt() {
        let mock = MockTransport::new();
        mock.delay_open(Duration::from_secs(1));
        let sup = supervisor(&mock);

        let handles: Vec<_> = (0..8)
            .map(|_| {
                let sup = sup.clone();
                tokio::spawn(async move { sup.ensure_connection().await })
            })
            .collect();

        let mut sessions = Vec::new();
        for handle in handles {
            sessions.push(handle.await.unwrap().unwrap());
        }

        assert_eq!(mock.open_count(), 1);
        assert_eq!(mock.calls_to("login").len(), 1);
        assert!(sessions.windows(2).all(|w| Arc::ptr_eq(&w[0], &w[1])));
    }

    #[tokio::test(start_paused = true)]
    async fn test_ready_session_is_reused_without_network() {
        let mock = MockTransport::new();
        let sup = supervisor(&mock);

        let first = sup.ensure_connection().await.unwrap();
        let calls = mock.calls().len();
        let second = sup.ensure_connection().await.unwrap();

        assert!(Arc::ptr_eq(&first, &second));
        assert_eq!(mock.calls().len(), calls);
        assert!(sup.session_state().authenticated);
    }

    #[tokio::test(start_paused = true)]
    async fn test_connect_failure_reaches_caller_and_returns_to_idle() {
        let mock = MockTransport::new();
        mock.fail_open(ClientError::Connect("connection refused".into()));
        let sup = supervisor(&mock);

        let err = sup.ensure_connection().await.unwrap_err();
        assert_eq!(err, ClientError::Connect("connection refused".into()));
        assert_eq!(sup.session_state(), SessionState::default());

        assert!(sup.ensure_connection().await.is_ok());
        assert_eq!(mock.open_count(), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_auth_failure_closes_transport() {
        let mock = MockTransport::new();
        mock.once("login", vec![Step::reply(json!({ "ok": false, "msg": "Incorrect password" }))]);
        let sup = supervisor(&mock);

        let err = sup.ensure_connection().await.unwrap_err();

        assert_eq!(err, ClientError::Auth("Incorrect password".into()));
        assert_eq!(mock.close_count(), 1);
        assert_eq!(mock.events().handler_count(HEARTBEAT_EVENT), 0);
        assert!(!sup.session_state().connecting);
    }

    #[tokio::test(start_paused = true)]
    async fn test_prefetch_failure_does_not_fail_connect() {
        let mock = MockTransport::new();
        mock.reply("getMonitorList", json!({ "ok": false, "msg": "boom" }));
        let sup = supervisor(&mock);

        assert!(sup.ensure_connection().await.is_ok());
        assert!(sup.cache().monitor_list().is_none());
    }

    #[tokio::test(start_paused = true)]
    async fn test_prefetch_fills_cache() {
        let mock = MockTransport::new();
        mock.reply("getMonitorList", json!({ "ok": true, "monitorList": { "1": { "name": "A" } } }));
        let sup = supervisor(&mock);

        sup.ensure_connection().await.unwrap();

        assert_eq!(sup.cache().monitor_list().unwrap().len(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_disconnect_during_prefetch_fails_attempt() {
        let mock = MockTransport::new();
        mock.on("getMonitorList", vec![Step::Hang]);
        let sup = supervisor(&mock);

        let attempt = {
            let sup = sup.clone();
            tokio::spawn(async move { sup.ensure_connection().await })
        };
        tokio::time::sleep(Duration::from_millis(500)).await;
        assert_eq!(mock.calls_to("getMonitorList").len(), 1);
        mock.drop_connection();

        let err = attempt.await.unwrap().unwrap_err();
        assert_eq!(err, ClientError::Disconnected);
        assert_eq!(sup.session_state(), SessionState::default());
        assert_eq!(mock.events().handler_count(HEARTBEAT_EVENT), 0);

        // Let the retired transport finish closing before reconnecting.
        tokio::time::sleep(Duration::from_millis(10)).await;
        mock.on("getMonitorList", vec![Step::reply(json!({ "ok": true, "monitorList": {} }))]);
        sup.ensure_connection().await.unwrap();
        assert_eq!(mock.calls_to("login").len(), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_pushes_feed_the_cache() {
        let mock = MockTransport::new();
        let sup = supervisor(&mock);
        sup.ensure_connection().await.unwrap();

        mock.emit(HEARTBEAT_EVENT, vec![json!({ "monitorID": 4, "status": 0, "time": "t1" })]);
        mock.emit(
            HEARTBEAT_LIST_EVENT,
            vec![json!(5), json!([{ "status": 1, "time": "new" }, { "status": 0, "time": "old" }]), json!(false)],
        );
        mock.emit(MONITOR_LIST_EVENT, vec![json!({ "4": { "name": "Four" }, "5": { "name": "Five" } })]);
        mock.emit(MONITOR_LIST_EVENT, vec![json!("not a list")]);

        let cache = sup.cache();
        assert_eq!(cache.heartbeat(&MonitorId::from(4)).unwrap().status, Some(HeartbeatStatus::Down));
        assert_eq!(cache.heartbeat(&MonitorId::from(5)).unwrap().time.as_deref(), Some("new"));
        assert_eq!(cache.monitor_list().unwrap().len(), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_disconnect_invalidates_cache_and_goes_idle() {
        let mock = MockTransport::new();
        let sup = supervisor(&mock);
        sup.ensure_connection().await.unwrap();
        mock.emit(MONITOR_LIST_EVENT, vec![json!({ "1": {} })]);
        mock.emit(HEARTBEAT_EVENT, vec![json!({ "monitorID": 1, "status": 1 })]);

        mock.drop_connection();

        assert!(sup.cache().monitor_list().is_none());
        assert!(sup.cache().heartbeats().is_empty());
        assert_eq!(sup.session_state(), SessionState::default());

        sup.ensure_connection().await.unwrap();
        assert_eq!(mock.calls_to("login").len(), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_reconnect_replaces_session_and_silences_old_handlers() {
        let mock = MockTransport::new();
        let sup = supervisor(&mock);
        let first = sup.ensure_connection().await.unwrap();

        let second = sup.reconnect().await.unwrap();

        assert!(!Arc::ptr_eq(&first, &second));
        assert_eq!(mock.close_count(), 1);
        assert_eq!(mock.events().handler_count(HEARTBEAT_EVENT), 1);
        assert!(sup.session_state().authenticated);
    }

    #[tokio::test(start_paused = true)]
    async fn test_reconnect_while_connecting_joins_attempt() {
        let mock = MockTransport::new();
        mock.delay_open(Duration::from_secs(2));
        let sup = supervisor(&mock);

        let waiter = {
            let sup = sup.clone();
            tokio::spawn(async move { sup.ensure_connection().await })
        };
        tokio::task::yield_now().await;
        assert!(sup.session_state().connecting);

        let joined = sup.reconnect().await.unwrap();
        let first = waiter.await.unwrap().unwrap();

        assert!(Arc::ptr_eq(&joined, &first));
        assert_eq!(mock.open_count(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_stop_closes_and_clears() {
        let mock = MockTransport::new();
        let sup = supervisor(&mock);
        sup.ensure_connection().await.unwrap();
        mock.emit(MONITOR_LIST_EVENT, vec![json!({ "1": {} })]);

        sup.stop().await;

        assert_eq!(mock.close_count(), 1);
        assert!(sup.cache().monitor_list().is_none());
        assert_eq!(sup.session_state(), SessionState::default());
    }
}
