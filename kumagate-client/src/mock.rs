//! Scripted in-memory transport for tests.
//!
//! Every call is recorded and answered from a per-verb script. Unscripted
//! verbs answer `[{"ok": true}]`.
//!
//! ```rust,ignore
//! use std::time::Duration;
//! use kumagate_client::mock::{MockTransport, Step};
//! use kumagate_client::Transport;
//! use serde_json::json;
//!
//! #[tokio::test]
//! async fn test_list_arrives_as_push() {
//!     let mock = MockTransport::new();
//!     mock.once(
//!         "getMonitorList",
//!         vec![Step::emit("monitorList", vec![json!({ "1": { "name": "A" } })]), Step::ack()],
//!     );
//!
//!     mock.open().await.unwrap();
//!     let reply = mock.call("getMonitorList", vec![], Duration::from_secs(1)).await.unwrap();
//!     assert!(reply.is_empty());
//!     assert_eq!(mock.calls_to("getMonitorList").len(), 1);
//! }
//! ```

use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use parking_lot::Mutex;
use serde_json::{json, Value};
use tokio::sync::watch;

use crate::events::EventBus;
use crate::transport::{Transport, TransportFactory, CONNECT_EVENT, DISCONNECT_EVENT};
use crate::ClientError;

/// One step of a scripted reply.
#[derive(Debug, Clone)]
pub enum Step {
    /// Push an event to subscribers, then continue.
    Emit(String, Vec<Value>),
    /// Wait, then continue.
    Sleep(Duration),
    /// Answer the call with these acknowledgement arguments.
    Reply(Vec<Value>),
    /// Fail the call.
    Fail(ClientError),
    /// Never answer.
    Hang,
}

impl Step {
    pub fn emit(event: &str, args: Vec<Value>) -> Self {
        Step::Emit(event.to_string(), args)
    }

    /// An acknowledgement carrying no arguments.
    pub fn ack() -> Self {
        Step::Reply(Vec::new())
    }

    /// An acknowledgement carrying a single value.
    pub fn reply(value: Value) -> Self {
        Step::Reply(vec![value])
    }
}

/// A recorded call.
#[derive(Debug, Clone, PartialEq)]
pub struct RecordedCall {
    pub verb: String,
    pub args: Vec<Value>,
}

/// A [`Transport`] driven entirely by scripts.
#[derive(Debug)]
pub struct MockTransport {
    events: EventBus,
    connected: AtomicBool,
    scripts: Mutex<HashMap<String, Vec<Step>>>,
    queued: Mutex<HashMap<String, VecDeque<Vec<Step>>>>,
    calls: Mutex<Vec<RecordedCall>>,
    open_failures: Mutex<VecDeque<ClientError>>,
    open_delay: Mutex<Option<Duration>>,
    opens: AtomicUsize,
    closes: AtomicUsize,
    losses: watch::Sender<u64>,
}

impl Default for MockTransport {
    fn default() -> Self {
        Self {
            events: EventBus::new(),
            connected: AtomicBool::new(false),
            scripts: Mutex::new(HashMap::new()),
            queued: Mutex::new(HashMap::new()),
            calls: Mutex::new(Vec::new()),
            open_failures: Mutex::new(VecDeque::new()),
            open_delay: Mutex::new(None),
            opens: AtomicUsize::new(0),
            closes: AtomicUsize::new(0),
            losses: watch::channel(0).0,
        }
    }
}

impl MockTransport {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// A factory handing out this same transport on every connect attempt.
    pub fn factory(self: &Arc<Self>) -> TransportFactory {
        let mock = self.clone();
        Arc::new(move || mock.clone() as Arc<dyn Transport>)
    }

    /// Script every call to `verb`.
    pub fn on(&self, verb: &str, steps: Vec<Step>) -> &Self {
        self.scripts.lock().insert(verb.to_string(), steps);
        self
    }

    /// Script the next unscripted call to `verb`; takes precedence over `on`.
    pub fn once(&self, verb: &str, steps: Vec<Step>) -> &Self {
        self.queued
            .lock()
            .entry(verb.to_string())
            .or_default()
            .push_back(steps);
        self
    }

    /// Answer every call to `verb` with a single value.
    pub fn reply(&self, verb: &str, value: Value) -> &Self {
        self.on(verb, vec![Step::reply(value)])
    }

    /// Make the next `open` fail.
    pub fn fail_open(&self, err: ClientError) -> &Self {
        self.open_failures.lock().push_back(err);
        self
    }

    /// Make every `open` take this long.
    pub fn delay_open(&self, delay: Duration) -> &Self {
        *self.open_delay.lock() = Some(delay);
        self
    }

    /// Push an event to subscribers.
    pub fn emit(&self, event: &str, args: Vec<Value>) -> usize {
        self.events.emit(event, &args)
    }

    /// Simulate a connection loss: outstanding calls fail with
    /// `Disconnected` and the disconnect event fires.
    pub fn drop_connection(&self) {
        if self.connected.swap(false, Ordering::SeqCst) {
            self.losses.send_modify(|n| *n += 1);
            self.events
                .emit(DISCONNECT_EVENT, &[Value::from("transport close")]);
        }
    }

    /// Simulate the transport repairing a lost connection on its own.
    pub fn restore_connection(&self) {
        if !self.connected.swap(true, Ordering::SeqCst) {
            self.events.emit(CONNECT_EVENT, &[]);
        }
    }

    pub fn calls(&self) -> Vec<RecordedCall> {
        self.calls.lock().clone()
    }

    /// Arguments of every call to `verb`, oldest first.
    pub fn calls_to(&self, verb: &str) -> Vec<Vec<Value>> {
        self.calls
            .lock()
            .iter()
            .filter(|c| c.verb == verb)
            .map(|c| c.args.clone())
            .collect()
    }

    pub fn open_count(&self) -> usize {
        self.opens.load(Ordering::SeqCst)
    }

    pub fn close_count(&self) -> usize {
        self.closes.load(Ordering::SeqCst)
    }

    fn script_for(&self, verb: &str) -> Vec<Step> {
        if let Some(steps) = self.queued.lock().get_mut(verb).and_then(VecDeque::pop_front) {
            return steps;
        }
        self.scripts
            .lock()
            .get(verb)
            .cloned()
            .unwrap_or_else(|| vec![Step::reply(json!({ "ok": true }))])
    }

    async fn play(&self, steps: Vec<Step>) -> Result<Vec<Value>, ClientError> {
        for step in steps {
            match step {
                Step::Emit(event, args) => {
                    self.events.emit(&event, &args);
                }
                Step::Sleep(delay) => tokio::time::sleep(delay).await,
                Step::Reply(args) => return Ok(args),
                Step::Fail(err) => return Err(err),
                Step::Hang => std::future::pending::<()>().await,
            }
        }
        Ok(Vec::new())
    }
}

#[async_trait]
impl Transport for MockTransport {
    async fn open(&self) -> Result<(), ClientError> {
        self.opens.fetch_add(1, Ordering::SeqCst);

        let delay = *self.open_delay.lock();
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }

        let failure = self.open_failures.lock().pop_front();
        if let Some(err) = failure {
            return Err(err);
        }

        self.connected.store(true, Ordering::SeqCst);
        Ok(())
    }

    async fn call(
        &self,
        verb: &str,
        args: Vec<Value>,
        timeout: Duration,
    ) -> Result<Vec<Value>, ClientError> {
        self.calls.lock().push(RecordedCall {
            verb: verb.to_string(),
            args,
        });

        if !self.is_connected() {
            return Err(ClientError::Disconnected);
        }

        let steps = self.script_for(verb);
        let mut losses = self.losses.subscribe();

        tokio::select! {
            outcome = tokio::time::timeout(timeout, self.play(steps)) => match outcome {
                Ok(result) => result,
                Err(_) => Err(ClientError::RpcTimeout {
                    verb: verb.to_string(),
                    timeout,
                }),
            },
            _ = losses.changed() => Err(ClientError::Disconnected),
        }
    }

    fn events(&self) -> &EventBus {
        &self.events
    }

    fn is_connected(&self) -> bool {
        self.connected.load(Ordering::SeqCst)
    }

    async fn close(&self) -> Result<(), ClientError> {
        self.closes.fetch_add(1, Ordering::SeqCst);
        self.drop_connection();
        Ok(())
    }
}
