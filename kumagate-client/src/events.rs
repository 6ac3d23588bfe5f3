//! Push-event subscription registry.
//!
//! Every transport owns one [`EventBus`]. Incoming push events are fanned out
//! to the handlers registered for their name; handlers run synchronously on
//! the transport's reader task, so they must not block.

use std::collections::HashMap;
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use parking_lot::{Mutex, RwLock};
use serde_json::Value;
use tokio::sync::oneshot;

/// Callback invoked with the arguments of a push event.
pub type EventHandler = Arc<dyn Fn(&[Value]) + Send + Sync>;

/// Handle identifying one registered handler.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SubscriptionId(u64);

/// Named push-event handlers.
#[derive(Default)]
pub struct EventBus {
    handlers: RwLock<HashMap<String, Vec<(SubscriptionId, EventHandler)>>>,
    next_id: AtomicU64,
}

impl EventBus {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a handler for an event name.
    pub fn subscribe<F>(&self, event: &str, handler: F) -> SubscriptionId
    where
        F: Fn(&[Value]) + Send + Sync + 'static,
    {
        let id = SubscriptionId(self.next_id.fetch_add(1, Ordering::Relaxed));
        self.handlers
            .write()
            .entry(event.to_string())
            .or_default()
            .push((id, Arc::new(handler)));
        id
    }

    /// Remove a handler. Returns `false` if it was already gone.
    pub fn unsubscribe(&self, id: SubscriptionId) -> bool {
        let mut handlers = self.handlers.write();
        let mut removed = false;

        handlers.retain(|_, list| {
            let before = list.len();
            list.retain(|(sid, _)| *sid != id);
            removed |= list.len() != before;
            !list.is_empty()
        });

        removed
    }

    /// Register a handler that forwards the first occurrence of `event`
    /// into a oneshot channel.
    ///
    /// The handler stays registered until the returned guard is dropped, but
    /// only the first delivery reaches the receiver.
    ///
    /// ```
    /// use kumagate_client::EventBus;
    /// use serde_json::json;
    ///
    /// # tokio_test::block_on(async {
    /// let bus = EventBus::new();
    /// let (guard, first) = bus.once("monitorList");
    ///
    /// bus.emit("monitorList", &[json!({ "1": { "name": "A" } })]);
    /// bus.emit("monitorList", &[json!({})]);
    ///
    /// assert_eq!(first.await.unwrap(), vec![json!({ "1": { "name": "A" } })]);
    /// drop(guard);
    /// assert_eq!(bus.handler_count("monitorList"), 0);
    /// # });
    /// ```
    pub fn once(&self, event: &str) -> (SubscriptionGuard<'_>, oneshot::Receiver<Vec<Value>>) {
        let (tx, rx) = oneshot::channel();
        let slot = Mutex::new(Some(tx));

        let id = self.subscribe(event, move |args| {
            if let Some(tx) = slot.lock().take() {
                let _ = tx.send(args.to_vec());
            }
        });

        (SubscriptionGuard { bus: self, id }, rx)
    }

    /// Deliver an event to every handler registered for it.
    ///
    /// Returns the number of handlers invoked. The handler list is copied
    /// before dispatch so handlers may subscribe or unsubscribe freely.
    pub fn emit(&self, event: &str, args: &[Value]) -> usize {
        let targets: Vec<EventHandler> = match self.handlers.read().get(event) {
            Some(list) => list.iter().map(|(_, h)| h.clone()).collect(),
            None => return 0,
        };

        for handler in &targets {
            handler(args);
        }

        targets.len()
    }

    /// Number of handlers currently registered for `event`.
    pub fn handler_count(&self, event: &str) -> usize {
        self.handlers.read().get(event).map_or(0, Vec::len)
    }
}

impl fmt::Debug for EventBus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let handlers = self.handlers.read();
        let mut events: Vec<(&String, usize)> =
            handlers.iter().map(|(name, list)| (name, list.len())).collect();
        events.sort();
        f.debug_struct("EventBus").field("handlers", &events).finish()
    }
}

/// Unsubscribes its handler when dropped.
#[derive(Debug)]
pub struct SubscriptionGuard<'a> {
    bus: &'a EventBus,
    id: SubscriptionId,
}

impl SubscriptionGuard<'_> {
    pub fn id(&self) -> SubscriptionId {
        self.id
    }
}

impl Drop for SubscriptionGuard<'_> {
    fn drop(&mut self) {
        self.bus.unsubscribe(self.id);
    }
}
