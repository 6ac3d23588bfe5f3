//! The session transport abstraction.

use std::fmt::Debug;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use serde_json::Value;

use crate::events::EventBus;
use crate::ClientError;

/// Event emitted once per connection loss.
pub const DISCONNECT_EVENT: &str = "disconnect";

/// Event emitted after the transport re-established a lost connection.
pub const CONNECT_EVENT: &str = "connect";

/// One logical connection to the backend.
///
/// A transport carries request/response calls (a verb plus arguments,
/// answered by exactly one acknowledgement) and push events. It may repair
/// low-level connection loss on its own, but never re-authenticates: after a
/// loss it emits [`DISCONNECT_EVENT`] and leaves the login to its owner.
#[async_trait]
pub trait Transport: Send + Sync + Debug {
    /// Open the connection.
    ///
    /// Fails with [`ClientError::Connect`] when the backend is unreachable.
    async fn open(&self) -> Result<(), ClientError>;

    /// Issue a call and wait for its acknowledgement arguments.
    ///
    /// Fails with [`ClientError::RpcTimeout`] when no acknowledgement arrives
    /// within `timeout`, and with [`ClientError::Disconnected`] when there is
    /// no connection or it drops while waiting.
    async fn call(
        &self,
        verb: &str,
        args: Vec<Value>,
        timeout: Duration,
    ) -> Result<Vec<Value>, ClientError>;

    /// The push-event registry of this transport.
    fn events(&self) -> &EventBus;

    /// Whether the low-level connection is currently up.
    fn is_connected(&self) -> bool;

    /// Close the connection and stop any reconnection attempts.
    async fn close(&self) -> Result<(), ClientError>;
}

/// Creates a fresh, unopened transport for each connect attempt.
pub type TransportFactory = Arc<dyn Fn() -> Arc<dyn Transport> + Send + Sync>;
