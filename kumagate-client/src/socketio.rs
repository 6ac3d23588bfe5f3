//! Socket.IO transport over a WebSocket.
//!
//! Connects to an Uptime Kuma server's Socket.IO endpoint, keeps the
//! connection alive by answering Engine.IO pings, and re-establishes it with
//! exponential backoff after a loss.
//!
//! ## Example
//!
//! ```rust,no_run
//! use std::time::Duration;
//! use kumagate_client::socketio::SocketIoTransport;
//! use kumagate_client::Transport;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let transport = SocketIoTransport::builder()
//!         .url("http://localhost:3001")
//!         .build();
//!
//!     transport.open().await?;
//!     let reply = transport
//!         .call("login", vec![serde_json::json!({"username": "admin"})], Duration::from_secs(10))
//!         .await?;
//!     println!("{:?}", reply);
//!
//!     transport.close().await?;
//!     Ok(())
//! }
//! ```

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use futures_util::{SinkExt, StreamExt};
use parking_lot::Mutex;
use serde_json::Value;
use tokio::net::TcpStream;
use tokio::sync::{mpsc, oneshot, watch};
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{connect_async, MaybeTlsStream, WebSocketStream};
use tracing::{debug, info, warn};

use crate::events::EventBus;
use crate::packet::{EnginePacket, Handshake, SocketPacket};
use crate::transport::{Transport, TransportFactory, CONNECT_EVENT, DISCONNECT_EVENT};
use crate::ClientError;

type WsStream = WebSocketStream<MaybeTlsStream<TcpStream>>;

const SOCKET_PATH: &str = "/socket.io/?EIO=4&transport=websocket";

/// How long `close` waits for the connection task to say goodbye.
const CLOSE_GRACE: Duration = Duration::from_secs(2);

/// Socket.IO v4 transport.
#[derive(Debug)]
pub struct SocketIoTransport {
    endpoint: String,
    initial_backoff: Duration,
    max_backoff: Duration,
    shared: Arc<Shared>,
    worker: Mutex<Option<Worker>>,
}

#[derive(Debug)]
struct Worker {
    stop: watch::Sender<bool>,
    handle: JoinHandle<()>,
}

/// State shared between the transport handle and its connection task.
#[derive(Debug, Default)]
struct Shared {
    events: EventBus,
    pending: Mutex<HashMap<u64, oneshot::Sender<Vec<Value>>>>,
    next_ack: AtomicU64,
    outbound: Mutex<Option<mpsc::UnboundedSender<String>>>,
    connected: AtomicBool,
}

impl Shared {
    fn mark_connected(&self, outbound: mpsc::UnboundedSender<String>) {
        *self.outbound.lock() = Some(outbound);
        self.connected.store(true, Ordering::SeqCst);
    }

    /// Forget the current connection. Outstanding calls observe a closed
    /// acknowledgement channel and fail with `Disconnected`.
    fn mark_lost(&self) {
        self.connected.store(false, Ordering::SeqCst);
        self.outbound.lock().take();
        let drained = self.pending.lock().drain().count();
        if drained > 0 {
            debug!("Dropped {} outstanding calls", drained);
        }
    }

    /// Handle one Socket.IO packet. Returns a reason when the packet ends
    /// the connection.
    fn dispatch(&self, packet: SocketPacket) -> Option<String> {
        match packet {
            SocketPacket::Event { name, args, .. } => {
                let handled = self.events.emit(&name, &args);
                if handled == 0 {
                    debug!(event = %name, "Ignoring unsubscribed event");
                }
                None
            }
            SocketPacket::Ack { id, args } => {
                // A late ack for a timed-out call has no receiver left.
                if let Some(tx) = self.pending.lock().remove(&id) {
                    let _ = tx.send(args);
                }
                None
            }
            SocketPacket::Connect(_) => None,
            SocketPacket::Disconnect => Some("server closed the socket".to_string()),
            SocketPacket::ConnectError(data) => Some(format!("connect error: {}", data)),
        }
    }
}

/// Removes a pending acknowledgement slot when its call finishes or is
/// cancelled.
struct PendingGuard<'a> {
    shared: &'a Shared,
    id: u64,
}

impl Drop for PendingGuard<'_> {
    fn drop(&mut self) {
        self.shared.pending.lock().remove(&self.id);
    }
}

impl SocketIoTransport {
    /// Create a new builder for configuring the transport.
    pub fn builder() -> SocketIoTransportBuilder {
        SocketIoTransportBuilder::default()
    }

    /// A factory producing a fresh transport for `base_url` on every call.
    pub fn factory(base_url: impl Into<String>) -> TransportFactory {
        let base_url = base_url.into();
        Arc::new(move || {
            Arc::new(SocketIoTransport::builder().url(base_url.clone()).build()) as Arc<dyn Transport>
        })
    }

    /// The WebSocket URL this transport connects to.
    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }
}

#[async_trait]
impl Transport for SocketIoTransport {
    async fn open(&self) -> Result<(), ClientError> {
        if self.worker.lock().is_some() {
            return Ok(());
        }

        let (ws, handshake) = establish(&self.endpoint).await?;

        let mut worker = self.worker.lock();
        if worker.is_some() {
            // Lost a race against a concurrent open; the new socket is dropped.
            return Ok(());
        }

        let (outbound_tx, outbound_rx) = mpsc::unbounded_channel();
        self.shared.mark_connected(outbound_tx);

        let (stop_tx, stop_rx) = watch::channel(false);
        let handle = tokio::spawn(run(
            self.shared.clone(),
            self.endpoint.clone(),
            (self.initial_backoff, self.max_backoff),
            ws,
            handshake,
            outbound_rx,
            stop_rx,
        ));
        *worker = Some(Worker {
            stop: stop_tx,
            handle,
        });

        info!(endpoint = %self.endpoint, "Socket.IO session established");
        Ok(())
    }

    async fn call(
        &self,
        verb: &str,
        args: Vec<Value>,
        timeout: Duration,
    ) -> Result<Vec<Value>, ClientError> {
        let id = self.shared.next_ack.fetch_add(1, Ordering::Relaxed);
        let frame = EnginePacket::Message(SocketPacket::Event {
            id: Some(id),
            name: verb.to_string(),
            args,
        })
        .encode();

        let (tx, rx) = oneshot::channel();
        {
            let outbound = self.shared.outbound.lock();
            let sender = outbound.as_ref().ok_or(ClientError::Disconnected)?;
            self.shared.pending.lock().insert(id, tx);
            if sender.send(frame).is_err() {
                self.shared.pending.lock().remove(&id);
                return Err(ClientError::Disconnected);
            }
        }
        let _guard = PendingGuard {
            shared: &self.shared,
            id,
        };

        match tokio::time::timeout(timeout, rx).await {
            Ok(Ok(reply)) => Ok(reply),
            Ok(Err(_)) => Err(ClientError::Disconnected),
            Err(_) => Err(ClientError::RpcTimeout {
                verb: verb.to_string(),
                timeout,
            }),
        }
    }

    fn events(&self) -> &EventBus {
        &self.shared.events
    }

    fn is_connected(&self) -> bool {
        self.shared.connected.load(Ordering::SeqCst)
    }

    async fn close(&self) -> Result<(), ClientError> {
        let worker = self.worker.lock().take();
        if let Some(worker) = worker {
            let _ = worker.stop.send(true);
            let abort = worker.handle.abort_handle();
            if tokio::time::timeout(CLOSE_GRACE, worker.handle).await.is_err() {
                warn!(endpoint = %self.endpoint, "Connection task did not stop in time, aborting");
                abort.abort();
                self.shared.mark_lost();
            }
        }
        Ok(())
    }
}

impl Drop for SocketIoTransport {
    fn drop(&mut self) {
        if let Some(worker) = self.worker.get_mut().take() {
            let _ = worker.stop.send(true);
        }
    }
}

/// Builder for SocketIoTransport.
#[derive(Debug, Clone)]
pub struct SocketIoTransportBuilder {
    url: String,
    initial_backoff: Duration,
    max_backoff: Duration,
}

impl Default for SocketIoTransportBuilder {
    fn default() -> Self {
        Self {
            url: "http://localhost:3001".to_string(),
            initial_backoff: Duration::from_secs(1),
            max_backoff: Duration::from_secs(5),
        }
    }
}

impl SocketIoTransportBuilder {
    /// Set the backend base URL (http, https, ws or wss).
    pub fn url(mut self, url: impl Into<String>) -> Self {
        self.url = url.into();
        self
    }

    /// Set the first reconnect delay and the cap it doubles up to.
    pub fn reconnect_delay(mut self, initial: Duration, max: Duration) -> Self {
        self.initial_backoff = initial;
        self.max_backoff = max.max(initial);
        self
    }

    /// Build the transport. It connects on `open`.
    pub fn build(self) -> SocketIoTransport {
        SocketIoTransport {
            endpoint: socket_endpoint(&self.url),
            initial_backoff: self.initial_backoff,
            max_backoff: self.max_backoff,
            shared: Arc::new(Shared::default()),
            worker: Mutex::new(None),
        }
    }
}

fn socket_endpoint(base: &str) -> String {
    let base = base.trim_end_matches('/');
    let ws_base = if let Some(rest) = base.strip_prefix("https://") {
        format!("wss://{}", rest)
    } else if let Some(rest) = base.strip_prefix("http://") {
        format!("ws://{}", rest)
    } else if base.starts_with("ws://") || base.starts_with("wss://") {
        base.to_string()
    } else {
        format!("ws://{}", base)
    };
    format!("{}{}", ws_base, SOCKET_PATH)
}

/// Open the WebSocket and complete the Engine.IO and Socket.IO handshakes.
async fn establish(endpoint: &str) -> Result<(WsStream, Handshake), ClientError> {
    let (mut ws, _) = connect_async(endpoint)
        .await
        .map_err(|e| ClientError::Connect(e.to_string()))?;

    let handshake = loop {
        match next_packet(&mut ws).await? {
            EnginePacket::Open(handshake) => break handshake,
            other => debug!("Skipping {:?} before open", other),
        }
    };

    send_frame(
        &mut ws,
        EnginePacket::Message(SocketPacket::Connect(None)).encode(),
    )
    .await?;

    loop {
        match next_packet(&mut ws).await? {
            EnginePacket::Message(SocketPacket::Connect(_)) => break,
            EnginePacket::Message(SocketPacket::ConnectError(data)) => {
                let message = data
                    .get("message")
                    .and_then(Value::as_str)
                    .map(str::to_string)
                    .unwrap_or_else(|| data.to_string());
                return Err(ClientError::Connect(message));
            }
            EnginePacket::Ping(data) => send_frame(&mut ws, EnginePacket::Pong(data).encode()).await?,
            EnginePacket::Close => {
                return Err(ClientError::Connect("closed during handshake".to_string()))
            }
            _ => {}
        }
    }

    debug!(sid = %handshake.sid, "Handshake complete");
    Ok((ws, handshake))
}

async fn next_packet(ws: &mut WsStream) -> Result<EnginePacket, ClientError> {
    loop {
        match ws.next().await {
            Some(Ok(Message::Text(text))) => return EnginePacket::decode(&text),
            Some(Ok(Message::Close(_))) | None => {
                return Err(ClientError::Connect("closed during handshake".to_string()))
            }
            Some(Ok(_)) => {}
            Some(Err(e)) => return Err(ClientError::Connect(e.to_string())),
        }
    }
}

async fn send_frame(ws: &mut WsStream, frame: String) -> Result<(), ClientError> {
    ws.send(Message::Text(frame)).await.map_err(ClientError::from)
}

#[derive(Debug, PartialEq, Eq)]
enum PumpEnd {
    Stopped,
    Lost(String),
}

/// Connection task: pumps frames until stopped, reconnecting after losses.
async fn run(
    shared: Arc<Shared>,
    endpoint: String,
    (initial_backoff, max_backoff): (Duration, Duration),
    mut ws: WsStream,
    mut handshake: Handshake,
    mut outbound: mpsc::UnboundedReceiver<String>,
    mut stop: watch::Receiver<bool>,
) {
    loop {
        let end = pump(&shared, &mut ws, &handshake, &mut outbound, &mut stop).await;
        shared.mark_lost();

        let reason = match end {
            PumpEnd::Stopped => {
                info!(endpoint = %endpoint, "Socket.IO session closed");
                shared
                    .events
                    .emit(DISCONNECT_EVENT, &[Value::from("io client disconnect")]);
                return;
            }
            PumpEnd::Lost(reason) => reason,
        };
        warn!(endpoint = %endpoint, reason = %reason, "Socket.IO connection lost");
        shared.events.emit(DISCONNECT_EVENT, &[Value::from(reason)]);

        let mut delay = initial_backoff;
        loop {
            tokio::select! {
                _ = stop.changed() => return,
                _ = tokio::time::sleep(delay) => {}
            }

            let attempt = tokio::select! {
                _ = stop.changed() => return,
                attempt = establish(&endpoint) => attempt,
            };

            match attempt {
                Ok((next_ws, next_handshake)) => {
                    ws = next_ws;
                    handshake = next_handshake;
                    break;
                }
                Err(e) => {
                    debug!(error = %e, retry_in = ?delay, "Reconnect attempt failed");
                    delay = (delay * 2).min(max_backoff);
                }
            }
        }

        let (outbound_tx, outbound_rx) = mpsc::unbounded_channel();
        outbound = outbound_rx;
        shared.mark_connected(outbound_tx);
        info!(endpoint = %endpoint, "Socket.IO connection re-established");
        shared.events.emit(CONNECT_EVENT, &[]);
    }
}

async fn pump(
    shared: &Shared,
    ws: &mut WsStream,
    handshake: &Handshake,
    outbound: &mut mpsc::UnboundedReceiver<String>,
    stop: &mut watch::Receiver<bool>,
) -> PumpEnd {
    let liveness = Duration::from_millis(handshake.ping_interval + handshake.ping_timeout);
    let mut deadline = Instant::now() + liveness;

    loop {
        tokio::select! {
            _ = stop.changed() => {
                let _ = send_frame(ws, EnginePacket::Message(SocketPacket::Disconnect).encode()).await;
                let _ = ws.close(None).await;
                return PumpEnd::Stopped;
            }
            frame = outbound.recv() => {
                let Some(frame) = frame else {
                    return PumpEnd::Lost("outbound channel closed".to_string());
                };
                if let Err(e) = send_frame(ws, frame).await {
                    return PumpEnd::Lost(e.to_string());
                }
            }
            _ = tokio::time::sleep_until(deadline) => {
                return PumpEnd::Lost("ping timeout".to_string());
            }
            incoming = ws.next() => match incoming {
                Some(Ok(Message::Text(text))) => {
                    deadline = Instant::now() + liveness;
                    match EnginePacket::decode(&text) {
                        Ok(EnginePacket::Ping(data)) => {
                            if let Err(e) = send_frame(ws, EnginePacket::Pong(data).encode()).await {
                                return PumpEnd::Lost(e.to_string());
                            }
                        }
                        Ok(EnginePacket::Close) => {
                            return PumpEnd::Lost("transport close".to_string());
                        }
                        Ok(EnginePacket::Message(packet)) => {
                            if let Some(reason) = shared.dispatch(packet) {
                                return PumpEnd::Lost(reason);
                            }
                        }
                        Ok(_) => {}
                        Err(e) => debug!(error = %e, "Ignoring undecodable frame"),
                    }
                }
                Some(Ok(Message::Close(_))) | None => {
                    return PumpEnd::Lost("transport close".to_string());
                }
                Some(Ok(_)) => {}
                Some(Err(e)) => return PumpEnd::Lost(e.to_string()),
            }
        }
    }
}
