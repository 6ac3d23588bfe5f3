//! # kumagate-client
//!
//! Session client for the Uptime Kuma Socket.IO API.
//!
//! Uptime Kuma has no request/response HTTP API for monitors; its web UI
//! talks to the server over a long-lived Socket.IO connection that mixes
//! acknowledged calls with unsolicited pushes. This crate wraps that
//! connection in three layers:
//!
//! - **Transport** ([`Transport`], `websocket` feature: [`socketio::SocketIoTransport`]) -
//!   calls with acknowledgements, push-event subscription and automatic
//!   low-level reconnection
//! - **Session** ([`Session`]) - login handshake and the monitor calls,
//!   refused locally until the session is authenticated
//! - **List fetch** ([`list_fetch::fetch_monitor_list`]) - reconciles the two
//!   ways a server may answer `getMonitorList`
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use kumagate_client::socketio::SocketIoTransport;
//! use kumagate_client::{Session, Transport};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let transport = Arc::new(SocketIoTransport::builder().url("http://localhost:3001").build());
//!     transport.open().await?;
//!
//!     let session = Session::new(transport);
//!     session.login("admin", "admin123").await?;
//!
//!     let monitors = session.get_monitor_list().await?;
//!     println!("Found {} monitors", monitors.len());
//!     Ok(())
//! }
//! ```

pub mod defaults;
pub mod error;
pub mod events;
pub mod list_fetch;
pub mod packet;
pub mod session;
pub mod transport;

#[cfg(feature = "websocket")]
pub mod socketio;

#[cfg(any(test, feature = "test-util"))]
pub mod mock;

pub use error::ClientError;
pub use events::{EventBus, EventHandler, SubscriptionGuard, SubscriptionId};
pub use session::Session;
pub use transport::{Transport, TransportFactory, CONNECT_EVENT, DISCONNECT_EVENT};

// Re-export types for convenience
pub use kumagate_types::{HealthSample, MonitorId, MonitorList, MonitorRecord};
