//! # kumagate
//!
//! HTTP gateway over an Uptime Kuma instance.
//!
//! Uptime Kuma only offers a persistent, push-based session. This crate
//! serves plain JSON request/response endpoints on top of one shared
//! session managed by [`kumagate_core::MonitorService`].
//!
//! ```text
//! GET    /health
//! GET    /api/monitors
//! GET    /api/monitors/status
//! POST   /api/monitors
//! GET    /api/monitors/{id}
//! PUT    /api/monitors/{id}
//! DELETE /api/monitors/{id}
//! GET    /api/monitors/{id}/status
//! POST   /api/monitors/{id}/pause
//! POST   /api/monitors/{id}/resume
//! ```
//!
//! ## Usage
//!
//! ```bash
//! # Defaults: listen on 3000, backend at http://localhost:3001
//! kumagate
//!
//! # Settings file, overridden by the conventional variables
//! UPTIME_KUMA_PASS=secret kumagate --config kumagate.toml --port 8080
//! ```

pub mod config;
pub mod routes;
pub mod server;

pub use config::{Args, KumaSettings, Settings};
pub use routes::{resolve, Rejection, Route};
pub use server::{shutdown_signal, Shutdown};
