//! # kumagate-core
//!
//! Request/response access to an Uptime Kuma instance that only speaks a
//! persistent, push-based session.
//!
//! One authenticated session is shared by every caller. Monitor lists and
//! heartbeats pushed over it are kept in a cache, and a simplified up/down
//! status is derived per monitor from the monitor's configuration and its
//! latest heartbeat.
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use kumagate_core::MonitorService;
//! use kumagate_types::MonitorId;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), kumagate_core::Error> {
//!     let service = MonitorService::builder()
//!         .url("http://localhost:3001")
//!         .credentials("admin", "admin123")
//!         .build();
//!
//!     // Connect eagerly; requests would otherwise connect on demand
//!     service.start().await;
//!
//!     let status = service.get_monitor_status(&MonitorId::from(1)).await?;
//!     println!("{}: {}", status.name, status.status);
//!
//!     service.pause_monitor(&MonitorId::from(1)).await?;
//!     service.stop().await;
//!     Ok(())
//! }
//! ```
//!
//! ## Pieces
//!
//! - [`ConnectionSupervisor`]: owns the session, collapses concurrent
//!   connect attempts into one and resets state when the link drops
//! - [`StateCache`]: last monitor list and latest heartbeat per monitor
//! - [`derive_status`]: the up/down rules
//! - [`MonitorService`]: the operations callers use

mod cache;
mod error;
mod service;
mod status;
mod supervisor;
mod validation;

pub use cache::StateCache;
pub use error::{Error, Result};
pub use service::{MonitorService, MonitorServiceBuilder};
pub use status::{derive_status, WEIGHT_UP_THRESHOLD};
pub use supervisor::{ConnectionSupervisor, SupervisorConfig, HEARTBEAT_EVENT, HEARTBEAT_LIST_EVENT};
pub use validation::{apply_caller_defaults, prepare_new_monitor, validate_new_monitor};
