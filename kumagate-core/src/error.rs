//! Error type for monitor service operations.

use kumagate_client::ClientError;
use thiserror::Error;

/// Errors returned by [`MonitorService`](crate::MonitorService).
#[derive(Debug, Clone, PartialEq, Error)]
pub enum Error {
    /// The backend session failed or the backend declined the call.
    #[error(transparent)]
    Client(#[from] ClientError),

    /// Caller-supplied fields were rejected before any backend call.
    #[error("{0}")]
    Validation(String),

    /// The backend answered with something the service could not use.
    #[error("Invalid backend payload: {0}")]
    InvalidPayload(String),
}

impl Error {
    /// Whether the backend explicitly declined the call.
    pub fn is_rejection(&self) -> bool {
        matches!(self, Error::Client(ClientError::RpcRejected { .. }))
    }
}

pub type Result<T> = std::result::Result<T, Error>;
