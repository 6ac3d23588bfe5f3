//! Error types for the backend client.

use std::time::Duration;

use thiserror::Error;

/// Errors that can occur while talking to the backend.
///
/// Errors are `Clone` so a single failed connect attempt can be handed to
/// every caller that was waiting on it.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum ClientError {
    /// The transport could not be opened.
    #[error("Connection failed: {0}")]
    Connect(String),

    /// The backend rejected the credentials.
    #[error("Authentication failed: {0}")]
    Auth(String),

    /// A privileged call was attempted without a live login.
    #[error("Not authenticated")]
    NotAuthenticated,

    /// The backend explicitly declined a call.
    #[error("{message}")]
    RpcRejected { verb: String, message: String },

    /// The backend never acknowledged a call.
    #[error("Timed out waiting for '{verb}' acknowledgement after {timeout:?}")]
    RpcTimeout { verb: String, timeout: Duration },

    /// The backend declined the monitor list request.
    #[error("{0}")]
    ListFetchRejected(String),

    /// Neither the list acknowledgement nor the list event arrived in time.
    #[error("Timeout waiting for monitor list")]
    ListFetchTimeout,

    /// The connection dropped while a call was outstanding, or no
    /// connection is open.
    #[error("Disconnected from backend")]
    Disconnected,

    /// The backend sent something the client could not make sense of.
    #[error("Protocol error: {0}")]
    Protocol(String),
}

impl ClientError {
    /// Whether this failure means the shared session is gone and a
    /// reconnect is worth attempting.
    pub fn is_dead_session(&self) -> bool {
        matches!(
            self,
            ClientError::Connect(_) | ClientError::NotAuthenticated | ClientError::Disconnected
        )
    }
}

#[cfg(feature = "websocket")]
impl From<tokio_tungstenite::tungstenite::Error> for ClientError {
    fn from(err: tokio_tungstenite::tungstenite::Error) -> Self {
        use tokio_tungstenite::tungstenite::Error as WsError;

        match err {
            WsError::ConnectionClosed | WsError::AlreadyClosed => ClientError::Disconnected,
            WsError::Io(e) => ClientError::Connect(e.to_string()),
            other => ClientError::Protocol(other.to_string()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_dead_session_kinds() {
        assert!(ClientError::Connect("refused".into()).is_dead_session());
        assert!(ClientError::NotAuthenticated.is_dead_session());
        assert!(ClientError::Disconnected.is_dead_session());
        assert!(!ClientError::ListFetchTimeout.is_dead_session());
        assert!(!ClientError::Auth("bad".into()).is_dead_session());
    }

    #[test]
    fn test_rejection_displays_backend_message() {
        let err = ClientError::RpcRejected {
            verb: "getMonitor".into(),
            message: "Monitor not found".into(),
        };
        assert_eq!(err.to_string(), "Monitor not found");
    }
}
