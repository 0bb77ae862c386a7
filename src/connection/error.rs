use std::time::Duration;

use thiserror::Error;

use super::ClientId;

/// Errors that end (or prevent) a connection's lifecycle
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ConnectionError {
    /// Upgrade could not complete; the connection was never registered
    #[error("Handshake failed: {0}")]
    Handshake(String),

    /// Peer closed the connection cleanly
    #[error("Peer disconnected (code: {code:?})")]
    Disconnected { code: Option<u16> },

    /// Abnormal I/O failure
    #[error("Transport error: {0}")]
    Transport(String),

    /// Connection was closed from this side
    #[error("Connection closed")]
    Closed,
}

impl ConnectionError {
    /// Whether this error is an expected end of the connection
    pub fn is_clean(&self) -> bool {
        matches!(self, Self::Disconnected { .. } | Self::Closed)
    }

    /// Short label used for logs and metrics
    pub fn reason(&self) -> &'static str {
        match self {
            Self::Handshake(_) => "handshake",
            Self::Disconnected { .. } => "disconnected",
            Self::Transport(_) => "transport_error",
            Self::Closed => "closed",
        }
    }
}

/// Failure to deliver a single message to a single connection
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum SendError {
    #[error("Connection is closed")]
    Closed,

    #[error("Client #{0} is not registered")]
    NotRegistered(ClientId),

    #[error("Send timed out after {0:?}")]
    Timeout(Duration),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_clean_errors() {
        assert!(ConnectionError::Disconnected { code: Some(1000) }.is_clean());
        assert!(ConnectionError::Closed.is_clean());
        assert!(!ConnectionError::Transport("reset".into()).is_clean());
        assert!(!ConnectionError::Handshake("bad protocol".into()).is_clean());
    }

    #[test]
    fn test_send_error_messages() {
        assert_eq!(
            SendError::NotRegistered(ClientId::new(3)).to_string(),
            "Client #3 is not registered"
        );
        assert_eq!(SendError::Closed.to_string(), "Connection is closed");
    }
}
