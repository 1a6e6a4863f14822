//! Client Error Types
//!
//! This module defines the error taxonomy for the connectivity core.
//! Errors fall into a few categories:
//!
//! - Transport-level failures (network errors, websocket errors) that are
//!   surfaced directly to the caller
//! - Authentication failures (expired token, failed refresh) that feed the
//!   refresh pipeline
//! - Realtime channel failures (not connected, closed, protocol violation)
//!
//! # Thread Safety
//!
//! All error types are `Send + Sync` and can be safely moved across task
//! boundaries.

use thiserror::Error;

/// Errors produced by the connectivity core.
#[derive(Debug, Error)]
pub enum ClientError {
    /// Network-level failure on an HTTP request (timeout, connection reset).
    ///
    /// These are surfaced directly to the caller and never retried here.
    #[error("network error: {0}")]
    Network(#[from] reqwest::Error),

    /// The server answered with a non-success status other than 401.
    #[error("server returned {status}: {message}")]
    Status {
        /// HTTP status code
        status: u16,
        /// Response body, best-effort decoded as text
        message: String,
    },

    /// The request was rejected as unauthenticated and cannot be recovered
    /// by this pipeline (excluded endpoint, or the replay failed again).
    #[error("authentication failed")]
    Unauthorized,

    /// The token refresh call itself failed. Terminal for every request
    /// that was waiting on it; the session is cleared when this happens.
    #[error("token refresh failed: {reason}")]
    RefreshFailed {
        /// Why the refresh could not complete
        reason: String,
    },

    /// An operation that needs an authenticated identity was attempted
    /// without one (e.g. sending a chat message before login).
    #[error("not authenticated")]
    NotAuthenticated,

    /// Failed to decode a response or frame body.
    #[error("decode error: {0}")]
    Decode(#[from] serde_json::Error),

    /// A realtime operation was attempted while the channel is not connected.
    #[error("realtime channel is not connected")]
    NotConnected,

    /// The realtime channel closed underneath an in-flight operation.
    #[error("realtime channel closed")]
    ConnectionClosed,

    /// Transport-level realtime failure (socket error, heartbeat miss).
    #[error("transport error: {message}")]
    Transport {
        /// Human-readable error message
        message: String,
    },

    /// The peer violated the messaging protocol (bad frame, ERROR frame,
    /// unexpected handshake reply).
    #[error("protocol error: {message}")]
    Protocol {
        /// Human-readable error message
        message: String,
    },

    /// The CONNECT/CONNECTED handshake did not complete in time.
    #[error("handshake timed out")]
    HandshakeTimeout,
}

impl ClientError {
    /// Create a status error from an HTTP status code and body text.
    pub fn status(status: u16, message: impl Into<String>) -> Self {
        Self::Status {
            status,
            message: message.into(),
        }
    }

    /// Create a refresh-terminal error.
    pub fn refresh_failed(reason: impl Into<String>) -> Self {
        Self::RefreshFailed {
            reason: reason.into(),
        }
    }

    /// Create a transport error.
    pub fn transport(message: impl Into<String>) -> Self {
        Self::Transport {
            message: message.into(),
        }
    }

    /// Create a protocol error.
    pub fn protocol(message: impl Into<String>) -> Self {
        Self::Protocol {
            message: message.into(),
        }
    }

    /// Whether this error ends the current session (refresh exhausted or a
    /// replay failed again with 401).
    pub fn is_terminal_auth(&self) -> bool {
        matches!(self, Self::RefreshFailed { .. } | Self::Unauthorized)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_error_display() {
        let error = ClientError::status(500, "boom");
        let display = format!("{}", error);
        assert!(display.contains("500"));
        assert!(display.contains("boom"));
    }

    #[test]
    fn test_refresh_failed_is_terminal() {
        assert!(ClientError::refresh_failed("expired").is_terminal_auth());
        assert!(ClientError::Unauthorized.is_terminal_auth());
        assert!(!ClientError::NotConnected.is_terminal_auth());
    }

    #[test]
    fn test_from_serde_error() {
        let result: Result<serde_json::Value, _> = serde_json::from_str("{ nope }");
        let error: ClientError = result.unwrap_err().into();
        match error {
            ClientError::Decode(_) => {}
            other => panic!("expected Decode, got {:?}", other),
        }
    }
}
