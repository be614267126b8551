use std::time::Duration;

use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SocketRpcError {
    #[error("invalid socket url: {0}")]
    InvalidUrl(String),
    #[error("socket transport error: {0}")]
    Transport(String),
    #[error("handshake did not complete within {0:?}")]
    ConnectTimeout(Duration),
    #[error("connection rejected: {0}")]
    ConnectRejected(String),
    #[error("socket is not connected")]
    NotConnected,
    #[error("connection closed")]
    Closed,
    #[error("no ack for call {id} within {timeout:?}")]
    AckTimeout { id: u64, timeout: Duration },
    #[error("malformed ack payload: {0}")]
    Parse(String),
    /// Error reported by the peer inside an ack payload.
    #[error("{0}")]
    Remote(String),
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum FrameError {
    #[error("empty frame")]
    Empty,
    #[error("unknown frame type: {0}")]
    UnknownType(String),
    #[error("malformed {kind} frame: {reason}")]
    Malformed { kind: &'static str, reason: String },
}

impl FrameError {
    pub(crate) fn malformed(kind: &'static str, reason: impl Into<String>) -> Self {
        Self::Malformed {
            kind,
            reason: reason.into(),
        }
    }
}
