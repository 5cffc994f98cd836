//! Codec and session errors.

use std::sync::Arc;

use thiserror::Error;

/// Errors raised by the framing and session layer.
///
/// The error is cheaply cloneable so a single transport fault can be
/// surfaced to every session waiting on the connection.
#[derive(Debug, Clone, Error)]
pub enum CodecError {
    /// Underlying transport error.
    #[error("IO error: {0}")]
    Io(Arc<std::io::Error>),

    /// Wire protocol violation.
    #[error("protocol error: {0}")]
    Protocol(Arc<tdslink_protocol::ProtocolError>),

    /// A packet header declared an impossible length.
    #[error("invalid packet header")]
    InvalidHeader,

    /// A packet exceeded the negotiated maximum size.
    #[error("packet of {size} bytes exceeds maximum {max}")]
    PacketTooLarge {
        /// Declared size.
        size: usize,
        /// Negotiated maximum.
        max: usize,
    },

    /// The transport closed underneath the connection.
    #[error("connection closed")]
    ConnectionClosed,

    /// The logical session was closed (FIN) while in use.
    #[error("session closed")]
    SessionClosed,

    /// A receive deadline elapsed.
    #[error("timed out waiting for server response")]
    Timeout,
}

impl From<std::io::Error> for CodecError {
    fn from(e: std::io::Error) -> Self {
        Self::Io(Arc::new(e))
    }
}

impl From<tdslink_protocol::ProtocolError> for CodecError {
    fn from(e: tdslink_protocol::ProtocolError) -> Self {
        Self::Protocol(Arc::new(e))
    }
}
