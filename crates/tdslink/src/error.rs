//! Client error types.

use thiserror::Error;

use tdslink_protocol::ServerMessage;

/// Errors surfaced by the client.
#[derive(Debug, Error)]
pub enum Error {
    /// TCP connection failed.
    #[error("connection failed: {0}")]
    Connection(String),

    /// TLS failure.
    #[error("TLS error: {0}")]
    Tls(#[from] tdslink_tls::TlsError),

    /// Wire protocol violation: fatal to the statement.
    #[error("protocol error: {0}")]
    Protocol(#[from] tdslink_protocol::ProtocolError),

    /// Framing/session layer failure.
    #[error("codec error: {0}")]
    Codec(tdslink_codec::CodecError),

    /// Value conversion failure, raised client-side before or after the
    /// wire.
    #[error("type error: {0}")]
    Type(#[from] tdslink_types::TypeError),

    /// The server reported an error for the statement.
    #[error("server error {number} (severity {class}, state {state}): {message}")]
    Server {
        /// Error number.
        number: i32,
        /// Severity class.
        class: u8,
        /// Error state.
        state: u8,
        /// Message text.
        message: String,
        /// Reporting server.
        server: Option<String>,
        /// Procedure name, if inside one.
        procedure: Option<String>,
        /// Line number.
        line: i32,
    },

    /// Login was rejected.
    #[error("login failed: {0}")]
    Login(String),

    /// A receive deadline elapsed; the statement was cancelled.
    #[error("command timed out")]
    Timeout,

    /// Configuration problem.
    #[error("configuration error: {0}")]
    Config(String),

    /// Transport IO error.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl From<tdslink_codec::CodecError> for Error {
    fn from(e: tdslink_codec::CodecError) -> Self {
        match e {
            tdslink_codec::CodecError::Timeout => Self::Timeout,
            other => Self::Codec(other),
        }
    }
}

impl From<ServerMessage> for Error {
    fn from(m: ServerMessage) -> Self {
        Self::Server {
            number: m.number,
            class: m.class,
            state: m.state,
            message: m.message,
            server: if m.server.is_empty() {
                None
            } else {
                Some(m.server)
            },
            procedure: if m.procedure.is_empty() {
                None
            } else {
                Some(m.procedure)
            },
            line: m.line,
        }
    }
}

impl Error {
    /// Whether this is a fatal server error (severity 20+), which tears
    /// down the connection.
    #[must_use]
    pub fn is_fatal_server_error(&self) -> bool {
        matches!(self, Self::Server { class, .. } if *class >= 20)
    }

    /// The server error severity, if this is a server error.
    #[must_use]
    pub fn severity(&self) -> Option<u8> {
        match self {
            Self::Server { class, .. } => Some(*class),
            _ => None,
        }
    }
}

/// Result alias for client operations.
pub type Result<T> = std::result::Result<T, Error>;
