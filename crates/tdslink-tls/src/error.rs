//! TLS error types.

use thiserror::Error;

/// Errors raised while establishing or operating the TLS tunnel.
#[derive(Debug, Error)]
pub enum TlsError {
    /// The TLS handshake failed.
    #[error("TLS handshake failed: {0}")]
    HandshakeFailed(String),

    /// The server name could not be used for SNI/verification.
    #[error("invalid server name \"{0}\"")]
    InvalidServerName(String),

    /// rustls configuration problem.
    #[error("TLS configuration error: {0}")]
    Configuration(String),

    /// Transport error during the handshake.
    #[error("IO error during TLS: {0}")]
    Io(#[from] std::io::Error),
}
