//! Protocol error types.

use thiserror::Error;

/// Errors raised while encoding or decoding the TDS wire protocol.
///
/// A protocol error is fatal to the statement that was being parsed but not
/// to the connection, unless the packet framing itself is corrupt.
#[derive(Debug, Error)]
pub enum ProtocolError {
    /// The buffer ended before a complete structure could be read.
    #[error("unexpected end of stream: need {needed} bytes, have {have}")]
    UnexpectedEof {
        /// Bytes required to continue.
        needed: usize,
        /// Bytes available.
        have: usize,
    },

    /// A packet header carried an unknown message type byte.
    #[error("invalid packet type 0x{0:02X}")]
    InvalidPacketType(u8),

    /// A packet header carried status bits outside the defined set.
    #[error("invalid packet status 0x{0:02X}")]
    InvalidPacketStatus(u8),

    /// A packet header declared a length smaller than the header itself or
    /// larger than the negotiated maximum.
    #[error("invalid packet length {0}")]
    InvalidPacketLength(usize),

    /// The token stream contained a token id this implementation does not
    /// know.
    #[error("unknown token 0x{0:02X}")]
    UnknownToken(u8),

    /// A column descriptor or value carried an unknown SQL type byte.
    #[error("unknown SQL type 0x{0:02X}")]
    UnknownType(u8),

    /// A length-prefixed value declared a width that is not legal for its
    /// type (e.g. a 3-byte INTN).
    #[error("invalid width {width} for {type_name}")]
    InvalidTypeWidth {
        /// SQL type name.
        type_name: &'static str,
        /// Declared width in bytes.
        width: usize,
    },

    /// A ROW or NBCROW token arrived with no COLMETADATA in effect.
    #[error("row token without preceding column metadata")]
    RowWithoutMetadata,

    /// The final packet of a message left bytes that do not form a token.
    #[error("{0} trailing bytes at end of message")]
    TrailingBytes(usize),

    /// An ENVCHANGE token carried a malformed payload.
    #[error("malformed ENVCHANGE (type {0})")]
    MalformedEnvChange(u8),

    /// A UTF-16 string on the wire was not valid UTF-16.
    #[error("invalid UTF-16 in {0}")]
    InvalidUtf16(&'static str),

    /// A prelogin response was malformed.
    #[error("malformed prelogin response: {0}")]
    MalformedPrelogin(&'static str),

    /// An SMP (MARS) frame was malformed.
    #[error("malformed SMP frame: {0}")]
    MalformedSmpFrame(&'static str),
}

impl ProtocolError {
    pub(crate) fn eof(needed: usize, have: usize) -> Self {
        Self::UnexpectedEof { needed, have }
    }
}
