//! # tdslink-codec
//!
//! Async framing and session layer for the TDS protocol.
//!
//! A [`Connection`] owns one transport: a dedicated reader task drains the
//! socket, reassembles packets and routes them into per-session queues,
//! while writers share the send lock so each message's packets are
//! contiguous. With MARS enabled the same connection multiplexes many
//! logical [`Session`]s over SMP frames with per-session flow control.
//!
//! ```text
//! transport -> TdsCodec (packet/SMP framing) -> session queues -> executors
//! ```

#![warn(missing_docs)]
#![deny(unsafe_code)]

pub mod connection;
pub mod error;
pub mod message;
pub mod packet_codec;

pub use connection::{Connection, ConnectionOptions, Session};
pub use error::CodecError;
pub use message::{Inbound, MessageBuffer};
pub use packet_codec::{Frame, Outbound, Packet, TdsCodec};
