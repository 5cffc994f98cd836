//! Per-packet inbound delivery and whole-message accumulation.
//!
//! Server responses are delivered to sessions one packet payload at a time,
//! carrying the `last_packet` flag; a large result set never needs to be
//! resident in one buffer. The short prelogin/login exchanges use
//! [`MessageBuffer`] to accumulate a complete message.

use bytes::{Bytes, BytesMut};
use tdslink_protocol::packet::PacketType;

use crate::packet_codec::Packet;

/// One packet's worth of a server message.
#[derive(Debug, Clone)]
pub struct Inbound {
    /// Message type of the packet.
    pub packet_type: PacketType,
    /// Packet payload.
    pub payload: Bytes,
    /// Whether this was the final packet of the message.
    pub last_packet: bool,
}

impl Inbound {
    /// Build from a decoded packet.
    #[must_use]
    pub fn from_packet(packet: Packet) -> Self {
        Self {
            packet_type: packet.header.packet_type,
            last_packet: packet.header.is_end_of_message(),
            payload: packet.payload.freeze(),
        }
    }
}

/// Accumulates packet payloads into a whole message.
#[derive(Debug, Default)]
pub struct MessageBuffer {
    buffer: BytesMut,
    packet_type: Option<PacketType>,
}

impl MessageBuffer {
    /// Create an empty buffer.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Push one inbound packet; returns the complete message when the
    /// `last_packet` flag is seen.
    pub fn push(&mut self, inbound: Inbound) -> Option<(PacketType, Bytes)> {
        let packet_type = *self.packet_type.get_or_insert(inbound.packet_type);
        self.buffer.extend_from_slice(&inbound.payload);

        if inbound.last_packet {
            self.packet_type = None;
            Some((packet_type, self.buffer.split().freeze()))
        } else {
            None
        }
    }

    /// Whether a partial message is buffered.
    #[must_use]
    pub fn has_partial(&self) -> bool {
        self.packet_type.is_some()
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    fn inbound(payload: &[u8], last: bool) -> Inbound {
        Inbound {
            packet_type: PacketType::TabularResult,
            payload: Bytes::copy_from_slice(payload),
            last_packet: last,
        }
    }

    #[test]
    fn single_packet_message() {
        let mut buffer = MessageBuffer::new();
        let (packet_type, payload) = buffer.push(inbound(b"hello", true)).unwrap();
        assert_eq!(packet_type, PacketType::TabularResult);
        assert_eq!(&payload[..], b"hello");
        assert!(!buffer.has_partial());
    }

    #[test]
    fn multi_packet_message() {
        let mut buffer = MessageBuffer::new();
        assert!(buffer.push(inbound(b"hello ", false)).is_none());
        assert!(buffer.has_partial());

        let (_, payload) = buffer.push(inbound(b"world", true)).unwrap();
        assert_eq!(&payload[..], b"hello world");
        assert!(!buffer.has_partial());
    }
}
