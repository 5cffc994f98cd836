//! tokio-util codec for TDS packets, with optional SMP (MARS) framing.

use bytes::{Buf, BufMut, BytesMut};
use tdslink_protocol::packet::{MAX_PACKET_SIZE, PACKET_HEADER_SIZE, PacketHeader};
use tdslink_protocol::smp::{SMP_HEADER_SIZE, SMP_MAGIC, SmpFlags, SmpHeader};
use tokio_util::codec::{Decoder, Encoder};

use crate::error::CodecError;

/// A TDS packet: header plus payload.
#[derive(Debug, Clone)]
pub struct Packet {
    /// Packet header.
    pub header: PacketHeader,
    /// Payload, excluding the header.
    pub payload: BytesMut,
}

impl Packet {
    /// Create a packet.
    #[must_use]
    pub fn new(header: PacketHeader, payload: BytesMut) -> Self {
        Self { header, payload }
    }

    /// Total size including the header.
    #[must_use]
    pub fn total_size(&self) -> usize {
        PACKET_HEADER_SIZE + self.payload.len()
    }
}

/// One decoded unit off the wire.
#[derive(Debug)]
pub enum Frame {
    /// A bare TDS packet (no MARS).
    Packet(Packet),
    /// An SMP frame; DATA frames carry one TDS packet.
    Smp {
        /// The SMP header.
        header: SmpHeader,
        /// The wrapped packet, present on DATA frames.
        packet: Option<Packet>,
    },
}

/// An outbound unit: a packet, optionally wrapped in an SMP DATA or control
/// frame.
#[derive(Debug)]
pub struct Outbound {
    /// The SMP header to prepend, if the connection is in MARS mode.
    pub smp: Option<SmpHeader>,
    /// The packet; absent for pure SMP control frames.
    pub packet: Option<Packet>,
}

impl Outbound {
    /// A bare packet.
    #[must_use]
    pub fn packet(packet: Packet) -> Self {
        Self {
            smp: None,
            packet: Some(packet),
        }
    }

    /// An SMP control frame (SYN/ACK/FIN).
    #[must_use]
    pub fn control(header: SmpHeader) -> Self {
        Self {
            smp: Some(header),
            packet: None,
        }
    }

    /// A packet wrapped in an SMP DATA frame.
    #[must_use]
    pub fn data(header: SmpHeader, packet: Packet) -> Self {
        Self {
            smp: Some(header),
            packet: Some(packet),
        }
    }
}

/// TDS packet codec for tokio-util framing.
pub struct TdsCodec {
    /// Maximum packet size to accept.
    max_packet_size: usize,
    /// Sequence number for encoded packets.
    packet_id: u8,
    /// Whether inbound bytes are SMP-framed.
    mars: bool,
}

impl TdsCodec {
    /// Create a codec.
    #[must_use]
    pub fn new(mars: bool) -> Self {
        Self {
            max_packet_size: MAX_PACKET_SIZE,
            packet_id: 1,
            mars,
        }
    }

    fn next_packet_id(&mut self) -> u8 {
        let id = self.packet_id;
        self.packet_id = self.packet_id.wrapping_add(1);
        if self.packet_id == 0 {
            self.packet_id = 1;
        }
        id
    }

    fn decode_packet(src: &mut BytesMut, max: usize) -> Result<Option<Packet>, CodecError> {
        if src.len() < PACKET_HEADER_SIZE {
            return Ok(None);
        }

        let length = u16::from_be_bytes([src[2], src[3]]) as usize;
        if length < PACKET_HEADER_SIZE {
            return Err(CodecError::InvalidHeader);
        }
        if length > max {
            return Err(CodecError::PacketTooLarge { size: length, max });
        }

        if src.len() < length {
            src.reserve(length - src.len());
            return Ok(None);
        }

        let packet_bytes = src.split_to(length);
        let mut cursor = packet_bytes.as_ref();
        let header = PacketHeader::decode(&mut cursor)?;
        let payload = BytesMut::from(&packet_bytes[PACKET_HEADER_SIZE..]);

        tracing::trace!(
            packet_type = ?header.packet_type,
            length,
            eom = header.is_end_of_message(),
            "decoded TDS packet"
        );

        Ok(Some(Packet::new(header, payload)))
    }
}

impl Decoder for TdsCodec {
    type Item = Frame;
    type Error = CodecError;

    fn decode(&mut self, src: &mut BytesMut) -> Result<Option<Self::Item>, Self::Error> {
        if !self.mars {
            return Ok(Self::decode_packet(src, self.max_packet_size)?.map(Frame::Packet));
        }

        if src.is_empty() {
            return Ok(None);
        }
        if src[0] != SMP_MAGIC {
            return Err(CodecError::Protocol(std::sync::Arc::new(
                tdslink_protocol::ProtocolError::MalformedSmpFrame("expected SMP magic"),
            )));
        }
        if src.len() < SMP_HEADER_SIZE {
            return Ok(None);
        }

        let frame_len = u32::from_le_bytes([src[4], src[5], src[6], src[7]]) as usize;
        if frame_len < SMP_HEADER_SIZE {
            return Err(CodecError::InvalidHeader);
        }
        if src.len() < frame_len {
            src.reserve(frame_len - src.len());
            return Ok(None);
        }

        let mut frame = src.split_to(frame_len);
        let mut cursor = frame.as_ref();
        let header = SmpHeader::decode(&mut cursor)?;
        frame.advance(SMP_HEADER_SIZE);

        let packet = if header.flags == SmpFlags::Data {
            let packet = Self::decode_packet(&mut frame, self.max_packet_size)?
                .ok_or(CodecError::InvalidHeader)?;
            if !frame.is_empty() {
                return Err(CodecError::Protocol(std::sync::Arc::new(
                    tdslink_protocol::ProtocolError::MalformedSmpFrame(
                        "trailing bytes after wrapped packet",
                    ),
                )));
            }
            Some(packet)
        } else {
            None
        };

        tracing::trace!(
            flags = ?header.flags,
            sid = header.sid,
            seqnum = header.seqnum,
            window = header.window,
            "decoded SMP frame"
        );

        Ok(Some(Frame::Smp { header, packet }))
    }
}

impl Encoder<Outbound> for TdsCodec {
    type Error = CodecError;

    fn encode(&mut self, item: Outbound, dst: &mut BytesMut) -> Result<(), Self::Error> {
        if let Some(smp) = item.smp {
            smp.encode(dst);
        }

        if let Some(packet) = item.packet {
            let total_length = packet.total_size();
            if total_length > self.max_packet_size {
                return Err(CodecError::PacketTooLarge {
                    size: total_length,
                    max: self.max_packet_size,
                });
            }

            let mut header = packet.header;
            header.length = total_length as u16;
            header.packet_id = self.next_packet_id();

            dst.reserve(total_length);
            header.encode(dst);
            dst.put_slice(&packet.payload);

            tracing::trace!(
                packet_type = ?header.packet_type,
                length = total_length,
                packet_id = header.packet_id,
                "encoded TDS packet"
            );
        }

        Ok(())
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use tdslink_protocol::packet::{PacketStatus, PacketType};

    #[test]
    fn decode_plain_packet() {
        let mut codec = TdsCodec::new(false);

        let mut data = BytesMut::new();
        data.put_u8(PacketType::SqlBatch as u8);
        data.put_u8(PacketStatus::END_OF_MESSAGE.bits());
        data.put_u16(12);
        data.put_u16(0);
        data.put_u8(1);
        data.put_u8(0);
        data.put_slice(b"test");

        match codec.decode(&mut data).unwrap().unwrap() {
            Frame::Packet(packet) => {
                assert_eq!(packet.header.packet_type, PacketType::SqlBatch);
                assert_eq!(&packet.payload[..], b"test");
            }
            other => panic!("expected packet, got {other:?}"),
        }
    }

    #[test]
    fn incomplete_packet_waits() {
        let mut codec = TdsCodec::new(false);

        let mut data = BytesMut::new();
        data.put_u8(PacketType::SqlBatch as u8);
        data.put_u8(PacketStatus::END_OF_MESSAGE.bits());
        data.put_u16(12);
        data.put_u16(0);
        data.put_u8(1);
        data.put_u8(0);
        // payload missing

        assert!(codec.decode(&mut data).unwrap().is_none());
    }

    #[test]
    fn encode_sets_length_and_id() {
        let mut codec = TdsCodec::new(false);

        let header = PacketHeader::new(PacketType::SqlBatch, PacketStatus::END_OF_MESSAGE, 0);
        let packet = Packet::new(header, BytesMut::from(&b"test"[..]));

        let mut dst = BytesMut::new();
        codec.encode(Outbound::packet(packet), &mut dst).unwrap();

        assert_eq!(dst.len(), 12);
        assert_eq!(u16::from_be_bytes([dst[2], dst[3]]), 12);
        assert_eq!(dst[6], 1);
    }

    #[test]
    fn smp_data_frame_roundtrip() {
        let mut codec = TdsCodec::new(true);

        let header = PacketHeader::new(PacketType::TabularResult, PacketStatus::END_OF_MESSAGE, 0);
        let packet = Packet::new(header, BytesMut::from(&b"abc"[..]));
        let smp = SmpHeader::data(2, packet.total_size(), 5, 8);

        let mut wire = BytesMut::new();
        codec.encode(Outbound::data(smp, packet), &mut wire).unwrap();
        assert_eq!(wire.len(), 16 + 11);

        match codec.decode(&mut wire).unwrap().unwrap() {
            Frame::Smp { header, packet } => {
                assert_eq!(header.sid, 2);
                assert_eq!(header.seqnum, 5);
                assert_eq!(&packet.unwrap().payload[..], b"abc");
            }
            other => panic!("expected SMP frame, got {other:?}"),
        }
    }

    #[test]
    fn smp_control_frame_has_no_packet() {
        let mut codec = TdsCodec::new(true);

        let mut wire = BytesMut::new();
        codec
            .encode(
                Outbound::control(SmpHeader::control(SmpFlags::Ack, 1, 3, 9)),
                &mut wire,
            )
            .unwrap();

        match codec.decode(&mut wire).unwrap().unwrap() {
            Frame::Smp { header, packet } => {
                assert_eq!(header.flags, SmpFlags::Ack);
                assert!(packet.is_none());
            }
            other => panic!("expected SMP frame, got {other:?}"),
        }
    }

    #[test]
    fn mars_mode_rejects_bare_packets() {
        let mut codec = TdsCodec::new(true);
        let mut data = BytesMut::from(&[0x04u8, 0x01][..]);
        assert!(codec.decode(&mut data).is_err());
    }
}
