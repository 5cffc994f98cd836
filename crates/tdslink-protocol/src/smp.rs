//! SMP (session multiplexing protocol) framing for MARS.
//!
//! With MARS enabled, every TDS packet travels inside a 16-byte SMP frame
//! that names a logical session (`sid`) and carries the flow-control fields.
//! All SMP header fields are little-endian; `length` counts the whole frame
//! including the header.

use bytes::{Buf, BufMut};

use crate::error::ProtocolError;

/// SMP frame header size.
pub const SMP_HEADER_SIZE: usize = 16;

/// The SMP magic byte ("smid").
pub const SMP_MAGIC: u8 = 0x53;

/// SMP frame flags.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum SmpFlags {
    /// Open a session.
    Syn = 0x01,
    /// Acknowledge received data and advertise the window.
    Ack = 0x02,
    /// Close a session.
    Fin = 0x04,
    /// The frame carries a TDS packet.
    Data = 0x08,
}

impl SmpFlags {
    /// Parse from the wire byte.
    pub fn from_u8(value: u8) -> Result<Self, ProtocolError> {
        match value {
            0x01 => Ok(Self::Syn),
            0x02 => Ok(Self::Ack),
            0x04 => Ok(Self::Fin),
            0x08 => Ok(Self::Data),
            _ => Err(ProtocolError::MalformedSmpFrame("unknown flags")),
        }
    }
}

/// The 16-byte SMP frame header.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SmpHeader {
    /// Frame kind.
    pub flags: SmpFlags,
    /// Logical session id.
    pub sid: u16,
    /// Total frame length including this header.
    pub length: u32,
    /// Sender sequence number; incremented once per DATA frame.
    pub seqnum: u32,
    /// Highest sequence number the sender is prepared to receive.
    pub window: u32,
}

impl SmpHeader {
    /// Build a control frame (SYN/ACK/FIN) with no payload.
    #[must_use]
    pub const fn control(flags: SmpFlags, sid: u16, seqnum: u32, window: u32) -> Self {
        Self {
            flags,
            sid,
            length: SMP_HEADER_SIZE as u32,
            seqnum,
            window,
        }
    }

    /// Build a DATA frame header for a payload of `payload_len` bytes.
    #[must_use]
    pub const fn data(sid: u16, payload_len: usize, seqnum: u32, window: u32) -> Self {
        Self {
            flags: SmpFlags::Data,
            sid,
            length: (SMP_HEADER_SIZE + payload_len) as u32,
            seqnum,
            window,
        }
    }

    /// Decode a header from the front of `src`.
    pub fn decode(src: &mut impl Buf) -> Result<Self, ProtocolError> {
        if src.remaining() < SMP_HEADER_SIZE {
            return Err(ProtocolError::eof(SMP_HEADER_SIZE, src.remaining()));
        }

        let smid = src.get_u8();
        if smid != SMP_MAGIC {
            return Err(ProtocolError::MalformedSmpFrame("bad magic"));
        }
        let flags = SmpFlags::from_u8(src.get_u8())?;
        let sid = src.get_u16_le();
        let length = src.get_u32_le();
        let seqnum = src.get_u32_le();
        let window = src.get_u32_le();

        if (length as usize) < SMP_HEADER_SIZE {
            return Err(ProtocolError::MalformedSmpFrame("length below header"));
        }

        Ok(Self {
            flags,
            sid,
            length,
            seqnum,
            window,
        })
    }

    /// Encode the header into `dst`.
    pub fn encode(&self, dst: &mut impl BufMut) {
        dst.put_u8(SMP_MAGIC);
        dst.put_u8(self.flags as u8);
        dst.put_u16_le(self.sid);
        dst.put_u32_le(self.length);
        dst.put_u32_le(self.seqnum);
        dst.put_u32_le(self.window);
    }

    /// Payload bytes following this header.
    #[must_use]
    pub const fn payload_length(&self) -> usize {
        self.length as usize - SMP_HEADER_SIZE
    }
}
