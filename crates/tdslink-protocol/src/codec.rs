//! Low-level string encoding helpers shared by the protocol structures.

use bytes::{Buf, BufMut};

use crate::error::ProtocolError;

/// Read a B_VARCHAR: 1-byte length in characters, then UTF-16LE code units.
pub fn read_b_varchar(src: &mut impl Buf) -> Option<String> {
    if src.remaining() < 1 {
        return None;
    }
    let len = src.get_u8() as usize;
    read_utf16(src, len)
}

/// Read a US_VARCHAR: 2-byte length in characters, then UTF-16LE code units.
pub fn read_us_varchar(src: &mut impl Buf) -> Option<String> {
    if src.remaining() < 2 {
        return None;
    }
    let len = src.get_u16_le() as usize;
    read_utf16(src, len)
}

/// Read `char_count` UTF-16LE code units as a string.
pub fn read_utf16(src: &mut impl Buf, char_count: usize) -> Option<String> {
    if src.remaining() < char_count * 2 {
        return None;
    }

    let mut units = Vec::with_capacity(char_count);
    for _ in 0..char_count {
        units.push(src.get_u16_le());
    }

    String::from_utf16(&units).ok()
}

/// Write a B_VARCHAR (1-byte character count prefix).
pub fn write_b_varchar(dst: &mut impl BufMut, s: &str) {
    let units: Vec<u16> = s.encode_utf16().collect();
    let len = units.len().min(255);
    dst.put_u8(len as u8);
    for &u in &units[..len] {
        dst.put_u16_le(u);
    }
}

/// Write a US_VARCHAR (2-byte character count prefix).
pub fn write_us_varchar(dst: &mut impl BufMut, s: &str) {
    let units: Vec<u16> = s.encode_utf16().collect();
    let len = units.len().min(65535);
    dst.put_u16_le(len as u16);
    for &u in &units[..len] {
        dst.put_u16_le(u);
    }
}

/// Write a string as bare UTF-16LE code units, no prefix.
pub fn write_utf16(dst: &mut impl BufMut, s: &str) {
    for u in s.encode_utf16() {
        dst.put_u16_le(u);
    }
}

/// Byte length of a string once encoded as UTF-16LE.
#[must_use]
pub fn utf16_byte_len(s: &str) -> usize {
    s.encode_utf16().count() * 2
}

/// Decode a raw UTF-16LE byte slice into a string.
pub fn decode_utf16_bytes(data: &[u8], what: &'static str) -> Result<String, ProtocolError> {
    if data.len() % 2 != 0 {
        return Err(ProtocolError::InvalidUtf16(what));
    }

    let units: Vec<u16> = data
        .chunks_exact(2)
        .map(|c| u16::from_le_bytes([c[0], c[1]]))
        .collect();

    String::from_utf16(&units).map_err(|_| ProtocolError::InvalidUtf16(what))
}
