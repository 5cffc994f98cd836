//! SQL Server collation descriptor and code-page mapping.
//!
//! A collation travels as 5 bytes: a 32-bit info field (20-bit LCID, 8
//! comparison-flag bits, 4-bit version) and a sort id. The info field also
//! carries the UTF-8 flag (bit 27) for SQL Server 2019+ `_UTF8` collations.

use bytes::{Buf, BufMut};

/// UTF-8 collation flag (bit 27 of the info field).
pub const COLLATION_FLAG_UTF8: u32 = 0x0800_0000;

/// Mask extracting the LCID from the info field (lower 20 bits).
pub const LCID_MASK: u32 = 0x000F_FFFF;

/// Mask extracting the primary language id (lower 16 bits of the LCID).
pub const PRIMARY_LANGUAGE_MASK: u32 = 0x0000_FFFF;

/// Code page number used for UTF-8 throughout the codec.
pub const CP_UTF8: u16 = 65001;

/// The 5-byte wire collation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Collation {
    /// LCID, comparison flags and version packed into 32 bits.
    pub info: u32,
    /// Sort id (nonzero selects a SQL collation rather than a Windows one).
    pub sort_id: u8,
}

impl Collation {
    /// A reasonable default: Latin1_General_CI_AS.
    #[must_use]
    pub const fn latin1_general_ci_as() -> Self {
        Self {
            info: 0x00D0_0409,
            sort_id: 0x34,
        }
    }

    /// Decode from 5 wire bytes.
    pub fn decode(src: &mut impl Buf) -> Option<Self> {
        if src.remaining() < 5 {
            return None;
        }
        let info = src.get_u32_le();
        let sort_id = src.get_u8();
        Some(Self { info, sort_id })
    }

    /// Encode as 5 wire bytes.
    pub fn encode(&self, dst: &mut impl BufMut) {
        dst.put_u32_le(self.info);
        dst.put_u8(self.sort_id);
    }

    /// Locale id.
    #[must_use]
    pub const fn lcid(&self) -> u32 {
        self.info & LCID_MASK
    }

    /// Collation version nibble (80/90/100/140 family selector).
    #[must_use]
    pub const fn version(&self) -> u8 {
        ((self.info >> 28) & 0x0F) as u8
    }

    /// Whether this is a `_UTF8` collation: narrow columns carry UTF-8.
    #[must_use]
    pub const fn is_utf8(&self) -> bool {
        self.info & COLLATION_FLAG_UTF8 != 0
    }

    /// The Windows code page for narrow text in this collation.
    #[must_use]
    pub fn code_page(&self) -> u16 {
        if self.is_utf8() {
            return CP_UTF8;
        }
        code_page_for_lcid(self.lcid())
    }
}

/// Map an LCID to the Windows code page used for its narrow text.
///
/// Reference: MS-LCID. Languages not listed fall back to 1252 (Western
/// European), which is what the server itself does for unrecognized locales.
#[must_use]
pub fn code_page_for_lcid(lcid: u32) -> u16 {
    let primary = lcid & PRIMARY_LANGUAGE_MASK;

    match primary {
        0x0411 => 932,                   // Japanese - Shift_JIS
        0x0804 | 0x1004 => 936,          // Chinese Simplified - GBK
        0x0404 | 0x0C04 | 0x1404 => 950, // Chinese Traditional - Big5
        0x0412 => 949,                   // Korean - EUC-KR
        0x041E => 874,                   // Thai
        0x042A => 1258,                  // Vietnamese

        // Code Page 1250 - Central European
        0x0405 | 0x0415 | 0x040E | 0x041A | 0x081A | 0x141A | 0x101A | 0x041B | 0x0424 | 0x0418
        | 0x041C => 1250,

        // Code Page 1251 - Cyrillic
        0x0419 | 0x0422 | 0x0423 | 0x0402 | 0x042F | 0x0C1A | 0x201A | 0x0440 | 0x0843 | 0x0444
        | 0x0450 | 0x0485 => 1251,

        0x0408 => 1253,          // Greek
        0x041F | 0x042C => 1254, // Turkish, Azerbaijani
        0x040D => 1255,          // Hebrew

        // Code Page 1256 - Arabic, Farsi, Urdu
        0x0401 | 0x0801 | 0x0C01 | 0x1001 | 0x1401 | 0x1801 | 0x1C01 | 0x2001 | 0x2401 | 0x2801
        | 0x2C01 | 0x3001 | 0x3401 | 0x3801 | 0x3C01 | 0x4001 | 0x0429 | 0x0420 | 0x048C
        | 0x0463 => 1256,

        // Code Page 1257 - Baltic
        0x0425..=0x0427 => 1257,

        _ => 1252,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use bytes::BytesMut;

    #[test]
    fn wire_roundtrip() {
        let coll = Collation {
            info: 0x00D0_0409,
            sort_id: 0x34,
        };

        let mut buf = BytesMut::new();
        coll.encode(&mut buf);
        assert_eq!(buf.len(), 5);

        let mut cursor = buf.freeze();
        assert_eq!(Collation::decode(&mut cursor), Some(coll));
    }

    #[test]
    fn utf8_flag() {
        let utf8 = Collation {
            info: 0x0800_0409,
            sort_id: 0,
        };
        assert!(utf8.is_utf8());
        assert_eq!(utf8.code_page(), CP_UTF8);

        let plain = Collation {
            info: 0x0409,
            sort_id: 0,
        };
        assert!(!plain.is_utf8());
        assert_eq!(plain.code_page(), 1252);
    }

    #[test]
    fn code_pages() {
        assert_eq!(code_page_for_lcid(0x0411), 932);
        assert_eq!(code_page_for_lcid(0x0804), 936);
        assert_eq!(code_page_for_lcid(0x0412), 949);
        assert_eq!(code_page_for_lcid(0x0404), 950);
        assert_eq!(code_page_for_lcid(0x0419), 1251);
        assert_eq!(code_page_for_lcid(0x041E), 874);
        assert_eq!(code_page_for_lcid(0x9999), 1252);
    }

    #[test]
    fn version_nibble() {
        let coll = Collation {
            info: 0x2000_0409,
            sort_id: 0,
        };
        assert_eq!(coll.version(), 2);
    }
}
