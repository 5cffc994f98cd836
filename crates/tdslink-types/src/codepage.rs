//! Code-page conversion for narrow (non-N) character columns.
//!
//! The Windows and CJK pages go through `encoding_rs`. Code pages 437 and
//! 850 are OEM pages that `encoding_rs` does not ship, so their high halves
//! are embedded here as data. UTF-8 (65001) passes through unchanged.

use encoding_rs::Encoding;

use crate::error::TypeError;

/// CP437 high half (0x80..=0xFF).
const CP437_HIGH: [char; 128] = [
    'Ç', 'ü', 'é', 'â', 'ä', 'à', 'å', 'ç', 'ê', 'ë', 'è', 'ï', 'î', 'ì', 'Ä', 'Å', //
    'É', 'æ', 'Æ', 'ô', 'ö', 'ò', 'û', 'ù', 'ÿ', 'Ö', 'Ü', '¢', '£', '¥', '₧', 'ƒ', //
    'á', 'í', 'ó', 'ú', 'ñ', 'Ñ', 'ª', 'º', '¿', '⌐', '¬', '½', '¼', '¡', '«', '»', //
    '░', '▒', '▓', '│', '┤', '╡', '╢', '╖', '╕', '╣', '║', '╗', '╝', '╜', '╛', '┐', //
    '└', '┴', '┬', '├', '─', '┼', '╞', '╟', '╚', '╔', '╩', '╦', '╠', '═', '╬', '╧', //
    '╨', '╤', '╥', '╙', '╘', '╒', '╓', '╫', '╪', '┘', '┌', '█', '▄', '▌', '▐', '▀', //
    'α', 'ß', 'Γ', 'π', 'Σ', 'σ', 'µ', 'τ', 'Φ', 'Θ', 'Ω', 'δ', '∞', 'φ', 'ε', '∩', //
    '≡', '±', '≥', '≤', '⌠', '⌡', '÷', '≈', '°', '∙', '·', '√', 'ⁿ', '²', '■', '\u{A0}',
];

/// CP850 high half (0x80..=0xFF).
const CP850_HIGH: [char; 128] = [
    'Ç', 'ü', 'é', 'â', 'ä', 'à', 'å', 'ç', 'ê', 'ë', 'è', 'ï', 'î', 'ì', 'Ä', 'Å', //
    'É', 'æ', 'Æ', 'ô', 'ö', 'ò', 'û', 'ù', 'ÿ', 'Ö', 'Ü', 'ø', '£', 'Ø', '×', 'ƒ', //
    'á', 'í', 'ó', 'ú', 'ñ', 'Ñ', 'ª', 'º', '¿', '®', '¬', '½', '¼', '¡', '«', '»', //
    '░', '▒', '▓', '│', '┤', 'Á', 'Â', 'À', '©', '╣', '║', '╗', '╝', '¢', '¥', '┐', //
    '└', '┴', '┬', '├', '─', '┼', 'ã', 'Ã', '╚', '╔', '╩', '╦', '╠', '═', '╬', '¤', //
    'ð', 'Ð', 'Ê', 'Ë', 'È', 'ı', 'Í', 'Î', 'Ï', '┘', '┌', '█', '▄', '¦', 'Ì', '▀', //
    'Ó', 'ß', 'Ô', 'Ò', 'õ', 'Õ', 'µ', 'þ', 'Þ', 'Ú', 'Û', 'Ù', 'ý', 'Ý', '¯', '´', //
    '\u{AD}', '±', '‗', '¾', '¶', '§', '÷', '¸', '°', '¨', '·', '¹', '³', '²', '■', '\u{A0}',
];

/// UTF-8 pseudo code page.
pub const CP_UTF8: u16 = 65001;

fn encoding_for(code_page: u16) -> Option<&'static Encoding> {
    match code_page {
        874 => Some(encoding_rs::WINDOWS_874),
        932 => Some(encoding_rs::SHIFT_JIS),
        936 => Some(encoding_rs::GB18030),
        949 => Some(encoding_rs::EUC_KR),
        950 => Some(encoding_rs::BIG5),
        1250 => Some(encoding_rs::WINDOWS_1250),
        1251 => Some(encoding_rs::WINDOWS_1251),
        1252 => Some(encoding_rs::WINDOWS_1252),
        1253 => Some(encoding_rs::WINDOWS_1253),
        1254 => Some(encoding_rs::WINDOWS_1254),
        1255 => Some(encoding_rs::WINDOWS_1255),
        1256 => Some(encoding_rs::WINDOWS_1256),
        1257 => Some(encoding_rs::WINDOWS_1257),
        1258 => Some(encoding_rs::WINDOWS_1258),
        _ => None,
    }
}

fn oem_table(code_page: u16) -> Option<&'static [char; 128]> {
    match code_page {
        437 => Some(&CP437_HIGH),
        850 => Some(&CP850_HIGH),
        _ => None,
    }
}

/// Decode column bytes in `code_page` into a string.
pub fn decode_narrow(bytes: &[u8], code_page: u16) -> Result<String, TypeError> {
    if code_page == CP_UTF8 {
        return String::from_utf8(bytes.to_vec())
            .map_err(|e| TypeError::InvalidEncoding(e.to_string()));
    }

    if let Some(table) = oem_table(code_page) {
        return Ok(bytes
            .iter()
            .map(|&b| {
                if b < 0x80 {
                    b as char
                } else {
                    table[(b - 0x80) as usize]
                }
            })
            .collect());
    }

    let encoding = encoding_for(code_page).ok_or(TypeError::UnknownCodePage(code_page))?;
    let (decoded, _, had_errors) = encoding.decode(bytes);
    if had_errors {
        return Err(TypeError::InvalidEncoding(format!(
            "undecodable bytes for code page {code_page}"
        )));
    }
    Ok(decoded.into_owned())
}

/// Encode a string into `code_page` bytes.
///
/// Characters the page cannot represent are substituted, matching server
/// behavior for lossy inserts.
pub fn encode_narrow(s: &str, code_page: u16) -> Result<Vec<u8>, TypeError> {
    if code_page == CP_UTF8 {
        return Ok(s.as_bytes().to_vec());
    }

    if let Some(table) = oem_table(code_page) {
        return Ok(s
            .chars()
            .map(|c| {
                if (c as u32) < 0x80 {
                    c as u8
                } else {
                    table
                        .iter()
                        .position(|&t| t == c)
                        .map_or(b'?', |i| (i + 0x80) as u8)
                }
            })
            .collect());
    }

    let encoding = encoding_for(code_page).ok_or(TypeError::UnknownCodePage(code_page))?;
    let (encoded, _, _) = encoding.encode(s);
    Ok(encoded.into_owned())
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn utf8_passes_through() {
        let s = "héllo";
        let bytes = encode_narrow(s, CP_UTF8).unwrap();
        assert_eq!(bytes, s.as_bytes());
        assert_eq!(decode_narrow(&bytes, CP_UTF8).unwrap(), s);
    }

    #[test]
    fn cp1252_roundtrip() {
        let s = "àéîöü";
        let bytes = encode_narrow(s, 1252).unwrap();
        assert_eq!(bytes.len(), 5);
        assert_eq!(decode_narrow(&bytes, 1252).unwrap(), s);
    }

    #[test]
    fn cp1251_cyrillic() {
        let bytes = [0xCF, 0xF0, 0xE8, 0xE2, 0xE5, 0xF2];
        assert_eq!(decode_narrow(&bytes, 1251).unwrap(), "Привет");
    }

    #[test]
    fn shift_jis() {
        let bytes = [0x93, 0xFA, 0x96, 0x7B, 0x8C, 0xEA];
        assert_eq!(decode_narrow(&bytes, 932).unwrap(), "日本語");
        assert_eq!(encode_narrow("日本語", 932).unwrap(), bytes);
    }

    #[test]
    fn cp437_roundtrip() {
        assert_eq!(decode_narrow(&[0x80], 437).unwrap(), "Ç");
        assert_eq!(decode_narrow(&[0xE1], 437).unwrap(), "ß");
        assert_eq!(encode_narrow("Çß", 437).unwrap(), vec![0x80, 0xE1]);
        // ASCII is identity.
        assert_eq!(encode_narrow("abc", 437).unwrap(), b"abc".to_vec());
    }

    #[test]
    fn cp850_differs_from_cp437() {
        // 0x9E is ₧ in 437 but × in 850.
        assert_eq!(decode_narrow(&[0x9E], 437).unwrap(), "₧");
        assert_eq!(decode_narrow(&[0x9E], 850).unwrap(), "×");
    }

    #[test]
    fn unknown_code_page_is_typed_error() {
        assert!(matches!(
            decode_narrow(b"x", 20127),
            Err(TypeError::UnknownCodePage(20127))
        ));
        assert!(matches!(
            encode_narrow("x", 20127),
            Err(TypeError::UnknownCodePage(20127))
        ));
    }

    #[test]
    fn unmappable_character_is_substituted() {
        assert_eq!(encode_narrow("語", 437).unwrap(), vec![b'?']);
    }
}
