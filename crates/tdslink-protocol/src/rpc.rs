//! RPC request encoding.
//!
//! An RPC request names a stored procedure (or one of the well-known
//! procedure ids) and carries typed parameters, each encoded as a parameter
//! header followed by a type-dependent body.

use bytes::{BufMut, Bytes, BytesMut};

use crate::codec::write_utf16;
use crate::request::write_all_headers;
use crate::token::{ColumnMeta, write_type_info};
use crate::types::{MAX_SENTINEL, PLP_NULL, TypeId};

/// Well-known stored procedure ids, usable instead of a name.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u16)]
pub enum ProcId {
    /// sp_executesql: parameterized ad-hoc SQL.
    ExecuteSql = 0x000A,
    /// sp_prepare.
    Prepare = 0x000B,
    /// sp_execute.
    Execute = 0x000C,
    /// sp_unprepare.
    Unprepare = 0x000F,
}

/// Per-parameter status flags.
#[derive(Debug, Clone, Copy, Default)]
pub struct ParamFlags {
    /// Parameter is passed by reference (an output parameter).
    pub output: bool,
    /// Use the procedure's default value.
    pub default: bool,
}

impl ParamFlags {
    /// Wire byte.
    #[must_use]
    pub fn encode(&self) -> u8 {
        let mut flags = 0u8;
        if self.output {
            flags |= 0x01;
        }
        if self.default {
            flags |= 0x02;
        }
        flags
    }
}

/// One RPC parameter: name, flags, type descriptor and raw value bytes.
///
/// The value bytes are the server-native representation produced by the
/// value codec; `None` encodes SQL NULL.
#[derive(Debug, Clone)]
pub struct RpcParam {
    /// Parameter name, empty for positional parameters.
    pub name: String,
    /// Status flags.
    pub flags: ParamFlags,
    /// Type descriptor.
    pub meta: ColumnMeta,
    /// Raw value bytes, `None` for NULL.
    pub value: Option<Bytes>,
}

impl RpcParam {
    /// Create a parameter with a value.
    pub fn new(name: impl Into<String>, meta: ColumnMeta, value: Bytes) -> Self {
        Self {
            name: name.into(),
            flags: ParamFlags::default(),
            meta,
            value: Some(value),
        }
    }

    /// Create a NULL parameter.
    pub fn null(name: impl Into<String>, meta: ColumnMeta) -> Self {
        Self {
            name: name.into(),
            flags: ParamFlags::default(),
            meta,
            value: None,
        }
    }

    /// Create an INT parameter.
    pub fn int(name: impl Into<String>, value: i32) -> Self {
        let mut buf = BytesMut::with_capacity(4);
        buf.put_i32_le(value);
        Self::new(
            name,
            ColumnMeta::new("", TypeId::IntN).with_max_length(4),
            buf.freeze(),
        )
    }

    /// Create a BIGINT parameter.
    pub fn bigint(name: impl Into<String>, value: i64) -> Self {
        let mut buf = BytesMut::with_capacity(8);
        buf.put_i64_le(value);
        Self::new(
            name,
            ColumnMeta::new("", TypeId::IntN).with_max_length(8),
            buf.freeze(),
        )
    }

    /// Create an NVARCHAR parameter.
    pub fn nvarchar(name: impl Into<String>, value: &str) -> Self {
        let mut buf = BytesMut::new();
        write_utf16(&mut buf, value);

        let char_len = value.encode_utf16().count();
        let max_length = if char_len > 4000 {
            MAX_SENTINEL
        } else {
            (char_len.max(1) * 2) as u32
        };

        Self::new(
            name,
            ColumnMeta::new("", TypeId::NVarChar)
                .with_max_length(max_length)
                .with_collation(crate::collation::Collation::latin1_general_ci_as()),
            buf.freeze(),
        )
    }

    /// Create a legacy TEXT parameter.
    ///
    /// The bytes must already be in the collation's code page.
    pub fn text(name: impl Into<String>, value: Bytes) -> Self {
        Self::new(
            name,
            ColumnMeta::new("", TypeId::Text)
                .with_max_length(0x7FFF_FFFF)
                .with_collation(crate::collation::Collation::latin1_general_ci_as()),
            value,
        )
    }

    /// Create a legacy NTEXT parameter.
    pub fn ntext(name: impl Into<String>, value: &str) -> Self {
        let mut buf = BytesMut::new();
        write_utf16(&mut buf, value);
        Self::new(
            name,
            ColumnMeta::new("", TypeId::NText)
                .with_max_length(0x7FFF_FFFF)
                .with_collation(crate::collation::Collation::latin1_general_ci_as()),
            buf.freeze(),
        )
    }

    /// Create a legacy IMAGE parameter.
    pub fn image(name: impl Into<String>, value: Bytes) -> Self {
        Self::new(
            name,
            ColumnMeta::new("", TypeId::Image).with_max_length(0x7FFF_FFFF),
            value,
        )
    }

    /// Mark as an output parameter.
    #[must_use]
    pub fn as_output(mut self) -> Self {
        self.flags.output = true;
        self
    }

    /// Encode the parameter header, type descriptor and body.
    pub fn encode(&self, dst: &mut BytesMut) {
        crate::codec::write_b_varchar(dst, &self.name);
        dst.put_u8(self.flags.encode());
        write_type_info(dst, &self.meta);
        self.encode_body(dst);
    }

    fn encode_body(&self, dst: &mut BytesMut) {
        let ty = self.meta.type_id;
        let plp = self.meta.is_plp();

        match &self.value {
            None => {
                if plp {
                    dst.put_u64_le(PLP_NULL);
                } else if ty.is_short_len() {
                    dst.put_u16_le(0xFFFF);
                } else if ty.is_legacy_lob() {
                    dst.put_u32_le(0xFFFF_FFFF);
                } else {
                    dst.put_u8(0);
                }
            }
            Some(value) => {
                if plp {
                    dst.put_u64_le(value.len() as u64);
                    if !value.is_empty() {
                        dst.put_u32_le(value.len() as u32);
                        dst.put_slice(value);
                    }
                    dst.put_u32_le(0);
                } else if ty.is_short_len() {
                    dst.put_u16_le(value.len() as u16);
                    dst.put_slice(value);
                } else if ty.is_legacy_lob() {
                    dst.put_u32_le(value.len() as u32);
                    dst.put_slice(value);
                } else {
                    // Fixed scalars travel in their nullable wire form, so
                    // everything left takes a 1-byte length.
                    dst.put_u8(value.len() as u8);
                    dst.put_slice(value);
                }
            }
        }
    }

    /// The SQL type declaration for sp_executesql parameter lists.
    #[must_use]
    pub fn declaration(&self) -> String {
        let mut decl = format!("{} {}", self.name, sql_type_name(&self.meta));
        if self.flags.output {
            decl.push_str(" OUTPUT");
        }
        decl
    }
}

/// The SQL textual name of a column/parameter type, with its length,
/// precision and scale spelled out.
#[must_use]
pub fn sql_type_name(meta: &ColumnMeta) -> String {
    match meta.type_id {
        TypeId::IntN => match meta.max_length {
            1 => "tinyint".to_string(),
            2 => "smallint".to_string(),
            8 => "bigint".to_string(),
            _ => "int".to_string(),
        },
        TypeId::BitN => "bit".to_string(),
        TypeId::FloatN => match meta.max_length {
            4 => "real".to_string(),
            _ => "float".to_string(),
        },
        TypeId::MoneyN => match meta.max_length {
            4 => "smallmoney".to_string(),
            _ => "money".to_string(),
        },
        TypeId::DateTimeN => match meta.max_length {
            4 => "smalldatetime".to_string(),
            _ => "datetime".to_string(),
        },
        TypeId::NVarChar => {
            if meta.max_length == MAX_SENTINEL {
                "nvarchar(max)".to_string()
            } else {
                format!("nvarchar({})", (meta.max_length / 2).max(1))
            }
        }
        TypeId::BigVarChar => {
            if meta.max_length == MAX_SENTINEL {
                "varchar(max)".to_string()
            } else {
                format!("varchar({})", meta.max_length.max(1))
            }
        }
        TypeId::BigVarBinary => {
            if meta.max_length == MAX_SENTINEL {
                "varbinary(max)".to_string()
            } else {
                format!("varbinary({})", meta.max_length.max(1))
            }
        }
        TypeId::Guid => "uniqueidentifier".to_string(),
        TypeId::Date => "date".to_string(),
        TypeId::Time => format!("time({})", meta.scale),
        TypeId::DateTime2 => format!("datetime2({})", meta.scale),
        TypeId::DateTimeOffset => format!("datetimeoffset({})", meta.scale),
        TypeId::DecimalN | TypeId::NumericN => {
            format!("decimal({}, {})", meta.precision, meta.scale)
        }
        TypeId::Xml => "xml".to_string(),
        TypeId::Udt => meta
            .clr_type_name
            .clone()
            .unwrap_or_else(|| "hierarchyid".to_string()),
        TypeId::Text => "text".to_string(),
        TypeId::NText => "ntext".to_string(),
        TypeId::Image => "image".to_string(),
        other => other.name().to_ascii_lowercase(),
    }
}

/// Builds an RPC request payload.
#[derive(Debug, Clone)]
pub struct RpcRequest {
    proc_name: Option<String>,
    proc_id: Option<ProcId>,
    /// Parameters in wire order.
    pub params: Vec<RpcParam>,
}

impl RpcRequest {
    /// Call a procedure by name.
    pub fn named(proc_name: impl Into<String>) -> Self {
        Self {
            proc_name: Some(proc_name.into()),
            proc_id: None,
            params: Vec::new(),
        }
    }

    /// Call a well-known procedure by id.
    #[must_use]
    pub fn by_id(proc_id: ProcId) -> Self {
        Self {
            proc_name: None,
            proc_id: Some(proc_id),
            params: Vec::new(),
        }
    }

    /// Build an sp_executesql request for a parameterized query.
    ///
    /// The first parameter is the statement, the second the parameter
    /// declaration list, then the values themselves.
    pub fn execute_sql(sql: &str, params: Vec<RpcParam>) -> Self {
        let mut request = Self::by_id(ProcId::ExecuteSql);
        request.params.push(RpcParam::nvarchar("", sql));

        if !params.is_empty() {
            let declarations = params
                .iter()
                .map(RpcParam::declaration)
                .collect::<Vec<_>>()
                .join(", ");
            request.params.push(RpcParam::nvarchar("", &declarations));
            request.params.extend(params);
        }

        request
    }

    /// Append a parameter.
    #[must_use]
    pub fn param(mut self, param: RpcParam) -> Self {
        self.params.push(param);
        self
    }

    /// Encode the request payload with the current transaction descriptor.
    #[must_use]
    pub fn encode(&self, transaction_descriptor: u64) -> Bytes {
        let mut buf = BytesMut::with_capacity(256);

        write_all_headers(&mut buf, transaction_descriptor);

        if let Some(proc_id) = self.proc_id {
            buf.put_u16_le(0xFFFF); // name length 0xFFFF selects PROCID form
            buf.put_u16_le(proc_id as u16);
        } else if let Some(ref name) = self.proc_name {
            buf.put_u16_le(name.encode_utf16().count() as u16);
            write_utf16(&mut buf, name);
        }

        buf.put_u16_le(0); // option flags

        for param in &self.params {
            param.encode(&mut buf);
        }

        buf.freeze()
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn int_param_body() {
        let mut buf = BytesMut::new();
        RpcParam::int("@n", 42).encode(&mut buf);

        // name: 2 chars
        assert_eq!(buf[0], 2);
        // UTF-16 "@n"
        assert_eq!(&buf[1..5], &[b'@', 0, b'n', 0]);
        // flags
        assert_eq!(buf[5], 0);
        // INTN, max length 4
        assert_eq!(buf[6], TypeId::IntN as u8);
        assert_eq!(buf[7], 4);
        // value: length 4, LE 42
        assert_eq!(buf[8], 4);
        assert_eq!(&buf[9..13], &42i32.to_le_bytes());
    }

    #[test]
    fn null_nvarchar_uses_len_sentinel() {
        let meta = ColumnMeta::new("", TypeId::NVarChar)
            .with_max_length(40)
            .with_collation(crate::collation::Collation::latin1_general_ci_as());
        let mut buf = BytesMut::new();
        RpcParam::null("@s", meta).encode(&mut buf);
        assert_eq!(&buf[buf.len() - 2..], &[0xFF, 0xFF]);
    }

    #[test]
    fn null_max_uses_plp_sentinel() {
        let meta = ColumnMeta::new("", TypeId::NVarChar)
            .with_max_length(MAX_SENTINEL)
            .with_collation(crate::collation::Collation::latin1_general_ci_as());
        let mut buf = BytesMut::new();
        RpcParam::null("@s", meta).encode(&mut buf);
        assert_eq!(&buf[buf.len() - 8..], &[0xFF; 8]);
    }

    #[test]
    fn plp_body_is_chunked_and_terminated() {
        let param = RpcParam::new(
            "@x",
            ColumnMeta::new("", TypeId::Xml),
            Bytes::from_static(&[0x3C, 0x00, 0x61, 0x00]),
        );
        let mut buf = BytesMut::new();
        param.encode(&mut buf);

        let tail = &buf[buf.len() - 20..];
        // total length
        assert_eq!(&tail[0..8], &4u64.to_le_bytes());
        // one chunk of 4
        assert_eq!(&tail[8..12], &4u32.to_le_bytes());
        assert_eq!(&tail[12..16], &[0x3C, 0x00, 0x61, 0x00]);
        // terminator
        assert_eq!(&tail[16..20], &[0; 4]);
    }

    #[test]
    fn execute_sql_shape() {
        let rpc = RpcRequest::execute_sql(
            "SELECT @n * 2",
            vec![RpcParam::int("@n", 42)],
        );
        // statement + declarations + value
        assert_eq!(rpc.params.len(), 3);

        let encoded = rpc.encode(0);
        // ALL_HEADERS, then PROCID form for sp_executesql.
        assert_eq!(&encoded[22..24], &[0xFF, 0xFF]);
        assert_eq!(&encoded[24..26], &(ProcId::ExecuteSql as u16).to_le_bytes());
    }

    #[test]
    fn declarations() {
        assert_eq!(RpcParam::int("@a", 1).declaration(), "@a int");
        assert_eq!(RpcParam::bigint("@b", 1).declaration(), "@b bigint");
        assert_eq!(
            RpcParam::int("@c", 1).as_output().declaration(),
            "@c int OUTPUT"
        );
        assert_eq!(RpcParam::nvarchar("@s", "hi").declaration(), "@s nvarchar(2)");

        let decimal = RpcParam::null(
            "@d",
            ColumnMeta::new("", TypeId::DecimalN).with_precision_scale(38, 10),
        );
        assert_eq!(decimal.declaration(), "@d decimal(38, 10)");
    }

    #[test]
    fn text_param_layout() {
        let param = RpcParam::text("@t", Bytes::from_static(b"hello"));
        let mut buf = BytesMut::new();
        param.encode(&mut buf);

        // name "@t" (1 + 4 bytes) + flags (1), then the type descriptor.
        assert_eq!(buf[6], TypeId::Text as u8);
        // 4-byte max-length sentinel, then the 5-byte collation.
        assert_eq!(&buf[7..11], &0x7FFF_FFFFu32.to_le_bytes());
        let mut coll = BytesMut::new();
        crate::collation::Collation::latin1_general_ci_as().encode(&mut coll);
        assert_eq!(&buf[11..16], &coll[..]);
        // 4-byte length, then the body.
        assert_eq!(&buf[16..20], &5u32.to_le_bytes());
        assert_eq!(&buf[20..], b"hello");
    }

    #[test]
    fn ntext_param_layout() {
        let param = RpcParam::ntext("@n", "ab");
        let mut buf = BytesMut::new();
        param.encode(&mut buf);

        assert_eq!(buf[6], TypeId::NText as u8);
        assert_eq!(&buf[7..11], &0x7FFF_FFFFu32.to_le_bytes());
        // Collation, then the UTF-16LE body behind its 4-byte length.
        assert_eq!(&buf[16..20], &4u32.to_le_bytes());
        assert_eq!(&buf[20..], &[0x61, 0x00, 0x62, 0x00]);
    }

    #[test]
    fn image_param_layout() {
        let param = RpcParam::image("@i", Bytes::from_static(&[0xAB, 0xCD]));
        let mut buf = BytesMut::new();
        param.encode(&mut buf);

        assert_eq!(buf[6], TypeId::Image as u8);
        // No collation on IMAGE: the length follows the sentinel directly.
        assert_eq!(&buf[7..11], &0x7FFF_FFFFu32.to_le_bytes());
        assert_eq!(&buf[11..15], &2u32.to_le_bytes());
        assert_eq!(&buf[15..], &[0xAB, 0xCD]);
    }

    #[test]
    fn null_legacy_lob_uses_length_sentinel() {
        let meta = ColumnMeta::new("", TypeId::Image).with_max_length(0x7FFF_FFFF);
        let mut buf = BytesMut::new();
        RpcParam::null("@i", meta).encode(&mut buf);
        assert_eq!(&buf[buf.len() - 4..], &[0xFF; 4]);
    }

    #[test]
    fn udt_param_writes_name_triple() {
        let meta = ColumnMeta {
            clr_type_name: Some("HIERARCHYID".to_string()),
            ..ColumnMeta::new("", TypeId::Udt).with_max_length(MAX_SENTINEL)
        };
        let param = RpcParam::new("@h", meta, Bytes::from_static(&[0x58]));
        let mut buf = BytesMut::new();
        param.encode(&mut buf);

        // "sys" appears as the schema name in UTF-16LE.
        let needle: Vec<u8> = "sys".encode_utf16().flat_map(|u| u.to_le_bytes()).collect();
        assert!(
            buf.windows(needle.len()).any(|w| w == needle),
            "schema name missing from {buf:02X?}"
        );
    }
}
