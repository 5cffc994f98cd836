//! SQL Server wire type identifiers and their width rules.

use crate::error::ProtocolError;

/// TDS data type identifiers as they appear in column metadata and
/// parameter descriptors.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum TypeId {
    /// NULL placeholder type.
    Null = 0x1F,
    /// TINYINT, 1 byte.
    TinyInt = 0x30,
    /// BIT, 1 byte.
    Bit = 0x32,
    /// SMALLINT, 2 bytes.
    SmallInt = 0x34,
    /// INT, 4 bytes.
    Int = 0x38,
    /// SMALLDATETIME, 4 bytes (day count + minutes).
    SmallDateTime = 0x3A,
    /// REAL, 4 bytes.
    Real = 0x3B,
    /// MONEY, 8 bytes (two dwords, high first).
    Money = 0x3C,
    /// DATETIME, 8 bytes (day count + 1/300s ticks).
    DateTime = 0x3D,
    /// FLOAT, 8 bytes.
    Float = 0x3E,
    /// SMALLMONEY, 4 bytes.
    SmallMoney = 0x7A,
    /// BIGINT, 8 bytes.
    BigInt = 0x7F,

    /// UNIQUEIDENTIFIER, length-prefixed 16 bytes.
    Guid = 0x24,
    /// Nullable integer, 1-byte length then 1/2/4/8 bytes.
    IntN = 0x26,
    /// Nullable bit, 1-byte length then 1 byte.
    BitN = 0x68,
    /// DECIMAL, length-prefixed sign + magnitude.
    DecimalN = 0x6A,
    /// NUMERIC, identical encoding to DECIMAL.
    NumericN = 0x6C,
    /// Nullable float, 1-byte length then 4/8 bytes.
    FloatN = 0x6D,
    /// Nullable money, 1-byte length then 4/8 bytes.
    MoneyN = 0x6E,
    /// Nullable datetime, 1-byte length then 4/8 bytes.
    DateTimeN = 0x6F,

    /// DATE, length-prefixed 3-byte day number.
    Date = 0x28,
    /// TIME with scale, length-prefixed scaled ticks.
    Time = 0x29,
    /// DATETIME2 with scale, ticks then 3-byte day number.
    DateTime2 = 0x2A,
    /// DATETIMEOFFSET, DATETIME2 plus 2-byte minute offset.
    DateTimeOffset = 0x2B,

    /// VARBINARY, 2-byte length (or PLP when MAX).
    BigVarBinary = 0xA5,
    /// VARCHAR, 2-byte length (or PLP when MAX), code-page bytes.
    BigVarChar = 0xA7,
    /// BINARY, 2-byte length.
    BigBinary = 0xAD,
    /// CHAR, 2-byte length, code-page bytes.
    BigChar = 0xAF,
    /// NVARCHAR, 2-byte length (or PLP when MAX), UTF-16LE.
    NVarChar = 0xE7,
    /// NCHAR, 2-byte length, UTF-16LE.
    NChar = 0xEF,

    /// IMAGE (legacy LOB), text-pointer framed.
    Image = 0x22,
    /// TEXT (legacy LOB), text-pointer framed, code-page bytes.
    Text = 0x23,
    /// NTEXT (legacy LOB), text-pointer framed, UTF-16LE.
    NText = 0x63,

    /// CLR user-defined type, wire-compatible with VARBINARY(MAX).
    Udt = 0xF0,
    /// XML, wire-compatible with NVARCHAR(MAX).
    Xml = 0xF1,
}

/// Sentinel max-length meaning a `(MAX)` variable-length column.
pub const MAX_SENTINEL: u32 = 0xFFFF;

/// PLP null marker (8 bytes of 0xFF).
pub const PLP_NULL: u64 = 0xFFFF_FFFF_FFFF_FFFF;

/// PLP "unknown total length" marker.
pub const PLP_UNKNOWN_LEN: u64 = 0xFFFF_FFFF_FFFF_FFFE;

impl TypeId {
    /// Parse a type id from its wire byte.
    pub fn from_u8(value: u8) -> Result<Self, ProtocolError> {
        match value {
            0x1F => Ok(Self::Null),
            0x30 => Ok(Self::TinyInt),
            0x32 => Ok(Self::Bit),
            0x34 => Ok(Self::SmallInt),
            0x38 => Ok(Self::Int),
            0x3A => Ok(Self::SmallDateTime),
            0x3B => Ok(Self::Real),
            0x3C => Ok(Self::Money),
            0x3D => Ok(Self::DateTime),
            0x3E => Ok(Self::Float),
            0x7A => Ok(Self::SmallMoney),
            0x7F => Ok(Self::BigInt),
            0x24 => Ok(Self::Guid),
            0x26 => Ok(Self::IntN),
            0x68 => Ok(Self::BitN),
            0x6A => Ok(Self::DecimalN),
            0x6C => Ok(Self::NumericN),
            0x6D => Ok(Self::FloatN),
            0x6E => Ok(Self::MoneyN),
            0x6F => Ok(Self::DateTimeN),
            0x28 => Ok(Self::Date),
            0x29 => Ok(Self::Time),
            0x2A => Ok(Self::DateTime2),
            0x2B => Ok(Self::DateTimeOffset),
            0xA5 => Ok(Self::BigVarBinary),
            0xA7 => Ok(Self::BigVarChar),
            0xAD => Ok(Self::BigBinary),
            0xAF => Ok(Self::BigChar),
            0xE7 => Ok(Self::NVarChar),
            0xEF => Ok(Self::NChar),
            0x22 => Ok(Self::Image),
            0x23 => Ok(Self::Text),
            0x63 => Ok(Self::NText),
            0xF0 => Ok(Self::Udt),
            0xF1 => Ok(Self::Xml),
            _ => Err(ProtocolError::UnknownType(value)),
        }
    }

    /// The on-wire size of a fixed-width scalar, if this is one.
    ///
    /// Fixed scalars carry no length byte and can never be null in a row.
    #[must_use]
    pub const fn fixed_size(&self) -> Option<usize> {
        match self {
            Self::Null => Some(0),
            Self::TinyInt | Self::Bit => Some(1),
            Self::SmallInt => Some(2),
            Self::Int | Self::Real | Self::SmallMoney | Self::SmallDateTime => Some(4),
            Self::BigInt | Self::Float | Self::Money | Self::DateTime => Some(8),
            _ => None,
        }
    }

    /// Whether values of this type use a single length byte with a width
    /// restricted to a fixed set (INTN-style encoding).
    #[must_use]
    pub const fn is_byte_len(&self) -> bool {
        matches!(
            self,
            Self::Guid | Self::IntN | Self::BitN | Self::FloatN | Self::MoneyN | Self::DateTimeN
        )
    }

    /// Legal widths for a byte-length type, used to validate the wire.
    #[must_use]
    pub const fn allowed_widths(&self) -> &'static [usize] {
        match self {
            Self::IntN => &[1, 2, 4, 8],
            Self::FloatN | Self::MoneyN | Self::DateTimeN => &[4, 8],
            Self::BitN => &[1],
            Self::Guid => &[16],
            _ => &[],
        }
    }

    /// Whether this is a 2-byte-length variable type (string or binary).
    #[must_use]
    pub const fn is_short_len(&self) -> bool {
        matches!(
            self,
            Self::BigVarBinary
                | Self::BigVarChar
                | Self::BigBinary
                | Self::BigChar
                | Self::NVarChar
                | Self::NChar
        )
    }

    /// Whether this type stores UTF-16LE text on the wire.
    #[must_use]
    pub const fn is_wide_text(&self) -> bool {
        matches!(self, Self::NVarChar | Self::NChar | Self::NText | Self::Xml)
    }

    /// Whether this type stores code-page text on the wire.
    #[must_use]
    pub const fn is_narrow_text(&self) -> bool {
        matches!(self, Self::BigVarChar | Self::BigChar | Self::Text)
    }

    /// Whether this is a legacy text-pointer LOB type.
    #[must_use]
    pub const fn is_legacy_lob(&self) -> bool {
        matches!(self, Self::Text | Self::NText | Self::Image)
    }

    /// Whether column metadata for this type carries a collation.
    #[must_use]
    pub const fn has_collation(&self) -> bool {
        matches!(
            self,
            Self::BigVarChar | Self::BigChar | Self::NVarChar | Self::NChar | Self::Text | Self::NText
        )
    }

    /// Ticks field width for TIME / DATETIME2 / DATETIMEOFFSET at `scale`.
    #[must_use]
    pub const fn time_width(scale: u8) -> usize {
        match scale {
            0..=2 => 3,
            3..=4 => 4,
            _ => 5,
        }
    }

    /// Magnitude width for DECIMAL/NUMERIC at `precision`.
    #[must_use]
    pub const fn decimal_width(precision: u8) -> usize {
        if precision < 10 {
            4
        } else if precision < 20 {
            8
        } else if precision < 29 {
            12
        } else {
            16
        }
    }

    /// Human-readable SQL name for diagnostics.
    #[must_use]
    pub const fn name(&self) -> &'static str {
        match self {
            Self::Null => "NULL",
            Self::TinyInt => "TINYINT",
            Self::Bit => "BIT",
            Self::SmallInt => "SMALLINT",
            Self::Int => "INT",
            Self::SmallDateTime => "SMALLDATETIME",
            Self::Real => "REAL",
            Self::Money => "MONEY",
            Self::DateTime => "DATETIME",
            Self::Float => "FLOAT",
            Self::SmallMoney => "SMALLMONEY",
            Self::BigInt => "BIGINT",
            Self::Guid => "UNIQUEIDENTIFIER",
            Self::IntN => "INTN",
            Self::BitN => "BITN",
            Self::DecimalN => "DECIMAL",
            Self::NumericN => "NUMERIC",
            Self::FloatN => "FLTN",
            Self::MoneyN => "MONEYN",
            Self::DateTimeN => "DATETIMN",
            Self::Date => "DATE",
            Self::Time => "TIME",
            Self::DateTime2 => "DATETIME2",
            Self::DateTimeOffset => "DATETIMEOFFSET",
            Self::BigVarBinary => "VARBINARY",
            Self::BigVarChar => "VARCHAR",
            Self::BigBinary => "BINARY",
            Self::BigChar => "CHAR",
            Self::NVarChar => "NVARCHAR",
            Self::NChar => "NCHAR",
            Self::Image => "IMAGE",
            Self::Text => "TEXT",
            Self::NText => "NTEXT",
            Self::Udt => "UDT",
            Self::Xml => "XML",
        }
    }
}
