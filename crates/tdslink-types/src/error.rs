//! Value conversion error types.

use thiserror::Error;

/// Errors raised while converting between logical values and their wire
/// representation.
#[derive(Debug, Error)]
pub enum TypeError {
    /// A NULL arrived where a non-null value was required.
    #[error("unexpected null value")]
    UnexpectedNull,

    /// The value's logical type does not match the requested one.
    #[error("type mismatch: expected {expected}, got {actual}")]
    TypeMismatch {
        /// Expected type name.
        expected: &'static str,
        /// Actual type name.
        actual: &'static str,
    },

    /// A numeric value does not fit the target column.
    #[error("value out of range for column \"{column}\" ({type_name})")]
    OutOfRange {
        /// Target column name.
        column: String,
        /// Target SQL type name.
        type_name: &'static str,
    },

    /// A string value is longer than the target column allows.
    #[error("string too long for column \"{column}\": {length} > {max}")]
    StringTooLong {
        /// Target column name.
        column: String,
        /// Value length in bytes.
        length: usize,
        /// Column maximum in bytes.
        max: usize,
    },

    /// A conversion between these types is not defined.
    #[error("cannot convert {from} to {to} for column \"{column}\"")]
    UnsupportedConversion {
        /// Source type name.
        from: &'static str,
        /// Target SQL type name.
        to: &'static str,
        /// Target column name.
        column: String,
    },

    /// Text bytes were not valid in their declared encoding.
    #[error("invalid string encoding: {0}")]
    InvalidEncoding(String),

    /// The code page is not one this codec can convert.
    #[error("unknown code page {0}")]
    UnknownCodePage(u16),

    /// A wire value had an impossible shape for its type.
    #[error("invalid binary value: {0}")]
    InvalidBinary(String),

    /// A temporal wire value was out of its calendar range.
    #[error("invalid date/time: {0}")]
    InvalidDateTime(String),

    /// A decimal value could not be represented.
    #[error("invalid decimal: {0}")]
    InvalidDecimal(String),

    /// The wire slice ended before the value did.
    #[error("value truncated: need {needed} bytes, have {have}")]
    Truncated {
        /// Bytes required.
        needed: usize,
        /// Bytes available.
        have: usize,
    },
}

impl TypeError {
    pub(crate) fn out_of_range(column: &str, type_name: &'static str) -> Self {
        Self::OutOfRange {
            column: column.to_string(),
            type_name,
        }
    }

    pub(crate) fn unsupported(from: &'static str, to: &'static str, column: &str) -> Self {
        Self::UnsupportedConversion {
            from,
            to,
            column: column.to_string(),
        }
    }
}
