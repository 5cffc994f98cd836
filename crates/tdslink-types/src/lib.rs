//! # tdslink-types
//!
//! The value codec: bidirectional conversion between the dynamic
//! [`SqlValue`] union and the TDS wire representation of every SQL Server
//! data type, including decimal rescale arithmetic, code-page conversion
//! for narrow character columns and the bulk-copy cell encodings.
//!
//! ## Type mappings
//!
//! | SQL Server type | Rust type |
//! |-----------------|-----------|
//! | `BIT` | `bool` |
//! | `TINYINT` | `u8` |
//! | `SMALLINT` | `i16` |
//! | `INT` | `i32` |
//! | `BIGINT` | `i64` |
//! | `REAL` | `f32` |
//! | `FLOAT` | `f64` |
//! | `DECIMAL`/`NUMERIC`/`MONEY` | `rust_decimal::Decimal` |
//! | character types | `String` |
//! | binary types | `bytes::Bytes` |
//! | `UNIQUEIDENTIFIER` | `uuid::Uuid` |
//! | `DATE`/`TIME`/`DATETIME2` | `chrono` naive types |
//! | `DATETIMEOFFSET` | `chrono::DateTime<FixedOffset>` |

#![warn(missing_docs)]
#![deny(unsafe_code)]

pub mod codepage;
pub mod decode;
pub mod encode;
pub mod error;
pub mod from_sql;
pub mod numeric;
pub mod to_sql;
pub mod value;

pub use decode::{decode_utf16, decode_value};
pub use encode::{encode_bcp_cell, to_param};
pub use error::TypeError;
pub use from_sql::FromSql;
pub use to_sql::ToSql;
pub use value::SqlValue;
