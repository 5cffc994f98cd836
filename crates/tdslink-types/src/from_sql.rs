//! Conversion from [`SqlValue`] into Rust types.

use bytes::Bytes;
use chrono::{DateTime, FixedOffset, NaiveDate, NaiveDateTime, NaiveTime};
use rust_decimal::Decimal;
use uuid::Uuid;

use crate::error::TypeError;
use crate::value::SqlValue;

/// Extract a typed Rust value from a [`SqlValue`].
pub trait FromSql: Sized {
    /// Convert, failing on NULL or a type mismatch.
    fn from_sql(value: SqlValue) -> Result<Self, TypeError>;
}

fn mismatch<T>(expected: &'static str, value: &SqlValue) -> Result<T, TypeError> {
    if value.is_null() {
        Err(TypeError::UnexpectedNull)
    } else {
        Err(TypeError::TypeMismatch {
            expected,
            actual: value.type_name(),
        })
    }
}

impl FromSql for bool {
    fn from_sql(value: SqlValue) -> Result<Self, TypeError> {
        match value {
            SqlValue::Bit(v) => Ok(v),
            other => mismatch("BIT", &other),
        }
    }
}

impl FromSql for u8 {
    fn from_sql(value: SqlValue) -> Result<Self, TypeError> {
        match value {
            SqlValue::TinyInt(v) => Ok(v),
            other => mismatch("TINYINT", &other),
        }
    }
}

impl FromSql for i16 {
    fn from_sql(value: SqlValue) -> Result<Self, TypeError> {
        match value {
            SqlValue::SmallInt(v) => Ok(v),
            SqlValue::TinyInt(v) => Ok(i16::from(v)),
            other => mismatch("SMALLINT", &other),
        }
    }
}

impl FromSql for i32 {
    fn from_sql(value: SqlValue) -> Result<Self, TypeError> {
        value
            .as_i32()
            .map_or_else(|| mismatch("INT", &value), Ok)
    }
}

impl FromSql for i64 {
    fn from_sql(value: SqlValue) -> Result<Self, TypeError> {
        value
            .as_i64()
            .map_or_else(|| mismatch("BIGINT", &value), Ok)
    }
}

impl FromSql for f32 {
    fn from_sql(value: SqlValue) -> Result<Self, TypeError> {
        match value {
            SqlValue::Real(v) => Ok(v),
            other => mismatch("REAL", &other),
        }
    }
}

impl FromSql for f64 {
    fn from_sql(value: SqlValue) -> Result<Self, TypeError> {
        value
            .as_f64()
            .map_or_else(|| mismatch("FLOAT", &value), Ok)
    }
}

impl FromSql for String {
    fn from_sql(value: SqlValue) -> Result<Self, TypeError> {
        match value {
            SqlValue::String(v) | SqlValue::Xml(v) => Ok(v),
            other => mismatch("NVARCHAR", &other),
        }
    }
}

impl FromSql for Bytes {
    fn from_sql(value: SqlValue) -> Result<Self, TypeError> {
        match value {
            SqlValue::Binary(v) => Ok(v),
            other => mismatch("VARBINARY", &other),
        }
    }
}

impl FromSql for Decimal {
    fn from_sql(value: SqlValue) -> Result<Self, TypeError> {
        match value {
            SqlValue::Decimal(v) => Ok(v),
            other => mismatch("DECIMAL", &other),
        }
    }
}

impl FromSql for Uuid {
    fn from_sql(value: SqlValue) -> Result<Self, TypeError> {
        match value {
            SqlValue::Uuid(v) => Ok(v),
            other => mismatch("UNIQUEIDENTIFIER", &other),
        }
    }
}

impl FromSql for NaiveDate {
    fn from_sql(value: SqlValue) -> Result<Self, TypeError> {
        match value {
            SqlValue::Date(v) => Ok(v),
            SqlValue::DateTime(v) => Ok(v.date()),
            other => mismatch("DATE", &other),
        }
    }
}

impl FromSql for NaiveTime {
    fn from_sql(value: SqlValue) -> Result<Self, TypeError> {
        match value {
            SqlValue::Time(v) => Ok(v),
            SqlValue::DateTime(v) => Ok(v.time()),
            other => mismatch("TIME", &other),
        }
    }
}

impl FromSql for NaiveDateTime {
    fn from_sql(value: SqlValue) -> Result<Self, TypeError> {
        match value {
            SqlValue::DateTime(v) => Ok(v),
            other => mismatch("DATETIME2", &other),
        }
    }
}

impl FromSql for DateTime<FixedOffset> {
    fn from_sql(value: SqlValue) -> Result<Self, TypeError> {
        match value {
            SqlValue::DateTimeOffset(v) => Ok(v),
            other => mismatch("DATETIMEOFFSET", &other),
        }
    }
}

impl<T: FromSql> FromSql for Option<T> {
    fn from_sql(value: SqlValue) -> Result<Self, TypeError> {
        if value.is_null() {
            Ok(None)
        } else {
            T::from_sql(value).map(Some)
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn integers_widen() {
        assert_eq!(i64::from_sql(SqlValue::Int(5)).unwrap(), 5);
        assert_eq!(i32::from_sql(SqlValue::TinyInt(5)).unwrap(), 5);
    }

    #[test]
    fn null_into_option() {
        assert_eq!(Option::<i32>::from_sql(SqlValue::Null).unwrap(), None);
        assert_eq!(
            Option::<i32>::from_sql(SqlValue::Int(1)).unwrap(),
            Some(1)
        );
    }

    #[test]
    fn null_into_scalar_fails() {
        assert!(matches!(
            i32::from_sql(SqlValue::Null),
            Err(TypeError::UnexpectedNull)
        ));
    }

    #[test]
    fn mismatch_reports_both_types() {
        let err = String::from_sql(SqlValue::Int(1)).unwrap_err();
        assert!(err.to_string().contains("NVARCHAR"));
        assert!(err.to_string().contains("INT"));
    }
}
