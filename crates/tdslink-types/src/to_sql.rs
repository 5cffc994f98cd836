//! Conversion from Rust types into [`SqlValue`] parameters.

use bytes::Bytes;
use chrono::{DateTime, FixedOffset, NaiveDate, NaiveDateTime, NaiveTime};
use rust_decimal::Decimal;
use uuid::Uuid;

use crate::value::SqlValue;

/// Turn a Rust value into a [`SqlValue`] for use as a statement parameter.
pub trait ToSql {
    /// Produce the SQL value.
    fn to_sql(&self) -> SqlValue;
}

macro_rules! forward_to_sql {
    ($($ty:ty),* $(,)?) => {
        $(
            impl ToSql for $ty {
                fn to_sql(&self) -> SqlValue {
                    SqlValue::from(self.clone())
                }
            }
        )*
    };
}

forward_to_sql!(
    bool,
    u8,
    i16,
    i32,
    i64,
    f32,
    f64,
    Decimal,
    String,
    Bytes,
    Uuid,
    NaiveDate,
    NaiveTime,
    NaiveDateTime,
    DateTime<FixedOffset>,
);

impl ToSql for &str {
    fn to_sql(&self) -> SqlValue {
        SqlValue::String((*self).to_string())
    }
}

impl ToSql for SqlValue {
    fn to_sql(&self) -> SqlValue {
        self.clone()
    }
}

impl<T: ToSql> ToSql for Option<T> {
    fn to_sql(&self) -> SqlValue {
        match self {
            Some(v) => v.to_sql(),
            None => SqlValue::Null,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn scalars() {
        assert_eq!(42i32.to_sql(), SqlValue::Int(42));
        assert_eq!("x".to_sql(), SqlValue::String("x".to_string()));
        assert_eq!(true.to_sql(), SqlValue::Bit(true));
    }

    #[test]
    fn options() {
        assert_eq!(None::<i32>.to_sql(), SqlValue::Null);
        assert_eq!(Some(1i32).to_sql(), SqlValue::Int(1));
    }
}
