//! Result rows and column access.

use std::sync::Arc;

use tdslink_protocol::{ColumnMeta, RawValue};
use tdslink_types::{FromSql, SqlValue, decode_value};

use crate::error::{Error, Result};

/// One result row.
///
/// A row holds the raw wire slices of its values; decoding happens on
/// access, guided by the column metadata shared across the result set.
#[derive(Debug, Clone)]
pub struct Row {
    columns: Arc<Vec<ColumnMeta>>,
    values: Vec<RawValue>,
}

impl Row {
    pub(crate) fn new(columns: Arc<Vec<ColumnMeta>>, values: Vec<RawValue>) -> Self {
        Self { columns, values }
    }

    /// Column metadata for this row.
    #[must_use]
    pub fn columns(&self) -> &[ColumnMeta] {
        &self.columns
    }

    /// Number of columns.
    #[must_use]
    pub fn len(&self) -> usize {
        self.values.len()
    }

    /// Whether the row has no columns.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    /// Whether the value at `index` is NULL.
    #[must_use]
    pub fn is_null(&self, index: usize) -> bool {
        self.values.get(index).is_none_or(|v| v.is_null)
    }

    /// Decode the value at `index` into its dynamic representation.
    pub fn value(&self, index: usize) -> Result<SqlValue> {
        let column = self
            .columns
            .get(index)
            .ok_or_else(|| Error::Config(format!("column index {index} out of range")))?;
        let raw = &self.values[index];
        Ok(decode_value(column, raw)?)
    }

    /// Decode the value at `index` into a concrete Rust type.
    pub fn get<T: FromSql>(&self, index: usize) -> Result<T> {
        Ok(T::from_sql(self.value(index)?)?)
    }

    /// Decode a value by column name (case-insensitive).
    pub fn get_by_name<T: FromSql>(&self, name: &str) -> Result<T> {
        let index = self
            .columns
            .iter()
            .position(|c| c.name.eq_ignore_ascii_case(name))
            .ok_or_else(|| Error::Config(format!("no column named \"{name}\"")))?;
        self.get(index)
    }

    /// Decode the value at `index`, returning `None` on NULL or mismatch.
    #[must_use]
    pub fn try_get<T: FromSql>(&self, index: usize) -> Option<T> {
        self.value(index).ok().and_then(|v| T::from_sql(v).ok())
    }
}

/// An output parameter returned by an RPC call.
#[derive(Debug, Clone)]
pub struct OutputParam {
    /// Parameter ordinal as sent in the request.
    pub ordinal: u16,
    /// Parameter name, if the server echoed one.
    pub name: String,
    /// The value.
    pub value: SqlValue,
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use bytes::Bytes;
    use tdslink_protocol::TypeId;

    fn test_row() -> Row {
        let columns = Arc::new(vec![
            ColumnMeta::new("id", TypeId::IntN).with_max_length(4),
            ColumnMeta::new("name", TypeId::NVarChar).with_max_length(20),
        ]);
        let values = vec![
            RawValue::new(Bytes::copy_from_slice(&7i32.to_le_bytes())),
            RawValue::null(),
        ];
        Row::new(columns, values)
    }

    #[test]
    fn typed_access() {
        let row = test_row();
        assert_eq!(row.get::<i32>(0).unwrap(), 7);
        assert_eq!(row.get::<Option<String>>(1).unwrap(), None);
        assert!(row.is_null(1));
        assert!(!row.is_null(0));
    }

    #[test]
    fn access_by_name_is_case_insensitive() {
        let row = test_row();
        assert_eq!(row.get_by_name::<i32>("ID").unwrap(), 7);
        assert!(row.get_by_name::<i32>("missing").is_err());
    }

    #[test]
    fn out_of_range_index() {
        let row = test_row();
        assert!(row.value(5).is_err());
    }
}
