//! The bulk-copy (BCP) executor.
//!
//! A bulk insert first puts the server into bulk mode with an
//! `INSERT BULK` batch, then sends one bulk-load message: a COLMETADATA
//! token declaring the columns, a ROW token per row with BCP cell
//! encodings, and a trailing DONE.

use bytes::{BufMut, BytesMut};
use tdslink_protocol::packet::PacketType;
use tdslink_protocol::request::encode_sql_batch;
use tdslink_protocol::rpc::sql_type_name;
use tdslink_protocol::token::{Done, TokenType, done_status, write_colmetadata};
use tdslink_protocol::{ColumnMeta, MAX_SENTINEL, TypeId};
use tdslink_types::{SqlValue, encode_bcp_cell};

use crate::error::{Error, Result};
use crate::session::SqlSession;

impl SqlSession {
    /// Start a bulk insert into `table` with the given column declarations.
    ///
    /// Issues the `INSERT BULK` batch immediately; rows are buffered by
    /// [`BulkLoad::send_row`] and shipped by [`BulkLoad::finish`].
    pub async fn bulk_insert(
        &mut self,
        table: &str,
        columns: Vec<ColumnMeta>,
    ) -> Result<BulkLoad<'_>> {
        if columns.is_empty() {
            return Err(Error::Config("bulk insert needs at least one column".into()));
        }

        let wire_columns: Vec<ColumnMeta> = columns.into_iter().map(wire_column).collect();

        let declarations = wire_columns
            .iter()
            .map(|c| format!("[{}] {}", c.name, sql_type_name(c)))
            .collect::<Vec<_>>()
            .join(", ");
        let sql = format!("INSERT BULK {table} ({declarations}) WITH (TABLOCK)");

        tracing::debug!(table, "entering bulk mode");
        let payload = encode_sql_batch(&sql, self.context.trans_id());
        self.run_request(PacketType::SqlBatch, payload).await?;

        let mut buffer = BytesMut::new();
        write_colmetadata(&mut buffer, &wire_columns);

        Ok(BulkLoad {
            sess: self,
            columns: wire_columns,
            buffer,
            rows: 0,
        })
    }
}

/// Map a declared column to its bulk wire form: fixed scalars travel in
/// their nullable encodings, XML as NVARCHAR(MAX) and UDT as
/// VARBINARY(MAX).
fn wire_column(col: ColumnMeta) -> ColumnMeta {
    let (type_id, max_length) = match col.type_id {
        TypeId::TinyInt => (TypeId::IntN, 1),
        TypeId::SmallInt => (TypeId::IntN, 2),
        TypeId::Int => (TypeId::IntN, 4),
        TypeId::BigInt => (TypeId::IntN, 8),
        TypeId::Bit => (TypeId::BitN, 1),
        TypeId::Real => (TypeId::FloatN, 4),
        TypeId::Float => (TypeId::FloatN, 8),
        TypeId::SmallMoney => (TypeId::MoneyN, 4),
        TypeId::Money => (TypeId::MoneyN, 8),
        TypeId::SmallDateTime => (TypeId::DateTimeN, 4),
        TypeId::DateTime => (TypeId::DateTimeN, 8),
        TypeId::Xml => (TypeId::NVarChar, MAX_SENTINEL),
        TypeId::Udt => (TypeId::BigVarBinary, MAX_SENTINEL),
        other => (other, col.max_length),
    };

    ColumnMeta {
        type_id,
        max_length,
        ..col
    }
}

/// A bulk insert in progress.
pub struct BulkLoad<'a> {
    sess: &'a mut SqlSession,
    columns: Vec<ColumnMeta>,
    buffer: BytesMut,
    rows: u64,
}

impl BulkLoad<'_> {
    /// The wire column declarations.
    #[must_use]
    pub fn columns(&self) -> &[ColumnMeta] {
        &self.columns
    }

    /// Rows buffered so far.
    #[must_use]
    pub fn row_count(&self) -> u64 {
        self.rows
    }

    /// Append one row. Values are converted to each column's wire type;
    /// out-of-range values fail naming the column.
    pub fn send_row(&mut self, values: &[SqlValue]) -> Result<()> {
        if values.len() != self.columns.len() {
            return Err(Error::Config(format!(
                "row has {} values for {} columns",
                values.len(),
                self.columns.len()
            )));
        }

        self.buffer.put_u8(TokenType::Row as u8);
        for (col, value) in self.columns.iter().zip(values) {
            encode_bcp_cell(col, value, &mut self.buffer)?;
        }

        self.rows += 1;
        Ok(())
    }

    /// Terminate the row stream with a DONE token, send the bulk-load
    /// message and return the server's row count.
    pub async fn finish(mut self) -> Result<u64> {
        Done {
            status: done_status::COUNT,
            cur_cmd: 0,
            row_count: self.rows,
        }
        .encode(&mut self.buffer);

        tracing::debug!(rows = self.rows, "sending bulk-load message");

        let payload = self.buffer.split().freeze();
        self.sess.run_request(PacketType::BulkLoad, payload).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn wire_column_mapping() {
        let int = wire_column(ColumnMeta::new("n", TypeId::Int));
        assert_eq!(int.type_id, TypeId::IntN);
        assert_eq!(int.max_length, 4);

        let xml = wire_column(ColumnMeta::new("x", TypeId::Xml));
        assert_eq!(xml.type_id, TypeId::NVarChar);
        assert_eq!(xml.max_length, MAX_SENTINEL);

        let udt = wire_column(ColumnMeta::new("h", TypeId::Udt));
        assert_eq!(udt.type_id, TypeId::BigVarBinary);
        assert_eq!(udt.max_length, MAX_SENTINEL);

        let varchar = wire_column(ColumnMeta::new("s", TypeId::BigVarChar).with_max_length(50));
        assert_eq!(varchar.type_id, TypeId::BigVarChar);
        assert_eq!(varchar.max_length, 50);
    }
}
