//! The ad-hoc SQL batch executor.

use tdslink_protocol::ColumnMeta;
use tdslink_protocol::packet::PacketType;
use tdslink_protocol::request::encode_sql_batch;

use crate::error::Result;
use crate::row::Row;
use crate::session::{SqlSession, StatementCore};

impl SqlSession {
    /// Send a SQL batch and stream its rows.
    ///
    /// The statement must be driven to completion with
    /// [`Batch::next_row`] or ended with [`Batch::close`]; dropping it
    /// mid-stream marks the session for cancellation, performed before the
    /// next request.
    pub async fn batch(&mut self, sql: &str) -> Result<Batch<'_>> {
        let payload = encode_sql_batch(sql, self.context.trans_id());
        self.send_request(PacketType::SqlBatch, payload).await?;
        Ok(Batch {
            sess: self,
            core: StatementCore::new(),
        })
    }

    /// Execute a statement, discard any rows and return the affected row
    /// count.
    pub async fn execute(&mut self, sql: &str) -> Result<u64> {
        let payload = encode_sql_batch(sql, self.context.trans_id());
        self.run_request(PacketType::SqlBatch, payload).await
    }
}

/// A running SQL batch.
pub struct Batch<'a> {
    sess: &'a mut SqlSession,
    core: StatementCore,
}

impl Batch<'_> {
    /// Fetch the next row, crossing result-set boundaries transparently.
    ///
    /// Returns `None` once the final DONE has been consumed. A server error
    /// (with no message handler installed) surfaces here after the stream
    /// has drained.
    pub async fn next_row(&mut self) -> Result<Option<Row>> {
        self.sess.advance(&mut self.core).await
    }

    /// Collect all remaining rows.
    pub async fn fetch_all(mut self) -> Result<Vec<Row>> {
        let mut rows = Vec::new();
        while let Some(row) = self.next_row().await? {
            rows.push(row);
        }
        Ok(rows)
    }

    /// Column metadata of the current result set, once the COLMETADATA
    /// token has been consumed.
    #[must_use]
    pub fn columns(&self) -> Option<&[ColumnMeta]> {
        self.core.columns().map(|cols| cols.as_slice())
    }

    /// Whether the statement has fully completed.
    #[must_use]
    pub fn is_finished(&self) -> bool {
        self.core.finished
    }

    /// The most recent valid row count.
    #[must_use]
    pub fn row_count(&self) -> Option<u64> {
        self.core.last_row_count
    }

    /// Cancel the statement: send an attention signal and drain until the
    /// server acknowledges it. Not an error from the caller's perspective.
    pub async fn cancel(mut self) -> Result<()> {
        self.sess.cancel_statement(&mut self.core).await
    }

    /// Finish the statement, cancelling it if rows remain.
    pub async fn close(mut self) -> Result<()> {
        if self.core.finished {
            return Ok(());
        }
        self.sess.cancel_statement(&mut self.core).await
    }
}

impl Drop for Batch<'_> {
    fn drop(&mut self) {
        // Cancellation needs async sends, so an unfinished statement is
        // parked on the session; the next operation sends the attention and
        // drains before proceeding.
        self.sess.park(std::mem::take(&mut self.core));
    }
}
