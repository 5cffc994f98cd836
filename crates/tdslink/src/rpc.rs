//! The RPC (stored procedure) executor.

use tdslink_protocol::packet::PacketType;
use tdslink_protocol::{ColumnMeta, RpcRequest};
use tdslink_types::{SqlValue, ToSql, to_param};

use crate::error::Result;
use crate::row::{OutputParam, Row};
use crate::session::{SqlSession, StatementCore};

impl SqlSession {
    /// Invoke a stored procedure.
    ///
    /// RETURNVALUE tokens populate the output-parameter slots keyed by
    /// ordinal; the procedure's return status is available once the
    /// statement has drained.
    pub async fn rpc(&mut self, request: RpcRequest) -> Result<Rpc<'_>> {
        let payload = request.encode(self.context.trans_id());
        self.send_request(PacketType::Rpc, payload).await?;
        Ok(Rpc {
            sess: self,
            core: StatementCore::new(),
        })
    }

    /// Run a parameterized query through `sp_executesql`.
    ///
    /// Parameters are numbered `@p1`, `@p2`, ... in order.
    pub async fn query(
        &mut self,
        sql: &str,
        params: &[&(dyn ToSql + Sync)],
    ) -> Result<Rpc<'_>> {
        let mut rpc_params = Vec::with_capacity(params.len());
        for (i, param) in params.iter().enumerate() {
            let value = param.to_sql();
            rpc_params.push(to_param(&format!("@p{}", i + 1), &value)?);
        }
        self.rpc(RpcRequest::execute_sql(sql, rpc_params)).await
    }
}

/// A running RPC call.
pub struct Rpc<'a> {
    sess: &'a mut SqlSession,
    core: StatementCore,
}

impl Rpc<'_> {
    /// Fetch the next result row.
    pub async fn next_row(&mut self) -> Result<Option<Row>> {
        self.sess.advance(&mut self.core).await
    }

    /// Collect all rows, leaving return status and output parameters
    /// available.
    pub async fn fetch_all(&mut self) -> Result<Vec<Row>> {
        let mut rows = Vec::new();
        while let Some(row) = self.next_row().await? {
            rows.push(row);
        }
        Ok(rows)
    }

    /// Column metadata of the current result set.
    #[must_use]
    pub fn columns(&self) -> Option<&[ColumnMeta]> {
        self.core.columns().map(|cols| cols.as_slice())
    }

    /// The procedure's RETURNSTATUS, once the statement has drained.
    #[must_use]
    pub fn return_status(&self) -> Option<i32> {
        self.core.return_status
    }

    /// Output parameters received so far, in server order.
    #[must_use]
    pub fn outputs(&self) -> &[OutputParam] {
        &self.core.outputs
    }

    /// Look up an output parameter by its request ordinal.
    #[must_use]
    pub fn output(&self, ordinal: u16) -> Option<&SqlValue> {
        self.core
            .outputs
            .iter()
            .find(|o| o.ordinal == ordinal)
            .map(|o| &o.value)
    }

    /// Whether the call has fully completed.
    #[must_use]
    pub fn is_finished(&self) -> bool {
        self.core.finished
    }

    /// Cancel the call via an attention signal.
    pub async fn cancel(mut self) -> Result<()> {
        self.sess.cancel_statement(&mut self.core).await
    }

    /// Finish the call, cancelling it if results remain.
    pub async fn close(mut self) -> Result<()> {
        if self.core.finished {
            return Ok(());
        }
        self.sess.cancel_statement(&mut self.core).await
    }
}

impl Drop for Rpc<'_> {
    fn drop(&mut self) {
        self.sess.park(std::mem::take(&mut self.core));
    }
}
