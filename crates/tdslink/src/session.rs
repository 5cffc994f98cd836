//! Logical SQL sessions and the shared statement machinery.
//!
//! A [`SqlSession`] owns one request/response channel (the connection's
//! main session, or one MARS subchannel) and enforces the one-in-flight
//! rule: a statement drains to its final DONE, or is cancelled via
//! attention, before the next request goes out.

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use bytes::Bytes;
use tdslink_codec::Session;
use tdslink_protocol::packet::PacketType;
use tdslink_protocol::request::{
    IsolationLevel, encode_tm_begin, encode_tm_commit, encode_tm_rollback,
};
use tdslink_protocol::token::{EnvChange, ServerMessage, Token, TokenStream};
use tdslink_protocol::{Collation, ProtocolError};
use tdslink_types::decode_value;

use crate::config::{CountHandler, MessageHandler};
use crate::error::{Error, Result};
use crate::row::{OutputParam, Row};
use crate::transport::Transport;

/// Connection-global state every session shares.
///
/// ENVCHANGE tokens are applied here by whichever session consumes them,
/// before the next token is released, so any subsequently issued request
/// observes the new state.
pub(crate) struct ConnContext {
    /// Transaction descriptor for the ALL_HEADERS prefix; 0 outside a
    /// transaction.
    pub(crate) trans_id: AtomicU64,
    /// Current database, from ENVCHANGE.
    pub(crate) database: parking_lot::Mutex<Option<String>>,
    /// Connection collation, from ENVCHANGE.
    pub(crate) collation: parking_lot::Mutex<Option<Collation>>,
    pub(crate) message_handler: Option<MessageHandler>,
    pub(crate) count_handler: Option<CountHandler>,
    pub(crate) command_timeout: Option<Duration>,
}

impl ConnContext {
    pub(crate) fn new(
        message_handler: Option<MessageHandler>,
        count_handler: Option<CountHandler>,
        command_timeout: Option<Duration>,
    ) -> Self {
        Self {
            trans_id: AtomicU64::new(0),
            database: parking_lot::Mutex::new(None),
            collation: parking_lot::Mutex::new(None),
            message_handler,
            count_handler,
            command_timeout,
        }
    }

    pub(crate) fn trans_id(&self) -> u64 {
        self.trans_id.load(Ordering::Acquire)
    }
}

/// Per-statement parsing state.
///
/// Holds the incremental token stream plus everything observed on the way:
/// the first unhandled server error, the attention acknowledgment, return
/// status and output parameters.
#[derive(Default)]
pub(crate) struct StatementCore {
    reader: TokenStream,
    last_packet_seen: bool,
    pub(crate) finished: bool,
    pub(crate) attention_acked: bool,
    pub(crate) server_error: Option<ServerMessage>,
    pub(crate) return_status: Option<i32>,
    pub(crate) outputs: Vec<OutputParam>,
    pub(crate) last_row_count: Option<u64>,
}

impl StatementCore {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    /// Reset the token stream for the next server message, keeping the
    /// statement-level observations.
    fn next_message(&mut self) {
        self.reader = TokenStream::new();
        self.last_packet_seen = false;
    }

    pub(crate) fn columns(&self) -> Option<&Arc<Vec<tdslink_protocol::ColumnMeta>>> {
        self.reader.columns()
    }
}

/// A logical session on which statements execute one at a time.
pub struct SqlSession {
    pub(crate) session: Session<Transport>,
    pub(crate) context: Arc<ConnContext>,
    /// The parked state of a statement that was dropped mid-stream; the
    /// next operation sends the attention and drains it first.
    pub(crate) parked: Option<Box<StatementCore>>,
}

impl SqlSession {
    pub(crate) fn new(session: Session<Transport>, context: Arc<ConnContext>) -> Self {
        Self {
            session,
            context,
            parked: None,
        }
    }

    /// The MARS session id, if this is a MARS subchannel.
    #[must_use]
    pub fn sid(&self) -> Option<u16> {
        self.session.sid()
    }

    /// The transaction descriptor currently embedded in outgoing requests.
    #[must_use]
    pub fn transaction_descriptor(&self) -> u64 {
        self.context.trans_id()
    }

    // =========================================================================
    // Statement plumbing
    // =========================================================================

    /// Send a request on this session, first completing any pending
    /// cancellation from a dropped statement.
    pub(crate) async fn send_request(
        &mut self,
        packet_type: PacketType,
        payload: Bytes,
    ) -> Result<()> {
        self.ensure_ready().await?;
        self.session.send_msg(packet_type, payload).await?;
        Ok(())
    }

    /// If a dropped statement left the session mid-stream, cancel it now:
    /// send the attention and drain until the server acknowledges.
    pub(crate) async fn ensure_ready(&mut self) -> Result<()> {
        if let Some(mut core) = self.parked.take() {
            self.session.pending_cancel = false;
            if !core.attention_acked {
                tracing::debug!(sid = ?self.sid(), "cancelling abandoned statement");
                self.session.send_attention().await?;
                self.drain_attention(&mut core).await?;
            }
        }
        Ok(())
    }

    /// Park a dropped statement's state for deferred cancellation.
    pub(crate) fn park(&mut self, core: StatementCore) {
        if !core.finished {
            self.session.pending_cancel = true;
            self.parked = Some(Box::new(core));
        }
    }

    /// Pull the next token of the current response, feeding packets as
    /// needed and applying connection-global side effects.
    pub(crate) async fn next_token(&mut self, core: &mut StatementCore) -> Result<Option<Token>> {
        loop {
            if let Some(token) = core.reader.try_next()? {
                self.observe(core, &token);
                return Ok(Some(token));
            }

            if core.last_packet_seen {
                core.reader.finish()?;
                return Ok(None);
            }

            let inbound = self
                .session
                .recv_deadline(self.context.command_timeout)
                .await?;
            core.reader.feed(&inbound.payload);
            core.last_packet_seen = inbound.last_packet;
        }
    }

    /// Apply a token's connection-global side effects: ENVCHANGE updates,
    /// message and count callbacks, attention acknowledgment.
    fn observe(&self, core: &mut StatementCore, token: &Token) {
        match token {
            Token::EnvChange(env) => self.apply_env(env),
            Token::Info(message) => {
                if let Some(handler) = &self.context.message_handler {
                    handler(message);
                } else {
                    tracing::info!(
                        number = message.number,
                        text = %message.message,
                        "server message"
                    );
                }
            }
            Token::Error(message) => {
                tracing::debug!(
                    number = message.number,
                    class = message.class,
                    text = %message.message,
                    "server error"
                );
                if let Some(handler) = &self.context.message_handler {
                    handler(message);
                } else if core.server_error.is_none() {
                    core.server_error = Some(message.clone());
                }
            }
            Token::Done(done) | Token::DoneProc(done) | Token::DoneInProc(done) => {
                if done.is_attention_ack() {
                    core.attention_acked = true;
                }
                if done.has_count() {
                    core.last_row_count = Some(done.row_count);
                    if let Some(handler) = &self.context.count_handler {
                        handler(done.row_count, done.cur_cmd);
                    }
                }
            }
            _ => {}
        }
    }

    fn apply_env(&self, env: &EnvChange) {
        match env {
            EnvChange::Database { new, .. } => {
                tracing::debug!(database = %new, "database changed");
                *self.context.database.lock() = Some(new.clone());
            }
            EnvChange::PacketSize { new, .. } => {
                tracing::debug!(packet_size = new, "packet size changed");
                self.session.set_packet_size(*new);
            }
            EnvChange::SqlCollation { new, .. } => {
                *self.context.collation.lock() = *new;
            }
            EnvChange::BeginTransaction(id) => {
                tracing::debug!(descriptor = id, "transaction began");
                self.context.trans_id.store(*id, Ordering::Release);
            }
            EnvChange::CommitTransaction | EnvChange::RollbackTransaction => {
                self.context.trans_id.store(0, Ordering::Release);
            }
            EnvChange::Language { .. } | EnvChange::Other(_) => {}
        }
    }

    /// Advance the statement to its next row, or to completion.
    ///
    /// Cancellation is folded in: a timed-out wait sends the attention and
    /// drains before reporting [`Error::Timeout`].
    pub(crate) async fn advance(&mut self, core: &mut StatementCore) -> Result<Option<Row>> {
        while !core.finished {
            let token = match self.next_token(core).await {
                Ok(token) => token,
                Err(Error::Timeout) => {
                    // A fired deadline is a cancellation: best-effort
                    // attention and drain, then report the timeout.
                    let _ = self.session.send_attention().await;
                    let _ = self.drain_attention(core).await;
                    core.finished = true;
                    return Err(Error::Timeout);
                }
                Err(e) => return Err(e),
            };

            match token {
                None => core.finished = true,
                Some(Token::Row(values) | Token::NbcRow(values)) => {
                    let columns = core
                        .columns()
                        .cloned()
                        .ok_or(ProtocolError::RowWithoutMetadata)?;
                    return Ok(Some(Row::new(columns, values)));
                }
                Some(Token::Done(done) | Token::DoneProc(done)) if !done.has_more() => {
                    core.finished = true;
                }
                Some(Token::ReturnStatus(status)) => core.return_status = Some(status),
                Some(Token::ReturnValue(rv)) => {
                    let value = decode_value(&rv.meta, &rv.value)?;
                    core.outputs.push(OutputParam {
                        ordinal: rv.ordinal,
                        name: rv.name.clone(),
                        value,
                    });
                }
                Some(_) => {}
            }
        }

        if let Some(error) = core.server_error.take() {
            return Err(error.into());
        }
        Ok(None)
    }

    /// Cancel the in-flight statement: attention, then drain until the
    /// server acknowledges with DONE carrying the attention bit.
    pub(crate) async fn cancel_statement(&mut self, core: &mut StatementCore) -> Result<()> {
        if core.finished {
            return Ok(());
        }
        self.session.send_attention().await?;
        self.drain_attention(core).await
    }

    /// Drain replies until the attention acknowledgment. Tokens seen on the
    /// way are interpreted normally (ENVCHANGE still updates state) but
    /// dropped from the row stream; server errors in the drain window are
    /// discarded.
    pub(crate) async fn drain_attention(&mut self, core: &mut StatementCore) -> Result<()> {
        while !core.attention_acked {
            match self.next_token(core).await? {
                Some(_) => {}
                None => core.next_message(),
            }
        }
        core.finished = true;
        core.server_error = None;
        self.session.pending_cancel = false;
        Ok(())
    }

    /// Run a request to completion, discarding rows; returns the last valid
    /// row count.
    pub(crate) async fn run_request(
        &mut self,
        packet_type: PacketType,
        payload: Bytes,
    ) -> Result<u64> {
        self.send_request(packet_type, payload).await?;
        let mut core = StatementCore::new();
        while self.advance(&mut core).await?.is_some() {}
        Ok(core.last_row_count.unwrap_or(0))
    }

    // =========================================================================
    // Transactions
    // =========================================================================

    /// Begin a transaction via a transaction-manager request. The server's
    /// ENVCHANGE supplies the descriptor embedded in subsequent requests.
    pub async fn begin_transaction(&mut self) -> Result<()> {
        self.begin_transaction_with_isolation(IsolationLevel::Default)
            .await
    }

    /// Begin a transaction at a specific isolation level.
    pub async fn begin_transaction_with_isolation(
        &mut self,
        isolation: IsolationLevel,
    ) -> Result<()> {
        let payload = encode_tm_begin(isolation, self.context.trans_id());
        self.run_request(PacketType::TransactionManager, payload)
            .await?;
        Ok(())
    }

    /// Commit the current transaction.
    pub async fn commit(&mut self) -> Result<()> {
        let payload = encode_tm_commit(self.context.trans_id());
        self.run_request(PacketType::TransactionManager, payload)
            .await?;
        Ok(())
    }

    /// Roll back the current transaction.
    pub async fn rollback(&mut self) -> Result<()> {
        let payload = encode_tm_rollback(self.context.trans_id());
        self.run_request(PacketType::TransactionManager, payload)
            .await?;
        Ok(())
    }

    /// Close a MARS session cleanly with a FIN frame.
    pub async fn close(mut self) -> Result<()> {
        self.ensure_ready().await?;
        self.session.close().await?;
        Ok(())
    }
}

impl std::fmt::Debug for SqlSession {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SqlSession")
            .field("sid", &self.sid())
            .field("pending_cancel", &self.parked.is_some())
            .finish_non_exhaustive()
    }
}
