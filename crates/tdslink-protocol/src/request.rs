//! Request payload builders: ALL_HEADERS, SQL batch, transaction manager.
//!
//! Every non-login client request (sql-batch, rpc, bulk-load, tm-request)
//! starts with the 22-byte ALL_HEADERS prefix carrying the current
//! transaction descriptor and the outstanding-request count.

use bytes::{BufMut, Bytes, BytesMut};

use crate::codec::write_utf16;

/// Size of the ALL_HEADERS prefix with the single transaction-descriptor
/// sub-header.
pub const ALL_HEADERS_SIZE: usize = 22;

/// Write the ALL_HEADERS prefix.
///
/// `transaction_descriptor` must be the descriptor most recently received
/// via ENVCHANGE begin-transaction, or 0 outside a transaction.
pub fn write_all_headers(dst: &mut impl BufMut, transaction_descriptor: u64) {
    dst.put_u32_le(ALL_HEADERS_SIZE as u32); // total size
    dst.put_u32_le(18); // this header's size
    dst.put_u16_le(0x0002); // header type: transaction descriptor
    dst.put_u64_le(transaction_descriptor);
    dst.put_u32_le(1); // outstanding request count
}

/// Encode a SQL batch payload: ALL_HEADERS plus the query as UTF-16LE.
#[must_use]
pub fn encode_sql_batch(sql: &str, transaction_descriptor: u64) -> Bytes {
    let mut buf = BytesMut::with_capacity(ALL_HEADERS_SIZE + sql.len() * 2);
    write_all_headers(&mut buf, transaction_descriptor);
    write_utf16(&mut buf, sql);
    buf.freeze()
}

/// Transaction manager request types.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u16)]
pub enum TmRequestType {
    /// Begin a transaction.
    BeginXact = 5,
    /// Commit the current transaction.
    CommitXact = 7,
    /// Roll back the current transaction.
    RollbackXact = 8,
}

/// Transaction isolation levels for a begin request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[repr(u8)]
pub enum IsolationLevel {
    /// Use the session default.
    #[default]
    Default = 0x00,
    /// READ UNCOMMITTED.
    ReadUncommitted = 0x01,
    /// READ COMMITTED.
    ReadCommitted = 0x02,
    /// REPEATABLE READ.
    RepeatableRead = 0x03,
    /// SERIALIZABLE.
    Serializable = 0x04,
    /// SNAPSHOT.
    Snapshot = 0x05,
}

/// Encode a begin-transaction TM request.
#[must_use]
pub fn encode_tm_begin(isolation: IsolationLevel, transaction_descriptor: u64) -> Bytes {
    let mut buf = BytesMut::with_capacity(ALL_HEADERS_SIZE + 4);
    write_all_headers(&mut buf, transaction_descriptor);
    buf.put_u16_le(TmRequestType::BeginXact as u16);
    buf.put_u8(isolation as u8);
    buf.put_u8(0); // transaction name length
    buf.freeze()
}

/// Encode a commit TM request.
#[must_use]
pub fn encode_tm_commit(transaction_descriptor: u64) -> Bytes {
    let mut buf = BytesMut::with_capacity(ALL_HEADERS_SIZE + 4);
    write_all_headers(&mut buf, transaction_descriptor);
    buf.put_u16_le(TmRequestType::CommitXact as u16);
    buf.put_u8(0); // transaction name length
    buf.put_u8(0); // no begin piggybacked on the commit
    buf.freeze()
}

/// Encode a rollback TM request.
#[must_use]
pub fn encode_tm_rollback(transaction_descriptor: u64) -> Bytes {
    let mut buf = BytesMut::with_capacity(ALL_HEADERS_SIZE + 4);
    write_all_headers(&mut buf, transaction_descriptor);
    buf.put_u16_le(TmRequestType::RollbackXact as u16);
    buf.put_u8(0); // transaction name length
    buf.put_u8(0); // no begin piggybacked on the rollback
    buf.freeze()
}
