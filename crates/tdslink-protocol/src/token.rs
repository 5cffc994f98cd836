//! TDS token stream parsing.
//!
//! The server's tabular response is a concatenation of tokens. Each token
//! starts with a 1-byte id; ROW and NBCROW tokens can only be interpreted
//! with the column metadata established by the most recent COLMETADATA.
//!
//! [`TokenStream`] is incremental: it is fed packet payloads as they arrive
//! and yields tokens as soon as they are complete. A token that is split
//! across packets is retained until the rest of its bytes arrive; bytes left
//! over once the end-of-message packet has been consumed are a protocol
//! error.

use std::sync::Arc;

use bytes::{Buf, BufMut, Bytes, BytesMut};

use crate::codec::write_b_varchar;
use crate::collation::Collation;
use crate::error::ProtocolError;
use crate::types::{MAX_SENTINEL, PLP_NULL, PLP_UNKNOWN_LEN, TypeId};

/// Token type identifiers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum TokenType {
    /// Column metadata (COLMETADATA).
    ColMetaData = 0x81,
    /// Server error (ERROR).
    Error = 0xAA,
    /// Informational message (INFO).
    Info = 0xAB,
    /// Login acknowledgment (LOGINACK).
    LoginAck = 0xAD,
    /// Row (ROW).
    Row = 0xD1,
    /// Null-bitmap compressed row (NBCROW).
    NbcRow = 0xD2,
    /// Environment change (ENVCHANGE).
    EnvChange = 0xE3,
    /// SSPI payload (SSPI).
    Sspi = 0xED,
    /// Statement completion (DONE).
    Done = 0xFD,
    /// Completion inside a procedure (DONEINPROC).
    DoneInProc = 0xFF,
    /// Procedure completion (DONEPROC).
    DoneProc = 0xFE,
    /// Procedure return status (RETURNSTATUS).
    ReturnStatus = 0x79,
    /// Output parameter value (RETURNVALUE).
    ReturnValue = 0xAC,
    /// Sort-key column indices (ORDER).
    Order = 0xA9,
    /// Feature extension acknowledgment (FEATUREEXTACK).
    FeatureExtAck = 0xAE,
}

impl TokenType {
    /// Parse a token type from its wire byte.
    pub fn from_u8(value: u8) -> Option<Self> {
        match value {
            0x81 => Some(Self::ColMetaData),
            0xAA => Some(Self::Error),
            0xAB => Some(Self::Info),
            0xAD => Some(Self::LoginAck),
            0xD1 => Some(Self::Row),
            0xD2 => Some(Self::NbcRow),
            0xE3 => Some(Self::EnvChange),
            0xED => Some(Self::Sspi),
            0xFD => Some(Self::Done),
            0xFF => Some(Self::DoneInProc),
            0xFE => Some(Self::DoneProc),
            0x79 => Some(Self::ReturnStatus),
            0xAC => Some(Self::ReturnValue),
            0xA9 => Some(Self::Order),
            0xAE => Some(Self::FeatureExtAck),
            _ => None,
        }
    }
}

/// DONE status bits the client reacts to.
pub mod done_status {
    /// More result sets follow.
    pub const MORE: u16 = 0x0001;
    /// The statement produced an error.
    pub const ERROR: u16 = 0x0002;
    /// A transaction is open.
    pub const IN_XACT: u16 = 0x0004;
    /// The row count field is valid.
    pub const COUNT: u16 = 0x0010;
    /// Acknowledges an attention signal.
    pub const ATTN: u16 = 0x0020;
    /// Server-side error terminated the statement.
    pub const SRVERROR: u16 = 0x0100;
}

/// DONE / DONEINPROC / DONEPROC payload (12 bytes on the wire).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Done {
    /// Status bitmask (`done_status`).
    pub status: u16,
    /// Token of the current command.
    pub cur_cmd: u16,
    /// Affected/returned row count, valid when `COUNT` is set.
    pub row_count: u64,
}

impl Done {
    /// Wire size excluding the token id byte.
    pub const SIZE: usize = 12;

    /// Whether more result sets follow.
    #[must_use]
    pub const fn has_more(&self) -> bool {
        self.status & done_status::MORE != 0
    }

    /// Whether the row count field is valid.
    #[must_use]
    pub const fn has_count(&self) -> bool {
        self.status & done_status::COUNT != 0
    }

    /// Whether this DONE acknowledges an attention signal.
    #[must_use]
    pub const fn is_attention_ack(&self) -> bool {
        self.status & done_status::ATTN != 0
    }

    /// Whether the statement failed server-side.
    #[must_use]
    pub const fn has_error(&self) -> bool {
        self.status & done_status::ERROR != 0
    }

    /// Encode as a DONE token (id byte included).
    pub fn encode(&self, dst: &mut impl BufMut) {
        self.encode_as(TokenType::Done, dst);
    }

    /// Encode under a specific DONE-family token id.
    pub fn encode_as(&self, kind: TokenType, dst: &mut impl BufMut) {
        dst.put_u8(kind as u8);
        dst.put_u16_le(self.status);
        dst.put_u16_le(self.cur_cmd);
        dst.put_u64_le(self.row_count);
    }
}

/// ERROR / INFO payload. The two tokens share a layout and differ only in
/// severity.
#[derive(Debug, Clone)]
pub struct ServerMessage {
    /// Message number.
    pub number: i32,
    /// Message state.
    pub state: u8,
    /// Severity class (errors are >= 11).
    pub class: u8,
    /// Message text.
    pub message: String,
    /// Reporting server name.
    pub server: String,
    /// Procedure name, empty outside procedures.
    pub procedure: String,
    /// Line number within the batch or procedure.
    pub line: i32,
}

/// Environment change notification.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EnvChange {
    /// Current database changed.
    Database {
        /// New database name.
        new: String,
        /// Previous database name.
        old: String,
    },
    /// Session language changed.
    Language {
        /// New language.
        new: String,
        /// Previous language.
        old: String,
    },
    /// Negotiated packet size changed.
    PacketSize {
        /// New packet size in bytes.
        new: u32,
        /// Previous packet size in bytes.
        old: u32,
    },
    /// Connection default collation changed.
    SqlCollation {
        /// New collation, if the server sent one.
        new: Option<Collation>,
        /// Previous collation.
        old: Option<Collation>,
    },
    /// A transaction began; carries the new transaction descriptor.
    BeginTransaction(u64),
    /// The transaction committed; the descriptor reverts to 0.
    CommitTransaction,
    /// The transaction rolled back; the descriptor reverts to 0.
    RollbackTransaction,
    /// A change this client does not track.
    Other(u8),
}

/// LOGINACK payload.
#[derive(Debug, Clone)]
pub struct LoginAck {
    /// SQL interface type.
    pub interface: u8,
    /// Negotiated TDS version.
    pub tds_version: u32,
    /// Server program name.
    pub prog_name: String,
    /// Server program version.
    pub prog_version: u32,
}

/// One acknowledged feature extension.
#[derive(Debug, Clone)]
pub struct FeatureAck {
    /// Feature id (matches the LOGIN7 feature extension block).
    pub feature_id: u8,
    /// Feature-specific data.
    pub data: Bytes,
}

/// Sort-key column indices from an ORDER token.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Order {
    /// 1-based column ordinals in sort order.
    pub columns: Vec<u16>,
}

/// A raw column value sliced out of a row.
///
/// `data` holds the server-native representation (scalars little-endian,
/// N-typed strings UTF-16LE, narrow strings in the column code page, decimal
/// sign + magnitude). Interpretation is the value codec's job.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RawValue {
    /// Value bytes; empty when null.
    pub data: Bytes,
    /// Whether the column was null.
    pub is_null: bool,
}

impl RawValue {
    /// The null value.
    #[must_use]
    pub const fn null() -> Self {
        Self {
            data: Bytes::new(),
            is_null: true,
        }
    }

    /// A non-null value over `data`.
    #[must_use]
    pub const fn new(data: Bytes) -> Self {
        Self {
            data,
            is_null: false,
        }
    }
}

/// Column metadata, one entry per result column.
///
/// Lives from one COLMETADATA token to the next.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ColumnMeta {
    /// Column name.
    pub name: String,
    /// Wire type.
    pub type_id: TypeId,
    /// Maximum length in bytes ([`MAX_SENTINEL`] for `(MAX)` columns).
    pub max_length: u32,
    /// Precision for DECIMAL/NUMERIC.
    pub precision: u8,
    /// Scale for DECIMAL/NUMERIC and the temporal types.
    pub scale: u8,
    /// Whether the column is nullable.
    pub nullable: bool,
    /// Collation for text columns.
    pub collation: Option<Collation>,
    /// CLR type name for UDT columns.
    pub clr_type_name: Option<String>,
}

impl ColumnMeta {
    /// Construct metadata for a named column of a plain type.
    #[must_use]
    pub fn new(name: impl Into<String>, type_id: TypeId) -> Self {
        Self {
            name: name.into(),
            type_id,
            max_length: type_id.fixed_size().unwrap_or(0) as u32,
            precision: 0,
            scale: 0,
            nullable: false,
            collation: None,
            clr_type_name: None,
        }
    }

    /// Set the maximum byte length.
    #[must_use]
    pub fn with_max_length(mut self, max_length: u32) -> Self {
        self.max_length = max_length;
        self
    }

    /// Set precision and scale.
    #[must_use]
    pub fn with_precision_scale(mut self, precision: u8, scale: u8) -> Self {
        self.precision = precision;
        self.scale = scale;
        self
    }

    /// Set the scale only (temporal types).
    #[must_use]
    pub fn with_scale(mut self, scale: u8) -> Self {
        self.scale = scale;
        self
    }

    /// Mark the column nullable.
    #[must_use]
    pub fn with_nullable(mut self, nullable: bool) -> Self {
        self.nullable = nullable;
        self
    }

    /// Set the collation.
    #[must_use]
    pub fn with_collation(mut self, collation: Collation) -> Self {
        self.collation = Some(collation);
        self
    }

    /// Whether values use the PLP chunked encoding.
    #[must_use]
    pub fn is_plp(&self) -> bool {
        matches!(self.type_id, TypeId::Xml | TypeId::Udt)
            || (self.type_id.is_short_len() && self.max_length == MAX_SENTINEL)
    }
}

/// Output parameter value from a RETURNVALUE token.
#[derive(Debug, Clone)]
pub struct ReturnValue {
    /// Parameter ordinal as sent in the request.
    pub ordinal: u16,
    /// Parameter name (may be empty).
    pub name: String,
    /// Status byte.
    pub status: u8,
    /// Value type descriptor.
    pub meta: ColumnMeta,
    /// The raw value.
    pub value: RawValue,
}

/// A parsed token.
#[derive(Debug, Clone)]
pub enum Token {
    /// New column metadata; resets row state.
    ColMetaData(Arc<Vec<ColumnMeta>>),
    /// A data row: one raw value per column.
    Row(Vec<RawValue>),
    /// A null-bitmap compressed row, decoded to the same shape as ROW.
    NbcRow(Vec<RawValue>),
    /// Statement completion.
    Done(Done),
    /// Completion inside a procedure.
    DoneInProc(Done),
    /// Procedure completion.
    DoneProc(Done),
    /// Procedure return status.
    ReturnStatus(i32),
    /// Output parameter.
    ReturnValue(ReturnValue),
    /// Server error message.
    Error(ServerMessage),
    /// Server informational message.
    Info(ServerMessage),
    /// Environment change.
    EnvChange(EnvChange),
    /// Login acknowledgment.
    LoginAck(LoginAck),
    /// Sort order of the result.
    Order(Order),
    /// Feature extension acknowledgments.
    FeatureExtAck(Vec<FeatureAck>),
    /// SSPI challenge payload.
    Sspi(Bytes),
}

// =============================================================================
// Incremental reader plumbing
// =============================================================================

/// Internal outcome while reading a token: either the bytes on hand do not
/// yet complete the token, or the stream is genuinely malformed.
enum ReadError {
    NeedMore,
    Proto(ProtocolError),
}

impl From<ProtocolError> for ReadError {
    fn from(e: ProtocolError) -> Self {
        Self::Proto(e)
    }
}

type ReadResult<T> = Result<T, ReadError>;

/// Bounds-checked reader over a byte slice. Never consumes the underlying
/// stream until the whole token parses.
struct Cursor<'a> {
    buf: &'a [u8],
}

impl<'a> Cursor<'a> {
    fn new(buf: &'a [u8]) -> Self {
        Self { buf }
    }

    fn remaining(&self) -> usize {
        self.buf.len()
    }

    fn take(&mut self, n: usize) -> ReadResult<&'a [u8]> {
        if self.buf.len() < n {
            return Err(ReadError::NeedMore);
        }
        let (head, tail) = self.buf.split_at(n);
        self.buf = tail;
        Ok(head)
    }

    fn u8(&mut self) -> ReadResult<u8> {
        Ok(self.take(1)?[0])
    }

    fn u16_le(&mut self) -> ReadResult<u16> {
        let b = self.take(2)?;
        Ok(u16::from_le_bytes([b[0], b[1]]))
    }

    fn u32_le(&mut self) -> ReadResult<u32> {
        let b = self.take(4)?;
        Ok(u32::from_le_bytes([b[0], b[1], b[2], b[3]]))
    }

    fn i32_le(&mut self) -> ReadResult<i32> {
        Ok(self.u32_le()? as i32)
    }

    fn u64_le(&mut self) -> ReadResult<u64> {
        let b = self.take(8)?;
        Ok(u64::from_le_bytes([
            b[0], b[1], b[2], b[3], b[4], b[5], b[6], b[7],
        ]))
    }

    fn b_varchar(&mut self, what: &'static str) -> ReadResult<String> {
        let len = self.u8()? as usize;
        let bytes = self.take(len * 2)?;
        crate::codec::decode_utf16_bytes(bytes, what).map_err(ReadError::from)
    }

    fn us_varchar(&mut self, what: &'static str) -> ReadResult<String> {
        let len = self.u16_le()? as usize;
        let bytes = self.take(len * 2)?;
        crate::codec::decode_utf16_bytes(bytes, what).map_err(ReadError::from)
    }

    fn collation(&mut self) -> ReadResult<Collation> {
        let b = self.take(5)?;
        let mut slice = b;
        Collation::decode(&mut slice)
            .ok_or_else(|| ReadError::Proto(ProtocolError::eof(5, b.len())))
    }
}

// =============================================================================
// TokenStream
// =============================================================================

/// Incremental token stream parser.
///
/// Feed it the payload of each tabular-result packet; pull tokens with
/// [`TokenStream::try_next`] until it returns `None` (more bytes needed) and
/// call [`TokenStream::finish`] after the end-of-message packet.
#[derive(Debug, Default)]
pub struct TokenStream {
    buf: BytesMut,
    columns: Option<Arc<Vec<ColumnMeta>>>,
}

impl TokenStream {
    /// Create an empty token stream.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Append the payload of another packet.
    pub fn feed(&mut self, payload: &[u8]) {
        self.buf.extend_from_slice(payload);
    }

    /// The column metadata currently in effect.
    #[must_use]
    pub fn columns(&self) -> Option<&Arc<Vec<ColumnMeta>>> {
        self.columns.as_ref()
    }

    /// Bytes buffered but not yet consumed.
    #[must_use]
    pub fn buffered(&self) -> usize {
        self.buf.len()
    }

    /// Verify nothing is left over once the final packet has been consumed.
    pub fn finish(&self) -> Result<(), ProtocolError> {
        if self.buf.is_empty() {
            Ok(())
        } else {
            Err(ProtocolError::TrailingBytes(self.buf.len()))
        }
    }

    /// Parse the next token.
    ///
    /// Returns `Ok(None)` when the buffered bytes do not complete a token;
    /// feed more packets and retry. Malformed input is an error and poisons
    /// the statement.
    pub fn try_next(&mut self) -> Result<Option<Token>, ProtocolError> {
        if self.buf.is_empty() {
            return Ok(None);
        }

        let mut cur = Cursor::new(&self.buf);
        let before = cur.remaining();

        match self.read_token(&mut cur) {
            Ok(token) => {
                let consumed = before - cur.remaining();
                self.buf.advance(consumed);

                if let Token::ColMetaData(ref cols) = token {
                    self.columns = if cols.is_empty() {
                        None
                    } else {
                        Some(Arc::clone(cols))
                    };
                }

                Ok(Some(token))
            }
            Err(ReadError::NeedMore) => Ok(None),
            Err(ReadError::Proto(e)) => Err(e),
        }
    }

    fn read_token(&self, cur: &mut Cursor<'_>) -> ReadResult<Token> {
        let id = cur.u8()?;
        let kind = TokenType::from_u8(id).ok_or(ProtocolError::UnknownToken(id))?;

        match kind {
            TokenType::Done => Ok(Token::Done(read_done(cur)?)),
            TokenType::DoneInProc => Ok(Token::DoneInProc(read_done(cur)?)),
            TokenType::DoneProc => Ok(Token::DoneProc(read_done(cur)?)),
            TokenType::Error => Ok(Token::Error(read_server_message(cur)?)),
            TokenType::Info => Ok(Token::Info(read_server_message(cur)?)),
            TokenType::EnvChange => Ok(Token::EnvChange(read_env_change(cur)?)),
            TokenType::LoginAck => Ok(Token::LoginAck(read_login_ack(cur)?)),
            TokenType::Order => Ok(Token::Order(read_order(cur)?)),
            TokenType::ReturnStatus => Ok(Token::ReturnStatus(cur.i32_le()?)),
            TokenType::ReturnValue => Ok(Token::ReturnValue(read_return_value(cur)?)),
            TokenType::FeatureExtAck => Ok(Token::FeatureExtAck(read_feature_ext_ack(cur)?)),
            TokenType::Sspi => {
                let len = cur.u16_le()? as usize;
                let data = Bytes::copy_from_slice(cur.take(len)?);
                Ok(Token::Sspi(data))
            }
            TokenType::ColMetaData => {
                let cols = read_colmetadata(cur)?;
                Ok(Token::ColMetaData(Arc::new(cols)))
            }
            TokenType::Row => {
                let cols = self
                    .columns
                    .as_ref()
                    .ok_or(ProtocolError::RowWithoutMetadata)?;
                let values = cols
                    .iter()
                    .map(|col| read_value(cur, col))
                    .collect::<ReadResult<Vec<_>>>()?;
                Ok(Token::Row(values))
            }
            TokenType::NbcRow => {
                let cols = self
                    .columns
                    .as_ref()
                    .ok_or(ProtocolError::RowWithoutMetadata)?;
                let bitmap = cur.take(cols.len().div_ceil(8))?.to_vec();
                let mut values = Vec::with_capacity(cols.len());
                for (i, col) in cols.iter().enumerate() {
                    let is_null = bitmap[i / 8] & (1 << (i % 8)) != 0;
                    if is_null {
                        values.push(RawValue::null());
                    } else {
                        values.push(read_value(cur, col)?);
                    }
                }
                Ok(Token::NbcRow(values))
            }
        }
    }
}

// =============================================================================
// Individual token readers
// =============================================================================

fn read_done(cur: &mut Cursor<'_>) -> ReadResult<Done> {
    Ok(Done {
        status: cur.u16_le()?,
        cur_cmd: cur.u16_le()?,
        row_count: cur.u64_le()?,
    })
}

fn read_server_message(cur: &mut Cursor<'_>) -> ReadResult<ServerMessage> {
    let _length = cur.u16_le()?;
    let number = cur.i32_le()?;
    let state = cur.u8()?;
    let class = cur.u8()?;
    let message = cur.us_varchar("message text")?;
    let server = cur.b_varchar("server name")?;
    let procedure = cur.b_varchar("procedure name")?;
    let line = cur.i32_le()?;

    Ok(ServerMessage {
        number,
        state,
        class,
        message,
        server,
        procedure,
        line,
    })
}

fn read_login_ack(cur: &mut Cursor<'_>) -> ReadResult<LoginAck> {
    let _length = cur.u16_le()?;
    let interface = cur.u8()?;
    let tds_version = cur.u32_le()?;
    let prog_name = cur.b_varchar("program name")?;
    let prog_version = cur.u32_le()?;

    Ok(LoginAck {
        interface,
        tds_version,
        prog_name,
        prog_version,
    })
}

fn read_order(cur: &mut Cursor<'_>) -> ReadResult<Order> {
    let length = cur.u16_le()? as usize;
    let body = cur.take(length)?;
    let columns = body
        .chunks_exact(2)
        .map(|c| u16::from_le_bytes([c[0], c[1]]))
        .collect();
    Ok(Order { columns })
}

fn read_feature_ext_ack(cur: &mut Cursor<'_>) -> ReadResult<Vec<FeatureAck>> {
    let mut features = Vec::new();
    loop {
        let feature_id = cur.u8()?;
        if feature_id == 0xFF {
            break;
        }
        let len = cur.u32_le()? as usize;
        let data = Bytes::copy_from_slice(cur.take(len)?);
        features.push(FeatureAck { feature_id, data });
    }
    Ok(features)
}

fn read_env_change(cur: &mut Cursor<'_>) -> ReadResult<EnvChange> {
    let length = cur.u16_le()? as usize;
    let body = cur.take(length)?;

    let mut inner = Cursor::new(body);
    let env_type = inner.u8()?;

    // The body is length-delimited; a truncated body is malformed, not
    // "need more".
    let parse = |inner: &mut Cursor<'_>| -> ReadResult<EnvChange> {
        match env_type {
            1 => Ok(EnvChange::Database {
                new: inner.b_varchar("database name")?,
                old: inner.b_varchar("database name")?,
            }),
            2 => Ok(EnvChange::Language {
                new: inner.b_varchar("language")?,
                old: inner.b_varchar("language")?,
            }),
            4 => {
                let new = inner.b_varchar("packet size")?;
                let old = inner.b_varchar("packet size")?;
                let parse_size = |s: &str| {
                    s.parse::<u32>()
                        .map_err(|_| ReadError::Proto(ProtocolError::MalformedEnvChange(4)))
                };
                Ok(EnvChange::PacketSize {
                    new: parse_size(&new)?,
                    old: parse_size(&old)?,
                })
            }
            7 => {
                let read_coll = |inner: &mut Cursor<'_>| -> ReadResult<Option<Collation>> {
                    let len = inner.u8()? as usize;
                    if len == 0 {
                        return Ok(None);
                    }
                    let bytes = inner.take(len)?;
                    let mut slice = bytes;
                    Ok(Collation::decode(&mut slice))
                };
                Ok(EnvChange::SqlCollation {
                    new: read_coll(&mut *inner)?,
                    old: read_coll(&mut *inner)?,
                })
            }
            8 => {
                let len = inner.u8()? as usize;
                if len != 8 {
                    return Err(ReadError::Proto(ProtocolError::MalformedEnvChange(8)));
                }
                Ok(EnvChange::BeginTransaction(inner.u64_le()?))
            }
            9 => Ok(EnvChange::CommitTransaction),
            10 => Ok(EnvChange::RollbackTransaction),
            other => Ok(EnvChange::Other(other)),
        }
    };

    parse(&mut inner).map_err(|e| match e {
        ReadError::NeedMore => ReadError::Proto(ProtocolError::MalformedEnvChange(env_type)),
        proto => proto,
    })
}

fn read_return_value(cur: &mut Cursor<'_>) -> ReadResult<ReturnValue> {
    let ordinal = cur.u16_le()?;
    let name = cur.b_varchar("parameter name")?;
    let status = cur.u8()?;
    let _user_type = cur.u32_le()?;
    let flags = cur.u16_le()?;
    let mut meta = read_type_info(cur)?;
    meta.name = name.clone();
    meta.nullable = flags & 0x0001 != 0;
    let value = read_value(cur, &meta)?;

    Ok(ReturnValue {
        ordinal,
        name,
        status,
        meta,
        value,
    })
}

fn read_colmetadata(cur: &mut Cursor<'_>) -> ReadResult<Vec<ColumnMeta>> {
    let count = cur.u16_le()?;

    // 0xFFFF means "no metadata"; 0 clears the set.
    if count == 0xFFFF || count == 0 {
        return Ok(Vec::new());
    }

    let mut columns = Vec::with_capacity(count as usize);
    for _ in 0..count {
        let _user_type = cur.u32_le()?;
        let flags = cur.u16_le()?;
        let mut meta = read_type_info(cur)?;
        meta.nullable = flags & 0x0001 != 0;

        // Legacy LOB columns carry the owning table name before the column
        // name.
        if meta.type_id.is_legacy_lob() {
            let num_parts = cur.u8()?;
            for _ in 0..num_parts {
                let _part = cur.us_varchar("table name part")?;
            }
        }

        meta.name = cur.b_varchar("column name")?;
        columns.push(meta);
    }

    Ok(columns)
}

/// Read a TYPE_INFO descriptor: type id plus its type-dependent tail.
fn read_type_info(cur: &mut Cursor<'_>) -> ReadResult<ColumnMeta> {
    let type_byte = cur.u8()?;
    let type_id = TypeId::from_u8(type_byte)?;
    let mut meta = ColumnMeta::new(String::new(), type_id);

    if type_id.fixed_size().is_some() {
        return Ok(meta);
    }

    match type_id {
        TypeId::Guid | TypeId::IntN | TypeId::BitN | TypeId::FloatN | TypeId::MoneyN
        | TypeId::DateTimeN => {
            meta.max_length = cur.u8()? as u32;
        }
        TypeId::DecimalN | TypeId::NumericN => {
            meta.max_length = cur.u8()? as u32;
            meta.precision = cur.u8()?;
            meta.scale = cur.u8()?;
        }
        TypeId::Date => {}
        TypeId::Time | TypeId::DateTime2 | TypeId::DateTimeOffset => {
            meta.scale = cur.u8()?;
        }
        TypeId::BigVarChar | TypeId::BigChar | TypeId::NVarChar | TypeId::NChar => {
            meta.max_length = cur.u16_le()? as u32;
            meta.collation = Some(cur.collation()?);
        }
        TypeId::BigVarBinary | TypeId::BigBinary => {
            meta.max_length = cur.u16_le()? as u32;
        }
        TypeId::Text | TypeId::NText => {
            meta.max_length = cur.u32_le()?;
            meta.collation = Some(cur.collation()?);
        }
        TypeId::Image => {
            meta.max_length = cur.u32_le()?;
        }
        TypeId::Xml => {
            let schema_present = cur.u8()?;
            if schema_present == 1 {
                let _db = cur.b_varchar("xml schema db")?;
                let _schema = cur.b_varchar("xml schema owner")?;
                let _collection = cur.us_varchar("xml schema collection")?;
            }
            meta.max_length = MAX_SENTINEL;
        }
        TypeId::Udt => {
            meta.max_length = cur.u16_le()? as u32;
            let _db = cur.b_varchar("udt db")?;
            let _schema = cur.b_varchar("udt schema")?;
            let type_name = cur.b_varchar("udt type name")?;
            let _assembly = cur.us_varchar("udt assembly name")?;
            meta.clr_type_name = Some(type_name);
        }
        _ => {}
    }

    Ok(meta)
}

/// Slice one column value out of a row, using the column's wire layout.
fn read_value(cur: &mut Cursor<'_>, col: &ColumnMeta) -> ReadResult<RawValue> {
    let ty = col.type_id;

    if let Some(width) = ty.fixed_size() {
        let data = Bytes::copy_from_slice(cur.take(width)?);
        return Ok(RawValue::new(data));
    }

    if ty.is_byte_len() {
        let len = cur.u8()? as usize;
        if len == 0 {
            return Ok(RawValue::null());
        }
        if !ty.allowed_widths().contains(&len) {
            return Err(ReadError::Proto(ProtocolError::InvalidTypeWidth {
                type_name: ty.name(),
                width: len,
            }));
        }
        return Ok(RawValue::new(Bytes::copy_from_slice(cur.take(len)?)));
    }

    match ty {
        TypeId::DecimalN | TypeId::NumericN | TypeId::Date => {
            let len = cur.u8()? as usize;
            if len == 0 {
                return Ok(RawValue::null());
            }
            Ok(RawValue::new(Bytes::copy_from_slice(cur.take(len)?)))
        }
        TypeId::Time | TypeId::DateTime2 | TypeId::DateTimeOffset => {
            let len = cur.u8()? as usize;
            if len == 0 {
                return Ok(RawValue::null());
            }
            let expected = TypeId::time_width(col.scale)
                + match ty {
                    TypeId::DateTime2 => 3,
                    TypeId::DateTimeOffset => 5,
                    _ => 0,
                };
            if len != expected {
                return Err(ReadError::Proto(ProtocolError::InvalidTypeWidth {
                    type_name: ty.name(),
                    width: len,
                }));
            }
            Ok(RawValue::new(Bytes::copy_from_slice(cur.take(len)?)))
        }
        _ if col.is_plp() => read_plp_value(cur),
        _ if ty.is_short_len() => {
            let len = cur.u16_le()? as usize;
            if len == 0xFFFF {
                return Ok(RawValue::null());
            }
            Ok(RawValue::new(Bytes::copy_from_slice(cur.take(len)?)))
        }
        TypeId::Text | TypeId::NText | TypeId::Image => {
            // Legacy LOB: text pointer, timestamp, 4-byte length, data.
            let ptr_len = cur.u8()? as usize;
            if ptr_len == 0 {
                return Ok(RawValue::null());
            }
            let _ptr = cur.take(ptr_len)?;
            let _timestamp = cur.take(8)?;
            let len = cur.u32_le()? as usize;
            if len == 0xFFFF_FFFF {
                return Ok(RawValue::null());
            }
            Ok(RawValue::new(Bytes::copy_from_slice(cur.take(len)?)))
        }
        other => Err(ReadError::Proto(ProtocolError::UnknownType(other as u8))),
    }
}

/// Read a partially-length-prefixed (MAX) value: 8-byte total length
/// sentinel, then chunks of `u32 length + bytes` terminated by a zero-length
/// chunk.
fn read_plp_value(cur: &mut Cursor<'_>) -> ReadResult<RawValue> {
    let total = cur.u64_le()?;
    if total == PLP_NULL {
        return Ok(RawValue::null());
    }

    let mut data = if total == PLP_UNKNOWN_LEN {
        BytesMut::new()
    } else {
        BytesMut::with_capacity(total as usize)
    };

    loop {
        let chunk_len = cur.u32_le()? as usize;
        if chunk_len == 0 {
            break;
        }
        data.extend_from_slice(cur.take(chunk_len)?);
    }

    Ok(RawValue::new(data.freeze()))
}

// =============================================================================
// COLMETADATA / ROW writers (used by the bulk-copy path and tests)
// =============================================================================

/// Write a COLMETADATA token declaring `columns`.
pub fn write_colmetadata(dst: &mut BytesMut, columns: &[ColumnMeta]) {
    dst.put_u8(TokenType::ColMetaData as u8);
    dst.put_u16_le(columns.len() as u16);

    for col in columns {
        dst.put_u32_le(0); // user type
        dst.put_u16_le(if col.nullable { 0x0001 } else { 0x0000 });
        write_type_info(dst, col);
        if col.type_id.is_legacy_lob() {
            dst.put_u8(0); // no owning-table name parts
        }
        write_b_varchar(dst, &col.name);
    }
}

/// Write the TYPE_INFO descriptor for a column.
pub fn write_type_info(dst: &mut BytesMut, col: &ColumnMeta) {
    let ty = col.type_id;
    dst.put_u8(ty as u8);

    if ty.fixed_size().is_some() {
        return;
    }

    match ty {
        TypeId::Guid | TypeId::IntN | TypeId::BitN | TypeId::FloatN | TypeId::MoneyN
        | TypeId::DateTimeN => {
            dst.put_u8(col.max_length as u8);
        }
        TypeId::DecimalN | TypeId::NumericN => {
            dst.put_u8((TypeId::decimal_width(col.precision) + 1) as u8);
            dst.put_u8(col.precision);
            dst.put_u8(col.scale);
        }
        TypeId::Date => {}
        TypeId::Time | TypeId::DateTime2 | TypeId::DateTimeOffset => {
            dst.put_u8(col.scale);
        }
        TypeId::BigVarChar | TypeId::BigChar | TypeId::NVarChar | TypeId::NChar => {
            dst.put_u16_le(col.max_length as u16);
            col.collation
                .unwrap_or_else(Collation::latin1_general_ci_as)
                .encode(dst);
        }
        TypeId::BigVarBinary | TypeId::BigBinary => {
            dst.put_u16_le(col.max_length as u16);
        }
        TypeId::Text | TypeId::NText => {
            dst.put_u32_le(0x7FFF_FFFF); // max-length sentinel
            col.collation
                .unwrap_or_else(Collation::latin1_general_ci_as)
                .encode(dst);
        }
        TypeId::Image => {
            dst.put_u32_le(0x7FFF_FFFF);
        }
        TypeId::Xml => {
            dst.put_u8(0); // no schema collection
        }
        TypeId::Udt => {
            dst.put_u16_le(col.max_length as u16);
            write_b_varchar(dst, "");
            write_b_varchar(dst, "sys");
            write_b_varchar(dst, col.clr_type_name.as_deref().unwrap_or(""));
            crate::codec::write_us_varchar(dst, "");
        }
        _ => {}
    }
}
