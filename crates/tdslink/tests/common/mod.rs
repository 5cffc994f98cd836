//! Scripted-server helpers shared by the integration tests.
//!
//! Tests drive real executors against an in-process peer over
//! `tokio::io::duplex`, speaking raw TDS bytes on the server side.

#![allow(dead_code)]

use bytes::{BufMut, BytesMut};
use tdslink_protocol::packet::PACKET_HEADER_SIZE;
use tdslink_protocol::token::{Done, TokenType, done_status, write_colmetadata};
use tdslink_protocol::{Collation, ColumnMeta, TypeId};
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};

/// Frame a payload chunk as one TDS packet.
pub fn packet(packet_type: u8, payload: &[u8], last: bool) -> Vec<u8> {
    let mut buf = Vec::with_capacity(PACKET_HEADER_SIZE + payload.len());
    buf.push(packet_type);
    buf.push(if last { 0x01 } else { 0x00 });
    buf.extend_from_slice(&((PACKET_HEADER_SIZE + payload.len()) as u16).to_be_bytes());
    buf.extend_from_slice(&[0, 0, 1, 0]);
    buf.extend_from_slice(payload);
    buf
}

/// A single-packet tabular-result message.
pub fn tabular(payload: &[u8]) -> Vec<u8> {
    packet(0x04, payload, true)
}

/// Read one whole client message; returns (packet type, payload).
pub async fn read_message<S: AsyncRead + Unpin>(stream: &mut S) -> (u8, Vec<u8>) {
    let mut payload = Vec::new();
    loop {
        let mut header = [0u8; PACKET_HEADER_SIZE];
        stream.read_exact(&mut header).await.expect("client header");
        let length = u16::from_be_bytes([header[2], header[3]]) as usize;
        let mut chunk = vec![0u8; length - PACKET_HEADER_SIZE];
        stream.read_exact(&mut chunk).await.expect("client payload");
        payload.extend_from_slice(&chunk);
        if header[1] & 0x01 != 0 {
            return (header[0], payload);
        }
    }
}

/// Write a server reply as one tabular-result message.
pub async fn write_tabular<S: AsyncWrite + Unpin>(stream: &mut S, payload: &[u8]) {
    stream
        .write_all(&tabular(payload))
        .await
        .expect("server write");
}

/// Decode the UTF-16LE SQL text of a batch payload (skipping ALL_HEADERS).
pub fn batch_sql(payload: &[u8]) -> String {
    let text = &payload[22..];
    let units: Vec<u16> = text
        .chunks_exact(2)
        .map(|c| u16::from_le_bytes([c[0], c[1]]))
        .collect();
    String::from_utf16(&units).expect("batch text")
}

/// The transaction descriptor embedded in a request's ALL_HEADERS.
pub fn transaction_descriptor(payload: &[u8]) -> u64 {
    u64::from_le_bytes(payload[10..18].try_into().expect("all-headers"))
}

/// An INT column in its nullable wire form.
pub fn int_col(name: &str) -> ColumnMeta {
    ColumnMeta::new(name, TypeId::IntN)
        .with_max_length(4)
        .with_nullable(true)
}

/// An NVARCHAR(len) column.
pub fn nvarchar_col(name: &str, chars: u32) -> ColumnMeta {
    ColumnMeta::new(name, TypeId::NVarChar)
        .with_max_length(chars * 2)
        .with_nullable(true)
        .with_collation(Collation::latin1_general_ci_as())
}

/// COLMETADATA token bytes for `cols`.
pub fn colmetadata(cols: &[ColumnMeta]) -> BytesMut {
    let mut buf = BytesMut::new();
    write_colmetadata(&mut buf, cols);
    buf
}

/// Append a ROW token with an INT value.
pub fn put_row_int(buf: &mut BytesMut, value: i32) {
    buf.put_u8(TokenType::Row as u8);
    buf.put_u8(4);
    buf.put_i32_le(value);
}

/// Append a ROW token with an INT and a nullable NVARCHAR value.
pub fn put_row_int_str(buf: &mut BytesMut, value: i32, text: Option<&str>) {
    buf.put_u8(TokenType::Row as u8);
    buf.put_u8(4);
    buf.put_i32_le(value);
    match text {
        Some(s) => {
            let units: Vec<u16> = s.encode_utf16().collect();
            buf.put_u16_le((units.len() * 2) as u16);
            for u in units {
                buf.put_u16_le(u);
            }
        }
        None => buf.put_u16_le(0xFFFF),
    }
}

/// Append a final DONE token with a valid row count.
pub fn put_done_count(buf: &mut BytesMut, row_count: u64) {
    Done {
        status: done_status::COUNT,
        cur_cmd: 0xC1,
        row_count,
    }
    .encode(buf);
}

/// Append a DONE token with arbitrary status bits.
pub fn put_done(buf: &mut BytesMut, status: u16, row_count: u64) {
    Done {
        status,
        cur_cmd: 0,
        row_count,
    }
    .encode(buf);
}

/// Append an ENVCHANGE begin-transaction token carrying `descriptor`.
pub fn put_envchange_begin(buf: &mut BytesMut, descriptor: u64) {
    buf.put_u8(TokenType::EnvChange as u8);
    buf.put_u16_le(11);
    buf.put_u8(8);
    buf.put_u8(8);
    buf.put_u64_le(descriptor);
    buf.put_u8(0);
}

/// Append an ENVCHANGE commit-transaction token.
pub fn put_envchange_commit(buf: &mut BytesMut) {
    buf.put_u8(TokenType::EnvChange as u8);
    buf.put_u16_le(3);
    buf.put_u8(9);
    buf.put_u8(0);
    buf.put_u8(0);
}

/// Append an ERROR token.
pub fn put_error(buf: &mut BytesMut, number: i32, class: u8, message: &str) {
    let mut body = BytesMut::new();
    body.put_i32_le(number);
    body.put_u8(1); // state
    body.put_u8(class);
    let units: Vec<u16> = message.encode_utf16().collect();
    body.put_u16_le(units.len() as u16);
    for u in &units {
        body.put_u16_le(*u);
    }
    body.put_u8(0); // server name
    body.put_u8(0); // procedure name
    body.put_i32_le(1); // line

    buf.put_u8(TokenType::Error as u8);
    buf.put_u16_le(body.len() as u16);
    buf.put_slice(&body);
}

/// Append a RETURNSTATUS token.
pub fn put_return_status(buf: &mut BytesMut, status: i32) {
    buf.put_u8(TokenType::ReturnStatus as u8);
    buf.put_i32_le(status);
}

/// Append a RETURNVALUE token carrying an INT output parameter.
pub fn put_return_value_int(buf: &mut BytesMut, ordinal: u16, name: &str, value: i32) {
    buf.put_u8(TokenType::ReturnValue as u8);
    buf.put_u16_le(ordinal);
    let units: Vec<u16> = name.encode_utf16().collect();
    buf.put_u8(units.len() as u8);
    for u in &units {
        buf.put_u16_le(*u);
    }
    buf.put_u8(0x01); // status: output
    buf.put_u32_le(0); // user type
    buf.put_u16_le(0x0001); // flags: nullable
    buf.put_u8(TypeId::IntN as u8);
    buf.put_u8(4);
    buf.put_u8(4);
    buf.put_i32_le(value);
}

// =============================================================================
// SMP helpers for MARS tests
// =============================================================================

/// Frame bytes in an SMP header.
pub fn smp(flags: u8, sid: u16, seqnum: u32, window: u32, payload: &[u8]) -> Vec<u8> {
    let mut buf = Vec::with_capacity(16 + payload.len());
    buf.push(0x53);
    buf.push(flags);
    buf.extend_from_slice(&sid.to_le_bytes());
    buf.extend_from_slice(&((16 + payload.len()) as u32).to_le_bytes());
    buf.extend_from_slice(&seqnum.to_le_bytes());
    buf.extend_from_slice(&window.to_le_bytes());
    buf.extend_from_slice(payload);
    buf
}

/// Read one SMP frame; returns (flags, sid, inner payload).
pub async fn read_smp<S: AsyncRead + Unpin>(stream: &mut S) -> (u8, u16, Vec<u8>) {
    let mut header = [0u8; 16];
    stream.read_exact(&mut header).await.expect("smp header");
    assert_eq!(header[0], 0x53, "not an SMP frame");
    let flags = header[1];
    let sid = u16::from_le_bytes([header[2], header[3]]);
    let length = u32::from_le_bytes([header[4], header[5], header[6], header[7]]) as usize;
    let mut payload = vec![0u8; length - 16];
    stream.read_exact(&mut payload).await.expect("smp payload");
    (flags, sid, payload)
}

/// Read SMP frames until a DATA frame arrives, acknowledging nothing;
/// returns (sid, inner TDS payload bytes).
pub async fn read_smp_data<S: AsyncRead + Unpin>(stream: &mut S) -> (u16, Vec<u8>) {
    loop {
        let (flags, sid, payload) = read_smp(stream).await;
        if flags == 0x08 {
            return (sid, payload);
        }
    }
}
