//! MARS behavior: multiple logical sessions over one transport.

mod common;

use common::*;
use tdslink::{Client, Config};
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};

const SYN: u8 = 0x01;
const DATA: u8 = 0x08;

/// Read one whole client message from SMP DATA frames for any session;
/// returns (sid, packet type, payload).
async fn read_mars_message<S: AsyncRead + Unpin>(stream: &mut S) -> (u16, u8, Vec<u8>) {
    let mut payload = Vec::new();
    let mut message_sid = None;
    let mut message_type = None;

    loop {
        let (sid, inner) = read_smp_data(stream).await;
        if let Some(expected) = message_sid {
            assert_eq!(sid, expected, "interleaved client message");
        }
        message_sid = Some(sid);
        message_type.get_or_insert(inner[0]);
        payload.extend_from_slice(&inner[8..]);
        if inner[1] & 0x01 != 0 {
            return (sid, message_type.unwrap_or(0), payload);
        }
    }
}

/// Wrap a server reply packet in a DATA frame for `sid`.
async fn write_mars_tabular<S: AsyncWrite + Unpin>(
    stream: &mut S,
    sid: u16,
    seqnum: u32,
    token_bytes: &[u8],
    last: bool,
) {
    let inner = packet(0x04, token_bytes, last);
    stream
        .write_all(&smp(DATA, sid, seqnum, 100, &inner))
        .await
        .expect("server write");
}

/// Scenario S6: two sessions run interleaved result streams; each sees its
/// own rows, in server order.
#[tokio::test]
async fn interleaved_sessions_see_their_own_rows() {
    let (near, mut server) = tokio::io::duplex(1 << 20);

    let peer = tokio::spawn(async move {
        // SYN handshake for the default session.
        let (flags, sid, _) = read_smp(&mut server).await;
        assert_eq!((flags, sid), (SYN, 0));
        server.write_all(&smp(SYN, 0, 0, 4, &[])).await.expect("syn 0");

        // SYN handshake for the second session.
        let (flags, sid, _) = read_smp(&mut server).await;
        assert_eq!((flags, sid), (SYN, 1));
        server.write_all(&smp(SYN, 1, 0, 4, &[])).await.expect("syn 1");

        // Both batches arrive, tagged by session.
        let (sid_a, packet_type, payload_a) = read_mars_message(&mut server).await;
        assert_eq!(packet_type, 0x01);
        let (sid_b, packet_type, payload_b) = read_mars_message(&mut server).await;
        assert_eq!(packet_type, 0x01);
        assert_eq!((sid_a, sid_b), (0, 1));
        assert_eq!(batch_sql(&payload_a), "SELECT a FROM t1");
        assert_eq!(batch_sql(&payload_b), "SELECT b FROM t2");

        // Interleave the two result streams frame by frame.
        let mut first_0 = colmetadata(&[int_col("a")]);
        put_row_int(&mut first_0, 1);
        write_mars_tabular(&mut server, 0, 1, &first_0, false).await;

        let mut first_1 = colmetadata(&[int_col("b")]);
        put_row_int(&mut first_1, 100);
        write_mars_tabular(&mut server, 1, 1, &first_1, false).await;

        let mut rest_0 = bytes::BytesMut::new();
        put_row_int(&mut rest_0, 2);
        put_done_count(&mut rest_0, 2);
        write_mars_tabular(&mut server, 0, 2, &rest_0, true).await;

        let mut rest_1 = bytes::BytesMut::new();
        put_row_int(&mut rest_1, 200);
        put_done_count(&mut rest_1, 2);
        write_mars_tabular(&mut server, 1, 2, &rest_1, true).await;

        // Drain the client's ACKs so the duplex never backs up.
        loop {
            let mut byte = [0u8; 1];
            match server.read_exact(&mut byte).await {
                Ok(_) => {
                    let mut rest = [0u8; 15];
                    if server.read_exact(&mut rest).await.is_err() {
                        break;
                    }
                }
                Err(_) => break,
            }
        }
    });

    let mut client = Client::attach(near, Config::default().enable_mars(true))
        .await
        .expect("attach");

    let mut second = client.open_session().await.expect("second session");
    assert_eq!(second.sid(), Some(1));

    let mut batch_a = client.batch("SELECT a FROM t1").await.expect("batch a");
    let mut batch_b = second.batch("SELECT b FROM t2").await.expect("batch b");

    // Session 0 sees 1, 2 and nothing else.
    let mut seen_a = Vec::new();
    while let Some(row) = batch_a.next_row().await.expect("rows a") {
        seen_a.push(row.get::<i32>(0).expect("a"));
    }
    assert_eq!(seen_a, vec![1, 2]);

    // Session 1 sees 100, 200 in order.
    let mut seen_b = Vec::new();
    while let Some(row) = batch_b.next_row().await.expect("rows b") {
        seen_b.push(row.get::<i32>(0).expect("b"));
    }
    assert_eq!(seen_b, vec![100, 200]);

    drop(batch_a);
    drop(batch_b);
    drop(second);
    drop(client);

    peer.await.expect("server");
}

/// A MARS session id is allocated monotonically per open.
#[tokio::test]
async fn session_ids_are_monotonic() {
    let (near, mut server) = tokio::io::duplex(1 << 16);

    let peer = tokio::spawn(async move {
        for expected in 0u16..3 {
            let (flags, sid, _) = read_smp(&mut server).await;
            assert_eq!((flags, sid), (SYN, expected));
            server
                .write_all(&smp(SYN, expected, 0, 4, &[]))
                .await
                .expect("syn");
        }
        server
    });

    let client = Client::attach(near, Config::default().enable_mars(true))
        .await
        .expect("attach");

    let s1 = client.open_session().await.expect("session 1");
    let s2 = client.open_session().await.expect("session 2");
    assert_eq!(s1.sid(), Some(1));
    assert_eq!(s2.sid(), Some(2));

    drop(s1);
    drop(s2);
    drop(client);
    let _ = peer.await;
}

/// Opening extra sessions without MARS is refused.
#[tokio::test]
async fn extra_sessions_require_mars() {
    let (near, _server) = tokio::io::duplex(1 << 10);
    let client = Client::attach(near, Config::default()).await.expect("attach");
    assert!(client.open_session().await.is_err());
}
