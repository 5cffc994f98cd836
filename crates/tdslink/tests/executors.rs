//! Executor behavior against a scripted in-process server.

mod common;

use bytes::BytesMut;
use common::*;
use tdslink::{Client, Config, Error, SqlValue};
use tdslink_protocol::token::done_status;
use tokio::io::AsyncWriteExt;

async fn attach(config: Config) -> (Client, tokio::io::DuplexStream) {
    let (near, far) = tokio::io::duplex(1 << 20);
    let client = Client::attach(near, config).await.expect("attach");
    (client, far)
}

/// A `SELECT CAST(1 AS INT), CAST(NULL AS NVARCHAR(10))` equivalent: one
/// row of (1, NULL), then DONE with row count 1.
#[tokio::test]
async fn batch_select_int_and_null_string() {
    let (mut client, mut server) = attach(Config::default()).await;

    let peer = tokio::spawn(async move {
        let (packet_type, payload) = read_message(&mut server).await;
        assert_eq!(packet_type, 0x01, "expected a sql-batch message");
        assert_eq!(batch_sql(&payload), "SELECT CAST(1 AS INT), CAST(NULL AS NVARCHAR(10))");

        let mut reply = colmetadata(&[int_col("a"), nvarchar_col("b", 10)]);
        put_row_int_str(&mut reply, 1, None);
        put_done_count(&mut reply, 1);
        write_tabular(&mut server, &reply).await;
        server
    });

    let mut batch = client
        .batch("SELECT CAST(1 AS INT), CAST(NULL AS NVARCHAR(10))")
        .await
        .expect("batch");

    let row = batch.next_row().await.expect("row").expect("one row");
    assert_eq!(row.get::<i32>(0).expect("int"), 1);
    assert_eq!(row.get::<Option<String>>(1).expect("null string"), None);
    assert_eq!(row.columns()[0].name, "a");

    assert!(batch.next_row().await.expect("end").is_none());
    assert!(batch.is_finished());
    assert_eq!(batch.row_count(), Some(1));

    peer.await.expect("server");
}

/// sp_executesql with `@p1 INT = 42`: the request goes out as an RPC with
/// the well-known proc id; the reply is one row [84] and RETURNSTATUS 0.
#[tokio::test]
async fn rpc_parameterized_query() {
    let (mut client, mut server) = attach(Config::default()).await;

    let peer = tokio::spawn(async move {
        let (packet_type, payload) = read_message(&mut server).await;
        assert_eq!(packet_type, 0x03, "expected an rpc message");
        // ALL_HEADERS (22 bytes), then the PROCID form of sp_executesql.
        assert_eq!(&payload[22..26], &[0xFF, 0xFF, 0x0A, 0x00]);

        let mut reply = colmetadata(&[int_col("")]);
        put_row_int(&mut reply, 84);
        put_return_status(&mut reply, 0);
        put_done(&mut reply, done_status::COUNT, 1);
        write_tabular(&mut server, &reply).await;
    });

    let mut result = client
        .query("SELECT @p1 * 2", &[&42i32])
        .await
        .expect("query");

    let rows = result.fetch_all().await.expect("rows");
    assert_eq!(rows.len(), 1);
    assert_eq!(rows[0].get::<i32>(0).expect("value"), 84);
    assert_eq!(result.return_status(), Some(0));

    peer.await.expect("server");
}

/// RETURNVALUE tokens populate output-parameter slots keyed by ordinal.
#[tokio::test]
async fn rpc_output_parameter() {
    let (mut client, mut server) = attach(Config::default()).await;

    let peer = tokio::spawn(async move {
        let (packet_type, _payload) = read_message(&mut server).await;
        assert_eq!(packet_type, 0x03);

        let mut reply = BytesMut::new();
        put_return_status(&mut reply, 0);
        put_return_value_int(&mut reply, 1, "@total", 99);
        put_done(&mut reply, 0, 0);
        write_tabular(&mut server, &reply).await;
    });

    let request = tdslink::RpcRequest::named("dbo.usp_total")
        .param(tdslink::RpcParam::int("@total", 0).as_output());
    let mut call = client.rpc(request).await.expect("rpc");

    assert!(call.next_row().await.expect("drain").is_none());
    assert_eq!(call.output(1), Some(&SqlValue::Int(99)));
    assert_eq!(call.outputs()[0].name, "@total");

    peer.await.expect("server");
}

/// Property 4: after ENVCHANGE begin-transaction with descriptor X, every
/// subsequent request embeds X in its ALL_HEADERS; after commit it reverts
/// to 0.
#[tokio::test]
async fn transaction_descriptor_propagation() {
    const DESCRIPTOR: u64 = 0x00AB_CDEF_0123_4567;

    let (mut client, mut server) = attach(Config::default()).await;

    let peer = tokio::spawn(async move {
        // Begin: a TM request carrying descriptor 0.
        let (packet_type, payload) = read_message(&mut server).await;
        assert_eq!(packet_type, 0x0E, "expected a tm-request message");
        assert_eq!(transaction_descriptor(&payload), 0);

        let mut reply = BytesMut::new();
        put_envchange_begin(&mut reply, DESCRIPTOR);
        put_done(&mut reply, 0, 0);
        write_tabular(&mut server, &reply).await;

        // The next batch must carry the new descriptor.
        let (packet_type, payload) = read_message(&mut server).await;
        assert_eq!(packet_type, 0x01);
        assert_eq!(transaction_descriptor(&payload), DESCRIPTOR);

        let mut reply = BytesMut::new();
        put_done(&mut reply, done_status::COUNT, 1);
        write_tabular(&mut server, &reply).await;

        // Commit carries the descriptor, and resets it.
        let (packet_type, payload) = read_message(&mut server).await;
        assert_eq!(packet_type, 0x0E);
        assert_eq!(transaction_descriptor(&payload), DESCRIPTOR);

        let mut reply = BytesMut::new();
        put_envchange_commit(&mut reply);
        put_done(&mut reply, 0, 0);
        write_tabular(&mut server, &reply).await;

        // Back to auto-commit: descriptor 0.
        let (_, payload) = read_message(&mut server).await;
        assert_eq!(transaction_descriptor(&payload), 0);

        let mut reply = BytesMut::new();
        put_done(&mut reply, done_status::COUNT, 1);
        write_tabular(&mut server, &reply).await;
    });

    client.begin_transaction().await.expect("begin");
    assert_eq!(client.transaction_descriptor(), DESCRIPTOR);

    client.execute("INSERT INTO t VALUES (1)").await.expect("insert");

    client.commit().await.expect("commit");
    assert_eq!(client.transaction_descriptor(), 0);

    client.execute("INSERT INTO t VALUES (2)").await.expect("insert");

    peer.await.expect("server");
}

/// Scenario S5: dropping a batch mid-stream sends an attention before the
/// next statement; the drain consumes the remaining rows and the DONE with
/// the attention bit, and the next statement succeeds.
#[tokio::test]
async fn dropped_batch_cancels_before_next_statement() {
    let (mut client, mut server) = attach(Config::default()).await;

    let peer = tokio::spawn(async move {
        let (packet_type, _) = read_message(&mut server).await;
        assert_eq!(packet_type, 0x01);

        // First packet of a multi-packet result: metadata and three rows,
        // message not yet complete.
        let mut part = colmetadata(&[int_col("n")]);
        for v in 1..=3 {
            put_row_int(&mut part, v);
        }
        server
            .write_all(&packet(0x04, &part, false))
            .await
            .expect("partial result");

        // The client abandons the statement: an attention arrives.
        let (packet_type, _) = read_message(&mut server).await;
        assert_eq!(packet_type, 0x06, "expected an attention signal");

        // Terminate the interrupted response with the attention ack.
        let mut tail = BytesMut::new();
        put_done(&mut tail, done_status::ATTN, 0);
        write_tabular(&mut server, &tail).await;

        // The follow-up statement runs normally.
        let (packet_type, payload) = read_message(&mut server).await;
        assert_eq!(packet_type, 0x01);
        assert_eq!(batch_sql(&payload), "SELECT 7");

        let mut reply = colmetadata(&[int_col("n")]);
        put_row_int(&mut reply, 7);
        put_done_count(&mut reply, 1);
        write_tabular(&mut server, &reply).await;
    });

    {
        let mut batch = client.batch("SELECT n FROM big").await.expect("batch");
        let row = batch.next_row().await.expect("row").expect("first row");
        assert_eq!(row.get::<i32>(0).expect("n"), 1);
        // Dropped here with rows still in flight.
    }

    let mut batch = client.batch("SELECT 7").await.expect("next statement");
    let row = batch.next_row().await.expect("row").expect("one row");
    assert_eq!(row.get::<i32>(0).expect("n"), 7);
    assert!(batch.next_row().await.expect("end").is_none());

    peer.await.expect("server");
}

/// Explicit cancellation drains to the attention acknowledgment and leaves
/// the session reusable.
#[tokio::test]
async fn explicit_cancel() {
    let (mut client, mut server) = attach(Config::default()).await;

    let peer = tokio::spawn(async move {
        let _ = read_message(&mut server).await;

        let mut part = colmetadata(&[int_col("n")]);
        put_row_int(&mut part, 1);
        server
            .write_all(&packet(0x04, &part, false))
            .await
            .expect("partial");

        let (packet_type, _) = read_message(&mut server).await;
        assert_eq!(packet_type, 0x06);

        let mut tail = BytesMut::new();
        put_done(&mut tail, done_status::ATTN, 0);
        write_tabular(&mut server, &tail).await;
    });

    let batch = client.batch("SELECT n FROM big").await.expect("batch");
    batch.cancel().await.expect("cancel is not an error");

    peer.await.expect("server");
}

/// A server error without a message handler fails the statement after the
/// stream drains; rows before the error are still delivered.
#[tokio::test]
async fn server_error_fails_statement() {
    let (mut client, mut server) = attach(Config::default()).await;

    let peer = tokio::spawn(async move {
        let _ = read_message(&mut server).await;

        let mut reply = colmetadata(&[int_col("n")]);
        put_row_int(&mut reply, 1);
        put_error(&mut reply, 8134, 16, "Divide by zero error encountered.");
        put_done(&mut reply, done_status::ERROR, 0);
        write_tabular(&mut server, &reply).await;
    });

    let mut batch = client.batch("SELECT 1/0").await.expect("batch");
    let row = batch.next_row().await.expect("row before error");
    assert!(row.is_some());

    let err = batch.next_row().await.expect_err("statement must fail");
    match err {
        Error::Server {
            number, class, message, ..
        } => {
            assert_eq!(number, 8134);
            assert_eq!(class, 16);
            assert!(message.contains("Divide by zero"));
        }
        other => panic!("expected server error, got {other:?}"),
    }

    peer.await.expect("server");
}

/// With a message handler installed, server errors are reported to the
/// handler and the statement completes normally.
#[tokio::test]
async fn message_handler_swallows_errors() {
    use std::sync::Arc;
    use std::sync::atomic::{AtomicI32, Ordering};

    let seen = Arc::new(AtomicI32::new(0));
    let seen_clone = Arc::clone(&seen);

    let config = Config::default().on_message(move |m| {
        seen_clone.store(m.number, Ordering::SeqCst);
    });
    let (mut client, mut server) = attach(config).await;

    let peer = tokio::spawn(async move {
        let _ = read_message(&mut server).await;

        let mut reply = BytesMut::new();
        put_error(&mut reply, 50000, 16, "handled elsewhere");
        put_done(&mut reply, 0, 0);
        write_tabular(&mut server, &reply).await;
    });

    let mut batch = client.batch("RAISERROR...").await.expect("batch");
    assert!(batch.next_row().await.expect("no failure").is_none());
    assert_eq!(seen.load(std::sync::atomic::Ordering::SeqCst), 50000);

    peer.await.expect("server");
}

/// The row-count callback fires for every DONE with a valid count.
#[tokio::test]
async fn count_handler_receives_row_counts() {
    use std::sync::Arc;
    use std::sync::atomic::{AtomicU64, Ordering};

    let count = Arc::new(AtomicU64::new(0));
    let count_clone = Arc::clone(&count);

    let config = Config::default().on_row_count(move |rows, _cmd| {
        count_clone.store(rows, Ordering::SeqCst);
    });
    let (mut client, mut server) = attach(config).await;

    let peer = tokio::spawn(async move {
        let _ = read_message(&mut server).await;
        let mut reply = BytesMut::new();
        put_done_count(&mut reply, 1234);
        write_tabular(&mut server, &reply).await;
    });

    let affected = client.execute("UPDATE t SET x = 1").await.expect("execute");
    assert_eq!(affected, 1234);
    assert_eq!(count.load(std::sync::atomic::Ordering::SeqCst), 1234);

    peer.await.expect("server");
}

/// Bulk insert: INSERT BULK batch, then one bulk-load message with
/// COLMETADATA, ROW tokens and the trailing DONE.
#[tokio::test]
async fn bulk_insert_framing() {
    use tdslink::{ColumnMeta, TypeId};

    const ROWS: usize = 250;

    let (mut client, mut server) = attach(Config::default()).await;

    let peer = tokio::spawn(async move {
        // Bulk mode entry.
        let (packet_type, payload) = read_message(&mut server).await;
        assert_eq!(packet_type, 0x01);
        let sql = batch_sql(&payload);
        assert!(sql.starts_with("INSERT BULK dbo.items"), "{sql}");
        assert!(sql.contains("[id] int"), "{sql}");
        assert!(sql.contains("[label] varchar(50)"), "{sql}");

        let mut reply = BytesMut::new();
        put_done(&mut reply, 0, 0);
        write_tabular(&mut server, &reply).await;

        // The bulk-load message itself.
        let (packet_type, payload) = read_message(&mut server).await;
        assert_eq!(packet_type, 0x07, "expected a bulk-load message");
        assert_eq!(payload[0], 0x81, "message must start with COLMETADATA");
        let rows = payload.iter().filter(|&&b| b == 0xD1).count();
        assert!(rows >= ROWS, "expected at least {ROWS} row tokens");

        let mut reply = BytesMut::new();
        put_done_count(&mut reply, ROWS as u64);
        write_tabular(&mut server, &reply).await;
    });

    let columns = vec![
        ColumnMeta::new("id", TypeId::Int),
        ColumnMeta::new("label", TypeId::BigVarChar)
            .with_max_length(50)
            .with_nullable(true),
    ];

    let mut load = client
        .bulk_insert("dbo.items", columns)
        .await
        .expect("bulk insert");

    for i in 0..ROWS {
        load.send_row(&[
            SqlValue::Int(i as i32),
            SqlValue::String(format!("item-{i}")),
        ])
        .expect("row");
    }

    let inserted = load.finish().await.expect("finish");
    assert_eq!(inserted, ROWS as u64);

    peer.await.expect("server");
}

/// An elapsed command deadline is treated as a cancellation: attention out,
/// drain to the ack, `Timeout` reported, session reusable.
#[tokio::test]
async fn timeout_cancels_statement() {
    let config = Config::default().command_timeout(std::time::Duration::from_millis(100));
    let (mut client, mut server) = attach(config).await;

    let peer = tokio::spawn(async move {
        let _ = read_message(&mut server).await;

        // Say nothing until the attention arrives.
        let (packet_type, _) = read_message(&mut server).await;
        assert_eq!(packet_type, 0x06);

        let mut tail = BytesMut::new();
        put_done(&mut tail, done_status::ATTN, 0);
        write_tabular(&mut server, &tail).await;

        // The session stays usable.
        let _ = read_message(&mut server).await;
        let mut reply = BytesMut::new();
        put_done_count(&mut reply, 1);
        write_tabular(&mut server, &reply).await;
    });

    let mut batch = client.batch("WAITFOR DELAY '00:10'").await.expect("batch");
    assert!(matches!(batch.next_row().await, Err(Error::Timeout)));
    drop(batch);

    let affected = client.execute("SELECT 1").await.expect("follow-up");
    assert_eq!(affected, 1);

    peer.await.expect("server");
}
