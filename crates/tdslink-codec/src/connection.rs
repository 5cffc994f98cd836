//! The transport-level connection: one reader task, a shared writer behind
//! the send lock, and the logical sessions multiplexed on top.
//!
//! The reader task owns the socket's read half. It decodes frames, routes
//! complete packets into per-session queues, answers MARS DATA frames with
//! ACKs and refreshes sender credit from every inbound window field. A
//! transport fault is recorded once and surfaced to every waiting session.

use std::collections::HashMap;
use std::pin::pin;
use std::sync::Arc;
use std::sync::atomic::{AtomicU32, Ordering};
use std::time::Duration;

use bytes::{Bytes, BytesMut};
use futures_util::{SinkExt, StreamExt};
use tdslink_protocol::packet::{PACKET_HEADER_SIZE, PacketHeader, PacketStatus, PacketType};
use tdslink_protocol::smp::{SmpFlags, SmpHeader};
use tokio::io::{AsyncRead, AsyncWrite, ReadHalf, WriteHalf};
use tokio::sync::{Mutex, Notify, mpsc, oneshot};
use tokio_util::codec::{FramedRead, FramedWrite};

use crate::error::CodecError;
use crate::message::Inbound;
use crate::packet_codec::{Frame, Outbound, Packet, TdsCodec};

/// Receive-window credit advertised beyond the last received frame.
const WINDOW_SIZE: u32 = 4;

/// Connection tuning knobs.
#[derive(Debug, Clone, Default)]
pub struct ConnectionOptions {
    /// Whether the wire is SMP-framed (MARS).
    pub mars: bool,
    /// Negotiated packet size; 0 means the protocol default.
    pub packet_size: u32,
    /// Outgoing packet pacing, packets per second.
    pub rate_limit: Option<u32>,
}

/// MARS per-session flow-control state.
#[derive(Debug)]
struct Flow {
    /// Next sequence number to assign to an outgoing DATA frame.
    send_seq: AtomicU32,
    /// Exclusive upper bound on sequence numbers the peer will accept.
    peer_window: AtomicU32,
    /// Count of DATA frames received.
    recv_seq: AtomicU32,
    /// Woken whenever the peer window advances.
    credit: Notify,
}

impl Flow {
    fn new() -> Self {
        Self {
            send_seq: AtomicU32::new(1),
            // No credit until the peer's SYN reply advertises its window.
            peer_window: AtomicU32::new(0),
            recv_seq: AtomicU32::new(0),
            credit: Notify::new(),
        }
    }

    /// The sequence number of the most recently sent frame.
    fn last_sent(&self) -> u32 {
        self.send_seq.load(Ordering::Acquire).wrapping_sub(1)
    }

    /// The receive window to advertise to the peer.
    fn advertised_window(&self) -> u32 {
        self.recv_seq.load(Ordering::Acquire) + WINDOW_SIZE
    }

    fn refresh_peer_window(&self, window: u32) {
        let previous = self.peer_window.fetch_max(window, Ordering::AcqRel);
        if window > previous {
            self.credit.notify_waiters();
        }
    }
}

struct MarsEntry {
    tx: mpsc::UnboundedSender<Inbound>,
    flow: Arc<Flow>,
}

#[derive(Default)]
struct Registry {
    main_tx: Option<mpsc::UnboundedSender<Inbound>>,
    sessions: HashMap<u16, MarsEntry>,
    pending_syn: HashMap<u16, oneshot::Sender<u32>>,
    next_sid: u16,
}

/// The writer half plus optional outgoing pacing, guarded by the send lock.
struct PacedWriter<T: AsyncRead + AsyncWrite> {
    sink: FramedWrite<WriteHalf<T>, TdsCodec>,
    min_interval: Option<Duration>,
    next_slot: tokio::time::Instant,
}

impl<T: AsyncRead + AsyncWrite> PacedWriter<T> {
    async fn send(&mut self, out: Outbound) -> Result<(), CodecError> {
        if let Some(interval) = self.min_interval {
            tokio::time::sleep_until(self.next_slot).await;
            self.next_slot = tokio::time::Instant::now() + interval;
        }
        self.sink.send(out).await
    }
}

struct Shared<T: AsyncRead + AsyncWrite> {
    writer: Mutex<PacedWriter<T>>,
    registry: parking_lot::Mutex<Registry>,
    fault: parking_lot::Mutex<Option<CodecError>>,
    packet_size: AtomicU32,
    mars: bool,
}

impl<T: AsyncRead + AsyncWrite> Shared<T> {
    fn fault(&self) -> Option<CodecError> {
        self.fault.lock().clone()
    }

    /// Record a fault and wake every session by closing its queue.
    fn fail(&self, error: CodecError) {
        {
            let mut fault = self.fault.lock();
            if fault.is_none() {
                *fault = Some(error);
            }
        }
        let mut registry = self.registry.lock();
        registry.main_tx = None;
        registry.sessions.clear();
        registry.pending_syn.clear();
    }
}

/// A connection over one transport.
///
/// Owns the reader task; dropping the connection stops the task, closes the
/// transport and wakes all waiters with a connection-closed error.
pub struct Connection<T: AsyncRead + AsyncWrite + Send + 'static> {
    shared: Arc<Shared<T>>,
    main_rx: parking_lot::Mutex<Option<mpsc::UnboundedReceiver<Inbound>>>,
    worker: tokio::task::JoinHandle<()>,
}

impl<T: AsyncRead + AsyncWrite + Send + 'static> Connection<T> {
    /// Take ownership of a transport that has finished login.
    #[must_use]
    pub fn new(transport: T, options: ConnectionOptions) -> Self {
        let (read_half, write_half) = tokio::io::split(transport);

        let packet_size = if options.packet_size == 0 {
            tdslink_protocol::DEFAULT_PACKET_SIZE as u32
        } else {
            options.packet_size
        };

        let min_interval = options
            .rate_limit
            .filter(|&rate| rate > 0)
            .map(|rate| Duration::from_secs_f64(1.0 / f64::from(rate)));

        let mut registry = Registry::default();
        let main_rx = if options.mars {
            None
        } else {
            let (tx, rx) = mpsc::unbounded_channel();
            registry.main_tx = Some(tx);
            Some(rx)
        };

        let shared = Arc::new(Shared {
            writer: Mutex::new(PacedWriter {
                sink: FramedWrite::new(write_half, TdsCodec::new(options.mars)),
                min_interval,
                next_slot: tokio::time::Instant::now(),
            }),
            registry: parking_lot::Mutex::new(registry),
            fault: parking_lot::Mutex::new(None),
            packet_size: AtomicU32::new(packet_size),
            mars: options.mars,
        });

        let reader = FramedRead::new(read_half, TdsCodec::new(options.mars));
        let worker = tokio::spawn(reader_task(reader, Arc::clone(&shared)));

        Self {
            shared,
            main_rx: parking_lot::Mutex::new(main_rx),
            worker,
        }
    }

    /// Whether this connection multiplexes MARS sessions.
    #[must_use]
    pub fn is_mars(&self) -> bool {
        self.shared.mars
    }

    /// Update the packet size after an ENVCHANGE.
    pub fn set_packet_size(&self, packet_size: u32) {
        self.shared
            .packet_size
            .store(packet_size, Ordering::Release);
    }

    /// Open a logical session.
    ///
    /// Without MARS this hands out the connection's single main session (it
    /// can be taken once). With MARS it performs the SYN handshake for a
    /// fresh session id.
    pub async fn open_session(&self) -> Result<Session<T>, CodecError> {
        if let Some(error) = self.shared.fault() {
            return Err(error);
        }

        if !self.shared.mars {
            let rx = self
                .main_rx
                .lock()
                .take()
                .ok_or(CodecError::SessionClosed)?;
            return Ok(Session {
                shared: Arc::clone(&self.shared),
                rx,
                sid: None,
                flow: None,
                pending_cancel: false,
            });
        }

        let (tx, rx) = mpsc::unbounded_channel();
        let flow = Arc::new(Flow::new());
        let (syn_tx, syn_rx) = oneshot::channel();

        let sid = {
            let mut registry = self.shared.registry.lock();
            let sid = registry.next_sid;
            registry.next_sid = registry.next_sid.wrapping_add(1);
            registry.sessions.insert(
                sid,
                MarsEntry {
                    tx,
                    flow: Arc::clone(&flow),
                },
            );
            registry.pending_syn.insert(sid, syn_tx);
            sid
        };

        tracing::debug!(sid, "opening MARS session");

        {
            let mut writer = self.shared.writer.lock().await;
            writer
                .send(Outbound::control(SmpHeader::control(
                    SmpFlags::Syn,
                    sid,
                    0,
                    WINDOW_SIZE,
                )))
                .await?;
        }

        let peer_window = syn_rx
            .await
            .map_err(|_| self.shared.fault().unwrap_or(CodecError::ConnectionClosed))?;
        flow.refresh_peer_window(peer_window);

        Ok(Session {
            shared: Arc::clone(&self.shared),
            rx,
            sid: Some(sid),
            flow: Some(flow),
            pending_cancel: false,
        })
    }
}

impl<T: AsyncRead + AsyncWrite + Send + 'static> Drop for Connection<T> {
    fn drop(&mut self) {
        self.worker.abort();
        self.shared.fail(CodecError::ConnectionClosed);
    }
}

impl<T: AsyncRead + AsyncWrite + Send + 'static> std::fmt::Debug for Connection<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Connection")
            .field("mars", &self.shared.mars)
            .finish_non_exhaustive()
    }
}

/// A logical session: the main request/response channel of a plain
/// connection, or one MARS subchannel.
///
/// At most one request may be in flight per session; the executor enforces
/// this by draining to the final DONE before the next send.
pub struct Session<T: AsyncRead + AsyncWrite + Send + 'static> {
    shared: Arc<Shared<T>>,
    rx: mpsc::UnboundedReceiver<Inbound>,
    sid: Option<u16>,
    flow: Option<Arc<Flow>>,
    /// Set when a statement was dropped mid-stream; the next operation must
    /// send an attention and drain before reusing the session.
    pub pending_cancel: bool,
}

impl<T: AsyncRead + AsyncWrite + Send + 'static> Session<T> {
    /// The MARS session id, if any.
    #[must_use]
    pub fn sid(&self) -> Option<u16> {
        self.sid
    }

    /// Update the connection's packet size after an ENVCHANGE.
    pub fn set_packet_size(&self, packet_size: u32) {
        self.shared
            .packet_size
            .store(packet_size, Ordering::Release);
    }

    /// Send one complete client message, split into packets of the
    /// negotiated size. Packets of the message are contiguous on the wire
    /// unless MARS flow control forces a wait for credit.
    pub async fn send_msg(&self, packet_type: PacketType, payload: Bytes) -> Result<(), CodecError> {
        if let Some(error) = self.shared.fault() {
            return Err(error);
        }

        let max_payload =
            self.shared.packet_size.load(Ordering::Acquire) as usize - PACKET_HEADER_SIZE;

        let chunks: Vec<&[u8]> = if payload.is_empty() {
            vec![&[]]
        } else {
            payload.chunks(max_payload).collect()
        };
        let last = chunks.len() - 1;

        let mut writer = self.shared.writer.lock().await;

        for (i, chunk) in chunks.into_iter().enumerate() {
            let status = if i == last {
                PacketStatus::END_OF_MESSAGE
            } else {
                PacketStatus::NORMAL
            };
            let packet = Packet::new(
                PacketHeader::new(packet_type, status, 0),
                BytesMut::from(chunk),
            );

            let out = match (&self.flow, self.sid) {
                (Some(flow), Some(sid)) => {
                    // Respect the peer window; release the send lock while
                    // parked so the reader task can still emit ACKs.
                    loop {
                        if flow.send_seq.load(Ordering::Acquire)
                            < flow.peer_window.load(Ordering::Acquire)
                        {
                            break;
                        }
                        let mut notified = pin!(flow.credit.notified());
                        notified.as_mut().enable();
                        if flow.send_seq.load(Ordering::Acquire)
                            < flow.peer_window.load(Ordering::Acquire)
                        {
                            break;
                        }
                        drop(writer);
                        tracing::trace!(sid, "waiting for MARS send credit");
                        notified.await;
                        writer = self.shared.writer.lock().await;
                        if let Some(error) = self.shared.fault() {
                            return Err(error);
                        }
                    }

                    let seqnum = flow.send_seq.fetch_add(1, Ordering::AcqRel);
                    Outbound::data(
                        SmpHeader::data(
                            sid,
                            packet.total_size(),
                            seqnum,
                            flow.advertised_window(),
                        ),
                        packet,
                    )
                }
                _ => Outbound::packet(packet),
            };

            writer.send(out).await?;
        }

        Ok(())
    }

    /// Send an attention signal (statement cancellation). The payload is
    /// empty; the server replies with a DONE carrying the attention bit.
    pub async fn send_attention(&self) -> Result<(), CodecError> {
        tracing::debug!(sid = ?self.sid, "sending attention signal");
        self.send_msg(PacketType::Attention, Bytes::new()).await
    }

    /// Wait for the next inbound packet of the server's reply.
    pub async fn recv(&mut self) -> Result<Inbound, CodecError> {
        match self.rx.recv().await {
            Some(inbound) => Ok(inbound),
            None => Err(self.shared.fault().unwrap_or(CodecError::ConnectionClosed)),
        }
    }

    /// [`Session::recv`] with an optional deadline. A `None` deadline waits
    /// forever; an elapsed deadline returns [`CodecError::Timeout`].
    pub async fn recv_deadline(&mut self, deadline: Option<Duration>) -> Result<Inbound, CodecError> {
        match deadline {
            None => self.recv().await,
            Some(limit) => tokio::time::timeout(limit, self.recv())
                .await
                .map_err(|_| CodecError::Timeout)?,
        }
    }

    /// Close a MARS session with a FIN frame. A plain main session needs no
    /// close handshake.
    pub async fn close(mut self) -> Result<(), CodecError> {
        if let (Some(flow), Some(sid)) = (self.flow.take(), self.sid) {
            {
                let mut writer = self.shared.writer.lock().await;
                writer
                    .send(Outbound::control(SmpHeader::control(
                        SmpFlags::Fin,
                        sid,
                        flow.last_sent(),
                        flow.advertised_window(),
                    )))
                    .await?;
            }
            self.shared.registry.lock().sessions.remove(&sid);
            tracing::debug!(sid, "closed MARS session");
        }
        Ok(())
    }
}

impl<T: AsyncRead + AsyncWrite + Send + 'static> Drop for Session<T> {
    fn drop(&mut self) {
        // FIN requires an async send; a dropped session is simply
        // deregistered and the id is not reused.
        if let Some(sid) = self.sid {
            self.shared.registry.lock().sessions.remove(&sid);
        }
    }
}

// =============================================================================
// Reader task
// =============================================================================

async fn reader_task<T: AsyncRead + AsyncWrite + Send + 'static>(
    mut reader: FramedRead<ReadHalf<T>, TdsCodec>,
    shared: Arc<Shared<T>>,
) {
    let fault = loop {
        match reader.next().await {
            Some(Ok(Frame::Packet(packet))) => {
                let tx = shared.registry.lock().main_tx.clone();
                if let Some(tx) = tx {
                    let _ = tx.send(Inbound::from_packet(packet));
                }
            }
            Some(Ok(Frame::Smp { header, packet })) => {
                if let Err(error) = handle_smp_frame(&shared, header, packet).await {
                    break error;
                }
            }
            Some(Err(error)) => break error,
            None => break CodecError::ConnectionClosed,
        }
    };

    tracing::debug!(%fault, "reader task stopping");
    shared.fail(fault);
}

async fn handle_smp_frame<T: AsyncRead + AsyncWrite + Send + 'static>(
    shared: &Arc<Shared<T>>,
    header: SmpHeader,
    packet: Option<Packet>,
) -> Result<(), CodecError> {
    let entry = {
        let registry = shared.registry.lock();
        registry
            .sessions
            .get(&header.sid)
            .map(|e| (e.tx.clone(), Arc::clone(&e.flow)))
    };

    let Some((tx, flow)) = entry else {
        tracing::debug!(sid = header.sid, "frame for unknown session dropped");
        return Ok(());
    };

    // Any frame's window field can grant more send credit.
    flow.refresh_peer_window(header.window);

    match header.flags {
        SmpFlags::Syn => {
            let pending = shared.registry.lock().pending_syn.remove(&header.sid);
            if let Some(pending) = pending {
                let _ = pending.send(header.window);
            }
        }
        SmpFlags::Ack => {}
        SmpFlags::Fin => {
            shared.registry.lock().sessions.remove(&header.sid);
        }
        SmpFlags::Data => {
            let Some(packet) = packet else {
                return Err(CodecError::InvalidHeader);
            };
            flow.recv_seq.fetch_add(1, Ordering::AcqRel);
            let _ = tx.send(Inbound::from_packet(packet));

            // Every DATA frame is acknowledged with the advanced receive
            // window so the peer's sender never stalls.
            let ack = SmpHeader::control(
                SmpFlags::Ack,
                header.sid,
                flow.last_sent(),
                flow.advertised_window(),
            );
            let mut writer = shared.writer.lock().await;
            writer.send(Outbound::control(ack)).await?;
        }
    }

    Ok(())
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use tokio::io::{AsyncReadExt, AsyncWriteExt};

    fn tabular_packet(payload: &[u8], last: bool) -> Vec<u8> {
        let status = if last {
            PacketStatus::END_OF_MESSAGE
        } else {
            PacketStatus::NORMAL
        };
        let header = PacketHeader::new(
            PacketType::TabularResult,
            status,
            (PACKET_HEADER_SIZE + payload.len()) as u16,
        );
        let mut buf = BytesMut::new();
        header.encode(&mut buf);
        buf.extend_from_slice(payload);
        buf.to_vec()
    }

    fn smp_frame(flags: SmpFlags, sid: u16, seqnum: u32, window: u32, payload: &[u8]) -> Vec<u8> {
        let mut buf = BytesMut::new();
        let header = if payload.is_empty() {
            SmpHeader::control(flags, sid, seqnum, window)
        } else {
            SmpHeader {
                flags,
                sid,
                length: (tdslink_protocol::SMP_HEADER_SIZE + payload.len()) as u32,
                seqnum,
                window,
            }
        };
        header.encode(&mut buf);
        buf.extend_from_slice(payload);
        buf.to_vec()
    }

    #[tokio::test]
    async fn plain_session_receives_packets_in_order() {
        let (client_end, mut server_end) = tokio::io::duplex(4096);
        let conn = Connection::new(client_end, ConnectionOptions::default());
        let mut session = conn.open_session().await.unwrap();

        server_end
            .write_all(&tabular_packet(b"first", false))
            .await
            .unwrap();
        server_end
            .write_all(&tabular_packet(b"second", true))
            .await
            .unwrap();

        let first = session.recv().await.unwrap();
        assert_eq!(&first.payload[..], b"first");
        assert!(!first.last_packet);

        let second = session.recv().await.unwrap();
        assert_eq!(&second.payload[..], b"second");
        assert!(second.last_packet);
    }

    #[tokio::test]
    async fn main_session_can_only_be_taken_once() {
        let (client_end, _server_end) = tokio::io::duplex(64);
        let conn = Connection::new(client_end, ConnectionOptions::default());
        let _session = conn.open_session().await.unwrap();
        assert!(matches!(
            conn.open_session().await,
            Err(CodecError::SessionClosed)
        ));
    }

    #[tokio::test]
    async fn send_msg_splits_into_packets() {
        let (client_end, mut server_end) = tokio::io::duplex(4096);
        let conn = Connection::new(
            client_end,
            ConnectionOptions {
                packet_size: 16, // 8 bytes of payload per packet
                ..Default::default()
            },
        );
        let session = conn.open_session().await.unwrap();

        session
            .send_msg(PacketType::SqlBatch, Bytes::from_static(&[0x55; 20]))
            .await
            .unwrap();

        let mut wire = vec![0u8; 3 * 16 - 4];
        server_end.read_exact(&mut wire).await.unwrap();

        // Three packets: 8 + 8 + 4 payload bytes.
        assert_eq!(wire[0], PacketType::SqlBatch as u8);
        assert_eq!(wire[1], PacketStatus::NORMAL.bits());
        assert_eq!(wire[16 + 1], PacketStatus::NORMAL.bits());
        assert_eq!(wire[32 + 1], PacketStatus::END_OF_MESSAGE.bits());
        assert_eq!(u16::from_be_bytes([wire[34], wire[35]]), 12);
    }

    #[tokio::test]
    async fn empty_attention_message_is_one_packet() {
        let (client_end, mut server_end) = tokio::io::duplex(4096);
        let conn = Connection::new(client_end, ConnectionOptions::default());
        let session = conn.open_session().await.unwrap();

        session.send_attention().await.unwrap();

        let mut wire = [0u8; PACKET_HEADER_SIZE];
        server_end.read_exact(&mut wire).await.unwrap();
        assert_eq!(wire[0], PacketType::Attention as u8);
        assert_eq!(wire[1], PacketStatus::END_OF_MESSAGE.bits());
    }

    #[tokio::test]
    async fn mars_syn_handshake_and_data_ack() {
        let (client_end, mut server_end) = tokio::io::duplex(4096);
        let conn = Connection::new(
            client_end,
            ConnectionOptions {
                mars: true,
                ..Default::default()
            },
        );

        let server = tokio::spawn(async move {
            // Expect the SYN for sid 0.
            let mut syn = [0u8; tdslink_protocol::SMP_HEADER_SIZE];
            server_end.read_exact(&mut syn).await.unwrap();
            assert_eq!(syn[0], 0x53);
            assert_eq!(syn[1], SmpFlags::Syn as u8);

            // Reply SYN, then a DATA frame with a one-packet message.
            server_end
                .write_all(&smp_frame(SmpFlags::Syn, 0, 0, 4, &[]))
                .await
                .unwrap();
            let packet = tabular_packet(b"row", true);
            server_end
                .write_all(&smp_frame(SmpFlags::Data, 0, 1, 8, &packet))
                .await
                .unwrap();

            // The client must acknowledge the DATA frame.
            let mut ack = [0u8; tdslink_protocol::SMP_HEADER_SIZE];
            server_end.read_exact(&mut ack).await.unwrap();
            assert_eq!(ack[1], SmpFlags::Ack as u8);
            // Advertised window: 1 received + 4.
            assert_eq!(u32::from_le_bytes([ack[12], ack[13], ack[14], ack[15]]), 5);
        });

        let mut session = conn.open_session().await.unwrap();
        assert_eq!(session.sid(), Some(0));

        let inbound = session.recv().await.unwrap();
        assert_eq!(&inbound.payload[..], b"row");

        server.await.unwrap();
    }

    #[tokio::test]
    async fn mars_sender_blocks_until_window_advances() {
        let (client_end, mut server_end) = tokio::io::duplex(65536);
        let conn = Connection::new(
            client_end,
            ConnectionOptions {
                mars: true,
                ..Default::default()
            },
        );

        // Complete the SYN handshake with an initial window of 2: only
        // seqnum 1 may be sent before more credit arrives.
        let handshake = tokio::spawn(async move {
            let mut syn = [0u8; tdslink_protocol::SMP_HEADER_SIZE];
            server_end.read_exact(&mut syn).await.unwrap();
            server_end
                .write_all(&smp_frame(SmpFlags::Syn, 0, 0, 2, &[]))
                .await
                .unwrap();
            server_end
        });

        let session = conn.open_session().await.unwrap();
        let mut server_end = handshake.await.unwrap();

        // Two packets' worth of payload; the second DATA frame needs credit.
        let payload = Bytes::from(vec![0x11u8; 5000]);
        let send = tokio::spawn(async move {
            session.send_msg(PacketType::SqlBatch, payload).await.unwrap();
            session
        });

        // First frame arrives promptly.
        let mut first = vec![0u8; tdslink_protocol::SMP_HEADER_SIZE + 4096];
        server_end.read_exact(&mut first).await.unwrap();
        assert_eq!(first[1], SmpFlags::Data as u8);

        // The second must not arrive while the window is exhausted.
        let mut probe = [0u8; 1];
        let blocked =
            tokio::time::timeout(Duration::from_millis(100), server_end.read_exact(&mut probe))
                .await;
        assert!(blocked.is_err(), "sender ignored the peer window");

        // Grant credit; the blocked send resumes.
        server_end
            .write_all(&smp_frame(SmpFlags::Ack, 0, 0, 8, &[]))
            .await
            .unwrap();

        let mut rest = vec![0u8; tdslink_protocol::SMP_HEADER_SIZE + PACKET_HEADER_SIZE + 5000 - 4088 - 1];
        server_end.read_exact(&mut probe).await.unwrap();
        server_end.read_exact(&mut rest).await.unwrap();

        let _session = send.await.unwrap();
    }

    #[tokio::test]
    async fn recv_deadline_times_out() {
        let (client_end, _server_end) = tokio::io::duplex(64);
        let conn = Connection::new(client_end, ConnectionOptions::default());
        let mut session = conn.open_session().await.unwrap();

        assert!(matches!(
            session.recv_deadline(Some(Duration::from_millis(20))).await,
            Err(CodecError::Timeout)
        ));
    }

    #[tokio::test]
    async fn transport_close_surfaces_to_waiters() {
        let (client_end, server_end) = tokio::io::duplex(64);
        let conn = Connection::new(client_end, ConnectionOptions::default());
        let mut session = conn.open_session().await.unwrap();

        drop(server_end);

        assert!(matches!(
            session.recv().await,
            Err(CodecError::ConnectionClosed)
        ));
    }
}
