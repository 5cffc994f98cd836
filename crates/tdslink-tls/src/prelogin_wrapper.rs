//! TDS framing adapter for the TLS handshake.
//!
//! TDS 7.x smuggles the TLS handshake inside prelogin-type TDS packets so a
//! single framing layer carries both. This adapter wraps outbound TLS
//! records in prelogin packets and strips inbound packet headers until
//! [`PreloginFramedTls::handshake_done`] is called, after which it is a
//! transparent passthrough (the established tunnel then encrypts whole TDS
//! packets directly).

use std::cmp;
use std::io;
use std::pin::Pin;
use std::task::{Context, Poll};

use tokio::io::{AsyncRead, AsyncWrite, ReadBuf};

const HEADER_SIZE: usize = 8;
const PRELOGIN_PACKET: u8 = 0x12;
const END_OF_MESSAGE: u8 = 0x01;

/// Stream adapter applying prelogin-packet framing during the handshake.
pub struct PreloginFramedTls<S> {
    stream: S,
    handshaking: bool,

    // Inbound: packet header being collected, then payload countdown.
    header: [u8; HEADER_SIZE],
    header_filled: usize,
    payload_remaining: usize,

    // Outbound: buffered TLS records, framed and flushed as one packet.
    out_buf: Vec<u8>,
    out_pos: usize,
    out_framed: bool,
}

impl<S> PreloginFramedTls<S> {
    /// Wrap a stream; framing is active until the handshake completes.
    pub fn new(stream: S) -> Self {
        Self {
            stream,
            handshaking: true,
            header: [0u8; HEADER_SIZE],
            header_filled: 0,
            payload_remaining: 0,
            out_buf: vec![0u8; HEADER_SIZE],
            out_pos: HEADER_SIZE,
            out_framed: false,
        }
    }

    /// Switch to passthrough mode once the TLS handshake has completed.
    pub fn handshake_done(&mut self) {
        self.handshaking = false;
    }

    /// The wrapped stream.
    pub fn get_ref(&self) -> &S {
        &self.stream
    }

    /// The wrapped stream, mutably.
    pub fn get_mut(&mut self) -> &mut S {
        &mut self.stream
    }

    /// Unwrap the underlying stream.
    pub fn into_inner(self) -> S {
        self.stream
    }
}

impl<S: AsyncRead + Unpin> AsyncRead for PreloginFramedTls<S> {
    fn poll_read(
        self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &mut ReadBuf<'_>,
    ) -> Poll<io::Result<()>> {
        let this = self.get_mut();

        if !this.handshaking {
            return Pin::new(&mut this.stream).poll_read(cx, buf);
        }

        // Between packets: collect the 8-byte header first.
        if this.payload_remaining == 0 {
            while this.header_filled < HEADER_SIZE {
                let mut header_buf = ReadBuf::new(&mut this.header[this.header_filled..]);
                match Pin::new(&mut this.stream).poll_read(cx, &mut header_buf)? {
                    Poll::Ready(()) => {
                        let n = header_buf.filled().len();
                        if n == 0 {
                            return Poll::Ready(Ok(()));
                        }
                        this.header_filled += n;
                    }
                    Poll::Pending => return Poll::Pending,
                }
            }

            if this.header[0] != PRELOGIN_PACKET {
                return Poll::Ready(Err(io::Error::new(
                    io::ErrorKind::InvalidData,
                    format!(
                        "expected prelogin packet during TLS handshake, got 0x{:02X}",
                        this.header[0]
                    ),
                )));
            }

            let length = u16::from_be_bytes([this.header[2], this.header[3]]) as usize;
            this.payload_remaining = length.saturating_sub(HEADER_SIZE);
            this.header_filled = 0;
            tracing::trace!(
                payload = this.payload_remaining,
                "unwrapping TLS handshake packet"
            );
        }

        // Hand the TLS layer at most the current packet's payload.
        let want = cmp::min(this.payload_remaining, buf.remaining());
        if want == 0 {
            return Poll::Ready(Ok(()));
        }

        let mut scratch = vec![0u8; want];
        let mut scratch_buf = ReadBuf::new(&mut scratch);
        match Pin::new(&mut this.stream).poll_read(cx, &mut scratch_buf)? {
            Poll::Ready(()) => {
                let n = scratch_buf.filled().len();
                buf.put_slice(&scratch[..n]);
                this.payload_remaining -= n;
                Poll::Ready(Ok(()))
            }
            Poll::Pending => Poll::Pending,
        }
    }
}

impl<S: AsyncWrite + Unpin> AsyncWrite for PreloginFramedTls<S> {
    fn poll_write(
        self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &[u8],
    ) -> Poll<io::Result<usize>> {
        let this = self.get_mut();

        if !this.handshaking {
            return Pin::new(&mut this.stream).poll_write(cx, buf);
        }

        // Handshake records are buffered and framed on flush.
        this.out_buf.extend_from_slice(buf);
        Poll::Ready(Ok(buf.len()))
    }

    fn poll_flush(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        let this = self.get_mut();

        if this.handshaking && this.out_buf.len() > HEADER_SIZE {
            if !this.out_framed {
                let total = this.out_buf.len();
                this.out_buf[0] = PRELOGIN_PACKET;
                this.out_buf[1] = END_OF_MESSAGE;
                this.out_buf[2] = (total >> 8) as u8;
                this.out_buf[3] = total as u8;
                this.out_buf[4] = 0;
                this.out_buf[5] = 0;
                this.out_buf[6] = 1; // packet id
                this.out_buf[7] = 0;
                this.out_framed = true;
                this.out_pos = 0;
                tracing::trace!(total, "wrapping TLS handshake bytes in prelogin packet");
            }

            while this.out_pos < this.out_buf.len() {
                match Pin::new(&mut this.stream).poll_write(cx, &this.out_buf[this.out_pos..])? {
                    Poll::Ready(n) => this.out_pos += n,
                    Poll::Pending => return Poll::Pending,
                }
            }

            this.out_buf.truncate(HEADER_SIZE);
            this.out_pos = HEADER_SIZE;
            this.out_framed = false;
        }

        Pin::new(&mut this.stream).poll_flush(cx)
    }

    fn poll_shutdown(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        Pin::new(&mut self.get_mut().stream).poll_shutdown(cx)
    }
}
