use std::io;
use std::pin::Pin;
use std::task::{ready, Context, Poll, Waker};

use pin_project::pin_project;
use tokio::io::{AsyncRead, AsyncWrite, ReadBuf};

use crate::buffer::{BufferAllocator, HeapAllocator, RecordBuffer};
use crate::engine::RecordEngine;
use crate::Error;

/// Anything a [`SecureStream`] can sit on top of.
pub trait AsyncTransport: AsyncRead + AsyncWrite + Send + Unpin {}
impl<T: AsyncRead + AsyncWrite + Send + Unpin> AsyncTransport for T {}

/// Connection lifecycle. Mutated only by the stream itself; read by the
/// pipelines to gate behavior.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum State {
    /// Negotiating; application payload is held back.
    Handshaking,
    /// Full duplex application traffic.
    Established,
    /// Terminal-but-not-released: the peer hung up mid-handshake, or a
    /// shutdown is in flight.
    Closing,
    /// Released. Reads return EOF, writes fail, shutdown is a no-op.
    Closed,
}

/// Where the write pipeline is within one logical write call.
#[derive(Debug, Clone, Copy)]
pub(crate) enum WritePhase {
    Idle,
    /// A wrap consumed `consumed` plaintext bytes and its ciphertext is
    /// still draining to the wire; the count is reported once the drain
    /// completes.
    Flushing { consumed: usize },
}

/// An encrypting adapter around a raw byte stream.
///
/// Owns its three buffers (outbound ciphertext, inbound ciphertext,
/// inbound plaintext) exclusively; callers only ever see copies. At most
/// one read and one write may be in flight at a time, independently of
/// each other; use [`tokio::io::split`] for full duplex from two tasks.
#[pin_project]
pub struct SecureStream<T: AsyncTransport, E: RecordEngine> {
    #[pin]
    pub(crate) raw: T,
    pub(crate) engine: E,
    pub(crate) state: State,
    pub(crate) net_write: RecordBuffer,
    pub(crate) net_read: RecordBuffer,
    pub(crate) app_read: RecordBuffer,
    /// Adaptive ceiling on plaintext offered per wrap. Set on output
    /// overflow and only ever shrinks, so one pressure point is never hit
    /// twice.
    pub(crate) write_cap: Option<usize>,
    pub(crate) write_phase: WritePhase,
    /// Writers parked behind the handshake; woken all at once when it
    /// completes (or the stream dies trying).
    pub(crate) handshake_wakers: Vec<Waker>,
    /// Raw transport reported EOF.
    pub(crate) read_eof: bool,
    /// Engine reported `Closed` while unwrapping.
    pub(crate) engine_eof: bool,
    /// `close_inbound` has run and the buffers are released.
    pub(crate) inbound_closed: bool,
    pub(crate) hs_net_widened: bool,
    pub(crate) hs_app_widened: bool,
}

impl<T: AsyncTransport, E: RecordEngine> SecureStream<T, E> {
    /// Wrap `raw` with `engine`, allocating buffers from the heap.
    ///
    /// The stream starts handshaking immediately; the first read or
    /// write drives the negotiation before doing its own work.
    pub fn new(raw: T, engine: E) -> Self {
        Self::with_allocator(raw, engine, &HeapAllocator)
    }

    /// Like [`new`](Self::new) with an injected buffer allocator.
    pub fn with_allocator(raw: T, engine: E, allocator: &dyn BufferAllocator) -> Self {
        let packet = engine.packet_buffer_len();
        let plain = engine.plain_buffer_len();
        Self {
            raw,
            engine,
            state: State::Handshaking,
            net_write: RecordBuffer::new(allocator.alloc(packet), packet),
            net_read: RecordBuffer::new(allocator.alloc(packet), packet),
            app_read: RecordBuffer::new(allocator.alloc(plain), plain),
            write_cap: None,
            write_phase: WritePhase::Idle,
            handshake_wakers: Vec::new(),
            read_eof: false,
            engine_eof: false,
            inbound_closed: false,
            hs_net_widened: false,
            hs_app_widened: false,
        }
    }

    /// Whether the handshake has completed and traffic may flow.
    pub fn is_established(&self) -> bool {
        self.state == State::Established
    }

    pub fn get_ref(&self) -> &T {
        &self.raw
    }

    pub fn get_mut(&mut self) -> &mut T {
        &mut self.raw
    }

    /// One raw read into the inbound ciphertext buffer. Flags EOF so
    /// callers can tell it apart from an empty read.
    pub(crate) fn poll_fill_net_read(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        let this = self.project();
        if this.net_read.spare_len() == 0 {
            this.net_read.compact();
        }
        if this.net_read.spare_len() == 0 {
            // Full even after compaction: a record this big can never be
            // assembled.
            return Poll::Ready(Err(Error::RecordTooLarge {
                capacity: this.net_read.capacity(),
            }
            .into()));
        }
        let mut read_buf = ReadBuf::new(this.net_read.spare());
        ready!(this.raw.poll_read(cx, &mut read_buf))?;
        let n = read_buf.filled().len();
        this.net_read.commit(n);
        if n == 0 {
            *this.read_eof = true;
        }
        Poll::Ready(Ok(()))
    }

    /// Drain the outbound ciphertext buffer with repeated raw writes.
    pub(crate) fn poll_drain_net_write(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        let mut this = self.project();
        while !this.net_write.is_empty() {
            let n = ready!(this.raw.as_mut().poll_write(cx, this.net_write.data()))?;
            if n == 0 {
                return Poll::Ready(Err(io::ErrorKind::WriteZero.into()));
            }
            this.net_write.advance(n);
        }
        Poll::Ready(Ok(()))
    }
}
