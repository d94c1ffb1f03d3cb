//! Read pipeline: wire bytes in, plaintext out.
//!
//! One logical read may take several raw round-trips (a record can span
//! raw reads), and one raw read may carry several records. Plaintext the
//! destination cannot hold stays buffered for the next read, which then
//! performs no raw I/O at all.

use std::io;
use std::pin::Pin;
use std::task::{ready, Context, Poll};

use tokio::io::{AsyncRead, ReadBuf};
use tracing::warn;

use crate::engine::{EngineStatus, RecordEngine};
use crate::stream::{AsyncTransport, SecureStream, State};
use crate::Error;

/// What one unwrap pass over the buffered ciphertext achieved.
enum UnwrapPass {
    /// Plaintext was produced; deliver it.
    Produced,
    /// Nothing decodable yet; more wire bytes are needed.
    Starved,
    /// The engine reported its close record.
    Closed,
}

impl<T: AsyncTransport, E: RecordEngine> SecureStream<T, E> {
    /// Decode as many buffered records as fit in the plaintext buffer.
    fn unwrap_records(self: Pin<&mut Self>) -> io::Result<UnwrapPass> {
        let this = self.project();
        let mut produced_any = false;
        while !this.net_read.is_empty() && this.app_read.spare_len() > 0 {
            let outcome = this
                .engine
                .unwrap(this.net_read.data(), this.app_read.spare())
                .map_err(io::Error::from)?;
            this.net_read.advance(outcome.consumed);
            this.app_read.commit(outcome.produced);
            produced_any |= outcome.produced > 0;
            match outcome.status {
                EngineStatus::Ok => continue,
                EngineStatus::NeedMoreInput => {
                    if this.net_read.is_full() {
                        return Err(Error::RecordTooLarge {
                            capacity: this.net_read.capacity(),
                        }
                        .into());
                    }
                    this.net_read.compact();
                    break;
                }
                EngineStatus::NeedMoreOutput => {
                    if produced_any {
                        // Plaintext buffer ran out mid-pass; deliver what
                        // we have, the rest of the record waits.
                        break;
                    }
                    warn!(
                        capacity = this.app_read.capacity(),
                        "record decodes to more plaintext than the buffer holds"
                    );
                    return Err(Error::Protocol(
                        "decoded record larger than the plaintext buffer".into(),
                    )
                    .into());
                }
                EngineStatus::Closed => {
                    *this.engine_eof = true;
                    // Bytes already decoded this pass are still owed to
                    // the caller; end-of-stream comes after them.
                    return Ok(UnwrapPass::Closed);
                }
            }
        }
        Ok(if produced_any {
            UnwrapPass::Produced
        } else {
            UnwrapPass::Starved
        })
    }
}

impl<T: AsyncTransport, E: RecordEngine> AsyncRead for SecureStream<T, E> {
    fn poll_read(
        mut self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        dst: &mut ReadBuf<'_>,
    ) -> Poll<io::Result<()>> {
        if self.state == State::Closed || self.inbound_closed {
            return Poll::Ready(Ok(()));
        }
        if self.state == State::Handshaking {
            // A read issued first triggers the handshake, then resumes
            // as if issued fresh.
            ready!(self.as_mut().poll_handshake(cx))?;
            if self.state != State::Established {
                // Peer hung up during the handshake: clean end-of-stream.
                return Poll::Ready(Ok(()));
            }
        }
        if dst.remaining() == 0 {
            return Poll::Ready(Ok(()));
        }

        loop {
            // Surplus plaintext from an earlier pass: serve it without
            // touching the wire.
            if !self.app_read.is_empty() {
                let this = self.as_mut().project();
                let n = dst.remaining().min(this.app_read.data().len());
                dst.put_slice(&this.app_read.data()[..n]);
                this.app_read.advance(n);
                return Poll::Ready(Ok(()));
            }

            if self.engine_eof {
                return Poll::Ready(Ok(()));
            }

            if !self.net_read.is_empty() {
                match self.as_mut().unwrap_records()? {
                    UnwrapPass::Produced | UnwrapPass::Closed => continue,
                    UnwrapPass::Starved => {}
                }
            }

            if self.read_eof {
                if !self.net_read.is_empty() {
                    warn!(
                        undecoded = self.net_read.data().len(),
                        "transport closed mid-record, discarding the partial record"
                    );
                    self.as_mut().project().net_read.clear();
                }
                return Poll::Ready(Ok(()));
            }

            ready!(self.as_mut().poll_fill_net_read(cx))?;
        }
    }
}
