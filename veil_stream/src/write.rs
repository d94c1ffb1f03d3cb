//! Write pipeline and the close path.
//!
//! A write wraps a window of the caller's plaintext into one record and
//! drains it fully before reporting how much plaintext was consumed.
//! Under persistent output pressure the window shrinks geometrically and
//! the resulting ceiling sticks for the life of the stream, so the same
//! pressure point is never hit twice. Callers see at most a short write,
//! exactly as with the raw transport, and re-invoke with the remainder.

use std::io;
use std::pin::Pin;
use std::task::{ready, Context, Poll};

use tokio::io::AsyncWrite;
use tracing::{debug, warn};

use crate::engine::{EngineStatus, RecordEngine};
use crate::stream::{AsyncTransport, SecureStream, State, WritePhase};
use crate::Error;

impl<T: AsyncTransport, E: RecordEngine> SecureStream<T, E> {
    /// Wrap a window of `src` into `net_write`, shrinking the window
    /// under output pressure until the engine accepts it.
    fn wrap_outbound(self: Pin<&mut Self>, src: &[u8]) -> io::Result<()> {
        let this = self.project();
        let mut window = src.len();
        if let Some(cap) = *this.write_cap {
            window = window.min(cap);
        }
        loop {
            if window == 0 {
                // Bounded record overhead guarantees convergence before
                // this; reaching it means the engine can make no progress
                // on any input.
                return Err(Error::Protocol(
                    "engine rejected every write window down to zero bytes".into(),
                )
                .into());
            }
            this.net_write.clear();
            let outcome = this
                .engine
                .wrap(&src[..window], this.net_write.spare())
                .map_err(io::Error::from)?;
            this.net_write.commit(outcome.produced);
            match outcome.status {
                EngineStatus::Ok => {
                    *this.write_phase = WritePhase::Flushing {
                        consumed: outcome.consumed,
                    };
                    return Ok(());
                }
                EngineStatus::NeedMoreOutput => {
                    window >>= 1;
                    *this.write_cap = Some(window);
                    debug!(window, "ciphertext buffer overflow, shrinking the write window");
                }
                EngineStatus::NeedMoreInput => {
                    return Err(Error::Protocol(
                        "engine reported input underflow while wrapping application data".into(),
                    )
                    .into());
                }
                EngineStatus::Closed => {
                    return Err(io::Error::new(
                        io::ErrorKind::BrokenPipe,
                        "record engine is closed",
                    ));
                }
            }
        }
    }
}

impl<T: AsyncTransport, E: RecordEngine> AsyncWrite for SecureStream<T, E> {
    fn poll_write(
        mut self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        src: &[u8],
    ) -> Poll<io::Result<usize>> {
        match self.state {
            State::Handshaking => {
                // Writers park behind the handshake. Whichever side
                // drives it to completion wakes every parked writer, so
                // registering here matters when a split read half
                // finishes the job.
                match self.as_mut().poll_handshake(cx) {
                    Poll::Ready(Ok(())) => {
                        if self.state != State::Established {
                            return Poll::Ready(Err(io::Error::new(
                                io::ErrorKind::UnexpectedEof,
                                "stream closed during the handshake",
                            )));
                        }
                    }
                    Poll::Ready(Err(e)) => return Poll::Ready(Err(e)),
                    Poll::Pending => {
                        // Re-polls of the same parked write must not pile
                        // up duplicate wakers.
                        let this = self.project();
                        let waker = cx.waker();
                        if !this.handshake_wakers.iter().any(|w| w.will_wake(waker)) {
                            this.handshake_wakers.push(waker.clone());
                        }
                        return Poll::Pending;
                    }
                }
            }
            State::Established => {}
            State::Closing | State::Closed => {
                return Poll::Ready(Err(io::Error::new(
                    io::ErrorKind::BrokenPipe,
                    "stream is closed",
                )));
            }
        }
        if src.is_empty() {
            return Poll::Ready(Ok(0));
        }

        if matches!(self.write_phase, WritePhase::Idle) {
            self.as_mut().wrap_outbound(src)?;
        }
        // A partially drained record resumes here on the next poll; the
        // plaintext count is only reported once the wire has everything.
        ready!(self.as_mut().poll_drain_net_write(cx))?;

        let this = self.project();
        let consumed = match std::mem::replace(this.write_phase, WritePhase::Idle) {
            WritePhase::Flushing { consumed } => consumed,
            WritePhase::Idle => 0,
        };
        Poll::Ready(Ok(consumed))
    }

    fn poll_flush(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        if self.state == State::Closed {
            return Poll::Ready(Ok(()));
        }
        if self.state == State::Handshaking {
            ready!(self.as_mut().poll_handshake(cx))?;
        }
        ready!(self.as_mut().poll_drain_net_write(cx))?;
        self.project().raw.poll_flush(cx)
    }

    /// Idempotent close, safe from any state: best-effort close record,
    /// engine told both directions are done, buffers released exactly
    /// once, raw transport shut down. Never fails; internal close
    /// problems are logged only.
    fn poll_shutdown(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        if self.state == State::Closed {
            return Poll::Ready(Ok(()));
        }

        if !self.inbound_closed {
            {
                // Close the outbound direction: queue the close record
                // and wrap it if there is room. Best effort throughout.
                let this = self.as_mut().project();
                this.engine.close_outbound();
                this.net_write.clear();
                match this.engine.wrap(&[], this.net_write.spare()) {
                    Ok(outcome) => this.net_write.commit(outcome.produced),
                    Err(err) => {
                        debug!(%err, "could not produce the close record");
                        this.net_write.clear();
                    }
                }
                *this.state = State::Closing;
                // Writers still parked on the handshake must observe the
                // close instead of hanging.
                for waker in this.handshake_wakers.drain(..) {
                    waker.wake();
                }
            }
            // Push the close record out, but never let a slow or broken
            // peer block local resource release.
            match self.as_mut().poll_drain_net_write(cx) {
                Poll::Ready(Ok(())) => {}
                Poll::Ready(Err(err)) => debug!(%err, "could not send the close record"),
                Poll::Pending => debug!("transport not ready for the close record, dropping it"),
            }

            let this = self.as_mut().project();
            if let Err(err) = this.engine.close_inbound() {
                // Peers that vanish without a close record must not keep
                // local resources alive.
                warn!(%err, "ignoring inbound close failure");
            }
            this.net_write.release();
            this.net_read.release();
            this.app_read.release();
            *this.inbound_closed = true;
        }

        let result = ready!(self.as_mut().project().raw.poll_shutdown(cx));
        if let Err(err) = result {
            debug!(%err, "raw transport shutdown failed");
        }
        *self.project().state = State::Closed;
        Poll::Ready(Ok(()))
    }
}
