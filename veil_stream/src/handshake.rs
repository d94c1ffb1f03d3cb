//! Handshake orchestration.
//!
//! Drives the engine's negotiation against the raw transport until the
//! engine reports it is finished, alternating wrap and unwrap as the
//! engine asks. Callable from both the read and write entry points; the
//! whole stream stays gated until this completes.

use std::io;
use std::pin::Pin;
use std::task::{ready, Context, Poll};

use tracing::{debug, warn};

use crate::engine::{EngineStatus, HandshakeAction, RecordEngine};
use crate::stream::{AsyncTransport, SecureStream, State};
use crate::Error;

impl<T: AsyncTransport, E: RecordEngine> SecureStream<T, E> {
    /// Run the handshake to a terminal outcome.
    ///
    /// `Ready(Ok(()))` means the stream is either `Established` or the
    /// peer hung up mid-handshake (`Closing`, an end-of-stream result
    /// rather than an error). Errors mean the handshake itself failed.
    pub(crate) fn poll_handshake(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        debug_assert_eq!(self.state, State::Handshaking);
        loop {
            // Any outbound flight goes to the wire before the engine is
            // consulted again.
            ready!(self.as_mut().poll_drain_net_write(cx))?;

            if self.read_eof {
                debug!("peer closed the stream during the handshake");
                self.finish_handshake(false);
                return Poll::Ready(Ok(()));
            }

            match self.engine.handshake_action() {
                HandshakeAction::Finished => {
                    self.finish_handshake(true);
                    return Poll::Ready(Ok(()));
                }
                HandshakeAction::NeedTask => {
                    self.as_mut().project().engine.run_delegated_tasks();
                }
                HandshakeAction::NeedWrap => self.as_mut().handshake_wrap()?,
                HandshakeAction::NeedUnwrap => ready!(self.as_mut().poll_handshake_unwrap(cx))?,
            }
        }
    }

    /// Produce the next outbound handshake record into `net_write`.
    /// The caller's loop drains it on the next pass.
    fn handshake_wrap(self: Pin<&mut Self>) -> io::Result<()> {
        let this = self.project();
        this.net_write.clear();
        let outcome = this
            .engine
            .wrap(&[], this.net_write.spare())
            .map_err(|e| io::Error::from(Error::HandshakeFailed(e.to_string())))?;
        this.net_write.commit(outcome.produced);
        match outcome.status {
            EngineStatus::Ok => Ok(()),
            EngineStatus::NeedMoreOutput => {
                // Handshake records are bounded and rare, so growing the
                // scratch once is allowed where application buffers may
                // never grow. A second overflow means something is wrong
                // with the engine's sizing contract.
                if *this.hs_net_widened {
                    warn!("handshake record overflowed the widened ciphertext scratch");
                    return Err(Error::HandshakeFailed(
                        "handshake record larger than the widened scratch buffer".into(),
                    )
                    .into());
                }
                *this.hs_net_widened = true;
                let extra = this.net_write.capacity().max(1);
                warn!(extra, "handshake record overflow, widening ciphertext scratch once");
                this.net_write.widen(extra);
                Ok(())
            }
            EngineStatus::NeedMoreInput => Err(Error::HandshakeFailed(
                "engine reported input underflow while wrapping a handshake record".into(),
            )
            .into()),
            EngineStatus::Closed => {
                // The engine gave up mid-negotiation; treat like a peer
                // hang-up and let the loop complete with end-of-stream.
                *this.read_eof = true;
                Ok(())
            }
        }
    }

    /// Feed buffered wire bytes to the engine, reading more if it is
    /// starved.
    fn poll_handshake_unwrap(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        if self.net_read.is_empty() {
            return self.poll_fill_net_read(cx);
        }
        let status = {
            let this = self.as_mut().project();
            let outcome = this
                .engine
                .unwrap(this.net_read.data(), this.app_read.spare())
                .map_err(|e| io::Error::from(Error::HandshakeFailed(e.to_string())))?;
            this.net_read.advance(outcome.consumed);
            this.app_read.commit(outcome.produced);
            outcome.status
        };
        match status {
            EngineStatus::Ok => Poll::Ready(Ok(())),
            EngineStatus::NeedMoreInput => {
                let this = self.as_mut().project();
                this.net_read.compact();
                self.poll_fill_net_read(cx)
            }
            EngineStatus::NeedMoreOutput => {
                let this = self.as_mut().project();
                if *this.hs_app_widened {
                    warn!("handshake unwrap overflowed the widened plaintext scratch");
                    return Poll::Ready(Err(Error::HandshakeFailed(
                        "handshake output larger than the widened scratch buffer".into(),
                    )
                    .into()));
                }
                *this.hs_app_widened = true;
                let extra = this.app_read.capacity().max(1);
                warn!(extra, "handshake unwrap overflow, widening plaintext scratch once");
                this.app_read.widen(extra);
                Poll::Ready(Ok(()))
            }
            EngineStatus::Closed => {
                *self.as_mut().project().read_eof = true;
                Poll::Ready(Ok(()))
            }
        }
    }

    /// Completion fan-out: clear every buffer (handshake residue must not
    /// leak into the first application read), flip the state, and release
    /// all parked writers as if they had been issued fresh.
    fn finish_handshake(self: Pin<&mut Self>, established: bool) {
        let this = self.project();
        this.net_read.clear();
        this.net_write.clear();
        this.app_read.clear();
        *this.state = if established {
            debug!("handshake complete");
            State::Established
        } else {
            State::Closing
        };
        for waker in this.handshake_wakers.drain(..) {
            waker.wake();
        }
    }
}
