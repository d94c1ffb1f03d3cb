use thiserror::Error;

/// Everything that can go wrong inside a [`SecureStream`](crate::SecureStream).
///
/// The split that matters to callers is transport versus protocol:
/// transport errors are whatever the raw stream reported, passed through
/// verbatim; protocol errors mean the record layer itself is broken and
/// the connection is never safe to retry. End-of-stream is not an error
/// at all: it surfaces as a zero-byte read, after any already-decrypted
/// plaintext has been delivered.
#[derive(Error, Debug)]
pub enum Error {
    /// Raw transport failure, propagated unchanged.
    #[error("transport error: {0}")]
    Transport(#[from] std::io::Error),

    /// The record layer misbehaved: bad framing, failed authentication,
    /// or an engine status that makes no sense where it occurred.
    #[error("record protocol error: {0}")]
    Protocol(String),

    /// A record did not fit the ciphertext buffer even after compaction.
    /// Either the peer sent an oversized record or the buffers are
    /// undersized for this engine.
    #[error("record too large for the {capacity} byte buffer")]
    RecordTooLarge { capacity: usize },

    /// The handshake could not be completed.
    #[error("handshake failed: {0}")]
    HandshakeFailed(String),
}

impl Error {
    /// Protocol-class errors are never safe to retry on the same
    /// connection; transport errors follow the transport's own policy.
    pub fn is_protocol(&self) -> bool {
        !matches!(self, Error::Transport(_))
    }
}

impl From<Error> for std::io::Error {
    fn from(err: Error) -> Self {
        match err {
            // Verbatim, so timeouts and friends keep their kind.
            Error::Transport(io) => io,
            other => std::io::Error::new(std::io::ErrorKind::InvalidData, other),
        }
    }
}
