use crate::Error;

/// Result status of a single [`wrap`](RecordEngine::wrap) or
/// [`unwrap`](RecordEngine::unwrap) call.
///
/// This is a closed set: every call site matches exhaustively, because an
/// unhandled status is a correctness bug, not a recoverable condition.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EngineStatus {
    /// The call made progress.
    Ok,
    /// The input does not hold a complete record; feed more bytes.
    NeedMoreInput,
    /// The output slice cannot hold the result; offer less input (wrap)
    /// or more output space (unwrap).
    NeedMoreOutput,
    /// The engine has seen or produced its close record; no further
    /// payload will flow in this direction.
    Closed,
}

/// What the engine needs next to advance its handshake.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HandshakeAction {
    /// Produce the next outbound handshake record (`wrap` with no input).
    NeedWrap,
    /// Consume the next inbound handshake record.
    NeedUnwrap,
    /// Run a delegated task before continuing.
    NeedTask,
    /// The handshake is complete; application records may flow.
    Finished,
}

/// Byte accounting for one `wrap`/`unwrap` call.
#[derive(Debug, Clone, Copy)]
pub struct EngineOutcome {
    pub status: EngineStatus,
    /// Input bytes consumed.
    pub consumed: usize,
    /// Output bytes produced.
    pub produced: usize,
}

impl EngineOutcome {
    pub fn new(status: EngineStatus, consumed: usize, produced: usize) -> Self {
        Self {
            status,
            consumed,
            produced,
        }
    }

    /// An outcome that neither consumed nor produced anything.
    pub fn stalled(status: EngineStatus) -> Self {
        Self::new(status, 0, 0)
    }
}

/// The record transform seam: handshake negotiation plus per-record
/// encryption and decryption.
///
/// A [`SecureStream`](crate::SecureStream) owns exactly one engine for
/// its lifetime; engines are never shared between streams. Engine-level
/// failures (authentication, malformed records) are reported as
/// [`Error::Protocol`], which keeps them distinguishable from transport
/// errors at the stream surface.
pub trait RecordEngine: Send {
    /// Encrypt a prefix of `plaintext` into `out` as one record. During
    /// the handshake this is called with an empty `plaintext` to produce
    /// the next handshake record.
    fn wrap(&mut self, plaintext: &[u8], out: &mut [u8]) -> Result<EngineOutcome, Error>;

    /// Decrypt one record from `ciphertext` into `out`. Must consume
    /// nothing when it reports `NeedMoreInput` or `NeedMoreOutput`.
    fn unwrap(&mut self, ciphertext: &[u8], out: &mut [u8]) -> Result<EngineOutcome, Error>;

    /// The next step required to advance the handshake.
    fn handshake_action(&self) -> HandshakeAction;

    /// Run any delegated handshake work. Assumed cheap and synchronous.
    fn run_delegated_tasks(&mut self) {}

    /// Queue the close record; the next `wrap` call emits it.
    fn close_outbound(&mut self);

    /// Tell the engine the inbound direction is done. Errors (e.g. the
    /// peer never sent a close record) are logged and swallowed by the
    /// stream's close path.
    fn close_inbound(&mut self) -> Result<(), Error>;

    /// Required capacity for the ciphertext buffers: the largest wire
    /// record this engine can produce or accept.
    fn packet_buffer_len(&self) -> usize;

    /// Required capacity for the plaintext buffer: the largest decrypted
    /// payload a single record can carry.
    fn plain_buffer_len(&self) -> usize;
}
