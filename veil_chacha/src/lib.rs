//! ChaCha20-Poly1305 record engine for
//! [`veil_stream::SecureStream`](veil_stream::SecureStream).
//!
//! The wire protocol is deliberately small. Each side opens by sending a
//! random 8-byte stream nonce in the clear; everything after that is
//! length-prefixed AEAD records:
//!
//! ```text
//! [u32 BE: ciphertext length] [ciphertext || 16-byte tag]
//! ```
//!
//! Records are encrypted with a counter-incrementing stream cipher
//! (`EncryptorLE31`), so reordering, replay, and truncation within the
//! stream all fail authentication. An authenticated record with an empty
//! plaintext announces the end of the stream; a raw transport EOF without
//! one is reported to the engine as a protocol violation.
//!
//! Both sides must already share a 32-byte key; key agreement is out of
//! scope here.
//!
//! # Example
//! ```no_run
//! # async fn example<T: veil_stream::AsyncTransport>(tcp: T, key: [u8; 32]) -> std::io::Result<()> {
//! use veil_chacha::{ChaChaEngine, Role};
//! use veil_stream::SecureStream;
//!
//! let stream = SecureStream::new(tcp, ChaChaEngine::new(Role::Client, key));
//! # let _ = stream;
//! # Ok(()) }
//! ```


use bytes::BytesMut;
use chacha20poly1305::{
    aead::stream::{DecryptorLE31, EncryptorLE31},
    ChaCha20Poly1305,
};
use veil_stream::{EngineOutcome, EngineStatus, Error, HandshakeAction, RecordEngine};

/// Largest plaintext carried by a single record.
pub const MAX_CHUNK_SIZE: usize = 8 * 1024;

const TAG_LEN: usize = 16;
const LEN_PREFIX: usize = 4;
const NONCE_LEN: usize = 8;

/// Which side of the nonce exchange this engine plays.
///
/// The client sends its nonce first; the server waits for it before
/// answering with its own. The asymmetry only matters so that both sides
/// agree on who reads first over a transport with no other framing.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Role {
    Client,
    Server,
}

/// A [`RecordEngine`] speaking the length-prefixed ChaCha20-Poly1305
/// record protocol described at the [crate](self) level.
pub struct ChaChaEngine {
    role: Role,
    key: [u8; 32],
    local_nonce: [u8; NONCE_LEN],
    sent_nonce: bool,
    encryptor: EncryptorLE31<ChaCha20Poly1305>,
    decryptor: Option<DecryptorLE31<ChaCha20Poly1305>>,
    scratch: BytesMut,
    close_queued: bool,
    close_sent: bool,
    inbound_closed: bool,
}

impl ChaChaEngine {
    /// Creates an engine for one stream. The key may be reused across
    /// streams because every engine draws a fresh random nonce.
    pub fn new(role: Role, shared_key: [u8; 32]) -> Self {
        let local_nonce: [u8; NONCE_LEN] = rand::random();
        Self {
            role,
            key: shared_key,
            local_nonce,
            sent_nonce: false,
            encryptor: EncryptorLE31::new(&shared_key.into(), &local_nonce.into()),
            decryptor: None,
            scratch: BytesMut::with_capacity(MAX_CHUNK_SIZE + TAG_LEN),
            close_queued: false,
            close_sent: false,
            inbound_closed: false,
        }
    }

    /// Encrypts `plaintext` as one framed record into `out`, returning
    /// the record's wire length. `out` must already be known to fit it.
    fn seal_record(&mut self, plaintext: &[u8], out: &mut [u8]) -> Result<usize, Error> {
        self.scratch.clear();
        self.scratch.extend_from_slice(plaintext);
        self.encryptor
            .encrypt_next_in_place(&[], &mut self.scratch)
            .map_err(|_| Error::Protocol("record encryption failed".into()))?;
        let len = u32::try_from(self.scratch.len())
            .map_err(|_| Error::Protocol("record length exceeds the frame format".into()))?;
        out[..LEN_PREFIX].copy_from_slice(&len.to_be_bytes());
        out[LEN_PREFIX..LEN_PREFIX + self.scratch.len()].copy_from_slice(&self.scratch);
        Ok(LEN_PREFIX + self.scratch.len())
    }
}

impl RecordEngine for ChaChaEngine {
    fn wrap(&mut self, plaintext: &[u8], out: &mut [u8]) -> Result<EngineOutcome, Error> {
        if self.close_sent {
            return Ok(EngineOutcome::stalled(EngineStatus::Closed));
        }
        if self.close_queued {
            if !self.sent_nonce {
                // Closed before ever speaking; there is no stream to
                // announce the close on.
                self.close_sent = true;
                return Ok(EngineOutcome::stalled(EngineStatus::Closed));
            }
            if out.len() < LEN_PREFIX + TAG_LEN {
                return Ok(EngineOutcome::stalled(EngineStatus::NeedMoreOutput));
            }
            let produced = self.seal_record(&[], out)?;
            self.close_sent = true;
            return Ok(EngineOutcome::new(EngineStatus::Closed, 0, produced));
        }
        if !self.sent_nonce {
            if out.len() < NONCE_LEN {
                return Ok(EngineOutcome::stalled(EngineStatus::NeedMoreOutput));
            }
            out[..NONCE_LEN].copy_from_slice(&self.local_nonce);
            self.sent_nonce = true;
            return Ok(EngineOutcome::new(EngineStatus::Ok, 0, NONCE_LEN));
        }
        if plaintext.is_empty() {
            return Ok(EngineOutcome::stalled(EngineStatus::Ok));
        }
        let chunk = plaintext.len().min(MAX_CHUNK_SIZE);
        if out.len() < LEN_PREFIX + chunk + TAG_LEN {
            return Ok(EngineOutcome::stalled(EngineStatus::NeedMoreOutput));
        }
        let produced = self.seal_record(&plaintext[..chunk], out)?;
        Ok(EngineOutcome::new(EngineStatus::Ok, chunk, produced))
    }

    fn unwrap(&mut self, ciphertext: &[u8], out: &mut [u8]) -> Result<EngineOutcome, Error> {
        if self.inbound_closed {
            return Ok(EngineOutcome::stalled(EngineStatus::Closed));
        }
        let Some(decryptor) = self.decryptor.as_mut() else {
            if ciphertext.len() < NONCE_LEN {
                return Ok(EngineOutcome::stalled(EngineStatus::NeedMoreInput));
            }
            let mut nonce = [0u8; NONCE_LEN];
            nonce.copy_from_slice(&ciphertext[..NONCE_LEN]);
            self.decryptor = Some(DecryptorLE31::new(&self.key.into(), &nonce.into()));
            return Ok(EngineOutcome::new(EngineStatus::Ok, NONCE_LEN, 0));
        };
        if ciphertext.len() < LEN_PREFIX {
            return Ok(EngineOutcome::stalled(EngineStatus::NeedMoreInput));
        }
        let mut len_bytes = [0u8; LEN_PREFIX];
        len_bytes.copy_from_slice(&ciphertext[..LEN_PREFIX]);
        let len = u32::from_be_bytes(len_bytes) as usize;
        if len < TAG_LEN || len > MAX_CHUNK_SIZE + TAG_LEN {
            return Err(Error::Protocol(format!("invalid record length {len}")));
        }
        if ciphertext.len() < LEN_PREFIX + len {
            return Ok(EngineOutcome::stalled(EngineStatus::NeedMoreInput));
        }
        let plain_len = len - TAG_LEN;
        if out.len() < plain_len {
            return Ok(EngineOutcome::stalled(EngineStatus::NeedMoreOutput));
        }
        self.scratch.clear();
        self.scratch
            .extend_from_slice(&ciphertext[LEN_PREFIX..LEN_PREFIX + len]);
        decryptor
            .decrypt_next_in_place(&[], &mut self.scratch)
            .map_err(|_| Error::Protocol("record failed authentication".into()))?;
        if self.scratch.is_empty() {
            self.inbound_closed = true;
            return Ok(EngineOutcome::new(EngineStatus::Closed, LEN_PREFIX + len, 0));
        }
        out[..self.scratch.len()].copy_from_slice(&self.scratch);
        Ok(EngineOutcome::new(
            EngineStatus::Ok,
            LEN_PREFIX + len,
            self.scratch.len(),
        ))
    }

    fn handshake_action(&self) -> HandshakeAction {
        let sent = self.sent_nonce;
        let received = self.decryptor.is_some();
        match self.role {
            Role::Client => {
                if !sent {
                    HandshakeAction::NeedWrap
                } else if !received {
                    HandshakeAction::NeedUnwrap
                } else {
                    HandshakeAction::Finished
                }
            }
            Role::Server => {
                if !received {
                    HandshakeAction::NeedUnwrap
                } else if !sent {
                    HandshakeAction::NeedWrap
                } else {
                    HandshakeAction::Finished
                }
            }
        }
    }

    fn close_outbound(&mut self) {
        self.close_queued = true;
    }

    fn close_inbound(&mut self) -> Result<(), Error> {
        if self.inbound_closed || self.decryptor.is_none() {
            self.inbound_closed = true;
            return Ok(());
        }
        self.inbound_closed = true;
        Err(Error::Protocol(
            "inbound stream ended without a close record".into(),
        ))
    }

    fn packet_buffer_len(&self) -> usize {
        // Room for a full record plus the start of the next one, so a
        // single raw read can carry more than one record.
        2 * (LEN_PREFIX + MAX_CHUNK_SIZE + TAG_LEN)
    }

    fn plain_buffer_len(&self) -> usize {
        MAX_CHUNK_SIZE
    }
}
