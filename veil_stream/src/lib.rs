//! Transparent record-level encryption for asynchronous byte streams.
//!
//! [`SecureStream`] wraps any `AsyncRead + AsyncWrite` transport and a
//! [`RecordEngine`] (the component that actually encrypts and decrypts
//! records, negotiated handshake included). It drives the engine's
//! handshake to completion before any application payload flows, then
//! turns plaintext writes into encrypted records on the wire and
//! encrypted records into plaintext reads, while keeping the same
//! `AsyncRead`/`AsyncWrite` contract as the transport underneath. TLS
//! termination becomes a drop-in substitution at the call site.
//!
//! The engine is a seam, not an implementation: anything that can wrap
//! plaintext into records and unwrap records into plaintext fits. The
//! `veil-chacha` crate ships a ready-made engine.
//!
//! ```no_run
//! # async fn run<T, E>(tcp: T, engine: E) -> std::io::Result<()>
//! # where T: veil_stream::AsyncTransport, E: veil_stream::RecordEngine {
//! use tokio::io::{AsyncReadExt, AsyncWriteExt};
//! use veil_stream::SecureStream;
//!
//! let mut stream = SecureStream::new(tcp, engine);
//!
//! stream.write_all(b"hello").await?; // handshake runs first, transparently
//! let mut reply = [0u8; 64];
//! let n = stream.read(&mut reply).await?;
//! # let _ = n;
//! # Ok(())
//! # }
//! ```

mod buffer;
mod engine;
mod error;
mod handshake;
mod read;
mod stream;
mod write;


pub use buffer::{BufferAllocator, HeapAllocator};
pub use engine::{EngineOutcome, EngineStatus, HandshakeAction, RecordEngine};
pub use error::Error;
pub use stream::{AsyncTransport, SecureStream};
