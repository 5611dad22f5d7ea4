//! # Transport Abstraction
//!
//! A minimal, async interface for moving bytes between execution contexts.
//!
//! ## Philosophy
//!
//! - **Byte-Oriented**: The Transport knows nothing about messages or ids.
//!   It moves opaque buffers.
//! - **Duplex**: Either side may send at any time. Correlating replies with
//!   requests is the job of the `Peer`, not the transport.

use std::fmt;

/// Errors that occur at the channel layer.
#[derive(Debug, Clone)]
pub enum Error {
    /// The other side went away.
    ConnectionLost(String),
    /// Generic I/O error or internal transport failure.
    Io(String),
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::ConnectionLost(msg) => write!(f, "Connection lost: {}", msg),
            Self::Io(msg) => write!(f, "I/O error: {}", msg),
        }
    }
}

impl std::error::Error for Error {}

pub type Result<T> = std::result::Result<T, Error>;

/// A bidirectional byte channel.
///
/// This trait is object-safe (`Arc<dyn Transport>`).
#[async_trait::async_trait]
pub trait Transport: Send + Sync + 'static {
    /// Queues one message for the other side.
    async fn send(&self, payload: &[u8]) -> Result<()>;

    /// Waits for the next message. `Ok(None)` means the channel is closed.
    async fn recv(&self) -> Result<Option<Vec<u8>>>;
}
