//! Transport Traits
//!
//! The two sides of a worker-easel connection:
//! - [`EaselTransport`]: client side (the easel or any other presentation
//!   surface)
//! - [`WorkerTransport`]: server side (the worker daemon)

use std::fmt;

use async_trait::async_trait;
use thiserror::Error;
use tokio::sync::mpsc;

use crate::events::EaselEvent;
use crate::messages::WorkerMessage;

/// Unique identifier for a connected presentation surface.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct ConnectionId(pub String);

impl ConnectionId {
    /// A fresh random 128-bit id.
    #[must_use]
    pub fn new() -> Self {
        use rand::Rng;
        let bytes: [u8; 16] = rand::thread_rng().gen();
        Self(format!("conn_{}", hex::encode(bytes)))
    }
}

impl Default for ConnectionId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for ConnectionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Failures during transport operations.
#[derive(Debug, Error)]
pub enum TransportError {
    /// Could not reach the peer.
    #[error("connection failed: {0}")]
    ConnectionFailed(String),

    /// The peer hung up.
    #[error("connection closed")]
    ConnectionClosed,

    /// A message could not be handed to the peer.
    #[error("send failed: {0}")]
    SendFailed(String),

    /// Encoding or decoding a frame payload failed, or a frame exceeded the
    /// size limit.
    #[error("serialization error: {0}")]
    Serialization(String),

    /// The connecting peer is not who it must be (wrong UID).
    #[error("peer authentication failed: {0}")]
    Authentication(String),

    /// The underlying stream failed.
    #[error("i/o error: {0}")]
    Io(#[from] std::io::Error),

    /// An operation was called in the wrong state, such as sending before
    /// connecting.
    #[error("invalid transport state: {0}")]
    InvalidState(String),

    /// A frame arrived corrupted.
    #[error("frame checksum mismatch: expected {expected:#010x}, got {actual:#010x}")]
    ChecksumMismatch {
        /// Checksum declared in the frame header.
        expected: u32,
        /// Checksum computed over the received payload.
        actual: u32,
    },
}

/// Client-side transport, used by presentation surfaces to talk to a
/// worker.
#[async_trait]
pub trait EaselTransport: Send + Sync {
    /// Establish the connection. A no-op for embedded transports.
    async fn connect(&mut self) -> Result<(), TransportError>;

    /// Gracefully close the connection.
    async fn disconnect(&mut self) -> Result<(), TransportError>;

    /// Send one event to the worker.
    async fn send(&self, event: EaselEvent) -> Result<(), TransportError>;

    /// Receive the next worker message, waiting until one arrives.
    async fn recv(&mut self) -> Result<WorkerMessage, TransportError>;

    /// Receive a worker message without waiting, if one is queued.
    fn try_recv(&mut self) -> Option<WorkerMessage>;

    /// Whether the transport currently considers itself connected.
    fn is_connected(&self) -> bool;
}

/// Server-side transport, used by the worker daemon to accept and serve
/// presentation surfaces.
#[async_trait]
pub trait WorkerTransport: Send + Sync {
    /// Start accepting connections.
    async fn listen(&mut self) -> Result<(), TransportError>;

    /// Accept one connection, returning its id and a receiver for the
    /// events it sends.
    async fn accept(&mut self)
        -> Result<(ConnectionId, mpsc::Receiver<EaselEvent>), TransportError>;

    /// Send a message to one connected surface.
    async fn send_to(
        &self,
        conn_id: &ConnectionId,
        msg: WorkerMessage,
    ) -> Result<(), TransportError>;

    /// Send a message to every connected surface.
    async fn broadcast(&self, msg: WorkerMessage) -> Result<(), TransportError>;

    /// Drop one connection.
    async fn disconnect(&self, conn_id: &ConnectionId) -> Result<(), TransportError>;

    /// How many surfaces are currently connected.
    async fn connection_count(&self) -> usize;

    /// Stop listening and drop every connection.
    async fn shutdown(&mut self) -> Result<(), TransportError>;
}
