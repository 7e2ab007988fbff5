//! In-Process Transport
//!
//! Direct channel-based communication for embedded mode: the easel runs the
//! worker inside its own process and no serialization happens at all. Also
//! the transport of choice for integration tests.
//!
//! [`InProcessTransport::new_pair`] returns the transport plus the two
//! channel ends a [`Worker`](crate::worker::Worker) is constructed with, so
//! wiring an embedded worker is one call on each side.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::mpsc;

use crate::events::EaselEvent;
use crate::messages::WorkerMessage;

use super::traits::{EaselTransport, TransportError};

/// Channel-backed transport for an embedded worker.
pub struct InProcessTransport {
    event_tx: mpsc::Sender<EaselEvent>,
    msg_rx: mpsc::UnboundedReceiver<WorkerMessage>,
    connected: Arc<AtomicBool>,
}

impl InProcessTransport {
    /// A connected transport pair with the default event capacity.
    ///
    /// Returns the transport for the presentation side, the event receiver
    /// for the worker, and the message sender for the worker. The message
    /// channel is unbounded to match the worker's never-suspending emission
    /// path.
    #[must_use]
    pub fn new_pair() -> (
        Self,
        mpsc::Receiver<EaselEvent>,
        mpsc::UnboundedSender<WorkerMessage>,
    ) {
        Self::new_pair_with_capacity(256)
    }

    /// A connected transport pair with a custom inbound event capacity.
    #[must_use]
    pub fn new_pair_with_capacity(
        capacity: usize,
    ) -> (
        Self,
        mpsc::Receiver<EaselEvent>,
        mpsc::UnboundedSender<WorkerMessage>,
    ) {
        let (event_tx, event_rx) = mpsc::channel(capacity);
        let (msg_tx, msg_rx) = mpsc::unbounded_channel();

        let transport = Self {
            event_tx,
            msg_rx,
            connected: Arc::new(AtomicBool::new(true)),
        };

        (transport, event_rx, msg_tx)
    }
}

#[async_trait]
impl EaselTransport for InProcessTransport {
    async fn connect(&mut self) -> Result<(), TransportError> {
        self.connected.store(true, Ordering::SeqCst);
        Ok(())
    }

    async fn disconnect(&mut self) -> Result<(), TransportError> {
        self.connected.store(false, Ordering::SeqCst);
        Ok(())
    }

    async fn send(&self, event: EaselEvent) -> Result<(), TransportError> {
        if !self.connected.load(Ordering::SeqCst) {
            return Err(TransportError::InvalidState(
                "transport not connected".to_string(),
            ));
        }
        self.event_tx
            .send(event)
            .await
            .map_err(|_| TransportError::SendFailed("worker channel closed".to_string()))
    }

    async fn recv(&mut self) -> Result<WorkerMessage, TransportError> {
        self.msg_rx
            .recv()
            .await
            .ok_or(TransportError::ConnectionClosed)
    }

    fn try_recv(&mut self) -> Option<WorkerMessage> {
        self.msg_rx.try_recv().ok()
    }

    fn is_connected(&self) -> bool {
        self.connected.load(Ordering::SeqCst)
    }
}
