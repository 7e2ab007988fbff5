//! Unix Socket Client Transport
//!
//! Client-side (presentation) implementation. Connects to a worker daemon's
//! socket and exchanges framed events and messages.

use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::UnixStream;
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

use crate::events::EaselEvent;
use crate::messages::WorkerMessage;
use crate::transport::frame::{encode, FrameDecoder};
use crate::transport::traits::{EaselTransport, TransportError};

/// Per-direction channel capacity.
const CHANNEL_CAPACITY: usize = 100;

/// Unix socket client for presentation surfaces.
pub struct UnixSocketClient {
    socket_path: PathBuf,
    msg_rx: Option<mpsc::Receiver<WorkerMessage>>,
    event_tx: Option<mpsc::Sender<EaselEvent>>,
    connected: Arc<AtomicBool>,
}

impl UnixSocketClient {
    /// A client that will connect to `socket_path`.
    #[must_use]
    pub fn new(socket_path: PathBuf) -> Self {
        Self {
            socket_path,
            msg_rx: None,
            event_tx: None,
            connected: Arc::new(AtomicBool::new(false)),
        }
    }

    /// The path this client connects to.
    #[must_use]
    pub fn socket_path(&self) -> &PathBuf {
        &self.socket_path
    }
}

#[async_trait]
impl EaselTransport for UnixSocketClient {
    async fn connect(&mut self) -> Result<(), TransportError> {
        if self.connected.load(Ordering::SeqCst) {
            return Err(TransportError::InvalidState(
                "already connected".to_string(),
            ));
        }

        let stream = UnixStream::connect(&self.socket_path).await.map_err(|e| {
            TransportError::ConnectionFailed(format!(
                "failed to connect to {:?}: {e}",
                self.socket_path
            ))
        })?;

        let (mut read_half, mut write_half) = stream.into_split();
        let (msg_tx, msg_rx) = mpsc::channel::<WorkerMessage>(CHANNEL_CAPACITY);
        let (event_tx, mut event_rx) = mpsc::channel::<EaselEvent>(CHANNEL_CAPACITY);

        let connected = Arc::clone(&self.connected);
        connected.store(true, Ordering::SeqCst);

        // Read task: stream bytes -> decoded worker messages.
        let connected_read = Arc::clone(&connected);
        tokio::spawn(async move {
            let mut decoder = FrameDecoder::new();
            let mut buf = [0u8; 4096];

            loop {
                match read_half.read(&mut buf).await {
                    Ok(0) => {
                        debug!("connection closed by worker");
                        break;
                    }
                    Ok(n) => {
                        decoder.push(&buf[..n]);
                        loop {
                            match decoder.decode::<WorkerMessage>() {
                                Ok(Some(msg)) => {
                                    if msg_tx.send(msg).await.is_err() {
                                        debug!("message receiver dropped");
                                        break;
                                    }
                                }
                                Ok(None) => break,
                                Err(e) => {
                                    warn!(error = %e, "frame decode error");
                                    break;
                                }
                            }
                        }
                    }
                    Err(e) => {
                        warn!(error = %e, "read error");
                        break;
                    }
                }
            }

            connected_read.store(false, Ordering::SeqCst);
            info!("disconnected from worker");
        });

        // Write task: queued events -> framed stream bytes.
        let connected_write = Arc::clone(&connected);
        tokio::spawn(async move {
            while let Some(event) = event_rx.recv().await {
                match encode(&event) {
                    Ok(data) => {
                        if let Err(e) = write_half.write_all(&data).await {
                            warn!(error = %e, "write error");
                            break;
                        }
                    }
                    Err(e) => {
                        warn!(error = %e, "encode error");
                    }
                }
            }
            connected_write.store(false, Ordering::SeqCst);
        });

        self.msg_rx = Some(msg_rx);
        self.event_tx = Some(event_tx);

        info!(path = ?self.socket_path, "connected to worker");
        Ok(())
    }

    async fn disconnect(&mut self) -> Result<(), TransportError> {
        self.connected.store(false, Ordering::SeqCst);
        self.msg_rx = None;
        self.event_tx = None;
        info!("disconnected");
        Ok(())
    }

    async fn send(&self, event: EaselEvent) -> Result<(), TransportError> {
        if !self.connected.load(Ordering::SeqCst) {
            return Err(TransportError::InvalidState("not connected".to_string()));
        }
        match &self.event_tx {
            Some(tx) => tx
                .send(event)
                .await
                .map_err(|_| TransportError::SendFailed("channel closed".to_string())),
            None => Err(TransportError::InvalidState("not connected".to_string())),
        }
    }

    async fn recv(&mut self) -> Result<WorkerMessage, TransportError> {
        match &mut self.msg_rx {
            Some(rx) => rx.recv().await.ok_or(TransportError::ConnectionClosed),
            None => Err(TransportError::InvalidState("not connected".to_string())),
        }
    }

    fn try_recv(&mut self) -> Option<WorkerMessage> {
        self.msg_rx.as_mut()?.try_recv().ok()
    }

    fn is_connected(&self) -> bool {
        self.connected.load(Ordering::SeqCst)
    }
}
