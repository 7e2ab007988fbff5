//! Unix Socket Server Transport
//!
//! Server-side (worker daemon) implementation. Accepts connections from
//! presentation clients and manages bidirectional framed traffic with each.

use std::collections::HashMap;
use std::os::unix::fs::PermissionsExt;
use std::path::PathBuf;
use std::sync::Arc;

use async_trait::async_trait;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{UnixListener, UnixStream};
use tokio::sync::{mpsc, RwLock};
use tracing::{debug, info, warn};

use crate::events::EaselEvent;
use crate::messages::WorkerMessage;
use crate::transport::frame::{encode, FrameDecoder};
use crate::transport::traits::{ConnectionId, TransportError, WorkerTransport};

/// Per-connection channel capacity.
const CONNECTION_CAPACITY: usize = 100;

/// Unix socket server for the worker daemon.
pub struct UnixSocketServer {
    socket_path: PathBuf,
    listener: Option<UnixListener>,
    connections: Arc<RwLock<HashMap<ConnectionId, ConnectionHandle>>>,
}

struct ConnectionHandle {
    tx: mpsc::Sender<WorkerMessage>,
}

/// Cheap cloneable handle for sending to every connection from a task that
/// does not own the server (the daemon's broadcast loop runs concurrently
/// with its accept loop).
#[derive(Clone)]
pub struct Broadcaster {
    connections: Arc<RwLock<HashMap<ConnectionId, ConnectionHandle>>>,
}

impl Broadcaster {
    /// Send `msg` to every currently connected surface.
    pub async fn broadcast(&self, msg: WorkerMessage) {
        let connections = self.connections.read().await;
        for (conn_id, handle) in connections.iter() {
            if let Err(e) = handle.tx.send(msg.clone()).await {
                warn!(conn_id = %conn_id, error = %e, "broadcast send failed");
            }
        }
    }
}

impl UnixSocketServer {
    /// A server that will bind `socket_path` once listening starts.
    #[must_use]
    pub fn new(socket_path: PathBuf) -> Self {
        Self {
            socket_path,
            listener: None,
            connections: Arc::new(RwLock::new(HashMap::new())),
        }
    }

    /// The path this server binds.
    #[must_use]
    pub fn socket_path(&self) -> &PathBuf {
        &self.socket_path
    }

    /// A broadcast handle sharing this server's connection table.
    #[must_use]
    pub fn broadcaster(&self) -> Broadcaster {
        Broadcaster {
            connections: Arc::clone(&self.connections),
        }
    }

    fn set_socket_permissions(&self) -> Result<(), TransportError> {
        let perms = std::fs::Permissions::from_mode(0o600);
        std::fs::set_permissions(&self.socket_path, perms)?;
        Ok(())
    }

    /// Verify the connecting process runs as the same user, via
    /// `SO_PEERCRED`.
    #[cfg(target_os = "linux")]
    fn validate_peer(stream: &UnixStream) -> Result<(), TransportError> {
        use std::os::unix::io::AsRawFd;

        let fd = stream.as_raw_fd();
        let cred = unsafe {
            let mut cred: libc::ucred = std::mem::zeroed();
            let mut len = std::mem::size_of::<libc::ucred>() as libc::socklen_t;
            let result = libc::getsockopt(
                fd,
                libc::SOL_SOCKET,
                libc::SO_PEERCRED,
                std::ptr::addr_of_mut!(cred).cast::<libc::c_void>(),
                &mut len,
            );
            if result < 0 {
                return Err(TransportError::Authentication(
                    "could not read peer credentials".to_string(),
                ));
            }
            cred
        };

        let my_uid = unsafe { libc::getuid() };
        if cred.uid != my_uid {
            warn!(
                peer_uid = cred.uid,
                my_uid, "rejecting connection from different user"
            );
            return Err(TransportError::Authentication(format!(
                "peer uid {} does not match server uid {my_uid}",
                cred.uid
            )));
        }

        debug!(peer_uid = cred.uid, peer_pid = cred.pid, "peer validated");
        Ok(())
    }

    /// Non-Linux platforms rely on the 0600 socket permissions.
    #[cfg(not(target_os = "linux"))]
    fn validate_peer(_stream: &UnixStream) -> Result<(), TransportError> {
        debug!("peer validation skipped (non-Linux platform)");
        Ok(())
    }
}

#[async_trait]
impl WorkerTransport for UnixSocketServer {
    async fn listen(&mut self) -> Result<(), TransportError> {
        if let Some(parent) = self.socket_path.parent() {
            std::fs::create_dir_all(parent).map_err(|e| {
                TransportError::Io(std::io::Error::new(
                    e.kind(),
                    format!("failed to create directory {parent:?}: {e}"),
                ))
            })?;
        }

        // A stale socket from a crashed daemon would block the bind.
        if self.socket_path.exists() {
            std::fs::remove_file(&self.socket_path).map_err(|e| {
                TransportError::Io(std::io::Error::new(
                    e.kind(),
                    format!("failed to remove old socket {:?}: {e}", self.socket_path),
                ))
            })?;
        }

        let listener = UnixListener::bind(&self.socket_path)?;
        self.set_socket_permissions()?;
        self.listener = Some(listener);

        info!(path = ?self.socket_path, "worker listening on unix socket");
        Ok(())
    }

    async fn accept(
        &mut self,
    ) -> Result<(ConnectionId, mpsc::Receiver<EaselEvent>), TransportError> {
        let listener = self
            .listener
            .as_ref()
            .ok_or_else(|| TransportError::InvalidState("not listening".to_string()))?;

        let (stream, _addr) = listener.accept().await?;
        Self::validate_peer(&stream)?;

        let conn_id = ConnectionId::new();
        let (event_tx, event_rx) = mpsc::channel::<EaselEvent>(CONNECTION_CAPACITY);
        let (msg_tx, mut msg_rx) = mpsc::channel::<WorkerMessage>(CONNECTION_CAPACITY);

        let (mut read_half, mut write_half) = stream.into_split();

        // Read task: stream bytes -> decoded events for the worker.
        let conn_id_read = conn_id.clone();
        let connections_read = Arc::clone(&self.connections);
        tokio::spawn(async move {
            let mut decoder = FrameDecoder::new();
            let mut buf = [0u8; 4096];

            loop {
                match read_half.read(&mut buf).await {
                    Ok(0) => {
                        debug!(conn_id = %conn_id_read, "connection closed by peer");
                        break;
                    }
                    Ok(n) => {
                        decoder.push(&buf[..n]);
                        loop {
                            match decoder.decode::<EaselEvent>() {
                                Ok(Some(event)) => {
                                    if event_tx.send(event).await.is_err() {
                                        debug!(conn_id = %conn_id_read, "event receiver dropped");
                                        break;
                                    }
                                }
                                Ok(None) => break,
                                Err(e) => {
                                    warn!(conn_id = %conn_id_read, error = %e, "frame decode error");
                                    break;
                                }
                            }
                        }
                    }
                    Err(e) => {
                        warn!(conn_id = %conn_id_read, error = %e, "read error");
                        break;
                    }
                }
            }

            connections_read.write().await.remove(&conn_id_read);
            info!(conn_id = %conn_id_read, "connection ended");
        });

        // Write task: queued worker messages -> framed stream bytes.
        let conn_id_write = conn_id.clone();
        tokio::spawn(async move {
            while let Some(msg) = msg_rx.recv().await {
                match encode(&msg) {
                    Ok(data) => {
                        if let Err(e) = write_half.write_all(&data).await {
                            warn!(conn_id = %conn_id_write, error = %e, "write error");
                            break;
                        }
                    }
                    Err(e) => {
                        warn!(conn_id = %conn_id_write, error = %e, "encode error");
                    }
                }
            }
        });

        self.connections
            .write()
            .await
            .insert(conn_id.clone(), ConnectionHandle { tx: msg_tx });

        info!(conn_id = %conn_id, "easel connected");
        Ok((conn_id, event_rx))
    }

    async fn send_to(
        &self,
        conn_id: &ConnectionId,
        msg: WorkerMessage,
    ) -> Result<(), TransportError> {
        let connections = self.connections.read().await;
        match connections.get(conn_id) {
            Some(handle) => handle
                .tx
                .send(msg)
                .await
                .map_err(|_| TransportError::SendFailed("connection channel closed".to_string())),
            None => Err(TransportError::SendFailed(format!(
                "unknown connection: {conn_id}"
            ))),
        }
    }

    async fn broadcast(&self, msg: WorkerMessage) -> Result<(), TransportError> {
        let connections = self.connections.read().await;
        for (conn_id, handle) in connections.iter() {
            if let Err(e) = handle.tx.send(msg.clone()).await {
                warn!(conn_id = %conn_id, error = %e, "broadcast send failed");
            }
        }
        Ok(())
    }

    async fn disconnect(&self, conn_id: &ConnectionId) -> Result<(), TransportError> {
        self.connections.write().await.remove(conn_id);
        info!(conn_id = %conn_id, "disconnected");
        Ok(())
    }

    async fn connection_count(&self) -> usize {
        self.connections.read().await.len()
    }

    async fn shutdown(&mut self) -> Result<(), TransportError> {
        self.listener = None;
        self.connections.write().await.clear();
        if self.socket_path.exists() {
            std::fs::remove_file(&self.socket_path).ok();
        }
        info!("unix socket server shut down");
        Ok(())
    }
}

impl Drop for UnixSocketServer {
    fn drop(&mut self) {
        if self.socket_path.exists() {
            std::fs::remove_file(&self.socket_path).ok();
        }
    }
}
