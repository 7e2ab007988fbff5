//! Terrapin Daemon
//!
//! Standalone worker process. Presentation clients (the easel, or anything
//! else speaking the protocol) connect via Unix socket; one shared worker
//! with one script engine serves them all, and every worker message is
//! broadcast so each client can apply its own run filter.
//!
//! # Usage
//!
//! ```bash
//! # Default socket ($XDG_RUNTIME_DIR/terrapin/worker.sock)
//! terrapin-daemon
//!
//! # Custom socket path
//! terrapin-daemon --socket /tmp/terrapin.sock
//!
//! # Verbose logging
//! RUST_LOG=debug terrapin-daemon
//! ```
//!
//! # Files
//!
//! - Socket: `$XDG_RUNTIME_DIR/terrapin/worker.sock` (fallback
//!   `/tmp/terrapin-$UID/terrapin/worker.sock`)
//! - PID file: alongside the socket, `worker.pid`
//!
//! # Signals
//!
//! SIGTERM/SIGINT trigger a graceful shutdown that removes the PID file and
//! the socket.

use std::fs;
use std::io::Write;
use std::path::PathBuf;

use anyhow::Context;
use clap::Parser;
use tokio::signal;
use tokio::sync::mpsc;
use tracing::{error, info, warn};

use terrapin_core::transport::{UnixSocketServer, WorkerTransport};
use terrapin_core::{DoodleEngine, Worker, WorkerConfig};

#[derive(Parser, Debug)]
#[command(name = "terrapin-daemon", version, about = "Turtle-graphics script worker daemon")]
struct Args {
    /// Unix socket path to serve on
    #[arg(long, env = "TERRAPIN_SOCKET")]
    socket: Option<PathBuf>,

    /// Config file path (default: $XDG_CONFIG_HOME/terrapin/worker.toml)
    #[arg(long)]
    config: Option<PathBuf>,
}

fn pid_path_for(socket_path: &std::path::Path) -> PathBuf {
    socket_path.with_file_name("worker.pid")
}

fn write_pid_file(path: &PathBuf) -> anyhow::Result<()> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)?;
    }
    let pid = std::process::id();
    let mut file = fs::File::create(path)?;
    writeln!(file, "{pid}")?;
    info!(pid, path = ?path, "PID file created");
    Ok(())
}

fn remove_pid_file(path: &PathBuf) {
    if path.exists() {
        if let Err(e) = fs::remove_file(path) {
            warn!(error = %e, path = ?path, "failed to remove PID file");
        } else {
            info!(path = ?path, "PID file removed");
        }
    }
}

async fn shutdown_signal() {
    let ctrl_c = async {
        signal::ctrl_c().await.expect("ctrl-c handler");
    };
    let terminate = async {
        signal::unix::signal(signal::unix::SignalKind::terminate())
            .expect("sigterm handler")
            .recv()
            .await;
    };
    tokio::select! {
        () = ctrl_c => info!("received ctrl-c, shutting down"),
        () = terminate => info!("received SIGTERM, shutting down"),
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive("terrapin_daemon=info".parse()?)
                .add_directive("terrapin_core=info".parse()?),
        )
        .with_target(true)
        .init();

    let args = Args::parse();

    info!("starting terrapin daemon");
    info!("PID: {}", std::process::id());

    let mut config = WorkerConfig::load(args.config.as_deref()).context("loading configuration")?;
    if let Some(socket) = args.socket {
        config.socket_path = Some(socket);
    }
    let socket_path = config.resolved_socket_path();
    info!(path = ?socket_path, "socket path");

    let pid_path = pid_path_for(&socket_path);
    write_pid_file(&pid_path)
        .with_context(|| format!("writing PID file at {pid_path:?}; check permissions"))?;

    // One shared worker; every connected client talks to the same engine
    // and the same turtle.
    let (event_tx, event_rx) = mpsc::channel(config.event_capacity);
    let (msg_tx, mut msg_rx) = mpsc::unbounded_channel();
    let worker = Worker::new(DoodleEngine::new, &config, event_rx, msg_tx);
    let worker_task = tokio::spawn(worker.run());
    info!("worker started");

    let mut server = UnixSocketServer::new(socket_path.clone());
    if let Err(e) = server.listen().await {
        remove_pid_file(&pid_path);
        return Err(anyhow::anyhow!(
            "failed to listen on {socket_path:?}: {e}; another daemon may be running"
        ));
    }

    // Broadcast worker output to every connected client; each applies its
    // own run filter.
    let broadcaster = server.broadcaster();
    tokio::spawn(async move {
        while let Some(msg) = msg_rx.recv().await {
            broadcaster.broadcast(msg).await;
        }
    });

    info!("ready to accept connections");

    let shutdown = shutdown_signal();
    tokio::pin!(shutdown);

    loop {
        tokio::select! {
            () = &mut shutdown => break,
            accepted = server.accept() => match accepted {
                Ok((conn_id, mut conn_events)) => {
                    let event_tx = event_tx.clone();
                    tokio::spawn(async move {
                        while let Some(event) = conn_events.recv().await {
                            if event_tx.send(event).await.is_err() {
                                warn!(conn_id = %conn_id, "worker event channel closed");
                                break;
                            }
                        }
                        info!(conn_id = %conn_id, "easel disconnected");
                    });
                }
                Err(e) => {
                    error!(error = %e, "accept failed");
                }
            },
        }
    }

    info!("performing graceful shutdown");
    if let Err(e) = server.shutdown().await {
        warn!(error = %e, "server shutdown error");
    }
    worker_task.abort();
    remove_pid_file(&pid_path);
    if socket_path.exists() {
        if let Err(e) = fs::remove_file(&socket_path) {
            warn!(error = %e, "failed to remove socket file");
        }
    }

    info!("terrapin daemon stopped cleanly");
    Ok(())
}
