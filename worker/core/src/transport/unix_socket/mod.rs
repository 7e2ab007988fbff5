//! Unix Socket Transport
//!
//! Local IPC between a worker daemon and presentation clients over a Unix
//! domain socket, framed per [`frame`](crate::transport::frame).
//!
//! # Security
//!
//! - The socket file is created with 0600 permissions
//! - On Linux, `SO_PEERCRED` verifies the peer runs as the same user
//! - No network exposure

mod client;
mod server;

pub use client::UnixSocketClient;
pub use server::{Broadcaster, UnixSocketServer};
