//! Transport Layer for Worker-Easel IPC
//!
//! Abstraction over how a presentation surface reaches a worker:
//! - [`in_process`]: direct channels for an embedded worker (the easel's
//!   default mode, and the mode every integration test uses)
//! - [`unix_socket`]: local IPC with a long-running worker daemon
//!
//! # Design Philosophy
//!
//! The worker knows nothing about transports. It reads [`EaselEvent`]s from
//! a channel and writes [`WorkerMessage`]s to a channel; a transport is
//! whatever moves those channel ends across a process boundary, or doesn't.
//! Stream transports preserve send order per connection, which is what the
//! protocol's supersession contract relies on.
//!
//! # Security
//!
//! - Unix sockets use `SO_PEERCRED` to validate the peer UID
//! - Socket files are created with 0600 permissions
//! - No network exposure
//!
//! [`EaselEvent`]: crate::events::EaselEvent
//! [`WorkerMessage`]: crate::messages::WorkerMessage

pub mod frame;
pub mod in_process;
pub mod traits;
#[cfg(unix)]
pub mod unix_socket;

pub use frame::{encode, FrameDecoder, MAX_FRAME_SIZE};
pub use in_process::InProcessTransport;
pub use traits::{ConnectionId, EaselTransport, TransportError, WorkerTransport};

#[cfg(unix)]
pub use unix_socket::{Broadcaster, UnixSocketClient, UnixSocketServer};
