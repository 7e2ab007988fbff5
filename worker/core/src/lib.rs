//! Terrapin Core - Headless Turtle-Graphics Script Execution
//!
//! This crate provides the execution side of terrapin: a worker that runs
//! user scripts through a pluggable engine and streams drawing commands,
//! captured output, and input requests to a presentation client. It is
//! completely independent of any rendering stack and can drive a terminal
//! easel, a canvas UI, or a headless test harness.
//!
//! # Architecture
//!
//! ```text
//! ┌──────────────────────────────────────────────────────────────┐
//! │                     Presentation (easel)                      │
//! │        renders canvas commands, prints output, answers        │
//! │                       input requests                          │
//! └──────────────────────────────┬───────────────────────────────┘
//!                                │
//!                        EaselEvent (down)
//!                       WorkerMessage (up)
//!                                │
//! ┌──────────────────────────────┼───────────────────────────────┐
//! │                        WORKER CORE                            │
//! │  ┌───────────────────────────┴────────────────────────────┐  │
//! │  │                        Worker                           │  │
//! │  │  ┌─────────┐  ┌─────────┐  ┌──────────┐  ┌──────────┐  │  │
//! │  │  │ Turtle  │  │  Input  │  │  Outbox  │  │  Engine  │  │  │
//! │  │  │  State  │  │ Bridge  │  │ (run-id  │  │ (script  │  │  │
//! │  │  │ Machine │  │         │  │ tagging) │  │ sandbox) │  │  │
//! │  │  └─────────┘  └─────────┘  └──────────┘  └──────────┘  │  │
//! │  └─────────────────────────────────────────────────────────┘  │
//! └───────────────────────────────────────────────────────────────┘
//! ```
//!
//! # Key Types
//!
//! - [`Worker`]: the execution context controller, one engine per worker
//! - [`WorkerMessage`]: messages from the worker to the presentation side
//! - [`EaselEvent`]: events from the presentation side to the worker
//! - [`Turtle`]: the pose/pen state machine emitting [`CanvasCommand`]s
//! - [`RunFilter`]: receiver-side supersession of stale runs
//! - [`ScriptEngine`] / [`EngineHost`]: the sandbox contract, with
//!   [`DoodleEngine`] as the bundled reference implementation
//!
//! # Module Overview
//!
//! - [`messages`]: outbound envelope, run ids, the supersession filter
//! - [`events`]: inbound envelope
//! - [`turtle`]: pose tracking and drawing-command emission
//! - [`input`]: the suspend-on-input round-trip bridge
//! - [`outbox`]: run-id tagging and line batching for captured output
//! - [`host`]: the host surface an engine sees while a script runs
//! - [`worker`]: engine lifecycle and the sequential run loop
//! - [`engine`]: the sandbox traits plus the doodle reference engine
//! - [`transport`]: in-process and Unix-socket transports with framing
//! - [`config`]: layered TOML + environment configuration
//!
//! # No Rendering Dependencies
//!
//! This crate never draws. Canvas commands are instructions for an external
//! renderer; everything here stays usable on a machine with no display.

#![deny(missing_docs)]
#![deny(clippy::all)]
#![warn(clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]

pub mod config;
pub mod engine;
pub mod events;
pub mod host;
pub mod input;
pub mod messages;
pub mod outbox;
pub mod transport;
pub mod turtle;
pub mod worker;

// Re-exports for convenience
pub use config::{ConfigError, WorkerConfig};
pub use engine::{DoodleEngine, EngineError, EngineHost, ScriptEngine};
pub use events::EaselEvent;
pub use host::WorkerHost;
pub use input::{InputBridge, InputError};
pub use messages::{RunFilter, RunId, WorkerMessage};
pub use outbox::{LineBuffer, Outbox};
pub use turtle::{CanvasCommand, CommandBatch, Point, Turtle, TurtleCall, TurtleReply};
pub use worker::Worker;
