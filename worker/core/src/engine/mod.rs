//! Script Engine Traits
//!
//! The interface between the worker and whatever actually executes user
//! scripts. The worker treats an engine as an opaque sandbox with exactly
//! three obligations: it can be booted once, it can run source text to
//! completion, and while running it reaches the outside world only through
//! the [`EngineHost`] it was booted with.
//!
//! The worker does not know or care what language an engine speaks. The
//! bundled [`doodle`] engine exists so the system is demonstrable end to
//! end; anything implementing [`ScriptEngine`] slots in the same way.

pub mod doodle;

use std::sync::Arc;

use async_trait::async_trait;
use thiserror::Error;

use crate::turtle::{TurtleCall, TurtleReply};

pub use doodle::DoodleEngine;

/// Failures an engine can report.
///
/// The two variants mirror the two ways a run can die: the sandbox itself
/// failed to come up, or the script raised. Boot failures leave the worker's
/// engine slot empty so a later run retries construction from scratch;
/// script failures leave the engine usable for the next run.
#[derive(Clone, Debug, PartialEq, Eq, Error)]
pub enum EngineError {
    /// The engine could not be constructed or wired up.
    #[error("engine initialization failed: {0}")]
    Boot(String),

    /// The script raised an error at parse or execution time. Displays as
    /// the bare description, which is what the presentation side shows.
    #[error("{0}")]
    Script(String),
}

/// Host services available to an engine while a script runs.
///
/// Implemented by the worker. Output forwarding and turtle calls are
/// synchronous and never suspend; [`read_line`](EngineHost::read_line) is
/// the single suspension point in the whole system.
#[async_trait]
pub trait EngineHost: Send + Sync {
    /// Forward a chunk of the script's standard output. Chunks need not be
    /// whole lines; the host batches by line boundary.
    fn stdout(&self, chunk: &str);

    /// Forward a chunk of the script's standard error.
    fn stderr(&self, chunk: &str);

    /// Suspend the script until the presentation side replies to an input
    /// request. Fails if a request is already pending or the run is torn
    /// down while blocked; engines surface either as a script error.
    async fn read_line(&self, prompt: &str) -> Result<String, EngineError>;

    /// Apply one turtle call and return its reply. Drawing commands the
    /// call produces are emitted by the host as a side effect, in order.
    fn turtle(&self, call: TurtleCall) -> TurtleReply;
}

/// A sandboxed script-execution engine.
#[async_trait]
pub trait ScriptEngine: Send + Sync + 'static {
    /// Short engine name for status messages and logs.
    fn name(&self) -> &str;

    /// One-time setup: capture the host and perform any expensive
    /// construction. Called exactly once per engine instance; a failed boot
    /// discards the instance.
    async fn boot(&self, host: Arc<dyn EngineHost>) -> Result<(), EngineError>;

    /// Execute one script to completion. Runs strictly one at a time per
    /// engine; suspension happens only inside host input calls.
    async fn exec(&self, source: &str) -> Result<(), EngineError>;
}
