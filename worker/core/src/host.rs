//! Worker Host
//!
//! The [`EngineHost`] the worker hands to its engine at boot. It owns the
//! lazily created turtle, the line batching for captured output, and the
//! pending-input slot, and it forwards everything outward through the
//! shared [`Outbox`].
//!
//! The mutexes here guard sub-millisecond state updates on the single
//! execution task and are never held across an await.

use async_trait::async_trait;
use parking_lot::Mutex;

use crate::engine::{EngineError, EngineHost};
use crate::input::InputBridge;
use crate::outbox::{LineBuffer, Outbox};
use crate::turtle::{Turtle, TurtleCall, TurtleReply};

/// Host-side state for one execution context.
#[derive(Debug)]
pub struct WorkerHost {
    outbox: Outbox,
    turtle: Mutex<Option<Turtle>>,
    bridge: Mutex<InputBridge>,
    stdout: Mutex<LineBuffer>,
    stderr: Mutex<LineBuffer>,
}

impl WorkerHost {
    /// Host emitting through `outbox`. The turtle does not exist yet; the
    /// first turtle call creates it and emits its birth pose.
    #[must_use]
    pub fn new(outbox: Outbox) -> Self {
        Self {
            outbox,
            turtle: Mutex::new(None),
            bridge: Mutex::new(InputBridge::new()),
            stdout: Mutex::new(LineBuffer::new()),
            stderr: Mutex::new(LineBuffer::new()),
        }
    }

    /// Deliver an input reply. Returns `false` for a stale reply (nothing
    /// pending), which the worker drops silently.
    pub fn resolve_input(&self, text: String) -> bool {
        self.bridge.lock().resolve(text)
    }

    /// Abort whatever input request is pending, if any. Called when a run
    /// terminates so a blocked script call unwinds instead of hanging.
    pub fn abort_pending_input(&self) -> bool {
        self.bridge.lock().abort()
    }

    /// Whether a script is currently blocked on input.
    #[must_use]
    pub fn awaiting_input(&self) -> bool {
        self.bridge.lock().is_awaiting()
    }

    /// Release unterminated output fragments at the end of a run, in
    /// stdout-then-stderr order.
    pub fn flush_output(&self) {
        if let Some(tail) = self.stdout.lock().flush() {
            self.outbox.stdout(tail);
        }
        if let Some(tail) = self.stderr.lock().flush() {
            self.outbox.stderr(tail);
        }
    }

    /// Read access to the turtle, if it has been created. Mainly for
    /// assertions in tests; scripts reach it through turtle calls.
    pub fn with_turtle<R>(&self, f: impl FnOnce(&Turtle) -> R) -> Option<R> {
        self.turtle.lock().as_ref().map(f)
    }
}

#[async_trait]
impl EngineHost for WorkerHost {
    fn stdout(&self, chunk: &str) {
        for line in self.stdout.lock().push(chunk) {
            self.outbox.stdout(line);
        }
    }

    fn stderr(&self, chunk: &str) {
        for line in self.stderr.lock().push(chunk) {
            self.outbox.stderr(line);
        }
    }

    async fn read_line(&self, prompt: &str) -> Result<String, EngineError> {
        let rx = self
            .bridge
            .lock()
            .begin()
            .map_err(|e| EngineError::Script(e.to_string()))?;
        // Emit only after the slot is armed, so a reply arriving immediately
        // finds something to resolve.
        self.outbox.input_request(prompt);
        rx.await
            .map_err(|_| EngineError::Script("input request aborted".to_string()))
    }

    fn turtle(&self, call: TurtleCall) -> TurtleReply {
        let mut slot = self.turtle.lock();
        let turtle = slot.get_or_insert_with(|| {
            let turtle = Turtle::new();
            self.outbox.canvas(turtle.pose_snapshot());
            turtle
        });
        let (reply, batch) = turtle.apply(call);
        for cmd in batch {
            self.outbox.canvas(cmd);
        }
        reply
    }
}
