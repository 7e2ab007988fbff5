//! Worker Messages
//!
//! Messages sent from the execution worker to the presentation side. These
//! represent every way the worker can communicate with whatever renders its
//! output (a terminal easel, a canvas UI, a test harness).
//!
//! # Design Philosophy
//!
//! The worker is the "hands" that execute a script and narrate what happened.
//! Presentation surfaces are pure consumers: they replay drawing commands,
//! print captured output, and answer input prompts. The worker never waits
//! for a surface to render, and a surface never reaches into the worker's
//! state. Everything crosses this boundary as a tagged message carrying the
//! id of the run that produced it, which is what makes supersession (see
//! [`RunFilter`]) possible without preempting the script engine.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::turtle::CanvasCommand;

/// Identifier for one script run.
///
/// Assigned monotonically by the presentation side and echoed back on every
/// message the run produces. The zero value is reserved: it tags messages
/// that belong to no user run, such as `ready` after an `init`-triggered
/// engine boot. The `Default` value is that control sentinel.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RunId(pub u64);

impl RunId {
    /// Sentinel id for control messages not tied to a user run.
    pub const CONTROL: RunId = RunId(0);

    /// Whether this is the control sentinel rather than a user run.
    #[must_use]
    pub fn is_control(self) -> bool {
        self.0 == 0
    }
}

impl fmt::Display for RunId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Messages from the worker to a presentation surface.
///
/// Serialized as internally tagged JSON (`"type"` discriminant, camelCase
/// fields), so `Done { run_id: RunId(3) }` becomes
/// `{"type":"done","runId":3}` on the wire.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "kebab-case", rename_all_fields = "camelCase")]
pub enum WorkerMessage {
    // ============================================
    // Progress and lifecycle
    // ============================================
    /// Human-readable progress note (engine loading, queue activity).
    Status {
        /// Run active when the note was produced.
        run_id: RunId,
        /// The note itself.
        text: String,
    },

    /// Engine initialization completed; the worker accepts runs.
    ///
    /// Always meaningful to the receiver, regardless of which run it
    /// currently considers active.
    Ready {
        /// Run that triggered initialization, or the control sentinel.
        run_id: RunId,
    },

    /// The run finished without raising an error.
    Done {
        /// The run that finished.
        run_id: RunId,
    },

    /// The run terminated with an error.
    Error {
        /// The run that failed.
        run_id: RunId,
        /// Textual description of what went wrong.
        text: String,
    },

    // ============================================
    // Captured script output
    // ============================================
    /// A chunk of the script's standard output, batched by line.
    Stdout {
        /// Run that produced the output.
        run_id: RunId,
        /// The captured text, trailing newline included.
        text: String,
    },

    /// A chunk of the script's standard error, batched by line.
    Stderr {
        /// Run that produced the output.
        run_id: RunId,
        /// The captured text, trailing newline included.
        text: String,
    },

    // ============================================
    // Drawing and input
    // ============================================
    /// One turtle drawing event for the renderer to replay.
    #[serde(rename = "canvas-command")]
    Canvas {
        /// Run that produced the event.
        run_id: RunId,
        /// The drawing event.
        cmd: CanvasCommand,
    },

    /// The script is suspended waiting for a line of text.
    InputRequest {
        /// Run that is blocked.
        run_id: RunId,
        /// Prompt to show the user, possibly empty.
        prompt: String,
    },
}

impl WorkerMessage {
    /// The run id this message is tagged with.
    #[must_use]
    pub fn run_id(&self) -> RunId {
        match self {
            Self::Status { run_id, .. }
            | Self::Ready { run_id }
            | Self::Done { run_id }
            | Self::Error { run_id, .. }
            | Self::Stdout { run_id, .. }
            | Self::Stderr { run_id, .. }
            | Self::Canvas { run_id, .. }
            | Self::InputRequest { run_id, .. } => *run_id,
        }
    }
}

/// Receiver-side supersession filter.
///
/// The worker never aborts an in-flight script; starting a new run simply
/// makes the old one stale. The presentation side applies this filter to
/// every incoming message and drops the ones tagged with a superseded id.
/// `ready` is exempt because it reports engine state, not run output, and a
/// surface that missed it would wait forever.
///
/// Residual side effects are expected: a superseded run may still have
/// emitted partial output before its messages started being dropped. That
/// is the documented cost of cooperative cancellation.
#[derive(Clone, Copy, Debug, Default)]
pub struct RunFilter {
    active: RunId,
}

impl RunFilter {
    /// New filter with no user run active (control messages pass).
    #[must_use]
    pub fn new() -> Self {
        Self {
            active: RunId::CONTROL,
        }
    }

    /// Mark `run` as the active run; all other ids become stale.
    pub fn activate(&mut self, run: RunId) {
        self.active = run;
    }

    /// The id this filter currently considers active.
    #[must_use]
    pub fn active(&self) -> RunId {
        self.active
    }

    /// Whether `message` should be delivered or discarded.
    #[must_use]
    pub fn admits(&self, message: &WorkerMessage) -> bool {
        matches!(message, WorkerMessage::Ready { .. }) || message.run_id() == self.active
    }
}
