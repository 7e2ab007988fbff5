//! Easel Events
//!
//! Events sent from a presentation surface to the execution worker. The
//! inbound vocabulary is deliberately tiny: wake the engine up, run a
//! script, answer the one question the script may be blocked on.

use serde::{Deserialize, Serialize};

use crate::messages::RunId;

/// Events from a presentation surface to the worker.
///
/// Serialized as internally tagged JSON, mirroring [`WorkerMessage`] in the
/// other direction.
///
/// [`WorkerMessage`]: crate::messages::WorkerMessage
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "kebab-case", rename_all_fields = "camelCase")]
pub enum EaselEvent {
    /// Initialize the script engine ahead of the first run. Idempotent: the
    /// engine is constructed at most once, and repeated inits while a boot
    /// is in flight all await the same construction.
    Init,

    /// Execute a script. The given id becomes the active run for the
    /// duration; a run arriving while another is in flight is queued.
    Run {
        /// Id assigned to this run by the presentation side.
        run_id: RunId,
        /// The script source text.
        code: String,
    },

    /// Answer to the pending input request, if any. Stale responses (no
    /// request outstanding) are silently dropped.
    InputResponse {
        /// The user's reply. Absent on the wire means empty.
        #[serde(default)]
        text: String,
    },
}
