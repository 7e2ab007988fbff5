//! Outbox
//!
//! The worker's one gateway for outward messages. Every send is tagged with
//! the run id active at send time; between runs the tag falls back to the
//! control sentinel. The underlying channel is unbounded because drawing
//! and output emission happen inside synchronous turtle calls that must
//! never suspend.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use tokio::sync::mpsc;
use tracing::debug;

use crate::messages::{RunId, WorkerMessage};
use crate::turtle::CanvasCommand;

/// Tagging sender for [`WorkerMessage`]s.
///
/// Cheap to clone; clones share the active-run tag, so the host's emissions
/// and the worker's lifecycle messages always agree on the current id.
#[derive(Clone, Debug)]
pub struct Outbox {
    tx: mpsc::UnboundedSender<WorkerMessage>,
    active: Arc<AtomicU64>,
}

impl Outbox {
    /// Wrap a message channel. The tag starts at the control sentinel.
    #[must_use]
    pub fn new(tx: mpsc::UnboundedSender<WorkerMessage>) -> Self {
        Self {
            tx,
            active: Arc::new(AtomicU64::new(RunId::CONTROL.0)),
        }
    }

    /// Convenience for tests and embedded use: a fresh channel plus its
    /// receiving end.
    #[must_use]
    pub fn channel() -> (Self, mpsc::UnboundedReceiver<WorkerMessage>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Self::new(tx), rx)
    }

    /// The id subsequent sends will be tagged with.
    #[must_use]
    pub fn active(&self) -> RunId {
        RunId(self.active.load(Ordering::SeqCst))
    }

    /// Tag subsequent sends with `run`.
    pub fn set_active(&self, run: RunId) {
        self.active.store(run.0, Ordering::SeqCst);
    }

    /// Drop back to the control sentinel between runs.
    pub fn clear_active(&self) {
        self.set_active(RunId::CONTROL);
    }

    /// Send a human-readable progress note.
    pub fn status(&self, text: impl Into<String>) {
        self.send(WorkerMessage::Status {
            run_id: self.active(),
            text: text.into(),
        });
    }

    /// Announce that engine initialization completed.
    pub fn ready(&self) {
        self.send(WorkerMessage::Ready {
            run_id: self.active(),
        });
    }

    /// Close the active run successfully.
    pub fn done(&self) {
        self.send(WorkerMessage::Done {
            run_id: self.active(),
        });
    }

    /// Close the active run with an error description.
    pub fn error(&self, text: impl Into<String>) {
        self.error_for(self.active(), text);
    }

    /// Report an error for a specific run regardless of the active tag.
    /// Used when rejecting a queued run that never became active.
    pub fn error_for(&self, run: RunId, text: impl Into<String>) {
        self.send(WorkerMessage::Error {
            run_id: run,
            text: text.into(),
        });
    }

    /// Forward one captured stdout line.
    pub fn stdout(&self, text: impl Into<String>) {
        self.send(WorkerMessage::Stdout {
            run_id: self.active(),
            text: text.into(),
        });
    }

    /// Forward one captured stderr line.
    pub fn stderr(&self, text: impl Into<String>) {
        self.send(WorkerMessage::Stderr {
            run_id: self.active(),
            text: text.into(),
        });
    }

    /// Forward one drawing event.
    pub fn canvas(&self, cmd: CanvasCommand) {
        self.send(WorkerMessage::Canvas {
            run_id: self.active(),
            cmd,
        });
    }

    /// Announce that the script is blocked on input.
    pub fn input_request(&self, prompt: impl Into<String>) {
        self.send(WorkerMessage::InputRequest {
            run_id: self.active(),
            prompt: prompt.into(),
        });
    }

    fn send(&self, message: WorkerMessage) {
        if self.tx.send(message).is_err() {
            debug!("message channel closed, dropping outbound message");
        }
    }
}

/// Accumulates raw output chunks and releases them one line at a time.
///
/// Engines may write in arbitrary chunks; the presentation side wants
/// line-shaped messages. Complete lines keep their trailing newline, and a
/// final unterminated fragment is released by [`flush`](LineBuffer::flush)
/// when the run ends.
#[derive(Debug, Default)]
pub struct LineBuffer {
    partial: String,
}

impl LineBuffer {
    /// An empty buffer.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Absorb a chunk, returning every line it completed.
    pub fn push(&mut self, chunk: &str) -> Vec<String> {
        let mut lines = Vec::new();
        let mut rest = chunk;
        while let Some(pos) = rest.find('\n') {
            let (head, tail) = rest.split_at(pos + 1);
            if self.partial.is_empty() {
                lines.push(head.to_string());
            } else {
                self.partial.push_str(head);
                lines.push(std::mem::take(&mut self.partial));
            }
            rest = tail;
        }
        if !rest.is_empty() {
            self.partial.push_str(rest);
        }
        lines
    }

    /// Release the unterminated fragment, if any.
    pub fn flush(&mut self) -> Option<String> {
        if self.partial.is_empty() {
            None
        } else {
            Some(std::mem::take(&mut self.partial))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sends_tagged_with_active_run() {
        let (outbox, mut rx) = Outbox::channel();

        outbox.status("booting");
        outbox.set_active(RunId(3));
        outbox.stdout("hi\n");
        outbox.done();
        outbox.clear_active();
        outbox.status("idle");

        assert_eq!(rx.try_recv().unwrap().run_id(), RunId::CONTROL);
        assert_eq!(rx.try_recv().unwrap().run_id(), RunId(3));
        assert_eq!(rx.try_recv().unwrap().run_id(), RunId(3));
        assert_eq!(rx.try_recv().unwrap().run_id(), RunId::CONTROL);
    }

    #[test]
    fn test_clones_share_the_tag() {
        let (outbox, mut rx) = Outbox::channel();
        let host_side = outbox.clone();

        outbox.set_active(RunId(7));
        host_side.canvas(CanvasCommand::Clear);

        assert_eq!(rx.try_recv().unwrap().run_id(), RunId(7));
    }

    #[test]
    fn test_send_after_receiver_dropped_does_not_panic() {
        let (outbox, rx) = Outbox::channel();
        drop(rx);
        outbox.status("anyone there?");
        outbox.done();
    }

    #[test]
    fn test_line_buffer_splits_and_joins() {
        let mut buffer = LineBuffer::new();
        assert_eq!(buffer.push("hel"), Vec::<String>::new());
        assert_eq!(buffer.push("lo\nwor"), vec!["hello\n".to_string()]);
        assert_eq!(buffer.push("ld\n"), vec!["world\n".to_string()]);
        assert_eq!(buffer.flush(), None);
    }

    #[test]
    fn test_line_buffer_multiple_lines_in_one_chunk() {
        let mut buffer = LineBuffer::new();
        assert_eq!(
            buffer.push("a\nb\nc"),
            vec!["a\n".to_string(), "b\n".to_string()]
        );
        assert_eq!(buffer.flush(), Some("c".to_string()));
        assert_eq!(buffer.flush(), None);
    }
}
