//! Input Round-Trip Bridge
//!
//! Suspends script execution on an input request and resumes it when the
//! presentation side supplies a line of text. The bridge is a two-state
//! machine, idle or awaiting-reply, holding at most one pending resume
//! channel at a time.
//!
//! Protocol misuse never panics here: a reply with nothing pending is
//! reported as stale for the caller to drop, and a second request while one
//! is pending is rejected so the engine can surface it as a script error.

use thiserror::Error;
use tokio::sync::oneshot;

/// Why an input request could not be opened.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Error)]
pub enum InputError {
    /// A request is already awaiting its reply. One outstanding request per
    /// execution context is the enforced policy.
    #[error("an input request is already pending")]
    AlreadyPending,
}

/// The single pending-input slot for one execution context.
#[derive(Debug, Default)]
pub struct InputBridge {
    pending: Option<oneshot::Sender<String>>,
}

impl InputBridge {
    /// A bridge in the idle state.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Transition idle to awaiting-reply. The returned receiver resolves
    /// with the reply text, or with an error if the request is aborted.
    pub fn begin(&mut self) -> Result<oneshot::Receiver<String>, InputError> {
        if self.pending.is_some() {
            return Err(InputError::AlreadyPending);
        }
        let (tx, rx) = oneshot::channel();
        self.pending = Some(tx);
        Ok(rx)
    }

    /// Deliver a reply, consuming the pending request. Returns `false` when
    /// the bridge was idle, in which case the reply is stale and the caller
    /// should drop it.
    pub fn resolve(&mut self, text: String) -> bool {
        match self.pending.take() {
            Some(tx) => {
                // A dropped receiver means the run already unwound; the
                // reply is stale either way.
                let _ = tx.send(text);
                true
            }
            None => false,
        }
    }

    /// Drop any pending request, waking its receiver with an error. Used
    /// when a run terminates while its script is still blocked. Returns
    /// whether a request was actually pending.
    pub fn abort(&mut self) -> bool {
        self.pending.take().is_some()
    }

    /// Whether a request is awaiting its reply.
    #[must_use]
    pub fn is_awaiting(&self) -> bool {
        self.pending.is_some()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_round_trip_delivers_exact_text() {
        let mut bridge = InputBridge::new();
        let rx = bridge.begin().unwrap();
        assert!(bridge.is_awaiting());

        assert!(bridge.resolve("5".to_string()));
        assert_eq!(rx.await.unwrap(), "5");
        assert!(!bridge.is_awaiting());
    }

    #[test]
    fn test_stale_reply_is_reported_not_thrown() {
        let mut bridge = InputBridge::new();
        assert!(!bridge.resolve("nobody asked".to_string()));
    }

    #[test]
    fn test_second_request_rejected_while_pending() {
        let mut bridge = InputBridge::new();
        let _rx = bridge.begin().unwrap();
        assert_eq!(bridge.begin().unwrap_err(), InputError::AlreadyPending);
        // The original request is still the pending one.
        assert!(bridge.is_awaiting());
    }

    #[tokio::test]
    async fn test_sequential_requests_resolve_independently() {
        let mut bridge = InputBridge::new();

        let rx1 = bridge.begin().unwrap();
        assert!(bridge.resolve("first".to_string()));
        assert_eq!(rx1.await.unwrap(), "first");

        let rx2 = bridge.begin().unwrap();
        assert!(bridge.resolve("second".to_string()));
        assert_eq!(rx2.await.unwrap(), "second");
    }

    #[tokio::test]
    async fn test_abort_wakes_receiver_with_error() {
        let mut bridge = InputBridge::new();
        let rx = bridge.begin().unwrap();
        assert!(bridge.abort());
        assert!(rx.await.is_err());

        // Idle again: abort reports nothing pending, begin works.
        assert!(!bridge.abort());
        assert!(bridge.begin().is_ok());
    }

    #[tokio::test]
    async fn test_resolve_after_receiver_dropped_is_harmless() {
        let mut bridge = InputBridge::new();
        let rx = bridge.begin().unwrap();
        drop(rx);
        assert!(bridge.resolve("late".to_string()));
        assert!(!bridge.is_awaiting());
    }
}
