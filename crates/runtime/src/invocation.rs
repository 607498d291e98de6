//! Per-run context threaded through every nesting level.

use crate::session::RunEvent;
use crate::tools::ToolError;
use crate::usage::{UsageSnapshot, UsageTracker};
use crate::{Error, Result};
use std::sync::{Arc, OnceLock};
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::warn;

/// State owned by one top-level run and shared by all its descendants.
struct RunScope {
    tracker: Arc<UsageTracker>,
    cancel: CancellationToken,
    /// First fatal error raised anywhere in the tree.
    abort: OnceLock<Error>,
    events: Option<mpsc::Sender<RunEvent>>,
}

/// One execution of an agent: depth plus the run-wide shared state.
///
/// Cloning shares the scope; [`child`](Self::child) is the only way to go
/// one level deeper.
#[derive(Clone)]
pub struct Invocation {
    scope: Arc<RunScope>,
    depth: u32,
}

impl Invocation {
    /// A fresh top-level invocation with its own tracker and cancellation signal.
    pub fn root(token_budget: Option<u64>) -> Self {
        Self::new(token_budget, None)
    }

    pub(crate) fn with_events(token_budget: Option<u64>, events: mpsc::Sender<RunEvent>) -> Self {
        Self::new(token_budget, Some(events))
    }

    fn new(token_budget: Option<u64>, events: Option<mpsc::Sender<RunEvent>>) -> Self {
        Self {
            scope: Arc::new(RunScope {
                tracker: Arc::new(UsageTracker::new(token_budget)),
                cancel: CancellationToken::new(),
                abort: OnceLock::new(),
                events,
            }),
            depth: 0,
        }
    }

    pub fn depth(&self) -> u32 {
        self.depth
    }

    /// The next level down, sharing tracker and cancellation signal.
    pub fn child(&self, max_depth: u32) -> std::result::Result<Self, ToolError> {
        let depth = self.depth + 1;
        if depth > max_depth {
            return Err(ToolError::DepthExceeded {
                depth,
                max: max_depth,
            });
        }
        Ok(Self {
            scope: Arc::clone(&self.scope),
            depth,
        })
    }

    pub fn usage(&self) -> UsageSnapshot {
        self.scope.tracker.snapshot()
    }

    pub fn tracker(&self) -> &Arc<UsageTracker> {
        &self.scope.tracker
    }

    pub fn cancellation(&self) -> &CancellationToken {
        &self.scope.cancel
    }

    pub fn cancel(&self) {
        self.scope.cancel.cancel();
    }

    pub fn is_cancelled(&self) -> bool {
        self.scope.cancel.is_cancelled()
    }

    /// The fatal error that ended the run, if any.
    pub fn abort_cause(&self) -> Option<&Error> {
        self.scope.abort.get()
    }

    /// Fail if the run was aborted or cancelled.
    pub fn check(&self) -> Result<()> {
        if let Some(cause) = self.scope.abort.get() {
            return Err(cause.clone());
        }
        if self.is_cancelled() {
            return Err(Error::Cancelled);
        }
        Ok(())
    }

    /// End the whole tree. The first cause wins.
    pub fn abort(&self, cause: Error) {
        if self.scope.abort.set(cause.clone()).is_ok() {
            warn!(depth = self.depth, kind = cause.kind(), error = %cause, "aborting run");
        }
        self.scope.cancel.cancel();
    }

    /// Record consumption, aborting the run if it crosses the budget.
    pub fn record(&self, tokens_in: u64, tokens_out: u64, tool_calls: u64) -> Result<UsageSnapshot> {
        self.scope
            .tracker
            .increment(tokens_in, tokens_out, tool_calls)
            .inspect_err(|e| self.abort(e.clone()))
    }

    /// Send a progress event. Only the top level produces events.
    ///
    /// Once the run is cancelled, an event that would wait for buffer space
    /// is dropped so the run can wind down without a reader.
    pub(crate) async fn emit(&self, event: RunEvent) {
        if self.depth != 0 {
            return;
        }
        if let Some(events) = &self.scope.events {
            tokio::select! {
                biased;
                // A dropped consumer does not stop the run.
                _ = events.send(event) => {}
                _ = self.scope.cancel.cancelled() => {}
            }
        }
    }
}

impl std::fmt::Debug for Invocation {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Invocation")
            .field("depth", &self.depth)
            .field("usage", &self.usage())
            .field("cancelled", &self.is_cancelled())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn child_increments_depth_and_shares_scope() {
        let root = Invocation::root(None);
        let child = root.child(3).unwrap();
        let grandchild = child.child(3).unwrap();
        assert_eq!(grandchild.depth(), 2);

        grandchild.record(10, 5, 1).unwrap();
        assert_eq!(root.usage().tokens_in, 10);
        assert!(Arc::ptr_eq(root.tracker(), grandchild.tracker()));

        root.cancel();
        assert!(grandchild.is_cancelled());
    }

    #[test]
    fn child_past_max_depth_fails() {
        let root = Invocation::root(None);
        let child = root.child(1).unwrap();
        assert_eq!(
            child.child(1).err(),
            Some(ToolError::DepthExceeded { depth: 2, max: 1 })
        );
    }

    #[test]
    fn budget_crossing_aborts_whole_tree() {
        let root = Invocation::root(Some(10));
        let child = root.child(3).unwrap();

        let err = child.record(8, 4, 0).unwrap_err();
        assert_eq!(err, Error::BudgetExceeded { used: 12, budget: 10 });
        assert_eq!(root.check(), Err(err));
        assert!(root.is_cancelled());
    }

    #[test]
    fn first_abort_cause_wins() {
        let root = Invocation::root(None);
        root.abort(Error::RoundLimitExceeded { max_rounds: 2 });
        root.abort(Error::Cancelled);
        assert_eq!(
            root.abort_cause(),
            Some(&Error::RoundLimitExceeded { max_rounds: 2 })
        );
    }

    #[tokio::test]
    async fn cancelled_emit_does_not_wait_for_reader() {
        let (tx, mut rx) = mpsc::channel(1);
        let root = Invocation::with_events(None, tx);
        let text = |t: &str| RunEvent::TextDelta { text: t.into() };

        root.emit(text("buffered")).await;
        root.cancel();
        tokio::time::timeout(std::time::Duration::from_secs(1), root.emit(text("dropped")))
            .await
            .unwrap();

        assert_eq!(rx.recv().await, Some(text("buffered")));
        assert!(rx.try_recv().is_err());
    }

    #[tokio::test]
    async fn nested_invocations_do_not_emit() {
        let (tx, mut rx) = mpsc::channel(4);
        let root = Invocation::with_events(None, tx);
        let child = root.child(2).unwrap();
        child.emit(RunEvent::TextDelta { text: "inner".into() }).await;
        assert!(rx.try_recv().is_err());
    }

    #[test]
    fn plain_cancel_checks_as_cancelled() {
        let root = Invocation::root(None);
        assert!(root.check().is_ok());
        root.cancel();
        assert_eq!(root.check(), Err(Error::Cancelled));
    }
}
