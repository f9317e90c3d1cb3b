//! The cancellable operation base.
//!
//! An owner creates an operation, optionally installs a completion block,
//! and calls [`start`]. The operation runs [`Operation::main`] on a tokio
//! worker task and eventually either reports an outcome through
//! [`OperationCore::finish`] or is cancelled. Both paths go through the same
//! lock, so when cancellation races with completion exactly one of them wins:
//! either the completion block fires with the outcome, or the operation is
//! observably cancelled and nothing is recorded.

use std::sync::Arc;

use async_trait::async_trait;
use parking_lot::Mutex;
use tokio::sync::watch;
use tokio_util::sync::CancellationToken;

use up_core::{ClassifiedError, OperationId, StageKind, StageOutcome};

use crate::state::OperationState;

/// Invoked once, with the outcome, when an operation transitions into
/// `Finished`. Never invoked on cancellation.
pub type CompletionBlock<T> = Box<dyn FnOnce(&StageOutcome<T>) + Send>;

struct Inner<T> {
    state: OperationState,
    result: Option<Result<T, ClassifiedError>>,
    completion: Option<CompletionBlock<T>>,
}

/// Lifecycle state, cancellation flag, recorded outcome, and completion
/// signal of one operation.
///
/// The owner controls the start; the operation controls its own terminal
/// transition through [`finish`](Self::finish). State and outcome are written
/// together, so nobody can observe `Finished` without the outcome.
pub struct OperationCore<T> {
    id: OperationId,
    kind: StageKind,
    inner: Mutex<Inner<T>>,
    cancellation: CancellationToken,
    state_tx: watch::Sender<OperationState>,
}

impl<T: Clone + Send + 'static> OperationCore<T> {
    pub fn new(kind: StageKind) -> Self {
        let (state_tx, _) = watch::channel(OperationState::Pending);
        Self {
            id: OperationId::new(),
            kind,
            inner: Mutex::new(Inner {
                state: OperationState::Pending,
                result: None,
                completion: None,
            }),
            cancellation: CancellationToken::new(),
            state_tx,
        }
    }

    pub fn id(&self) -> OperationId {
        self.id
    }

    pub fn kind(&self) -> StageKind {
        self.kind
    }

    pub fn state(&self) -> OperationState {
        self.inner.lock().state
    }

    /// Cancellation checkpoint.
    pub fn is_cancelled(&self) -> bool {
        self.state() == OperationState::Cancelled
    }

    /// Token that fires when the operation is cancelled. Work spawned by the
    /// operation selects on it (or a child of it) to stop promptly.
    pub fn cancellation(&self) -> &CancellationToken {
        &self.cancellation
    }

    /// Install the completion block. Returns `false` (and drops the block)
    /// once the operation is terminal.
    pub fn set_completion_block(
        &self,
        block: impl FnOnce(&StageOutcome<T>) + Send + 'static,
    ) -> bool {
        let mut inner = self.inner.lock();
        if inner.state.is_terminal() {
            return false;
        }
        inner.completion = Some(Box::new(block));
        true
    }

    /// `Pending -> Executing`. Returns `false` from any other state.
    fn begin(&self) -> bool {
        let mut inner = self.inner.lock();
        if !inner.state.can_transition_to(OperationState::Executing) {
            return false;
        }
        inner.state = OperationState::Executing;
        drop(inner);

        self.state_tx.send_replace(OperationState::Executing);
        tracing::debug!(operation_id = %self.id.short(), stage = %self.kind, "Operation executing");
        true
    }

    /// Request cooperative cancellation.
    ///
    /// Moves a pending or executing operation to `Cancelled`, drops its
    /// completion block, and fires the cancellation token. A no-op returning
    /// `false` once the operation is terminal. Work already in flight is not
    /// killed here; concrete operations cancel their own underlying work.
    pub fn cancel(&self) -> bool {
        let mut inner = self.inner.lock();
        if inner.state.is_terminal() {
            return false;
        }
        let from = inner.state;
        inner.state = OperationState::Cancelled;
        let dropped = inner.completion.take();
        drop(inner);

        self.cancellation.cancel();
        self.state_tx.send_replace(OperationState::Cancelled);
        drop(dropped);

        tracing::info!(operation_id = %self.id.short(), stage = %self.kind, from = %from, "Operation cancelled");
        true
    }

    /// Record the outcome and transition `Executing -> Finished`, then fire
    /// the completion block and wake [`wait`](Self::wait)ers.
    ///
    /// Returns `false` and discards `result` when the operation is not
    /// executing, which is what happens when cancellation won the race.
    pub fn finish(&self, result: Result<T, ClassifiedError>) -> bool {
        let mut inner = self.inner.lock();
        if !inner.state.can_transition_to(OperationState::Finished) {
            tracing::debug!(
                operation_id = %self.id.short(),
                stage = %self.kind,
                state = %inner.state,
                "Discarding outcome; operation is not executing"
            );
            return false;
        }
        inner.state = OperationState::Finished;
        inner.result = Some(result);
        let completion = inner.completion.take();
        let outcome = completion
            .as_ref()
            .and(inner.result.clone())
            .map(StageOutcome::from);
        drop(inner);

        tracing::debug!(operation_id = %self.id.short(), stage = %self.kind, "Operation finished");
        if let (Some(block), Some(outcome)) = (completion, outcome) {
            block(&outcome);
        }
        // Waiters wake after the completion block has run.
        self.state_tx.send_replace(OperationState::Finished);
        true
    }

    /// The outcome, once terminal.
    pub fn outcome(&self) -> Option<StageOutcome<T>> {
        let inner = self.inner.lock();
        match inner.state {
            OperationState::Finished => inner.result.clone().map(StageOutcome::from),
            OperationState::Cancelled => Some(StageOutcome::Cancelled),
            _ => None,
        }
    }

    /// The output, set only when finished successfully.
    pub fn output(&self) -> Option<T> {
        self.outcome().and_then(|o| o.output().cloned())
    }

    /// The classified error, set only when finished with a failure.
    pub fn error(&self) -> Option<ClassifiedError> {
        self.outcome().and_then(|o| o.error().cloned())
    }

    /// Wait until the operation is terminal and return its outcome.
    pub async fn wait(&self) -> StageOutcome<T> {
        let mut rx = self.state_tx.subscribe();
        // The sender lives in `self`, so this only returns once terminal.
        let _ = rx.wait_for(|state| state.is_terminal()).await;
        self.outcome().unwrap_or(StageOutcome::Cancelled)
    }
}

/// A unit of work with a lifecycle, built around an [`OperationCore`].
#[async_trait]
pub trait Operation: Send + Sync + 'static {
    type Output: Clone + Send + Sync + 'static;

    fn core(&self) -> &OperationCore<Self::Output>;

    /// The work entry point, run once on a tokio worker task after
    /// [`start`]. Implementations check [`OperationCore::is_cancelled`] at
    /// their checkpoints and report through [`OperationCore::finish`].
    async fn main(&self);

    /// Request cancellation. Implementations that own asynchronous work
    /// override this to cancel it as well, and must call the core's cancel.
    fn cancel(&self) {
        self.core().cancel();
    }
}

/// Start `op`: `Pending -> Executing`, then run [`Operation::main`] on a new
/// tokio task. Returns immediately.
///
/// Starting an operation that is not pending is a no-op that returns `false`
/// and logs a warning; this includes an operation cancelled before start.
/// Must be called from within a tokio runtime.
pub fn start<O>(op: &Arc<O>) -> bool
where
    O: Operation + ?Sized,
{
    let core = op.core();
    if !core.begin() {
        tracing::warn!(
            operation_id = %core.id().short(),
            stage = %core.kind(),
            state = %core.state(),
            "start() ignored; operation is not pending"
        );
        return false;
    }

    let op = Arc::clone(op);
    tokio::spawn(async move {
        op.main().await;
    });
    true
}
