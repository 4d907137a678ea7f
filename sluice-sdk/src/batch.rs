//! Batch boundary detection.
//!
//! A batch is a maximal run of consecutive polls that return items. For the
//! delegate sequence `empty, item, item, empty, item, empty` there are two
//! batches:
//!
//! ```text
//! before:  empty, (action) item, item, empty, (action) item, empty
//! after:   empty, item, item, (action) empty, item, (action) empty
//! ```
//!
//! The end of a batch is only noticed when the delegate is polled again and
//! comes back empty, so the scheduler must keep polling after a batch for an
//! after-batch action to run.

use std::any::Any;
use std::panic::{self, AssertUnwindSafe};
use std::sync::Arc;
use std::thread;

use parking_lot::Mutex;
use sluice_types::PollResult;
use tracing::{debug, warn};

use crate::source::PollSource;

type Action = Arc<dyn Fn() + Send + Sync>;

/// Which edge of a batch triggers the action.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BatchEdge {
    /// Before the first item of a batch is returned.
    Before,
    /// At the first empty poll following a batch, before `Empty` is returned.
    After,
}

/// How the boundary action is run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ExecutionMode {
    /// Inline, on the polling thread.
    #[default]
    Sync,
    /// Fire-and-forget on another thread; the poll does not wait for it.
    Detached,
}

/// Runs an action once per batch transition of the delegate.
///
/// The tracker is a two-state machine, idle and active, starting idle. Every
/// poll records whether the delegate returned an item; the action runs on
/// the idle-to-active edge ([`BatchEdge::Before`]) or on the active-to-idle
/// edge ([`BatchEdge::After`]). A first-ever `Empty` is not the end of a
/// batch and triggers nothing.
///
/// Panics raised by the action are caught and logged, in both execution
/// modes. They never reach the poller and never undo the state transition.
///
/// A [`Sync`](ExecutionMode::Sync) action runs while the tracker's lock is
/// held, so concurrent pollers wait for it. It must not poll the same
/// tracker, which would deadlock.
///
/// Build one with [`BatchAction`] or the [`PollSourceExt`](crate::PollSourceExt)
/// combinators.
pub struct BatchBoundary<S> {
    delegate: S,
    edge: BatchEdge,
    mode: ExecutionMode,
    action: Option<Action>,
    last_was_empty: Mutex<bool>,
}

impl<S> BatchBoundary<S> {
    /// The edge this tracker fires on.
    pub fn edge(&self) -> BatchEdge {
        self.edge
    }

    /// The execution mode for the action.
    pub fn mode(&self) -> ExecutionMode {
        self.mode
    }

    /// True while inside a batch (the last poll returned an item).
    pub fn in_batch(&self) -> bool {
        !*self.last_was_empty.lock()
    }

    /// Borrow the wrapped source.
    pub fn get_ref(&self) -> &S {
        &self.delegate
    }

    fn fire(&self) {
        let Some(action) = &self.action else {
            return;
        };
        debug!(edge = ?self.edge, mode = ?self.mode, "batch boundary");
        match self.mode {
            ExecutionMode::Sync => run_guarded(action, self.edge),
            ExecutionMode::Detached => spawn_detached(Arc::clone(action), self.edge),
        }
    }
}

impl<S: PollSource> PollSource for BatchBoundary<S> {
    type Item = S::Item;

    fn poll(&self) -> PollResult<S::Item> {
        let mut last_was_empty = self.last_was_empty.lock();
        let result = self.delegate.poll();
        let boundary = match self.edge {
            BatchEdge::Before => result.is_item() && *last_was_empty,
            BatchEdge::After => result.is_empty() && !*last_was_empty,
        };
        *last_was_empty = result.is_empty();

        // Still under the lock: a concurrent poll cannot overtake a sync
        // action and return a later item of the same batch first.
        if boundary {
            self.fire();
        }
        result
    }
}

impl<S: std::fmt::Debug> std::fmt::Debug for BatchBoundary<S> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BatchBoundary")
            .field("delegate", &self.delegate)
            .field("edge", &self.edge)
            .field("mode", &self.mode)
            .field("has_action", &self.action.is_some())
            .field("in_batch", &self.in_batch())
            .finish()
    }
}

/// Builder for batch boundary trackers.
///
/// # Example
///
/// ```rust
/// use std::sync::atomic::{AtomicUsize, Ordering};
/// use std::sync::Arc;
/// use sluice_sdk::{BatchAction, ExecutionMode, FnSource, PollResult, PollSource};
///
/// let batches = Arc::new(AtomicUsize::new(0));
/// let counter = Arc::clone(&batches);
///
/// let source = BatchAction::of(FnSource::new(|| PollResult::item(1, "one")))
///     .action(move || {
///         counter.fetch_add(1, Ordering::SeqCst);
///     })
///     .mode(ExecutionMode::Sync)
///     .before();
///
/// source.poll();
/// source.poll();
/// assert_eq!(batches.load(Ordering::SeqCst), 1);
/// ```
pub struct BatchAction<S> {
    delegate: S,
    action: Option<Action>,
    mode: ExecutionMode,
}

impl<S> BatchAction<S> {
    /// Start building a tracker around `delegate`.
    pub fn of(delegate: S) -> Self {
        Self {
            delegate,
            action: None,
            mode: ExecutionMode::default(),
        }
    }

    /// Set the action. Without one the tracker only passes polls through.
    pub fn action<F>(mut self, action: F) -> Self
    where
        F: Fn() + Send + Sync + 'static,
    {
        self.action = Some(Arc::new(action));
        self
    }

    /// Set the execution mode. Defaults to [`ExecutionMode::Sync`].
    pub fn mode(mut self, mode: ExecutionMode) -> Self {
        self.mode = mode;
        self
    }

    /// Shorthand for `mode(ExecutionMode::Detached)` when `detached` is true.
    pub fn detached(self, detached: bool) -> Self {
        self.mode(if detached {
            ExecutionMode::Detached
        } else {
            ExecutionMode::Sync
        })
    }

    /// Fire before the first item of each batch.
    pub fn before(self) -> BatchBoundary<S> {
        self.build(BatchEdge::Before)
    }

    /// Fire at the first empty poll after each batch.
    pub fn after(self) -> BatchBoundary<S> {
        self.build(BatchEdge::After)
    }

    fn build(self, edge: BatchEdge) -> BatchBoundary<S> {
        BatchBoundary {
            delegate: self.delegate,
            edge,
            mode: self.mode,
            action: self.action,
            last_was_empty: Mutex::new(true),
        }
    }
}

fn run_guarded(action: &Action, edge: BatchEdge) {
    if let Err(panic) = panic::catch_unwind(AssertUnwindSafe(|| action())) {
        warn!(
            edge = ?edge,
            "batch action panicked: {}",
            panic_message(&*panic)
        );
    }
}

fn spawn_detached(action: Action, edge: BatchEdge) {
    #[cfg(feature = "tokio")]
    if let Ok(handle) = tokio::runtime::Handle::try_current() {
        // Unsupervised: the join handle is dropped on purpose.
        drop(handle.spawn_blocking(move || run_guarded(&action, edge)));
        return;
    }

    let spawned = thread::Builder::new()
        .name("sluice-batch-action".to_string())
        .spawn(move || run_guarded(&action, edge));
    if let Err(e) = spawned {
        warn!(edge = ?edge, "unable to start batch action thread: {}", e);
    }
}

fn panic_message(panic: &(dyn Any + Send)) -> &str {
    if let Some(s) = panic.downcast_ref::<&str>() {
        s
    } else if let Some(s) = panic.downcast_ref::<String>() {
        s.as_str()
    } else {
        "non-string panic payload"
    }
}
