//! On/off gating of a source.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use sluice_types::PollResult;

use crate::source::PollSource;

type Predicate = Arc<dyn Fn() -> bool + Send + Sync>;

/// Forwards polls to the delegate only while a predicate holds.
///
/// The predicate is evaluated on every poll. With no predicate the gate is
/// always open.
///
/// A closed gate does not touch the delegate at all, so anything the
/// delegate tracks per poll stays frozen while the gate is closed. Wrapping
/// an [`InactivityBackoff`](crate::InactivityBackoff) in a gate therefore
/// pauses its timer check; wrapping a gate in a backoff makes the closed
/// gate's `Empty` arm the backoff.
///
/// # Example
///
/// ```rust
/// use sluice_sdk::{FnSource, Gate, GateSwitch, PollResult, PollSource};
///
/// let switch = GateSwitch::new(false);
/// let source = Gate::switched(FnSource::new(|| PollResult::item(1, "one")), &switch);
///
/// assert!(source.poll().is_empty());
/// switch.turn_on();
/// assert!(source.poll().is_item());
/// ```
pub struct Gate<S> {
    delegate: S,
    predicate: Option<Predicate>,
}

impl<S> Gate<S> {
    /// Wrap `delegate` with an always-open gate.
    pub fn new(delegate: S) -> Self {
        Self {
            delegate,
            predicate: None,
        }
    }

    /// Wrap `delegate`, open only while `switch` is on.
    pub fn switched(delegate: S, switch: &GateSwitch) -> Self {
        let switch = switch.clone();
        Self::new(delegate).when(move || switch.is_on())
    }

    /// Replace the predicate.
    pub fn when<P>(mut self, predicate: P) -> Self
    where
        P: Fn() -> bool + Send + Sync + 'static,
    {
        self.predicate = Some(Arc::new(predicate));
        self
    }

    /// Evaluate the predicate now.
    pub fn is_open(&self) -> bool {
        self.predicate.as_ref().is_none_or(|p| p())
    }

    /// Borrow the wrapped source.
    pub fn get_ref(&self) -> &S {
        &self.delegate
    }
}

impl<S: PollSource> PollSource for Gate<S> {
    type Item = S::Item;

    fn poll(&self) -> PollResult<S::Item> {
        if self.is_open() {
            self.delegate.poll()
        } else {
            PollResult::Empty
        }
    }
}

impl<S: std::fmt::Debug> std::fmt::Debug for Gate<S> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Gate")
            .field("delegate", &self.delegate)
            .field("conditional", &self.predicate.is_some())
            .finish()
    }
}

/// A shared on/off flag to drive a [`Gate`].
///
/// Clones share the same flag.
#[derive(Debug, Clone)]
pub struct GateSwitch {
    on: Arc<AtomicBool>,
}

impl GateSwitch {
    /// Create a switch in the given position.
    pub fn new(on: bool) -> Self {
        Self {
            on: Arc::new(AtomicBool::new(on)),
        }
    }

    pub fn turn_on(&self) {
        self.set(true);
    }

    pub fn turn_off(&self) {
        self.set(false);
    }

    pub fn set(&self, on: bool) {
        self.on.store(on, Ordering::SeqCst);
    }

    pub fn is_on(&self) -> bool {
        self.on.load(Ordering::SeqCst)
    }
}

impl Default for GateSwitch {
    fn default() -> Self {
        Self::new(true)
    }
}
