//! The polling capability shared by every source and decorator.

use std::marker::PhantomData;
use std::sync::Arc;
use std::time::Duration;

use sluice_types::PollResult;

use crate::backoff::InactivityBackoff;
use crate::batch::{BatchAction, BatchBoundary, ExecutionMode};
use crate::gate::Gate;

/// A pull-based message source.
///
/// An external scheduler calls [`poll`](PollSource::poll) at its own cadence.
/// Each call answers immediately with one item or [`PollResult::Empty`]; it
/// never sleeps or waits for data.
///
/// `poll` takes `&self`: implementations that keep state guard it
/// themselves, so one instance can be polled from several threads and the
/// calls behave as if they ran one after another.
///
/// # Example
///
/// ```
/// use sluice_sdk::{FnSource, PollSource, PollResult};
///
/// let source = FnSource::new(|| PollResult::item("hello", "greeting"));
/// assert_eq!(source.poll().into_payload(), Some("hello"));
/// ```
pub trait PollSource: Send + Sync {
    /// The payload type produced by this source.
    type Item;

    /// Return the next item, or `Empty` if none is available now.
    fn poll(&self) -> PollResult<Self::Item>;
}

/// A type-erased source.
pub type BoxedSource<T> = Box<dyn PollSource<Item = T>>;

impl<S: PollSource + ?Sized> PollSource for Arc<S> {
    type Item = S::Item;

    fn poll(&self) -> PollResult<Self::Item> {
        (**self).poll()
    }
}

impl<S: PollSource + ?Sized> PollSource for Box<S> {
    type Item = S::Item;

    fn poll(&self) -> PollResult<Self::Item> {
        (**self).poll()
    }
}

impl<S: PollSource + ?Sized> PollSource for &S {
    type Item = S::Item;

    fn poll(&self) -> PollResult<Self::Item> {
        (**self).poll()
    }
}

/// A source backed by a closure.
pub struct FnSource<F, T> {
    f: F,
    _item: PhantomData<fn() -> T>,
}

impl<F, T> FnSource<F, T>
where
    F: Fn() -> PollResult<T> + Send + Sync,
{
    /// Wrap a closure as a source.
    pub fn new(f: F) -> Self {
        Self {
            f,
            _item: PhantomData,
        }
    }
}

impl<F, T> PollSource for FnSource<F, T>
where
    F: Fn() -> PollResult<T> + Send + Sync,
{
    type Item = T;

    fn poll(&self) -> PollResult<T> {
        (self.f)()
    }
}

impl<F, T> std::fmt::Debug for FnSource<F, T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FnSource").finish_non_exhaustive()
    }
}

/// Combinators for wrapping any source in decorators.
///
/// Each call wraps the receiver, so the last combinator applied is the
/// outermost decorator and sees every poll first.
///
/// ```
/// use std::time::Duration;
/// use sluice_sdk::{ExecutionMode, FnSource, PollResult, PollSource, PollSourceExt};
///
/// let pipeline = FnSource::new(|| PollResult::<u32>::Empty)
///     .after_batch(|| println!("batch done"), ExecutionMode::Sync)
///     .inactivity_backoff(Duration::from_secs(5))
///     .gate(|| true)
///     .boxed();
///
/// assert!(pipeline.poll().is_empty());
/// ```
pub trait PollSourceExt: PollSource + Sized {
    /// Suppress polls for `delay` after an empty result.
    fn inactivity_backoff(self, delay: Duration) -> InactivityBackoff<Self> {
        InactivityBackoff::new(self, delay)
    }

    /// Only poll while `predicate` returns true.
    fn gate<P>(self, predicate: P) -> Gate<Self>
    where
        P: Fn() -> bool + Send + Sync + 'static,
    {
        Gate::new(self).when(predicate)
    }

    /// Run `action` before the first item of every batch.
    fn before_batch<A>(self, action: A, mode: ExecutionMode) -> BatchBoundary<Self>
    where
        A: Fn() + Send + Sync + 'static,
    {
        BatchAction::of(self).action(action).mode(mode).before()
    }

    /// Run `action` at the first empty poll after every batch.
    fn after_batch<A>(self, action: A, mode: ExecutionMode) -> BatchBoundary<Self>
    where
        A: Fn() + Send + Sync + 'static,
    {
        BatchAction::of(self).action(action).mode(mode).after()
    }

    /// Erase the concrete decorator type.
    fn boxed(self) -> BoxedSource<Self::Item>
    where
        Self: 'static,
    {
        Box::new(self)
    }
}

impl<S: PollSource> PollSourceExt for S {}
