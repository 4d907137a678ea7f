//! Inactivity backoff: stop asking an empty source for a while.

use std::time::{Duration, Instant};

use parking_lot::Mutex;
use sluice_types::PollResult;
use tracing::trace;

use crate::clock::{Clock, SystemClock};
use crate::source::PollSource;

/// Suppresses polls of the delegate for a fixed delay after it comes back empty.
///
/// Useful for sources that produce many items at once and then nothing for a
/// long time: the scheduler can poll often, and while the delegate is busy
/// every poll reaches it, but once it runs dry it is left alone until the
/// delay has passed.
///
/// The backoff is only re-armed by observing `Empty` from the delegate. A
/// delay of zero disables it.
///
/// # Example
///
/// ```rust
/// use std::time::Duration;
/// use sluice_sdk::{FnSource, InactivityBackoff, PollResult, PollSource};
///
/// let source = InactivityBackoff::new(
///     FnSource::new(|| PollResult::<()>::Empty),
///     Duration::from_secs(5),
/// );
///
/// assert!(source.poll().is_empty());
/// assert!(source.is_backing_off());
/// ```
#[derive(Debug)]
pub struct InactivityBackoff<S, C = SystemClock> {
    delegate: S,
    delay: Duration,
    clock: C,
    resume_at: Mutex<Option<Instant>>,
}

impl<S> InactivityBackoff<S> {
    /// Wrap `delegate`, backing off for `delay` after each empty poll.
    pub fn new(delegate: S, delay: Duration) -> Self {
        Self::with_clock(delegate, delay, SystemClock)
    }
}

impl<S, C: Clock> InactivityBackoff<S, C> {
    /// Like [`new`](InactivityBackoff::new), reading time from `clock`.
    pub fn with_clock(delegate: S, delay: Duration, clock: C) -> Self {
        Self {
            delegate,
            delay,
            clock,
            resume_at: Mutex::new(None),
        }
    }

    /// The configured delay.
    pub fn delay(&self) -> Duration {
        self.delay
    }

    /// When the delegate will next be polled, if a backoff is armed.
    pub fn resume_at(&self) -> Option<Instant> {
        *self.resume_at.lock()
    }

    /// True if a poll made now would not reach the delegate.
    pub fn is_backing_off(&self) -> bool {
        self.resume_at
            .lock()
            .is_some_and(|at| self.clock.now() < at)
    }

    /// Borrow the wrapped source.
    pub fn get_ref(&self) -> &S {
        &self.delegate
    }
}

impl<S, C> PollSource for InactivityBackoff<S, C>
where
    S: PollSource,
    C: Clock,
{
    type Item = S::Item;

    fn poll(&self) -> PollResult<S::Item> {
        // Held across the delegate call so concurrent pollers cannot both
        // slip through once the delay expires.
        let mut resume_at = self.resume_at.lock();
        if let Some(at) = *resume_at {
            if self.clock.now() < at {
                return PollResult::Empty;
            }
            *resume_at = None;
        }

        let result = self.delegate.poll();
        if result.is_empty() {
            let at = self.clock.now() + self.delay;
            trace!(delay = ?self.delay, "delegate empty, backing off");
            *resume_at = Some(at);
        }
        result
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::*;
    use crate::clock::ManualClock;
    use crate::source::testing::Scripted;

    fn backoff(
        script: Vec<Option<u32>>,
        delay: Duration,
    ) -> (InactivityBackoff<Arc<Scripted>, ManualClock>, Arc<Scripted>, ManualClock) {
        let inner = Arc::new(Scripted::new(script));
        let clock = ManualClock::new();
        let source = InactivityBackoff::with_clock(Arc::clone(&inner), delay, clock.clone());
        (source, inner, clock)
    }

    #[test]
    fn empty_arms_backoff_and_suppresses_delegate() {
        // delay 5s; delegate [Item, Empty, Item] polled at t=0,1,2
        let (source, inner, clock) = backoff(vec![Some(1), None, Some(2)], Duration::from_secs(5));

        assert_eq!(source.poll().into_payload(), Some(1));
        clock.advance(Duration::from_secs(1));
        assert!(source.poll().is_empty());
        clock.advance(Duration::from_secs(1));
        assert!(source.poll().is_empty());

        assert_eq!(inner.calls(), 2);
        assert!(source.is_backing_off());
    }

    #[test]
    fn resumes_at_the_end_of_the_delay() {
        let (source, inner, clock) = backoff(vec![None, Some(7)], Duration::from_secs(5));

        assert!(source.poll().is_empty());
        clock.advance(Duration::from_millis(4_999));
        assert!(source.poll().is_empty());
        assert_eq!(inner.calls(), 1);

        clock.advance(Duration::from_millis(1));
        assert_eq!(source.poll().into_payload(), Some(7));
        assert_eq!(inner.calls(), 2);
        assert_eq!(source.resume_at(), None);
    }

    #[test]
    fn empty_after_resume_rearms() {
        let (source, inner, clock) = backoff(vec![None, None, Some(3)], Duration::from_secs(2));

        assert!(source.poll().is_empty());
        clock.advance(Duration::from_secs(2));
        assert!(source.poll().is_empty());
        clock.advance(Duration::from_secs(1));
        assert!(source.poll().is_empty());
        assert_eq!(inner.calls(), 2);

        clock.advance(Duration::from_secs(1));
        assert_eq!(source.poll().into_payload(), Some(3));
    }

    #[test]
    fn items_pass_through_unchanged() {
        let (source, inner, _clock) = backoff(vec![Some(1), Some(2), Some(3)], Duration::from_secs(5));

        for n in 1..=3 {
            assert_eq!(source.poll(), PollResult::item(n, format!("item-{n}")));
        }
        assert_eq!(inner.calls(), 3);
        assert!(!source.is_backing_off());
    }

    #[test]
    fn zero_delay_never_suppresses() {
        let (source, inner, _clock) = backoff(vec![None, None, Some(1)], Duration::ZERO);

        assert!(source.poll().is_empty());
        assert!(source.poll().is_empty());
        assert_eq!(source.poll().into_payload(), Some(1));
        assert_eq!(inner.calls(), 3);
    }

    #[test]
    fn concurrent_pollers_reach_delegate_once_per_window() {
        let (source, inner, _clock) = backoff(vec![], Duration::from_secs(60));
        let source = Arc::new(source);

        let handles: Vec<_> = (0..8)
            .map(|_| {
                let source = Arc::clone(&source);
                std::thread::spawn(move || {
                    for _ in 0..100 {
                        assert!(source.poll().is_empty());
                    }
                })
            })
            .collect();
        for h in handles {
            h.join().unwrap();
        }

        assert_eq!(inner.calls(), 1);
    }
}
