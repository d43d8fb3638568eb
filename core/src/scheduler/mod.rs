//! Scheduling strategy
//!
//! Every delayed action in tempo goes through a [`Scheduler`] so that timing can
//! be virtualized in tests and swapped per host:
//! - [`ManualScheduler`]: virtual time, advanced explicitly (tests, instant replay)
//! - [`TokioScheduler`]: real time on a tokio `LocalSet`
//!
//! A [`Clock`] supplies "now" as a relative timestamp. Deadlines are always
//! computed relative to `now()` at schedule time.

mod manual;
mod tokio_scheduler;

use std::time::{Duration, Instant};

pub use manual::ManualScheduler;
pub use tokio_scheduler::TokioScheduler;

/// Callback run by a scheduler when its timeout elapses.
pub type Callback = Box<dyn FnOnce()>;

/// Handle to a scheduled callback.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct TimeoutId(pub u64);

/// `setTimeout`/`clearTimeout` strategy.
pub trait Scheduler {
    /// Run `callback` once after `delay`.
    fn set_timeout(&self, delay: Duration, callback: Callback) -> TimeoutId;

    /// Cancel a scheduled callback. Unknown or already-fired ids are ignored.
    fn clear_timeout(&self, id: TimeoutId);
}

/// Monotonic timestamp source. Must never fail.
pub trait Clock {
    fn now(&self) -> Duration;
}

/// Clock backed by `std::time::Instant`, measured from construction.
#[derive(Debug, Clone, Copy)]
pub struct SystemClock {
    origin: Instant,
}

impl SystemClock {
    pub fn new() -> Self {
        Self {
            origin: Instant::now(),
        }
    }
}

impl Default for SystemClock {
    fn default() -> Self {
        Self::new()
    }
}

impl Clock for SystemClock {
    fn now(&self) -> Duration {
        self.origin.elapsed()
    }
}

/// Owned timeout slot: cancels whatever it holds when replaced or cleared.
///
/// Used by components that keep at most one pending callback per purpose.
#[derive(Debug, Default)]
pub(crate) struct TimeoutSlot(Option<TimeoutId>);

impl TimeoutSlot {
    pub(crate) fn set(&mut self, scheduler: &dyn Scheduler, id: TimeoutId) {
        self.cancel(scheduler);
        self.0 = Some(id);
    }

    pub(crate) fn cancel(&mut self, scheduler: &dyn Scheduler) {
        if let Some(id) = self.0.take() {
            scheduler.clear_timeout(id);
        }
    }

    /// Forget the handle without cancelling (the callback already fired).
    pub(crate) fn forget(&mut self) {
        self.0 = None;
    }

    pub(crate) fn is_set(&self) -> bool {
        self.0.is_some()
    }
}
