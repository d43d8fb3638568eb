//! Virtual-time scheduler
//!
//! Callbacks only run when the owner advances the clock, in deadline order
//! (ties run in scheduling order). Used by the test suite and by the CLI's
//! instant mode, where a whole round is replayed without sleeping.

use std::cell::RefCell;
use std::collections::BTreeMap;
use std::rc::Rc;
use std::time::Duration;

use super::{Callback, Clock, Scheduler, TimeoutId};

#[derive(Default)]
struct State {
    now: Duration,
    next_id: u64,
    /// Keyed by (deadline, id) so iteration order is firing order
    pending: BTreeMap<(Duration, u64), Callback>,
}

/// Deterministic scheduler and clock driven by [`advance`](Self::advance).
///
/// Cloning shares the same virtual timeline.
#[derive(Clone, Default)]
pub struct ManualScheduler {
    state: Rc<RefCell<State>>,
}

impl ManualScheduler {
    pub fn new() -> Self {
        Self::default()
    }

    /// Advance virtual time by `by`, running every callback that comes due.
    ///
    /// Callbacks scheduled while advancing run in the same call if their
    /// deadline falls inside the window.
    pub fn advance(&self, by: Duration) {
        let target = self.state.borrow().now.saturating_add(by);
        self.advance_to(target);
    }

    /// Advance by a number of milliseconds.
    pub fn advance_ms(&self, ms: u64) {
        self.advance(Duration::from_millis(ms));
    }

    /// Advance virtual time to `target`. Moving backwards is ignored.
    pub fn advance_to(&self, target: Duration) {
        loop {
            let next = {
                let mut state = self.state.borrow_mut();
                let due = state
                    .pending
                    .first_key_value()
                    .map(|(&key, _)| key)
                    .filter(|&(deadline, _)| deadline <= target);
                match due {
                    Some(key) => {
                        state.now = state.now.max(key.0);
                        state.pending.remove(&key)
                    }
                    None => None,
                }
            };

            match next {
                // No borrow held while the callback runs: it may schedule or cancel.
                Some(callback) => callback(),
                None => break,
            }
        }

        let mut state = self.state.borrow_mut();
        state.now = state.now.max(target);
    }

    /// Run everything currently scheduled, jumping time forward as needed.
    ///
    /// Stops after `max_steps` deadlines to bound self-rescheduling loops.
    /// Returns the number of deadlines reached.
    pub fn run_until_idle(&self, max_steps: usize) -> usize {
        let mut steps = 0;
        while steps < max_steps {
            let deadline = match self.next_deadline() {
                Some(deadline) => deadline,
                None => break,
            };
            self.advance_to(deadline);
            steps += 1;
        }
        steps
    }

    /// Deadline of the earliest pending callback.
    pub fn next_deadline(&self) -> Option<Duration> {
        self.state
            .borrow()
            .pending
            .first_key_value()
            .map(|(&(deadline, _), _)| deadline)
    }

    /// Number of callbacks waiting to run.
    pub fn pending_count(&self) -> usize {
        self.state.borrow().pending.len()
    }

    /// Current virtual time.
    pub fn elapsed(&self) -> Duration {
        self.state.borrow().now
    }
}

impl Scheduler for ManualScheduler {
    fn set_timeout(&self, delay: Duration, callback: Callback) -> TimeoutId {
        let mut state = self.state.borrow_mut();
        let id = state.next_id;
        state.next_id += 1;
        // Far-future delays park at the end of the timeline.
        let deadline = state.now.saturating_add(delay);
        state.pending.insert((deadline, id), callback);
        TimeoutId(id)
    }

    fn clear_timeout(&self, id: TimeoutId) {
        self.state
            .borrow_mut()
            .pending
            .retain(|&(_, pending_id), _| pending_id != id.0);
    }
}

impl Clock for ManualScheduler {
    fn now(&self) -> Duration {
        self.state.borrow().now
    }
}

impl std::fmt::Debug for ManualScheduler {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let state = self.state.borrow();
        f.debug_struct("ManualScheduler")
            .field("now", &state.now)
            .field("pending", &state.pending.len())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::Cell;

    #[test]
    fn test_callbacks_fire_in_deadline_order() {
        let scheduler = ManualScheduler::new();
        let order = Rc::new(RefCell::new(Vec::new()));

        for (label, ms) in [("late", 300), ("early", 100), ("tie_a", 200), ("tie_b", 200)] {
            let order = order.clone();
            scheduler.set_timeout(
                Duration::from_millis(ms),
                Box::new(move || order.borrow_mut().push(label)),
            );
        }

        scheduler.advance_ms(250);
        assert_eq!(*order.borrow(), vec!["early", "tie_a", "tie_b"]);
        assert_eq!(scheduler.elapsed(), Duration::from_millis(250));

        scheduler.advance_ms(50);
        assert_eq!(order.borrow().len(), 4);
    }

    #[test]
    fn test_unbounded_delay_after_time_moved() {
        let scheduler = ManualScheduler::new();
        scheduler.advance_ms(500);
        let fired = Rc::new(Cell::new(false));
        let flag = fired.clone();
        scheduler.set_timeout(Duration::MAX, Box::new(move || flag.set(true)));

        assert_eq!(scheduler.next_deadline(), Some(Duration::MAX));
        scheduler.advance(Duration::MAX);
        assert!(fired.get());
        assert_eq!(scheduler.elapsed(), Duration::MAX);
    }

    #[test]
    fn test_clear_timeout_is_idempotent() {
        let scheduler = ManualScheduler::new();
        let fired = Rc::new(Cell::new(false));
        let flag = fired.clone();
        let id = scheduler.set_timeout(Duration::from_millis(10), Box::new(move || flag.set(true)));

        scheduler.clear_timeout(id);
        scheduler.clear_timeout(id);
        scheduler.advance_ms(100);

        assert!(!fired.get());
        assert_eq!(scheduler.pending_count(), 0);
    }

    #[test]
    fn test_rescheduling_inside_window_runs_in_same_advance() {
        let scheduler = ManualScheduler::new();
        let count = Rc::new(Cell::new(0));

        fn tick(scheduler: ManualScheduler, count: Rc<Cell<u32>>) {
            count.set(count.get() + 1);
            if count.get() < 3 {
                let next = scheduler.clone();
                scheduler.set_timeout(
                    Duration::from_millis(100),
                    Box::new(move || tick(next, count)),
                );
            }
        }

        let s = scheduler.clone();
        let c = count.clone();
        scheduler.set_timeout(Duration::from_millis(100), Box::new(move || tick(s, c)));

        scheduler.advance_ms(1000);
        assert_eq!(count.get(), 3);
        assert_eq!(scheduler.now(), Duration::from_millis(1000));
    }

    #[test]
    fn test_run_until_idle_jumps_time() {
        let scheduler = ManualScheduler::new();
        let fired = Rc::new(Cell::new(false));
        let flag = fired.clone();
        scheduler.set_timeout(Duration::from_secs(5), Box::new(move || flag.set(true)));

        assert_eq!(scheduler.run_until_idle(10), 1);
        assert!(fired.get());
        assert_eq!(scheduler.now(), Duration::from_secs(5));
    }
}
