//! Countdown timer
//!
//! A `CountdownTimer` counts whole units down to zero, emitting `Tick` for each
//! value and `Expired` at the end. It is driven either by an external
//! [`TickSource`] or, when none is supplied, by the context scheduler.
//!
//! # Lifecycle
//!
//! ```text
//! Idle --start--> Running --pause--> Paused --resume--> Running --(0)--> Expired
//!   ^                                                                      |
//!   +------------------------------- stop() (silent) ----------------------+
//! ```
//!
//! Every run carries a generation number. Starting, stopping, pausing,
//! resuming and expiring all bump it, and every scheduled callback or
//! [`TickSink`] checks it first, so a callback from a superseded run can never
//! tick or expire the current one.
//!
//! A run that ends without expiring (`stop`, a superseding `start`, or drift
//! failure handed to `on_drift_fail`) notifies the [`CountdownTimer::on_stop`]
//! listeners instead. `stop` stays silent on the event channel.

use std::cell::RefCell;
use std::future::Future;
use std::rc::{Rc, Weak};
use std::time::Duration;

use tokio::sync::oneshot;

use crate::context::TimerSettings;
use crate::events::{HandlerResult, ListenerId, Listeners};
use crate::scheduler::{Scheduler, TimeoutSlot};

use super::{TickSource, TimerError, TimerEvent, TimerEventKind, TimerState};

/// Called instead of forcing expiration once drift retries are exhausted.
/// Receives the remaining value at the time of failure.
pub type DriftFailHandler = Box<dyn FnMut(u32)>;

/// Construction options for a [`CountdownTimer`].
pub struct TimerOptions {
    pub tick_interval: Duration,
    pub max_drift_retries: u32,
    pub source: Option<Rc<dyn TickSource>>,
    pub on_drift_fail: Option<DriftFailHandler>,
}

impl Default for TimerOptions {
    fn default() -> Self {
        Self::from_settings(&TimerSettings::default())
    }
}

impl TimerOptions {
    pub fn from_settings(settings: &TimerSettings) -> Self {
        Self {
            tick_interval: Duration::from_millis(settings.tick_interval_ms),
            max_drift_retries: settings.max_drift_retries,
            source: None,
            on_drift_fail: None,
        }
    }

    pub fn with_source(mut self, source: Rc<dyn TickSource>) -> Self {
        self.source = Some(source);
        self
    }

    pub fn with_drift_fail(mut self, handler: impl FnMut(u32) + 'static) -> Self {
        self.on_drift_fail = Some(Box::new(handler));
        self
    }
}

struct Run {
    state: TimerState,
    remaining: u32,
    retries: u32,
    generation: u64,
    /// A drift restart is waiting for its first consistent tick
    recovering: bool,
    pending: TimeoutSlot,
    disposed: bool,
}

impl Run {
    fn is_active(&self) -> bool {
        matches!(self.state, TimerState::Running | TimerState::Paused)
    }
}

struct Shared {
    run: RefCell<Run>,
    listeners: Listeners<TimerEventKind, TimerEvent>,
    /// Run-end hooks, called with the remaining value
    stop_listeners: Listeners<(), u32>,
    scheduler: Rc<dyn Scheduler>,
    source: Option<Rc<dyn TickSource>>,
    tick_interval: Duration,
    max_drift_retries: u32,
    on_drift_fail: RefCell<Option<DriftFailHandler>>,
}

/// Handle to a countdown. Clones share the same timer.
#[derive(Clone)]
pub struct CountdownTimer {
    shared: Rc<Shared>,
}

/// Reporting channel handed to a [`TickSource`], bound to one run.
#[derive(Clone)]
pub struct TickSink {
    timer: Weak<Shared>,
    generation: u64,
}

impl TickSink {
    /// Report the current whole-unit value.
    pub fn tick(&self, remaining: u32) {
        if let Some(timer) = self.timer() {
            timer.on_source_tick(self.generation, remaining);
        }
    }

    /// Report that the source lost its place.
    pub fn drift(&self) {
        if let Some(timer) = self.timer() {
            timer.handle_drift(self.generation);
        }
    }

    /// Report that the countdown finished.
    pub fn expired(&self) {
        if let Some(timer) = self.timer() {
            if timer.is_current(self.generation) {
                timer.expire(self.generation);
            }
        }
    }

    /// True once the run this sink belongs to has been superseded.
    pub fn is_stale(&self) -> bool {
        self.timer()
            .is_none_or(|timer| !timer.is_current(self.generation))
    }

    fn timer(&self) -> Option<CountdownTimer> {
        self.timer.upgrade().map(|shared| CountdownTimer { shared })
    }
}

/// Validate a duration and round it up to whole units.
fn whole_units(duration: f64) -> Result<u32, TimerError> {
    if !duration.is_finite() {
        return Err(TimerError::NonFiniteDuration { duration });
    }
    if duration < 0.0 || duration.ceil() > f64::from(u32::MAX) {
        return Err(TimerError::DurationOutOfRange { duration });
    }
    Ok(duration.ceil() as u32)
}

enum SourceStep {
    Ignore,
    Tick(u32),
    Expire,
    Drift,
}

impl CountdownTimer {
    pub fn new(scheduler: Rc<dyn Scheduler>, options: TimerOptions) -> Self {
        Self {
            shared: Rc::new(Shared {
                run: RefCell::new(Run {
                    state: TimerState::Idle,
                    remaining: 0,
                    retries: 0,
                    generation: 0,
                    recovering: false,
                    pending: TimeoutSlot::default(),
                    disposed: false,
                }),
                listeners: Listeners::new(),
                stop_listeners: Listeners::new(),
                scheduler,
                source: options.source,
                tick_interval: options.tick_interval,
                max_drift_retries: options.max_drift_retries,
                on_drift_fail: RefCell::new(options.on_drift_fail),
            }),
        }
    }

    // ─── Control ────────────────────────────────────────────────────────────

    /// Start (or restart) the countdown from `duration` units.
    ///
    /// Emits `Tick(duration)` synchronously before scheduling the next
    /// decrement. Any previous run is invalidated.
    pub fn start(&self, duration: f64) -> Result<(), TimerError> {
        let units = whole_units(duration)?;

        let (generation, superseded) = {
            let mut run = self.shared.run.borrow_mut();
            if run.disposed {
                return Err(TimerError::Disposed);
            }
            let superseded = run.is_active().then_some(run.remaining);
            run.pending.cancel(&*self.shared.scheduler);
            run.generation += 1;
            run.state = TimerState::Running;
            run.remaining = units;
            run.retries = 0;
            run.recovering = false;
            (run.generation, superseded)
        };
        self.stop_source();
        if let Some(remaining) = superseded {
            self.notify_stopped(remaining);
            if !self.is_current(generation) {
                return Ok(());
            }
        }

        tracing::debug!(units, generation, "countdown started");
        self.emit(TimerEvent::Tick(units));

        // A tick handler may have stopped or restarted the timer.
        if !self.is_current(generation) {
            return Ok(());
        }
        if units == 0 {
            self.expire(generation);
        } else {
            self.arm(generation);
        }
        Ok(())
    }

    /// Cancel the countdown without emitting `Expired`.
    pub fn stop(&self) {
        let ended = {
            let mut run = self.shared.run.borrow_mut();
            if run.state == TimerState::Idle && !run.pending.is_set() {
                return;
            }
            let ended = run.is_active().then_some(run.remaining);
            run.pending.cancel(&*self.shared.scheduler);
            run.generation += 1;
            run.state = TimerState::Idle;
            run.remaining = 0;
            run.retries = 0;
            run.recovering = false;
            ended
        };
        self.stop_source();
        tracing::debug!("countdown stopped");
        if let Some(remaining) = ended {
            self.notify_stopped(remaining);
        }
    }

    /// Freeze the countdown, preserving `remaining`. No-op unless running.
    pub fn pause(&self) {
        {
            let mut run = self.shared.run.borrow_mut();
            if run.state != TimerState::Running {
                return;
            }
            run.pending.cancel(&*self.shared.scheduler);
            run.generation += 1;
            run.state = TimerState::Paused;
        }
        self.stop_source();
        tracing::debug!(remaining = self.remaining(), "countdown paused");
    }

    /// Continue from the preserved value. No-op unless paused.
    pub fn resume(&self) {
        let generation = {
            let mut run = self.shared.run.borrow_mut();
            if run.state != TimerState::Paused {
                return;
            }
            run.generation += 1;
            run.state = TimerState::Running;
            run.generation
        };
        tracing::debug!(remaining = self.remaining(), "countdown resumed");
        self.arm(generation);
    }

    /// Stop, drop every listener and refuse further starts.
    pub fn dispose(&self) {
        self.stop();
        self.shared.listeners.clear();
        self.shared.stop_listeners.clear();
        self.shared.run.borrow_mut().disposed = true;
    }

    // ─── Listeners ──────────────────────────────────────────────────────────

    pub fn on<F>(&self, kind: TimerEventKind, handler: F) -> ListenerId
    where
        F: FnMut(&TimerEvent) -> HandlerResult + 'static,
    {
        self.shared.listeners.add(kind, Box::new(handler))
    }

    pub fn once<F>(&self, kind: TimerEventKind, handler: F) -> ListenerId
    where
        F: FnMut(&TimerEvent) -> HandlerResult + 'static,
    {
        self.shared.listeners.add_once(kind, Box::new(handler))
    }

    /// Register by event name; unknown names are rejected.
    pub fn on_named<F>(&self, name: &str, handler: F) -> Result<ListenerId, TimerError>
    where
        F: FnMut(&TimerEvent) -> HandlerResult + 'static,
    {
        let kind = name.parse::<TimerEventKind>()?;
        Ok(self.on(kind, handler))
    }

    pub fn off(&self, id: ListenerId) -> bool {
        self.shared.listeners.remove(id)
    }

    /// Called whenever a running or paused run ends without `Expired`.
    /// Ids are only valid for [`off_stop`](Self::off_stop).
    pub fn on_stop<F>(&self, mut handler: F) -> ListenerId
    where
        F: FnMut(u32) -> HandlerResult + 'static,
    {
        self.shared
            .stop_listeners
            .add((), Box::new(move |remaining| handler(*remaining)))
    }

    pub fn off_stop(&self, id: ListenerId) -> bool {
        self.shared.stop_listeners.remove(id)
    }

    /// Number of registered listeners across all kinds, run-end hooks
    /// included.
    pub fn listener_count(&self) -> usize {
        self.shared.listeners.len() + self.shared.stop_listeners.len()
    }

    // ─── Queries ────────────────────────────────────────────────────────────

    pub fn state(&self) -> TimerState {
        self.shared.run.borrow().state
    }

    pub fn is_running(&self) -> bool {
        self.state() == TimerState::Running
    }

    pub fn is_paused(&self) -> bool {
        self.state() == TimerState::Paused
    }

    pub fn remaining(&self) -> u32 {
        self.shared.run.borrow().remaining
    }

    pub fn retries(&self) -> u32 {
        self.shared.run.borrow().retries
    }

    /// Resolves on the next `Expired`; errors if the timer is disposed first.
    pub fn wait_for_expiration(&self) -> impl Future<Output = Result<(), TimerError>> + 'static {
        let (tx, rx) = oneshot::channel();
        let mut tx = Some(tx);
        self.once(TimerEventKind::Expired, move |_| {
            if let Some(tx) = tx.take() {
                let _ = tx.send(());
            }
            Ok(())
        });
        async move { rx.await.map_err(|_| TimerError::Disposed) }
    }

    /// Resolves with the value of the next `Tick`.
    pub fn wait_for_next_tick(&self) -> impl Future<Output = Result<u32, TimerError>> + 'static {
        let (tx, rx) = oneshot::channel();
        let mut tx = Some(tx);
        self.once(TimerEventKind::Tick, move |event| {
            if let (Some(tx), TimerEvent::Tick(remaining)) = (tx.take(), event) {
                let _ = tx.send(*remaining);
            }
            Ok(())
        });
        async move { rx.await.map_err(|_| TimerError::Disposed) }
    }

    // ─── Internals ──────────────────────────────────────────────────────────

    fn emit(&self, event: TimerEvent) {
        tracing::trace!(?event, "countdown event");
        self.shared.listeners.emit(event.kind(), &event);
    }

    fn notify_stopped(&self, remaining: u32) {
        self.shared.stop_listeners.emit((), &remaining);
    }

    fn is_current(&self, generation: u64) -> bool {
        let run = self.shared.run.borrow();
        run.generation == generation && run.state == TimerState::Running
    }

    fn stop_source(&self) {
        if let Some(source) = &self.shared.source {
            source.stop();
        }
    }

    /// Begin delivering decrements for `generation`.
    fn arm(&self, generation: u64) {
        match &self.shared.source {
            Some(source) => {
                let remaining = self.remaining();
                let sink = TickSink {
                    timer: Rc::downgrade(&self.shared),
                    generation,
                };
                if let Err(err) = source.start(remaining, sink) {
                    tracing::warn!(error = %err, "tick source refused to start");
                    self.handle_drift(generation);
                }
            }
            None => self.schedule_next(generation),
        }
    }

    fn schedule_next(&self, generation: u64) {
        let weak = Rc::downgrade(&self.shared);
        let id = self.shared.scheduler.set_timeout(
            self.shared.tick_interval,
            Box::new(move || {
                if let Some(shared) = weak.upgrade() {
                    CountdownTimer { shared }.on_interval(generation);
                }
            }),
        );
        self.shared
            .run
            .borrow_mut()
            .pending
            .set(&*self.shared.scheduler, id);
    }

    fn on_interval(&self, generation: u64) {
        let remaining = {
            let mut run = self.shared.run.borrow_mut();
            if run.generation != generation || run.state != TimerState::Running {
                return;
            }
            run.pending.forget();
            run.remaining = run.remaining.saturating_sub(1);
            run.remaining
        };

        if remaining == 0 {
            self.expire(generation);
            return;
        }
        self.emit(TimerEvent::Tick(remaining));
        if self.is_current(generation) {
            self.schedule_next(generation);
        }
    }

    fn on_source_tick(&self, generation: u64, value: u32) {
        let step = {
            let mut run = self.shared.run.borrow_mut();
            if run.generation != generation || run.state != TimerState::Running {
                SourceStep::Ignore
            } else if value == run.remaining {
                SourceStep::Ignore
            } else if value.checked_add(1) == Some(run.remaining) {
                run.remaining = value;
                if run.recovering {
                    run.recovering = false;
                    run.retries = 0;
                }
                if value == 0 {
                    SourceStep::Expire
                } else {
                    SourceStep::Tick(value)
                }
            } else {
                SourceStep::Drift
            }
        };

        match step {
            SourceStep::Ignore => {}
            SourceStep::Tick(value) => self.emit(TimerEvent::Tick(value)),
            SourceStep::Expire => self.expire(generation),
            SourceStep::Drift => self.handle_drift(generation),
        }
    }

    fn handle_drift(&self, generation: u64) {
        let (remaining, retries) = {
            let mut run = self.shared.run.borrow_mut();
            if run.generation != generation || run.state != TimerState::Running {
                return;
            }
            run.retries += 1;
            run.recovering = true;
            (run.remaining, run.retries)
        };

        tracing::warn!(remaining, retries, "countdown drift");
        self.emit(TimerEvent::Drift(remaining));
        if !self.is_current(generation) {
            return;
        }

        if retries >= self.shared.max_drift_retries {
            self.fail_drift(generation, remaining);
            return;
        }

        let restart = {
            let mut run = self.shared.run.borrow_mut();
            run.generation += 1;
            run.generation
        };
        self.stop_source();
        self.arm(restart);
    }

    fn fail_drift(&self, generation: u64, remaining: u32) {
        let handler = self.shared.on_drift_fail.borrow_mut().take();
        let Some(mut handler) = handler else {
            tracing::warn!(remaining, "drift retries exhausted, forcing expiration");
            self.expire(generation);
            return;
        };

        {
            let mut run = self.shared.run.borrow_mut();
            run.pending.cancel(&*self.shared.scheduler);
            run.generation += 1;
            run.state = TimerState::Idle;
            run.recovering = false;
        }
        self.stop_source();
        tracing::warn!(remaining, "drift retries exhausted");
        self.notify_stopped(remaining);
        handler(remaining);

        let mut slot = self.shared.on_drift_fail.borrow_mut();
        if slot.is_none() {
            *slot = Some(handler);
        }
    }

    fn expire(&self, generation: u64) {
        {
            let mut run = self.shared.run.borrow_mut();
            if run.generation != generation {
                return;
            }
            run.pending.cancel(&*self.shared.scheduler);
            run.generation += 1;
            run.state = TimerState::Expired;
            run.remaining = 0;
            run.recovering = false;
        }
        self.stop_source();
        tracing::debug!("countdown expired");
        self.emit(TimerEvent::Expired);
    }
}

impl std::fmt::Debug for CountdownTimer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let run = self.shared.run.borrow();
        f.debug_struct("CountdownTimer")
            .field("state", &run.state)
            .field("remaining", &run.remaining)
            .field("retries", &run.retries)
            .finish()
    }
}
