//! Prompt signal race
//!
//! [`PromptSynchronizer::wait_for_signal`] sets the race up eagerly: the bus
//! subscription, the timestamp poll and the deadline exist as soon as it
//! returns. The returned [`SignalWait`] owns them, and they are released when
//! the race settles or the wait is dropped, whichever happens first.

use std::cell::{Cell, RefCell};
use std::fmt;
use std::future::Future;
use std::pin::Pin;
use std::rc::{Rc, Weak};
use std::task::{Context, Poll};
use std::time::Duration;

use thiserror::Error;
use tokio::sync::oneshot;

use crate::context::{BattleContext, PromptSettings, TimestampSource};
use crate::events::{BattleEventKind, EventBus, ListenerId};
use crate::scheduler::{Scheduler, TimeoutSlot};

use super::{MIN_POLL_INTERVAL_MS, PromptBudget, compute_wait_budget};

#[derive(Debug, Clone, PartialEq, Error)]
pub enum PromptError {
    #[error("poll interval must be a positive number of milliseconds, got {value}")]
    InvalidPollInterval { value: f64 },
}

/// How a prompt wait ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PromptSignal {
    /// The host timestamp became available
    Timestamp(Duration),
    /// `OpponentPromptReady` was broadcast
    ReadyEvent,
    /// The budget ran out
    TimedOut,
    /// No scheduler: resolved immediately
    Unscheduled,
}

#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct WaitOptions {
    /// Overrides the configured poll interval. Floored at 50 ms.
    pub poll_interval_ms: Option<f64>,
}

/// Waits for the opponent prompt.
///
/// Every collaborator is optional; missing ones shrink the race rather than
/// failing it.
#[derive(Clone, Default)]
pub struct PromptSynchronizer {
    scheduler: Option<Rc<dyn Scheduler>>,
    bus: Option<Rc<dyn EventBus>>,
    timestamps: Option<Rc<dyn TimestampSource>>,
    settings: PromptSettings,
}

impl PromptSynchronizer {
    pub fn new(ctx: &BattleContext) -> Self {
        Self {
            scheduler: Some(Rc::clone(&ctx.scheduler)),
            bus: Some(Rc::clone(&ctx.bus)),
            timestamps: ctx.timestamps.clone(),
            settings: ctx.config.prompt.clone(),
        }
    }

    /// A synchronizer with no collaborators.
    pub fn detached(settings: PromptSettings) -> Self {
        Self {
            settings,
            ..Self::default()
        }
    }

    pub fn with_scheduler(mut self, scheduler: Rc<dyn Scheduler>) -> Self {
        self.scheduler = Some(scheduler);
        self
    }

    pub fn with_bus(mut self, bus: Rc<dyn EventBus>) -> Self {
        self.bus = Some(bus);
        self
    }

    pub fn with_timestamps(mut self, timestamps: Rc<dyn TimestampSource>) -> Self {
        self.timestamps = Some(timestamps);
        self
    }

    /// [`compute_wait_budget`] over this synchronizer's settings.
    pub fn compute_budget(&self, buffer_override: Option<f64>) -> PromptBudget {
        compute_wait_budget(&self.settings, buffer_override)
    }

    fn poll_interval(&self, options: WaitOptions) -> Result<Duration, PromptError> {
        let ms = match options.poll_interval_ms {
            Some(value) if value.is_finite() && value > 0.0 => value,
            Some(value) => return Err(PromptError::InvalidPollInterval { value }),
            None => self.settings.poll_interval_ms as f64,
        };
        Ok(Duration::from_secs_f64(ms.max(MIN_POLL_INTERVAL_MS) / 1000.0))
    }

    /// Race the timestamp, the ready broadcast and the budget deadline.
    ///
    /// Settles at once, scheduling nothing, if the timestamp is already
    /// available or there is no scheduler.
    pub fn wait_for_signal(
        &self,
        budget: &PromptBudget,
        options: WaitOptions,
    ) -> Result<SignalWait, PromptError> {
        let poll_interval = self.poll_interval(options)?;

        if let Some(at) = self.timestamps.as_ref().and_then(|source| source.timestamp()) {
            tracing::trace!(?at, "prompt timestamp already available");
            return Ok(SignalWait::settled(PromptSignal::Timestamp(at)));
        }
        let Some(scheduler) = self.scheduler.clone() else {
            tracing::debug!("no scheduler, prompt wait resolves immediately");
            return Ok(SignalWait::settled(PromptSignal::Unscheduled));
        };

        let (tx, rx) = oneshot::channel();
        let race = Rc::new(Race {
            tx: RefCell::new(Some(tx)),
            scheduler,
            bus: self.bus.clone(),
            timestamps: self.timestamps.clone(),
            poll_interval,
            subscription: Cell::new(None),
            poll: RefCell::new(TimeoutSlot::default()),
            deadline: RefCell::new(TimeoutSlot::default()),
        });

        if let Some(bus) = &race.bus {
            let weak = Rc::downgrade(&race);
            let id = bus.subscribe(
                BattleEventKind::OpponentPromptReady,
                Box::new(move |_| {
                    if let Some(race) = weak.upgrade() {
                        race.finish(PromptSignal::ReadyEvent);
                    }
                    Ok(())
                }),
            );
            race.subscription.set(Some(id));
        }

        let weak = Rc::downgrade(&race);
        let id = race.scheduler.set_timeout(
            budget.total(),
            Box::new(move || {
                if let Some(race) = weak.upgrade() {
                    race.deadline.borrow_mut().forget();
                    race.finish(PromptSignal::TimedOut);
                }
            }),
        );
        race.deadline.borrow_mut().set(&*race.scheduler, id);

        if race.timestamps.is_some() {
            race.schedule_poll();
        }

        tracing::debug!(total_ms = budget.total_ms, ?poll_interval, "waiting for opponent prompt");
        Ok(SignalWait {
            immediate: None,
            rx: Some(rx),
            race: Some(race),
        })
    }
}

impl fmt::Debug for PromptSynchronizer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PromptSynchronizer")
            .field("scheduler", &self.scheduler.is_some())
            .field("bus", &self.bus.is_some())
            .field("timestamps", &self.timestamps.is_some())
            .field("settings", &self.settings)
            .finish()
    }
}

struct Race {
    tx: RefCell<Option<oneshot::Sender<PromptSignal>>>,
    scheduler: Rc<dyn Scheduler>,
    bus: Option<Rc<dyn EventBus>>,
    timestamps: Option<Rc<dyn TimestampSource>>,
    poll_interval: Duration,
    subscription: Cell<Option<ListenerId>>,
    poll: RefCell<TimeoutSlot>,
    deadline: RefCell<TimeoutSlot>,
}

impl Race {
    fn finish(&self, signal: PromptSignal) {
        let Some(tx) = self.tx.borrow_mut().take() else {
            return;
        };
        self.release();
        tracing::debug!(?signal, "prompt wait settled");
        let _ = tx.send(signal);
    }

    fn release(&self) {
        self.poll.borrow_mut().cancel(&*self.scheduler);
        self.deadline.borrow_mut().cancel(&*self.scheduler);
        if let (Some(bus), Some(id)) = (&self.bus, self.subscription.take()) {
            bus.unsubscribe(id);
        }
    }

    fn schedule_poll(self: &Rc<Self>) {
        let weak: Weak<Race> = Rc::downgrade(self);
        let id = self.scheduler.set_timeout(
            self.poll_interval,
            Box::new(move || {
                if let Some(race) = weak.upgrade() {
                    race.poll.borrow_mut().forget();
                    race.check_timestamp();
                }
            }),
        );
        self.poll.borrow_mut().set(&*self.scheduler, id);
    }

    fn check_timestamp(self: &Rc<Self>) {
        match self.timestamps.as_ref().and_then(|source| source.timestamp()) {
            Some(at) => self.finish(PromptSignal::Timestamp(at)),
            None => self.schedule_poll(),
        }
    }
}

impl Drop for Race {
    fn drop(&mut self) {
        self.release();
    }
}

/// Pending prompt wait. Dropping it abandons the race and releases its
/// subscription and timeouts.
pub struct SignalWait {
    immediate: Option<PromptSignal>,
    rx: Option<oneshot::Receiver<PromptSignal>>,
    race: Option<Rc<Race>>,
}

impl SignalWait {
    fn settled(signal: PromptSignal) -> Self {
        Self {
            immediate: Some(signal),
            rx: None,
            race: None,
        }
    }

    /// True once the outcome is known.
    pub fn is_settled(&self) -> bool {
        self.immediate.is_some()
            || self
                .race
                .as_ref()
                .is_none_or(|race| race.tx.borrow().is_none())
    }
}

impl Future for SignalWait {
    type Output = PromptSignal;

    fn poll(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        if let Some(signal) = self.immediate.take() {
            return Poll::Ready(signal);
        }
        let Some(rx) = self.rx.as_mut() else {
            return Poll::Ready(PromptSignal::Unscheduled);
        };
        match Pin::new(rx).poll(cx) {
            Poll::Ready(result) => {
                self.race = None;
                Poll::Ready(result.unwrap_or(PromptSignal::TimedOut))
            }
            Poll::Pending => Poll::Pending,
        }
    }
}

impl fmt::Debug for SignalWait {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SignalWait")
            .field("settled", &self.is_settled())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::context::{SharedTimestamp, TempoConfig};
    use crate::events::{BattleEvent, InMemoryEventBus};
    use crate::scheduler::ManualScheduler;

    struct Fixture {
        sync: PromptSynchronizer,
        scheduler: ManualScheduler,
        bus: Rc<InMemoryEventBus>,
        timestamp: SharedTimestamp,
    }

    fn setup() -> Fixture {
        let timestamp = SharedTimestamp::new();
        let scheduler = ManualScheduler::new();
        let bus = Rc::new(InMemoryEventBus::new());
        let ctx = BattleContext::builder(Rc::new(scheduler.clone()), Rc::new(scheduler.clone()))
            .bus(bus.clone())
            .timestamps(Rc::new(timestamp.clone()))
            .config(TempoConfig::default())
            .build();
        Fixture {
            sync: PromptSynchronizer::new(&ctx),
            scheduler,
            bus,
            timestamp,
        }
    }

    fn budget(total_ms: f64) -> PromptBudget {
        PromptBudget {
            delay_ms: 0.0,
            min_visible_ms: 0.0,
            buffer_ms: total_ms,
            total_ms,
        }
    }

    #[tokio::test]
    async fn test_short_circuit_when_timestamp_present() {
        let f = setup();
        f.timestamp.set(Duration::from_millis(42));

        let wait = f.sync.wait_for_signal(&budget(500.0), WaitOptions::default()).unwrap();

        assert!(wait.is_settled());
        assert_eq!(f.scheduler.pending_count(), 0, "no poll scheduled");
        assert_eq!(f.bus.total_subscribers(), 0);
        assert_eq!(wait.await, PromptSignal::Timestamp(Duration::from_millis(42)));
    }

    #[tokio::test]
    async fn test_no_scheduler_resolves_immediately() {
        let sync = PromptSynchronizer::detached(PromptSettings::default());
        let wait = sync.wait_for_signal(&budget(500.0), WaitOptions::default()).unwrap();
        assert_eq!(wait.await, PromptSignal::Unscheduled);
    }

    #[test]
    fn test_invalid_poll_interval_fails_fast() {
        let f = setup();
        for value in [0.0, -10.0, f64::NAN, f64::INFINITY] {
            let result = f.sync.wait_for_signal(
                &budget(500.0),
                WaitOptions {
                    poll_interval_ms: Some(value),
                },
            );
            assert!(matches!(result, Err(PromptError::InvalidPollInterval { .. })));
        }
        assert_eq!(f.scheduler.pending_count(), 0);
    }

    #[test]
    fn test_poll_interval_is_floored() {
        let f = setup();
        let _wait = f
            .sync
            .wait_for_signal(
                &budget(500.0),
                WaitOptions {
                    poll_interval_ms: Some(10.0),
                },
            )
            .unwrap();

        assert_eq!(f.scheduler.next_deadline(), Some(Duration::from_millis(50)));
    }

    #[tokio::test]
    async fn test_timestamp_found_by_poll() {
        let f = setup();
        let wait = f.sync.wait_for_signal(&budget(1000.0), WaitOptions::default()).unwrap();

        f.scheduler.advance_ms(250);
        assert!(!wait.is_settled());
        f.timestamp.set(Duration::from_millis(260));
        f.scheduler.advance_ms(100);

        assert!(wait.is_settled());
        assert_eq!(f.scheduler.pending_count(), 0);
        assert_eq!(f.bus.total_subscribers(), 0);
        assert_eq!(wait.await, PromptSignal::Timestamp(Duration::from_millis(260)));
    }

    #[tokio::test]
    async fn test_ready_event_wins() {
        let f = setup();
        let wait = f.sync.wait_for_signal(&budget(1000.0), WaitOptions::default()).unwrap();

        f.scheduler.advance_ms(120);
        f.bus.emit(&BattleEvent::OpponentPromptReady);

        assert_eq!(f.scheduler.pending_count(), 0);
        assert_eq!(f.bus.total_subscribers(), 0);
        assert_eq!(wait.await, PromptSignal::ReadyEvent);
    }

    #[tokio::test]
    async fn test_budget_timeout() {
        let f = setup();
        let wait = f.sync.wait_for_signal(&budget(500.0), WaitOptions::default()).unwrap();

        f.scheduler.advance_ms(499);
        assert!(!wait.is_settled());
        f.scheduler.advance_ms(1);

        assert_eq!(f.scheduler.pending_count(), 0);
        assert_eq!(wait.await, PromptSignal::TimedOut);
    }

    #[test]
    fn test_dropping_wait_releases_race() {
        let f = setup();
        let wait = f.sync.wait_for_signal(&budget(500.0), WaitOptions::default()).unwrap();
        assert_eq!(f.bus.total_subscribers(), 1);
        assert_eq!(f.scheduler.pending_count(), 2);

        drop(wait);

        assert_eq!(f.bus.total_subscribers(), 0);
        assert_eq!(f.scheduler.pending_count(), 0);
    }

    #[test]
    fn test_budget_from_settings() {
        let f = setup();
        assert_eq!(f.sync.compute_budget(None).total_ms, 250.0);
        assert_eq!(f.sync.compute_budget(Some(-1.0)).buffer_ms, 250.0);
    }
}
