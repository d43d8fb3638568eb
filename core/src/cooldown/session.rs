//! Cooldown session
//!
//! Signals "next round is ready" exactly once per session.
//!
//! # Modes
//!
//! - **Orchestrated** (a battle machine is registered): readiness resolves
//!   from `CooldownExpired`, `CountdownFinished`, or a `StateChanged` that
//!   leaves the cooldown state. Local expiry or skip dispatches
//!   `MachineEvent::Ready`.
//! - **Free-running**: readiness resolves from local expiry, skip, or a
//!   `CountdownFinished` broadcast, and is announced with `RoundReady`.
//!
//! Either way a deadline fallback resolves readiness if nothing else does.
//!
//! The session registers its timer listener at creation, before any renderer
//! can attach to the timer, so local expiry is always handled first.

use std::cell::RefCell;
use std::fmt;
use std::future::Future;
use std::rc::{Rc, Weak};
use std::time::Duration;

use tokio::sync::watch;

use crate::context::{BattleContext, DispatchRefused, Machine, MachineEvent, TempoConfig};
use crate::events::{BattleEvent, BattleEventKind, BattleState, EventBus, ListenerId, Subscriptions};
use crate::scheduler::{Clock, Scheduler, TimeoutSlot};
use crate::timers::{CountdownTimer, TimerError, TimerEventKind, TimerOptions};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CooldownMode {
    Orchestrated,
    FreeRunning,
}

/// What resolved readiness.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReadySource {
    /// The session's own countdown expired
    TimerExpired,
    Skip,
    DeadlineFallback,
    /// `CooldownExpired` broadcast
    CooldownExpired,
    /// `CountdownFinished` broadcast
    CountdownFinished,
    /// The machine left the cooldown state
    StateChanged,
    /// Resolved by the host through [`CooldownSession::resolve_ready`]
    Manual,
}

impl ReadySource {
    /// Sources produced by this session rather than observed on the bus.
    fn is_local(self) -> bool {
        matches!(
            self,
            ReadySource::TimerExpired | ReadySource::Skip | ReadySource::DeadlineFallback
        )
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReadyState {
    Pending,
    Resolved(ReadySource),
    /// Cleared before anything resolved it
    Cancelled,
}

/// Result of dispatching `Ready` to the machine.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DispatchOutcome {
    /// Not dispatched yet, or waiting on the retry
    Pending,
    Accepted,
    AcceptedOnRetry,
    /// Refused twice; [`CooldownSession::retry_dispatch`] may still be used
    Refused,
}

pub struct CooldownOptions {
    /// Cooldown length in countdown units
    pub duration: f64,
    pub fallback_grace: Duration,
    pub pause_on_hidden: bool,
    pub timer: TimerOptions,
}

impl CooldownOptions {
    pub fn from_config(config: &TempoConfig) -> Self {
        Self {
            duration: config.cooldown.duration_secs,
            fallback_grace: Duration::from_millis(config.cooldown.fallback_grace_ms),
            pause_on_hidden: config.cooldown.pause_on_hidden,
            timer: TimerOptions::from_settings(&config.timer),
        }
    }

    pub fn with_duration(mut self, duration: f64) -> Self {
        self.duration = duration;
        self
    }

    pub fn with_timer(mut self, timer: TimerOptions) -> Self {
        self.timer = timer;
        self
    }
}

struct SessionState {
    ready: ReadyState,
    dispatch: DispatchOutcome,
    skipped: bool,
    cleared: bool,
    fallback: TimeoutSlot,
    /// Clock time the armed fallback fires at
    fallback_due: Option<Duration>,
    /// Time left on a fallback suspended while hidden
    fallback_suspended: Option<Duration>,
    retry: TimeoutSlot,
    timer_listeners: Vec<ListenerId>,
}

struct Inner {
    mode: CooldownMode,
    timer: CountdownTimer,
    scheduler: Rc<dyn Scheduler>,
    clock: Rc<dyn Clock>,
    bus: Rc<dyn EventBus>,
    machine: Option<Rc<dyn Machine>>,
    state: RefCell<SessionState>,
    subscriptions: RefCell<Subscriptions>,
    ready_tx: watch::Sender<ReadyState>,
}

impl Inner {
    /// Stop the timer, cancel every callback and detach every listener.
    fn teardown(&self) {
        let listeners = {
            let mut state = self.state.borrow_mut();
            state.fallback.cancel(&*self.scheduler);
            state.retry.cancel(&*self.scheduler);
            state.fallback_due = None;
            state.fallback_suspended = None;
            std::mem::take(&mut state.timer_listeners)
        };
        for id in listeners {
            self.timer.off(id);
        }
        self.subscriptions.borrow_mut().clear();
        self.timer.stop();
    }
}

impl Drop for Inner {
    fn drop(&mut self) {
        self.teardown();
    }
}

/// One inter-round cooldown.
///
/// Clones share the session; dropping the last one clears it.
#[derive(Clone)]
pub struct CooldownSession {
    inner: Rc<Inner>,
}

fn upgrade(weak: &Weak<Inner>) -> Option<CooldownSession> {
    weak.upgrade().map(|inner| CooldownSession { inner })
}

impl CooldownSession {
    /// Probe for a machine, wire up listeners, start the countdown and arm
    /// the deadline fallback.
    pub fn create(ctx: &BattleContext, options: CooldownOptions) -> Result<Self, TimerError> {
        let machine = ctx.machine();
        let mode = if machine.is_some() {
            CooldownMode::Orchestrated
        } else {
            CooldownMode::FreeRunning
        };
        let tick_interval = options.timer.tick_interval;
        let timer = CountdownTimer::new(Rc::clone(&ctx.scheduler), options.timer);
        let (ready_tx, _) = watch::channel(ReadyState::Pending);

        let session = Self {
            inner: Rc::new(Inner {
                mode,
                timer,
                scheduler: Rc::clone(&ctx.scheduler),
                clock: Rc::clone(&ctx.clock),
                bus: Rc::clone(&ctx.bus),
                machine,
                state: RefCell::new(SessionState {
                    ready: ReadyState::Pending,
                    dispatch: DispatchOutcome::Pending,
                    skipped: false,
                    cleared: false,
                    fallback: TimeoutSlot::default(),
                    fallback_due: None,
                    fallback_suspended: None,
                    retry: TimeoutSlot::default(),
                    timer_listeners: Vec::new(),
                }),
                subscriptions: RefCell::new(Subscriptions::new(Rc::clone(&ctx.bus))),
                ready_tx,
            }),
        };
        session.wire(options.pause_on_hidden);

        tracing::debug!(?mode, duration = options.duration, "cooldown session created");
        session.inner.timer.start(options.duration)?;

        if !session.is_resolved() {
            let delay = tick_interval
                .saturating_mul(session.inner.timer.remaining())
                .saturating_add(options.fallback_grace);
            session.arm_fallback(delay);
        }
        Ok(session)
    }

    fn wire(&self, pause_on_hidden: bool) {
        let weak = Rc::downgrade(&self.inner);
        let expired = self.inner.timer.on(TimerEventKind::Expired, move |_| {
            if let Some(session) = upgrade(&weak) {
                session.on_timer_expired();
            }
            Ok(())
        });
        self.inner.state.borrow_mut().timer_listeners.push(expired);

        let mut subs = self.inner.subscriptions.borrow_mut();
        let mut resolve_on = |kind: BattleEventKind, source: ReadySource| {
            let weak = Rc::downgrade(&self.inner);
            subs.subscribe(
                kind,
                Box::new(move |event| {
                    let leaves_cooldown = match event {
                        BattleEvent::StateChanged { to, .. } => *to != BattleState::Cooldown,
                        _ => true,
                    };
                    if let Some(session) = upgrade(&weak).filter(|_| leaves_cooldown) {
                        session.resolve(source);
                    }
                    Ok(())
                }),
            );
        };

        resolve_on(BattleEventKind::CountdownFinished, ReadySource::CountdownFinished);
        if self.inner.mode == CooldownMode::Orchestrated {
            resolve_on(BattleEventKind::CooldownExpired, ReadySource::CooldownExpired);
            resolve_on(BattleEventKind::StateChanged, ReadySource::StateChanged);
        }

        if pause_on_hidden {
            let weak = Rc::downgrade(&self.inner);
            subs.subscribe(
                BattleEventKind::VisibilityChanged,
                Box::new(move |event| {
                    if let (Some(session), BattleEvent::VisibilityChanged { hidden }) =
                        (upgrade(&weak), event)
                    {
                        session.on_visibility(*hidden);
                    }
                    Ok(())
                }),
            );
        }
    }

    // ─── Public API ─────────────────────────────────────────────────────────

    /// The countdown driving this cooldown. Attach renderers to it.
    pub fn timer(&self) -> &CountdownTimer {
        &self.inner.timer
    }

    pub fn mode(&self) -> CooldownMode {
        self.inner.mode
    }

    /// Resolves with the readiness source, or `None` if the session was
    /// cleared first.
    pub fn ready(&self) -> impl Future<Output = Option<ReadySource>> + 'static {
        let mut rx = self.inner.ready_tx.subscribe();
        async move {
            loop {
                match *rx.borrow_and_update() {
                    ReadyState::Resolved(source) => return Some(source),
                    ReadyState::Cancelled => return None,
                    ReadyState::Pending => {}
                }
                if rx.changed().await.is_err() {
                    return None;
                }
            }
        }
    }

    /// Resolve readiness from outside. Returns `false` if it was already
    /// resolved or the session was cleared.
    pub fn resolve_ready(&self, source: ReadySource) -> bool {
        self.resolve(source)
    }

    /// Stop the countdown and resolve immediately. Repeated calls are no-ops.
    pub fn skip(&self) {
        {
            let mut state = self.inner.state.borrow_mut();
            if state.skipped || state.ready != ReadyState::Pending {
                return;
            }
            state.skipped = true;
        }
        tracing::debug!("cooldown skipped");
        self.inner.timer.stop();
        self.resolve(ReadySource::Skip);
    }

    /// Cancel every callback, detach every listener and stop the timer.
    /// Idempotent; readiness that hasn't resolved yet becomes `Cancelled`.
    pub fn clear(&self) {
        let cancelled = {
            let mut state = self.inner.state.borrow_mut();
            if state.cleared {
                return;
            }
            state.cleared = true;
            if state.ready == ReadyState::Pending {
                state.ready = ReadyState::Cancelled;
                true
            } else {
                false
            }
        };
        self.inner.teardown();
        if cancelled {
            self.inner.ready_tx.send_replace(ReadyState::Cancelled);
        }
        tracing::debug!("cooldown session cleared");
    }

    pub fn is_ready(&self) -> bool {
        self.is_resolved()
    }

    pub fn ready_state(&self) -> ReadyState {
        self.inner.state.borrow().ready
    }

    pub fn resolution(&self) -> Option<ReadySource> {
        match self.ready_state() {
            ReadyState::Resolved(source) => Some(source),
            _ => None,
        }
    }

    pub fn dispatch_outcome(&self) -> DispatchOutcome {
        self.inner.state.borrow().dispatch
    }

    /// True while the deadline fallback is armed or suspended.
    pub fn fallback_pending(&self) -> bool {
        let state = self.inner.state.borrow();
        state.fallback.is_set() || state.fallback_suspended.is_some()
    }

    /// Dispatch `Ready` again after a refusal.
    ///
    /// A no-op in free-running mode or once the machine has accepted.
    pub fn retry_dispatch(&self) -> Result<(), DispatchRefused> {
        let Some(machine) = self.inner.machine.clone() else {
            return Ok(());
        };
        {
            let mut state = self.inner.state.borrow_mut();
            if matches!(
                state.dispatch,
                DispatchOutcome::Accepted | DispatchOutcome::AcceptedOnRetry
            ) {
                return Ok(());
            }
            state.retry.cancel(&*self.inner.scheduler);
        }

        let result = machine.dispatch(MachineEvent::Ready);
        let mut state = self.inner.state.borrow_mut();
        match &result {
            Ok(()) => state.dispatch = DispatchOutcome::Accepted,
            Err(refused) => {
                tracing::warn!(error = %refused, "manual ready dispatch refused");
                state.dispatch = DispatchOutcome::Refused;
            }
        }
        result
    }

    // ─── Internals ──────────────────────────────────────────────────────────

    fn is_resolved(&self) -> bool {
        matches!(self.ready_state(), ReadyState::Resolved(_))
    }

    fn on_timer_expired(&self) {
        if self.inner.state.borrow().skipped {
            return;
        }
        match self.inner.mode {
            CooldownMode::Orchestrated => {
                self.resolve(ReadySource::TimerExpired);
                self.inner.bus.emit(&BattleEvent::CooldownExpired);
            }
            CooldownMode::FreeRunning => {
                self.resolve(ReadySource::TimerExpired);
            }
        }
    }

    /// The single resolution point. Returns `false` if already resolved.
    fn resolve(&self, source: ReadySource) -> bool {
        let (listeners, dispatch) = {
            let mut state = self.inner.state.borrow_mut();
            if state.ready != ReadyState::Pending {
                return false;
            }
            state.ready = ReadyState::Resolved(source);
            state.fallback.cancel(&*self.inner.scheduler);
            state.fallback_due = None;
            state.fallback_suspended = None;
            let dispatch = self.inner.mode == CooldownMode::Orchestrated
                && source.is_local()
                && state.dispatch == DispatchOutcome::Pending;
            (std::mem::take(&mut state.timer_listeners), dispatch)
        };

        tracing::debug!(?source, "cooldown ready");
        for id in listeners {
            self.inner.timer.off(id);
        }
        self.inner.subscriptions.borrow_mut().clear();
        if self.inner.timer.is_running() || self.inner.timer.is_paused() {
            self.inner.timer.stop();
        }

        if dispatch {
            self.dispatch_ready();
        }
        self.inner.ready_tx.send_replace(ReadyState::Resolved(source));
        if self.inner.mode == CooldownMode::FreeRunning {
            self.inner.bus.emit(&BattleEvent::RoundReady);
        }
        true
    }

    fn dispatch_ready(&self) {
        let Some(machine) = self.inner.machine.clone() else {
            return;
        };
        match machine.dispatch(MachineEvent::Ready) {
            Ok(()) => self.inner.state.borrow_mut().dispatch = DispatchOutcome::Accepted,
            Err(refused) => {
                tracing::warn!(error = %refused, "ready dispatch refused, retrying once");
                let weak = Rc::downgrade(&self.inner);
                let scheduler = &*self.inner.scheduler;
                let id = scheduler.set_timeout(
                    Duration::ZERO,
                    Box::new(move || {
                        if let Some(session) = upgrade(&weak) {
                            session.retry_after_refusal(machine);
                        }
                    }),
                );
                self.inner.state.borrow_mut().retry.set(scheduler, id);
            }
        }
    }

    fn retry_after_refusal(&self, machine: Rc<dyn Machine>) {
        self.inner.state.borrow_mut().retry.forget();
        match machine.dispatch(MachineEvent::Ready) {
            Ok(()) => {
                self.inner.state.borrow_mut().dispatch = DispatchOutcome::AcceptedOnRetry;
            }
            Err(refused) => {
                tracing::warn!(error = %refused, "ready dispatch refused again");
                self.inner.state.borrow_mut().dispatch = DispatchOutcome::Refused;
                self.inner.bus.emit(&BattleEvent::ReadyDispatchRefused);
            }
        }
    }

    fn arm_fallback(&self, delay: Duration) {
        let weak = Rc::downgrade(&self.inner);
        let scheduler = &*self.inner.scheduler;
        let id = scheduler.set_timeout(
            delay,
            Box::new(move || {
                if let Some(session) = upgrade(&weak) {
                    session.inner.state.borrow_mut().fallback.forget();
                    tracing::debug!("cooldown deadline fallback fired");
                    session.resolve(ReadySource::DeadlineFallback);
                }
            }),
        );
        let mut state = self.inner.state.borrow_mut();
        state.fallback.set(scheduler, id);
        state.fallback_due = Some(self.inner.clock.now().saturating_add(delay));
        state.fallback_suspended = None;
    }

    fn on_visibility(&self, hidden: bool) {
        if hidden {
            {
                let mut state = self.inner.state.borrow_mut();
                if state.ready != ReadyState::Pending || state.fallback_suspended.is_some() {
                    return;
                }
                if let Some(due) = state.fallback_due.take() {
                    state.fallback.cancel(&*self.inner.scheduler);
                    state.fallback_suspended =
                        Some(due.saturating_sub(self.inner.clock.now()));
                }
            }
            tracing::debug!("host hidden, cooldown paused");
            self.inner.timer.pause();
        } else {
            let suspended = {
                let mut state = self.inner.state.borrow_mut();
                if state.ready != ReadyState::Pending {
                    return;
                }
                state.fallback_suspended.take()
            };
            tracing::debug!("host visible, cooldown resumed");
            self.inner.timer.resume();
            if let Some(left) = suspended {
                self.arm_fallback(left);
            }
        }
    }
}

impl fmt::Debug for CooldownSession {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let state = self.inner.state.borrow();
        f.debug_struct("CooldownSession")
            .field("mode", &self.inner.mode)
            .field("ready", &state.ready)
            .field("dispatch", &state.dispatch)
            .field("timer", &self.inner.timer)
            .finish()
    }
}
