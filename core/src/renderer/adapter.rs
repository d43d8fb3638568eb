//! Renderer adapter
//!
//! Subscribes to a [`CountdownTimer`] and turns its events into scoreboard
//! writes, notification updates and battle broadcasts.
//!
//! Visual output can be held back by a suppression window (opened by a
//! `PromptShown` broadcast or [`RendererAdapter::suppress_for`]) so the
//! countdown doesn't overwrite a prompt that must stay readable. The first
//! render of each run always goes through. Bus broadcasts are never
//! suppressed.
//!
//! A run ends either by expiring or by being stopped (including a cooldown
//! skip). Both clear the scoreboard, remove the countdown notification and
//! re-arm the first-render bypass; only expiry broadcasts `CountdownFinished`.

use std::cell::RefCell;
use std::fmt;
use std::rc::{Rc, Weak};
use std::time::Duration;

use crate::context::{BattleContext, RendererSettings};
use crate::events::{BattleEvent, BattleEventKind, EventBus, ListenerId, Subscriptions};
use crate::notifications::{NotificationConfig, NotificationHandle, NotificationManager, Priority};
use crate::scheduler::Clock;
use crate::timers::{CountdownTimer, TimerEvent, TimerEventKind};

use super::Scoreboard;

/// Produces the notification text for a remaining value.
pub type CountdownFormatter = Box<dyn Fn(u32) -> String>;

pub struct RendererOptions {
    pub formatter: CountdownFormatter,
    pub priority: Priority,
    /// Window opened by a `PromptShown` broadcast with no duration of its own
    pub suppress_window: Duration,
}

impl RendererOptions {
    pub fn from_settings(settings: &RendererSettings) -> Self {
        Self {
            formatter: Box::new(|remaining| format!("Next round in: {remaining}s")),
            priority: Priority::Normal,
            suppress_window: Duration::from_millis(settings.suppress_window_ms),
        }
    }

    pub fn with_formatter(mut self, formatter: impl Fn(u32) -> String + 'static) -> Self {
        self.formatter = Box::new(formatter);
        self
    }

    pub fn with_priority(mut self, priority: Priority) -> Self {
        self.priority = priority;
        self
    }
}

impl Default for RendererOptions {
    fn default() -> Self {
        Self::from_settings(&RendererSettings::default())
    }
}

#[derive(Default)]
struct RenderState {
    attached: bool,
    /// Reset when a run ends so every run gets its first render
    rendered_once: bool,
    suppressed_until: Option<Duration>,
    notification: Option<NotificationHandle>,
    timer_listeners: Vec<ListenerId>,
    stop_listener: Option<ListenerId>,
}

struct Inner {
    timer: CountdownTimer,
    bus: Rc<dyn EventBus>,
    clock: Rc<dyn Clock>,
    notifications: Option<NotificationManager>,
    scoreboard: Option<Rc<dyn Scoreboard>>,
    options: RendererOptions,
    state: RefCell<RenderState>,
    subscriptions: RefCell<Subscriptions>,
}

/// Live binding between one timer and the host's countdown display.
///
/// Dropping the adapter detaches it.
pub struct RendererAdapter {
    inner: Rc<Inner>,
}

impl RendererAdapter {
    pub fn attach(
        ctx: &BattleContext,
        timer: &CountdownTimer,
        notifications: Option<NotificationManager>,
        scoreboard: Option<Rc<dyn Scoreboard>>,
        options: RendererOptions,
    ) -> Self {
        let inner = Rc::new(Inner {
            timer: timer.clone(),
            bus: Rc::clone(&ctx.bus),
            clock: Rc::clone(&ctx.clock),
            notifications,
            scoreboard,
            options,
            state: RefCell::new(RenderState {
                attached: true,
                ..RenderState::default()
            }),
            subscriptions: RefCell::new(Subscriptions::new(Rc::clone(&ctx.bus))),
        });

        let mut listeners = Vec::new();
        for kind in [
            TimerEventKind::Tick,
            TimerEventKind::Drift,
            TimerEventKind::Expired,
        ] {
            let weak = Rc::downgrade(&inner);
            listeners.push(timer.on(kind, move |event| {
                if let Some(inner) = weak.upgrade() {
                    inner.on_timer_event(event);
                }
                Ok(())
            }));
        }
        let weak = Rc::downgrade(&inner);
        let stop_listener = timer.on_stop(move |remaining| {
            if let Some(inner) = weak.upgrade() {
                inner.on_stopped(remaining);
            }
            Ok(())
        });
        {
            let mut state = inner.state.borrow_mut();
            state.timer_listeners = listeners;
            state.stop_listener = Some(stop_listener);
        }

        let weak: Weak<Inner> = Rc::downgrade(&inner);
        inner.subscriptions.borrow_mut().subscribe(
            BattleEventKind::PromptShown,
            Box::new(move |event| {
                if let (Some(inner), BattleEvent::PromptShown { min_visible }) =
                    (weak.upgrade(), event)
                {
                    let window = if min_visible.is_zero() {
                        inner.options.suppress_window
                    } else {
                        *min_visible
                    };
                    inner.suppress_for(window);
                }
                Ok(())
            }),
        );

        tracing::debug!("renderer attached");
        Self { inner }
    }

    /// Hold back visual updates for `window` from now.
    pub fn suppress_for(&self, window: Duration) {
        self.inner.suppress_for(window);
    }

    pub fn is_suppressed(&self) -> bool {
        let now = self.inner.clock.now();
        self.inner
            .state
            .borrow()
            .suppressed_until
            .is_some_and(|until| now < until)
    }

    pub fn is_attached(&self) -> bool {
        self.inner.state.borrow().attached
    }

    /// Remove every listener and the countdown notification. Idempotent.
    pub fn detach(&self) {
        self.inner.detach();
    }
}

impl Drop for RendererAdapter {
    fn drop(&mut self) {
        self.inner.detach();
    }
}

impl fmt::Debug for RendererAdapter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let state = self.inner.state.borrow();
        f.debug_struct("RendererAdapter")
            .field("attached", &state.attached)
            .field("suppressed_until", &state.suppressed_until)
            .finish_non_exhaustive()
    }
}

impl Inner {
    fn on_timer_event(&self, event: &TimerEvent) {
        if !self.state.borrow().attached {
            return;
        }
        match *event {
            TimerEvent::Tick(remaining) => self.on_tick(remaining),
            TimerEvent::Drift(remaining) => {
                self.bus.emit(&BattleEvent::CountdownDrift { remaining });
            }
            TimerEvent::Expired => self.on_expired(),
        }
    }

    fn on_tick(&self, remaining: u32) {
        let now = self.clock.now();
        let visible = {
            let mut state = self.state.borrow_mut();
            let suppressed = state.suppressed_until.is_some_and(|until| now < until);
            if !state.rendered_once || !suppressed {
                state.rendered_once = true;
                true
            } else {
                false
            }
        };

        if visible {
            self.render(remaining);
        } else {
            tracing::trace!(remaining, "countdown render suppressed");
        }
        self.bus.emit(&BattleEvent::CountdownTick { remaining });
    }

    fn render(&self, remaining: u32) {
        if let Some(scoreboard) = &self.scoreboard {
            if let Err(err) = scoreboard.show_countdown(remaining) {
                tracing::warn!(error = %err, remaining, "scoreboard update failed");
            }
        }

        let Some(manager) = &self.notifications else {
            return;
        };
        let text = (self.options.formatter)(remaining);
        let existing = self.state.borrow().notification.clone();
        match existing {
            Some(handle) if handle.update(text.clone()) => {}
            _ => {
                let handle = manager.show(
                    NotificationConfig::new(text)
                        .priority(self.options.priority)
                        .auto_dismiss_ms(0),
                );
                self.state.borrow_mut().notification = handle;
            }
        }
    }

    fn on_expired(&self) {
        self.end_run();
        self.bus.emit(&BattleEvent::CountdownFinished);
    }

    fn on_stopped(&self, remaining: u32) {
        if !self.state.borrow().attached {
            return;
        }
        tracing::debug!(remaining, "countdown stopped before expiry");
        self.end_run();
    }

    fn end_run(&self) {
        let handle = {
            let mut state = self.state.borrow_mut();
            state.rendered_once = false;
            state.notification.take()
        };

        if let Some(scoreboard) = &self.scoreboard {
            if let Err(err) = scoreboard.clear_countdown() {
                tracing::warn!(error = %err, "scoreboard clear failed");
            }
        }
        if let Some(handle) = handle {
            drop(handle.remove());
        }
    }

    fn suppress_for(&self, window: Duration) {
        if window.is_zero() {
            return;
        }
        let until = self.clock.now() + window;
        let mut state = self.state.borrow_mut();
        state.suppressed_until = Some(state.suppressed_until.map_or(until, |u| u.max(until)));
        tracing::trace!(window_ms = window.as_millis() as u64, "countdown suppressed");
    }

    fn detach(&self) {
        let (listeners, stop_listener, handle) = {
            let mut state = self.state.borrow_mut();
            if !state.attached {
                return;
            }
            state.attached = false;
            (
                std::mem::take(&mut state.timer_listeners),
                state.stop_listener.take(),
                state.notification.take(),
            )
        };

        for id in listeners {
            self.timer.off(id);
        }
        if let Some(id) = stop_listener {
            self.timer.off_stop(id);
        }
        self.subscriptions.borrow_mut().clear();
        if let Some(handle) = handle {
            drop(handle.remove());
        }
        tracing::debug!("renderer detached");
    }
}
