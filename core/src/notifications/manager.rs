//! Priority notification manager
//!
//! Owns the active set and the queue. State changes happen under a single
//! borrow and produce a list of [`Effect`]s (surface calls, user callbacks,
//! waiter completions) that run only after the borrow is released, so a
//! callback may call back into the manager.
//!
//! # Admission
//!
//! 1. Empty active set: admit.
//! 2. Lower priority than the highest active item: queue, even under capacity.
//! 3. Otherwise admit, first evicting the lowest-priority, oldest active item
//!    when at capacity. Eviction skips the minimum-duration wait.

use std::cell::RefCell;
use std::collections::VecDeque;
use std::fmt;
use std::future::Future;
use std::rc::{Rc, Weak};
use std::time::Duration;

use serde::Serialize;
use tokio::sync::oneshot;

use crate::context::{BattleContext, HostFlags};
use crate::scheduler::{Clock, Scheduler, TimeoutSlot};

use super::entry::{Entry, NotificationCallback};
use super::{
    NotificationConfig, NotificationId, NotificationSurface, NotificationView, Priority, Slot,
};

enum Effect {
    Attach(NotificationView),
    Detach(NotificationId),
    SetMessage(NotificationId, String),
    /// Re-layout from the state current when the effect runs
    Layout,
    Callback {
        hook: &'static str,
        id: NotificationId,
        callback: NotificationCallback,
    },
    Resolve(Vec<oneshot::Sender<()>>),
}

struct State {
    active: Vec<Entry>,
    /// Creation order
    queue: VecDeque<Entry>,
    enabled: bool,
    next_sequence: u64,
}

impl State {
    fn top_priority(&self) -> Option<Priority> {
        self.active.iter().map(|entry| entry.priority).max()
    }

    fn admits(&self, priority: Priority) -> bool {
        self.top_priority().is_none_or(|top| priority >= top)
    }

    /// Highest priority first, oldest first among equals.
    fn next_queued(&self) -> Option<usize> {
        self.queue
            .iter()
            .enumerate()
            .max_by(|(_, a), (_, b)| {
                a.priority
                    .cmp(&b.priority)
                    .then(b.sequence.cmp(&a.sequence))
            })
            .map(|(index, _)| index)
    }

    /// Active items by (priority desc, sequence desc).
    fn ordered(&self) -> Vec<&Entry> {
        let mut order: Vec<&Entry> = self.active.iter().collect();
        order.sort_by_key(|entry| std::cmp::Reverse(entry.rank()));
        order
    }

    fn layout(&self) -> Vec<(NotificationId, Slot)> {
        self.ordered()
            .into_iter()
            .enumerate()
            .map(|(index, entry)| (entry.id, slot_at(index)))
            .collect()
    }

    fn active_mut(&mut self, id: NotificationId) -> Option<&mut Entry> {
        self.active.iter_mut().find(|entry| entry.id == id)
    }
}

fn slot_at(index: usize) -> Slot {
    if index == 0 {
        Slot::Primary
    } else {
        Slot::Secondary
    }
}

fn millis(duration: Duration) -> u64 {
    u64::try_from(duration.as_millis()).unwrap_or(u64::MAX)
}

struct Inner {
    state: RefCell<State>,
    scheduler: Rc<dyn Scheduler>,
    clock: Rc<dyn Clock>,
    flags: HostFlags,
    surface: Rc<dyn NotificationSurface>,
    max_concurrent: usize,
    default_auto_dismiss: Duration,
}

/// Capacity-bounded, priority-ordered stack of transient messages.
///
/// Cloning shares the same manager.
#[derive(Clone)]
pub struct NotificationManager {
    inner: Rc<Inner>,
}

/// Returned by [`NotificationManager::show`].
#[derive(Clone)]
pub struct NotificationHandle {
    id: NotificationId,
    manager: NotificationManager,
}

impl NotificationHandle {
    pub fn id(&self) -> NotificationId {
        self.id
    }

    /// See [`NotificationManager::remove`].
    pub fn remove(&self) -> impl Future<Output = ()> + 'static {
        self.manager.remove(self.id)
    }

    pub fn update(&self, message: impl Into<String>) -> bool {
        self.manager.update(self.id, message)
    }

    pub fn wait_for_min_duration(&self) -> impl Future<Output = ()> + 'static {
        self.manager.wait_for_min_duration(self.id)
    }

    pub fn is_active(&self) -> bool {
        self.manager.is_active(self.id)
    }
}

impl fmt::Debug for NotificationHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("NotificationHandle").field("id", &self.id).finish()
    }
}

/// One notification in a [`NotificationDiagnostics`] snapshot.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct NotificationSnapshot {
    pub id: NotificationId,
    pub message: String,
    pub priority: Priority,
    pub sequence: u64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub slot: Option<Slot>,
    pub min_duration_ms: u64,
    pub auto_dismiss_ms: u64,
    pub removal_pending: bool,
}

/// Point-in-time view of the manager for debugging overlays and logs.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct NotificationDiagnostics {
    pub enabled: bool,
    pub host_suppressed: bool,
    pub max_concurrent: usize,
    pub next_sequence: u64,
    /// Layout order
    pub active: Vec<NotificationSnapshot>,
    /// Creation order
    pub queued: Vec<NotificationSnapshot>,
}

impl NotificationManager {
    pub fn new(ctx: &BattleContext, surface: Rc<dyn NotificationSurface>) -> Self {
        let settings = &ctx.config.notifications;
        Self {
            inner: Rc::new(Inner {
                state: RefCell::new(State {
                    active: Vec::new(),
                    queue: VecDeque::new(),
                    enabled: settings.enabled,
                    next_sequence: 0,
                }),
                scheduler: Rc::clone(&ctx.scheduler),
                clock: Rc::clone(&ctx.clock),
                flags: ctx.flags.clone(),
                surface,
                max_concurrent: settings.max_concurrent.max(1),
                default_auto_dismiss: Duration::from_millis(settings.default_auto_dismiss_ms),
            }),
        }
    }

    // ─── Public API ─────────────────────────────────────────────────────────

    /// Show or queue a notification.
    ///
    /// Returns `None` without side effects while notifications are disabled
    /// on the manager or suppressed by the host.
    pub fn show(&self, config: NotificationConfig) -> Option<NotificationHandle> {
        if self.inner.flags.notifications_suppressed() {
            tracing::trace!("notification suppressed by host");
            return None;
        }

        let mut effects = Vec::new();
        let id = {
            let mut state = self.inner.state.borrow_mut();
            if !state.enabled {
                return None;
            }
            let sequence = state.next_sequence;
            state.next_sequence += 1;
            let id = NotificationId(sequence);

            let entry = Entry {
                id,
                message: config.message,
                priority: config.priority,
                sequence,
                min_duration: config.min_duration,
                auto_dismiss: config.auto_dismiss.unwrap_or(self.inner.default_auto_dismiss),
                shown_at: None,
                dismiss_timer: TimeoutSlot::default(),
                removal_timer: TimeoutSlot::default(),
                min_timer: TimeoutSlot::default(),
                on_show: config.on_show,
                on_dismiss: config.on_dismiss,
                waiters: Vec::new(),
                min_waiters: Vec::new(),
            };

            if state.admits(entry.priority) {
                self.admit(&mut state, entry, &mut effects);
                effects.push(Effect::Layout);
            } else {
                tracing::debug!(%id, priority = ?entry.priority, "notification queued");
                state.queue.push_back(entry);
            }
            id
        };

        self.apply(effects);
        Some(NotificationHandle {
            id,
            manager: self.clone(),
        })
    }

    /// Remove a notification once its minimum duration has passed.
    ///
    /// Queued notifications are dropped immediately. The returned future
    /// completes when the notification has left the active set; the removal
    /// itself is scheduled whether or not the future is polled.
    pub fn remove(&self, id: NotificationId) -> impl Future<Output = ()> + 'static {
        let receiver = self.begin_removal(id);
        async move {
            if let Some(receiver) = receiver {
                let _ = receiver.await;
            }
        }
    }

    /// Change the message of an active or queued notification.
    ///
    /// For an active notification this restarts the minimum-duration and
    /// auto-dismiss windows; a pending removal and pending
    /// [`wait_for_min_duration`](Self::wait_for_min_duration) futures move
    /// to the new end of the window. Returns `false` for unknown ids.
    pub fn update(&self, id: NotificationId, message: impl Into<String>) -> bool {
        let message = message.into();
        let now = self.inner.clock.now();
        let mut effects = Vec::new();

        let found = {
            let mut state = self.inner.state.borrow_mut();
            if let Some(entry) = state.active_mut(id) {
                entry.message = message.clone();
                entry.shown_at = Some(now);
                self.arm_auto_dismiss(entry);
                let wait = entry.min_duration_left(now);
                if entry.removal_pending() {
                    self.schedule_removal(entry, wait);
                }
                if entry.min_timer.is_set() {
                    self.schedule_min_wait(entry, wait);
                }
                effects.push(Effect::SetMessage(id, message));
                true
            } else if let Some(entry) = state.queue.iter_mut().find(|entry| entry.id == id) {
                entry.message = message;
                true
            } else {
                false
            }
        };

        self.apply(effects);
        found
    }

    /// Completes once the notification's minimum duration has passed,
    /// without removing it. Completes immediately for queued or unknown ids.
    pub fn wait_for_min_duration(&self, id: NotificationId) -> impl Future<Output = ()> + 'static {
        let now = self.inner.clock.now();
        let (tx, rx) = oneshot::channel();
        {
            let mut state = self.inner.state.borrow_mut();
            match state.active_mut(id) {
                Some(entry) if !entry.min_duration_left(now).is_zero() => {
                    entry.min_waiters.push(tx);
                    if !entry.min_timer.is_set() {
                        let wait = entry.min_duration_left(now);
                        self.schedule_min_wait(entry, wait);
                    }
                }
                _ => {
                    let _ = tx.send(());
                }
            }
        }
        async move {
            let _ = rx.await;
        }
    }

    /// Drop the queue and remove every active notification, each after its
    /// own minimum duration.
    pub fn remove_all(&self) -> impl Future<Output = ()> + 'static {
        let ids: Vec<NotificationId> = {
            let mut state = self.inner.state.borrow_mut();
            state.queue.clear();
            state.active.iter().map(|entry| entry.id).collect()
        };
        tracing::debug!(count = ids.len(), "removing all notifications");

        let receivers: Vec<_> = ids
            .into_iter()
            .filter_map(|id| self.begin_removal(id))
            .collect();
        async move {
            for receiver in receivers {
                let _ = receiver.await;
            }
        }
    }

    /// Hard reset: cancel every timer, detach everything and empty both
    /// collections. Dismiss callbacks still run.
    pub fn clear_all(&self) {
        let mut effects = Vec::new();
        {
            let mut state = self.inner.state.borrow_mut();
            state.queue.clear();
            let active = std::mem::take(&mut state.active);
            if active.is_empty() {
                return;
            }
            for entry in active {
                self.retire(entry, &mut effects);
            }
            effects.push(Effect::Layout);
        }
        tracing::debug!("notifications cleared");
        self.apply(effects);
    }

    pub fn set_enabled(&self, enabled: bool) {
        self.inner.state.borrow_mut().enabled = enabled;
    }

    pub fn is_enabled(&self) -> bool {
        self.inner.state.borrow().enabled
    }

    // ─── Queries ────────────────────────────────────────────────────────────

    pub fn is_active(&self, id: NotificationId) -> bool {
        self.inner.state.borrow().active.iter().any(|e| e.id == id)
    }

    pub fn is_queued(&self, id: NotificationId) -> bool {
        self.inner.state.borrow().queue.iter().any(|e| e.id == id)
    }

    pub fn active_count(&self) -> usize {
        self.inner.state.borrow().active.len()
    }

    pub fn queued_count(&self) -> usize {
        self.inner.state.borrow().queue.len()
    }

    /// Active ids in layout order (primary first).
    pub fn active_ids(&self) -> Vec<NotificationId> {
        let state = self.inner.state.borrow();
        state.ordered().into_iter().map(|entry| entry.id).collect()
    }

    pub fn slot_of(&self, id: NotificationId) -> Option<Slot> {
        self.active_ids()
            .iter()
            .position(|active| *active == id)
            .map(slot_at)
    }

    pub fn message(&self, id: NotificationId) -> Option<String> {
        let state = self.inner.state.borrow();
        state
            .active
            .iter()
            .chain(state.queue.iter())
            .find(|entry| entry.id == id)
            .map(|entry| entry.message.clone())
    }

    pub fn diagnostics(&self) -> NotificationDiagnostics {
        let state = self.inner.state.borrow();
        let snapshot = |entry: &Entry, slot: Option<Slot>| NotificationSnapshot {
            id: entry.id,
            message: entry.message.clone(),
            priority: entry.priority,
            sequence: entry.sequence,
            slot,
            min_duration_ms: millis(entry.min_duration),
            auto_dismiss_ms: millis(entry.auto_dismiss),
            removal_pending: entry.removal_pending(),
        };

        NotificationDiagnostics {
            enabled: state.enabled,
            host_suppressed: self.inner.flags.notifications_suppressed(),
            max_concurrent: self.inner.max_concurrent,
            next_sequence: state.next_sequence,
            active: state
                .ordered()
                .into_iter()
                .enumerate()
                .map(|(index, entry)| snapshot(entry, Some(slot_at(index))))
                .collect(),
            queued: state.queue.iter().map(|entry| snapshot(entry, None)).collect(),
        }
    }

    // ─── Internals ──────────────────────────────────────────────────────────

    /// Move `entry` into the active set, evicting first when at capacity.
    fn admit(&self, state: &mut State, mut entry: Entry, effects: &mut Vec<Effect>) {
        if state.active.len() >= self.inner.max_concurrent {
            let victim = state
                .active
                .iter()
                .enumerate()
                .min_by_key(|(_, active)| active.rank())
                .map(|(index, _)| index);
            if let Some(index) = victim {
                let evicted = state.active.remove(index);
                tracing::debug!(id = %evicted.id, by = %entry.id, "notification evicted");
                self.retire(evicted, effects);
            }
        }

        entry.shown_at = Some(self.inner.clock.now());
        self.arm_auto_dismiss(&mut entry);
        tracing::debug!(id = %entry.id, priority = ?entry.priority, "notification shown");

        effects.push(Effect::Attach(NotificationView {
            id: entry.id,
            message: entry.message.clone(),
            priority: entry.priority,
        }));
        if let Some(callback) = entry.on_show.take() {
            effects.push(Effect::Callback {
                hook: "on_show",
                id: entry.id,
                callback,
            });
        }
        state.active.push(entry);
    }

    /// Tear down an entry that already left the active set.
    fn retire(&self, mut entry: Entry, effects: &mut Vec<Effect>) {
        let scheduler = &*self.inner.scheduler;
        entry.dismiss_timer.cancel(scheduler);
        entry.removal_timer.cancel(scheduler);
        entry.min_timer.cancel(scheduler);

        effects.push(Effect::Detach(entry.id));
        if let Some(callback) = entry.on_dismiss.take() {
            effects.push(Effect::Callback {
                hook: "on_dismiss",
                id: entry.id,
                callback,
            });
        }
        let mut waiters = std::mem::take(&mut entry.waiters);
        waiters.append(&mut entry.min_waiters);
        effects.push(Effect::Resolve(waiters));
    }

    /// Admit queued items until capacity or the first inadmissible one.
    fn drain(&self, state: &mut State, effects: &mut Vec<Effect>) {
        while state.active.len() < self.inner.max_concurrent {
            let Some(index) = state.next_queued() else {
                break;
            };
            if !state.admits(state.queue[index].priority) {
                break;
            }
            let Some(entry) = state.queue.remove(index) else {
                break;
            };
            self.admit(state, entry, effects);
        }
    }

    fn arm_auto_dismiss(&self, entry: &mut Entry) {
        let scheduler = &*self.inner.scheduler;
        if entry.auto_dismiss.is_zero() {
            entry.dismiss_timer.cancel(scheduler);
            return;
        }

        let weak = Rc::downgrade(&self.inner);
        let id = entry.id;
        let timeout = scheduler.set_timeout(
            entry.auto_dismiss,
            Box::new(move || {
                if let Some(manager) = upgrade(&weak) {
                    manager.on_auto_dismiss(id);
                }
            }),
        );
        entry.dismiss_timer.set(scheduler, timeout);
    }

    fn on_auto_dismiss(&self, id: NotificationId) {
        if let Some(entry) = self.inner.state.borrow_mut().active_mut(id) {
            entry.dismiss_timer.forget();
        }
        tracing::trace!(%id, "notification auto-dismissed");
        drop(self.begin_removal(id));
    }

    /// Start removing `id`. Returns a receiver completed when it leaves the
    /// active set, or `None` if there is nothing to wait for.
    fn begin_removal(&self, id: NotificationId) -> Option<oneshot::Receiver<()>> {
        let now = self.inner.clock.now();
        let (receiver, finish_now) = {
            let mut state = self.inner.state.borrow_mut();
            if let Some(index) = state.queue.iter().position(|entry| entry.id == id) {
                drop(state.queue.remove(index));
                tracing::debug!(%id, "queued notification dropped");
                return None;
            }
            let entry = state.active_mut(id)?;

            let (tx, rx) = oneshot::channel();
            entry.waiters.push(tx);
            if entry.removal_pending() {
                (rx, false)
            } else {
                let wait = entry.min_duration_left(now);
                if wait.is_zero() {
                    (rx, true)
                } else {
                    self.schedule_removal(entry, wait);
                    (rx, false)
                }
            }
        };

        if finish_now {
            self.finish_removal(id);
        }
        Some(receiver)
    }

    /// (Re)arm the deferred removal of an active entry.
    fn schedule_removal(&self, entry: &mut Entry, wait: Duration) {
        let weak = Rc::downgrade(&self.inner);
        let scheduler = &*self.inner.scheduler;
        let id = entry.id;
        let timeout = scheduler.set_timeout(
            wait,
            Box::new(move || {
                if let Some(manager) = upgrade(&weak) {
                    manager.finish_removal(id);
                }
            }),
        );
        entry.removal_timer.set(scheduler, timeout);
        tracing::trace!(%id, wait_ms = millis(wait), "removal deferred");
    }

    /// (Re)arm the timer that completes `min_waiters`.
    fn schedule_min_wait(&self, entry: &mut Entry, wait: Duration) {
        let weak = Rc::downgrade(&self.inner);
        let scheduler = &*self.inner.scheduler;
        let id = entry.id;
        let timeout = scheduler.set_timeout(
            wait,
            Box::new(move || {
                if let Some(manager) = upgrade(&weak) {
                    manager.on_min_duration(id);
                }
            }),
        );
        entry.min_timer.set(scheduler, timeout);
    }

    fn on_min_duration(&self, id: NotificationId) {
        let waiters = {
            let mut state = self.inner.state.borrow_mut();
            let Some(entry) = state.active_mut(id) else {
                return;
            };
            entry.min_timer.forget();
            std::mem::take(&mut entry.min_waiters)
        };
        self.apply(vec![Effect::Resolve(waiters)]);
    }

    fn finish_removal(&self, id: NotificationId) {
        let mut effects = Vec::new();
        {
            let mut state = self.inner.state.borrow_mut();
            let Some(index) = state.active.iter().position(|entry| entry.id == id) else {
                return;
            };
            let mut entry = state.active.remove(index);
            entry.removal_timer.forget();
            tracing::debug!(%id, "notification removed");

            self.retire(entry, &mut effects);
            self.drain(&mut state, &mut effects);
            effects.push(Effect::Layout);
        }
        self.apply(effects);
    }

    /// Run deferred side effects. Surface and callback failures are logged.
    fn apply(&self, effects: Vec<Effect>) {
        let surface = &*self.inner.surface;
        for effect in effects {
            let result = match effect {
                Effect::Attach(view) => surface.attach(&view),
                Effect::Detach(id) => surface.detach(id),
                Effect::SetMessage(id, message) => surface.set_message(id, &message),
                Effect::Layout => {
                    let order = self.inner.state.borrow().layout();
                    surface.layout(&order)
                }
                Effect::Callback { hook, id, callback } => {
                    if let Err(err) = callback(id) {
                        tracing::warn!(%id, hook, error = %err, "notification callback failed");
                    }
                    continue;
                }
                Effect::Resolve(waiters) => {
                    for waiter in waiters {
                        let _ = waiter.send(());
                    }
                    continue;
                }
            };
            if let Err(err) = result {
                tracing::warn!(error = %err, "notification surface call failed");
            }
        }
    }
}

fn upgrade(weak: &Weak<Inner>) -> Option<NotificationManager> {
    weak.upgrade().map(|inner| NotificationManager { inner })
}

impl fmt::Debug for NotificationManager {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let state = self.inner.state.borrow();
        f.debug_struct("NotificationManager")
            .field("active", &state.active.len())
            .field("queued", &state.queue.len())
            .field("enabled", &state.enabled)
            .finish()
    }
}
