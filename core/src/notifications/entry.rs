//! Notification values
//!
//! A notification is either active (on screen) or queued, never both. The
//! `sequence` number is assigned once at creation, strictly increases, and is
//! the only tie-break used for ordering and eviction.

use std::fmt;
use std::time::Duration;

use serde::Serialize;
use tokio::sync::oneshot;

use crate::events::HandlerResult;
use crate::scheduler::TimeoutSlot;

/// Callback fired when a notification is shown or dismissed.
pub type NotificationCallback = Box<dyn FnOnce(NotificationId) -> HandlerResult>;

/// Importance of a notification. Ordered `Low < Normal < High`.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Priority {
    Low,
    #[default]
    Normal,
    High,
}

/// Opaque notification identifier, unique per manager.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
#[serde(transparent)]
pub struct NotificationId(pub u64);

impl fmt::Display for NotificationId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// Input to [`NotificationManager::show`](super::NotificationManager::show).
pub struct NotificationConfig {
    pub message: String,
    pub priority: Priority,
    /// Shortest time the notification stays visible once shown
    pub min_duration: Duration,
    /// `None` uses the configured default; `Some(Duration::ZERO)` disables
    pub auto_dismiss: Option<Duration>,
    pub on_show: Option<NotificationCallback>,
    pub on_dismiss: Option<NotificationCallback>,
}

impl NotificationConfig {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            priority: Priority::Normal,
            min_duration: Duration::ZERO,
            auto_dismiss: None,
            on_show: None,
            on_dismiss: None,
        }
    }

    pub fn priority(mut self, priority: Priority) -> Self {
        self.priority = priority;
        self
    }

    pub fn min_duration_ms(mut self, ms: u64) -> Self {
        self.min_duration = Duration::from_millis(ms);
        self
    }

    /// `0` keeps the notification until it is removed explicitly.
    pub fn auto_dismiss_ms(mut self, ms: u64) -> Self {
        self.auto_dismiss = Some(Duration::from_millis(ms));
        self
    }

    pub fn on_show(mut self, callback: impl FnOnce(NotificationId) -> HandlerResult + 'static) -> Self {
        self.on_show = Some(Box::new(callback));
        self
    }

    pub fn on_dismiss(
        mut self,
        callback: impl FnOnce(NotificationId) -> HandlerResult + 'static,
    ) -> Self {
        self.on_dismiss = Some(Box::new(callback));
        self
    }
}

impl fmt::Debug for NotificationConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("NotificationConfig")
            .field("message", &self.message)
            .field("priority", &self.priority)
            .field("min_duration", &self.min_duration)
            .field("auto_dismiss", &self.auto_dismiss)
            .finish_non_exhaustive()
    }
}

/// Managed notification state.
pub(super) struct Entry {
    pub id: NotificationId,
    pub message: String,
    pub priority: Priority,
    pub sequence: u64,
    pub min_duration: Duration,
    pub auto_dismiss: Duration,
    /// Set on admission and on every update while active
    pub shown_at: Option<Duration>,
    pub dismiss_timer: TimeoutSlot,
    pub removal_timer: TimeoutSlot,
    /// Fires when the minimum duration ends, for `min_waiters`
    pub min_timer: TimeoutSlot,
    pub on_show: Option<NotificationCallback>,
    pub on_dismiss: Option<NotificationCallback>,
    /// Completed when the notification leaves the active set
    pub waiters: Vec<oneshot::Sender<()>>,
    /// Completed when the minimum duration ends or the notification leaves
    pub min_waiters: Vec<oneshot::Sender<()>>,
}

impl Entry {
    /// Eviction and ordering key: higher compares greater.
    pub fn rank(&self) -> (Priority, u64) {
        (self.priority, self.sequence)
    }

    /// Time left before the minimum visible duration is satisfied.
    pub fn min_duration_left(&self, now: Duration) -> Duration {
        match self.shown_at {
            Some(shown_at) => self
                .min_duration
                .saturating_sub(now.saturating_sub(shown_at)),
            None => Duration::ZERO,
        }
    }

    pub fn removal_pending(&self) -> bool {
        self.removal_timer.is_set()
    }
}
