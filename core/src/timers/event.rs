use std::fmt;
use std::str::FromStr;

use super::TimerError;

/// Countdown lifecycle state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TimerState {
    Idle,
    Running,
    Paused,
    Expired,
}

/// Event emitted by a [`CountdownTimer`](super::CountdownTimer).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TimerEvent {
    /// Whole units remaining
    Tick(u32),
    /// The time source went out of step; carries the preserved remaining value
    Drift(u32),
    Expired,
}

/// Subscription key for [`TimerEvent`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TimerEventKind {
    Tick,
    Expired,
    Drift,
}

impl TimerEvent {
    pub fn kind(&self) -> TimerEventKind {
        match self {
            TimerEvent::Tick(_) => TimerEventKind::Tick,
            TimerEvent::Drift(_) => TimerEventKind::Drift,
            TimerEvent::Expired => TimerEventKind::Expired,
        }
    }
}

impl TimerEventKind {
    pub fn as_str(self) -> &'static str {
        match self {
            TimerEventKind::Tick => "tick",
            TimerEventKind::Expired => "expired",
            TimerEventKind::Drift => "drift",
        }
    }
}

impl fmt::Display for TimerEventKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for TimerEventKind {
    type Err = TimerError;

    fn from_str(name: &str) -> Result<Self, Self::Err> {
        match name {
            "tick" => Ok(TimerEventKind::Tick),
            "expired" => Ok(TimerEventKind::Expired),
            "drift" => Ok(TimerEventKind::Drift),
            other => Err(TimerError::UnknownEvent {
                name: other.to_string(),
            }),
        }
    }
}
