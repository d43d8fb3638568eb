//! Error types for timer operations

use thiserror::Error;

/// Errors raised at the countdown timer's call boundary
#[derive(Debug, Clone, PartialEq, Error)]
pub enum TimerError {
    /// NaN or infinite duration (a type-class error)
    #[error("countdown duration must be a finite number, got {duration}")]
    NonFiniteDuration { duration: f64 },

    /// Negative or unrepresentably large duration (a range-class error)
    #[error("countdown duration {duration} is out of range")]
    DurationOutOfRange { duration: f64 },

    #[error("unknown timer event '{name}' (expected tick, expired or drift)")]
    UnknownEvent { name: String },

    #[error("timer has been disposed")]
    Disposed,
}

/// Raised by a [`TickSource`](super::TickSource) that cannot (re)start.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("tick source failed to start: {reason}")]
pub struct TickSourceError {
    pub reason: String,
}

impl TickSourceError {
    pub fn new(reason: impl Into<String>) -> Self {
        Self {
            reason: reason.into(),
        }
    }
}
