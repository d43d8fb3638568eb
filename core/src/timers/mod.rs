//! Countdown timer engine
//!
//! This module provides:
//! - **Countdown**: tick/expire/drift state machine with pause and resume
//! - **Sources**: optional engine-driven time source with bounded drift recovery
//! - **Events**: closed set of timer events and their subscription keys
//!
//! Without a tick source the countdown is driven by the context scheduler,
//! one tick per `tick_interval`.

mod countdown;
mod error;
mod event;
mod source;

#[cfg(test)]
mod countdown_tests;

pub use countdown::{CountdownTimer, DriftFailHandler, TickSink, TimerOptions};
pub use error::{TickSourceError, TimerError};
pub use event::{TimerEvent, TimerEventKind, TimerState};
pub use source::TickSource;
