//! External ("engine") time sources
//!
//! A host engine can drive the countdown instead of the scheduler. The timer
//! hands the source a [`TickSink`](super::TickSink) bound to the current run;
//! signals delivered through a sink from a superseded run are ignored.

use super::{TickSink, TickSourceError};

pub trait TickSource {
    /// Begin counting down from `remaining`, reporting through `sink`.
    fn start(&self, remaining: u32, sink: TickSink) -> Result<(), TickSourceError>;

    /// Stop reporting. Called on pause, stop, expiry and before every restart.
    fn stop(&self);
}
