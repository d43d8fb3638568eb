//! Countdown rendering
//!
//! Bridges timer events to the visible countdown: a scoreboard slot, the
//! notification stack and bus broadcasts for other listeners.

mod adapter;

pub use adapter::{CountdownFormatter, RendererAdapter, RendererOptions};

use crate::notifications::SurfaceError;

/// Host element that shows the round countdown.
pub trait Scoreboard {
    fn show_countdown(&self, remaining: u32) -> Result<(), SurfaceError>;

    fn clear_countdown(&self) -> Result<(), SurfaceError>;
}
