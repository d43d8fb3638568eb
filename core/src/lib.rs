pub mod context;
pub mod cooldown;
pub mod events;
pub mod notifications;
pub mod prompt;
pub mod renderer;
pub mod scheduler;
pub mod timers;

#[cfg(test)]
mod testing;

// Re-exports for convenience
pub use context::{BattleContext, ConfigError, TempoConfig, TempoConfigExt};
pub use cooldown::{CooldownMode, CooldownOptions, CooldownSession, ReadySource, ReadyState};
pub use events::{BattleEvent, BattleEventKind, BattleState, EventBus, InMemoryEventBus};
pub use notifications::{
    NotificationConfig, NotificationHandle, NotificationId, NotificationManager,
    NotificationSurface, Priority,
};
pub use prompt::{PromptBudget, PromptSignal, PromptSynchronizer, compute_wait_budget};
pub use renderer::{RendererAdapter, RendererOptions, Scoreboard};
pub use scheduler::{Clock, ManualScheduler, Scheduler, SystemClock, TokioScheduler};
pub use timers::{CountdownTimer, TimerError, TimerEvent, TimerEventKind, TimerOptions, TimerState};
