//! Battle events
//!
//! - **Signals**: the closed set of battle-flow broadcasts
//! - **Listeners**: ordered, failure-isolated handler registry
//! - **Bus**: injected pub/sub used for readiness, tick and prompt signals

mod bus;
pub mod listeners;
mod signal;

pub use bus::{EventBus, InMemoryEventBus, Subscriptions};
pub use listeners::{Handler, HandlerError, HandlerResult, ListenerId, Listeners};
pub use signal::{BattleEvent, BattleEventKind, BattleState};
