//! Host collaborator contracts
//!
//! Narrow adapters for the parts of the host environment that may or may not
//! exist (a battle state machine, an opponent-turn timestamp, global flags).

use std::cell::Cell;
use std::rc::Rc;
use std::time::Duration;

use thiserror::Error;

use crate::events::BattleState;

/// Commands the cooldown orchestrator sends to the battle machine.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MachineEvent {
    /// The next round may begin
    Ready,
}

/// The machine rejected a dispatched event (e.g. a gating check failed).
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("machine refused {event:?} in state {state:?}")]
pub struct DispatchRefused {
    pub event: MachineEvent,
    pub state: BattleState,
}

/// Handle to an external battle state machine.
pub trait Machine {
    fn state(&self) -> BattleState;

    fn dispatch(&self, event: MachineEvent) -> Result<(), DispatchRefused>;
}

/// Looks up the machine handle, if the host registered one.
pub trait MachineProbe {
    fn probe(&self) -> Option<Rc<dyn Machine>>;
}

/// Probe that always returns the same handle.
pub struct FixedMachine(pub Rc<dyn Machine>);

impl MachineProbe for FixedMachine {
    fn probe(&self) -> Option<Rc<dyn Machine>> {
        Some(Rc::clone(&self.0))
    }
}

/// Source of the "opponent's turn visibly started" timestamp.
///
/// `None` means not yet available.
pub trait TimestampSource {
    fn timestamp(&self) -> Option<Duration>;
}

/// Timestamp slot the host writes into.
#[derive(Debug, Clone, Default)]
pub struct SharedTimestamp(Rc<Cell<Option<Duration>>>);

impl SharedTimestamp {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set(&self, at: Duration) {
        self.0.set(Some(at));
    }

    pub fn reset(&self) {
        self.0.set(None);
    }
}

impl TimestampSource for SharedTimestamp {
    fn timestamp(&self) -> Option<Duration> {
        self.0.get()
    }
}

/// Environment-level switches owned by the host.
#[derive(Debug, Clone, Default)]
pub struct HostFlags {
    notifications_suppressed: Rc<Cell<bool>>,
}

impl HostFlags {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn notifications_suppressed(&self) -> bool {
        self.notifications_suppressed.get()
    }

    pub fn set_notifications_suppressed(&self, suppressed: bool) {
        self.notifications_suppressed.set(suppressed);
    }
}
