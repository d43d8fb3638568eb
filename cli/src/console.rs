//! Terminal stand-ins for the host: a notification surface and scoreboard
//! that print, and a battle machine that accepts every dispatch.

use std::cell::Cell;
use std::rc::Rc;

use tempo_core::Clock;
use tempo_core::context::{DispatchRefused, Machine, MachineEvent};
use tempo_core::events::BattleState;
use tempo_core::notifications::{
    NotificationId, NotificationSurface, NotificationView, Slot, SurfaceError,
};
use tempo_core::renderer::Scoreboard;

fn stamp(clock: &dyn Clock) -> String {
    format!("[{:>7.3}s]", clock.now().as_secs_f64())
}

pub struct ConsoleSurface {
    clock: Rc<dyn Clock>,
}

impl ConsoleSurface {
    pub fn new(clock: Rc<dyn Clock>) -> Self {
        Self { clock }
    }
}

impl NotificationSurface for ConsoleSurface {
    fn attach(&self, view: &NotificationView) -> Result<(), SurfaceError> {
        println!(
            "{} + {} ({:?}) {}",
            stamp(&*self.clock),
            view.id,
            view.priority,
            view.message
        );
        Ok(())
    }

    fn detach(&self, id: NotificationId) -> Result<(), SurfaceError> {
        println!("{} - {}", stamp(&*self.clock), id);
        Ok(())
    }

    fn set_message(&self, id: NotificationId, message: &str) -> Result<(), SurfaceError> {
        println!("{} ~ {} {}", stamp(&*self.clock), id, message);
        Ok(())
    }

    fn layout(&self, order: &[(NotificationId, Slot)]) -> Result<(), SurfaceError> {
        let ids: Vec<String> = order.iter().map(|(id, _)| id.to_string()).collect();
        tracing::debug!(order = %ids.join(" "), "notification layout");
        Ok(())
    }
}

pub struct ConsoleScoreboard {
    clock: Rc<dyn Clock>,
}

impl ConsoleScoreboard {
    pub fn new(clock: Rc<dyn Clock>) -> Self {
        Self { clock }
    }
}

impl Scoreboard for ConsoleScoreboard {
    fn show_countdown(&self, remaining: u32) -> Result<(), SurfaceError> {
        println!("{} countdown {}", stamp(&*self.clock), remaining);
        Ok(())
    }

    fn clear_countdown(&self) -> Result<(), SurfaceError> {
        println!("{} countdown cleared", stamp(&*self.clock));
        Ok(())
    }
}

/// Machine that sits in `Cooldown` and moves to `RoundStart` on `Ready`.
pub struct ConsoleMachine {
    state: Cell<BattleState>,
}

impl ConsoleMachine {
    pub fn new() -> Self {
        Self {
            state: Cell::new(BattleState::Cooldown),
        }
    }
}

impl Default for ConsoleMachine {
    fn default() -> Self {
        Self::new()
    }
}

impl Machine for ConsoleMachine {
    fn state(&self) -> BattleState {
        self.state.get()
    }

    fn dispatch(&self, event: MachineEvent) -> Result<(), DispatchRefused> {
        let state = self.state.get();
        if state != BattleState::Cooldown {
            return Err(DispatchRefused { event, state });
        }
        tracing::info!(?event, "machine accepted dispatch");
        self.state.set(BattleState::RoundStart);
        Ok(())
    }
}
