//! Test doubles shared by the unit test modules

use std::cell::{Cell, RefCell};
use std::rc::Rc;

use crate::context::{DispatchRefused, Machine, MachineEvent};
use crate::events::{BattleEvent, BattleEventKind, BattleState, EventBus};
use crate::notifications::{NotificationId, NotificationSurface, NotificationView, Slot, SurfaceError};
use crate::renderer::Scoreboard;
use crate::timers::{CountdownTimer, TickSink, TickSource, TickSourceError, TimerEvent, TimerEventKind};

// ═══════════════════════════════════════════════════════════════════════════
// Timers
// ═══════════════════════════════════════════════════════════════════════════

/// Record every event a timer emits.
pub fn record_events(timer: &CountdownTimer) -> Rc<RefCell<Vec<TimerEvent>>> {
    let events = Rc::new(RefCell::new(Vec::new()));
    for kind in [TimerEventKind::Tick, TimerEventKind::Drift, TimerEventKind::Expired] {
        let events = events.clone();
        timer.on(kind, move |event| {
            events.borrow_mut().push(*event);
            Ok(())
        });
    }
    events
}

/// Engine stand-in: the test pushes ticks through the last sink it was given.
#[derive(Default)]
pub struct ScriptedTickSource {
    sink: RefCell<Option<TickSink>>,
    pub starts: RefCell<Vec<u32>>,
    pub stops: Cell<u32>,
    /// Number of upcoming `start` calls to refuse
    pub refuse_next: Cell<u32>,
}

impl ScriptedTickSource {
    pub fn new() -> Rc<Self> {
        Rc::new(Self::default())
    }

    pub fn sink(&self) -> TickSink {
        self.sink
            .borrow()
            .clone()
            .expect("tick source was never started")
    }

    pub fn tick(&self, remaining: u32) {
        self.sink().tick(remaining);
    }

    pub fn drift(&self) {
        self.sink().drift();
    }
}

impl TickSource for ScriptedTickSource {
    fn start(&self, remaining: u32, sink: TickSink) -> Result<(), TickSourceError> {
        self.starts.borrow_mut().push(remaining);
        if self.refuse_next.get() > 0 {
            self.refuse_next.set(self.refuse_next.get() - 1);
            return Err(TickSourceError::new("engine busy"));
        }
        *self.sink.borrow_mut() = Some(sink);
        Ok(())
    }

    fn stop(&self) {
        self.stops.set(self.stops.get() + 1);
    }
}

// ═══════════════════════════════════════════════════════════════════════════
// Machine / Bus
// ═══════════════════════════════════════════════════════════════════════════

/// Battle machine that records dispatches and refuses a scripted number.
pub struct StubMachine {
    pub state: Cell<BattleState>,
    pub dispatched: RefCell<Vec<MachineEvent>>,
    pub refusals_left: Cell<u32>,
}

impl StubMachine {
    pub fn new(state: BattleState) -> Rc<Self> {
        Rc::new(Self {
            state: Cell::new(state),
            dispatched: RefCell::new(Vec::new()),
            refusals_left: Cell::new(0),
        })
    }
}

impl Machine for StubMachine {
    fn state(&self) -> BattleState {
        self.state.get()
    }

    fn dispatch(&self, event: MachineEvent) -> Result<(), DispatchRefused> {
        self.dispatched.borrow_mut().push(event);
        if self.refusals_left.get() > 0 {
            self.refusals_left.set(self.refusals_left.get() - 1);
            return Err(DispatchRefused {
                event,
                state: self.state.get(),
            });
        }
        Ok(())
    }
}

/// Capture every broadcast of `kind`.
pub fn record_bus(bus: &dyn EventBus, kind: BattleEventKind) -> Rc<RefCell<Vec<BattleEvent>>> {
    let seen = Rc::new(RefCell::new(Vec::new()));
    let s = seen.clone();
    bus.subscribe(
        kind,
        Box::new(move |event| {
            s.borrow_mut().push(event.clone());
            Ok(())
        }),
    );
    seen
}

// ═══════════════════════════════════════════════════════════════════════════
// Rendering
// ═══════════════════════════════════════════════════════════════════════════

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SurfaceCall {
    Attach(NotificationId, String),
    Detach(NotificationId),
    SetMessage(NotificationId, String),
    Layout(Vec<(NotificationId, Slot)>),
}

/// Notification surface that records calls and can be told to fail.
#[derive(Default)]
pub struct RecordingSurface {
    pub calls: RefCell<Vec<SurfaceCall>>,
    pub fail_attach: Cell<bool>,
}

impl RecordingSurface {
    pub fn new() -> Rc<Self> {
        Rc::new(Self::default())
    }

    pub fn last_layout(&self) -> Option<Vec<(NotificationId, Slot)>> {
        self.calls.borrow().iter().rev().find_map(|call| match call {
            SurfaceCall::Layout(layout) => Some(layout.clone()),
            _ => None,
        })
    }
}

impl NotificationSurface for RecordingSurface {
    fn attach(&self, view: &NotificationView) -> Result<(), SurfaceError> {
        self.calls
            .borrow_mut()
            .push(SurfaceCall::Attach(view.id, view.message.clone()));
        if self.fail_attach.get() {
            return Err(SurfaceError::new("attach", "container missing"));
        }
        Ok(())
    }

    fn detach(&self, id: NotificationId) -> Result<(), SurfaceError> {
        self.calls.borrow_mut().push(SurfaceCall::Detach(id));
        Ok(())
    }

    fn set_message(&self, id: NotificationId, message: &str) -> Result<(), SurfaceError> {
        self.calls
            .borrow_mut()
            .push(SurfaceCall::SetMessage(id, message.to_string()));
        Ok(())
    }

    fn layout(&self, order: &[(NotificationId, Slot)]) -> Result<(), SurfaceError> {
        self.calls.borrow_mut().push(SurfaceCall::Layout(order.to_vec()));
        Ok(())
    }
}

/// Scoreboard that records countdown writes.
#[derive(Default)]
pub struct RecordingScoreboard {
    pub shown: RefCell<Vec<u32>>,
    pub cleared: Cell<u32>,
    pub fail: Cell<bool>,
}

impl Scoreboard for RecordingScoreboard {
    fn show_countdown(&self, remaining: u32) -> Result<(), SurfaceError> {
        if self.fail.get() {
            return Err(SurfaceError::new("scoreboard", "element detached"));
        }
        self.shown.borrow_mut().push(remaining);
        Ok(())
    }

    fn clear_countdown(&self) -> Result<(), SurfaceError> {
        self.cleared.set(self.cleared.get() + 1);
        Ok(())
    }
}
