//! Battle context
//!
//! `BattleContext` is the dependency-injection object every component is built
//! from. It carries the scheduler, clock, event bus, optional host probes and
//! configuration, so no component reaches for global state.

mod config;
mod error;
mod host;

use std::rc::Rc;

pub use config::{
    CooldownSettings, NotificationSettings, PromptSettings, RendererSettings, TempoConfig,
    MAX_TICK_INTERVAL_MS, TempoConfigExt, TimerSettings,
};
pub use error::ConfigError;
pub use host::{
    DispatchRefused, FixedMachine, HostFlags, Machine, MachineEvent, MachineProbe,
    SharedTimestamp, TimestampSource,
};

use crate::events::{EventBus, InMemoryEventBus};
use crate::scheduler::{Clock, ManualScheduler, Scheduler};

/// Shared collaborators for one battle view.
///
/// Cloning is cheap and shares every collaborator.
#[derive(Clone)]
pub struct BattleContext {
    pub scheduler: Rc<dyn Scheduler>,
    pub clock: Rc<dyn Clock>,
    pub bus: Rc<dyn EventBus>,
    pub timestamps: Option<Rc<dyn TimestampSource>>,
    pub machine_probe: Option<Rc<dyn MachineProbe>>,
    pub flags: HostFlags,
    pub config: TempoConfig,
}

impl BattleContext {
    pub fn builder(scheduler: Rc<dyn Scheduler>, clock: Rc<dyn Clock>) -> BattleContextBuilder {
        BattleContextBuilder {
            scheduler,
            clock,
            bus: None,
            timestamps: None,
            machine_probe: None,
            flags: HostFlags::default(),
            config: TempoConfig::default(),
        }
    }

    /// Context on virtual time with an in-memory bus.
    ///
    /// Returns the scheduler and bus handles so the caller can drive time and
    /// observe broadcasts.
    pub fn manual(config: TempoConfig) -> (Self, ManualScheduler, Rc<InMemoryEventBus>) {
        let scheduler = ManualScheduler::new();
        let bus = Rc::new(InMemoryEventBus::new());
        let ctx = Self::builder(Rc::new(scheduler.clone()), Rc::new(scheduler.clone()))
            .bus(bus.clone())
            .config(config)
            .build();
        (ctx, scheduler, bus)
    }

    /// The machine handle, if the host registered one.
    pub fn machine(&self) -> Option<Rc<dyn Machine>> {
        self.machine_probe.as_ref().and_then(|probe| probe.probe())
    }
}

pub struct BattleContextBuilder {
    scheduler: Rc<dyn Scheduler>,
    clock: Rc<dyn Clock>,
    bus: Option<Rc<dyn EventBus>>,
    timestamps: Option<Rc<dyn TimestampSource>>,
    machine_probe: Option<Rc<dyn MachineProbe>>,
    flags: HostFlags,
    config: TempoConfig,
}

impl BattleContextBuilder {
    pub fn bus(mut self, bus: Rc<dyn EventBus>) -> Self {
        self.bus = Some(bus);
        self
    }

    pub fn timestamps(mut self, source: Rc<dyn TimestampSource>) -> Self {
        self.timestamps = Some(source);
        self
    }

    pub fn machine_probe(mut self, probe: Rc<dyn MachineProbe>) -> Self {
        self.machine_probe = Some(probe);
        self
    }

    pub fn flags(mut self, flags: HostFlags) -> Self {
        self.flags = flags;
        self
    }

    pub fn config(mut self, config: TempoConfig) -> Self {
        self.config = config;
        self
    }

    pub fn build(self) -> BattleContext {
        BattleContext {
            scheduler: self.scheduler,
            clock: self.clock,
            bus: self
                .bus
                .unwrap_or_else(|| Rc::new(InMemoryEventBus::new())),
            timestamps: self.timestamps,
            machine_probe: self.machine_probe,
            flags: self.flags,
            config: self.config,
        }
    }
}
