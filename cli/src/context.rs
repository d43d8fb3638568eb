use std::future::Future;
use std::rc::Rc;
use std::time::Duration;

use tempo_core::context::{FixedMachine, Machine, SharedTimestamp};
use tempo_core::{
    BattleContext, Clock, InMemoryEventBus, ManualScheduler, Scheduler, SystemClock, TempoConfig,
    TokioScheduler,
};

/// Virtual-time steps before an instant run is considered stalled.
const MAX_INSTANT_STEPS: usize = 10_000;

/// Where time comes from for a command run.
#[derive(Clone)]
enum TimeBase {
    /// Virtual time, advanced as fast as callbacks allow
    Instant(ManualScheduler),
    /// Wall-clock time on the current `LocalSet`
    Realtime {
        scheduler: TokioScheduler,
        clock: SystemClock,
    },
}

/// Holds the shared collaborators for one CLI command.
#[derive(Clone)]
pub struct CliContext {
    pub config: TempoConfig,
    pub bus: Rc<InMemoryEventBus>,
    pub timestamp: SharedTimestamp,
    time: TimeBase,
}

impl CliContext {
    pub fn new(config: TempoConfig, instant: bool) -> Self {
        let time = if instant {
            TimeBase::Instant(ManualScheduler::new())
        } else {
            TimeBase::Realtime {
                scheduler: TokioScheduler::new(),
                clock: SystemClock::new(),
            }
        };
        Self {
            config,
            bus: Rc::new(InMemoryEventBus::new()),
            timestamp: SharedTimestamp::new(),
            time,
        }
    }

    pub fn is_instant(&self) -> bool {
        matches!(self.time, TimeBase::Instant(_))
    }

    pub fn scheduler(&self) -> Rc<dyn Scheduler> {
        match &self.time {
            TimeBase::Instant(manual) => Rc::new(manual.clone()),
            TimeBase::Realtime { scheduler, .. } => Rc::new(scheduler.clone()),
        }
    }

    pub fn clock(&self) -> Rc<dyn Clock> {
        match &self.time {
            TimeBase::Instant(manual) => Rc::new(manual.clone()),
            TimeBase::Realtime { clock, .. } => Rc::new(*clock),
        }
    }

    /// Battle context over this run's time base, optionally with a machine.
    pub fn battle(&self, machine: Option<Rc<dyn Machine>>) -> BattleContext {
        let mut builder = BattleContext::builder(self.scheduler(), self.clock())
            .bus(self.bus.clone())
            .timestamps(Rc::new(self.timestamp.clone()))
            .config(self.config.clone());
        if let Some(machine) = machine {
            builder = builder.machine_probe(Rc::new(FixedMachine(machine)));
        }
        builder.build()
    }

    /// Drive `fut` to completion.
    ///
    /// On virtual time the scheduler is stepped between polls; returns `None`
    /// if nothing is left to run and the future is still pending.
    pub async fn drive<F: Future>(&self, fut: F) -> Option<F::Output> {
        let manual = match &self.time {
            TimeBase::Instant(manual) => manual,
            TimeBase::Realtime { .. } => return Some(fut.await),
        };

        let mut fut = std::pin::pin!(fut);
        for _ in 0..MAX_INSTANT_STEPS {
            tokio::select! {
                biased;
                output = &mut fut => return Some(output),
                _ = std::future::ready(()) => {}
            }
            if manual.run_until_idle(1) == 0 {
                tokio::select! {
                    biased;
                    output = &mut fut => return Some(output),
                    _ = std::future::ready(()) => return None,
                }
            }
        }
        tracing::warn!(steps = MAX_INSTANT_STEPS, "instant run did not settle");
        None
    }

    /// Let `delay` pass on this run's time base.
    pub async fn sleep(&self, delay: Duration) {
        match &self.time {
            TimeBase::Instant(manual) => manual.advance(delay),
            TimeBase::Realtime { .. } => tokio::time::sleep(delay).await,
        }
    }
}
