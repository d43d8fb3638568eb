use std::rc::Rc;
use std::time::Duration;

use tempo_core::context::Machine;
use tempo_core::cooldown::{CooldownOptions, CooldownSession};
use tempo_core::events::EventBus;
use tempo_core::notifications::{NotificationConfig, NotificationManager, Priority};
use tempo_core::prompt::{PromptSynchronizer, WaitOptions};
use tempo_core::renderer::{RendererAdapter, RendererOptions, Scoreboard};
use tempo_core::timers::{CountdownTimer, TimerEventKind, TimerOptions};
use tempo_core::{BattleContext, BattleEvent, BattleEventKind, Clock, TempoConfigExt};
use tempo_types::TempoConfig;

use crate::console::{ConsoleMachine, ConsoleScoreboard, ConsoleSurface};
use crate::context::CliContext;

fn secs(value: f64) -> Result<Duration, String> {
    Duration::try_from_secs_f64(value).map_err(|e| format!("invalid delay {value}: {e}"))
}

fn renderer(ctx: &CliContext, battle: &BattleContext, timer: &CountdownTimer) -> RendererAdapter {
    let surface = Rc::new(ConsoleSurface::new(ctx.clock()));
    let notifications = NotificationManager::new(battle, surface);
    let scoreboard: Rc<dyn Scoreboard> = Rc::new(ConsoleScoreboard::new(ctx.clock()));
    RendererAdapter::attach(
        battle,
        timer,
        Some(notifications),
        Some(scoreboard),
        RendererOptions::from_settings(&ctx.config.renderer),
    )
}

/// Run a single countdown with the console renderer attached.
pub async fn round(ctx: &CliContext, duration: f64) -> Result<(), String> {
    let battle = ctx.battle(None);
    let timer = CountdownTimer::new(
        Rc::clone(&battle.scheduler),
        TimerOptions::from_settings(&ctx.config.timer),
    );
    let _renderer = renderer(ctx, &battle, &timer);
    timer.on(TimerEventKind::Drift, |event| {
        tracing::warn!(?event, "countdown drift");
        Ok(())
    });

    let expired = timer.wait_for_expiration();
    timer.start(duration).map_err(|e| e.to_string())?;

    match ctx.drive(expired).await {
        Some(Ok(())) => println!("round timer expired"),
        Some(Err(e)) => return Err(e.to_string()),
        None => println!("round timer stalled with {} left", timer.remaining()),
    }
    timer.dispose();
    Ok(())
}

/// Run a cooldown session, optionally skipping it early.
pub async fn cooldown(
    ctx: &CliContext,
    duration: f64,
    skip_after: Option<f64>,
    orchestrated: bool,
) -> Result<(), String> {
    let machine: Option<Rc<dyn Machine>> = orchestrated.then(|| {
        let machine: Rc<dyn Machine> = Rc::new(ConsoleMachine::new());
        machine
    });
    let battle = ctx.battle(machine);

    for kind in [BattleEventKind::RoundReady, BattleEventKind::ReadyDispatchRefused] {
        ctx.bus.subscribe(
            kind,
            Box::new(|event: &BattleEvent| {
                println!("bus: {event:?}");
                Ok(())
            }),
        );
    }

    let options = CooldownOptions::from_config(&ctx.config).with_duration(duration);
    let session = CooldownSession::create(&battle, options).map_err(|e| e.to_string())?;
    let _renderer = renderer(ctx, &battle, session.timer());
    println!("cooldown started ({:?})", session.mode());

    if let Some(after) = skip_after {
        let skipping = session.clone();
        battle
            .scheduler
            .set_timeout(secs(after)?, Box::new(move || skipping.skip()));
    }

    match ctx.drive(session.ready()).await.flatten() {
        Some(source) => println!(
            "ready via {source:?} (dispatch: {:?})",
            session.dispatch_outcome()
        ),
        None => println!("cooldown ended without readiness"),
    }
    session.clear();
    Ok(())
}

/// Show a burst of notifications to exercise admission, eviction and the queue.
pub async fn notify(ctx: &CliContext, count: u32) -> Result<(), String> {
    let battle = ctx.battle(None);
    let manager = NotificationManager::new(&battle, Rc::new(ConsoleSurface::new(ctx.clock())));

    for n in 0..count {
        let priority = match n % 3 {
            0 => Priority::Low,
            1 => Priority::Normal,
            _ => Priority::High,
        };
        let config = NotificationConfig::new(format!("message {}", n + 1))
            .priority(priority)
            .min_duration_ms(500)
            .auto_dismiss_ms(1500);
        if manager.show(config).is_none() {
            println!("notification {} not shown", n + 1);
        }
    }

    let diagnostics = manager.diagnostics();
    println!(
        "active {} queued {}",
        diagnostics.active.len(),
        diagnostics.queued.len()
    );

    ctx.sleep(Duration::from_millis(600)).await;
    let removed = manager.remove_all();
    if ctx.drive(removed).await.is_none() {
        println!("removal did not finish");
    }
    println!("all notifications removed");
    Ok(())
}

/// Wait for the opponent prompt, with optional simulated host signals.
pub async fn prompt(
    ctx: &CliContext,
    delay_ms: f64,
    min_visible_ms: f64,
    buffer_ms: Option<f64>,
    timestamp_after: Option<f64>,
    ready_after: Option<f64>,
) -> Result<(), String> {
    let mut config = ctx.config.clone();
    config.prompt.delay_ms = delay_ms;
    config.prompt.min_visible_ms = min_visible_ms;
    let mut battle = ctx.battle(None);
    battle.config = config;

    let sync = PromptSynchronizer::new(&battle);
    let budget = sync.compute_budget(buffer_ms);
    println!("waiting up to {:.0} ms", budget.total_ms);

    if let Some(after) = timestamp_after {
        let timestamp = ctx.timestamp.clone();
        let clock = ctx.clock();
        battle.scheduler.set_timeout(
            secs(after / 1000.0)?,
            Box::new(move || timestamp.set(clock.now())),
        );
    }
    if let Some(after) = ready_after {
        let bus = Rc::clone(&battle.bus);
        battle.scheduler.set_timeout(
            secs(after / 1000.0)?,
            Box::new(move || bus.emit(&BattleEvent::OpponentPromptReady)),
        );
    }

    let wait = sync
        .wait_for_signal(&budget, WaitOptions::default())
        .map_err(|e| e.to_string())?;
    match ctx.drive(wait).await {
        Some(signal) => println!("prompt signal: {signal:?}"),
        None => println!("prompt wait stalled"),
    }
    Ok(())
}

pub fn show_config(config: &TempoConfig) {
    match TempoConfig::config_path() {
        Ok(path) => println!("config file: {}", path.display()),
        Err(e) => println!("config file: unavailable ({e})"),
    }
    println!("{config:#?}");
}
