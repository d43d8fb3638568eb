//! Tests for CountdownTimer
//!
//! Verifies that:
//! - Scheduler-driven countdowns tick once per interval and expire at zero
//! - Restarts, stops and pauses invalidate stale callbacks
//! - Drift recovery is bounded and resets after a clean restart

use std::cell::{Cell, RefCell};
use std::rc::Rc;

use crate::scheduler::ManualScheduler;
use crate::testing::{ScriptedTickSource, record_events};

use super::{CountdownTimer, TimerError, TimerEvent, TimerEventKind, TimerOptions, TimerState};

// ═══════════════════════════════════════════════════════════════════════════
// Test Helpers
// ═══════════════════════════════════════════════════════════════════════════

fn make_timer(scheduler: &ManualScheduler) -> CountdownTimer {
    CountdownTimer::new(Rc::new(scheduler.clone()), TimerOptions::default())
}

fn make_engine_timer(
    scheduler: &ManualScheduler,
    source: &Rc<ScriptedTickSource>,
    options: TimerOptions,
) -> CountdownTimer {
    CountdownTimer::new(Rc::new(scheduler.clone()), options.with_source(source.clone()))
}

fn count(events: &[TimerEvent], kind: TimerEventKind) -> usize {
    events.iter().filter(|e| e.kind() == kind).count()
}

// ═══════════════════════════════════════════════════════════════════════════
// Scheduler-driven countdown
// ═══════════════════════════════════════════════════════════════════════════

#[test]
fn test_simple_round_timeout() {
    let scheduler = ManualScheduler::new();
    let timer = make_timer(&scheduler);
    let events = record_events(&timer);

    timer.start(3.0).unwrap();
    assert_eq!(*events.borrow(), vec![TimerEvent::Tick(3)], "initial tick is synchronous");

    scheduler.advance_ms(1000);
    scheduler.advance_ms(1000);
    scheduler.advance_ms(1000);

    assert_eq!(
        *events.borrow(),
        vec![
            TimerEvent::Tick(3),
            TimerEvent::Tick(2),
            TimerEvent::Tick(1),
            TimerEvent::Expired
        ]
    );
    assert_eq!(timer.state(), TimerState::Expired);
    assert_eq!(scheduler.pending_count(), 0);
}

#[test]
fn test_stop_after_tick_suppresses_expired() {
    let scheduler = ManualScheduler::new();
    let timer = make_timer(&scheduler);
    let events = record_events(&timer);

    timer.start(3.0).unwrap();
    scheduler.advance_ms(1000);
    assert_eq!(events.borrow().last(), Some(&TimerEvent::Tick(2)));

    timer.stop();
    scheduler.advance_ms(10_000);

    assert_eq!(count(&events.borrow(), TimerEventKind::Expired), 0);
    assert_eq!(timer.state(), TimerState::Idle);
}

#[test]
fn test_restart_invalidates_previous_schedule() {
    let scheduler = ManualScheduler::new();
    let timer = make_timer(&scheduler);
    let events = record_events(&timer);

    timer.start(5.0).unwrap();
    scheduler.advance_ms(400);
    timer.start(3.0).unwrap();
    events.borrow_mut().clear();

    scheduler.advance_ms(10_000);

    assert_eq!(
        *events.borrow(),
        vec![TimerEvent::Tick(2), TimerEvent::Tick(1), TimerEvent::Expired]
    );
}

#[test]
fn test_back_to_back_start_ticks_only_second_run() {
    let scheduler = ManualScheduler::new();
    let timer = make_timer(&scheduler);
    let events = record_events(&timer);

    timer.start(5.0).unwrap();
    timer.start(3.0).unwrap();
    scheduler.advance_ms(10_000);

    assert_eq!(
        *events.borrow(),
        vec![
            TimerEvent::Tick(5),
            TimerEvent::Tick(3),
            TimerEvent::Tick(2),
            TimerEvent::Tick(1),
            TimerEvent::Expired
        ]
    );
    assert_eq!(scheduler.pending_count(), 0);
}

#[test]
fn test_invalid_durations_rejected() {
    let scheduler = ManualScheduler::new();
    let timer = make_timer(&scheduler);
    let events = record_events(&timer);

    assert!(matches!(
        timer.start(f64::NAN),
        Err(TimerError::NonFiniteDuration { .. })
    ));
    assert!(matches!(
        timer.start(f64::INFINITY),
        Err(TimerError::NonFiniteDuration { .. })
    ));
    assert!(matches!(
        timer.start(-1.0),
        Err(TimerError::DurationOutOfRange { .. })
    ));

    assert!(events.borrow().is_empty());
    assert_eq!(timer.state(), TimerState::Idle);
}

#[test]
fn test_fractional_duration_rounds_up() {
    let scheduler = ManualScheduler::new();
    let timer = make_timer(&scheduler);
    let events = record_events(&timer);

    timer.start(2.5).unwrap();
    scheduler.advance_ms(3000);

    assert_eq!(
        *events.borrow(),
        vec![
            TimerEvent::Tick(3),
            TimerEvent::Tick(2),
            TimerEvent::Tick(1),
            TimerEvent::Expired
        ]
    );
}

#[test]
fn test_zero_duration_expires_immediately() {
    let scheduler = ManualScheduler::new();
    let timer = make_timer(&scheduler);
    let events = record_events(&timer);

    timer.start(0.0).unwrap();

    assert_eq!(*events.borrow(), vec![TimerEvent::Tick(0), TimerEvent::Expired]);
    assert_eq!(scheduler.pending_count(), 0);
}

#[test]
fn test_pause_freezes_and_resume_continues() {
    let scheduler = ManualScheduler::new();
    let timer = make_timer(&scheduler);
    let events = record_events(&timer);

    timer.start(3.0).unwrap();
    scheduler.advance_ms(1000);
    timer.pause();
    assert!(timer.is_paused());

    scheduler.advance_ms(60_000);
    assert_eq!(timer.remaining(), 2);
    assert_eq!(events.borrow().len(), 2);

    timer.resume();
    assert!(timer.is_running());
    scheduler.advance_ms(1000);
    assert_eq!(events.borrow().last(), Some(&TimerEvent::Tick(1)));
    scheduler.advance_ms(1000);
    assert_eq!(events.borrow().last(), Some(&TimerEvent::Expired));
}

#[test]
fn test_resume_when_not_paused_is_noop() {
    let scheduler = ManualScheduler::new();
    let timer = make_timer(&scheduler);
    let events = record_events(&timer);

    timer.resume();
    assert_eq!(timer.state(), TimerState::Idle);

    timer.start(2.0).unwrap();
    timer.resume();
    assert_eq!(scheduler.pending_count(), 1, "resume must not double-schedule");

    scheduler.advance_ms(2000);
    assert_eq!(count(&events.borrow(), TimerEventKind::Expired), 1);
}

#[test]
fn test_double_stop_is_silent() {
    let scheduler = ManualScheduler::new();
    let timer = make_timer(&scheduler);
    let events = record_events(&timer);

    timer.start(2.0).unwrap();
    timer.stop();
    timer.stop();
    scheduler.advance_ms(5000);

    assert_eq!(*events.borrow(), vec![TimerEvent::Tick(2)]);
}

#[test]
fn test_stop_hooks_see_each_ended_run_once() {
    let scheduler = ManualScheduler::new();
    let timer = make_timer(&scheduler);
    let ended = Rc::new(RefCell::new(Vec::new()));
    let e = ended.clone();
    timer.on_stop(move |remaining| {
        e.borrow_mut().push(remaining);
        Ok(())
    });

    timer.start(3.0).unwrap();
    scheduler.advance_ms(1000);
    timer.stop();
    timer.stop();
    assert_eq!(*ended.borrow(), vec![2]);

    // Superseding an active run ends it too
    timer.start(5.0).unwrap();
    timer.start(4.0).unwrap();
    assert_eq!(*ended.borrow(), vec![2, 5]);

    // Natural expiry is not a stop
    scheduler.advance_ms(4000);
    timer.stop();
    assert_eq!(*ended.borrow(), vec![2, 5]);
    assert_eq!(timer.state(), TimerState::Idle);
}

#[test]
fn test_handler_can_stop_timer_reentrantly() {
    let scheduler = ManualScheduler::new();
    let timer = make_timer(&scheduler);
    let events = record_events(&timer);

    let handle = timer.clone();
    timer.on(TimerEventKind::Tick, move |event| {
        if *event == TimerEvent::Tick(2) {
            handle.stop();
        }
        Ok(())
    });

    timer.start(3.0).unwrap();
    scheduler.advance_ms(5000);

    assert_eq!(count(&events.borrow(), TimerEventKind::Expired), 0);
    assert_eq!(timer.state(), TimerState::Idle);
    assert_eq!(scheduler.pending_count(), 0);
}

#[test]
fn test_named_registration_rejects_unknown_event() {
    let scheduler = ManualScheduler::new();
    let timer = make_timer(&scheduler);

    assert!(timer.on_named("expired", |_| Ok(())).is_ok());
    assert!(matches!(
        timer.on_named("finished", |_| Ok(())),
        Err(TimerError::UnknownEvent { .. })
    ));
}

#[test]
fn test_disposed_timer_refuses_start() {
    let scheduler = ManualScheduler::new();
    let timer = make_timer(&scheduler);

    timer.start(3.0).unwrap();
    timer.dispose();

    assert_eq!(timer.start(1.0), Err(TimerError::Disposed));
    assert_eq!(scheduler.pending_count(), 0);
}

// ═══════════════════════════════════════════════════════════════════════════
// Engine-driven countdown and drift
// ═══════════════════════════════════════════════════════════════════════════

#[test]
fn test_engine_ticks_drive_countdown() {
    let scheduler = ManualScheduler::new();
    let source = ScriptedTickSource::new();
    let timer = make_engine_timer(&scheduler, &source, TimerOptions::default());
    let events = record_events(&timer);

    timer.start(3.0).unwrap();
    source.tick(3); // duplicate of the initial value
    source.tick(2);
    source.tick(1);
    source.tick(0);

    assert_eq!(
        *events.borrow(),
        vec![
            TimerEvent::Tick(3),
            TimerEvent::Tick(2),
            TimerEvent::Tick(1),
            TimerEvent::Expired
        ]
    );
    assert_eq!(scheduler.pending_count(), 0, "engine mode never uses the scheduler");
}

#[test]
fn test_skipped_engine_tick_is_drift() {
    let scheduler = ManualScheduler::new();
    let source = ScriptedTickSource::new();
    let timer = make_engine_timer(&scheduler, &source, TimerOptions::default());
    let events = record_events(&timer);

    timer.start(10.0).unwrap();
    source.tick(9);
    source.tick(6);

    assert_eq!(events.borrow().last(), Some(&TimerEvent::Drift(9)));
    assert_eq!(timer.retries(), 1);
    assert_eq!(*source.starts.borrow(), vec![10, 9], "restarted from preserved value");
}

#[test]
fn test_drift_retry_bound_calls_fail_handler_once() {
    let scheduler = ManualScheduler::new();
    let source = ScriptedTickSource::new();
    let failures = Rc::new(Cell::new(0));
    let f = failures.clone();
    let options = TimerOptions::default().with_drift_fail(move |_| f.set(f.get() + 1));
    let timer = make_engine_timer(&scheduler, &source, options);
    let events = record_events(&timer);

    timer.start(10.0).unwrap();
    source.drift();
    source.drift();
    assert_eq!(failures.get(), 0);
    source.drift();
    assert_eq!(failures.get(), 1);

    // The failed run's sink is stale now.
    source.drift();
    source.tick(9);

    assert_eq!(failures.get(), 1);
    assert_eq!(count(&events.borrow(), TimerEventKind::Drift), 3);
    assert_eq!(count(&events.borrow(), TimerEventKind::Expired), 0);
    assert_eq!(timer.state(), TimerState::Idle);
}

#[test]
fn test_drift_exhaustion_forces_expiration_once() {
    let scheduler = ManualScheduler::new();
    let source = ScriptedTickSource::new();
    let timer = make_engine_timer(&scheduler, &source, TimerOptions::default());
    let events = record_events(&timer);

    timer.start(10.0).unwrap();
    for _ in 0..3 {
        source.drift();
    }
    source.drift();

    assert_eq!(count(&events.borrow(), TimerEventKind::Expired), 1);
    assert_eq!(timer.state(), TimerState::Expired);
}

#[test]
fn test_consistent_tick_after_restart_resets_retries() {
    let scheduler = ManualScheduler::new();
    let source = ScriptedTickSource::new();
    let timer = make_engine_timer(&scheduler, &source, TimerOptions::default());
    let events = record_events(&timer);

    timer.start(10.0).unwrap();
    source.drift();
    source.drift();
    assert_eq!(timer.retries(), 2);

    source.tick(9);
    assert_eq!(timer.retries(), 0);

    source.drift();
    source.drift();
    assert_eq!(count(&events.borrow(), TimerEventKind::Expired), 0);
    assert!(timer.is_running());
}

#[test]
fn test_explicit_start_resets_retries() {
    let scheduler = ManualScheduler::new();
    let source = ScriptedTickSource::new();
    let timer = make_engine_timer(&scheduler, &source, TimerOptions::default());

    timer.start(10.0).unwrap();
    source.drift();
    source.drift();
    timer.start(5.0).unwrap();
    assert_eq!(timer.retries(), 0);
}

#[test]
fn test_refused_restart_counts_as_drift() {
    let scheduler = ManualScheduler::new();
    let source = ScriptedTickSource::new();
    source.refuse_next.set(3);
    let timer = make_engine_timer(&scheduler, &source, TimerOptions::default());
    let events = record_events(&timer);

    timer.start(5.0).unwrap();

    assert_eq!(
        *events.borrow(),
        vec![
            TimerEvent::Tick(5),
            TimerEvent::Drift(5),
            TimerEvent::Drift(5),
            TimerEvent::Drift(5),
            TimerEvent::Expired
        ]
    );
}

#[test]
fn test_stale_sink_is_ignored_after_restart() {
    let scheduler = ManualScheduler::new();
    let source = ScriptedTickSource::new();
    let timer = make_engine_timer(&scheduler, &source, TimerOptions::default());
    let events = record_events(&timer);

    timer.start(5.0).unwrap();
    let old_sink = source.sink();
    timer.start(3.0).unwrap();

    assert!(old_sink.is_stale());
    old_sink.tick(4);
    old_sink.expired();

    assert_eq!(timer.remaining(), 3);
    assert_eq!(count(&events.borrow(), TimerEventKind::Expired), 0);
}

// ═══════════════════════════════════════════════════════════════════════════
// Async helpers
// ═══════════════════════════════════════════════════════════════════════════

#[tokio::test]
async fn test_wait_for_expiration_resolves() {
    let scheduler = ManualScheduler::new();
    let timer = make_timer(&scheduler);

    timer.start(2.0).unwrap();
    let expired = timer.wait_for_expiration();
    scheduler.advance_ms(2000);

    assert_eq!(expired.await, Ok(()));
}

#[tokio::test]
async fn test_wait_for_expiration_errors_on_dispose() {
    let scheduler = ManualScheduler::new();
    let timer = make_timer(&scheduler);

    timer.start(2.0).unwrap();
    let expired = timer.wait_for_expiration();
    timer.dispose();

    assert_eq!(expired.await, Err(TimerError::Disposed));
}

#[tokio::test]
async fn test_wait_for_next_tick_yields_value() {
    let scheduler = ManualScheduler::new();
    let timer = make_timer(&scheduler);

    timer.start(3.0).unwrap();
    let next = timer.wait_for_next_tick();
    scheduler.advance_ms(1000);

    assert_eq!(next.await, Ok(2));
}
