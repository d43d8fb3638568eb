use std::time::Duration;

/// Phases of the external battle state machine that tempo cares about.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum BattleState {
    WaitingForMatchStart,
    MatchStart,
    Cooldown,
    RoundStart,
    WaitingForPlayerAction,
    RoundDecision,
    RoundOver,
    MatchDecision,
    MatchOver,
    InterruptRound,
}

/// Broadcasts exchanged over the [`EventBus`](super::EventBus).
///
/// These are the battle-flow signals shared between the timer engine, the
/// cooldown orchestrator, the prompt synchronizer and the host.
#[derive(Debug, Clone, PartialEq)]
pub enum BattleEvent {
    // Countdown lifecycle (emitted by the renderer adapter)
    CountdownTick {
        remaining: u32,
    },
    CountdownDrift {
        remaining: u32,
    },
    /// The visible countdown reached zero
    CountdownFinished,

    // Cooldown / machine
    /// The cooldown timer expired in orchestrated mode
    CooldownExpired,
    StateChanged {
        from: BattleState,
        to: BattleState,
    },
    /// Free-running readiness resolved
    RoundReady,
    /// The machine refused the readiness dispatch twice
    ReadyDispatchRefused,

    // Opponent prompt
    /// The opponent's action prompt is ready to be shown
    OpponentPromptReady,
    /// A prompt was shown and should stay visible for at least this long
    PromptShown {
        min_visible: Duration,
    },

    // Host
    VisibilityChanged {
        hidden: bool,
    },
}

/// Discriminant of [`BattleEvent`], used as the subscription key.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum BattleEventKind {
    CountdownTick,
    CountdownDrift,
    CountdownFinished,
    CooldownExpired,
    StateChanged,
    RoundReady,
    ReadyDispatchRefused,
    OpponentPromptReady,
    PromptShown,
    VisibilityChanged,
}

impl BattleEvent {
    pub fn kind(&self) -> BattleEventKind {
        match self {
            BattleEvent::CountdownTick { .. } => BattleEventKind::CountdownTick,
            BattleEvent::CountdownDrift { .. } => BattleEventKind::CountdownDrift,
            BattleEvent::CountdownFinished => BattleEventKind::CountdownFinished,
            BattleEvent::CooldownExpired => BattleEventKind::CooldownExpired,
            BattleEvent::StateChanged { .. } => BattleEventKind::StateChanged,
            BattleEvent::RoundReady => BattleEventKind::RoundReady,
            BattleEvent::ReadyDispatchRefused => BattleEventKind::ReadyDispatchRefused,
            BattleEvent::OpponentPromptReady => BattleEventKind::OpponentPromptReady,
            BattleEvent::PromptShown { .. } => BattleEventKind::PromptShown,
            BattleEvent::VisibilityChanged { .. } => BattleEventKind::VisibilityChanged,
        }
    }
}
