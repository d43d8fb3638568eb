//! Opponent prompt synchronization
//!
//! Before the opponent's action prompt is shown, the UI waits for whichever
//! comes first: the host's "opponent turn started" timestamp, an
//! `OpponentPromptReady` broadcast, or the end of a computed wait budget.

mod budget;
mod synchronizer;

pub use budget::{
    DEFAULT_PROMPT_BUFFER_MS, MIN_POLL_INTERVAL_MS, PromptBudget, compute_wait_budget,
};
pub use synchronizer::{PromptError, PromptSignal, PromptSynchronizer, SignalWait, WaitOptions};
