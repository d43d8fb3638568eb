use std::time::Duration;

use crate::context::PromptSettings;

/// Buffer used when none is configured or the configured one is invalid.
pub const DEFAULT_PROMPT_BUFFER_MS: f64 = 250.0;

/// Shortest allowed timestamp poll interval.
pub const MIN_POLL_INTERVAL_MS: f64 = 50.0;

/// How long to wait for the opponent prompt. All parts are finite and >= 0.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PromptBudget {
    pub delay_ms: f64,
    pub min_visible_ms: f64,
    pub buffer_ms: f64,
    pub total_ms: f64,
}

impl PromptBudget {
    pub fn total(&self) -> Duration {
        Duration::try_from_secs_f64(self.total_ms / 1000.0).unwrap_or(Duration::MAX)
    }
}

fn non_negative(value: f64) -> Option<f64> {
    (value.is_finite() && value >= 0.0).then_some(value)
}

/// Build a budget from prompt settings.
///
/// `buffer_override` replaces the configured buffer; an invalid or negative
/// buffer falls back to [`DEFAULT_PROMPT_BUFFER_MS`]. Invalid delay or
/// min-visible values count as zero.
pub fn compute_wait_budget(settings: &PromptSettings, buffer_override: Option<f64>) -> PromptBudget {
    let buffer_ms = non_negative(buffer_override.unwrap_or(settings.buffer_ms))
        .unwrap_or(DEFAULT_PROMPT_BUFFER_MS);
    let delay_ms = non_negative(settings.delay_ms).unwrap_or(0.0);
    let min_visible_ms = non_negative(settings.min_visible_ms).unwrap_or(0.0);

    PromptBudget {
        delay_ms,
        min_visible_ms,
        buffer_ms,
        total_ms: (delay_ms + min_visible_ms + buffer_ms).min(f64::MAX),
    }
}
