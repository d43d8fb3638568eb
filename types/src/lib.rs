//! Shared configuration types for tempo
//!
//! This crate contains serializable configuration types that are shared between
//! the engine (tempo-core) and the command-line driver (tempo-cli).

use serde::{Deserialize, Serialize};

// ─────────────────────────────────────────────────────────────────────────────
// Serde Defaults
// ─────────────────────────────────────────────────────────────────────────────

fn default_true() -> bool {
    true
}

fn default_tick_interval_ms() -> u64 {
    1000
}

fn default_max_drift_retries() -> u32 {
    3
}

fn default_cooldown_secs() -> f64 {
    3.0
}

fn default_fallback_grace_ms() -> u64 {
    200
}

fn default_prompt_buffer_ms() -> f64 {
    250.0
}

fn default_poll_interval_ms() -> u64 {
    100
}

fn default_max_concurrent() -> usize {
    2
}

fn default_auto_dismiss_ms() -> u64 {
    3000
}

// ─────────────────────────────────────────────────────────────────────────────
// Timer
// ─────────────────────────────────────────────────────────────────────────────

/// Countdown timer tuning.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TimerSettings {
    /// Wall-clock length of one countdown unit
    #[serde(default = "default_tick_interval_ms")]
    pub tick_interval_ms: u64,

    /// Consecutive drift recoveries allowed before the timer gives up
    #[serde(default = "default_max_drift_retries")]
    pub max_drift_retries: u32,
}

impl Default for TimerSettings {
    fn default() -> Self {
        Self {
            tick_interval_ms: default_tick_interval_ms(),
            max_drift_retries: default_max_drift_retries(),
        }
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Cooldown
// ─────────────────────────────────────────────────────────────────────────────

/// Inter-round cooldown behavior.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CooldownSettings {
    /// Cooldown length in countdown units
    #[serde(default = "default_cooldown_secs")]
    pub duration_secs: f64,

    /// Extra time after the cooldown before the deadline fallback fires
    #[serde(default = "default_fallback_grace_ms")]
    pub fallback_grace_ms: u64,

    /// Pause the cooldown while the host is backgrounded
    #[serde(default = "default_true")]
    pub pause_on_hidden: bool,
}

impl Default for CooldownSettings {
    fn default() -> Self {
        Self {
            duration_secs: default_cooldown_secs(),
            fallback_grace_ms: default_fallback_grace_ms(),
            pause_on_hidden: true,
        }
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Prompt
// ─────────────────────────────────────────────────────────────────────────────

/// Inputs for the opponent prompt wait budget.
///
/// Values are kept as raw floats so that hand-edited or host-supplied values
/// can be normalized (negative or non-finite become safe defaults).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PromptSettings {
    #[serde(default)]
    pub delay_ms: f64,

    #[serde(default)]
    pub min_visible_ms: f64,

    #[serde(default = "default_prompt_buffer_ms")]
    pub buffer_ms: f64,

    /// Poll interval for the external timestamp (floored at 50 ms)
    #[serde(default = "default_poll_interval_ms")]
    pub poll_interval_ms: u64,
}

impl Default for PromptSettings {
    fn default() -> Self {
        Self {
            delay_ms: 0.0,
            min_visible_ms: 0.0,
            buffer_ms: default_prompt_buffer_ms(),
            poll_interval_ms: default_poll_interval_ms(),
        }
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Notifications
// ─────────────────────────────────────────────────────────────────────────────

/// Transient message stack settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NotificationSettings {
    #[serde(default = "default_true")]
    pub enabled: bool,

    /// Maximum simultaneously visible notifications
    #[serde(default = "default_max_concurrent")]
    pub max_concurrent: usize,

    /// Auto-dismiss used when a notification doesn't specify one (0 = never)
    #[serde(default = "default_auto_dismiss_ms")]
    pub default_auto_dismiss_ms: u64,
}

impl Default for NotificationSettings {
    fn default() -> Self {
        Self {
            enabled: true,
            max_concurrent: default_max_concurrent(),
            default_auto_dismiss_ms: default_auto_dismiss_ms(),
        }
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Renderer
// ─────────────────────────────────────────────────────────────────────────────

/// Countdown renderer policy.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct RendererSettings {
    /// Suppression window opened by a prompt broadcast that doesn't carry
    /// its own minimum visible time
    #[serde(default)]
    pub suppress_window_ms: u64,
}

// ─────────────────────────────────────────────────────────────────────────────
// Root
// ─────────────────────────────────────────────────────────────────────────────

/// Complete tempo configuration.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct TempoConfig {
    #[serde(default)]
    pub timer: TimerSettings,

    #[serde(default)]
    pub cooldown: CooldownSettings,

    #[serde(default)]
    pub prompt: PromptSettings,

    #[serde(default)]
    pub notifications: NotificationSettings,

    #[serde(default)]
    pub renderer: RendererSettings,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_document_uses_defaults() {
        let config: TempoConfig = toml::from_str("").unwrap();
        assert_eq!(config, TempoConfig::default());
        assert_eq!(config.timer.max_drift_retries, 3);
        assert_eq!(config.notifications.max_concurrent, 2);
        assert_eq!(config.notifications.default_auto_dismiss_ms, 3000);
    }

    #[test]
    fn test_partial_section_keeps_other_defaults() {
        let config: TempoConfig = toml::from_str(
            r#"
            [cooldown]
            duration_secs = 5.0

            [notifications]
            max_concurrent = 4
            "#,
        )
        .unwrap();

        assert_eq!(config.cooldown.duration_secs, 5.0);
        assert!(config.cooldown.pause_on_hidden);
        assert_eq!(config.cooldown.fallback_grace_ms, 200);
        assert_eq!(config.notifications.max_concurrent, 4);
        assert!(config.notifications.enabled);
    }
}
