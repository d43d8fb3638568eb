//! Configuration persistence
//!
//! This module re-exports the shared types from tempo-types and adds loading,
//! validation and storage through confy (TOML).

use std::path::{Path, PathBuf};

pub use tempo_types::{
    CooldownSettings, NotificationSettings, PromptSettings, RendererSettings, TempoConfig,
    TimerSettings,
};

use super::error::ConfigError;

const APP_NAME: &str = "tempo";
const CONFIG_NAME: &str = "config";

/// Longest accepted countdown tick.
pub const MAX_TICK_INTERVAL_MS: u64 = 60_000;

/// Extension trait for TempoConfig persistence
pub trait TempoConfigExt: Sized {
    fn load() -> Result<Self, ConfigError>;
    fn load_or_default() -> Self;
    fn load_from(path: &Path) -> Result<Self, ConfigError>;
    fn save(&self) -> Result<(), ConfigError>;
    fn save_to(&self, path: &Path) -> Result<(), ConfigError>;
    fn config_path() -> Result<PathBuf, ConfigError>;
    fn validate(&self) -> Result<(), String>;
}

impl TempoConfigExt for TempoConfig {
    fn load() -> Result<Self, ConfigError> {
        let path = Self::config_path()?;
        Self::load_from(&path)
    }

    fn load_or_default() -> Self {
        match Self::load() {
            Ok(config) => config,
            Err(err) => {
                tracing::warn!(error = %err, "using default configuration");
                Self::default()
            }
        }
    }

    fn load_from(path: &Path) -> Result<Self, ConfigError> {
        let config: TempoConfig = confy::load_path(path).map_err(ConfigError::Load)?;
        config.validate().map_err(|reason| ConfigError::Invalid {
            path: path.to_path_buf(),
            reason,
        })?;
        Ok(config)
    }

    fn save(&self) -> Result<(), ConfigError> {
        confy::store(APP_NAME, CONFIG_NAME, self).map_err(ConfigError::Save)
    }

    fn save_to(&self, path: &Path) -> Result<(), ConfigError> {
        confy::store_path(path, self).map_err(ConfigError::Save)
    }

    fn config_path() -> Result<PathBuf, ConfigError> {
        confy::get_configuration_file_path(APP_NAME, CONFIG_NAME).map_err(ConfigError::Path)
    }

    fn validate(&self) -> Result<(), String> {
        if self.timer.tick_interval_ms == 0 || self.timer.tick_interval_ms > MAX_TICK_INTERVAL_MS
        {
            return Err(format!(
                "timer.tick_interval_ms must be between 1 and {MAX_TICK_INTERVAL_MS}, got {}",
                self.timer.tick_interval_ms
            ));
        }
        if !self.cooldown.duration_secs.is_finite() || self.cooldown.duration_secs < 0.0 {
            return Err(format!(
                "cooldown.duration_secs must be a non-negative number, got {}",
                self.cooldown.duration_secs
            ));
        }
        if self.notifications.max_concurrent == 0 {
            return Err("notifications.max_concurrent must be at least 1".to_string());
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config_is_valid() {
        assert!(TempoConfig::default().validate().is_ok());
    }

    #[test]
    fn test_zero_capacity_rejected() {
        let mut config = TempoConfig::default();
        config.notifications.max_concurrent = 0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_tick_interval_bounds() {
        let mut config = TempoConfig::default();
        config.timer.tick_interval_ms = MAX_TICK_INTERVAL_MS;
        assert!(config.validate().is_ok());

        config.timer.tick_interval_ms = MAX_TICK_INTERVAL_MS + 1;
        assert!(config.validate().unwrap_err().contains("tick_interval_ms"));

        config.timer.tick_interval_ms = u64::MAX;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_non_finite_cooldown_rejected() {
        let mut config = TempoConfig::default();
        config.cooldown.duration_secs = f64::NAN;
        assert!(config.validate().unwrap_err().contains("duration_secs"));
    }
}
