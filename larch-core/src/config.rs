//! Runtime configuration.

use serde::{Deserialize, Serialize};

use crate::error::{ReactiveError, Result};

/// Tunables of a [`Runtime`](crate::Runtime).
///
/// ```rust
/// use larch_core::RuntimeConfig;
///
/// let config = RuntimeConfig::from_json(r#"{ "max_waves": 16 }"#).unwrap();
/// assert_eq!(config.max_waves, 16);
/// assert!(config.rule_optimize);
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct RuntimeConfig {
    /// Waves a single commit may run before it is aborted with
    /// [`ReactiveError::DependencyCycle`].
    pub max_waves: u32,

    /// Skip dependents of scalar cells whose written value equals the
    /// stored one.
    pub rule_optimize: bool,
}

impl Default for RuntimeConfig {
    fn default() -> Self {
        Self {
            max_waves: 100,
            rule_optimize: true,
        }
    }
}

impl RuntimeConfig {
    /// Parse and validate a JSON configuration. Missing keys keep their
    /// defaults.
    pub fn from_json(json: &str) -> Result<Self> {
        let config: Self = serde_json::from_str(json)?;
        config.validate()
    }

    pub fn with_max_waves(mut self, max_waves: u32) -> Self {
        self.max_waves = max_waves;
        self
    }

    pub fn with_rule_optimize(mut self, enabled: bool) -> Self {
        self.rule_optimize = enabled;
        self
    }

    pub fn validate(self) -> Result<Self> {
        if self.max_waves == 0 {
            return Err(ReactiveError::Config("max_waves must be at least 1".into()));
        }
        Ok(self)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn missing_keys_use_defaults() {
        let config = RuntimeConfig::from_json("{}").unwrap();
        assert_eq!(config, RuntimeConfig::default());
    }

    #[test]
    fn zero_waves_rejected() {
        let err = RuntimeConfig::from_json(r#"{"max_waves": 0}"#).unwrap_err();
        assert!(matches!(err, ReactiveError::Config(_)));
    }

    #[test]
    fn unknown_keys_rejected() {
        assert!(RuntimeConfig::from_json(r#"{"max_wave": 3}"#).is_err());
    }

    #[test]
    fn builder_helpers() {
        let config = RuntimeConfig::default()
            .with_max_waves(7)
            .with_rule_optimize(false);
        assert_eq!(config.max_waves, 7);
        assert!(!config.rule_optimize);
    }
}
