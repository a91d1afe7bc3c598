//! Top-level configuration tying together every tunable threshold, with
//! named presets and a forgiving parser: malformed input falls back to
//! defaults rather than taking down a host mid-run.

use crate::constants::defaults;
use crate::cycle_detector::CycleDetectorConfig;
use crate::degradation::DegradationConfig;
use crate::error::{Error, Result};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EscalationSettings {
    pub enabled: bool,
    pub cooldown_ms: u64,
}

impl Default for EscalationSettings {
    fn default() -> Self {
        Self {
            enabled: true,
            cooldown_ms: defaults::ESCALATION_COOLDOWN_MS,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AscConfig {
    pub cycle_detector: CycleDetectorConfig,
    pub degradation: DegradationConfig,
    pub auto_escalation: EscalationSettings,
    pub max_checkpoints: usize,
    pub max_checkpoint_age_ms: u64,
}

impl Default for AscConfig {
    fn default() -> Self {
        Self {
            cycle_detector: CycleDetectorConfig::default(),
            degradation: DegradationConfig::default(),
            auto_escalation: EscalationSettings::default(),
            max_checkpoints: defaults::MAX_CHECKPOINTS,
            max_checkpoint_age_ms: defaults::MAX_CHECKPOINT_AGE_MS,
        }
    }
}

impl AscConfig {
    /// Least forgiving preset: trips earlier on every signal.
    #[must_use]
    pub fn strict() -> Self {
        let mut config = Self::default();
        config.cycle_detector.exact_match_threshold = 2;
        config.cycle_detector.semantic_match_threshold = 3;
        config.cycle_detector.max_consecutive_errors = 3;
        config
    }

    /// The default tuning, suitable for most hosts.
    #[must_use]
    pub fn balanced() -> Self {
        Self::default()
    }

    /// Looser thresholds for hosts that expect legitimate repetition
    /// (e.g. polling loops, iterative search).
    #[must_use]
    pub fn permissive() -> Self {
        let mut config = Self::default();
        config.cycle_detector.exact_match_threshold = 6;
        config.cycle_detector.semantic_match_threshold = 10;
        config.cycle_detector.max_consecutive_errors = 10;
        config
    }

    /// Verbose escalation and shorter cooldowns, for iterating on the
    /// controller's own thresholds during development.
    #[must_use]
    pub fn development() -> Self {
        let mut config = Self::default();
        config.auto_escalation.cooldown_ms = 5_000;
        config
    }

    /// Clamp out-of-range values in place; the one condition this cannot
    /// repair (`min_pattern_length > max_pattern_length`) is reported as
    /// an error instead.
    ///
    /// # Errors
    ///
    /// Returns [`Error::ConfigInvalid`] when `min_pattern_length` exceeds
    /// `max_pattern_length`.
    pub fn validate(&mut self) -> Result<()> {
        if self.cycle_detector.min_pattern_length > self.cycle_detector.max_pattern_length {
            return Err(Error::ConfigInvalid(format!(
                "min_pattern_length ({}) > max_pattern_length ({})",
                self.cycle_detector.min_pattern_length, self.cycle_detector.max_pattern_length
            )));
        }
        self.cycle_detector.semantic_similarity_threshold = self.cycle_detector.semantic_similarity_threshold.clamp(0.0, 1.0);
        if self.cycle_detector.exact_match_threshold == 0 {
            self.cycle_detector.exact_match_threshold = 1;
        }
        if self.cycle_detector.semantic_match_threshold == 0 {
            self.cycle_detector.semantic_match_threshold = 1;
        }
        if self.max_checkpoints == 0 {
            self.max_checkpoints = 1;
        }
        Ok(())
    }

    #[must_use]
    pub fn to_json(&self) -> String {
        serde_json::to_string_pretty(self).unwrap_or_default()
    }

    /// Parse a JSON config string; anything unparseable or invalid after
    /// parsing silently falls back to [`AscConfig::balanced`] rather than
    /// failing a host's startup over a bad override file.
    #[must_use]
    pub fn from_json_or_default(text: &str) -> Self {
        match serde_json::from_str::<Self>(text) {
            Ok(mut config) => {
                if config.validate().is_ok() {
                    config
                } else {
                    Self::balanced()
                }
            }
            Err(_) => Self::balanced(),
        }
    }
}
