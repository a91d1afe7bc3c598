//! Centralized default values and magic numbers for the agent safety controller.
//!
//! Keeping these in one place makes the thresholds behind loop detection,
//! degradation, and escalation auditable at a glance instead of scattered
//! across modules as inline literals.

/// Default configuration values
pub mod defaults {
    /// `HistoryLog::max_entries`
    pub const MAX_HISTORY_ENTRIES: usize = 100;
    /// `HistoryLog::time_window_ms`
    pub const HISTORY_TIME_WINDOW_MS: u64 = 60_000;
    /// Fraction of `max_entries` retained when the log overflows.
    pub const HISTORY_RETAIN_FRACTION: f64 = 0.8;

    /// `CycleDetectorConfig::exact_match_threshold`
    pub const EXACT_MATCH_THRESHOLD: u32 = 3;
    /// `CycleDetectorConfig::exact_match_lookback_window`
    pub const EXACT_MATCH_LOOKBACK_WINDOW: usize = 50;
    /// `CycleDetectorConfig::semantic_similarity_threshold`
    pub const SEMANTIC_SIMILARITY_THRESHOLD: f64 = 0.85;
    /// `CycleDetectorConfig::semantic_match_threshold`
    pub const SEMANTIC_MATCH_THRESHOLD: u32 = 5;
    /// `CycleDetectorConfig::min_pattern_length`
    pub const MIN_PATTERN_LENGTH: usize = 2;
    /// `CycleDetectorConfig::max_pattern_length`
    pub const MAX_PATTERN_LENGTH: usize = 5;
    /// `CycleDetectorConfig::pattern_repetition_threshold`
    pub const PATTERN_REPETITION_THRESHOLD: u32 = 2;

    /// Degradation factor weights (must sum to 1.0)
    pub const WEIGHT_CONSECUTIVE_ERRORS: f64 = 0.35;
    pub const WEIGHT_SIMILAR_ACTIONS: f64 = 0.30;
    pub const WEIGHT_TIME_SINCE_SUCCESS: f64 = 0.20;
    pub const WEIGHT_RECENT_ERROR_RATE: f64 = 0.15;

    /// Window over which `recent_error_rate` is computed.
    pub const RECENT_ERROR_WINDOW: usize = 10;
    /// Scaling divisor for `consecutive_errors` factor.
    pub const CONSECUTIVE_ERROR_SCALE: f64 = 5.0;
    /// Scaling divisor (ms) for `time_since_last_success` factor.
    pub const TIME_SINCE_SUCCESS_SCALE_MS: f64 = 300_000.0;

    /// Escalation cooldown and expiry windows (ms)
    pub const ESCALATION_COOLDOWN_MS: u64 = 120_000;
    pub const ESCALATION_EXPIRY_CRITICAL_MS: u64 = 15 * 60_000;
    pub const ESCALATION_EXPIRY_HIGH_MS: u64 = 30 * 60_000;
    pub const ESCALATION_EXPIRY_MEDIUM_MS: u64 = 60 * 60_000;
    pub const ESCALATION_EXPIRY_LOW_MS: u64 = 120 * 60_000;

    /// Checkpoint retention defaults
    pub const MAX_CHECKPOINTS: usize = 50;
    pub const MAX_CHECKPOINT_AGE_MS: u64 = 24 * 60 * 60 * 1000;

    /// Self-healing backoff
    pub const DEFAULT_BASE_DELAY_MS: u64 = 1000;
    pub const MAX_BACKOFF_DELAY_MS: u64 = 30_000;
    pub const DEFAULT_MAX_RETRIES: u32 = 3;

    /// Task decomposition
    pub const MAX_COMPLEXITY_BEFORE_DECOMPOSE: f64 = 60.0;
    pub const MAX_STEPS_BEFORE_DECOMPOSE: u32 = 5;

    /// Learned error pattern confidence update rate: `c <- c + RATE*(1-c)`.
    pub const CONFIDENCE_LEARNING_RATE: f64 = 0.1;

    /// Risk scoring thresholds (0..=100)
    pub const RISK_THRESHOLD_MEDIUM: f64 = 30.0;
    pub const RISK_THRESHOLD_HIGH: f64 = 60.0;
    pub const RISK_THRESHOLD_CRITICAL: f64 = 80.0;
}

/// Log message prefixes, used so `tracing` output stays greppable.
pub mod logging {
    pub const PREFIX_CYCLE: &str = "[cycle]";
    pub const PREFIX_DEGRADATION: &str = "[degradation]";
    pub const PREFIX_SELF_HEALING: &str = "[self-healing]";
    pub const PREFIX_ESCALATION: &str = "[escalation]";
    pub const PREFIX_CHECKPOINT: &str = "[checkpoint]";
    pub const PREFIX_PROACTIVE: &str = "[proactive]";
    pub const PREFIX_DECOMPOSER: &str = "[decomposer]";
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn degradation_weights_sum_to_one() {
        let sum = defaults::WEIGHT_CONSECUTIVE_ERRORS
            + defaults::WEIGHT_SIMILAR_ACTIONS
            + defaults::WEIGHT_TIME_SINCE_SUCCESS
            + defaults::WEIGHT_RECENT_ERROR_RATE;
        assert!((sum - 1.0).abs() < f64::EPSILON);
    }

    #[test]
    fn escalation_expiry_ordering() {
        assert!(defaults::ESCALATION_EXPIRY_CRITICAL_MS < defaults::ESCALATION_EXPIRY_HIGH_MS);
        assert!(defaults::ESCALATION_EXPIRY_HIGH_MS < defaults::ESCALATION_EXPIRY_MEDIUM_MS);
        assert!(defaults::ESCALATION_EXPIRY_MEDIUM_MS < defaults::ESCALATION_EXPIRY_LOW_MS);
    }
}
