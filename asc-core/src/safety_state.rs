//! The mutable state a host holds per active agent run: the execution
//! log, the degradation machine, and the counters every other component
//! derives its decisions from.
//!
//! A `SafetyState` is the unit of persistence across turns. It owns no
//! host resources and holds no locks, so a host can checkpoint it,
//! serialize it, or run several side by side for independent agents.

use crate::degradation::{DegradationConfig, DegradationFactors, DegradationLevel, DegradationManager};
use crate::history::{ExecutionOutcome, HistoryLog};
use crate::value::Value;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SafetyState {
    pub history: HistoryLog,
    pub consecutive_error_count: u32,
    pub tool_error_counts: HashMap<String, u32>,
    pub similar_action_count: u32,
    pub last_strategy_switch_at: Option<u64>,
    pub degradation: DegradationManager,
}

impl Default for SafetyState {
    fn default() -> Self {
        Self {
            history: HistoryLog::default(),
            consecutive_error_count: 0,
            tool_error_counts: HashMap::new(),
            similar_action_count: 0,
            last_strategy_switch_at: None,
            degradation: DegradationManager::new(),
        }
    }
}

impl SafetyState {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn degradation_level(&self) -> DegradationLevel {
        self.degradation.level()
    }

    /// Record one execution result: append to the log, update the
    /// consecutive-error and per-tool counters, and set
    /// `similar_action_count` to how many times this exact call shape has
    /// now been seen in the retained window.
    pub fn record(
        &mut self,
        now: u64,
        tool_name: &str,
        tool_args: Value,
        result: ExecutionOutcome,
        duration_ms: u64,
        error_message: Option<String>,
        error_type: Option<String>,
    ) {
        let hash = crate::value::args_hash(&tool_args);
        let entry = self
            .history
            .append(now, tool_name, tool_args, result, duration_ms, error_message, error_type.clone());
        let is_error = entry.is_error();

        if is_error {
            self.consecutive_error_count += 1;
            *self.tool_error_counts.entry(tool_name.to_string()).or_insert(0) += 1;
        } else {
            self.consecutive_error_count = 0;
            self.tool_error_counts.insert(tool_name.to_string(), 0);
        }

        self.similar_action_count = self.history.count_matching(tool_name, &hash).saturating_sub(1) as u32;
    }

    /// Recompute degradation factors from the current counters and apply
    /// them to the degradation machine, returning the (possibly
    /// unchanged) resulting level.
    pub fn recompute_degradation(&mut self, now: u64, semantic_match_threshold: u32) -> DegradationLevel {
        let factors = DegradationFactors::from_history(&self.history, now, self.consecutive_error_count, self.similar_action_count);
        self.degradation.apply_effects(now, factors, semantic_match_threshold)
    }

    /// Attempt to step the degradation level back down, per
    /// [`DegradationManager::try_reduce`].
    pub fn try_recover(&mut self, now: u64, config: &DegradationConfig) -> bool {
        self.degradation
            .try_reduce(now, &self.history, self.consecutive_error_count, self.similar_action_count, config)
    }

    pub fn note_strategy_switch(&mut self, now: u64) {
        self.last_strategy_switch_at = Some(now);
    }

    #[must_use]
    pub fn error_count_for(&self, tool_name: &str) -> u32 {
        self.tool_error_counts.get(tool_name).copied().unwrap_or(0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn args(command: &str) -> Value {
        Value::object([("command".to_string(), Value::String(command.to_string()))])
    }

    #[test]
    fn consecutive_errors_reset_on_success() {
        let mut state = SafetyState::new();
        state.record(0, "shell", args("a"), ExecutionOutcome::Error, 1, Some("boom".into()), Some("Generic".into()));
        state.record(1, "shell", args("b"), ExecutionOutcome::Error, 1, Some("boom".into()), Some("Generic".into()));
        assert_eq!(state.consecutive_error_count, 2);

        state.record(2, "shell", args("c"), ExecutionOutcome::Success, 1, None, None);
        assert_eq!(state.consecutive_error_count, 0);
    }

    #[test]
    fn similar_action_count_tracks_repeated_shape() {
        let mut state = SafetyState::new();
        let a = args("ls -la");
        state.record(0, "shell", a.clone(), ExecutionOutcome::Success, 1, None, None);
        assert_eq!(state.similar_action_count, 0);
        state.record(1, "shell", a.clone(), ExecutionOutcome::Success, 1, None, None);
        assert_eq!(state.similar_action_count, 1);
    }

    #[test]
    fn tool_error_counts_reset_on_success() {
        let mut state = SafetyState::new();
        state.record(0, "shell", args("a"), ExecutionOutcome::Error, 1, Some("x".into()), Some("Generic".into()));
        state.record(1, "shell", args("b"), ExecutionOutcome::Error, 1, Some("x".into()), Some("Generic".into()));
        assert_eq!(state.error_count_for("shell"), 2);

        state.record(2, "shell", args("c"), ExecutionOutcome::Success, 1, None, None);
        assert_eq!(state.error_count_for("shell"), 0);
    }

    #[test]
    fn tool_error_counts_are_per_tool() {
        let mut state = SafetyState::new();
        state.record(0, "shell", args("a"), ExecutionOutcome::Error, 1, Some("x".into()), Some("Generic".into()));
        state.record(1, "edit_file", args("b"), ExecutionOutcome::Error, 1, Some("x".into()), Some("Generic".into()));
        assert_eq!(state.error_count_for("shell"), 1);
        assert_eq!(state.error_count_for("edit_file"), 1);
        assert_eq!(state.error_count_for("grep"), 0);
    }

    #[test]
    fn degradation_rises_under_repeated_errors() {
        let mut state = SafetyState::new();
        for i in 0..10 {
            state.record(i, "shell", args("a"), ExecutionOutcome::Error, 1, Some("x".into()), Some("Generic".into()));
        }
        let level = state.recompute_degradation(10, 5);
        assert!(level > DegradationLevel::Normal);
    }
}
