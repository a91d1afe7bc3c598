//! Streaming pattern detector over the execution log: exact repeats,
//! semantically similar argument reuse, error cycles, repeating tool
//! sequences, and A/B oscillation.

use crate::constants::defaults;
use crate::history::{ExecutionEntry, HistoryLog};
use crate::similarity::{detect_oscillation, SimilarityAnalyzer};
use crate::value::Value;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Per-tool threshold overrides: a host can tune how aggressively one
/// noisy or deliberately-repetitive tool (e.g. a polling `wait_for`) fires
/// without loosening the detector for everything else.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct ToolSpecificOverride {
    pub exact_match_threshold: Option<u32>,
    pub semantic_match_threshold: Option<u32>,
    pub allowed_consecutive_errors: Option<u32>,
}

/// Configuration governing how aggressively the detector fires.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CycleDetectorConfig {
    pub exact_match_threshold: u32,
    pub exact_match_lookback_window: usize,
    pub semantic_similarity_enabled: bool,
    pub semantic_similarity_threshold: f64,
    pub semantic_match_threshold: u32,
    pub pattern_detection_enabled: bool,
    pub min_pattern_length: usize,
    pub max_pattern_length: usize,
    pub pattern_repetition_threshold: u32,
    pub max_consecutive_errors: u32,
    pub tool_specific: HashMap<String, ToolSpecificOverride>,
}

impl Default for CycleDetectorConfig {
    fn default() -> Self {
        Self {
            exact_match_threshold: defaults::EXACT_MATCH_THRESHOLD,
            exact_match_lookback_window: defaults::EXACT_MATCH_LOOKBACK_WINDOW,
            semantic_similarity_enabled: true,
            semantic_similarity_threshold: defaults::SEMANTIC_SIMILARITY_THRESHOLD,
            semantic_match_threshold: defaults::SEMANTIC_MATCH_THRESHOLD,
            pattern_detection_enabled: true,
            min_pattern_length: defaults::MIN_PATTERN_LENGTH,
            max_pattern_length: defaults::MAX_PATTERN_LENGTH,
            pattern_repetition_threshold: defaults::PATTERN_REPETITION_THRESHOLD,
            max_consecutive_errors: 5,
            tool_specific: HashMap::new(),
        }
    }
}

impl CycleDetectorConfig {
    /// Resolve `exact_match_threshold`/`semantic_match_threshold`/
    /// `max_consecutive_errors` for `tool`, preferring
    /// [`ToolSpecificOverride`] fields when present.
    #[must_use]
    pub fn resolved_for(&self, tool: &str) -> (u32, u32, u32) {
        let over = self.tool_specific.get(tool);
        (
            over.and_then(|o| o.exact_match_threshold).unwrap_or(self.exact_match_threshold),
            over.and_then(|o| o.semantic_match_threshold).unwrap_or(self.semantic_match_threshold),
            over.and_then(|o| o.allowed_consecutive_errors).unwrap_or(self.max_consecutive_errors),
        )
    }
}

/// Tagged variant describing the kind of repetition detected.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum LoopPatternKind {
    ExactRepeat,
    SimilarArgs,
    ErrorCycle,
    Oscillation,
    GradualChange,
    Pattern(Vec<String>),
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LoopPattern {
    pub kind: LoopPatternKind,
    pub tool_names: Vec<String>,
    pub occurrences: u32,
    pub confidence: f64,
    pub first_detected: u64,
    pub description: String,
}

/// What the host should do in response to a detected (or absent) loop.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SuggestedAction {
    Continue,
    SwitchStrategy,
    Clarify,
    Escalate,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DetectionResult {
    pub is_loop: bool,
    pub kind: Option<LoopPatternKind>,
    pub confidence: f64,
    pub matches: Vec<LoopPattern>,
    pub suggested_action: SuggestedAction,
}

#[derive(Debug, Clone, Copy, Default)]
pub struct CycleDetector {
    similarity: SimilarityAnalyzer,
}

impl CycleDetector {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Run every detection layer against the log in priority order. The
    /// first layer to fire wins the reported `kind`; all layers'
    /// confidences are unioned (max) into the aggregate, and every match
    /// is recorded so the host can see the full picture.
    pub fn detect(
        &self,
        now: u64,
        current_tool: &str,
        current_args: &Value,
        current_args_hash: &str,
        consecutive_error_count: u32,
        history: &HistoryLog,
        config: &CycleDetectorConfig,
    ) -> DetectionResult {
        let mut matches = Vec::new();
        let mut winning_kind: Option<LoopPatternKind> = None;
        let mut aggregate_confidence = 0.0_f64;
        let mut primary_match_count = 0u32;

        let (exact_match_threshold, semantic_match_threshold, max_consecutive_errors) = config.resolved_for(current_tool);

        // Layer 1: exact repeat.
        let lookback: Vec<&ExecutionEntry> = history.iter_recent(config.exact_match_lookback_window).collect();
        let exact_count = lookback
            .iter()
            .filter(|e| e.tool_name == current_tool && e.args_hash == current_args_hash)
            .count() as u32;
        if exact_count + 1 >= exact_match_threshold {
            let confidence = (exact_count as f64 / exact_match_threshold as f64).min(1.0);
            let pattern = LoopPattern {
                kind: LoopPatternKind::ExactRepeat,
                tool_names: vec![current_tool.to_string()],
                occurrences: exact_count + 1,
                confidence,
                first_detected: lookback
                    .iter()
                    .find(|e| e.tool_name == current_tool && e.args_hash == current_args_hash)
                    .map_or(now, |e| e.timestamp_ms),
                description: format!(
                    "Loop detected: {current_tool} called with identical arguments {} times",
                    exact_count + 1
                ),
            };
            aggregate_confidence = aggregate_confidence.max(confidence);
            primary_match_count = primary_match_count.max(exact_count + 1);
            winning_kind.get_or_insert(LoopPatternKind::ExactRepeat);
            matches.push(pattern);
        }

        // Layer 2: semantic similarity.
        if config.semantic_similarity_enabled {
            let similar_count = lookback
                .iter()
                .filter(|e| e.tool_name == current_tool)
                .filter(|e| self.similarity.similarity(&e.tool_args, current_args) >= config.semantic_similarity_threshold)
                .count() as u32;
            if similar_count >= semantic_match_threshold {
                let confidence = (similar_count as f64 / semantic_match_threshold as f64).min(1.0);
                aggregate_confidence = aggregate_confidence.max(confidence);
                primary_match_count = primary_match_count.max(similar_count);
                winning_kind.get_or_insert(LoopPatternKind::SimilarArgs);
                matches.push(LoopPattern {
                    kind: LoopPatternKind::SimilarArgs,
                    tool_names: vec![current_tool.to_string()],
                    occurrences: similar_count,
                    confidence,
                    first_detected: now,
                    description: format!(
                        "{current_tool} called with {similar_count} structurally similar argument sets"
                    ),
                });
            }
        }

        // Layer 3: error cycle.
        if consecutive_error_count >= max_consecutive_errors {
            let confidence = (consecutive_error_count as f64 / max_consecutive_errors as f64).min(1.0);
            aggregate_confidence = aggregate_confidence.max(confidence);
            primary_match_count = primary_match_count.max(consecutive_error_count);
            winning_kind.get_or_insert(LoopPatternKind::ErrorCycle);
            matches.push(LoopPattern {
                kind: LoopPatternKind::ErrorCycle,
                tool_names: vec![current_tool.to_string()],
                occurrences: consecutive_error_count,
                confidence,
                first_detected: now,
                description: format!("{consecutive_error_count} consecutive errors"),
            });
        }

        // Layer 4: repeating tool-name subsequence.
        if config.pattern_detection_enabled {
            if let Some((seq, reps)) = self.detect_pattern_cycle(history, current_tool, config) {
                let confidence = (reps as f64 / config.pattern_repetition_threshold as f64).min(1.0);
                aggregate_confidence = aggregate_confidence.max(confidence);
                primary_match_count = primary_match_count.max(reps);
                winning_kind.get_or_insert(LoopPatternKind::Pattern(seq.clone()));
                matches.push(LoopPattern {
                    kind: LoopPatternKind::Pattern(seq.clone()),
                    tool_names: seq.clone(),
                    occurrences: reps,
                    confidence,
                    first_detected: now,
                    description: format!("Tool sequence {seq:?} repeated {reps} times consecutively"),
                });
            }
        }

        // Layer 5: oscillation.
        let same_tool_recent: Vec<&ExecutionEntry> = history
            .iter_recent(defaults::RECENT_ERROR_WINDOW)
            .filter(|e| e.tool_name == current_tool)
            .collect();
        if let Some(confidence) = detect_oscillation(&self.similarity, &same_tool_recent, config.semantic_similarity_threshold) {
            aggregate_confidence = aggregate_confidence.max(confidence);
            winning_kind.get_or_insert(LoopPatternKind::Oscillation);
            matches.push(LoopPattern {
                kind: LoopPatternKind::Oscillation,
                tool_names: vec![current_tool.to_string()],
                occurrences: 4,
                confidence,
                first_detected: now,
                description: format!("{current_tool} alternating between two argument shapes"),
            });
        }

        let is_loop = winning_kind.is_some();
        let suggested_action = suggested_action_for(primary_match_count, exact_match_threshold);

        DetectionResult {
            is_loop,
            kind: winning_kind,
            confidence: aggregate_confidence,
            matches,
            suggested_action,
        }
    }

    fn detect_pattern_cycle(
        &self,
        history: &HistoryLog,
        current_tool: &str,
        config: &CycleDetectorConfig,
    ) -> Option<(Vec<String>, u32)> {
        let mut names: Vec<String> = history.iter().map(|e| e.tool_name.clone()).collect();
        names.push(current_tool.to_string());

        let mut best: Option<(Vec<String>, u32)> = None;
        for len in config.min_pattern_length..=config.max_pattern_length.min(names.len() / 2) {
            if names.len() < len * config.pattern_repetition_threshold as usize {
                continue;
            }
            let candidate = &names[names.len() - len..];
            let mut reps = 1u32;
            let mut cursor = names.len() - len;
            while cursor >= len {
                let prev = &names[cursor - len..cursor];
                if prev == candidate {
                    reps += 1;
                    cursor -= len;
                } else {
                    break;
                }
            }
            if reps >= config.pattern_repetition_threshold
                && best.as_ref().is_none_or(|(_, best_reps)| reps > *best_reps)
            {
                best = Some((candidate.to_vec(), reps));
            }
        }
        best
    }
}

/// `m >= 3T -> Escalate`, `2T <= m < 3T -> Clarify`, `T <= m < 2T -> SwitchStrategy`, else `Continue`.
#[must_use]
pub fn suggested_action_for(match_count: u32, threshold: u32) -> SuggestedAction {
    if threshold == 0 {
        return SuggestedAction::Continue;
    }
    if match_count >= 3 * threshold {
        SuggestedAction::Escalate
    } else if match_count >= 2 * threshold {
        SuggestedAction::Clarify
    } else if match_count >= threshold {
        SuggestedAction::SwitchStrategy
    } else {
        SuggestedAction::Continue
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::history::ExecutionOutcome;
    use crate::value::args_hash;

    fn shell_args(command: &str) -> Value {
        Value::object([("command".to_string(), Value::String(command.to_string()))])
    }

    #[test]
    fn exact_repeat_fires_on_third_identical_call() {
        let mut history = HistoryLog::default();
        let detector = CycleDetector::new();
        let config = CycleDetectorConfig {
            exact_match_threshold: 2,
            ..Default::default()
        };
        let args = shell_args("ls -la");
        let hash = args_hash(&args);

        history.append(0, "shell", args.clone(), ExecutionOutcome::Success, 1, None, None);
        let result = detector.detect(1, "shell", &args, &hash, 0, &history, &config);
        assert!(!result.is_loop);

        history.append(1, "shell", args.clone(), ExecutionOutcome::Success, 1, None, None);
        let result = detector.detect(2, "shell", &args, &hash, 0, &history, &config);
        assert!(result.is_loop);
        assert_eq!(result.kind, Some(LoopPatternKind::ExactRepeat));
        assert!(result.matches[0].description.contains("Loop detected"));
    }

    #[test]
    fn tool_specific_override_loosens_threshold_for_one_tool() {
        let mut history = HistoryLog::default();
        let detector = CycleDetector::new();
        let mut config = CycleDetectorConfig {
            exact_match_threshold: 2,
            ..Default::default()
        };
        config.tool_specific.insert(
            "poll_status".to_string(),
            ToolSpecificOverride {
                exact_match_threshold: Some(10),
                ..Default::default()
            },
        );
        let args = shell_args("poll");
        let hash = args_hash(&args);
        history.append(0, "poll_status", args.clone(), ExecutionOutcome::Success, 1, None, None);

        let result = detector.detect(1, "poll_status", &args, &hash, 0, &history, &config);
        assert!(!result.is_loop, "poll_status should tolerate more repeats than the default");

        let other = shell_args("other");
        let other_hash = args_hash(&other);
        history.append(1, "shell", other.clone(), ExecutionOutcome::Success, 1, None, None);
        let result = detector.detect(2, "shell", &other, &other_hash, 0, &history, &config);
        assert!(!result.is_loop);
    }

    #[test]
    fn suggested_action_escalates_past_triple_threshold() {
        assert_eq!(suggested_action_for(2, 3), SuggestedAction::Continue);
        assert_eq!(suggested_action_for(3, 3), SuggestedAction::SwitchStrategy);
        assert_eq!(suggested_action_for(6, 3), SuggestedAction::Clarify);
        assert_eq!(suggested_action_for(9, 3), SuggestedAction::Escalate);
    }

    #[test]
    fn error_cycle_fires_on_consecutive_error_threshold() {
        let history = HistoryLog::default();
        let detector = CycleDetector::new();
        let config = CycleDetectorConfig {
            max_consecutive_errors: 5,
            ..Default::default()
        };
        let args = shell_args("curl https://example.com");
        let hash = args_hash(&args);
        let result = detector.detect(0, "shell", &args, &hash, 5, &history, &config);
        assert_eq!(result.kind, Some(LoopPatternKind::ErrorCycle));
    }

    #[test]
    fn pattern_cycle_detects_repeating_tool_sequence() {
        let mut history = HistoryLog::default();
        let detector = CycleDetector::new();
        let config = CycleDetectorConfig {
            min_pattern_length: 2,
            max_pattern_length: 3,
            pattern_repetition_threshold: 2,
            exact_match_threshold: 100,
            semantic_match_threshold: 100,
            max_consecutive_errors: 100,
            ..Default::default()
        };
        for (tool, ts) in [("read_file", 0), ("edit_file", 1), ("read_file", 2)] {
            history.append(ts, tool, shell_args("x"), ExecutionOutcome::Success, 1, None, None);
        }
        let current = shell_args("y");
        let hash = args_hash(&current);
        let result = detector.detect(3, "edit_file", &current, &hash, 0, &history, &config);
        assert_eq!(
            result.kind,
            Some(LoopPatternKind::Pattern(vec!["read_file".into(), "edit_file".into()]))
        );
    }
}
