//! Single entry point a host embeds: four calls bracket every tool
//! invocation and error, so the host never has to orchestrate the
//! individual analysis components itself.

use crate::checkpoint::{CheckpointManager, CheckpointMetadata, CheckpointReason, CheckpointableState};
use crate::config::AscConfig;
use crate::cycle_detector::{CycleDetector, DetectionResult, SuggestedAction};
use crate::degradation::ToolAllowance;
use crate::error::ExecutionFailure;
use crate::escalation::{self, EscalationInputs, EscalationPackage, Trigger};
use crate::history::ExecutionOutcome;
use crate::proactive::{extract_arg_patterns, LearnedErrorPattern, PreCheckResult, PreventionContext, ProactivePrevention};
use crate::safety_state::SafetyState;
use crate::self_healing::{self, HealthReport, PreventiveAction, RecoveryOutcome, SelfHealingEngine};
use crate::value::Value;
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

/// Aggregated outcome of the pre-tool pipeline.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct BeforeResult {
    pub can_proceed: bool,
    pub warnings: Vec<String>,
    pub blockers: Vec<String>,
    pub suggestions: Vec<String>,
    pub delay_ms: u64,
    pub requires_confirmation: bool,
}

impl BeforeResult {
    fn dedupe(&mut self) {
        dedupe_strings(&mut self.warnings);
        dedupe_strings(&mut self.blockers);
        dedupe_strings(&mut self.suggestions);
    }
}

fn dedupe_strings(items: &mut Vec<String>) {
    let mut seen = std::collections::HashSet::new();
    items.retain(|s| seen.insert(s.clone()));
}

/// Aggregated outcome of the post-tool pipeline.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AfterResult {
    pub should_checkpoint: bool,
    pub checkpoint_reason: Option<CheckpointReason>,
    pub health_score: f64,
    pub recommendations: Vec<String>,
}

/// What the host should do next, independent of any specific tool call.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum NextAction {
    Continue,
    Retry { delay_ms: u64 },
    Degrade,
    Escalate,
    Halt,
    Checkpoint,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NextActionDecision {
    pub action: NextAction,
    pub reason: String,
}

#[derive(Debug, Clone)]
pub struct RecoveryDecision {
    pub recovered: bool,
    pub outcome: RecoveryOutcome,
    pub escalation_needed: bool,
    pub escalation: Option<EscalationPackage>,
}

/// The agent safety controller itself: a thin, stateless coordinator
/// over the analysis components. All mutable state lives in
/// [`SafetyState`], passed in by the host on every call.
#[derive(Debug, Default)]
pub struct AgentSafetyController {
    cycle_detector: CycleDetector,
    prevention: ProactivePrevention,
    self_healing: SelfHealingEngine,
    checkpoints: CheckpointManager,
}

impl AgentSafetyController {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn checkpoints(&self) -> &CheckpointManager {
        &self.checkpoints
    }

    /// Run before a tool call is dispatched: proactive risk checks, the
    /// degradation allow-list, and cycle detection, folded into one
    /// verdict. A blocker from any stage makes `can_proceed` false.
    pub fn before_tool(&self, now: u64, state: &SafetyState, tool: &str, args: &Value, config: &AscConfig) -> BeforeResult {
        let mut result = BeforeResult {
            can_proceed: true,
            ..Default::default()
        };

        let recent_similar_failures = state
            .history
            .iter_recent(10)
            .filter(|e| e.tool_name == tool && e.is_error())
            .count() as u32;
        let precheck: PreCheckResult =
            self.prevention
                .pre_execution_check(tool, args, PreventionContext { recent_similar_failures });
        result.warnings.extend(precheck.warnings);
        result.blockers.extend(precheck.blockers);
        result.suggestions.extend(precheck.suggestions);
        if !precheck.can_proceed {
            result.can_proceed = false;
        }

        let allowance: ToolAllowance = state.degradation.is_tool_allowed(tool, &config.degradation);
        if !allowance.allowed {
            result.can_proceed = false;
            if let Some(reason) = allowance.reason {
                result.blockers.push(reason);
            }
            result.suggestions.extend(allowance.alternatives);
        }
        result.requires_confirmation = allowance.requires_confirmation;
        result.delay_ms = state.degradation.policy().add_delay_ms;

        let hash = crate::value::args_hash(args);
        let detection: DetectionResult = self.cycle_detector.detect(
            now,
            tool,
            args,
            &hash,
            state.consecutive_error_count,
            &state.history,
            &config.cycle_detector,
        );
        if detection.is_loop {
            warn!(tool, confidence = detection.confidence, "cycle detector flagged a repeating pattern");
            match detection.suggested_action {
                SuggestedAction::Escalate => {
                    result.can_proceed = false;
                    result.blockers.push(format!("{tool} triggered repeated-pattern escalation"));
                }
                SuggestedAction::Clarify => result.warnings.push(format!("{tool} may be stuck; consider asking for clarification")),
                SuggestedAction::SwitchStrategy => result.suggestions.push(format!("try a different approach than {tool}")),
                SuggestedAction::Continue => {}
            }
        }

        if state.degradation_level() == crate::degradation::DegradationLevel::Halted {
            result.can_proceed = false;
            result.blockers.push("controller is halted; only communication tools are allowed".to_string());
        }

        result.dedupe();
        result
    }

    /// Run after a tool call completes: append to history, recompute
    /// degradation and health, attempt recovery from degradation if
    /// eligible, and decide whether this is a good moment to checkpoint.
    pub fn after_tool(
        &mut self,
        now: u64,
        state: &mut SafetyState,
        tool: &str,
        args: Value,
        outcome: ExecutionOutcome,
        duration_ms: u64,
        error_message: Option<String>,
        error_type: Option<String>,
        config: &AscConfig,
    ) -> AfterResult {
        if matches!(outcome, ExecutionOutcome::Error) {
            self.learn_from_failure(
                now,
                tool,
                &args,
                error_type.as_deref().unwrap_or("Unknown"),
                error_message.as_deref().unwrap_or(""),
            );
        }
        state.record(now, tool, args, outcome, duration_ms, error_message, error_type);

        let level_before = state.degradation_level();
        let level_after = state.recompute_degradation(now, config.cycle_detector.semantic_match_threshold);
        let degradation_rose = level_after > level_before;

        if !degradation_rose {
            state.try_recover(now, &config.degradation);
        }

        let recent_error_percent = state.history.iter_recent(10).filter(|e| e.is_error()).count() as f64 * 10.0;
        let health: HealthReport = self_healing::compute_health(
            state.consecutive_error_count,
            state.degradation_level(),
            recent_error_percent,
            state.similar_action_count,
        );

        let preventive = self_healing::needs_preventive_action(health, degradation_rose, None);
        let should_checkpoint = preventive != PreventiveAction::None;
        let checkpoint_reason = match preventive {
            PreventiveAction::Checkpoint => Some(CheckpointReason::BeforeRiskyAction),
            PreventiveAction::SlowDown | PreventiveAction::None => None,
        };

        if should_checkpoint {
            let snapshot = CheckpointableState {
                degradation_level: state.degradation_level(),
                current_task: None,
                current_step: None,
                plan_progress: None,
                modified_files: Vec::new(),
                custom: Value::Null,
            };
            self.checkpoints.create(
                now,
                (now & 0xFFFF_FFFF) as u32,
                snapshot,
                CheckpointMetadata::new(checkpoint_reason.unwrap_or(CheckpointReason::Auto)),
                None,
            );
        }

        let mut recommendations = Vec::new();
        if degradation_rose {
            recommendations.push(format!("degradation level rose to {:?}", state.degradation_level()));
        }
        if preventive == PreventiveAction::SlowDown {
            recommendations.push("health is trending down; consider slowing the pace of actions".to_string());
        }

        info!(tool, health_score = health.score, level = ?state.degradation_level(), "after_tool processed");

        AfterResult {
            should_checkpoint,
            checkpoint_reason,
            health_score: health.score,
            recommendations,
        }
    }

    /// Maximum argument fields turned into [`crate::proactive::ArgPattern`]s
    /// per learned failure — enough to distinguish call shapes without
    /// growing the pattern table unboundedly for wide argument objects.
    const MAX_LEARNED_ARG_PATTERNS: usize = 3;

    /// Learn from a failed tool call: reinforce an existing pattern for
    /// this tool/error-type pair if one is already registered, otherwise
    /// register a new one built from the call's argument shape.
    fn learn_from_failure(&self, now: u64, tool: &str, args: &Value, error_type: &str, error_message: &str) {
        let registry = self.prevention.patterns();
        let existing = registry.snapshot().into_iter().find(|p| p.tool_name == tool && p.error_type == error_type);

        match existing {
            Some(mut pattern) => {
                pattern.reinforce(now);
                registry.unregister(&pattern.id);
                registry.register(pattern);
            }
            None => {
                let mut pattern = LearnedErrorPattern::new(tool, error_type, error_message, now);
                pattern.arg_patterns = extract_arg_patterns(args, Self::MAX_LEARNED_ARG_PATTERNS);
                registry.register(pattern);
            }
        }
    }

    /// Decide what the host should do next from the current state alone,
    /// independent of any specific upcoming tool call.
    #[must_use]
    pub fn determine_next_action(&self, now: u64, state: &SafetyState) -> NextActionDecision {
        if state.degradation_level() == crate::degradation::DegradationLevel::Halted {
            return NextActionDecision {
                action: NextAction::Halt,
                reason: "degradation level is Halted".to_string(),
            };
        }

        let triggers = escalation::collect_triggers(EscalationInputs {
            degradation_level: state.degradation_level(),
            time_stuck_ms: state
                .last_strategy_switch_at
                .map_or(0, |t| now.saturating_sub(t)),
            consecutive_errors: state.consecutive_error_count,
            similar_actions: state.similar_action_count,
        });
        if escalation::should_escalate(&triggers) {
            return NextActionDecision {
                action: NextAction::Escalate,
                reason: describe_triggers(&triggers),
            };
        }

        if state.degradation_level() >= crate::degradation::DegradationLevel::Warning {
            return NextActionDecision {
                action: NextAction::Degrade,
                reason: format!("degradation level is {:?}", state.degradation_level()),
            };
        }

        NextActionDecision {
            action: NextAction::Continue,
            reason: "no active triggers".to_string(),
        }
    }

    /// Attempt recovery for a reported failure, escalating when the
    /// self-healing engine gives up.
    pub fn handle_error_with_recovery(
        &mut self,
        now: u64,
        state: &SafetyState,
        failure: &ExecutionFailure,
    ) -> RecoveryDecision {
        let outcome = self.self_healing.attempt_recovery(failure);
        let escalation_needed = !outcome.should_retry;

        let escalation = if escalation_needed {
            let triggers = vec![Trigger {
                name: "recovery_exhausted".into(),
                severity: escalation::Severity::High,
                detail: format!("self-healing exhausted retries for {failure}"),
            }];
            Some(escalation::build_package(now, &triggers, &failure.tool))
        } else {
            None
        };

        RecoveryDecision {
            recovered: outcome.success && outcome.should_retry,
            outcome,
            escalation_needed,
            escalation,
        }
    }
}

fn describe_triggers(triggers: &[Trigger]) -> String {
    triggers
        .iter()
        .map(|t| t.detail.as_str())
        .collect::<Vec<_>>()
        .join("; ")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::history::ExecutionOutcome;

    fn args(command: &str) -> Value {
        Value::object([("command".to_string(), Value::String(command.to_string()))])
    }

    #[test]
    fn before_tool_allows_benign_call_in_normal_state() {
        let controller = AgentSafetyController::new();
        let state = SafetyState::new();
        let config = AscConfig::default();
        let result = controller.before_tool(0, &state, "read_file", &args("a.rs"), &config);
        assert!(result.can_proceed);
    }

    #[test]
    fn before_tool_blocks_when_halted() {
        let controller = AgentSafetyController::new();
        let mut state = SafetyState::new();
        state.degradation = crate::degradation::DegradationManager::new();
        while state.degradation.level() != crate::degradation::DegradationLevel::Halted {
            let factors = crate::degradation::DegradationFactors {
                consecutive_error_count: 20,
                similar_action_count: 20,
                time_since_last_success_ms: 1_000_000,
                recent_error_rate: 1.0,
            };
            state.degradation.apply_effects(0, factors, 5);
        }
        let config = AscConfig::default();
        let result = controller.before_tool(0, &state, "shell", &args("ls"), &config);
        assert!(!result.can_proceed);
    }

    #[test]
    fn after_tool_reports_health_score() {
        let mut controller = AgentSafetyController::new();
        let mut state = SafetyState::new();
        let config = AscConfig::default();
        let result = controller.after_tool(0, &mut state, "shell", args("ls"), ExecutionOutcome::Success, 10, None, None, &config);
        assert!(result.health_score > 0.0);
    }

    #[test]
    fn after_tool_learns_a_pattern_from_a_failed_call() {
        let mut controller = AgentSafetyController::new();
        let mut state = SafetyState::new();
        let config = AscConfig::default();
        controller.after_tool(
            0,
            &mut state,
            "edit_file",
            args("foo.rs"),
            ExecutionOutcome::Error,
            10,
            Some("unexpected token".to_string()),
            Some("SyntaxError".to_string()),
            &config,
        );
        let snapshot = controller.prevention.patterns().snapshot();
        assert_eq!(snapshot.len(), 1);
        assert_eq!(snapshot[0].tool_name, "edit_file");
        assert_eq!(snapshot[0].error_type, "SyntaxError");
    }

    #[test]
    fn after_tool_reinforces_an_existing_pattern_on_repeat_failure() {
        let mut controller = AgentSafetyController::new();
        let mut state = SafetyState::new();
        let config = AscConfig::default();
        for _ in 0..2 {
            controller.after_tool(
                0,
                &mut state,
                "edit_file",
                args("foo.rs"),
                ExecutionOutcome::Error,
                10,
                Some("unexpected token".to_string()),
                Some("SyntaxError".to_string()),
                &config,
            );
        }
        let snapshot = controller.prevention.patterns().snapshot();
        assert_eq!(snapshot.len(), 1);
        assert_eq!(snapshot[0].frequency, 2);
    }

    #[test]
    fn determine_next_action_continues_when_healthy() {
        let controller = AgentSafetyController::new();
        let state = SafetyState::new();
        let decision = controller.determine_next_action(0, &state);
        assert_eq!(decision.action, NextAction::Continue);
    }

    #[test]
    fn handle_error_with_recovery_escalates_after_retries_exhausted() {
        let mut controller = AgentSafetyController::new();
        let state = SafetyState::new();
        let failure = ExecutionFailure::new("FileNotFound", "missing", "read_file", Value::Null);
        for _ in 0..3 {
            controller.handle_error_with_recovery(0, &state, &failure);
        }
        let decision = controller.handle_error_with_recovery(0, &state, &failure);
        assert!(decision.escalation_needed);
        assert!(decision.escalation.is_some());
    }
}
