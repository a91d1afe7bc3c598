//! Matches execution failures to recovery strategies and tracks an
//! overall health score used to decide preventive action.

use crate::constants::defaults;
use crate::degradation::DegradationLevel;
use crate::error::{Error, ExecutionFailure};
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Arc;

/// A single step a recovery strategy can take.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum RecoveryAction {
    Retry { delay_ms: u64 },
    Reconnect { target: String },
    RefreshFile { path: String },
    IncreaseTimeout { factor: f64 },
    FallbackTool { alternative: String },
    RequestHuman,
}

/// A registered recovery strategy. Strategies are process-wide and
/// mutated only through [`StrategyRegistry::register`] /
/// [`StrategyRegistry::unregister`] — never ambient singletons.
#[derive(Debug, Clone)]
pub struct RecoveryStrategy {
    pub id: String,
    pub applies_to_error_types: Vec<String>,
    pub applies_to_tools: Vec<String>,
    pub max_retries: u32,
    pub base_delay_ms: u64,
    pub actions: Vec<RecoveryAction>,
}

impl RecoveryStrategy {
    fn matches(&self, failure: &ExecutionFailure) -> bool {
        let type_match = self.applies_to_error_types.iter().any(|t| t == &failure.error_type)
            || self
                .applies_to_error_types
                .iter()
                .any(|t| failure.message.to_lowercase().contains(&t.to_lowercase()));
        let tool_match = self.applies_to_tools.is_empty() || self.applies_to_tools.iter().any(|t| t == &failure.tool);
        type_match && tool_match
    }
}

fn builtin_strategies() -> Vec<RecoveryStrategy> {
    vec![
        RecoveryStrategy {
            id: "FILE_NOT_FOUND".into(),
            applies_to_error_types: vec!["FileNotFound".into()],
            applies_to_tools: vec![],
            max_retries: 3,
            base_delay_ms: defaults::DEFAULT_BASE_DELAY_MS,
            actions: vec![RecoveryAction::RefreshFile { path: String::new() }, RecoveryAction::Retry { delay_ms: 0 }],
        },
        RecoveryStrategy {
            id: "PERMISSION_DENIED".into(),
            applies_to_error_types: vec!["PermissionDenied".into()],
            applies_to_tools: vec![],
            max_retries: 1,
            base_delay_ms: defaults::DEFAULT_BASE_DELAY_MS,
            actions: vec![RecoveryAction::RequestHuman],
        },
        RecoveryStrategy {
            id: "TIMEOUT".into(),
            applies_to_error_types: vec!["Timeout".into()],
            applies_to_tools: vec![],
            max_retries: 4,
            base_delay_ms: defaults::DEFAULT_BASE_DELAY_MS,
            actions: vec![RecoveryAction::IncreaseTimeout { factor: 2.0 }, RecoveryAction::Retry { delay_ms: 0 }],
        },
        RecoveryStrategy {
            id: "SYNTAX_ERROR".into(),
            applies_to_error_types: vec!["SyntaxError".into()],
            applies_to_tools: vec![],
            max_retries: 2,
            base_delay_ms: defaults::DEFAULT_BASE_DELAY_MS,
            actions: vec![RecoveryAction::FallbackTool {
                alternative: "ask_followup_question".into(),
            }],
        },
        RecoveryStrategy {
            id: "RATE_LIMIT".into(),
            applies_to_error_types: vec!["RateLimit".into()],
            applies_to_tools: vec![],
            max_retries: 5,
            base_delay_ms: 2000,
            actions: vec![RecoveryAction::Retry { delay_ms: 0 }],
        },
        RecoveryStrategy {
            id: "CONNECTION_ERROR".into(),
            applies_to_error_types: vec!["ConnectionError".into()],
            applies_to_tools: vec![],
            max_retries: 3,
            base_delay_ms: defaults::DEFAULT_BASE_DELAY_MS,
            actions: vec![RecoveryAction::Reconnect { target: String::new() }, RecoveryAction::Retry { delay_ms: 0 }],
        },
    ]
}

/// Process-wide table of recovery strategies, read during `before`/`after`
/// from an immutable snapshot that is only rebuilt on write.
#[derive(Debug, Clone)]
pub struct StrategyRegistry {
    inner: Arc<RwLock<Vec<RecoveryStrategy>>>,
}

impl Default for StrategyRegistry {
    fn default() -> Self {
        Self {
            inner: Arc::new(RwLock::new(builtin_strategies())),
        }
    }
}

impl StrategyRegistry {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Registry with no strategies at all — useful for tests that want
    /// full control over what's registered.
    #[must_use]
    pub fn empty() -> Self {
        Self {
            inner: Arc::new(RwLock::new(Vec::new())),
        }
    }

    pub fn register(&self, strategy: RecoveryStrategy) {
        let mut guard = self.inner.write();
        guard.retain(|s| s.id != strategy.id);
        guard.push(strategy);
    }

    pub fn unregister(&self, id: &str) {
        self.inner.write().retain(|s| s.id != id);
    }

    pub fn clear(&self) {
        self.inner.write().clear();
    }

    #[must_use]
    pub fn find_matching(&self, failure: &ExecutionFailure) -> Option<RecoveryStrategy> {
        self.inner.read().iter().find(|s| s.matches(failure)).cloned()
    }

    #[must_use]
    pub fn snapshot(&self) -> Vec<RecoveryStrategy> {
        self.inner.read().clone()
    }
}

/// Outcome of one recovery attempt.
#[derive(Debug, Clone, PartialEq)]
pub struct RecoveryOutcome {
    pub success: bool,
    pub action: Option<RecoveryAction>,
    pub should_retry: bool,
    pub retry_delay_ms: Option<u64>,
}

impl RecoveryOutcome {
    /// For a host that wants a throw-style API: `Some(Error::NoRecoveryAvailable)`
    /// once every matching strategy is exhausted, `None` while retrying still
    /// makes sense.
    #[must_use]
    pub fn into_error(&self, tool: &str) -> Option<Error> {
        if self.should_retry {
            None
        } else {
            Some(Error::NoRecoveryAvailable(tool.to_string()))
        }
    }
}

/// Bucketed overall health, derived from [`HealthReport::score`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum HealthStatus {
    Healthy,
    Degraded,
    Unhealthy,
    Critical,
}

#[must_use]
pub fn health_status_for(score: f64) -> HealthStatus {
    if score >= 80.0 {
        HealthStatus::Healthy
    } else if score >= 50.0 {
        HealthStatus::Degraded
    } else if score >= 20.0 {
        HealthStatus::Unhealthy
    } else {
        HealthStatus::Critical
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct HealthReport {
    pub score: f64,
    pub status: HealthStatus,
}

#[must_use]
pub fn compute_health(
    consecutive_errors: u32,
    degradation_level: DegradationLevel,
    recent_error_percent: f64,
    similar_actions: u32,
) -> HealthReport {
    let mut score = 100.0
        - 5.0 * consecutive_errors as f64
        - 20.0 * degradation_level as u8 as f64
        - 2.0 * recent_error_percent;
    if similar_actions >= 5 {
        score -= 10.0;
    }
    score = score.clamp(0.0, 100.0);
    HealthReport {
        score,
        status: health_status_for(score),
    }
}

/// Preventive action the health trajectory recommends before the next failure.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PreventiveAction {
    Checkpoint,
    SlowDown,
    None,
}

#[must_use]
pub fn needs_preventive_action(
    health: HealthReport,
    degradation_rose: bool,
    previous_score: Option<f64>,
) -> PreventiveAction {
    if degradation_rose {
        return PreventiveAction::Checkpoint;
    }
    if health.status == HealthStatus::Critical {
        return PreventiveAction::Checkpoint;
    }
    if let Some(prev) = previous_score {
        if health.score < prev && health.status == HealthStatus::Unhealthy {
            return PreventiveAction::SlowDown;
        }
    }
    PreventiveAction::None
}

/// Tracks per-strategy attempt counts and performs exponential backoff,
/// capped at 30s, with the standard `base * 2^attempt` progression.
#[derive(Debug, Default)]
pub struct SelfHealingEngine {
    registry: StrategyRegistry,
    attempts: HashMap<String, u32>,
}

impl SelfHealingEngine {
    #[must_use]
    pub fn new(registry: StrategyRegistry) -> Self {
        Self {
            registry,
            attempts: HashMap::new(),
        }
    }

    #[must_use]
    pub fn registry(&self) -> &StrategyRegistry {
        &self.registry
    }

    pub fn attempt_recovery(&mut self, failure: &ExecutionFailure) -> RecoveryOutcome {
        let Some(strategy) = self.registry.find_matching(failure) else {
            return RecoveryOutcome {
                success: false,
                action: None,
                should_retry: false,
                retry_delay_ms: None,
            };
        };

        let attempt = self.attempts.entry(strategy.id.clone()).or_insert(0);
        if *attempt >= strategy.max_retries {
            return RecoveryOutcome {
                success: false,
                action: strategy.actions.first().cloned(),
                should_retry: false,
                retry_delay_ms: None,
            };
        }

        let delay = backoff_delay(strategy.base_delay_ms, *attempt);
        *attempt += 1;

        RecoveryOutcome {
            success: true,
            action: strategy.actions.first().cloned(),
            should_retry: true,
            retry_delay_ms: Some(delay),
        }
    }

    pub fn reset(&mut self, strategy_id: &str) {
        self.attempts.remove(strategy_id);
    }
}

/// `min(base * 2^attempt, 30_000)`.
#[must_use]
pub fn backoff_delay(base_delay_ms: u64, attempt: u32) -> u64 {
    let exp = base_delay_ms.saturating_mul(1u64 << attempt.min(20));
    exp.min(defaults::MAX_BACKOFF_DELAY_MS)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::value::Value;

    fn failure(error_type: &str) -> ExecutionFailure {
        ExecutionFailure::new(error_type, "boom", "read_file", Value::Null)
    }

    #[test]
    fn backoff_follows_base_times_two_pow_attempt() {
        assert_eq!(backoff_delay(1000, 0), 1000);
        assert_eq!(backoff_delay(1000, 1), 2000);
        assert_eq!(backoff_delay(1000, 2), 4000);
    }

    #[test]
    fn backoff_is_capped_at_thirty_seconds() {
        assert_eq!(backoff_delay(1000, 10), 30_000);
    }

    #[test]
    fn file_not_found_retried_three_times_then_escalates() {
        let mut engine = SelfHealingEngine::new(StrategyRegistry::new());
        let f = failure("FileNotFound");

        let first = engine.attempt_recovery(&f);
        assert_eq!(first.retry_delay_ms, Some(1000));
        let second = engine.attempt_recovery(&f);
        assert_eq!(second.retry_delay_ms, Some(2000));
        let third = engine.attempt_recovery(&f);
        assert_eq!(third.retry_delay_ms, Some(4000));
        let fourth = engine.attempt_recovery(&f);
        assert!(!fourth.should_retry);
        match fourth.into_error("read_file") {
            Some(Error::NoRecoveryAvailable(tool)) => assert_eq!(tool, "read_file"),
            other => panic!("expected NoRecoveryAvailable, got {other:?}"),
        }
    }

    #[test]
    fn retryable_outcome_has_no_error() {
        let mut engine = SelfHealingEngine::new(StrategyRegistry::new());
        let outcome = engine.attempt_recovery(&failure("FileNotFound"));
        assert!(outcome.should_retry);
        assert!(outcome.into_error("read_file").is_none());
    }

    #[test]
    fn unmatched_error_type_yields_no_recovery() {
        let mut engine = SelfHealingEngine::new(StrategyRegistry::empty());
        let outcome = engine.attempt_recovery(&failure("SomethingWeird"));
        assert!(!outcome.success);
        assert!(!outcome.should_retry);
    }

    #[test]
    fn health_score_buckets_match_spec_thresholds() {
        assert_eq!(health_status_for(85.0), HealthStatus::Healthy);
        assert_eq!(health_status_for(60.0), HealthStatus::Degraded);
        assert_eq!(health_status_for(25.0), HealthStatus::Unhealthy);
        assert_eq!(health_status_for(5.0), HealthStatus::Critical);
    }

    #[test]
    fn compute_health_applies_similar_action_penalty() {
        let with_penalty = compute_health(0, DegradationLevel::Normal, 0.0, 5);
        let without_penalty = compute_health(0, DegradationLevel::Normal, 0.0, 4);
        assert_eq!(without_penalty.score - with_penalty.score, 10.0);
    }

    #[test]
    fn registry_register_and_unregister_round_trip() {
        let registry = StrategyRegistry::empty();
        registry.register(RecoveryStrategy {
            id: "CUSTOM".into(),
            applies_to_error_types: vec!["Custom".into()],
            applies_to_tools: vec![],
            max_retries: 1,
            base_delay_ms: 100,
            actions: vec![RecoveryAction::Retry { delay_ms: 0 }],
        });
        assert!(registry.find_matching(&failure("Custom")).is_some());
        registry.unregister("CUSTOM");
        assert!(registry.find_matching(&failure("Custom")).is_none());
    }
}
