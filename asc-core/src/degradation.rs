//! Five-level safety state machine with hysteresis: decides which tools
//! are allowed, what delay or confirmation they require, and whether the
//! agent has recovered enough to step back down.

use crate::constants::defaults;
use crate::history::HistoryLog;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;

/// Safety level, monotonically increasing under pressure and falling
/// only through [`DegradationManager::try_reduce`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[repr(u8)]
pub enum DegradationLevel {
    Normal = 0,
    Warning = 1,
    Restricted = 2,
    Minimal = 3,
    Halted = 4,
}

impl DegradationLevel {
    #[must_use]
    pub fn from_u8(n: u8) -> Self {
        match n {
            0 => Self::Normal,
            1 => Self::Warning,
            2 => Self::Restricted,
            3 => Self::Minimal,
            _ => Self::Halted,
        }
    }

    /// `(lower, upper)` hysteresis bounds for this level's aggregate score.
    #[must_use]
    pub fn thresholds(self) -> (f64, f64) {
        match self {
            Self::Normal => (0.0, 0.20),
            Self::Warning => (0.15, 0.40),
            Self::Restricted => (0.35, 0.60),
            Self::Minimal => (0.55, 0.80),
            Self::Halted => (0.75, 1.00),
        }
    }

    #[must_use]
    pub fn cooldown_ms(self) -> u64 {
        match self {
            Self::Normal => 0,
            Self::Warning => 30_000,
            Self::Restricted => 60_000,
            Self::Minimal => 120_000,
            Self::Halted => 300_000,
        }
    }
}

/// Coarse bucket a tool name is mapped into for allow-list checks. The
/// source spec calls `Other` a coarse bucket and recommends config
/// overrides — [`DegradationConfig::category_for`] is that escape hatch.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ToolCategory {
    FileOperations,
    ShellCommands,
    SearchTools,
    CodeModification,
    Communication,
    Other,
}

#[must_use]
pub fn default_category_for(tool: &str) -> ToolCategory {
    match tool {
        "read_file" | "write_file" | "delete_file" | "list_directory" => ToolCategory::FileOperations,
        "shell" | "run_command" | "bash" => ToolCategory::ShellCommands,
        "search_files" | "grep" | "find" => ToolCategory::SearchTools,
        "edit_file" | "apply_patch" | "create_file" => ToolCategory::CodeModification,
        "ask_followup_question" | "request_human_help" | "send_message" => ToolCategory::Communication,
        _ => ToolCategory::Other,
    }
}

/// Per-level behavior: what's allowed, what's blocked outright, and what
/// friction (delay, confirmation, rate limit) applies to what remains.
#[derive(Debug, Clone)]
pub struct LevelPolicy {
    pub allowed_categories: HashSet<ToolCategory>,
    pub blocked_tools: HashSet<String>,
    pub requires_confirmation: bool,
    pub add_delay_ms: u64,
    pub max_actions_per_minute: Option<u32>,
}

impl LevelPolicy {
    fn all_categories() -> HashSet<ToolCategory> {
        [
            ToolCategory::FileOperations,
            ToolCategory::ShellCommands,
            ToolCategory::SearchTools,
            ToolCategory::CodeModification,
            ToolCategory::Communication,
            ToolCategory::Other,
        ]
        .into_iter()
        .collect()
    }

    fn for_level(level: DegradationLevel) -> Self {
        match level {
            DegradationLevel::Normal => Self {
                allowed_categories: Self::all_categories(),
                blocked_tools: HashSet::new(),
                requires_confirmation: false,
                add_delay_ms: 0,
                max_actions_per_minute: None,
            },
            DegradationLevel::Warning => Self {
                allowed_categories: Self::all_categories(),
                blocked_tools: HashSet::new(),
                requires_confirmation: false,
                add_delay_ms: 250,
                max_actions_per_minute: Some(30),
            },
            DegradationLevel::Restricted => Self {
                allowed_categories: [
                    ToolCategory::FileOperations,
                    ToolCategory::SearchTools,
                    ToolCategory::Communication,
                    ToolCategory::CodeModification,
                ]
                .into_iter()
                .collect(),
                blocked_tools: HashSet::new(),
                requires_confirmation: true,
                add_delay_ms: 1000,
                max_actions_per_minute: Some(15),
            },
            DegradationLevel::Minimal => Self {
                allowed_categories: [ToolCategory::SearchTools, ToolCategory::Communication]
                    .into_iter()
                    .collect(),
                blocked_tools: ["shell", "run_command", "bash", "edit_file", "apply_patch"]
                    .into_iter()
                    .map(String::from)
                    .collect(),
                requires_confirmation: true,
                add_delay_ms: 3000,
                max_actions_per_minute: Some(5),
            },
            DegradationLevel::Halted => Self {
                allowed_categories: [ToolCategory::Communication].into_iter().collect(),
                blocked_tools: HashSet::new(),
                requires_confirmation: true,
                add_delay_ms: 0,
                max_actions_per_minute: Some(1),
            },
        }
    }
}

/// Per-tool escape hatch: override the category a tool is bucketed into,
/// or exempt it from degradation-driven blocking entirely (e.g. a
/// diagnostic tool a host always wants reachable, even while Halted).
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ToolOverride {
    pub category: Option<ToolCategory>,
    pub exempt_from_degradation: bool,
}

/// Action a host takes when a level's trigger condition fires. Mirrors
/// the source spec's `{switch-strategy, request-clarification, escalate,
/// abort}` enumeration.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum DegradationAction {
    SwitchStrategy,
    RequestClarification,
    Escalate,
    Abort,
}

/// One row of the host-configurable degradation ladder. `trigger_condition`
/// documents the score band that raises this level for operators reading
/// a config dump; the actual trigger remains the weighted score crossing
/// [`DegradationLevel::thresholds`] in [`DegradationManager::apply_effects`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DegradationLevelRule {
    pub level: DegradationLevel,
    pub trigger_condition: String,
    pub action: DegradationAction,
    pub cooldown_ms: u64,
}

fn default_level_rules() -> Vec<DegradationLevelRule> {
    vec![
        DegradationLevelRule {
            level: DegradationLevel::Normal,
            trigger_condition: "score < 0.20".to_string(),
            action: DegradationAction::SwitchStrategy,
            cooldown_ms: DegradationLevel::Normal.cooldown_ms(),
        },
        DegradationLevelRule {
            level: DegradationLevel::Warning,
            trigger_condition: "score >= 0.20".to_string(),
            action: DegradationAction::SwitchStrategy,
            cooldown_ms: DegradationLevel::Warning.cooldown_ms(),
        },
        DegradationLevelRule {
            level: DegradationLevel::Restricted,
            trigger_condition: "score >= 0.40".to_string(),
            action: DegradationAction::RequestClarification,
            cooldown_ms: DegradationLevel::Restricted.cooldown_ms(),
        },
        DegradationLevelRule {
            level: DegradationLevel::Minimal,
            trigger_condition: "score >= 0.60".to_string(),
            action: DegradationAction::Escalate,
            cooldown_ms: DegradationLevel::Minimal.cooldown_ms(),
        },
        DegradationLevelRule {
            level: DegradationLevel::Halted,
            trigger_condition: "score >= 0.80".to_string(),
            action: DegradationAction::Abort,
            cooldown_ms: DegradationLevel::Halted.cooldown_ms(),
        },
    ]
}

/// Weighted-factor thresholds and per-tool overrides driving degradation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DegradationConfig {
    pub category_overrides: std::collections::HashMap<String, ToolCategory>,
    pub tool_overrides: std::collections::HashMap<String, ToolOverride>,
    pub level_rules: Vec<DegradationLevelRule>,
}

impl Default for DegradationConfig {
    fn default() -> Self {
        Self {
            category_overrides: std::collections::HashMap::new(),
            tool_overrides: std::collections::HashMap::new(),
            level_rules: default_level_rules(),
        }
    }
}

impl DegradationConfig {
    #[must_use]
    pub fn category_for(&self, tool: &str) -> ToolCategory {
        self.tool_overrides
            .get(tool)
            .and_then(|o| o.category)
            .or_else(|| self.category_overrides.get(tool).copied())
            .unwrap_or_else(|| default_category_for(tool))
    }

    #[must_use]
    pub fn is_exempt(&self, tool: &str) -> bool {
        self.tool_overrides.get(tool).is_some_and(|o| o.exempt_from_degradation)
    }

    /// Configured cooldown for `level`, falling back to
    /// [`DegradationLevel::cooldown_ms`] if `level_rules` carries no row
    /// for it (e.g. a host that only overrides some levels).
    #[must_use]
    pub fn cooldown_ms_for(&self, level: DegradationLevel) -> u64 {
        self.level_rules
            .iter()
            .find(|rule| rule.level == level)
            .map_or_else(|| level.cooldown_ms(), |rule| rule.cooldown_ms)
    }
}

/// Decision returned by [`DegradationManager::is_tool_allowed`].
#[derive(Debug, Clone, PartialEq)]
pub struct ToolAllowance {
    pub allowed: bool,
    pub reason: Option<String>,
    pub alternatives: Vec<String>,
    pub requires_confirmation: bool,
}

/// Inputs summarizing recent agent behavior, used to compute the
/// weighted degradation score. Mirrors the relevant fields of
/// [`crate::safety_state::SafetyState`] without borrowing it, so callers
/// can evaluate hypothetical scores in tests.
#[derive(Debug, Clone, Copy)]
pub struct DegradationFactors {
    pub consecutive_error_count: u32,
    pub similar_action_count: u32,
    pub time_since_last_success_ms: u64,
    pub recent_error_rate: f64,
}

impl DegradationFactors {
    #[must_use]
    pub fn from_history(history: &HistoryLog, now: u64, consecutive_error_count: u32, similar_action_count: u32) -> Self {
        let last_success_at = history
            .iter()
            .rev()
            .find(|e| !e.is_error())
            .map_or(0, |e| e.timestamp_ms);
        let time_since_last_success_ms = if history.iter().any(|e| !e.is_error()) {
            now.saturating_sub(last_success_at)
        } else {
            defaults::TIME_SINCE_SUCCESS_SCALE_MS as u64
        };
        let recent: Vec<_> = history.iter_recent(defaults::RECENT_ERROR_WINDOW).collect();
        let recent_error_rate = if recent.is_empty() {
            0.0
        } else {
            recent.iter().filter(|e| e.is_error()).count() as f64 / recent.len() as f64
        };

        Self {
            consecutive_error_count,
            similar_action_count,
            time_since_last_success_ms,
            recent_error_rate,
        }
    }

    /// The weighted-mean aggregate score in `[0, 1]` driving level transitions.
    #[must_use]
    pub fn aggregate_score(&self, semantic_match_threshold: u32) -> f64 {
        let consecutive = (self.consecutive_error_count as f64 / defaults::CONSECUTIVE_ERROR_SCALE).min(1.0);
        let similar = (self.similar_action_count as f64 / semantic_match_threshold.max(1) as f64).min(1.0);
        let time_since = (self.time_since_last_success_ms as f64 / defaults::TIME_SINCE_SUCCESS_SCALE_MS).min(1.0);
        let error_rate = self.recent_error_rate.min(1.0);

        let weights = [
            (consecutive, defaults::WEIGHT_CONSECUTIVE_ERRORS),
            (similar, defaults::WEIGHT_SIMILAR_ACTIONS),
            (time_since, defaults::WEIGHT_TIME_SINCE_SUCCESS),
            (error_rate, defaults::WEIGHT_RECENT_ERROR_RATE),
        ];
        let weight_sum: f64 = weights.iter().map(|(_, w)| w).sum();
        weights.iter().map(|(v, w)| v * w).sum::<f64>() / weight_sum
    }
}

/// Stateful safety-level machine with hysteresis around level transitions.
#[derive(Debug, Clone)]
pub struct DegradationManager {
    level: DegradationLevel,
    last_transition_at: u64,
}

impl Default for DegradationManager {
    fn default() -> Self {
        Self {
            level: DegradationLevel::Normal,
            last_transition_at: 0,
        }
    }
}

impl DegradationManager {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn level(&self) -> DegradationLevel {
        self.level
    }

    #[must_use]
    pub fn last_transition_at(&self) -> u64 {
        self.last_transition_at
    }

    /// Raw level implied by the score alone, ignoring hysteresis —
    /// exposed for diagnostics and tests.
    #[must_use]
    pub fn raw_level_for_score(score: f64) -> DegradationLevel {
        if score >= 0.8 {
            DegradationLevel::Halted
        } else if score >= 0.6 {
            DegradationLevel::Minimal
        } else if score >= 0.4 {
            DegradationLevel::Restricted
        } else if score >= 0.2 {
            DegradationLevel::Warning
        } else {
            DegradationLevel::Normal
        }
    }

    /// Re-evaluate the score against the current level and apply rising
    /// hysteresis: the level only increases, and only once the score
    /// crosses the *upper* threshold of a higher level. Falling is never
    /// driven by the score alone — it goes through the explicit recovery
    /// path in [`Self::try_reduce`], which is the only way the level can
    /// decrease. This keeps the invariant "level never decreases while
    /// `consecutive_error_count > 0`" trivially true.
    pub fn apply_effects(&mut self, now: u64, factors: DegradationFactors, semantic_match_threshold: u32) -> DegradationLevel {
        let score = factors.aggregate_score(semantic_match_threshold);
        let target = Self::raw_level_for_score(score);

        if target > self.level {
            self.level = target;
            self.last_transition_at = now;
        }

        self.level
    }

    /// Whether a host-initiated recovery attempt may succeed right now:
    /// cooldown elapsed, zero consecutive errors, at least five entries
    /// of history, and a success rate meeting the relevant bar. The
    /// cooldown is read from `config` so a host can tune it per level via
    /// [`DegradationConfig::level_rules`].
    #[must_use]
    pub fn can_reduce(
        &self,
        now: u64,
        history: &HistoryLog,
        consecutive_error_count: u32,
        similar_action_count: u32,
        config: &DegradationConfig,
    ) -> bool {
        if self.level == DegradationLevel::Normal {
            return false;
        }
        if now.saturating_sub(self.last_transition_at) < config.cooldown_ms_for(self.level) {
            return false;
        }
        if consecutive_error_count != 0 {
            return false;
        }
        if history.len() < 5 {
            return false;
        }
        let success_rate = history.recent_success_rate(5);
        success_rate >= 0.8 || (similar_action_count == 0 && success_rate >= 0.6)
    }

    /// Step the level down by one if [`Self::can_reduce`] holds.
    pub fn try_reduce(
        &mut self,
        now: u64,
        history: &HistoryLog,
        consecutive_error_count: u32,
        similar_action_count: u32,
        config: &DegradationConfig,
    ) -> bool {
        if self.can_reduce(now, history, consecutive_error_count, similar_action_count, config) {
            self.level = DegradationLevel::from_u8(self.level as u8 - 1);
            self.last_transition_at = now;
            true
        } else {
            false
        }
    }

    #[must_use]
    pub fn is_tool_allowed(&self, tool: &str, config: &DegradationConfig) -> ToolAllowance {
        if config.is_exempt(tool) {
            return ToolAllowance {
                allowed: true,
                reason: None,
                alternatives: Vec::new(),
                requires_confirmation: false,
            };
        }

        let policy = LevelPolicy::for_level(self.level);
        let category = config.category_for(tool);

        if policy.blocked_tools.contains(tool) {
            return ToolAllowance {
                allowed: false,
                reason: Some(format!("{tool} is blocked at degradation level {:?}", self.level)),
                alternatives: communication_alternatives(),
                requires_confirmation: policy.requires_confirmation,
            };
        }
        if !policy.allowed_categories.contains(&category) {
            return ToolAllowance {
                allowed: false,
                reason: Some(format!(
                    "{tool} ({category:?}) is not allowed at degradation level {:?}",
                    self.level
                )),
                alternatives: communication_alternatives(),
                requires_confirmation: policy.requires_confirmation,
            };
        }

        ToolAllowance {
            allowed: true,
            reason: None,
            alternatives: Vec::new(),
            requires_confirmation: policy.requires_confirmation,
        }
    }

    #[must_use]
    pub fn policy(&self) -> LevelPolicy {
        LevelPolicy::for_level(self.level)
    }
}

fn communication_alternatives() -> Vec<String> {
    vec!["ask_followup_question".to_string(), "request_human_help".to_string()]
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::history::ExecutionOutcome;
    use crate::value::Value;

    #[test]
    fn halted_blocks_everything_except_communication() {
        let mut manager = DegradationManager::new();
        manager.level = DegradationLevel::Halted;
        let config = DegradationConfig::default();

        let shell = manager.is_tool_allowed("shell", &config);
        assert!(!shell.allowed);

        let ask = manager.is_tool_allowed("ask_followup_question", &config);
        assert!(ask.allowed);
    }

    #[test]
    fn minimal_blocks_shell_with_alternatives() {
        let mut manager = DegradationManager::new();
        manager.level = DegradationLevel::Minimal;
        let config = DegradationConfig::default();

        let result = manager.is_tool_allowed("shell", &config);
        assert!(!result.allowed);
        assert_eq!(
            result.alternatives,
            vec!["ask_followup_question".to_string(), "request_human_help".to_string()]
        );
    }

    #[test]
    fn level_rises_only_after_crossing_upper_threshold() {
        let mut manager = DegradationManager::new();
        let factors = DegradationFactors {
            consecutive_error_count: 1,
            similar_action_count: 0,
            time_since_last_success_ms: 0,
            recent_error_rate: 0.1,
        };
        // score well below 0.20, should stay Normal
        let level = manager.apply_effects(1000, factors, 5);
        assert_eq!(level, DegradationLevel::Normal);
    }

    #[test]
    fn level_rises_to_halted_under_extreme_pressure() {
        let mut manager = DegradationManager::new();
        let factors = DegradationFactors {
            consecutive_error_count: 15,
            similar_action_count: 15,
            time_since_last_success_ms: 600_000,
            recent_error_rate: 1.0,
        };
        let level = manager.apply_effects(1000, factors, 5);
        assert_eq!(level, DegradationLevel::Halted);
    }

    #[test]
    fn level_never_decreases_while_errors_are_active() {
        let mut manager = DegradationManager::new();
        manager.level = DegradationLevel::Restricted;
        manager.last_transition_at = 0;
        let factors = DegradationFactors {
            consecutive_error_count: 3,
            similar_action_count: 0,
            time_since_last_success_ms: 0,
            recent_error_rate: 0.0,
        };
        let level = manager.apply_effects(999_999, factors, 5);
        assert!(level >= DegradationLevel::Restricted);
    }

    #[test]
    fn can_reduce_requires_cooldown_and_clean_history() {
        let mut manager = DegradationManager::new();
        manager.level = DegradationLevel::Warning;
        manager.last_transition_at = 0;

        let mut history = HistoryLog::default();
        for i in 0..5 {
            history.append(
                i,
                "shell",
                Value::object([("command".to_string(), Value::String("ls".into()))]),
                ExecutionOutcome::Success,
                1,
                None,
                None,
            );
        }

        let config = DegradationConfig::default();
        assert!(!manager.can_reduce(1000, &history, 0, 0, &config)); // cooldown not elapsed
        assert!(manager.can_reduce(40_000, &history, 0, 0, &config));
    }

    #[test]
    fn cooldown_override_shortens_recovery_wait() {
        let mut manager = DegradationManager::new();
        manager.level = DegradationLevel::Warning;
        manager.last_transition_at = 0;

        let mut history = HistoryLog::default();
        for i in 0..5 {
            history.append(
                i,
                "shell",
                Value::object([("command".to_string(), Value::String("ls".into()))]),
                ExecutionOutcome::Success,
                1,
                None,
                None,
            );
        }

        let mut config = DegradationConfig::default();
        for rule in &mut config.level_rules {
            if rule.level == DegradationLevel::Warning {
                rule.cooldown_ms = 500;
            }
        }

        assert!(manager.can_reduce(500, &history, 0, 0, &config));
        assert!(!manager.can_reduce(500, &history, 0, 0, &DegradationConfig::default()));
    }

    #[test]
    fn exempt_tool_bypasses_halted_block() {
        let mut manager = DegradationManager::new();
        manager.level = DegradationLevel::Halted;
        let mut config = DegradationConfig::default();
        config.tool_overrides.insert(
            "diagnostics".to_string(),
            ToolOverride { category: None, exempt_from_degradation: true },
        );

        let result = manager.is_tool_allowed("diagnostics", &config);
        assert!(result.allowed);
    }
}
