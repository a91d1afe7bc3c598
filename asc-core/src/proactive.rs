//! Pre-execution risk checks and the registry of error patterns learned
//! from past failures, so the controller can warn before a mistake
//! repeats instead of only reacting after it does.

use crate::constants::defaults;
use crate::value::Value;
use parking_lot::RwLock;
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Arc;

/// Shell fragments that are almost never intentional in an automated agent.
const DANGEROUS_SHELL_FRAGMENTS: &[&str] = &[
    "rm -rf /",
    "rm -rf /*",
    "mkfs",
    ":(){ :|:& };:",
    "> /dev/sda",
    "dd if=/dev/zero",
    "chmod -R 777 /",
];

/// Filesystem roots a tool should never be allowed to write under.
const DANGEROUS_PATH_ROOTS: &[&str] = &["/", "/etc", "/usr", "/boot", "/sys", "/proc"];

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub enum RiskLevel {
    Low,
    Medium,
    High,
    Critical,
}

#[must_use]
pub fn risk_level_for(score: f64) -> RiskLevel {
    if score >= defaults::RISK_THRESHOLD_CRITICAL {
        RiskLevel::Critical
    } else if score >= defaults::RISK_THRESHOLD_HIGH {
        RiskLevel::High
    } else if score >= defaults::RISK_THRESHOLD_MEDIUM {
        RiskLevel::Medium
    } else {
        RiskLevel::Low
    }
}

/// Components of the risk score, each already expressed on a 0..=100 scale
/// before its weight is applied.
#[derive(Debug, Clone, Copy, Default)]
pub struct RiskFactors {
    pub destructive_potential: f64,
    pub operation_scope: f64,
    pub rollback_availability: f64,
    pub historical_errors: f64,
}

impl RiskFactors {
    #[must_use]
    pub fn weighted_score(&self) -> f64 {
        self.destructive_potential * 0.4
            + self.operation_scope * 0.3
            + self.rollback_availability * 0.2
            + self.historical_errors * 0.1
    }
}

/// How an [`ArgPattern`] is matched against a call's arguments.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ArgPatternKind {
    Exact,
    Contains,
    Regex,
    TypeName,
}

/// One field-level condition learned from a past failure: `field` names a
/// top-level key in the call's argument object, `kind` says how `value`
/// is compared against that field.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ArgPattern {
    pub field: String,
    pub kind: ArgPatternKind,
    pub value: String,
}

fn value_type_name(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "bool",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}

fn field_as_comparable(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        other => other.canonical_string(),
    }
}

fn pattern_matches(pattern: &ArgPattern, obj: &std::collections::BTreeMap<String, Value>) -> bool {
    let Some(field_value) = obj.get(&pattern.field) else {
        return false;
    };
    match pattern.kind {
        ArgPatternKind::Exact => field_as_comparable(field_value) == pattern.value,
        ArgPatternKind::Contains => field_as_comparable(field_value).contains(&pattern.value),
        ArgPatternKind::Regex => Regex::new(&pattern.value).is_ok_and(|re| re.is_match(&field_as_comparable(field_value))),
        ArgPatternKind::TypeName => value_type_name(field_value) == pattern.value,
    }
}

/// Build up to `max` [`ArgPattern`]s from a call's top-level argument
/// fields: string fields become `Contains` patterns on their value,
/// everything else becomes a `TypeName` pattern. Keys are visited in
/// sorted order ([`Value::Object`] is a `BTreeMap`), so the result is
/// deterministic for a given argument shape.
#[must_use]
pub fn extract_arg_patterns(args: &Value, max: usize) -> Vec<ArgPattern> {
    let Some(obj) = args.as_object() else {
        return Vec::new();
    };
    obj.iter()
        .take(max)
        .map(|(field, value)| match value {
            Value::String(s) => ArgPattern {
                field: field.clone(),
                kind: ArgPatternKind::Contains,
                value: s.clone(),
            },
            other => ArgPattern {
                field: field.clone(),
                kind: ArgPatternKind::TypeName,
                value: value_type_name(other).to_string(),
            },
        })
        .collect()
}

/// A pattern of argument, tool, and error type learned from a past
/// failure, used to warn before the same mistake repeats.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LearnedErrorPattern {
    pub id: String,
    pub tool_name: String,
    pub arg_patterns: Vec<ArgPattern>,
    pub error_type: String,
    pub error_message_template: String,
    pub frequency: u32,
    pub last_occurrence: u64,
    pub prevention_strategy: String,
    pub confidence: f64,
}

impl LearnedErrorPattern {
    #[must_use]
    pub fn new(tool_name: impl Into<String>, error_type: impl Into<String>, message: impl Into<String>, now: u64) -> Self {
        Self {
            id: format!("pat_{now:x}"),
            tool_name: tool_name.into(),
            arg_patterns: Vec::new(),
            error_type: error_type.into(),
            error_message_template: message.into(),
            frequency: 1,
            last_occurrence: now,
            prevention_strategy: String::new(),
            confidence: 0.5,
        }
    }

    /// Record another occurrence, nudging confidence toward 1 via
    /// `c <- c + RATE*(1-c)`, asymptotic but never quite reaching 1.
    pub fn reinforce(&mut self, now: u64) {
        self.frequency += 1;
        self.last_occurrence = now;
        self.confidence += defaults::CONFIDENCE_LEARNING_RATE * (1.0 - self.confidence);
    }

    /// Fraction of `arg_patterns` that match `args`'s corresponding
    /// fields, per each pattern's [`ArgPatternKind`]. Empty patterns, a
    /// tool-name mismatch, or non-object args all score zero.
    #[must_use]
    pub fn match_score(&self, tool: &str, args: &Value) -> f64 {
        if tool != self.tool_name || self.arg_patterns.is_empty() {
            return 0.0;
        }
        let Some(obj) = args.as_object() else {
            return 0.0;
        };
        let hits = self.arg_patterns.iter().filter(|p| pattern_matches(p, obj)).count();
        hits as f64 / self.arg_patterns.len() as f64
    }
}

/// Process-wide table of learned error patterns, explicitly managed
/// rather than an ambient singleton: callers own an `Arc` clone and are
/// responsible for tearing it down via [`PatternRegistry::clear`].
#[derive(Debug, Clone, Default)]
pub struct PatternRegistry {
    inner: Arc<RwLock<Vec<LearnedErrorPattern>>>,
}

impl PatternRegistry {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&self, pattern: LearnedErrorPattern) {
        self.inner.write().push(pattern);
    }

    /// Remove by id; returns whether anything was removed.
    pub fn unregister(&self, id: &str) -> bool {
        let mut guard = self.inner.write();
        let before = guard.len();
        guard.retain(|p| p.id != id);
        guard.len() != before
    }

    pub fn clear(&self) {
        self.inner.write().clear();
    }

    #[must_use]
    pub fn snapshot(&self) -> Vec<LearnedErrorPattern> {
        self.inner.read().clone()
    }

    /// Patterns whose `match_score` against this call meets `min_score`,
    /// highest score first.
    #[must_use]
    pub fn find_matching(&self, tool: &str, args: &Value, min_score: f64) -> Vec<(LearnedErrorPattern, f64)> {
        let mut hits: Vec<(LearnedErrorPattern, f64)> = self
            .inner
            .read()
            .iter()
            .filter_map(|p| {
                let score = p.match_score(tool, args);
                (score >= min_score).then(|| (p.clone(), score))
            })
            .collect();
        hits.sort_by(|a, b| b.1.partial_cmp(&a.1).unwrap_or(std::cmp::Ordering::Equal));
        hits
    }
}

/// Outcome of a single pre-execution check.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PreCheckResult {
    pub can_proceed: bool,
    pub warnings: Vec<String>,
    pub blockers: Vec<String>,
    pub suggestions: Vec<String>,
    pub risk_level: Option<RiskLevel>,
}

/// Prior context a check can draw on: how often this exact shape of call
/// has recently failed.
#[derive(Debug, Clone, Copy, Default)]
pub struct PreventionContext {
    pub recent_similar_failures: u32,
}

#[derive(Debug, Clone)]
pub struct ProactivePrevention {
    patterns: PatternRegistry,
    dangerous_shell: Vec<String>,
    dangerous_roots: Vec<String>,
}

impl Default for ProactivePrevention {
    fn default() -> Self {
        Self::new(PatternRegistry::new())
    }
}

impl ProactivePrevention {
    #[must_use]
    pub fn new(patterns: PatternRegistry) -> Self {
        Self {
            patterns,
            dangerous_shell: DANGEROUS_SHELL_FRAGMENTS.iter().map(|s| (*s).to_string()).collect(),
            dangerous_roots: DANGEROUS_PATH_ROOTS.iter().map(|s| (*s).to_string()).collect(),
        }
    }

    #[must_use]
    pub fn patterns(&self) -> &PatternRegistry {
        &self.patterns
    }

    /// Runs every built-in rule plus learned-pattern matching against a
    /// proposed tool call, aggregating into one verdict.
    #[must_use]
    pub fn pre_execution_check(&self, tool: &str, args: &Value, context: PreventionContext) -> PreCheckResult {
        let mut result = PreCheckResult {
            can_proceed: true,
            ..Default::default()
        };

        self.check_dangerous_shell(tool, args, &mut result);
        self.check_dangerous_paths(tool, args, &mut result);
        self.check_regex_validity(tool, args, &mut result);
        self.check_learned_patterns(tool, args, &mut result);

        if context.recent_similar_failures >= 3 {
            result.warnings.push(format!(
                "{tool} has failed in a similar shape {} times recently",
                context.recent_similar_failures
            ));
        }

        let factors = RiskFactors {
            destructive_potential: if result.blockers.is_empty() { 20.0 } else { 90.0 },
            operation_scope: if matches!(tool, "shell" | "execute_command") { 50.0 } else { 20.0 },
            rollback_availability: 30.0,
            historical_errors: f64::from(context.recent_similar_failures.min(10)) * 10.0,
        };
        let level = risk_level_for(factors.weighted_score());
        result.risk_level = Some(level);
        if level == RiskLevel::Critical {
            result.can_proceed = false;
            result
                .blockers
                .push("aggregate risk score reached the critical threshold".into());
        }

        result
    }

    fn check_dangerous_shell(&self, tool: &str, args: &Value, result: &mut PreCheckResult) {
        if !matches!(tool, "shell" | "execute_command" | "run_shell") {
            return;
        }
        let Some(command) = args.as_object().and_then(|o| o.get("command")).and_then(Value::as_str) else {
            return;
        };
        for fragment in &self.dangerous_shell {
            if command.contains(fragment.as_str()) {
                result.can_proceed = false;
                result.blockers.push(format!("command matches a known-dangerous pattern: {fragment}"));
            }
        }
    }

    fn check_dangerous_paths(&self, tool: &str, args: &Value, result: &mut PreCheckResult) {
        if !matches!(tool, "write_file" | "delete_file" | "edit_file" | "remove_path") {
            return;
        }
        let Some(path) = args.as_object().and_then(|o| o.get("path")).and_then(Value::as_str) else {
            return;
        };
        if self.dangerous_roots.iter().any(|root| path == root || path.starts_with(&format!("{root}/"))) {
            result.can_proceed = false;
            result.blockers.push(format!("{path} falls under a protected filesystem root"));
        }
    }

    fn check_regex_validity(&self, tool: &str, args: &Value, result: &mut PreCheckResult) {
        if !matches!(tool, "search" | "grep" | "find_regex") {
            return;
        }
        let Some(pattern) = args.as_object().and_then(|o| o.get("pattern")).and_then(Value::as_str) else {
            return;
        };
        if let Err(err) = Regex::new(pattern) {
            result.can_proceed = false;
            result.blockers.push(format!("regex is invalid: {err}"));
        }
    }

    fn check_learned_patterns(&self, tool: &str, args: &Value, result: &mut PreCheckResult) {
        for (pattern, score) in self.patterns.find_matching(tool, args, 0.8) {
            result.warnings.push(format!(
                "this call resembles a past {} failure (confidence {:.2}, match {:.2})",
                pattern.error_type, pattern.confidence, score
            ));
            if !pattern.prevention_strategy.is_empty() {
                result.suggestions.push(pattern.prevention_strategy.clone());
            }
        }
    }
}
