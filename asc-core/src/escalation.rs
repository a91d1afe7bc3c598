//! Decides when a human needs to step in, packages the context they'd
//! need to do so, and tracks that request through to resolution.

use crate::constants::defaults;
use crate::degradation::DegradationLevel;
use crate::error::Error;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Severity bucket shared by every trigger kind.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub enum Severity {
    Low,
    Medium,
    High,
    Critical,
}

/// A single condition that contributed to an escalation decision.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Trigger {
    pub name: String,
    pub severity: Severity,
    pub detail: String,
}

/// `0.7 * max(severity) + 0.3 * mean(severity)`, mapped back to a bucket.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub enum Priority {
    Low,
    Medium,
    High,
    Critical,
}

fn severity_score(s: Severity) -> f64 {
    match s {
        Severity::Low => 0.0,
        Severity::Medium => 1.0,
        Severity::High => 2.0,
        Severity::Critical => 3.0,
    }
}

fn score_to_priority(score: f64) -> Priority {
    if score >= 2.5 {
        Priority::Critical
    } else if score >= 1.5 {
        Priority::High
    } else if score >= 0.5 {
        Priority::Medium
    } else {
        Priority::Low
    }
}

/// Monotone in `max(severity)` holding the rest fixed, per the tested invariant.
#[must_use]
pub fn compute_priority(triggers: &[Trigger]) -> Priority {
    if triggers.is_empty() {
        return Priority::Low;
    }
    let scores: Vec<f64> = triggers.iter().map(|t| severity_score(t.severity)).collect();
    let max = scores.iter().cloned().fold(0.0_f64, f64::max);
    let mean = scores.iter().sum::<f64>() / scores.len() as f64;
    score_to_priority(0.7 * max + 0.3 * mean)
}

/// Inputs used to derive the standing triggers for an evaluation.
#[derive(Debug, Clone, Copy)]
pub struct EscalationInputs {
    pub degradation_level: DegradationLevel,
    pub time_stuck_ms: u64,
    pub consecutive_errors: u32,
    pub similar_actions: u32,
}

#[must_use]
pub fn collect_triggers(inputs: EscalationInputs) -> Vec<Trigger> {
    let mut triggers = Vec::new();

    let degradation_severity = match inputs.degradation_level {
        DegradationLevel::Halted => Some(Severity::High),
        DegradationLevel::Minimal => Some(Severity::Medium),
        DegradationLevel::Restricted => Some(Severity::Low),
        _ => None,
    };
    if let Some(severity) = degradation_severity {
        triggers.push(Trigger {
            name: "degradation_level".into(),
            severity,
            detail: format!("degradation level is {:?}", inputs.degradation_level),
        });
    }

    let minutes_stuck = inputs.time_stuck_ms / 60_000;
    let time_stuck_severity = if minutes_stuck >= 30 {
        Some(Severity::Critical)
    } else if minutes_stuck >= 15 {
        Some(Severity::High)
    } else if minutes_stuck >= 10 {
        Some(Severity::Medium)
    } else if minutes_stuck >= 5 {
        Some(Severity::Low)
    } else {
        None
    };
    if let Some(severity) = time_stuck_severity {
        triggers.push(Trigger {
            name: "time_stuck".into(),
            severity,
            detail: format!("stuck for {minutes_stuck} minutes"),
        });
    }

    let errors_severity = if inputs.consecutive_errors >= 15 {
        Some(Severity::Critical)
    } else if inputs.consecutive_errors >= 12 {
        Some(Severity::High)
    } else if inputs.consecutive_errors >= 8 {
        Some(Severity::Medium)
    } else if inputs.consecutive_errors >= 5 {
        Some(Severity::Low)
    } else {
        None
    };
    if let Some(severity) = errors_severity {
        triggers.push(Trigger {
            name: "consecutive_errors".into(),
            severity,
            detail: format!("{} consecutive errors", inputs.consecutive_errors),
        });
    }

    let similar_severity = if inputs.similar_actions >= 15 {
        Some(Severity::Critical)
    } else if inputs.similar_actions >= 10 {
        Some(Severity::High)
    } else if inputs.similar_actions >= 8 {
        Some(Severity::Medium)
    } else if inputs.similar_actions >= 5 {
        Some(Severity::Low)
    } else {
        None
    };
    if let Some(severity) = similar_severity {
        triggers.push(Trigger {
            name: "similar_actions".into(),
            severity,
            detail: format!("{} similar actions repeated", inputs.similar_actions),
        });
    }

    triggers
}

/// Whether the collected triggers warrant actually escalating: critical
/// or high priority always do; medium only with at least two triggers.
#[must_use]
pub fn should_escalate(triggers: &[Trigger]) -> bool {
    match compute_priority(triggers) {
        Priority::Critical | Priority::High => true,
        Priority::Medium => triggers.len() >= 2,
        Priority::Low => false,
    }
}

/// Human-readable framing of why escalation fired and what was tried.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EscalationSummary {
    pub title: String,
    pub description: String,
    pub what_attempted: Vec<String>,
    pub what_failed: Vec<String>,
    pub possible_causes: Vec<String>,
    pub suggested_fixes: Vec<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EscalationPackage {
    pub id: Uuid,
    pub priority: Priority,
    pub summary: EscalationSummary,
    pub context: Vec<String>,
    pub suggested_actions: Vec<String>,
    pub timestamp: u64,
    pub expires_at: u64,
}

fn expiry_window_ms(priority: Priority) -> u64 {
    match priority {
        Priority::Critical => defaults::ESCALATION_EXPIRY_CRITICAL_MS,
        Priority::High => defaults::ESCALATION_EXPIRY_HIGH_MS,
        Priority::Medium => defaults::ESCALATION_EXPIRY_MEDIUM_MS,
        Priority::Low => defaults::ESCALATION_EXPIRY_LOW_MS,
    }
}

#[must_use]
pub fn build_package(now: u64, triggers: &[Trigger], tool: &str) -> EscalationPackage {
    let priority = compute_priority(triggers);
    let what_failed: Vec<String> = triggers.iter().map(|t| t.detail.clone()).collect();

    EscalationPackage {
        id: Uuid::new_v4(),
        priority,
        summary: EscalationSummary {
            title: format!("Agent needs input: repeated trouble with {tool}"),
            description: format!("{} trigger(s) fired while executing {tool}", triggers.len()),
            what_attempted: vec![format!("Continued invoking {tool} under active self-healing")],
            what_failed,
            possible_causes: vec![
                "task goal may be unreachable with the current tool set".into(),
                "arguments may be systematically malformed".into(),
            ],
            suggested_fixes: vec!["review recent history and suggest a different approach".into()],
        },
        context: triggers.iter().map(|t| format!("{}: {}", t.name, t.detail)).collect(),
        suggested_actions: vec!["continue".into(), "retry".into(), "abort".into(), "modify: <instructions>".into()],
        timestamp: now,
        expires_at: now + expiry_window_ms(priority),
    }
}

/// State machine for a single escalation's lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum TrackerStatus {
    Pending,
    Acknowledged,
    Resolved,
    Expired,
}

/// How a human responded to an escalation, per the fixed response grammar.
#[derive(Debug, Clone, PartialEq)]
pub enum HumanResponse {
    Continue,
    Retry,
    Abort,
    ModifyApproach(String),
}

/// Parse a free-text response: `continue | retry | abort | modify: <text>`,
/// case-insensitively; anything else is treated as `modify_approach` with
/// the raw text as instructions.
#[must_use]
pub fn parse_human_response(raw: &str) -> HumanResponse {
    let trimmed = raw.trim();
    let lower = trimmed.to_lowercase();
    match lower.as_str() {
        "continue" => HumanResponse::Continue,
        "retry" => HumanResponse::Retry,
        "abort" => HumanResponse::Abort,
        _ if lower.starts_with("modify:") => {
            let rest = &trimmed[trimmed.to_lowercase().find(':').map_or(0, |i| i + 1)..];
            HumanResponse::ModifyApproach(rest.trim().to_string())
        }
        _ => HumanResponse::ModifyApproach(trimmed.to_string()),
    }
}

#[derive(Debug, Clone)]
pub struct EscalationTracker {
    pub package: EscalationPackage,
    pub status: TrackerStatus,
    pub response: Option<HumanResponse>,
}

impl EscalationTracker {
    #[must_use]
    pub fn new(package: EscalationPackage) -> Self {
        Self {
            package,
            status: TrackerStatus::Pending,
            response: None,
        }
    }

    pub fn acknowledge(&mut self) {
        if self.status == TrackerStatus::Pending {
            self.status = TrackerStatus::Acknowledged;
        }
    }

    /// Resolve with a human's response, unless it already expired.
    pub fn resolve(&mut self, now: u64, raw_response: &str) -> TrackerStatus {
        if now >= self.package.expires_at {
            self.status = TrackerStatus::Expired;
            return self.status;
        }
        self.response = Some(parse_human_response(raw_response));
        self.status = TrackerStatus::Resolved;
        self.status
    }

    /// Advance to `Expired` if the package's deadline has passed and the
    /// tracker hasn't already resolved.
    pub fn check_expiry(&mut self, now: u64) -> TrackerStatus {
        if self.status != TrackerStatus::Resolved && now >= self.package.expires_at {
            self.status = TrackerStatus::Expired;
        }
        self.status
    }

    /// For a host that wants a throw-style API: `Some(Error::EscalationExpired)`
    /// once the tracker has expired, `None` otherwise. Does not itself advance
    /// the state machine; call [`Self::check_expiry`] first.
    #[must_use]
    pub fn into_error(&self) -> Option<Error> {
        if self.status == TrackerStatus::Expired {
            Some(Error::EscalationExpired(self.package.id.to_string()))
        } else {
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn priority_is_monotone_in_max_severity() {
        let low = vec![Trigger { name: "a".into(), severity: Severity::Low, detail: String::new() }];
        let high = vec![Trigger { name: "a".into(), severity: Severity::High, detail: String::new() }];
        assert!(compute_priority(&high) > compute_priority(&low));
    }

    #[test]
    fn critical_consecutive_errors_yield_critical_priority() {
        let inputs = EscalationInputs {
            degradation_level: DegradationLevel::Normal,
            time_stuck_ms: 0,
            consecutive_errors: 15,
            similar_actions: 0,
        };
        let triggers = collect_triggers(inputs);
        assert_eq!(compute_priority(&triggers), Priority::Critical);
        assert!(should_escalate(&triggers));
    }

    #[test]
    fn medium_priority_requires_two_triggers() {
        let single = vec![Trigger { name: "a".into(), severity: Severity::Medium, detail: String::new() }];
        assert_eq!(compute_priority(&single), Priority::Medium);
        assert!(!should_escalate(&single));

        let double = vec![
            Trigger { name: "a".into(), severity: Severity::Medium, detail: String::new() },
            Trigger { name: "b".into(), severity: Severity::Medium, detail: String::new() },
        ];
        assert!(should_escalate(&double));
    }

    #[test]
    fn response_grammar_parses_known_verbs_case_insensitively() {
        assert_eq!(parse_human_response("CONTINUE"), HumanResponse::Continue);
        assert_eq!(parse_human_response(" retry "), HumanResponse::Retry);
        assert_eq!(parse_human_response("Abort"), HumanResponse::Abort);
    }

    #[test]
    fn response_grammar_parses_modify_with_free_text() {
        match parse_human_response("modify: try the REST API instead") {
            HumanResponse::ModifyApproach(text) => assert_eq!(text, "try the REST API instead"),
            other => panic!("expected ModifyApproach, got {other:?}"),
        }
    }

    #[test]
    fn anything_else_falls_back_to_modify_approach() {
        match parse_human_response("just use a different file") {
            HumanResponse::ModifyApproach(text) => assert_eq!(text, "just use a different file"),
            other => panic!("expected ModifyApproach, got {other:?}"),
        }
    }

    #[test]
    fn tracker_expires_past_deadline() {
        let package = build_package(0, &[Trigger { name: "a".into(), severity: Severity::Critical, detail: String::new() }], "shell");
        let mut tracker = EscalationTracker::new(package);
        let status = tracker.check_expiry(defaults::ESCALATION_EXPIRY_CRITICAL_MS + 1);
        assert_eq!(status, TrackerStatus::Expired);
    }

    #[test]
    fn expired_tracker_converts_to_escalation_expired_error() {
        let package = build_package(0, &[Trigger { name: "a".into(), severity: Severity::Critical, detail: String::new() }], "shell");
        let mut tracker = EscalationTracker::new(package);
        assert!(tracker.into_error().is_none());
        tracker.check_expiry(defaults::ESCALATION_EXPIRY_CRITICAL_MS + 1);
        match tracker.into_error() {
            Some(Error::EscalationExpired(id)) => assert_eq!(id, tracker.package.id.to_string()),
            other => panic!("expected EscalationExpired, got {other:?}"),
        }
    }

    #[test]
    fn pending_tracker_has_no_error() {
        let package = build_package(0, &[Trigger { name: "a".into(), severity: Severity::Low, detail: String::new() }], "shell");
        let tracker = EscalationTracker::new(package);
        assert!(tracker.into_error().is_none());
    }
}
