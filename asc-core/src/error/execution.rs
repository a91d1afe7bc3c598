//! The value a host passes in when a tool invocation itself failed.
//!
//! `ExecutionFailure` is never constructed by the controller — it is the
//! host's report of what went wrong, handed to
//! [`crate::facade::AgentSafetyController::after_tool`] and
//! [`crate::facade::AgentSafetyController::handle_error_with_recovery`].

use crate::value::Value;
use std::fmt;

/// An error-by-exception from host code, re-expressed as a plain value.
#[derive(Debug, Clone, PartialEq)]
pub struct ExecutionFailure {
    /// Coarse error type the self-healing registry keys strategies on
    /// (e.g. `"FileNotFound"`, `"Timeout"`, `"RateLimit"`).
    pub error_type: String,
    /// Human-readable message, also consulted for substring matches.
    pub message: String,
    /// Tool that was being executed.
    pub tool: String,
    /// Arguments the tool was called with.
    pub args: Value,
    /// Optional backtrace-like context string; never parsed, only logged.
    pub trace: Option<String>,
}

/// Error types that a host retry is generally expected to resolve without
/// any change in agent behavior (network blips, rate limiting, timeouts).
const RECOVERABLE_TYPES: &[&str] = &["Timeout", "RateLimit", "ConnectionError"];

impl ExecutionFailure {
    #[must_use]
    pub fn new(error_type: impl Into<String>, message: impl Into<String>, tool: impl Into<String>, args: Value) -> Self {
        Self {
            error_type: error_type.into(),
            message: message.into(),
            tool: tool.into(),
            args,
            trace: None,
        }
    }

    #[must_use]
    pub fn with_trace(mut self, trace: impl Into<String>) -> Self {
        self.trace = Some(trace.into());
        self
    }

    /// Whether this error type is one self-healing strategies commonly
    /// resolve with backoff alone, as opposed to needing a different
    /// action (refresh a file, fall back to another tool, ask a human).
    #[must_use]
    pub fn is_recoverable(&self) -> bool {
        RECOVERABLE_TYPES.contains(&self.error_type.as_str())
    }
}

impl fmt::Display for ExecutionFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} ({}): {}", self.error_type, self.tool, self.message)
    }
}

impl std::error::Error for ExecutionFailure {}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn timeout_is_recoverable() {
        let failure = ExecutionFailure::new("Timeout", "deadline exceeded", "fetch_url", Value::Null);
        assert!(failure.is_recoverable());
    }

    #[test]
    fn syntax_error_is_not_recoverable() {
        let failure = ExecutionFailure::new("SyntaxError", "unexpected token", "edit_file", Value::Null);
        assert!(!failure.is_recoverable());
    }

    #[test]
    fn display_includes_tool_and_message() {
        let failure = ExecutionFailure::new("Timeout", "deadline exceeded", "fetch_url", Value::Null);
        let text = failure.to_string();
        assert!(text.contains("fetch_url"));
        assert!(text.contains("deadline exceeded"));
    }
}
