//! Error taxonomy for the agent safety controller.
//!
//! Internal analysis routines are total: they never surface an [`Error`]
//! for an expected condition (a blocked tool, an exhausted recovery
//! strategy, an expired escalation) — those are tagged result values
//! returned from the relevant module ([`crate::self_healing::RecoveryOutcome`],
//! [`crate::escalation::TrackerStatus`]). A host that prefers a throw-style
//! API over reading those fields can opt in with
//! [`crate::self_healing::RecoveryOutcome::into_error`] or
//! [`crate::escalation::EscalationTracker::into_error`], which surface
//! [`Error::NoRecoveryAvailable`] and [`Error::EscalationExpired`]
//! respectively. Otherwise [`Error`] is reserved for conditions a host
//! cannot recover from by re-reading a result: an unrepairable
//! configuration, a corrupt checkpoint on restore, and execution failures
//! routed through
//! [`crate::facade::AgentSafetyController::handle_error_with_recovery`].

pub mod execution;

pub use execution::ExecutionFailure;

/// Result type alias for controller operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Error types for the agent safety controller.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// Configuration could not be repaired by clamping (e.g. `min_pattern_length > max_pattern_length`).
    #[error("invalid configuration: {0}")]
    ConfigInvalid(String),

    /// A checkpoint failed hash verification or could not be parsed on restore.
    #[error("checkpoint corrupt: {0}")]
    CheckpointCorrupt(String),

    /// A tool execution reported by the host; carried, never thrown internally.
    #[error("execution failed: {0}")]
    Execution(#[from] ExecutionFailure),

    /// Serialization/deserialization of a checkpoint or config string failed.
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// An escalation's response grammar was neither the expected verbs nor `modify: <text>`.
    #[error("invalid escalation response: {0}")]
    InvalidEscalationResponse(String),

    /// Requested resource (strategy, pattern, checkpoint, subtask) was not registered.
    #[error("not found: {0}")]
    NotFound(String),

    /// Every matching recovery strategy was exhausted without success. Never
    /// constructed internally; a host opts into it via
    /// [`crate::self_healing::RecoveryOutcome::into_error`] when it wants a
    /// throw-style API instead of reading `should_retry` off the tagged result.
    #[error("no recovery available for {0}")]
    NoRecoveryAvailable(String),

    /// An escalation's deadline passed with no human response. Never
    /// constructed internally; a host opts into it via
    /// [`crate::escalation::EscalationTracker::into_error`] the same way.
    #[error("escalation expired: {0}")]
    EscalationExpired(String),
}

impl Error {
    /// Whether a host could plausibly retry after this error (vs. needing
    /// to change its own configuration or inputs first).
    #[must_use]
    pub fn is_recoverable(&self) -> bool {
        match self {
            Error::Execution(failure) => failure.is_recoverable(),
            Error::ConfigInvalid(_)
            | Error::CheckpointCorrupt(_)
            | Error::Serialization(_)
            | Error::InvalidEscalationResponse(_)
            | Error::NotFound(_)
            | Error::NoRecoveryAvailable(_)
            | Error::EscalationExpired(_) => false,
        }
    }
}
