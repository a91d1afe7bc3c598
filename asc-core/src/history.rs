//! Append-only, bounded log of tool executions.
//!
//! `HistoryLog` is owned exclusively by a single [`crate::safety_state::SafetyState`].
//! Every other component borrows it for the duration of one call; nothing
//! holds a long-lived reference across host-driven turns.

use crate::constants::defaults;
use crate::value::{args_hash, Value};
use serde::{Deserialize, Serialize};
use std::collections::VecDeque;

/// Outcome of a single tool execution.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ExecutionOutcome {
    Success,
    Error,
}

/// One immutable record in the history log.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExecutionEntry {
    /// Monotonically assigned identifier, ULID-shaped (`ts` + random suffix).
    pub id: String,
    pub timestamp_ms: u64,
    pub tool_name: String,
    pub tool_args: Value,
    /// 16-hex canonical fingerprint of `tool_args`.
    pub args_hash: String,
    pub result: ExecutionOutcome,
    pub duration_ms: u64,
    pub error_message: Option<String>,
    pub error_type: Option<String>,
}

impl ExecutionEntry {
    /// `(tool_name, args_hash)` is the identity used for repetition checks;
    /// `id` alone identifies the entry for ordering purposes.
    #[must_use]
    pub fn repetition_key(&self) -> (&str, &str) {
        (self.tool_name.as_str(), self.args_hash.as_str())
    }

    #[must_use]
    pub fn is_error(&self) -> bool {
        self.result == ExecutionOutcome::Error
    }
}

/// Append-only, time- and size-bounded sequence of [`ExecutionEntry`].
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HistoryLog {
    entries: VecDeque<ExecutionEntry>,
    max_entries: usize,
    time_window_ms: u64,
    next_seq: u64,
}

impl Default for HistoryLog {
    fn default() -> Self {
        Self::new(defaults::MAX_HISTORY_ENTRIES, defaults::HISTORY_TIME_WINDOW_MS)
    }
}

impl HistoryLog {
    #[must_use]
    pub fn new(max_entries: usize, time_window_ms: u64) -> Self {
        Self {
            entries: VecDeque::new(),
            max_entries,
            time_window_ms,
            next_seq: 0,
        }
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Append a new execution, returning the fully-stamped entry.
    ///
    /// Steps: stamp timestamp and id, compute the args fingerprint, prune
    /// by the time window, then drop the oldest 20% if still over
    /// capacity before pushing the new entry — so a single burst of calls
    /// never needs more than one prune pass per append.
    pub fn append(
        &mut self,
        now: u64,
        tool_name: impl Into<String>,
        tool_args: Value,
        result: ExecutionOutcome,
        duration_ms: u64,
        error_message: Option<String>,
        error_type: Option<String>,
    ) -> &ExecutionEntry {
        let hash = args_hash(&tool_args);
        let entry = ExecutionEntry {
            id: self.next_id(now),
            timestamp_ms: now,
            tool_name: tool_name.into(),
            tool_args,
            args_hash: hash,
            result,
            duration_ms,
            error_message,
            error_type,
        };

        self.prune(now);
        if self.entries.len() >= self.max_entries {
            let retain_from = self
                .entries
                .len()
                .saturating_sub((self.max_entries as f64 * defaults::HISTORY_RETAIN_FRACTION) as usize);
            self.entries.drain(0..retain_from.min(self.entries.len()));
        }
        self.entries.push_back(entry);
        self.entries.back().expect("just pushed")
    }

    fn next_id(&mut self, now: u64) -> String {
        let seq = self.next_seq;
        self.next_seq += 1;
        format!("{now:013x}-{seq:06x}")
    }

    /// Drop entries older than the sliding time window. The size cap is
    /// enforced separately in [`Self::append`]; the two bounds are
    /// independent, not layered.
    pub fn prune(&mut self, now: u64) {
        while let Some(front) = self.entries.front() {
            if now.saturating_sub(front.timestamp_ms) > self.time_window_ms {
                self.entries.pop_front();
            } else {
                break;
            }
        }
    }

    #[must_use]
    pub fn iter_recent(&self, n: usize) -> impl DoubleEndedIterator<Item = &ExecutionEntry> {
        let skip = self.entries.len().saturating_sub(n);
        self.entries.iter().skip(skip)
    }

    #[must_use]
    pub fn iter_since(&self, t: u64) -> impl Iterator<Item = &ExecutionEntry> {
        self.entries.iter().filter(move |e| e.timestamp_ms >= t)
    }

    #[must_use]
    pub fn iter(&self) -> impl DoubleEndedIterator<Item = &ExecutionEntry> {
        self.entries.iter()
    }

    #[must_use]
    pub fn last(&self) -> Option<&ExecutionEntry> {
        self.entries.back()
    }

    /// Count of retained entries sharing `(tool, args_hash)` with `key`.
    #[must_use]
    pub fn count_matching(&self, tool_name: &str, hash: &str) -> usize {
        self.entries
            .iter()
            .filter(|e| e.tool_name == tool_name && e.args_hash == hash)
            .count()
    }

    /// Success rate over the most recent `n` entries (1.0 if empty).
    #[must_use]
    pub fn recent_success_rate(&self, n: usize) -> f64 {
        let recent: Vec<&ExecutionEntry> = self.iter_recent(n).collect();
        if recent.is_empty() {
            return 1.0;
        }
        let successes = recent.iter().filter(|e| !e.is_error()).count();
        successes as f64 / recent.len() as f64
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn args(command: &str) -> Value {
        Value::object([("command".to_string(), Value::String(command.to_string()))])
    }

    #[test]
    fn append_assigns_monotonic_ids() {
        let mut log = HistoryLog::default();
        log.append(1000, "shell", args("ls"), ExecutionOutcome::Success, 5, None, None);
        log.append(1001, "shell", args("ls"), ExecutionOutcome::Success, 5, None, None);
        let ids: Vec<&str> = log.iter().map(|e| e.id.as_str()).collect();
        assert!(ids[0] < ids[1]);
    }

    #[test]
    fn size_cap_is_enforced_after_append() {
        let mut log = HistoryLog::new(5, 60_000);
        for i in 0..20 {
            log.append(
                1000 + i,
                "shell",
                args(&format!("cmd{i}")),
                ExecutionOutcome::Success,
                1,
                None,
                None,
            );
            assert!(log.len() <= 5);
        }
    }

    #[test]
    fn time_window_prunes_stale_entries() {
        let mut log = HistoryLog::new(100, 1000);
        log.append(0, "shell", args("a"), ExecutionOutcome::Success, 1, None, None);
        log.append(5000, "shell", args("b"), ExecutionOutcome::Success, 1, None, None);
        assert_eq!(log.len(), 1);
        assert_eq!(log.last().unwrap().tool_args.as_object().unwrap()["command"], Value::String("b".into()));
    }

    #[test]
    fn count_matching_tracks_repetition_key() {
        let mut log = HistoryLog::default();
        let a = args("ls -la");
        log.append(0, "shell", a.clone(), ExecutionOutcome::Success, 1, None, None);
        log.append(1, "shell", a.clone(), ExecutionOutcome::Success, 1, None, None);
        log.append(2, "shell", args("pwd"), ExecutionOutcome::Success, 1, None, None);

        let hash = args_hash(&a);
        assert_eq!(log.count_matching("shell", &hash), 2);
    }

    #[test]
    fn recent_success_rate_accounts_for_errors() {
        let mut log = HistoryLog::default();
        log.append(0, "shell", args("a"), ExecutionOutcome::Success, 1, None, None);
        log.append(1, "shell", args("b"), ExecutionOutcome::Error, 1, Some("boom".into()), Some("Generic".into()));
        assert_eq!(log.recent_success_rate(10), 0.5);
    }

    #[test]
    fn recent_success_rate_defaults_to_one_when_empty() {
        let log = HistoryLog::default();
        assert_eq!(log.recent_success_rate(10), 1.0);
    }

    #[test]
    fn prune_is_idempotent() {
        let mut log = HistoryLog::new(100, 1000);
        log.append(0, "shell", args("a"), ExecutionOutcome::Success, 1, None, None);
        log.prune(5000);
        let len_after_first = log.len();
        log.prune(5000);
        assert_eq!(log.len(), len_after_first);
    }
}
