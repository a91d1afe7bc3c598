//! Hash-sealed snapshots of agent-visible state, with diffing and
//! rollback planning on top.

use crate::constants::defaults;
use crate::degradation::DegradationLevel;
use crate::escalation::Priority;
use crate::value::Value;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::collections::BTreeMap;
use std::fmt::Write as _;

/// Why a checkpoint was created; drives retention policy.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum CheckpointReason {
    Manual,
    Auto,
    BeforeRiskyAction,
    Milestone,
    ErrorRecovery,
}

/// Everything a rollback needs to restore, independent of how the host
/// represents its own task/plan objects.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CheckpointableState {
    pub degradation_level: DegradationLevel,
    pub current_task: Option<String>,
    pub current_step: Option<u32>,
    pub plan_progress: Option<Value>,
    pub modified_files: Vec<String>,
    pub custom: Value,
}

impl CheckpointableState {
    /// Canonical string used as the hashing input; reuses [`Value`]'s
    /// canonical serialization so field order never affects the hash.
    fn canonical_string(&self) -> String {
        let mut fields = BTreeMap::new();
        fields.insert("degradation_level".to_string(), Value::Number(f64::from(self.degradation_level as u8)));
        fields.insert(
            "current_task".to_string(),
            self.current_task.clone().map_or(Value::Null, Value::String),
        );
        fields.insert(
            "current_step".to_string(),
            self.current_step.map_or(Value::Null, |s| Value::Number(f64::from(s))),
        );
        fields.insert("plan_progress".to_string(), self.plan_progress.clone().unwrap_or(Value::Null));
        fields.insert(
            "modified_files".to_string(),
            Value::Array(self.modified_files.iter().cloned().map(Value::String).collect()),
        );
        fields.insert("custom".to_string(), self.custom.clone());
        Value::Object(fields).canonical_string()
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CheckpointMetadata {
    pub reason: CheckpointReason,
    pub description: Option<String>,
    pub tags: Vec<String>,
    pub priority: Priority,
}

impl CheckpointMetadata {
    #[must_use]
    pub fn new(reason: CheckpointReason) -> Self {
        Self {
            reason,
            description: None,
            tags: Vec::new(),
            priority: Priority::Low,
        }
    }

    #[must_use]
    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }

    #[must_use]
    pub fn with_tags(mut self, tags: Vec<String>) -> Self {
        self.tags = tags;
        self
    }

    #[must_use]
    pub fn with_priority(mut self, priority: Priority) -> Self {
        self.priority = priority;
        self
    }
}

/// One entry of a best-effort snapshot of file contents at checkpoint time,
/// keyed by path with a hash of the file's contents rather than the
/// contents themselves.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FileSnapshotEntry {
    pub path: String,
    pub hash: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Checkpoint {
    pub id: String,
    pub created_at: u64,
    pub state: CheckpointableState,
    pub metadata: CheckpointMetadata,
    pub hash: String,
    pub parent_id: Option<String>,
    pub file_snapshot: Option<Vec<FileSnapshotEntry>>,
}

fn hash_state(state: &CheckpointableState) -> String {
    let digest = Sha256::digest(state.canonical_string().as_bytes());
    let mut hex = String::with_capacity(16);
    for byte in digest.iter().take(8) {
        let _ = write!(hex, "{byte:02x}");
    }
    hex
}

/// A single field-level difference between two checkpoints' state.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StateChange {
    pub path: String,
    pub old: Value,
    pub new: Value,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum FileChangeKind {
    Created,
    Modified,
    Deleted,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FileChange {
    pub path: String,
    pub kind: FileChangeKind,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CheckpointDiff {
    pub state_changes: Vec<StateChange>,
    pub file_changes: Vec<FileChange>,
}

/// What executing a rollback plan would actually do.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum RollbackStep {
    RestoreState { field: String, value: Value },
    RestoreFile { path: String },
    RunCommand { command: String },
    Notify { message: String },
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RollbackPlan {
    pub target_checkpoint_id: String,
    pub steps: Vec<RollbackStep>,
    pub can_auto_execute: bool,
}

/// Retention knobs passed to [`CheckpointManager::prune_with_policy`].
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct RetentionPolicy {
    pub max_count: usize,
    pub max_age_ms: u64,
    pub keep_milestones: bool,
    pub keep_high_priority: bool,
}

impl Default for RetentionPolicy {
    fn default() -> Self {
        Self {
            max_count: defaults::MAX_CHECKPOINTS,
            max_age_ms: defaults::MAX_CHECKPOINT_AGE_MS,
            keep_milestones: true,
            keep_high_priority: true,
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct CheckpointManager {
    checkpoints: Vec<Checkpoint>,
}

impl CheckpointManager {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn checkpoints(&self) -> &[Checkpoint] {
        &self.checkpoints
    }

    /// Seal a new checkpoint from the current state and append it.
    pub fn create(
        &mut self,
        now: u64,
        rand_suffix: u32,
        state: CheckpointableState,
        metadata: CheckpointMetadata,
        file_snapshot: Option<Vec<FileSnapshotEntry>>,
    ) -> &Checkpoint {
        let parent_id = self.checkpoints.last().map(|c| c.id.clone());
        let hash = hash_state(&state);
        let checkpoint = Checkpoint {
            id: format!("chk_{now:x}{rand_suffix:08x}"),
            created_at: now,
            state,
            metadata,
            hash,
            parent_id,
            file_snapshot,
        };
        self.checkpoints.push(checkpoint);
        self.checkpoints.last().expect("just pushed")
    }

    /// Structural and age validity: the stored hash must still match the
    /// state, and the checkpoint shouldn't be older than the retention
    /// window (a warning, not a hard failure — callers decide). Also
    /// validates that any `file_snapshot` entries carry a non-empty path
    /// and a hash shaped like the one [`hash_state`] produces.
    #[must_use]
    pub fn validate(&self, checkpoint: &Checkpoint, now: u64) -> (bool, Vec<String>) {
        let mut warnings = Vec::new();
        let recomputed = hash_state(&checkpoint.state);
        let hash_ok = recomputed == checkpoint.hash;
        if !hash_ok {
            warnings.push("stored hash does not match recomputed state hash".to_string());
        }
        if now.saturating_sub(checkpoint.created_at) > defaults::MAX_CHECKPOINT_AGE_MS {
            warnings.push("checkpoint is older than the retention window".to_string());
        }
        if let Some(entries) = &checkpoint.file_snapshot {
            for entry in entries {
                if entry.path.is_empty() {
                    warnings.push("file_snapshot entry has an empty path".to_string());
                }
                if entry.hash.len() != 16 || !entry.hash.chars().all(|c| c.is_ascii_hexdigit()) {
                    warnings.push(format!("file_snapshot entry for {} has a malformed hash", entry.path));
                }
            }
        }
        (hash_ok, warnings)
    }

    /// Field-by-field diff between two checkpoints' state, plus a
    /// best-effort file change classification against `current_files`.
    #[must_use]
    pub fn diff(&self, from: &Checkpoint, to: &Checkpoint) -> CheckpointDiff {
        let mut state_changes = Vec::new();
        macro_rules! field {
            ($name:expr, $a:expr, $b:expr) => {
                if $a != $b {
                    state_changes.push(StateChange {
                        path: $name.to_string(),
                        old: $a,
                        new: $b,
                    });
                }
            };
        }
        field!(
            "degradation_level",
            Value::Number(f64::from(from.state.degradation_level as u8)),
            Value::Number(f64::from(to.state.degradation_level as u8))
        );
        field!(
            "current_task",
            from.state.current_task.clone().map_or(Value::Null, Value::String),
            to.state.current_task.clone().map_or(Value::Null, Value::String)
        );
        field!(
            "current_step",
            from.state.current_step.map_or(Value::Null, |s| Value::Number(f64::from(s))),
            to.state.current_step.map_or(Value::Null, |s| Value::Number(f64::from(s)))
        );
        field!(
            "plan_progress",
            from.state.plan_progress.clone().unwrap_or(Value::Null),
            to.state.plan_progress.clone().unwrap_or(Value::Null)
        );
        field!("custom", from.state.custom.clone(), to.state.custom.clone());

        let from_files: std::collections::HashSet<&String> = from.state.modified_files.iter().collect();
        let to_files: std::collections::HashSet<&String> = to.state.modified_files.iter().collect();
        let mut file_changes: Vec<FileChange> = to_files
            .difference(&from_files)
            .map(|p| FileChange { path: (*p).clone(), kind: FileChangeKind::Created })
            .collect();
        file_changes.extend(
            from_files
                .difference(&to_files)
                .map(|p| FileChange { path: (*p).clone(), kind: FileChangeKind::Deleted }),
        );
        file_changes.extend(
            from_files
                .intersection(&to_files)
                .map(|p| FileChange { path: (*p).clone(), kind: FileChangeKind::Modified }),
        );

        CheckpointDiff { state_changes, file_changes }
    }

    /// Build the plan to restore `target`: state restoration steps are
    /// always auto-executable, file restoration and shell commands are
    /// not — a human (or an explicitly-confirmed tool call) must run them.
    #[must_use]
    pub fn generate_rollback_plan(&self, target: &Checkpoint) -> RollbackPlan {
        let mut steps = vec![RollbackStep::RestoreState {
            field: "degradation_level".to_string(),
            value: Value::Number(f64::from(target.state.degradation_level as u8)),
        }];
        if let Some(task) = &target.state.current_task {
            steps.push(RollbackStep::RestoreState {
                field: "current_task".to_string(),
                value: Value::String(task.clone()),
            });
        }
        let mut can_auto_execute = true;
        for path in &target.state.modified_files {
            can_auto_execute = false;
            steps.push(RollbackStep::RestoreFile { path: path.clone() });
        }
        if let Some(entries) = &target.file_snapshot {
            for entry in entries {
                can_auto_execute = false;
                steps.push(RollbackStep::RestoreFile { path: entry.path.clone() });
            }
        }
        steps.push(RollbackStep::Notify {
            message: format!("rolled back to checkpoint {}", target.id),
        });

        RollbackPlan {
            target_checkpoint_id: target.id.clone(),
            steps,
            can_auto_execute,
        }
    }

    /// Apply retention: keep at most `max_count`, drop anything older than
    /// `max_age_ms`, but never drop milestones (`keep_milestones`) or
    /// `High`/`Critical`-priority checkpoints (`keep_high_priority`) —
    /// those are "protected" and fill the quota last.
    pub fn prune(&mut self, now: u64, max_count: usize, max_age_ms: u64) {
        self.prune_with_policy(now, RetentionPolicy { max_count, max_age_ms, keep_milestones: true, keep_high_priority: true });
    }

    /// Full retention policy: protected checkpoints (milestones and/or
    /// high-priority, per the flags) are always kept; everything else is
    /// dropped once older than `max_age_ms`, then the oldest unprotected
    /// entries are dropped until `max_count` is met.
    pub fn prune_with_policy(&mut self, now: u64, policy: RetentionPolicy) {
        let is_protected = |c: &Checkpoint| {
            (policy.keep_milestones && c.metadata.reason == CheckpointReason::Milestone)
                || (policy.keep_high_priority && matches!(c.metadata.priority, Priority::High | Priority::Critical))
        };
        self.checkpoints.retain(|c| is_protected(c) || now.saturating_sub(c.created_at) <= policy.max_age_ms);
        if self.checkpoints.len() > policy.max_count {
            let drop = self.checkpoints.len() - policy.max_count;
            let mut dropped = 0;
            self.checkpoints.retain(|c| {
                if dropped < drop && !is_protected(c) {
                    dropped += 1;
                    false
                } else {
                    true
                }
            });
        }
    }
}
