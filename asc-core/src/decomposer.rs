//! Estimates how hard a task is likely to be and, when it's too hard to
//! execute as one shot, breaks it into an ordered set of subtasks.

use crate::constants::defaults;
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet, VecDeque};
use std::sync::OnceLock;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub enum ComplexityLevel {
    Trivial,
    Simple,
    Moderate,
    Complex,
    VeryComplex,
}

#[must_use]
pub fn complexity_level_for(score: f64) -> ComplexityLevel {
    if score <= 20.0 {
        ComplexityLevel::Trivial
    } else if score <= 40.0 {
        ComplexityLevel::Simple
    } else if score <= 60.0 {
        ComplexityLevel::Moderate
    } else if score <= 80.0 {
        ComplexityLevel::Complex
    } else {
        ComplexityLevel::VeryComplex
    }
}

/// Raw contributing factors, each already scaled to 0..=100. The weights
/// intentionally sum above 1.0 — this is a weighted mean over whichever
/// factors apply, not a probability distribution.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize)]
pub struct ComplexityFactors {
    pub keyword_complexity: f64,
    pub file_scope: f64,
    pub operation_complexity: f64,
    pub ambiguity: f64,
    pub constraints: f64,
    pub specification_completeness: f64,
}

const WEIGHTS: [(fn(&ComplexityFactors) -> f64, f64); 6] = [
    (|f| f.keyword_complexity, 0.30),
    (|f| f.file_scope, 0.30),
    (|f| f.operation_complexity, 0.20),
    (|f| f.ambiguity, 0.15),
    (|f| f.constraints, 0.10),
    (|f| f.specification_completeness, 0.15),
];

impl ComplexityFactors {
    #[must_use]
    pub fn weighted_score(&self) -> f64 {
        let weight_sum: f64 = WEIGHTS.iter().map(|(_, w)| w).sum();
        let total: f64 = WEIGHTS.iter().map(|(get, w)| get(self) * w).sum();
        total / weight_sum
    }
}

const COMPLEX_KEYWORDS: &[&str] = &[
    "refactor",
    "migrate",
    "redesign",
    "architecture",
    "across",
    "all files",
    "rewrite",
    "integrate",
    "authentication",
    "oauth",
];
const SCOPE_PHRASES: &[&str] = &[
    "multiple files",
    "across files",
    "across modules",
    "across the codebase",
    "many files",
    "every file",
    "several files",
    "entire codebase",
];
const AMBIGUOUS_PHRASES: &[&str] = &["somehow", "figure out", "make it better", "improve", "etc", "and so on"];
const WRITE_KEYWORDS: &[&str] = &[
    "write", "modify", "create", "delete", "update", "edit", "refactor", "rewrite", "remove", "change",
];
const VERIFY_KEYWORDS: &[&str] = &["test", "verify", "validate", "check"];

fn file_mention_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"[\w./-]+\.\w{1,6}\b").expect("static pattern is valid"))
}

/// Derive factors from a free-text task description using simple lexical
/// heuristics; a host with richer context (e.g. a repo index) can build
/// its own [`ComplexityFactors`] directly instead of calling this.
#[must_use]
pub fn estimate_factors(task: &str) -> ComplexityFactors {
    let lower = task.to_lowercase();
    let keyword_hits = COMPLEX_KEYWORDS.iter().filter(|k| lower.contains(*k)).count();
    let file_mentions = file_mention_regex().find_iter(task).count();
    let scope_hits = SCOPE_PHRASES.iter().filter(|p| lower.contains(*p)).count();
    let ambiguous_hits = AMBIGUOUS_PHRASES.iter().filter(|p| lower.contains(*p)).count();
    let word_count = task.split_whitespace().count();

    ComplexityFactors {
        keyword_complexity: (keyword_hits as f64 * 25.0).min(100.0),
        file_scope: (file_mentions as f64 * 15.0 + scope_hits as f64 * 40.0).min(100.0),
        operation_complexity: if lower.contains(" and ") || lower.contains(" then ") { 60.0 } else { 20.0 },
        ambiguity: (ambiguous_hits as f64 * 30.0).min(100.0),
        constraints: if lower.contains("must") || lower.contains("should not") { 40.0 } else { 10.0 },
        specification_completeness: if word_count < 6 { 70.0 } else { 20.0 },
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ComplexityAnalysis {
    pub score: f64,
    pub level: ComplexityLevel,
    pub factors: ComplexityFactors,
    pub estimated_steps: u32,
    pub estimated_duration_min: u32,
    pub risk: String,
    pub recommendations: Vec<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SubTaskStatus {
    Pending,
    InProgress,
    Completed,
    Blocked,
    Skipped,
}

/// Structured effort estimate for one subtask: a step count, a derived
/// duration, and a confidence in the estimate itself (lower for
/// operation subtasks inferred from ambiguous wording, higher for fixed
/// scaffold phases like `finalize`).
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct EstimatedEffort {
    pub steps: u32,
    pub duration_min: u32,
    pub confidence: f64,
}

fn effort(steps: u32, confidence: f64) -> EstimatedEffort {
    EstimatedEffort {
        steps,
        duration_min: steps * 8,
        confidence,
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SubTask {
    pub id: String,
    pub parent_id: String,
    pub title: String,
    pub description: String,
    pub order: u32,
    pub dependencies: Vec<String>,
    pub estimated_effort: EstimatedEffort,
    pub status: SubTaskStatus,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum DependencyKind {
    Requires,
    Suggests,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DependencyEdge {
    pub from: String,
    pub to: String,
    pub kind: DependencyKind,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct DependencyGraph {
    pub edges: Vec<DependencyEdge>,
    pub has_cycles: bool,
    pub execution_order: Vec<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Decomposition {
    pub task: String,
    pub subtasks: Vec<SubTask>,
    pub graph: DependencyGraph,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProgressReport {
    pub completed: Vec<String>,
    pub blocked: Vec<String>,
    pub next_ready: Vec<String>,
    pub remaining_duration_min: u32,
}

#[derive(Debug, Clone, Default)]
pub struct TaskDecomposer;

impl TaskDecomposer {
    #[must_use]
    pub fn new() -> Self {
        Self
    }

    #[must_use]
    pub fn analyze(&self, task: &str) -> ComplexityAnalysis {
        let factors = estimate_factors(task);
        let score = factors.weighted_score();
        let level = complexity_level_for(score);

        let estimated_steps = match level {
            ComplexityLevel::Trivial => 1,
            ComplexityLevel::Simple => 2,
            ComplexityLevel::Moderate => 4,
            ComplexityLevel::Complex => 7,
            ComplexityLevel::VeryComplex => 12,
        };
        let estimated_duration_min = estimated_steps * 8;

        let risk = match level {
            ComplexityLevel::Trivial | ComplexityLevel::Simple => "low",
            ComplexityLevel::Moderate => "medium",
            ComplexityLevel::Complex | ComplexityLevel::VeryComplex => "high",
        }
        .to_string();

        let mut recommendations = Vec::new();
        if self.should_decompose(score, estimated_steps) {
            recommendations.push("break this into subtasks before execution".to_string());
        }
        if factors.ambiguity > 50.0 {
            recommendations.push("clarify ambiguous wording with the requester first".to_string());
        }
        if factors.specification_completeness > 50.0 {
            recommendations.push("the description is sparse; ask for more detail or scope conservatively".to_string());
        }

        ComplexityAnalysis {
            score,
            level,
            factors,
            estimated_steps,
            estimated_duration_min,
            risk,
            recommendations,
        }
    }

    #[must_use]
    pub fn should_decompose(&self, score: f64, estimated_steps: u32) -> bool {
        score > defaults::MAX_COMPLEXITY_BEFORE_DECOMPOSE || estimated_steps > defaults::MAX_STEPS_BEFORE_DECOMPOSE
    }

    /// Build a named-phase decomposition: analyze-requirements, an
    /// optional create-checkpoint phase (when the task reads as a write
    /// operation), one subtask per operation segment, an optional
    /// verification phase (elevated risk or a test/verify keyword), and a
    /// closing finalize phase. Only the first operation subtask carries an
    /// explicit dependency; [`Self::identify_dependencies`] infers
    /// `Suggests` edges between the rest.
    #[must_use]
    pub fn decompose(&self, task: &str, parent_id: &str, analysis: &ComplexityAnalysis) -> Decomposition {
        let lower = task.to_lowercase();
        let mut subtasks = Vec::new();
        let mut order = 0u32;

        let requirements_id = format!("{parent_id}-requirements");
        subtasks.push(SubTask {
            id: requirements_id.clone(),
            parent_id: parent_id.to_string(),
            title: "Analyze requirements".to_string(),
            description: format!("Understand what \"{task}\" actually requires before touching anything."),
            order,
            dependencies: Vec::new(),
            estimated_effort: effort(1, 0.9),
            status: SubTaskStatus::Pending,
        });
        order += 1;
        let mut last_id = requirements_id;

        let needs_checkpoint = WRITE_KEYWORDS.iter().any(|k| lower.contains(k));
        if needs_checkpoint {
            let checkpoint_id = format!("{parent_id}-checkpoint");
            subtasks.push(SubTask {
                id: checkpoint_id.clone(),
                parent_id: parent_id.to_string(),
                title: "Create checkpoint".to_string(),
                description: "Seal current state before making changes, so a bad edit can be rolled back.".to_string(),
                order,
                dependencies: vec![last_id.clone()],
                estimated_effort: effort(1, 0.95),
                status: SubTaskStatus::Pending,
            });
            order += 1;
            last_id = checkpoint_id;
        }

        let segments = operation_segments(task);
        let steps_per_segment = (analysis.estimated_steps as usize / segments.len().max(1)).max(1) as u32;
        let op_confidence = (1.0 - analysis.factors.ambiguity / 100.0).clamp(0.3, 0.95);
        let mut first_op = true;
        let mut last_op_id = last_id.clone();
        for (i, segment) in segments.iter().enumerate() {
            let id = format!("{parent_id}-op-{i}");
            subtasks.push(SubTask {
                id: id.clone(),
                parent_id: parent_id.to_string(),
                title: segment.chars().take(60).collect(),
                description: (*segment).to_string(),
                order,
                dependencies: if first_op { vec![last_id.clone()] } else { Vec::new() },
                estimated_effort: effort(steps_per_segment, op_confidence),
                status: SubTaskStatus::Pending,
            });
            order += 1;
            last_op_id = id;
            first_op = false;
        }

        let needs_verification = analysis.risk != "low" || VERIFY_KEYWORDS.iter().any(|k| lower.contains(k));
        let mut last_id = last_op_id;
        if needs_verification {
            let verify_id = format!("{parent_id}-verify");
            subtasks.push(SubTask {
                id: verify_id.clone(),
                parent_id: parent_id.to_string(),
                title: "Verify".to_string(),
                description: "Run tests or otherwise confirm the change behaves as intended.".to_string(),
                order,
                dependencies: vec![last_id.clone()],
                estimated_effort: effort(1, 0.8),
                status: SubTaskStatus::Pending,
            });
            order += 1;
            last_id = verify_id;
        }

        subtasks.push(SubTask {
            id: format!("{parent_id}-finalize"),
            parent_id: parent_id.to_string(),
            title: "Finalize".to_string(),
            description: "Wrap up: summarize what changed and confirm nothing was left half-done.".to_string(),
            order,
            dependencies: vec![last_id],
            estimated_effort: effort(1, 0.9),
            status: SubTaskStatus::Pending,
        });

        let graph = self.identify_dependencies(&subtasks);
        Decomposition {
            task: task.to_string(),
            subtasks,
            graph,
        }
    }

    /// Build the dependency graph: explicit `Requires` edges from each
    /// subtask's declared `dependencies`, plus an inferred `Suggests` edge
    /// between consecutive subtasks (by `order`) when the later one
    /// declares no explicit dependency of its own. `execution_order` and
    /// `has_cycles` are computed from `Requires` edges only — a `Suggests`
    /// edge is advisory ordering, not a hard precondition.
    #[must_use]
    pub fn identify_dependencies(&self, subtasks: &[SubTask]) -> DependencyGraph {
        let mut ordered: Vec<&SubTask> = subtasks.iter().collect();
        ordered.sort_by_key(|t| t.order);

        let mut edges: Vec<DependencyEdge> = subtasks
            .iter()
            .flat_map(|t| {
                t.dependencies.iter().map(move |dep| DependencyEdge {
                    from: dep.clone(),
                    to: t.id.clone(),
                    kind: DependencyKind::Requires,
                })
            })
            .collect();

        for pair in ordered.windows(2) {
            let [prev, next] = pair else { continue };
            if next.dependencies.is_empty() {
                edges.push(DependencyEdge {
                    from: prev.id.clone(),
                    to: next.id.clone(),
                    kind: DependencyKind::Suggests,
                });
            }
        }

        let ids: Vec<String> = subtasks.iter().map(|t| t.id.clone()).collect();
        let requires: Vec<&DependencyEdge> = edges.iter().filter(|e| e.kind == DependencyKind::Requires).collect();

        let mut in_degree: HashMap<&str, u32> = ids.iter().map(|id| (id.as_str(), 0)).collect();
        let mut adjacency: HashMap<&str, Vec<&str>> = HashMap::new();
        for edge in &requires {
            *in_degree.entry(edge.to.as_str()).or_insert(0) += 1;
            adjacency.entry(edge.from.as_str()).or_default().push(edge.to.as_str());
        }

        let mut queue: VecDeque<&str> = ids
            .iter()
            .map(String::as_str)
            .filter(|id| in_degree.get(id).copied().unwrap_or(0) == 0)
            .collect();
        let mut order = Vec::new();
        let mut remaining = in_degree.clone();
        while let Some(id) = queue.pop_front() {
            order.push(id.to_string());
            if let Some(next_ids) = adjacency.get(id) {
                for next in next_ids {
                    if let Some(deg) = remaining.get_mut(next) {
                        *deg -= 1;
                        if *deg == 0 {
                            queue.push_back(next);
                        }
                    }
                }
            }
        }

        let has_cycles = order.len() != ids.len();
        DependencyGraph {
            edges,
            has_cycles,
            execution_order: order,
        }
    }

    /// Parse a decomposition an LLM produced as free text: looks for a
    /// fenced ```json block first, then the first balanced `{...}` that
    /// contains a `"subtasks"` key. Returns an empty decomposition rather
    /// than an error on anything that doesn't parse — callers fall back
    /// to the heuristic [`Self::decompose`] in that case.
    #[must_use]
    pub fn parse_llm_decomposition(&self, text: &str, task: &str) -> Decomposition {
        let candidate = extract_json_block(text);
        let parsed = candidate
            .as_deref()
            .and_then(|s| serde_json::from_str::<serde_json::Value>(s).ok());

        let subtasks = parsed
            .as_ref()
            .and_then(|v| v.get("subtasks"))
            .and_then(|v| v.as_array())
            .map(|items| {
                items
                    .iter()
                    .enumerate()
                    .filter_map(|(i, item)| {
                        let title = item.get("title").and_then(|t| t.as_str())?;
                        Some(SubTask {
                            id: format!("llm-sub-{i}"),
                            parent_id: "llm".to_string(),
                            title: title.to_string(),
                            description: item
                                .get("description")
                                .and_then(|d| d.as_str())
                                .unwrap_or(title)
                                .to_string(),
                            order: i as u32,
                            dependencies: if i == 0 { Vec::new() } else { vec![format!("llm-sub-{}", i - 1)] },
                            estimated_effort: effort(1, 0.7),
                            status: SubTaskStatus::Pending,
                        })
                    })
                    .collect::<Vec<_>>()
            })
            .unwrap_or_default();

        let graph = self.identify_dependencies(&subtasks);
        Decomposition {
            task: task.to_string(),
            subtasks,
            graph,
        }
    }

    /// Classify each subtask as completed, blocked (a dependency is
    /// neither completed nor ready), or ready-to-run, surfacing at most
    /// three ready subtasks as `next_ready`, and sum the remaining
    /// estimated duration across every subtask not yet done. A `Skipped`
    /// subtask satisfies downstream dependencies the same way a
    /// `Completed` one does.
    #[must_use]
    pub fn track_progress(&self, decomposition: &Decomposition, completed_ids: &HashSet<String>) -> ProgressReport {
        let by_id: HashMap<&str, &SubTask> = decomposition.subtasks.iter().map(|t| (t.id.as_str(), t)).collect();
        let is_done = |id: &str| completed_ids.contains(id) || by_id.get(id).is_some_and(|t| t.status == SubTaskStatus::Skipped);

        let mut blocked = Vec::new();
        let mut ready = Vec::new();
        let mut remaining_duration_min = 0u32;

        for subtask in &decomposition.subtasks {
            if is_done(&subtask.id) {
                continue;
            }
            remaining_duration_min += subtask.estimated_effort.duration_min;
            let deps_done = subtask.dependencies.iter().all(|d| is_done(d));
            if deps_done {
                ready.push(subtask.id.clone());
            } else {
                blocked.push(subtask.id.clone());
            }
        }

        ProgressReport {
            completed: completed_ids.iter().cloned().collect(),
            blocked,
            next_ready: ready.into_iter().take(3).collect(),
            remaining_duration_min,
        }
    }
}

/// Split a task description into operation-like segments on sentence
/// boundaries, falling back to the whole description when it doesn't
/// segment cleanly.
fn operation_segments(task: &str) -> Vec<&str> {
    let segments: Vec<&str> = task
        .split(|c| c == '.' || c == ';')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .collect();
    if segments.is_empty() {
        vec![task.trim()]
    } else {
        segments
    }
}

fn extract_json_block(text: &str) -> Option<String> {
    if let Some(start) = text.find("```json") {
        let after = &text[start + 7..];
        if let Some(end) = after.find("```") {
            return Some(after[..end].trim().to_string());
        }
    }
    let bytes = text.as_bytes();
    let mut start = None;
    let mut depth = 0i32;
    for (i, &b) in bytes.iter().enumerate() {
        match b {
            b'{' => {
                if depth == 0 {
                    start = Some(i);
                }
                depth += 1;
            }
            b'}' => {
                depth -= 1;
                if depth == 0 {
                    if let Some(s) = start {
                        let candidate = &text[s..=i];
                        if candidate.contains("\"subtasks\"") {
                            return Some(candidate.to_string());
                        }
                    }
                    start = None;
                }
            }
            _ => {}
        }
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn trivial_task_needs_no_decomposition() {
        let decomposer = TaskDecomposer::new();
        let analysis = decomposer.analyze("fix typo in README");
        assert!(!decomposer.should_decompose(analysis.score, analysis.estimated_steps));
    }

    #[test]
    fn sprawling_task_is_flagged_complex() {
        let decomposer = TaskDecomposer::new();
        let analysis = decomposer.analyze(
            "refactor the architecture across all files and migrate the storage layer, must not break existing tests",
        );
        assert!(analysis.level >= ComplexityLevel::Moderate);
    }

    #[test]
    fn refactor_auth_scenario_is_at_least_moderate() {
        let decomposer = TaskDecomposer::new();
        let analysis = decomposer.analyze("Refactor authentication using OAuth2 across multiple files");
        assert!(analysis.level >= ComplexityLevel::Moderate);
    }

    #[test]
    fn decompose_always_includes_requirements_and_finalize_phases() {
        let decomposer = TaskDecomposer::new();
        let analysis = decomposer.analyze("look up the current version number");
        let decomposition = decomposer.decompose("look up the current version number", "task-1", &analysis);
        assert_eq!(decomposition.subtasks.first().unwrap().id, "task-1-requirements");
        assert_eq!(decomposition.subtasks.last().unwrap().id, "task-1-finalize");
    }

    #[test]
    fn decompose_adds_checkpoint_phase_for_write_operations() {
        let decomposer = TaskDecomposer::new();
        let task = "Update the parser. Then update the tests.";
        let analysis = decomposer.analyze(task);
        let decomposition = decomposer.decompose(task, "task-1", &analysis);
        assert!(decomposition.subtasks.iter().any(|t| t.id == "task-1-checkpoint"));
    }

    #[test]
    fn decompose_skips_checkpoint_phase_for_read_only_operations() {
        let decomposer = TaskDecomposer::new();
        let task = "look up the current version number and report it";
        let analysis = decomposer.analyze(task);
        let decomposition = decomposer.decompose(task, "task-1", &analysis);
        assert!(!decomposition.subtasks.iter().any(|t| t.id == "task-1-checkpoint"));
    }

    #[test]
    fn decompose_adds_verification_phase_when_test_keyword_present() {
        let decomposer = TaskDecomposer::new();
        let task = "look up the version number and verify it matches the changelog";
        let analysis = decomposer.analyze(task);
        let decomposition = decomposer.decompose(task, "task-1", &analysis);
        assert!(decomposition.subtasks.iter().any(|t| t.id == "task-1-verify"));
    }

    #[test]
    fn sequential_operation_subtasks_without_explicit_deps_get_suggests_edges() {
        let decomposer = TaskDecomposer::new();
        let task = "Step one. Step two. Step three.";
        let analysis = decomposer.analyze(task);
        let decomposition = decomposer.decompose(task, "task-2", &analysis);
        let suggests: Vec<&DependencyEdge> = decomposition
            .graph
            .edges
            .iter()
            .filter(|e| e.kind == DependencyKind::Suggests)
            .collect();
        assert!(!suggests.is_empty(), "consecutive subtasks without explicit deps should get a Suggests edge");
    }

    #[test]
    fn execution_order_is_requires_only_topological_sort() {
        let decomposer = TaskDecomposer::new();
        let task = "Step one. Step two. Step three.";
        let analysis = decomposer.analyze(task);
        let decomposition = decomposer.decompose(task, "task-2", &analysis);
        assert!(!decomposition.graph.has_cycles);
        assert_eq!(decomposition.graph.execution_order.len(), decomposition.subtasks.len());
    }

    #[test]
    fn progress_report_distinguishes_blocked_from_ready() {
        let decomposer = TaskDecomposer::new();
        let task = "Step one. Step two. Step three.";
        let analysis = decomposer.analyze(task);
        let decomposition = decomposer.decompose(task, "task-3", &analysis);
        let mut completed = HashSet::new();
        completed.insert(decomposition.subtasks[0].id.clone());
        let report = decomposer.track_progress(&decomposition, &completed);
        assert!(report.next_ready.contains(&decomposition.subtasks[1].id));
        assert!(!report.blocked.contains(&decomposition.subtasks[1].id));
    }

    #[test]
    fn progress_report_treats_skipped_as_done_for_dependents() {
        let decomposer = TaskDecomposer::new();
        let task = "Step one. Step two.";
        let analysis = decomposer.analyze(task);
        let mut decomposition = decomposer.decompose(task, "task-4", &analysis);
        decomposition.subtasks[0].status = SubTaskStatus::Skipped;
        let completed = HashSet::new();
        let report = decomposer.track_progress(&decomposition, &completed);
        assert!(!report.blocked.iter().any(|id| id == &decomposition.subtasks[1].id));
    }

    #[test]
    fn parse_llm_decomposition_reads_fenced_json() {
        let decomposer = TaskDecomposer::new();
        let text = "Here is the plan:\n```json\n{\"subtasks\":[{\"title\":\"a\"},{\"title\":\"b\"}]}\n```\nDone.";
        let decomposition = decomposer.parse_llm_decomposition(text, "do the thing");
        assert_eq!(decomposition.subtasks.len(), 2);
    }

    #[test]
    fn parse_llm_decomposition_falls_back_to_empty_on_garbage() {
        let decomposer = TaskDecomposer::new();
        let decomposition = decomposer.parse_llm_decomposition("not json at all", "do the thing");
        assert!(decomposition.subtasks.is_empty());
    }
}
