//! Structural similarity between argument value trees, plus the
//! oscillation and gradual-change patterns built on top of it.

use crate::history::ExecutionEntry;
use crate::value::Value;
use std::collections::HashSet;

/// Computes structural similarity between canonicalized value trees.
#[derive(Debug, Clone, Copy, Default)]
pub struct SimilarityAnalyzer;

impl SimilarityAnalyzer {
    #[must_use]
    pub fn new() -> Self {
        Self
    }

    /// Similarity in `[0, 1]`. Identical values score 1; values of
    /// different primitive kinds score 0; everything else is a
    /// type-specific blend.
    #[must_use]
    pub fn similarity(&self, a: &Value, b: &Value) -> f64 {
        match (a, b) {
            (Value::Null, Value::Null) => 1.0,
            (Value::Bool(x), Value::Bool(y)) => {
                if x == y {
                    1.0
                } else {
                    0.0
                }
            }
            (Value::Number(x), Value::Number(y)) => Self::number_similarity(*x, *y),
            (Value::String(x), Value::String(y)) => Self::string_similarity(x, y),
            (Value::Array(x), Value::Array(y)) => self.array_similarity(x, y),
            (Value::Object(x), Value::Object(y)) => {
                if x == y {
                    return 1.0;
                }
                let keys: HashSet<&String> = x.keys().chain(y.keys()).collect();
                if keys.is_empty() {
                    return 1.0;
                }
                let total: f64 = keys
                    .iter()
                    .map(|k| match (x.get(*k), y.get(*k)) {
                        (Some(va), Some(vb)) => self.similarity(va, vb),
                        _ => 0.0,
                    })
                    .sum();
                total / keys.len() as f64
            }
            _ => 0.0,
        }
    }

    fn number_similarity(a: f64, b: f64) -> f64 {
        if a == b {
            return 1.0;
        }
        let denom = a.abs().max(b.abs()).max(1.0);
        1.0 - ((a - b).abs() / denom).min(1.0)
    }

    fn string_similarity(a: &str, b: &str) -> f64 {
        if a == b {
            return 1.0;
        }
        let tokens_a: HashSet<String> = a.to_lowercase().split_whitespace().map(String::from).collect();
        let tokens_b: HashSet<String> = b.to_lowercase().split_whitespace().map(String::from).collect();
        if tokens_a.is_empty() && tokens_b.is_empty() {
            return 1.0;
        }
        let intersection = tokens_a.intersection(&tokens_b).count();
        let union = tokens_a.union(&tokens_b).count();
        if union == 0 {
            0.0
        } else {
            intersection as f64 / union as f64
        }
    }

    fn array_similarity(&self, a: &[Value], b: &[Value]) -> f64 {
        if a.is_empty() && b.is_empty() {
            return 1.0;
        }
        let pair_count = a.len().min(b.len());
        let pairwise: f64 = (0..pair_count).map(|i| self.similarity(&a[i], &b[i])).sum();
        let base = if pair_count == 0 {
            0.0
        } else {
            pairwise / pair_count as f64
        };
        let len_penalty = 1.0
            - (a.len().abs_diff(b.len()) as f64 / a.len().max(b.len()).max(1) as f64);
        base * len_penalty
    }
}

/// A/B/A/B alternation on the same tool where the within-group similarity
/// is high but the across-group similarity is low.
#[must_use]
pub fn detect_oscillation(
    analyzer: &SimilarityAnalyzer,
    entries: &[&ExecutionEntry],
    sim_threshold: f64,
) -> Option<f64> {
    if entries.len() < 4 {
        return None;
    }
    let last4 = &entries[entries.len() - 4..];
    let tool = &last4[0].tool_name;
    if !last4.iter().all(|e| &e.tool_name == tool) {
        return None;
    }

    let a1 = &last4[0].tool_args;
    let b1 = &last4[1].tool_args;
    let a2 = &last4[2].tool_args;
    let b2 = &last4[3].tool_args;

    let within_a = analyzer.similarity(a1, a2);
    let within_b = analyzer.similarity(b1, b2);
    let across = analyzer.similarity(a1, b1);

    if within_a >= sim_threshold && within_b >= sim_threshold && across < sim_threshold {
        Some((within_a + within_b) / 2.0)
    } else {
        None
    }
}

/// A monotone similarity series with small per-step deltas but a large
/// cumulative delta: the agent is drifting, not looping, but still
/// warrants attention.
#[must_use]
pub fn detect_gradual_change(
    analyzer: &SimilarityAnalyzer,
    entries: &[&ExecutionEntry],
    step_delta_max: f64,
    cumulative_delta_min: f64,
) -> bool {
    if entries.len() < 3 {
        return false;
    }
    let sims: Vec<f64> = entries
        .windows(2)
        .map(|pair| analyzer.similarity(&pair[0].tool_args, &pair[1].tool_args))
        .collect();

    let monotone_small_steps = sims
        .windows(2)
        .all(|pair| (pair[0] - pair[1]).abs() <= step_delta_max);

    let cumulative = analyzer.similarity(&entries[0].tool_args, &entries[entries.len() - 1].tool_args);
    let cumulative_delta = 1.0 - cumulative;

    monotone_small_steps && cumulative_delta >= cumulative_delta_min
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::history::ExecutionOutcome;

    fn entry(tool: &str, command: &str, ts: u64) -> ExecutionEntry {
        ExecutionEntry {
            id: format!("id-{ts}"),
            timestamp_ms: ts,
            tool_name: tool.to_string(),
            tool_args: Value::object([("command".to_string(), Value::String(command.to_string()))]),
            args_hash: "x".into(),
            result: ExecutionOutcome::Success,
            duration_ms: 1,
            error_message: None,
            error_type: None,
        }
    }

    #[test]
    fn identical_values_are_fully_similar() {
        let analyzer = SimilarityAnalyzer::new();
        let v = Value::String("ls -la".into());
        assert_eq!(analyzer.similarity(&v, &v), 1.0);
    }

    #[test]
    fn different_primitive_types_score_zero() {
        let analyzer = SimilarityAnalyzer::new();
        assert_eq!(analyzer.similarity(&Value::Number(1.0), &Value::String("1".into())), 0.0);
    }

    #[test]
    fn string_similarity_uses_token_jaccard() {
        let analyzer = SimilarityAnalyzer::new();
        let s = analyzer.similarity(
            &Value::String("edit the auth module".into()),
            &Value::String("edit the payments module".into()),
        );
        assert!(s > 0.4 && s < 1.0);
    }

    #[test]
    fn number_similarity_decays_with_distance() {
        let analyzer = SimilarityAnalyzer::new();
        let close = analyzer.similarity(&Value::Number(100.0), &Value::Number(101.0));
        let far = analyzer.similarity(&Value::Number(100.0), &Value::Number(1000.0));
        assert!(close > far);
    }

    #[test]
    fn object_similarity_penalizes_missing_keys() {
        let analyzer = SimilarityAnalyzer::new();
        let a = Value::object([("x".to_string(), Value::Number(1.0)), ("y".to_string(), Value::Number(2.0))]);
        let b = Value::object([("x".to_string(), Value::Number(1.0))]);
        let s = analyzer.similarity(&a, &b);
        assert!(s < 1.0 && s > 0.0);
    }

    #[test]
    fn oscillation_detected_on_aba_b_alternation() {
        let analyzer = SimilarityAnalyzer::new();
        let entries = vec![
            entry("shell", "grep foo a.rs", 0),
            entry("shell", "sed -i s/a/b/ b.rs", 1),
            entry("shell", "grep foo a.rs", 2),
            entry("shell", "sed -i s/a/b/ b.rs", 3),
        ];
        let refs: Vec<&ExecutionEntry> = entries.iter().collect();
        assert!(detect_oscillation(&analyzer, &refs, 0.85).is_some());
    }

    #[test]
    fn oscillation_not_detected_on_distinct_progressing_calls() {
        let analyzer = SimilarityAnalyzer::new();
        let entries = vec![
            entry("shell", "grep foo a.rs", 0),
            entry("shell", "grep bar b.rs", 1),
            entry("shell", "grep baz c.rs", 2),
            entry("shell", "grep qux d.rs", 3),
        ];
        let refs: Vec<&ExecutionEntry> = entries.iter().collect();
        assert!(detect_oscillation(&analyzer, &refs, 0.85).is_none());
    }
}
