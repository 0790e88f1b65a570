//! Error taxonomy for the scheduling core.
//!
//! Errors fall into three domains:
//! - [`MalformedProblem`]: structural defects detected before any model
//!   building (cycles, empty mode lists, dangling references). Fatal for the
//!   current solve, never retried.
//! - [`StorageError`]: the loader cannot assemble a consistent problem, or
//!   the persister cannot commit atomically.
//! - [`SolveError`]: the umbrella type returned by the driver and the CLI.
//!
//! Infeasibility and time limits are *statuses*, not errors — they are
//! reported through [`SolveStatus`](crate::models::SolveStatus) so the caller
//! can decide whether to relax and re-solve.

use thiserror::Error;

/// A single structural defect in a problem, with the offending identifiers.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum ProblemIssue {
    #[error("duplicate task position {position} in template '{template_id}' (task '{task_id}')")]
    DuplicatePosition {
        template_id: String,
        task_id: String,
        position: i32,
    },
    #[error("duplicate id '{id}' in {entity}")]
    DuplicateId { entity: &'static str, id: String },
    #[error("task '{task_id}' has no modes")]
    EmptyModes { task_id: String },
    #[error("mode '{mode_id}' of task '{task_id}' has non-positive duration {duration_units}")]
    NonPositiveDuration {
        task_id: String,
        mode_id: String,
        duration_units: i64,
    },
    #[error("precedence from task '{task_id}' to itself")]
    SelfPrecedence { task_id: String },
    #[error("precedence edge ({predecessor_id} -> {successor_id}) has max delay {max_delay} below min delay {min_delay}")]
    InvertedDelayWindow {
        predecessor_id: String,
        successor_id: String,
        min_delay: i64,
        max_delay: i64,
    },
    #[error("precedence cycle detected involving task '{task_id}'")]
    CyclicPrecedence { task_id: String },
    #[error("{entity} '{owner_id}' references unknown {target} '{reference}'")]
    DanglingReference {
        entity: &'static str,
        owner_id: String,
        target: &'static str,
        reference: String,
    },
    #[error("task '{task_id}' has operator range {min_operators}..{max_operators}")]
    InvalidOperatorRange {
        task_id: String,
        min_operators: i32,
        max_operators: i32,
    },
    #[error("instance '{instance_id}' has earliest start {earliest_start_unit}")]
    NegativeEarliestStart {
        instance_id: String,
        earliest_start_unit: i64,
    },
    #[error("instance '{instance_id}' has due {due_unit} before earliest start {earliest_start_unit}")]
    DueBeforeRelease {
        instance_id: String,
        earliest_start_unit: i64,
        due_unit: i64,
    },
    #[error("{entity} '{id}' has non-positive capacity {capacity}")]
    NonPositiveCapacity {
        entity: &'static str,
        id: String,
        capacity: i32,
    },
    #[error("phase 3 is enabled but neither objective weights nor a lexicographic order were supplied")]
    MissingScalarization,
}

/// Structural validation failure: the problem cannot be modeled.
///
/// Carries every defect found, not just the first, so a caller can fix
/// the input in one pass.
#[derive(Debug, Clone, PartialEq, Error)]
#[error("malformed problem: {}", format_issues(.issues))]
pub struct MalformedProblem {
    pub issues: Vec<ProblemIssue>,
}

impl MalformedProblem {
    pub fn new(issues: Vec<ProblemIssue>) -> Self {
        Self { issues }
    }

    /// Whether any issue of the given discriminant was recorded.
    pub fn has_issue(&self, predicate: impl Fn(&ProblemIssue) -> bool) -> bool {
        self.issues.iter().any(predicate)
    }
}

fn format_issues(issues: &[ProblemIssue]) -> String {
    issues
        .iter()
        .map(|i| i.to_string())
        .collect::<Vec<_>>()
        .join("; ")
}

/// Loader/persister failure. The core performs no partial writes.
#[derive(Debug, Error)]
pub enum StorageError {
    #[error("pattern '{0}' not found")]
    UnknownPattern(String),
    #[error("missing row in {table}: '{id}'")]
    MissingRow { table: &'static str, id: String },
    #[error("schedule write rejected: {0}")]
    WriteRejected(String),
    #[error("storage io: {0}")]
    Io(#[from] std::io::Error),
    #[error("storage encoding: {0}")]
    Encoding(#[from] serde_json::Error),
}

/// Umbrella error for a solve run.
#[derive(Debug, Error)]
pub enum SolveError {
    #[error(transparent)]
    Malformed(#[from] MalformedProblem),
    #[error(transparent)]
    Storage(#[from] StorageError),
    #[error("internal error: {0}")]
    Internal(String),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_malformed_display_joins_issues() {
        let err = MalformedProblem::new(vec![
            ProblemIssue::EmptyModes {
                task_id: "T1".into(),
            },
            ProblemIssue::SelfPrecedence {
                task_id: "T2".into(),
            },
        ]);
        let text = err.to_string();
        assert!(text.contains("T1"));
        assert!(text.contains("T2"));
        assert!(text.contains("; "));
    }

    #[test]
    fn test_has_issue() {
        let err = MalformedProblem::new(vec![ProblemIssue::MissingScalarization]);
        assert!(err.has_issue(|i| matches!(i, ProblemIssue::MissingScalarization)));
        assert!(!err.has_issue(|i| matches!(i, ProblemIssue::EmptyModes { .. })));
    }

    #[test]
    fn test_solve_error_from_storage() {
        let err: SolveError = StorageError::UnknownPattern("P9".into()).into();
        assert!(err.to_string().contains("P9"));
    }
}
