//! Pipeline stages as `BuildState -> BuildState` transitions.
//!
//! A stage reports failure through [`StageError`]; [`run_stage`] is the
//! boundary that turns any failure, panics included, into one appended
//! [`BuildError`]. Nothing propagates past it.

use std::any::Any;
use std::collections::{BTreeMap, HashSet};
use std::panic::{self, AssertUnwindSafe};

use serde_json::{Map, Value};
use tracing::{debug, instrument, warn};

use crate::error::{StageError, StageResult};
use crate::state::{BuildError, BuildState, ErrorCategory, FileStatus, WorkItem};

/// One pipeline step.
pub trait Stage {
    /// Name recorded as the `origin` of errors this stage raises.
    fn name(&self) -> &str;

    /// Produce the next state from `state`. Must not mutate shared data.
    fn apply(&self, state: &BuildState) -> StageResult<BuildState>;
}

/// Run `stage` and classify any failure into the returned state.
#[instrument(skip_all, fields(stage = stage.name()))]
pub fn run_stage<S: Stage + ?Sized>(stage: &S, state: BuildState) -> BuildState {
    let outcome = panic::catch_unwind(AssertUnwindSafe(|| stage.apply(&state)));
    match outcome {
        Ok(Ok(next)) => {
            debug!("stage completed");
            next
        }
        Ok(Err(err)) => {
            warn!(category = err.category().as_str(), error = %err, "stage failed");
            state.with_error(err.to_build_error(stage.name()))
        }
        Err(payload) => {
            let message = panic_message(payload.as_ref());
            warn!(error = %message, "stage panicked");
            state.with_error(BuildError {
                origin: stage.name().to_string(),
                category: ErrorCategory::Unknown,
                message,
                retryable: false,
                context: Map::new(),
            })
        }
    }
}

/// Run `stages` in order, each consuming the previous state.
pub fn run_stages(state: BuildState, stages: &[&dyn Stage]) -> BuildState {
    stages
        .iter()
        .fold(state, |state, stage| run_stage(*stage, state))
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(message) = payload.downcast_ref::<&str>() {
        return format!("stage panicked: {message}");
    }
    if let Some(message) = payload.downcast_ref::<String>() {
        return format!("stage panicked: {message}");
    }
    "stage panicked".to_string()
}

/// Queue every pending planned file as a work item.
#[derive(Debug, Clone, Copy, Default)]
pub struct QueuePendingFiles;

impl Stage for QueuePendingFiles {
    fn name(&self) -> &str {
        "QueuePendingFiles"
    }

    fn apply(&self, state: &BuildState) -> StageResult<BuildState> {
        if state.code_structure.files.is_empty() {
            return Err(StageError::Validation(
                "code structure has no planned files".to_string(),
            ));
        }

        let mut seen = HashSet::new();
        for file in &state.code_structure.files {
            if !seen.insert(file.path.as_str()) {
                return Err(StageError::Validation(format!(
                    "duplicate planned file path '{}'",
                    file.path
                )));
            }
        }

        let mut next = state.clone();
        next.pending_files = state.pending_specs().map(WorkItem::from).collect();
        debug!(queued = next.pending_files.len(), "queued pending files");
        Ok(next)
    }
}

/// Result of an external commit attempt for one file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CommitOutcome {
    Committed { sha: String },
    Failed { message: String, retryable: bool },
}

/// Record the outcome of committing one planned file.
///
/// This is the only transition that moves a file from pending to done.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RecordCommit {
    pub path: String,
    pub outcome: CommitOutcome,
}

impl Stage for RecordCommit {
    fn name(&self) -> &str {
        "RecordCommit"
    }

    fn apply(&self, state: &BuildState) -> StageResult<BuildState> {
        let sha = match &self.outcome {
            CommitOutcome::Committed { sha } => sha,
            CommitOutcome::Failed { message, retryable } => {
                return Err(StageError::Tool {
                    tool: "commit".to_string(),
                    message: format!("{}: {message}", self.path),
                    retryable: *retryable,
                });
            }
        };

        let mut next = state.clone();
        let file = next
            .code_structure
            .files
            .iter_mut()
            .find(|file| file.path == self.path)
            .ok_or_else(|| {
                StageError::Validation(format!("'{}' is not a planned file", self.path))
            })?;
        file.status = FileStatus::Done;

        next.pending_files.retain(|item| item.path != self.path);
        if !next.completed_files.contains(&self.path) {
            next.completed_files.push(self.path.clone());
        }
        next.last_commit_sha = Some(sha.clone());
        Ok(next)
    }
}

/// Summarize the run into `BuildState::report`.
#[derive(Debug, Clone, Copy, Default)]
pub struct Finalize;

impl Stage for Finalize {
    fn name(&self) -> &str {
        "Finalize"
    }

    fn apply(&self, state: &BuildState) -> StageResult<BuildState> {
        let planned = state.code_structure.files.len();
        let done = state
            .code_structure
            .files
            .iter()
            .filter(|file| file.status == FileStatus::Done)
            .count();

        let mut by_category: BTreeMap<&str, u64> = BTreeMap::new();
        for error in &state.errors {
            *by_category.entry(error.category.as_str()).or_default() += 1;
        }

        let status = if state.has_errors() {
            "failed"
        } else if planned > 0 && done == planned {
            "complete"
        } else {
            "incomplete"
        };

        let mut report = Map::new();
        report.insert("status".to_string(), Value::from(status));
        report.insert("app_name".to_string(), Value::from(state.app_name.clone()));
        report.insert(
            "repo".to_string(),
            Value::from(format!("{}/{}", state.repo.owner, state.repo.name)),
        );
        report.insert("files_planned".to_string(), Value::from(planned));
        report.insert("files_completed".to_string(), Value::from(done));
        report.insert(
            "files_pending".to_string(),
            Value::from(state.pending_files.len()),
        );
        report.insert(
            "assumptions".to_string(),
            Value::from(state.assumptions.len()),
        );
        report.insert(
            "last_commit_sha".to_string(),
            state
                .last_commit_sha
                .clone()
                .map(Value::from)
                .unwrap_or(Value::Null),
        );
        report.insert("error_count".to_string(), Value::from(state.errors.len()));
        report.insert(
            "errors_by_category".to_string(),
            Value::Object(
                by_category
                    .into_iter()
                    .map(|(category, count)| (category.to_string(), Value::from(count)))
                    .collect(),
            ),
        );

        let mut next = state.clone();
        next.report = report;
        Ok(next)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::state::{FileSpec, UNKNOWN_OWNER};
    use crate::test_support::{file_spec, planned_state};
    use serde_json::json;

    struct Failing(fn() -> StageError);

    impl Stage for Failing {
        fn name(&self) -> &str {
            "Failing"
        }

        fn apply(&self, _state: &BuildState) -> StageResult<BuildState> {
            Err((self.0)())
        }
    }

    struct Panicking;

    impl Stage for Panicking {
        fn name(&self) -> &str {
            "Panicking"
        }

        fn apply(&self, _state: &BuildState) -> StageResult<BuildState> {
            panic!("boom");
        }
    }

    #[test]
    fn failure_appends_exactly_one_error() {
        let state = planned_state(&["a.rs"]);
        let stage = Failing(|| StageError::Validation("bad input".to_string()));

        let next = run_stage(&stage, state.clone());
        assert_eq!(next.errors.len(), state.errors.len() + 1);
        let error = next.errors.last().expect("error");
        assert_eq!(error.origin, "Failing");
        assert_eq!(error.category, ErrorCategory::Validation);
        assert_eq!(error.message, "bad input");
        assert_eq!(next.app_name, state.app_name);
    }

    #[test]
    fn failure_keeps_accumulated_history() {
        let stage = Failing(|| StageError::Other("first".to_string()));
        let once = run_stage(&stage, planned_state(&["a.rs"]));
        let twice = run_stage(&stage, once.clone());
        assert_eq!(twice.errors.len(), 2);
        assert_eq!(twice.errors[0], once.errors[0]);
    }

    #[test]
    fn panic_is_classified_as_unknown() {
        let next = run_stage(&Panicking, planned_state(&["a.rs"]));
        let error = next.errors.last().expect("error");
        assert_eq!(error.category, ErrorCategory::Unknown);
        assert_eq!(error.message, "stage panicked: boom");
        assert!(!error.retryable);
    }

    #[test]
    fn queue_pending_files_skips_done() {
        let mut state = planned_state(&["a.rs", "b.rs"]);
        state.code_structure.files[0].status = FileStatus::Done;

        let next = run_stage(&QueuePendingFiles, state);
        assert!(next.errors.is_empty());
        let paths: Vec<&str> = next.pending_files.iter().map(|item| item.path.as_str()).collect();
        assert_eq!(paths, vec!["b.rs"]);
    }

    #[test]
    fn queue_pending_files_rejects_duplicates() {
        let mut state = planned_state(&["a.rs"]);
        state.code_structure.files.push(file_spec("a.rs"));

        let next = run_stage(&QueuePendingFiles, state);
        assert_eq!(next.errors.len(), 1);
        assert_eq!(next.errors[0].category, ErrorCategory::Validation);
        assert!(next.pending_files.is_empty());
    }

    #[test]
    fn queue_pending_files_requires_a_plan() {
        let state = BuildState::placeholder(UNKNOWN_OWNER, "main");
        let next = run_stage(&QueuePendingFiles, state);
        assert_eq!(next.errors.len(), 1);
        assert_eq!(next.errors[0].origin, "QueuePendingFiles");
    }

    #[test]
    fn record_commit_moves_file_to_done() {
        let state = run_stage(&QueuePendingFiles, planned_state(&["a.rs", "b.rs"]));
        let stage = RecordCommit {
            path: "a.rs".to_string(),
            outcome: CommitOutcome::Committed {
                sha: "abc123".to_string(),
            },
        };

        let next = run_stage(&stage, state);
        assert!(next.errors.is_empty());
        assert_eq!(next.code_structure.files[0].status, FileStatus::Done);
        assert_eq!(next.completed_files, vec!["a.rs".to_string()]);
        assert_eq!(next.pending_files.len(), 1);
        assert_eq!(next.last_commit_sha.as_deref(), Some("abc123"));
    }

    #[test]
    fn record_commit_failure_is_a_tool_error() {
        let state = planned_state(&["a.rs"]);
        let stage = RecordCommit {
            path: "a.rs".to_string(),
            outcome: CommitOutcome::Failed {
                message: "rate limited".to_string(),
                retryable: true,
            },
        };

        let next = run_stage(&stage, state);
        let error = next.errors.last().expect("error");
        assert_eq!(error.category, ErrorCategory::Tool);
        assert!(error.retryable);
        assert_eq!(error.context.get("tool"), Some(&json!("commit")));
        assert_eq!(next.code_structure.files[0].status, FileStatus::Pending);
    }

    #[test]
    fn record_commit_unknown_path_is_validation() {
        let stage = RecordCommit {
            path: "missing.rs".to_string(),
            outcome: CommitOutcome::Committed {
                sha: "abc".to_string(),
            },
        };
        let next = run_stage(&stage, planned_state(&["a.rs"]));
        assert_eq!(next.errors[0].category, ErrorCategory::Validation);
        assert_eq!(next.last_commit_sha, None);
    }

    #[test]
    fn finalize_reports_counts_and_categories() {
        let mut state = planned_state(&["a.rs", "b.rs"]);
        state.code_structure.files[1] = FileSpec {
            status: FileStatus::Done,
            ..file_spec("b.rs")
        };
        let state = run_stage(&Failing(|| StageError::Config("x".to_string())), state);

        let next = run_stages(state, &[&QueuePendingFiles, &Finalize]);
        assert_eq!(next.report.get("status"), Some(&json!("failed")));
        assert_eq!(next.report.get("files_planned"), Some(&json!(2)));
        assert_eq!(next.report.get("files_completed"), Some(&json!(1)));
        assert_eq!(next.report.get("files_pending"), Some(&json!(1)));
        assert_eq!(
            next.report.get("errors_by_category"),
            Some(&json!({"config": 1}))
        );
    }

    #[test]
    fn finalize_complete_when_all_files_done() {
        let mut state = planned_state(&["a.rs"]);
        state.code_structure.files[0].status = FileStatus::Done;
        let next = run_stage(&Finalize, state);
        assert_eq!(next.report.get("status"), Some(&json!("complete")));
        assert_eq!(next.report.get("error_count"), Some(&json!(0)));
    }
}
