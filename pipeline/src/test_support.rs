//! Test-only helpers for constructing build states, bundles, and planning runs.

use std::fs;
use std::path::{Path, PathBuf};

use serde_json::{Value, json};
use tempfile::TempDir;

use crate::core::types::{LabeledFragment, PlanningRun, RunConfig};
use crate::state::{
    BuildState, CodeStructureState, DesignState, FileSpec, FileStatus, RepoRef, UNKNOWN_OWNER,
};

/// Create a deterministic pending file spec.
pub fn file_spec(path: &str) -> FileSpec {
    FileSpec {
        path: path.to_string(),
        purpose: format!("{path} purpose"),
        spec: None,
        status: FileStatus::Pending,
    }
}

/// Create a loaded state for app `App` planning the given files.
pub fn planned_state(paths: &[&str]) -> BuildState {
    let mut state = BuildState::placeholder(UNKNOWN_OWNER, "main");
    state.app_name = "App".to_string();
    state.repo = RepoRef {
        owner: UNKNOWN_OWNER.to_string(),
        name: "App".to_string(),
        default_branch: "main".to_string(),
        created: false,
    };
    state.design = DesignState {
        dd_id: Some("dd-1".to_string()),
        hld_id: Some("hld-1".to_string()),
    };
    state.code_structure = CodeStructureState {
        root: "App".to_string(),
        files: paths.iter().copied().map(file_spec).collect(),
        assumptions: Vec::new(),
    };
    state
}

/// A well-formed planning bundle for `app_name` listing `paths`.
pub fn bundle_json(app_name: &str, paths: &[&str]) -> Value {
    let files: Vec<Value> = paths
        .iter()
        .map(|path| json!({"path": path, "purpose": format!("{path} purpose")}))
        .collect();
    json!({
        "status": "success",
        "app_name": app_name,
        "hld": {"hl_doc_id": "hld-1"},
        "dd": {"detailed_doc_id": "dd-1"},
        "code_structure": {
            "app_name": app_name,
            "root": app_name,
            "files": files,
            "assumptions": ["Single binary"]
        },
        "jira": {"implementation_plan": ["1. scaffold", "2. implement"]}
    })
}

/// Write `value` as pretty JSON under `dir` and return the path.
pub fn write_json_file(dir: &Path, name: &str, value: &Value) -> PathBuf {
    let path = dir.join(name);
    let contents = serde_json::to_string_pretty(value).expect("serialize json");
    fs::write(&path, contents).expect("write json file");
    path
}

/// Write a well-formed bundle into a fresh temp dir.
///
/// Keep the returned `TempDir` alive for as long as the path is used.
pub fn bundle_file(app_name: &str, paths: &[&str]) -> (TempDir, PathBuf) {
    let temp = tempfile::tempdir().expect("tempdir");
    let path = write_json_file(temp.path(), "bundle.json", &bundle_json(app_name, paths));
    (temp, path)
}

/// A planning run for `app_name` with the given `(label, raw)` fragments.
pub fn planning_run(app_name: &str, fragments: &[(&str, &str)]) -> PlanningRun {
    PlanningRun {
        status: Some("success".to_string()),
        config: Some(RunConfig {
            app_name: Some(app_name.to_string()),
        }),
        tasks_output: fragments
            .iter()
            .map(|&(label, raw)| LabeledFragment::new(label, raw))
            .collect(),
    }
}
