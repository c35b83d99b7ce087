//! Loading planning-run output from disk.

use std::fs;
use std::path::Path;

use anyhow::{Context, Result};
use tracing::debug;

use crate::core::types::PlanningRun;

pub fn load_planning_run(path: &Path) -> Result<PlanningRun> {
    debug!(path = %path.display(), "loading planning run");
    let contents =
        fs::read_to_string(path).with_context(|| format!("read planning run {}", path.display()))?;
    let run: PlanningRun = serde_json::from_str(&contents)
        .with_context(|| format!("parse planning run {}", path.display()))?;
    debug!(
        fragments = run.tasks_output.len(),
        app_name = ?run.app_name(),
        "planning run loaded"
    );
    Ok(run)
}
