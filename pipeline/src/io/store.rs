//! JSON persistence for metadata documents and build states.

use std::fs;
use std::path::Path;

use anyhow::{Context, Result};
use serde::Serialize;
use tracing::debug;

use crate::core::metadata::PlanningMetadata;
use crate::state::BuildState;

/// Atomically write the planning metadata document.
pub fn write_metadata(path: &Path, metadata: &PlanningMetadata) -> Result<()> {
    debug!(path = %path.display(), app_name = ?metadata.app_name, "writing planning metadata");
    write_json_atomic(path, metadata)
}

/// Atomically write a build state snapshot.
pub fn write_build_state(path: &Path, state: &BuildState) -> Result<()> {
    debug!(path = %path.display(), errors = state.errors.len(), "writing build state");
    write_json_atomic(path, state)
}

pub fn load_build_state(path: &Path) -> Result<BuildState> {
    let contents =
        fs::read_to_string(path).with_context(|| format!("read build state {}", path.display()))?;
    serde_json::from_str(&contents).with_context(|| format!("parse build state {}", path.display()))
}

/// Pretty JSON with a trailing newline, written via temp file + rename.
pub fn write_json_atomic<T: Serialize + ?Sized>(path: &Path, value: &T) -> Result<()> {
    let mut buf = serde_json::to_string_pretty(value).context("serialize json")?;
    buf.push('\n');
    let parent = path
        .parent()
        .with_context(|| format!("path missing parent {}", path.display()))?;
    if !parent.as_os_str().is_empty() {
        fs::create_dir_all(parent)
            .with_context(|| format!("create directory {}", parent.display()))?;
    }
    let tmp_path = path.with_extension("json.tmp");
    fs::write(&tmp_path, buf).with_context(|| format!("write temp file {}", tmp_path.display()))?;
    fs::rename(&tmp_path, path).with_context(|| format!("replace {}", path.display()))?;
    Ok(())
}
