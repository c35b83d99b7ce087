//! Metadata extraction flow for `pipeline extract`.

use std::path::Path;

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use tracing::{info, instrument};

use crate::core::metadata::{PlanningMetadata, build_metadata};
use crate::core::types::PlanningRun;
use crate::io::run_result::load_planning_run;
use crate::io::store::write_metadata;

/// Build the metadata document for `run` and write it to `path`.
pub fn save_planning_metadata(
    run: &PlanningRun,
    path: &Path,
    now: DateTime<Utc>,
) -> Result<PlanningMetadata> {
    let metadata = build_metadata(run, now);
    write_metadata(path, &metadata)
        .with_context(|| format!("save planning metadata {}", path.display()))?;
    info!(
        path = %path.display(),
        hld = metadata.hld.is_some(),
        dd = metadata.dd.is_some(),
        code_structure = metadata.code_structure.is_some(),
        jira = metadata.jira.is_some(),
        "planning metadata saved"
    );
    Ok(metadata)
}

/// Load a planning run from `run_path` and extract its metadata into `out_path`.
#[instrument(skip_all, fields(run = %run_path.display()))]
pub fn extract_from_file(run_path: &Path, out_path: &Path) -> Result<PlanningMetadata> {
    let run = load_planning_run(run_path)?;
    save_planning_metadata(&run, out_path, Utc::now())
}
