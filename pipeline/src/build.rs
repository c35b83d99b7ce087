//! Bundle-to-state pipeline for `pipeline build`.

use anyhow::{Context, Result};
use tracing::{info, instrument};

use crate::io::bundle::load_bundle;
use crate::io::config::PipelineConfig;
use crate::io::store::write_build_state;
use crate::stage::{Finalize, QueuePendingFiles, run_stage, run_stages};
use crate::state::BuildState;

/// Load the bundle, queue planned files, and summarize.
///
/// A failed load skips queueing so the load error stays the only one reported.
pub fn build_state(config: &PipelineConfig) -> BuildState {
    let loaded = load_bundle(config);
    if loaded.has_errors() {
        return run_stage(&Finalize, loaded);
    }
    run_stages(loaded, &[&QueuePendingFiles, &Finalize])
}

/// Run [`build_state`] and persist the result when `state_path` is configured.
#[instrument(skip_all)]
pub fn run_build(config: &PipelineConfig) -> Result<BuildState> {
    let state = build_state(config);
    if let Some(path) = config.state_path.as_deref() {
        write_build_state(path, &state)
            .with_context(|| format!("save build state {}", path.display()))?;
    }
    info!(
        app_name = %state.app_name,
        pending = state.pending_files.len(),
        errors = state.errors.len(),
        "build finished"
    );
    Ok(state)
}
