//! Pipeline entry: read the planning bundle into a fresh `BuildState`.

use std::fs;
use std::io::ErrorKind;
use std::path::Path;

use serde::Deserialize;
use serde_json::Value;
use tracing::{debug, info, warn};

use crate::core::types::{lenient, lenient_or_default};
use crate::error::{StageError, StageResult};
use crate::io::config::PipelineConfig;
use crate::stage::Stage;
use crate::state::{BuildState, CodeStructureState, DesignState, FileSpec, FileStatus, RepoRef};

pub const DEFAULT_PURPOSE: &str = "No purpose provided";

const ORIGIN: &str = "LoadBundle";

/// Subset of the planning bundle the pipeline consumes.
///
/// Only `app_name` and `code_structure.files` are required; optional sections
/// of the wrong shape (including `null`) are read as absent.
#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct Bundle {
    #[serde(deserialize_with = "lenient")]
    app_name: Option<String>,
    #[serde(deserialize_with = "lenient")]
    hld: Option<HldRef>,
    #[serde(deserialize_with = "lenient")]
    dd: Option<DdRef>,
    code_structure: Option<BundleCodeStructure>,
    #[serde(deserialize_with = "lenient")]
    jira: Option<JiraRef>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct HldRef {
    #[serde(deserialize_with = "lenient")]
    hl_doc_id: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct DdRef {
    #[serde(deserialize_with = "lenient")]
    detailed_doc_id: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct BundleCodeStructure {
    #[serde(deserialize_with = "lenient")]
    root: Option<String>,
    files: Vec<BundleFile>,
    #[serde(deserialize_with = "lenient_or_default")]
    assumptions: Vec<String>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct BundleFile {
    path: Option<String>,
    #[serde(deserialize_with = "lenient")]
    purpose: Option<String>,
    #[serde(deserialize_with = "lenient")]
    spec: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct JiraRef {
    /// Anything but a list (a prose summary, `null`) counts as no plan.
    #[serde(deserialize_with = "lenient_or_default")]
    implementation_plan: Vec<Value>,
}

/// Build the initial state from the configured bundle.
///
/// Never fails: any problem yields a placeholder state carrying exactly one
/// non-retryable error.
pub fn load_bundle(config: &PipelineConfig) -> BuildState {
    match try_load_bundle(config) {
        Ok(state) => {
            info!(
                app_name = %state.app_name,
                files = state.code_structure.files.len(),
                "bundle loaded"
            );
            state
        }
        Err(err) => {
            warn!(category = err.category().as_str(), error = %err, "bundle load failed");
            let mut error = err.to_build_error(ORIGIN);
            error.retryable = false;
            BuildState::placeholder(&config.repo_owner, &config.default_branch).with_error(error)
        }
    }
}

/// `load_bundle` as a stage. The incoming state is ignored.
#[derive(Debug, Clone)]
pub struct LoadBundle {
    pub config: PipelineConfig,
}

impl Stage for LoadBundle {
    fn name(&self) -> &str {
        ORIGIN
    }

    fn apply(&self, _state: &BuildState) -> StageResult<BuildState> {
        Ok(load_bundle(&self.config))
    }
}

fn try_load_bundle(config: &PipelineConfig) -> StageResult<BuildState> {
    let raw = read_source(config)?;
    let document: Value = serde_json::from_str(&raw)?;
    let bundle = decode_bundle(document)?;
    state_from_bundle(bundle, config)
}

/// Inline JSON wins over the bundle file; the file defaults to the metadata path.
fn read_source(config: &PipelineConfig) -> StageResult<String> {
    if let Some(inline) = config.bundle_json.as_deref() {
        debug!("reading inline bundle");
        return Ok(inline.to_string());
    }
    let path = config
        .bundle_path
        .as_deref()
        .unwrap_or(config.metadata_path.as_path());
    read_file(path)
}

fn read_file(path: &Path) -> StageResult<String> {
    debug!(path = %path.display(), "reading bundle");
    fs::read_to_string(path).map_err(|source| match source.kind() {
        ErrorKind::NotFound => StageError::MissingSource {
            path: path.to_path_buf(),
        },
        _ => StageError::Io {
            path: path.to_path_buf(),
            source,
        },
    })
}

fn decode_bundle(document: Value) -> StageResult<Bundle> {
    if !document.is_object() {
        return Err(StageError::Validation("bundle must be a JSON object".to_string()));
    }
    serde_json::from_value(document)
        .map_err(|err| StageError::Validation(format!("unexpected bundle shape: {err}")))
}

fn state_from_bundle(bundle: Bundle, config: &PipelineConfig) -> StageResult<BuildState> {
    let app_name = bundle
        .app_name
        .filter(|name| !name.trim().is_empty())
        .ok_or_else(|| StageError::Validation("missing required field: app_name".to_string()))?;

    let code_structure = bundle.code_structure.unwrap_or_default();
    if code_structure.files.is_empty() {
        return Err(StageError::Validation(
            "missing or empty code_structure.files".to_string(),
        ));
    }
    let files = code_structure
        .files
        .into_iter()
        .enumerate()
        .map(|(index, file)| file_spec(index, file))
        .collect::<StageResult<Vec<_>>>()?;

    let mut assumptions = code_structure.assumptions.clone();
    let plan_items = bundle.jira.map_or(0, |jira| jira.implementation_plan.len());
    if plan_items > 0 {
        assumptions.push(format!("Jira plan items: {plan_items}"));
    }

    Ok(BuildState {
        repo: RepoRef {
            owner: config.repo_owner.clone(),
            name: app_name.clone(),
            default_branch: config.default_branch.clone(),
            created: false,
        },
        design: DesignState {
            dd_id: bundle.dd.and_then(|dd| dd.detailed_doc_id),
            hld_id: bundle.hld.and_then(|hld| hld.hl_doc_id),
        },
        code_structure: CodeStructureState {
            root: code_structure.root.unwrap_or_else(|| app_name.clone()),
            files,
            assumptions: code_structure.assumptions,
        },
        assumptions,
        app_name,
        ..BuildState::placeholder(&config.repo_owner, &config.default_branch)
    })
}

fn file_spec(index: usize, file: BundleFile) -> StageResult<FileSpec> {
    let path = file
        .path
        .filter(|path| !path.trim().is_empty())
        .ok_or_else(|| {
            StageError::Validation(format!("code_structure.files[{index}] is missing a path"))
        })?;
    Ok(FileSpec {
        path,
        purpose: file.purpose.unwrap_or_else(|| DEFAULT_PURPOSE.to_string()),
        spec: file.spec,
        status: FileStatus::Pending,
    })
}
