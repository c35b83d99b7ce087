//! The build state threaded through pipeline stages.
//!
//! `BuildState` is replaced, never shared: each stage consumes the state its
//! predecessor produced and returns a new one. Errors are append-only.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

pub const UNKNOWN_APP: &str = "UNKNOWN_APP";
pub const UNKNOWN_REPO: &str = "UNKNOWN_REPO";
pub const UNKNOWN_OWNER: &str = "UNKNOWN_OWNER";

/// Why a stage could not complete.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ErrorCategory {
    Config,
    Io,
    Json,
    Validation,
    Tool,
    Unknown,
}

impl ErrorCategory {
    pub fn as_str(self) -> &'static str {
        match self {
            ErrorCategory::Config => "config",
            ErrorCategory::Io => "io",
            ErrorCategory::Json => "json",
            ErrorCategory::Validation => "validation",
            ErrorCategory::Tool => "tool",
            ErrorCategory::Unknown => "unknown",
        }
    }
}

/// A classified stage failure. Never mutated after creation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BuildError {
    /// Stage that produced the error, e.g. `LoadBundle`.
    pub origin: String,
    pub category: ErrorCategory,
    pub message: String,
    pub retryable: bool,
    #[serde(default)]
    pub context: Map<String, Value>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FileStatus {
    #[default]
    Pending,
    Done,
}

/// A planned repository file.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FileSpec {
    pub path: String,
    pub purpose: String,
    #[serde(default)]
    pub spec: Option<String>,
    #[serde(default)]
    pub status: FileStatus,
}

/// A file queued for generation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WorkItem {
    pub path: String,
    pub purpose: String,
    #[serde(default)]
    pub spec: Option<String>,
}

impl From<&FileSpec> for WorkItem {
    fn from(file: &FileSpec) -> Self {
        Self {
            path: file.path.clone(),
            purpose: file.purpose.clone(),
            spec: file.spec.clone(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RepoRef {
    pub owner: String,
    pub name: String,
    pub default_branch: String,
    pub created: bool,
}

/// Design document references.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DesignState {
    pub dd_id: Option<String>,
    pub hld_id: Option<String>,
}

/// Desired repository structure from planning.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CodeStructureState {
    pub root: String,
    pub files: Vec<FileSpec>,
    #[serde(default)]
    pub assumptions: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BuildState {
    pub app_name: String,
    pub repo: RepoRef,
    pub design: DesignState,
    #[serde(default)]
    pub derived_requirements: Vec<String>,
    pub code_structure: CodeStructureState,
    #[serde(default)]
    pub pending_files: Vec<WorkItem>,
    #[serde(default)]
    pub completed_files: Vec<String>,
    #[serde(default)]
    pub assumptions: Vec<String>,
    #[serde(default)]
    pub essential_missing: Vec<WorkItem>,
    #[serde(default)]
    pub last_commit_sha: Option<String>,
    #[serde(default)]
    pub errors: Vec<BuildError>,
    #[serde(default)]
    pub report: Map<String, Value>,
}

impl BuildState {
    /// A state with placeholder identity, used when the bundle could not load.
    pub fn placeholder(owner: &str, default_branch: &str) -> Self {
        Self {
            app_name: UNKNOWN_APP.to_string(),
            repo: RepoRef {
                owner: owner.to_string(),
                name: UNKNOWN_REPO.to_string(),
                default_branch: default_branch.to_string(),
                created: false,
            },
            design: DesignState::default(),
            derived_requirements: Vec::new(),
            code_structure: CodeStructureState {
                root: ".".to_string(),
                files: Vec::new(),
                assumptions: Vec::new(),
            },
            pending_files: Vec::new(),
            completed_files: Vec::new(),
            assumptions: Vec::new(),
            essential_missing: Vec::new(),
            last_commit_sha: None,
            errors: Vec::new(),
            report: Map::new(),
        }
    }

    /// This state with one more error appended.
    pub fn with_error(mut self, error: BuildError) -> Self {
        self.errors.push(error);
        self
    }

    pub fn has_errors(&self) -> bool {
        !self.errors.is_empty()
    }

    /// Planned files that have not been committed yet.
    pub fn pending_specs(&self) -> impl Iterator<Item = &FileSpec> {
        self.code_structure
            .files
            .iter()
            .filter(|file| file.status == FileStatus::Pending)
    }
}
