//! Pipeline configuration (`pipeline.toml` plus environment overrides).

use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result, anyhow};
use serde::{Deserialize, Serialize};

use crate::state::UNKNOWN_OWNER;

pub const BUNDLE_PATH_ENV: &str = "ANALYSIS_AND_PLANNING_RESULT_JSON_PATH";
pub const BUNDLE_JSON_ENV: &str = "BUNDLE_JSON";
pub const METADATA_PATH_ENV: &str = "PLANNING_METADATA_PATH";
pub const OWNER_ENV: &str = "GITHUB_USERNAME";

pub const DEFAULT_METADATA_PATH: &str = "workflow_state/analysis_and_planning/result.json";

/// Pipeline configuration (TOML).
///
/// Passed explicitly to every loader; nothing reads the environment on its own.
/// Missing fields default to the conventional workflow-state layout.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct PipelineConfig {
    /// Bundle file read by `LoadBundle`.
    pub bundle_path: Option<PathBuf>,

    /// Inline bundle JSON; takes precedence over `bundle_path`.
    pub bundle_json: Option<String>,

    /// Where extracted planning metadata is written.
    pub metadata_path: PathBuf,

    /// Optional dump of the final build state.
    pub state_path: Option<PathBuf>,

    /// Owner recorded on the repository reference.
    pub repo_owner: String,

    pub default_branch: String,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            bundle_path: None,
            bundle_json: None,
            metadata_path: PathBuf::from(DEFAULT_METADATA_PATH),
            state_path: None,
            repo_owner: UNKNOWN_OWNER.to_string(),
            default_branch: "main".to_string(),
        }
    }
}

impl PipelineConfig {
    pub fn validate(&self) -> Result<()> {
        if self.metadata_path.as_os_str().is_empty() {
            return Err(anyhow!("metadata_path must not be empty"));
        }
        if self
            .bundle_path
            .as_ref()
            .is_some_and(|path| path.as_os_str().is_empty())
        {
            return Err(anyhow!("bundle_path must not be empty when set"));
        }
        if self.repo_owner.trim().is_empty() {
            return Err(anyhow!("repo_owner must not be empty"));
        }
        if self.default_branch.trim().is_empty() {
            return Err(anyhow!("default_branch must not be empty"));
        }
        Ok(())
    }

    /// Apply environment overrides read through `lookup`.
    ///
    /// Empty values are ignored so an exported-but-blank variable does not
    /// clobber the file configuration.
    pub fn with_env_overrides<F>(mut self, lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| lookup(key).filter(|value| !value.trim().is_empty());
        if let Some(path) = get(BUNDLE_PATH_ENV) {
            self.bundle_path = Some(PathBuf::from(path));
        }
        if let Some(json) = get(BUNDLE_JSON_ENV) {
            self.bundle_json = Some(json);
        }
        if let Some(path) = get(METADATA_PATH_ENV) {
            self.metadata_path = PathBuf::from(path);
        }
        if let Some(owner) = get(OWNER_ENV) {
            self.repo_owner = owner;
        }
        self
    }
}

/// Load config from a TOML file.
///
/// If the file is missing, returns `PipelineConfig::default()`.
pub fn load_config(path: &Path) -> Result<PipelineConfig> {
    if !path.exists() {
        let cfg = PipelineConfig::default();
        cfg.validate()?;
        return Ok(cfg);
    }
    let contents = fs::read_to_string(path).with_context(|| format!("read {}", path.display()))?;
    let cfg: PipelineConfig =
        toml::from_str(&contents).with_context(|| format!("parse {}", path.display()))?;
    cfg.validate()?;
    Ok(cfg)
}

/// Load config from `path`, then apply process environment overrides.
pub fn load_config_from_env(path: &Path) -> Result<PipelineConfig> {
    let cfg = load_config(path)?.with_env_overrides(|key| std::env::var(key).ok());
    cfg.validate()?;
    Ok(cfg)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    #[test]
    fn load_missing_returns_default() {
        let temp = tempfile::tempdir().expect("tempdir");
        let cfg = load_config(&temp.path().join("missing.toml")).expect("load");
        assert_eq!(cfg, PipelineConfig::default());
    }

    #[test]
    fn load_partial_file_fills_defaults() {
        let temp = tempfile::tempdir().expect("tempdir");
        let path = temp.path().join("pipeline.toml");
        fs::write(&path, "bundle_path = \"bundle.json\"\nrepo_owner = \"octo\"\n").expect("write");

        let cfg = load_config(&path).expect("load");
        assert_eq!(cfg.bundle_path, Some(PathBuf::from("bundle.json")));
        assert_eq!(cfg.repo_owner, "octo");
        assert_eq!(cfg.metadata_path, PathBuf::from(DEFAULT_METADATA_PATH));
        assert_eq!(cfg.default_branch, "main");
    }

    #[test]
    fn load_rejects_blank_owner() {
        let temp = tempfile::tempdir().expect("tempdir");
        let path = temp.path().join("pipeline.toml");
        fs::write(&path, "repo_owner = \" \"\n").expect("write");

        let err = load_config(&path).expect_err("invalid");
        assert!(err.to_string().contains("repo_owner"));
    }

    #[test]
    fn env_overrides_apply_and_skip_blanks() {
        let env: HashMap<&str, &str> = HashMap::from([
            (BUNDLE_PATH_ENV, "/data/bundle.json"),
            (OWNER_ENV, "octo"),
            (METADATA_PATH_ENV, ""),
        ]);
        let cfg = PipelineConfig::default()
            .with_env_overrides(|key| env.get(key).map(|value| value.to_string()));

        assert_eq!(cfg.bundle_path, Some(PathBuf::from("/data/bundle.json")));
        assert_eq!(cfg.repo_owner, "octo");
        assert_eq!(cfg.metadata_path, PathBuf::from(DEFAULT_METADATA_PATH));
        assert_eq!(cfg.bundle_json, None);
    }
}
