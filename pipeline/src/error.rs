//! Typed stage failures and their mapping onto the error taxonomy.

use std::path::PathBuf;

use serde_json::{Map, Value};
use thiserror::Error;

use crate::state::{BuildError, ErrorCategory};

pub type StageResult<T> = std::result::Result<T, StageError>;

#[derive(Error, Debug)]
pub enum StageError {
    #[error("configuration error: {0}")]
    Config(String),

    #[error("bundle not found at {}", .path.display())]
    MissingSource { path: PathBuf },

    #[error("read {}: {source}", .path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("invalid JSON: {0}")]
    Json(#[from] serde_json::Error),

    #[error("{0}")]
    Validation(String),

    #[error("tool {tool} failed: {message}")]
    Tool {
        tool: String,
        message: String,
        retryable: bool,
    },

    #[error("{0}")]
    Other(String),
}

impl StageError {
    pub fn category(&self) -> ErrorCategory {
        match self {
            StageError::Config(_) => ErrorCategory::Config,
            StageError::MissingSource { .. } | StageError::Io { .. } => ErrorCategory::Io,
            StageError::Json(_) => ErrorCategory::Json,
            StageError::Validation(_) => ErrorCategory::Validation,
            StageError::Tool { .. } => ErrorCategory::Tool,
            StageError::Other(_) => ErrorCategory::Unknown,
        }
    }

    /// Hint for an external supervisor; nothing in this crate retries.
    pub fn retryable(&self) -> bool {
        matches!(self, StageError::Tool { retryable: true, .. })
    }

    /// Structured parameters worth keeping alongside the message.
    pub fn context(&self) -> Map<String, Value> {
        let mut context = Map::new();
        match self {
            StageError::MissingSource { path } | StageError::Io { path, .. } => {
                context.insert(
                    "path".to_string(),
                    Value::String(path.display().to_string()),
                );
            }
            StageError::Json(err) => {
                context.insert("line".to_string(), Value::from(err.line()));
                context.insert("column".to_string(), Value::from(err.column()));
            }
            StageError::Tool { tool, .. } => {
                context.insert("tool".to_string(), Value::String(tool.clone()));
            }
            StageError::Config(_) | StageError::Validation(_) | StageError::Other(_) => {}
        }
        context
    }

    /// Classify this failure as a `BuildError` raised by `origin`.
    pub fn to_build_error(&self, origin: &str) -> BuildError {
        BuildError {
            origin: origin.to_string(),
            category: self.category(),
            message: self.to_string(),
            retryable: self.retryable(),
            context: self.context(),
        }
    }
}
