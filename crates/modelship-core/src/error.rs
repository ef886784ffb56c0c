//! Error types shared across the core

use std::path::PathBuf;
use thiserror::Error;

/// Result type alias for core operations
pub type Result<T> = std::result::Result<T, Error>;

/// Main error type for registry, loader, and scaffolding operations
#[derive(Error, Debug)]
pub enum Error {
    /// Model artifact missing on disk
    #[error("model artifact not found: {}", path.display())]
    ModelNotFound { path: PathBuf },

    /// Registry key absent
    #[error("model '{name}' version {version} is not registered")]
    RecordNotFound { name: String, version: String },

    /// Framework tag not in the dispatch table
    #[error("unsupported framework '{requested}' (supported: {})", crate::loader::Framework::supported_list())]
    UnsupportedFramework { requested: String },

    /// Artifact present but not parseable as the declared framework's format
    #[error("failed to load {framework} model from {}: {reason}", path.display())]
    Load {
        framework: crate::loader::Framework,
        path: PathBuf,
        reason: String,
    },

    /// Registry document unreadable or unwritable
    #[error("registry document {}: {reason}", path.display())]
    Persistence { path: PathBuf, reason: String },

    /// An artifact-writing step of project generation failed
    #[error("failed to generate {artifact} under {}: {reason}", dir.display())]
    Generation {
        artifact: String,
        dir: PathBuf,
        reason: String,
    },

    /// Record fields rejected before any mutation
    #[error("invalid model record: {0}")]
    InvalidRecord(String),
}

impl Error {
    pub(crate) fn persistence(path: impl Into<PathBuf>, reason: impl Into<String>) -> Self {
        Self::Persistence {
            path: path.into(),
            reason: reason.into(),
        }
    }

    pub(crate) fn generation(
        artifact: impl Into<String>,
        dir: impl Into<PathBuf>,
        reason: impl Into<String>,
    ) -> Self {
        Self::Generation {
            artifact: artifact.into(),
            dir: dir.into(),
            reason: reason.into(),
        }
    }
}
