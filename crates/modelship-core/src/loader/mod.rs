//! Framework-specific model loading
//!
//! `ModelLoader` proves that an artifact on disk is structurally valid for
//! its declared framework before anything is registered or generated. It
//! never materializes weights; each strategy deserializes just far enough
//! to vouch for the container format and hand back a summary of what it
//! found.
//!
//! Dispatch is a fixed table keyed by the framework tag. Adding a
//! framework means adding one `FrameworkLoader` implementation and one
//! table entry, never touching the call sites.

pub mod pickle;
mod pytorch;
mod sklearn;
mod tensorflow;

use std::fmt;
use std::path::Path;
use std::str::FromStr;

use crate::error::{Error, Result};

pub use pytorch::{CheckpointFormat, StateDict, TensorInfo};
pub use sklearn::SklearnEstimator;
pub use tensorflow::{SavedModel, TensorflowFormat};

/// Recognized training frameworks
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Framework {
    Sklearn,
    Pytorch,
    Tensorflow,
}

impl Framework {
    pub const ALL: [Framework; 3] = [
        Framework::Sklearn,
        Framework::Pytorch,
        Framework::Tensorflow,
    ];

    /// Canonical tag as stored in registry records and CLI flags
    pub fn tag(&self) -> &'static str {
        match self {
            Framework::Sklearn => "sklearn",
            Framework::Pytorch => "pytorch",
            Framework::Tensorflow => "tensorflow",
        }
    }

    /// Comma-separated supported tags, for error messages
    pub fn supported_list() -> String {
        Self::ALL
            .iter()
            .map(Framework::tag)
            .collect::<Vec<_>>()
            .join(", ")
    }
}

impl fmt::Display for Framework {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.tag())
    }
}

impl FromStr for Framework {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        Self::ALL
            .iter()
            .copied()
            .find(|fw| fw.tag().eq_ignore_ascii_case(s.trim()))
            .ok_or_else(|| Error::UnsupportedFramework {
                requested: s.to_string(),
            })
    }
}

/// Opaque handle returned by a successful load.
///
/// Callers in the pipeline only need to know that loading succeeded; the
/// per-framework payloads exist for reporting and tests.
#[derive(Debug)]
pub enum ModelHandle {
    Sklearn(SklearnEstimator),
    Pytorch(StateDict),
    Tensorflow(SavedModel),
}

impl ModelHandle {
    pub fn framework(&self) -> Framework {
        match self {
            ModelHandle::Sklearn(_) => Framework::Sklearn,
            ModelHandle::Pytorch(_) => Framework::Pytorch,
            ModelHandle::Tensorflow(_) => Framework::Tensorflow,
        }
    }

    /// Whether the loaded artifact can serve predictions directly (a
    /// deserialized estimator, as opposed to a bare parameter set that
    /// still needs its defining class).
    pub fn supports_prediction(&self) -> bool {
        matches!(self, ModelHandle::Sklearn(_) | ModelHandle::Tensorflow(_))
    }
}

/// One per-framework deserialization strategy.
///
/// `load` is only called with a path that exists; existence is checked
/// once by `ModelLoader` so every strategy reports missing files the same
/// way.
pub trait FrameworkLoader: Send + Sync {
    fn framework(&self) -> Framework;
    fn load(&self, path: &Path) -> Result<ModelHandle>;
}

/// Stateless dispatcher over the fixed strategy table
pub struct ModelLoader {
    strategies: Vec<Box<dyn FrameworkLoader>>,
}

impl ModelLoader {
    pub fn new() -> Self {
        Self {
            strategies: vec![
                Box::new(sklearn::SklearnLoader),
                Box::new(pytorch::PytorchLoader),
                Box::new(tensorflow::TensorflowLoader),
            ],
        }
    }

    /// Deserialize `path` far enough to prove it is a valid `framework`
    /// artifact.
    ///
    /// Missing path wins over an unrecognized framework tag, so the caller
    /// can always report the offending path verbatim.
    pub fn load(&self, path: &Path, framework: &str) -> Result<ModelHandle> {
        if !path.exists() {
            return Err(Error::ModelNotFound {
                path: path.to_path_buf(),
            });
        }
        let framework: Framework = framework.parse()?;
        let strategy = self
            .strategies
            .iter()
            .find(|s| s.framework() == framework)
            .ok_or(Error::UnsupportedFramework {
                requested: framework.tag().to_string(),
            })?;
        strategy.load(path)
    }
}

impl Default for ModelLoader {
    fn default() -> Self {
        Self::new()
    }
}
