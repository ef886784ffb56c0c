//! Project generation
//!
//! The scaffolding pipeline talks to generation through the
//! `ProjectGenerator` trait; `DockerGenerator` is the default
//! implementation, rendering a FastAPI application subtree, a Dockerfile,
//! and a docker-compose file for one registered model.

mod app;
pub mod docker;

use std::path::{Path, PathBuf};

use crate::error::Result;

pub use docker::DockerGenerator;

/// Variable set consumed by a generator, assembled by the scaffolder from
/// a registry record plus per-deploy options
#[derive(Debug, Clone)]
pub struct GenerateVars {
    /// Registered model name, used for titles and labels
    pub model_name: String,
    /// Artifact location at generation time (file or directory)
    pub model_path: PathBuf,
    /// Artifact basename as it will appear inside `app/`
    pub model_file: String,
    pub framework: String,
    pub api_type: String,
    pub python_version: String,
    /// OS packages appended to the base build-essential set
    pub additional_system_deps: Vec<String>,
    pub use_gpu: bool,
    /// Custom dependency manifest copied in place of the default
    /// `requirements.txt`
    pub requirements_file: Option<PathBuf>,
    pub service_name: String,
    pub port: u16,
    /// Source file defining the model class, for frameworks that need it
    /// to rebuild the network from saved parameters
    pub model_class_path: Option<PathBuf>,
}

/// What a successful generation produced
#[derive(Debug)]
pub struct GeneratedProject {
    pub output_dir: PathBuf,
    /// Paths relative to `output_dir`, in creation order
    pub files: Vec<PathBuf>,
}

/// Seam between the scaffolding pipeline and artifact generation.
///
/// Generation is best-effort: a failing step aborts the remaining steps
/// and names itself in the error, but files already written stay on disk.
pub trait ProjectGenerator: Send + Sync {
    fn generate(
        &self,
        vars: &GenerateVars,
        output_dir: &Path,
    ) -> impl std::future::Future<Output = Result<GeneratedProject>> + Send;
}
