//! Scaffolding pipeline
//!
//! `Scaffolder` ties the pieces together: registration runs
//! validate -> load-check -> persist, and deployment runs
//! lookup -> assemble variables -> generate. Each call is independent and
//! re-opens the registry document, so a long-lived process observes edits
//! made by other invocations between calls. There are no retries here;
//! any stage's failure is terminal for the request and carries the
//! originating error.

use std::path::{Path, PathBuf};

use crate::error::{Error, Result};
use crate::generate::{DockerGenerator, GenerateVars, GeneratedProject, ProjectGenerator};
use crate::loader::ModelLoader;
use crate::registry::{ModelRecord, ModelRegistry};

/// Per-deploy knobs, merged with the registry record into the generation
/// variable set
#[derive(Debug, Clone)]
pub struct DeployOptions {
    pub api_type: String,
    pub python_version: String,
    pub use_gpu: bool,
    pub port: u16,
    pub service_name: String,
    pub additional_system_deps: Vec<String>,
    pub requirements_file: Option<PathBuf>,
    pub model_class_path: Option<PathBuf>,
}

impl Default for DeployOptions {
    fn default() -> Self {
        Self {
            api_type: "fastapi".into(),
            python_version: "3.10".into(),
            use_gpu: false,
            port: 8000,
            service_name: "ml-service".into(),
            additional_system_deps: Vec::new(),
            requirements_file: None,
            model_class_path: None,
        }
    }
}

/// Orchestrates registration and project generation over an injected
/// registry and generator
pub struct Scaffolder<G = DockerGenerator> {
    registry: ModelRegistry,
    loader: ModelLoader,
    generator: G,
}

impl Scaffolder<DockerGenerator> {
    pub fn new(registry: ModelRegistry) -> Self {
        Self::with_generator(registry, DockerGenerator::new())
    }
}

impl<G: ProjectGenerator> Scaffolder<G> {
    pub fn with_generator(registry: ModelRegistry, generator: G) -> Self {
        Self {
            registry,
            loader: ModelLoader::new(),
            generator,
        }
    }

    pub fn registry(&self) -> &ModelRegistry {
        &self.registry
    }

    /// Register a model: all-or-nothing. Nothing is persisted until the
    /// artifact exists on disk and passes the framework's load check; a
    /// load failure is surfaced unchanged.
    pub fn register_model(
        &self,
        name: &str,
        version: &str,
        model_path: &Path,
        framework: &str,
        description: &str,
    ) -> Result<ModelRecord> {
        if !model_path.exists() {
            return Err(Error::ModelNotFound {
                path: model_path.to_path_buf(),
            });
        }
        self.loader.load(model_path, framework)?;
        self.registry
            .register(name, version, model_path, framework, description)
    }

    /// Generate a deployable project for a registered model. A missing
    /// record fails before anything is written; generation failures are
    /// best-effort (already-written files stay).
    pub async fn generate_project(
        &self,
        model_name: &str,
        version: &str,
        output_dir: &Path,
        options: DeployOptions,
    ) -> Result<GeneratedProject> {
        let record = self.registry.get(model_name, version)?;
        let vars = assemble_vars(&record, options);
        self.generator.generate(&vars, output_dir).await
    }

    pub fn list_models(&self) -> Result<Vec<ModelRecord>> {
        self.registry.list()
    }

    pub fn get_model_info(&self, name: &str, version: &str) -> Result<ModelRecord> {
        self.registry.get(name, version)
    }

    pub fn delete_model(&self, name: &str, version: &str) -> Result<bool> {
        self.registry.delete(name, version)
    }
}

fn assemble_vars(record: &ModelRecord, options: DeployOptions) -> GenerateVars {
    let model_file = record
        .path
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| record.name.clone());

    GenerateVars {
        model_name: record.name.clone(),
        model_path: record.path.clone(),
        model_file,
        framework: record.framework.clone(),
        api_type: options.api_type,
        python_version: options.python_version,
        additional_system_deps: options.additional_system_deps,
        use_gpu: options.use_gpu,
        requirements_file: options.requirements_file,
        service_name: options.service_name,
        port: options.port,
        model_class_path: options.model_class_path,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::TempDir;

    fn scratch() -> (TempDir, Scaffolder) {
        let dir = TempDir::new().unwrap();
        let scaffolder = Scaffolder::new(ModelRegistry::new(dir.path().join("registry.json")));
        (dir, scaffolder)
    }

    fn write_estimator(dir: &TempDir) -> PathBuf {
        let mut p = vec![0x80, 0x02];
        p.extend_from_slice(b"csklearn.linear_model\nLogisticRegression\n");
        p.extend_from_slice(b")\x81}b.");
        let path = dir.path().join("model.pkl");
        fs::write(&path, p).unwrap();
        path
    }

    #[test]
    fn register_model_persists_a_record() {
        let (dir, scaffolder) = scratch();
        let artifact = write_estimator(&dir);

        let record = scaffolder
            .register_model("churn", "1.0.0", &artifact, "sklearn", "test model")
            .unwrap();
        assert_eq!(record.name, "churn");
        assert_eq!(scaffolder.list_models().unwrap(), vec![record]);
    }

    #[test]
    fn missing_artifact_fails_fast_with_the_path() {
        let (dir, scaffolder) = scratch();
        let missing = dir.path().join("missing.pkl");

        let err = scaffolder
            .register_model("m", "1.0.0", &missing, "sklearn", "")
            .unwrap_err();
        match err {
            Error::ModelNotFound { path } => assert_eq!(path, missing),
            other => panic!("expected ModelNotFound, got {other:?}"),
        }
        assert!(scaffolder.list_models().unwrap().is_empty());
    }

    #[test]
    fn load_failure_writes_no_record() {
        let (dir, scaffolder) = scratch();
        let artifact = dir.path().join("invalid.pkl");
        fs::write(&artifact, "This is not a valid model").unwrap();

        let err = scaffolder
            .register_model("m", "1.0.0", &artifact, "sklearn", "")
            .unwrap_err();
        assert!(matches!(err, Error::Load { .. }));
        assert!(scaffolder.list_models().unwrap().is_empty());
        assert!(!scaffolder.registry().path().exists());
    }

    #[test]
    fn unsupported_framework_writes_no_record() {
        let (dir, scaffolder) = scratch();
        let artifact = write_estimator(&dir);

        let err = scaffolder
            .register_model("m", "1.0.0", &artifact, "mxnet", "")
            .unwrap_err();
        assert!(matches!(err, Error::UnsupportedFramework { .. }));
        assert!(scaffolder.list_models().unwrap().is_empty());
    }

    #[tokio::test]
    async fn generate_for_unregistered_model_fails_before_writing() {
        let (dir, scaffolder) = scratch();
        let output = dir.path().join("deployment");

        let err = scaffolder
            .generate_project("ghost", "1.0.0", &output, DeployOptions::default())
            .await
            .unwrap_err();
        assert!(matches!(err, Error::RecordNotFound { .. }));
        assert!(!output.exists());
    }
}
