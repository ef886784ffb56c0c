//! Modelship Core - Model registry and deployment scaffolding
//!
//! This library provides the core functionality for registering trained
//! ML models and generating deployable service projects for them. It is
//! consumed by the `modelship` CLI binary but has no CLI surface of its
//! own.
//!
//! # Architecture
//!
//! The library is organized into layers:
//!
//! - **Registry** - `ModelRegistry`, a durable `(name, version)` table
//!   backed by a single JSON document with atomic-rename persistence
//! - **Loader** - `ModelLoader`, framework-specific structural validation
//!   of model artifacts behind a fixed dispatch table
//! - **Generation** - `ProjectGenerator` / `DockerGenerator`, rendering
//!   the application subtree, Dockerfile, and compose file
//! - **Scaffolding** - `Scaffolder`, the orchestration that wires the
//!   three together for `register_model` and `generate_project`
//!
//! # Example Usage
//!
//! ```ignore
//! use modelship_core::{ModelRegistry, Scaffolder};
//!
//! let registry = ModelRegistry::new("registry.json");
//! let scaffolder = Scaffolder::new(registry);
//!
//! let record = scaffolder.register_model(
//!     "churn", "1.0.0", "models/churn.pkl".as_ref(), "sklearn", "",
//! )?;
//! ```

pub mod error;
pub mod generate;
pub mod loader;
pub mod registry;
pub mod scaffold;

// Re-export main types for convenience
pub use error::{Error, Result};
pub use generate::{DockerGenerator, GenerateVars, GeneratedProject, ProjectGenerator};
pub use loader::{Framework, ModelHandle, ModelLoader};
pub use registry::{ModelRecord, ModelRegistry};
pub use scaffold::{DeployOptions, Scaffolder};

/// Registry document filename used when the caller does not pick one
pub const DEFAULT_REGISTRY_FILE: &str = "registry.json";

/// Version the CLI defaults a registration to when none is given
pub const DEFAULT_MODEL_VERSION: &str = "1.0.0";
