//! Dockerfile and docker-compose rendering

use std::path::{Path, PathBuf};

use tokio::fs;

use crate::error::{Error, Result};
use crate::generate::{app, GenerateVars, GeneratedProject, ProjectGenerator};

const GPU_BASE_IMAGE: &str = "nvidia/cuda:11.8.0-base-ubuntu22.04";
const WRITE_CHECK: &str = ".modelship_test";

/// Default generator: application subtree + Dockerfile + docker-compose.yml
#[derive(Debug, Default)]
pub struct DockerGenerator;

impl DockerGenerator {
    pub fn new() -> Self {
        Self
    }
}

impl ProjectGenerator for DockerGenerator {
    async fn generate(&self, vars: &GenerateVars, output_dir: &Path) -> Result<GeneratedProject> {
        preflight(output_dir).await?;

        let mut files = Vec::new();
        app::generate_app(vars, output_dir, &mut files).await?;

        write_artifact(output_dir, "Dockerfile", render_dockerfile(vars), &mut files).await?;
        write_artifact(
            output_dir,
            "docker-compose.yml",
            render_compose(vars),
            &mut files,
        )
        .await?;

        Ok(GeneratedProject {
            output_dir: output_dir.to_path_buf(),
            files,
        })
    }
}

/// Fail up front when the output directory cannot be created or written,
/// before any artifact is produced.
async fn preflight(output_dir: &Path) -> Result<()> {
    fs::create_dir_all(output_dir).await.map_err(|e| {
        Error::generation("output directory", output_dir, format!("create failed: {e}"))
    })?;

    let check = output_dir.join(WRITE_CHECK);
    fs::write(&check, b"")
        .await
        .map_err(|e| Error::generation("output directory", output_dir, format!("not writable: {e}")))?;
    let _ = fs::remove_file(&check).await;
    Ok(())
}

async fn write_artifact(
    output_dir: &Path,
    name: &str,
    content: String,
    files: &mut Vec<PathBuf>,
) -> Result<()> {
    fs::write(output_dir.join(name), content)
        .await
        .map_err(|e| Error::generation(name, output_dir, format!("write failed: {e}")))?;
    files.push(PathBuf::from(name));
    Ok(())
}

fn render_dockerfile(vars: &GenerateVars) -> String {
    let mut out = String::new();

    if vars.use_gpu {
        out.push_str(&format!("FROM {GPU_BASE_IMAGE}\n\n"));
        out.push_str("ENV NVIDIA_VISIBLE_DEVICES=all\n");
        out.push_str("ENV NVIDIA_DRIVER_CAPABILITIES=compute,utility\n");
    } else {
        out.push_str(&format!("FROM python:{}-slim\n", vars.python_version));
    }

    out.push_str("\nWORKDIR /app\n\n");

    // Base build toolchain plus whatever the deploy asked for; the CUDA
    // base image additionally needs a Python runtime installed.
    let mut system_deps = vec!["build-essential".to_string()];
    if vars.use_gpu {
        system_deps.push(format!("python{}", vars.python_version));
        system_deps.push("python3-pip".to_string());
    }
    system_deps.extend(vars.additional_system_deps.iter().cloned());

    out.push_str("RUN apt-get update && apt-get install -y --no-install-recommends \\\n");
    for dep in &system_deps {
        out.push_str(&format!("    {dep} \\\n"));
    }
    out.push_str(" && rm -rf /var/lib/apt/lists/*\n\n");

    out.push_str("RUN useradd --create-home appuser\n\n");

    match requirements_basename(vars) {
        Some(custom) => {
            out.push_str("# Using custom requirements file\n");
            out.push_str(&format!(
                "COPY --chown=appuser:appuser app/{custom} ./requirements.txt\n"
            ));
        }
        None => out.push_str("COPY --chown=appuser:appuser app/requirements.txt .\n"),
    }
    out.push_str("RUN pip install --no-cache-dir -r requirements.txt\n\n");

    out.push_str("COPY --chown=appuser:appuser app/ .\n");
    out.push_str(&format!(
        "COPY --chown=appuser:appuser app/{} /app/\n\n",
        vars.model_file
    ));

    out.push_str("USER appuser\n\n");
    out.push_str(&format!("EXPOSE {}\n", vars.port));
    out.push_str(&format!(
        "CMD [\"uvicorn\", \"main:app\", \"--host\", \"0.0.0.0\", \"--port\", \"{}\"]\n",
        vars.port
    ));

    out
}

fn render_compose(vars: &GenerateVars) -> String {
    let mut out = String::new();

    out.push_str("services:\n");
    out.push_str(&format!("  {}:\n", vars.service_name));
    out.push_str("    build: .\n");
    out.push_str("    ports:\n");
    out.push_str(&format!("      - \"{port}:{port}\"\n", port = vars.port));
    out.push_str("    volumes:\n");
    out.push_str("      - ./app:/app\n");
    out.push_str("    restart: unless-stopped\n");
    out.push_str("    healthcheck:\n");
    out.push_str(&format!(
        "      test: [\"CMD\", \"curl\", \"-f\", \"http://localhost:{}/health\"]\n",
        vars.port
    ));
    out.push_str("      interval: 30s\n");
    out.push_str("      timeout: 10s\n");
    out.push_str("      retries: 3\n");

    if vars.use_gpu {
        out.push_str("    deploy:\n");
        out.push_str("      resources:\n");
        out.push_str("        reservations:\n");
        out.push_str("          devices:\n");
        out.push_str("            - driver: nvidia\n");
        out.push_str("              count: all\n");
        out.push_str("              capabilities: [gpu]\n");
    }

    out
}

/// Basename of a custom requirements file, or None when the default
/// per-framework manifest is generated
fn requirements_basename(vars: &GenerateVars) -> Option<String> {
    vars.requirements_file
        .as_ref()
        .and_then(|p| p.file_name())
        .map(|n| n.to_string_lossy().into_owned())
}
