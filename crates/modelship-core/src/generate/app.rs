//! Application subtree generation (FastAPI service stub)

use std::path::{Path, PathBuf};

use tokio::fs;

use crate::error::{Error, Result};
use crate::generate::GenerateVars;

/// Write `app/` under the output directory: service stub, dependency
/// manifest, the model artifact, and the model-class source when given.
pub(crate) async fn generate_app(
    vars: &GenerateVars,
    output_dir: &Path,
    files: &mut Vec<PathBuf>,
) -> Result<()> {
    if !vars.api_type.eq_ignore_ascii_case("fastapi") {
        return Err(Error::generation(
            "application stub",
            output_dir,
            format!("unsupported api type '{}' (supported: fastapi)", vars.api_type),
        ));
    }

    let app_dir = output_dir.join("app");
    fs::create_dir_all(&app_dir).await.map_err(|e| {
        Error::generation("application stub", output_dir, format!("create app/ failed: {e}"))
    })?;

    write_file(&app_dir, "main.py", render_main(vars), output_dir, files).await?;

    match &vars.requirements_file {
        Some(custom) => {
            let name = custom
                .file_name()
                .map(|n| n.to_string_lossy().into_owned())
                .ok_or_else(|| {
                    Error::generation(
                        "requirements manifest",
                        output_dir,
                        format!("invalid requirements file path: {}", custom.display()),
                    )
                })?;
            fs::copy(custom, app_dir.join(&name)).await.map_err(|e| {
                Error::generation(
                    "requirements manifest",
                    output_dir,
                    format!("copy of {} failed: {e}", custom.display()),
                )
            })?;
            files.push(PathBuf::from("app").join(name));
        }
        None => {
            write_file(
                &app_dir,
                "requirements.txt",
                default_requirements(&vars.framework),
                output_dir,
                files,
            )
            .await?;
        }
    }

    copy_artifact(vars, &app_dir, output_dir, files).await?;

    if let Some(class_src) = &vars.model_class_path {
        let name = class_src
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| "model.py".to_string());
        fs::copy(class_src, app_dir.join(&name)).await.map_err(|e| {
            Error::generation(
                "model class source",
                output_dir,
                format!("copy of {} failed: {e}", class_src.display()),
            )
        })?;
        files.push(PathBuf::from("app").join(name));
    }

    Ok(())
}

async fn write_file(
    app_dir: &Path,
    name: &str,
    content: String,
    output_dir: &Path,
    files: &mut Vec<PathBuf>,
) -> Result<()> {
    fs::write(app_dir.join(name), content)
        .await
        .map_err(|e| Error::generation(name, output_dir, format!("write failed: {e}")))?;
    files.push(PathBuf::from("app").join(name));
    Ok(())
}

/// The registry stores a path reference, not a copy, so the artifact is
/// materialized into the project here. A moved or deleted artifact fails
/// at this step, not at registry lookup.
async fn copy_artifact(
    vars: &GenerateVars,
    app_dir: &Path,
    output_dir: &Path,
    files: &mut Vec<PathBuf>,
) -> Result<()> {
    let dest = app_dir.join(&vars.model_file);
    let result = if vars.model_path.is_dir() {
        // SavedModel-style artifacts are whole directories; the recursive
        // walk stays off the async runtime.
        let src = vars.model_path.clone();
        tokio::task::spawn_blocking(move || copy_dir_all(&src, &dest))
            .await
            .map_err(std::io::Error::other)
            .and_then(|result| result)
    } else {
        fs::copy(&vars.model_path, &dest).await.map(|_| ())
    };
    result.map_err(|e| {
        Error::generation(
            "model artifact",
            output_dir,
            format!("copy of {} failed: {e}", vars.model_path.display()),
        )
    })?;
    files.push(PathBuf::from("app").join(&vars.model_file));
    Ok(())
}

fn copy_dir_all(src: &Path, dst: &Path) -> std::io::Result<()> {
    std::fs::create_dir_all(dst)?;
    for entry in std::fs::read_dir(src)? {
        let entry = entry?;
        let target = dst.join(entry.file_name());
        if entry.file_type()?.is_dir() {
            copy_dir_all(&entry.path(), &target)?;
        } else {
            std::fs::copy(entry.path(), &target)?;
        }
    }
    Ok(())
}

fn default_requirements(framework: &str) -> String {
    let mut lines = vec!["fastapi", "uvicorn[standard]"];
    match framework {
        "sklearn" => lines.extend(["scikit-learn", "joblib", "numpy"]),
        "pytorch" => lines.extend(["torch", "numpy"]),
        "tensorflow" => lines.extend(["tensorflow", "numpy"]),
        _ => {}
    }
    let mut out = lines.join("\n");
    out.push('\n');
    out
}

fn render_main(vars: &GenerateVars) -> String {
    let header = format!(
        "from fastapi import FastAPI\n\
         from pydantic import BaseModel\n\
         \n\
         app = FastAPI(title=\"{name}\")\n",
        name = vars.model_name
    );

    let body = match vars.framework.as_str() {
        "pytorch" => render_pytorch_body(vars),
        "tensorflow" => format!(
            "import tensorflow as tf\n\
             \n\
             model = tf.keras.models.load_model(\"{file}\")\n\
             \n\
             \n\
             class PredictRequest(BaseModel):\n\
             \x20   features: list[list[float]]\n\
             \n\
             \n\
             @app.post(\"/predict\")\n\
             def predict(request: PredictRequest):\n\
             \x20   predictions = model.predict(request.features)\n\
             \x20   return {{\"predictions\": predictions.tolist()}}\n",
            file = vars.model_file
        ),
        // sklearn and anything estimator-shaped
        _ => format!(
            "import joblib\n\
             \n\
             model = joblib.load(\"{file}\")\n\
             \n\
             \n\
             class PredictRequest(BaseModel):\n\
             \x20   features: list[list[float]]\n\
             \n\
             \n\
             @app.post(\"/predict\")\n\
             def predict(request: PredictRequest):\n\
             \x20   predictions = model.predict(request.features)\n\
             \x20   return {{\"predictions\": predictions.tolist()}}\n",
            file = vars.model_file
        ),
    };

    format!(
        "{header}\n\
         {body}\n\
         \n\
         @app.get(\"/health\")\n\
         def health():\n\
         \x20   return {{\"status\": \"ok\"}}\n"
    )
}

fn render_pytorch_body(vars: &GenerateVars) -> String {
    let mut out = String::from("import torch\nfrom fastapi import HTTPException\n\n");

    match &vars.model_class_path {
        Some(class_src) => {
            let module = class_src
                .file_stem()
                .map(|s| s.to_string_lossy().into_owned())
                .unwrap_or_else(|| "model".to_string());
            out.push_str(&format!(
                "from {module} import *  # model class definition\n\
                 \n\
                 model = Model()\n\
                 model.load_state_dict(torch.load(\"{file}\", map_location=\"cpu\"))\n\
                 model.eval()\n",
                file = vars.model_file
            ));
        }
        None => {
            out.push_str(&format!(
                "# No model class was supplied at deploy time; the saved\n\
                 # parameters are loaded as a plain state dict.\n\
                 state_dict = torch.load(\"{file}\", map_location=\"cpu\")\n",
                file = vars.model_file
            ));
        }
    }

    out.push_str(
        "\n\
         \n\
         class PredictRequest(BaseModel):\n\
         \x20   features: list[list[float]]\n\
         \n\
         \n\
         @app.post(\"/predict\")\n\
         def predict(request: PredictRequest):\n",
    );

    if vars.model_class_path.is_some() {
        out.push_str(
            "\x20   batch = torch.tensor(request.features)\n\
             \x20   with torch.no_grad():\n\
             \x20       output = model(batch)\n\
             \x20   return {\"predictions\": output.tolist()}\n",
        );
    } else {
        out.push_str(
            "\x20   raise HTTPException(\n\
             \x20       status_code=501,\n\
             \x20       detail=\"redeploy with --model-class to enable prediction\",\n\
             \x20   )\n",
        );
    }

    out
}

#[cfg(test)]
mod tests {
    use super::*;

    fn vars_for(framework: &str) -> GenerateVars {
        GenerateVars {
            model_name: "demo".into(),
            model_path: PathBuf::from("/models/demo.bin"),
            model_file: "demo.bin".into(),
            framework: framework.into(),
            api_type: "fastapi".into(),
            python_version: "3.10".into(),
            additional_system_deps: Vec::new(),
            use_gpu: false,
            requirements_file: None,
            service_name: "ml-service".into(),
            port: 8000,
            model_class_path: None,
        }
    }

    #[test]
    fn sklearn_stub_loads_via_joblib() {
        let main = render_main(&vars_for("sklearn"));
        assert!(main.contains("joblib.load(\"demo.bin\")"));
        assert!(main.contains("@app.post(\"/predict\")"));
        assert!(main.contains("@app.get(\"/health\")"));
    }

    #[test]
    fn pytorch_stub_without_class_loads_state_dict() {
        let main = render_main(&vars_for("pytorch"));
        assert!(main.contains("torch.load(\"demo.bin\""));
        assert!(main.contains("state_dict"));
    }

    #[test]
    fn pytorch_stub_with_class_rebuilds_the_model() {
        let mut vars = vars_for("pytorch");
        vars.model_class_path = Some(PathBuf::from("src/net.py"));
        let main = render_main(&vars);
        assert!(main.contains("from net import *"));
        assert!(main.contains("model.load_state_dict"));
    }

    #[test]
    fn requirements_track_the_framework() {
        assert!(default_requirements("sklearn").contains("scikit-learn"));
        assert!(default_requirements("pytorch").contains("torch"));
        assert!(default_requirements("tensorflow").contains("tensorflow"));
        for fw in ["sklearn", "pytorch", "tensorflow"] {
            assert!(default_requirements(fw).starts_with("fastapi\n"));
        }
    }
}
