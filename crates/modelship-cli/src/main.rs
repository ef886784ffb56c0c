//! Modelship CLI - Register ML models and scaffold deployable services

use std::io::Write;
use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use colored::Colorize;
use modelship_core::{
    DeployOptions, ModelRecord, ModelRegistry, Scaffolder, DEFAULT_MODEL_VERSION,
    DEFAULT_REGISTRY_FILE,
};

/// CLI version
pub const CLI_VERSION: &str = env!("CARGO_PKG_VERSION");

#[derive(Parser, Debug)]
#[command(name = "modelship")]
#[command(about = "CLI for registering ML models and scaffolding deployable services")]
#[command(version)]
pub struct Args {
    /// Registry document path
    #[arg(long, global = true, default_value = DEFAULT_REGISTRY_FILE)]
    pub registry: PathBuf,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Register a trained model artifact under a name and version
    Register(RegisterArgs),
    /// List registered models
    List,
    /// Generate a deployable project for a registered model
    Deploy(DeployArgs),
    /// Remove a model from the registry
    Delete(DeleteArgs),
    /// Register a model and generate its project in one step
    Init(InitArgs),
    /// Print the CLI version
    Version,
}

#[derive(Parser, Debug)]
pub struct RegisterArgs {
    /// Path to the model artifact (file or directory)
    pub model_path: PathBuf,

    /// Model name
    #[arg(short, long)]
    pub name: String,

    /// Model version
    #[arg(short, long, default_value = DEFAULT_MODEL_VERSION)]
    pub version: String,

    /// Framework that produced the artifact (sklearn, pytorch, tensorflow)
    #[arg(short, long)]
    pub framework: String,

    /// Free-text description
    #[arg(short, long, default_value = "")]
    pub description: String,
}

#[derive(Parser, Debug)]
pub struct DeployArgs {
    /// Registered model name
    #[arg(short, long)]
    pub name: String,

    /// Registered model version
    #[arg(short, long, default_value = DEFAULT_MODEL_VERSION)]
    pub version: String,

    /// Directory the project is generated into
    #[arg(short, long, default_value = "deployment")]
    pub output: PathBuf,

    #[command(flatten)]
    pub options: DeployFlags,
}

/// Generation knobs shared by `deploy` and `init`
#[derive(Parser, Debug)]
pub struct DeployFlags {
    /// API style of the generated service
    #[arg(long = "api", default_value = "fastapi")]
    pub api_type: String,

    /// Python version for the container base image
    #[arg(long, default_value = "3.10")]
    pub python_version: String,

    /// Build the container against a GPU-enabled base image
    #[arg(long = "gpu")]
    pub use_gpu: bool,

    /// Port the service listens on
    #[arg(short, long, default_value_t = 8000)]
    pub port: u16,

    /// Service name written into the compose file
    #[arg(long, default_value = "ml-service")]
    pub service_name: String,

    /// Custom dependency manifest used instead of the generated
    /// requirements.txt
    #[arg(long = "requirements")]
    pub requirements_file: Option<PathBuf>,

    /// Python source defining the model class (needed by pytorch models)
    #[arg(long = "model-class")]
    pub model_class_path: Option<PathBuf>,

    /// Extra OS package installed into the image (repeatable)
    #[arg(long = "system-dep")]
    pub additional_system_deps: Vec<String>,
}

impl From<DeployFlags> for DeployOptions {
    fn from(flags: DeployFlags) -> Self {
        DeployOptions {
            api_type: flags.api_type,
            python_version: flags.python_version,
            use_gpu: flags.use_gpu,
            port: flags.port,
            service_name: flags.service_name,
            additional_system_deps: flags.additional_system_deps,
            requirements_file: flags.requirements_file,
            model_class_path: flags.model_class_path,
        }
    }
}

#[derive(Parser, Debug)]
pub struct DeleteArgs {
    /// Registered model name
    #[arg(short, long)]
    pub name: String,

    /// Registered model version
    #[arg(short, long, default_value = DEFAULT_MODEL_VERSION)]
    pub version: String,

    /// Delete without prompting
    #[arg(short, long)]
    pub force: bool,
}

#[derive(Parser, Debug)]
pub struct InitArgs {
    /// Path to the model artifact
    #[arg(short, long)]
    pub model: PathBuf,

    /// Framework that produced the artifact
    #[arg(short, long)]
    pub framework: String,

    /// Model name; defaults to the artifact's filename stem
    #[arg(short, long)]
    pub name: Option<String>,

    /// Model version
    #[arg(short, long, default_value = DEFAULT_MODEL_VERSION)]
    pub version: String,

    /// Directory the project is generated into
    #[arg(long = "output-dir", default_value = "deployment")]
    pub output_dir: PathBuf,

    #[command(flatten)]
    pub options: DeployFlags,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();
    let scaffolder = Scaffolder::new(ModelRegistry::new(&args.registry));

    match args.command {
        Command::Register(cmd) => register(&scaffolder, cmd),
        Command::List => list(&scaffolder),
        Command::Deploy(cmd) => deploy(&scaffolder, cmd).await,
        Command::Delete(cmd) => delete(&scaffolder, cmd),
        Command::Init(cmd) => init(&scaffolder, cmd).await,
        Command::Version => {
            println!("modelship {CLI_VERSION}");
            Ok(())
        }
    }
}

fn register(scaffolder: &Scaffolder, cmd: RegisterArgs) -> Result<()> {
    let record = scaffolder.register_model(
        &cmd.name,
        &cmd.version,
        &cmd.model_path,
        &cmd.framework,
        &cmd.description,
    )?;
    print_registered(&record);
    Ok(())
}

fn list(scaffolder: &Scaffolder) -> Result<()> {
    let records = scaffolder.list_models()?;
    if records.is_empty() {
        println!("No models registered.");
        return Ok(());
    }

    println!(
        "{:<20} {:<10} {:<12} {:<22} DESCRIPTION",
        "NAME".bold(),
        "VERSION".bold(),
        "FRAMEWORK".bold(),
        "REGISTERED".bold()
    );
    for record in records {
        println!(
            "{:<20} {:<10} {:<12} {:<22} {}",
            record.name,
            record.version,
            record.framework,
            record.registered_at.format("%Y-%m-%d %H:%M:%S"),
            record.description
        );
    }
    Ok(())
}

async fn deploy(scaffolder: &Scaffolder, cmd: DeployArgs) -> Result<()> {
    let result = scaffolder
        .generate_project(&cmd.name, &cmd.version, &cmd.output, cmd.options.into())
        .await?;
    print_generated(&result.output_dir);
    Ok(())
}

fn delete(scaffolder: &Scaffolder, cmd: DeleteArgs) -> Result<()> {
    if !cmd.force && !confirm(&format!("Delete '{}' v{}?", cmd.name, cmd.version))? {
        println!("Aborted.");
        return Ok(());
    }

    if scaffolder.delete_model(&cmd.name, &cmd.version)? {
        println!(
            "{} '{}' v{} removed from the registry",
            "Deleted".green().bold(),
            cmd.name,
            cmd.version
        );
    } else {
        println!(
            "{} no model '{}' v{} in the registry",
            "Warning:".yellow(),
            cmd.name,
            cmd.version
        );
    }
    Ok(())
}

async fn init(scaffolder: &Scaffolder, cmd: InitArgs) -> Result<()> {
    let name = match cmd.name {
        Some(name) => name,
        None => artifact_stem(&cmd.model)?,
    };
    let description = format!(
        "Automatically registered by init command on {}",
        chrono::Utc::now().format("%Y-%m-%d")
    );

    let record =
        scaffolder.register_model(&name, &cmd.version, &cmd.model, &cmd.framework, &description)?;
    print_registered(&record);

    let result = scaffolder
        .generate_project(&name, &cmd.version, &cmd.output_dir, cmd.options.into())
        .await?;
    print_generated(&result.output_dir);
    Ok(())
}

/// Filename without its extension, used when `init` is not given a name
fn artifact_stem(path: &std::path::Path) -> Result<String> {
    path.file_stem()
        .map(|stem| stem.to_string_lossy().into_owned())
        .with_context(|| {
            format!(
                "cannot derive a model name from {}; pass --name",
                path.display()
            )
        })
}

fn print_registered(record: &ModelRecord) {
    println!(
        "{} Model '{}' v{} has been registered ({})",
        "Success:".green().bold(),
        record.name,
        record.version,
        record.framework
    );
}

fn print_generated(output_dir: &std::path::Path) {
    println!(
        "{} Successfully generated project in {}",
        "Success:".green().bold(),
        output_dir.display()
    );
    println!();
    println!("Next steps:");
    println!("  cd {}", output_dir.display());
    println!("  docker compose up --build");
}

fn confirm(prompt: &str) -> Result<bool> {
    print!("{prompt} [y/N] ");
    std::io::stdout().flush().context("flush stdout")?;
    let mut answer = String::new();
    std::io::stdin()
        .read_line(&mut answer)
        .context("read confirmation")?;
    Ok(matches!(answer.trim(), "y" | "Y" | "yes"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn cli_definition_is_consistent() {
        Args::command().debug_assert();
    }

    #[test]
    fn register_parses_defaults() {
        let args = Args::parse_from([
            "modelship",
            "register",
            "model.pkl",
            "--name",
            "churn",
            "--framework",
            "sklearn",
        ]);
        match args.command {
            Command::Register(cmd) => {
                assert_eq!(cmd.version, DEFAULT_MODEL_VERSION);
                assert_eq!(cmd.description, "");
            }
            other => panic!("expected register, got {other:?}"),
        }
        assert_eq!(args.registry, PathBuf::from(DEFAULT_REGISTRY_FILE));
    }

    #[test]
    fn register_requires_name_and_framework() {
        assert!(Args::try_parse_from(["modelship", "register", "model.pkl"]).is_err());
    }

    #[test]
    fn deploy_accepts_generation_flags() {
        let args = Args::parse_from([
            "modelship",
            "deploy",
            "--name",
            "churn",
            "--output",
            "out",
            "--gpu",
            "--port",
            "9001",
            "--system-dep",
            "git",
            "--system-dep",
            "curl",
        ]);
        match args.command {
            Command::Deploy(cmd) => {
                assert!(cmd.options.use_gpu);
                assert_eq!(cmd.options.port, 9001);
                assert_eq!(cmd.options.additional_system_deps, ["git", "curl"]);
            }
            other => panic!("expected deploy, got {other:?}"),
        }
    }

    #[test]
    fn global_registry_flag_applies_after_the_subcommand() {
        let args = Args::parse_from(["modelship", "list", "--registry", "/tmp/reg.json"]);
        assert_eq!(args.registry, PathBuf::from("/tmp/reg.json"));
    }
}
