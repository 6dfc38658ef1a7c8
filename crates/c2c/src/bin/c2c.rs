//! c2c CLI - generate Kubernetes manifests and Dockerfiles from a model file.

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use tracing::info;
use tracing_subscriber::EnvFilter;

use c2c::orchestrator::{ArtifactStatus, GenerationReport};
use c2c::{runner, GeneratorConfig, ModelRegistry};

/// c2c - Code to cloud artifact generator.
#[derive(Parser)]
#[command(name = "c2c")]
#[command(about = "Generate Kubernetes manifests and Dockerfiles from workload models")]
struct Cli {
    /// Generator configuration file (or set `C2C_CONFIG` env var).
    #[arg(long, env = "C2C_CONFIG")]
    config: Option<PathBuf>,

    /// Enable verbose logging.
    #[arg(short, long, default_value = "false")]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Generate and write all artifacts.
    Generate {
        /// Model file (YAML, or JSON with a `.json` extension).
        #[arg(long)]
        models: PathBuf,

        /// Output root (or set `C2C_OUTPUT_DIR` env var).
        #[arg(long, env = "C2C_OUTPUT_DIR")]
        output: Option<PathBuf>,

        /// Generate scopes one at a time.
        #[arg(long, default_value = "false")]
        sequential: bool,
    },

    /// Check that every artifact can be generated without writing anything.
    Validate {
        /// Model file (YAML, or JSON with a `.json` extension).
        #[arg(long)]
        models: PathBuf,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let filter = if cli.verbose {
        EnvFilter::new("debug")
    } else {
        EnvFilter::new("info")
    };
    tracing_subscriber::fmt().with_env_filter(filter).init();

    let mut config = match &cli.config {
        Some(path) => GeneratorConfig::from_file(path)
            .with_context(|| format!("Failed to load config {}", path.display()))?,
        None => GeneratorConfig::default(),
    };

    let reports = match cli.command {
        Commands::Generate {
            models,
            output,
            sequential,
        } => {
            if let Some(output) = output {
                config.output_dir = output;
            }
            if sequential {
                config.parallel = false;
            }
            let registry = load_models(&models)?;
            info!(
                models = registry.model_count(),
                output = %config.output_dir.display(),
                "Generating artifacts"
            );
            runner::generate_all(&registry, &config)
                .await
                .context("Generation failed")?
        }
        Commands::Validate { models } => {
            let registry = load_models(&models)?;
            runner::validate_all(&registry, &config)
                .await
                .context("Validation failed")?
        }
    };

    for report in &reports {
        print_report(report);
    }

    let failed: Vec<_> = reports
        .iter()
        .filter(|r| r.is_failed() || r.has_write_failures())
        .map(|r| r.scope.as_str())
        .collect();
    if !failed.is_empty() {
        anyhow::bail!("{} scope(s) failed: {}", failed.len(), failed.join(", "));
    }

    Ok(())
}

fn load_models(path: &Path) -> Result<ModelRegistry> {
    ModelRegistry::from_file(path)
        .with_context(|| format!("Failed to load models from {}", path.display()))
}

fn print_report(report: &GenerationReport) {
    let marker = if report.is_failed() { "❌" } else { "✅" };
    println!("\n{marker} {} ({})", report.scope, report.state);

    for artifact in &report.artifacts {
        let detail = match &artifact.status {
            ArtifactStatus::Emitted { path } => path.display().to_string(),
            ArtifactStatus::Skipped { error } | ArtifactStatus::Failed { error } => {
                error.to_string()
            }
            ArtifactStatus::WriteFailed { message } => message.clone(),
            ArtifactStatus::Generated | ArtifactStatus::Discarded => String::new(),
        };
        println!(
            "   {:<24} {:<32} {:<13} {}",
            artifact.kind.as_str(),
            artifact.name,
            artifact.status.label(),
            detail
        );
    }

    for build in &report.image_builds {
        println!("   🐳 build {} from {}", build.image, build.context_dir.display());
    }
}
