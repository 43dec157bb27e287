//! `stepflow` CLI entry-point.
//!
//! Available sub-commands:
//! - `run`  — load a workflow definition JSON file, execute it with the
//!   built-in actions and print the run summary.
//! - `plan` — print the rounds a definition would execute in, or the steps
//!   that would deadlock.

use std::path::{Path, PathBuf};
use std::process::ExitCode;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use engine::{plan_frontiers, EngineConfig, WorkflowDefinition, WorkflowEngine, WorkflowStatus};
use tracing::info;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(
    name = "stepflow",
    about = "Dependency-driven step execution engine",
    version
)]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Execute a workflow definition and print the summary as JSON.
    Run {
        /// Path to the workflow definition JSON file.
        path: PathBuf,
        /// Engine config JSON file; flags override its values.
        #[arg(long, env = "STEPFLOW_CONFIG")]
        config: Option<PathBuf>,
        /// Maximum steps of one round in flight at once.
        #[arg(long)]
        max_parallel: Option<usize>,
    },
    /// Show the execution rounds of a workflow definition without running it.
    Plan {
        /// Path to the workflow definition JSON file.
        path: PathBuf,
    },
}

fn read_json<T: serde::de::DeserializeOwned>(path: &Path) -> Result<T> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("cannot read file {}", path.display()))?;
    serde_json::from_str(&content).with_context(|| format!("invalid JSON in {}", path.display()))
}

async fn run(path: &Path, config: Option<&Path>, max_parallel: Option<usize>) -> Result<ExitCode> {
    let mut engine_config: EngineConfig = match config {
        Some(config) => read_json(config)?,
        None => EngineConfig::default(),
    };
    if max_parallel.is_some() {
        engine_config.max_parallel_steps = max_parallel;
    }

    let definition: WorkflowDefinition = read_json(path)?;

    let engine = WorkflowEngine::new(engine_config);
    info!(max_parallel_steps = ?engine.config().max_parallel_steps, "engine configured");
    for (action, executor) in actions::builtin::defaults() {
        engine.register(action, executor).await;
    }

    let workflow_id = engine.load_definition(definition).await?;
    let summary = engine.run(workflow_id).await?;
    info!(%workflow_id, status = %summary.status, "run finished");

    println!("{}", serde_json::to_string_pretty(&summary)?);

    Ok(match summary.status {
        WorkflowStatus::Completed => ExitCode::SUCCESS,
        _ => ExitCode::FAILURE,
    })
}

fn plan(path: &Path) -> Result<ExitCode> {
    let definition: WorkflowDefinition = read_json(path)?;
    let workflow = definition.into_workflow()?;

    match plan_frontiers(&workflow) {
        Ok(rounds) => {
            for (i, round) in rounds.iter().enumerate() {
                println!("round {}: {}", i + 1, round.join(", "));
            }
            Ok(ExitCode::SUCCESS)
        }
        Err(e) => {
            eprintln!("{e}");
            Ok(ExitCode::FAILURE)
        }
    }
}

#[tokio::main]
async fn main() -> Result<ExitCode> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();

    match cli.command {
        Command::Run { path, config, max_parallel } => {
            run(&path, config.as_deref(), max_parallel).await
        }
        Command::Plan { path } => plan(&path),
    }
}
