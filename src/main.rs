//! Lockstep - distributed lock-step graph simulator
//!
//! Coordinator entry point: loads a partitioned model, spawns one worker
//! process per remote chunk, drives the run, gathers probe data.

use std::collections::BTreeMap;
use std::fs;
use std::path::Path;

use clap::Parser;
use eyre::{Context, Result};
use tracing::info;

use lockstep::cli::{Cli, Command};
use lockstep::config::Config;
use lockstep::coordinator::Coordinator;
use lockstep::model::{ChunkId, PartitionedModel};
use lockstep::persistence;

fn setup_logging(cli_log_level: Option<&str>, log_dir: &Path) -> Result<()> {
    fs::create_dir_all(log_dir).context("Failed to create log directory")?;

    let level = match cli_log_level.map(str::to_uppercase).as_deref() {
        Some("TRACE") => tracing::Level::TRACE,
        Some("DEBUG") => tracing::Level::DEBUG,
        Some("WARN" | "WARNING") => tracing::Level::WARN,
        Some("ERROR") => tracing::Level::ERROR,
        Some("INFO") | None => tracing::Level::INFO,
        Some(other) => {
            eprintln!("Warning: Unknown log-level '{other}', defaulting to INFO");
            tracing::Level::INFO
        }
    };

    let log_file = fs::File::create(log_dir.join("lockstep.log")).context("Failed to create log file")?;

    tracing_subscriber::fmt()
        .with_writer(log_file)
        .with_ansi(false)
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env().add_directive(level.into()))
        .init();

    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let config = Config::load(cli.config.as_deref()).context("Failed to load configuration")?;
    setup_logging(cli.log_level.as_deref(), &config.log_dir()).context("Failed to setup logging")?;

    match cli.command {
        Command::Run { model, steps, output } => cmd_run(&config, &model, steps, output.as_deref()).await,
        Command::Inspect { model } => cmd_inspect(&model),
    }
}

async fn cmd_run(config: &Config, model_path: &Path, steps: u64, output: Option<&Path>) -> Result<()> {
    let model = persistence::load_model(model_path)?;
    let num_workers = num_workers_for(&model);

    info!(model = %model_path.display(), num_workers, steps, "starting run");
    let mut coordinator = Coordinator::spawn(&config.coordinator, num_workers, model.dt).await?;
    coordinator
        .configure_model(&model)
        .context("Failed to configure model")?;

    coordinator.run_steps(steps).await.context("Run failed")?;
    let probes = coordinator.gather_probes().await.context("Probe gather failed")?;
    coordinator.finalize().await?;

    println!(
        "Completed {steps} steps across {} chunks ({num_workers} workers)",
        model.num_chunks()
    );
    let mut by_key: BTreeMap<(ChunkId, u64), _> = probes.into_iter().collect();
    for (&(chunk_id, probe_key), samples) in &by_key {
        println!("  chunk {chunk_id} probe {probe_key}: {} samples", samples.len());
    }

    if let Some(path) = output {
        let named: BTreeMap<String, _> = std::mem::take(&mut by_key)
            .into_iter()
            .map(|((chunk_id, probe_key), samples)| (format!("{chunk_id}/{probe_key}"), samples))
            .collect();
        let contents = serde_json::to_string_pretty(&named).context("Failed to serialize probe data")?;
        fs::write(path, contents).with_context(|| format!("Failed to write {}", path.display()))?;
        println!("Probe data written to {}", path.display());
    }

    Ok(())
}

fn cmd_inspect(model_path: &Path) -> Result<()> {
    let model = persistence::load_model(model_path)?;

    println!("Model: {} (dt = {})", model_path.display(), model.dt);
    println!("Chunks: {} ({} workers)", model.num_chunks(), num_workers_for(&model));
    for chunk in &model.chunks {
        println!(
            "  [{}] {}: {} signals, {} operators, {} probes",
            chunk.chunk_id,
            chunk.label,
            chunk.signals.len(),
            chunk.operators.len(),
            chunk.probes.len()
        );
    }
    Ok(())
}

/// All chunks but the highest-id one are worker-hosted; the coordinator
/// hosts the last chunk itself.
fn num_workers_for(model: &PartitionedModel) -> u32 {
    model.chunks.len().saturating_sub(1) as u32
}
