//! Lockstep worker entry point
//!
//! Launched by the coordinator, never by hand. The group socket, rank and
//! world size arrive through the environment; everything else arrives over
//! the control channel.

use std::fs;

use eyre::{Context, Result};
use tracing::info;

use lockstep::chunk::Worker;
use lockstep::comm::{CommGroup, ENV_RANK};
use lockstep::config::Config;

fn setup_logging(rank: &str) -> Result<()> {
    let log_dir = Config::default().log_dir();
    fs::create_dir_all(&log_dir).context("Failed to create log directory")?;

    let log_file =
        fs::File::create(log_dir.join(format!("lockstep-worker-{rank}.log"))).context("Failed to create log file")?;

    tracing_subscriber::fmt()
        .with_writer(log_file)
        .with_ansi(false)
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    let rank = std::env::var(ENV_RANK).unwrap_or_else(|_| "unknown".to_string());
    setup_logging(&rank)?;

    let comm = CommGroup::join_from_env()
        .await
        .context("Failed to join simulation group")?;
    info!(rank = comm.rank(), world = comm.world(), "worker joined");

    Worker::new(comm).run().await
}
