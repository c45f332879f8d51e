//! CLI command definitions

use std::path::PathBuf;

use clap::{Parser, Subcommand};

/// Lockstep - distributed lock-step graph simulator
#[derive(Parser)]
#[command(
    name = "lockstep",
    about = "Runs a partitioned signal-flow model across worker processes in lock-step",
    version
)]
pub struct Cli {
    /// Path to config file
    #[arg(short, long, global = true)]
    pub config: Option<PathBuf>,

    /// Log level (TRACE, DEBUG, INFO, WARN, ERROR)
    #[arg(short = 'l', long = "log-level", global = true)]
    pub log_level: Option<String>,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Debug, Subcommand)]
pub enum Command {
    /// Run a partitioned model to completion
    Run {
        /// Model file produced by the partitioner
        model: PathBuf,

        /// Number of timesteps to simulate
        #[arg(short, long, default_value = "1000")]
        steps: u64,

        /// Write gathered probe data to this file as JSON
        #[arg(short, long)]
        output: Option<PathBuf>,
    },

    /// Print a summary of a model file without running it
    Inspect {
        /// Model file produced by the partitioner
        model: PathBuf,
    },
}
