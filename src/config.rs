//! Simulator configuration
//!
//! Loaded from a YAML file. Resolution order: an explicit `--config` path,
//! then `.lockstep.yml` in the current directory, then built-in defaults.
//! Every field is optional in the file.

use std::path::{Path, PathBuf};

use eyre::{Result, WrapErr};
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::coordinator::CoordinatorConfig;

pub const CONFIG_FILE: &str = ".lockstep.yml";

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    /// Worker fleet settings.
    #[serde(default)]
    pub coordinator: CoordinatorConfig,

    /// Directory for log files; platform data dir when unset.
    #[serde(default)]
    pub log_dir: Option<PathBuf>,
}

impl Config {
    /// Resolve configuration: explicit path, else `.lockstep.yml` if
    /// present, else defaults.
    pub fn load(explicit: Option<&Path>) -> Result<Self> {
        if let Some(path) = explicit {
            return Self::from_file(path);
        }
        let local = Path::new(CONFIG_FILE);
        if local.exists() {
            return Self::from_file(local);
        }
        debug!("no config file found, using defaults");
        Ok(Self::default())
    }

    fn from_file(path: &Path) -> Result<Self> {
        let contents = std::fs::read_to_string(path)
            .wrap_err_with(|| format!("failed to read config file {}", path.display()))?;
        serde_yaml::from_str(&contents)
            .wrap_err_with(|| format!("invalid config file {}", path.display()))
    }

    /// Directory for log files.
    pub fn log_dir(&self) -> PathBuf {
        self.log_dir.clone().unwrap_or_else(|| {
            dirs::data_local_dir()
                .unwrap_or_else(std::env::temp_dir)
                .join("lockstep")
                .join("logs")
        })
    }
}
