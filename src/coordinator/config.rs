//! Coordinator launch settings

use std::path::PathBuf;

use serde::{Deserialize, Serialize};

use crate::comm::default_socket_dir;

/// Settings for spawning the worker fleet.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CoordinatorConfig {
    /// Worker executable launched once per remote chunk.
    #[serde(default = "default_worker_exe")]
    pub worker_exe: PathBuf,

    /// Directory holding the per-session group socket.
    #[serde(default = "default_socket_dir")]
    pub socket_dir: PathBuf,
}

impl Default for CoordinatorConfig {
    fn default() -> Self {
        Self {
            worker_exe: default_worker_exe(),
            socket_dir: default_socket_dir(),
        }
    }
}

/// The worker binary installed next to the coordinator binary, falling
/// back to a PATH lookup when the current executable cannot be resolved.
fn default_worker_exe() -> PathBuf {
    std::env::current_exe()
        .ok()
        .and_then(|exe| Some(exe.parent()?.join("lockstep-worker")))
        .unwrap_or_else(|| PathBuf::from("lockstep-worker"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_worker_exe_is_sibling() {
        let config = CoordinatorConfig::default();
        assert!(config.worker_exe.ends_with("lockstep-worker"));
    }

    #[test]
    fn test_missing_fields_take_defaults() {
        let config: CoordinatorConfig = serde_yaml::from_str("{}").unwrap();
        assert!(config.worker_exe.ends_with("lockstep-worker"));
        assert!(config.socket_dir.ends_with("lockstep"));
    }
}
