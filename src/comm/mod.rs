//! Inter-process communication for the simulation group
//!
//! One coordinator process (rank 0) and N worker processes (ranks 1..=N)
//! form a merged communication group over Unix Domain Sockets, with the
//! coordinator relaying worker-to-worker traffic. Frames are JSON, one per
//! line. The group is an explicit session object ([`CommGroup`]) with an
//! acquire/release lifecycle: opened by [`CommGroup::spawn_workers`] /
//! [`CommGroup::join_from_env`], closed exactly once by
//! [`CommGroup::shutdown`] — never ambient global state.

use std::path::PathBuf;

pub mod error;
pub mod frame;
pub mod group;

pub use error::CommError;
pub use frame::{Body, ControlMessage, Frame, Rank, Tag};
pub use group::CommGroup;

/// Environment variable carrying the group socket path to spawned workers.
pub const ENV_SOCKET: &str = "LOCKSTEP_SOCKET";

/// Environment variable carrying a worker's assigned rank.
pub const ENV_RANK: &str = "LOCKSTEP_RANK";

/// Environment variable carrying the total group size (workers + 1).
pub const ENV_WORLD: &str = "LOCKSTEP_WORLD";

/// Directory where per-session group sockets are created.
///
/// Uses the same base-directory fallback chain as other runtime files.
pub fn default_socket_dir() -> PathBuf {
    dirs::runtime_dir()
        .or_else(dirs::data_local_dir)
        .unwrap_or_else(std::env::temp_dir)
        .join("lockstep")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_socket_dir_ends_with_lockstep() {
        assert!(default_socket_dir().ends_with("lockstep"));
    }
}
