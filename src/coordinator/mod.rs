//! Coordinator: rank 0 of the simulation group
//!
//! The coordinator spawns the worker processes, streams each remote chunk's
//! configuration over the control channel, hosts one chunk of its own, and
//! drives the run phase: it broadcasts `RunSteps`, steps its local chunk in
//! lock-step with the workers, and meets them at the barrier. After a run
//! it gathers every probe's accumulated samples into one map.

mod config;
mod core;

pub use config::CoordinatorConfig;
pub use self::core::Coordinator;
