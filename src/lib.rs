//! Lockstep - distributed lock-step graph simulator
//!
//! Lockstep runs a partitioned signal-flow model across a group of
//! processes: one coordinator plus one worker per remote chunk. Every
//! process steps its chunk's fixed operator sequence in lock-step; signals
//! crossing chunk boundaries move through blocking send/receive operators
//! embedded at fixed positions in the sequence, which is the system's sole
//! cross-chunk consistency mechanism.
//!
//! # Core Concepts
//!
//! - **One process per chunk**: Each chunk's signal arena is private to its
//!   process; there is no shared memory
//! - **Fixed total order**: Operators run in the partitioner-supplied order,
//!   strictly sequentially, every step
//! - **Blocking exchanges**: Boundary signals move through matched
//!   send/receive operator pairs; receives block without timeout
//! - **Phased protocol**: Configure, run, gather, stop - driven entirely by
//!   control messages from the coordinator
//!
//! # Modules
//!
//! - [`comm`] - The merged communication group and wire frames
//! - [`model`] - Tensors, signal arenas and the partitioned-model handoff
//! - [`operator`] - Operator specs, runtime forms and the LIF kernels
//! - [`chunk`] - Chunk state, step loop and the worker process loop
//! - [`coordinator`] - Rank 0: spawning, configuration, run and gather
//! - [`persistence`] - Model files
//! - [`config`] - Configuration types and loading
//! - [`cli`] - Command-line interface

pub mod chunk;
pub mod cli;
pub mod comm;
pub mod config;
pub mod coordinator;
pub mod model;
pub mod operator;
pub mod persistence;
pub mod probe;

// Re-export commonly used types
pub use chunk::{Chunk, ChunkError, Worker};
pub use comm::{Body, CommError, CommGroup, ControlMessage, Frame, Rank, Tag};
pub use config::Config;
pub use coordinator::{Coordinator, CoordinatorConfig};
pub use model::{ChunkConfig, ChunkId, PartitionedModel, ProbeKey, ProbeSpec, SignalSpec, Tensor};
pub use operator::OperatorSpec;
pub use persistence::{load_model, save_model};
pub use probe::Probe;
