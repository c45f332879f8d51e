//! Data model for partitioned signal/operator graphs
//!
//! A simulation is a graph of named numeric buffers (signals) updated by a
//! fixed sequence of operators. The partitioner (an external collaborator)
//! splits the graph into chunks and hands each chunk's configuration to the
//! coordinator as a [`ChunkConfig`].

pub mod partition;
pub mod signal;
pub mod tensor;

pub use partition::{ChunkConfig, PartitionedModel, ProbeSpec, SignalSpec};
pub use signal::{SignalKey, SignalStore, SlotIndex};
pub use tensor::Tensor;

/// Identifier of a chunk within a partitioned model.
pub type ChunkId = u32;

/// Identifier of a probe, unique within the whole model.
pub type ProbeKey = u64;
