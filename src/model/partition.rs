//! Partitioner handoff types
//!
//! The graph partitioner is an external collaborator: it decides which
//! signals and operators live on which chunk and embeds matched
//! send/receive pairs into the per-chunk operator sequences. Its output is
//! a [`PartitionedModel`], which this crate consumes as-is. The embedded
//! ordering precondition (a receive before any consumer of its value, a
//! send after the last producer) is the partitioner's responsibility and is
//! not validated here; violating it deadlocks the run or reads stale data.

use serde::{Deserialize, Serialize};

use super::tensor::Tensor;
use super::{ChunkId, ProbeKey};
use crate::model::signal::SignalKey;
use crate::operator::OperatorSpec;

/// One signal as the partitioner describes it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SignalSpec {
    pub key: SignalKey,
    pub label: String,
    pub data: Tensor,
}

/// One probe as the partitioner describes it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProbeSpec {
    #[serde(rename = "probe-key")]
    pub probe_key: ProbeKey,
    #[serde(rename = "signal-key")]
    pub signal_key: SignalKey,
    pub period: u64,
}

/// Everything one chunk needs: its signals, its operator sequence in
/// execution order (send/receive operators already embedded), its probes.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChunkConfig {
    #[serde(rename = "chunk-id")]
    pub chunk_id: ChunkId,
    pub label: String,
    pub signals: Vec<SignalSpec>,
    pub operators: Vec<OperatorSpec>,
    pub probes: Vec<ProbeSpec>,
}

/// A full, validated partition of the model: the coordinator's input.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PartitionedModel {
    /// Timestep size shared by every chunk.
    pub dt: f64,
    pub chunks: Vec<ChunkConfig>,
}

impl PartitionedModel {
    pub fn num_chunks(&self) -> usize {
        self.chunks.len()
    }
}
