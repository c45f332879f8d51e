//! Chunks: the unit of distributed execution
//!
//! A chunk owns one partition of the graph: a signal arena, an ordered
//! operator sequence and a set of probes. Each chunk is executed by exactly
//! one process. [`Chunk::step`] runs one full pass over the operator
//! sequence in its fixed, externally-supplied total order; the embedded
//! send/receive operators perform their blocking exchange with the matching
//! peer at their exact position in the sequence, which is the system's sole
//! cross-chunk consistency mechanism.

mod core;
pub mod worker;

pub use self::core::Chunk;
pub use worker::Worker;

use thiserror::Error;

use crate::model::signal::SignalKey;

/// Errors raised while building or driving a chunk.
#[derive(Debug, Error)]
pub enum ChunkError {
    #[error("Unknown signal key {0}")]
    UnknownSignal(SignalKey),

    #[error("Configuration message received before Init")]
    NotConfigured,

    #[error("Communication failure: {0}")]
    Comm(#[from] crate::comm::CommError),
}
