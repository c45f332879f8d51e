//! Operators: the per-timestep computation units of a chunk
//!
//! An operator is one step-function over the signals of its owning chunk.
//! On the wire and in model files operators travel as [`OperatorSpec`] (a
//! serde-tagged description keyed by model signal keys). At configuration
//! time a spec is resolved against the chunk's signal store into an
//! [`Operator`], which holds arena slot indices and any private state. The
//! operator set is a closed enum dispatched by a single `match` in the step
//! loop; there is no dynamic dispatch anywhere in the hot path.

pub mod lif;

use serde::{Deserialize, Serialize};

use crate::chunk::ChunkError;
use crate::model::signal::{SignalKey, SignalStore, SlotIndex};
use crate::model::ChunkId;

pub use lif::{LifParams, LifState, lif_rate_step};

/// Wire/model description of an operator, sufficient for a worker to
/// reconstruct the operator instance against its own signal store.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum OperatorSpec {
    /// dst <- value, every element.
    Reset { dst: SignalKey, value: f64 },

    /// dst <- src.
    Copy { dst: SignalKey, src: SignalKey },

    /// y += a . x
    DotInc {
        a: SignalKey,
        x: SignalKey,
        y: SignalKey,
    },

    /// y <- a . x + b (*) y
    ProdUpdate {
        a: SignalKey,
        x: SignalKey,
        b: SignalKey,
        y: SignalKey,
    },

    /// Spiking LIF population: advances private per-neuron state from
    /// input current `j` and writes spike output.
    SimLif {
        params: LifParams,
        j: SignalKey,
        output: SignalKey,
    },

    /// Rate-mode LIF population, stateless.
    SimLifRate {
        params: LifParams,
        j: SignalKey,
        output: SignalKey,
    },

    /// Transmit the current value of `signal` to `peer` at this position
    /// in the sequence, every step, unconditionally.
    Send { peer: ChunkId, signal: SignalKey },

    /// Block until this step's value of `signal` arrives from `peer`,
    /// then overwrite the local signal with it.
    Recv { peer: ChunkId, signal: SignalKey },
}

/// A resolved operator, ready to execute. Slot indices point into the
/// owning chunk's arena; the LIF variants own their internal state.
#[derive(Debug, Clone)]
pub enum Operator {
    Reset {
        dst: SlotIndex,
        value: f64,
    },
    Copy {
        dst: SlotIndex,
        src: SlotIndex,
    },
    DotInc {
        a: SlotIndex,
        x: SlotIndex,
        y: SlotIndex,
    },
    ProdUpdate {
        a: SlotIndex,
        x: SlotIndex,
        b: SlotIndex,
        y: SlotIndex,
    },
    SimLif {
        j: SlotIndex,
        output: SlotIndex,
        state: LifState,
    },
    SimLifRate {
        j: SlotIndex,
        output: SlotIndex,
        params: LifParams,
    },
    SendValue {
        peer: ChunkId,
        signal: SlotIndex,
    },
    RecvValue {
        peer: ChunkId,
        signal: SlotIndex,
    },
}

fn resolve(store: &SignalStore, key: SignalKey) -> Result<SlotIndex, ChunkError> {
    store.resolve(key).ok_or(ChunkError::UnknownSignal(key))
}

impl Operator {
    /// Resolve a wire description against the chunk's signal store.
    pub fn build(spec: &OperatorSpec, store: &SignalStore) -> Result<Self, ChunkError> {
        Ok(match *spec {
            OperatorSpec::Reset { dst, value } => Operator::Reset {
                dst: resolve(store, dst)?,
                value,
            },
            OperatorSpec::Copy { dst, src } => Operator::Copy {
                dst: resolve(store, dst)?,
                src: resolve(store, src)?,
            },
            OperatorSpec::DotInc { a, x, y } => Operator::DotInc {
                a: resolve(store, a)?,
                x: resolve(store, x)?,
                y: resolve(store, y)?,
            },
            OperatorSpec::ProdUpdate { a, x, b, y } => Operator::ProdUpdate {
                a: resolve(store, a)?,
                x: resolve(store, x)?,
                b: resolve(store, b)?,
                y: resolve(store, y)?,
            },
            OperatorSpec::SimLif { params, j, output } => Operator::SimLif {
                j: resolve(store, j)?,
                output: resolve(store, output)?,
                state: LifState::new(params),
            },
            OperatorSpec::SimLifRate { params, j, output } => Operator::SimLifRate {
                j: resolve(store, j)?,
                output: resolve(store, output)?,
                params,
            },
            OperatorSpec::Send { peer, signal } => Operator::SendValue {
                peer,
                signal: resolve(store, signal)?,
            },
            OperatorSpec::Recv { peer, signal } => Operator::RecvValue {
                peer,
                signal: resolve(store, signal)?,
            },
        })
    }

    /// Map the resolved operator back to its wire description.
    pub fn describe(&self, store: &SignalStore) -> OperatorSpec {
        match *self {
            Operator::Reset { dst, value } => OperatorSpec::Reset {
                dst: store.key_of(dst),
                value,
            },
            Operator::Copy { dst, src } => OperatorSpec::Copy {
                dst: store.key_of(dst),
                src: store.key_of(src),
            },
            Operator::DotInc { a, x, y } => OperatorSpec::DotInc {
                a: store.key_of(a),
                x: store.key_of(x),
                y: store.key_of(y),
            },
            Operator::ProdUpdate { a, x, b, y } => OperatorSpec::ProdUpdate {
                a: store.key_of(a),
                x: store.key_of(x),
                b: store.key_of(b),
                y: store.key_of(y),
            },
            Operator::SimLif {
                j,
                output,
                ref state,
            } => OperatorSpec::SimLif {
                params: state.params,
                j: store.key_of(j),
                output: store.key_of(output),
            },
            Operator::SimLifRate { j, output, params } => OperatorSpec::SimLifRate {
                params,
                j: store.key_of(j),
                output: store.key_of(output),
            },
            Operator::SendValue { peer, signal } => OperatorSpec::Send {
                peer,
                signal: store.key_of(signal),
            },
            Operator::RecvValue { peer, signal } => OperatorSpec::Recv {
                peer,
                signal: store.key_of(signal),
            },
        }
    }

    /// True for the send/receive synchronization variants, which the step
    /// loop executes through the communication group instead of here.
    pub fn is_sync(&self) -> bool {
        matches!(self, Operator::SendValue { .. } | Operator::RecvValue { .. })
    }

    /// Peer chunk addressed by a synchronization operator.
    pub fn sync_peer(&self) -> Option<ChunkId> {
        match *self {
            Operator::SendValue { peer, .. } | Operator::RecvValue { peer, .. } => Some(peer),
            _ => None,
        }
    }

    /// Execute one numeric update against the store. The synchronization
    /// variants are handled by the step loop and never reach this point.
    pub fn apply(&mut self, store: &SignalStore, dt: f64) {
        match *self {
            Operator::Reset { dst, value } => {
                store.write(dst).fill(value);
            }
            Operator::Copy { dst, src } => {
                let src = store.read(src);
                store.write(dst).copy_from(&src);
            }
            Operator::DotInc { a, x, y } => {
                let a = store.read(a);
                let x = store.read(x);
                a.dot_inc(&x, &mut store.write(y));
            }
            Operator::ProdUpdate { a, x, b, y } => {
                let a = store.read(a);
                let x = store.read(x);
                let b = store.read(b);
                let mut y = store.write(y);
                if b.len() == 1 {
                    for yi in y.data.iter_mut() {
                        *yi *= b.data[0];
                    }
                } else {
                    for (yi, bi) in y.data.iter_mut().zip(b.data.iter()) {
                        *yi *= bi;
                    }
                }
                a.dot_inc(&x, &mut y);
            }
            Operator::SimLif {
                j,
                output,
                ref mut state,
            } => {
                let j = store.read(j);
                let mut out = store.write(output);
                state.step(dt, &j.data, &mut out.data);
            }
            Operator::SimLifRate { j, output, ref params } => {
                let j = store.read(j);
                let mut out = store.write(output);
                lif_rate_step(params, dt, &j.data, &mut out.data);
            }
            Operator::SendValue { .. } | Operator::RecvValue { .. } => {
                unreachable!("sync operators execute through the comm group")
            }
        }
    }
}
