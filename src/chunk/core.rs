//! Chunk state and step loop

use std::collections::{BTreeMap, HashMap};

use tracing::{debug, trace};

use super::ChunkError;
use crate::comm::{Body, CommError, CommGroup, ControlMessage, Rank, Tag};
use crate::model::signal::{SignalKey, SignalStore};
use crate::model::{ChunkConfig, ChunkId, ProbeKey, ProbeSpec, SignalSpec, Tensor};
use crate::operator::{Operator, OperatorSpec};
use crate::probe::Probe;

/// One partition of the graph, owned and stepped by a single process.
///
/// Built incrementally during the configuration phase; never resized once
/// the run phase starts.
pub struct Chunk {
    id: ChunkId,
    label: String,
    dt: f64,
    signals: SignalStore,
    operators: Vec<Operator>,
    /// Probes keyed by probe key; iteration order is key order, which
    /// makes probe recording and gathering deterministic.
    probes: BTreeMap<ProbeKey, Probe>,
    /// Peer chunk id -> indices of the send/receive operators addressing
    /// that peer.
    peers: HashMap<ChunkId, Vec<usize>>,
    /// Chunk hosted on the coordinator process, if any; its id maps to
    /// rank 0 instead of the id+1 rule.
    coordinator_chunk: Option<ChunkId>,
    steps_completed: u64,
}

impl Chunk {
    pub fn new(id: ChunkId, label: impl Into<String>, dt: f64, coordinator_chunk: Option<ChunkId>) -> Self {
        Self {
            id,
            label: label.into(),
            dt,
            signals: SignalStore::new(),
            operators: Vec::new(),
            probes: BTreeMap::new(),
            peers: HashMap::new(),
            coordinator_chunk,
            steps_completed: 0,
        }
    }

    /// Build a chunk directly from a partitioner handoff. This is the same
    /// apply path the worker takes message by message.
    pub fn from_config(
        config: &ChunkConfig,
        dt: f64,
        coordinator_chunk: Option<ChunkId>,
    ) -> Result<Self, ChunkError> {
        let mut chunk = Self::new(config.chunk_id, config.label.clone(), dt, coordinator_chunk);
        for signal in &config.signals {
            chunk.add_signal(signal.key, &signal.label, signal.data.clone());
        }
        for spec in &config.operators {
            chunk.add_operator(spec)?;
        }
        for probe in &config.probes {
            chunk.add_probe(probe.probe_key, probe.signal_key, probe.period)?;
        }
        Ok(chunk)
    }

    pub fn id(&self) -> ChunkId {
        self.id
    }

    pub fn label(&self) -> &str {
        &self.label
    }

    pub fn dt(&self) -> f64 {
        self.dt
    }

    pub fn steps_completed(&self) -> u64 {
        self.steps_completed
    }

    pub fn num_probes(&self) -> usize {
        self.probes.len()
    }

    /// Peer chunks this chunk exchanges signals with, and the operator
    /// positions addressing each.
    pub fn peer_links(&self) -> &HashMap<ChunkId, Vec<usize>> {
        &self.peers
    }

    pub fn add_signal(&mut self, key: SignalKey, label: &str, data: Tensor) {
        trace!(chunk = self.id, key, label, "add signal");
        self.signals.add(key, label, data);
    }

    pub fn add_operator(&mut self, spec: &OperatorSpec) -> Result<(), ChunkError> {
        trace!(chunk = self.id, ?spec, "add operator");
        let op = Operator::build(spec, &self.signals)?;
        if let Some(peer) = op.sync_peer() {
            self.peers.entry(peer).or_default().push(self.operators.len());
        }
        self.operators.push(op);
        Ok(())
    }

    pub fn add_probe(&mut self, probe_key: ProbeKey, signal_key: SignalKey, period: u64) -> Result<(), ChunkError> {
        trace!(chunk = self.id, probe_key, signal_key, period, "add probe");
        let slot = self
            .signals
            .resolve(signal_key)
            .ok_or(ChunkError::UnknownSignal(signal_key))?;
        self.probes.insert(probe_key, Probe::new(probe_key, slot, period));
        Ok(())
    }

    /// Apply one configuration message. Worker processes and the
    /// coordinator's local chunk share this path, so a configuration
    /// streamed over the control channel reconstructs the exact chunk a
    /// direct build produces.
    pub fn apply(&mut self, msg: &ControlMessage) -> Result<(), ChunkError> {
        match msg {
            ControlMessage::AddSignal { key, label, data } => {
                self.add_signal(*key, label, data.clone());
                Ok(())
            }
            ControlMessage::AddOperator { spec } => self.add_operator(spec),
            ControlMessage::AddProbe {
                probe_key,
                signal_key,
                period,
            } => self.add_probe(*probe_key, *signal_key, *period),
            // Init/RunSteps/GatherProbes/Stop are phases of the worker
            // loop, not chunk configuration.
            other => Err(ChunkError::Comm(CommError::unexpected("configuration message", other))),
        }
    }

    /// Group rank hosting the given peer chunk.
    fn peer_rank(coordinator_chunk: Option<ChunkId>, peer: ChunkId) -> Rank {
        if coordinator_chunk == Some(peer) { 0 } else { peer + 1 }
    }

    /// Execute one timestep: every operator once, in fixed order, strictly
    /// sequentially; then record probes against the completed-step count.
    pub async fn step(&mut self, comm: &mut CommGroup) -> Result<(), CommError> {
        let coordinator_chunk = self.coordinator_chunk;
        for op in self.operators.iter_mut() {
            match op {
                Operator::SendValue { peer, signal } => {
                    let key = self.signals.key_of(*signal);
                    let data = self.signals.snapshot(*signal);
                    comm.send(
                        Self::peer_rank(coordinator_chunk, *peer),
                        Tag::Exchange,
                        Body::Signal { key, data },
                    )?;
                }
                Operator::RecvValue { peer, signal } => {
                    let expected = self.signals.key_of(*signal);
                    let rank = Self::peer_rank(coordinator_chunk, *peer);
                    match comm.recv(rank, Tag::Exchange).await? {
                        Body::Signal { key, data } if key == expected => {
                            self.signals.write(*signal).copy_from(&data);
                        }
                        other => return Err(CommError::unexpected("Signal with matching key", &other)),
                    }
                }
                numeric => numeric.apply(&self.signals, self.dt),
            }
        }

        self.steps_completed += 1;
        for probe in self.probes.values_mut() {
            probe.record(self.steps_completed, &self.signals);
        }
        Ok(())
    }

    /// Execute `n` sequential steps.
    pub async fn run_steps(&mut self, n: u64, comm: &mut CommGroup) -> Result<(), CommError> {
        debug!(chunk = self.id, steps = n, "running steps");
        for _ in 0..n {
            self.step(comm).await?;
        }
        Ok(())
    }

    /// Every probe's accumulated samples, in ascending probe-key order.
    pub fn probe_data(&self) -> Vec<(ProbeKey, Vec<Tensor>)> {
        self.probes
            .values()
            .map(|p| (p.key(), p.data().to_vec()))
            .collect()
    }

    /// Reconstruct the partitioner-level description of this chunk:
    /// signals in arena order, operators in execution order, probes in key
    /// order.
    pub fn describe(&self) -> ChunkConfig {
        let signals = (0..self.signals.len())
            .map(|slot| SignalSpec {
                key: self.signals.key_of(slot),
                label: self.signals.label_of(slot).to_string(),
                data: self.signals.snapshot(slot),
            })
            .collect();
        let operators = self.operators.iter().map(|op| op.describe(&self.signals)).collect();
        let probes = self
            .probes
            .values()
            .map(|p| ProbeSpec {
                probe_key: p.key(),
                signal_key: self.signals.key_of(p.slot()),
                period: p.period(),
            })
            .collect();
        ChunkConfig {
            chunk_id: self.id,
            label: self.label.clone(),
            signals,
            operators,
            probes,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::comm::group::local_group;

    fn single_chunk_config() -> ChunkConfig {
        ChunkConfig {
            chunk_id: 0,
            label: "Chunk 0".to_string(),
            signals: vec![
                SignalSpec {
                    key: 1,
                    label: "a".to_string(),
                    data: Tensor::vector(vec![0.0, 0.0]),
                },
                SignalSpec {
                    key: 2,
                    label: "b".to_string(),
                    data: Tensor::vector(vec![0.0, 0.0]),
                },
            ],
            operators: vec![
                OperatorSpec::Reset { dst: 1, value: 3.0 },
                OperatorSpec::Copy { dst: 2, src: 1 },
            ],
            probes: vec![ProbeSpec {
                probe_key: 10,
                signal_key: 2,
                period: 2,
            }],
        }
    }

    #[tokio::test]
    async fn test_local_step_and_probe_count() {
        let mut groups = local_group(1);
        let _worker = groups.pop().unwrap();
        let mut comm = groups.pop().unwrap();

        let mut chunk = Chunk::from_config(&single_chunk_config(), 0.001, None).unwrap();
        chunk.run_steps(5, &mut comm).await.unwrap();

        assert_eq!(chunk.steps_completed(), 5);
        let data = chunk.probe_data();
        assert_eq!(data.len(), 1);
        let (key, samples) = &data[0];
        assert_eq!(*key, 10);
        // floor(5 / 2) samples, all equal to the copied reset value.
        assert_eq!(samples.len(), 2);
        for sample in samples {
            assert_eq!(sample.data, vec![3.0, 3.0]);
        }
    }

    #[tokio::test]
    async fn test_determinism_across_runs() {
        let mut groups = local_group(1);
        let _worker = groups.pop().unwrap();
        let mut comm = groups.pop().unwrap();

        let mut outputs = Vec::new();
        for _ in 0..2 {
            let mut chunk = Chunk::from_config(&single_chunk_config(), 0.001, None).unwrap();
            chunk.run_steps(7, &mut comm).await.unwrap();
            outputs.push(chunk.probe_data());
        }
        assert_eq!(outputs[0], outputs[1]);
    }

    #[test]
    fn test_describe_roundtrip() {
        let config = single_chunk_config();
        let chunk = Chunk::from_config(&config, 0.001, None).unwrap();
        assert_eq!(chunk.describe(), config);
    }

    #[test]
    fn test_apply_matches_direct_build() {
        let config = single_chunk_config();
        let direct = Chunk::from_config(&config, 0.001, None).unwrap();

        let mut streamed = Chunk::new(config.chunk_id, config.label.clone(), 0.001, None);
        for signal in &config.signals {
            streamed
                .apply(&ControlMessage::AddSignal {
                    key: signal.key,
                    label: signal.label.clone(),
                    data: signal.data.clone(),
                })
                .unwrap();
        }
        for spec in &config.operators {
            streamed
                .apply(&ControlMessage::AddOperator { spec: spec.clone() })
                .unwrap();
        }
        for probe in &config.probes {
            streamed
                .apply(&ControlMessage::AddProbe {
                    probe_key: probe.probe_key,
                    signal_key: probe.signal_key,
                    period: probe.period,
                })
                .unwrap();
        }

        assert_eq!(streamed.describe(), direct.describe());
    }

    #[test]
    fn test_peer_links_recorded() {
        let mut chunk = Chunk::new(0, "c", 0.001, None);
        chunk.add_signal(1, "s", Tensor::scalar(0.0));
        chunk.add_operator(&OperatorSpec::Reset { dst: 1, value: 1.0 }).unwrap();
        chunk.add_operator(&OperatorSpec::Send { peer: 3, signal: 1 }).unwrap();
        chunk.add_operator(&OperatorSpec::Recv { peer: 3, signal: 1 }).unwrap();

        assert_eq!(chunk.peer_links().get(&3), Some(&vec![1, 2]));
    }

    #[test]
    fn test_probe_on_unknown_signal_rejected() {
        let mut chunk = Chunk::new(0, "c", 0.001, None);
        let err = chunk.add_probe(1, 99, 1).unwrap_err();
        assert!(matches!(err, ChunkError::UnknownSignal(99)));
    }

    #[tokio::test]
    async fn test_cross_chunk_value_transfer() {
        // Chunk 0 (rank 1): Reset(x, 5.0) then Send(peer 1, x).
        // Chunk 1 (rank 2): Recv(peer 0, y) then Copy(z, y).
        let mut groups = local_group(2);
        let mut comm_b = groups.pop().unwrap();
        let mut comm_a = groups.pop().unwrap();
        let _coordinator = groups.pop().unwrap();

        let mut chunk_a = Chunk::new(0, "A", 0.001, None);
        chunk_a.add_signal(1, "x", Tensor::scalar(0.0));
        chunk_a.add_operator(&OperatorSpec::Reset { dst: 1, value: 5.0 }).unwrap();
        chunk_a.add_operator(&OperatorSpec::Send { peer: 1, signal: 1 }).unwrap();

        let mut chunk_b = Chunk::new(1, "B", 0.001, None);
        chunk_b.add_signal(1, "y", Tensor::scalar(0.0));
        chunk_b.add_signal(2, "z", Tensor::scalar(0.0));
        chunk_b.add_operator(&OperatorSpec::Recv { peer: 0, signal: 1 }).unwrap();
        chunk_b.add_operator(&OperatorSpec::Copy { dst: 2, src: 1 }).unwrap();

        let a = tokio::spawn(async move {
            chunk_a.step(&mut comm_a).await.unwrap();
            chunk_a
        });
        chunk_b.step(&mut comm_b).await.unwrap();
        a.await.unwrap();

        assert_eq!(chunk_b.describe().signals[1].data.data, vec![5.0]);
    }
}
