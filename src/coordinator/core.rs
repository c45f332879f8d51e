//! Coordinator session

use std::collections::{BTreeMap, HashMap};

use eyre::{Result, WrapErr, bail, ensure};
use tracing::{debug, info};

use super::CoordinatorConfig;
use crate::chunk::Chunk;
use crate::comm::{Body, CommGroup, ControlMessage, Rank, Tag};
use crate::model::{ChunkConfig, ChunkId, PartitionedModel, ProbeKey, Tensor};

/// Rank 0 of the group: owner of the worker fleet and of one local chunk.
///
/// Lifecycle is strictly phased: spawn, configure every chunk, then any
/// number of run/gather rounds, then [`Coordinator::finalize`]. Skipping
/// finalize leaves the workers blocked on their next receive.
pub struct Coordinator {
    comm: CommGroup,
    dt: f64,
    local_chunk: Option<Chunk>,
    /// Rank hosting each configured chunk, in chunk-id order.
    chunk_ranks: BTreeMap<ChunkId, Rank>,
    probe_counts: HashMap<ChunkId, usize>,
}

impl Coordinator {
    /// Launch `num_workers` worker processes and establish the group.
    pub async fn spawn(config: &CoordinatorConfig, num_workers: u32, dt: f64) -> Result<Self> {
        let comm = CommGroup::spawn_workers(&config.worker_exe, num_workers, Some(&config.socket_dir))
            .await
            .wrap_err("failed to establish simulation group")?;
        Ok(Self::over_group(comm, dt))
    }

    /// Wrap an already-established rank-0 endpoint. Used by in-process
    /// tests; [`Coordinator::spawn`] is the production path.
    pub fn over_group(comm: CommGroup, dt: f64) -> Self {
        Self {
            comm,
            dt,
            local_chunk: None,
            chunk_ranks: BTreeMap::new(),
            probe_counts: HashMap::new(),
        }
    }

    pub fn num_workers(&self) -> u32 {
        self.comm.num_workers()
    }

    pub fn num_chunks(&self) -> usize {
        self.chunk_ranks.len()
    }

    /// Steps completed so far, taken from the local chunk; the barrier at
    /// the end of every run keeps all chunks at the same count.
    pub fn steps_completed(&self) -> u64 {
        self.local_chunk.as_ref().map(Chunk::steps_completed).unwrap_or(0)
    }

    /// Build the coordinator's own chunk through the same apply path the
    /// workers use.
    ///
    /// Must precede every remote [`Coordinator::configure`] call: the
    /// local chunk's id is announced in each worker's `Init` so their
    /// send/receive operators route it to rank 0.
    pub fn configure_local(&mut self, config: &ChunkConfig) -> Result<()> {
        ensure!(
            self.chunk_ranks.values().all(|&rank| rank == 0),
            "local chunk must be configured before any remote chunk"
        );
        ensure!(self.local_chunk.is_none(), "local chunk already configured");
        ensure!(
            config.chunk_id >= self.comm.num_workers(),
            "local chunk id {} collides with a worker-hosted id",
            config.chunk_id
        );

        info!(chunk_id = config.chunk_id, label = %config.label, "configuring local chunk");
        let chunk = Chunk::from_config(config, self.dt, Some(config.chunk_id))?;
        self.chunk_ranks.insert(config.chunk_id, 0);
        self.probe_counts.insert(config.chunk_id, chunk.num_probes());
        self.local_chunk = Some(chunk);
        Ok(())
    }

    /// Stream one chunk's configuration to the worker that owns it, one
    /// control message per signal, operator and probe, in order.
    pub fn configure(&mut self, config: &ChunkConfig) -> Result<()> {
        let rank = config.chunk_id + 1;
        ensure!(
            rank < self.comm.world(),
            "chunk {} has no hosting worker (group has {})",
            config.chunk_id,
            self.comm.num_workers()
        );
        ensure!(
            !self.chunk_ranks.contains_key(&config.chunk_id),
            "chunk {} configured twice",
            config.chunk_id
        );

        info!(chunk_id = config.chunk_id, label = %config.label, rank, "configuring remote chunk");
        let send = |msg| self.comm.send(rank, Tag::Control, Body::Control { msg });

        send(ControlMessage::Init {
            chunk_id: config.chunk_id,
            label: config.label.clone(),
            dt: self.dt,
            coordinator_chunk: self.local_chunk.as_ref().map(Chunk::id),
        })?;
        for signal in &config.signals {
            send(ControlMessage::AddSignal {
                key: signal.key,
                label: signal.label.clone(),
                data: signal.data.clone(),
            })?;
        }
        for spec in &config.operators {
            send(ControlMessage::AddOperator { spec: spec.clone() })?;
        }
        for probe in &config.probes {
            send(ControlMessage::AddProbe {
                probe_key: probe.probe_key,
                signal_key: probe.signal_key,
                period: probe.period,
            })?;
        }

        self.chunk_ranks.insert(config.chunk_id, rank);
        self.probe_counts.insert(config.chunk_id, config.probes.len());
        Ok(())
    }

    /// Configure every chunk of a partitioned model. Chunks with a hosting
    /// worker go remote; the one leftover chunk, if any, becomes the local
    /// chunk. Requires as many workers as the model has remote chunks.
    pub fn configure_model(&mut self, model: &PartitionedModel) -> Result<()> {
        let num_workers = self.comm.num_workers() as usize;
        ensure!(
            model.chunks.len() == num_workers || model.chunks.len() == num_workers + 1,
            "model has {} chunks but the group hosts at most {}",
            model.chunks.len(),
            num_workers + 1
        );

        self.dt = model.dt;
        let (local, remote): (Vec<_>, Vec<_>) = model
            .chunks
            .iter()
            .partition(|c| c.chunk_id >= num_workers as ChunkId);
        match local.as_slice() {
            [] => {}
            [config] => self.configure_local(config)?,
            _ => bail!("more than one chunk without a hosting worker"),
        }
        for config in remote {
            self.configure(config)?;
        }
        Ok(())
    }

    /// Advance every chunk by exactly `n` steps, in lock-step. Returns
    /// once all chunks have met the end-of-run barrier.
    pub async fn run_steps(&mut self, n: u64) -> Result<()> {
        debug!(steps = n, "run phase");
        self.comm.broadcast_control(&ControlMessage::RunSteps { steps: n })?;
        if let Some(chunk) = &mut self.local_chunk {
            chunk.run_steps(n, &mut self.comm).await?;
        }
        self.comm.barrier().await?;
        Ok(())
    }

    /// Collect every probe's accumulated samples, keyed by owning chunk
    /// and probe key. Each worker sends exactly the number of probe
    /// messages recorded for it at configuration time.
    pub async fn gather_probes(&mut self) -> Result<HashMap<(ChunkId, ProbeKey), Vec<Tensor>>> {
        self.comm.broadcast_control(&ControlMessage::GatherProbes)?;

        let mut gathered = HashMap::new();
        if let Some(chunk) = &self.local_chunk {
            for (probe_key, samples) in chunk.probe_data() {
                gathered.insert((chunk.id(), probe_key), samples);
            }
        }

        for (&chunk_id, &rank) in &self.chunk_ranks {
            if rank == 0 {
                continue;
            }
            let expected = self.probe_counts.get(&chunk_id).copied().unwrap_or(0);
            for _ in 0..expected {
                match self.comm.recv(rank, Tag::Gather).await? {
                    Body::ProbeData { probe_key, samples } => {
                        gathered.insert((chunk_id, probe_key), samples);
                    }
                    other => bail!("expected ProbeData from rank {rank}, got {other:?}"),
                }
            }
        }

        self.comm.barrier().await?;
        debug!(probes = gathered.len(), "gather complete");
        Ok(gathered)
    }

    /// Orderly shutdown: stop every worker, reap the processes, release
    /// the session socket.
    pub async fn finalize(mut self) -> Result<()> {
        info!("finalizing simulation group");
        self.comm.broadcast_control(&ControlMessage::Stop)?;
        self.comm.shutdown().await.wrap_err("group teardown failed")?;
        Ok(())
    }
}
