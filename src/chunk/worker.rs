//! Worker process loop
//!
//! A worker joins the group, then serves control messages from the
//! coordinator: configuration messages build its chunk, `RunSteps` drives
//! the step loop, `GatherProbes` streams probe data back, and `Stop` ends
//! the loop. There is no other way out: a worker that never receives
//! `Stop` blocks on its next receive forever.

use eyre::{Result, eyre};
use tracing::{debug, info};

use super::Chunk;
use crate::comm::{Body, CommGroup, ControlMessage, Tag};

/// One worker process: a communication endpoint plus the chunk it hosts.
pub struct Worker {
    comm: CommGroup,
    chunk: Option<Chunk>,
}

impl Worker {
    pub fn new(comm: CommGroup) -> Self {
        Self { comm, chunk: None }
    }

    /// Serve the coordinator until `Stop`, then tear down.
    pub async fn run(mut self) -> Result<()> {
        info!(rank = self.comm.rank(), "worker ready");

        loop {
            match self.comm.recv_control().await? {
                ControlMessage::Init {
                    chunk_id,
                    label,
                    dt,
                    coordinator_chunk,
                } => {
                    info!(chunk_id, %label, dt, "chunk init");
                    self.chunk = Some(Chunk::new(chunk_id, label, dt, coordinator_chunk));
                }

                msg @ (ControlMessage::AddSignal { .. }
                | ControlMessage::AddOperator { .. }
                | ControlMessage::AddProbe { .. }) => {
                    let chunk = self.chunk.as_mut().ok_or_else(|| eyre!("configuration before Init"))?;
                    chunk.apply(&msg)?;
                }

                ControlMessage::RunSteps { steps } => {
                    let chunk = self.chunk.as_mut().ok_or_else(|| eyre!("RunSteps before Init"))?;
                    chunk.run_steps(steps, &mut self.comm).await?;
                    debug!(steps, total = chunk.steps_completed(), "steps complete");
                    self.comm.barrier().await?;
                }

                ControlMessage::GatherProbes => {
                    if let Some(chunk) = &self.chunk {
                        for (probe_key, samples) in chunk.probe_data() {
                            self.comm.send(0, Tag::Gather, Body::ProbeData { probe_key, samples })?;
                        }
                    }
                    self.comm.barrier().await?;
                }

                ControlMessage::Stop => {
                    info!(rank = self.comm.rank(), "stop received");
                    break;
                }
            }
        }

        self.comm.shutdown().await?;
        Ok(())
    }
}
