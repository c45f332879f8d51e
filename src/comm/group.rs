//! The merged communication group
//!
//! [`CommGroup`] is one process's endpoint in the group. Workers hold a
//! single link to the coordinator; the coordinator holds one link per
//! worker and relays frames addressed to other ranks, so any rank can send
//! to any rank. Per (sender, receiver, tag) triple, delivery order equals
//! send order: links are FIFO byte streams and the relay forwards frames in
//! receipt order.
//!
//! All receive operations block without timeout. A peer that never sends an
//! expected frame stalls this process indefinitely, and transitively every
//! process that later waits at a barrier with it. That failure mode is
//! inherited from the protocol on purpose; the only orderly exit is the
//! coordinator's stop/teardown sequence.

use std::collections::{HashMap, VecDeque};
use std::path::{Path, PathBuf};

use tokio::io::{AsyncBufRead, AsyncRead, AsyncWrite, AsyncWriteExt, BufReader};
use tokio::net::{UnixListener, UnixStream};
use tokio::process::{Child, Command};
use tokio::sync::mpsc;
use tracing::{debug, warn};
use uuid::Uuid;

use super::error::CommError;
use super::frame::{Body, ControlMessage, Frame, Rank, Tag, read_frame, write_frame};
use super::{ENV_RANK, ENV_SOCKET, ENV_WORLD, default_socket_dir};

/// One process's endpoint in the merged group.
///
/// Methods take `&mut self`: a chunk's step loop is strictly sequential,
/// so there is never more than one outstanding operation per endpoint.
pub struct CommGroup {
    rank: Rank,
    world: u32,
    writers: HashMap<Rank, mpsc::UnboundedSender<Frame>>,
    incoming: mpsc::UnboundedReceiver<Frame>,
    /// Frames that arrived ahead of the (src, tag) currently awaited.
    pending: HashMap<(Rank, Tag), VecDeque<Body>>,
    children: Vec<Child>,
    socket_path: Option<PathBuf>,
}

impl CommGroup {
    /// This endpoint's rank. The coordinator is rank 0.
    pub fn rank(&self) -> Rank {
        self.rank
    }

    /// Total group size, coordinator included.
    pub fn world(&self) -> u32 {
        self.world
    }

    pub fn num_workers(&self) -> u32 {
        self.world - 1
    }

    /// Coordinator side: bind a per-session socket, launch `num_workers`
    /// worker processes and handshake each into the group. Any spawn or
    /// join failure is fatal for the whole run.
    pub async fn spawn_workers(
        worker_exe: &Path,
        num_workers: u32,
        socket_dir: Option<&Path>,
    ) -> Result<Self, CommError> {
        let dir = socket_dir.map(Path::to_path_buf).unwrap_or_else(default_socket_dir);
        std::fs::create_dir_all(&dir)?;
        let socket_path = dir.join(format!("group-{}.sock", Uuid::now_v7()));
        if socket_path.exists() {
            std::fs::remove_file(&socket_path)?;
        }
        let listener = UnixListener::bind(&socket_path)?;
        let world = num_workers + 1;

        debug!(?socket_path, num_workers, "spawning workers");

        let mut children = Vec::with_capacity(num_workers as usize);
        for rank in 1..=num_workers {
            let child = Command::new(worker_exe)
                .env(ENV_SOCKET, &socket_path)
                .env(ENV_RANK, rank.to_string())
                .env(ENV_WORLD, world.to_string())
                .kill_on_drop(true)
                .spawn()
                .map_err(|e| CommError::Spawn(format!("{}: {e}", worker_exe.display())))?;
            children.push(child);
        }

        // Accept and identify every worker before wiring anything up.
        let mut links = Vec::with_capacity(num_workers as usize);
        let mut seen = vec![false; world as usize];
        for _ in 0..num_workers {
            let (stream, _) = listener.accept().await?;
            let (read_half, write_half) = stream.into_split();
            let mut reader = BufReader::new(read_half);

            let hello = read_frame(&mut reader)
                .await?
                .ok_or_else(|| CommError::Handshake("link closed before hello".to_string()))?;
            let rank = match hello.body {
                Body::Hello { rank } => rank,
                other => return Err(CommError::unexpected("Hello", &other)),
            };
            if rank == 0 || rank >= world || seen[rank as usize] {
                return Err(CommError::Handshake(format!("invalid or duplicate rank {rank}")));
            }
            seen[rank as usize] = true;
            links.push((rank, reader, write_half));
        }

        let (writers, incoming) = wire_links(0, links);

        // Release the workers into their control loops.
        for rank in 1..world {
            let frame = Frame {
                src: 0,
                dst: rank,
                tag: Tag::Control,
                body: Body::Welcome { world },
            };
            writers
                .get(&rank)
                .ok_or(CommError::NoRoute(rank))?
                .send(frame)
                .map_err(|_| CommError::ChannelClosed)?;
        }

        debug!(world, "group established");

        Ok(Self {
            rank: 0,
            world,
            writers,
            incoming,
            pending: HashMap::new(),
            children,
            socket_path: Some(socket_path),
        })
    }

    /// Worker side: connect to the coordinator using the environment the
    /// spawner set, and handshake into the group.
    pub async fn join_from_env() -> Result<Self, CommError> {
        let socket_path = std::env::var(ENV_SOCKET)
            .map_err(|_| CommError::Handshake(format!("{ENV_SOCKET} not set")))?;
        let rank: Rank = std::env::var(ENV_RANK)
            .ok()
            .and_then(|v| v.parse().ok())
            .ok_or_else(|| CommError::Handshake(format!("{ENV_RANK} missing or invalid")))?;
        let world: u32 = std::env::var(ENV_WORLD)
            .ok()
            .and_then(|v| v.parse().ok())
            .ok_or_else(|| CommError::Handshake(format!("{ENV_WORLD} missing or invalid")))?;

        let stream = UnixStream::connect(&socket_path).await?;
        let (read_half, mut write_half) = stream.into_split();
        let mut reader = BufReader::new(read_half);

        write_frame(
            &mut write_half,
            &Frame {
                src: rank,
                dst: 0,
                tag: Tag::Control,
                body: Body::Hello { rank },
            },
        )
        .await?;

        let welcome = read_frame(&mut reader)
            .await?
            .ok_or_else(|| CommError::Handshake("link closed before welcome".to_string()))?;
        match welcome.body {
            Body::Welcome { world: w } if w == world => {}
            other => return Err(CommError::unexpected("Welcome", &other)),
        }

        debug!(rank, world, "joined group");

        let (writers, incoming) = wire_links(rank, vec![(0, reader, write_half)]);
        Ok(Self {
            rank,
            world,
            writers,
            incoming,
            pending: HashMap::new(),
            children: Vec::new(),
            socket_path: None,
        })
    }

    /// Build an endpoint over already-connected byte streams. Used by the
    /// in-process [`local_group`] and by tests; no handshake is performed.
    pub fn over_streams<S>(rank: Rank, world: u32, links: Vec<(Rank, S)>) -> Self
    where
        S: AsyncRead + AsyncWrite + Send + 'static,
    {
        let links = links
            .into_iter()
            .map(|(peer, stream)| {
                let (read_half, write_half) = tokio::io::split(stream);
                (peer, BufReader::new(read_half), write_half)
            })
            .collect();
        let (writers, incoming) = wire_links(rank, links);
        Self {
            rank,
            world,
            writers,
            incoming,
            pending: HashMap::new(),
            children: Vec::new(),
            socket_path: None,
        }
    }

    /// Send one tagged message to `dst`. Workers route everything through
    /// the coordinator, which relays frames not addressed to itself.
    pub fn send(&self, dst: Rank, tag: Tag, body: Body) -> Result<(), CommError> {
        if dst == self.rank {
            return Err(CommError::NoRoute(dst));
        }
        let route = if self.rank == 0 { dst } else { 0 };
        let writer = self.writers.get(&route).ok_or(CommError::NoRoute(dst))?;
        writer
            .send(Frame {
                src: self.rank,
                dst,
                tag,
                body,
            })
            .map_err(|_| CommError::ChannelClosed)
    }

    /// Receive the next message from `src` on `tag`, in send order.
    ///
    /// Blocks with no timeout: if the peer never sends, this never returns.
    pub async fn recv(&mut self, src: Rank, tag: Tag) -> Result<Body, CommError> {
        loop {
            if let Some(queue) = self.pending.get_mut(&(src, tag))
                && let Some(body) = queue.pop_front()
            {
                return Ok(body);
            }
            let frame = self.incoming.recv().await.ok_or(CommError::ChannelClosed)?;
            self.pending
                .entry((frame.src, frame.tag))
                .or_default()
                .push_back(frame.body);
        }
    }

    /// Worker helper: next control message from the coordinator.
    pub async fn recv_control(&mut self) -> Result<ControlMessage, CommError> {
        match self.recv(0, Tag::Control).await? {
            Body::Control { msg } => Ok(msg),
            other => Err(CommError::unexpected("Control", &other)),
        }
    }

    /// Coordinator helper: send one control message to every worker.
    pub fn broadcast_control(&self, msg: &ControlMessage) -> Result<(), CommError> {
        for rank in 1..self.world {
            self.send(rank, Tag::Control, Body::Control { msg: msg.clone() })?;
        }
        Ok(())
    }

    /// Group barrier: no rank passes until every rank has arrived. Workers
    /// report to the coordinator; the coordinator releases them all.
    pub async fn barrier(&mut self) -> Result<(), CommError> {
        if self.rank == 0 {
            for rank in 1..self.world {
                match self.recv(rank, Tag::Barrier).await? {
                    Body::BarrierReached => {}
                    other => return Err(CommError::unexpected("BarrierReached", &other)),
                }
            }
            for rank in 1..self.world {
                self.send(rank, Tag::Barrier, Body::BarrierRelease)?;
            }
        } else {
            self.send(0, Tag::Barrier, Body::BarrierReached)?;
            match self.recv(0, Tag::Barrier).await? {
                Body::BarrierRelease => {}
                other => return Err(CommError::unexpected("BarrierRelease", &other)),
            }
        }
        Ok(())
    }

    /// Release the endpoint: close every link, reap spawned children and
    /// remove the session socket. Consumes the group; the session is over.
    ///
    /// On the coordinator this must only be called after `Stop` has been
    /// sent to every worker, or the children being waited on never exit.
    pub async fn shutdown(mut self) -> Result<(), CommError> {
        self.writers.clear();
        for child in &mut self.children {
            child.wait().await?;
        }
        if let Some(path) = &self.socket_path
            && path.exists()
        {
            if let Err(e) = std::fs::remove_file(path) {
                warn!(?path, error = %e, "failed to remove session socket");
            }
        }
        Ok(())
    }
}

/// Spawn reader and writer tasks for a set of links and return the writer
/// handles plus the merged incoming queue. On rank 0 the reader tasks also
/// relay frames addressed to other ranks.
fn wire_links<R, W>(
    rank: Rank,
    links: Vec<(Rank, R, W)>,
) -> (
    HashMap<Rank, mpsc::UnboundedSender<Frame>>,
    mpsc::UnboundedReceiver<Frame>,
)
where
    R: AsyncBufRead + Unpin + Send + 'static,
    W: AsyncWrite + Unpin + Send + 'static,
{
    let (incoming_tx, incoming_rx) = mpsc::unbounded_channel();
    let mut writers = HashMap::new();
    let mut readers = Vec::new();

    for (peer, read_half, write_half) in links {
        let (tx, rx) = mpsc::unbounded_channel::<Frame>();
        writers.insert(peer, tx);
        tokio::spawn(write_loop(peer, write_half, rx));
        readers.push((peer, read_half));
    }

    for (peer, read_half) in readers {
        let routes = (rank == 0).then(|| writers.clone());
        tokio::spawn(read_loop(rank, peer, read_half, incoming_tx.clone(), routes));
    }

    (writers, incoming_rx)
}

async fn write_loop<W>(peer: Rank, mut write_half: W, mut rx: mpsc::UnboundedReceiver<Frame>)
where
    W: AsyncWrite + Unpin,
{
    while let Some(frame) = rx.recv().await {
        if let Err(e) = write_frame(&mut write_half, &frame).await {
            warn!(peer, error = %e, "link write failed");
            break;
        }
    }
    let _ = write_half.shutdown().await;
}

async fn read_loop<R>(
    rank: Rank,
    peer: Rank,
    mut read_half: R,
    incoming_tx: mpsc::UnboundedSender<Frame>,
    routes: Option<HashMap<Rank, mpsc::UnboundedSender<Frame>>>,
) where
    R: AsyncBufRead + Unpin,
{
    loop {
        match read_frame(&mut read_half).await {
            Ok(Some(frame)) => {
                if frame.dst == rank {
                    if incoming_tx.send(frame).is_err() {
                        break;
                    }
                } else if let Some(routes) = &routes {
                    match routes.get(&frame.dst) {
                        Some(tx) => {
                            let _ = tx.send(frame);
                        }
                        None => warn!(dst = frame.dst, "dropping frame with no route"),
                    }
                } else {
                    warn!(dst = frame.dst, "misaddressed frame on worker link");
                }
            }
            Ok(None) => break,
            Err(e) => {
                warn!(peer, error = %e, "link read failed");
                break;
            }
        }
    }
    debug!(peer, "link closed");
}

/// Build a fully in-process group over duplex pipes: rank 0 plus
/// `num_workers` worker endpoints, returned in rank order. Routing and
/// ordering behave exactly as in the multi-process group.
pub fn local_group(num_workers: u32) -> Vec<CommGroup> {
    let world = num_workers + 1;
    let mut coordinator_links = Vec::new();
    let mut worker_groups = Vec::new();

    for rank in 1..world {
        let (near, far) = tokio::io::duplex(64 * 1024);
        coordinator_links.push((rank, near));
        worker_groups.push(CommGroup::over_streams(rank, world, vec![(0, far)]));
    }

    let mut groups = vec![CommGroup::over_streams(0, world, coordinator_links)];
    groups.extend(worker_groups);
    groups
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_point_to_point_order() {
        let mut groups = local_group(1);
        let mut worker = groups.pop().unwrap();
        let coordinator = groups.pop().unwrap();

        for steps in [1u64, 2, 3] {
            coordinator
                .send(
                    1,
                    Tag::Control,
                    Body::Control {
                        msg: ControlMessage::RunSteps { steps },
                    },
                )
                .unwrap();
        }

        for steps in [1u64, 2, 3] {
            assert_eq!(
                worker.recv_control().await.unwrap(),
                ControlMessage::RunSteps { steps }
            );
        }
    }

    #[tokio::test]
    async fn test_worker_to_worker_relay() {
        let mut groups = local_group(2);
        let mut receiver = groups.pop().unwrap();
        let sender = groups.pop().unwrap();
        let _coordinator = groups.pop().unwrap();

        sender
            .send(
                2,
                Tag::Exchange,
                Body::Signal {
                    key: 7,
                    data: crate::model::Tensor::scalar(5.0),
                },
            )
            .unwrap();

        match receiver.recv(1, Tag::Exchange).await.unwrap() {
            Body::Signal { key, data } => {
                assert_eq!(key, 7);
                assert_eq!(data.data, vec![5.0]);
            }
            other => panic!("unexpected body: {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_recv_buffers_other_tags() {
        let mut groups = local_group(1);
        let mut worker = groups.pop().unwrap();
        let coordinator = groups.pop().unwrap();

        // Exchange frame arrives first, but the control recv must not
        // consume it.
        coordinator
            .send(
                1,
                Tag::Exchange,
                Body::Signal {
                    key: 1,
                    data: crate::model::Tensor::scalar(1.0),
                },
            )
            .unwrap();
        coordinator
            .send(
                1,
                Tag::Control,
                Body::Control {
                    msg: ControlMessage::Stop,
                },
            )
            .unwrap();

        assert_eq!(worker.recv_control().await.unwrap(), ControlMessage::Stop);
        assert!(matches!(
            worker.recv(0, Tag::Exchange).await.unwrap(),
            Body::Signal { key: 1, .. }
        ));
    }

    #[tokio::test]
    async fn test_barrier_releases_all() {
        let mut groups = local_group(2);
        let mut w2 = groups.pop().unwrap();
        let mut w1 = groups.pop().unwrap();
        let mut coordinator = groups.pop().unwrap();

        let h1 = tokio::spawn(async move { w1.barrier().await });
        let h2 = tokio::spawn(async move { w2.barrier().await });
        coordinator.barrier().await.unwrap();

        h1.await.unwrap().unwrap();
        h2.await.unwrap().unwrap();
    }

    #[tokio::test]
    async fn test_send_to_self_rejected() {
        let mut groups = local_group(1);
        let _worker = groups.pop().unwrap();
        let coordinator = groups.pop().unwrap();

        let err = coordinator
            .send(0, Tag::Control, Body::BarrierReached)
            .unwrap_err();
        assert!(matches!(err, CommError::NoRoute(0)));
    }
}
