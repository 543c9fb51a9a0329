use crate::error::{OffloadError, Result};
use crate::reduce::Reducible;
use crate::types::{Rank, ReduceOp, decode, encode};
use std::time::Duration;
use tokio::sync::{Mutex, mpsc};

type Inbox = Mutex<mpsc::UnboundedReceiver<Vec<u8>>>;

/// Bootstraps a group of ranks that live in one process.
///
/// Every ordered pair of ranks gets its own channel, so messages between two
/// ranks arrive in send order and never mix with traffic from other peers.
pub struct LocalCluster;

impl LocalCluster {
    /// Create `world_size` connected communicators, indexed by rank.
    pub fn bootstrap(world_size: u32) -> Result<Vec<Communicator>> {
        Self::bootstrap_with_timeout(world_size, None)
    }

    /// Like [`bootstrap`](Self::bootstrap), bounding every collective
    /// send/recv by `timeout`.
    pub fn bootstrap_with_timeout(
        world_size: u32,
        timeout: Option<Duration>,
    ) -> Result<Vec<Communicator>> {
        if world_size == 0 {
            return Err(OffloadError::setup("world size must be at least 1"));
        }
        let n = world_size as usize;
        let mut outboxes: Vec<Vec<Option<mpsc::UnboundedSender<Vec<u8>>>>> =
            (0..n).map(|_| (0..n).map(|_| None).collect()).collect();
        let mut inboxes: Vec<Vec<Option<Inbox>>> =
            (0..n).map(|_| (0..n).map(|_| None).collect()).collect();
        for src in 0..n {
            for dst in 0..n {
                if src != dst {
                    let (tx, rx) = mpsc::unbounded_channel();
                    outboxes[src][dst] = Some(tx);
                    inboxes[dst][src] = Some(Mutex::new(rx));
                }
            }
        }
        tracing::debug!(world_size, ?timeout, "local cluster bootstrapped");
        Ok(outboxes
            .into_iter()
            .zip(inboxes)
            .enumerate()
            .map(|(rank, (outbox, inbox))| Communicator {
                rank: rank as Rank,
                world_size,
                outbox,
                inbox,
                timeout,
            })
            .collect())
    }
}

/// One rank's endpoint in a [`LocalCluster`]. Dropping it finalizes the rank:
/// peers waiting on it observe `PeerDisconnected`.
pub struct Communicator {
    rank: Rank,
    world_size: u32,
    outbox: Vec<Option<mpsc::UnboundedSender<Vec<u8>>>>,
    inbox: Vec<Option<Inbox>>,
    timeout: Option<Duration>,
}

impl Communicator {
    pub fn rank(&self) -> Rank {
        self.rank
    }

    pub fn world_size(&self) -> u32 {
        self.world_size
    }

    pub fn timeout(&self) -> Option<Duration> {
        self.timeout
    }

    fn check_peer(&self, peer: Rank) -> Result<usize> {
        if peer >= self.world_size || peer == self.rank {
            return Err(OffloadError::InvalidRank {
                rank: peer,
                world_size: self.world_size,
            });
        }
        Ok(peer as usize)
    }

    /// Send bytes to `dest`.
    pub async fn send_bytes(&self, dest: Rank, data: &[u8]) -> Result<()> {
        let idx = self.check_peer(dest)?;
        let tx = self.outbox[idx]
            .as_ref()
            .ok_or(OffloadError::PeerDisconnected { rank: dest })?;
        tx.send(data.to_vec())
            .map_err(|_| OffloadError::PeerDisconnected { rank: dest })
    }

    /// Receive the next message sent by `src`.
    pub async fn recv_bytes(&self, src: Rank) -> Result<Vec<u8>> {
        let idx = self.check_peer(src)?;
        let inbox = self.inbox[idx]
            .as_ref()
            .ok_or(OffloadError::PeerDisconnected { rank: src })?;
        inbox
            .lock()
            .await
            .recv()
            .await
            .ok_or(OffloadError::PeerDisconnected { rank: src })
    }

    /// Combine one value per rank into a single value at `root`.
    ///
    /// Every rank must call this with the same `op` and `root`. Returns
    /// `Some(total)` on the root and `None` elsewhere.
    pub async fn reduce_value<T: Reducible>(
        &self,
        value: T,
        op: ReduceOp,
        root: Rank,
    ) -> Result<Option<T>> {
        if root >= self.world_size {
            return Err(OffloadError::InvalidRank {
                rank: root,
                world_size: self.world_size,
            });
        }
        let mut buf = encode(&[value]);
        super::tree_reduce(self, &mut buf, 1, T::DTYPE, op, root).await?;
        if self.rank != root {
            return Ok(None);
        }
        let total = decode::<T>(&buf)?;
        Ok(total.first().copied())
    }
}
