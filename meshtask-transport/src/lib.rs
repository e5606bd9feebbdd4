//! The message-passing substrate: typed send/recv of small ops plus the
//! non-blocking complex-send path, built on a full mesh of per-destination
//! `tokio::sync::mpsc` channels. Each channel is single-producer from the
//! point of view of a given sending rank, so sends from one peer to another
//! are delivered in the order they were issued — the only ordering
//! guarantee the core relies on. No ordering is assumed, or provided,
//! across distinct peer pairs.

mod async_ops;

use std::collections::HashMap;

pub use async_ops::AsyncOperations;
use meshtask_messages::OpCode;
use meshtask_messages::Rank;
use serde::de::DeserializeOwned;
use serde::Serialize;
use thiserror::Error;
use tokio::sync::mpsc;

#[derive(Debug, Error)]
pub enum TransportError {
    #[error("peer rank {0} is unknown to this transport")]
    UnknownPeer(Rank),
    #[error("peer rank {0} has disconnected")]
    PeerGone(Rank),
    #[error("channel to rank {0} is at capacity")]
    ChannelFull(Rank),
    #[error("failed to encode payload: {0}")]
    Encode(#[from] bincode::Error),
}

/// A message in flight: the sender's rank, the operation it carries, and a
/// bincode-encoded payload whose shape is determined by `op`.
#[derive(Debug, Clone)]
pub struct Frame {
    pub from: Rank,
    pub op: OpCode,
    pub payload: Vec<u8>,
}

impl Frame {
    pub fn decode<T: DeserializeOwned>(&self) -> Result<T, TransportError> {
        Ok(bincode::deserialize(&self.payload)?)
    }
}

/// One rank's end of the cluster-wide channel mesh.
pub struct Transport {
    rank: Rank,
    world_size: u32,
    inbox: mpsc::Receiver<Frame>,
    outboxes: HashMap<Rank, mpsc::Sender<Frame>>,
}

/// Builds a full mesh connecting `world_size` ranks. Every rank gets a
/// single inbound channel (all peers hold a cloned `Sender` into it) and a
/// map of outbound senders, one per peer.
pub fn build_cluster(world_size: u32, capacity: usize) -> Vec<Transport> {
    let mut senders = HashMap::with_capacity(world_size as usize);
    let mut receivers = HashMap::with_capacity(world_size as usize);
    for rank in 0..world_size {
        let (tx, rx) = mpsc::channel(capacity);
        senders.insert(rank, tx);
        receivers.insert(rank, rx);
    }

    (0..world_size)
        .map(|rank| {
            let outboxes = senders
                .iter()
                .filter(|(peer, _)| **peer != rank)
                .map(|(peer, tx)| (*peer, tx.clone()))
                .collect();
            Transport {
                rank,
                world_size,
                inbox: receivers.remove(&rank).expect("receiver present for every rank"),
                outboxes,
            }
        })
        .collect()
}

impl Transport {
    pub fn rank(&self) -> Rank {
        self.rank
    }

    pub fn world_size(&self) -> u32 {
        self.world_size
    }

    fn outbox(&self, dst: Rank) -> Result<mpsc::Sender<Frame>, TransportError> {
        self.outboxes
            .get(&dst)
            .cloned()
            .ok_or(TransportError::UnknownPeer(dst))
    }

    /// Blocking send of a small tagged message: serialized in one shot and
    /// awaited to completion. Used for the control plane — CANCEL, WAIT
    /// replies, small synchronous GETs, TASK_DONE.
    pub async fn send<T: Serialize>(
        &self,
        dst: Rank,
        op: OpCode,
        payload: &T,
    ) -> Result<(), TransportError> {
        let frame = Frame {
            from: self.rank,
            op,
            payload: bincode::serialize(payload)?,
        };
        tracing::trace!(from = self.rank, to = dst, ?op, "send");
        self.outbox(dst)?
            .send(frame)
            .await
            .map_err(|_| TransportError::PeerGone(dst))
    }

    /// Non-blocking complex send: enqueues the frame without awaiting, so
    /// the caller never suspends on channel capacity. Enqueuing happens
    /// synchronously at the call site rather than in a spawned task —
    /// spawning one task per `isend` would let the runtime reorder
    /// concurrent sends to the same destination, breaking the one
    /// ordering guarantee (per-pair FIFO) everything above this layer
    /// relies on. The returned handle and buffer are for
    /// `AsyncOperations` to hold, preserving the anti-use-after-free
    /// contract even though completion here is immediate.
    pub fn isend<T: Serialize>(
        &self,
        dst: Rank,
        op: OpCode,
        payload: &T,
    ) -> Result<(async_ops::SendHandle, Vec<u8>), TransportError> {
        let bytes = bincode::serialize(payload)?;
        self.isend_raw(dst, op, bytes)
    }

    /// Same as `isend`, but for a payload already serialized — lets a
    /// caller reuse a cached encoding across several destinations instead
    /// of re-running bincode for each one.
    pub fn isend_raw(
        &self,
        dst: Rank,
        op: OpCode,
        bytes: Vec<u8>,
    ) -> Result<(async_ops::SendHandle, Vec<u8>), TransportError> {
        let frame = Frame {
            from: self.rank,
            op,
            payload: bytes.clone(),
        };
        let outbox = self.outbox(dst)?;
        match outbox.try_send(frame) {
            Ok(()) => Ok((async_ops::SendHandle::done(), bytes)),
            Err(mpsc::error::TrySendError::Full(_)) => Err(TransportError::ChannelFull(dst)),
            Err(mpsc::error::TrySendError::Closed(_)) => Err(TransportError::PeerGone(dst)),
        }
    }

    /// Polls the transport for the next incoming frame from any peer,
    /// suspending the caller until one arrives or every peer has hung up.
    pub async fn recv(&mut self) -> Option<Frame> {
        self.inbox.recv().await
    }

    /// Non-blocking poll; used by the worker loop's step-once dispatcher.
    pub fn try_recv(&mut self) -> Option<Frame> {
        self.inbox.try_recv().ok()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use meshtask_messages::GetPayload;

    #[tokio::test]
    async fn send_then_recv_round_trips() {
        let mut ranks = build_cluster(3, 8);
        let mut r2 = ranks.remove(2);
        let r0 = ranks.remove(0);

        r0.send(
            2,
            OpCode::Get,
            &GetPayload {
                id: meshtask_messages::BaseId::new(2, 1),
                is_blocking: true,
            },
        )
        .await
        .unwrap();

        let frame = r2.recv().await.unwrap();
        assert_eq!(frame.from, 0);
        assert_eq!(frame.op, OpCode::Get);
        let decoded: GetPayload = frame.decode().unwrap();
        assert!(decoded.is_blocking);
    }

    #[tokio::test]
    async fn per_pair_messages_are_fifo() {
        let mut ranks = build_cluster(2, 8);
        let mut r1 = ranks.remove(1);
        let r0 = ranks.remove(0);

        for i in 0..5u64 {
            r0.send(1, OpCode::TaskDone, &meshtask_messages::TaskDonePayload {
                id: Some(meshtask_messages::BaseId::new(0, i)),
            })
            .await
            .unwrap();
        }

        for i in 0..5u64 {
            let frame = r1.recv().await.unwrap();
            let decoded: meshtask_messages::TaskDonePayload = frame.decode().unwrap();
            assert_eq!(decoded.id.unwrap().counter(), i);
        }
    }

    #[tokio::test]
    async fn isend_buffer_is_reclaimed_after_finish() {
        let mut ranks = build_cluster(2, 8);
        let mut r1 = ranks.remove(1);
        let r0 = ranks.remove(0);

        let mut tracker = AsyncOperations::new();
        let (handle, buf) = r0
            .isend(1, OpCode::Cancel, &())
            .unwrap();
        assert!(!buf.is_empty() || buf.is_empty());
        tracker.extend(vec![handle]);
        tracker.finish().await;
        assert!(tracker.is_empty());

        let frame = r1.recv().await.unwrap();
        assert_eq!(frame.op, OpCode::Cancel);
    }
}
