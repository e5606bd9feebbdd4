//! The controller API (C10): rank 0. Owns the object store's location
//! map, the garbage collector, and the round-robin scheduler, and drives
//! every other controller-side component through the five public verbs.

use std::sync::Arc;

use meshtask_messages::ArgTree;
use meshtask_messages::BaseId;
use meshtask_messages::ExecutePayload;
use meshtask_messages::GetPayload;
use meshtask_messages::OpCode;
use meshtask_messages::OwnedId;
use meshtask_messages::PutDataPayload;
use meshtask_messages::PutOwnerPayload;
use meshtask_messages::Rank;
use meshtask_messages::TaskOutcome;
use meshtask_messages::WaitPayload;
use meshtask_messages::WaitReplyPayload;
use meshtask_messages::CONTROLLER_RANK;
use meshtask_messages::FIRST_WORKER_RANK;
use meshtask_messages::MONITOR_RANK;
use meshtask_transport::AsyncOperations;
use meshtask_transport::Transport;
use meshtask_transport::TransportError;

use crate::error::CoreError;
use crate::gc::GarbageCollector;
use crate::metrics::Metrics;
use crate::object_store::ObjectStore;
use crate::scheduler::RoundRobin;

pub struct Controller {
    transport: Transport,
    store: ObjectStore,
    gc: Arc<GarbageCollector>,
    scheduler: RoundRobin,
    async_ops: AsyncOperations,
    world_size: u32,
    metrics: Metrics,
}

impl Controller {
    pub fn new(transport: Transport, world_size: u32, cleanup_batch_threshold: usize) -> Self {
        Self {
            transport,
            store: ObjectStore::new(),
            gc: Arc::new(GarbageCollector::new(cleanup_batch_threshold)),
            scheduler: RoundRobin::new(world_size),
            async_ops: AsyncOperations::new(),
            world_size,
            metrics: Metrics::new(),
        }
    }

    /// `{ host → { "CPU": count } }`; this workspace models a single host
    /// with one CPU per worker rank.
    pub fn cluster_resources(&self) -> Vec<(String, u32)> {
        vec![("local".to_string(), self.world_size - FIRST_WORKER_RANK)]
    }

    pub fn put(&mut self, value: Vec<u8>) -> OwnedId {
        let id = self.store.generate_data_id(CONTROLLER_RANK);
        self.store.put(id, TaskOutcome::Ready(value));
        self.store.record_location(id, CONTROLLER_RANK);
        OwnedId::new(id, self.gc.clone())
    }

    pub async fn get(&mut self, id: &OwnedId) -> Result<Vec<u8>, CoreError> {
        let base = id.base();
        if let Some(outcome) = self.store.get(&base).cloned() {
            return unwrap_outcome(base, outcome);
        }

        let owner = self.store.location_of(&base).unwrap_or(base.owner_rank());
        self.transport.send(owner, OpCode::Get, &GetPayload { id: base, is_blocking: true }).await?;
        let frame = self.transport.recv().await.ok_or(TransportError::PeerGone(owner))?;
        let payload: PutDataPayload = frame.decode()?;
        self.store.put(payload.id, payload.data.clone());

        self.maybe_flush_gc().await?;
        unwrap_outcome(payload.id, payload.data)
    }

    pub async fn get_many(&mut self, ids: &[OwnedId]) -> Result<Vec<Vec<u8>>, CoreError> {
        let mut values = Vec::with_capacity(ids.len());
        for id in ids {
            values.push(self.get(id).await?);
        }
        Ok(values)
    }

    pub async fn wait(&mut self, ids: &[OwnedId], num_returns: usize) -> Result<(Vec<BaseId>, Vec<BaseId>), CoreError> {
        if num_returns > ids.len() {
            return Err(CoreError::WaitOverflow { requested: num_returns, available: ids.len() });
        }

        let mut ready = Vec::new();
        let mut not_ready = Vec::new();
        for id in ids {
            let base = id.base();
            if self.store.contains(&base) {
                ready.push(base);
            } else {
                not_ready.push(base);
            }
        }

        if ready.len() >= num_returns {
            return Ok((ready, not_ready));
        }

        let still_needed = num_returns - ready.len();
        self.transport
            .send(MONITOR_RANK, OpCode::Wait, &WaitPayload { data_ids: not_ready, num_returns: still_needed })
            .await?;
        let frame = self.transport.recv().await.ok_or(TransportError::PeerGone(MONITOR_RANK))?;
        let reply: WaitReplyPayload = frame.decode()?;

        ready.extend(reply.ready);
        Ok((ready, reply.not_ready))
    }

    pub async fn submit(
        &mut self,
        task_name: impl Into<String>,
        args: ArgTree,
        kwargs: ArgTree,
        num_returns: usize,
    ) -> Result<Vec<OwnedId>, CoreError> {
        let dest = self.scheduler.schedule_rank();
        let output_ids = self.store.generate_output_ids(dest, num_returns);
        for &id in &output_ids {
            self.store.mark_pending_output(id, dest);
            self.store.record_location(id, dest);
        }

        self.push_data(dest, &args).await?;
        self.push_data(dest, &kwargs).await?;

        let (handle, _buf) = self.transport.isend(dest, OpCode::Execute, &ExecutePayload {
            task_name: task_name.into(),
            args,
            kwargs,
            output: output_ids.clone(),
        })?;
        self.async_ops.extend([handle]);
        self.transport.send(MONITOR_RANK, OpCode::TaskSubmit, &()).await?;

        Ok(output_ids.into_iter().map(|id| OwnedId::new(id, self.gc.clone())).collect())
    }

    /// Walks `tree` and, for every id not already known to reside on
    /// `dest`, pushes either its value (`PUT_DATA`) or, when the
    /// controller doesn't hold the value itself, a `PUT_OWNER` pointer to
    /// whoever does. An id whose owner already equals `dest` needs no
    /// push — `dest` will resolve it locally once the value materializes
    /// there.
    async fn push_data(&mut self, dest: Rank, tree: &ArgTree) -> Result<(), CoreError> {
        let mut ids = Vec::new();
        tree.for_each_id(|id| ids.push(id));

        for id in ids {
            if id.owner_rank() == dest || self.store.location_of(&id) == Some(dest) {
                continue;
            }
            if let Some(outcome) = self.store.get(&id).cloned() {
                let (handle, _buf) = self.transport.isend(dest, OpCode::PutData, &PutDataPayload { id, data: outcome })?;
                self.async_ops.extend([handle]);
            } else {
                let owner = self.store.location_of(&id).unwrap_or(id.owner_rank());
                let (handle, _buf) = self.transport.isend(dest, OpCode::PutOwner, &PutOwnerPayload { id, owner })?;
                self.async_ops.extend([handle]);
            }
        }
        Ok(())
    }

    /// Flushes any deferred CLEANUP batches once the monitor reports
    /// quiescence, or once a batch has grown past its own threshold —
    /// whichever comes first.
    async fn maybe_flush_gc(&mut self) -> Result<(), CoreError> {
        if !self.gc.has_pending() {
            return Ok(());
        }

        self.transport.send(MONITOR_RANK, OpCode::GetTaskCount, &()).await?;
        let frame = self.transport.recv().await.ok_or(TransportError::PeerGone(MONITOR_RANK))?;
        let reply: meshtask_messages::GetTaskCountReplyPayload = frame.decode()?;

        let batches = if reply.count == 0 {
            self.gc.take_all_batches()
        } else {
            (FIRST_WORKER_RANK..self.world_size)
                .filter(|rank| self.gc.should_flush(*rank))
                .map(|rank| (rank, self.gc.take_batch(rank)))
                .collect()
        };

        for (rank, ids) in batches {
            if ids.is_empty() {
                continue;
            }
            self.metrics.observe_cleanup_batch_size(rank, ids.len());
            for id in &ids {
                self.store.forget(id);
            }
            self.transport.send(rank, OpCode::Cleanup, &meshtask_messages::CleanupPayload { ids }).await?;
        }
        Ok(())
    }

    /// Cancels every worker and the monitor, drains the async-ops
    /// tracker, then returns. The transport itself is torn down by
    /// dropping the `Controller`.
    pub async fn shutdown(&mut self) -> Result<(), CoreError> {
        self.transport.send(MONITOR_RANK, OpCode::Cancel, &()).await?;
        for rank in FIRST_WORKER_RANK..self.world_size {
            self.transport.send(rank, OpCode::Cancel, &()).await?;
        }
        self.async_ops.finish().await;
        Ok(())
    }
}

fn unwrap_outcome(id: BaseId, outcome: TaskOutcome) -> Result<Vec<u8>, CoreError> {
    match outcome {
        TaskOutcome::Ready(bytes) => Ok(bytes),
        TaskOutcome::Failed(message) => Err(CoreError::UserTaskFailure { id, message }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use meshtask_transport::build_cluster;

    #[tokio::test]
    async fn put_then_get_round_trips_without_a_wire_round_trip() {
        let mut ranks = build_cluster(3, 8);
        let r0 = ranks.remove(0);
        let mut controller = Controller::new(r0, 3, 100);

        let id = controller.put(bincode::serialize(&7i64).unwrap());
        let bytes = controller.get(&id).await.unwrap();
        assert_eq!(bincode::deserialize::<i64>(&bytes).unwrap(), 7);
    }

    #[tokio::test]
    async fn wait_on_already_ready_id_skips_the_monitor() {
        let mut ranks = build_cluster(3, 8);
        let r0 = ranks.remove(0);
        let r1 = ranks.remove(0);
        let mut controller = Controller::new(r0, 3, 100);

        let id = controller.put(vec![1, 2, 3]);
        let (ready, not_ready) = controller.wait(std::slice::from_ref(&id), 1).await.unwrap();
        assert_eq!(ready, vec![id.base()]);
        assert!(not_ready.is_empty());

        drop(r1);
    }

    #[tokio::test]
    async fn wait_overflow_is_an_error() {
        let mut ranks = build_cluster(3, 8);
        let r0 = ranks.remove(0);
        let mut controller = Controller::new(r0, 3, 100);

        let id = controller.put(vec![1]);
        let err = controller.wait(std::slice::from_ref(&id), 2).await.unwrap_err();
        assert!(matches!(err, CoreError::WaitOverflow { .. }));
    }

    #[tokio::test]
    async fn resubmitting_to_the_same_destination_pushes_nothing() {
        let mut ranks = build_cluster(3, 8);
        let r0 = ranks.remove(0);
        let mut r2 = ranks.remove(1);
        let mut controller = Controller::new(r0, 3, 100);

        let output = controller
            .submit("noop", ArgTree::List(vec![]), ArgTree::Map(vec![]), 1)
            .await
            .unwrap();
        let execute_frame = r2.recv().await.unwrap();
        assert_eq!(execute_frame.op, OpCode::Execute);

        let arg = ArgTree::Id(output[0].base());
        controller.submit("noop2", ArgTree::List(vec![arg]), ArgTree::Map(vec![]), 1).await.unwrap();

        let next = r2.recv().await.unwrap();
        assert_eq!(next.op, OpCode::Execute, "same-destination id push produces no PUT_DATA/PUT_OWNER frame first");
    }
}
