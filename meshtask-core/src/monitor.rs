//! The monitor loop (C7): rank 1, sole owner of the global task counter
//! and the arbiter of `wait()`. Serves one controller request at a time,
//! interleaved with TASK_DONE/readiness traffic from workers — there is
//! never more than one WAIT outstanding, since the controller blocks on
//! its own WAIT reply before issuing another.

use std::collections::HashMap;
use std::collections::HashSet;

use meshtask_messages::BaseId;
use meshtask_messages::GetTaskCountReplyPayload;
use meshtask_messages::OpCode;
use meshtask_messages::Rank;
use meshtask_messages::TaskDonePayload;
use meshtask_messages::WaitAckPayload;
use meshtask_messages::WaitPayload;
use meshtask_messages::WaitReplyPayload;
use meshtask_messages::CONTROLLER_RANK;
use meshtask_transport::Frame;
use meshtask_transport::Transport;

use crate::error::CoreError;
use crate::metrics::Metrics;

struct PendingWait {
    requester: Rank,
    num_returns: usize,
    remaining: HashSet<BaseId>,
    ready: Vec<BaseId>,
}

pub struct Monitor {
    transport: Transport,
    task_counter: i64,
    pending_wait: Option<PendingWait>,
    running: bool,
    metrics: Metrics,
}

impl Monitor {
    pub fn new(transport: Transport) -> Self {
        Self { transport, task_counter: 0, pending_wait: None, running: true, metrics: Metrics::new() }
    }

    pub fn task_counter(&self) -> i64 {
        self.task_counter
    }

    pub async fn run(&mut self) -> Result<(), CoreError> {
        while self.running {
            let Some(frame) = self.transport.recv().await else { break };
            self.dispatch(frame).await?;
        }
        Ok(())
    }

    async fn dispatch(&mut self, frame: Frame) -> Result<(), CoreError> {
        match frame.op {
            OpCode::TaskSubmit => {
                self.task_counter += 1;
                self.metrics.set_monitor_task_counter(self.task_counter);
            },
            OpCode::TaskDone => {
                let _payload: TaskDonePayload = frame.decode()?;
                self.task_counter -= 1;
                self.metrics.set_monitor_task_counter(self.task_counter);
            },
            OpCode::GetTaskCount => {
                self.transport
                    .send(CONTROLLER_RANK, OpCode::GetTaskCountReply, &GetTaskCountReplyPayload {
                        count: self.task_counter.max(0) as u64,
                    })
                    .await?;
            },
            OpCode::Wait => {
                let payload: WaitPayload = frame.decode()?;
                self.start_wait(payload).await?;
            },
            OpCode::WaitAck => {
                let payload: WaitAckPayload = frame.decode()?;
                self.ack_wait(payload.id).await?;
            },
            OpCode::Cancel => {
                self.running = false;
            },
            _ => return Err(CoreError::UnsupportedOperation { from: frame.from }),
        }
        Ok(())
    }

    async fn start_wait(&mut self, payload: WaitPayload) -> Result<(), CoreError> {
        let mut by_owner: HashMap<Rank, Vec<BaseId>> = HashMap::new();
        for id in &payload.data_ids {
            by_owner.entry(id.owner_rank()).or_default().push(*id);
        }
        for (owner, ids) in by_owner {
            self.transport.send(owner, OpCode::Wait, &WaitPayload { data_ids: ids, num_returns: 0 }).await?;
        }

        self.pending_wait = Some(PendingWait {
            requester: CONTROLLER_RANK,
            num_returns: payload.num_returns,
            remaining: payload.data_ids.into_iter().collect(),
            ready: Vec::new(),
        });
        self.maybe_finish_wait().await
    }

    async fn ack_wait(&mut self, id: BaseId) -> Result<(), CoreError> {
        if let Some(pending) = &mut self.pending_wait {
            if pending.remaining.remove(&id) {
                pending.ready.push(id);
            }
        }
        self.maybe_finish_wait().await
    }

    async fn maybe_finish_wait(&mut self) -> Result<(), CoreError> {
        let done = match &self.pending_wait {
            Some(pending) => pending.ready.len() >= pending.num_returns || pending.remaining.is_empty(),
            None => false,
        };
        if !done {
            return Ok(());
        }
        let pending = self.pending_wait.take().expect("checked Some above");
        let not_ready = pending.remaining.into_iter().collect();
        self.transport
            .send(pending.requester, OpCode::WaitReply, &WaitReplyPayload { ready: pending.ready, not_ready })
            .await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use meshtask_transport::build_cluster;

    #[tokio::test]
    async fn task_done_decrements_counter() {
        let mut ranks = build_cluster(3, 8);
        let r1 = ranks.remove(1);

        let mut monitor = Monitor::new(r1);
        monitor.task_counter = 2;

        let frame = Frame { from: 2, op: OpCode::TaskDone, payload: bincode::serialize(&TaskDonePayload { id: None }).unwrap() };
        monitor.dispatch(frame).await.unwrap();
        assert_eq!(monitor.task_counter(), 1);
    }

    #[tokio::test]
    async fn task_submit_increments_counter() {
        let mut ranks = build_cluster(3, 8);
        let r1 = ranks.remove(1);
        let mut monitor = Monitor::new(r1);

        let frame = Frame { from: 0, op: OpCode::TaskSubmit, payload: Vec::new() };
        monitor.dispatch(frame).await.unwrap();
        assert_eq!(monitor.task_counter(), 1);
    }

    #[tokio::test]
    async fn wait_finishes_once_enough_acks_arrive() {
        let mut ranks = build_cluster(4, 8);
        let r1 = ranks.remove(1);
        let mut monitor = Monitor::new(r1);

        let ids = vec![BaseId::new(2, 0), BaseId::new(3, 0)];
        monitor
            .start_wait(WaitPayload { data_ids: ids.clone(), num_returns: 1 })
            .await
            .unwrap();
        assert!(monitor.pending_wait.is_some());

        monitor.ack_wait(ids[0]).await.unwrap();
        assert!(monitor.pending_wait.is_none());
    }
}
