//! The worker loop (C9): a single-threaded cooperative dispatcher. The
//! only suspension point is the top-of-loop `transport.recv`; a task with
//! unresolved arguments is parked as a `SuspendedTask` rather than blocking
//! the loop, and becomes eligible to run the moment its last dependency
//! lands (see `Worker::progress`).

use std::collections::HashMap;
use std::collections::HashSet;
use std::collections::VecDeque;

use meshtask_messages::ArgTree;
use meshtask_messages::BaseId;
use meshtask_messages::CleanupPayload;
use meshtask_messages::ExecutePayload;
use meshtask_messages::GetPayload;
use meshtask_messages::OpCode;
use meshtask_messages::PutDataPayload;
use meshtask_messages::PutOwnerPayload;
use meshtask_messages::Rank;
use meshtask_messages::TaskDonePayload;
use meshtask_messages::TaskOutcome;
use meshtask_messages::WaitAckPayload;
use meshtask_messages::WaitPayload;
use meshtask_messages::MONITOR_RANK;
use meshtask_transport::AsyncOperations;
use meshtask_transport::Frame;
use meshtask_transport::Transport;

use crate::callable::CallableRegistry;
use crate::error::CoreError;
use crate::metrics::Metrics;
use crate::object_store::ObjectStore;
use crate::request_store::RequestStore;

type TaskId = u64;

struct SuspendedTask {
    task_name: String,
    args: ArgTree,
    kwargs: ArgTree,
    output: Vec<BaseId>,
    pending: HashSet<BaseId>,
}

pub struct Worker {
    rank: Rank,
    transport: Transport,
    store: ObjectStore,
    requests: RequestStore,
    async_ops: AsyncOperations,
    registry: CallableRegistry,
    tasks: HashMap<TaskId, SuspendedTask>,
    waiters: HashMap<BaseId, Vec<TaskId>>,
    ready_queue: VecDeque<TaskId>,
    next_task_id: TaskId,
    running: bool,
    metrics: Metrics,
}

impl Worker {
    pub fn new(transport: Transport, registry: CallableRegistry) -> Self {
        Self {
            rank: transport.rank(),
            transport,
            store: ObjectStore::new(),
            requests: RequestStore::new(),
            async_ops: AsyncOperations::new(),
            registry,
            tasks: HashMap::new(),
            waiters: HashMap::new(),
            ready_queue: VecDeque::new(),
            next_task_id: 0,
            running: true,
            metrics: Metrics::new(),
        }
    }

    pub async fn run(&mut self) -> Result<(), CoreError> {
        while self.running {
            let Some(frame) = self.transport.recv().await else { break };
            self.dispatch(frame).await?;
        }
        self.async_ops.finish().await;
        Ok(())
    }

    async fn dispatch(&mut self, frame: Frame) -> Result<(), CoreError> {
        match frame.op {
            OpCode::Execute => {
                let payload: ExecutePayload = frame.decode()?;
                self.handle_execute(payload).await?;
            },
            OpCode::Get => {
                let payload: GetPayload = frame.decode()?;
                self.handle_get(frame.from, payload).await?;
            },
            OpCode::PutData => {
                let payload: PutDataPayload = frame.decode()?;
                self.store.put(payload.id, payload.data);
                self.requests.clear_cache(&payload.id);
                self.progress(vec![payload.id]).await?;
            },
            OpCode::PutOwner => {
                let payload: PutOwnerPayload = frame.decode()?;
                self.store.record_location(payload.id, payload.owner);
            },
            OpCode::Wait => {
                let payload: WaitPayload = frame.decode()?;
                self.handle_wait(frame.from, payload)?;
            },
            OpCode::Cleanup => {
                let payload: CleanupPayload = frame.decode()?;
                for id in payload.ids {
                    self.store.forget(&id);
                    self.requests.clear_cache(&id);
                }
            },
            OpCode::Cancel => {
                self.running = false;
            },
            OpCode::ActorCreate | OpCode::ActorExecute => {
                return Err(CoreError::UnsupportedOperation { from: frame.from });
            },
            OpCode::WaitAck
            | OpCode::WaitReply
            | OpCode::TaskSubmit
            | OpCode::TaskDone
            | OpCode::GetTaskCount
            | OpCode::GetTaskCountReply => {
                return Err(CoreError::UnsupportedOperation { from: frame.from });
            },
        }
        self.async_ops.check();
        Ok(())
    }

    async fn handle_execute(&mut self, payload: ExecutePayload) -> Result<(), CoreError> {
        self.metrics.increment_tasks_received(&payload.task_name);

        let mut missing = HashSet::new();
        payload.args.for_each_id(|id| {
            if !self.store.contains(&id) {
                missing.insert(id);
            }
        });
        payload.kwargs.for_each_id(|id| {
            if !self.store.contains(&id) {
                missing.insert(id);
            }
        });

        if missing.is_empty() {
            let landed = self.execute_now(payload.task_name, payload.args, payload.kwargs, payload.output)?;
            self.progress(landed).await?;
            return Ok(());
        }

        let task_id = self.next_task_id;
        self.next_task_id += 1;
        for id in &missing {
            // A missing id owned by this rank is a pending output of a
            // task already in flight here; it resolves via `execute_now`
            // → `progress` → `wake_waiters`, never a wire round trip —
            // sending ourselves a GET would hit the mesh's missing
            // self-loopback channel (`build_cluster` never wires one).
            if id.owner_rank() != self.rank && !self.requests.is_already_requested(id) {
                self.transport.send(id.owner_rank(), OpCode::Get, &GetPayload { id: *id, is_blocking: false }).await?;
                self.requests.mark_requested(*id);
            }
            self.waiters.entry(*id).or_default().push(task_id);
        }
        self.tasks.insert(task_id, SuspendedTask {
            task_name: payload.task_name,
            args: payload.args,
            kwargs: payload.kwargs,
            output: payload.output,
            pending: missing,
        });
        Ok(())
    }

    async fn handle_get(&mut self, requester: Rank, payload: GetPayload) -> Result<(), CoreError> {
        self.requests.put(payload.id, requester, payload.is_blocking);
        if self.store.contains(&payload.id) {
            self.requests.check_pending_get(&[payload.id], &mut self.store, &self.transport, &mut self.async_ops).await?;
        }
        Ok(())
    }

    fn handle_wait(&mut self, requester: Rank, payload: WaitPayload) -> Result<(), CoreError> {
        for id in payload.data_ids {
            if self.store.contains(&id) {
                let (handle, _buf) = self.transport.isend(requester, OpCode::WaitAck, &WaitAckPayload { id })?;
                self.async_ops.extend([handle]);
            } else {
                self.requests.put_wait(id, requester);
            }
        }
        Ok(())
    }

    /// Runs a task whose arguments are all resolvable, stores its outputs
    /// (or propagates an upstream/local failure into them), and notifies
    /// the monitor once. Returns the ids that just landed.
    fn execute_now(
        &mut self,
        task_name: String,
        args: ArgTree,
        kwargs: ArgTree,
        output: Vec<BaseId>,
    ) -> Result<Vec<BaseId>, CoreError> {
        let started = std::time::Instant::now();
        let mut failure = None;
        let mut check_failed = |id: BaseId, store: &ObjectStore| {
            if failure.is_none() {
                if let Some(TaskOutcome::Failed(msg)) = store.get(&id) {
                    failure = Some(format!("dependency {id} failed: {msg}"));
                }
            }
        };
        args.for_each_id(|id| check_failed(id, &self.store));
        kwargs.for_each_id(|id| check_failed(id, &self.store));

        let result = match failure {
            Some(msg) => Err(msg),
            None => {
                let store = &self.store;
                let (resolved_args, _) = args.materialize(&mut |id| resolved_bytes(store, id));
                let (resolved_kwargs, _) = kwargs.materialize(&mut |id| resolved_bytes(store, id));
                self.registry.dispatch(&task_name, &resolved_args, &resolved_kwargs, output.len())
            },
        };

        match result {
            Ok(blobs) if blobs.len() == output.len() => {
                for (id, bytes) in output.iter().zip(blobs) {
                    self.store.put(*id, TaskOutcome::Ready(bytes));
                }
                self.metrics.increment_tasks_succeeded(&task_name);
            },
            Ok(_) => {
                let msg = "callable produced a different number of outputs than requested".to_string();
                for id in &output {
                    self.store.put(*id, TaskOutcome::Failed(msg.clone()));
                }
                self.metrics.increment_tasks_failed(&task_name);
            },
            Err(msg) => {
                for id in &output {
                    self.store.put(*id, TaskOutcome::Failed(msg.clone()));
                }
                self.metrics.increment_tasks_failed(&task_name);
            },
        }
        self.metrics.observe_task_duration(&task_name, started.elapsed().as_secs_f64());

        let done_id = output.first().copied();
        let (handle, _buf) = self.transport.isend(MONITOR_RANK, OpCode::TaskDone, &TaskDonePayload { id: done_id })?;
        self.async_ops.extend([handle]);

        Ok(output)
    }

    fn wake_waiters(&mut self, ids: &[BaseId]) {
        for id in ids {
            let Some(task_ids) = self.waiters.remove(id) else { continue };
            for task_id in task_ids {
                if let Some(task) = self.tasks.get_mut(&task_id) {
                    task.pending.remove(id);
                    if task.pending.is_empty() {
                        self.ready_queue.push_back(task_id);
                    }
                }
            }
        }
    }

    /// Notifies remote requesters about newly-landed ids, wakes any local
    /// tasks that were waiting on them, and drains the resulting ready
    /// queue — which may itself land further ids, so this loops to a
    /// fixed point rather than recursing.
    async fn progress(&mut self, mut landed: Vec<BaseId>) -> Result<(), CoreError> {
        loop {
            self.requests.check_pending_get(&landed, &mut self.store, &self.transport, &mut self.async_ops).await?;
            self.requests.check_pending_wait(&landed, &self.store, &self.transport, &mut self.async_ops)?;
            self.wake_waiters(&landed);

            let Some(task_id) = self.ready_queue.pop_front() else { break };
            let task = self.tasks.remove(&task_id).expect("queued task must still be present");
            landed = self.execute_now(task.task_name, task.args, task.kwargs, task.output)?;
        }
        self.metrics.set_worker_ready_queue_depth(self.rank, self.ready_queue.len());
        Ok(())
    }

    pub fn rank(&self) -> Rank {
        self.rank
    }

    pub fn ready_queue_len(&self) -> usize {
        self.ready_queue.len()
    }
}

fn resolved_bytes(store: &ObjectStore, id: BaseId) -> Option<Vec<u8>> {
    match store.get(&id) {
        Some(TaskOutcome::Ready(bytes)) => Some(bytes.clone()),
        _ => None,
    }
}
