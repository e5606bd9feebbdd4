use serde::Deserialize;
use serde::Serialize;

use crate::arg::ArgTree;
use crate::id::BaseId;
use crate::id::Rank;

/// Wire-level operation codes. `ActorCreate`/`ActorExecute` are carried for
/// completeness with the spec's enumeration of supported operations but are
/// not dispatched by this core — see `DESIGN.md`. `WaitAck`, `WaitReply`,
/// `GetTaskCountReply` and `TaskSubmit` are this implementation's concrete
/// realization of the "small messages" the spec describes but does not name
/// at the wire level: readiness notifications, the two synchronous replies,
/// and the counter increment the spec says happens at submit time but never
/// assigns a wire op of its own.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum OpCode {
    Execute,
    Get,
    PutData,
    PutOwner,
    Wait,
    WaitAck,
    WaitReply,
    ActorCreate,
    ActorExecute,
    Cleanup,
    TaskSubmit,
    TaskDone,
    GetTaskCount,
    GetTaskCountReply,
    Cancel,
}

/// The outcome of running a task, stored under each of its output ids.
/// Indistinguishable at the wire level from a plain value; only the
/// retrieving side inspects the variant (see `CoreError::UserTaskFailure`).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum TaskOutcome {
    Ready(Vec<u8>),
    Failed(String),
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExecutePayload {
    pub task_name: String,
    pub args: ArgTree,
    pub kwargs: ArgTree,
    pub output: Vec<BaseId>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GetPayload {
    pub id: BaseId,
    pub is_blocking: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PutDataPayload {
    pub id: BaseId,
    pub data: TaskOutcome,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PutOwnerPayload {
    pub id: BaseId,
    pub owner: Rank,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WaitPayload {
    pub data_ids: Vec<BaseId>,
    pub num_returns: usize,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WaitAckPayload {
    pub id: BaseId,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WaitReplyPayload {
    pub ready: Vec<BaseId>,
    pub not_ready: Vec<BaseId>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CleanupPayload {
    pub ids: Vec<BaseId>,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct GetTaskCountReplyPayload {
    pub count: u64,
}

/// Sent once per completed `submit`, never once per output. `id` is the
/// task's first output id, or `None` for a `num_returns == 0` task which
/// has no output ids to report — the monitor only counts arrivals, it
/// never inspects `id`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TaskDonePayload {
    pub id: Option<BaseId>,
}
