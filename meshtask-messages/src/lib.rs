//! Wire vocabulary shared by every rank: identifiers, operation codes and
//! their payloads, and the nested-argument tree used to walk task
//! arguments looking for unresolved ids.

mod arg;
mod id;
mod op;

pub use arg::ArgTree;
pub use id::BaseId;
pub use id::GcSink;
pub use id::OwnedId;
pub use id::Rank;
pub use op::CleanupPayload;
pub use op::ExecutePayload;
pub use op::GetPayload;
pub use op::GetTaskCountReplyPayload;
pub use op::OpCode;
pub use op::PutDataPayload;
pub use op::PutOwnerPayload;
pub use op::TaskDonePayload;
pub use op::TaskOutcome;
pub use op::WaitAckPayload;
pub use op::WaitPayload;
pub use op::WaitReplyPayload;

/// Controller rank, by convention rank 0.
pub const CONTROLLER_RANK: Rank = 0;
/// Monitor rank, by convention rank 1.
pub const MONITOR_RANK: Rank = 1;
/// Lowest rank a worker may hold.
pub const FIRST_WORKER_RANK: Rank = 2;
