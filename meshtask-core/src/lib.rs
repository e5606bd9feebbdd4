//! The three ranked roles (controller, monitor, worker) and the local
//! state each one keeps: the object store, the pending-request ledger,
//! the round-robin scheduler, and the deferred garbage collector.

mod callable;
mod controller;
mod error;
mod gc;
mod metrics;
mod monitor;
mod object_store;
mod request_store;
mod scheduler;
mod worker;

pub use callable::Callable;
pub use callable::CallableRegistry;
pub use controller::Controller;
pub use error::CoreError;
pub use gc::GarbageCollector;
pub use metrics::Metrics;
pub use monitor::Monitor;
pub use object_store::ObjectStore;
pub use request_store::RequestStore;
pub use scheduler::RoundRobin;
pub use worker::Worker;
