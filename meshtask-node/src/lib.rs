//! Top-level orchestration: builds the in-process channel mesh, spawns
//! the monitor and worker ranks as background tasks, and hands back the
//! controller for rank 0 the way `lgn-worker`'s `main.rs` hands a
//! `ProversManager` to its gateway loop.

pub mod callables;
pub mod config;

use meshtask_core::CallableRegistry;
use meshtask_core::Controller;
use meshtask_core::Monitor;
use meshtask_core::Worker;
use meshtask_transport::build_cluster;
use tokio::task::JoinHandle;

use crate::config::Config;

pub struct Cluster {
    pub controller: Controller,
    pub monitor_handle: JoinHandle<()>,
    pub worker_handles: Vec<JoinHandle<()>>,
}

/// Wires a fresh channel mesh sized for `config.cluster`, spawns the
/// monitor and every worker rank as a background task running its
/// cooperative loop, and returns the controller for the caller to drive.
pub fn run_cluster(config: &Config, registry: CallableRegistry) -> Cluster {
    let world_size = config.cluster.world_size();
    let mut ranks = build_cluster(world_size, config.cluster.channel_capacity);

    // build_cluster returns ranks in ascending order, so the first two
    // removals are always the controller and the monitor.
    let controller_transport = ranks.remove(0);
    let monitor_transport = ranks.remove(0);

    let mut monitor = Monitor::new(monitor_transport);
    let monitor_handle = tokio::spawn(async move {
        if let Err(err) = monitor.run().await {
            tracing::error!(?err, "monitor loop exited with an error");
        }
    });

    let worker_handles = ranks
        .into_iter()
        .map(|transport| {
            let rank = transport.rank();
            let mut worker = Worker::new(transport, registry.clone());
            tokio::spawn(async move {
                if let Err(err) = worker.run().await {
                    tracing::error!(rank, ?err, "worker loop exited with an error");
                }
            })
        })
        .collect();

    let controller = Controller::new(controller_transport, world_size, config.cluster.cleanup_batch_threshold);
    Cluster { controller, monitor_handle, worker_handles }
}

impl Cluster {
    /// Sends CANCEL to every other rank and waits for their loops to
    /// observe it and return.
    pub async fn shutdown(mut self) -> Result<(), meshtask_core::CoreError> {
        self.controller.shutdown().await?;
        let _ = self.monitor_handle.await;
        for handle in self.worker_handles {
            let _ = handle.await;
        }
        Ok(())
    }
}
