//! Thin wrapper over the `metrics` facade macros, mirroring the teacher's
//! `Metrics` struct: a zero-sized handle held by each ranked role and
//! called at the points where it actually observes something. Recording
//! goes through whatever global recorder the binary installed (or
//! nowhere, if none was installed) — this crate never owns an exporter.

use metrics::counter;
use metrics::gauge;
use metrics::histogram;
use metrics::SharedString;

#[derive(Clone, Default)]
pub struct Metrics {}

impl Metrics {
    pub fn new() -> Self {
        Self {}
    }

    pub fn increment_tasks_received(&self, task_name: &str) {
        let task_name = SharedString::from(String::from(task_name));
        counter!("meshtask_tasks_received_total", "task_name" => task_name).increment(1);
    }

    pub fn increment_tasks_succeeded(&self, task_name: &str) {
        let task_name = SharedString::from(String::from(task_name));
        counter!("meshtask_tasks_succeeded_total", "task_name" => task_name).increment(1);
    }

    pub fn increment_tasks_failed(&self, task_name: &str) {
        let task_name = SharedString::from(String::from(task_name));
        counter!("meshtask_tasks_failed_total", "task_name" => task_name).increment(1);
    }

    pub fn observe_task_duration(&self, task_name: &str, duration_secs: f64) {
        let task_name = SharedString::from(String::from(task_name));
        histogram!("meshtask_task_duration_seconds", "task_name" => task_name).record(duration_secs);
    }

    pub fn observe_cleanup_batch_size(&self, rank: u32, size: usize) {
        histogram!("meshtask_cleanup_batch_size", "rank" => rank.to_string()).record(size as f64);
    }

    pub fn set_worker_ready_queue_depth(&self, rank: u32, depth: usize) {
        gauge!("meshtask_worker_ready_queue_depth", "rank" => rank.to_string()).set(depth as f64);
    }

    pub fn set_monitor_task_counter(&self, value: i64) {
        gauge!("meshtask_monitor_task_counter").set(value as f64);
    }
}
