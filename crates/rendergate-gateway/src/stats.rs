use std::sync::atomic::{AtomicU64, AtomicUsize};

use serde::Serialize;

/// Per-worker dispatch counters.
///
/// Updated by the worker channel, read concurrently by the status endpoint
/// and by tests asserting dispatch behavior.
#[derive(Debug, Default)]
pub struct WorkerStats {
    /// Renders handed to this worker's channel task.
    pub dispatched: AtomicU64,
    /// Renders whose outcome has been delivered, success or failure.
    pub completed: AtomicU64,
    /// 1 while an exchange is on the wire, 0 otherwise.
    pub in_flight: AtomicUsize,
}

/// Snapshot of one worker for the status endpoint.
#[derive(Debug, Serialize)]
pub struct WorkerSnapshot {
    pub index: usize,
    pub socket: String,
    pub dispatched: u64,
    pub completed: u64,
    pub busy: bool,
}

/// Snapshot of the gateway for the status endpoint.
#[derive(Debug, Serialize)]
pub struct StatusSnapshot {
    pub workers: Vec<WorkerSnapshot>,
    pub pending: usize,
    pub cache_enabled: bool,
    pub cache_entries: usize,
}
