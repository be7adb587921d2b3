use std::collections::VecDeque;
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{oneshot, Mutex};
use tracing::{debug, info};

use rendergate_common::{GatewayError, Result};

use crate::config::GatewayConfig;
use crate::job::RenderJob;
use crate::round_robin::RoundRobin;
use crate::worker::WorkerChannel;

/// How long [`Balancer::wait_ready`] waits for every channel to connect.
pub const STARTUP_DEADLINE: Duration = Duration::from_secs(10);

/// State shared by dispatch callers and the drain task, under one lock.
struct Inner {
    cursor: RoundRobin,
    pending: VecDeque<RenderJob>,
}

/// Distributes render jobs over the worker pool.
///
/// Dispatch is round-robin skip-if-busy: the cursor advances once per probe
/// and the first idle worker takes the job. A job that finds every worker
/// busy parks on the bounded FIFO pending queue, which a timer task feeds
/// back through placement every `drain_interval`.
///
/// A job is in exactly one place at any instant: a worker channel's slot,
/// the pending queue, or resolved.
pub struct Balancer {
    workers: Vec<Arc<WorkerChannel>>,
    inner: Mutex<Inner>,
    pending_cap: usize,
    readiness: Mutex<Vec<oneshot::Receiver<()>>>,
}

impl Balancer {
    /// Spawns the worker channel tasks and the pending-drain task.
    ///
    /// # Panics
    /// Panics if the configuration names no workers.
    pub fn start(config: &GatewayConfig) -> Arc<Self> {
        assert!(
            !config.worker_sockets.is_empty(),
            "balancer requires at least one worker socket"
        );

        let mut workers = Vec::with_capacity(config.worker_sockets.len());
        let mut readiness = Vec::with_capacity(config.worker_sockets.len());
        for (index, path) in config.worker_sockets.iter().enumerate() {
            let (channel, ready) = WorkerChannel::spawn(
                index,
                path.clone(),
                config.render_timeout,
                config.retry.clone(),
            );
            workers.push(channel);
            readiness.push(ready);
        }

        let worker_count = workers.len();
        let balancer = Arc::new(Self {
            workers,
            inner: Mutex::new(Inner {
                cursor: RoundRobin::new(worker_count),
                pending: VecDeque::new(),
            }),
            pending_cap: config.pending_cap,
            readiness: Mutex::new(readiness),
        });

        tokio::spawn(balancer.clone().drain_loop(
            config.drain_initial_delay,
            config.drain_interval,
        ));

        info!(workers = worker_count, "balancer started");
        balancer
    }

    /// Blocks until every worker channel has connected, bounded by
    /// [`STARTUP_DEADLINE`].
    ///
    /// A timeout is not fatal to the caller: channels keep retrying and a
    /// worker that comes up late still joins the rotation.
    pub async fn wait_ready(&self) -> Result<()> {
        let receivers = std::mem::take(&mut *self.readiness.lock().await);
        let all = futures::future::join_all(receivers);
        tokio::time::timeout(STARTUP_DEADLINE, all)
            .await
            .map(|_| ())
            .map_err(|_| GatewayError::Timeout(STARTUP_DEADLINE.as_millis() as u64))
    }

    /// Hands `job` to an idle worker, or parks it on the pending queue.
    ///
    /// May be called from any task. Returns `QueueFull` when every worker is
    /// busy and the queue is at capacity; the job is dropped and the caller
    /// answers the client.
    pub async fn dispatch(&self, job: RenderJob) -> Result<()> {
        let mut inner = self.inner.lock().await;
        let job = match self.place(&mut inner, job).await {
            Ok(()) => return Ok(()),
            Err(job) => job,
        };

        if inner.pending.len() >= self.pending_cap {
            return Err(GatewayError::QueueFull);
        }
        debug!(id = job.id, url = %job.url, "all workers busy, job pending");
        inner.pending.push_back(job);
        Ok(())
    }

    /// Probes workers for an idle slot.
    ///
    /// With a single worker there is nothing to balance. Otherwise the
    /// cursor advances once per probe, up to one full rotation; it is never
    /// reset by a successful placement.
    async fn place(&self, inner: &mut Inner, job: RenderJob) -> std::result::Result<(), RenderJob> {
        if self.workers.len() == 1 {
            return self.workers[0].try_process(job).await;
        }

        let mut job = job;
        for _ in 0..self.workers.len() {
            let slot = inner.cursor.next();
            match self.workers[slot].try_process(job).await {
                Ok(()) => return Ok(()),
                Err(bounced) => job = bounced,
            }
        }
        Err(job)
    }

    /// Timer task feeding the pending queue back through placement.
    async fn drain_loop(self: Arc<Self>, initial_delay: Duration, interval: Duration) {
        let start = tokio::time::Instant::now() + initial_delay;
        let mut ticker = tokio::time::interval_at(start, interval);
        loop {
            ticker.tick().await;
            self.drain_pending().await;
        }
    }

    /// One drain pass: each queued job gets one placement attempt, oldest
    /// first; jobs that still cannot be placed keep their relative order at
    /// the tail. Re-enqueues are exempt from the cap; the job already holds
    /// a queue slot.
    async fn drain_pending(&self) {
        let mut inner = self.inner.lock().await;
        let count = inner.pending.len();
        if count == 0 {
            return;
        }
        for _ in 0..count {
            let Some(job) = inner.pending.pop_front() else {
                break;
            };
            if let Err(job) = self.place(&mut inner, job).await {
                inner.pending.push_back(job);
            }
        }
    }

    /// Number of jobs currently parked.
    pub async fn pending_len(&self) -> usize {
        self.inner.lock().await.pending.len()
    }

    /// The worker channels, in rotation order.
    pub fn workers(&self) -> &[Arc<WorkerChannel>] {
        &self.workers
    }
}
