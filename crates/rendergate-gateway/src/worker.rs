use std::path::{Path, PathBuf};
use std::sync::atomic::Ordering;
use std::sync::Arc;
use std::time::Duration;

use tokio::net::UnixStream;
use tokio::sync::{mpsc, oneshot, Mutex};
use tracing::{info, warn};

use rendergate_common::transport::{RetryConfig, UnixTransport};

use crate::job::{RenderError, RenderJob, RenderOutcome, RequestId};
use crate::stats::WorkerStats;

/// Gateway-side endpoint of one worker connection.
///
/// A channel holds at most one in-flight render. The `current` slot is the
/// gate: [`try_process`](Self::try_process) succeeds only while the slot is
/// empty, and the channel task clears it after the reply has been delivered,
/// so writes and reads on the socket strictly interleave.
///
/// The socket itself is owned by the channel task spawned in
/// [`spawn`](Self::spawn); submissions reach it over an unbounded sender
/// which, thanks to the gate, never holds more than one job.
pub struct WorkerChannel {
    index: usize,
    socket_path: PathBuf,
    current: Mutex<Option<RequestId>>,
    submit: mpsc::UnboundedSender<RenderJob>,
    stats: Arc<WorkerStats>,
}

impl WorkerChannel {
    /// Creates the channel and spawns its task.
    ///
    /// The task connects to the worker with retry; the returned receiver
    /// fires once the first connection is established. The channel lives for
    /// the rest of the process.
    pub fn spawn(
        index: usize,
        socket_path: PathBuf,
        render_timeout: Duration,
        retry: RetryConfig,
    ) -> (Arc<Self>, oneshot::Receiver<()>) {
        let (submit, jobs) = mpsc::unbounded_channel();
        let (ready_tx, ready_rx) = oneshot::channel();

        let channel = Arc::new(Self {
            index,
            socket_path,
            current: Mutex::new(None),
            submit,
            stats: Arc::new(WorkerStats::default()),
        });

        tokio::spawn(channel.clone().run(jobs, render_timeout, retry, ready_tx));

        (channel, ready_rx)
    }

    pub fn index(&self) -> usize {
        self.index
    }

    pub fn socket_path(&self) -> &Path {
        &self.socket_path
    }

    pub fn stats(&self) -> Arc<WorkerStats> {
        self.stats.clone()
    }

    /// Atomically claims the worker for `job`.
    ///
    /// Returns the job back if the worker is already mid-render; on success
    /// the job is queued to the channel task, which is the wake-up.
    pub async fn try_process(&self, job: RenderJob) -> Result<(), RenderJob> {
        let mut current = self.current.lock().await;
        if current.is_some() {
            return Err(job);
        }
        *current = Some(job.id);
        self.stats.dispatched.fetch_add(1, Ordering::Relaxed);

        if let Err(mpsc::error::SendError(job)) = self.submit.send(job) {
            // channel task is gone; fail the job rather than wedging the slot
            *current = None;
            job.resolve(Err(RenderError::WorkerLost(
                "worker channel task terminated".into(),
            )));
        }
        Ok(())
    }

    /// Whether a render is currently in flight.
    pub async fn is_working(&self) -> bool {
        self.current.lock().await.is_some()
    }

    /// Clears the in-flight slot, allowing the next submission.
    async fn reset(&self) {
        *self.current.lock().await = None;
    }

    /// Channel task: owns the socket, performs one write-then-read exchange
    /// per job, and reconnects with backoff after any failed exchange.
    async fn run(
        self: Arc<Self>,
        mut jobs: mpsc::UnboundedReceiver<RenderJob>,
        render_timeout: Duration,
        retry: RetryConfig,
        ready: oneshot::Sender<()>,
    ) {
        let mut stream = UnixTransport::connect_with_retry(&self.socket_path, &retry).await;
        info!(worker = self.index, socket = %self.socket_path.display(), "worker channel connected");
        let _ = ready.send(());

        while let Some(job) = jobs.recv().await {
            self.stats.in_flight.store(1, Ordering::Relaxed);
            let outcome = self.exchange(&mut stream, &job.url, render_timeout).await;
            let failed = outcome.is_err();
            job.resolve(outcome);
            self.stats.in_flight.store(0, Ordering::Relaxed);
            self.stats.completed.fetch_add(1, Ordering::Relaxed);
            self.reset().await;

            if failed {
                // after a timeout or transport error the stream's framing
                // state is unknown; a late reply would corrupt the next
                // exchange, so start from a fresh connection
                stream = UnixTransport::connect_with_retry(&self.socket_path, &retry).await;
                info!(worker = self.index, "worker channel reconnected");
            }
        }
    }

    /// One render exchange under the render deadline.
    async fn exchange(
        &self,
        stream: &mut UnixStream,
        url: &str,
        deadline: Duration,
    ) -> RenderOutcome {
        match tokio::time::timeout(deadline, UnixTransport::render(stream, url)).await {
            Ok(Ok(body)) => Ok(body),
            Ok(Err(e)) => {
                warn!(worker = self.index, "worker exchange failed: {}", e);
                Err(RenderError::WorkerLost(e.to_string()))
            }
            Err(_) => {
                warn!(
                    worker = self.index,
                    timeout_ms = deadline.as_millis() as u64,
                    "render deadline exceeded"
                );
                Err(RenderError::Timeout(deadline.as_millis() as u64))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use bytes::Bytes;
    use rendergate_common::transport::RenderListener;

    fn temp_socket(tag: &str) -> PathBuf {
        std::env::temp_dir().join(format!(
            "rendergate-worker-test-{}-{}.sock",
            tag,
            std::process::id()
        ))
    }

    fn spawn_stub(path: &Path, reply: &'static str) {
        let listener = RenderListener::bind(path).unwrap();
        tokio::spawn(async move {
            listener
                .run_with_handler(move |_url| async move { Ok(Bytes::from_static(reply.as_bytes())) })
                .await
        });
    }

    #[tokio::test]
    async fn test_single_flight_gate() {
        let path = temp_socket("gate");
        let listener = RenderListener::bind(&path).unwrap();
        tokio::spawn(async move {
            listener
                .run_with_handler(|_url| async move {
                    // hold the exchange open so the slot stays occupied
                    tokio::time::sleep(Duration::from_millis(200)).await;
                    Ok(Bytes::from_static(b"<p>ok</p>"))
                })
                .await
        });

        let (channel, ready) =
            WorkerChannel::spawn(0, path.clone(), Duration::from_secs(2), RetryConfig::default());
        ready.await.unwrap();

        let (job_a, rx_a) = RenderJob::new("/a");
        let (job_b, _rx_b) = RenderJob::new("/b");

        assert!(channel.try_process(job_a).await.is_ok());
        // the slot is taken until the reply lands; a second submission bounces
        let bounced = channel.try_process(job_b).await;
        assert!(bounced.is_err());
        assert!(channel.is_working().await);

        assert_eq!(rx_a.await.unwrap(), Ok(Bytes::from_static(b"<p>ok</p>")));

        let _ = std::fs::remove_file(&path);
    }

    #[tokio::test]
    async fn test_slot_clears_after_reply() {
        let path = temp_socket("clears");
        spawn_stub(&path, "<p>ok</p>");

        let (channel, ready) =
            WorkerChannel::spawn(0, path.clone(), Duration::from_secs(2), RetryConfig::default());
        ready.await.unwrap();

        for i in 0..3 {
            let (job, rx) = RenderJob::new(format!("/page{}", i));
            assert!(channel.try_process(job).await.is_ok());
            rx.await.unwrap().unwrap();
        }
        assert!(!channel.is_working().await);
        assert_eq!(channel.stats().dispatched.load(Ordering::Relaxed), 3);
        assert_eq!(channel.stats().completed.load(Ordering::Relaxed), 3);

        let _ = std::fs::remove_file(&path);
    }

    #[tokio::test]
    async fn test_render_timeout_resolves_504_side() {
        let path = temp_socket("timeout");
        let listener = RenderListener::bind(&path).unwrap();
        tokio::spawn(async move {
            listener
                .run_with_handler(|_url| async move {
                    tokio::time::sleep(Duration::from_secs(60)).await;
                    Ok(Bytes::from_static(b"late"))
                })
                .await
        });

        let (channel, ready) = WorkerChannel::spawn(
            0,
            path.clone(),
            Duration::from_millis(100),
            RetryConfig::default(),
        );
        ready.await.unwrap();

        let (job, rx) = RenderJob::new("/slow");
        channel.try_process(job).await.unwrap();

        assert_eq!(rx.await.unwrap(), Err(RenderError::Timeout(100)));
        // the slot must be free again for the next job
        assert!(!channel.is_working().await);

        let _ = std::fs::remove_file(&path);
    }
}
