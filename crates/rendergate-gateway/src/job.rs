use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Instant, SystemTime};

use bytes::Bytes;
use thiserror::Error;
use tokio::sync::oneshot;

/// Unique identifier for a render job.
pub type RequestId = u64;

/// Global counter ensuring unique job ids.
static REQUEST_ID_COUNTER: AtomicU64 = AtomicU64::new(0);

/// Generates a unique job id.
///
/// Upper 32 bits: seconds since the UNIX epoch. Lower 32 bits: atomic
/// counter. Unique across restarts and within the same runtime.
fn generate_request_id() -> RequestId {
    let timestamp = SystemTime::now()
        .duration_since(SystemTime::UNIX_EPOCH)
        .map(|d| d.as_secs())
        .unwrap_or(0);

    let counter = REQUEST_ID_COUNTER.fetch_add(1, Ordering::Relaxed);

    (timestamp << 32) | (counter & 0xFFFF_FFFF)
}

/// Why a render did not produce a page.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum RenderError {
    /// The worker did not reply within the render deadline.
    #[error("render timed out after {0}ms")]
    Timeout(u64),

    /// The worker connection failed mid-exchange.
    #[error("worker connection lost: {0}")]
    WorkerLost(String),
}

/// Result of one render exchange.
pub type RenderOutcome = Result<Bytes, RenderError>;

/// One in-flight render request.
///
/// The job is a value that moves: from the HTTP task into the balancer, then
/// into exactly one worker channel's submission slot (or the pending queue),
/// and is finally consumed by [`resolve`](Self::resolve). The reply travels
/// back over the embedded one-shot sender, so delivering an outcome twice is
/// impossible by construction.
#[derive(Debug)]
pub struct RenderJob {
    pub id: RequestId,
    /// Request URL, path plus query.
    pub url: String,
    /// When the job was created; pending time is measured from here.
    pub submitted_at: Instant,
    reply: oneshot::Sender<RenderOutcome>,
}

impl RenderJob {
    /// Creates a job and the receiver its outcome will arrive on.
    pub fn new(url: impl Into<String>) -> (Self, oneshot::Receiver<RenderOutcome>) {
        let (reply, rx) = oneshot::channel();
        (
            Self {
                id: generate_request_id(),
                url: url.into(),
                submitted_at: Instant::now(),
                reply,
            },
            rx,
        )
    }

    /// Delivers the outcome to the waiting request.
    ///
    /// Consumes the job. The receiving side may already be gone (the client
    /// hung up); that is not an error.
    pub fn resolve(self, outcome: RenderOutcome) {
        let _ = self.reply.send(outcome);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_job_ids_are_unique() {
        let (a, _rx_a) = RenderJob::new("/a");
        let (b, _rx_b) = RenderJob::new("/b");
        assert_ne!(a.id, b.id);
    }

    #[test]
    fn test_job_id_structure() {
        let (job, _rx) = RenderJob::new("/");
        let timestamp = job.id >> 32;
        // after 2020-01-01, within 32 bits
        assert!(timestamp > 1_577_836_800);
        assert!(timestamp < 4_294_967_296);
    }

    #[tokio::test]
    async fn test_resolve_delivers_outcome() {
        let (job, rx) = RenderJob::new("/page");
        job.resolve(Ok(Bytes::from_static(b"<html/>")));
        assert_eq!(rx.await.unwrap(), Ok(Bytes::from_static(b"<html/>")));
    }

    #[tokio::test]
    async fn test_resolve_with_dropped_receiver_is_silent() {
        let (job, rx) = RenderJob::new("/page");
        drop(rx);
        job.resolve(Err(RenderError::Timeout(2000)));
    }

    #[test]
    fn test_id_uniqueness_under_concurrency() {
        use std::collections::HashSet;
        use std::thread;

        let handles: Vec<_> = (0..8)
            .map(|_| {
                thread::spawn(|| {
                    (0..1000).map(|_| generate_request_id()).collect::<Vec<_>>()
                })
            })
            .collect();

        let mut all = HashSet::new();
        for handle in handles {
            for id in handle.join().unwrap() {
                assert!(all.insert(id), "duplicate job id: {}", id);
            }
        }
        assert_eq!(all.len(), 8 * 1000);
    }
}
