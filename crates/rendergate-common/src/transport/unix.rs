use std::path::Path;
use std::time::Duration;

use bytes::Bytes;
use tokio::net::UnixStream;
use tracing::warn;

use crate::error::{GatewayError, Result};
use crate::transport::framing;

/// Reconnect backoff configuration.
///
/// Used both for the initial connection at gateway startup (workers may still
/// be binding their sockets) and for re-establishing a channel after a
/// transport error. The delay doubles on every failed attempt up to the cap.
#[derive(Debug, Clone)]
pub struct RetryConfig {
    /// Delay before the first retry.
    ///
    /// Default: 50ms
    pub initial_backoff: Duration,
    /// Upper bound for the doubled delay.
    ///
    /// Default: 5000ms (5 seconds)
    pub max_backoff: Duration,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            initial_backoff: Duration::from_millis(50),
            max_backoff: Duration::from_secs(5),
        }
    }
}

/// Gateway-side transport to one renderer worker.
///
/// A worker is any process that accepts a connection on a local-domain
/// socket, reads URL frames and writes back rendered-HTML frames, one reply
/// per request.
///
/// # Wire Protocol
///
/// Messages are sent with a 4-byte length prefix (big-endian u32) followed
/// by the payload:
///
/// ```text
/// [4-byte length] [payload]
/// ```
pub struct UnixTransport;

impl UnixTransport {
    /// Connects to a worker socket.
    ///
    /// # Errors
    ///
    /// Returns `GatewayError::Connection` if the socket does not exist or
    /// refuses the connection.
    pub async fn connect(path: &Path) -> Result<UnixStream> {
        UnixStream::connect(path).await.map_err(|e| {
            GatewayError::Connection(format!("failed to connect to {}: {}", path.display(), e))
        })
    }

    /// Connects to a worker socket, retrying with exponential backoff until
    /// the worker is reachable.
    ///
    /// This never gives up on its own; callers bound the wait (the balancer's
    /// readiness deadline) rather than the connect loop, so a worker that
    /// comes up late still joins the rotation.
    pub async fn connect_with_retry(path: &Path, retry: &RetryConfig) -> UnixStream {
        let mut backoff = retry.initial_backoff;
        loop {
            match Self::connect(path).await {
                Ok(stream) => return stream,
                Err(e) => {
                    warn!(
                        socket = %path.display(),
                        backoff_ms = backoff.as_millis() as u64,
                        "worker connect failed ({}), retrying",
                        e
                    );
                    tokio::time::sleep(backoff).await;
                    backoff = (backoff * 2).min(retry.max_backoff);
                }
            }
        }
    }

    /// Performs one render transaction: writes the URL frame and reads back
    /// the rendered-HTML frame.
    ///
    /// # Arguments
    ///
    /// * `stream` - A connected worker stream with no exchange in flight
    /// * `url` - The request URL (path plus query) to render
    ///
    /// # Returns
    ///
    /// The rendered page bytes
    pub async fn render(stream: &mut UnixStream, url: &str) -> Result<Bytes> {
        framing::write_frame(stream, url.as_bytes()).await?;
        framing::read_frame(stream).await
    }
}
