use std::path::{Path, PathBuf};
use std::sync::Arc;

use bytes::Bytes;
use tokio::net::{UnixListener, UnixStream};
use tracing::{debug, error};

use crate::error::{GatewayError, Result};
use crate::transport::framing;

/// Worker-side listener for render requests.
///
/// Binds a local-domain socket and serves the worker half of the wire
/// protocol: per connection, read one URL frame, produce a rendered page,
/// write one response frame, repeat until the gateway closes its end.
///
/// The embedded script engine is the caller's business; the handler is just
/// an async function from URL to rendered bytes. The development worker and
/// the gateway's test stubs are both built on this listener.
pub struct RenderListener {
    listener: UnixListener,
    path: PathBuf,
}

impl RenderListener {
    /// Binds the listener, removing a stale socket file first.
    ///
    /// The gateway connects only after the worker is listening, so unlinking
    /// a leftover path from a previous run is always safe here.
    pub fn bind(path: &Path) -> Result<Self> {
        match std::fs::remove_file(path) {
            Ok(()) => {}
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
            Err(e) => {
                return Err(GatewayError::Connection(format!(
                    "failed to remove stale socket {}: {}",
                    path.display(),
                    e
                )))
            }
        }

        let listener = UnixListener::bind(path).map_err(|e| {
            GatewayError::Connection(format!("failed to bind {}: {}", path.display(), e))
        })?;

        Ok(Self {
            listener,
            path: path.to_path_buf(),
        })
    }

    /// The bound socket path.
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Accepts connections in a loop, spawning a task per connection.
    ///
    /// # Arguments
    /// * `handler` - Function rendering one URL into page bytes
    pub async fn run_with_handler<F, Fut>(self, handler: F) -> Result<()>
    where
        F: Fn(String) -> Fut + Send + Sync + 'static,
        Fut: std::future::Future<Output = Result<Bytes>> + Send + 'static,
    {
        let handler = Arc::new(handler);

        loop {
            let (stream, _) = self.listener.accept().await.map_err(|e| {
                GatewayError::Connection(format!("failed to accept connection: {}", e))
            })?;

            debug!(socket = %self.path.display(), "gateway connected");

            let handler = handler.clone();
            tokio::spawn(async move {
                if let Err(e) = serve_connection(stream, handler).await {
                    error!("worker connection error: {}", e);
                }
            });
        }
    }
}

/// Serves one gateway connection until EOF.
async fn serve_connection<F, Fut>(mut stream: UnixStream, handler: Arc<F>) -> Result<()>
where
    F: Fn(String) -> Fut + Send + Sync + 'static,
    Fut: std::future::Future<Output = Result<Bytes>> + Send + 'static,
{
    loop {
        let frame = match framing::read_frame(&mut stream).await {
            Ok(frame) => frame,
            Err(e) if e.is_eof() => {
                debug!("connection closed by gateway");
                return Ok(());
            }
            Err(e) => return Err(e),
        };

        let url = String::from_utf8(frame.to_vec())
            .map_err(|_| GatewayError::InvalidFrame("request frame is not valid UTF-8".into()))?;

        let body = handler(url).await?;
        framing::write_frame(&mut stream, &body).await?;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::transport::unix::UnixTransport;
    use std::sync::atomic::{AtomicU64, Ordering};

    fn temp_socket(tag: &str) -> PathBuf {
        std::env::temp_dir().join(format!("rendergate-test-{}-{}.sock", tag, std::process::id()))
    }

    #[tokio::test]
    async fn test_render_round_trip() {
        let path = temp_socket("round-trip");
        let listener = RenderListener::bind(&path).unwrap();

        tokio::spawn(async move {
            listener
                .run_with_handler(|url| async move {
                    Ok(Bytes::from(format!("<html>{}</html>", url)))
                })
                .await
        });

        let mut stream = UnixTransport::connect(&path).await.unwrap();
        let body = UnixTransport::render(&mut stream, "/page1").await.unwrap();
        assert_eq!(&body[..], b"<html>/page1</html>");

        let _ = std::fs::remove_file(&path);
    }

    #[tokio::test]
    async fn test_sequential_renders_on_one_connection() {
        let path = temp_socket("sequential");
        let listener = RenderListener::bind(&path).unwrap();
        let calls = Arc::new(AtomicU64::new(0));

        let worker_calls = calls.clone();
        tokio::spawn(async move {
            listener
                .run_with_handler(move |url| {
                    let calls = worker_calls.clone();
                    async move {
                        calls.fetch_add(1, Ordering::SeqCst);
                        Ok(Bytes::from(url))
                    }
                })
                .await
        });

        let mut stream = UnixTransport::connect(&path).await.unwrap();
        for i in 0..3 {
            let url = format!("/page{}", i);
            let body = UnixTransport::render(&mut stream, &url).await.unwrap();
            assert_eq!(&body[..], url.as_bytes());
        }
        assert_eq!(calls.load(Ordering::SeqCst), 3);

        let _ = std::fs::remove_file(&path);
    }

    #[tokio::test]
    async fn test_bind_replaces_stale_socket() {
        let path = temp_socket("stale");

        let first = RenderListener::bind(&path).unwrap();
        drop(first);

        // the socket file is left behind; a new bind must still succeed
        let second = RenderListener::bind(&path);
        assert!(second.is_ok());

        let _ = std::fs::remove_file(&path);
    }
}
