use std::sync::atomic::Ordering;
use std::sync::Arc;

use axum::body::Body;
use axum::http::{header, StatusCode};
use axum::response::Response;
use bytes::Bytes;
use futures::stream;
use tokio::sync::Mutex;
use tracing::{debug, warn};

use rendergate_common::GatewayError;

use crate::balancer::Balancer;
use crate::cache::{CacheStore, CacheableSet};
use crate::config::GatewayConfig;
use crate::job::{RenderError, RenderJob};
use crate::stats::{StatusSnapshot, WorkerSnapshot};

const TEXT_HTML: &str = "text/html";
const FAVICON_CONTENT_TYPE: &str = "image/vnd.microsoft.icon";

/// The dispatch pipeline behind the HTTP server.
///
/// Per request: favicon bypass, then cache lookup, then a render job through
/// the balancer. The cacheability gate (URL in the cacheable set AND caching
/// enabled) lives here, not in the store.
pub struct RenderRouter {
    balancer: Arc<Balancer>,
    cache: Mutex<CacheStore>,
    cacheable: CacheableSet,
    cache_enabled: bool,
}

impl RenderRouter {
    pub fn new(balancer: Arc<Balancer>, config: &GatewayConfig) -> Self {
        Self {
            balancer,
            cache: Mutex::new(CacheStore::new(config.cache.ttl, config.cache.max_entries)),
            cacheable: CacheableSet::from_urls(config.cache.cacheable.iter().cloned()),
            cache_enabled: config.cache.enabled,
        }
    }

    /// Produces the response for one request URL (path plus query).
    pub async fn handle(&self, url: &str) -> Response {
        // favicon requests never reach the render pool
        if url == "/favicon.ico" {
            return render_response(StatusCode::OK, FAVICON_CONTENT_TYPE, Bytes::from_static(b" "));
        }

        if self.cache_enabled {
            if let Some((body, content_type)) = self.cache.lock().await.get(url) {
                debug!(url, "cache hit");
                return render_response(StatusCode::OK, &content_type, body);
            }
        }

        let (job, reply) = RenderJob::new(url);
        let id = job.id;
        match self.balancer.dispatch(job).await {
            Ok(()) => {}
            Err(GatewayError::QueueFull) => {
                warn!(url, "render queue full, rejecting");
                return render_response(
                    StatusCode::SERVICE_UNAVAILABLE,
                    "text/plain",
                    Bytes::from_static(b"render queue is full"),
                );
            }
            Err(e) => {
                warn!(url, "dispatch failed: {}", e);
                return render_response(
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "text/plain",
                    Bytes::from_static(b"dispatch failed"),
                );
            }
        }

        match reply.await {
            Ok(Ok(body)) => {
                if self.cache_enabled && self.cacheable.contains(url) {
                    self.cache.lock().await.put(url, body.clone(), TEXT_HTML);
                    debug!(url, "response cached");
                }
                render_response(StatusCode::OK, TEXT_HTML, body)
            }
            Ok(Err(RenderError::Timeout(ms))) => {
                warn!(url, id, timeout_ms = ms, "render timed out");
                render_response(
                    StatusCode::GATEWAY_TIMEOUT,
                    "text/plain",
                    Bytes::from_static(b"render timed out"),
                )
            }
            Ok(Err(RenderError::WorkerLost(reason))) => {
                warn!(url, id, "worker lost: {}", reason);
                render_response(
                    StatusCode::BAD_GATEWAY,
                    "text/plain",
                    Bytes::from_static(b"renderer unavailable"),
                )
            }
            Err(_) => {
                // the job was dropped without resolution; should not happen
                warn!(url, id, "render reply channel closed");
                render_response(
                    StatusCode::BAD_GATEWAY,
                    "text/plain",
                    Bytes::from_static(b"renderer unavailable"),
                )
            }
        }
    }

    /// Snapshot for the status endpoint.
    pub async fn status(&self) -> StatusSnapshot {
        let mut workers = Vec::new();
        for worker in self.balancer.workers() {
            let stats = worker.stats();
            workers.push(WorkerSnapshot {
                index: worker.index(),
                socket: worker.socket_path().display().to_string(),
                dispatched: stats.dispatched.load(Ordering::Relaxed),
                completed: stats.completed.load(Ordering::Relaxed),
                busy: worker.is_working().await,
            });
        }
        StatusSnapshot {
            workers,
            pending: self.balancer.pending_len().await,
            cache_enabled: self.cache_enabled,
            cache_entries: self.cache.lock().await.len(),
        }
    }

    /// Test hook mirroring the store's `has`.
    pub async fn cache_has(&self, url: &str) -> bool {
        self.cache.lock().await.has(url)
    }
}

/// Builds a response whose body streams as one chunk.
///
/// hyper frames unknown-length bodies with `Transfer-Encoding: chunked`, so
/// clients see exactly one data chunk and the zero terminator. The explicit
/// `Connection: close` keeps the one-request-per-connection contract honest.
fn render_response(status: StatusCode, content_type: &str, body: Bytes) -> Response {
    let body_stream = stream::once(async move { Ok::<_, std::convert::Infallible>(body) });
    Response::builder()
        .status(status)
        .header(header::CONTENT_TYPE, content_type)
        .header(header::CONNECTION, "close")
        .body(Body::from_stream(body_stream))
        .unwrap()
}

#[cfg(test)]
mod tests {
    use super::*;
    use http_body_util::BodyExt;
    use rendergate_common::transport::RenderListener;
    use std::path::PathBuf;
    use std::time::Duration;

    fn temp_socket(tag: &str) -> PathBuf {
        std::env::temp_dir().join(format!(
            "rendergate-router-test-{}-{}.sock",
            tag,
            std::process::id()
        ))
    }

    fn spawn_stub(path: &PathBuf, reply: &'static str) {
        let listener = RenderListener::bind(path).unwrap();
        tokio::spawn(async move {
            listener
                .run_with_handler(move |_url| async move { Ok(Bytes::from_static(reply.as_bytes())) })
                .await
        });
    }

    async fn body_bytes(response: Response) -> Bytes {
        response.into_body().collect().await.unwrap().to_bytes()
    }

    fn router_config(socket: PathBuf) -> GatewayConfig {
        GatewayConfig {
            worker_sockets: vec![socket],
            drain_initial_delay: Duration::from_millis(50),
            ..GatewayConfig::default()
        }
    }

    #[tokio::test]
    async fn test_favicon_bypasses_the_pool() {
        let path = temp_socket("favicon");
        spawn_stub(&path, "<html/>");

        let config = router_config(path.clone());
        let balancer = Balancer::start(&config);
        balancer.wait_ready().await.unwrap();
        let router = RenderRouter::new(balancer.clone(), &config);

        let response = router.handle("/favicon.ico").await;
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(
            response.headers()[header::CONTENT_TYPE],
            "image/vnd.microsoft.icon"
        );
        assert_eq!(&body_bytes(response).await[..], b" ");

        // the worker never saw a dispatch
        let dispatched = balancer.workers()[0]
            .stats()
            .dispatched
            .load(Ordering::Relaxed);
        assert_eq!(dispatched, 0);

        let _ = std::fs::remove_file(&path);
    }

    #[tokio::test]
    async fn test_cacheability_gate() {
        let path = temp_socket("gate");
        spawn_stub(&path, "<html>A</html>");

        let mut config = router_config(path.clone());
        config.cache.enabled = true;
        config.cache.cacheable = vec!["/p".into()];

        let balancer = Balancer::start(&config);
        balancer.wait_ready().await.unwrap();
        let router = RenderRouter::new(balancer, &config);

        // a cacheable URL lands in the store
        let response = router.handle("/p").await;
        assert_eq!(response.status(), StatusCode::OK);
        assert!(router.cache_has("/p").await);

        // a non-cacheable URL does not, even with caching enabled
        let response = router.handle("/other").await;
        assert_eq!(response.status(), StatusCode::OK);
        assert!(!router.cache_has("/other").await);

        let _ = std::fs::remove_file(&path);
    }

    #[tokio::test]
    async fn test_cache_disabled_never_inserts() {
        let path = temp_socket("disabled");
        spawn_stub(&path, "<html>A</html>");

        let mut config = router_config(path.clone());
        config.cache.cacheable = vec!["/p".into()];
        // cache.enabled stays false

        let balancer = Balancer::start(&config);
        balancer.wait_ready().await.unwrap();
        let router = RenderRouter::new(balancer, &config);

        router.handle("/p").await;
        assert!(!router.cache_has("/p").await);

        let _ = std::fs::remove_file(&path);
    }
}
