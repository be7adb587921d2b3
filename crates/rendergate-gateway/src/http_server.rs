//! HTTP front-end of the gateway.
//!
//! Terminates client connections and feeds every request URL through the
//! [`RenderRouter`]. Two operational routes sit next to the catch-all render
//! route: `/__health` for liveness probes and `/__status` for a JSON snapshot
//! of worker and cache state.

use std::net::SocketAddr;
use std::sync::Arc;

use axum::extract::{Request, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::get;
use tokio::net::TcpListener;
use tower_http::trace::TraceLayer;
use tracing::info;

use rendergate_common::{GatewayError, Result};

use crate::router::RenderRouter;

/// HTTP server for the gateway.
pub struct HttpServer {
    router: Arc<RenderRouter>,
}

impl HttpServer {
    pub fn new(router: Arc<RenderRouter>) -> Self {
        Self { router }
    }

    /// Binds `addr` and serves until the process exits.
    ///
    /// A bind failure is fatal and propagates to the caller.
    pub async fn run(self, addr: SocketAddr) -> Result<()> {
        let listener = TcpListener::bind(addr)
            .await
            .map_err(|e| GatewayError::Connection(format!("failed to bind to {}: {}", addr, e)))?;
        self.serve(listener).await
    }

    /// Serves on an already-bound listener.
    ///
    /// Split from [`run`](Self::run) so tests can bind port 0 and learn the
    /// address first.
    pub async fn serve(self, listener: TcpListener) -> Result<()> {
        let app = axum::Router::new()
            .route("/__health", get(health_check))
            .route("/__status", get(handle_status))
            .fallback(handle_render)
            .layer(TraceLayer::new_for_http())
            .with_state(self.router);

        info!(
            "gateway listening on {}",
            listener
                .local_addr()
                .map_err(|e| GatewayError::Connection(format!("failed to get local addr: {}", e)))?
        );

        axum::serve(listener, app)
            .await
            .map_err(|e| GatewayError::Connection(format!("server error: {}", e)))?;

        Ok(())
    }
}

/// Catch-all render handler; the full path-plus-query string is the render
/// URL and the cache key.
async fn handle_render(State(router): State<Arc<RenderRouter>>, request: Request) -> Response {
    let url = request
        .uri()
        .path_and_query()
        .map(|pq| pq.as_str().to_owned())
        .unwrap_or_else(|| request.uri().path().to_owned());
    router.handle(&url).await
}

async fn handle_status(State(router): State<Arc<RenderRouter>>) -> impl IntoResponse {
    axum::Json(router.status().await)
}

async fn health_check() -> impl IntoResponse {
    (StatusCode::OK, "OK")
}
