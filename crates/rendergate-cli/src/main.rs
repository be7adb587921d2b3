//! # Rendergate CLI Entry Point
//!
//! Main binary for the rendergate SSR gateway.
//!
//! ## Usage
//!
//! ```bash
//! # Start the gateway in front of four workers
//! rendergate gateway -b 0.0.0.0:8000 \
//!   -w /tmp/rendergate-worker0.sock \
//!   -w /tmp/rendergate-worker1.sock \
//!   -w /tmp/rendergate-worker2.sock \
//!   -w /tmp/rendergate-worker3.sock \
//!   --cache --cacheable /page1 --cacheable /page2
//!
//! # Start a development worker (static renderer, no script engine)
//! rendergate worker -s /tmp/rendergate-worker0.sock
//! ```

use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;
use argh::FromArgs;
use bytes::Bytes;

use rendergate_common::transport::RenderListener;
use rendergate_gateway::{Balancer, GatewayConfig, HttpServer, RenderRouter};

/// Main CLI structure parsed from command-line arguments.
#[derive(FromArgs)]
/// Rendergate - server-side rendering gateway
struct Cli {
    #[argh(subcommand)]
    command: Commands,
}

#[derive(FromArgs)]
#[argh(subcommand)]
enum Commands {
    Gateway(GatewayArgs),
    Worker(WorkerArgs),
}

/// Arguments for starting the gateway.
///
/// The gateway terminates HTTP, consults the response cache, and dispatches
/// cache misses over the fixed worker pool. The worker set is read once at
/// startup; there is no dynamic discovery.
#[derive(FromArgs)]
#[argh(subcommand, name = "gateway")]
/// start the SSR gateway
struct GatewayArgs {
    /// address to bind the HTTP server to
    ///
    /// Defaults to "0.0.0.0:8000".
    #[argh(option, short = 'b', default = "\"0.0.0.0:8000\".into()")]
    bind: String,

    /// socket path of a renderer worker
    ///
    /// Can be specified multiple times, one per worker, in rotation order.
    /// Defaults to /tmp/rendergate-worker<0..4>.sock when omitted.
    #[argh(option, short = 'w', long = "worker")]
    workers: Vec<PathBuf>,

    /// enable the response cache
    ///
    /// Off by default; without this flag rendered pages are never cached,
    /// regardless of the cacheable URL list.
    #[argh(switch, long = "cache")]
    cache: bool,

    /// cache entry lifetime in seconds
    ///
    /// Defaults to 400 seconds.
    #[argh(option, long = "cache-ttl-secs", default = "400")]
    cache_ttl_secs: u64,

    /// URL eligible for caching (exact match on path plus query)
    ///
    /// Can be specified multiple times. Only listed URLs are ever inserted
    /// into the cache.
    #[argh(option, long = "cacheable")]
    cacheable: Vec<String>,

    /// per-render deadline in milliseconds
    ///
    /// A worker that does not reply in time costs the request a 504 and the
    /// connection is re-established. Defaults to 2000ms.
    #[argh(option, long = "render-timeout-ms", default = "2000")]
    render_timeout_ms: u64,

    /// pending queue capacity
    ///
    /// Requests that find every worker busy park here; past this bound they
    /// are rejected with 503. Defaults to 1024.
    #[argh(option, long = "pending-cap", default = "1024")]
    pending_cap: usize,
}

/// Arguments for starting a development worker.
///
/// Serves the worker half of the wire protocol with a static renderer that
/// wraps the requested URL in an HTML shell. Useful for exercising the
/// gateway without a real script engine behind it.
#[derive(FromArgs)]
#[argh(subcommand, name = "worker")]
/// start a development renderer worker
struct WorkerArgs {
    /// socket path to listen on
    #[argh(option, short = 's')]
    socket: PathBuf,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli: Cli = argh::from_env();

    // Set default log level to INFO, but allow RUST_LOG env var to override
    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info"));
    tracing_subscriber::fmt().with_env_filter(env_filter).init();

    match cli.command {
        Commands::Gateway(args) => run_gateway(args).await,
        Commands::Worker(args) => run_worker(args).await,
    }
}

async fn run_gateway(args: GatewayArgs) -> Result<()> {
    let worker_sockets = if args.workers.is_empty() {
        GatewayConfig::default_worker_sockets(4)
    } else {
        args.workers
    };

    tracing::info!("starting gateway with {} workers", worker_sockets.len());

    let config = GatewayConfig {
        worker_sockets,
        cache: rendergate_gateway::CacheConfig {
            enabled: args.cache,
            ttl: Duration::from_secs(args.cache_ttl_secs),
            cacheable: args.cacheable,
            ..Default::default()
        },
        render_timeout: Duration::from_millis(args.render_timeout_ms),
        pending_cap: args.pending_cap,
        ..GatewayConfig::default()
    };

    if config.cache.enabled {
        tracing::info!(
            ttl_secs = args.cache_ttl_secs,
            urls = ?config.cache.cacheable,
            "response cache enabled"
        );
    }

    let balancer = Balancer::start(&config);
    if let Err(e) = balancer.wait_ready().await {
        // channels keep retrying; late workers still join the rotation
        tracing::warn!("not all workers ready at startup: {}", e);
    }

    let router = Arc::new(RenderRouter::new(balancer, &config));
    let addr: SocketAddr = args
        .bind
        .parse()
        .map_err(|e| anyhow::anyhow!("Invalid bind address {}: {}", args.bind, e))?;

    HttpServer::new(router).run(addr).await?;
    Ok(())
}

async fn run_worker(args: WorkerArgs) -> Result<()> {
    tracing::info!(socket = %args.socket.display(), "starting development worker");

    let listener = RenderListener::bind(&args.socket)?;
    listener
        .run_with_handler(|url| async move {
            Ok(Bytes::from(format!(
                "<html><head></head><body><h1>{}</h1></body></html>",
                url
            )))
        })
        .await?;

    Ok(())
}
