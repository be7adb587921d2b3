use std::path::PathBuf;
use std::time::Duration;

use rendergate_common::transport::RetryConfig;

/// Response cache configuration.
#[derive(Debug, Clone)]
pub struct CacheConfig {
    /// Whether rendered responses are cached at all.
    ///
    /// Default: false
    pub enabled: bool,
    /// Lifetime of a cache entry.
    ///
    /// Default: 400 seconds
    pub ttl: Duration,
    /// Entry cap; inserting at capacity evicts expired entries first, then
    /// the oldest entry.
    ///
    /// Default: 1024
    pub max_entries: usize,
    /// URLs eligible for caching. Only an exact match on the request URL
    /// (path plus query) is ever inserted.
    ///
    /// Default: empty
    pub cacheable: Vec<String>,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            ttl: Duration::from_secs(400),
            max_entries: 1024,
            cacheable: Vec::new(),
        }
    }
}

/// Gateway configuration.
///
/// The worker set is fixed at startup; there is no dynamic discovery.
#[derive(Debug, Clone)]
pub struct GatewayConfig {
    /// Socket path of each renderer worker, in rotation order.
    ///
    /// Default: `/tmp/rendergate-worker<i>.sock` for i in 0..4
    pub worker_sockets: Vec<PathBuf>,
    /// Response cache settings.
    pub cache: CacheConfig,
    /// Deadline for one render exchange. On expiry the request is answered
    /// with 504 and the worker connection is re-established.
    ///
    /// Default: 2000ms
    pub render_timeout: Duration,
    /// Capacity of the pending queue. Submissions that find every worker
    /// busy and the queue full are rejected with 503.
    ///
    /// Default: 1024
    pub pending_cap: usize,
    /// Delay before the first pending-drain pass.
    ///
    /// Default: 4000ms
    pub drain_initial_delay: Duration,
    /// Interval between pending-drain passes.
    ///
    /// Default: 250ms
    pub drain_interval: Duration,
    /// Backoff for worker connect and reconnect attempts.
    pub retry: RetryConfig,
}

impl GatewayConfig {
    /// Default socket paths for `count` workers.
    pub fn default_worker_sockets(count: usize) -> Vec<PathBuf> {
        (0..count)
            .map(|i| PathBuf::from(format!("/tmp/rendergate-worker{}.sock", i)))
            .collect()
    }
}

impl Default for GatewayConfig {
    fn default() -> Self {
        Self {
            worker_sockets: Self::default_worker_sockets(4),
            cache: CacheConfig::default(),
            render_timeout: Duration::from_millis(2000),
            pending_cap: 1024,
            drain_initial_delay: Duration::from_millis(4000),
            drain_interval: Duration::from_millis(250),
            retry: RetryConfig::default(),
        }
    }
}
