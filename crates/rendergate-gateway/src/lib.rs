//! Rendergate Gateway
//!
//! This crate provides the request routing and dispatch core of the
//! rendergate server-side-rendering gateway. The gateway terminates HTTP,
//! consults a URL-keyed response cache, and hands cache misses to a balancer
//! that distributes them over a fixed pool of renderer worker processes, each
//! of which renders one URL at a time.
//!
//! # Architecture
//!
//! ```text
//! client ──HTTP──▶ HttpServer ──▶ RenderRouter ──▶ CacheStore
//!                                      │ (miss)
//!                                      ▼
//!                                  Balancer ──▶ WorkerChannel ──socket──▶ worker
//!                                      │             │
//!                                  PendingQueue   oneshot reply back to the
//!                                  (all busy)     awaiting HTTP task
//! ```
//!
//! Key properties:
//!
//! 1. **Single-flight per worker**: a worker channel holds at most one
//!    in-flight render; its `current` slot gates submissions.
//! 2. **Skip-if-busy round-robin**: the balancer probes workers in cursor
//!    order and takes the first idle one; jobs that find every worker busy
//!    park on a bounded FIFO pending queue drained on a timer.
//! 3. **Bounded failure domains**: a worker transport error or render
//!    timeout fails only the in-flight request; the channel reconnects with
//!    backoff and rejoins the rotation.

pub mod balancer;
pub mod cache;
pub mod config;
pub mod http_server;
pub mod job;
pub mod round_robin;
pub mod router;
pub mod stats;
pub mod worker;

pub use balancer::Balancer;
pub use cache::{CacheStore, CacheableSet};
pub use config::{CacheConfig, GatewayConfig};
pub use http_server::HttpServer;
pub use job::{RenderError, RenderJob};
pub use router::RenderRouter;
pub use worker::WorkerChannel;
