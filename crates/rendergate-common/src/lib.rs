//! Rendergate Common Types and Transport
//!
//! This crate provides the shared infrastructure used by the rendergate
//! SSR gateway and its renderer workers:
//!
//! - **Error type**: [`GatewayError`] and the crate-wide [`Result`] alias
//! - **Transport layer**: length-prefixed framing over local-domain sockets,
//!   with the gateway-side connector and the worker-side listener
//!
//! # Wire Protocol
//!
//! Every message between the gateway and a worker is a 4-byte big-endian
//! length prefix followed by that many bytes. Per render transaction the
//! gateway writes one URL frame and reads back one rendered-HTML frame;
//! single-flight turn-taking on each connection keeps the two sides in step.

pub mod error;
pub mod transport;

pub use error::{GatewayError, Result};
