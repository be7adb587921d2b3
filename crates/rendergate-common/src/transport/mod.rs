//! Worker transport: framed messages over local-domain sockets.
//!
//! The gateway side lives in [`unix`] ([`UnixTransport`]), the worker side in
//! [`unix_server`] ([`RenderListener`]). Both share the length-prefixed frame
//! codec in [`framing`].

pub mod framing;
pub mod unix;
pub mod unix_server;

pub use framing::{read_frame, write_frame, MAX_FRAME_SIZE};
pub use unix::{RetryConfig, UnixTransport};
pub use unix_server::RenderListener;
