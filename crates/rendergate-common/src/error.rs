use thiserror::Error;

#[derive(Error, Debug)]
pub enum GatewayError {
    #[error("Connection error: {0}")]
    Connection(String),

    #[error("Timed out after {0}ms")]
    Timeout(u64),

    #[error("Invalid frame: {0}")]
    InvalidFrame(String),

    #[error("Render queue is full")]
    QueueFull,

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl GatewayError {
    /// Maps an I/O failure to the variant callers report on: dropped or
    /// unreachable peers become `Connection`, anything else stays `Io` with
    /// its original kind intact.
    pub fn from_io(err: std::io::Error, context: &str) -> Self {
        use std::io::ErrorKind;
        match err.kind() {
            ErrorKind::ConnectionReset
            | ErrorKind::ConnectionAborted
            | ErrorKind::ConnectionRefused
            | ErrorKind::BrokenPipe
            | ErrorKind::NotConnected => {
                GatewayError::Connection(format!("{context}: connection lost ({err})"))
            }
            _ => GatewayError::Io(err),
        }
    }

    /// Whether the error indicates a peer that closed its end cleanly.
    pub fn is_eof(&self) -> bool {
        matches!(self, GatewayError::Io(e) if e.kind() == std::io::ErrorKind::UnexpectedEof)
    }
}

pub type Result<T> = std::result::Result<T, GatewayError>;
