use bytes::Bytes;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};

use crate::error::{GatewayError, Result};

/// Maximum frame size (16 MiB).
///
/// A rendered page is at most a few hundred kilobytes; anything near this
/// limit means the two sides have lost frame synchronization.
pub const MAX_FRAME_SIZE: usize = 16 * 1024 * 1024;

/// Writes one frame: a 4-byte big-endian length prefix followed by the data.
///
/// Wire format: `[4-byte length as u32 big-endian] + [data]`
pub async fn write_frame<W>(stream: &mut W, data: &[u8]) -> Result<()>
where
    W: AsyncWrite + Unpin,
{
    let len = data.len() as u32;

    stream
        .write_all(&len.to_be_bytes())
        .await
        .map_err(|e| GatewayError::from_io(e, "writing frame length"))?;

    stream
        .write_all(data)
        .await
        .map_err(|e| GatewayError::from_io(e, "writing frame body"))?;

    stream
        .flush()
        .await
        .map_err(|e| GatewayError::from_io(e, "flushing frame"))?;

    Ok(())
}

/// Reads one frame: a 4-byte big-endian length prefix followed by the data.
///
/// # Errors
///
/// Returns an error if:
/// - Reading the length prefix or body fails
/// - The declared length exceeds [`MAX_FRAME_SIZE`]
pub async fn read_frame<R>(stream: &mut R) -> Result<Bytes>
where
    R: AsyncRead + Unpin,
{
    let mut len_buf = [0u8; 4];
    stream
        .read_exact(&mut len_buf)
        .await
        .map_err(|e| GatewayError::from_io(e, "reading frame length"))?;

    let len = u32::from_be_bytes(len_buf) as usize;

    // Reject before allocating; an oversized length means a desynchronized
    // or hostile peer.
    if len > MAX_FRAME_SIZE {
        return Err(GatewayError::InvalidFrame(format!(
            "frame of {} bytes exceeds the {} byte limit",
            len, MAX_FRAME_SIZE
        )));
    }

    let mut buf = vec![0u8; len];
    stream
        .read_exact(&mut buf)
        .await
        .map_err(|e| GatewayError::from_io(e, "reading frame body"))?;

    Ok(Bytes::from(buf))
}
