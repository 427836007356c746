//! Length-prefixed frame I/O shared by the inbound listener and each
//! flow worker's outbound agent connection.
//!
//! Every frame on either socket is a 4-byte big-endian unsigned length
//! followed by exactly that many payload bytes. `read_frame` reads the
//! prefix then loops on the underlying socket until the full payload has
//! accumulated — a single `read` call is not guaranteed to return the
//! whole payload on a stream socket, which the original agent-side
//! implementation this service talks to gets wrong (see DESIGN.md).

use thiserror::Error;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};

/// Frames above this size are rejected outright — a defensive bound against
/// a corrupt or hostile length prefix causing an unbounded allocation.
pub const MAX_FRAME_LEN: usize = 1 << 20;

#[derive(Debug, Error)]
pub enum FramingError {
    #[error("frame length {0} exceeds maximum of {MAX_FRAME_LEN}")]
    TooLarge(u32),
    #[error("connection closed")]
    Eof,
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

/// Reads one length-prefixed frame from `stream`. Returns `Ok(None)` if the
/// peer closed the connection cleanly before sending a new length prefix
/// (i.e. at a frame boundary); any other short read is a [`FramingError`].
pub async fn read_frame<R: AsyncRead + Unpin>(stream: &mut R) -> Result<Option<Vec<u8>>, FramingError> {
    let mut len_buf = [0u8; 4];
    match read_exact_or_eof(stream, &mut len_buf).await? {
        false => return Ok(None),
        true => {}
    }
    let len = u32::from_be_bytes(len_buf);
    if len as usize > MAX_FRAME_LEN {
        return Err(FramingError::TooLarge(len));
    }

    let mut payload = vec![0u8; len as usize];
    stream.read_exact(&mut payload).await.map_err(|e| {
        if e.kind() == std::io::ErrorKind::UnexpectedEof {
            FramingError::Eof
        } else {
            FramingError::Io(e)
        }
    })?;
    Ok(Some(payload))
}

/// Like [`tokio::io::AsyncReadExt::read_exact`], but reports a clean EOF at
/// the very first byte as "no frame" rather than an error, so callers can
/// distinguish "peer hung up between frames" from "peer hung up mid-frame".
async fn read_exact_or_eof<R: AsyncRead + Unpin>(stream: &mut R, buf: &mut [u8]) -> Result<bool, FramingError> {
    let mut filled = 0;
    while filled < buf.len() {
        let n = stream.read(&mut buf[filled..]).await?;
        if n == 0 {
            return if filled == 0 { Ok(false) } else { Err(FramingError::Eof) };
        }
        filled += n;
    }
    Ok(true)
}

/// Writes one length-prefixed frame to `stream`.
pub async fn write_frame<W: AsyncWrite + Unpin>(stream: &mut W, payload: &[u8]) -> Result<(), FramingError> {
    let len = payload.len() as u32;
    stream.write_all(&len.to_be_bytes()).await?;
    stream.write_all(payload).await?;
    stream.flush().await?;
    Ok(())
}
