//! Low-level helpers shared by every message reader/writer: reading a
//! length-prefixed frame and writing a buffer out in one atomic call.

use bytes::BytesMut;
use tokio::io::{AsyncReadExt, AsyncWriteExt};

use crate::errors::{Error, FramingError};

use super::constants::MAX_MESSAGE_SIZE;

/// Read exactly `len` bytes, mapping a short read to [`FramingError::UnexpectedEof`].
pub async fn read_exact<S>(stream: &mut S, len: usize) -> Result<BytesMut, Error>
where
    S: tokio::io::AsyncRead + Unpin,
{
    let mut buf = BytesMut::zeroed(len);
    stream
        .read_exact(&mut buf)
        .await
        .map_err(|_| FramingError::UnexpectedEof)?;
    Ok(buf)
}

/// Read a post-startup message header (`type:u8 || length:u32_be`) and
/// return `(tag, declared_len)` where `declared_len` is the length field as
/// read off the wire (includes itself, excludes the type byte).
pub async fn read_message_header<S>(stream: &mut S) -> Result<(u8, i32), Error>
where
    S: tokio::io::AsyncRead + Unpin,
{
    let mut tag = [0u8; 1];
    stream
        .read_exact(&mut tag)
        .await
        .map_err(|_| FramingError::UnexpectedEof)?;
    let len = stream
        .read_i32()
        .await
        .map_err(|_| FramingError::UnexpectedEof)?;
    if len < 4 {
        return Err(FramingError::LengthTooSmall(len).into());
    }
    if len > MAX_MESSAGE_SIZE {
        return Err(FramingError::LengthTooSmall(len).into());
    }
    Ok((tag[0], len))
}

/// Write a complete, pre-serialized frame in a single call so two
/// interleaved writers on the same socket can never split a frame.
pub async fn write_all<S>(stream: &mut S, buf: &[u8]) -> Result<(), Error>
where
    S: tokio::io::AsyncWrite + Unpin,
{
    stream.write_all(buf).await?;
    Ok(())
}
