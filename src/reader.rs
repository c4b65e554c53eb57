//! Client request-head intake.
//!
//! The proxy never reads a request body, so the per-connection read
//! loop only has to accumulate bytes until the blank line that ends
//! the header block, then hand the head to the rewriter as in-memory
//! lines.

use bytes::BytesMut;
use std::time::Duration;
use tokio::io::{AsyncRead, AsyncReadExt};
use tokio::time::timeout;

use crate::{ProxyError, MAX_REQUEST_SIZE};

/// How long a single client read may stall before the request is dropped.
pub const CLIENT_READ_TIMEOUT: Duration = Duration::from_secs(30);

/// Read from `stream` into `buf` until the buffer holds a complete
/// request head (terminated by a blank `\r\n` line).
///
/// Fails if the client closes before the blank line, if the head grows
/// past [`MAX_REQUEST_SIZE`], or on a read error or timeout. Bytes
/// past the blank line (there should be none for GET) are left in the
/// buffer and ignored downstream.
pub async fn read_request_head<R>(stream: &mut R, buf: &mut BytesMut) -> Result<(), ProxyError>
where
    R: AsyncRead + Unpin,
{
    loop {
        if head_end(buf).is_some() {
            return Ok(());
        }
        if buf.len() >= MAX_REQUEST_SIZE {
            return Err(ProxyError::RequestTooLarge);
        }
        match timeout(CLIENT_READ_TIMEOUT, stream.read_buf(buf)).await {
            Err(_) => return Err(ProxyError::Timeout("client request")),
            Ok(Err(e)) => return Err(ProxyError::Client(e)),
            Ok(Ok(0)) => return Err(ProxyError::TruncatedRequest),
            Ok(Ok(_)) => {}
        }
    }
}

/// Offset one past the `\r\n\r\n` terminator, if the head is complete.
pub fn head_end(buf: &[u8]) -> Option<usize> {
    buf.windows(4).position(|w| w == b"\r\n\r\n").map(|p| p + 4)
}

/// Iterate the head as lines with their terminators attached, the
/// shape the rewriter consumes.
pub fn head_lines(head: &[u8]) -> impl Iterator<Item = &[u8]> {
    head.split_inclusive(|&b| b == b'\n')
}
