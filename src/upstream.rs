//! Origin-side fetch.
//!
//! One fresh TCP connection per request. The rewritten request carries
//! `Connection: close`, so the origin delimits its response by closing
//! the socket; the whole response is slurped into one buffer and
//! treated as opaque bytes.

use bytes::{Bytes, BytesMut};
use std::time::Duration;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpStream;
use tokio::time::timeout;

use crate::{ProxyError, MAX_RESPONSE_SIZE};

pub const CONNECT_TIMEOUT: Duration = Duration::from_secs(10);
pub const UPSTREAM_READ_TIMEOUT: Duration = Duration::from_secs(30);

/// Dial `host:port`, send the rewritten request, and read the response
/// until the origin closes.
///
/// The port travels as a string so the OS resolver sees exactly what
/// the client wrote; a malformed port surfaces as a dial error. Reads
/// stop at [`MAX_RESPONSE_SIZE`] bytes and the truncated response is
/// returned as-is.
pub async fn fetch(host: &str, port: &str, request: &[u8]) -> Result<Bytes, ProxyError> {
    let addr = format!("{host}:{port}");
    let mut stream = match timeout(CONNECT_TIMEOUT, TcpStream::connect(addr.as_str())).await {
        Err(_) => return Err(ProxyError::Timeout("upstream connect")),
        Ok(Err(e)) => return Err(ProxyError::Connect { addr, source: e }),
        Ok(Ok(stream)) => stream,
    };

    stream
        .write_all(request)
        .await
        .map_err(ProxyError::Upstream)?;

    let mut response = BytesMut::with_capacity(8192);
    loop {
        match timeout(UPSTREAM_READ_TIMEOUT, stream.read_buf(&mut response)).await {
            Err(_) => return Err(ProxyError::Timeout("upstream response")),
            Ok(Err(e)) => return Err(ProxyError::Upstream(e)),
            Ok(Ok(0)) => break,
            Ok(Ok(_)) => {
                if response.len() >= MAX_RESPONSE_SIZE {
                    response.truncate(MAX_RESPONSE_SIZE);
                    break;
                }
            }
        }
    }

    Ok(response.freeze())
}
