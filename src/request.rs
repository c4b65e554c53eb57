//! Request validation and rewriting.
//!
//! Takes the raw request head a client sent to the proxy and produces
//! the origin-form HTTP/1.0 request that goes upstream, plus the
//! origin address and the cache key (the untouched absolute URI).

use bytes::{Bytes, BytesMut};

use crate::reader::head_lines;
use crate::{
    ProxyError, MAX_HOST_LEN, MAX_PORT_LEN, MAX_REQUEST_SIZE, MAX_REQUEST_TOKENS, MAX_REST_LEN,
    MAX_TOKEN_LEN,
};

/// Fixed User-Agent presented to origins regardless of what the client sent.
pub const USER_AGENT: &str =
    "Mozilla/5.0 (X11; Linux x86_64; rv:45.0) Gecko/20100101 Firefox/45.0";

/// A client request rewritten for the origin.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ForwardRequest {
    /// Complete request bytes to write upstream, blank line included.
    pub head: Bytes,
    /// Origin host from the request URI.
    pub host: String,
    /// Origin port as a decimal string, `"80"` when the URI named none.
    pub port: String,
    /// The original absolute-form URI, used verbatim as the cache key.
    pub uri: String,
}

/// Host, port, and origin-form remainder of an absolute URI.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UriParts {
    pub host: String,
    /// Decimal digits only; empty when the URI named no port.
    pub port: String,
    /// Path-plus-query, `"/"` when the URI ended at the authority.
    pub rest: String,
}

/// Split a CR/LF-terminated line into whitespace-separated tokens.
///
/// At most [`MAX_REQUEST_TOKENS`] tokens, each shorter than
/// [`MAX_TOKEN_LEN`] - 1 bytes; anything longer fails the request
/// rather than truncating.
pub fn tokenize(line: &[u8]) -> Result<Vec<String>, ProxyError> {
    let mut tokens = Vec::new();
    let mut i = 0;
    loop {
        while i < line.len() && (line[i] == b' ' || line[i] == b'\t') {
            i += 1;
        }
        if i >= line.len() || line[i] == b'\r' || line[i] == b'\n' {
            break;
        }
        if tokens.len() == MAX_REQUEST_TOKENS {
            return Err(ProxyError::TooManyTokens);
        }
        let start = i;
        while i < line.len() && !matches!(line[i], b' ' | b'\t' | b'\r' | b'\n') {
            i += 1;
            if i - start >= MAX_TOKEN_LEN - 1 {
                return Err(ProxyError::TokenTooLong);
            }
        }
        tokens.push(String::from_utf8_lossy(&line[start..i]).into_owned());
    }
    Ok(tokens)
}

/// Decompose an absolute-form URI into host, optional port, and
/// origin-form remainder.
///
/// The scheme is not inspected; everything up to the first `//` is
/// skipped, which is what origin-form rewriting needs.
pub fn parse_uri(uri: &str) -> Result<UriParts, ProxyError> {
    let bytes = uri.as_bytes();
    let Some(sep) = uri.find("//") else {
        return Err(ProxyError::NotAbsolute(uri.to_owned()));
    };

    let host_start = sep + 2;
    let mut i = host_start;
    while i < bytes.len() && bytes[i] != b':' && bytes[i] != b'/' {
        i += 1;
        if i - host_start == MAX_HOST_LEN {
            return Err(ProxyError::HostTooLong);
        }
    }
    let host = &uri[host_start..i];

    let mut port = "";
    if i < bytes.len() && bytes[i] == b':' {
        i += 1;
        let port_start = i;
        while i < bytes.len() && bytes[i].is_ascii_digit() {
            i += 1;
            if i - port_start == MAX_PORT_LEN {
                return Err(ProxyError::PortTooLong);
            }
        }
        port = &uri[port_start..i];
    }

    let rest = &uri[i..];
    if rest.len() >= MAX_REST_LEN {
        return Err(ProxyError::PathTooLong);
    }
    let rest = if rest.is_empty() { "/" } else { rest };

    Ok(UriParts {
        host: host.to_owned(),
        port: port.to_owned(),
        rest: rest.to_owned(),
    })
}

/// True when `line` starts with the header field `name` (matched
/// case-insensitively) immediately followed by a colon.
///
/// Matching on the field name alone keeps headers whose *values*
/// happen to contain `Connection:` or similar from being swallowed.
fn header_name_is(line: &[u8], name: &str) -> bool {
    line.len() > name.len()
        && line[name.len()] == b':'
        && line[..name.len()].eq_ignore_ascii_case(name.as_bytes())
}

/// Validate one client request head and build the upstream request.
///
/// The emitted bytes are, in order: the origin-form request line, the
/// client's own `Host` line (or a synthesized one when it sent none),
/// the fixed `User-Agent`/`Connection`/`Proxy-Connection` trio, every
/// other client header verbatim, and the terminating blank line.
pub fn rewrite_request(head: &[u8]) -> Result<ForwardRequest, ProxyError> {
    let mut lines = head_lines(head);
    let first = lines.next().ok_or(ProxyError::TruncatedRequest)?;

    let tokens = tokenize(first)?;
    if tokens.len() < 2 {
        return Err(ProxyError::ShortRequestLine);
    }
    if tokens[0] != "GET" {
        return Err(ProxyError::UnsupportedMethod(tokens[0].clone()));
    }
    let uri = tokens[1].clone();
    let parts = parse_uri(&uri)?;
    let port = if parts.port.is_empty() {
        "80".to_owned()
    } else {
        parts.port
    };

    // Request line and Host stay at the front; the fixed trio and the
    // remaining pass-through headers collect behind them.
    let mut front = BytesMut::with_capacity(MAX_REQUEST_SIZE);
    front.extend_from_slice(b"GET ");
    front.extend_from_slice(parts.rest.as_bytes());
    front.extend_from_slice(b" HTTP/1.0\r\n");

    let mut back = BytesMut::with_capacity(256);
    back.extend_from_slice(b"User-Agent: ");
    back.extend_from_slice(USER_AGENT.as_bytes());
    back.extend_from_slice(b"\r\nConnection: close\r\nProxy-Connection: close\r\n");

    let mut host_seen = false;
    let mut complete = false;
    for line in lines {
        if line == b"\r\n" {
            complete = true;
            if !host_seen {
                front.extend_from_slice(b"Host: ");
                front.extend_from_slice(parts.host.as_bytes());
                front.extend_from_slice(b"\r\n");
            }
            front.extend_from_slice(&back);
            front.extend_from_slice(b"\r\n");
            break;
        }
        if header_name_is(line, "User-Agent")
            || header_name_is(line, "Connection")
            || header_name_is(line, "Proxy-Connection")
        {
            continue;
        }
        if header_name_is(line, "Host") {
            host_seen = true;
            front.extend_from_slice(line);
        } else {
            back.extend_from_slice(line);
        }
    }
    if !complete {
        return Err(ProxyError::TruncatedRequest);
    }

    Ok(ForwardRequest {
        head: front.freeze(),
        host: parts.host,
        port,
        uri,
    })
}
