//! Packrat - a concurrent caching HTTP/1.0 forward proxy.
//!
//! Clients speak to the proxy with absolute-form request URIs
//! (`GET http://host:port/path HTTP/1.0`). The proxy rewrites each
//! request into origin form, fetches the response over a fresh TCP
//! connection, relays it byte-for-byte, and keeps small responses in a
//! fixed-pool in-memory cache keyed by the exact request-URI bytes so
//! repeat requests never touch the origin.

use std::io;
use thiserror::Error;

pub mod cache;
pub mod reader;
pub mod request;
pub mod server;
pub mod upstream;

pub use cache::{CacheHit, ProxyCache};
pub use reader::read_request_head;
pub use request::{parse_uri, rewrite_request, tokenize, ForwardRequest, UriParts, USER_AGENT};
pub use server::{handle_client, run};
pub use upstream::fetch;

/// Number of slots in the fixed cache pool.
pub const CACHE_SLOTS: usize = 21;
/// Total byte budget across all cached payloads.
pub const MAX_CACHE_BYTES: usize = 1_049_000;
/// Largest response the cache will accept.
pub const MAX_OBJECT_SIZE: usize = 102_400;
/// Upstream read cap; longer responses are truncated here.
pub const MAX_RESPONSE_SIZE: usize = 512_000;
/// Cache key bound, counting a terminator byte.
pub const MAX_URI_LEN: usize = 256;
/// Client request head cap (request line plus all headers).
pub const MAX_REQUEST_SIZE: usize = 8192;
/// Request lines carry at most this many tokens.
pub const MAX_REQUEST_TOKENS: usize = 4;
/// Token buffer size; tokens must stay below this, terminator included.
pub const MAX_TOKEN_LEN: usize = 100;
/// Host buffer size (host names up to 49 bytes).
pub const MAX_HOST_LEN: usize = 50;
/// Port buffer size (up to 5 decimal digits).
pub const MAX_PORT_LEN: usize = 6;
/// Origin-form path buffer size (path-plus-query up to 199 bytes).
pub const MAX_REST_LEN: usize = 200;

/// Everything that can abort a single proxied request.
///
/// None of these are fatal to the process; the worker logs the error
/// and closes the client connection.
#[derive(Debug, Error)]
pub enum ProxyError {
    #[error("request line has fewer than two tokens")]
    ShortRequestLine,
    #[error("method {0:?} not supported, only GET")]
    UnsupportedMethod(String),
    #[error("token exceeds {} bytes", MAX_TOKEN_LEN - 2)]
    TokenTooLong,
    #[error("more than {} tokens in request line", MAX_REQUEST_TOKENS)]
    TooManyTokens,
    #[error("host exceeds {} bytes", MAX_HOST_LEN - 1)]
    HostTooLong,
    #[error("port exceeds {} digits", MAX_PORT_LEN - 1)]
    PortTooLong,
    #[error("path exceeds {} bytes", MAX_REST_LEN - 1)]
    PathTooLong,
    #[error("request uri {0:?} is not absolute")]
    NotAbsolute(String),
    #[error("request ended before the blank line")]
    TruncatedRequest,
    #[error("request head exceeds {} bytes", MAX_REQUEST_SIZE)]
    RequestTooLarge,
    #[error("timed out waiting for {0}")]
    Timeout(&'static str),
    #[error("failed to connect to {addr}: {source}")]
    Connect {
        addr: String,
        #[source]
        source: io::Error,
    },
    #[error("upstream i/o failed: {0}")]
    Upstream(#[source] io::Error),
    #[error("client i/o failed: {0}")]
    Client(#[source] io::Error),
}
