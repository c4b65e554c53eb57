//! Accept loop and per-connection worker.

use bytes::BytesMut;
use std::io;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::io::AsyncWriteExt;
use tokio::net::{TcpListener, TcpStream};
use tokio::signal::unix::{signal, SignalKind};
use tracing::{debug, error, info, warn};

use crate::cache::ProxyCache;
use crate::reader::read_request_head;
use crate::request::rewrite_request;
use crate::{upstream, MAX_OBJECT_SIZE};

/// Serve one client connection end to end.
///
/// Any failure is logged and ends the request; the client socket
/// closes on return. Per the proxy's contract no error response bytes
/// are ever written back to the client.
pub async fn handle_client(mut client: TcpStream, cache: ProxyCache) {
    let mut head = BytesMut::with_capacity(1024);
    if let Err(e) = read_request_head(&mut client, &mut head).await {
        warn!("dropping request: {e}");
        return;
    }
    let request = match rewrite_request(&head) {
        Ok(request) => request,
        Err(e) => {
            warn!("dropping request: {e}");
            return;
        }
    };

    if let Some(hit) = cache.lookup(&request.uri).await {
        info!("CACHE HIT: {}", request.uri);
        if let Err(e) = client.write_all(hit.payload()).await {
            error!("short write to client for {}: {e}", request.uri);
        }
        // The read guard drops here, after the relay finished.
        return;
    }
    debug!("CACHE MISS: {}", request.uri);

    let body = match upstream::fetch(&request.host, &request.port, &request.head).await {
        Ok(body) => body,
        Err(e) => {
            warn!(
                "fetch of {} from {}:{} failed: {e}",
                request.uri, request.host, request.port
            );
            return;
        }
    };

    if let Err(e) = client.write_all(&body).await {
        // The response arrived in full even if the client went away,
        // so it still feeds the cache below.
        error!("short write to client for {}: {e}", request.uri);
    }

    if body.len() <= MAX_OBJECT_SIZE {
        if cache.store(&request.uri, body).await {
            info!("CACHED: {}", request.uri);
        }
    } else {
        debug!("not caching {} ({} bytes)", request.uri, body.len());
    }
}

/// Accept clients forever, one detached worker task each, until
/// SIGINT or SIGTERM arrives; then stop accepting and drain the
/// workers still in flight.
pub async fn run(listener: TcpListener, cache: ProxyCache) -> io::Result<()> {
    let mut sigterm = signal(SignalKind::terminate())?;
    let mut sigint = signal(SignalKind::interrupt())?;
    let active = Arc::new(AtomicUsize::new(0));

    loop {
        tokio::select! {
            _ = sigterm.recv() => {
                info!("received SIGTERM, shutting down");
                break;
            }
            _ = sigint.recv() => {
                info!("received SIGINT, shutting down");
                break;
            }
            accepted = listener.accept() => match accepted {
                Ok((client, addr)) => {
                    let current = active.fetch_add(1, Ordering::Relaxed) + 1;
                    debug!("accepted {addr} (active: {current})");
                    let cache = cache.clone();
                    let active = Arc::clone(&active);
                    tokio::spawn(async move {
                        handle_client(client, cache).await;
                        let remaining = active.fetch_sub(1, Ordering::Relaxed) - 1;
                        debug!("connection closed (active: {remaining})");
                    });
                }
                Err(e) => error!("accept failed: {e}"),
            }
        }
    }

    let waiting = active.load(Ordering::Relaxed);
    if waiting > 0 {
        info!("waiting for {waiting} active connections to finish");
    }
    while active.load(Ordering::Relaxed) > 0 {
        tokio::time::sleep(Duration::from_millis(100)).await;
    }
    info!("all connections closed");
    Ok(())
}
