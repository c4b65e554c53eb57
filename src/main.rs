use std::process;
use tokio::net::TcpListener;
use tracing::info;

use packrat::cache::ProxyCache;
use packrat::{server, CACHE_SLOTS, MAX_CACHE_BYTES, MAX_OBJECT_SIZE};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Diagnostics go to stderr; the data path owns the sockets.
    tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive("packrat=info".parse()?),
        )
        .init();

    let args: Vec<String> = std::env::args().collect();
    if args.len() != 2 {
        let name = args.first().map(String::as_str).unwrap_or("packrat");
        eprintln!("usage: {name} <port>");
        process::exit(1);
    }
    let port = &args[1];

    let listener = match TcpListener::bind(format!("0.0.0.0:{port}")).await {
        Ok(listener) => listener,
        Err(e) => {
            eprintln!("cannot listen on port {port}: {e}");
            process::exit(1);
        }
    };

    info!("packrat listening on port {port}");
    info!(
        "cache: {CACHE_SLOTS} slots, {MAX_CACHE_BYTES} byte budget, objects up to {MAX_OBJECT_SIZE} bytes"
    );

    server::run(listener, ProxyCache::new()).await?;
    Ok(())
}
