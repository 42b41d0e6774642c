//! Producer → consumer handoff.
//!
//! A "server" cache preloads two resources (one of which fails), dumps its
//! state, and a "client" cache hydrates from it. The client then reads the
//! same keys plus one new key; only the new key reaches the origin.
//!
//! Run with `RUST_LOG=prefetch=debug cargo run --example handoff`.

use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use prefetch::http::{Response, StatusCode};
use prefetch::transport::{TransportError, handler_fn};
use prefetch::{FetchCache, TransportHandler};
use serde_json::json;
use tracing_subscriber::EnvFilter;

fn origin(hits: Arc<AtomicUsize>) -> TransportHandler {
    handler_fn(move |key: String| {
        hits.fetch_add(1, Ordering::SeqCst);
        async move {
            tokio::time::sleep(Duration::from_millis(50)).await;
            match key.as_str() {
                "/items" => Response::json_body(&json!([{ "id": 1 }, { "id": 2 }]))
                    .map_err(|e| TransportError::Other(e.to_string())),
                "/profile" => Response::json_body(&json!({ "name": "ada" }))
                    .map_err(|e| TransportError::Other(e.to_string())),
                _ => Ok(Response::new(StatusCode::NOT_FOUND)),
            }
        }
    })
}

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("prefetch=info")),
        )
        .init();

    let hits = Arc::new(AtomicUsize::new(0));

    let server = FetchCache::new(origin(Arc::clone(&hits)));
    // Three concurrent consumers of /items share one retrieval.
    tokio::join!(
        server.preload("/items"),
        server.preload("/items"),
        server.preload("/items"),
        server.preload("/missing"),
    );
    let state = server.dump();
    println!("server state: {state}");
    println!("origin hits after server phase: {}", hits.load(Ordering::SeqCst));

    let client = FetchCache::new(origin(Arc::clone(&hits)));
    client.load(&state);

    for key in ["/items", "/missing", "/profile"] {
        let mut sub = client.read(key);
        let state = sub.settled().await;
        println!(
            "{key}: {}",
            serde_json::to_string(state).unwrap_or_else(|e| e.to_string())
        );
    }
    println!("origin hits in total: {}", hits.load(Ordering::SeqCst));
}
