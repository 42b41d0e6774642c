//! # prefetch
//!
//! A process-local fetch cache that collapses concurrent requests for the
//! same resource into one retrieval, and hands a populated store from a
//! producer (a server rendering a page) to a consumer (the client resuming
//! it) so nothing is fetched twice.
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use prefetch::FetchCache;
//! use prefetch::transport::{HttpTransport, from_transport};
//!
//! #[tokio::main]
//! async fn main() {
//!     let origin = from_transport(Arc::new(HttpTransport::new("127.0.0.1:8080")));
//!
//!     // Producer: fetch ahead of time, then ship the state.
//!     let server = FetchCache::new(origin.clone());
//!     server.preload("/items").await;
//!     let state = server.dump();
//!
//!     // Consumer: install the state before the first read.
//!     let client = FetchCache::new(origin);
//!     client.load(&state);
//!     let items = client.read("/items");
//!     assert!(!items.current().is_loading);
//! }
//! ```

pub mod cache;
pub mod http;
pub mod transport;

// ── Convenience re-exports ────────────────────────────────────────────────────
pub use cache::{
    EntryStatus, FetchCache, FetchError, FetchFailure, Hydration, Outcome, OutcomeHandle,
    ReadState, Snapshot, Subscription, TransferEntry,
};
pub use http::{Response, StatusCode};
pub use transport::{HttpTransport, Transport, TransportError, TransportHandler};
