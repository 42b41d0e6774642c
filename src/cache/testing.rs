//! Transports shared by the cache tests.

use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

use serde_json::json;
use tokio::sync::Semaphore;

use crate::http::{Response, StatusCode};
use crate::transport::{TransportError, TransportHandler, handler_fn};

fn echo(key: &str) -> Result<Response, TransportError> {
    Response::json_body(&json!({ "key": key })).map_err(|e| TransportError::Other(e.to_string()))
}

/// Answers `{"key": <key>}` immediately and counts calls.
pub(crate) fn counting_transport() -> (TransportHandler, Arc<AtomicUsize>) {
    let calls = Arc::new(AtomicUsize::new(0));
    let counter = Arc::clone(&calls);
    let transport = handler_fn(move |key: String| {
        counter.fetch_add(1, Ordering::SeqCst);
        async move { echo(&key) }
    });
    (transport, calls)
}

/// Like [`counting_transport`], but every retrieval blocks until the test
/// adds a permit to the returned gate.
pub(crate) fn gated_transport() -> (TransportHandler, Arc<AtomicUsize>, Arc<Semaphore>) {
    let calls = Arc::new(AtomicUsize::new(0));
    let gate = Arc::new(Semaphore::new(0));
    let counter = Arc::clone(&calls);
    let waiter = Arc::clone(&gate);
    let transport = handler_fn(move |key: String| {
        counter.fetch_add(1, Ordering::SeqCst);
        let gate = Arc::clone(&waiter);
        async move {
            let _permit = gate.acquire().await.unwrap();
            echo(&key)
        }
    });
    (transport, calls, gate)
}

/// Answers every key with an empty response of the given status.
pub(crate) fn status_transport(code: u16) -> (TransportHandler, Arc<AtomicUsize>) {
    let calls = Arc::new(AtomicUsize::new(0));
    let counter = Arc::clone(&calls);
    let status = StatusCode::from_u16(code).unwrap();
    let transport = handler_fn(move |_key: String| {
        counter.fetch_add(1, Ordering::SeqCst);
        async move { Ok(Response::new(status)) }
    });
    (transport, calls)
}
