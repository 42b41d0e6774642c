//! Transport seam: how a resource key is turned into a [`Response`].
//!
//! The cache never performs I/O itself. Every retrieval goes through a
//! [`TransportHandler`]: a type-erased, cheaply-cloneable async function from
//! a key to a [`Response`].
//!
//! ## Core types
//!
//! - [`Transport`] — trait implemented by reusable transports such as
//!   [`HttpTransport`].
//! - [`TransportHandler`] — the erased form stored by the cache.
//! - [`from_transport`] — converts a [`Transport`] into a [`TransportHandler`].
//! - [`handler_fn`] — wraps a plain async closure, handy for tests and
//!   in-process origins.

use std::{future::Future, pin::Pin, sync::Arc};

use thiserror::Error;

use crate::http::{Response, ResponseError};

pub mod http;

pub use self::http::HttpTransport;

/// Boxed future returned by every transport.
pub type TransportFuture = Pin<Box<dyn Future<Output = Result<Response, TransportError>> + Send>>;

/// Errors a transport can report before a response is available.
///
/// Non-success statuses are **not** transport errors: the transport returns
/// the [`Response`] and the cache decides what the status means.
#[derive(Debug, Error)]
pub enum TransportError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("failed to connect to {addr}: {source}")]
    Connect {
        addr: String,
        #[source]
        source: std::io::Error,
    },

    #[error("malformed response: {0}")]
    Malformed(#[from] ResponseError),

    #[error("connection closed before the response was complete")]
    Truncated,

    #[error("response exceeds maximum allowed size of {max_bytes} bytes")]
    TooLarge { max_bytes: usize },

    #[error("{0}")]
    Other(String),
}

/// A type-erased, reference-counted retrieval function.
///
/// The [`Arc`] wrapper makes the handler cheap to clone into every spawned
/// retrieval task.
///
/// ```rust,no_run
/// use std::sync::Arc;
/// use prefetch::http::Response;
/// use prefetch::transport::{TransportFuture, TransportHandler};
///
/// let handler: TransportHandler = Arc::new(|_key: String| {
///     Box::pin(async move { Ok(Response::default().body("null")) }) as TransportFuture
/// });
/// ```
pub type TransportHandler = Arc<dyn Fn(String) -> TransportFuture + Send + Sync + 'static>;

/// The core trait for reusable transports.
///
/// # Contract
///
/// - Implementations **must** be `Send + Sync`; one transport is shared by
///   every retrieval a cache starts.
/// - `fetch` **must** return a `Send` future that owns everything it needs,
///   since it is driven on a spawned task that outlives the caller.
pub trait Transport: Send + Sync {
    /// Retrieves the resource named by `key`.
    fn fetch(&self, key: &str) -> TransportFuture;
}

/// Converts a [`Transport`] implementation into a [`TransportHandler`].
///
/// ```rust,no_run
/// use std::sync::Arc;
/// use prefetch::transport::{HttpTransport, from_transport};
///
/// let handler = from_transport(Arc::new(HttpTransport::new("127.0.0.1:8080")));
/// ```
pub fn from_transport<T>(transport: Arc<T>) -> TransportHandler
where
    T: Transport + 'static,
{
    Arc::new(move |key: String| transport.fetch(&key))
}

/// Wraps an async closure as a [`TransportHandler`].
///
/// ```
/// use prefetch::http::Response;
/// use prefetch::transport::handler_fn;
///
/// let handler = handler_fn(|key: String| async move {
///     Ok(Response::json_body(&serde_json::json!({ "key": key })).unwrap())
/// });
/// ```
pub fn handler_fn<F, Fut>(f: F) -> TransportHandler
where
    F: Fn(String) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<Response, TransportError>> + Send + 'static,
{
    Arc::new(move |key: String| Box::pin(f(key)) as TransportFuture)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::http::StatusCode;

    struct Echo;

    impl Transport for Echo {
        fn fetch(&self, key: &str) -> TransportFuture {
            let key = key.to_owned();
            Box::pin(async move { Ok(Response::new(StatusCode::OK).body(format!("\"{key}\""))) })
        }
    }

    #[tokio::test]
    async fn from_transport_forwards_key() {
        let handler = from_transport(Arc::new(Echo));
        let res = handler("/items".to_owned()).await.unwrap();
        assert_eq!(res.json::<String>().unwrap(), "/items");
    }

    #[tokio::test]
    async fn handler_fn_propagates_errors() {
        let handler = handler_fn(|_key| async { Err(TransportError::Truncated) });
        let err = handler("/x".to_owned()).await.unwrap_err();
        assert!(matches!(err, TransportError::Truncated));
    }
}
