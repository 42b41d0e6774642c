//! HTTP/1.1 transport over a Tokio `TcpStream`.
//!
//! Each retrieval opens one connection, sends a `GET` for the key and reads
//! the response until `Content-Length` bytes of body have arrived, or until
//! the origin closes the connection when no length is given.

use bytes::BytesMut;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpStream;
use tracing::debug;

use super::{Transport, TransportError, TransportFuture};
use crate::http::{Response, ResponseError};

/// Default cap on a complete response (head + body) we will buffer (8 MiB).
pub const DEFAULT_MAX_RESPONSE_SIZE: usize = 8 * 1024 * 1024;

/// Initial read buffer capacity per connection.
const INITIAL_BUF_SIZE: usize = 4096;

/// Retrieves keys as request paths from a single HTTP/1.1 origin.
///
/// # Examples
///
/// ```rust,no_run
/// use std::sync::Arc;
/// use prefetch::{FetchCache, transport::{HttpTransport, from_transport}};
///
/// let http = HttpTransport::new("127.0.0.1:8080")
///     .host("api.internal")
///     .max_response_size(1024 * 1024);
/// let cache = FetchCache::new(from_transport(Arc::new(http)));
/// ```
#[derive(Debug, Clone)]
pub struct HttpTransport {
    addr: String,
    host: String,
    max_response_size: usize,
}

impl HttpTransport {
    /// Creates a transport for the origin at `addr` (`host:port`).
    ///
    /// The `Host` header defaults to `addr`.
    pub fn new(addr: impl Into<String>) -> Self {
        let addr = addr.into();
        Self {
            host: addr.clone(),
            addr,
            max_response_size: DEFAULT_MAX_RESPONSE_SIZE,
        }
    }

    /// Overrides the `Host` header sent with every request.
    #[must_use]
    pub fn host(mut self, host: impl Into<String>) -> Self {
        self.host = host.into();
        self
    }

    /// Sets the largest response (head + body) accepted before failing.
    #[must_use]
    pub fn max_response_size(mut self, max_bytes: usize) -> Self {
        self.max_response_size = max_bytes;
        self
    }

    /// Returns the origin address this transport connects to.
    pub fn addr(&self) -> &str {
        &self.addr
    }

    /// Performs a single `GET path` against the origin.
    ///
    /// # Errors
    ///
    /// - [`TransportError::Connect`] if the origin cannot be reached.
    /// - [`TransportError::Malformed`] if the response head does not parse.
    /// - [`TransportError::Truncated`] if the origin closes mid-response.
    /// - [`TransportError::TooLarge`] if the response exceeds the configured cap.
    pub async fn get(&self, path: &str) -> Result<Response, TransportError> {
        let mut stream =
            TcpStream::connect(&self.addr)
                .await
                .map_err(|e| TransportError::Connect {
                    addr: self.addr.clone(),
                    source: e,
                })?;

        let request = format!(
            "GET {path} HTTP/1.1\r\nHost: {}\r\nAccept: application/json\r\nConnection: close\r\n\r\n",
            self.host
        );
        stream.write_all(request.as_bytes()).await?;
        stream.flush().await?;

        debug!(addr = %self.addr, path = %path, "request sent");

        let mut buf = BytesMut::with_capacity(INITIAL_BUF_SIZE);
        let mut head: Option<(Response, usize)> = None;

        loop {
            let bytes_read = stream.read_buf(&mut buf).await?;
            let eof = bytes_read == 0;

            if buf.len() > self.max_response_size {
                return Err(TransportError::TooLarge {
                    max_bytes: self.max_response_size,
                });
            }

            if head.is_none() {
                match Response::parse(&buf) {
                    Ok(pair) => head = Some(pair),
                    Err(ResponseError::Incomplete) if eof => return Err(TransportError::Truncated),
                    // Head not yet fully received; read more data.
                    Err(ResponseError::Incomplete) => continue,
                    Err(e) => return Err(e.into()),
                }
            }

            let Some((response, body_offset)) = &head else {
                continue;
            };
            match response.headers().content_length() {
                Some(len) if buf.len() >= body_offset + len => break,
                Some(_) if eof => return Err(TransportError::Truncated),
                None if eof => break,
                _ => {}
            }
        }

        let Some((response, body_offset)) = head else {
            return Err(TransportError::Truncated);
        };
        let mut body = buf.split_off(body_offset);
        if let Some(len) = response.headers().content_length() {
            body.truncate(len);
        }

        debug!(
            addr = %self.addr,
            path = %path,
            status = response.status().as_u16(),
            bytes = body.len(),
            "response received"
        );

        Ok(response.body_bytes(body.freeze()))
    }
}

impl Transport for HttpTransport {
    fn fetch(&self, key: &str) -> TransportFuture {
        let this = self.clone();
        let key = key.to_owned();
        Box::pin(async move { this.get(&key).await })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::http::StatusCode;
    use tokio::net::TcpListener;
    use tokio::sync::oneshot;

    /// Serves one connection with `reply`, reporting the request head it saw.
    async fn one_shot_origin(reply: &'static [u8]) -> (String, oneshot::Receiver<String>) {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap().to_string();
        let (tx, rx) = oneshot::channel();

        tokio::spawn(async move {
            let (mut stream, _) = listener.accept().await.unwrap();
            let mut buf = BytesMut::with_capacity(1024);
            while !buf.windows(4).any(|w| w == b"\r\n\r\n") {
                if stream.read_buf(&mut buf).await.unwrap() == 0 {
                    break;
                }
            }
            let _ = tx.send(String::from_utf8_lossy(&buf).into_owned());
            let _ = stream.write_all(reply).await;
            let _ = stream.shutdown().await;
        });

        (addr, rx)
    }

    #[tokio::test]
    async fn get_with_content_length() {
        let (addr, seen) = one_shot_origin(
            b"HTTP/1.1 200 OK\r\nContent-Type: application/json\r\nContent-Length: 9\r\n\r\n[1,2,3]  ",
        )
        .await;

        let res = HttpTransport::new(addr).get("/items").await.unwrap();
        assert_eq!(res.status(), StatusCode::OK);
        assert_eq!(res.json::<Vec<u32>>().unwrap(), vec![1, 2, 3]);

        let head = seen.await.unwrap();
        assert!(head.starts_with("GET /items HTTP/1.1\r\n"));
        assert!(head.contains("Accept: application/json\r\n"));
        assert!(head.contains("Connection: close\r\n"));
    }

    #[tokio::test]
    async fn get_reads_to_eof_without_length() {
        let (addr, _seen) = one_shot_origin(b"HTTP/1.1 200 OK\r\n\r\n{\"ok\":true}").await;
        let res = HttpTransport::new(addr).get("/status").await.unwrap();
        assert_eq!(res.json::<serde_json::Value>().unwrap()["ok"], true);
    }

    #[tokio::test]
    async fn non_success_status_is_returned_not_raised() {
        let (addr, _seen) =
            one_shot_origin(b"HTTP/1.1 404 Not Found\r\nContent-Length: 0\r\n\r\n").await;
        let res = HttpTransport::new(addr).get("/missing").await.unwrap();
        assert_eq!(res.status(), StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn custom_host_header() {
        let (addr, seen) = one_shot_origin(b"HTTP/1.1 204 No Content\r\n\r\n").await;
        HttpTransport::new(addr)
            .host("api.internal")
            .get("/")
            .await
            .unwrap();
        assert!(seen.await.unwrap().contains("Host: api.internal\r\n"));
    }

    #[tokio::test]
    async fn truncated_body() {
        let (addr, _seen) =
            one_shot_origin(b"HTTP/1.1 200 OK\r\nContent-Length: 100\r\n\r\n{\"short\"").await;
        let err = HttpTransport::new(addr).get("/").await.unwrap_err();
        assert!(matches!(err, TransportError::Truncated));
    }

    #[tokio::test]
    async fn oversized_response() {
        let (addr, _seen) =
            one_shot_origin(b"HTTP/1.1 200 OK\r\nContent-Length: 64\r\n\r\n0123456789012345678901234567890123456789").await;
        let err = HttpTransport::new(addr)
            .max_response_size(32)
            .get("/")
            .await
            .unwrap_err();
        assert!(matches!(err, TransportError::TooLarge { max_bytes: 32 }));
    }

    #[tokio::test]
    async fn malformed_head() {
        let (addr, _seen) = one_shot_origin(b"SMTP ready\r\n\r\n").await;
        let err = HttpTransport::new(addr).get("/").await.unwrap_err();
        assert!(matches!(err, TransportError::Malformed(_)));
    }

    #[tokio::test]
    async fn connect_failure_names_address() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap().to_string();
        drop(listener);

        let err = HttpTransport::new(addr.clone()).get("/").await.unwrap_err();
        match err {
            TransportError::Connect { addr: reported, .. } => assert_eq!(reported, addr),
            other => panic!("expected connect error, got {other:?}"),
        }
    }
}
