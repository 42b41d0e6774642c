//! HTTP/1.1 response parsing using the [`httparse`] crate.
//!
//! Transports hand a [`Response`] back to the cache; the cache only looks at
//! the status and decodes the body as JSON.

use bytes::Bytes;
use serde::de::DeserializeOwned;
use thiserror::Error;

use super::{Headers, StatusCode};

/// Errors that can occur while parsing an HTTP/1.1 response head.
#[derive(Debug, Error)]
pub enum ResponseError {
    #[error("response is incomplete — more data needed")]
    Incomplete,

    #[error("HTTP parse error: {0}")]
    Parse(#[from] httparse::Error),

    #[error("missing required field: {field}")]
    MissingField { field: &'static str },

    #[error("status code {code} is out of range")]
    InvalidStatus { code: u16 },
}

/// A received HTTP response.
///
/// Built either by [`Response::parse`] from raw bytes read off a socket, or
/// with the builder methods by in-process transports.
///
/// # Examples
///
/// ```
/// use prefetch::http::{Response, StatusCode};
///
/// let response = Response::new(StatusCode::OK)
///     .header("Content-Type", "application/json")
///     .body(r#"{"items":[1,2,3]}"#);
///
/// assert!(response.status().is_success());
/// let value: serde_json::Value = response.json().unwrap();
/// assert_eq!(value["items"][1], 2);
/// ```
#[derive(Debug, Clone)]
pub struct Response {
    status: StatusCode,
    headers: Headers,
    body: Bytes,
}

impl Response {
    /// Maximum number of headers we accept per response.
    const MAX_HEADERS: usize = 64;

    /// Creates a new response with the given status and an empty body.
    pub fn new(status: StatusCode) -> Self {
        Self {
            status,
            headers: Headers::new(),
            body: Bytes::new(),
        }
    }

    /// Creates a `200 OK` response carrying `value` serialized as JSON.
    pub fn json_body<T: serde::Serialize>(value: &T) -> Result<Self, serde_json::Error> {
        let body = serde_json::to_vec(value)?;
        Ok(Self::new(StatusCode::OK)
            .header("Content-Type", "application/json")
            .body_bytes(body))
    }

    /// Appends a response header. Multiple calls with the same name are additive.
    #[must_use]
    pub fn header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.insert(name, value);
        self
    }

    /// Sets the response body from a string.
    #[must_use]
    pub fn body(mut self, body: impl Into<String>) -> Self {
        self.body = Bytes::from(body.into());
        self
    }

    /// Sets the response body from raw bytes.
    #[must_use]
    pub fn body_bytes(mut self, body: impl Into<Bytes>) -> Self {
        self.body = body.into();
        self
    }

    /// Parses a response head from a byte slice.
    ///
    /// Returns the parsed `Response` with an empty body and the byte offset at
    /// which the body begins in `buf`. The caller attaches the body once it
    /// has been fully read.
    ///
    /// # Errors
    ///
    /// - [`ResponseError::Incomplete`] — more data is needed to complete the head.
    /// - [`ResponseError::Parse`] — the data is malformed and cannot be parsed.
    /// - [`ResponseError::MissingField`] — the status line lacks a code.
    /// - [`ResponseError::InvalidStatus`] — the code is not a three-digit status.
    pub fn parse(buf: &[u8]) -> Result<(Self, usize), ResponseError> {
        let mut headers = [httparse::EMPTY_HEADER; Self::MAX_HEADERS];
        let mut raw = httparse::Response::new(&mut headers);

        let body_offset = match raw.parse(buf)? {
            httparse::Status::Complete(offset) => offset,
            httparse::Status::Partial => return Err(ResponseError::Incomplete),
        };

        let code = raw
            .code
            .ok_or(ResponseError::MissingField { field: "status" })?;
        let status = StatusCode::from_u16(code).ok_or(ResponseError::InvalidStatus { code })?;

        Ok((
            Self {
                status,
                headers: Headers::from_raw(raw.headers),
                body: Bytes::new(),
            },
            body_offset,
        ))
    }

    /// Returns the status code of this response.
    pub fn status(&self) -> StatusCode {
        self.status
    }

    /// Returns the response headers.
    pub fn headers(&self) -> &Headers {
        &self.headers
    }

    /// Returns the response body bytes.
    pub fn body_ref(&self) -> &Bytes {
        &self.body
    }

    /// Decodes the body as JSON.
    pub fn json<T>(&self) -> Result<T, serde_json::Error>
    where
        T: DeserializeOwned,
    {
        serde_json::from_slice(&self.body)
    }
}

impl Default for Response {
    fn default() -> Self {
        Self::new(StatusCode::OK)
    }
}
