//! Consumer-facing reads.
//!
//! [`FetchCache::read`] returns a [`Subscription`]: the current [`ReadState`]
//! for one key, re-evaluated whenever the store changes. Dropping the
//! subscription is how a consumer detaches; nothing is delivered afterwards
//! and the retrieval it may have started keeps running.

use serde::Serialize;
use serde::de::DeserializeOwned;
use serde_json::Value;
use tokio::sync::watch;

use super::{FetchCache, Outcome};

/// What a consumer renders for a key.
///
/// Serializes as `{"isLoading": .., "data": .., "error": ..}`.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ReadState {
    pub is_loading: bool,
    pub data: Option<Value>,
    pub error: Option<String>,
}

impl ReadState {
    fn loading() -> Self {
        Self {
            is_loading: true,
            data: None,
            error: None,
        }
    }

    fn settled(outcome: Outcome) -> Self {
        match outcome {
            Ok(data) => Self {
                is_loading: false,
                data: Some(data),
                error: None,
            },
            Err(failure) => Self {
                is_loading: false,
                data: None,
                error: Some(failure.into_message()),
            },
        }
    }

    /// Decodes `data` into a concrete type, if present.
    pub fn data_as<T: DeserializeOwned>(&self) -> Option<Result<T, serde_json::Error>> {
        self.data.clone().map(serde_json::from_value)
    }
}

/// A live view of one key in a [`FetchCache`].
///
/// # Examples
///
/// ```
/// use prefetch::{FetchCache, http::Response, transport::handler_fn};
/// use serde_json::json;
///
/// # #[tokio::main(flavor = "current_thread")]
/// # async fn main() {
/// let cache = FetchCache::new(handler_fn(|_key: String| async {
///     Ok(Response::json_body(&json!(["a", "b"])).unwrap())
/// }));
///
/// let mut items = cache.read("/items");
/// assert!(items.current().is_loading);
///
/// let state = items.settled().await;
/// assert!(!state.is_loading);
/// assert_eq!(state.data, Some(json!(["a", "b"])));
/// # }
/// ```
#[derive(Debug)]
pub struct Subscription {
    cache: FetchCache,
    key: String,
    state: ReadState,
    version: watch::Receiver<u64>,
}

impl FetchCache {
    /// Opens a read of `key`.
    ///
    /// The initial state reflects stored data or error with `is_loading =
    /// false`. Otherwise it is loading and, unless a retrieval is already in
    /// flight, one is started.
    pub fn read(&self, key: &str) -> Subscription {
        // Subscribe before inspecting so no later change is missed.
        let version = self.inner.version.subscribe();
        let state = self.evaluate(key);
        Subscription {
            cache: self.clone(),
            key: key.to_owned(),
            state,
            version,
        }
    }

    /// Current state for `key`; starts a retrieval if the key carries neither
    /// data nor error.
    fn evaluate(&self, key: &str) -> ReadState {
        match self.get(key) {
            Some(outcome) => ReadState::settled(outcome),
            None => {
                drop(self.ensure(key));
                ReadState::loading()
            }
        }
    }
}

impl Subscription {
    /// Returns the key this subscription reads.
    pub fn key(&self) -> &str {
        &self.key
    }

    /// Returns the most recently delivered state.
    pub fn current(&self) -> &ReadState {
        &self.state
    }

    /// Waits until the state for the key differs from [`current`](Self::current)
    /// and returns the new state.
    ///
    /// If the key disappears (the store was wiped) the subscription reads it
    /// afresh, exactly like a new [`FetchCache::read`].
    pub async fn changed(&mut self) -> &ReadState {
        loop {
            // The subscription holds the store alive, so the sender never drops.
            if self.version.changed().await.is_err() {
                return &self.state;
            }
            let next = self.cache.evaluate(&self.key);
            if next != self.state {
                self.state = next;
                return &self.state;
            }
        }
    }

    /// Waits until the key is no longer loading and returns the final state.
    pub async fn settled(&mut self) -> &ReadState {
        while self.state.is_loading {
            self.changed().await;
        }
        &self.state
    }
}
