//! The keyed fetch cache: store, de-duplicating coordinator and preloader.
//!
//! A [`FetchCache`] maps resource keys to entries that move through
//! `pending → resolved | failed` exactly once. Concurrent callers for a key
//! share the single in-flight retrieval; settled entries are returned as-is
//! for as long as the store lives, or until [`FetchCache::wipe`].
//!
//! ## Core types
//!
//! - [`FetchCache`] — the store; cheap to clone, every clone sees the same entries.
//! - [`OutcomeHandle`] — returned by [`FetchCache::ensure`]; await it for the outcome.
//! - [`Subscription`] / [`ReadState`] — the consumer-facing view of one key.
//! - [`Snapshot`] / [`Hydration`] — moving a populated store between processes.
//!
//! One store per logical session is the supported scoping model: nothing in
//! this module is global.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Weak};

use parking_lot::Mutex;
use serde_json::Value;
use tokio::sync::watch;
use tracing::{debug, info, warn};

use crate::transport::TransportHandler;

pub mod accessor;
pub mod error;
pub mod handle;
pub mod transfer;

#[cfg(test)]
pub(crate) mod testing;

pub use accessor::{ReadState, Subscription};
pub use error::{FetchError, FetchFailure};
pub use handle::OutcomeHandle;
pub use transfer::{Hydration, Snapshot, TransferEntry};

/// The settled result of a retrieval: the decoded payload or a failure message.
pub type Outcome = Result<Value, FetchFailure>;

/// Public view of where an entry is in its lifecycle.
///
/// A key with no entry at all is reported as `None` by [`FetchCache::status`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EntryStatus {
    Pending,
    Resolved,
    Failed,
}

/// One cache entry. The in-flight handle lives only in the pending variant,
/// which keeps it out of every snapshot.
#[derive(Debug)]
enum Slot {
    Pending { ticket: u64, handle: OutcomeHandle },
    Resolved(Value),
    Failed(FetchFailure),
}

impl Slot {
    fn from_outcome(outcome: Outcome) -> Self {
        match outcome {
            Ok(data) => Self::Resolved(data),
            Err(failure) => Self::Failed(failure),
        }
    }

    fn outcome(&self) -> Option<Outcome> {
        match self {
            Self::Pending { .. } => None,
            Self::Resolved(data) => Some(Ok(data.clone())),
            Self::Failed(failure) => Some(Err(failure.clone())),
        }
    }

    fn status(&self) -> EntryStatus {
        match self {
            Self::Pending { .. } => EntryStatus::Pending,
            Self::Resolved(_) => EntryStatus::Resolved,
            Self::Failed(_) => EntryStatus::Failed,
        }
    }
}

struct Inner {
    entries: Mutex<HashMap<String, Slot>>,
    transport: TransportHandler,
    // Identifies each pending entry so a retrieval orphaned by `wipe` or
    // `load` cannot overwrite whatever replaced it.
    next_ticket: AtomicU64,
    // Bumped after every store mutation; subscriptions re-evaluate on change.
    version: watch::Sender<u64>,
}

/// A de-duplicating, cache-forever store of fetched resources.
///
/// # Examples
///
/// ```
/// use prefetch::{FetchCache, http::Response, transport::handler_fn};
/// use serde_json::json;
///
/// # #[tokio::main(flavor = "current_thread")]
/// # async fn main() {
/// let cache = FetchCache::new(handler_fn(|key: String| async move {
///     Ok(Response::json_body(&json!({ "path": key })).unwrap())
/// }));
///
/// let first = cache.ensure("/items");
/// let second = cache.ensure("/items");
/// assert!(first.same_retrieval(&second));
///
/// assert_eq!(first.await.unwrap(), json!({ "path": "/items" }));
/// assert_eq!(second.await.unwrap(), json!({ "path": "/items" }));
/// # }
/// ```
#[derive(Clone)]
pub struct FetchCache {
    inner: Arc<Inner>,
}

impl FetchCache {
    /// Creates an empty store that retrieves missing keys through `transport`.
    pub fn new(transport: TransportHandler) -> Self {
        let (version, _) = watch::channel(0);
        Self {
            inner: Arc::new(Inner {
                entries: Mutex::new(HashMap::new()),
                transport,
                next_ticket: AtomicU64::new(0),
                version,
            }),
        }
    }

    /// Returns the outcome for `key`, starting a retrieval only if needed.
    ///
    /// - Pending key: a clone of the existing in-flight handle.
    /// - Settled key: a handle that is already complete; no work is started.
    /// - Unknown key: the entry becomes pending and exactly one retrieval is
    ///   spawned. It runs to completion even if every handle is dropped.
    ///
    /// A non-success status fails the entry with a message naming the code;
    /// a body that is not valid JSON fails it with the decoder's message.
    ///
    /// # Panics
    ///
    /// Panics if a retrieval must be started outside a Tokio runtime.
    pub fn ensure(&self, key: &str) -> OutcomeHandle {
        let (handle, settler, ticket) = {
            let mut entries = self.inner.entries.lock();
            match entries.get(key) {
                Some(Slot::Pending { handle, .. }) => {
                    debug!(key = %key, "joining in-flight retrieval");
                    return handle.clone();
                }
                Some(Slot::Resolved(data)) => return OutcomeHandle::ready(Ok(data.clone())),
                Some(Slot::Failed(failure)) => return OutcomeHandle::ready(Err(failure.clone())),
                None => {}
            }

            let ticket = self.inner.next_ticket.fetch_add(1, Ordering::Relaxed);
            let (handle, settler) = OutcomeHandle::pending();
            entries.insert(
                key.to_owned(),
                Slot::Pending {
                    ticket,
                    handle: handle.clone(),
                },
            );
            (handle, settler, ticket)
        };
        self.bump();

        debug!(key = %key, "retrieval started");

        let store = Arc::downgrade(&self.inner);
        let transport = Arc::clone(&self.inner.transport);
        let key = key.to_owned();

        tokio::spawn(async move {
            // The retrieval runs as its own task so a panicking transport
            // still settles the entry instead of leaving it pending.
            let path = key.clone();
            let outcome = match tokio::spawn(async move { retrieve(&transport, &path).await }).await {
                Ok(result) => result.map_err(FetchFailure::from),
                Err(e) => {
                    warn!(key = %key, error = %e, "retrieval task aborted");
                    Err(FetchFailure::new(handle::ABANDONED))
                }
            };
            match &outcome {
                Ok(_) => debug!(key = %key, "retrieval resolved"),
                Err(failure) => debug!(key = %key, error = %failure, "retrieval failed"),
            }
            // Record in the store first so riders woken by the handle observe it.
            record(&store, &key, ticket, outcome.clone());
            settler.settle(outcome);
        });

        handle
    }

    /// Drives `key` to a settled state.
    ///
    /// Returns immediately if the key already carries data or an error;
    /// otherwise waits for the (possibly shared) retrieval to settle. Await
    /// this before [`dump`](Self::dump) to guarantee the key is captured.
    pub async fn preload(&self, key: &str) {
        if self.get(key).is_some() {
            return;
        }
        let outcome = self.ensure(key).settle().await;
        debug!(key = %key, ok = outcome.is_ok(), "preloaded");
    }

    /// Returns the settled outcome for `key`, or `None` if the key is unknown
    /// or still pending. Never starts a retrieval.
    pub fn get(&self, key: &str) -> Option<Outcome> {
        self.inner.entries.lock().get(key).and_then(Slot::outcome)
    }

    /// Returns the lifecycle status of `key`, or `None` if it has no entry.
    pub fn status(&self, key: &str) -> Option<EntryStatus> {
        self.inner.entries.lock().get(key).map(Slot::status)
    }

    /// Returns the number of entries, pending ones included.
    pub fn len(&self) -> usize {
        self.inner.entries.lock().len()
    }

    /// Returns `true` if the store has no entries.
    pub fn is_empty(&self) -> bool {
        self.inner.entries.lock().is_empty()
    }

    /// Removes every entry.
    ///
    /// Retrievals in flight keep running but no longer write to the store.
    /// Intended for test setup and teardown.
    pub fn wipe(&self) {
        let removed = {
            let mut entries = self.inner.entries.lock();
            let removed = entries.len();
            entries.clear();
            removed
        };
        self.bump();
        info!(removed, "cache wiped");
    }

    fn bump(&self) {
        self.inner.version.send_modify(|v| *v = v.wrapping_add(1));
    }
}

impl std::fmt::Debug for FetchCache {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FetchCache")
            .field("entries", &self.len())
            .finish_non_exhaustive()
    }
}

async fn retrieve(transport: &TransportHandler, key: &str) -> Result<Value, FetchError> {
    let response = transport(key.to_owned()).await?;
    if !response.status().is_success() {
        return Err(FetchError::Status(response.status()));
    }
    Ok(response.json()?)
}

/// Settles the pending entry for `key` if it is still the one `ticket` created.
fn record(store: &Weak<Inner>, key: &str, ticket: u64, outcome: Outcome) {
    let Some(inner) = store.upgrade() else {
        return;
    };
    {
        let mut entries = inner.entries.lock();
        let current = matches!(
            entries.get(key),
            Some(Slot::Pending { ticket: t, .. }) if *t == ticket
        );
        if !current {
            debug!(key = %key, "discarding outcome of superseded retrieval");
            return;
        }
        entries.insert(key.to_owned(), Slot::from_outcome(outcome));
    }
    inner.version.send_modify(|v| *v = v.wrapping_add(1));
}
