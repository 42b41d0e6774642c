//! In-flight handles.
//!
//! An [`OutcomeHandle`] is what [`FetchCache::ensure`](super::FetchCache::ensure)
//! hands out. While a retrieval is pending every caller for the key receives a
//! clone of the same handle, backed by one `watch` channel whose single
//! sender belongs to the retrieval task.

use std::future::{Future, IntoFuture};
use std::pin::Pin;

use tokio::sync::watch;

use super::{FetchFailure, Outcome};

/// Message recorded when a retrieval task ends without reporting an outcome.
pub(crate) const ABANDONED: &str = "retrieval ended without producing an outcome";

/// A handle to the outcome of a key's retrieval.
///
/// Either already complete (the key was settled when `ensure` ran) or
/// waiting on the single in-flight retrieval for the key. Await it directly
/// or call [`settle`](Self::settle).
///
/// Dropping a handle never cancels the retrieval.
#[derive(Debug, Clone)]
pub struct OutcomeHandle {
    state: HandleState,
}

#[derive(Debug, Clone)]
enum HandleState {
    Ready(Outcome),
    Waiting(watch::Receiver<Option<Outcome>>),
}

/// Write side of a pending handle, owned by the retrieval task.
#[derive(Debug)]
pub(crate) struct Settler {
    tx: watch::Sender<Option<Outcome>>,
}

impl Settler {
    /// Publishes the outcome to every clone of the handle.
    pub(crate) fn settle(self, outcome: Outcome) {
        self.tx.send_replace(Some(outcome));
    }
}

impl OutcomeHandle {
    pub(crate) fn ready(outcome: Outcome) -> Self {
        Self {
            state: HandleState::Ready(outcome),
        }
    }

    pub(crate) fn pending() -> (Self, Settler) {
        let (tx, rx) = watch::channel(None);
        (
            Self {
                state: HandleState::Waiting(rx),
            },
            Settler { tx },
        )
    }

    /// Returns `true` once the outcome is available without waiting.
    pub fn is_settled(&self) -> bool {
        match &self.state {
            HandleState::Ready(_) => true,
            HandleState::Waiting(rx) => rx.borrow().is_some(),
        }
    }

    /// Returns `true` if both handles wait on the same retrieval.
    pub fn same_retrieval(&self, other: &Self) -> bool {
        match (&self.state, &other.state) {
            (HandleState::Waiting(a), HandleState::Waiting(b)) => a.same_channel(b),
            _ => false,
        }
    }

    /// Waits for the retrieval to settle and returns its outcome.
    pub async fn settle(self) -> Outcome {
        match self.state {
            HandleState::Ready(outcome) => outcome,
            HandleState::Waiting(mut rx) => {
                let settled = match rx.wait_for(Option::is_some).await {
                    Ok(value) => (*value).clone(),
                    // Sender dropped without publishing: the task panicked.
                    Err(_) => None,
                };
                settled.unwrap_or_else(|| Err(FetchFailure::new(ABANDONED)))
            }
        }
    }
}

impl IntoFuture for OutcomeHandle {
    type Output = Outcome;
    type IntoFuture = Pin<Box<dyn Future<Output = Outcome> + Send>>;

    fn into_future(self) -> Self::IntoFuture {
        Box::pin(self.settle())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[tokio::test]
    async fn ready_handle_resolves_immediately() {
        let handle = OutcomeHandle::ready(Ok(json!(1)));
        assert!(handle.is_settled());
        assert_eq!(handle.await, Ok(json!(1)));
    }

    #[tokio::test]
    async fn clones_share_one_outcome() {
        let (handle, settler) = OutcomeHandle::pending();
        let rider = handle.clone();
        assert!(!handle.is_settled());
        assert!(handle.same_retrieval(&rider));

        settler.settle(Err(FetchFailure::new("boom")));

        assert_eq!(handle.await, Err(FetchFailure::new("boom")));
        assert_eq!(rider.await, Err(FetchFailure::new("boom")));
    }

    #[tokio::test]
    async fn dropped_settler_reports_abandoned() {
        let (handle, settler) = OutcomeHandle::pending();
        drop(settler);
        assert_eq!(handle.await, Err(FetchFailure::new(ABANDONED)));
    }

    #[test]
    fn independent_pendings_are_distinct() {
        let (a, _sa) = OutcomeHandle::pending();
        let (b, _sb) = OutcomeHandle::pending();
        assert!(!a.same_retrieval(&b));
    }
}
