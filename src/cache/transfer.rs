//! Moving a populated store from a producer to a consumer.
//!
//! The producer [`dump`](FetchCache::dump)s its store after preloading; the
//! consumer [`load`](FetchCache::load)s that string before its first read.
//! The wire shape is a JSON object keyed by resource key:
//!
//! ```json
//! { "/items": { "data": [1, 2, 3], "error": null },
//!   "/user":  { "data": null, "error": "request failed with status 404 Not Found" } }
//! ```
//!
//! Only payloads and failure messages cross the boundary. Every key in a
//! snapshot is installed as settled: an entry without an error is resolved
//! with its `data`, which is JSON `null` when the field is null or absent.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use tracing::{debug, info, warn};

use super::{FetchCache, FetchFailure, Slot};

/// One key of a transferred store.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TransferEntry {
    #[serde(default)]
    pub data: Option<Value>,
    #[serde(default)]
    pub error: Option<String>,
}

impl TransferEntry {
    fn from_slot(slot: &Slot) -> Self {
        match slot {
            Slot::Pending { .. } => Self::default(),
            Slot::Resolved(data) => Self {
                data: Some(data.clone()),
                error: None,
            },
            Slot::Failed(failure) => Self {
                data: None,
                error: Some(failure.message().to_owned()),
            },
        }
    }

    /// The settled slot this entry installs.
    ///
    /// An error message wins over data; a settled entry holds one or the other.
    fn into_slot(self) -> Slot {
        match self.error {
            Some(message) => Slot::Failed(FetchFailure::new(message)),
            None => Slot::Resolved(self.data.unwrap_or(Value::Null)),
        }
    }

    fn into_value(self) -> Value {
        let mut obj = Map::with_capacity(2);
        obj.insert("data".to_owned(), self.data.unwrap_or(Value::Null));
        obj.insert(
            "error".to_owned(),
            self.error.map_or(Value::Null, Value::String),
        );
        Value::Object(obj)
    }
}

/// A transportable, handle-free copy of a store, ordered by key.
pub type Snapshot = BTreeMap<String, TransferEntry>;

/// What [`FetchCache::load`] did with its input.
///
/// Loading never fails from the caller's point of view: a snapshot that does
/// not parse is discarded and the store is left exactly as it was.
#[derive(Debug)]
pub enum Hydration {
    /// The snapshot was installed.
    Loaded {
        /// Keys written into the store.
        installed: usize,
    },
    /// The input did not parse; nothing was installed.
    Discarded(serde_json::Error),
}

impl Hydration {
    /// Returns `true` if the snapshot was installed.
    pub fn is_loaded(&self) -> bool {
        matches!(self, Self::Loaded { .. })
    }
}

impl FetchCache {
    /// Captures every entry of the store.
    ///
    /// Pending entries appear with both fields empty; their in-flight
    /// handles are not part of the snapshot.
    pub fn snapshot(&self) -> Snapshot {
        self.inner
            .entries
            .lock()
            .iter()
            .map(|(key, slot)| (key.clone(), TransferEntry::from_slot(slot)))
            .collect()
    }

    /// Serializes the store as a JSON string of `{key: {data, error}}`.
    pub fn dump(&self) -> String {
        let snapshot = self.snapshot();
        let count = snapshot.len();
        let obj: Map<String, Value> = snapshot
            .into_iter()
            .map(|(key, entry)| (key, entry.into_value()))
            .collect();
        debug!(entries = count, "cache dumped");
        Value::Object(obj).to_string()
    }

    /// Installs a string produced by [`dump`](Self::dump).
    ///
    /// Every key becomes resolved or failed directly from its transported
    /// fields, replacing whatever the store held for it. Loading the same
    /// snapshot twice leaves the same store as loading it once.
    ///
    /// Malformed input is **not** an error: it is logged, reported as
    /// [`Hydration::Discarded`], and the store is untouched.
    pub fn load(&self, raw: &str) -> Hydration {
        match serde_json::from_str::<Snapshot>(raw) {
            Ok(snapshot) => self.install(snapshot),
            Err(e) => {
                warn!(error = %e, "discarding malformed cache snapshot");
                Hydration::Discarded(e)
            }
        }
    }

    /// Installs an already-parsed snapshot. See [`load`](Self::load).
    pub fn install(&self, snapshot: Snapshot) -> Hydration {
        let installed = snapshot.len();
        {
            let mut entries = self.inner.entries.lock();
            for (key, entry) in snapshot {
                entries.insert(key, entry.into_slot());
            }
        }
        self.bump();
        info!(installed, "cache hydrated");
        Hydration::Loaded { installed }
    }
}
