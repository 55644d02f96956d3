//! In-flight request tracking and duplicate cancellation.
//!
//! Every live transport call owns one entry keyed by its identity. Adding a
//! request whose identity is already tracked aborts the older call first, so
//! only the newest request for a key can ever deliver a response.

use std::collections::HashMap;
use std::sync::Mutex;
use tokio::sync::watch;
use tracing::debug;

use super::lock;

/// Abort side of a tracked request.
#[derive(Debug)]
pub struct CancelHandle {
    tx: watch::Sender<bool>,
}

impl CancelHandle {
    pub fn cancel(&self) {
        self.tx.send_replace(true);
    }
}

/// Observer side handed to the request that may be aborted.
#[derive(Debug, Clone)]
pub struct CancelSignal {
    rx: watch::Receiver<bool>,
}

impl CancelSignal {
    pub fn is_cancelled(&self) -> bool {
        *self.rx.borrow()
    }

    /// Resolve once the request has been cancelled.
    ///
    /// Never resolves if the handle is dropped without cancelling, which is
    /// what happens when the request completes normally.
    pub async fn cancelled(&mut self) {
        if self.rx.wait_for(|cancelled| *cancelled).await.is_err() {
            std::future::pending::<()>().await;
        }
    }
}

/// Create a connected handle/signal pair.
pub fn cancel_pair() -> (CancelHandle, CancelSignal) {
    let (tx, rx) = watch::channel(false);
    (CancelHandle { tx }, CancelSignal { rx })
}

/// Proof of registration returned to the request that owns an entry.
#[derive(Debug)]
pub struct Registration {
    /// Slot the entry lives under; equals the identity key for deduplicated calls.
    pub key: String,
    pub id: u64,
    pub signal: CancelSignal,
}

#[derive(Debug)]
struct InFlightEntry {
    id: u64,
    handle: CancelHandle,
}

#[derive(Debug, Default)]
struct TrackerInner {
    entries: HashMap<String, InFlightEntry>,
    next_id: u64,
}

/// Map of identity key to the cancel handle of the live call for that key.
#[derive(Debug, Default)]
pub struct InFlightTracker {
    inner: Mutex<TrackerInner>,
}

impl InFlightTracker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a request, aborting any live call with the same identity first.
    pub fn add_pending(&self, key: &str) -> Registration {
        let mut inner = lock(&self.inner);
        if let Some(previous) = inner.entries.remove(key) {
            previous.handle.cancel();
            debug!(key, superseded = previous.id, "cancelled duplicate in-flight request");
        }
        Self::register(&mut inner, key.to_string())
    }

    /// Register a request that opted out of duplicate cancellation.
    ///
    /// It gets a private slot so it never supersedes, and is never superseded
    /// by, identical calls, while `remove_all_pending` still reaches it.
    pub fn track(&self, key: &str) -> Registration {
        let mut inner = lock(&self.inner);
        let slot = format!("{key}#{}", inner.next_id.wrapping_add(1));
        Self::register(&mut inner, slot)
    }

    /// Drop the entry for a finished request, unless a newer one replaced it.
    pub fn complete(&self, registration: &Registration) {
        let mut inner = lock(&self.inner);
        if inner
            .entries
            .get(&registration.key)
            .is_some_and(|entry| entry.id == registration.id)
        {
            inner.entries.remove(&registration.key);
        }
    }

    /// Cancel and remove whatever call is tracked under `key`.
    pub fn remove_pending(&self, key: &str) -> bool {
        let removed = lock(&self.inner).entries.remove(key);
        match removed {
            Some(entry) => {
                entry.handle.cancel();
                true
            }
            None => false,
        }
    }

    /// Abort every tracked call. Returns how many were cancelled.
    pub fn remove_all_pending(&self) -> usize {
        let drained: Vec<InFlightEntry> = lock(&self.inner)
            .entries
            .drain()
            .map(|(_, entry)| entry)
            .collect();
        for entry in &drained {
            entry.handle.cancel();
        }
        if !drained.is_empty() {
            debug!(count = drained.len(), "cancelled all in-flight requests");
        }
        drained.len()
    }

    pub fn contains(&self, key: &str) -> bool {
        lock(&self.inner).entries.contains_key(key)
    }

    pub fn len(&self) -> usize {
        lock(&self.inner).entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn register(inner: &mut TrackerInner, slot: String) -> Registration {
        inner.next_id = inner.next_id.wrapping_add(1);
        let id = inner.next_id;
        let (handle, signal) = cancel_pair();
        inner.entries.insert(slot.clone(), InFlightEntry { id, handle });
        Registration {
            key: slot,
            id,
            signal,
        }
    }
}
