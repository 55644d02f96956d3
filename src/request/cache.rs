//! TTL-bound response cache.
//!
//! The lazy freshness check in [`CacheStore::get`] is authoritative. When a
//! tokio runtime is available, `set` additionally schedules a one-shot
//! eviction so expired entries do not linger until the next read.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, Weak};
use std::time::Duration;
use tokio::time::Instant;
use tracing::debug;

use super::descriptor::RequestDescriptor;
use super::key::{stringify_map, ArrayFormat};
use super::lock;

#[derive(Debug, Clone)]
struct CacheEntry<T> {
    data: T,
    stored_at: Instant,
    ttl: Option<Duration>,
    /// Write generation; scheduled evictions only remove the write that scheduled them.
    stamp: u64,
}

#[derive(Debug)]
struct CacheInner<T> {
    entries: HashMap<String, CacheEntry<T>>,
    next_stamp: u64,
}

/// Keyed storage of previous successful responses.
#[derive(Debug)]
pub struct CacheStore<T> {
    inner: Arc<Mutex<CacheInner<T>>>,
}

impl<T> Default for CacheStore<T> {
    fn default() -> Self {
        Self {
            inner: Arc::new(Mutex::new(CacheInner {
                entries: HashMap::new(),
                next_stamp: 0,
            })),
        }
    }
}

impl<T> CacheStore<T>
where
    T: Clone + Send + 'static,
{
    pub fn new() -> Self {
        Self::default()
    }

    /// Cache key for a descriptor: `custom_key` if given, else `METHOD:URL?sortedParams`.
    pub fn generate_key(descriptor: &RequestDescriptor, custom_key: Option<&str>) -> String {
        if let Some(key) = custom_key.filter(|key| !key.is_empty()) {
            return key.to_string();
        }
        let params = stringify_map(&descriptor.params, ArrayFormat::Repeat);
        format!("{}:{}?{params}", descriptor.method, descriptor.url)
    }

    /// Return cached data while it is fresh.
    ///
    /// `ttl` overrides the ttl recorded at write time. Stale entries are
    /// evicted on the way out.
    pub fn get(&self, key: &str, ttl: Option<Duration>) -> Option<T> {
        let mut inner = lock(&self.inner);
        let entry = inner.entries.get(key)?;
        let fresh = match ttl.or(entry.ttl) {
            None => true,
            Some(ttl) => entry.stored_at.elapsed() < ttl,
        };
        if fresh {
            return Some(entry.data.clone());
        }
        inner.entries.remove(key);
        debug!(key, "evicted stale cache entry on read");
        None
    }

    /// Store data stamped with the current time.
    pub fn set(&self, key: &str, data: T, ttl: Option<Duration>) {
        let stamp = {
            let mut inner = lock(&self.inner);
            inner.next_stamp = inner.next_stamp.wrapping_add(1);
            let stamp = inner.next_stamp;
            inner.entries.insert(
                key.to_string(),
                CacheEntry {
                    data,
                    stored_at: Instant::now(),
                    ttl,
                    stamp,
                },
            );
            stamp
        };
        if let Some(ttl) = ttl {
            self.schedule_eviction(key.to_string(), stamp, ttl);
        }
    }

    pub fn delete(&self, key: &str) {
        lock(&self.inner).entries.remove(key);
    }

    pub fn clear(&self) {
        lock(&self.inner).entries.clear();
    }

    pub fn size(&self) -> usize {
        lock(&self.inner).entries.len()
    }

    fn schedule_eviction(&self, key: String, stamp: u64, ttl: Duration) {
        let Ok(handle) = tokio::runtime::Handle::try_current() else {
            return;
        };
        let inner: Weak<Mutex<CacheInner<T>>> = Arc::downgrade(&self.inner);
        handle.spawn(async move {
            tokio::time::sleep(ttl).await;
            let Some(inner) = inner.upgrade() else {
                return;
            };
            let mut inner = lock(&inner);
            if inner
                .entries
                .get(&key)
                .is_some_and(|entry| entry.stamp == stamp)
            {
                inner.entries.remove(&key);
                debug!(key = %key, "evicted expired cache entry");
            }
        });
    }
}
