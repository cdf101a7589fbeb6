//! In-memory TTL cache for list query results.
//!
//! Each resource manager owns exactly one [`TtlCache`]; caches are never
//! shared between managers. Expiry is lazy: an entry older than the TTL is
//! dropped the next time it is read or when [`TtlCache::clear_expired`] runs.
//! The map sits behind an async lock, so one manager may be used from several
//! tasks at once.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};

use tokio::sync::RwLock;

use crate::clock::{Clock, SystemClock};
use crate::query::QueryFingerprint;
use crate::{ResourceId, ResourceRecord};

/// Defines the behavior of the in-memory cache for a list call.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum CacheMode {
    /// Read from the cache if a non-expired entry is present;
    /// otherwise, fetch from the network and write the response to the cache. (Default)
    #[default]
    Use,
    /// Always fetch from the network, bypassing any cached entry,
    /// and write the new response to the cache.
    Refresh,
    /// Always fetch from the network and do not read from or write to the cache.
    Bypass,
}

impl CacheMode {
    pub const fn from_use_cache(use_cache: bool) -> Self {
        if use_cache {
            Self::Use
        } else {
            Self::Bypass
        }
    }

    pub const fn reads(self) -> bool {
        matches!(self, Self::Use)
    }

    pub const fn writes(self) -> bool {
        !matches!(self, Self::Bypass)
    }
}

/// Cached result set of one query.
#[derive(Debug, Clone)]
pub struct CacheEntry {
    pub fingerprint: QueryFingerprint,
    pub captured_at: Instant,
    pub payload: Vec<ResourceRecord>,
}

impl CacheEntry {
    /// Whether the payload holds `id` itself or a direct child of `id`.
    pub fn references(&self, id: &ResourceId) -> bool {
        self.payload
            .iter()
            .any(|record| record.id() == id || record.parent_id().as_ref() == Some(id))
    }
}

#[derive(Debug)]
struct CacheInner {
    map: HashMap<QueryFingerprint, CacheEntry>,
}

/// Fingerprint-keyed cache with lazy TTL expiry.
#[derive(Clone)]
pub struct TtlCache {
    inner: Arc<RwLock<CacheInner>>,
    ttl: Duration,
    clock: Arc<dyn Clock>,
}

impl std::fmt::Debug for TtlCache {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TtlCache").field("ttl", &self.ttl).finish()
    }
}

impl TtlCache {
    pub fn new(ttl: Duration, clock: Arc<dyn Clock>) -> Self {
        Self {
            inner: Arc::new(RwLock::new(CacheInner {
                map: HashMap::new(),
            })),
            ttl,
            clock,
        }
    }

    /// Cache with the default TTL of 5 minutes on the system clock.
    pub fn with_default_ttl() -> Self {
        Self::new(Duration::from_secs(300), Arc::new(SystemClock))
    }

    /// A cache that never stores anything.
    pub fn disabled() -> Self {
        Self::new(Duration::ZERO, Arc::new(SystemClock))
    }

    pub const fn ttl(&self) -> Duration {
        self.ttl
    }

    pub fn is_disabled(&self) -> bool {
        self.ttl == Duration::ZERO
    }

    fn is_fresh(&self, entry: &CacheEntry, now: Instant) -> bool {
        now.saturating_duration_since(entry.captured_at) < self.ttl
    }

    /// Returns the entry for `fingerprint` if present and younger than the TTL.
    /// A stale entry is removed.
    pub async fn get(&self, fingerprint: &QueryFingerprint) -> Option<CacheEntry> {
        let now = self.clock.now();
        {
            let store = self.inner.read().await;
            match store.map.get(fingerprint) {
                None => return None,
                Some(entry) if self.is_fresh(entry, now) => return Some(entry.clone()),
                Some(_) => {}
            }
        }

        let mut store = self.inner.write().await;
        if store
            .map
            .get(fingerprint)
            .is_some_and(|entry| !self.is_fresh(entry, now))
        {
            store.map.remove(fingerprint);
        }
        None
    }

    /// Stores `payload` under `fingerprint`, stamped with the current time.
    /// No-op when the cache is disabled.
    pub async fn put(&self, fingerprint: QueryFingerprint, payload: Vec<ResourceRecord>) {
        if self.is_disabled() {
            return;
        }

        let entry = CacheEntry {
            fingerprint: fingerprint.clone(),
            captured_at: self.clock.now(),
            payload,
        };
        let mut store = self.inner.write().await;
        store.map.insert(fingerprint, entry);
    }

    /// Removes every entry matching `predicate`; returns how many were removed.
    pub async fn invalidate<P>(&self, predicate: P) -> usize
    where
        P: Fn(&CacheEntry) -> bool,
    {
        let mut store = self.inner.write().await;
        let before = store.map.len();
        store.map.retain(|_, entry| !predicate(entry));
        before - store.map.len()
    }

    /// Removes every entry associated with `id`: fingerprints naming it and
    /// payloads containing it or its direct children.
    pub async fn invalidate_resource(&self, id: &ResourceId) -> usize {
        self.invalidate(|entry| entry.fingerprint.mentions(id) || entry.references(id))
            .await
    }

    /// Remove expired entries from the cache.
    pub async fn clear_expired(&self) {
        let now = self.clock.now();
        let mut store = self.inner.write().await;
        store.map.retain(|_, entry| self.is_fresh(entry, now));
    }

    /// Clear all entries from the cache.
    pub async fn clear(&self) {
        let mut store = self.inner.write().await;
        store.map.clear();
    }

    /// Number of entries held, including ones not yet found to be expired.
    pub async fn len(&self) -> usize {
        self.inner.read().await.map.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }
}
