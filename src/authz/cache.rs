//! Memoized resolver results.
//!
//! Entries are keyed by `(version, identity, resource)`; a mutation never has
//! to touch the cache because new versions simply miss. Superseded entries
//! are the first to go when a stripe fills up.

use std::collections::hash_map::RandomState;
use std::hash::BuildHasher;
use std::num::NonZeroUsize;
use std::sync::atomic::{AtomicU64, Ordering};

use lru::LruCache;
use parking_lot::Mutex;

use crate::authz::errors::{AuthzError, AuthzResult};
use crate::authz::types::{NodeId, PermissionSet};

/// Entries inspected from the LRU end when looking for a superseded victim.
const SUPERSEDED_SCAN: usize = 32;

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct CacheKey {
    pub version: u64,
    pub identity: NodeId,
    pub resource: NodeId,
}

impl CacheKey {
    pub fn new(version: u64, identity: &str, resource: &str) -> Self {
        Self {
            version,
            identity: NodeId::new(identity),
            resource: NodeId::new(resource),
        }
    }
}

#[derive(Debug, Clone)]
struct CacheEntry {
    /// Key the value was computed for; checked again on every hit.
    key: CacheKey,
    value: PermissionSet,
}

#[derive(Debug, Default)]
struct AtomicCacheStats {
    hits: AtomicU64,
    misses: AtomicU64,
    evictions: AtomicU64,
    superseded_evictions: AtomicU64,
    inconsistencies: AtomicU64,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CacheStats {
    pub hits: u64,
    pub misses: u64,
    pub evictions: u64,
    pub superseded_evictions: u64,
    pub inconsistencies: u64,
    pub entries: usize,
}

/// Bounded, striped LRU cache of effective permission sets.
pub struct ResolutionCache {
    stripes: Box<[Mutex<LruCache<CacheKey, CacheEntry>>]>,
    hasher: RandomState,
    newest_version: AtomicU64,
    stats: AtomicCacheStats,
}

impl ResolutionCache {
    /// `capacity` is the total entry budget, split evenly across `stripes`.
    pub fn new(capacity: NonZeroUsize, stripes: NonZeroUsize) -> Self {
        let stripe_count = stripes.get().min(capacity.get());
        let per_stripe = NonZeroUsize::new(capacity.get().div_ceil(stripe_count))
            .unwrap_or(NonZeroUsize::MIN);
        let stripes = (0..stripe_count)
            .map(|_| Mutex::new(LruCache::new(per_stripe)))
            .collect();
        Self {
            stripes,
            hasher: RandomState::new(),
            newest_version: AtomicU64::new(0),
            stats: AtomicCacheStats::default(),
        }
    }

    pub fn get(
        &self,
        version: u64,
        identity: &str,
        resource: &str,
    ) -> AuthzResult<Option<PermissionSet>> {
        let key = CacheKey::new(version, identity, resource);
        let mut stripe = self.stripe(&key).lock();

        let (stored, value) = match stripe.get(&key) {
            Some(entry) => (entry.key.clone(), entry.value.clone()),
            None => {
                self.stats.misses.fetch_add(1, Ordering::Relaxed);
                return Ok(None);
            }
        };
        if stored != key {
            stripe.pop(&key);
            self.stats.inconsistencies.fetch_add(1, Ordering::Relaxed);
            tracing::error!(?key, ?stored, "cache entry does not match its key");
            return Err(AuthzError::CacheInconsistency(format!(
                "entry stored under {key:?} was computed for {stored:?}"
            )));
        }

        self.stats.hits.fetch_add(1, Ordering::Relaxed);
        Ok(Some(value))
    }

    pub fn put(&self, version: u64, identity: &str, resource: &str, value: PermissionSet) {
        self.observe_version(version);
        let newest = self.newest_version.load(Ordering::Acquire);
        let key = CacheKey::new(version, identity, resource);
        let mut stripe = self.stripe(&key).lock();

        if !stripe.contains(&key) && stripe.len() >= stripe.cap().get() {
            let superseded = stripe
                .iter()
                .rev()
                .take(SUPERSEDED_SCAN)
                .find(|(k, _)| k.version < newest)
                .map(|(k, _)| k.clone());
            let evicted = match superseded {
                Some(old) => {
                    self.stats
                        .superseded_evictions
                        .fetch_add(1, Ordering::Relaxed);
                    stripe.pop(&old).is_some()
                }
                None => stripe.pop_lru().is_some(),
            };
            if evicted {
                self.stats.evictions.fetch_add(1, Ordering::Relaxed);
            }
        }

        stripe.put(key.clone(), CacheEntry { key, value });
    }

    /// Record that `version` exists. Entries for older versions become
    /// preferred eviction candidates.
    pub fn observe_version(&self, version: u64) {
        self.newest_version.fetch_max(version, Ordering::AcqRel);
    }

    pub fn newest_version(&self) -> u64 {
        self.newest_version.load(Ordering::Acquire)
    }

    /// Drop every entry older than the newest observed version.
    pub fn purge_superseded(&self) -> usize {
        let newest = self.newest_version();
        let mut purged = 0;
        for stripe in self.stripes.iter() {
            let mut stripe = stripe.lock();
            let stale: Vec<CacheKey> = stripe
                .iter()
                .filter(|(k, _)| k.version < newest)
                .map(|(k, _)| k.clone())
                .collect();
            for key in stale {
                if stripe.pop(&key).is_some() {
                    purged += 1;
                }
            }
        }
        if purged > 0 {
            self.stats
                .evictions
                .fetch_add(purged as u64, Ordering::Relaxed);
            tracing::debug!(purged, newest, "purged superseded cache entries");
        }
        purged
    }

    pub fn clear(&self) {
        for stripe in self.stripes.iter() {
            stripe.lock().clear();
        }
    }

    pub fn len(&self) -> usize {
        self.stripes.iter().map(|s| s.lock().len()).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn capacity(&self) -> usize {
        self.stripes.iter().map(|s| s.lock().cap().get()).sum()
    }

    pub fn stripe_count(&self) -> usize {
        self.stripes.len()
    }

    pub fn stats(&self) -> CacheStats {
        CacheStats {
            hits: self.stats.hits.load(Ordering::Relaxed),
            misses: self.stats.misses.load(Ordering::Relaxed),
            evictions: self.stats.evictions.load(Ordering::Relaxed),
            superseded_evictions: self.stats.superseded_evictions.load(Ordering::Relaxed),
            inconsistencies: self.stats.inconsistencies.load(Ordering::Relaxed),
            entries: self.len(),
        }
    }

    fn stripe(&self, key: &CacheKey) -> &Mutex<LruCache<CacheKey, CacheEntry>> {
        let ix = self.hasher.hash_one(key) as usize % self.stripes.len();
        &self.stripes[ix]
    }
}

impl std::fmt::Debug for ResolutionCache {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ResolutionCache")
            .field("stripes", &self.stripes.len())
            .field("newest_version", &self.newest_version())
            .finish_non_exhaustive()
    }
}
