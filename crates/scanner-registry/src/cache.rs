//! # Multi-Layer Cache (spec §4.6)
//!
//! Three layers, read in order with promotion on hit:
//!
//! - **L1** — in-process, bounded LRU (default 1000 entries).
//! - **L2** — on-disk, content-addressed ([`crate::storage::Storage`]).
//! - **L3** — optional distributed cache. No concrete provider ships with
//!   this crate; `l3_enabled` is tracked so callers can see the
//!   configuration intent, but reads/writes only ever touch L1/L2 here.
//!
//! A write fans out to every enabled layer. Entry count for L1 is enforced
//! by the `lru` crate's bounded map itself, so it never exceeds
//! `l1_max_entries` even transiently.

use chrono::{DateTime, Utc};
use lru::LruCache;
use scanner_core::CacheConfig;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::num::NonZeroUsize;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Mutex;

use crate::storage::Storage;

/// One cached value plus the bookkeeping needed to expire and audit it.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CacheEntry<V> {
    pub value: V,
    pub inserted_at: DateTime<Utc>,
    pub ttl_secs: u64,
    pub hits: u64,
}

impl<V> CacheEntry<V> {
    fn is_live(&self, now: DateTime<Utc>) -> bool {
        (now - self.inserted_at).num_seconds() < self.ttl_secs as i64
    }
}

/// Point-in-time snapshot of [`CacheStats`], returned by [`Cache::stats`].
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize)]
pub struct CacheSnapshot {
    pub hits: u64,
    pub misses: u64,
    pub evictions: u64,
    pub size: usize,
    pub hit_rate: f64,
}

#[derive(Debug, Default)]
struct CacheStats {
    hits: AtomicU64,
    misses: AtomicU64,
    evictions: AtomicU64,
}

impl CacheStats {
    fn hits(&self) -> u64 {
        self.hits.load(Ordering::Relaxed)
    }
    fn misses(&self) -> u64 {
        self.misses.load(Ordering::Relaxed)
    }
    fn evictions(&self) -> u64 {
        self.evictions.load(Ordering::Relaxed)
    }
    fn hit_rate(&self) -> f64 {
        let (h, m) = (self.hits() as f64, self.misses() as f64);
        if h + m == 0.0 {
            0.0
        } else {
            h / (h + m)
        }
    }
}

/// The cache handle. Cheap to share: clone the `Arc` that wraps it rather
/// than cloning the cache itself (it is not `Clone` — the lock and the
/// Sled handle are the single owners of their state).
pub struct Cache<V> {
    l1: Mutex<LruCache<String, CacheEntry<V>>>,
    l2: Option<Storage>,
    l3_enabled: bool,
    stats: CacheStats,
}

impl<V> Cache<V>
where
    V: Clone + Serialize + DeserializeOwned,
{
    #[must_use]
    pub fn new(config: &CacheConfig) -> Self {
        let l2 = if config.enabled && config.l2_enabled {
            Storage::open(&config.dir).ok()
        } else {
            None
        };
        Self {
            l1: Mutex::new(LruCache::new(capacity(config.l1_max_entries))),
            l2,
            l3_enabled: config.l3_enabled,
            stats: CacheStats::default(),
        }
    }

    /// An L1-only cache with no disk backing, for tests and short-lived runs.
    #[must_use]
    pub fn in_memory(l1_max_entries: usize) -> Self {
        Self {
            l1: Mutex::new(LruCache::new(capacity(l1_max_entries))),
            l2: None,
            l3_enabled: false,
            stats: CacheStats::default(),
        }
    }

    #[must_use]
    pub fn l3_enabled(&self) -> bool {
        self.l3_enabled
    }

    /// Reads L1, then L2, promoting on hit. Expired entries are evicted as
    /// they're observed rather than proactively swept.
    pub fn get(&self, key: &str) -> Option<V> {
        let now = Utc::now();

        {
            let mut l1 = self.l1.lock().expect("cache lock poisoned");
            if let Some(entry) = l1.get_mut(key) {
                if entry.is_live(now) {
                    entry.hits += 1;
                    self.stats.hits.fetch_add(1, Ordering::Relaxed);
                    return Some(entry.value.clone());
                }
                l1.pop(key);
            }
        }

        if let Some(storage) = &self.l2 {
            if let Ok(Some(bytes)) = storage.get(key) {
                if let Ok(mut entry) = serde_json::from_slice::<CacheEntry<V>>(&bytes) {
                    if entry.is_live(now) {
                        entry.hits += 1;
                        self.stats.hits.fetch_add(1, Ordering::Relaxed);
                        let value = entry.value.clone();
                        self.insert_l1(key, entry);
                        return Some(value);
                    }
                    let _ = storage.remove(key);
                }
            }
        }

        self.stats.misses.fetch_add(1, Ordering::Relaxed);
        None
    }

    /// Writes through to every enabled layer.
    pub fn put(&self, key: &str, value: V, ttl_secs: u64) {
        let entry = CacheEntry { value, inserted_at: Utc::now(), ttl_secs, hits: 0 };

        if let Some(storage) = &self.l2 {
            if let Ok(bytes) = serde_json::to_vec(&entry) {
                let _ = storage.put(key, &bytes);
            }
        }

        self.insert_l1(key, entry);
    }

    pub fn invalidate(&self, key: &str) {
        self.l1.lock().expect("cache lock poisoned").pop(key);
        if let Some(storage) = &self.l2 {
            let _ = storage.remove(key);
        }
    }

    #[must_use]
    pub fn stats(&self) -> CacheSnapshot {
        let size = self.l1.lock().expect("cache lock poisoned").len();
        CacheSnapshot {
            hits: self.stats.hits(),
            misses: self.stats.misses(),
            evictions: self.stats.evictions(),
            size,
            hit_rate: self.stats.hit_rate(),
        }
    }

    fn insert_l1(&self, key: &str, entry: CacheEntry<V>) {
        let mut l1 = self.l1.lock().expect("cache lock poisoned");
        if l1.len() == l1.cap().get() && !l1.contains(key) {
            self.stats.evictions.fetch_add(1, Ordering::Relaxed);
        }
        l1.put(key.to_string(), entry);
    }
}

fn capacity(requested: usize) -> NonZeroUsize {
    NonZeroUsize::new(requested).unwrap_or(NonZeroUsize::new(1).unwrap())
}
