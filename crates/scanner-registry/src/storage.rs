//! # L2 On-Disk Cache Storage
//!
//! The disk-resident layer of the multi-layer cache (spec §4.6), backed by
//! Sled. Keys are opaque strings (the caller, [`crate::cache::Cache`],
//! derives them via [`crate::canonicalize::cache_key`] or an artifact
//! fingerprint); values are opaque serialized bytes.
//!
//! Sled is log-structured and durable, so entries survive process restarts
//! — the point of having an L2 at all rather than relying solely on the
//! in-process LRU.

use crate::error::Result;
use std::path::Path;

const ENTRY_TREE: &str = "cache_entries";

#[derive(Clone)]
pub struct Storage {
    db: sled::Db,
    entries: sled::Tree,
}

impl Storage {
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
        let db = sled::open(path)?;
        let entries = db.open_tree(ENTRY_TREE)?;
        Ok(Storage { db, entries })
    }

    /// In-memory store for tests; discarded on drop.
    pub fn temporary() -> Result<Self> {
        let db = sled::Config::new().temporary(true).open()?;
        let entries = db.open_tree(ENTRY_TREE)?;
        Ok(Storage { db, entries })
    }

    pub fn get(&self, key: &str) -> Result<Option<Vec<u8>>> {
        Ok(self.entries.get(key.as_bytes())?.map(|ivec| ivec.to_vec()))
    }

    pub fn put(&self, key: &str, bytes: &[u8]) -> Result<()> {
        self.entries.insert(key.as_bytes(), bytes)?;
        Ok(())
    }

    pub fn remove(&self, key: &str) -> Result<bool> {
        Ok(self.entries.remove(key.as_bytes())?.is_some())
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn flush(&self) -> Result<usize> {
        Ok(self.db.flush()?)
    }
}

impl std::fmt::Debug for Storage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Storage").field("entries", &self.len()).finish()
    }
}
