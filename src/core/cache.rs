//! Bounded cache of complete analysis results.
//!
//! Capacity is a hard ceiling, not a working set: once the cache is full,
//! new keys are silently refused until `clear()` is called. There is no
//! LRU/LFU eviction.

use std::collections::HashMap;

use serde::Serialize;
use sha2::{Digest, Sha256};

/// Fixed-capacity key → value map with hit accounting
#[derive(Debug)]
pub struct ResultCache<V> {
    entries: HashMap<String, V>,
    capacity: usize,
    hits: u64,
    misses: u64,
}

impl<V> ResultCache<V> {
    /// Create an empty cache holding at most `capacity` entries
    pub fn new(capacity: usize) -> Self {
        Self {
            entries: HashMap::new(),
            capacity,
            hits: 0,
            misses: 0,
        }
    }

    /// Look up a key, counting the hit or miss
    pub fn lookup(&mut self, key: &str) -> Option<&V> {
        match self.entries.get(key) {
            Some(value) => {
                self.hits += 1;
                Some(value)
            }
            None => {
                self.misses += 1;
                None
            }
        }
    }

    /// Insert a value. Returns false (and stores nothing) when the cache is
    /// full and the key is new.
    pub fn insert(&mut self, key: String, value: V) -> bool {
        if self.entries.len() >= self.capacity && !self.entries.contains_key(&key) {
            return false;
        }
        self.entries.insert(key, value);
        true
    }

    /// Remove every entry
    pub fn clear(&mut self) {
        self.entries.clear();
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn is_full(&self) -> bool {
        self.entries.len() >= self.capacity
    }

    /// Lookups that found an entry
    pub fn hits(&self) -> u64 {
        self.hits
    }

    /// Lookups that found nothing
    pub fn misses(&self) -> u64 {
        self.misses
    }
}

/// Generate a cache key for an (options, input) pair.
///
/// Format: "{scope}:{hash32}". Structurally identical requests for the same
/// scope always produce the same key: both sides go through
/// `serde_json::Value`, whose maps are sorted, so `HashMap` iteration order
/// never leaks into the hash.
pub fn generate_cache_key<I, O>(scope: &str, input: &I, options: &O) -> serde_json::Result<String>
where
    I: Serialize + ?Sized,
    O: Serialize + ?Sized,
{
    let options_json = serde_json::to_vec(&serde_json::to_value(options)?)?;
    let input_json = serde_json::to_vec(&serde_json::to_value(input)?)?;

    let mut hasher = Sha256::new();
    hasher.update(&options_json);
    hasher.update([0u8]);
    hasher.update(&input_json);
    let digest = hasher.finalize();

    Ok(format!("{}:{}", scope, hex::encode(&digest[..16])))
}
