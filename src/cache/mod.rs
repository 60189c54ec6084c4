//! Prepared-statement metadata cache.
//!
//! Caches normalized-statement metadata only, never result rows; result
//! caching would break transactional freshness.

mod policy;

pub use policy::EvictionPolicy;

use std::collections::HashMap;
use std::collections::hash_map::DefaultHasher;
use std::hash::{Hash, Hasher};
use std::time::Instant;

/// Metadata for one cached statement. Owned exclusively by the cache.
#[derive(Debug, Clone)]
pub struct CachedStatement {
    pub key: u64,
    pub sql: String,
    pub compiled_at: Instant,
    pub last_used: Instant,
    pub use_count: u64,
}

/// Counters reported by [`StatementCache::stats`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CacheStats {
    pub hits: u64,
    pub misses: u64,
    pub evictions: u64,
    pub size: usize,
    /// Rough bytes held by cached SQL text and entry bookkeeping.
    pub memory_estimate: usize,
}

/// Fingerprint of a statement: whitespace-collapsed, case-folded, hashed.
#[must_use]
pub fn fingerprint(sql: &str) -> u64 {
    let mut hasher = DefaultHasher::new();
    for token in sql.split_whitespace() {
        token.to_lowercase().hash(&mut hasher);
    }
    hasher.finish()
}

/// Bounded statement cache with a pluggable eviction policy.
#[derive(Debug)]
pub struct StatementCache {
    entries: HashMap<u64, CachedStatement>,
    max_size: usize,
    policy: EvictionPolicy,
    hits: u64,
    misses: u64,
    evictions: u64,
}

impl StatementCache {
    #[must_use]
    pub fn new(max_size: usize, policy: EvictionPolicy) -> Self {
        Self {
            entries: HashMap::with_capacity(max_size.min(1024)),
            max_size: max_size.max(1),
            policy,
            hits: 0,
            misses: 0,
            evictions: 0,
        }
    }

    /// Look up a statement, updating recency and counters. Returns whether
    /// the statement was already cached.
    pub fn lookup(&mut self, sql: &str) -> bool {
        let key = fingerprint(sql);
        match self.entries.get_mut(&key) {
            Some(entry) => {
                entry.last_used = Instant::now();
                entry.use_count += 1;
                self.hits += 1;
                true
            }
            None => {
                self.misses += 1;
                false
            }
        }
    }

    /// Insert a statement, evicting one victim first when at capacity.
    /// Inserting an already-cached statement refreshes it in place.
    pub fn insert(&mut self, sql: &str) {
        let key = fingerprint(sql);
        let now = Instant::now();

        if let Some(entry) = self.entries.get_mut(&key) {
            entry.last_used = now;
            entry.use_count += 1;
            return;
        }

        if self.entries.len() >= self.max_size
            && let Some(victim) = self.policy.select_victim(self.entries.values())
        {
            self.entries.remove(&victim);
            self.evictions += 1;
        }

        self.entries.insert(
            key,
            CachedStatement {
                key,
                sql: sql.to_string(),
                compiled_at: now,
                last_used: now,
                use_count: 1,
            },
        );
    }

    /// Remove one statement. Returns whether it was present.
    pub fn invalidate(&mut self, sql: &str) -> bool {
        self.entries.remove(&fingerprint(sql)).is_some()
    }

    /// Drop every entry.
    pub fn clear(&mut self) {
        self.entries.clear();
    }

    #[must_use]
    pub fn stats(&self) -> CacheStats {
        let memory_estimate = self
            .entries
            .values()
            .map(|e| e.sql.len() + std::mem::size_of::<CachedStatement>())
            .sum();
        CacheStats {
            hits: self.hits,
            misses: self.misses,
            evictions: self.evictions,
            size: self.entries.len(),
            memory_estimate,
        }
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}
