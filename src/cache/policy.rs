use clap::ValueEnum;

use super::CachedStatement;

/// Which entry to sacrifice when the cache is full.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, ValueEnum)]
pub enum EvictionPolicy {
    /// Evict the entry with the oldest `last_used`.
    #[default]
    Lru,
    /// Evict the entry with the smallest `use_count`.
    Lfu,
    /// Evict the entry with the oldest `compiled_at`.
    Fifo,
}

impl EvictionPolicy {
    /// Pick the victim key among current entries, or `None` when empty.
    pub(crate) fn select_victim<'a>(
        self,
        entries: impl Iterator<Item = &'a CachedStatement>,
    ) -> Option<u64> {
        let victim = match self {
            EvictionPolicy::Lru => entries.min_by_key(|e| e.last_used),
            EvictionPolicy::Lfu => entries.min_by_key(|e| (e.use_count, e.compiled_at)),
            EvictionPolicy::Fifo => entries.min_by_key(|e| e.compiled_at),
        };
        victim.map(|e| e.key)
    }
}
