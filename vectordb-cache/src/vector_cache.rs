//! Byte-bounded LRU cache from vector id to the full record.

use lru::LruCache;
use parking_lot::Mutex;
use std::num::NonZeroUsize;
use vectordb_core::id::VectorId;
use vectordb_core::types::record::VectorRecord;

struct Inner {
    entries: LruCache<VectorId, (VectorRecord, usize)>,
    current_bytes: usize,
}

/// LRU cache over [`VectorRecord`]s, bounded by estimated total byte size
/// rather than entry count.
pub struct VectorCache {
    max_bytes: usize,
    inner: Mutex<Inner>,
}

impl std::fmt::Debug for VectorCache {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let inner = self.inner.lock();
        f.debug_struct("VectorCache")
            .field("max_bytes", &self.max_bytes)
            .field("current_bytes", &inner.current_bytes)
            .field("len", &inner.entries.len())
            .finish()
    }
}

impl VectorCache {
    #[must_use]
    pub fn new(max_bytes: usize) -> Self {
        Self {
            max_bytes,
            inner: Mutex::new(Inner {
                entries: LruCache::unbounded(),
                current_bytes: 0,
            }),
        }
    }

    /// Fetch a record, marking it most-recently-used.
    #[must_use]
    pub fn get(&self, id: &VectorId) -> Option<VectorRecord> {
        let mut inner = self.inner.lock();
        inner.entries.get(id).map(|(record, _)| record.clone())
    }

    /// Insert or replace `id`'s entry, evicting least-recently-used entries
    /// until the byte budget holds. A record whose own size exceeds the
    /// budget is not cached at all.
    pub fn set(&self, id: VectorId, record: VectorRecord, size_bytes: usize) {
        if size_bytes > self.max_bytes {
            return;
        }

        let mut inner = self.inner.lock();
        if let Some((_, old_size)) = inner.entries.peek(&id) {
            inner.current_bytes -= *old_size;
        }
        inner.entries.put(id, (record, size_bytes));
        inner.current_bytes += size_bytes;

        while inner.current_bytes > self.max_bytes {
            let Some((_, (_, evicted_size))) = inner.entries.pop_lru() else {
                break;
            };
            inner.current_bytes -= evicted_size;
        }
    }

    /// Remove `id`'s entry, if present. A no-op if absent.
    pub fn delete(&self, id: &VectorId) {
        let mut inner = self.inner.lock();
        if let Some((_, size)) = inner.entries.pop(id) {
            inner.current_bytes -= size;
        }
    }

    /// Empty the cache and reset the byte counter.
    pub fn clear(&self) {
        let mut inner = self.inner.lock();
        inner.entries.clear();
        inner.current_bytes = 0;
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.inner.lock().entries.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    #[must_use]
    pub fn current_bytes(&self) -> usize {
        self.inner.lock().current_bytes
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn record(id: &str, dims: usize) -> VectorRecord {
        VectorRecord::new(VectorId::from_raw(id), vec![0.0; dims], HashMap::new())
    }

    #[test]
    fn get_after_set_returns_clone() {
        let cache = VectorCache::new(1_000);
        let r = record("a", 4);
        cache.set(VectorId::from_raw("a"), r.clone(), r.estimated_size_bytes());
        let fetched = cache.get(&VectorId::from_raw("a")).unwrap();
        assert_eq!(fetched.id, r.id);
    }

    #[test]
    fn get_on_absent_id_is_none() {
        let cache = VectorCache::new(1_000);
        assert!(cache.get(&VectorId::from_raw("ghost")).is_none());
    }

    #[test]
    fn eviction_respects_byte_budget() {
        // Each record's estimated size is roughly 4*4 + 100 = 116 bytes plus
        // empty-metadata json overhead; budget two entries, insert three.
        let size = record("x", 4).estimated_size_bytes();
        let cache = VectorCache::new(size * 2);

        for name in ["a", "b", "c"] {
            let r = record(name, 4);
            cache.set(VectorId::from_raw(name), r.clone(), r.estimated_size_bytes());
        }

        assert_eq!(cache.len(), 2);
        assert!(cache.get(&VectorId::from_raw("a")).is_none());
        assert!(cache.get(&VectorId::from_raw("c")).is_some());
        assert!(cache.current_bytes() <= size * 2);
    }

    #[test]
    fn record_larger_than_budget_is_not_cached() {
        let cache = VectorCache::new(10);
        let r = record("huge", 100);
        cache.set(VectorId::from_raw("huge"), r.clone(), r.estimated_size_bytes());
        assert!(cache.is_empty());
    }

    #[test]
    fn delete_is_idempotent() {
        let cache = VectorCache::new(1_000);
        let r = record("a", 4);
        cache.set(VectorId::from_raw("a"), r.clone(), r.estimated_size_bytes());
        cache.delete(&VectorId::from_raw("a"));
        cache.delete(&VectorId::from_raw("a"));
        assert!(cache.is_empty());
        assert_eq!(cache.current_bytes(), 0);
    }

    #[test]
    fn clear_resets_map_and_byte_counter() {
        let cache = VectorCache::new(1_000);
        for name in ["a", "b"] {
            let r = record(name, 4);
            cache.set(VectorId::from_raw(name), r.clone(), r.estimated_size_bytes());
        }
        cache.clear();
        assert!(cache.is_empty());
        assert_eq!(cache.current_bytes(), 0);
    }

    #[test]
    fn re_setting_existing_id_updates_byte_accounting() {
        let cache = VectorCache::new(1_000);
        let small = record("a", 4);
        cache.set(VectorId::from_raw("a"), small.clone(), small.estimated_size_bytes());
        let larger = record("a", 40);
        cache.set(VectorId::from_raw("a"), larger.clone(), larger.estimated_size_bytes());

        assert_eq!(cache.len(), 1);
        assert_eq!(cache.current_bytes(), larger.estimated_size_bytes());
    }
}
