use std::collections::HashMap;
use std::time::Instant;

use bytes::Bytes;
use parking_lot::Mutex;

/// A bounded piece cache with batch eviction.
///
/// Entries carry a last-touch timestamp that both inserts and reads
/// refresh. When an insert finds the cache full, the oldest quarter of
/// the entries (plus one) is evicted in a single pass, so a burst of
/// inserts does not evict one-by-one. Timestamp ties are broken by
/// insertion order.
pub struct PieceCache {
    max_count: usize,
    inner: Mutex<CacheInner>,
}

struct CacheInner {
    records: HashMap<u32, CacheRecord>,
    next_seq: u64,
}

struct CacheRecord {
    data: Bytes,
    last_touch: Instant,
    seq: u64,
}

impl PieceCache {
    pub fn new(max_count: usize) -> Self {
        Self {
            max_count,
            inner: Mutex::new(CacheInner {
                records: HashMap::new(),
                next_seq: 0,
            }),
        }
    }

    /// Inserts or replaces a piece, evicting first when full.
    pub fn put(&self, index: u32, data: Bytes) {
        let mut inner = self.inner.lock();

        if inner.records.len() >= self.max_count && !inner.records.contains_key(&index) {
            purge(&mut inner);
        }

        let seq = inner.next_seq;
        inner.next_seq += 1;
        inner.records.insert(
            index,
            CacheRecord {
                data,
                last_touch: Instant::now(),
                seq,
            },
        );
    }

    /// Looks up a piece, refreshing its last-touch timestamp on a hit.
    pub fn get(&self, index: u32) -> Option<Bytes> {
        let mut inner = self.inner.lock();
        let inner = &mut *inner;

        let record = inner.records.get_mut(&index)?;
        record.last_touch = Instant::now();
        record.seq = inner.next_seq;
        inner.next_seq += 1;

        Some(record.data.clone())
    }

    pub fn len(&self) -> usize {
        self.inner.lock().records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn contains(&self, index: u32) -> bool {
        self.inner.lock().records.contains_key(&index)
    }
}

fn purge(inner: &mut CacheInner) {
    let mut order: Vec<(u32, Instant, u64)> = inner
        .records
        .iter()
        .map(|(&index, record)| (index, record.last_touch, record.seq))
        .collect();
    order.sort_by_key(|&(_, last_touch, seq)| (last_touch, seq));

    let to_delete = inner.records.len() / 4 + 1;
    for &(index, _, _) in order.iter().take(to_delete) {
        inner.records.remove(&index);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn filled(cache: &PieceCache, indexes: &[u32]) {
        for &index in indexes {
            cache.put(index, Bytes::from(vec![index as u8]));
        }
    }

    #[test]
    fn get_returns_what_was_put() {
        let cache = PieceCache::new(4);
        cache.put(7, Bytes::from_static(b"seven"));

        assert_eq!(cache.get(7), Some(Bytes::from_static(b"seven")));
        assert_eq!(cache.get(8), None);
    }

    #[test]
    fn size_never_exceeds_max_count() {
        let cache = PieceCache::new(8);
        for index in 0..100 {
            cache.put(index, Bytes::from(vec![0u8; 4]));
            assert!(cache.len() <= 8);
        }
    }

    #[test]
    fn eviction_removes_oldest_quarter_plus_one() {
        let cache = PieceCache::new(4);
        filled(&cache, &[1, 2, 3, 4]);

        // Touch 1 so it is the most recently used entry.
        assert!(cache.get(1).is_some());

        cache.put(5, Bytes::from_static(b"five"));

        // 2 and 3 were the two oldest and must be gone.
        assert!(cache.contains(1));
        assert!(!cache.contains(2));
        assert!(!cache.contains(3));
        assert!(cache.contains(4));
        assert!(cache.contains(5));
    }

    #[test]
    fn replacing_an_entry_does_not_evict() {
        let cache = PieceCache::new(4);
        filled(&cache, &[1, 2, 3, 4]);

        cache.put(2, Bytes::from_static(b"new"));

        assert_eq!(cache.len(), 4);
        assert!(cache.contains(1));
        assert_eq!(cache.get(2), Some(Bytes::from_static(b"new")));
    }
}
