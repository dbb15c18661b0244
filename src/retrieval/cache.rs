use lru::LruCache;
use parking_lot::Mutex;
use std::num::NonZeroUsize;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

use crate::retrieval::pipeline::RankedDoc;

/// Query result cache for avoiding recomputation. Results are immutable once
/// ingestion finished, so entries never need invalidation.
pub struct QueryCache {
    cache: Mutex<LruCache<String, Arc<Vec<RankedDoc>>>>,
    capacity: usize,
    hit_count: AtomicUsize,
    miss_count: AtomicUsize,
}

impl QueryCache {
    pub fn new(capacity: usize) -> Self {
        let cap = NonZeroUsize::new(capacity.max(1)).expect("capacity clamped above zero");
        QueryCache {
            cache: Mutex::new(LruCache::new(cap)),
            capacity: capacity.max(1),
            hit_count: AtomicUsize::new(0),
            miss_count: AtomicUsize::new(0),
        }
    }

    pub fn get(&self, query: &str) -> Option<Arc<Vec<RankedDoc>>> {
        let mut cache = self.cache.lock();
        if let Some(results) = cache.get(query) {
            self.hit_count.fetch_add(1, Ordering::Relaxed);
            Some(Arc::clone(results))
        } else {
            self.miss_count.fetch_add(1, Ordering::Relaxed);
            None
        }
    }

    pub fn put(&self, query: String, results: Vec<RankedDoc>) -> Arc<Vec<RankedDoc>> {
        let results = Arc::new(results);
        self.cache.lock().put(query, Arc::clone(&results));
        results
    }

    pub fn stats(&self) -> CacheStats {
        CacheStats {
            hit_count: self.hit_count.load(Ordering::Relaxed),
            miss_count: self.miss_count.load(Ordering::Relaxed),
            size: self.cache.lock().len(),
            capacity: self.capacity,
        }
    }
}

#[derive(Debug, Clone)]
pub struct CacheStats {
    pub hit_count: usize,
    pub miss_count: usize,
    pub size: usize,
    pub capacity: usize,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ranked(doc: &str) -> Vec<RankedDoc> {
        vec![RankedDoc { doc_hash: doc.to_string(), rank: 1.0 }]
    }

    #[test]
    fn test_hit_and_miss_counting() {
        let cache = QueryCache::new(4);
        assert!(cache.get("hello").is_none());
        cache.put("hello".into(), ranked("aa"));
        assert_eq!(cache.get("hello").unwrap()[0].doc_hash, "aa");

        let stats = cache.stats();
        assert_eq!(stats.hit_count, 1);
        assert_eq!(stats.miss_count, 1);
        assert_eq!(stats.size, 1);
    }

    #[test]
    fn test_lru_eviction() {
        let cache = QueryCache::new(2);
        cache.put("a".into(), ranked("1"));
        cache.put("b".into(), ranked("2"));
        cache.put("c".into(), ranked("3"));
        assert!(cache.get("a").is_none());
        assert!(cache.get("c").is_some());
    }
}
