//! Shared concurrency primitives. `ChunkProcessor` is the
//! split-map-reduce shape used throughout the parsers and builders;
//! `ConcurrentMap` is the read-write-locked map for the rare case
//! where an aggregate genuinely needs to be shared across workers
//! outside the per-sample hot path.

use parking_lot::RwLock;
use rayon::prelude::*;
use std::collections::HashMap;
use std::hash::Hash;

/// Split `items` into chunks sized for the available worker pool, map
/// each chunk to a local accumulator with `map`, and fold the
/// accumulators down to one with `reduce`. No accumulator is ever
/// touched by more than one worker.
pub struct ChunkProcessor;

impl ChunkProcessor {
    pub fn process<T, A, M, R>(items: &[T], identity: A, map: M, reduce: R) -> A
    where
        T: Sync,
        A: Send + Clone + Sync,
        M: Fn(A, &T) -> A + Sync + Send,
        R: Fn(A, A) -> A + Sync + Send,
    {
        let chunk_size = (items.len() / rayon::current_num_threads().max(1)).max(1);
        items
            .par_chunks(chunk_size)
            .map(|chunk| chunk.iter().fold(identity.clone(), &map))
            .reduce(|| identity.clone(), &reduce)
    }
}

/// A `parking_lot::RwLock`-guarded hash map. Cheap to clone (shares the
/// lock via `Arc` would be the caller's job); this type itself is the
/// guarded map, meant to be held behind a shared reference.
pub struct ConcurrentMap<K, V> {
    inner: RwLock<HashMap<K, V>>,
}

impl<K, V> Default for ConcurrentMap<K, V> {
    fn default() -> Self {
        ConcurrentMap { inner: RwLock::new(HashMap::new()) }
    }
}

impl<K: Eq + Hash + Clone, V: Clone> ConcurrentMap<K, V> {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, key: &K) -> Option<V> {
        self.inner.read().get(key).cloned()
    }

    pub fn insert(&self, key: K, value: V) {
        self.inner.write().insert(key, value);
    }

    pub fn len(&self) -> usize {
        self.inner.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.inner.read().is_empty()
    }

    pub fn snapshot(&self) -> HashMap<K, V> {
        self.inner.read().clone()
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn chunk_processor_sums_match_sequential_sum() {
        let items: Vec<i64> = (1..=1000).collect();
        let total = ChunkProcessor::process(&items, 0i64, |acc, &x| acc + x, |a, b| a + b);
        assert_eq!(total, items.iter().sum::<i64>());
    }

    #[test]
    fn concurrent_map_get_after_insert() {
        let map: ConcurrentMap<String, i32> = ConcurrentMap::new();
        map.insert("a".to_string(), 1);
        assert_eq!(map.get(&"a".to_string()), Some(1));
        assert_eq!(map.get(&"missing".to_string()), None);
    }
}
