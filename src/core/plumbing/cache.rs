use super::TreeEntry;
use std::collections::{HashMap, VecDeque};
use std::fmt;
use std::sync::{Arc, RwLock};

/// Trees kept before the oldest is evicted.
pub const MAX_TREES: usize = 512;
/// Blob bytes kept before the oldest blobs are evicted.
pub const MAX_BLOB_BYTES: usize = 32 * 1024 * 1024;

/// Entries evicted oldest-first once their total weight passes the budget.
struct Bounded<V> {
    entries: HashMap<String, Arc<V>>,
    order: VecDeque<String>,
    weight: usize,
    budget: usize,
    weigh: fn(&V) -> usize,
}

impl<V> fmt::Debug for Bounded<V> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Bounded")
            .field("entries", &self.entries.len())
            .field("weight", &self.weight)
            .field("budget", &self.budget)
            .finish()
    }
}

impl<V> Bounded<V> {
    fn new(budget: usize, weigh: fn(&V) -> usize) -> Self {
        Self {
            entries: HashMap::new(),
            order: VecDeque::new(),
            weight: 0,
            budget,
            weigh,
        }
    }

    fn insert(&mut self, key: String, value: Arc<V>) {
        let weight = (self.weigh)(&value);
        if weight > self.budget || self.entries.contains_key(&key) {
            return;
        }

        while self.weight + weight > self.budget {
            let Some(oldest) = self.order.pop_front() else {
                break;
            };
            if let Some(evicted) = self.entries.remove(&oldest) {
                self.weight -= (self.weigh)(&evicted);
            }
        }

        self.weight += weight;
        self.order.push_back(key.clone());
        self.entries.insert(key, value);
    }

    fn clear(&mut self) {
        self.entries.clear();
        self.order.clear();
        self.weight = 0;
    }
}

/// Decoded git objects keyed by object id.
///
/// Objects are immutable, so entries never go stale. Both maps are bounded:
/// trees by count and blobs by total size. Branch checkout and reset clear it.
#[derive(Debug)]
pub struct ObjectCache {
    trees: RwLock<Bounded<Vec<TreeEntry>>>,
    blobs: RwLock<Bounded<Vec<u8>>>,
}

impl Default for ObjectCache {
    fn default() -> Self {
        Self::with_budget(MAX_TREES, MAX_BLOB_BYTES)
    }
}

impl ObjectCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Cache holding at most `max_trees` trees and `max_blob_bytes` of blobs.
    pub fn with_budget(max_trees: usize, max_blob_bytes: usize) -> Self {
        Self {
            trees: RwLock::new(Bounded::new(max_trees, |_| 1)),
            blobs: RwLock::new(Bounded::new(max_blob_bytes, Vec::len)),
        }
    }

    /// Flattened tree by tree id.
    pub fn tree(&self, oid: &str) -> Option<Arc<Vec<TreeEntry>>> {
        self.trees.read().ok()?.entries.get(oid).cloned()
    }

    pub fn insert_tree(&self, oid: String, entries: Vec<TreeEntry>) -> Arc<Vec<TreeEntry>> {
        let entries = Arc::new(entries);
        if let Ok(mut trees) = self.trees.write() {
            trees.insert(oid, Arc::clone(&entries));
        }
        entries
    }

    pub fn blob(&self, oid: &str) -> Option<Arc<Vec<u8>>> {
        self.blobs.read().ok()?.entries.get(oid).cloned()
    }

    pub fn insert_blob(&self, oid: String, content: Vec<u8>) -> Arc<Vec<u8>> {
        let content = Arc::new(content);
        if let Ok(mut blobs) = self.blobs.write() {
            blobs.insert(oid, Arc::clone(&content));
        }
        content
    }

    /// Number of cached trees and blobs.
    pub fn len(&self) -> (usize, usize) {
        let trees = self.trees.read().map(|trees| trees.entries.len()).unwrap_or(0);
        let blobs = self.blobs.read().map(|blobs| blobs.entries.len()).unwrap_or(0);
        (trees, blobs)
    }

    /// Total size of the cached blobs.
    pub fn blob_bytes(&self) -> usize {
        self.blobs.read().map(|blobs| blobs.weight).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == (0, 0)
    }

    pub fn clear(&self) {
        if let Ok(mut trees) = self.trees.write() {
            trees.clear();
        }
        if let Ok(mut blobs) = self.blobs.write() {
            blobs.clear();
        }
        log::debug!("Object cache cleared");
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn entry(path: &str) -> TreeEntry {
        TreeEntry {
            path: path.to_string(),
            oid: "b1".to_string(),
            mode: 0o100644,
        }
    }

    #[test]
    fn test_insert_lookup_and_clear() {
        let cache = ObjectCache::new();
        assert!(cache.is_empty());

        cache.insert_tree("t1".to_string(), vec![entry("a.md")]);
        cache.insert_blob("b1".to_string(), b"hello".to_vec());

        assert_eq!(cache.tree("t1").map(|tree| tree.len()), Some(1));
        assert_eq!(cache.blob("b1").as_deref().map(Vec::as_slice), Some(&b"hello"[..]));
        assert_eq!(cache.len(), (1, 1));

        cache.clear();
        assert!(cache.tree("t1").is_none());
        assert!(cache.is_empty());
        assert_eq!(cache.blob_bytes(), 0);
    }

    #[test]
    fn test_oldest_trees_evicted_past_budget() {
        let cache = ObjectCache::with_budget(2, 1024);

        for oid in ["t1", "t2", "t3"] {
            cache.insert_tree(oid.to_string(), vec![entry("a.md")]);
        }

        assert!(cache.tree("t1").is_none());
        assert!(cache.tree("t2").is_some());
        assert!(cache.tree("t3").is_some());
        assert_eq!(cache.len().0, 2);
    }

    #[test]
    fn test_blob_bytes_stay_within_budget() {
        let cache = ObjectCache::with_budget(8, 10);

        cache.insert_blob("b1".to_string(), vec![0; 4]);
        cache.insert_blob("b2".to_string(), vec![0; 4]);
        cache.insert_blob("b3".to_string(), vec![0; 4]);
        assert!(cache.blob("b1").is_none());
        assert_eq!(cache.blob_bytes(), 8);

        // Too large to cache at all, but still handed back
        let big = cache.insert_blob("big".to_string(), vec![0; 11]);
        assert_eq!(big.len(), 11);
        assert!(cache.blob("big").is_none());
        assert_eq!(cache.len().1, 2);
    }

    #[test]
    fn test_reinserting_keeps_weight() {
        let cache = ObjectCache::with_budget(8, 10);

        cache.insert_blob("b1".to_string(), vec![0; 4]);
        cache.insert_blob("b1".to_string(), vec![0; 4]);
        assert_eq!(cache.blob_bytes(), 4);
    }
}
