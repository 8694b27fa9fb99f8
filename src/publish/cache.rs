use std::collections::{HashSet, VecDeque};
use std::sync::{Mutex, MutexGuard, PoisonError};

use crate::model::FileIdentity;

/// Identities of files already delivered to the file-router
///
/// Bounded by entry count; the oldest insertion is evicted first. Entries
/// never expire by age.
#[derive(Debug)]
pub struct PublishedFileCache {
    capacity: usize,
    inner: Mutex<Entries>,
}

#[derive(Debug, Default)]
struct Entries {
    order: VecDeque<FileIdentity>,
    members: HashSet<FileIdentity>,
}

impl PublishedFileCache {
    pub fn new(capacity: usize) -> Self {
        Self {
            capacity: capacity.max(1),
            inner: Mutex::new(Entries::default()),
        }
    }

    pub fn contains(&self, identity: &FileIdentity) -> bool {
        self.lock().members.contains(identity)
    }

    /// Insert an identity; returns false if it was already present
    pub fn add(&self, identity: FileIdentity) -> bool {
        let mut entries = self.lock();
        if entries.members.contains(&identity) {
            return false;
        }
        while entries.order.len() >= self.capacity {
            match entries.order.pop_front() {
                Some(evicted) => {
                    entries.members.remove(&evicted);
                    tracing::trace!(file = %evicted, "Evicted from published cache");
                }
                None => break,
            }
        }
        entries.members.insert(identity.clone());
        entries.order.push_back(identity);
        true
    }

    pub fn size(&self) -> usize {
        self.lock().order.len()
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    fn lock(&self) -> MutexGuard<'_, Entries> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    fn id(name: &str) -> FileIdentity {
        FileIdentity::new("node-1", name)
    }

    #[test]
    fn test_add_and_contains() {
        let cache = PublishedFileCache::new(10);
        assert!(!cache.contains(&id("a")));
        assert!(cache.add(id("a")));
        assert!(!cache.add(id("a")));
        assert!(cache.contains(&id("a")));
        assert!(!cache.contains(&FileIdentity::new("node-2", "a")));
        assert_eq!(cache.size(), 1);
    }

    #[test]
    fn test_oldest_entry_evicted_first() {
        let cache = PublishedFileCache::new(3);
        for name in ["a", "b", "c", "d"] {
            cache.add(id(name));
        }

        assert_eq!(cache.size(), 3);
        assert!(!cache.contains(&id("a")));
        assert!(cache.contains(&id("b")));
        assert!(cache.contains(&id("d")));

        cache.add(id("e"));
        assert!(!cache.contains(&id("b")));
        assert!(cache.contains(&id("c")));
    }

    #[test]
    fn test_concurrent_inserts_respect_capacity() {
        let cache = Arc::new(PublishedFileCache::new(50));
        let handles: Vec<_> = (0..8)
            .map(|t| {
                let cache = Arc::clone(&cache);
                std::thread::spawn(move || {
                    for i in 0..100 {
                        cache.add(FileIdentity::new(format!("node-{}", t), format!("f{}", i)));
                    }
                })
            })
            .collect();
        for handle in handles {
            handle.join().unwrap();
        }

        assert_eq!(cache.size(), 50);
    }
}
