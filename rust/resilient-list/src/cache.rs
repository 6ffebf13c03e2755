//! Owner of the reclaimable chunk storage.
//!
//! Resilient segments never own their primary chunk. The `ChunkCache` holds the
//! only strong reference and hands out weak ones, so dropping a cache entry is
//! what "reclaiming" a chunk means. Entries are dropped on an explicit
//! memory-pressure signal (`reclaim`, `reclaim_all`) or by second-chance
//! eviction when a configured byte budget would be exceeded.

use std::cell::RefCell;
use std::rc::{Rc, Weak};

use log::trace;

use crate::chunk::ResilientChunk;

pub(crate) type ChunkHandle<T> = Weak<RefCell<ResilientChunk<T>>>;

pub struct ChunkCache<T> {
    entries: Vec<Rc<RefCell<ResilientChunk<T>>>>,
    /// Clock hand of the second-chance sweep.
    hand: usize,
    byte_budget: Option<u64>,
}

impl<T> ChunkCache<T> {
    pub fn new(byte_budget: Option<u64>) -> ChunkCache<T> {
        ChunkCache {
            entries: Vec::new(),
            hand: 0,
            byte_budget,
        }
    }

    /// Number of chunks currently held.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Bytes that reclaiming every chunk would free.
    pub fn resident_bytes(&self) -> u64 {
        self.entries
            .iter()
            .map(|chunk| chunk.borrow().resident_bytes())
            .sum()
    }

    /// Takes ownership of a freshly allocated chunk and returns the weak handle
    /// its segment addresses it through.
    ///
    /// If the byte budget would be exceeded, older chunks are evicted first. The
    /// incoming chunk itself is never evicted by its own registration.
    pub(crate) fn register(&mut self, chunk: ResilientChunk<T>) -> ChunkHandle<T> {
        self.sweep();
        if let Some(budget) = self.byte_budget {
            let required = self.resident_bytes() + chunk.resident_bytes();
            if required > budget {
                self.reclaim(required - budget);
            }
        }
        let chunk = Rc::new(RefCell::new(chunk));
        let handle = Rc::downgrade(&chunk);
        self.entries.push(chunk);
        handle
    }

    /// Reclaims chunks until at least `bytes` bytes were freed or the cache is
    /// empty. Returns the number of bytes freed.
    ///
    /// Chunks touched since the last sweep get a second chance before eviction.
    pub fn reclaim(&mut self, bytes: u64) -> u64 {
        self.sweep();
        let mut freed = 0;
        while freed < bytes && !self.entries.is_empty() {
            if self.hand >= self.entries.len() {
                self.hand = 0;
            }
            if self.entries[self.hand].borrow_mut().take_referenced() {
                self.hand += 1;
                continue;
            }
            let chunk = self.entries.remove(self.hand);
            let released = chunk.borrow().resident_bytes();
            trace!("reclaiming chunk holding {released} bytes");
            freed += released;
        }
        freed
    }

    /// Reclaims every chunk. Returns the number of bytes freed.
    pub fn reclaim_all(&mut self) -> u64 {
        self.sweep();
        let freed = self.resident_bytes();
        if !self.entries.is_empty() {
            trace!("reclaiming all {} chunks ({freed} bytes)", self.entries.len());
        }
        self.entries.clear();
        self.hand = 0;
        freed
    }

    /// Drops chunks whose segment no longer exists.
    pub(crate) fn sweep(&mut self) {
        self.entries.retain(|chunk| Rc::weak_count(chunk) > 0);
        if self.hand >= self.entries.len() {
            self.hand = 0;
        }
    }
}

impl<T> std::fmt::Debug for ChunkCache<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ChunkCache")
            .field("chunks", &self.entries.len())
            .field("resident_bytes", &self.resident_bytes())
            .field("byte_budget", &self.byte_budget)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use resilient_budget_tracker::Budget;

    use super::*;
    use crate::chunk::slot_bytes;

    fn chunk(capacity: usize, budget: &Budget) -> ResilientChunk<u64> {
        ResilientChunk::allocate(capacity, budget).unwrap()
    }

    #[test]
    fn test_register_and_reclaim_all() {
        let budget = Budget::unlimited();
        let mut cache = ChunkCache::new(None);
        let a = cache.register(chunk(2048, &budget));
        let b = cache.register(chunk(1024, &budget));
        assert_eq!(cache.len(), 2);
        assert_eq!(cache.resident_bytes(), 3072 * slot_bytes::<u64>());

        assert_eq!(cache.reclaim_all(), 3072 * slot_bytes::<u64>());
        assert!(cache.is_empty());
        assert!(a.upgrade().is_none());
        assert!(b.upgrade().is_none());
    }

    #[test]
    fn test_reclaim_returns_budget() {
        let budget = Budget::new(4096 * slot_bytes::<u64>());
        let mut cache = ChunkCache::new(None);
        let _handle = cache.register(chunk(4096, &budget));
        assert_eq!(budget.remaining(), 0);
        cache.reclaim_all();
        assert_eq!(budget.remaining(), 4096 * slot_bytes::<u64>());
    }

    #[test]
    fn test_second_chance_order() {
        let budget = Budget::unlimited();
        let mut cache = ChunkCache::new(None);
        let a = cache.register(chunk(1024, &budget));
        let b = cache.register(chunk(1024, &budget));

        // Both start referenced: the first pass clears the bits, the second evicts `a`.
        let freed = cache.reclaim(1);
        assert_eq!(freed, 1024 * slot_bytes::<u64>());
        assert!(a.upgrade().is_none());
        assert!(b.upgrade().is_some());

        // Touching `b` buys it one more pass over an idle `c`.
        let c = cache.register(chunk(1024, &budget));
        b.upgrade().unwrap().borrow_mut().take_page(0);
        c.upgrade().unwrap().borrow_mut().take_referenced();
        cache.reclaim(1);
        assert!(b.upgrade().is_some());
        assert!(c.upgrade().is_none());
    }

    #[test]
    fn test_byte_budget_evicts_older_chunks() {
        let budget = Budget::unlimited();
        let mut cache = ChunkCache::new(Some(2048 * slot_bytes::<u64>()));
        let a = cache.register(chunk(2048, &budget));
        let b = cache.register(chunk(2048, &budget));
        assert!(a.upgrade().is_none());
        assert!(b.upgrade().is_some());
        assert_eq!(cache.len(), 1);
    }

    #[test]
    fn test_sweep_drops_orphaned_chunks() {
        let budget = Budget::unlimited();
        let mut cache = ChunkCache::new(None);
        let handle = cache.register(chunk(1024, &budget));
        drop(handle);
        cache.sweep();
        assert!(cache.is_empty());
    }
}
