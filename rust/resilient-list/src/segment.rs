//! Flat, index-addressable storage units shared by window nodes.

use log::info;
use resilient_budget_tracker::Budget;
use resilient_common::{Error, Result};
use slab::Slab;

use crate::cache::{ChunkCache, ChunkHandle};
use crate::chunk::{ResilientChunk, SlotBlock, SurvivorSpace, page_position};
use crate::config::THRESHOLD;

/// Storage flavor of a segment, as reported by `ResilientList::segment_kinds`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SegmentKind {
    /// Dense array, never reclaimed.
    Dense,
    /// Chunked storage whose primary chunk is still held by the cache.
    Resilient,
    /// Chunked storage running on its survivor space after reclamation.
    Survivor,
}

pub(crate) enum Segment<T> {
    Array(ArraySegment<T>),
    Resilient(ResilientSegment<T>),
}

impl<T> Segment<T> {
    /// Allocates a segment of `capacity` slots, dense below `THRESHOLD` and
    /// resilient otherwise.
    pub fn allocate(
        capacity: usize,
        budget: &Budget,
        cache: &mut ChunkCache<T>,
    ) -> Result<Segment<T>> {
        if capacity < THRESHOLD {
            Ok(Segment::Array(ArraySegment::allocate(capacity, budget)?))
        } else {
            Ok(Segment::Resilient(ResilientSegment::allocate(
                capacity, budget, cache,
            )?))
        }
    }

    pub fn kind(&self) -> SegmentKind {
        match self {
            Segment::Array(_) => SegmentKind::Dense,
            Segment::Resilient(s) if s.is_reclaimed() => SegmentKind::Survivor,
            Segment::Resilient(_) => SegmentKind::Resilient,
        }
    }

    /// Current capacity. For a reclaimed resilient segment this is already the
    /// recovered capacity, even before `check` has run.
    pub fn capacity(&self) -> usize {
        match self {
            Segment::Array(s) => s.slots.len(),
            Segment::Resilient(s) => s.capacity(),
        }
    }

    /// Re-validates the backing reference, completing a pending reclamation.
    pub fn check(&mut self) -> Result<()> {
        match self {
            Segment::Array(_) => Ok(()),
            Segment::Resilient(s) => s.check(),
        }
    }

    pub fn get(&self, index: usize) -> Result<&T> {
        let slot = match self {
            Segment::Array(s) => s.slots.slot(index),
            Segment::Resilient(s) => s.slot(index),
        };
        slot.and_then(Option::as_ref)
            .ok_or_else(|| Error::invariant(format!("segment slot {index} holds no element")))
    }

    pub fn get_mut(&mut self, index: usize) -> Result<&mut T> {
        self.slot_mut(index)?
            .as_mut()
            .ok_or_else(|| Error::invariant(format!("segment slot {index} holds no element")))
    }

    pub fn store(&mut self, index: usize, element: T) -> Result<()> {
        *self.slot_mut(index)? = Some(element);
        Ok(())
    }

    /// Moves the element out of `index`, leaving the slot empty.
    pub fn take(&mut self, index: usize) -> Result<T> {
        self.slot_mut(index)?
            .take()
            .ok_or_else(|| Error::invariant(format!("segment slot {index} holds no element")))
    }

    fn slot_mut(&mut self, index: usize) -> Result<&mut Option<T>> {
        match self {
            Segment::Array(s) => {
                let len = s.slots.len();
                s.slots.slot_mut(index).ok_or_else(|| {
                    Error::invariant(format!(
                        "slot {index} outside dense segment of {len} slots"
                    ))
                })
            }
            Segment::Resilient(s) => s.slot_mut(index),
        }
    }
}

pub(crate) struct ArraySegment<T> {
    slots: SlotBlock<T>,
}

impl<T> ArraySegment<T> {
    pub fn allocate(capacity: usize, budget: &Budget) -> Result<ArraySegment<T>> {
        Ok(ArraySegment {
            slots: SlotBlock::allocate(capacity, budget)?,
        })
    }
}

enum ChunkRef<T> {
    /// Primary chunk, owned by the cache and possibly already reclaimed.
    Reclaimable(ChunkHandle<T>),
    /// Terminal state: storage is the survivor space alone.
    Survivor,
}

pub(crate) struct ResilientSegment<T> {
    chunk: ChunkRef<T>,
    survivors: SurvivorSpace<T>,
}

impl<T> ResilientSegment<T> {
    pub fn allocate(
        capacity: usize,
        budget: &Budget,
        cache: &mut ChunkCache<T>,
    ) -> Result<ResilientSegment<T>> {
        let chunk = ResilientChunk::allocate(capacity, budget)?;
        Ok(ResilientSegment {
            chunk: ChunkRef::Reclaimable(cache.register(chunk)),
            survivors: SurvivorSpace::new(capacity),
        })
    }

    pub fn is_reclaimed(&self) -> bool {
        match &self.chunk {
            ChunkRef::Reclaimable(chunk) => chunk.strong_count() == 0,
            ChunkRef::Survivor => true,
        }
    }

    pub fn capacity(&self) -> usize {
        if self.is_reclaimed() {
            self.survivors.recovered_capacity()
        } else {
            self.survivors.capacity()
        }
    }

    pub fn check(&mut self) -> Result<()> {
        if let ChunkRef::Reclaimable(chunk) = &self.chunk {
            if chunk.strong_count() == 0 {
                let nominal = self.survivors.capacity();
                let recovered = self.survivors.escape()?;
                info!(
                    "resilient segment reclaimed: recovered {recovered} of {nominal} slots \
                     (high-water page {:?})",
                    self.survivors.high_water()
                );
                self.chunk = ChunkRef::Survivor;
            }
        }
        Ok(())
    }

    fn slot(&self, index: usize) -> Option<&Option<T>> {
        let (page, offset) = page_position(index);
        self.survivors.page(page)?.slot(offset)
    }

    fn slot_mut(&mut self, index: usize) -> Result<&mut Option<T>> {
        self.check()?;
        let (page, offset) = page_position(index);
        if !self.survivors.contains(page) {
            let chunk = match &self.chunk {
                ChunkRef::Reclaimable(chunk) => chunk.upgrade(),
                ChunkRef::Survivor => None,
            };
            let chunk = chunk.ok_or_else(|| {
                Error::invariant(format!(
                    "write to slot {index} past recovered capacity {}",
                    self.survivors.capacity()
                ))
            })?;
            let block = chunk.borrow_mut().take_page(page).ok_or_else(|| {
                Error::invariant(format!("page {page} missing from resilient chunk"))
            })?;
            self.survivors.save(page, block);
        }
        self.survivors
            .page_mut(page)
            .and_then(|block| block.slot_mut(offset))
            .ok_or_else(|| Error::invariant(format!("slot {index} outside resilient segment")))
    }
}

/// Stable handle of a segment in the `SegmentTable`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub(crate) struct SegmentId(usize);

impl SegmentId {
    #[cfg(test)]
    pub(crate) fn for_tests(index: usize) -> SegmentId {
        SegmentId(index)
    }
}

struct SegmentEntry<T> {
    segment: Segment<T>,
    /// Number of window nodes viewing this segment.
    windows: usize,
}

/// Arena of segments, reference-counted by the window nodes that view them.
pub(crate) struct SegmentTable<T> {
    entries: Slab<SegmentEntry<T>>,
}

impl<T> SegmentTable<T> {
    pub fn new() -> SegmentTable<T> {
        SegmentTable {
            entries: Slab::new(),
        }
    }

    /// Adds a segment viewed by a single window.
    pub fn insert(&mut self, segment: Segment<T>) -> SegmentId {
        SegmentId(self.entries.insert(SegmentEntry {
            segment,
            windows: 1,
        }))
    }

    /// Registers one more window viewing `id`.
    pub fn retain(&mut self, id: SegmentId) {
        self.entries[id.0].windows += 1;
    }

    /// Drops one window's view of `id`, returning the segment once no window
    /// views it anymore.
    pub fn release(&mut self, id: SegmentId) -> Option<Segment<T>> {
        let entry = &mut self.entries[id.0];
        entry.windows -= 1;
        (entry.windows == 0).then(|| self.entries.remove(id.0).segment)
    }

    pub fn windows(&self, id: SegmentId) -> usize {
        self.entries.get(id.0).map_or(0, |entry| entry.windows)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn clear(&mut self) {
        self.entries.clear();
    }
}

impl<T> std::ops::Index<SegmentId> for SegmentTable<T> {
    type Output = Segment<T>;

    fn index(&self, id: SegmentId) -> &Self::Output {
        &self.entries[id.0].segment
    }
}

impl<T> std::ops::IndexMut<SegmentId> for SegmentTable<T> {
    fn index_mut(&mut self, id: SegmentId) -> &mut Self::Output {
        &mut self.entries[id.0].segment
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::CHUNK_SIZE;

    fn resilient(capacity: usize, cache: &mut ChunkCache<u64>) -> Segment<u64> {
        let segment = Segment::allocate(capacity, &Budget::unlimited(), cache).unwrap();
        assert_eq!(segment.kind(), SegmentKind::Resilient);
        segment
    }

    #[test]
    fn test_allocation_threshold() {
        let mut cache = ChunkCache::new(None);
        let budget = Budget::unlimited();
        let dense = Segment::<u64>::allocate(THRESHOLD - 1, &budget, &mut cache).unwrap();
        assert_eq!(dense.kind(), SegmentKind::Dense);
        assert!(cache.is_empty());
        let chunked = Segment::<u64>::allocate(THRESHOLD, &budget, &mut cache).unwrap();
        assert_eq!(chunked.kind(), SegmentKind::Resilient);
        assert_eq!(chunked.capacity(), THRESHOLD);
        assert_eq!(cache.len(), 1);
    }

    #[test]
    fn test_dense_store_take() {
        let mut cache = ChunkCache::new(None);
        let mut segment = Segment::allocate(4, &Budget::unlimited(), &mut cache).unwrap();
        segment.store(2, "two".to_string()).unwrap();
        assert_eq!(segment.get(2).unwrap(), "two");
        segment.get_mut(2).unwrap().push('!');
        assert_eq!(segment.take(2).unwrap(), "two!");
        assert!(segment.get(2).is_err());
        assert!(segment.store(4, "x".to_string()).is_err());
    }

    #[test]
    fn test_reclaim_keeps_written_pages() {
        let mut cache = ChunkCache::new(None);
        let mut segment = resilient(4 * CHUNK_SIZE, &mut cache);
        for i in 0..(CHUNK_SIZE + 10) {
            segment.store(i, i as u64).unwrap();
        }
        // Only the two untouched pages are still resident in the chunk.
        assert_eq!(
            cache.resident_bytes(),
            2 * CHUNK_SIZE as u64 * crate::chunk::slot_bytes::<u64>()
        );

        cache.reclaim_all();
        assert_eq!(segment.kind(), SegmentKind::Survivor);
        assert_eq!(segment.capacity(), 2 * CHUNK_SIZE);
        assert_eq!(*segment.get(CHUNK_SIZE + 9).unwrap(), (CHUNK_SIZE + 9) as u64);

        segment.check().unwrap();
        assert_eq!(segment.capacity(), 2 * CHUNK_SIZE);
        segment.store(2 * CHUNK_SIZE - 1, 7).unwrap();
        assert!(segment.store(2 * CHUNK_SIZE, 7).is_err());
        for i in 0..(CHUNK_SIZE + 10) {
            assert_eq!(*segment.get(i).unwrap(), i as u64);
        }
    }

    #[test]
    fn test_reclaim_before_any_write() {
        let mut cache = ChunkCache::new(None);
        let mut segment = resilient(2 * CHUNK_SIZE, &mut cache);
        cache.reclaim_all();
        assert_eq!(segment.capacity(), 0);
        assert!(segment.store(0, 1).is_err());
        assert_eq!(segment.kind(), SegmentKind::Survivor);
    }

    #[test]
    fn test_segment_table_refcount() {
        let mut cache = ChunkCache::new(None);
        let mut table = SegmentTable::new();
        let id = table.insert(Segment::<u64>::allocate(8, &Budget::unlimited(), &mut cache).unwrap());
        table.retain(id);
        assert_eq!(table.windows(id), 2);
        assert!(table.release(id).is_none());
        assert!(table.release(id).is_some());
        assert_eq!(table.len(), 0);
        assert_eq!(table.windows(id), 0);
    }
}
