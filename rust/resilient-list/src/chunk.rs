//! Paged slot storage backing the resilient segments.
//!
//! A `ResilientChunk` is allocated as a run of `CHUNK_SIZE` pages. Pages move out
//! of the chunk and into the owning segment's `SurvivorSpace` the first time they
//! are written, so the chunk itself only ever holds pages nobody has written to.
//! Reclaiming a chunk therefore frees exactly the storage that cannot be
//! recovered, while every written page stays reachable through the survivor
//! space.

use resilient_budget_tracker::{Allocation, Budget};
use resilient_common::{Error, Result};

use crate::config::CHUNK_SIZE;

/// Number of bytes charged against the budget for a single slot.
pub(crate) fn slot_bytes<T>() -> u64 {
    std::mem::size_of::<Option<T>>().max(1) as u64
}

/// Number of pages needed to hold `capacity` slots.
pub(crate) fn page_count(capacity: usize) -> usize {
    capacity.div_ceil(CHUNK_SIZE)
}

/// Length of page `page` in a chunk of `capacity` slots. Only the last page may
/// be shorter than `CHUNK_SIZE`.
pub(crate) fn page_len(page: usize, capacity: usize) -> usize {
    capacity
        .saturating_sub(page * CHUNK_SIZE)
        .min(CHUNK_SIZE)
}

/// Splits a slot index into `(page, offset within page)`.
#[inline]
pub(crate) fn page_position(index: usize) -> (usize, usize) {
    (index / CHUNK_SIZE, index % CHUNK_SIZE)
}

/// A budget-accounted block of empty-initialized slots.
///
/// The budget allocation travels with the block: dropping the block returns its
/// bytes to the budget it was charged against.
pub(crate) struct SlotBlock<T> {
    slots: Vec<Option<T>>,
    _allocation: Allocation,
}

impl<T> SlotBlock<T> {
    /// Allocates `len` empty slots, failing if either the budget or the system
    /// allocator refuses the request.
    pub fn allocate(len: usize, budget: &Budget) -> Result<SlotBlock<T>> {
        let bytes = (len as u64).saturating_mul(slot_bytes::<T>());
        let allocation = budget
            .allocate(bytes)
            .map_err(|_| Error::allocation_failed(len))?;
        let mut slots = Vec::new();
        slots
            .try_reserve_exact(len)
            .map_err(|_| Error::allocation_failed(len))?;
        slots.resize_with(len, || None);
        Ok(SlotBlock {
            slots,
            _allocation: allocation,
        })
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.slots.len()
    }

    pub fn bytes(&self) -> u64 {
        self.len() as u64 * slot_bytes::<T>()
    }

    #[inline]
    pub fn slot(&self, index: usize) -> Option<&Option<T>> {
        self.slots.get(index)
    }

    #[inline]
    pub fn slot_mut(&mut self, index: usize) -> Option<&mut Option<T>> {
        self.slots.get_mut(index)
    }
}

/// The primary, reclaimable allocation of a resilient segment.
///
/// Holds the pages that have not been written yet. Owned exclusively by the
/// `ChunkCache`; segments only keep a weak reference.
pub(crate) struct ResilientChunk<T> {
    pages: Vec<Option<SlotBlock<T>>>,
    /// Second-chance bit consulted by the cache's eviction sweep.
    referenced: bool,
}

impl<T> ResilientChunk<T> {
    pub fn allocate(capacity: usize, budget: &Budget) -> Result<ResilientChunk<T>> {
        let count = page_count(capacity);
        let mut pages = Vec::new();
        pages
            .try_reserve_exact(count)
            .map_err(|_| Error::allocation_failed(capacity))?;
        for page in 0..count {
            // On failure the pages allocated so far are dropped, returning their budget.
            pages.push(Some(SlotBlock::allocate(page_len(page, capacity), budget)?));
        }
        Ok(ResilientChunk {
            pages,
            referenced: true,
        })
    }

    /// Moves page `page` out of the chunk. Returns `None` if it was already taken.
    pub fn take_page(&mut self, page: usize) -> Option<SlotBlock<T>> {
        self.referenced = true;
        self.pages.get_mut(page)?.take()
    }

    /// Bytes still held by the chunk, i.e. what reclaiming it would free.
    pub fn resident_bytes(&self) -> u64 {
        self.pages.iter().flatten().map(SlotBlock::bytes).sum()
    }

    /// Clears the second-chance bit, returning its previous value.
    pub fn take_referenced(&mut self) -> bool {
        std::mem::replace(&mut self.referenced, false)
    }
}

/// Record of the pages written in a resilient segment.
///
/// Pages are owned here once written, and `survived` tracks the highest page
/// index ever written (the high-water mark). After the chunk is reclaimed the
/// segment continues from this space alone.
pub(crate) struct SurvivorSpace<T> {
    pages: Vec<Option<SlotBlock<T>>>,
    survived: Option<usize>,
    /// Nominal capacity; replaced by the recovered capacity on `escape`.
    capacity: usize,
}

impl<T> SurvivorSpace<T> {
    pub fn new(capacity: usize) -> SurvivorSpace<T> {
        SurvivorSpace {
            pages: (0..page_count(capacity)).map(|_| None).collect(),
            survived: None,
            capacity,
        }
    }

    pub fn save(&mut self, page: usize, block: SlotBlock<T>) {
        self.survived = Some(self.survived.map_or(page, |s| s.max(page)));
        self.pages[page] = Some(block);
    }

    pub fn contains(&self, page: usize) -> bool {
        self.page(page).is_some()
    }

    pub fn page(&self, page: usize) -> Option<&SlotBlock<T>> {
        self.pages.get(page)?.as_ref()
    }

    pub fn page_mut(&mut self, page: usize) -> Option<&mut SlotBlock<T>> {
        self.pages.get_mut(page)?.as_mut()
    }

    /// Highest page index ever written, if any.
    pub fn high_water(&self) -> Option<usize> {
        self.survived
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Capacity that survives reclamation: every page up to and including the
    /// high-water mark.
    pub fn recovered_capacity(&self) -> usize {
        self.survived
            .map_or(0, |s| ((s + 1) * CHUNK_SIZE).min(self.capacity))
    }

    /// Turns the space into the terminal storage of a reclaimed segment.
    ///
    /// Every page below the high-water mark must have been written; a gap means
    /// the write bookkeeping was corrupted.
    pub fn escape(&mut self) -> Result<usize> {
        let recovered = self.recovered_capacity();
        let kept = page_count(recovered);
        if let Some(missing) = (0..kept).find(|&page| self.pages[page].is_none()) {
            return Err(Error::invariant(format!(
                "survivor page {missing} below high-water mark {:?} was never recorded",
                self.survived
            )));
        }
        self.pages.truncate(kept);
        self.capacity = recovered;
        Ok(recovered)
    }
}
