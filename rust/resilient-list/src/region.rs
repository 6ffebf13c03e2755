//! Region snapshots: the coarse chain over runs of nodes used to skip whole
//! regions during index resolution.

use resilient_common::{Error, Result};
use slab::Slab;

use crate::node::NodeId;

/// Stable handle of a snapshot in the `RegionChain`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub(crate) struct RegionId(usize);

impl RegionId {
    #[cfg(test)]
    pub(crate) fn for_tests(index: usize) -> RegionId {
        RegionId(index)
    }
}

/// Aggregate bookkeeping for one run of nodes.
#[derive(Debug, Clone, Default)]
pub(crate) struct RegionSnapshot {
    pub size: usize,
    pub capacity: usize,
    /// First node still in this region, `None` once the region was emptied.
    pub head: Option<NodeId>,
    pub next: Option<RegionId>,
    /// The region degraded to single-element nodes after an allocation failure
    /// and does not retry bulk allocation.
    pub oom: bool,
}

impl RegionSnapshot {
    pub fn is_full(&self) -> bool {
        self.size >= self.capacity
    }
}

/// Singly linked chain of region snapshots.
///
/// Regions emptied by removals stay linked until an index walk splices them out
/// (`next_live`), the chain head moves past them (`release_before`), or a new
/// region is linked after the tail (`push_back`).
pub(crate) struct RegionChain {
    regions: Slab<RegionSnapshot>,
    head: Option<RegionId>,
    tail: Option<RegionId>,
}

impl RegionChain {
    pub fn new() -> RegionChain {
        RegionChain {
            regions: Slab::new(),
            head: None,
            tail: None,
        }
    }

    pub fn head(&self) -> Option<RegionId> {
        self.head
    }

    pub fn tail(&self) -> Option<RegionId> {
        self.tail
    }

    pub fn set_tail(&mut self, tail: Option<RegionId>) {
        self.tail = tail;
    }

    /// Number of live snapshots, including emptied ones not yet pruned.
    pub fn len(&self) -> usize {
        self.regions.len()
    }

    /// Links a new snapshot after the tail. Emptied regions left dangling past
    /// the tail are released first.
    pub fn push_back(&mut self, snapshot: RegionSnapshot) -> RegionId {
        let id = RegionId(self.regions.insert(snapshot));
        match self.tail {
            Some(tail) => {
                let dangling = self.regions[tail.0].next.replace(id);
                self.release_from(dangling);
            }
            None => {
                let dangling = self.head.replace(id);
                self.release_from(dangling);
            }
        }
        self.tail = Some(id);
        id
    }

    /// Returns the first non-empty region after `id`, splicing out and
    /// releasing emptied regions in between.
    pub fn next_live(&mut self, id: RegionId) -> Result<RegionId> {
        loop {
            let next = self.regions[id.0].next.ok_or_else(|| {
                Error::invariant("region chain ended before the requested index")
            })?;
            if self.regions[next.0].head.is_some() {
                return Ok(next);
            }
            let after = self.regions.remove(next.0).next;
            self.regions[id.0].next = after;
            if self.tail == Some(next) {
                self.tail = Some(id);
            }
        }
    }

    /// Makes `new_head` the first region, releasing every region before it.
    pub fn release_before(&mut self, new_head: RegionId) {
        let mut current = self.head;
        while let Some(id) = current {
            if id == new_head {
                break;
            }
            current = self.regions.remove(id.0).next;
        }
        self.head = Some(new_head);
    }

    fn release_from(&mut self, mut current: Option<RegionId>) {
        while let Some(id) = current {
            current = self.regions.remove(id.0).next;
        }
    }

    pub fn clear(&mut self) {
        self.regions.clear();
        self.head = None;
        self.tail = None;
    }

    /// Iterates regions in chain order.
    pub fn iter(&self) -> impl Iterator<Item = (RegionId, &RegionSnapshot)> {
        std::iter::successors(self.head, |&id| self.regions[id.0].next)
            .map(|id| (id, &self.regions[id.0]))
    }
}

impl std::ops::Index<RegionId> for RegionChain {
    type Output = RegionSnapshot;

    fn index(&self, id: RegionId) -> &Self::Output {
        &self.regions[id.0]
    }
}

impl std::ops::IndexMut<RegionId> for RegionChain {
    fn index_mut(&mut self, id: RegionId) -> &mut Self::Output {
        &mut self.regions[id.0]
    }
}
