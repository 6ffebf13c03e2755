//! Index resolution over the region and node chains.

use resilient_common::result::verify_index;
use resilient_common::{Error, Result};

use crate::ResilientList;
use crate::node::NodeId;
use crate::region::RegionId;

/// A list index resolved to the node holding it.
///
/// `region_offset + node_offset + element_offset` is the resolved index.
/// Computed fresh for every access and never stored.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct Location {
    /// List index of the first element of the resolved region.
    pub region_offset: usize,
    /// Position of the resolved node's first element within its region.
    pub node_offset: usize,
    /// Position of the element within the resolved node.
    pub element_offset: usize,
    pub node: NodeId,
}

impl<T> ResilientList<T> {
    /// Resolves `index` without touching the structure. Emptied regions are
    /// skipped but stay linked.
    pub(crate) fn locate(&self, index: usize) -> Result<Location> {
        verify_index(index, self.size)?;
        let mut region = self.regions.head().ok_or_else(uninitialized)?;
        let mut counted = 0;
        loop {
            let snapshot = &self.regions[region];
            if snapshot.head.is_some() && counted + snapshot.size > index {
                break;
            }
            counted += snapshot.size;
            region = snapshot.next.ok_or_else(|| chain_exhausted(index))?;
        }
        self.locate_in(region, counted, index)
    }

    /// Resolves `index`, splicing emptied regions out of the chain on the way.
    pub(crate) fn locate_mut(&mut self, index: usize) -> Result<Location> {
        verify_index(index, self.size)?;
        let mut region = self.regions.head().ok_or_else(uninitialized)?;
        if self.regions[region].head.is_none() {
            let live = self.regions.next_live(region)?;
            self.regions.release_before(live);
            region = live;
        }
        let mut counted = 0;
        while counted + self.regions[region].size <= index {
            counted += self.regions[region].size;
            region = self.regions.next_live(region)?;
        }
        self.locate_in(region, counted, index)
    }

    fn locate_in(&self, region: RegionId, counted: usize, index: usize) -> Result<Location> {
        let target = index - counted;
        let mut node = self.regions[region].head.ok_or_else(|| chain_exhausted(index))?;
        let mut within = 0;
        loop {
            let current = &self.nodes[node];
            if current.region != region {
                return Err(Error::invariant(format!(
                    "index {index} ran past the nodes of its region"
                )));
            }
            let size = current.size();
            if within + size > target {
                break;
            }
            within += size;
            node = current.next.ok_or_else(|| chain_exhausted(index))?;
        }
        Ok(Location {
            region_offset: counted,
            node_offset: within,
            element_offset: target - within,
            node,
        })
    }
}

fn uninitialized() -> Error {
    Error::invariant("non-empty list has no regions")
}

fn chain_exhausted(index: usize) -> Error {
    Error::invariant(format!("chain ended before index {index}"))
}

#[cfg(test)]
mod tests {
    use crate::ResilientList;

    #[test]
    fn test_locate_offsets_add_up() {
        let mut list = ResilientList::new();
        for i in 0..100u32 {
            list.push(i);
        }
        list.insert(3, 1000).unwrap();
        for index in 0..list.len() {
            let location = list.locate(index).unwrap();
            assert_eq!(
                location.region_offset + location.node_offset + location.element_offset,
                index
            );
            assert!(location.element_offset < list.nodes[location.node].size());
        }
    }

    #[test]
    fn test_locate_rejects_out_of_range() {
        let mut list = ResilientList::<u32>::new();
        assert!(list.locate(0).unwrap_err().is_out_of_bounds());
        list.push(1);
        assert!(list.locate(1).unwrap_err().is_out_of_bounds());
        assert!(list.locate_mut(usize::MAX).unwrap_err().is_out_of_bounds());
    }

    #[test]
    fn test_locate_mut_prunes_emptied_regions() {
        let mut list = ResilientList::new();
        // Regions of 10 and 5 slots, then a third one.
        for i in 0..20u32 {
            list.push(i);
        }
        assert_eq!(list.region_count(), 3);
        // Empty the middle region.
        for _ in 0..5 {
            list.remove(10).unwrap();
        }
        assert_eq!(list.region_count(), 3);
        assert_eq!(*list.get(12).unwrap(), 17);
        assert_eq!(list.region_count(), 3);
        assert_eq!(*list.get_mut(12).unwrap(), 17);
        assert_eq!(list.region_count(), 2);
        list.verify();
    }
}
