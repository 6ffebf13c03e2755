//! Diagnostics, memory-pressure hooks and structural verification.

use std::collections::{HashMap, HashSet};

use crate::ResilientList;
use crate::cache::ChunkCache;
use crate::node::NodeKind;
use crate::segment::SegmentKind;

impl<T> ResilientList<T> {
    /// Slot capacity over all regions, as used for growth sizing.
    pub fn total_capacity(&self) -> usize {
        self.total_capacity
    }

    /// Number of region snapshots, including emptied ones not yet pruned.
    pub fn region_count(&self) -> usize {
        self.regions.len()
    }

    /// Kind and current capacity of every segment, in list order.
    pub fn segment_kinds(&self) -> Vec<(SegmentKind, usize)> {
        let mut seen = HashSet::new();
        self.nodes
            .iter()
            .filter_map(|(_, node)| node.as_window())
            .filter(|window| seen.insert(window.segment))
            .map(|window| {
                let segment = &self.segments[window.segment];
                (segment.kind(), segment.capacity())
            })
            .collect()
    }

    /// The cache owning the reclaimable storage of this list's resilient
    /// segments.
    pub fn chunk_cache(&self) -> &ChunkCache<T> {
        &self.cache
    }

    /// Signals memory pressure: drops reclaimable chunk storage until at least
    /// `bytes` bytes were freed. Returns the number of bytes freed.
    ///
    /// Already written elements are never lost. Affected segments shrink to
    /// their written pages on their next access.
    pub fn reclaim(&mut self, bytes: u64) -> u64 {
        self.cache.reclaim(bytes)
    }

    /// Drops all reclaimable chunk storage. Returns the number of bytes freed.
    pub fn reclaim_all(&mut self) -> u64 {
        self.cache.reclaim_all()
    }

    /// Checks the structural invariants of the list, panicking on the first
    /// violation.
    pub fn verify(&self) {
        let mut prev = None;
        let mut count = 0;
        let mut size = 0;
        let mut windows = HashMap::new();
        for (id, node) in self.nodes.iter() {
            assert_eq!(node.prev, prev, "broken back link at node {id:?}");
            prev = Some(id);
            count += 1;
            size += node.size();
            if let NodeKind::Window(window) = &node.kind {
                assert!(window.start <= window.end, "inverted window {window:?}");
                assert!(
                    window.start + window.size() <= self.segments[window.segment].capacity(),
                    "window {window:?} holds elements past its segment"
                );
                *windows.entry(window.segment).or_insert(0usize) += 1;
            }
        }
        assert_eq!(self.nodes.tail(), prev, "tail is not the last node");
        assert_eq!(count, self.nodes.len(), "nodes unreachable from the head");
        assert_eq!(size, self.size, "element count mismatch");

        for (&segment, &count) in &windows {
            assert_eq!(
                self.segments.windows(segment),
                count,
                "window count mismatch for {segment:?}"
            );
        }
        assert_eq!(windows.len(), self.segments.len(), "orphaned segments");

        let mut nodes = self.nodes.iter().peekable();
        let mut capacity = 0;
        for (region, snapshot) in self.regions.iter() {
            let Some(head) = snapshot.head else {
                assert_eq!(
                    (snapshot.size, snapshot.capacity),
                    (0, 0),
                    "emptied region {region:?} keeps counters"
                );
                continue;
            };
            assert_eq!(
                nodes.peek().map(|(id, _)| *id),
                Some(head),
                "region {region:?} does not start at its head"
            );
            let (mut members, mut region_size, mut region_capacity) = (0, 0, 0);
            while let Some((_, node)) = nodes.next_if(|(_, node)| node.region == region) {
                members += 1;
                region_size += node.size();
                region_capacity += node.capacity();
            }
            assert_ne!(members, 0, "region {region:?} has no member nodes");
            assert_eq!(region_size, snapshot.size, "size mismatch in {region:?}");
            assert_eq!(
                region_capacity, snapshot.capacity,
                "capacity mismatch in {region:?}"
            );
            capacity += region_capacity;
        }
        assert!(nodes.next().is_none(), "nodes outside the region chain");
        assert_eq!(capacity, self.total_capacity, "total capacity mismatch");
        assert_eq!(
            self.regions.tail(),
            self.nodes.tail().map(|tail| self.nodes[tail].region),
            "tail region does not hold the tail node"
        );
        if self.nodes.is_empty() {
            assert_eq!(self.regions.len(), 0, "empty list keeps regions");
        }
    }
}

impl<T: std::fmt::Debug> std::fmt::Debug for ResilientList<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let mut list = f.debug_list();
        for (_, node) in self.nodes.iter() {
            match &node.kind {
                NodeKind::Element(node) => {
                    list.entries(node.element.iter());
                }
                NodeKind::Window(window) => {
                    let segment = &self.segments[window.segment];
                    list.entries(
                        (window.start..window.start + window.size())
                            .filter_map(|slot| segment.get(slot).ok()),
                    );
                }
            }
        }
        list.finish()
    }
}

#[cfg(test)]
mod tests {
    use crate::ResilientList;

    #[test]
    fn test_debug_lists_elements_in_order() {
        let mut list = ResilientList::new();
        for i in 0..5 {
            list.push(i);
        }
        list.insert(2, 9).unwrap();
        list.remove(0).unwrap();
        assert_eq!(format!("{list:?}"), "[1, 9, 2, 3, 4]");
    }

    #[test]
    #[should_panic(expected = "element count mismatch")]
    fn test_verify_detects_size_drift() {
        let mut list = ResilientList::new();
        list.push(1u8);
        list.size += 1;
        list.verify();
    }

    #[test]
    #[should_panic(expected = "capacity mismatch")]
    fn test_verify_detects_region_drift() {
        let mut list = ResilientList::new();
        list.push(1u8);
        let region = list.regions.head().unwrap();
        list.regions[region].capacity += 1;
        list.verify();
    }

    #[test]
    fn test_empty_list_verifies() {
        let list = ResilientList::<u8>::new();
        list.verify();
        assert!(list.segment_kinds().is_empty());
        assert_eq!(format!("{list:?}"), "[]");
    }
}
