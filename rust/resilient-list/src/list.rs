//! The list facade: public operations over the node, region and segment
//! structures.

use resilient_common::{Error, Result, verify_invariant};

use crate::cache::ChunkCache;
use crate::config::ResilientListConfig;
use crate::node::{Node, NodeChain, NodeId, NodeKind, WindowNode};
use crate::region::{RegionChain, RegionId};
use crate::segment::SegmentTable;

/// An index-addressable sequence that degrades instead of failing under memory
/// pressure.
///
/// Elements live in segments viewed by window nodes, or in single-element nodes
/// when bulk storage could not be allocated. Large segments are resilient: their
/// unwritten storage belongs to the list's [`ChunkCache`] and may be reclaimed
/// at any point between operations (see [`ResilientList::reclaim`]). Written
/// elements are never lost; the affected segment just shrinks to the pages it
/// actually used and the list grows again past it.
///
/// The list is single-threaded and gives no iteration API; elements are reached
/// by index.
pub struct ResilientList<T> {
    pub(crate) nodes: NodeChain<T>,
    pub(crate) regions: RegionChain,
    pub(crate) segments: SegmentTable<T>,
    pub(crate) cache: ChunkCache<T>,
    /// Logical element count.
    pub(crate) size: usize,
    /// Slot capacity over all regions; only drives growth sizing.
    pub(crate) total_capacity: usize,
    pub(crate) config: ResilientListConfig,
}

impl<T> ResilientList<T> {
    /// Creates an empty list with the default configuration. No storage is
    /// allocated until the first push.
    pub fn new() -> ResilientList<T> {
        Self::from_valid_config(ResilientListConfig::default())
    }

    /// Creates an empty list with `config`, failing if the configuration is
    /// invalid.
    pub fn with_config(config: ResilientListConfig) -> Result<ResilientList<T>> {
        config.validate()?;
        Ok(Self::from_valid_config(config))
    }

    fn from_valid_config(config: ResilientListConfig) -> ResilientList<T> {
        ResilientList {
            nodes: NodeChain::new(),
            regions: RegionChain::new(),
            segments: SegmentTable::new(),
            cache: ChunkCache::new(config.reclaim_budget),
            size: 0,
            total_capacity: 0,
            config,
        }
    }

    pub fn len(&self) -> usize {
        self.size
    }

    pub fn is_empty(&self) -> bool {
        self.size == 0
    }

    /// Returns the element at `index`.
    pub fn get(&self, index: usize) -> Result<&T> {
        let location = self.locate(index)?;
        match &self.nodes[location.node].kind {
            NodeKind::Element(node) => node.get(location.element_offset),
            NodeKind::Window(window) => {
                let slot = window.slot(location.element_offset)?;
                self.segments[window.segment].get(slot)
            }
        }
    }

    /// Returns a mutable reference to the element at `index`.
    pub fn get_mut(&mut self, index: usize) -> Result<&mut T> {
        let location = self.locate_mut(index)?;
        match &mut self.nodes[location.node].kind {
            NodeKind::Element(node) => node.get_mut(location.element_offset),
            NodeKind::Window(window) => {
                let slot = window.slot(location.element_offset)?;
                self.segments[window.segment].get_mut(slot)
            }
        }
    }

    /// Returns the first element, or `None` if the list is empty.
    pub fn first(&self) -> Result<Option<&T>> {
        if self.is_empty() {
            return Ok(None);
        }
        self.get(0).map(Some)
    }

    /// Returns the last element, or `None` if the list is empty.
    pub fn last(&self) -> Result<Option<&T>> {
        match self.size.checked_sub(1) {
            Some(index) => self.get(index).map(Some),
            None => Ok(None),
        }
    }

    /// Appends `element` at the end of the list.
    ///
    /// Never fails observably: when storage for a new segment cannot be
    /// allocated, the element is kept in a single-element node instead.
    ///
    /// Once a segment allocation has failed, the tail region is marked out of
    /// memory and later pushes into it keep adding single-element nodes, even if
    /// budget has been returned since. Index lookups slow down as these nodes
    /// accumulate; growth resumes in bulk only when the tail moves to a new
    /// region, for example after `clear`.
    ///
    /// # Panics
    ///
    /// Panics if the internal structure is found corrupted.
    pub fn push(&mut self, element: T) {
        if let Err(err) = self.try_push(element) {
            panic!("resilient list corrupted while appending: {err}");
        }
    }

    /// Inserts `element` before position `index`, shifting later elements up.
    /// `index == len()` appends.
    pub fn insert(&mut self, index: usize, element: T) -> Result<()> {
        if index == self.size {
            return self.try_push(element);
        }
        let location = self.locate_mut(index)?;
        let at = location.node;
        if self.nodes[at].as_window().is_some() {
            self.fracture(at, location.element_offset)?;
        }
        let region = self.nodes[at].region;
        let node = self.nodes.insert_before(at, Node::element(region, Some(element)));
        let snapshot = &mut self.regions[region];
        if snapshot.head == Some(at) {
            snapshot.head = Some(node);
        }
        snapshot.size += 1;
        snapshot.capacity += 1;
        self.size += 1;
        self.total_capacity += 1;
        Ok(())
    }

    /// Removes and returns the element at `index`, shifting later elements down.
    pub fn remove(&mut self, index: usize) -> Result<T> {
        let location = self.locate_mut(index)?;
        debug_assert_eq!(
            location.region_offset + location.node_offset + location.element_offset,
            index
        );
        let id = location.node;
        if self.nodes[id].as_window().is_none() {
            let node = self.remove_node(id)?;
            return match node.kind {
                NodeKind::Element(node) => node
                    .element
                    .ok_or_else(|| Error::invariant(format!("element node at {index} is empty"))),
                NodeKind::Window(_) => Err(Error::invariant("element node turned into a window")),
            };
        }

        self.fracture(id, location.element_offset)?;
        let window = self.window(id)?;
        let element = self.segments[window.segment].take(window.start)?;
        if window.size() == 1 {
            self.remove_node(id)?;
        } else {
            if let Some(window) = self.nodes[id].as_window_mut() {
                window.start += 1;
            }
            let region = self.nodes[id].region;
            self.regions[region].size -= 1;
            self.regions[region].capacity -= 1;
            self.size -= 1;
            self.total_capacity -= 1;
        }
        Ok(element)
    }

    /// Removes every element and releases all storage.
    pub fn clear(&mut self) {
        self.nodes.clear();
        self.regions.clear();
        self.segments.clear();
        self.cache.sweep();
        self.size = 0;
        self.total_capacity = 0;
    }

    pub(crate) fn try_push(&mut self, element: T) -> Result<()> {
        if self.nodes.is_empty() {
            self.init()?;
        }
        self.refresh_tail()?;
        let tail = self.tail_region()?;
        if self.regions[tail].is_full() {
            self.grow()?;
        }
        if let Some(element) = self.try_append_tail(element)? {
            let region = self.tail_region()?;
            let node = self.nodes.push_back(Node::element(region, Some(element)));
            let snapshot = &mut self.regions[region];
            if snapshot.head.is_none() {
                snapshot.head = Some(node);
            }
            snapshot.size += 1;
            snapshot.capacity += 1;
            self.total_capacity += 1;
        }
        self.size += 1;
        Ok(())
    }

    /// Appends in place into the tail node. Hands the element back if the tail
    /// node has no room.
    fn try_append_tail(&mut self, element: T) -> Result<Option<T>> {
        let Some(tail) = self.nodes.tail() else {
            return Ok(Some(element));
        };
        let region = self.nodes[tail].region;
        match &mut self.nodes[tail].kind {
            NodeKind::Element(node) if node.element.is_none() => node.element = Some(element),
            NodeKind::Window(window) if !window.is_full() => {
                self.segments[window.segment].store(window.ptr, element)?;
                window.ptr += 1;
            }
            _ => return Ok(Some(element)),
        }
        self.regions[region].size += 1;
        Ok(None)
    }

    /// Brings the tail window in line with its segment, so that a reclaimed
    /// segment reports the tail region full once its recovered capacity is used.
    fn refresh_tail(&mut self) -> Result<()> {
        if let Some(tail) = self.nodes.tail() {
            self.clip_window(tail)?;
        }
        Ok(())
    }

    /// Clips the window `id` to the current capacity of its segment and
    /// propagates the lost capacity to the region and list counters. Returns
    /// the number of slots clipped off.
    pub(crate) fn clip_window(&mut self, id: NodeId) -> Result<usize> {
        let Some(window) = self.nodes[id].as_window().copied() else {
            return Ok(0);
        };
        let segment = &mut self.segments[window.segment];
        segment.check()?;
        let capacity = segment.capacity();
        if window.end <= capacity {
            return Ok(0);
        }
        let end = capacity.max(window.start);
        let clipped = window.end - end;
        if let Some(window) = self.nodes[id].as_window_mut() {
            window.end = end;
        }
        let region = self.nodes[id].region;
        self.regions[region].capacity -= clipped;
        self.total_capacity -= clipped;
        Ok(clipped)
    }

    /// Splits the window `id` at in-window offset `offset` without copying.
    ///
    /// The first `offset` elements move to a new window linked before `id`,
    /// which then starts at the split point. Returns the node now preceding
    /// `id`.
    pub(crate) fn fracture(&mut self, id: NodeId, offset: usize) -> Result<Option<NodeId>> {
        if offset == 0 {
            return Ok(self.nodes[id].prev);
        }
        let window = self.window(id)?;
        verify_invariant!(offset < window.size());
        let split = window.start + offset;
        let left = WindowNode {
            segment: window.segment,
            start: window.start,
            end: split,
            ptr: split,
        };
        let region = self.nodes[id].region;
        self.segments.retain(window.segment);
        let left = self.nodes.insert_before(id, Node::window(region, left));
        if let Some(window) = self.nodes[id].as_window_mut() {
            window.start = split;
        }
        if self.regions[region].head == Some(id) {
            self.regions[region].head = Some(left);
        }
        Ok(Some(left))
    }

    /// Unlinks node `id`, settling every counter and chain it took part in.
    pub(crate) fn remove_node(&mut self, id: NodeId) -> Result<Node<T>> {
        self.clip_window(id)?;
        let (prev, next, region) = {
            let node = &self.nodes[id];
            (node.prev, node.next, node.region)
        };
        let size = self.nodes[id].size();
        let capacity = self.nodes[id].capacity();
        let next_region = next.map(|next| self.nodes[next].region);

        let snapshot = &mut self.regions[region];
        if snapshot.head == Some(id) {
            snapshot.head = next.filter(|_| next_region == Some(region));
        }
        snapshot.size -= size;
        snapshot.capacity -= capacity;
        self.size -= size;
        self.total_capacity -= capacity;

        let was_head = self.nodes.head() == Some(id);
        let was_tail = self.nodes.tail() == Some(id);
        let node = self.nodes.unlink(id);
        if let Some(window) = node.as_window() {
            if let Some(segment) = self.segments.release(window.segment) {
                drop(segment);
                self.cache.sweep();
            }
        }

        if self.nodes.is_empty() {
            self.clear();
            return Ok(node);
        }
        if was_tail {
            self.regions.set_tail(prev.map(|prev| self.nodes[prev].region));
        }
        if was_head {
            if let Some(next_region) = next_region {
                self.regions.release_before(next_region);
            }
        }
        Ok(node)
    }

    fn window(&self, id: NodeId) -> Result<WindowNode> {
        self.nodes[id]
            .as_window()
            .copied()
            .ok_or_else(|| Error::invariant("expected a window node"))
    }

    pub(crate) fn tail_region(&self) -> Result<RegionId> {
        self.regions
            .tail()
            .ok_or_else(|| Error::invariant("non-empty list has no tail region"))
    }
}

impl<T> Default for ResilientList<T> {
    fn default() -> Self {
        Self::new()
    }
}
