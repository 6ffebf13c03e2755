//! List nodes and the doubly linked chain that orders them.
//!
//! Nodes live in a slab and link to each other by `NodeId`. The chain only
//! maintains `prev`/`next`/`head`/`tail`; region membership and counters are
//! kept by the list.

use resilient_common::{Error, Result};
use slab::Slab;

use crate::region::RegionId;
use crate::segment::SegmentId;

/// Stable handle of a node in the `NodeChain`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub(crate) struct NodeId(usize);

impl NodeId {
    #[cfg(test)]
    pub(crate) fn for_tests(index: usize) -> NodeId {
        NodeId(index)
    }
}

pub(crate) struct Node<T> {
    pub prev: Option<NodeId>,
    pub next: Option<NodeId>,
    pub region: RegionId,
    pub kind: NodeKind<T>,
}

pub(crate) enum NodeKind<T> {
    Element(ElementNode<T>),
    Window(WindowNode),
}

impl<T> Node<T> {
    pub fn element(region: RegionId, element: Option<T>) -> Node<T> {
        Node {
            prev: None,
            next: None,
            region,
            kind: NodeKind::Element(ElementNode { element }),
        }
    }

    pub fn window(region: RegionId, window: WindowNode) -> Node<T> {
        Node {
            prev: None,
            next: None,
            region,
            kind: NodeKind::Window(window),
        }
    }

    pub fn size(&self) -> usize {
        match &self.kind {
            NodeKind::Element(node) => node.size(),
            NodeKind::Window(node) => node.size(),
        }
    }

    pub fn capacity(&self) -> usize {
        match &self.kind {
            NodeKind::Element(_) => 1,
            NodeKind::Window(node) => node.capacity(),
        }
    }

    pub fn as_window(&self) -> Option<&WindowNode> {
        match &self.kind {
            NodeKind::Window(window) => Some(window),
            NodeKind::Element(_) => None,
        }
    }

    pub fn as_window_mut(&mut self) -> Option<&mut WindowNode> {
        match &mut self.kind {
            NodeKind::Window(window) => Some(window),
            NodeKind::Element(_) => None,
        }
    }
}

/// A node holding at most one element of its own.
pub(crate) struct ElementNode<T> {
    pub element: Option<T>,
}

impl<T> ElementNode<T> {
    pub fn size(&self) -> usize {
        self.element.is_some() as usize
    }

    pub fn get(&self, offset: usize) -> Result<&T> {
        match (&self.element, offset) {
            (Some(element), 0) => Ok(element),
            _ => Err(Error::invariant(format!(
                "offset {offset} outside element node of size {}",
                self.size()
            ))),
        }
    }

    pub fn get_mut(&mut self, offset: usize) -> Result<&mut T> {
        let size = self.size();
        match (&mut self.element, offset) {
            (Some(element), 0) => Ok(element),
            _ => Err(Error::invariant(format!(
                "offset {offset} outside element node of size {size}"
            ))),
        }
    }
}

/// A view `[start, end)` over a segment with a write cursor `ptr`.
#[derive(Debug, Clone, Copy)]
pub(crate) struct WindowNode {
    pub segment: SegmentId,
    pub start: usize,
    pub end: usize,
    /// Next unwritten slot of the segment.
    pub ptr: usize,
}

impl WindowNode {
    pub fn new(segment: SegmentId, capacity: usize) -> WindowNode {
        WindowNode {
            segment,
            start: 0,
            end: capacity,
            ptr: 0,
        }
    }

    pub fn size(&self) -> usize {
        self.capacity().min(self.ptr.saturating_sub(self.start))
    }

    pub fn capacity(&self) -> usize {
        self.end.saturating_sub(self.start)
    }

    pub fn is_full(&self) -> bool {
        self.ptr >= self.end
    }

    /// Segment slot of in-window offset `offset`.
    pub fn slot(&self, offset: usize) -> Result<usize> {
        if offset < self.size() {
            Ok(self.start + offset)
        } else {
            Err(Error::invariant(format!(
                "offset {offset} outside window [{}, {}) of size {}",
                self.start,
                self.end,
                self.size()
            )))
        }
    }
}

pub(crate) struct NodeChain<T> {
    nodes: Slab<Node<T>>,
    head: Option<NodeId>,
    tail: Option<NodeId>,
}

impl<T> NodeChain<T> {
    pub fn new() -> NodeChain<T> {
        NodeChain {
            nodes: Slab::new(),
            head: None,
            tail: None,
        }
    }

    pub fn head(&self) -> Option<NodeId> {
        self.head
    }

    pub fn tail(&self) -> Option<NodeId> {
        self.tail
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    /// Links `node` after the current tail.
    pub fn push_back(&mut self, node: Node<T>) -> NodeId {
        match self.tail {
            Some(tail) => self.insert_after(tail, node),
            None => {
                let id = NodeId(self.nodes.insert(node));
                self.head = Some(id);
                self.tail = Some(id);
                id
            }
        }
    }

    pub fn insert_before(&mut self, at: NodeId, mut node: Node<T>) -> NodeId {
        let prev = self.nodes[at.0].prev;
        node.prev = prev;
        node.next = Some(at);
        let id = NodeId(self.nodes.insert(node));
        self.nodes[at.0].prev = Some(id);
        match prev {
            Some(prev) => self.nodes[prev.0].next = Some(id),
            None => self.head = Some(id),
        }
        id
    }

    pub fn insert_after(&mut self, at: NodeId, mut node: Node<T>) -> NodeId {
        let next = self.nodes[at.0].next;
        node.prev = Some(at);
        node.next = next;
        let id = NodeId(self.nodes.insert(node));
        self.nodes[at.0].next = Some(id);
        match next {
            Some(next) => self.nodes[next.0].prev = Some(id),
            None => self.tail = Some(id),
        }
        id
    }

    /// Unlinks `id` and returns the node with its links cleared.
    pub fn unlink(&mut self, id: NodeId) -> Node<T> {
        let mut node = self.nodes.remove(id.0);
        match node.next {
            Some(next) => self.nodes[next.0].prev = node.prev,
            None => self.tail = node.prev,
        }
        match node.prev {
            Some(prev) => self.nodes[prev.0].next = node.next,
            None => self.head = node.next,
        }
        node.prev = None;
        node.next = None;
        node
    }

    pub fn clear(&mut self) {
        self.nodes.clear();
        self.head = None;
        self.tail = None;
    }

    /// Iterates nodes in list order.
    pub fn iter(&self) -> impl Iterator<Item = (NodeId, &Node<T>)> {
        std::iter::successors(self.head, |&id| self.nodes[id.0].next)
            .map(|id| (id, &self.nodes[id.0]))
    }
}

impl<T> std::ops::Index<NodeId> for NodeChain<T> {
    type Output = Node<T>;

    fn index(&self, id: NodeId) -> &Self::Output {
        &self.nodes[id.0]
    }
}

impl<T> std::ops::IndexMut<NodeId> for NodeChain<T> {
    fn index_mut(&mut self, id: NodeId) -> &mut Self::Output {
        &mut self.nodes[id.0]
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn values(chain: &NodeChain<u32>) -> Vec<u32> {
        chain
            .iter()
            .map(|(_, node)| match &node.kind {
                NodeKind::Element(e) => e.element.unwrap(),
                NodeKind::Window(_) => unreachable!(),
            })
            .collect()
    }

    fn element(value: u32) -> Node<u32> {
        Node::element(RegionId::for_tests(0), Some(value))
    }

    #[test]
    fn test_link_and_unlink() {
        let mut chain = NodeChain::new();
        let b = chain.push_back(element(2));
        let a = chain.insert_before(b, element(1));
        let d = chain.insert_after(b, element(4));
        chain.insert_before(d, element(3));
        assert_eq!(values(&chain), vec![1, 2, 3, 4]);
        assert_eq!(chain.head(), Some(a));
        assert_eq!(chain.tail(), Some(d));

        let removed = chain.unlink(a);
        assert!(removed.prev.is_none() && removed.next.is_none());
        assert_eq!(chain.head(), Some(b));
        chain.unlink(d);
        assert_eq!(values(&chain), vec![2, 3]);
        assert!(chain[chain.tail().unwrap()].next.is_none());

        chain.clear();
        assert!(chain.is_empty());
        assert!(chain.head().is_none() && chain.tail().is_none());
    }

    #[test]
    fn test_window_geometry() {
        let mut window = WindowNode::new(SegmentId::for_tests(0), 8);
        assert_eq!(window.size(), 0);
        assert_eq!(window.capacity(), 8);
        window.ptr = 5;
        window.start = 2;
        assert_eq!(window.size(), 3);
        assert_eq!(window.slot(2).unwrap(), 4);
        assert!(window.slot(3).is_err());
        assert!(!window.is_full());

        // Clipped below the write cursor: size never exceeds capacity.
        window.end = 4;
        assert_eq!(window.size(), 2);
        assert!(window.is_full());
    }

    #[test]
    fn test_element_node_offsets() {
        let mut node = ElementNode { element: Some(7u32) };
        assert_eq!(*node.get(0).unwrap(), 7);
        assert!(node.get(1).is_err());
        *node.get_mut(0).unwrap() = 8;
        assert_eq!(node.size(), 1);
        node.element = None;
        assert_eq!(node.size(), 0);
        assert!(node.get(0).is_err());
    }
}
