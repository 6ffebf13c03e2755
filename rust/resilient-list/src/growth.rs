//! Lazy initialization and the growth policy.

use log::{debug, warn};
use resilient_common::Result;

use crate::ResilientList;
use crate::node::{Node, WindowNode};
use crate::region::RegionSnapshot;
use crate::segment::Segment;

impl<T> ResilientList<T> {
    /// Creates the first region, sized by `initial_capacity`.
    pub(crate) fn init(&mut self) -> Result<()> {
        self.total_capacity = 0;
        self.grow_with(self.config.initial_capacity)
    }

    /// Adds capacity after the full tail region: half the current total in a
    /// new region, or a single slot once the tail region ran out of memory.
    pub(crate) fn grow(&mut self) -> Result<()> {
        let tail = self.tail_region()?;
        if self.regions[tail].oom {
            return self.grow_single();
        }
        self.grow_with((self.total_capacity >> 1).max(1))
    }

    fn grow_with(&mut self, capacity: usize) -> Result<()> {
        let segment = match Segment::allocate(capacity, &self.config.budget, &mut self.cache) {
            Ok(segment) => segment,
            Err(err) if err.is_allocation_failure() => {
                warn!(
                    "failed to allocate a segment of {capacity} slots ({err}); \
                     falling back to single-element nodes"
                );
                return self.grow_single();
            }
            Err(err) => return Err(err),
        };
        debug!(
            "growing by {capacity} slots ({:?} segment), total capacity {}",
            segment.kind(),
            self.total_capacity + capacity
        );
        let segment = self.segments.insert(segment);
        let region = self.regions.push_back(RegionSnapshot {
            capacity,
            ..Default::default()
        });
        let node = self
            .nodes
            .push_back(Node::window(region, WindowNode::new(segment, capacity)));
        self.regions[region].head = Some(node);
        self.total_capacity += capacity;
        Ok(())
    }

    /// Links one empty single-element node into the out-of-memory tail region,
    /// starting such a region if the tail is not one.
    fn grow_single(&mut self) -> Result<()> {
        let region = match self.regions.tail() {
            Some(tail) if self.regions[tail].oom => tail,
            _ => {
                debug!("starting an out-of-memory region");
                self.regions.push_back(RegionSnapshot {
                    oom: true,
                    ..Default::default()
                })
            }
        };
        let node = self.nodes.push_back(Node::element(region, None));
        let snapshot = &mut self.regions[region];
        if snapshot.head.is_none() {
            snapshot.head = Some(node);
        }
        snapshot.capacity += 1;
        self.total_capacity += 1;
        Ok(())
    }
}
