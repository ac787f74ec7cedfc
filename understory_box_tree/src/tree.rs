// Copyright 2025 the Understory Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Core tree implementation: storage and incremental maintenance.

use alloc::vec::Vec;
use core::hash::Hash;

use kurbo::Point;
use log::trace;
use understory_index::{Aabb2D, HandleMap, SpatialIndex};

use crate::types::{BoxTreeNode, Plane2D, TreeFlags};

/// Flattened bounding volume hierarchy over 2D boxes.
///
/// Mutations are cheap and mostly deferred: [`BoxTree::add`] and out-of-order
/// [`BoxTree::remove`] schedule a rebuild, and [`BoxTree::update`] either patches
/// the leaf in place or schedules a rebound (interior boxes recomputed) or, once
/// nodes keep moving, a rebuild. Call [`BoxTree::finalize`] once after a batch of
/// mutations and before querying.
pub struct BoxTree<K> {
    pub(crate) nodes: Vec<BoxTreeNode<K>>,
    /// Scratch list of leaves reused across rebuilds.
    pub(crate) build_nodes: Vec<BoxTreeNode<K>>,
    /// Scratch stack reused across rebounds.
    pub(crate) rebound_stack: Vec<usize>,
    pub(crate) handles: HandleMap<K>,
    pub(crate) end_node: usize,
    pub(crate) num_adds: usize,
    pub(crate) num_updates: usize,
    pub(crate) num_external_nodes: usize,
    pub(crate) start_update: usize,
    pub(crate) end_update: usize,
    pub(crate) flags: TreeFlags,
    pub(crate) high_quality: bool,
}

impl<K> core::fmt::Debug for BoxTree<K> {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("BoxTree")
            .field("leaves", &self.num_external_nodes)
            .field("end_node", &self.end_node)
            .field("flags", &self.flags)
            .field("high_quality", &self.high_quality)
            .finish_non_exhaustive()
    }
}

impl<K: Copy + Eq + Hash> Default for BoxTree<K> {
    fn default() -> Self {
        Self::new(false)
    }
}

impl<K: Copy + Eq + Hash> BoxTree<K> {
    /// Create an empty tree.
    ///
    /// With `high_quality`, rebuilds evaluate four candidate split keys per level
    /// and keep the one with the tightest children, trading build time for
    /// faster queries.
    pub fn new(high_quality: bool) -> Self {
        Self {
            nodes: Vec::new(),
            build_nodes: Vec::new(),
            rebound_stack: Vec::new(),
            handles: HandleMap::new(),
            end_node: 0,
            num_adds: 0,
            num_updates: 0,
            num_external_nodes: 0,
            start_update: usize::MAX,
            end_update: 0,
            flags: TreeFlags::empty(),
            high_quality,
        }
    }

    /// Start tracking `node` with box `extents`.
    ///
    /// The node becomes queryable right away but the hierarchy is only
    /// restructured on the next [`BoxTree::finalize`].
    pub fn add(&mut self, node: K, extents: &Aabb2D<f64>) {
        debug_assert!(
            extents.min_x <= extents.max_x && extents.min_y <= extents.max_y,
            "box tree extents must have min <= max"
        );
        let index = self.end_node;
        let leaf = BoxTreeNode::leaf(*extents, node);
        if index < self.nodes.len() {
            self.nodes[index] = leaf;
        } else {
            self.nodes.push(leaf);
        }
        self.handles.insert(node, index);
        self.end_node = index + 1;
        self.flags.insert(TreeFlags::NEEDS_REBUILD);
        self.num_adds += 1;
        self.num_external_nodes += 1;
    }

    /// Replace the box of `node`, adding it if it is not tracked yet.
    pub fn update(&mut self, node: K, extents: &Aabb2D<f64>) {
        let Some(index) = self.handles.get(node) else {
            self.add(node, extents);
            return;
        };

        let leaf = &mut self.nodes[index];
        let grew = !leaf.extents.contains(extents);
        leaf.extents = *extents;

        if !grew && self.flags.is_empty() {
            return;
        }
        if self.flags.contains(TreeFlags::NEEDS_REBUILD) || self.nodes.len() <= 1 {
            return;
        }

        self.num_updates += 1;
        self.start_update = self.start_update.min(index);
        self.end_update = self.end_update.max(index);

        if !self.flags.contains(TreeFlags::NEEDS_REBOUND) {
            // Many moved leaves: refit everything instead of checking parents.
            let escaped = 2 * self.num_updates > self.num_external_nodes
                || self
                    .find_parent(index)
                    .is_none_or(|parent| !self.nodes[parent].extents.contains(extents));
            if escaped {
                trace!("box tree update of slot {index} schedules a rebound");
                self.flags.insert(TreeFlags::NEEDS_REBOUND);
            }
        } else if self.num_updates > 3 * self.num_external_nodes {
            trace!(
                "box tree escalates to rebuild after {} updates",
                self.num_updates
            );
            self.flags.insert(TreeFlags::NEEDS_REBUILD);
            // Counted as adds so the rebuild re-sorts the leaves.
            self.num_adds = self.num_updates;
        }
    }

    /// Stop tracking `node`. Unknown nodes are ignored.
    pub fn remove(&mut self, node: K) {
        let Some(index) = self.handles.remove(node) else {
            return;
        };
        if self.num_external_nodes <= 1 {
            self.clear();
            return;
        }

        self.nodes[index].clear();
        if index + 1 >= self.end_node {
            let mut end = self.end_node;
            while end > 0 && !self.nodes[end - 1].is_leaf() {
                end -= 1;
            }
            self.end_node = end;
        } else {
            self.flags.insert(TreeFlags::NEEDS_REBUILD);
        }
        self.num_external_nodes -= 1;
    }

    /// Position of the nearest entry before `index` whose subtree contains it.
    pub(crate) fn find_parent(&self, index: usize) -> Option<usize> {
        (0..index)
            .rev()
            .find(|&parent| self.nodes[parent].escape() > index - parent)
    }

    /// Whether a rebuild or rebound is pending.
    pub fn needs_finalize(&self) -> bool {
        self.flags
            .intersects(TreeFlags::NEEDS_REBUILD | TreeFlags::NEEDS_REBOUND)
    }

    /// Apply pending structural work: a rebuild if scheduled, otherwise a
    /// rebound if scheduled.
    pub fn finalize(&mut self) {
        if self.flags.contains(TreeFlags::NEEDS_REBUILD) {
            self.rebuild();
        } else if self.flags.contains(TreeFlags::NEEDS_REBOUND) {
            self.rebound();
        }
    }

    /// Forget every node.
    pub fn clear(&mut self) {
        self.nodes.clear();
        self.handles.clear();
        self.end_node = 0;
        self.num_adds = 0;
        self.num_updates = 0;
        self.num_external_nodes = 0;
        self.reset_update_range();
        self.flags = TreeFlags::empty();
    }

    pub(crate) fn reset_update_range(&mut self) {
        self.start_update = usize::MAX;
        self.end_update = 0;
    }

    /// Number of tracked nodes.
    pub fn len(&self) -> usize {
        self.num_external_nodes
    }

    /// Whether no node is tracked.
    pub fn is_empty(&self) -> bool {
        self.num_external_nodes == 0
    }

    /// The live part of the node array, in pre-order.
    pub fn nodes(&self) -> &[BoxTreeNode<K>] {
        &self.nodes[..self.end_node]
    }

    /// The root entry, if any node is tracked.
    pub fn root_node(&self) -> Option<&BoxTreeNode<K>> {
        self.nodes().first()
    }

    /// One past the last live entry of [`BoxTree::nodes`].
    pub fn end_node_index(&self) -> usize {
        self.end_node
    }

    /// Whether rebuilds use the four-key split heuristic.
    pub fn high_quality(&self) -> bool {
        self.high_quality
    }

    /// Pending structural work.
    pub fn flags(&self) -> TreeFlags {
        self.flags
    }

    /// Stored box of `node`, if tracked.
    pub fn extents_of(&self, node: K) -> Option<Aabb2D<f64>> {
        self.handles.get(node).map(|i| self.nodes[i].extents)
    }

    /// Whether `node` is tracked.
    pub fn contains(&self, node: K) -> bool {
        self.handles.contains(node)
    }
}

impl<K: Copy + Eq + Hash> SpatialIndex<K> for BoxTree<K> {
    type Extents = Aabb2D<f64>;
    type Plane = Plane2D;
    type Center = Point;
    type Scalar = f64;

    fn add(&mut self, node: K, extents: &Aabb2D<f64>) {
        Self::add(self, node, extents);
    }

    fn update(&mut self, node: K, extents: &Aabb2D<f64>) {
        Self::update(self, node, extents);
    }

    fn remove(&mut self, node: K) {
        Self::remove(self, node);
    }

    fn finalize(&mut self) {
        Self::finalize(self);
    }

    fn clear(&mut self) {
        Self::clear(self);
    }

    fn len(&self) -> usize {
        self.num_external_nodes
    }

    fn overlapping_nodes(&mut self, query: &Aabb2D<f64>, out: &mut Vec<K>) -> usize {
        Self::overlapping_nodes(self, query, out)
    }

    fn overlapping_nodes_in_radius(
        &mut self,
        center: Point,
        radius: f64,
        out: &mut Vec<K>,
    ) -> usize {
        self.circle_overlapping_nodes(center, radius, out)
    }

    fn visible_nodes(&mut self, planes: &[Plane2D], out: &mut Vec<K>) -> usize {
        Self::visible_nodes(self, planes, out)
    }

    fn overlapping_pairs(&mut self, out: &mut Vec<(K, K)>) -> usize {
        Self::overlapping_pairs(self, out)
    }
}

#[cfg(test)]
impl<K: Copy + Eq + Hash + core::fmt::Debug> BoxTree<K> {
    /// Check every structural invariant of a finalized tree.
    pub(crate) fn assert_invariants(&self) {
        let live = self.nodes();
        let leaves = live.iter().filter(|n| n.is_leaf()).count();
        assert_eq!(leaves, self.num_external_nodes, "leaf count drifted");
        assert_eq!(self.handles.len(), leaves, "handle count drifted");
        for (i, n) in live.iter().enumerate() {
            if let Some(external) = n.external {
                assert_eq!(n.escape, 1, "leaves escape to their successor");
                assert_eq!(self.handles.get(external), Some(i), "stale handle");
                continue;
            }
            let stop = i + n.escape();
            assert!(stop <= live.len(), "subtree of {i} runs past the end");
            for child in &live[i + 1..stop] {
                if child.is_leaf() {
                    assert!(
                        n.extents.contains(&child.extents),
                        "interior {i} does not enclose {:?}",
                        child.external
                    );
                }
            }
        }
    }
}
