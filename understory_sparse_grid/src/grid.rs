// Copyright 2025 the Understory Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Grid storage and incremental maintenance.

use core::hash::Hash;

use glam::{Vec3, Vec4};
use rustc_hash::FxHashSet;
use understory_index::{Aabb3D, HandleMap, SpatialIndex};

use crate::cell::{CellPool, GridCell, to_u32};
use crate::hash::{CellRect, cell_coord, cell_hash, in_cell_range};

/// Default visibility fallback ratio, see [`SparseGrid::with_brute_force_ratio`].
pub const DEFAULT_BRUTE_FORCE_RATIO: usize = 2;

/// A tracked box and its place in the grid.
#[derive(Clone, Copy, Debug)]
pub struct GridNode<K> {
    pub(crate) extents: Aabb3D<f32>,
    pub(crate) cell_extents: CellRect,
    /// Stamp of the last query that visited this node.
    pub(crate) query_index: u32,
    pub(crate) id: u32,
    pub(crate) external: Option<K>,
}

impl<K> GridNode<K> {
    pub(crate) fn new(extents: Aabb3D<f32>, id: u32, external: K) -> Self {
        Self {
            extents,
            cell_extents: CellRect::default(),
            query_index: 0,
            id,
            external: Some(external),
        }
    }

    /// The node's box.
    pub fn extents(&self) -> &Aabb3D<f32> {
        &self.extents
    }

    /// Cells covered by the node's XZ footprint.
    pub fn cell_extents(&self) -> CellRect {
        self.cell_extents
    }

    /// Slot of the node in the grid's node array.
    pub fn id(&self) -> u32 {
        self.id
    }
}

impl<K: Copy> GridNode<K> {
    /// The caller's identity for this node.
    pub fn external(&self) -> Option<K> {
        self.external
    }
}

/// Sparse spatial hash over 3D boxes.
///
/// The XZ plane is cut into square cells of a fixed size and each box is listed
/// in every cell its XZ footprint covers. Only occupied cells exist. Each cell
/// keeps its nodes sorted by min-Y along with their Y range, so queries also
/// prune along the vertical axis.
///
/// Mutations take effect immediately; [`SparseGrid::finalize`] does nothing.
/// Queries take `&mut self` because they repair stale cells and stamp visited
/// nodes so that boxes spanning several cells are reported once.
pub struct SparseGrid<K> {
    cell_size: f32,
    inv_cell_size: f32,
    pub(crate) brute_force_ratio: usize,
    pub(crate) cells: CellPool,
    pub(crate) nodes: Vec<GridNode<K>>,
    pub(crate) num_nodes: usize,
    handles: HandleMap<K>,
    pub(crate) query_index: u32,
    /// Scratch planes not yet passed by the current cell.
    pub(crate) cell_planes: Vec<Vec4>,
    /// Scratch set of reported pairs.
    pub(crate) pair_ids: FxHashSet<u64>,
    extents: Aabb3D<f32>,
    dirty_extents: bool,
}

impl<K> core::fmt::Debug for SparseGrid<K> {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("SparseGrid")
            .field("cell_size", &self.cell_size)
            .field("nodes", &self.num_nodes)
            .field("cells", &self.cells.live)
            .field("brute_force_ratio", &self.brute_force_ratio)
            .finish_non_exhaustive()
    }
}

impl<K: Copy + Eq + Hash> SparseGrid<K> {
    /// Create an empty grid with square cells of side `cell_size`.
    pub fn new(cell_size: f32) -> Self {
        debug_assert!(cell_size > 0.0, "cell size must be positive");
        Self {
            cell_size,
            inv_cell_size: 1.0 / cell_size,
            brute_force_ratio: DEFAULT_BRUTE_FORCE_RATIO,
            cells: CellPool::default(),
            nodes: Vec::new(),
            num_nodes: 0,
            handles: HandleMap::new(),
            query_index: 0,
            cell_planes: Vec::new(),
            pair_ids: FxHashSet::default(),
            extents: Aabb3D::EMPTY,
            dirty_extents: true,
        }
    }

    /// Set when [`SparseGrid::visible_nodes`] skips the cells and tests every
    /// node directly: whenever `num_cells * ratio > len`.
    ///
    /// Sparse scenes with many single-node cells cull faster node by node.
    /// A ratio of `0` disables the fallback.
    #[must_use]
    pub fn with_brute_force_ratio(mut self, ratio: usize) -> Self {
        self.brute_force_ratio = ratio;
        self
    }

    /// Start tracking `node` with box `extents`.
    pub fn add(&mut self, node: K, extents: &Aabb3D<f32>) {
        debug_assert!(
            extents.min_x <= extents.max_x
                && extents.min_y <= extents.max_y
                && extents.min_z <= extents.max_z,
            "sparse grid extents must have min <= max"
        );
        let index = self.num_nodes;
        let id = to_u32(index);
        let footprint = self.footprint(extents);
        let mut entry = GridNode::new(*extents, id, node);
        entry.cell_extents = footprint;
        if index < self.nodes.len() {
            self.nodes[index] = entry;
        } else {
            self.nodes.push(entry);
        }
        self.handles.insert(node, index);
        self.num_nodes += 1;
        self.dirty_extents = true;
        self.add_to_cells(id, footprint);
    }

    /// Replace the box of `node`, adding it if it is not tracked yet.
    ///
    /// Only the cells whose membership changes are touched.
    pub fn update(&mut self, node: K, extents: &Aabb3D<f32>) {
        let Some(index) = self.handles.get(node) else {
            self.add(node, extents);
            return;
        };
        self.dirty_extents = true;

        let entry = &mut self.nodes[index];
        let old = entry.extents;
        let old_footprint = entry.cell_extents;
        entry.extents = *extents;

        let xz_moved = old.min_x != extents.min_x
            || old.min_z != extents.min_z
            || old.max_x != extents.max_x
            || old.max_z != extents.max_z;
        if xz_moved {
            let footprint = self.footprint(extents);
            if footprint != old_footprint {
                self.nodes[index].cell_extents = footprint;
                let id = to_u32(index);
                if footprint.overlaps(&old_footprint) {
                    self.update_cells(id, old_footprint, footprint);
                } else {
                    self.remove_from_cells(id, old_footprint);
                    self.add_to_cells(id, footprint);
                }
                return;
            }
        }

        if old.min_y != extents.min_y || old.max_y != extents.max_y {
            self.flag_cells(old_footprint);
        }
    }

    /// Stop tracking `node`. Unknown nodes are ignored.
    ///
    /// The last node of the array moves into the freed slot.
    pub fn remove(&mut self, node: K) {
        let Some(index) = self.handles.remove(node) else {
            return;
        };
        if self.num_nodes <= 1 {
            self.clear();
            return;
        }
        self.dirty_extents = true;

        let id = to_u32(index);
        self.remove_from_cells(id, self.nodes[index].cell_extents);
        self.num_nodes -= 1;
        let last = self.num_nodes;
        self.nodes[index].external = None;
        self.nodes[index].query_index = 0;

        if index != last {
            self.nodes.swap(index, last);
            self.nodes[last].id = to_u32(last);
            let moved = &mut self.nodes[index];
            moved.id = id;
            let footprint = moved.cell_extents;
            if let Some(external) = moved.external {
                self.handles.set(external, index);
            }
            for (x, z) in footprint.cells() {
                let cell = self.cells.get_mut(cell_hash(x, z));
                debug_assert!(cell.is_some(), "node {last} lists missing cell ({x}, {z})");
                if let Some(cell) = cell {
                    cell.replace_node(to_u32(last), id);
                }
            }
        }
    }

    /// Nothing to do: every mutation is applied eagerly.
    pub fn finalize(&mut self) {}

    /// Forget every node and cell.
    pub fn clear(&mut self) {
        self.cells.clear();
        self.nodes.clear();
        self.num_nodes = 0;
        self.handles.clear();
        self.query_index = 0;
        self.extents = Aabb3D::EMPTY;
        self.dirty_extents = true;
    }

    /// Number of tracked nodes.
    pub fn len(&self) -> usize {
        self.num_nodes
    }

    /// Whether no node is tracked.
    pub fn is_empty(&self) -> bool {
        self.num_nodes == 0
    }

    /// Side of a cell.
    pub fn cell_size(&self) -> f32 {
        self.cell_size
    }

    /// See [`SparseGrid::with_brute_force_ratio`].
    pub fn brute_force_ratio(&self) -> usize {
        self.brute_force_ratio
    }

    /// Number of occupied cells.
    pub fn num_cells(&self) -> usize {
        self.cells.live
    }

    /// The occupied cells, in no particular order.
    pub fn cells(&self) -> &[GridCell] {
        &self.cells.cells[..self.cells.live]
    }

    /// The tracked nodes, indexed by [`GridNode::id`].
    pub fn nodes(&self) -> &[GridNode<K>] {
        &self.nodes[..self.num_nodes]
    }

    /// World-space box covering every occupied cell, with the cells' Y ranges.
    ///
    /// Recomputed lazily after mutations. [`Aabb3D::EMPTY`] when the grid is empty.
    pub fn extents(&mut self) -> Aabb3D<f32> {
        if self.dirty_extents {
            let size = self.cell_size;
            let (cells, nodes) = (&mut self.cells, &self.nodes);
            self.extents = cells.live_mut().iter_mut().fold(Aabb3D::EMPTY, |acc, cell| {
                cell.refresh(nodes);
                acc.union(&Aabb3D::new(
                    cell.x(),
                    cell.min_y(),
                    cell.z(),
                    cell.x() + size,
                    cell.max_y(),
                    cell.z() + size,
                ))
            });
            self.dirty_extents = false;
        }
        self.extents
    }

    /// Current box of `node`, if tracked.
    pub fn extents_of(&self, node: K) -> Option<Aabb3D<f32>> {
        self.handles.get(node).map(|i| self.nodes[i].extents)
    }

    /// Whether `node` is tracked.
    pub fn contains(&self, node: K) -> bool {
        self.handles.contains(node)
    }

    /// Footprint of a box being stored.
    fn footprint(&self, extents: &Aabb3D<f32>) -> CellRect {
        let inv = self.inv_cell_size;
        debug_assert!(
            in_cell_range(extents.min_x, inv)
                && in_cell_range(extents.min_z, inv)
                && in_cell_range(extents.max_x, inv)
                && in_cell_range(extents.max_z, inv),
            "box lies outside the addressable cell range"
        );
        self.query_rect(extents.min_x, extents.min_z, extents.max_x, extents.max_z)
    }

    /// Cells covered by an XZ rectangle, saturated to the addressable range.
    pub(crate) fn query_rect(&self, min_x: f32, min_z: f32, max_x: f32, max_z: f32) -> CellRect {
        let inv = self.inv_cell_size;
        CellRect {
            min_x: cell_coord(min_x, inv),
            min_z: cell_coord(min_z, inv),
            max_x: cell_coord(max_x, inv),
            max_z: cell_coord(max_z, inv),
        }
    }

    /// Stamp for a new query. Node stamps are reset when the counter wraps.
    pub(crate) fn next_query(&mut self) -> u32 {
        self.query_index = self.query_index.wrapping_add(1);
        if self.query_index == 0 {
            for node in &mut self.nodes {
                node.query_index = 0;
            }
            self.query_index = 1;
        }
        self.query_index
    }

    fn add_to_cells(&mut self, id: u32, footprint: CellRect) {
        let extents = self.nodes[id as usize].extents;
        for (x, z) in footprint.cells() {
            if let Some(cell) = self.cells.get_mut(cell_hash(x, z)) {
                cell.add_node(id);
            } else {
                self.cells.create((x, z), self.cell_size, id, &extents);
            }
        }
    }

    fn remove_from_cells(&mut self, id: u32, footprint: CellRect) {
        for (x, z) in footprint.cells() {
            let hash = cell_hash(x, z);
            let cell = self.cells.get_mut(hash);
            debug_assert!(cell.is_some(), "node {id} lists missing cell ({x}, {z})");
            let Some(cell) = cell else {
                continue;
            };
            if cell.remove_node(id, &self.nodes) == 0 {
                self.cells.retire(hash);
            }
        }
    }

    /// Move node `id` from the `old` footprint to the overlapping `new` one.
    fn update_cells(&mut self, id: u32, old: CellRect, new: CellRect) {
        let extents = self.nodes[id as usize].extents;
        for (x, z) in old.union(&new).cells() {
            let in_old = old.contains(x, z);
            let in_new = new.contains(x, z);
            if !in_old && !in_new {
                continue;
            }
            let hash = cell_hash(x, z);
            let Some(cell) = self.cells.get_mut(hash) else {
                debug_assert!(!in_old, "node {id} lists missing cell ({x}, {z})");
                if in_new {
                    self.cells.create((x, z), self.cell_size, id, &extents);
                }
                continue;
            };
            match (in_old, in_new) {
                (true, true) => cell.flag(&self.nodes),
                (false, true) => cell.add_node(id),
                _ => {
                    if cell.remove_node(id, &self.nodes) == 0 {
                        self.cells.retire(hash);
                    }
                }
            }
        }
    }

    /// Note a Y change of a node whose footprint stayed put.
    fn flag_cells(&mut self, footprint: CellRect) {
        for (x, z) in footprint.cells() {
            if let Some(cell) = self.cells.get_mut(cell_hash(x, z)) {
                cell.flag(&self.nodes);
            }
        }
    }

    #[cfg(test)]
    pub(crate) fn assert_invariants(&self) {
        let mut seen = 0;
        for (slot, node) in self.nodes().iter().enumerate() {
            assert_eq!(node.id as usize, slot, "node id out of sync");
            let external = node.external.expect("live nodes carry an external");
            assert_eq!(self.handles.get(external), Some(slot), "handle out of sync");
            assert_eq!(node.cell_extents, self.query_rect(
                node.extents.min_x,
                node.extents.min_z,
                node.extents.max_x,
                node.extents.max_z,
            ));
            seen += node.cell_extents.area();
        }
        assert_eq!(self.handles.len(), self.num_nodes);

        let mut listed = 0;
        for cell in self.cells() {
            assert!(!cell.is_empty(), "live cells are never empty");
            let (cx, cz) = cell.coords();
            for &id in cell.node_ids() {
                assert!((id as usize) < self.num_nodes, "cell lists a dead node");
                assert!(self.nodes[id as usize].cell_extents.contains(cx, cz));
            }
            if !cell.is_dirty() {
                let ys: Vec<f32> = cell
                    .node_ids()
                    .iter()
                    .map(|&id| self.nodes[id as usize].extents.min_y)
                    .collect();
                assert!(ys.windows(2).all(|w| w[0] <= w[1]), "clean cell is unsorted");
                assert_eq!(cell.min_y(), ys[0]);
            }
            listed += cell.len();
        }
        assert_eq!(seen, listed, "footprints and cell lists disagree");
    }
}

impl<K: Copy + Eq + Hash> SpatialIndex<K> for SparseGrid<K> {
    type Extents = Aabb3D<f32>;
    type Plane = Vec4;
    type Center = Vec3;
    type Scalar = f32;

    fn add(&mut self, node: K, extents: &Aabb3D<f32>) {
        Self::add(self, node, extents);
    }

    fn update(&mut self, node: K, extents: &Aabb3D<f32>) {
        Self::update(self, node, extents);
    }

    fn remove(&mut self, node: K) {
        Self::remove(self, node);
    }

    fn finalize(&mut self) {}

    fn clear(&mut self) {
        Self::clear(self);
    }

    fn len(&self) -> usize {
        self.num_nodes
    }

    fn overlapping_nodes(&mut self, query: &Aabb3D<f32>, out: &mut Vec<K>) -> usize {
        Self::overlapping_nodes(self, query, out)
    }

    fn overlapping_nodes_in_radius(
        &mut self,
        center: Vec3,
        radius: f32,
        out: &mut Vec<K>,
    ) -> usize {
        self.sphere_overlapping_nodes(center, radius, out)
    }

    fn visible_nodes(&mut self, planes: &[Vec4], out: &mut Vec<K>) -> usize {
        Self::visible_nodes(self, planes, out)
    }

    fn overlapping_pairs(&mut self, out: &mut Vec<(K, K)>) -> usize {
        Self::overlapping_pairs(self, out)
    }
}
