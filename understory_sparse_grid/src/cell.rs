// Copyright 2025 the Understory Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Grid cells and the pool that owns them.

use log::debug;
use rustc_hash::FxHashMap;
use understory_index::Aabb3D;

use crate::grid::GridNode;
use crate::hash::cell_hash;

/// Retired cells kept around for reuse once the pool is trimmed.
const POOL_SLACK: usize = 16;
/// The pool is trimmed when it holds more retired cells than this.
const POOL_TRIM_THRESHOLD: usize = 32;

/// One occupied cell of the grid.
///
/// A cell lists the nodes whose XZ footprint covers it, together with the Y
/// range spanned by those nodes. The list is kept sorted by node min-Y so that
/// queries can stop scanning a cell as soon as they pass the query's top.
/// Mutations that would break either property only mark the cell dirty; it is
/// repaired by the next query that visits it.
#[derive(Clone, Debug)]
pub struct GridCell {
    x: f32,
    z: f32,
    coords: (i16, i16),
    min_y: f32,
    max_y: f32,
    dirty: bool,
    nodes: Vec<u32>,
}

impl GridCell {
    fn new(coords: (i16, i16), cell_size: f32, id: u32, extents: &Aabb3D<f32>) -> Self {
        let mut cell = Self {
            x: 0.0,
            z: 0.0,
            coords,
            min_y: 0.0,
            max_y: 0.0,
            dirty: false,
            nodes: Vec::new(),
        };
        cell.reset(coords, cell_size, id, extents);
        cell
    }

    /// Reinitialise a retired cell with a single node.
    fn reset(&mut self, coords: (i16, i16), cell_size: f32, id: u32, extents: &Aabb3D<f32>) {
        debug_assert!(self.nodes.is_empty(), "reusing a cell that still holds nodes");
        self.x = f32::from(coords.0) * cell_size;
        self.z = f32::from(coords.1) * cell_size;
        self.coords = coords;
        self.min_y = extents.min_y;
        self.max_y = extents.max_y;
        self.dirty = false;
        self.nodes.clear();
        self.nodes.push(id);
    }

    /// World-space X of the cell's minimum corner.
    pub fn x(&self) -> f32 {
        self.x
    }

    /// World-space Z of the cell's minimum corner.
    pub fn z(&self) -> f32 {
        self.z
    }

    /// Integer cell coordinates `(x, z)`.
    pub fn coords(&self) -> (i16, i16) {
        self.coords
    }

    /// Lowest min-Y among the cell's nodes, as of the last repair.
    pub fn min_y(&self) -> f32 {
        self.min_y
    }

    /// Highest max-Y among the cell's nodes, as of the last repair.
    pub fn max_y(&self) -> f32 {
        self.max_y
    }

    /// Whether the Y range or node order is stale.
    pub fn is_dirty(&self) -> bool {
        self.dirty
    }

    /// Slots of the nodes in this cell.
    pub fn node_ids(&self) -> &[u32] {
        &self.nodes
    }

    /// Number of nodes in this cell.
    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    /// Whether the cell holds no nodes. Live cells never do.
    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    pub(crate) fn add_node(&mut self, id: u32) {
        debug_assert!(!self.nodes.contains(&id), "node {id} is already in this cell");
        self.nodes.push(id);
        self.dirty = true;
    }

    /// Drop `id` from the cell and return how many nodes remain.
    pub(crate) fn remove_node<K>(&mut self, id: u32, nodes: &[GridNode<K>]) -> usize {
        let position = self.nodes.iter().position(|&n| n == id);
        debug_assert!(position.is_some(), "node {id} is not in this cell");
        if let Some(position) = position {
            self.nodes.swap_remove(position);
        }
        if let [only] = self.nodes[..] {
            let extents = &nodes[only as usize].extents;
            self.min_y = extents.min_y;
            self.max_y = extents.max_y;
            self.dirty = false;
        } else {
            self.dirty = true;
        }
        self.nodes.len()
    }

    /// Rename a node whose slot moved from `from` to `to`.
    pub(crate) fn replace_node(&mut self, from: u32, to: u32) {
        let slot = self.nodes.iter_mut().find(|n| **n == from);
        debug_assert!(slot.is_some(), "node {from} is not in this cell");
        if let Some(slot) = slot {
            *slot = to;
        }
    }

    /// Note that the Y range of one of this cell's nodes changed.
    pub(crate) fn flag<K>(&mut self, nodes: &[GridNode<K>]) {
        if let [only] = self.nodes[..] {
            let extents = &nodes[only as usize].extents;
            self.min_y = extents.min_y;
            self.max_y = extents.max_y;
        } else {
            self.dirty = true;
        }
    }

    /// Re-sort by min-Y and recompute the Y range.
    pub(crate) fn update<K>(&mut self, nodes: &[GridNode<K>]) {
        self.nodes.sort_by(|&a, &b| {
            let (a, b) = (&nodes[a as usize].extents, &nodes[b as usize].extents);
            a.min_y.total_cmp(&b.min_y)
        });
        if let Some(&first) = self.nodes.first() {
            self.min_y = nodes[first as usize].extents.min_y;
            self.max_y = self
                .nodes
                .iter()
                .map(|&n| nodes[n as usize].extents.max_y)
                .fold(f32::MIN, f32::max);
        }
        self.dirty = false;
    }

    /// Repair the cell if a mutation left it stale.
    #[inline]
    pub(crate) fn refresh<K>(&mut self, nodes: &[GridNode<K>]) {
        if self.dirty {
            self.update(nodes);
        }
    }
}

/// Pool of cells with a hash lookup.
///
/// Live cells occupy `cells[..live]`; the rest are retired and keep their
/// node buffers for reuse.
#[derive(Clone, Debug, Default)]
pub(crate) struct CellPool {
    pub(crate) cells: Vec<GridCell>,
    pub(crate) live: usize,
    map: FxHashMap<u32, u32>,
}

impl CellPool {
    #[inline]
    pub(crate) fn get_mut(&mut self, hash: u32) -> Option<&mut GridCell> {
        let position = *self.map.get(&hash)?;
        Some(&mut self.cells[position as usize])
    }

    pub(crate) fn live_mut(&mut self) -> &mut [GridCell] {
        &mut self.cells[..self.live]
    }

    /// Bring cell `coords` to life holding only `id`.
    pub(crate) fn create(
        &mut self,
        coords: (i16, i16),
        cell_size: f32,
        id: u32,
        extents: &Aabb3D<f32>,
    ) {
        let position = self.live;
        if let Some(cell) = self.cells.get_mut(position) {
            cell.reset(coords, cell_size, id, extents);
        } else {
            self.cells.push(GridCell::new(coords, cell_size, id, extents));
        }
        let previous = self.map.insert(cell_hash(coords.0, coords.1), to_u32(position));
        debug_assert!(previous.is_none(), "cell {coords:?} already exists");
        self.live += 1;
    }

    /// Retire the (empty) cell with key `hash`.
    pub(crate) fn retire(&mut self, hash: u32) {
        let position = self.map.remove(&hash);
        debug_assert!(position.is_some(), "retiring unknown cell {hash:#x}");
        let Some(position) = position else {
            return;
        };
        let position = position as usize;
        debug_assert!(self.cells[position].is_empty(), "retiring a cell that still holds nodes");
        self.live -= 1;
        let last = self.live;
        if position != last {
            self.cells.swap(position, last);
            let (x, z) = self.cells[position].coords;
            self.map.insert(cell_hash(x, z), to_u32(position));
        }
        if self.cells.len() > last + POOL_TRIM_THRESHOLD {
            debug!(
                "trimming cell pool from {} to {} entries",
                self.cells.len(),
                last + POOL_SLACK
            );
            self.cells.truncate(last + POOL_SLACK);
        }
    }

    pub(crate) fn clear(&mut self) {
        self.cells.clear();
        self.live = 0;
        self.map.clear();
    }
}

#[inline]
pub(crate) fn to_u32(index: usize) -> u32 {
    debug_assert!(u32::try_from(index).is_ok(), "index exceeds 32-bit range");
    #[allow(
        clippy::cast_possible_truncation,
        reason = "Grid slots are 32-bit; larger indices are rejected in debug builds."
    )]
    let i = index as u32;
    i
}
