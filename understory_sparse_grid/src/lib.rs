// Copyright 2025 the Understory Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

// After you edit the crate's doc comment, run this command, then check README.md for any missing links
// cargo rdme --workspace-project=understory_sparse_grid --heading-base-level=0

//! Understory Sparse Grid: a sparse spatial hash over 3D boxes, bucketed by their XZ footprint.
//!
//! The grid suits scenes spread over a ground plane (terrain props, units, pickups) where
//! boxes are small relative to the world and move every frame.
//!
//! - The XZ plane is divided into square cells; only occupied cells exist, keyed by a
//!   32-bit [`cell_hash`] of their integer coordinates.
//! - Each cell keeps its nodes sorted by min-Y and tracks their Y range, so every query
//!   prunes vertically as well.
//! - Mutations are applied eagerly and only touch the cells whose membership changes.
//!   Cells invalidated by a mutation are repaired by the next query that visits them.
//! - Queries: [`SparseGrid::visible_nodes`] (plane culling with a brute-force fallback for
//!   sparse grids), [`SparseGrid::overlapping_nodes`],
//!   [`SparseGrid::sphere_overlapping_nodes`], and [`SparseGrid::overlapping_pairs`]. Boxes
//!   spanning several cells are reported once.
//!
//! ## Integration with Understory Index
//!
//! Boxes are [`understory_index::Aabb3D<f32>`], planes and points are [`glam`] vectors.
//! [`SparseGrid`] implements [`understory_index::SpatialIndex`].
//!
//! ## Example
//!
//! ```rust
//! use glam::{Vec3, Vec4};
//! use understory_index::Aabb3D;
//! use understory_sparse_grid::SparseGrid;
//!
//! let mut grid = SparseGrid::new(10.0);
//! grid.add("crate", &Aabb3D::new(12.0, 0.0, 12.0, 18.0, 5.0, 18.0));
//! grid.add("tower", &Aabb3D::new(5.0, 0.0, 5.0, 35.0, 40.0, 35.0));
//!
//! let mut hits = Vec::new();
//! grid.overlapping_nodes(&Aabb3D::new(0.0, 30.0, 0.0, 50.0, 50.0, 50.0), &mut hits);
//! assert_eq!(hits, ["tower"]);
//!
//! let mut pairs = Vec::new();
//! assert_eq!(grid.overlapping_pairs(&mut pairs), 1);
//!
//! // Keep z <= 10 (normal in xyz, offset in w).
//! let planes = [Vec4::new(0.0, 0.0, -1.0, -10.0)];
//! let mut visible = Vec::new();
//! grid.visible_nodes(&planes, &mut visible);
//! assert_eq!(visible, ["tower"]);
//!
//! let mut near = Vec::new();
//! grid.sphere_overlapping_nodes(Vec3::new(20.0, 2.0, 20.0), 1.0, &mut near);
//! assert_eq!(near.len(), 1);
//! ```
//!
//! ### Coordinates
//!
//! Cell coordinates must stay within `[-32767, 32767]` on both axes, so stored boxes must
//! lie within `32767 * cell_size` of the origin; this is checked in debug builds. Query
//! boxes are clamped to that range instead.

mod cell;
mod grid;
mod hash;
mod query;

pub use cell::GridCell;
pub use grid::{DEFAULT_BRUTE_FORCE_RATIO, GridNode, SparseGrid};
pub use hash::{CellRect, MAX_CELL_COORD, cell_hash};

#[cfg(test)]
mod tests {
    use super::*;
    use glam::{Vec3, Vec4};
    use understory_index::{Aabb3D, SpatialIndex};

    fn exercise<I>(index: &mut I)
    where
        I: SpatialIndex<u32, Extents = Aabb3D<f32>, Plane = Vec4, Center = Vec3, Scalar = f32>,
    {
        index.add(0, &Aabb3D::new(0.0, 0.0, 0.0, 1.0, 1.0, 1.0));
        index.add(1, &Aabb3D::new(5.0, 0.0, 5.0, 6.0, 1.0, 6.0));
        index.add(2, &Aabb3D::new(0.5, 0.5, 0.5, 1.5, 1.5, 1.5));
        index.finalize();
        assert_eq!(index.len(), 3);

        let mut out = vec![u32::MAX; 4];
        let n = index.overlapping_nodes_at(&Aabb3D::new(0.0, 0.0, 0.0, 2.0, 2.0, 2.0), &mut out, 1);
        assert_eq!(n, 2);
        assert_eq!(out.len(), 3);

        let mut near = Vec::new();
        index.overlapping_nodes_in_radius(Vec3::new(5.5, 0.5, 5.5), 0.1, &mut near);
        assert_eq!(near, [1]);

        let mut pairs = Vec::new();
        assert_eq!(index.overlapping_pairs_at(&mut pairs, 0), 1);

        let mut visible = Vec::new();
        index.visible_nodes_at(&[Vec4::new(-1.0, 0.0, 0.0, -2.0)], &mut visible, 0);
        visible.sort_unstable();
        assert_eq!(visible, [0, 2]);

        index.update(1, &Aabb3D::new(0.0, 0.0, 0.0, 0.2, 0.2, 0.2));
        pairs.clear();
        assert_eq!(index.overlapping_pairs(&mut pairs), 2);

        index.clear();
        assert!(index.is_empty());
    }

    #[test]
    fn spatial_index_contract() {
        exercise(&mut SparseGrid::new(1.0));
        exercise(&mut SparseGrid::new(64.0).with_brute_force_ratio(0));
    }
}
