// Copyright 2025 the Understory Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Drive the 2D box tree and the 3D sparse grid through the shared
//! `SpatialIndex` contract.
//!
//! Run:
//! - `cargo run -p understory_demos --example shared_index`

use glam::Vec3;
use kurbo::Point;
use understory_box_tree::BoxTree;
use understory_index::{Aabb2D, Aabb3D, SpatialIndex};
use understory_sparse_grid::SparseGrid;

/// Insert a row of boxes, finalize, and report what touches what.
fn populate<I: SpatialIndex<u32>>(name: &str, index: &mut I, boxes: &[I::Extents]) {
    for (id, b) in (0_u32..).zip(boxes) {
        index.add(id, b);
    }
    index.finalize();

    let mut pairs = Vec::new();
    index.overlapping_pairs(&mut pairs);
    pairs.sort_unstable();
    println!("{name}: {} nodes, overlapping pairs {pairs:?}", index.len());
}

fn main() {
    env_logger::init();

    // Three overlapping neighbours and one loner, in 2D and in 3D.
    let flat: Vec<Aabb2D<f64>> = [0.0, 1.5, 3.0, 10.0]
        .iter()
        .map(|&x| Aabb2D::new(x, 0.0, x + 2.0, 2.0))
        .collect();
    let solid: Vec<Aabb3D<f32>> = [0.0, 1.5, 3.0, 10.0]
        .iter()
        .map(|&x| Aabb3D::new(x, 0.0, 0.0, x + 2.0, 2.0, 2.0))
        .collect();

    let mut tree = BoxTree::new(false);
    populate("box tree", &mut tree, &flat);
    let mut grid = SparseGrid::new(4.0);
    populate("sparse grid", &mut grid, &solid);

    let mut near = Vec::new();
    SpatialIndex::overlapping_nodes_in_radius(&mut tree, Point::new(11.0, 1.0), 0.5, &mut near);
    let from_tree = near.len();
    SpatialIndex::overlapping_nodes_in_radius(&mut grid, Vec3::new(11.0, 1.0, 1.0), 0.5, &mut near);
    println!("near the loner: {near:?} ({from_tree} from the tree)");
}
