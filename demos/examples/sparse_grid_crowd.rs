// Copyright 2025 the Understory Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! A crowd of units wandering over a ground plane, tracked by a sparse grid.
//!
//! Every tick moves the units, then collects touching pairs and the units
//! inside a view volume.
//!
//! Run:
//! - `RUST_LOG=debug cargo run -p understory_demos --example sparse_grid_crowd`

use glam::{Vec3, Vec4};
use log::{debug, info};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use understory_index::Aabb3D;
use understory_sparse_grid::SparseGrid;

const UNITS: u32 = 2_000;
const WORLD: f32 = 500.0;
const HALF_SIZE: Vec3 = Vec3::new(0.8, 1.0, 0.8);

fn unit_box(center: Vec3) -> Aabb3D<f32> {
    let lo = center - HALF_SIZE;
    let hi = center + HALF_SIZE;
    Aabb3D::new(lo.x, lo.y, lo.z, hi.x, hi.y, hi.z)
}

fn main() {
    env_logger::init();

    let mut rng = StdRng::seed_from_u64(7);
    let mut grid = SparseGrid::new(8.0);
    let mut positions: Vec<Vec3> = (0..UNITS)
        .map(|_| Vec3::new(rng.random_range(0.0..WORLD), 1.0, rng.random_range(0.0..WORLD)))
        .collect();
    for (id, p) in (0_u32..).zip(&positions) {
        grid.add(id, &unit_box(*p));
    }
    let world = grid.extents();
    info!("{} units over {} cells, world {world:?}", grid.len(), grid.num_cells());

    // View volume: 100 <= x <= 250 and 100 <= z <= 250, below y = 10.
    let planes = [
        Vec4::new(1.0, 0.0, 0.0, 100.0),
        Vec4::new(-1.0, 0.0, 0.0, -250.0),
        Vec4::new(0.0, 0.0, 1.0, 100.0),
        Vec4::new(0.0, 0.0, -1.0, -250.0),
        Vec4::new(0.0, -1.0, 0.0, -10.0),
    ];

    let mut pairs = Vec::new();
    let mut visible = Vec::new();
    for tick in 0..10 {
        for (id, p) in (0_u32..).zip(positions.iter_mut()) {
            let step = Vec3::new(rng.random_range(-2.0..2.0), 0.0, rng.random_range(-2.0..2.0));
            *p = (*p + step).clamp(Vec3::ZERO, Vec3::new(WORLD, 10.0, WORLD));
            // Some units hop, which only changes their vertical extent.
            if rng.random_bool(0.05) {
                p.y = 4.0;
            } else if p.y > 1.0 {
                p.y -= 1.0;
            }
            grid.update(id, &unit_box(*p));
        }

        pairs.clear();
        visible.clear();
        let touching = grid.overlapping_pairs(&mut pairs);
        let seen = grid.visible_nodes(&planes, &mut visible);
        debug!("tick {tick}: {} cells occupied", grid.num_cells());
        println!("tick {tick}: {touching} touching pairs, {seen} units in view");
    }

    // Everyone near the center of the world.
    let mut near = Vec::new();
    let center = Vec3::new(WORLD / 2.0, 1.0, WORLD / 2.0);
    grid.sphere_overlapping_nodes(center, 25.0, &mut near);
    println!("{} units within 25 of the center", near.len());

    // Remove the units that left the view.
    let mut in_view = visible.clone();
    in_view.sort_unstable();
    for id in 0..UNITS {
        if in_view.binary_search(&id).is_err() {
            grid.remove(id);
        }
    }
    info!("kept {} units over {} cells", grid.len(), grid.num_cells());
}
