// Copyright 2025 the Understory Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

use criterion::{BatchSize, Criterion, Throughput, black_box, criterion_group, criterion_main};
use glam::{Vec3, Vec4};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use understory_index::Aabb3D;
use understory_sparse_grid::SparseGrid;

fn gen_random_boxes(count: usize, world: f32, max_size: f32, seed: u64) -> Vec<Aabb3D<f32>> {
    let mut rng = StdRng::seed_from_u64(seed);
    (0..count)
        .map(|_| {
            let x = rng.random_range(0.0..world);
            let y = rng.random_range(0.0..50.0);
            let z = rng.random_range(0.0..world);
            let w = rng.random_range(1.0..max_size);
            let h = rng.random_range(1.0..max_size);
            let d = rng.random_range(1.0..max_size);
            Aabb3D::new(x, y, z, x + w, y + h, z + d)
        })
        .collect()
}

fn build(boxes: &[Aabb3D<f32>], cell_size: f32) -> SparseGrid<u32> {
    let mut grid = SparseGrid::new(cell_size);
    for (i, e) in (0_u32..).zip(boxes) {
        grid.add(i, e);
    }
    grid
}

fn bench_mutations(c: &mut Criterion) {
    let mut group = c.benchmark_group("sparse_grid_mutate");
    for &n in &[1_000_usize, 10_000] {
        let boxes = gen_random_boxes(n, 2_000.0, 12.0, 1);
        group.throughput(Throughput::Elements(n as u64));
        group.bench_function(format!("add_n{n}"), |b| {
            b.iter(|| black_box(build(&boxes, 16.0)));
        });
        group.bench_function(format!("update_drift_n{n}"), |b| {
            b.iter_batched(
                || build(&boxes, 16.0),
                |mut grid| {
                    for (i, e) in (0_u32..).zip(&boxes) {
                        let moved = Aabb3D::new(
                            e.min_x + 3.0,
                            e.min_y,
                            e.min_z,
                            e.max_x + 3.0,
                            e.max_y,
                            e.max_z,
                        );
                        grid.update(i, &moved);
                    }
                    grid
                },
                BatchSize::LargeInput,
            );
        });
        group.bench_function(format!("remove_all_n{n}"), |b| {
            b.iter_batched(
                || build(&boxes, 16.0),
                |mut grid| {
                    for i in (0_u32..).take(n) {
                        grid.remove(i);
                    }
                    grid
                },
                BatchSize::LargeInput,
            );
        });
    }
    group.finish();
}

fn bench_queries(c: &mut Criterion) {
    let mut group = c.benchmark_group("sparse_grid_query");
    let boxes = gen_random_boxes(10_000, 2_000.0, 12.0, 2);
    let queries = gen_random_boxes(256, 2_000.0, 80.0, 3);

    for cell_size in [8.0_f32, 32.0] {
        let mut grid = build(&boxes, cell_size);

        group.bench_function(format!("overlapping_nodes_cell{cell_size}"), |b| {
            let mut out = Vec::new();
            b.iter(|| {
                out.clear();
                for q in &queries {
                    grid.overlapping_nodes(q, &mut out);
                }
                black_box(out.len())
            });
        });

        group.bench_function(format!("sphere_overlapping_nodes_cell{cell_size}"), |b| {
            let mut out = Vec::new();
            b.iter(|| {
                out.clear();
                for q in &queries {
                    let center = Vec3::new(q.min_x, q.min_y, q.min_z);
                    grid.sphere_overlapping_nodes(center, 40.0, &mut out);
                }
                black_box(out.len())
            });
        });

        group.bench_function(format!("overlapping_pairs_cell{cell_size}"), |b| {
            let mut out = Vec::new();
            b.iter(|| {
                out.clear();
                black_box(grid.overlapping_pairs(&mut out))
            });
        });

        // An axis-aligned view volume over a quarter of the world.
        let planes = [
            Vec4::new(1.0, 0.0, 0.0, 500.0),
            Vec4::new(-1.0, 0.0, 0.0, -1_500.0),
            Vec4::new(0.0, 0.0, 1.0, 500.0),
            Vec4::new(0.0, 0.0, -1.0, -1_500.0),
            Vec4::new(0.0, -1.0, 0.0, -40.0),
        ];
        for ratio in [0, 2] {
            grid = grid.with_brute_force_ratio(ratio);
            group.bench_function(format!("visible_nodes_cell{cell_size}_ratio{ratio}"), |b| {
                let mut out = Vec::new();
                b.iter(|| {
                    out.clear();
                    black_box(grid.visible_nodes(&planes, &mut out))
                });
            });
        }
    }
    group.finish();
}

criterion_group!(benches, bench_mutations, bench_queries);
criterion_main!(benches);
