// Copyright 2025 the Understory Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

use criterion::{BatchSize, Criterion, Throughput, black_box, criterion_group, criterion_main};
use kurbo::{Point, Vec2};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use understory_box_tree::{BoxTree, Plane2D, Ray, RayCandidate};
use understory_index::Aabb2D;

fn gen_random_rects(count: usize, world: f64, max_size: f64, seed: u64) -> Vec<Aabb2D<f64>> {
    let mut rng = StdRng::seed_from_u64(seed);
    (0..count)
        .map(|_| {
            let x = rng.random_range(0.0..world);
            let y = rng.random_range(0.0..world);
            let w = rng.random_range(1.0..max_size);
            let h = rng.random_range(1.0..max_size);
            Aabb2D::new(x, y, x + w, y + h)
        })
        .collect()
}

fn build(rects: &[Aabb2D<f64>], high_quality: bool) -> BoxTree<u32> {
    let mut tree = BoxTree::new(high_quality);
    for (i, r) in (0_u32..).zip(rects) {
        tree.add(i, r);
    }
    tree.finalize();
    tree
}

fn bench_build(c: &mut Criterion) {
    let mut group = c.benchmark_group("box_tree_build");
    for &n in &[1_000_usize, 10_000] {
        let rects = gen_random_rects(n, 4_000.0, 30.0, 1);
        group.throughput(Throughput::Elements(n as u64));
        for high_quality in [false, true] {
            let label = if high_quality { "high_quality" } else { "plain" };
            group.bench_function(format!("add_finalize_{label}_n{n}"), |b| {
                b.iter(|| black_box(build(&rects, high_quality)));
            });
        }
    }
    group.finish();
}

fn bench_update(c: &mut Criterion) {
    let mut group = c.benchmark_group("box_tree_update");
    let n = 10_000;
    let rects = gen_random_rects(n, 4_000.0, 30.0, 2);
    group.throughput(Throughput::Elements(n as u64));
    // Small drifts mostly stay within their parents; large jumps force rebounds.
    for (label, drift) in [("drift", 0.5), ("jump", 200.0)] {
        group.bench_function(format!("update_finalize_{label}"), |b| {
            b.iter_batched(
                || build(&rects, false),
                |mut tree| {
                    for (i, r) in (0_u32..).zip(&rects) {
                        let dx = if i % 2 == 0 { drift } else { -drift };
                        tree.update(i, &Aabb2D::new(r.min_x + dx, r.min_y, r.max_x + dx, r.max_y));
                    }
                    tree.finalize();
                    tree
                },
                BatchSize::LargeInput,
            );
        });
    }
    group.finish();
}

fn bench_queries(c: &mut Criterion) {
    let mut group = c.benchmark_group("box_tree_query");
    let rects = gen_random_rects(10_000, 4_000.0, 30.0, 3);
    let tree = build(&rects, true);
    let queries = gen_random_rects(256, 4_000.0, 200.0, 4);

    group.bench_function("overlapping_nodes", |b| {
        let mut out = Vec::new();
        b.iter(|| {
            out.clear();
            for q in &queries {
                tree.overlapping_nodes(q, &mut out);
            }
            black_box(out.len())
        });
    });

    group.bench_function("circle_overlapping_nodes", |b| {
        let mut out = Vec::new();
        b.iter(|| {
            out.clear();
            for q in &queries {
                tree.circle_overlapping_nodes(Point::new(q.min_x, q.min_y), 50.0, &mut out);
            }
            black_box(out.len())
        });
    });

    group.bench_function("visible_nodes", |b| {
        let planes = [
            Plane2D::through(Point::new(1_000.0, 0.0), Vec2::new(1.0, 0.0)),
            Plane2D::through(Point::new(1_800.0, 0.0), Vec2::new(-1.0, 0.0)),
            Plane2D::through(Point::new(0.0, 500.0), Vec2::new(0.0, 1.0)),
            Plane2D::through(Point::new(0.0, 1_100.0), Vec2::new(0.0, -1.0)),
        ];
        let mut out = Vec::new();
        b.iter(|| {
            out.clear();
            black_box(tree.visible_nodes(&planes, &mut out))
        });
    });

    group.bench_function("overlapping_pairs", |b| {
        let mut out = Vec::new();
        b.iter(|| {
            out.clear();
            black_box(tree.overlapping_pairs(&mut out))
        });
    });

    group.bench_function("ray_test", |b| {
        let rays: Vec<Ray> = queries
            .iter()
            .map(|q| Ray::new(Point::new(q.min_x, q.min_y), Vec2::new(1.0, 0.37), 5_000.0))
            .collect();
        let exact = |c: &RayCandidate<'_, u32>| (c.distance < c.upper_bound).then_some(c.distance);
        b.iter(|| {
            let mut hits = 0;
            for ray in &rays {
                if BoxTree::ray_test(&[&tree], ray, exact).is_some() {
                    hits += 1;
                }
            }
            black_box(hits)
        });
    });

    group.finish();
}

criterion_group!(benches, bench_build, bench_update, bench_queries);
criterion_main!(benches);
