// Copyright 2025 the Understory Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Culling, overlap and pair queries.

use core::hash::Hash;

use glam::{Vec3, Vec4};
use log::debug;
use understory_index::Aabb3D;

use crate::grid::SparseGrid;
use crate::hash::{CellRect, cell_hash};

impl<K: Copy + Eq + Hash> SparseGrid<K> {
    /// Append every node whose box overlaps `query`. Touching boxes overlap.
    ///
    /// Returns the number of nodes appended.
    pub fn overlapping_nodes(&mut self, query: &Aabb3D<f32>, out: &mut Vec<K>) -> usize {
        let rect = self.query_rect(query.min_x, query.min_z, query.max_x, query.max_z);
        self.scan_cells(rect, query.min_y, query.max_y, out, |e| query.overlaps(e))
    }

    /// Append every node whose box comes within `radius` of `center`.
    pub fn sphere_overlapping_nodes(
        &mut self,
        center: Vec3,
        radius: f32,
        out: &mut Vec<K>,
    ) -> usize {
        let rect = self.query_rect(
            center.x - radius,
            center.z - radius,
            center.x + radius,
            center.z + radius,
        );
        let radius_squared = radius * radius;
        self.scan_cells(rect, center.y - radius, center.y + radius, out, |e| {
            let (lo, hi) = corners(e);
            center.clamp(lo, hi).distance_squared(center) <= radius_squared
        })
    }

    /// Visit every unvisited node listed in the cells of `rect` whose Y range
    /// may reach `[min_y, max_y]` and emit those passing `overlaps`.
    fn scan_cells(
        &mut self,
        rect: CellRect,
        min_y: f32,
        max_y: f32,
        out: &mut Vec<K>,
        overlaps: impl Fn(&Aabb3D<f32>) -> bool,
    ) -> usize {
        if self.num_nodes == 0 {
            return 0;
        }
        let before = out.len();
        let stamp = self.next_query();
        for (x, z) in rect.cells() {
            let Some(cell) = self.cells.get_mut(cell_hash(x, z)) else {
                continue;
            };
            cell.refresh(&self.nodes);
            if min_y > cell.max_y() || max_y < cell.min_y() {
                continue;
            }
            for &id in cell.node_ids() {
                let node = &mut self.nodes[id as usize];
                if node.query_index == stamp {
                    continue;
                }
                node.query_index = stamp;
                // Sorted by min-Y: nothing further in this cell reaches down to the query.
                if max_y < node.extents.min_y {
                    break;
                }
                if overlaps(&node.extents) {
                    out.extend(node.external);
                }
            }
        }
        out.len() - before
    }

    /// Append every unordered pair of nodes whose boxes overlap, each pair once.
    ///
    /// Returns the number of pairs appended.
    pub fn overlapping_pairs(&mut self, out: &mut Vec<(K, K)>) -> usize {
        if self.num_nodes == 0 {
            return 0;
        }
        let before = out.len();
        self.pair_ids.clear();
        let nodes = &self.nodes;
        for cell in self.cells.live_mut() {
            cell.refresh(nodes);
            let ids = cell.node_ids();
            for (i, &a) in ids.iter().enumerate() {
                let first = &nodes[a as usize];
                for &b in &ids[i + 1..] {
                    let second = &nodes[b as usize];
                    // Sorted by min-Y, and `first` starts no higher than `second`.
                    if first.extents.max_y < second.extents.min_y {
                        break;
                    }
                    let (e, f) = (&first.extents, &second.extents);
                    let xz = e.min_x <= f.max_x
                        && f.min_x <= e.max_x
                        && e.min_z <= f.max_z
                        && f.min_z <= e.max_z;
                    if !xz || !self.pair_ids.insert(pair_key(a, b)) {
                        continue;
                    }
                    if let (Some(p), Some(q)) = (first.external, second.external) {
                        out.push((p, q));
                    }
                }
            }
        }
        out.len() - before
    }

    /// Append every node whose box is at least partially inside all `planes`.
    ///
    /// A plane `p` keeps the points `v` with `p.xyz().dot(v) >= p.w`. Cells are
    /// culled first and planes that already contain a whole cell are skipped for
    /// its nodes. When cells are sparsely populated, nodes are tested directly.
    pub fn visible_nodes(&mut self, planes: &[Vec4], out: &mut Vec<K>) -> usize {
        if self.num_nodes == 0 {
            return 0;
        }
        if self.cells.live * self.brute_force_ratio > self.num_nodes {
            debug!(
                "sparse grid culls {} nodes directly instead of {} cells",
                self.num_nodes, self.cells.live
            );
            return self.visible_nodes_brute_force(planes, out);
        }

        let before = out.len();
        let stamp = self.next_query();
        let size = self.cell_size();
        let mut cell_planes = core::mem::take(&mut self.cell_planes);
        let nodes = &mut self.nodes;
        for cell in self.cells.live_mut() {
            cell.refresh(nodes);
            let lo = Vec3::new(cell.x(), cell.min_y(), cell.z());
            let hi = Vec3::new(cell.x() + size, cell.max_y(), cell.z() + size);
            if !planes.iter().all(|p| touches(*p, lo, hi)) {
                continue;
            }
            cell_planes.clear();
            cell_planes.extend(planes.iter().filter(|p| !encloses(**p, lo, hi)));

            for &id in cell.node_ids() {
                let node = &mut nodes[id as usize];
                if node.query_index == stamp {
                    continue;
                }
                node.query_index = stamp;
                let (lo, hi) = corners(&node.extents);
                if cell_planes.iter().all(|p| touches(*p, lo, hi)) {
                    out.extend(node.external);
                }
            }
        }
        self.cell_planes = cell_planes;
        out.len() - before
    }

    fn visible_nodes_brute_force(&self, planes: &[Vec4], out: &mut Vec<K>) -> usize {
        let before = out.len();
        out.extend(
            self.nodes()
                .iter()
                .filter(|n| {
                    let (lo, hi) = corners(&n.extents);
                    planes.iter().all(|p| touches(*p, lo, hi))
                })
                .filter_map(|n| n.external),
        );
        out.len() - before
    }
}

/// Key of an unordered pair of node slots.
#[inline]
fn pair_key(a: u32, b: u32) -> u64 {
    (u64::from(a.max(b)) << 32) | u64::from(a.min(b))
}

#[inline]
fn corners(e: &Aabb3D<f32>) -> (Vec3, Vec3) {
    (
        Vec3::new(e.min_x, e.min_y, e.min_z),
        Vec3::new(e.max_x, e.max_y, e.max_z),
    )
}

/// Whether some corner of `[lo, hi]` is on the kept side of `plane`.
#[inline]
fn touches(plane: Vec4, lo: Vec3, hi: Vec3) -> bool {
    let normal = plane.truncate();
    // Most-positive corner along the normal.
    let corner = Vec3::select(normal.cmplt(Vec3::ZERO), lo, hi);
    normal.dot(corner) >= plane.w
}

/// Whether every corner of `[lo, hi]` is on the kept side of `plane`.
#[inline]
fn encloses(plane: Vec4, lo: Vec3, hi: Vec3) -> bool {
    let normal = plane.truncate();
    let corner = Vec3::select(normal.cmpgt(Vec3::ZERO), lo, hi);
    normal.dot(corner) >= plane.w
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::rngs::StdRng;
    use rand::{Rng, SeedableRng};
    use std::collections::{BTreeMap, BTreeSet};

    fn b(min_x: f32, min_y: f32, min_z: f32, max_x: f32, max_y: f32, max_z: f32) -> Aabb3D<f32> {
        Aabb3D::new(min_x, min_y, min_z, max_x, max_y, max_z)
    }

    fn sorted(mut v: Vec<u32>) -> Vec<u32> {
        v.sort_unstable();
        v
    }

    fn random_box(rng: &mut StdRng) -> Aabb3D<f32> {
        let x = rng.random_range(-100.0..100.0);
        let y = rng.random_range(-20.0..20.0);
        let z = rng.random_range(-100.0..100.0);
        let w = rng.random_range(0.0..30.0);
        let h = rng.random_range(0.0..10.0);
        let d = rng.random_range(0.0..30.0);
        b(x, y, z, x + w, y + h, z + d)
    }

    fn visible(planes: &[Vec4], e: &Aabb3D<f32>) -> bool {
        let (lo, hi) = corners(e);
        planes.iter().all(|p| {
            (0..8).any(|i| {
                let c = Vec3::new(
                    if i & 1 == 0 { lo.x } else { hi.x },
                    if i & 2 == 0 { lo.y } else { hi.y },
                    if i & 4 == 0 { lo.z } else { hi.z },
                );
                p.truncate().dot(c) >= p.w
            })
        })
    }

    fn sphere_touches(center: Vec3, radius: f32, e: &Aabb3D<f32>) -> bool {
        let (lo, hi) = corners(e);
        center.clamp(lo, hi).distance_squared(center) <= radius * radius
    }

    #[test]
    fn spanning_node_is_reported_once() {
        let mut grid = SparseGrid::new(1.0);
        grid.add(0_u32, &b(0.0, 0.0, 0.0, 9.5, 1.0, 9.5));
        grid.add(1_u32, &b(4.0, 0.0, 4.0, 5.0, 1.0, 5.0));
        assert_eq!(grid.num_cells(), 100);

        let everything = b(-1.0, -1.0, -1.0, 11.0, 2.0, 11.0);
        let mut out = Vec::new();
        assert_eq!(grid.overlapping_nodes(&everything, &mut out), 2);
        assert_eq!(sorted(out), [0, 1]);

        let mut out = Vec::new();
        assert_eq!(grid.sphere_overlapping_nodes(Vec3::new(5.0, 0.5, 5.0), 20.0, &mut out), 2);

        let mut pairs = Vec::new();
        assert_eq!(grid.overlapping_pairs(&mut pairs), 1, "shared by four cells, reported once");

        let mut out = Vec::new();
        assert_eq!(grid.visible_nodes(&[], &mut out), 2);
    }

    #[test]
    fn queries_on_empty_grid() {
        let mut grid: SparseGrid<u32> = SparseGrid::new(4.0);
        let mut out = vec![9];
        assert_eq!(grid.overlapping_nodes(&b(-1e6, -1e6, -1e6, 1e6, 1e6, 1e6), &mut out), 0);
        assert_eq!(grid.sphere_overlapping_nodes(Vec3::ZERO, 1e6, &mut out), 0);
        assert_eq!(grid.visible_nodes(&[], &mut out), 0);
        let mut pairs = Vec::new();
        assert_eq!(grid.overlapping_pairs(&mut pairs), 0);
        assert_eq!(out, [9], "queries only append");
    }

    #[test]
    fn vertical_separation_prunes_pairs() {
        let mut grid = SparseGrid::new(10.0);
        grid.add(0_u32, &b(0.0, 0.0, 0.0, 5.0, 1.0, 5.0));
        grid.add(1_u32, &b(1.0, 2.0, 1.0, 4.0, 3.0, 4.0));
        grid.add(2_u32, &b(2.0, 0.5, 2.0, 3.0, 2.5, 3.0));
        let mut pairs = Vec::new();
        grid.overlapping_pairs(&mut pairs);
        let got: BTreeSet<_> = pairs.iter().map(|&(a, c)| (a.min(c), a.max(c))).collect();
        assert_eq!(got, BTreeSet::from([(0, 2), (1, 2)]));
    }

    #[test]
    fn frustum_style_culling() {
        for ratio in [0, 2, 1000] {
            let mut grid = SparseGrid::new(8.0).with_brute_force_ratio(ratio);
            for i in 0..32_u32 {
                let x = (i % 8) as f32 * 10.0;
                let z = (i / 8) as f32 * 10.0;
                grid.add(i, &b(x, 0.0, z, x + 5.0, 2.0, z + 5.0));
            }
            // Keep 12 <= x <= 38 and z <= 14.
            let planes = [
                Vec4::new(1.0, 0.0, 0.0, 12.0),
                Vec4::new(-1.0, 0.0, 0.0, -38.0),
                Vec4::new(0.0, 0.0, -1.0, -14.0),
            ];
            let mut out = Vec::new();
            grid.visible_nodes(&planes, &mut out);
            assert_eq!(sorted(out), [1, 2, 3, 9, 10, 11], "ratio {ratio}");
        }
    }

    #[test]
    fn randomized_queries_match_brute_force() {
        let mut rng = StdRng::seed_from_u64(5);
        for cell_size in [3.0, 16.0, 64.0] {
            let mut grid = SparseGrid::new(cell_size);
            let mut live: BTreeMap<u32, Aabb3D<f32>> = BTreeMap::new();
            let mut next_id = 0_u32;

            for _round in 0..40 {
                for _ in 0..rng.random_range(1..30) {
                    match rng.random_range(0..10) {
                        0..=3 => {
                            let e = random_box(&mut rng);
                            grid.add(next_id, &e);
                            live.insert(next_id, e);
                            next_id += 1;
                        }
                        4..=7 if !live.is_empty() => {
                            let k = rng.random_range(0..live.len());
                            let id = *live.keys().nth(k).expect("index in range");
                            let old = live[&id];
                            let e = match rng.random_range(0..3) {
                                0 => random_box(&mut rng),
                                1 => {
                                    let dy = rng.random_range(-3.0..3.0);
                                    b(
                                        old.min_x,
                                        old.min_y + dy,
                                        old.min_z,
                                        old.max_x,
                                        old.max_y + dy,
                                        old.max_z,
                                    )
                                }
                                _ => {
                                    let dx = rng.random_range(-4.0..4.0);
                                    b(
                                        old.min_x + dx,
                                        old.min_y,
                                        old.min_z,
                                        old.max_x + dx,
                                        old.max_y,
                                        old.max_z,
                                    )
                                }
                            };
                            grid.update(id, &e);
                            live.insert(id, e);
                        }
                        _ if !live.is_empty() => {
                            let k = rng.random_range(0..live.len());
                            let id = *live.keys().nth(k).expect("index in range");
                            grid.remove(id);
                            live.remove(&id);
                        }
                        _ => {}
                    }
                }
                grid.assert_invariants();
                assert_eq!(grid.len(), live.len());

                let q = random_box(&mut rng);
                let q = b(q.min_x, q.min_y, q.min_z, q.max_x + 40.0, q.max_y + 5.0, q.max_z + 40.0);
                let mut got = Vec::new();
                let n = grid.overlapping_nodes(&q, &mut got);
                assert_eq!(n, got.len());
                let want: Vec<u32> = live
                    .iter()
                    .filter(|(_, e)| q.overlaps(e))
                    .map(|(k, _)| *k)
                    .collect();
                assert_eq!(sorted(got), want);

                let center = Vec3::new(
                    rng.random_range(-100.0..100.0),
                    rng.random_range(-20.0..20.0),
                    rng.random_range(-100.0..100.0),
                );
                let radius = rng.random_range(0.0..50.0);
                let mut got = Vec::new();
                grid.sphere_overlapping_nodes(center, radius, &mut got);
                let want: Vec<u32> = live
                    .iter()
                    .filter(|(_, e)| sphere_touches(center, radius, e))
                    .map(|(k, _)| *k)
                    .collect();
                assert_eq!(sorted(got), want);

                let planes = [
                    Vec4::new(1.0, 0.0, 0.5, center.x),
                    Vec4::new(0.0, -1.0, 0.0, -center.y - 10.0),
                    Vec4::new(-0.5, 0.0, -1.0, -center.z - 60.0),
                ];
                let want: Vec<u32> = live
                    .iter()
                    .filter(|(_, e)| visible(&planes, e))
                    .map(|(k, _)| *k)
                    .collect();
                for ratio in [0, 2] {
                    grid = grid.with_brute_force_ratio(ratio);
                    let mut got = Vec::new();
                    grid.visible_nodes(&planes, &mut got);
                    assert_eq!(sorted(got), want, "ratio {ratio}");
                }

                let mut pairs = Vec::new();
                let n = grid.overlapping_pairs(&mut pairs);
                assert_eq!(n, pairs.len());
                let got: BTreeSet<(u32, u32)> = pairs
                    .iter()
                    .map(|&(a, c)| (a.min(c), a.max(c)))
                    .collect();
                assert_eq!(got.len(), pairs.len(), "pair reported twice");
                let items: Vec<_> = live.iter().collect();
                let mut want = BTreeSet::new();
                for (i, (a, ea)) in items.iter().enumerate() {
                    for (c, ec) in &items[i + 1..] {
                        if ea.overlaps(ec) {
                            want.insert((**a, **c));
                        }
                    }
                }
                assert_eq!(got, want);
            }
        }
    }
}
