// Copyright 2025 the Understory Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Culling, overlap and pair queries.

use alloc::vec::Vec;
use core::hash::Hash;

use kurbo::Point;
use understory_index::Aabb2D;

use crate::tree::BoxTree;
use crate::types::Plane2D;
use crate::util::distance_squared;

impl<K: Copy + Eq + Hash> BoxTree<K> {
    /// Append every node whose box is at least partially inside all `planes`.
    ///
    /// Subtrees entirely inside every plane are appended without further tests.
    /// Returns the number of nodes appended.
    pub fn visible_nodes(&self, planes: &[Plane2D], out: &mut Vec<K>) -> usize {
        self.collect(
            out,
            |b| {
                planes.iter().all(|p| {
                    // Most-positive corner along the normal.
                    let x = if p.normal.x < 0.0 { b.min_x } else { b.max_x };
                    let y = if p.normal.y < 0.0 { b.min_y } else { b.max_y };
                    p.normal.x * x + p.normal.y * y >= p.offset
                })
            },
            |b| {
                planes.iter().all(|p| {
                    let x = if p.normal.x > 0.0 { b.min_x } else { b.max_x };
                    let y = if p.normal.y > 0.0 { b.min_y } else { b.max_y };
                    p.normal.x * x + p.normal.y * y >= p.offset
                })
            },
        )
    }

    /// Append every node whose box overlaps `query`. Touching boxes overlap.
    pub fn overlapping_nodes(&self, query: &Aabb2D<f64>, out: &mut Vec<K>) -> usize {
        self.collect(out, |b| query.overlaps(b), |b| query.contains(b))
    }

    /// Append every node whose box comes within `radius` of `center`.
    pub fn circle_overlapping_nodes(&self, center: Point, radius: f64, out: &mut Vec<K>) -> usize {
        let radius_squared = radius * radius;
        self.collect(
            out,
            |b| distance_squared(b, center) <= radius_squared,
            |_| false,
        )
    }

    /// Walk the live nodes, skipping subtrees whose box fails `touches` and
    /// taking whole subtrees whose box passes `encloses`.
    fn collect(
        &self,
        out: &mut Vec<K>,
        touches: impl Fn(&Aabb2D<f64>) -> bool,
        encloses: impl Fn(&Aabb2D<f64>) -> bool,
    ) -> usize {
        let before = out.len();
        let end = self.end_node;
        let mut index = 0;
        while index < end {
            let node = &self.nodes[index];
            if !touches(&node.extents) {
                index += node.escape();
                continue;
            }
            if let Some(external) = node.external {
                out.push(external);
                index += 1;
            } else if encloses(&node.extents) {
                let stop = (index + node.escape()).min(end);
                out.extend(self.nodes[index + 1..stop].iter().filter_map(|n| n.external));
                index = stop;
            } else {
                index += 1;
            }
        }
        out.len() - before
    }

    /// Append every unordered pair of nodes whose boxes overlap, each pair once.
    ///
    /// Returns the number of pairs appended.
    pub fn overlapping_pairs(&self, out: &mut Vec<(K, K)>) -> usize {
        let before = out.len();
        let end = self.end_node;
        for current in 0..end {
            let node = &self.nodes[current];
            let Some(first) = node.external else {
                continue;
            };
            // Everything after a leaf in pre-order is a later sibling subtree or beyond.
            let mut index = current + 1;
            while index < end {
                let other = &self.nodes[index];
                if node.extents.overlaps(&other.extents) {
                    if let Some(second) = other.external {
                        out.push((first, second));
                    }
                    index += 1;
                } else {
                    index += other.escape();
                }
            }
        }
        out.len() - before
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::BoxTreeNode;
    use crate::util::rect_to_aabb;
    use alloc::collections::{BTreeMap, BTreeSet};
    use alloc::vec;
    use kurbo::{Rect, Vec2};
    use rand::rngs::StdRng;
    use rand::{Rng, SeedableRng};

    fn b(min_x: f64, min_y: f64, max_x: f64, max_y: f64) -> Aabb2D<f64> {
        Aabb2D::new(min_x, min_y, max_x, max_y)
    }

    fn sorted(mut v: Vec<u32>) -> Vec<u32> {
        v.sort_unstable();
        v
    }

    fn random_box(rng: &mut StdRng) -> Aabb2D<f64> {
        let x = rng.random_range(-200.0..200.0);
        let y = rng.random_range(-200.0..200.0);
        let w = rng.random_range(0.0..25.0);
        let h = rng.random_range(0.0..25.0);
        b(x, y, x + w, y + h)
    }

    fn brute_pairs(live: &BTreeMap<u32, Aabb2D<f64>>) -> BTreeSet<(u32, u32)> {
        let items: Vec<_> = live.iter().collect();
        let mut pairs = BTreeSet::new();
        for (i, (a, ba)) in items.iter().enumerate() {
            for (c, bc) in &items[i + 1..] {
                if ba.overlaps(bc) {
                    pairs.insert((**a, **c));
                }
            }
        }
        pairs
    }

    #[test]
    fn overlap_and_pairs_small_scene() {
        const A: u32 = 0;
        const B: u32 = 1;
        const C: u32 = 2;
        let mut tree = BoxTree::new(false);
        tree.add(A, &b(0.0, 0.0, 1.0, 1.0));
        tree.add(B, &b(5.0, 5.0, 6.0, 6.0));
        tree.add(C, &b(0.5, 0.5, 1.5, 1.5));
        tree.finalize();

        let mut out = Vec::new();
        assert_eq!(tree.overlapping_nodes(&b(0.0, 0.0, 2.0, 2.0), &mut out), 2);
        assert_eq!(sorted(out), vec![A, C]);

        let mut pairs = Vec::new();
        assert_eq!(tree.overlapping_pairs(&mut pairs), 1);
        let (x, y) = pairs[0];
        assert_eq!((x.min(y), x.max(y)), (A, C));
    }

    #[test]
    fn queries_on_empty_tree() {
        let tree: BoxTree<u32> = BoxTree::default();
        let mut out = vec![9];
        assert_eq!(tree.overlapping_nodes(&b(-1e9, -1e9, 1e9, 1e9), &mut out), 0);
        assert_eq!(tree.circle_overlapping_nodes(Point::ZERO, 1e9, &mut out), 0);
        assert_eq!(tree.visible_nodes(&[], &mut out), 0);
        let mut pairs = Vec::new();
        assert_eq!(tree.overlapping_pairs(&mut pairs), 0);
        assert_eq!(out, vec![9], "queries only append");
    }

    #[test]
    fn visibility_uses_half_planes() {
        let mut tree = BoxTree::new(false);
        for i in 0..20_u32 {
            let x = f64::from(i) * 10.0;
            tree.add(i, &rect_to_aabb(Rect::new(x, 0.0, x + 5.0, 5.0)));
        }
        tree.finalize();

        // Keep 42 <= x <= 97.
        let planes = [
            Plane2D::through(Point::new(42.0, 0.0), Vec2::new(1.0, 0.0)),
            Plane2D::through(Point::new(97.0, 0.0), Vec2::new(-1.0, 0.0)),
        ];
        let mut out = Vec::new();
        tree.visible_nodes(&planes, &mut out);
        assert_eq!(sorted(out), (4..=9).collect::<Vec<_>>());

        // No planes: everything is visible.
        let mut all = Vec::new();
        assert_eq!(tree.visible_nodes(&[], &mut all), 20);
    }

    #[test]
    fn circle_touches_corner() {
        let mut tree = BoxTree::new(false);
        tree.add(1, &b(3.0, 4.0, 10.0, 10.0));
        tree.add(2, &b(-10.0, -10.0, -9.0, -9.0));
        tree.finalize();
        let mut out = Vec::new();
        assert_eq!(tree.circle_overlapping_nodes(Point::ZERO, 5.0, &mut out), 1);
        assert_eq!(out, vec![1]);
        out.clear();
        assert_eq!(tree.circle_overlapping_nodes(Point::ZERO, 4.99, &mut out), 0);
    }

    #[test]
    fn randomized_queries_match_brute_force() {
        for high_quality in [false, true] {
            let mut rng = StdRng::seed_from_u64(if high_quality { 17 } else { 71 });
            let mut tree = BoxTree::new(high_quality);
            let mut live: BTreeMap<u32, Aabb2D<f64>> = BTreeMap::new();
            let mut next_id = 0_u32;

            for _round in 0..40 {
                for _ in 0..rng.random_range(1..40) {
                    match rng.random_range(0..10) {
                        0..=3 => {
                            let e = random_box(&mut rng);
                            tree.add(next_id, &e);
                            live.insert(next_id, e);
                            next_id += 1;
                        }
                        4..=7 if !live.is_empty() => {
                            let k = rng.random_range(0..live.len());
                            let id = *live.keys().nth(k).expect("index in range");
                            let e = if rng.random_bool(0.5) {
                                random_box(&mut rng)
                            } else {
                                // Small drift keeps most updates inside their parents.
                                let old = live[&id];
                                let dx = rng.random_range(-1.0..1.0);
                                b(old.min_x + dx, old.min_y, old.max_x + dx, old.max_y)
                            };
                            tree.update(id, &e);
                            live.insert(id, e);
                        }
                        _ if !live.is_empty() => {
                            let k = rng.random_range(0..live.len());
                            let id = *live.keys().nth(k).expect("index in range");
                            tree.remove(id);
                            live.remove(&id);
                        }
                        _ => {}
                    }
                }
                tree.finalize();
                tree.assert_invariants();
                assert_eq!(tree.len(), live.len());

                let q = random_box(&mut rng);
                let q = b(q.min_x, q.min_y, q.max_x + 60.0, q.max_y + 60.0);
                let mut got = Vec::new();
                let n = tree.overlapping_nodes(&q, &mut got);
                assert_eq!(n, got.len());
                let want: Vec<u32> = live
                    .iter()
                    .filter(|(_, e)| q.overlaps(e))
                    .map(|(k, _)| *k)
                    .collect();
                assert_eq!(sorted(got), want);

                let center = Point::new(
                    rng.random_range(-200.0..200.0),
                    rng.random_range(-200.0..200.0),
                );
                let radius = rng.random_range(0.0..80.0);
                let mut got = Vec::new();
                tree.circle_overlapping_nodes(center, radius, &mut got);
                let want: Vec<u32> = live
                    .iter()
                    .filter(|(_, e)| distance_squared(e, center) <= radius * radius)
                    .map(|(k, _)| *k)
                    .collect();
                assert_eq!(sorted(got), want);

                let planes = [
                    Plane2D::through(center, Vec2::new(1.0, 0.5)),
                    Plane2D::through(center + Vec2::new(0.0, 90.0), Vec2::new(0.0, -1.0)),
                ];
                let mut got = Vec::new();
                tree.visible_nodes(&planes, &mut got);
                let want: Vec<u32> = live
                    .iter()
                    .filter(|(_, e)| {
                        planes.iter().all(|p| {
                            [
                                Point::new(e.min_x, e.min_y),
                                Point::new(e.min_x, e.max_y),
                                Point::new(e.max_x, e.min_y),
                                Point::new(e.max_x, e.max_y),
                            ]
                            .into_iter()
                            .any(|c| p.contains(c))
                        })
                    })
                    .map(|(k, _)| *k)
                    .collect();
                assert_eq!(sorted(got), want);

                let mut pairs = Vec::new();
                let n = tree.overlapping_pairs(&mut pairs);
                assert_eq!(n, pairs.len());
                let got: BTreeSet<(u32, u32)> = pairs
                    .iter()
                    .map(|&(a, c)| (a.min(c), a.max(c)))
                    .collect();
                assert_eq!(got.len(), pairs.len(), "pair reported twice");
                assert_eq!(got, brute_pairs(&live));
            }
        }
    }

    #[test]
    fn queries_before_first_finalize_see_new_leaves() {
        let mut tree = BoxTree::new(false);
        for i in 0..10_u32 {
            let x = f64::from(i);
            tree.add(i, &b(x, 0.0, x + 0.5, 0.5));
        }
        let mut out = Vec::new();
        tree.overlapping_nodes(&b(2.0, 0.0, 4.0, 1.0), &mut out);
        assert_eq!(sorted(out), vec![2, 3, 4]);
    }

    #[test]
    fn leaf_added_after_trim_is_found_after_finalize() {
        let mut tree = BoxTree::new(false);
        for i in 0..6_u32 {
            let x = f64::from(i) * 10.0;
            tree.add(i, &b(x, 0.0, x + 5.0, 5.0));
        }
        tree.finalize();
        let last = tree
            .nodes()
            .last()
            .and_then(BoxTreeNode::external)
            .expect("finalized tree ends with a leaf");
        tree.remove(last);

        // The new leaf lands in a trimmed slot that stale interior boxes still
        // cover, so only the finalized tree is guaranteed to report it.
        tree.add(99, &b(500.0, 500.0, 501.0, 501.0));
        tree.finalize();
        tree.assert_invariants();
        let mut out = Vec::new();
        tree.overlapping_nodes(&b(499.0, 499.0, 502.0, 502.0), &mut out);
        assert_eq!(out, vec![99]);
    }
}
