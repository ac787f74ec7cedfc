// Copyright 2025 the Understory Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Nearest-hit ray casting across one or more trees.

use alloc::vec::Vec;
use core::hash::Hash;

use kurbo::{Point, Vec2};
use understory_index::Aabb2D;

use crate::tree::BoxTree;
use crate::types::{Ray, RayCandidate, RayHit};

impl<K: Copy + Eq + Hash> BoxTree<K> {
    /// Cast `ray` through every tree in `trees` and return the nearest hit.
    ///
    /// Nodes of all trees are visited in order of the factor at which the ray
    /// enters their box. Each leaf reached is handed to `callback` as a
    /// [`RayCandidate`]; the callback performs the exact test and returns a hit
    /// (which must lie below [`RayCandidate::upper_bound`]) or `None`. Every hit
    /// becomes the current best and prunes all boxes entered at or beyond its
    /// factor.
    ///
    /// ```
    /// use kurbo::{Point, Vec2};
    /// use understory_box_tree::{BoxTree, Ray};
    /// use understory_index::Aabb2D;
    ///
    /// let mut tree = BoxTree::new(false);
    /// tree.add("near", &Aabb2D::new(2.0, -1.0, 3.0, 1.0));
    /// tree.add("far", &Aabb2D::new(6.0, -1.0, 7.0, 1.0));
    /// tree.finalize();
    ///
    /// let ray = Ray::new(Point::ZERO, Vec2::new(1.0, 0.0), 100.0);
    /// // Treat the boxes themselves as the shapes. Every accepted hit is
    /// // nearer than the previous one, so the last one reported wins.
    /// let mut nearest = None;
    /// let factor = BoxTree::ray_test(&[&tree], &ray, |c| {
    ///     nearest = Some(c.node);
    ///     Some(c.distance)
    /// });
    /// assert_eq!(factor, Some(2.0));
    /// assert_eq!(nearest, Some("near"));
    /// ```
    pub fn ray_test<R, F>(trees: &[&Self], ray: &Ray, callback: F) -> Option<R>
    where
        R: RayHit,
        F: FnMut(&RayCandidate<'_, K>) -> Option<R>,
    {
        let mut cast = RayCast {
            trees,
            ray,
            slab: Slab::new(ray),
            callback,
            pending: Vec::new(),
            best: None,
            upper_bound: ray.max_factor,
        };

        for (tree_index, tree) in trees.iter().enumerate() {
            if tree.end_node != 0 {
                cast.process(tree_index, 0);
            }
        }

        while let Some(next) = cast.pending.pop() {
            // A hit found after this node was queued may have moved the bound.
            if next.distance >= cast.upper_bound {
                continue;
            }
            let tree = trees[next.tree_index];
            let stop = (next.node_index + tree.nodes[next.node_index].escape()).min(tree.end_node);
            let mut child = next.node_index + 1;
            while child < stop {
                cast.process(next.tree_index, child);
                child += tree.nodes[child].escape();
            }
        }

        cast.best
    }
}

/// An interior node waiting to be expanded.
#[derive(Clone, Copy, Debug)]
struct Pending {
    tree_index: usize,
    node_index: usize,
    distance: f64,
}

struct RayCast<'a, K, R, F> {
    trees: &'a [&'a BoxTree<K>],
    ray: &'a Ray,
    slab: Slab,
    callback: F,
    /// Sorted by descending distance so that `pop` yields the nearest.
    pending: Vec<Pending>,
    best: Option<R>,
    upper_bound: f64,
}

impl<K, R, F> RayCast<'_, K, R, F>
where
    K: Copy + Eq + Hash,
    R: RayHit,
    F: FnMut(&RayCandidate<'_, K>) -> Option<R>,
{
    fn process(&mut self, tree_index: usize, node_index: usize) {
        let tree = self.trees[tree_index];
        let node = &tree.nodes[node_index];
        let Some(distance) = self.slab.entry_factor(&node.extents, self.upper_bound) else {
            return;
        };

        if let Some(external) = node.external {
            let candidate = RayCandidate {
                tree_index,
                tree,
                node: external,
                ray: self.ray,
                distance,
                upper_bound: self.upper_bound,
            };
            if let Some(hit) = (self.callback)(&candidate) {
                self.upper_bound = hit.factor();
                self.best = Some(hit);
            }
        } else {
            let at = self.pending.partition_point(|p| p.distance > distance);
            self.pending.insert(
                at,
                Pending {
                    tree_index,
                    node_index,
                    distance,
                },
            );
        }
    }
}

/// Precomputed slab test for one ray.
#[derive(Clone, Copy, Debug)]
struct Slab {
    origin: Point,
    direction: Vec2,
    inverse: Vec2,
}

impl Slab {
    fn new(ray: &Ray) -> Self {
        Self {
            origin: ray.origin,
            direction: ray.direction,
            inverse: Vec2::new(1.0 / ray.direction.x, 1.0 / ray.direction.y),
        }
    }

    /// Factor at which the ray enters `b`, `0` when it starts inside.
    ///
    /// `None` when the ray misses or enters at or beyond `upper_bound`.
    fn entry_factor(&self, b: &Aabb2D<f64>, upper_bound: f64) -> Option<f64> {
        let o = self.origin;
        if b.contains_point(o.x, o.y) {
            return Some(0.0);
        }

        let (mut t_min, mut t_max) =
            slab_span(b.min_x, b.max_x, o.x, self.direction.x, self.inverse.x);
        let (ty_min, ty_max) = slab_span(b.min_y, b.max_y, o.y, self.direction.y, self.inverse.y);
        if t_min > ty_max || ty_min > t_max {
            return None;
        }
        if ty_min > t_min {
            t_min = ty_min;
        }
        if ty_max < t_max {
            t_max = ty_max;
        }
        if t_min < 0.0 {
            t_min = t_max;
        }
        (0.0 <= t_min && t_min < upper_bound).then_some(t_min)
    }
}

/// Entry and exit factors of one axis slab.
#[inline]
fn slab_span(min: f64, max: f64, origin: f64, direction: f64, inverse: f64) -> (f64, f64) {
    if direction >= 0.0 {
        // A zero delta stays zero even when the direction is zero (0 * inf is NaN).
        let scale = |delta: f64| if delta == 0.0 { 0.0 } else { delta * inverse };
        (scale(min - origin), scale(max - origin))
    } else {
        ((max - origin) * inverse, (min - origin) * inverse)
    }
}
