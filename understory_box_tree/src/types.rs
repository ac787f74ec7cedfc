// Copyright 2025 the Understory Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Public types for the box tree: nodes, dirty flags, planes, and rays.

use kurbo::{Point, Vec2};
use understory_index::Aabb2D;

/// Maximum number of leaves grouped under one interior node.
pub const LEAF_BUCKET_SIZE: usize = 4;

/// One entry of the flattened hierarchy.
///
/// Entries are stored in pre-order. For an interior entry at position `i`, the
/// half-open range `[i + 1, i + escape)` holds exactly its subtree, so a whole
/// subtree is skipped by adding [`BoxTreeNode::escape`] to the current position.
/// Leaves (and cleared slots) always have an escape offset of `1`.
#[derive(Clone, Debug, PartialEq)]
pub struct BoxTreeNode<K> {
    pub(crate) extents: Aabb2D<f64>,
    pub(crate) escape: u32,
    pub(crate) external: Option<K>,
}

impl<K: Copy> BoxTreeNode<K> {
    pub(crate) const fn leaf(extents: Aabb2D<f64>, external: K) -> Self {
        Self {
            extents,
            escape: 1,
            external: Some(external),
        }
    }

    pub(crate) const fn interior(extents: Aabb2D<f64>, escape: u32) -> Self {
        Self {
            extents,
            escape,
            external: None,
        }
    }

    /// Box of this entry. For interior entries, the union of the subtree.
    #[inline]
    pub fn extents(&self) -> Aabb2D<f64> {
        self.extents
    }

    /// Offset from this entry to the first entry after its subtree.
    #[inline]
    pub fn escape(&self) -> usize {
        self.escape as usize
    }

    /// The caller node stored in this leaf, if it is one.
    #[inline]
    pub fn external(&self) -> Option<K> {
        self.external
    }

    /// Whether this entry is a leaf.
    #[inline]
    pub fn is_leaf(&self) -> bool {
        self.external.is_some()
    }

    /// Turn this entry into an empty slot that no query can match.
    pub(crate) fn clear(&mut self) {
        self.extents = Aabb2D::EMPTY;
        self.escape = 1;
        self.external = None;
    }
}

bitflags::bitflags! {
    /// Deferred structural work, applied by [`BoxTree::finalize`](crate::BoxTree::finalize).
    #[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
    pub struct TreeFlags: u8 {
        /// Leaves were added or removed out of order; the hierarchy must be rebuilt.
        const NEEDS_REBUILD = 0b0000_0001;
        /// Leaves grew past their ancestors; interior boxes must be recomputed.
        const NEEDS_REBOUND = 0b0000_0010;
    }
}

/// A half-plane in 2D. A point `p` is inside when `normal.dot(p) >= offset`.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Plane2D {
    /// Direction pointing into the kept half.
    pub normal: Vec2,
    /// Signed distance threshold along `normal`.
    pub offset: f64,
}

impl Plane2D {
    /// Create a plane from its normal and offset.
    pub const fn new(normal: Vec2, offset: f64) -> Self {
        Self { normal, offset }
    }

    /// The plane through `point` keeping the side `normal` points to.
    pub fn through(point: Point, normal: Vec2) -> Self {
        Self {
            normal,
            offset: normal.dot(point.to_vec2()),
        }
    }

    /// Whether `point` lies inside (or on) the plane.
    pub fn contains(&self, point: Point) -> bool {
        self.normal.dot(point.to_vec2()) >= self.offset
    }
}

/// A parametric ray `origin + t * direction` for `t` in `[0, max_factor)`.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Ray {
    /// Start of the ray.
    pub origin: Point,
    /// Direction. It does not have to be normalized; factors are measured in
    /// multiples of it.
    pub direction: Vec2,
    /// Upper bound on the factor of any reported hit.
    pub max_factor: f64,
}

impl Ray {
    /// Create a ray.
    pub const fn new(origin: Point, direction: Vec2, max_factor: f64) -> Self {
        Self {
            origin,
            direction,
            max_factor,
        }
    }

    /// Point at factor `t` along the ray.
    pub fn at(&self, t: f64) -> Point {
        self.origin + self.direction * t
    }
}

/// Result of a narrow-phase test produced by a [`BoxTree::ray_test`](crate::BoxTree::ray_test) callback.
pub trait RayHit {
    /// Factor along the ray at which the hit occurred.
    fn factor(&self) -> f64;
}

impl RayHit for f64 {
    fn factor(&self) -> f64 {
        *self
    }
}

/// A leaf reached by a ray cast, handed to the callback for the exact test.
#[derive(Debug)]
pub struct RayCandidate<'a, K> {
    /// Position of `tree` within the slice passed to `ray_test`.
    pub tree_index: usize,
    /// Tree holding the leaf.
    pub tree: &'a crate::BoxTree<K>,
    /// The caller node stored in the leaf.
    pub node: K,
    /// The ray being cast.
    pub ray: &'a Ray,
    /// Factor at which the ray enters the leaf box (`0` when it starts inside).
    pub distance: f64,
    /// Factor of the nearest hit so far; hits at or beyond it are not wanted.
    pub upper_bound: f64,
}
