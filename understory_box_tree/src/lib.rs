// Copyright 2025 the Understory Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

// After you edit the crate's doc comment, run this command, then check README.md for any missing links
// cargo rdme --workspace-project=understory_box_tree --heading-base-level=0

//! Understory Box Tree: a flattened, incrementally maintained bounding volume hierarchy over 2D boxes.
//!
//! Understory Box Tree is a broad-phase building block for 2D games, editors, and renderers that
//! need to cull, pick, or pair up many moving boxes every frame.
//!
//! - Stores the hierarchy as one pre-order array; each interior entry carries an escape offset
//!   that skips its subtree, so every query is a single forward scan with no recursion.
//! - Mutations are cheap and deferred. [`BoxTree::finalize`] applies them once per batch: a full
//!   rebuild when leaves were added or removed out of order, or a rebound (refit of interior
//!   boxes only) when leaves merely moved.
//! - Queries: [`BoxTree::visible_nodes`] (half-plane culling), [`BoxTree::overlapping_nodes`],
//!   [`BoxTree::circle_overlapping_nodes`], [`BoxTree::overlapping_pairs`], and
//!   [`BoxTree::ray_test`], a nearest-hit ray cast across any number of trees.
//!
//! Nodes are opaque caller identities (`K: Copy + Eq + Hash`). The tree keeps its own
//! [`HandleMap`](understory_index::HandleMap) from node to array slot, so callers never store
//! index-internal handles.
//!
//! ## Integration with Understory Index
//!
//! Boxes are [`understory_index::Aabb2D<f64>`]. [`BoxTree`] implements
//! [`understory_index::SpatialIndex`], so it can be driven interchangeably with the 3D
//! `understory_sparse_grid::SparseGrid`. Use [`rect_to_aabb`] and [`aabb_to_rect`] to move
//! between Kurbo rectangles and index boxes.
//!
//! ## Build quality
//!
//! [`BoxTree::new`] takes a `high_quality` switch. The default build splits every level at the
//! median along X or Y, alternating. The high quality build tries four candidate keys per level
//! (X, Y, X + Y, X - Y) and keeps the one whose two halves have the smallest summed
//! half-perimeters. It is slower to build and usually faster to query.
//!
//! ## Example
//!
//! ```rust
//! use kurbo::{Point, Rect, Vec2};
//! use understory_box_tree::{BoxTree, Plane2D, rect_to_aabb};
//!
//! let mut tree = BoxTree::new(false);
//! tree.add("a", &rect_to_aabb(Rect::new(0.0, 0.0, 1.0, 1.0)));
//! tree.add("b", &rect_to_aabb(Rect::new(5.0, 5.0, 6.0, 6.0)));
//! tree.add("c", &rect_to_aabb(Rect::new(0.5, 0.5, 1.5, 1.5)));
//! tree.finalize();
//!
//! let mut hits = Vec::new();
//! tree.overlapping_nodes(&rect_to_aabb(Rect::new(0.0, 0.0, 2.0, 2.0)), &mut hits);
//! hits.sort();
//! assert_eq!(hits, ["a", "c"]);
//!
//! let mut pairs = Vec::new();
//! assert_eq!(tree.overlapping_pairs(&mut pairs), 1);
//!
//! // Keep everything right of x = 3.
//! let planes = [Plane2D::through(Point::new(3.0, 0.0), Vec2::new(1.0, 0.0))];
//! let mut visible = Vec::new();
//! tree.visible_nodes(&planes, &mut visible);
//! assert_eq!(visible, ["b"]);
//! ```
//!
//! ### Float semantics
//!
//! Coordinates are assumed finite (no NaNs). Boxes with `min > max` are rejected in debug builds.
//!
//! This crate is `no_std` and uses `alloc`.

#![no_std]

extern crate alloc;

mod build;
mod query;
mod ray;
mod tree;
mod types;
mod util;

pub use tree::BoxTree;
pub use types::{BoxTreeNode, LEAF_BUCKET_SIZE, Plane2D, Ray, RayCandidate, RayHit, TreeFlags};
pub use util::{aabb_to_rect, rect_to_aabb};
