// Copyright 2025 the Understory Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

// After you edit the crate's doc comment, run this command, then check README.md for any missing links
// cargo rdme --workspace-project=understory_index --heading-base-level=0

//! Understory Index: the common ground of the broad-phase indices.
//!
//! - [`Aabb2D`] and [`Aabb3D`]: plain axis-aligned boxes, generic over the scalar.
//! - [`HandleMap`]: O(1) side-table from caller node identities to index slots.
//! - [`SpatialIndex`]: the add/update/remove/finalize/query contract implemented by
//!   `understory_box_tree::BoxTree` (2D) and `understory_sparse_grid::SparseGrid` (3D).
//!
//! Indices never inspect the external nodes they track. Any `Copy + Eq + Hash`
//! identity works (entity ids, slot keys, small integers), and query results hand
//! those identities back.
//!
//! # Example
//!
//! ```rust
//! use understory_index::{Aabb2D, HandleMap};
//!
//! let a = Aabb2D::new(0.0, 0.0, 1.0, 1.0);
//! let b = Aabb2D::new(0.5, 0.5, 1.5, 1.5);
//! assert!(a.overlaps(&b));
//! assert_eq!(a.union(&b), Aabb2D::new(0.0, 0.0, 1.5, 1.5));
//!
//! let mut handles: HandleMap<&str> = HandleMap::new();
//! handles.insert("player", 3);
//! assert_eq!(handles.get("player"), Some(3));
//! ```
//!
//! ### Float semantics
//!
//! This crate assumes no NaNs for floating-point coordinates. Debug builds may assert.
//!
//! This crate is `no_std` and uses `alloc`.

#![no_std]

extern crate alloc;

pub mod handles;
pub mod index;
pub mod types;

pub use handles::HandleMap;
pub use index::SpatialIndex;
pub use types::{Aabb2D, Aabb3D};
