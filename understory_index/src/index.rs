// Copyright 2025 the Understory Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! The contract shared by every broad-phase index in the workspace.

use alloc::vec::Vec;
use core::hash::Hash;

/// Broad-phase spatial index over opaque external nodes `K`.
///
/// Mutations are expected once per tick (`add` for new objects, `update` for moved
/// ones, `remove` for destroyed ones), followed by one [`SpatialIndex::finalize`]
/// and then any number of queries.
///
/// Queries append to a caller-owned vector and return how many entries they
/// appended, so results from several indices can be gathered into one buffer
/// without per-query allocation. The `*_at` variants first truncate the output
/// to `start`, overwriting whatever the caller had stored from that offset on.
///
/// Queries take `&mut self` because some indices repair lazily cached state
/// (or stamp visited entries) while answering them.
pub trait SpatialIndex<K: Copy + Eq + Hash> {
    /// Box type accepted by mutations and overlap queries.
    type Extents: Copy;
    /// Half-space type used by visibility queries.
    type Plane: Copy;
    /// Point type used as the center of radius queries.
    type Center: Copy;
    /// Scalar type of radii.
    type Scalar: Copy;

    /// Start tracking `node` with the given box.
    ///
    /// Adding a node that is already tracked is a caller error.
    fn add(&mut self, node: K, extents: &Self::Extents);

    /// Replace the box of `node`, or add it if it is not tracked yet.
    fn update(&mut self, node: K, extents: &Self::Extents);

    /// Stop tracking `node`. Unknown nodes are ignored.
    fn remove(&mut self, node: K);

    /// Apply any deferred structural work before querying.
    fn finalize(&mut self);

    /// Forget every node.
    fn clear(&mut self);

    /// Number of tracked nodes.
    fn len(&self) -> usize;

    /// Whether no node is tracked.
    fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Append every node whose box overlaps `query`.
    fn overlapping_nodes(&mut self, query: &Self::Extents, out: &mut Vec<K>) -> usize;

    /// Append every node whose box lies within `radius` of `center`.
    fn overlapping_nodes_in_radius(
        &mut self,
        center: Self::Center,
        radius: Self::Scalar,
        out: &mut Vec<K>,
    ) -> usize;

    /// Append every node whose box is at least partially inside all `planes`.
    fn visible_nodes(&mut self, planes: &[Self::Plane], out: &mut Vec<K>) -> usize;

    /// Append every unordered pair of nodes whose boxes overlap, each pair once.
    fn overlapping_pairs(&mut self, out: &mut Vec<(K, K)>) -> usize;

    /// [`SpatialIndex::overlapping_nodes`], writing from offset `start`.
    fn overlapping_nodes_at(
        &mut self,
        query: &Self::Extents,
        out: &mut Vec<K>,
        start: usize,
    ) -> usize {
        out.truncate(start);
        self.overlapping_nodes(query, out)
    }

    /// [`SpatialIndex::visible_nodes`], writing from offset `start`.
    fn visible_nodes_at(
        &mut self,
        planes: &[Self::Plane],
        out: &mut Vec<K>,
        start: usize,
    ) -> usize {
        out.truncate(start);
        self.visible_nodes(planes, out)
    }

    /// [`SpatialIndex::overlapping_pairs`], writing from offset `start`.
    fn overlapping_pairs_at(&mut self, out: &mut Vec<(K, K)>, start: usize) -> usize {
        out.truncate(start);
        self.overlapping_pairs(out)
    }
}
