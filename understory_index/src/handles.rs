// Copyright 2025 the Understory Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Side-table from caller node identities to index slots.

use core::fmt::Debug;
use core::hash::Hash;

use hashbrown::HashMap;
use rustc_hash::FxBuildHasher;

/// Reverse lookup from an external node to the slot an index currently stores it in.
///
/// Indices move their entries around (a tree rebuild reorders leaves, a grid
/// compacts its node array on removal). Every such move must be mirrored here
/// with [`HandleMap::set`] so that lookups stay O(1).
#[derive(Clone)]
pub struct HandleMap<K> {
    slots: HashMap<K, u32, FxBuildHasher>,
}

impl<K> Default for HandleMap<K> {
    fn default() -> Self {
        Self {
            slots: HashMap::with_hasher(FxBuildHasher),
        }
    }
}

impl<K: Copy + Eq + Hash> HandleMap<K> {
    /// Create an empty map.
    pub fn new() -> Self {
        Self::default()
    }

    /// Slot currently assigned to `node`, if tracked.
    #[inline]
    pub fn get(&self, node: K) -> Option<usize> {
        self.slots.get(&node).map(|&s| s as usize)
    }

    /// Whether `node` is tracked.
    #[inline]
    pub fn contains(&self, node: K) -> bool {
        self.slots.contains_key(&node)
    }

    /// Start tracking `node` at `slot`.
    ///
    /// Tracking a node twice is a caller error.
    pub fn insert(&mut self, node: K, slot: usize) {
        let previous = self.slots.insert(node, to_u32(slot));
        debug_assert!(previous.is_none(), "node is already tracked by this index");
    }

    /// Record that an already tracked `node` moved to `slot`.
    #[inline]
    pub fn set(&mut self, node: K, slot: usize) {
        debug_assert!(self.slots.contains_key(&node), "moving an untracked node");
        self.slots.insert(node, to_u32(slot));
    }

    /// Stop tracking `node`, returning its last slot.
    pub fn remove(&mut self, node: K) -> Option<usize> {
        self.slots.remove(&node).map(|s| s as usize)
    }

    /// Forget every node.
    pub fn clear(&mut self) {
        self.slots.clear();
    }

    /// Number of tracked nodes.
    pub fn len(&self) -> usize {
        self.slots.len()
    }

    /// Whether no node is tracked.
    pub fn is_empty(&self) -> bool {
        self.slots.is_empty()
    }
}

impl<K> Debug for HandleMap<K> {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("HandleMap")
            .field("tracked", &self.slots.len())
            .finish_non_exhaustive()
    }
}

#[inline]
fn to_u32(slot: usize) -> u32 {
    debug_assert!(u32::try_from(slot).is_ok(), "slot exceeds 32-bit range");
    #[allow(
        clippy::cast_possible_truncation,
        reason = "Slots are 32-bit by design; larger indices are rejected in debug builds."
    )]
    let s = slot as u32;
    s
}
