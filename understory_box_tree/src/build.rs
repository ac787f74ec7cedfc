// Copyright 2025 the Understory Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Rebuild and rebound of the flattened hierarchy.
//!
//! A rebuild gathers the leaves, orders them with a recursive median split
//! (quickselect, no full sort), and writes the hierarchy back in pre-order with
//! at most [`LEAF_BUCKET_SIZE`] leaves per bottom-level interior node.
//! A rebound keeps the layout and only refits the interior boxes that cover
//! the range of updated leaves.

use core::hash::Hash;

use log::debug;
use understory_index::Aabb2D;

use crate::tree::BoxTree;
use crate::types::{BoxTreeNode, LEAF_BUCKET_SIZE, TreeFlags};
use crate::util::half_perimeter;

impl<K: Copy + Eq + Hash> BoxTree<K> {
    pub(crate) fn rebuild(&mut self) {
        if self.num_external_nodes > 0 {
            let end = self.end_node;
            let mut build = core::mem::take(&mut self.build_nodes);
            build.clear();
            build.extend(self.nodes.drain(..).take(end).filter(BoxTreeNode::is_leaf));
            debug_assert_eq!(
                build.len(),
                self.num_external_nodes,
                "leaf count does not match tracked nodes"
            );

            if build.len() > 1 {
                if build.len() > LEAF_BUCKET_SIZE && self.num_adds > 0 {
                    if self.high_quality {
                        sort_nodes_high_quality(&mut build);
                    } else {
                        sort_nodes(&mut build);
                    }
                }
                self.nodes.reserve(2 * build.len());
                self.recursive_build(&build, 0, build.len());
            } else if let Some(root) = build.pop() {
                self.place_leaf(&root);
            }
            self.end_node = self.nodes.len();

            debug!(
                "box tree rebuilt: {} leaves, {} nodes, high_quality={}",
                self.num_external_nodes,
                self.end_node,
                self.high_quality
            );
            build.clear();
            self.build_nodes = build;
        }

        self.flags = TreeFlags::empty();
        self.num_adds = 0;
        self.num_updates = 0;
        self.reset_update_range();
    }

    /// Append the subtree over `build[start..end]` in pre-order.
    fn recursive_build(&mut self, build: &[BoxTreeNode<K>], start: usize, end: usize) {
        let index = self.nodes.len();
        self.nodes.push(BoxTreeNode::interior(Aabb2D::EMPTY, 1));

        let mut extents = Aabb2D::EMPTY;
        if start + LEAF_BUCKET_SIZE >= end {
            for leaf in &build[start..end] {
                extents = extents.union(&leaf.extents);
                self.place_leaf(leaf);
            }
        } else {
            let split = (start + end) / 2;
            for (lo, hi) in [(start, split), (split, end)] {
                let child = self.nodes.len();
                if lo + 1 >= hi {
                    self.place_leaf(&build[lo]);
                } else {
                    self.recursive_build(build, lo, hi);
                }
                extents = extents.union(&self.nodes[child].extents);
            }
        }

        self.nodes[index] = BoxTreeNode::interior(extents, to_u32(self.nodes.len() - index));
    }

    fn place_leaf(&mut self, leaf: &BoxTreeNode<K>) {
        if let Some(external) = leaf.external {
            self.handles.set(external, self.nodes.len());
        }
        self.nodes.push(leaf.clone());
    }

    /// Refit the interior boxes covering `[start_update, end_update]`, children first.
    pub(crate) fn rebound(&mut self) {
        if self.nodes.len() > 1 && !self.nodes[0].is_leaf() {
            let start_update = self.start_update;
            let mut end_update = self.end_update;
            let mut stack = core::mem::take(&mut self.rebound_stack);
            stack.clear();
            let mut refitted = 0_usize;

            let mut top = 0;
            loop {
                let current = top;
                let current_escape = current + self.nodes[current].escape();

                // Descend into every interior child that still covers pending leaves.
                // Entries at or past `end_update` have already been refitted.
                let mut index = current + 1;
                while index < current_escape && index < end_update {
                    let node = &self.nodes[index];
                    let escape_index = index + node.escape();
                    if !node.is_leaf() && escape_index > start_update {
                        stack.push(top);
                        top = index;
                    }
                    index = escape_index;
                }

                if top == current {
                    let mut extents = Aabb2D::EMPTY;
                    let mut child = current + 1;
                    while child < current_escape {
                        let node = &self.nodes[child];
                        extents = extents.union(&node.extents);
                        child += node.escape();
                    }
                    self.nodes[current].extents = extents;
                    refitted += 1;

                    end_update = current;
                    match stack.pop() {
                        Some(parent) => top = parent,
                        None => break,
                    }
                }
            }

            debug!(
                "box tree rebound: {refitted} interior nodes refitted over {} leaves",
                self.num_external_nodes
            );
            self.rebound_stack = stack;
        }

        // `num_updates` survives so repeated rebounds eventually force a rebuild.
        self.flags = TreeFlags::empty();
        self.num_adds = 0;
        self.reset_update_range();
    }
}

/// Sort keys tried when splitting a range of leaves.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum SplitKey {
    X,
    Y,
    XPlusY,
    XMinusY,
}

impl SplitKey {
    const ALL: [Self; 4] = [Self::X, Self::Y, Self::XPlusY, Self::XMinusY];

    /// Twice the box center projected on the key axis, negated when `reverse`.
    #[inline]
    fn eval(self, b: &Aabb2D<f64>, reverse: bool) -> f64 {
        let k = match self {
            Self::X => b.min_x + b.max_x,
            Self::Y => b.min_y + b.max_y,
            Self::XPlusY => b.min_x + b.min_y + b.max_x + b.max_y,
            Self::XMinusY => b.min_x - b.min_y + b.max_x - b.max_y,
        };
        if reverse { -k } else { k }
    }
}

fn select<K>(
    nodes: &mut [BoxTreeNode<K>],
    first: usize,
    nth: usize,
    last: usize,
    key: SplitKey,
    reverse: bool,
) {
    nth_element(nodes, first, nth, last, |n| key.eval(&n.extents, reverse));
}

/// Median split alternating between the X and Y keys and flipping direction at every level.
pub(crate) fn sort_nodes<K>(nodes: &mut [BoxTreeNode<K>]) {
    struct Sorter {
        // Cycles 0 -> 2 -> 1 -> 0; only 0 selects X, so Y is used twice as often.
        axis: u8,
        reverse: bool,
    }

    impl Sorter {
        fn split<K>(&mut self, nodes: &mut [BoxTreeNode<K>], start: usize, end: usize) {
            let mid = (start + end) / 2;
            let key = if self.axis == 0 { SplitKey::X } else { SplitKey::Y };
            select(nodes, start, mid, end, key, self.reverse);

            self.axis = match self.axis {
                0 => 2,
                2 => 1,
                _ => 0,
            };
            self.reverse = !self.reverse;

            if start + LEAF_BUCKET_SIZE < mid {
                self.split(nodes, start, mid);
            }
            if mid + LEAF_BUCKET_SIZE < end {
                self.split(nodes, mid, end);
            }
        }
    }

    let len = nodes.len();
    Sorter {
        axis: 0,
        reverse: false,
    }
    .split(nodes, 0, len);
}

/// Median split choosing, per split, the key whose halves have the smallest
/// summed half-perimeters. Ties keep the earlier key of [`SplitKey::ALL`].
///
/// The direction flips after every split in pre-order, so a right subtree
/// starts from the direction its left sibling's subtree left behind.
pub(crate) fn sort_nodes_high_quality<K>(nodes: &mut [BoxTreeNode<K>]) {
    fn split<K>(nodes: &mut [BoxTreeNode<K>], start: usize, end: usize, reverse: &mut bool) {
        let mid = (start + end) / 2;

        let mut best = (SplitKey::X, f64::INFINITY);
        for key in SplitKey::ALL {
            select(nodes, start, mid, end, key, false);
            let score = range_score(&nodes[start..mid]) + range_score(&nodes[mid..end]);
            if score < best.1 {
                best = (key, score);
            }
        }
        select(nodes, start, mid, end, best.0, *reverse);
        *reverse = !*reverse;

        if start + LEAF_BUCKET_SIZE < mid {
            split(nodes, start, mid, reverse);
        }
        if mid + LEAF_BUCKET_SIZE < end {
            split(nodes, mid, end, reverse);
        }
    }

    let len = nodes.len();
    split(nodes, 0, len, &mut false);
}

fn range_score<K>(nodes: &[BoxTreeNode<K>]) -> f64 {
    let bounds = nodes
        .iter()
        .fold(Aabb2D::EMPTY, |acc, n| acc.union(&n.extents));
    half_perimeter(&bounds)
}

/// Partially order `nodes[first..last]` so that position `nth` holds the element
/// a full sort by `key` would put there, with no greater key before it and no
/// smaller key after it.
pub(crate) fn nth_element<T>(
    nodes: &mut [T],
    mut first: usize,
    nth: usize,
    mut last: usize,
    key: impl Fn(&T) -> f64,
) {
    while last - first > 8 {
        let pivot = median(
            key(&nodes[first]),
            key(&nodes[first + (last - first) / 2]),
            key(&nodes[last - 1]),
        );

        // Hoare partition; the pivot is a member of the range so both scans stop.
        let mut lo = first;
        let mut hi = last;
        let cut = loop {
            while key(&nodes[lo]) < pivot {
                lo += 1;
            }
            hi -= 1;
            while pivot < key(&nodes[hi]) {
                hi -= 1;
            }
            if lo >= hi {
                break lo;
            }
            nodes.swap(lo, hi);
            lo += 1;
        };

        if cut <= nth {
            first = cut;
        } else {
            last = cut;
        }
    }
    insertion_sort(nodes, first, last, key);
}

fn insertion_sort<T>(nodes: &mut [T], first: usize, last: usize, key: impl Fn(&T) -> f64) {
    for sorted in first + 1..last {
        let k = key(&nodes[sorted]);
        let mut next = sorted;
        while next > first && k < key(&nodes[next - 1]) {
            nodes.swap(next, next - 1);
            next -= 1;
        }
    }
}

fn median(a: f64, b: f64, c: f64) -> f64 {
    if a < b {
        if b < c {
            b
        } else if a < c {
            c
        } else {
            a
        }
    } else if a < c {
        a
    } else if b < c {
        c
    } else {
        b
    }
}

#[inline]
fn to_u32(offset: usize) -> u32 {
    debug_assert!(u32::try_from(offset).is_ok(), "escape offset exceeds 32-bit range");
    #[allow(
        clippy::cast_possible_truncation,
        reason = "Node arrays are bounded by 32-bit handles; debug builds reject larger trees."
    )]
    let o = offset as u32;
    o
}
