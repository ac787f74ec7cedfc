// Copyright 2025 the Understory Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Cell coordinates and the cell hash.

/// Largest absolute cell coordinate on either axis.
pub const MAX_CELL_COORD: i16 = i16::MAX;

/// Pack a cell coordinate pair into a 32-bit key.
///
/// Each absolute value is split into a high 7-bit and low 8-bit part; the
/// signs take the two lowest bits. The result is distinct for every pair with
/// both coordinates in `[-MAX_CELL_COORD, MAX_CELL_COORD]`.
#[inline]
pub fn cell_hash(x: i16, z: i16) -> u32 {
    debug_assert!(
        x != i16::MIN && z != i16::MIN,
        "cell coordinate out of range: ({x}, {z})"
    );
    let ax = u32::from(x.unsigned_abs());
    let az = u32::from(z.unsigned_abs());
    ((ax >> 8) << 25)
        | ((az >> 8) << 18)
        | ((ax & 0xff) << 10)
        | ((az & 0xff) << 2)
        | (u32::from(x < 0) << 1)
        | u32::from(z < 0)
}

/// Inclusive rectangle of cell coordinates in the XZ plane.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
pub struct CellRect {
    /// Minimum cell along X.
    pub min_x: i16,
    /// Minimum cell along Z.
    pub min_z: i16,
    /// Maximum cell along X.
    pub max_x: i16,
    /// Maximum cell along Z.
    pub max_z: i16,
}

impl CellRect {
    /// Whether the two rectangles share at least one cell.
    #[inline]
    pub fn overlaps(&self, other: &Self) -> bool {
        self.min_x <= other.max_x
            && other.min_x <= self.max_x
            && self.min_z <= other.max_z
            && other.min_z <= self.max_z
    }

    /// Whether cell `(x, z)` lies in the rectangle.
    #[inline]
    pub fn contains(&self, x: i16, z: i16) -> bool {
        self.min_x <= x && x <= self.max_x && self.min_z <= z && z <= self.max_z
    }

    /// Smallest rectangle covering both.
    pub fn union(&self, other: &Self) -> Self {
        Self {
            min_x: self.min_x.min(other.min_x),
            min_z: self.min_z.min(other.min_z),
            max_x: self.max_x.max(other.max_x),
            max_z: self.max_z.max(other.max_z),
        }
    }

    /// Number of cells covered.
    pub fn area(&self) -> usize {
        let w = usize::from(self.max_x.abs_diff(self.min_x)) + 1;
        let h = usize::from(self.max_z.abs_diff(self.min_z)) + 1;
        w * h
    }

    /// Every covered cell, Z-major.
    pub fn cells(self) -> impl Iterator<Item = (i16, i16)> {
        (self.min_z..=self.max_z).flat_map(move |z| (self.min_x..=self.max_x).map(move |x| (x, z)))
    }
}

/// Cell coordinate of `position` for a grid with cell size `1 / inv_cell_size`.
///
/// Saturates to `[-MAX_CELL_COORD, MAX_CELL_COORD]`.
#[inline]
pub(crate) fn cell_coord(position: f32, inv_cell_size: f32) -> i16 {
    let max = f32::from(MAX_CELL_COORD);
    let c = (position * inv_cell_size).floor().clamp(-max, max);
    #[allow(
        clippy::cast_possible_truncation,
        reason = "The value is clamped to the i16 range above."
    )]
    let c = c as i16;
    c
}

/// Whether `position` maps to a cell coordinate without saturating.
#[inline]
pub(crate) fn in_cell_range(position: f32, inv_cell_size: f32) -> bool {
    (position * inv_cell_size).floor().abs() <= f32::from(MAX_CELL_COORD)
}
