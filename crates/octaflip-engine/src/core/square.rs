use std::fmt;

use serde::{Deserialize, Serialize};

/// A cell on the 8×8 board, indexed `row * 8 + col`.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
#[serde(try_from = "u8", into = "u8")]
pub struct Square(u8);

impl Square {
    pub const SIDE: usize = 8;
    pub const COUNT: usize = Self::SIDE * Self::SIDE;

    #[expect(clippy::cast_possible_truncation)]
    #[must_use]
    pub const fn new(row: usize, col: usize) -> Option<Self> {
        if row < Self::SIDE && col < Self::SIDE {
            Some(Self((row * Self::SIDE + col) as u8))
        } else {
            None
        }
    }

    #[expect(clippy::cast_possible_truncation)]
    #[must_use]
    pub const fn from_index(index: usize) -> Option<Self> {
        if index < Self::COUNT {
            Some(Self(index as u8))
        } else {
            None
        }
    }

    #[inline]
    #[must_use]
    pub const fn index(self) -> usize {
        self.0 as usize
    }

    #[inline]
    #[must_use]
    pub const fn row(self) -> usize {
        self.index() / Self::SIDE
    }

    #[inline]
    #[must_use]
    pub const fn col(self) -> usize {
        self.index() % Self::SIDE
    }

    #[inline]
    #[must_use]
    pub const fn bit(self) -> u64 {
        1 << self.0
    }

    /// Square reached by moving `(dr, dc)`, or `None` when it falls off the board.
    #[expect(
        clippy::cast_possible_truncation,
        clippy::cast_possible_wrap,
        clippy::cast_sign_loss
    )]
    #[must_use]
    pub const fn offset(self, dr: i8, dc: i8) -> Option<Self> {
        let row = self.row() as i8 + dr;
        let col = self.col() as i8 + dc;
        if row < 0 || col < 0 {
            return None;
        }
        Self::new(row as usize, col as usize)
    }

    /// Square mirrored through the board centre.
    #[must_use]
    pub const fn rotated_180(self) -> Self {
        Self(63 - self.0)
    }

    /// Row and column distance from `self` to `other`.
    #[expect(clippy::cast_possible_truncation, clippy::cast_possible_wrap)]
    #[must_use]
    pub const fn delta(self, other: Self) -> (i8, i8) {
        (
            other.row() as i8 - self.row() as i8,
            other.col() as i8 - self.col() as i8,
        )
    }

    pub fn all() -> impl Iterator<Item = Self> {
        (0..Self::COUNT).filter_map(Self::from_index)
    }

    /// Iterates the squares of a bit mask in ascending index order.
    pub fn iter_mask(mut mask: u64) -> impl Iterator<Item = Self> {
        std::iter::from_fn(move || {
            if mask == 0 {
                return None;
            }
            let index = mask.trailing_zeros() as usize;
            mask &= mask - 1;
            Self::from_index(index)
        })
    }
}

impl fmt::Display for Square {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "({},{})", self.row(), self.col())
    }
}

impl TryFrom<u8> for Square {
    type Error = String;

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        Self::from_index(value.into()).ok_or_else(|| format!("square index out of range: {value}"))
    }
}

impl From<Square> for u8 {
    fn from(square: Square) -> Self {
        square.0
    }
}
