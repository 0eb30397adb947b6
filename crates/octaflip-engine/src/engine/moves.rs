use std::fmt;

use serde::{Deserialize, Serialize};

use crate::core::square::Square;

/// Clone destinations, scanned row by row around the source.
pub const CLONE_OFFSETS: [(i8, i8); 8] = [
    (-1, -1),
    (-1, 0),
    (-1, 1),
    (0, -1),
    (0, 1),
    (1, -1),
    (1, 0),
    (1, 1),
];

/// Jump destinations in generation order.
pub const JUMP_OFFSETS: [(i8, i8); 8] = [
    (-2, 0),
    (2, 0),
    (0, -2),
    (0, 2),
    (-2, -2),
    (-2, 2),
    (2, -2),
    (2, 2),
];

/// A non-pass move. Passes are represented as `None` wherever an `Option<Move>` is taken.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, derive_more::IsVariant,
)]
pub enum Move {
    /// Places a new piece next to `from`; the source stays.
    Clone { from: Square, to: Square },
    /// Moves the piece at `from` two cells away; the source is vacated.
    Jump { from: Square, to: Square },
}

impl Move {
    /// Classifies `from -> to` by its geometry.
    ///
    /// Returns `None` when the displacement is neither a clone offset nor a jump offset.
    #[must_use]
    pub fn new(from: Square, to: Square) -> Option<Self> {
        let delta = from.delta(to);
        if CLONE_OFFSETS.contains(&delta) {
            Some(Self::Clone { from, to })
        } else if JUMP_OFFSETS.contains(&delta) {
            Some(Self::Jump { from, to })
        } else {
            None
        }
    }

    #[must_use]
    pub const fn source(self) -> Square {
        match self {
            Self::Clone { from, .. } | Self::Jump { from, .. } => from,
        }
    }

    #[must_use]
    pub const fn target(self) -> Square {
        match self {
            Self::Clone { to, .. } | Self::Jump { to, .. } => to,
        }
    }

    /// `[r1, c1, r2, c2]`, the coordinate layout used by exported tables.
    #[expect(clippy::cast_possible_truncation)]
    #[must_use]
    pub const fn coords(self) -> [u8; 4] {
        let (from, to) = (self.source(), self.target());
        [
            from.row() as u8,
            from.col() as u8,
            to.row() as u8,
            to.col() as u8,
        ]
    }

    /// Same move seen on the board rotated by 180 degrees.
    #[must_use]
    pub const fn rotated_180(self) -> Self {
        match self {
            Self::Clone { from, to } => Self::Clone {
                from: from.rotated_180(),
                to: to.rotated_180(),
            },
            Self::Jump { from, to } => Self::Jump {
                from: from.rotated_180(),
                to: to.rotated_180(),
            },
        }
    }
}

impl fmt::Display for Move {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let [r1, c1, r2, c2] = self.coords();
        write!(f, "{r1},{c1},{r2},{c2}")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sq(row: usize, col: usize) -> Square {
        Square::new(row, col).unwrap()
    }

    #[test]
    fn test_classification() {
        assert!(Move::new(sq(3, 3), sq(4, 4)).unwrap().is_clone());
        assert!(Move::new(sq(3, 3), sq(3, 2)).unwrap().is_clone());
        assert!(Move::new(sq(3, 3), sq(5, 3)).unwrap().is_jump());
        assert!(Move::new(sq(3, 3), sq(1, 5)).unwrap().is_jump());
        // knight-like and long displacements are not moves
        assert_eq!(Move::new(sq(3, 3), sq(5, 4)), None);
        assert_eq!(Move::new(sq(3, 3), sq(3, 6)), None);
        assert_eq!(Move::new(sq(3, 3), sq(3, 3)), None);
    }

    #[test]
    fn test_display_uses_coordinates() {
        let mv = Move::new(sq(0, 0), sq(2, 2)).unwrap();
        assert_eq!(mv.to_string(), "0,0,2,2");
        assert_eq!(mv.coords(), [0, 0, 2, 2]);
        assert_eq!(mv.rotated_180().to_string(), "7,7,5,5");
    }
}
