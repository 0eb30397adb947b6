use serde::{Deserialize, Serialize};

/// One of the two sides. Red moves first.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, derive_more::Display,
)]
pub enum Player {
    Red,
    Blue,
}

impl Player {
    pub const ALL: [Self; 2] = [Self::Red, Self::Blue];

    #[inline]
    #[must_use]
    pub const fn opponent(self) -> Self {
        match self {
            Self::Red => Self::Blue,
            Self::Blue => Self::Red,
        }
    }

    /// Single-character cell code used by the board text format and the position hash.
    #[inline]
    #[must_use]
    pub const fn symbol(self) -> char {
        match self {
            Self::Red => 'R',
            Self::Blue => 'B',
        }
    }
}
