use std::{fmt, str::FromStr};

use serde::{Deserialize, Serialize};

use crate::{ParseBoardError, core::player::Player, core::square::Square};

const FNV_OFFSET_BASIS: u32 = 0x811c_9dc5;
const FNV_PRIME: u32 = 0x0100_0193;
const EMPTY_SYMBOL: char = '.';

const fn compute_neighbor_masks() -> [u64; Square::COUNT] {
    let mut masks = [0; Square::COUNT];
    let mut index = 0;
    while index < Square::COUNT {
        let row = index / Square::SIDE;
        let col = index % Square::SIDE;
        let mut mask = 0;
        let mut r = row.saturating_sub(1);
        while r <= row + 1 && r < Square::SIDE {
            let mut c = col.saturating_sub(1);
            while c <= col + 1 && c < Square::SIDE {
                if r != row || c != col {
                    mask |= 1 << (r * Square::SIDE + c);
                }
                c += 1;
            }
            r += 1;
        }
        masks[index] = mask;
        index += 1;
    }
    masks
}

/// Bit masks of the (up to) eight neighbours of every square.
pub(crate) const NEIGHBOR_MASKS: [u64; Square::COUNT] = compute_neighbor_masks();

/// OctaFlip board as a pair of occupancy masks.
///
/// Bit `row * 8 + col` of `red` (resp. `blue`) is set when that cell holds a Red
/// (resp. Blue) piece. The two masks never overlap.
///
/// # Serialization
///
/// Serialized as `"<red>:<blue>"`, each mask as 16 lowercase hex digits. Overlapping
/// masks are rejected on deserialization.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Board {
    red: u64,
    blue: u64,
}

impl Serialize for Board {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: serde::Serializer,
    {
        serializer.serialize_str(&format!("{:016x}:{:016x}", self.red, self.blue))
    }
}

impl<'de> Deserialize<'de> for Board {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        let s = String::deserialize(deserializer)?;
        let (red, blue) = s.split_once(':').ok_or_else(|| {
            serde::de::Error::custom(format!("expected \"<red>:<blue>\" hex masks, got {s:?}"))
        })?;
        let parse = |part: &str, side: &str| {
            u64::from_str_radix(part, 16).map_err(|e| {
                serde::de::Error::custom(format!("invalid {side} mask: {part} ({e})"))
            })
        };
        let red = parse(red, "red")?;
        let blue = parse(blue, "blue")?;
        if red & blue != 0 {
            return Err(serde::de::Error::custom(format!(
                "red and blue masks overlap: {:016x}",
                red & blue
            )));
        }
        Ok(Self { red, blue })
    }
}

impl Default for Board {
    fn default() -> Self {
        Self::INITIAL
    }
}

impl Board {
    pub const EMPTY: Self = Self { red: 0, blue: 0 };

    /// Starting position: Red on (0,0) and (7,7), Blue on (0,7) and (7,0).
    pub const INITIAL: Self = Self {
        red: (1 << 0) | (1 << 63),
        blue: (1 << 7) | (1 << 56),
    };

    const ALL_CELLS: u64 = u64::MAX;

    #[inline]
    #[must_use]
    pub const fn pieces(&self, player: Player) -> u64 {
        match player {
            Player::Red => self.red,
            Player::Blue => self.blue,
        }
    }

    #[inline]
    #[must_use]
    pub const fn empty_mask(&self) -> u64 {
        Self::ALL_CELLS & !(self.red | self.blue)
    }

    #[inline]
    #[must_use]
    pub const fn count(&self, player: Player) -> u32 {
        self.pieces(player).count_ones()
    }

    #[inline]
    #[must_use]
    pub const fn empty_count(&self) -> u32 {
        self.empty_mask().count_ones()
    }

    #[inline]
    #[must_use]
    pub const fn is_empty(&self, square: Square) -> bool {
        self.empty_mask() & square.bit() != 0
    }

    #[must_use]
    pub const fn cell(&self, square: Square) -> Option<Player> {
        if self.red & square.bit() != 0 {
            Some(Player::Red)
        } else if self.blue & square.bit() != 0 {
            Some(Player::Blue)
        } else {
            None
        }
    }

    pub fn set_cell(&mut self, square: Square, cell: Option<Player>) {
        self.red &= !square.bit();
        self.blue &= !square.bit();
        match cell {
            Some(Player::Red) => self.red |= square.bit(),
            Some(Player::Blue) => self.blue |= square.bit(),
            None => {}
        }
    }

    #[inline]
    #[must_use]
    pub const fn neighbor_mask(square: Square) -> u64 {
        NEIGHBOR_MASKS[square.index()]
    }

    /// Number of opponent pieces a `player` piece landing on `to` would flip.
    #[inline]
    #[must_use]
    pub const fn flips_for(&self, to: Square, player: Player) -> u32 {
        (Self::neighbor_mask(to) & self.pieces(player.opponent())).count_ones()
    }

    /// Turns every opponent piece around `to` into a `player` piece and returns the count.
    pub(crate) fn flip_around(&mut self, to: Square, player: Player) -> u32 {
        let captured = Self::neighbor_mask(to) & self.pieces(player.opponent());
        match player {
            Player::Red => {
                self.blue &= !captured;
                self.red |= captured;
            }
            Player::Blue => {
                self.red &= !captured;
                self.blue |= captured;
            }
        }
        captured.count_ones()
    }

    pub fn squares_of(&self, player: Player) -> impl Iterator<Item = Square> {
        Square::iter_mask(self.pieces(player))
    }

    /// Board mirrored through its centre, so `(r, c)` moves to `(7 - r, 7 - c)`.
    #[must_use]
    pub const fn rotated_180(&self) -> Self {
        Self {
            red: self.red.reverse_bits(),
            blue: self.blue.reverse_bits(),
        }
    }

    /// Cell codes (`'R'`, `'B'`, `'.'`) in row-major order.
    pub fn cell_symbols(&self) -> impl Iterator<Item = char> + '_ {
        Square::all().map(|square| self.cell(square).map_or(EMPTY_SYMBOL, Player::symbol))
    }

    /// 32-bit FNV-1a hash of the 64 cell codes in row-major order.
    ///
    /// Stable across processes and platforms. Side to move is not part of the hash, so
    /// the same arrangement reached with a different mover shares an entry.
    #[must_use]
    pub fn position_hash(&self) -> u32 {
        self.cell_symbols().fold(FNV_OFFSET_BASIS, |hash, symbol| {
            // cell symbols are all ASCII
            let byte = u32::from(symbol as u8);
            (hash ^ byte).wrapping_mul(FNV_PRIME)
        })
    }
}

impl fmt::Display for Board {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (i, symbol) in self.cell_symbols().enumerate() {
            if i > 0 && i % Square::SIDE == 0 {
                writeln!(f)?;
            }
            write!(f, "{symbol}")?;
        }
        Ok(())
    }
}

impl FromStr for Board {
    type Err = ParseBoardError;

    /// Parses eight rows of `R`, `B` and `.`; surrounding whitespace is ignored.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let rows: Vec<&str> = s
            .lines()
            .map(str::trim)
            .filter(|line| !line.is_empty())
            .collect();
        if rows.len() != Square::SIDE {
            return Err(ParseBoardError::RowCount(rows.len()));
        }

        let mut board = Self::EMPTY;
        for (row, line) in rows.iter().enumerate() {
            let len = line.chars().count();
            if len != Square::SIDE {
                return Err(ParseBoardError::RowLength { row, len });
            }
            for (col, ch) in line.chars().enumerate() {
                let cell = match ch {
                    'R' => Some(Player::Red),
                    'B' => Some(Player::Blue),
                    EMPTY_SYMBOL => None,
                    other => return Err(ParseBoardError::InvalidCell(other)),
                };
                if let Some(square) = Square::new(row, col) {
                    board.set_cell(square, cell);
                }
            }
        }
        Ok(board)
    }
}
