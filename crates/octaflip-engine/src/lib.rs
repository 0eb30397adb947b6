//! Rules engine for OctaFlip, an 8×8 capture-and-placement game.
//!
//! Two players, Red and Blue, alternate placing pieces. A move either *clones* a piece onto
//! an adjacent empty cell or *jumps* a piece two cells away, vacating its source. Wherever
//! the piece lands, every opponent piece among the eight neighbours of the destination is
//! flipped to the mover's colour.
//!
//! - [`Board`] - Two 64-bit occupancy masks
//! - [`Move`] - Clone or jump between two [`Square`]s
//! - [`GameState`] - Board, side to move, history and pass counter

pub use self::{core::*, engine::*};

pub mod core;
pub mod engine;

#[derive(Debug, Clone, PartialEq, Eq, derive_more::Display, derive_more::Error)]
pub enum IllegalMoveError {
    #[display("source square {square} does not hold a {player} piece")]
    SourceNotOwned { square: Square, player: Player },
    #[display("destination square {square} is occupied")]
    DestinationOccupied { square: Square },
    #[display("{from} -> {to} is neither a clone nor a jump")]
    InvalidGeometry { from: Square, to: Square },
}

#[derive(Debug, Clone, PartialEq, Eq, derive_more::Display, derive_more::Error)]
pub enum ParseBoardError {
    #[display("expected 8 rows, got {_0}")]
    RowCount(#[error(not(source))] usize),
    #[display("row {row} has {len} cells, expected 8")]
    RowLength { row: usize, len: usize },
    #[display("unexpected cell character {_0:?}")]
    InvalidCell(#[error(not(source))] char),
}
