use serde::{Deserialize, Serialize};

use crate::{
    IllegalMoveError,
    core::{board::Board, player::Player, square::Square},
};

use super::moves::{CLONE_OFFSETS, JUMP_OFFSETS, Move};

/// One non-pass move in the game record.
///
/// Passes are not recorded; [`GameState::replay`] re-inserts them wherever the same
/// player appears twice in a row.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct HistoryEntry {
    pub player: Player,
    pub mv: Move,
    pub flips: u32,
}

/// Final outcome, decided by piece count.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, derive_more::IsVariant,
)]
pub enum GameResult {
    RedWins,
    BlueWins,
    Draw,
}

impl GameResult {
    #[must_use]
    pub const fn winner(self) -> Option<Player> {
        match self {
            Self::RedWins => Some(Player::Red),
            Self::BlueWins => Some(Player::Blue),
            Self::Draw => None,
        }
    }

    /// `(red, blue)` scores: `(1, -1)`, `(-1, 1)` or `(0, 0)`.
    #[must_use]
    pub const fn scores(self) -> (i8, i8) {
        match self {
            Self::RedWins => (1, -1),
            Self::BlueWins => (-1, 1),
            Self::Draw => (0, 0),
        }
    }

    #[must_use]
    pub const fn score_for(self, player: Player) -> i8 {
        let (red, blue) = self.scores();
        match player {
            Player::Red => red,
            Player::Blue => blue,
        }
    }
}

/// Full game position: board, side to move, pass counter and move record.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GameState {
    board: Board,
    to_move: Player,
    history: Vec<HistoryEntry>,
    consecutive_passes: u8,
    ply: u32,
}

impl Default for GameState {
    fn default() -> Self {
        Self::new()
    }
}

impl GameState {
    /// Initial position with Red to move.
    #[must_use]
    pub fn new() -> Self {
        Self::from_board(Board::INITIAL, Player::Red)
    }

    /// Arbitrary position with an empty history.
    #[must_use]
    pub fn from_board(board: Board, to_move: Player) -> Self {
        Self {
            board,
            to_move,
            history: Vec::new(),
            consecutive_passes: 0,
            ply: 0,
        }
    }

    /// Rebuilds a game from the initial position and a recorded history.
    pub fn replay(history: &[HistoryEntry]) -> Result<Self, IllegalMoveError> {
        let mut state = Self::new();
        for entry in history {
            if entry.player != state.to_move {
                state.apply_move(None)?;
            }
            state.apply_move(Some(entry.mv))?;
        }
        Ok(state)
    }

    #[must_use]
    pub fn board(&self) -> &Board {
        &self.board
    }

    #[must_use]
    pub fn to_move(&self) -> Player {
        self.to_move
    }

    #[must_use]
    pub fn history(&self) -> &[HistoryEntry] {
        &self.history
    }

    #[must_use]
    pub fn consecutive_passes(&self) -> u8 {
        self.consecutive_passes
    }

    /// Number of turns taken so far, passes included.
    #[must_use]
    pub fn ply(&self) -> u32 {
        self.ply
    }

    #[must_use]
    pub fn position_hash(&self) -> u32 {
        self.board.position_hash()
    }

    /// Legal moves for the side to move.
    ///
    /// Sources are visited in ascending square order; for each source the clone targets
    /// come first, followed by the jump targets in [`JUMP_OFFSETS`] order.
    #[must_use]
    pub fn legal_moves(&self) -> Vec<Move> {
        let board = &self.board;
        let mut moves = Vec::new();
        for from in board.squares_of(self.to_move) {
            let targets = move |offsets: &'static [(i8, i8)]| {
                offsets
                    .iter()
                    .filter_map(move |&(dr, dc)| from.offset(dr, dc))
                    .filter(move |&to| board.is_empty(to))
            };
            moves.extend(targets(&CLONE_OFFSETS).map(|to| Move::Clone { from, to }));
            moves.extend(targets(&JUMP_OFFSETS).map(|to| Move::Jump { from, to }));
        }
        moves
    }

    #[must_use]
    pub fn has_legal_move(&self) -> bool {
        let player = self.to_move;
        self.board.squares_of(player).any(|from| {
            CLONE_OFFSETS
                .iter()
                .chain(&JUMP_OFFSETS)
                .filter_map(|&(dr, dc)| from.offset(dr, dc))
                .any(|to| self.board.is_empty(to))
        })
    }

    fn validate(&self, mv: Move) -> Result<(), IllegalMoveError> {
        let (from, to) = (mv.source(), mv.target());
        if self.board.cell(from) != Some(self.to_move) {
            return Err(IllegalMoveError::SourceNotOwned {
                square: from,
                player: self.to_move,
            });
        }
        if !self.board.is_empty(to) {
            return Err(IllegalMoveError::DestinationOccupied { square: to });
        }
        if Move::new(from, to) != Some(mv) {
            return Err(IllegalMoveError::InvalidGeometry { from, to });
        }
        Ok(())
    }

    /// Plays `mv` for the side to move, or passes when `mv` is `None`.
    ///
    /// Returns the number of flipped pieces (always 0 for a pass). An illegal move is
    /// rejected without touching the state.
    pub fn apply_move(&mut self, mv: Option<Move>) -> Result<u32, IllegalMoveError> {
        let player = self.to_move;
        let flips = match mv {
            None => {
                self.consecutive_passes = self.consecutive_passes.saturating_add(1);
                0
            }
            Some(mv) => {
                self.validate(mv)?;
                if mv.is_jump() {
                    self.board.set_cell(mv.source(), None);
                }
                self.board.set_cell(mv.target(), Some(player));
                let flips = self.board.flip_around(mv.target(), player);
                self.history.push(HistoryEntry { player, mv, flips });
                self.consecutive_passes = 0;
                flips
            }
        };
        self.ply += 1;
        self.to_move = player.opponent();
        Ok(flips)
    }

    /// Two passes in a row, a side without pieces, or no empty cell left.
    #[must_use]
    pub fn is_terminal(&self) -> bool {
        self.consecutive_passes >= 2
            || self.board.count(Player::Red) == 0
            || self.board.count(Player::Blue) == 0
            || self.board.empty_count() == 0
    }

    /// Outcome by piece count. Meaningful at any point, decisive once terminal.
    #[must_use]
    pub fn result(&self) -> GameResult {
        let red = self.board.count(Player::Red);
        let blue = self.board.count(Player::Blue);
        match red.cmp(&blue) {
            std::cmp::Ordering::Greater => GameResult::RedWins,
            std::cmp::Ordering::Less => GameResult::BlueWins,
            std::cmp::Ordering::Equal => GameResult::Draw,
        }
    }

    /// Empty squares `player` could land on with a single clone or jump.
    #[must_use]
    pub fn reachable_mask(&self, player: Player) -> u64 {
        let mut mask = 0;
        for from in self.board.squares_of(player) {
            for &(dr, dc) in CLONE_OFFSETS.iter().chain(&JUMP_OFFSETS) {
                if let Some(to) = from.offset(dr, dc) {
                    mask |= to.bit();
                }
            }
        }
        mask & self.board.empty_mask()
    }

    /// Number of `player` pieces the opponent could flip with a single landing.
    #[must_use]
    pub fn exposed_pieces(&self, player: Player) -> u32 {
        let landings = self.reachable_mask(player.opponent());
        let exposed = Square::iter_mask(landings)
            .fold(0, |acc, to| acc | Board::neighbor_mask(to));
        (exposed & self.board.pieces(player)).count_ones()
    }
}
