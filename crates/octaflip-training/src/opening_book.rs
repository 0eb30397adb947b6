//! Opening book built from decisive self-play games.
//!
//! Positions are keyed by [`Board::position_hash`](octaflip_engine::Board::position_hash)
//! alone. There is no collision chaining: two positions with the same 32-bit hash share an
//! entry, and the side to move is not part of the key.
//!
//! # Move Weights
//!
//! For each of the first plies of a game, the move played gains
//!
//! ```text
//! weight = |result| × (3 - 0.1 × ply)   if the eventual winner played it
//!          1                            otherwise
//! ```
//!
//! so moves that led to wins early in the game dominate the lookup order.

use std::{
    collections::BTreeMap,
    io::{self, Write},
};

use arrayvec::ArrayVec;
use octaflip_engine::{GameResult, GameState, HistoryEntry, IllegalMoveError, Move, Player};
use serde::{Deserialize, Serialize};

/// Moves stored per exported record.
pub const RECORD_MOVES: usize = 5;

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct BookMove {
    pub mv: Move,
    pub weight: f32,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct BookEntry {
    /// Encounter order.
    moves: Vec<BookMove>,
    occurrences: u32,
}

impl BookEntry {
    #[must_use]
    pub fn moves(&self) -> &[BookMove] {
        &self.moves
    }

    #[must_use]
    pub fn occurrences(&self) -> u32 {
        self.occurrences
    }

    fn record(&mut self, mv: Move, weight: f32) {
        self.occurrences += 1;
        match self.moves.iter_mut().find(|m| m.mv == mv) {
            Some(existing) => existing.weight += weight,
            None => self.moves.push(BookMove { mv, weight }),
        }
    }

    /// Moves by descending weight; equal weights keep encounter order.
    fn ranked(&self) -> Vec<BookMove> {
        let mut moves = self.moves.clone();
        moves.sort_by(|a, b| b.weight.total_cmp(&a.weight));
        moves
    }
}

/// One fixed-layout row of the exported table.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BookRecord {
    pub hash: u32,
    pub occurrences: u32,
    /// `(r1, c1, r2, c2)` per move, strongest first.
    pub moves: ArrayVec<[u8; 4], RECORD_MOVES>,
    /// `min(255, weight × 255 / max_weight)` per move.
    pub scores: ArrayVec<u8, RECORD_MOVES>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct OpeningBook {
    entries: BTreeMap<u32, BookEntry>,
}

impl OpeningBook {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    #[must_use]
    pub fn entry(&self, hash: u32) -> Option<&BookEntry> {
        self.entries.get(&hash)
    }

    /// Replays `history` from the initial position and records its first `max_plies` moves.
    ///
    /// Nothing is recorded if the history does not replay.
    #[expect(clippy::cast_precision_loss)]
    pub fn add_game(
        &mut self,
        history: &[HistoryEntry],
        result: GameResult,
        max_plies: usize,
    ) -> Result<(), IllegalMoveError> {
        let magnitude = f32::from(result.score_for(Player::Red).unsigned_abs());
        let winner = result.winner();
        let mut state = GameState::new();
        let mut records = Vec::with_capacity(max_plies.min(history.len()));
        for (ply, entry) in history.iter().take(max_plies).enumerate() {
            if entry.player != state.to_move() {
                state.apply_move(None)?;
            }
            let hash = state.position_hash();
            let weight = if winner == Some(entry.player) {
                magnitude * (3.0 - 0.1 * ply as f32)
            } else {
                1.0
            };
            state.apply_move(Some(entry.mv))?;
            records.push((hash, entry.mv, weight));
        }
        for (hash, mv, weight) in records {
            self.entries.entry(hash).or_default().record(mv, weight);
        }
        Ok(())
    }

    /// Keeps positions seen at least `min_occurrences` times, each with its top
    /// `max_moves` moves.
    #[must_use]
    pub fn compress(&self, min_occurrences: u32, max_moves: usize) -> Self {
        let entries = self
            .entries
            .iter()
            .filter(|(_, entry)| entry.occurrences >= min_occurrences)
            .map(|(&hash, entry)| {
                let mut moves = entry.ranked();
                moves.truncate(max_moves);
                let entry = BookEntry {
                    moves,
                    occurrences: entry.occurrences,
                };
                (hash, entry)
            })
            .collect();
        Self { entries }
    }

    /// Up to `top_n` moves for `hash`, strongest first.
    #[must_use]
    pub fn lookup(&self, hash: u32, top_n: usize) -> Vec<BookMove> {
        let Some(entry) = self.entries.get(&hash) else {
            return vec![];
        };
        let mut moves = entry.ranked();
        moves.truncate(top_n);
        moves
    }

    /// The most frequent positions, at most `max_entries`, as fixed-layout records.
    #[expect(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
    #[must_use]
    pub fn export_table(&self, min_occurrences: u32, max_entries: usize) -> Vec<BookRecord> {
        let mut candidates: Vec<_> = self
            .entries
            .iter()
            .filter(|(_, entry)| entry.occurrences >= min_occurrences && !entry.moves.is_empty())
            .collect();
        candidates.sort_by_key(|(_, entry)| std::cmp::Reverse(entry.occurrences));
        candidates.truncate(max_entries);

        candidates
            .into_iter()
            .map(|(&hash, entry)| {
                let ranked = entry.ranked();
                let top = &ranked[..ranked.len().min(RECORD_MOVES)];
                let max_weight = top.first().map_or(0.0, |m| m.weight);
                BookRecord {
                    hash,
                    occurrences: entry.occurrences,
                    moves: top.iter().map(|m| m.mv.coords()).collect(),
                    scores: top
                        .iter()
                        .map(|m| {
                            if max_weight > 0.0 {
                                (m.weight * 255.0 / max_weight).clamp(0.0, 255.0) as u8
                            } else {
                                0
                            }
                        })
                        .collect(),
                }
            })
            .collect()
    }
}

/// Writes `records` as a C header with an `opening_book` table and `find_opening_move`.
pub fn write_c_header<W>(records: &[BookRecord], w: &mut W) -> io::Result<()>
where
    W: Write + ?Sized,
{
    writeln!(w, "// OctaFlip opening book")?;
    writeln!(w, "#ifndef OPENING_BOOK_DATA_H")?;
    writeln!(w, "#define OPENING_BOOK_DATA_H")?;
    writeln!(w)?;
    writeln!(w, "#include <stddef.h>")?;
    writeln!(w, "#include <stdint.h>")?;
    writeln!(w)?;
    writeln!(w, "#define HAS_OPENING_BOOK")?;
    writeln!(w)?;
    writeln!(w, "typedef struct {{")?;
    writeln!(w, "    uint32_t hash;")?;
    writeln!(w, "    uint8_t moves[{RECORD_MOVES}][4];")?;
    writeln!(w, "    uint8_t scores[{RECORD_MOVES}];")?;
    writeln!(w, "    uint8_t count;")?;
    writeln!(w, "}} OpeningEntry;")?;
    writeln!(w)?;
    writeln!(w, "#define OPENING_BOOK_SIZE {}", records.len())?;
    writeln!(w)?;
    // C forbids empty initializers before C23
    let size = records.len().max(1);
    writeln!(w, "static const OpeningEntry opening_book[{size}] = {{")?;
    for (i, record) in records.iter().enumerate() {
        let moves = (0..RECORD_MOVES)
            .map(|j| {
                let [r1, c1, r2, c2] = record.moves.get(j).copied().unwrap_or_default();
                format!("{{{r1},{c1},{r2},{c2}}}")
            })
            .collect::<Vec<_>>()
            .join(", ");
        let scores = (0..RECORD_MOVES)
            .map(|j| record.scores.get(j).copied().unwrap_or(0).to_string())
            .collect::<Vec<_>>()
            .join(", ");
        writeln!(w, "    {{ // entry {i}, seen {} times", record.occurrences)?;
        writeln!(w, "        .hash = 0x{:08X}U,", record.hash)?;
        writeln!(w, "        .moves = {{{moves}}},")?;
        writeln!(w, "        .scores = {{{scores}}},")?;
        writeln!(w, "        .count = {},", record.moves.len())?;
        writeln!(w, "    }},")?;
    }
    if records.is_empty() {
        writeln!(w, "    {{ 0 }},")?;
    }
    writeln!(w, "}};")?;
    writeln!(w)?;
    writeln!(
        w,
        "static inline const OpeningEntry* find_opening_move(uint32_t hash) {{"
    )?;
    writeln!(w, "    for (int i = 0; i < OPENING_BOOK_SIZE; i++) {{")?;
    writeln!(w, "        if (opening_book[i].hash == hash) {{")?;
    writeln!(w, "            return &opening_book[i];")?;
    writeln!(w, "        }}")?;
    writeln!(w, "    }}")?;
    writeln!(w, "    return NULL;")?;
    writeln!(w, "}}")?;
    writeln!(w)?;
    writeln!(w, "#endif // OPENING_BOOK_DATA_H")?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use octaflip_engine::{Board, Square};

    use super::*;

    fn sq(row: usize, col: usize) -> Square {
        Square::new(row, col).unwrap()
    }

    fn clone_move(from: (usize, usize), to: (usize, usize)) -> Move {
        Move::Clone {
            from: sq(from.0, from.1),
            to: sq(to.0, to.1),
        }
    }

    /// A short legal opening: Red, Blue, Red.
    fn opening(first: Move) -> Vec<HistoryEntry> {
        let mut state = GameState::new();
        for mv in [first, clone_move((0, 7), (1, 6)), clone_move((7, 7), (6, 6))] {
            state.apply_move(Some(mv)).unwrap();
        }
        state.history().to_vec()
    }

    fn initial_hash() -> u32 {
        Board::INITIAL.position_hash()
    }

    mod recording {
        use super::*;

        #[test]
        fn test_winner_moves_weigh_more() {
            let mut book = OpeningBook::new();
            let history = opening(clone_move((0, 0), (1, 1)));
            book.add_game(&history, GameResult::RedWins, 20).unwrap();

            let entry = book.entry(initial_hash()).unwrap();
            assert_eq!(entry.occurrences(), 1);
            assert_eq!(entry.moves()[0].weight, 3.0);

            let mut state = GameState::new();
            state.apply_move(Some(history[0].mv)).unwrap();
            let blue_entry = book.entry(state.position_hash()).unwrap();
            assert_eq!(blue_entry.moves()[0].weight, 1.0);

            state.apply_move(Some(history[1].mv)).unwrap();
            let red_entry = book.entry(state.position_hash()).unwrap();
            assert!((red_entry.moves()[0].weight - 2.8).abs() < 1e-6);
        }

        #[test]
        fn test_max_plies_limits_recording() {
            let mut book = OpeningBook::new();
            book.add_game(&opening(clone_move((0, 0), (1, 1))), GameResult::BlueWins, 1)
                .unwrap();
            assert_eq!(book.len(), 1);
        }

        #[test]
        fn test_broken_history_records_nothing() {
            let mut history = opening(clone_move((0, 0), (1, 1)));
            history[2].mv = clone_move((0, 0), (1, 1));
            let mut book = OpeningBook::new();
            assert!(book.add_game(&history, GameResult::RedWins, 20).is_err());
            assert!(book.is_empty());
        }
    }

    mod queries {
        use super::*;

        fn book_with(counts: &[(Move, usize)], result: GameResult) -> OpeningBook {
            let mut book = OpeningBook::new();
            for &(mv, count) in counts {
                for _ in 0..count {
                    book.add_game(&opening(mv), result, 1).unwrap();
                }
            }
            book
        }

        #[test]
        fn test_lookup_orders_by_weight_then_encounter() {
            let a = clone_move((0, 0), (0, 1));
            let b = clone_move((0, 0), (1, 0));
            let c = clone_move((0, 0), (1, 1));
            let book = book_with(&[(a, 1), (b, 2), (c, 1)], GameResult::Draw);
            let moves: Vec<Move> = book.lookup(initial_hash(), 3).iter().map(|m| m.mv).collect();
            assert_eq!(moves, [b, a, c]);
            assert_eq!(book.lookup(initial_hash(), 1).len(), 1);
            assert!(book.lookup(initial_hash() ^ 1, 3).is_empty());
        }

        #[test]
        fn test_compress_threshold_and_move_limit() {
            let moves: Vec<Move> = GameState::new()
                .legal_moves()
                .into_iter()
                .filter(|mv| mv.source() == sq(0, 0))
                .collect();
            assert_eq!(moves.len(), 6);
            let counts: Vec<(Move, usize)> = moves.iter().map(|&mv| (mv, 1)).collect();
            let mut book = book_with(&counts, GameResult::RedWins);
            book.add_game(&opening(moves[0]), GameResult::BlueWins, 3).unwrap();

            let compressed = book.compress(5, 5);
            let entry = compressed.entry(initial_hash()).unwrap();
            assert_eq!(entry.occurrences(), 7);
            assert_eq!(entry.moves().len(), 5);
            // first move has 3 + 1, the rest 3 each
            assert_eq!(entry.moves()[0].mv, moves[0]);
            assert_eq!(entry.moves()[1].mv, moves[1]);
            assert!(compressed.len() < book.len());
            assert!(book.compress(8, 5).is_empty());
        }

        #[test]
        fn test_export_table_scores() {
            let a = clone_move((0, 0), (0, 1));
            let b = clone_move((0, 0), (1, 0));
            let book = book_with(&[(a, 3), (b, 1)], GameResult::RedWins);
            let table = book.export_table(3, 10);
            assert_eq!(table.len(), 1);
            let record = &table[0];
            assert_eq!(record.hash, initial_hash());
            assert_eq!(record.occurrences, 4);
            assert_eq!(record.moves.as_slice(), [[0, 0, 0, 1], [0, 0, 1, 0]]);
            assert_eq!(record.scores.as_slice(), [255, 85]);
            assert!(book.export_table(5, 10).is_empty());
            assert!(book.export_table(3, 0).is_empty());
        }

        #[test]
        fn test_header_contents() {
            let book = book_with(&[(clone_move((0, 0), (0, 1)), 3)], GameResult::RedWins);
            let mut out = Vec::new();
            write_c_header(&book.export_table(3, 10), &mut out).unwrap();
            let header = String::from_utf8(out).unwrap();
            assert!(header.contains("#define OPENING_BOOK_SIZE 1"));
            assert!(header.contains(&format!(".hash = 0x{:08X}U,", initial_hash())));
            assert!(header.contains(".moves = {{0,0,0,1}, {0,0,0,0}, {0,0,0,0}, {0,0,0,0}, {0,0,0,0}},"));
            assert!(header.contains(".scores = {255, 0, 0, 0, 0},"));
            assert!(header.contains("find_opening_move(uint32_t hash)"));

            let mut out = Vec::new();
            write_c_header(&[], &mut out).unwrap();
            let header = String::from_utf8(out).unwrap();
            assert!(header.contains("#define OPENING_BOOK_SIZE 0"));
        }

        #[test]
        fn test_serde_round_trip() {
            let book = book_with(&[(clone_move((0, 0), (0, 1)), 2)], GameResult::Draw);
            let json = serde_json::to_string(&book).unwrap();
            let restored: OpeningBook = serde_json::from_str(&json).unwrap();
            assert_eq!(restored, book);
        }
    }
}
