//! Move selection for the side to move.
//!
//! A [`Policy`] looks at a [`GameState`] and returns the move it wants to play, or `None`
//! to pass. Every policy here is deterministic given the state and the random number
//! generator's state, and breaks ties in favour of the earliest move in
//! [`GameState::legal_moves`] order.
//!
//! - [`RandomPolicy`] - Uniform over legal moves
//! - [`GreedyPolicy`] - Most flips right now
//! - [`PositionalPolicy`] - Square table plus flips
//! - [`DefensivePolicy`] - Fewest own pieces left capturable
//! - [`ShallowMinimaxPolicy`] - Best worst case over the strongest replies
//! - [`NetworkPolicy`] - Value network over every reachable position
//!
//! The first five are the fixed opponents used to measure training progress, selected by
//! [`BaselineKind`].

use std::fmt;

use octaflip_engine::{GameState, Move};
use rand::RngCore;
use serde::{Deserialize, Serialize};

pub use self::{baseline::*, network_policy::*};

mod baseline;
mod network_policy;

pub trait Policy: fmt::Debug + Send + Sync {
    /// Chooses a move for `state.to_move()`, or `None` when there is nothing to play.
    ///
    /// Only policies that need randomness draw from `rng`.
    fn choose_move(&self, state: &GameState, rng: &mut dyn RngCore) -> Option<Move>;
}

/// Fixed opponents, by name.
#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    Hash,
    Serialize,
    Deserialize,
    derive_more::Display,
    derive_more::FromStr,
)]
#[serde(rename_all = "snake_case")]
pub enum BaselineKind {
    #[display("random")]
    Random,
    #[display("greedy")]
    Greedy,
    #[display("positional")]
    Positional,
    #[display("defensive")]
    Defensive,
    #[display("minimax")]
    Minimax,
}

impl BaselineKind {
    pub const ALL: [Self; 5] = [
        Self::Random,
        Self::Greedy,
        Self::Positional,
        Self::Defensive,
        Self::Minimax,
    ];

    #[must_use]
    pub fn policy(self) -> Box<dyn Policy> {
        match self {
            Self::Random => Box::new(RandomPolicy),
            Self::Greedy => Box::new(GreedyPolicy),
            Self::Positional => Box::new(PositionalPolicy),
            Self::Defensive => Box::new(DefensivePolicy),
            Self::Minimax => Box::new(ShallowMinimaxPolicy::default()),
        }
    }
}

/// Move with the largest key; the earliest move wins ties.
fn argmax_by_key<K, F>(moves: &[Move], mut key: F) -> Option<Move>
where
    K: PartialOrd,
    F: FnMut(Move) -> K,
{
    let mut best: Option<(Move, K)> = None;
    for &mv in moves {
        let k = key(mv);
        if best.as_ref().is_none_or(|(_, best_key)| k > *best_key) {
            best = Some((mv, k));
        }
    }
    best.map(|(mv, _)| mv)
}

/// State after `mv`, without the move record, and the number of flipped pieces.
fn play_out(state: &GameState, mv: Move) -> (GameState, u32) {
    let mut next = GameState::from_board(*state.board(), state.to_move());
    let flips = next
        .apply_move(Some(mv))
        .expect("moves come from legal_moves");
    (next, flips)
}
