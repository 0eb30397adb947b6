use std::sync::Arc;

use octaflip_engine::{GameState, Move};
use rand::RngCore;

use super::{Policy, argmax_by_key, play_out};
use crate::{network::Network, position_encoder};

/// Scores every reachable position with a value network, from the mover's side.
///
/// All legal moves are evaluated in a single inference batch. The network values a
/// position for the side to move, which after the move is the opponent, so the mover's
/// value is its negation. Each flip adds `capture_bonus` on top.
#[derive(Debug, Clone)]
pub struct NetworkPolicy {
    network: Arc<Network>,
    capture_bonus: f32,
}

impl NetworkPolicy {
    pub const DEFAULT_CAPTURE_BONUS: f32 = 10.0;

    #[must_use]
    pub fn new(network: Arc<Network>) -> Self {
        Self {
            network,
            capture_bonus: Self::DEFAULT_CAPTURE_BONUS,
        }
    }

    #[must_use]
    pub fn with_capture_bonus(mut self, capture_bonus: f32) -> Self {
        self.capture_bonus = capture_bonus;
        self
    }

    #[must_use]
    pub fn network(&self) -> &Network {
        &self.network
    }

    #[must_use]
    pub fn capture_bonus(&self) -> f32 {
        self.capture_bonus
    }

    /// Network value plus capture bonus for each move, in `moves` order.
    #[expect(clippy::cast_precision_loss)]
    #[must_use]
    pub fn score_moves(&self, state: &GameState, moves: &[Move]) -> Vec<f32> {
        let replier = state.to_move().opponent();
        let outcomes: Vec<_> = moves.iter().map(|&mv| play_out(state, mv)).collect();
        let batch = position_encoder::encode_batch(
            outcomes.iter().map(|(next, _)| (next.board(), replier)),
        );
        let values = self.network.forward_inference(batch).into_predictions();
        values
            .into_iter()
            .zip(&outcomes)
            .map(|(value, (_, flips))| -value + self.capture_bonus * *flips as f32)
            .collect()
    }
}

impl Policy for NetworkPolicy {
    fn choose_move(&self, state: &GameState, _rng: &mut dyn RngCore) -> Option<Move> {
        let moves = state.legal_moves();
        if moves.is_empty() {
            return None;
        }
        let scores = self.score_moves(state, &moves);
        let mut scores = scores.into_iter();
        argmax_by_key(&moves, |_| {
            // NaN never wins
            scores
                .next()
                .filter(|s| !s.is_nan())
                .unwrap_or(f32::NEG_INFINITY)
        })
    }
}
