use std::cmp::Reverse;

use octaflip_engine::{Board, GameState, Move, Player, Square};
use rand::{RngCore, seq::IndexedRandom as _};

use super::{Policy, argmax_by_key, play_out};

/// Square values: corners high, cells next to corners low.
pub const POSITION_WEIGHTS: [[i32; Square::SIDE]; Square::SIDE] = [
    [30, -10, 10, 5, 5, 10, -10, 30],
    [-10, -20, -5, -5, -5, -5, -20, -10],
    [10, -5, 5, 3, 3, 5, -5, 10],
    [5, -5, 3, 1, 1, 3, -5, 5],
    [5, -5, 3, 1, 1, 3, -5, 5],
    [10, -5, 5, 3, 3, 5, -5, 10],
    [-10, -20, -5, -5, -5, -5, -20, -10],
    [30, -10, 10, 5, 5, 10, -10, 30],
];

const FLIP_BONUS: i32 = 10;
const MATERIAL_WEIGHT: i32 = 10;
const DECISIVE_SCORE: i32 = 100_000;

#[must_use]
pub fn position_weight(square: Square) -> i32 {
    POSITION_WEIGHTS[square.row()][square.col()]
}

fn flips(state: &GameState, mv: Move) -> u32 {
    state.board().flips_for(mv.target(), state.to_move())
}

#[derive(Debug, Clone, Copy, Default)]
pub struct RandomPolicy;

impl Policy for RandomPolicy {
    fn choose_move(&self, state: &GameState, rng: &mut dyn RngCore) -> Option<Move> {
        state.legal_moves().choose(rng).copied()
    }
}

#[derive(Debug, Clone, Copy, Default)]
pub struct GreedyPolicy;

impl Policy for GreedyPolicy {
    fn choose_move(&self, state: &GameState, _rng: &mut dyn RngCore) -> Option<Move> {
        argmax_by_key(&state.legal_moves(), |mv| flips(state, mv))
    }
}

#[derive(Debug, Clone, Copy, Default)]
pub struct PositionalPolicy;

impl Policy for PositionalPolicy {
    #[expect(clippy::cast_possible_wrap)]
    fn choose_move(&self, state: &GameState, _rng: &mut dyn RngCore) -> Option<Move> {
        argmax_by_key(&state.legal_moves(), |mv| {
            position_weight(mv.target()) + FLIP_BONUS * flips(state, mv) as i32
        })
    }
}

/// Keeps as few own pieces as possible next to squares the opponent can land on.
#[derive(Debug, Clone, Copy, Default)]
pub struct DefensivePolicy;

impl Policy for DefensivePolicy {
    fn choose_move(&self, state: &GameState, _rng: &mut dyn RngCore) -> Option<Move> {
        let me = state.to_move();
        argmax_by_key(&state.legal_moves(), |mv| {
            let (next, flips) = play_out(state, mv);
            (Reverse(next.exposed_pieces(me)), flips)
        })
    }
}

/// One-ply lookahead over the strongest opponent replies.
#[derive(Debug, Clone, Copy)]
pub struct ShallowMinimaxPolicy {
    pub max_replies: usize,
}

impl Default for ShallowMinimaxPolicy {
    fn default() -> Self {
        Self { max_replies: 8 }
    }
}

impl ShallowMinimaxPolicy {
    /// `10 * material + positional` from `me`'s side, or a decisive score once the game
    /// is over.
    #[expect(clippy::cast_possible_wrap)]
    #[must_use]
    pub fn evaluate(state: &GameState, me: Player) -> i32 {
        if state.is_terminal() {
            return DECISIVE_SCORE * i32::from(state.result().score_for(me));
        }
        let board = state.board();
        let material = board.count(me) as i32 - board.count(me.opponent()) as i32;
        MATERIAL_WEIGHT * material + positional_balance(board, me)
    }

    fn worst_case(&self, state: &GameState, me: Player) -> i32 {
        if state.is_terminal() {
            return Self::evaluate(state, me);
        }
        let mut replies = state.legal_moves();
        if replies.is_empty() {
            return Self::evaluate(state, me);
        }
        // stable: equal-flip replies keep generation order
        replies.sort_by_key(|&mv| Reverse(flips(state, mv)));
        replies
            .iter()
            .take(self.max_replies)
            .map(|&reply| Self::evaluate(&play_out(state, reply).0, me))
            .min()
            .unwrap_or_else(|| Self::evaluate(state, me))
    }
}

impl Policy for ShallowMinimaxPolicy {
    fn choose_move(&self, state: &GameState, _rng: &mut dyn RngCore) -> Option<Move> {
        let me = state.to_move();
        argmax_by_key(&state.legal_moves(), |mv| {
            self.worst_case(&play_out(state, mv).0, me)
        })
    }
}

fn positional_balance(board: &Board, me: Player) -> i32 {
    let sum = |player: Player| board.squares_of(player).map(position_weight).sum::<i32>();
    sum(me) - sum(me.opponent())
}

#[cfg(test)]
mod tests {
    use rand::SeedableRng as _;
    use rand_pcg::Pcg32;

    use super::*;

    fn sq(row: usize, col: usize) -> Square {
        Square::new(row, col).unwrap()
    }

    fn state(rows: &str, to_move: Player) -> GameState {
        GameState::from_board(rows.parse().unwrap(), to_move)
    }

    const CLUSTER: &str = "
        R.......
        ..B.....
        .BB.....
        ........
        ........
        ........
        ........
        ........";

    fn rng() -> Pcg32 {
        Pcg32::seed_from_u64(7)
    }

    #[test]
    fn test_policies_pass_without_moves() {
        let blocked = state(
            "RRRRRRRR\nRRRRRRRR\nRRRRRRRR\nRRRRRRRR\nBBBBBBBB\nBBBBBBBB\nBBBBBBBB\nBBBBBBB.",
            Player::Red,
        );
        assert!(blocked.legal_moves().is_empty());
        for kind in super::super::BaselineKind::ALL {
            assert_eq!(kind.policy().choose_move(&blocked, &mut rng()), None, "{kind}");
        }
    }

    #[test]
    fn test_random_is_seed_deterministic() {
        let state = GameState::new();
        let a = RandomPolicy.choose_move(&state, &mut Pcg32::seed_from_u64(3));
        let b = RandomPolicy.choose_move(&state, &mut Pcg32::seed_from_u64(3));
        assert_eq!(a, b);
        assert!(state.legal_moves().contains(&a.unwrap()));
    }

    #[test]
    fn test_greedy_takes_most_flips() {
        let state = state(CLUSTER, Player::Red);
        let mv = GreedyPolicy.choose_move(&state, &mut rng()).unwrap();
        assert_eq!(mv, Move::Clone { from: sq(0, 0), to: sq(1, 1) });
    }

    #[test]
    fn test_positional_prefers_edge_squares() {
        let state = GameState::new();
        let mv = PositionalPolicy.choose_move(&state, &mut rng()).unwrap();
        assert_eq!(mv, Move::Jump { from: sq(0, 0), to: sq(2, 0) });
    }

    #[test]
    fn test_defensive_minimizes_exposure() {
        let mut game = GameState::new();
        let mut rng = rng();
        for _ in 0..12 {
            let me = game.to_move();
            let moves = game.legal_moves();
            let Some(chosen) = DefensivePolicy.choose_move(&game, &mut rng) else {
                assert!(moves.is_empty());
                game.apply_move(None).unwrap();
                continue;
            };
            let outcome = |mv| {
                let (next, flips) = play_out(&game, mv);
                (next.exposed_pieces(me), flips)
            };
            let (exposed, flips) = outcome(chosen);
            for &mv in &moves {
                let (other_exposed, other_flips) = outcome(mv);
                assert!(exposed <= other_exposed);
                if other_exposed == exposed {
                    assert!(flips >= other_flips);
                }
            }
            game.apply_move(RandomPolicy.choose_move(&game, &mut rng)).unwrap();
        }
    }

    #[test]
    fn test_minimax_takes_immediate_win() {
        let state = state(
            "R.......\n.B......\n........\n........\n........\n........\n........\n........",
            Player::Red,
        );
        let mv = ShallowMinimaxPolicy::default()
            .choose_move(&state, &mut rng())
            .unwrap();
        assert_eq!(mv, Move::Clone { from: sq(0, 0), to: sq(0, 1) });
    }

    #[test]
    fn test_minimax_evaluation() {
        let state = state(CLUSTER, Player::Red);
        // material 1 - 3, positional 30 - (-5 - 5 + 5)
        assert_eq!(ShallowMinimaxPolicy::evaluate(&state, Player::Red), -20 + 35);
        assert_eq!(ShallowMinimaxPolicy::evaluate(&state, Player::Blue), 20 - 35);
    }

    #[test]
    fn test_position_weight_is_symmetric() {
        for square in Square::all() {
            assert_eq!(position_weight(square), position_weight(square.rotated_180()));
        }
    }
}
