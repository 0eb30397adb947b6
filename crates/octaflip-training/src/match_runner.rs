//! Self-play games between two policies.
//!
//! A match is a pure task: it receives two serializable [`PolicySpec`]s and a seed, builds
//! live policies from them, plays one game, and returns owned training samples. Nothing
//! is shared with other matches, so any number can run on a thread pool.
//!
//! # Labels
//!
//! Every position is labelled from the side to move at that position:
//!
//! ```text
//! label(i) = clip(score_for(mover) × decay^(i / decay_interval) × output_scale × label_scale,
//!                 ±output_scale)
//! ```
//!
//! Labels shrink by `decay` every `decay_interval` plies. A draw labels every position 0.

use std::{
    any::Any,
    panic::{self, AssertUnwindSafe},
    sync::Arc,
};

use octaflip_engine::{Board, GameResult, GameState, HistoryEntry, IllegalMoveError, Player};
use octaflip_evaluator::{
    network::{Checkpoint, CheckpointError, Network},
    policy::{BaselineKind, NetworkPolicy, Policy, RandomPolicy},
};
use rand::SeedableRng as _;
use rand_pcg::Pcg32;
use serde::{Deserialize, Serialize};

use crate::config::MatchConfig;

/// Hard bound on the length of a self-play game.
pub const PLY_CAP: u32 = 60;

/// Serializable description of a player, rebuilt into a live [`Policy`] by each worker.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, derive_more::IsVariant)]
#[serde(rename_all = "snake_case")]
pub enum PolicySpec {
    Network(Checkpoint),
    Baseline(BaselineKind),
}

impl PolicySpec {
    pub fn build(&self) -> Result<Box<dyn Policy>, MatchError> {
        match self {
            Self::Network(checkpoint) => {
                let network = Network::from_checkpoint(checkpoint)?;
                Ok(Box::new(NetworkPolicy::new(Arc::new(network))))
            }
            Self::Baseline(kind) => Ok(kind.policy()),
        }
    }
}

#[derive(Debug, Clone, PartialEq, derive_more::Display, derive_more::Error, derive_more::From)]
pub enum MatchError {
    #[display("illegal move: {_0}")]
    IllegalMove(IllegalMoveError),
    #[display("invalid policy: {_0}")]
    InvalidPolicy(CheckpointError),
}

/// One labelled position.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct TrainingSample {
    pub board: Board,
    pub mover: Player,
    pub hash: u32,
    pub label: f32,
}

impl TrainingSample {
    /// The same position seen after a half-turn of the board.
    #[must_use]
    pub fn rotated_180(&self) -> Self {
        let board = self.board.rotated_180();
        Self {
            board,
            mover: self.mover,
            hash: board.position_hash(),
            label: self.label,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct MatchOutcome {
    pub samples: Vec<TrainingSample>,
    pub history: Vec<HistoryEntry>,
    pub result: GameResult,
    pub plies: u32,
}

/// Result of a match task; failures carry a description instead of aborting the batch.
#[derive(Debug, Clone, PartialEq, derive_more::IsVariant)]
pub enum TaskOutcome {
    Completed(MatchOutcome),
    Failed { reason: String },
}

/// Plays one game from the initial position with Red moving first.
pub fn play(
    red: &PolicySpec,
    blue: &PolicySpec,
    config: &MatchConfig,
    seed: u64,
) -> Result<MatchOutcome, MatchError> {
    let red = red.build()?;
    let blue = blue.build()?;
    play_policies(red.as_ref(), blue.as_ref(), config, seed)
}

/// Like [`play`], but with live policies.
pub fn play_policies(
    red: &dyn Policy,
    blue: &dyn Policy,
    config: &MatchConfig,
    seed: u64,
) -> Result<MatchOutcome, MatchError> {
    let mut rng = Pcg32::seed_from_u64(seed);
    let mut state = GameState::new();
    let mut positions = vec![];

    while !state.is_terminal() && state.ply() < config.ply_cap {
        let mover = state.to_move();
        positions.push((*state.board(), mover, state.position_hash()));
        let policy: &dyn Policy = if state.ply() < config.random_opening_plies {
            &RandomPolicy
        } else {
            match mover {
                Player::Red => red,
                Player::Blue => blue,
            }
        };
        let mv = policy.choose_move(&state, &mut rng);
        state.apply_move(mv)?;
    }

    let result = state.result();
    let samples = positions
        .into_iter()
        .enumerate()
        .map(|(i, (board, mover, hash))| TrainingSample {
            board,
            mover,
            hash,
            label: label(config, result, mover, i),
        })
        .collect();
    Ok(MatchOutcome {
        samples,
        history: state.history().to_vec(),
        result,
        plies: state.ply(),
    })
}

/// Runs [`play`], turning both errors and panics into [`TaskOutcome::Failed`].
#[must_use]
pub fn play_isolated(
    red: &PolicySpec,
    blue: &PolicySpec,
    config: &MatchConfig,
    seed: u64,
) -> TaskOutcome {
    isolate(|| play(red, blue, config, seed))
}

fn isolate<F>(f: F) -> TaskOutcome
where
    F: FnOnce() -> Result<MatchOutcome, MatchError>,
{
    match panic::catch_unwind(AssertUnwindSafe(f)) {
        Ok(Ok(outcome)) => TaskOutcome::Completed(outcome),
        Ok(Err(e)) => TaskOutcome::Failed {
            reason: e.to_string(),
        },
        Err(payload) => TaskOutcome::Failed {
            reason: format!("worker panicked: {}", panic_message(payload.as_ref())),
        },
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> &str {
    if let Some(s) = payload.downcast_ref::<&str>() {
        s
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s
    } else {
        "unknown panic payload"
    }
}

#[expect(clippy::cast_possible_truncation, clippy::cast_possible_wrap)]
fn label(config: &MatchConfig, result: GameResult, mover: Player, index: usize) -> f32 {
    let steps = index / config.decay_interval.max(1) as usize;
    let value = f32::from(result.score_for(mover))
        * config.label_decay.powi(steps as i32)
        * config.output_scale
        * config.label_scale;
    value.clamp(-config.output_scale, config.output_scale)
}

#[cfg(test)]
mod tests {
    use octaflip_engine::{Move, Square};
    use rand::{RngCore, SeedableRng as _};

    use super::*;

    fn greedy() -> PolicySpec {
        PolicySpec::Baseline(BaselineKind::Greedy)
    }

    mod labels {
        use super::*;

        #[test]
        fn test_labels_decay_per_interval() {
            let config = MatchConfig::default();
            let win = GameResult::RedWins;
            assert_eq!(label(&config, win, Player::Red, 0), 100.0);
            assert_eq!(label(&config, win, Player::Red, 9), 100.0);
            assert!((label(&config, win, Player::Red, 10) - 95.0).abs() < 1e-4);
            assert!((label(&config, win, Player::Blue, 25) + 90.25).abs() < 1e-3);
            assert_eq!(label(&config, GameResult::Draw, Player::Blue, 3), 0.0);
        }

        #[test]
        fn test_labels_are_clipped() {
            let config = MatchConfig {
                label_scale: 5.0,
                ..MatchConfig::default()
            };
            assert_eq!(label(&config, GameResult::BlueWins, Player::Blue, 0), 200.0);
            assert_eq!(label(&config, GameResult::BlueWins, Player::Red, 0), -200.0);
        }
    }

    mod games {
        use super::*;

        #[test]
        fn test_samples_follow_the_game() {
            let config = MatchConfig::default();
            let red = PolicySpec::Baseline(BaselineKind::Positional);
            let outcome = play(&red, &greedy(), &config, 11).unwrap();

            assert!(outcome.plies <= PLY_CAP);
            assert_eq!(outcome.samples.len(), outcome.plies as usize);
            assert_eq!(outcome.samples[0].board, Board::INITIAL);
            assert_eq!(outcome.samples[0].mover, Player::Red);
            for (i, sample) in outcome.samples.iter().enumerate() {
                assert_eq!(sample.hash, sample.board.position_hash());
                assert!(sample.label.abs() <= config.output_scale);
                assert_eq!(sample.label, label(&config, outcome.result, sample.mover, i));
            }

            let replayed = GameState::replay(&outcome.history).unwrap();
            assert_eq!(replayed.result(), outcome.result);
        }

        #[test]
        fn test_same_seed_same_game() {
            let config = MatchConfig::default();
            let random = PolicySpec::Baseline(BaselineKind::Random);
            let a = play(&random, &greedy(), &config, 5).unwrap();
            let b = play(&random, &greedy(), &config, 5).unwrap();
            assert_eq!(a, b);
        }

        #[test]
        fn test_ply_cap_bounds_game() {
            let config = MatchConfig {
                ply_cap: 6,
                ..MatchConfig::default()
            };
            let outcome = play(&greedy(), &greedy(), &config, 0).unwrap();
            assert_eq!(outcome.plies, 6);
            assert_eq!(outcome.samples.len(), 6);
        }

        #[test]
        fn test_rotated_sample_rehashes() {
            let outcome = play(&greedy(), &greedy(), &MatchConfig::default(), 1).unwrap();
            let sample = outcome.samples[3];
            let rotated = sample.rotated_180();
            assert_eq!(rotated.board, sample.board.rotated_180());
            assert_eq!(rotated.hash, rotated.board.position_hash());
            assert_eq!(rotated.label, sample.label);
        }
    }

    mod failures {
        use octaflip_evaluator::network::NetworkConfig;

        use super::*;

        #[derive(Debug)]
        struct Cheater;

        impl Policy for Cheater {
            fn choose_move(&self, _state: &GameState, _rng: &mut dyn RngCore) -> Option<Move> {
                let from = Square::new(0, 7)?;
                let to = Square::new(1, 6)?;
                Some(Move::Clone { from, to })
            }
        }

        #[test]
        fn test_illegal_move_is_an_error() {
            let config = MatchConfig {
                random_opening_plies: 0,
                ..MatchConfig::default()
            };
            let result = play_policies(&Cheater, &RandomPolicy, &config, 0);
            assert!(matches!(result, Err(MatchError::IllegalMove(_))));
        }

        #[test]
        fn test_bad_checkpoint_fails_task() {
            let mut rng = Pcg32::seed_from_u64(0);
            let network = Network::new(NetworkConfig::default(), &mut rng).unwrap();
            let mut checkpoint = network.to_checkpoint();
            checkpoint.format_version += 1;
            let outcome = play_isolated(
                &PolicySpec::Network(checkpoint),
                &greedy(),
                &MatchConfig::default(),
                0,
            );
            let TaskOutcome::Failed { reason } = outcome else {
                panic!("expected failure");
            };
            assert!(reason.starts_with("invalid policy"), "{reason}");
        }

        #[test]
        fn test_panic_is_contained() {
            let outcome = isolate(|| panic!("boom"));
            assert_eq!(
                outcome,
                TaskOutcome::Failed {
                    reason: "worker panicked: boom".to_owned()
                }
            );
        }

        #[test]
        fn test_network_spec_plays() {
            let mut rng = Pcg32::seed_from_u64(2);
            let network = Network::new(NetworkConfig::default(), &mut rng).unwrap();
            let spec = PolicySpec::Network(network.to_checkpoint());
            let outcome = play_isolated(&spec, &greedy(), &MatchConfig::default(), 3);
            assert!(outcome.is_completed());
        }
    }
}
