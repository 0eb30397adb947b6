//! Arena games of a candidate policy against the fixed baselines.
//!
//! The candidate alternates colours: Red in even-numbered games, Blue in odd-numbered
//! ones. Only wins count towards the win rate; draws and losses are tallied separately.

use octaflip_engine::{GameResult, Player};
use octaflip_evaluator::policy::BaselineKind;
use rand::{Rng, SeedableRng as _};
use rand_pcg::Pcg32;
use rayon::prelude::*;
use serde::{Deserialize, Serialize};

use crate::{
    config::MatchConfig,
    match_runner::{self, PolicySpec, TaskOutcome},
};

/// Tally of a candidate's games against one baseline.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct BaselineRecord {
    pub baseline: BaselineKind,
    pub wins: u32,
    pub draws: u32,
    pub losses: u32,
}

impl BaselineRecord {
    #[must_use]
    pub fn new(baseline: BaselineKind) -> Self {
        Self {
            baseline,
            wins: 0,
            draws: 0,
            losses: 0,
        }
    }

    pub fn record(&mut self, result: GameResult, candidate: Player) {
        match result.score_for(candidate) {
            1.. => self.wins += 1,
            0 => self.draws += 1,
            _ => self.losses += 1,
        }
    }

    #[must_use]
    pub fn games(&self) -> u32 {
        self.wins + self.draws + self.losses
    }

    /// Wins over games played; `None` before any game.
    #[must_use]
    pub fn win_rate(&self) -> Option<f32> {
        ratio(self.wins, self.games())
    }
}

/// Results of a candidate against a set of baselines.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ArenaReport {
    pub records: Vec<BaselineRecord>,
    /// Games that failed and were not scored.
    pub failed: u32,
}

impl ArenaReport {
    #[must_use]
    pub fn new(baselines: &[BaselineKind]) -> Self {
        Self {
            records: baselines.iter().copied().map(BaselineRecord::new).collect(),
            failed: 0,
        }
    }

    pub fn record(&mut self, baseline: BaselineKind, result: GameResult, candidate: Player) {
        let index = match self.records.iter().position(|r| r.baseline == baseline) {
            Some(index) => index,
            None => {
                self.records.push(BaselineRecord::new(baseline));
                self.records.len() - 1
            }
        };
        self.records[index].record(result, candidate);
    }

    #[must_use]
    pub fn get(&self, baseline: BaselineKind) -> Option<&BaselineRecord> {
        self.records.iter().find(|r| r.baseline == baseline)
    }

    #[must_use]
    pub fn games(&self) -> u32 {
        self.records.iter().map(BaselineRecord::games).sum()
    }

    #[must_use]
    pub fn wins(&self) -> u32 {
        self.records.iter().map(|r| r.wins).sum()
    }

    /// Wins over all scored games; `None` before any game.
    #[must_use]
    pub fn overall_win_rate(&self) -> Option<f32> {
        ratio(self.wins(), self.games())
    }
}

#[expect(clippy::cast_precision_loss)]
fn ratio(part: u32, whole: u32) -> Option<f32> {
    (whole > 0).then(|| part as f32 / whole as f32)
}

/// Colour of the candidate in its `game`-th game against a baseline.
#[must_use]
pub fn candidate_color(game: usize) -> Player {
    if game % 2 == 0 {
        Player::Red
    } else {
        Player::Blue
    }
}

#[derive(Debug, Clone, Copy)]
struct ArenaGame {
    baseline: BaselineKind,
    candidate: Player,
    seed: u64,
}

/// Plays `games` games against each of `baselines` and tallies them.
///
/// Games run on the current rayon pool; wrap the call in
/// [`ThreadPool::install`](rayon::ThreadPool::install) to choose one. Seeds are drawn
/// from `seed` up front, so the report does not depend on scheduling.
#[must_use]
pub fn run_arena(
    candidate: &PolicySpec,
    baselines: &[BaselineKind],
    games: usize,
    config: &MatchConfig,
    seed: u64,
) -> ArenaReport {
    let mut rng = Pcg32::seed_from_u64(seed);
    let tasks: Vec<ArenaGame> = baselines
        .iter()
        .flat_map(|&baseline| (0..games).map(move |game| (baseline, candidate_color(game))))
        .map(|(baseline, color)| ArenaGame {
            baseline,
            candidate: color,
            seed: rng.random(),
        })
        .collect();

    let outcomes: Vec<(ArenaGame, TaskOutcome)> = tasks
        .into_par_iter()
        .map(|game| {
            let opponent = PolicySpec::Baseline(game.baseline);
            let (red, blue) = match game.candidate {
                Player::Red => (candidate, &opponent),
                Player::Blue => (&opponent, candidate),
            };
            (game, match_runner::play_isolated(red, blue, config, game.seed))
        })
        .collect();

    let mut report = ArenaReport::new(baselines);
    for (game, outcome) in outcomes {
        match outcome {
            TaskOutcome::Completed(outcome) => {
                report.record(game.baseline, outcome.result, game.candidate);
            }
            TaskOutcome::Failed { .. } => report.failed += 1,
        }
    }
    report
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_record_counts_from_candidate_side() {
        let mut record = BaselineRecord::new(BaselineKind::Greedy);
        assert_eq!(record.win_rate(), None);
        record.record(GameResult::RedWins, Player::Red);
        record.record(GameResult::RedWins, Player::Blue);
        record.record(GameResult::Draw, Player::Blue);
        record.record(GameResult::BlueWins, Player::Blue);
        assert_eq!((record.wins, record.draws, record.losses), (2, 1, 1));
        assert_eq!(record.win_rate(), Some(0.5));
    }

    #[test]
    fn test_report_adds_unknown_baselines() {
        let mut report = ArenaReport::new(&[BaselineKind::Random]);
        report.record(BaselineKind::Minimax, GameResult::Draw, Player::Red);
        report.record(BaselineKind::Random, GameResult::RedWins, Player::Red);
        assert_eq!(report.records.len(), 2);
        assert_eq!(report.games(), 2);
        assert_eq!(report.overall_win_rate(), Some(0.5));
        assert_eq!(report.get(BaselineKind::Minimax).map(|r| r.draws), Some(1));
    }

    #[test]
    fn test_arena_plays_every_game() {
        let candidate = PolicySpec::Baseline(BaselineKind::Greedy);
        let baselines = [BaselineKind::Random, BaselineKind::Positional];
        let config = MatchConfig {
            ply_cap: 12,
            ..MatchConfig::default()
        };
        let report = run_arena(&candidate, &baselines, 3, &config, 42);
        assert_eq!(report.failed, 0);
        assert_eq!(report.games(), 6);
        assert!(report.records.iter().all(|r| r.games() == 3));
        assert_eq!(report, run_arena(&candidate, &baselines, 3, &config, 42));
    }

    #[test]
    fn test_colors_alternate() {
        assert_eq!(candidate_color(0), Player::Red);
        assert_eq!(candidate_color(1), Player::Blue);
        assert_eq!(candidate_color(4), Player::Red);
    }
}
