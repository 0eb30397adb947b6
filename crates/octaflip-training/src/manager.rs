//! Orchestration of one training generation.
//!
//! The [`PopulationManager`] owns every piece of run state (population, replay buffer,
//! opening book, statistics, worker pool and the run's random number generator) and moves
//! through
//!
//! ```text
//! Idle → RunningGeneration → Trained → NextGenerationBuilt → Idle
//! ```
//!
//! once per [`PopulationManager::run_generation`].
//!
//! # Scheduling
//!
//! Every match of a generation is decided up front by [`schedule`], including its seed,
//! and the results are consumed in schedule order. A run is therefore reproducible from
//! its seed whatever the number of workers.
//!
//! # Scoring
//!
//! Only roster-vs-roster games score: a win is worth [`WIN_POINTS`], a draw
//! [`DRAW_POINTS`] to each side. Games against baselines feed the baseline win rate that
//! drives adaptation.

use std::{num::NonZeroUsize, thread};

use octaflip_engine::{GameResult, Player};
use octaflip_evaluator::{network::ConfigError, policy::BaselineKind};
use rand::{Rng, SeedableRng as _};
use rand_pcg::Pcg32;
use rayon::{ThreadPool, ThreadPoolBuildError, ThreadPoolBuilder, prelude::*};

use crate::{
    config::{MatchConfig, PopulationConfig, TrainingConfig, TrainingConfigError},
    evaluation::{self, ArenaReport},
    genetic::{Adaptation, EvolutionSummary, Population, PopulationSnapshot, SnapshotError},
    match_runner::{self, PolicySpec, TaskOutcome},
    opening_book::OpeningBook,
    replay_buffer::ReplayBuffer,
    run_stats::RunStatistics,
    trainer::{self, StabilitySignal, TrainingReport},
};

pub const WIN_POINTS: u32 = 3;
pub const DRAW_POINTS: u32 = 1;

#[derive(Debug, Clone, Copy, PartialEq, Eq, derive_more::Display, derive_more::IsVariant)]
pub enum ManagerState {
    #[display("idle")]
    Idle,
    #[display("running generation")]
    RunningGeneration,
    #[display("trained")]
    Trained,
    #[display("next generation built")]
    NextGenerationBuilt,
}

#[derive(Debug, derive_more::Display, derive_more::Error, derive_more::From)]
pub enum ManagerError {
    #[display("invalid training config: {_0}")]
    Config(TrainingConfigError),
    #[display("failed to initialize network: {_0}")]
    Network(ConfigError),
    #[display("failed to build worker pool: {_0}")]
    ThreadPool(ThreadPoolBuildError),
    #[display("invalid population snapshot: {_0}")]
    Snapshot(SnapshotError),
}

/// Who plays whom in a scheduled match.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Pairing {
    Roster {
        red: usize,
        blue: usize,
    },
    Baseline {
        challenger: usize,
        baseline: BaselineKind,
        challenger_color: Player,
    },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MatchTask {
    pub pairing: Pairing,
    pub seed: u64,
}

/// Matches of one generation.
///
/// Every pair of roster members meets `games_per_pair_direction` times with each member
/// as Red. The first `baseline_challengers` roster members each play
/// `games_per_baseline` games against every baseline, alternating colours.
pub fn schedule<R>(config: &PopulationConfig, roster_size: usize, rng: &mut R) -> Vec<MatchTask>
where
    R: Rng + ?Sized,
{
    let mut pairings = vec![];
    for i in 0..roster_size {
        for j in i + 1..roster_size {
            for _ in 0..config.games_per_pair_direction {
                pairings.push(Pairing::Roster { red: i, blue: j });
                pairings.push(Pairing::Roster { red: j, blue: i });
            }
        }
    }
    for challenger in 0..config.baseline_challengers.min(roster_size) {
        for &baseline in &config.baselines {
            for game in 0..config.games_per_baseline {
                pairings.push(Pairing::Baseline {
                    challenger,
                    baseline,
                    challenger_color: evaluation::candidate_color(game),
                });
            }
        }
    }
    pairings
        .into_iter()
        .map(|pairing| MatchTask {
            pairing,
            seed: rng.random(),
        })
        .collect()
}

/// Tournament points per roster member from `(red, blue, result)` games.
#[must_use]
pub fn tournament_scores(roster_size: usize, games: &[(usize, usize, GameResult)]) -> Vec<u32> {
    let mut scores = vec![0; roster_size];
    for &(red, blue, result) in games {
        match result.winner() {
            Some(Player::Red) => scores[red] += WIN_POINTS,
            Some(Player::Blue) => scores[blue] += WIN_POINTS,
            None => {
                scores[red] += DRAW_POINTS;
                scores[blue] += DRAW_POINTS;
            }
        }
    }
    scores
}

/// Training of one roster member.
#[derive(Debug, Clone, PartialEq)]
pub struct NetworkTraining {
    /// Roster index before evolution.
    pub index: usize,
    pub report: TrainingReport,
}

/// Safeguard applied after training.
#[derive(Debug, Clone, Copy, PartialEq, derive_more::IsVariant)]
pub enum StabilityEvent {
    Explosion { mean_loss: f32, restored: usize },
    Divergence,
}

/// Everything a generation did, for progress output.
#[derive(Debug, Clone, PartialEq)]
pub struct GenerationReport {
    /// Generation that was played.
    pub generation: u32,
    pub tasks: usize,
    pub failures: Vec<String>,
    /// Tournament points in roster order.
    pub scores: Vec<u32>,
    /// Roster indices, best first.
    pub ranking: Vec<usize>,
    /// Challenger results against the baselines.
    pub baselines: ArenaReport,
    pub samples_added: usize,
    pub samples_evicted: usize,
    pub book_games: usize,
    pub training: Vec<NetworkTraining>,
    pub stability: Option<StabilityEvent>,
    /// Old samples dropped after a stability event.
    pub samples_pruned: usize,
    pub hall_of_fame: bool,
    pub evaluation: Option<ArenaReport>,
    pub evolution: EvolutionSummary,
    pub adaptation: Adaptation,
}

#[derive(Debug)]
pub struct PopulationManager {
    config: TrainingConfig,
    population: Population,
    buffer: ReplayBuffer,
    book: OpeningBook,
    stats: RunStatistics,
    pool: ThreadPool,
    rng: Pcg32,
    state: ManagerState,
}

impl PopulationManager {
    /// Starts a fresh run with a randomly initialized population.
    pub fn new(config: TrainingConfig, seed: u64) -> Result<Self, ManagerError> {
        config.validate()?;
        let mut rng = Pcg32::seed_from_u64(seed);
        let population = Population::random(
            &config.network,
            config.population.size,
            &config.adaptation,
            config.trainer.loss_window,
            &mut rng,
        )?;
        let cores = thread::available_parallelism().map_or(1, NonZeroUsize::get);
        let pool = ThreadPoolBuilder::new()
            .num_threads(config.population.worker_count(cores))
            .thread_name(|i| format!("octaflip-worker-{i}"))
            .build()?;
        Ok(Self {
            buffer: ReplayBuffer::new(config.buffer.capacity),
            book: OpeningBook::new(),
            stats: RunStatistics::new(),
            config,
            population,
            pool,
            rng,
            state: ManagerState::Idle,
        })
    }

    /// Replaces the population with a saved one.
    pub fn restore_population(&mut self, snapshot: &PopulationSnapshot) -> Result<(), ManagerError> {
        self.population = Population::from_snapshot(snapshot, self.config.trainer.loss_window)?;
        Ok(())
    }

    /// Replaces the replay buffer, resizing it to the configured capacity.
    pub fn set_buffer(&mut self, mut buffer: ReplayBuffer) {
        buffer.set_capacity(self.config.buffer.capacity);
        self.buffer = buffer;
    }

    pub fn set_book(&mut self, book: OpeningBook) {
        self.book = book;
    }

    pub fn set_statistics(&mut self, stats: RunStatistics) {
        self.stats = stats;
    }

    #[must_use]
    pub fn state(&self) -> ManagerState {
        self.state
    }

    #[must_use]
    pub fn config(&self) -> &TrainingConfig {
        &self.config
    }

    #[must_use]
    pub fn population(&self) -> &Population {
        &self.population
    }

    #[must_use]
    pub fn buffer(&self) -> &ReplayBuffer {
        &self.buffer
    }

    #[must_use]
    pub fn book(&self) -> &OpeningBook {
        &self.book
    }

    /// Book reduced to frequent positions and their best moves, as persisted for export.
    #[must_use]
    pub fn compressed_book(&self) -> OpeningBook {
        self.book.compress(
            self.config.book.compress_min_occurrences,
            self.config.book.compress_max_moves,
        )
    }

    #[must_use]
    pub fn statistics(&self) -> &RunStatistics {
        &self.stats
    }

    pub fn statistics_mut(&mut self) -> &mut RunStatistics {
        &mut self.stats
    }

    #[must_use]
    pub fn worker_count(&self) -> usize {
        self.pool.current_num_threads()
    }

    #[must_use]
    pub fn snapshot(&self) -> PopulationSnapshot {
        self.population.snapshot()
    }

    /// Plays, trains, evolves and adapts one generation.
    pub fn run_generation(&mut self) -> GenerationReport {
        let generation = self.population.generation();
        self.state = ManagerState::RunningGeneration;

        let tasks = schedule(&self.config.population, self.population.len(), &mut self.rng);
        let roster: Vec<PolicySpec> = self
            .population
            .individuals()
            .iter()
            .map(|ind| PolicySpec::Network(ind.network().to_checkpoint()))
            .collect();
        let matches = &self.config.matches;
        let outcomes: Vec<(MatchTask, TaskOutcome)> = self.pool.install(|| {
            tasks
                .par_iter()
                .map(|task| (*task, run_task(task, &roster, matches)))
                .collect()
        });

        let mut roster_games = vec![];
        let mut baselines = ArenaReport::new(&self.config.population.baselines);
        let mut failures = vec![];
        let mut samples_added = 0;
        let mut samples_evicted = 0;
        let mut book_games = 0;
        for (task, outcome) in outcomes {
            let outcome = match outcome {
                TaskOutcome::Completed(outcome) => outcome,
                TaskOutcome::Failed { reason } => {
                    failures.push(reason);
                    continue;
                }
            };
            match task.pairing {
                Pairing::Roster { red, blue } => roster_games.push((red, blue, outcome.result)),
                Pairing::Baseline {
                    baseline,
                    challenger_color,
                    ..
                } => baselines.record(baseline, outcome.result, challenger_color),
            }
            let decisiveness = f32::from(outcome.result.score_for(Player::Red).unsigned_abs());
            if decisiveness > self.config.book.decisive_threshold
                && self
                    .book
                    .add_game(&outcome.history, outcome.result, self.config.book.max_plies)
                    .is_ok()
            {
                book_games += 1;
            }
            samples_added += outcome.samples.len();
            samples_evicted += self.buffer.add(outcome.samples);
        }

        self.stats.games_played += (tasks.len() - failures.len()) as u64;
        self.stats.positions_generated += samples_added as u64;
        self.stats.failed_tasks += failures.len() as u64;
        if let Some(rate) = baselines.overall_win_rate() {
            self.stats.win_rate_history.push(rate);
        }

        let scores = tournament_scores(self.population.len(), &roster_games);
        self.population.assign_scores(&scores);
        let ranking = self.population.ranking();

        let training = self.train_top_half(generation);
        self.state = ManagerState::Trained;

        let stability = self.apply_stability();
        let samples_pruned = if stability.is_some() {
            self.prune_buffer()
        } else {
            0
        };

        let completed = generation + 1;
        let hall_of_fame = is_due(completed, self.config.population.hall_of_fame_interval)
            && self
                .population
                .record_hall_of_fame(self.config.population.hall_of_fame_capacity)
                .is_some();
        let evaluation = if is_due(completed, self.config.evaluation_interval) {
            self.evaluate_best()
        } else {
            None
        };
        if evaluation.is_some() {
            self.stats.last_evaluation.clone_from(&evaluation);
        }

        let evolution =
            self.population
                .evolve(&self.config.population, &self.config.adaptation, &mut self.rng);
        self.state = ManagerState::NextGenerationBuilt;

        let slope = self
            .stats
            .win_rate_slope(self.config.adaptation.trend_window);
        let adaptation = self.population.adapt(
            slope,
            stability.is_some_and(|s| s.is_divergence()),
            &self.config.adaptation,
        );
        self.stats.generation = self.population.generation();
        self.state = ManagerState::Idle;

        GenerationReport {
            generation,
            tasks: tasks.len(),
            failures,
            scores,
            ranking,
            baselines,
            samples_added,
            samples_evicted,
            book_games,
            training,
            stability,
            samples_pruned,
            hall_of_fame,
            evaluation,
            evolution,
            adaptation,
        }
    }

    /// Arena games of the current best network against every baseline.
    pub fn evaluate_best(&mut self) -> Option<ArenaReport> {
        let seed = self.rng.random();
        let best = self.population.best()?;
        let candidate = PolicySpec::Network(best.network().to_checkpoint());
        let report = self.pool.install(|| {
            evaluation::run_arena(
                &candidate,
                &self.config.population.baselines,
                self.config.evaluation_games,
                &self.config.matches,
                seed,
            )
        });
        Some(report)
    }

    fn train_top_half(&mut self, generation: u32) -> Vec<NetworkTraining> {
        let mut training = vec![];
        for index in self.population.top_half() {
            let Some(individual) = self.population.individual_mut(index) else {
                continue;
            };
            let report = individual.train(&self.buffer, &self.config.trainer, generation, &mut self.rng);
            if let Some(loss) = report.mean_loss {
                self.stats.loss_history.push(loss);
            }
            self.stats.positions_trained += report.positions as u64;
            training.push(NetworkTraining { index, report });
        }
        training
    }

    fn apply_stability(&mut self) -> Option<StabilityEvent> {
        let config = &self.config.trainer;
        match trainer::check_stability(&self.stats.loss_history, config)? {
            StabilitySignal::Explosion { mean_loss } => {
                let restored = self.population.restore_backups(mean_loss);
                self.population
                    .scale_learning_rates(config.explosion_lr_factor);
                self.stats.explosions += 1;
                Some(StabilityEvent::Explosion {
                    mean_loss,
                    restored,
                })
            }
            StabilitySignal::Divergence => {
                self.population
                    .scale_learning_rates(config.divergence_lr_factor);
                self.stats.divergences += 1;
                Some(StabilityEvent::Divergence)
            }
        }
    }

    fn prune_buffer(&mut self) -> usize {
        let batch = self.config.trainer.batch_size;
        if self.buffer.len() > batch * self.config.buffer.prune_min_batches {
            self.buffer
                .discard_oldest(batch * self.config.buffer.prune_batches)
        } else {
            0
        }
    }
}

fn is_due(completed: u32, interval: u32) -> bool {
    interval > 0 && completed % interval == 0
}

fn run_task(task: &MatchTask, roster: &[PolicySpec], config: &MatchConfig) -> TaskOutcome {
    match task.pairing {
        Pairing::Roster { red, blue } => {
            match_runner::play_isolated(&roster[red], &roster[blue], config, task.seed)
        }
        Pairing::Baseline {
            challenger,
            baseline,
            challenger_color,
        } => {
            let opponent = PolicySpec::Baseline(baseline);
            let (red, blue) = match challenger_color {
                Player::Red => (&roster[challenger], &opponent),
                Player::Blue => (&opponent, &roster[challenger]),
            };
            match_runner::play_isolated(red, blue, config, task.seed)
        }
    }
}
