//! Training run configuration.
//!
//! Every section derives `Default` from the tuned constants and deserializes with
//! `#[serde(default)]`, so a config file only needs the fields it changes.

use octaflip_evaluator::{network::NetworkConfig, policy::BaselineKind};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TrainingConfig {
    pub population: PopulationConfig,
    pub matches: MatchConfig,
    pub trainer: TrainerConfig,
    pub buffer: BufferConfig,
    pub book: BookConfig,
    pub adaptation: AdaptationConfig,
    pub network: NetworkConfig,
    /// Generations between persisted checkpoints.
    pub save_interval: u32,
    /// Generations between arena evaluations of the best network.
    pub evaluation_interval: u32,
    /// Games per baseline in an arena evaluation.
    pub evaluation_games: usize,
}

impl Default for TrainingConfig {
    fn default() -> Self {
        Self {
            population: PopulationConfig::default(),
            matches: MatchConfig::default(),
            trainer: TrainerConfig::default(),
            buffer: BufferConfig::default(),
            book: BookConfig::default(),
            adaptation: AdaptationConfig::default(),
            network: NetworkConfig::default(),
            save_interval: 20,
            evaluation_interval: 40,
            evaluation_games: 4,
        }
    }
}

#[derive(Debug, Clone, PartialEq, derive_more::Display, derive_more::Error)]
pub enum TrainingConfigError {
    #[display("population needs at least 4 members, got {_0}")]
    PopulationSize(#[error(not(source))] usize),
    #[display("match output_scale {matches} differs from network output_scale {network}")]
    OutputScaleMismatch { matches: f32, network: f32 },
    #[display("{name} must be positive")]
    NonPositive { name: &'static str },
    #[display("invalid network config: {_0}")]
    Network(octaflip_evaluator::network::ConfigError),
}

impl TrainingConfig {
    #[allow(clippy::float_cmp)]
    pub fn validate(&self) -> Result<(), TrainingConfigError> {
        if self.population.size < 4 {
            return Err(TrainingConfigError::PopulationSize(self.population.size));
        }
        if self.matches.output_scale != self.network.output_scale {
            return Err(TrainingConfigError::OutputScaleMismatch {
                matches: self.matches.output_scale,
                network: self.network.output_scale,
            });
        }
        for (name, value) in [
            ("trainer.batch_size", self.trainer.batch_size),
            ("trainer.epochs", self.trainer.epochs),
            ("buffer.capacity", self.buffer.capacity),
            ("population.tournament_size", self.population.tournament_size),
        ] {
            if value == 0 {
                return Err(TrainingConfigError::NonPositive { name });
            }
        }
        self.network
            .validate()
            .map_err(TrainingConfigError::Network)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PopulationConfig {
    pub size: usize,
    /// Elites kept per generation are `max(min_elites, size / elite_divisor)`.
    pub elite_divisor: usize,
    pub min_elites: usize,
    pub tournament_size: usize,
    /// Games each ordered pair of members plays.
    pub games_per_pair_direction: usize,
    /// Leading members that also play the baselines.
    pub baseline_challengers: usize,
    pub games_per_baseline: usize,
    pub baselines: Vec<BaselineKind>,
    pub hall_of_fame_interval: u32,
    pub hall_of_fame_capacity: usize,
    pub max_workers: usize,
    /// Cores left free for the rest of the system.
    pub reserved_cores: usize,
}

impl Default for PopulationConfig {
    fn default() -> Self {
        Self {
            size: 12,
            elite_divisor: 6,
            min_elites: 2,
            tournament_size: 3,
            games_per_pair_direction: 1,
            baseline_challengers: 2,
            games_per_baseline: 2,
            baselines: BaselineKind::ALL.to_vec(),
            hall_of_fame_interval: 20,
            hall_of_fame_capacity: 10,
            max_workers: 6,
            reserved_cores: 2,
        }
    }
}

impl PopulationConfig {
    #[must_use]
    pub fn elite_count(&self) -> usize {
        (self.size / self.elite_divisor.max(1))
            .max(self.min_elites)
            .min(self.size)
    }

    /// `max(1, cores - reserved_cores)`, capped at `max_workers`.
    #[must_use]
    pub fn worker_count(&self, cores: usize) -> usize {
        cores
            .saturating_sub(self.reserved_cores)
            .max(1)
            .min(self.max_workers.max(1))
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct MatchConfig {
    pub ply_cap: u32,
    /// Leading plies played uniformly at random.
    pub random_opening_plies: u32,
    pub label_decay: f32,
    /// Plies per decay step.
    pub decay_interval: u32,
    pub label_scale: f32,
    /// Labels are clipped to `±output_scale`; must equal the network's.
    pub output_scale: f32,
}

impl Default for MatchConfig {
    fn default() -> Self {
        Self {
            ply_cap: crate::match_runner::PLY_CAP,
            random_opening_plies: 2,
            label_decay: 0.95,
            decay_interval: 10,
            label_scale: 0.5,
            output_scale: 200.0,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TrainerConfig {
    pub batch_size: usize,
    pub epochs: usize,
    /// Each epoch draws `batch_size * batches_per_epoch` samples at most.
    pub batches_per_epoch: usize,
    pub recency_bias: f64,
    pub augment_interval: u32,
    pub augment_fraction: f32,
    pub loss_window: usize,
    /// Non-improving checks tolerated before the learning rate is cut.
    pub patience: usize,
    pub patience_lr_factor: f32,
    pub stagnation_std: f32,
    pub stagnation_lr_factor: f32,
    pub explosion_window: usize,
    pub explosion_threshold: f32,
    pub explosion_lr_factor: f32,
    /// Steps inspected for divergence.
    pub divergence_window: usize,
    pub divergence_min_rises: usize,
    pub divergence_ratio: f32,
    pub divergence_lr_factor: f32,
}

impl Default for TrainerConfig {
    fn default() -> Self {
        Self {
            batch_size: 512,
            epochs: 2,
            batches_per_epoch: 20,
            recency_bias: 0.95,
            augment_interval: 10,
            augment_fraction: 0.25,
            loss_window: 20,
            patience: 10,
            patience_lr_factor: 0.7,
            stagnation_std: 0.01,
            stagnation_lr_factor: 0.8,
            explosion_window: 5,
            explosion_threshold: 5000.0,
            explosion_lr_factor: 0.1,
            divergence_window: 4,
            divergence_min_rises: 3,
            divergence_ratio: 1.5,
            divergence_lr_factor: 0.5,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct BufferConfig {
    pub capacity: usize,
    /// After a stability signal, buffers holding more than this many batches drop their
    /// oldest `prune_batches` batches.
    pub prune_min_batches: usize,
    pub prune_batches: usize,
}

impl Default for BufferConfig {
    fn default() -> Self {
        Self {
            capacity: 200_000,
            prune_min_batches: 10,
            prune_batches: 5,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct BookConfig {
    /// Leading plies of each decisive game recorded in the book.
    pub max_plies: usize,
    /// Results with a larger magnitude count as decisive.
    pub decisive_threshold: f32,
    pub compress_min_occurrences: u32,
    pub compress_max_moves: usize,
    pub export_min_occurrences: u32,
    pub export_max_entries: usize,
}

impl Default for BookConfig {
    fn default() -> Self {
        Self {
            max_plies: 20,
            decisive_threshold: 0.5,
            compress_min_occurrences: 5,
            compress_max_moves: 5,
            export_min_occurrences: 3,
            export_max_entries: 2000,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AdaptationConfig {
    pub initial_exploration_rate: f64,
    pub min_exploration_rate: f64,
    pub max_exploration_rate: f64,
    pub exploration_decay: f64,
    pub exploration_growth: f64,
    pub initial_mutation_strength: f32,
    pub min_mutation_strength: f32,
    pub max_mutation_strength: f32,
    pub mutation_decay: f32,
    pub mutation_growth: f32,
    /// Mutation strength factor on a divergence signal.
    pub divergence_mutation_factor: f32,
    /// Strength multiplier for exploratory offspring.
    pub exploration_multiplier: f32,
    /// Win-rate points used for the trend; at least 3 are required.
    pub trend_window: usize,
    pub trend_epsilon: f32,
}

impl Default for AdaptationConfig {
    fn default() -> Self {
        Self {
            initial_exploration_rate: 0.3,
            min_exploration_rate: 0.05,
            max_exploration_rate: 0.6,
            exploration_decay: 0.99,
            exploration_growth: 1.1,
            initial_mutation_strength: 0.001,
            min_mutation_strength: 0.0001,
            max_mutation_strength: 0.01,
            mutation_decay: 0.98,
            mutation_growth: 1.05,
            divergence_mutation_factor: 0.5,
            exploration_multiplier: 10.0,
            trend_window: 10,
            trend_epsilon: 0.005,
        }
    }
}
