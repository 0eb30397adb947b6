//! Evolutionary roster of value networks.
//!
//! A [`Population`] is an ordered roster of [`Individual`]s plus the scalars that steer
//! its evolution: the generation counter, the exploration rate, the mutation strength,
//! and a bounded hall of fame of past best networks.
//!
//! # Generation Cycle
//!
//! 1. **Score** - the caller assigns tournament points with [`Population::assign_scores`]
//! 2. **Rank** - [`Population::ranking`] orders the roster by score, ties keeping roster
//!    order
//! 3. **Train** - the caller trains the top half through [`Individual::train`]
//! 4. **Evolve** - [`Population::evolve`] keeps the elites and fills the rest with mutated
//!    tournament winners
//! 5. **Adapt** - [`Population::adapt`] moves exploration and mutation strength with the
//!    win-rate trend
//!
//! # Selection
//!
//! Tournament selection draws `tournament_size` distinct individuals from the top half of
//! the ranking and keeps the highest score. The winner is never modified; its offspring is
//! a mutated copy.
//!
//! # Exploration
//!
//! Each offspring is mutated with the base strength, or with the strength multiplied by
//! `exploration_multiplier` with probability `exploration_rate`. The strength then shrinks
//! slowly with the generation number (see [`weights::generation_scaled`]).
//!
//! # Backups
//!
//! Each individual can hold an in-memory copy of its parameters from its best training
//! round. [`Population::restore_backups`] rolls individuals back to it after a loss
//! explosion. Backups are not part of [`PopulationSnapshot`].

use std::collections::VecDeque;

use octaflip_evaluator::network::{
    Checkpoint, CheckpointError, ConfigError, Network, NetworkConfig, ParameterSnapshot,
};
use octaflip_stats::trend::Trend;
use rand::{Rng, seq::IndexedRandom as _};
use serde::{Deserialize, Serialize};

use crate::{
    config::{AdaptationConfig, PopulationConfig, TrainerConfig},
    replay_buffer::ReplayBuffer,
    trainer::{self, LossMonitor, TrainingReport},
    weights,
};

#[derive(Debug, Clone, PartialEq)]
struct Backup {
    snapshot: ParameterSnapshot,
    loss: f32,
}

/// One roster member: a network, its latest tournament score, and its training state.
#[derive(Debug, Clone, PartialEq)]
pub struct Individual {
    network: Network,
    score: u32,
    backup: Option<Backup>,
    monitor: LossMonitor,
}

impl Individual {
    #[must_use]
    pub fn new(network: Network, loss_window: usize) -> Self {
        Self {
            network,
            score: 0,
            backup: None,
            monitor: LossMonitor::new(loss_window),
        }
    }

    #[must_use]
    pub fn network(&self) -> &Network {
        &self.network
    }

    pub fn network_mut(&mut self) -> &mut Network {
        &mut self.network
    }

    #[must_use]
    pub fn score(&self) -> u32 {
        self.score
    }

    /// Mean loss of the training round the backup was taken from.
    #[must_use]
    pub fn backup_loss(&self) -> Option<f32> {
        self.backup.as_ref().map(|b| b.loss)
    }

    /// Takes a backup if `loss` improves on the current one. Returns whether it did.
    pub fn offer_backup(&mut self, loss: f32) -> bool {
        if !loss.is_finite() || self.backup_loss().is_some_and(|best| best <= loss) {
            return false;
        }
        self.backup = Some(Backup {
            snapshot: self.network.snapshot(),
            loss,
        });
        true
    }

    /// Rolls the network back to its backup, if any.
    pub fn restore_backup(&mut self) -> bool {
        match &self.backup {
            Some(backup) => {
                self.network.restore(&backup.snapshot);
                true
            }
            None => false,
        }
    }

    /// Trains the network on `buffer`, tags it with `generation`, and offers the round's
    /// mean loss as a new backup.
    pub fn train<R>(
        &mut self,
        buffer: &ReplayBuffer,
        config: &TrainerConfig,
        generation: u32,
        rng: &mut R,
    ) -> TrainingReport
    where
        R: Rng,
    {
        let report = trainer::train_network(
            &mut self.network,
            &mut self.monitor,
            buffer,
            config,
            generation,
            rng,
        );
        if report.batches > 0 {
            self.network.set_generation(generation);
        }
        if let Some(loss) = report.mean_loss {
            self.offer_backup(loss);
        }
        report
    }

    fn offspring(&self, loss_window: usize) -> Self {
        Self::new(self.network.clone(), loss_window)
    }
}

/// A past best network.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HallOfFameEntry {
    pub generation: u32,
    pub score: u32,
    pub checkpoint: Checkpoint,
}

/// What [`Population::evolve`] did.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct EvolutionSummary {
    pub elites: usize,
    pub offspring: usize,
    /// Offspring mutated with the exploration multiplier.
    pub explorations: usize,
}

/// What [`Population::adapt`] did.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Adaptation {
    /// `None` when there were too few win-rate points for a slope.
    pub trend: Option<Trend>,
    pub divergence: bool,
    pub exploration_rate: f64,
    pub mutation_strength: f32,
}

#[derive(Debug, Clone, PartialEq, derive_more::Display, derive_more::Error)]
pub enum SnapshotError {
    #[display("population snapshot has an empty roster")]
    EmptyRoster,
    #[display("roster member {index}: {source}")]
    Checkpoint {
        index: usize,
        source: CheckpointError,
    },
}

/// Serializable population state. Scores, loss monitors and backups are not kept.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PopulationSnapshot {
    pub generation: u32,
    pub exploration_rate: f64,
    pub mutation_strength: f32,
    pub roster: Vec<Checkpoint>,
    #[serde(default)]
    pub hall_of_fame: Vec<HallOfFameEntry>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Population {
    individuals: Vec<Individual>,
    generation: u32,
    exploration_rate: f64,
    mutation_strength: f32,
    hall_of_fame: VecDeque<HallOfFameEntry>,
    loss_window: usize,
}

impl Population {
    /// Creates `size` freshly initialized networks.
    pub fn random<R>(
        network_config: &NetworkConfig,
        size: usize,
        adaptation: &AdaptationConfig,
        loss_window: usize,
        rng: &mut R,
    ) -> Result<Self, ConfigError>
    where
        R: Rng + ?Sized,
    {
        let individuals = (0..size)
            .map(|_| {
                Network::new(network_config.clone(), rng)
                    .map(|network| Individual::new(network, loss_window))
            })
            .collect::<Result<_, _>>()?;
        Ok(Self {
            individuals,
            generation: 0,
            exploration_rate: adaptation.initial_exploration_rate,
            mutation_strength: adaptation.initial_mutation_strength,
            hall_of_fame: VecDeque::new(),
            loss_window,
        })
    }

    pub fn from_snapshot(
        snapshot: &PopulationSnapshot,
        loss_window: usize,
    ) -> Result<Self, SnapshotError> {
        if snapshot.roster.is_empty() {
            return Err(SnapshotError::EmptyRoster);
        }
        let individuals = snapshot
            .roster
            .iter()
            .enumerate()
            .map(|(index, checkpoint)| {
                Network::from_checkpoint(checkpoint)
                    .map(|network| Individual::new(network, loss_window))
                    .map_err(|source| SnapshotError::Checkpoint { index, source })
            })
            .collect::<Result<_, _>>()?;
        Ok(Self {
            individuals,
            generation: snapshot.generation,
            exploration_rate: snapshot.exploration_rate,
            mutation_strength: snapshot.mutation_strength,
            hall_of_fame: snapshot.hall_of_fame.iter().cloned().collect(),
            loss_window,
        })
    }

    #[must_use]
    pub fn snapshot(&self) -> PopulationSnapshot {
        PopulationSnapshot {
            generation: self.generation,
            exploration_rate: self.exploration_rate,
            mutation_strength: self.mutation_strength,
            roster: self
                .individuals
                .iter()
                .map(|ind| ind.network.to_checkpoint())
                .collect(),
            hall_of_fame: self.hall_of_fame.iter().cloned().collect(),
        }
    }

    /// Roster in roster order.
    #[must_use]
    pub fn individuals(&self) -> &[Individual] {
        &self.individuals
    }

    #[must_use]
    pub fn individual_mut(&mut self, index: usize) -> Option<&mut Individual> {
        self.individuals.get_mut(index)
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.individuals.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.individuals.is_empty()
    }

    #[must_use]
    pub fn generation(&self) -> u32 {
        self.generation
    }

    #[must_use]
    pub fn exploration_rate(&self) -> f64 {
        self.exploration_rate
    }

    #[must_use]
    pub fn mutation_strength(&self) -> f32 {
        self.mutation_strength
    }

    pub fn hall_of_fame(&self) -> impl ExactSizeIterator<Item = &HallOfFameEntry> + '_ {
        self.hall_of_fame.iter()
    }

    /// Sets scores in roster order. Missing scores become 0.
    pub fn assign_scores(&mut self, scores: &[u32]) {
        for (i, ind) in self.individuals.iter_mut().enumerate() {
            ind.score = scores.get(i).copied().unwrap_or(0);
        }
    }

    /// Roster indices by descending score; equal scores keep roster order.
    #[must_use]
    pub fn ranking(&self) -> Vec<usize> {
        let mut order: Vec<usize> = (0..self.individuals.len()).collect();
        order.sort_by_key(|&i| std::cmp::Reverse(self.individuals[i].score));
        order
    }

    /// Highest-ranked individual.
    #[must_use]
    pub fn best(&self) -> Option<&Individual> {
        self.ranking().first().map(|&i| &self.individuals[i])
    }

    /// Indices of the top half of the ranking (at least one).
    #[must_use]
    pub fn top_half(&self) -> Vec<usize> {
        let mut ranking = self.ranking();
        ranking.truncate(self.individuals.len().div_ceil(2).max(1));
        ranking
    }

    /// Replaces the roster with the next generation and advances the generation counter.
    ///
    /// The elites are carried over with their training state; the rest of the roster is
    /// mutated copies of tournament winners.
    pub fn evolve<R>(
        &mut self,
        config: &PopulationConfig,
        adaptation: &AdaptationConfig,
        rng: &mut R,
    ) -> EvolutionSummary
    where
        R: Rng + ?Sized,
    {
        let size = self.individuals.len();
        if size == 0 {
            self.generation += 1;
            return EvolutionSummary::default();
        }
        let ranking = self.ranking();
        let elite_count = config.elite_count().min(size);
        let pool: Vec<&Individual> = self
            .top_half()
            .into_iter()
            .map(|i| &self.individuals[i])
            .collect();

        let mut summary = EvolutionSummary {
            elites: elite_count,
            ..EvolutionSummary::default()
        };
        let mut next: Vec<Individual> = ranking[..elite_count]
            .iter()
            .map(|&i| self.individuals[i].clone())
            .collect();
        let next_generation = self.generation + 1;

        while next.len() < size {
            let parent = tournament_select(&pool, config.tournament_size, rng);
            let mut child = parent.offspring(self.loss_window);
            let mut strength = self.mutation_strength;
            if rng.random_bool(self.exploration_rate.clamp(0.0, 1.0)) {
                strength *= adaptation.exploration_multiplier;
                summary.explorations += 1;
            }
            weights::mutate(
                &mut child.network,
                weights::generation_scaled(strength, next_generation),
                rng,
            );
            child.network.set_generation(next_generation);
            next.push(child);
            summary.offspring += 1;
        }

        for ind in &mut next {
            ind.score = 0;
        }
        self.individuals = next;
        self.generation = next_generation;
        summary
    }

    /// Moves exploration rate and mutation strength with the win-rate trend.
    ///
    /// - improving: both decay
    /// - flat or declining: both grow
    /// - no slope yet: only the exploration rate decays
    ///
    /// A divergence signal additionally damps the mutation strength. Both values stay
    /// within their configured bounds.
    pub fn adapt(
        &mut self,
        slope: Option<f32>,
        divergence: bool,
        config: &AdaptationConfig,
    ) -> Adaptation {
        let trend = slope.map(|s| Trend::classify(s, config.trend_epsilon));
        match trend {
            Some(Trend::Improving) => {
                self.exploration_rate *= config.exploration_decay;
                self.mutation_strength *= config.mutation_decay;
            }
            Some(Trend::Flat | Trend::Declining) => {
                self.exploration_rate *= config.exploration_growth;
                self.mutation_strength *= config.mutation_growth;
            }
            None => self.exploration_rate *= config.exploration_decay,
        }
        if divergence {
            self.mutation_strength *= config.divergence_mutation_factor;
        }
        self.exploration_rate = self
            .exploration_rate
            .clamp(config.min_exploration_rate, config.max_exploration_rate);
        self.mutation_strength = self
            .mutation_strength
            .clamp(config.min_mutation_strength, config.max_mutation_strength);
        Adaptation {
            trend,
            divergence,
            exploration_rate: self.exploration_rate,
            mutation_strength: self.mutation_strength,
        }
    }

    /// Pushes the current best network, dropping the oldest entries beyond `capacity`.
    pub fn record_hall_of_fame(&mut self, capacity: usize) -> Option<&HallOfFameEntry> {
        let best = self.best()?;
        let entry = HallOfFameEntry {
            generation: self.generation,
            score: best.score,
            checkpoint: best.network.to_checkpoint(),
        };
        self.hall_of_fame.push_back(entry);
        while self.hall_of_fame.len() > capacity {
            self.hall_of_fame.pop_front();
        }
        self.hall_of_fame.back()
    }

    /// Restores every individual whose backup loss is below `threshold`. Returns the
    /// number restored.
    pub fn restore_backups(&mut self, threshold: f32) -> usize {
        self.individuals
            .iter_mut()
            .filter(|ind| ind.backup_loss().is_some_and(|loss| loss < threshold))
            .map(Individual::restore_backup)
            .filter(|&restored| restored)
            .count()
    }

    pub fn scale_learning_rates(&mut self, factor: f32) {
        for ind in &mut self.individuals {
            ind.network.scale_learning_rate(factor);
        }
    }
}

/// Picks the highest-scoring of `tournament_size` distinct random members of `pool`.
fn tournament_select<'a, R>(
    pool: &[&'a Individual],
    tournament_size: usize,
    rng: &mut R,
) -> &'a Individual
where
    R: Rng + ?Sized,
{
    assert!(!pool.is_empty());
    pool.choose_multiple(rng, tournament_size.max(1))
        .max_by_key(|ind| ind.score)
        .copied()
        .expect("tournament pool is non-empty")
}

#[cfg(test)]
mod tests {
    use rand::SeedableRng as _;
    use rand_pcg::Pcg32;

    use super::*;

    fn population(size: usize) -> Population {
        Population::random(
            &NetworkConfig::default(),
            size,
            &AdaptationConfig::default(),
            20,
            &mut Pcg32::seed_from_u64(5),
        )
        .unwrap()
    }

    mod ranking {
        use super::*;

        #[test]
        fn test_ranking_is_stable_descending() {
            let mut population = population(5);
            population.assign_scores(&[3, 7, 3, 0, 7]);
            assert_eq!(population.ranking(), vec![1, 4, 0, 2, 3]);
            assert_eq!(population.top_half(), vec![1, 4, 0]);
            assert_eq!(population.best().map(Individual::score), Some(7));
        }

        #[test]
        fn test_missing_scores_are_zero() {
            let mut population = population(3);
            population.assign_scores(&[4]);
            let scores: Vec<u32> = population.individuals().iter().map(Individual::score).collect();
            assert_eq!(scores, vec![4, 0, 0]);
        }

        #[test]
        fn test_tournament_prefers_higher_score() {
            let mut population = population(4);
            population.assign_scores(&[1, 9, 5, 2]);
            let pool: Vec<&Individual> = population.individuals().iter().collect();
            let mut rng = Pcg32::seed_from_u64(0);
            // tournament covering the whole pool always returns the best
            for _ in 0..10 {
                assert_eq!(tournament_select(&pool, 4, &mut rng).score(), 9);
            }
        }
    }

    mod evolution {
        use super::*;

        #[test]
        fn test_evolve_keeps_elites_and_size() {
            let mut population = population(12);
            let scores: Vec<u32> = (0..12).collect();
            population.assign_scores(&scores);
            let best = population.individuals()[11].network().clone();
            let second = population.individuals()[10].network().clone();

            let summary = population.evolve(
                &PopulationConfig::default(),
                &AdaptationConfig::default(),
                &mut Pcg32::seed_from_u64(1),
            );

            assert_eq!(population.len(), 12);
            assert_eq!(population.generation(), 1);
            assert_eq!(summary.elites, 2);
            assert_eq!(summary.offspring, 10);
            assert_eq!(population.individuals()[0].network(), &best);
            assert_eq!(population.individuals()[1].network(), &second);
            assert!(population.individuals().iter().all(|ind| ind.score() == 0));
            for ind in &population.individuals()[2..] {
                assert_eq!(ind.network().generation(), 1);
                assert_ne!(ind.network(), &best);
            }
        }

        #[test]
        fn test_offspring_come_from_top_half() {
            let mut population = population(4);
            population.assign_scores(&[10, 8, 0, 0]);
            let parents: Vec<Checkpoint> = population.individuals()[..2]
                .iter()
                .map(|ind| ind.network().to_checkpoint())
                .collect();
            let adaptation = AdaptationConfig {
                initial_exploration_rate: 0.0,
                ..AdaptationConfig::default()
            };
            population.exploration_rate = 0.0;
            population.mutation_strength = 0.0;
            let summary =
                population.evolve(&PopulationConfig::default(), &adaptation, &mut Pcg32::seed_from_u64(2));
            assert_eq!(summary.explorations, 0);
            // zero strength leaves offspring as exact copies of their parents
            for ind in population.individuals() {
                let mut checkpoint = ind.network().to_checkpoint();
                checkpoint.generation = 0;
                assert!(parents.contains(&checkpoint));
            }
        }

        #[test]
        fn test_adapt_follows_trend_and_bounds() {
            let config = AdaptationConfig::default();
            let mut population = population(2);

            let improving = population.adapt(Some(0.1), false, &config);
            assert_eq!(improving.trend, Some(Trend::Improving));
            assert!((improving.exploration_rate - 0.3 * 0.99).abs() < 1e-12);
            assert!((improving.mutation_strength - 0.001 * 0.98).abs() < 1e-9);

            let flat = population.adapt(Some(0.0), false, &config);
            assert_eq!(flat.trend, Some(Trend::Flat));
            assert!(flat.exploration_rate > improving.exploration_rate);

            let diverging = population.adapt(None, true, &config);
            assert_eq!(diverging.trend, None);
            assert!(diverging.mutation_strength < flat.mutation_strength);

            for _ in 0..500 {
                population.adapt(Some(-1.0), false, &config);
            }
            assert!((population.exploration_rate() - config.max_exploration_rate).abs() < 1e-12);
            assert!((population.mutation_strength() - config.max_mutation_strength).abs() < 1e-9);
        }
    }

    mod backups {
        use super::*;

        #[test]
        fn test_offer_backup_keeps_lowest_loss() {
            let mut ind = population(1).individuals()[0].clone();
            assert!(ind.offer_backup(5.0));
            assert!(!ind.offer_backup(6.0));
            assert!(!ind.offer_backup(f32::NAN));
            assert!(ind.offer_backup(4.0));
            assert_eq!(ind.backup_loss(), Some(4.0));
        }

        #[test]
        fn test_restore_backups_below_threshold() {
            let mut population = population(3);
            let originals: Vec<Network> = population
                .individuals()
                .iter()
                .map(|ind| ind.network().clone())
                .collect();
            for (i, loss) in [(0, 100.0), (1, 9000.0)] {
                let ind = population.individual_mut(i).unwrap();
                ind.offer_backup(loss);
                weights::mutate(&mut ind.network, 0.5, &mut Pcg32::seed_from_u64(3));
            }
            population.individual_mut(2).unwrap().network.scale_learning_rate(0.5);

            assert_eq!(population.restore_backups(5000.0), 1);
            assert_eq!(population.individuals()[0].network(), &originals[0]);
            assert_ne!(population.individuals()[1].network(), &originals[1]);
            assert_ne!(population.individuals()[2].network(), &originals[2]);
        }
    }

    mod persistence {
        use super::*;

        #[test]
        fn test_snapshot_round_trip() {
            let mut population = population(3);
            population.assign_scores(&[1, 2, 3]);
            population.record_hall_of_fame(10);
            let snapshot = population.snapshot();
            let json = serde_json::to_string(&snapshot).unwrap();
            let decoded: PopulationSnapshot = serde_json::from_str(&json).unwrap();
            assert_eq!(decoded, snapshot);

            let restored = Population::from_snapshot(&decoded, 20).unwrap();
            assert_eq!(restored.len(), 3);
            assert_eq!(restored.hall_of_fame().len(), 1);
            for (a, b) in restored.individuals().iter().zip(population.individuals()) {
                assert_eq!(a.network().to_checkpoint(), b.network().to_checkpoint());
            }
        }

        #[test]
        fn test_empty_roster_is_rejected() {
            let mut snapshot = population(1).snapshot();
            snapshot.roster.clear();
            assert_eq!(
                Population::from_snapshot(&snapshot, 20),
                Err(SnapshotError::EmptyRoster)
            );
        }

        #[test]
        fn test_hall_of_fame_is_bounded() {
            let mut population = population(2);
            population.assign_scores(&[0, 5]);
            for _ in 0..4 {
                population.record_hall_of_fame(2);
            }
            assert_eq!(population.hall_of_fame().len(), 2);
            assert!(population.hall_of_fame().all(|e| e.score == 5));
        }
    }
}
