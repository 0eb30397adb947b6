//! Supervised training of roster networks from the replay buffer.
//!
//! # Safeguards
//!
//! Training never aborts a run. Instead:
//!
//! - Batches the network rejects (non-finite or above the loss ceiling) are skipped and
//!   counted
//! - A [`LossMonitor`] per network cuts the learning rate on a plateau or on stagnation
//! - [`check_stability`] inspects the run-level loss history after each generation and
//!   reports explosions and divergence to the caller

use octaflip_evaluator::{network::Network, position_encoder};
use octaflip_stats::{descriptive::DescriptiveStats, window::RollingWindow};
use rand::{Rng, seq::SliceRandom as _};
use serde::{Deserialize, Serialize};

use crate::{config::TrainerConfig, match_runner::TrainingSample, replay_buffer::ReplayBuffer};

#[derive(Debug, Clone, Copy, PartialEq, Eq, derive_more::Display)]
pub enum SkipReason {
    #[display("insufficient data")]
    InsufficientData,
}

/// Why a learning rate was cut.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, derive_more::Display)]
pub enum LrCut {
    #[display("plateau")]
    Plateau,
    #[display("stagnation")]
    Stagnation,
}

/// Rolling view of one network's batch losses.
#[derive(Debug, Clone, PartialEq)]
pub struct LossMonitor {
    window: RollingWindow,
    best_mean: Option<f32>,
    stalled_checks: usize,
}

impl LossMonitor {
    #[must_use]
    pub fn new(window: usize) -> Self {
        Self {
            window: RollingWindow::new(window),
            best_mean: None,
            stalled_checks: 0,
        }
    }

    #[must_use]
    pub fn window(&self) -> &RollingWindow {
        &self.window
    }

    /// Records a batch loss and returns [`LrCut::Plateau`] once the windowed mean has
    /// failed to improve for more than `patience` consecutive checks.
    pub fn record(&mut self, loss: f32, patience: usize) -> Option<LrCut> {
        self.window.push(loss);
        if !self.window.is_full() {
            return None;
        }
        let mean = self.window.mean()?;
        match self.best_mean {
            Some(best) if mean >= best => self.stalled_checks += 1,
            _ => {
                self.best_mean = Some(mean);
                self.stalled_checks = 0;
            }
        }
        if self.stalled_checks > patience {
            self.stalled_checks = 0;
            return Some(LrCut::Plateau);
        }
        None
    }

    /// A full window whose standard deviation is below `min_std`.
    #[must_use]
    pub fn is_stagnant(&self, min_std: f32) -> bool {
        self.window.is_full() && self.window.stats().is_some_and(|s| s.std_dev < min_std)
    }
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct TrainingReport {
    pub skipped: Option<SkipReason>,
    pub batches: usize,
    pub skipped_batches: usize,
    pub positions: usize,
    pub mean_loss: Option<f32>,
    pub lr_cuts: Vec<LrCut>,
    pub learning_rate: f32,
}

/// Trains `network` for the configured epochs on samples drawn from `buffer`.
#[expect(
    clippy::cast_precision_loss,
    clippy::cast_possible_truncation,
    clippy::cast_sign_loss
)]
pub fn train_network<R>(
    network: &mut Network,
    monitor: &mut LossMonitor,
    buffer: &ReplayBuffer,
    config: &TrainerConfig,
    generation: u32,
    rng: &mut R,
) -> TrainingReport
where
    R: Rng,
{
    let mut report = TrainingReport {
        learning_rate: network.learning_rate(),
        ..TrainingReport::default()
    };
    if buffer.len() < config.batch_size {
        report.skipped = Some(SkipReason::InsufficientData);
        return report;
    }

    let augment = config.augment_interval > 0 && generation % config.augment_interval == 0;
    let draw_size = buffer.len().min(config.batch_size * config.batches_per_epoch);
    let ceiling = network.config().loss_ceiling;
    let mut total_loss = 0.0;

    for epoch in 0..config.epochs {
        let mut draw = buffer.sample(draw_size, config.recency_bias, rng);
        if augment && epoch == 0 {
            let extra = (draw.len() as f32 * config.augment_fraction) as usize;
            let rotated: Vec<_> = draw[..extra.min(draw.len())]
                .iter()
                .map(TrainingSample::rotated_180)
                .collect();
            draw.extend(rotated);
        }
        draw.shuffle(rng);

        for batch in draw.chunks_exact(config.batch_size) {
            let inputs = position_encoder::encode_batch(batch.iter().map(|s| (&s.board, s.mover)));
            let targets: Vec<f32> = batch.iter().map(|s| s.label).collect();
            let ctx = network.forward_training(inputs, rng);
            let output = network.backward(&ctx, &targets, ctx.predictions());
            if !output.status.is_applied() || !output.loss.is_finite() || output.loss > ceiling {
                report.skipped_batches += 1;
                continue;
            }
            report.batches += 1;
            report.positions += batch.len();
            total_loss += output.loss;
            if let Some(cut) = monitor.record(output.loss, config.patience) {
                network.scale_learning_rate(config.patience_lr_factor);
                report.lr_cuts.push(cut);
            }
        }
    }

    if monitor.is_stagnant(config.stagnation_std) {
        network.scale_learning_rate(config.stagnation_lr_factor);
        report.lr_cuts.push(LrCut::Stagnation);
    }
    if report.batches > 0 {
        report.mean_loss = Some(total_loss / report.batches as f32);
    }
    report.learning_rate = network.learning_rate();
    report
}

#[derive(Debug, Clone, Copy, PartialEq, derive_more::IsVariant)]
pub enum StabilitySignal {
    /// Recent mean loss above the explosion threshold.
    Explosion { mean_loss: f32 },
    /// Loss rose sharply in most recent steps.
    Divergence,
}

/// Inspects the run-level loss history, newest last. Explosion takes precedence.
#[must_use]
pub fn check_stability(history: &RollingWindow, config: &TrainerConfig) -> Option<StabilitySignal> {
    if config.explosion_window > 0 && history.len() >= config.explosion_window {
        let mean_loss = DescriptiveStats::new(history.recent(config.explosion_window))
            .map_or(0.0, |s| s.mean);
        if mean_loss > config.explosion_threshold {
            return Some(StabilitySignal::Explosion { mean_loss });
        }
    }

    if history.len() > config.divergence_window {
        let recent: Vec<f32> = history.recent(config.divergence_window + 1).collect();
        let rises = recent
            .windows(2)
            .filter(|w| w[0] > 0.0 && w[1] > w[0] * config.divergence_ratio)
            .count();
        if rises >= config.divergence_min_rises {
            return Some(StabilitySignal::Divergence);
        }
    }
    None
}

#[cfg(test)]
mod tests {
    use octaflip_engine::{GameState, Player};
    use octaflip_evaluator::network::NetworkConfig;
    use rand::SeedableRng as _;
    use rand_pcg::Pcg32;

    use super::*;

    fn history(values: &[f32]) -> RollingWindow {
        let mut window = RollingWindow::new(100);
        for &v in values {
            window.push(v);
        }
        window
    }

    mod monitor {
        use super::*;

        #[test]
        fn test_plateau_cuts_after_patience() {
            let mut monitor = LossMonitor::new(3);
            let mut cuts = vec![];
            for _ in 0..20 {
                cuts.push(monitor.record(1.0, 10));
            }
            // window full at 3, then 11 non-improving checks trigger at record 14
            let first = cuts.iter().position(Option::is_some).unwrap();
            assert_eq!(first, 13);
            assert_eq!(cuts[first], Some(LrCut::Plateau));
        }

        #[test]
        fn test_improving_losses_never_cut() {
            let mut monitor = LossMonitor::new(3);
            for i in 0..50 {
                #[expect(clippy::cast_precision_loss)]
                let loss = 100.0 - i as f32;
                assert_eq!(monitor.record(loss, 2), None);
            }
        }

        #[test]
        fn test_stagnation_needs_full_flat_window() {
            let mut monitor = LossMonitor::new(4);
            for _ in 0..3 {
                monitor.record(2.0, 10);
            }
            assert!(!monitor.is_stagnant(0.01));
            monitor.record(2.0, 10);
            assert!(monitor.is_stagnant(0.01));
            monitor.record(3.0, 10);
            assert!(!monitor.is_stagnant(0.01));
        }
    }

    mod stability {
        use super::*;

        #[test]
        fn test_explosion_uses_recent_mean() {
            let config = TrainerConfig::default();
            let calm = history(&[1e6, 10.0, 10.0, 10.0, 10.0, 10.0]);
            assert_eq!(check_stability(&calm, &config), None);

            let exploded = history(&[10.0, 9000.0, 9000.0, 9000.0, 9000.0, 9000.0]);
            assert_eq!(
                check_stability(&exploded, &config),
                Some(StabilitySignal::Explosion { mean_loss: 9000.0 })
            );
            assert_eq!(check_stability(&history(&[9000.0; 4]), &config), None);
        }

        #[test]
        fn test_divergence_counts_sharp_rises() {
            let config = TrainerConfig::default();
            let diverging = history(&[1.0, 2.0, 4.0, 3.0, 6.0]);
            assert_eq!(
                check_stability(&diverging, &config),
                Some(StabilitySignal::Divergence)
            );
            let noisy = history(&[1.0, 2.0, 2.5, 3.0, 6.0]);
            assert_eq!(check_stability(&noisy, &config), None);
        }
    }

    mod training {
        use crate::match_runner::TrainingSample;

        use super::*;

        fn small_config() -> TrainerConfig {
            TrainerConfig {
                batch_size: 16,
                batches_per_epoch: 4,
                ..TrainerConfig::default()
            }
        }

        fn buffer(len: usize) -> ReplayBuffer {
            let mut rng = Pcg32::seed_from_u64(9);
            let mut state = GameState::new();
            let mut buffer = ReplayBuffer::new(1000);
            for _ in 0..len {
                if state.is_terminal() {
                    state = GameState::new();
                }
                let mover = state.to_move();
                let label = if mover == Player::Red { 50.0 } else { -50.0 };
                buffer.add([TrainingSample {
                    board: *state.board(),
                    mover,
                    hash: state.position_hash(),
                    label,
                }]);
                let moves = state.legal_moves();
                let mv = moves.get(rng.random_range(0..moves.len().max(1))).copied();
                state.apply_move(mv).unwrap();
            }
            buffer
        }

        fn network() -> Network {
            Network::new(NetworkConfig::default(), &mut Pcg32::seed_from_u64(1)).unwrap()
        }

        #[test]
        fn test_skips_small_buffer() {
            let mut network = network();
            let before = network.clone();
            let mut monitor = LossMonitor::new(20);
            let report = train_network(
                &mut network,
                &mut monitor,
                &buffer(10),
                &small_config(),
                1,
                &mut Pcg32::seed_from_u64(0),
            );
            assert_eq!(report.skipped, Some(SkipReason::InsufficientData));
            assert_eq!(report.batches, 0);
            assert_eq!(network, before);
        }

        #[test]
        fn test_trains_full_batches() {
            let mut network = network();
            let mut monitor = LossMonitor::new(20);
            let config = small_config();
            let report = train_network(
                &mut network,
                &mut monitor,
                &buffer(100),
                &config,
                1,
                &mut Pcg32::seed_from_u64(0),
            );
            assert_eq!(report.skipped, None);
            // 64 samples per epoch, 2 epochs
            assert_eq!(report.batches + report.skipped_batches, 8);
            assert_eq!(report.positions, report.batches * 16);
            assert!(report.mean_loss.is_some_and(f32::is_finite));
            assert_eq!(network.step(), report.batches as u64);
        }

        #[test]
        fn test_augmentation_adds_rotated_batches() {
            let mut network = network();
            let mut monitor = LossMonitor::new(20);
            let config = TrainerConfig {
                augment_fraction: 0.5,
                ..small_config()
            };
            let report = train_network(
                &mut network,
                &mut monitor,
                &buffer(100),
                &config,
                10,
                &mut Pcg32::seed_from_u64(0),
            );
            // first epoch: 64 + 32 samples
            assert_eq!(report.batches + report.skipped_batches, 10);
        }
    }
}
