//! Counters and histories of a training run, persisted next to the population.

use octaflip_stats::{trend, window::RollingWindow};
use serde::{Deserialize, Serialize};

use crate::evaluation::ArenaReport;

/// Per-network mean losses kept for the stability checks.
pub const LOSS_HISTORY_LEN: usize = 100;
/// Per-generation baseline win rates kept for the adaptation trend.
pub const WIN_RATE_HISTORY_LEN: usize = 20;
/// Fewest win-rate points a trend is fitted to.
pub const MIN_TREND_POINTS: usize = 3;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RunStatistics {
    /// Generations completed.
    pub generation: u32,
    pub games_played: u64,
    pub positions_generated: u64,
    pub positions_trained: u64,
    pub failed_tasks: u64,
    pub explosions: u32,
    pub divergences: u32,
    /// Wall-clock training time across all sessions.
    pub elapsed_secs: f64,
    pub loss_history: RollingWindow,
    pub win_rate_history: RollingWindow,
    pub last_evaluation: Option<ArenaReport>,
}

impl Default for RunStatistics {
    fn default() -> Self {
        Self {
            generation: 0,
            games_played: 0,
            positions_generated: 0,
            positions_trained: 0,
            failed_tasks: 0,
            explosions: 0,
            divergences: 0,
            elapsed_secs: 0.0,
            loss_history: RollingWindow::new(LOSS_HISTORY_LEN),
            win_rate_history: RollingWindow::new(WIN_RATE_HISTORY_LEN),
            last_evaluation: None,
        }
    }
}

impl RunStatistics {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Slope of the last `window` win rates, once at least [`MIN_TREND_POINTS`] exist.
    #[must_use]
    pub fn win_rate_slope(&self, window: usize) -> Option<f32> {
        if self.win_rate_history.len() < MIN_TREND_POINTS {
            return None;
        }
        trend::slope(self.win_rate_history.recent(window.max(MIN_TREND_POINTS)))
    }

    /// Mean of the recorded network losses.
    #[must_use]
    pub fn mean_loss(&self) -> Option<f32> {
        self.loss_history.mean()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_slope_needs_three_points() {
        let mut stats = RunStatistics::new();
        stats.win_rate_history.push(0.1);
        stats.win_rate_history.push(0.2);
        assert_eq!(stats.win_rate_slope(10), None);
        stats.win_rate_history.push(0.3);
        let slope = stats.win_rate_slope(10).unwrap();
        assert!((slope - 0.1).abs() < 1e-6);
    }

    #[test]
    fn test_slope_uses_recent_window() {
        let mut stats = RunStatistics::new();
        for rate in [0.9, 0.8, 0.7, 0.1, 0.2, 0.3] {
            stats.win_rate_history.push(rate);
        }
        assert!(stats.win_rate_slope(3).unwrap() > 0.0);
        assert!(stats.win_rate_slope(20).unwrap() < 0.0);
    }

    #[test]
    fn test_missing_fields_take_defaults() {
        let stats: RunStatistics = serde_json::from_str(r#"{"generation": 7}"#).unwrap();
        assert_eq!(stats.generation, 7);
        assert_eq!(stats.loss_history.capacity(), LOSS_HISTORY_LEN);
        assert!(stats.last_evaluation.is_none());

        let json = serde_json::to_string(&stats).unwrap();
        assert_eq!(serde_json::from_str::<RunStatistics>(&json).unwrap(), stats);
    }
}
