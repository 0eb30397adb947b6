use std::collections::VecDeque;

use serde::{Deserialize, Serialize};

use crate::descriptive::DescriptiveStats;

/// Keeps the `capacity` most recent values, dropping the oldest first.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RollingWindow {
    capacity: usize,
    values: VecDeque<f32>,
}

impl RollingWindow {
    #[must_use]
    pub fn new(capacity: usize) -> Self {
        Self {
            capacity,
            values: VecDeque::with_capacity(capacity),
        }
    }

    pub fn push(&mut self, value: f32) {
        if self.capacity == 0 {
            return;
        }
        while self.values.len() >= self.capacity {
            self.values.pop_front();
        }
        self.values.push_back(value);
    }

    pub fn clear(&mut self) {
        self.values.clear();
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.values.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    #[must_use]
    pub fn is_full(&self) -> bool {
        self.values.len() >= self.capacity
    }

    #[must_use]
    pub fn capacity(&self) -> usize {
        self.capacity
    }

    #[must_use]
    pub fn last(&self) -> Option<f32> {
        self.values.back().copied()
    }

    /// Values from oldest to newest.
    pub fn iter(&self) -> impl DoubleEndedIterator<Item = f32> + ExactSizeIterator + '_ {
        self.values.iter().copied()
    }

    /// The `n` most recent values, oldest first.
    pub fn recent(&self, n: usize) -> impl Iterator<Item = f32> + '_ {
        self.values.iter().skip(self.values.len().saturating_sub(n)).copied()
    }

    #[expect(clippy::cast_precision_loss)]
    #[must_use]
    pub fn mean(&self) -> Option<f32> {
        if self.values.is_empty() {
            return None;
        }
        Some(self.values.iter().sum::<f32>() / self.values.len() as f32)
    }

    #[must_use]
    pub fn stats(&self) -> Option<DescriptiveStats> {
        DescriptiveStats::new(self.iter())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_evicts_oldest() {
        let mut window = RollingWindow::new(3);
        for v in [1.0, 2.0, 3.0, 4.0] {
            window.push(v);
        }
        assert!(window.is_full());
        assert_eq!(window.iter().collect::<Vec<_>>(), [2.0, 3.0, 4.0]);
        assert_eq!(window.recent(2).collect::<Vec<_>>(), [3.0, 4.0]);
        assert_eq!(window.last(), Some(4.0));
        assert_eq!(window.mean(), Some(3.0));
    }

    #[test]
    fn test_zero_capacity_stays_empty() {
        let mut window = RollingWindow::new(0);
        window.push(1.0);
        assert!(window.is_empty());
        assert_eq!(window.mean(), None);
    }

    #[test]
    fn test_serde_keeps_capacity() {
        let mut window = RollingWindow::new(2);
        window.push(0.5);
        let json = serde_json::to_string(&window).unwrap();
        let restored: RollingWindow = serde_json::from_str(&json).unwrap();
        assert_eq!(restored, window);
        assert_eq!(restored.capacity(), 2);
    }
}
