//! Bounded FIFO of labelled positions with recency-weighted sampling.

use std::collections::VecDeque;

use rand::{
    Rng,
    distr::{Distribution as _, weighted::WeightedIndex},
};
use serde::{Deserialize, Serialize};

use crate::match_runner::TrainingSample;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReplayBuffer {
    capacity: usize,
    samples: VecDeque<TrainingSample>,
}

impl ReplayBuffer {
    #[must_use]
    pub fn new(capacity: usize) -> Self {
        Self {
            capacity,
            samples: VecDeque::with_capacity(capacity.min(1 << 16)),
        }
    }

    #[must_use]
    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Changes the capacity, evicting the oldest samples if needed.
    pub fn set_capacity(&mut self, capacity: usize) {
        self.capacity = capacity;
        self.evict();
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.samples.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }

    /// Oldest first.
    pub fn iter(&self) -> impl Iterator<Item = &TrainingSample> + '_ {
        self.samples.iter()
    }

    /// Appends `samples` as the newest entries and returns how many old entries were evicted.
    pub fn add<I>(&mut self, samples: I) -> usize
    where
        I: IntoIterator<Item = TrainingSample>,
    {
        self.samples.extend(samples);
        self.evict()
    }

    /// Drops up to `n` of the oldest samples and returns how many were dropped.
    pub fn discard_oldest(&mut self, n: usize) -> usize {
        let n = n.min(self.samples.len());
        self.samples.drain(..n);
        n
    }

    fn evict(&mut self) -> usize {
        let excess = self.samples.len().saturating_sub(self.capacity);
        self.samples.drain(..excess);
        excess
    }

    /// Draws `n` samples with replacement.
    ///
    /// The entry of age `k` (0 = newest) is weighted `recency_bias^k`. Weights that cannot
    /// form a distribution fall back to uniform sampling.
    pub fn sample<R>(&self, n: usize, recency_bias: f64, rng: &mut R) -> Vec<TrainingSample>
    where
        R: Rng + ?Sized,
    {
        if self.samples.is_empty() {
            return vec![];
        }
        let len = self.samples.len();
        let mut weights = vec![0.0; len];
        let mut weight = 1.0;
        for w in weights.iter_mut().rev() {
            *w = weight;
            weight *= recency_bias;
        }
        match WeightedIndex::new(&weights) {
            Ok(dist) => (0..n).map(|_| self.samples[dist.sample(rng)]).collect(),
            Err(_) => (0..n)
                .map(|_| self.samples[rng.random_range(0..len)])
                .collect(),
        }
    }
}
