//! Parameter perturbation for offspring networks.
//!
//! Mutation adds Gaussian noise to a copy of a parent network. Deeper layers and biases
//! receive smaller noise, so the input layer explores most:
//!
//! | Layer | Weight factor | Bias factor |
//! |-------|---------------|-------------|
//! | 0     | 1.0           | 0.1         |
//! | 1     | 0.8           | 0.08        |
//! | 2+    | 0.6           | 0.05        |
//!
//! Normalization scale and shift are never mutated. After mutation every weight matrix is
//! brought back under the norm cap with [`Network::normalize_weights`].

use octaflip_evaluator::network::{Network, ParamKind};
use rand::Rng;
use rand_distr::Normal;

const WEIGHT_FACTORS: [f32; 3] = [1.0, 0.8, 0.6];
const BIAS_FACTORS: [f32; 3] = [0.1, 0.08, 0.05];

/// Generations over which the strength decays by [`GENERATION_DECAY`].
const DECAY_PERIOD: f32 = 100.0;
const GENERATION_DECAY: f32 = 0.98;

/// Noise standard deviation for a parameter tensor of `kind` in `layer`.
///
/// Returns `None` for tensors that are not mutated.
#[must_use]
pub fn noise_scale(strength: f32, layer: usize, kind: ParamKind) -> Option<f32> {
    let factors = match kind {
        ParamKind::Weights => &WEIGHT_FACTORS,
        ParamKind::Bias => &BIAS_FACTORS,
        ParamKind::Gamma | ParamKind::Beta => return None,
    };
    Some(strength * factors[layer.min(factors.len() - 1)])
}

/// Shrinks `strength` by 2% every hundred generations.
#[expect(clippy::cast_precision_loss)]
#[must_use]
pub fn generation_scaled(strength: f32, generation: u32) -> f32 {
    strength * GENERATION_DECAY.powf(generation as f32 / DECAY_PERIOD)
}

/// Applies Gaussian mutation with base standard deviation `strength` in place.
///
/// A non-positive or non-finite strength leaves the network unchanged.
pub fn mutate<R>(network: &mut Network, strength: f32, rng: &mut R)
where
    R: Rng + ?Sized,
{
    if !(strength.is_finite() && strength > 0.0) {
        return;
    }
    for (role, values) in network.parameters_mut() {
        let Some(sigma) = noise_scale(strength, role.layer, role.kind) else {
            continue;
        };
        let Ok(normal) = Normal::new(0.0, sigma) else {
            continue;
        };
        for v in values {
            *v += rng.sample(normal);
        }
    }
    network.normalize_weights();
}

#[cfg(test)]
mod tests {
    use octaflip_evaluator::network::NetworkConfig;
    use rand::SeedableRng as _;
    use rand_pcg::Pcg32;

    use super::*;

    fn network() -> Network {
        Network::new(NetworkConfig::default(), &mut Pcg32::seed_from_u64(0)).unwrap()
    }

    #[test]
    fn test_noise_scale_per_layer() {
        assert_eq!(noise_scale(1.0, 0, ParamKind::Weights), Some(1.0));
        assert_eq!(noise_scale(1.0, 1, ParamKind::Bias), Some(0.08));
        assert_eq!(noise_scale(1.0, 5, ParamKind::Weights), Some(0.6));
        assert_eq!(noise_scale(1.0, 0, ParamKind::Gamma), None);
        assert_eq!(noise_scale(1.0, 0, ParamKind::Beta), None);
    }

    #[test]
    fn test_generation_scaling() {
        assert_eq!(generation_scaled(0.01, 0), 0.01);
        assert!((generation_scaled(0.01, 100) - 0.0098).abs() < 1e-7);
    }

    #[test]
    fn test_mutation_skips_normalization_parameters() {
        let parent = network();
        let mut child = parent.clone();
        mutate(&mut child, 0.01, &mut Pcg32::seed_from_u64(1));

        for (before, after) in parent.layers().iter().zip(child.layers()) {
            assert_ne!(before.weights(), after.weights());
            assert_ne!(before.bias(), after.bias());
            if let (Some(a), Some(b)) = (before.norm(), after.norm()) {
                assert_eq!(a.gamma(), b.gamma());
                assert_eq!(a.beta(), b.beta());
            }
        }
    }

    #[test]
    fn test_mutation_respects_norm_cap() {
        let mut child = network();
        mutate(&mut child, 10.0, &mut Pcg32::seed_from_u64(2));
        let cap = child.config().max_weight_norm;
        for layer in child.layers() {
            assert!(layer.weights().frobenius_norm() <= cap * (1.0 + 1e-4));
        }
    }

    #[test]
    fn test_mutation_is_seeded() {
        let mut a = network();
        let mut b = network();
        mutate(&mut a, 0.01, &mut Pcg32::seed_from_u64(3));
        mutate(&mut b, 0.01, &mut Pcg32::seed_from_u64(3));
        assert_eq!(a, b);
    }

    #[test]
    fn test_invalid_strength_is_noop() {
        let parent = network();
        for strength in [0.0, -1.0, f32::NAN] {
            let mut child = parent.clone();
            mutate(&mut child, strength, &mut Pcg32::seed_from_u64(4));
            assert_eq!(child, parent);
        }
    }
}
