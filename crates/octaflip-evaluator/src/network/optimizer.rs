use serde::{Deserialize, Serialize};

use super::config::AdamConfig;

const MAX_ABS_GRAD: f32 = 1.0;

/// First and second moment estimates for one parameter tensor.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AdamMoments {
    momentum: Vec<f32>,
    velocity: Vec<f32>,
}

impl AdamMoments {
    #[must_use]
    pub fn zeros(len: usize) -> Self {
        Self {
            momentum: vec![0.0; len],
            velocity: vec![0.0; len],
        }
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.momentum.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.momentum.is_empty()
    }
}

/// Scalars shared by every tensor updated in one optimizer step.
#[derive(Debug, Clone, Copy)]
pub(crate) struct AdamStep {
    pub(crate) learning_rate: f32,
    pub(crate) beta1: f32,
    pub(crate) beta2: f32,
    pub(crate) epsilon: f32,
    pub(crate) bias_correction1: f32,
    pub(crate) bias_correction2: f32,
    pub(crate) update_clamp: f32,
    pub(crate) param_clamp: f32,
}

impl AdamStep {
    #[expect(clippy::cast_possible_truncation, clippy::cast_possible_wrap)]
    pub(crate) fn new(config: &AdamConfig, learning_rate: f32, step: u64) -> Self {
        let t = step.min(i32::MAX as u64) as i32;
        Self {
            learning_rate,
            beta1: config.beta1,
            beta2: config.beta2,
            epsilon: config.epsilon,
            bias_correction1: 1.0 - config.beta1.powi(t),
            bias_correction2: 1.0 - config.beta2.powi(t),
            update_clamp: config.update_clamp,
            param_clamp: config.param_clamp,
        }
    }

    /// Applies one Adam update to `params` in place.
    ///
    /// Each gradient is clipped to `±1`, each step to `±update_clamp`, and each
    /// resulting parameter to `±param_clamp`.
    pub(crate) fn apply(self, params: &mut [f32], grads: &[f32], moments: &mut AdamMoments) {
        debug_assert_eq!(params.len(), grads.len());
        debug_assert_eq!(params.len(), moments.len());
        for (((p, &g), m), v) in params
            .iter_mut()
            .zip(grads)
            .zip(&mut moments.momentum)
            .zip(&mut moments.velocity)
        {
            let g = g.clamp(-MAX_ABS_GRAD, MAX_ABS_GRAD);
            *m = self.beta1 * *m + (1.0 - self.beta1) * g;
            *v = self.beta2 * *v + (1.0 - self.beta2) * g * g;
            let m_hat = *m / self.bias_correction1;
            let v_hat = *v / self.bias_correction2;
            let update = (self.learning_rate * m_hat / (v_hat.sqrt() + self.epsilon))
                .clamp(-self.update_clamp, self.update_clamp);
            *p = (*p - update).clamp(-self.param_clamp, self.param_clamp);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_first_step_moves_against_gradient() {
        let config = AdamConfig::default();
        let step = AdamStep::new(&config, 1e-3, 1);
        let mut params = vec![0.5, -0.5, 0.0];
        let mut moments = AdamMoments::zeros(3);
        step.apply(&mut params, &[0.2, -0.2, 0.0], &mut moments);
        // the bias-corrected first step has magnitude ~learning_rate
        assert!((params[0] - (0.5 - 1e-3)).abs() < 1e-6);
        assert!((params[1] - (-0.5 + 1e-3)).abs() < 1e-6);
        assert_eq!(params[2], 0.0);
    }

    #[test]
    fn test_clamps() {
        let config = AdamConfig {
            param_clamp: 1.0,
            update_clamp: 0.01,
            ..AdamConfig::default()
        };
        let step = AdamStep::new(&config, 10.0, 1);
        let mut params = vec![0.0, 1.0];
        let mut moments = AdamMoments::zeros(2);
        step.apply(&mut params, &[1.0, -1.0], &mut moments);
        assert!((params[0] + 0.01).abs() < 1e-6);
        assert_eq!(params[1], 1.0);
    }
}
