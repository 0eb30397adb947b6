use rand::Rng;
use rand_distr::StandardNormal;

use super::{matrix::Matrix, optimizer::AdamMoments};

/// He initialization is scaled down so that fresh networks start near zero output.
const INIT_SCALE: f32 = 0.1;

/// Relative slack before a weight matrix counts as over its norm cap.
pub(crate) const NORM_TOLERANCE: f32 = 1e-5;

/// Learnable scale/shift plus running statistics of one batch-normalized layer.
#[derive(Debug, Clone, PartialEq)]
pub struct BatchNorm {
    pub(crate) gamma: Vec<f32>,
    pub(crate) beta: Vec<f32>,
    pub(crate) running_mean: Vec<f32>,
    pub(crate) running_var: Vec<f32>,
    pub(crate) gamma_moments: AdamMoments,
    pub(crate) beta_moments: AdamMoments,
}

impl BatchNorm {
    #[must_use]
    pub fn new(width: usize) -> Self {
        Self {
            gamma: vec![1.0; width],
            beta: vec![0.0; width],
            running_mean: vec![0.0; width],
            running_var: vec![1.0; width],
            gamma_moments: AdamMoments::zeros(width),
            beta_moments: AdamMoments::zeros(width),
        }
    }

    #[must_use]
    pub fn width(&self) -> usize {
        self.gamma.len()
    }

    #[must_use]
    pub fn gamma(&self) -> &[f32] {
        &self.gamma
    }

    #[must_use]
    pub fn beta(&self) -> &[f32] {
        &self.beta
    }

    #[must_use]
    pub fn running_mean(&self) -> &[f32] {
        &self.running_mean
    }

    #[must_use]
    pub fn running_var(&self) -> &[f32] {
        &self.running_var
    }

    /// Folds batch statistics into the running estimates.
    ///
    /// Returns `false` and leaves the estimates alone when any statistic is not finite.
    pub(crate) fn update_running(&mut self, mean: &[f32], var: &[f32], momentum: f32) -> bool {
        if !mean.iter().chain(var).all(|v| v.is_finite()) {
            return false;
        }
        for (r, &m) in self.running_mean.iter_mut().zip(mean) {
            *r = (1.0 - momentum) * *r + momentum * m;
        }
        for (r, &v) in self.running_var.iter_mut().zip(var) {
            *r = (1.0 - momentum) * *r + momentum * v;
        }
        true
    }
}

/// Fully connected layer: `y = x · W + b` with `W` stored `inputs × outputs`.
#[derive(Debug, Clone, PartialEq)]
pub struct DenseLayer {
    pub(crate) weights: Matrix,
    pub(crate) bias: Vec<f32>,
    pub(crate) norm: Option<BatchNorm>,
    pub(crate) weight_moments: AdamMoments,
    pub(crate) bias_moments: AdamMoments,
}

impl DenseLayer {
    /// He-initialized layer (scaled by 0.1) with zero bias.
    pub fn new<R>(inputs: usize, outputs: usize, normalized: bool, rng: &mut R) -> Self
    where
        R: Rng + ?Sized,
    {
        #[expect(clippy::cast_precision_loss)]
        let std_dev = (2.0 / inputs as f32).sqrt() * INIT_SCALE;
        let weights = Matrix::from_fn(inputs, outputs, |_, _| {
            rng.sample::<f32, _>(StandardNormal) * std_dev
        });
        Self::from_parts(weights, vec![0.0; outputs], normalized.then(|| BatchNorm::new(outputs)))
    }

    pub(crate) fn from_parts(weights: Matrix, bias: Vec<f32>, norm: Option<BatchNorm>) -> Self {
        let weight_moments = AdamMoments::zeros(weights.as_slice().len());
        let bias_moments = AdamMoments::zeros(bias.len());
        Self {
            weights,
            bias,
            norm,
            weight_moments,
            bias_moments,
        }
    }

    #[must_use]
    pub fn inputs(&self) -> usize {
        self.weights.rows()
    }

    #[must_use]
    pub fn outputs(&self) -> usize {
        self.weights.cols()
    }

    #[must_use]
    pub fn weights(&self) -> &Matrix {
        &self.weights
    }

    #[must_use]
    pub fn bias(&self) -> &[f32] {
        &self.bias
    }

    #[must_use]
    pub fn norm(&self) -> Option<&BatchNorm> {
        self.norm.as_ref()
    }

    /// `x · W + b` for a batch of rows.
    #[must_use]
    pub fn affine(&self, inputs: &Matrix) -> Matrix {
        let mut z = inputs.matmul(&self.weights);
        z.add_row_vector(&self.bias);
        z
    }

    /// Scales the weight matrix down to `max_norm` when its Frobenius norm exceeds it.
    ///
    /// Norms within [`NORM_TOLERANCE`] of the cap are left alone, which makes a second
    /// call a no-op.
    pub fn cap_weight_norm(&mut self, max_norm: f32) {
        let norm = self.weights.frobenius_norm();
        if norm > max_norm * (1.0 + NORM_TOLERANCE) {
            self.weights.scale(max_norm / norm);
        }
    }

    /// Forgets optimizer state, e.g. after loading parameters.
    pub fn reset_moments(&mut self) {
        self.weight_moments = AdamMoments::zeros(self.weights.as_slice().len());
        self.bias_moments = AdamMoments::zeros(self.bias.len());
        if let Some(norm) = &mut self.norm {
            norm.gamma_moments = AdamMoments::zeros(norm.gamma.len());
            norm.beta_moments = AdamMoments::zeros(norm.beta.len());
        }
    }
}
