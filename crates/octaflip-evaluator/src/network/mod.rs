//! Feed-forward value network with manual backpropagation.
//!
//! The network maps a [`FeatureVector`](crate::position_encoder::FeatureVector) to a
//! scalar in `±output_scale`. Every hidden layer runs
//!
//! ```text
//! affine → clip(±pre_activation_clip) → [batch norm] → activation → [dropout]
//! ```
//!
//! and the output layer runs `affine → clip → tanh · output_scale`.
//!
//! # Training Safeguards
//!
//! [`Network::backward`] never leaves the network in a non-finite state:
//!
//! - Non-finite predictions, labels or gradients skip the update
//! - Batches whose loss exceeds `loss_ceiling` skip the update
//! - Gradients are clipped per layer by norm and per element to `±1`
//! - Adam steps are clamped per element, and parameters to `±param_clamp`
//! - Weight matrices are rescaled to `max_weight_norm` after every update
//!
//! A skipped update reports its reason through [`UpdateStatus`] and always returns a
//! finite loss, so callers can log it without special cases.
//!
//! # Forward Contexts
//!
//! Intermediate activations are returned in an explicit [`ForwardContext`] instead of
//! being stashed on the network. [`Network::forward_inference`] takes `&self`, so many
//! threads can share a network for play.

use arrayvec::ArrayVec;
use rand::{Rng, RngCore};

use crate::position_encoder::FeatureVector;

pub use self::{
    checkpoint::*,
    config::*,
    context::ForwardContext,
    layer::{BatchNorm, DenseLayer},
    matrix::Matrix,
    optimizer::AdamMoments,
    quantize::*,
};

use self::{
    context::{HiddenTrace, NormTrace, OutputTrace},
    optimizer::AdamStep,
};

mod checkpoint;
mod config;
mod context;
mod layer;
pub mod loss;
mod matrix;
mod optimizer;
mod quantize;

/// Why [`Network::backward`] did or did not change the parameters.
#[derive(Debug, Clone, Copy, PartialEq, Eq, derive_more::IsVariant)]
pub enum UpdateStatus {
    Applied,
    /// Inputs or gradients were not finite, or shapes did not match.
    NonFinite,
    /// The batch loss exceeded the configured ceiling.
    LossCeiling,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BackwardOutput {
    /// Always finite.
    pub loss: f32,
    pub status: UpdateStatus,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ParamKind {
    Weights,
    Bias,
    Gamma,
    Beta,
}

/// Identifies a parameter tensor for mutation and export.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ParamRole {
    pub layer: usize,
    pub kind: ParamKind,
}

/// Deep copy of the layers (parameters, statistics and moments) for rollback.
#[derive(Debug, Clone, PartialEq)]
pub struct ParameterSnapshot {
    layers: Vec<DenseLayer>,
}

/// Per-feature `(mean, variance)` of a normalized layer, or gradients of its
/// `(gamma, beta)`.
type FeaturePair = Option<(Vec<f32>, Vec<f32>)>;

#[derive(Debug, Clone)]
pub(crate) struct LayerGradients {
    weights: Matrix,
    bias: Vec<f32>,
    norm: FeaturePair,
}

impl LayerGradients {
    /// Gradient tensors in [`Network::parameters_mut`] order.
    fn tensors(&self) -> impl Iterator<Item = &[f32]> {
        let mut tensors: ArrayVec<&[f32], 4> = ArrayVec::new();
        tensors.push(self.weights.as_slice());
        tensors.push(&self.bias);
        if let Some((gamma, beta)) = &self.norm {
            tensors.push(gamma);
            tensors.push(beta);
        }
        tensors.into_iter()
    }

    fn tensors_mut(&mut self) -> impl Iterator<Item = &mut [f32]> {
        let mut tensors: ArrayVec<&mut [f32], 4> = ArrayVec::new();
        tensors.push(self.weights.as_mut_slice());
        tensors.push(&mut self.bias);
        if let Some((gamma, beta)) = &mut self.norm {
            tensors.push(gamma);
            tensors.push(beta);
        }
        tensors.into_iter()
    }

    fn is_finite(&self) -> bool {
        self.tensors().flatten().all(|g| g.is_finite())
    }

    fn norm(&self) -> f32 {
        self.tensors().flatten().map(|g| g * g).sum::<f32>().sqrt()
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Network {
    config: NetworkConfig,
    layers: Vec<DenseLayer>,
    learning_rate: f32,
    step: u64,
    generation: u32,
    last_good_loss: Option<f32>,
}

impl Network {
    /// Freshly initialized network.
    pub fn new<R>(config: NetworkConfig, rng: &mut R) -> Result<Self, ConfigError>
    where
        R: Rng + ?Sized,
    {
        config.validate()?;
        let sizes = config.layer_sizes();
        let last = sizes.len() - 2;
        let layers = sizes
            .windows(2)
            .enumerate()
            .map(|(i, w)| DenseLayer::new(w[0], w[1], config.normalization && i < last, rng))
            .collect();
        Ok(Self {
            learning_rate: config.optimizer.learning_rate,
            config,
            layers,
            step: 0,
            generation: 0,
            last_good_loss: None,
        })
    }

    pub(crate) fn from_layers(
        config: NetworkConfig,
        layers: Vec<DenseLayer>,
        learning_rate: f32,
        step: u64,
        generation: u32,
    ) -> Self {
        Self {
            config,
            layers,
            learning_rate,
            step,
            generation,
            last_good_loss: None,
        }
    }

    #[must_use]
    pub fn config(&self) -> &NetworkConfig {
        &self.config
    }

    #[must_use]
    pub fn layers(&self) -> &[DenseLayer] {
        &self.layers
    }

    #[must_use]
    pub fn learning_rate(&self) -> f32 {
        self.learning_rate
    }

    pub fn set_learning_rate(&mut self, learning_rate: f32) {
        self.learning_rate = learning_rate.max(self.config.optimizer.min_learning_rate);
    }

    /// Multiplies the base learning rate, never going below the configured minimum.
    pub fn scale_learning_rate(&mut self, factor: f32) {
        self.set_learning_rate(self.learning_rate * factor);
    }

    /// Learning rate used by the next update: the base rate decayed per generation.
    #[must_use]
    pub fn effective_learning_rate(&self) -> f32 {
        let optimizer = &self.config.optimizer;
        let generation = i32::try_from(self.generation).unwrap_or(i32::MAX);
        (self.learning_rate * optimizer.generation_decay.powi(generation))
            .max(optimizer.min_learning_rate)
    }

    #[must_use]
    pub fn step(&self) -> u64 {
        self.step
    }

    #[must_use]
    pub fn generation(&self) -> u32 {
        self.generation
    }

    pub fn set_generation(&mut self, generation: u32) {
        self.generation = generation;
    }

    #[must_use]
    pub fn last_good_loss(&self) -> Option<f32> {
        self.last_good_loss
    }

    #[must_use]
    pub fn parameter_count(&self) -> usize {
        self.layers
            .iter()
            .map(|l| {
                let norm = l.norm.as_ref().map_or(0, |n| 2 * n.width());
                l.weights.as_slice().len() + l.bias.len() + norm
            })
            .sum()
    }

    /// Mutable access to every learnable tensor, layer by layer: weights, bias, then
    /// normalization scale and shift when present.
    pub fn parameters_mut(&mut self) -> impl Iterator<Item = (ParamRole, &mut [f32])> {
        self.layers.iter_mut().enumerate().flat_map(|(layer, l)| {
            let role = |kind| ParamRole { layer, kind };
            let mut tensors: ArrayVec<(ParamRole, &mut [f32]), 4> = ArrayVec::new();
            tensors.push((role(ParamKind::Weights), l.weights.as_mut_slice()));
            tensors.push((role(ParamKind::Bias), &mut l.bias));
            if let Some(norm) = &mut l.norm {
                tensors.push((role(ParamKind::Gamma), &mut norm.gamma));
                tensors.push((role(ParamKind::Beta), &mut norm.beta));
            }
            tensors
        })
    }

    #[must_use]
    pub fn snapshot(&self) -> ParameterSnapshot {
        ParameterSnapshot {
            layers: self.layers.clone(),
        }
    }

    pub fn restore(&mut self, snapshot: &ParameterSnapshot) {
        self.layers.clone_from(&snapshot.layers);
    }

    /// Rescales every weight matrix whose Frobenius norm exceeds `max_weight_norm`.
    pub fn normalize_weights(&mut self) {
        let max_norm = self.config.max_weight_norm;
        for layer in &mut self.layers {
            layer.cap_weight_norm(max_norm);
        }
    }

    /// Training-mode pass: batch statistics, dropout, running-statistics update.
    ///
    /// Running statistics are only updated from finite batch statistics.
    pub fn forward_training(&mut self, inputs: Matrix, rng: &mut dyn RngCore) -> ForwardContext {
        let (ctx, batch_stats) = self.forward(inputs, Some(rng));
        let momentum = self.config.norm_momentum;
        for (layer, stats) in self.layers.iter_mut().zip(batch_stats) {
            if let (Some(norm), Some((mean, var))) = (&mut layer.norm, stats) {
                norm.update_running(&mean, &var, momentum);
            }
        }
        ctx
    }

    /// Inference-mode pass: running statistics, no dropout, no mutation.
    #[must_use]
    pub fn forward_inference(&self, inputs: Matrix) -> ForwardContext {
        self.forward(inputs, None).0
    }

    /// Scores a single encoded position.
    #[must_use]
    pub fn evaluate(&self, features: &FeatureVector) -> f32 {
        let inputs = Matrix::from_fn(1, features.len(), |_, c| features[c]);
        self.forward_inference(inputs).predictions()[0]
    }

    fn forward(
        &self,
        inputs: Matrix,
        mut rng: Option<&mut dyn RngCore>,
    ) -> (ForwardContext, Vec<FeaturePair>) {
        let training = rng.is_some();
        let clip = self.config.pre_activation_clip;
        let (output_layer, hidden_layers) = self
            .layers
            .split_last()
            .expect("network has at least one layer");

        let mut hidden: Vec<HiddenTrace> = Vec::with_capacity(hidden_layers.len());
        let mut batch_stats = Vec::with_capacity(self.layers.len());
        for layer in hidden_layers {
            let input = hidden.last().map_or(&inputs, |t| &t.output);
            let layer_rng = rng.as_deref_mut().map(|r| r as &mut dyn RngCore);
            let (trace, stats) = self.hidden_forward(layer, input, layer_rng);
            hidden.push(trace);
            batch_stats.push(stats);
        }
        batch_stats.push(None);

        let input = hidden.last().map_or(&inputs, |t| &t.output);
        let z = output_layer.affine(input);
        let clip_mask = z.as_slice().iter().map(|v| v.abs() < clip).collect();
        let tanh: Vec<f32> = z
            .as_slice()
            .iter()
            .map(|v| v.clamp(-clip, clip).tanh())
            .collect();
        let predictions = tanh.iter().map(|t| t * self.config.output_scale).collect();

        let ctx = ForwardContext {
            inputs,
            hidden,
            output: OutputTrace {
                clip_mask,
                tanh,
                predictions,
            },
            training,
        };
        (ctx, batch_stats)
    }

    #[expect(clippy::cast_precision_loss)]
    fn hidden_forward(
        &self,
        layer: &DenseLayer,
        input: &Matrix,
        rng: Option<&mut dyn RngCore>,
    ) -> (HiddenTrace, FeaturePair) {
        let clip = self.config.pre_activation_clip;
        let mut z = layer.affine(input);
        let clip_mask = z.as_slice().iter().map(|v| v.abs() < clip).collect();
        for v in z.as_mut_slice() {
            *v = v.clamp(-clip, clip);
        }

        let (rows, width) = (z.rows(), z.cols());
        let mut batch_stats = None;
        let (norm_trace, pre_activation) = match &layer.norm {
            None => (None, z),
            Some(norm) => {
                let (mean, var) = if rng.is_some() {
                    let n = rows as f32;
                    let mean: Vec<f32> = z.sum_rows().into_iter().map(|s| s / n).collect();
                    let mut var = vec![0.0; width];
                    for row in z.iter_rows() {
                        for ((acc, v), m) in var.iter_mut().zip(row).zip(&mean) {
                            *acc += (v - m) * (v - m);
                        }
                    }
                    for v in &mut var {
                        *v /= n;
                    }
                    (mean, var)
                } else {
                    (norm.running_mean.clone(), norm.running_var.clone())
                };
                let inv_std: Vec<f32> = var
                    .iter()
                    .map(|v| 1.0 / (v + self.config.norm_epsilon).sqrt())
                    .collect();
                let normalized =
                    Matrix::from_fn(rows, width, |r, c| (z.get(r, c) - mean[c]) * inv_std[c]);
                let scaled = Matrix::from_fn(rows, width, |r, c| {
                    norm.gamma[c] * normalized.get(r, c) + norm.beta[c]
                });
                if rng.is_some() {
                    batch_stats = Some((mean, var));
                }
                (
                    Some(NormTrace {
                        normalized,
                        inv_std,
                    }),
                    scaled,
                )
            }
        };

        let activation = self.config.activation;
        let mut output = pre_activation.clone();
        for v in output.as_mut_slice() {
            *v = activation.apply(*v);
        }

        let dropout_mask = match (rng, self.config.dropout) {
            (Some(rng), Some(p)) if p > 0.0 => {
                let keep = 1.0 - p;
                let mask: Vec<f32> = (0..output.as_slice().len())
                    .map(|_| {
                        if rng.random_bool(f64::from(keep)) {
                            1.0 / keep
                        } else {
                            0.0
                        }
                    })
                    .collect();
                for (v, m) in output.as_mut_slice().iter_mut().zip(&mask) {
                    *v *= m;
                }
                Some(mask)
            }
            _ => None,
        };

        let trace = HiddenTrace {
            clip_mask,
            norm: norm_trace,
            pre_activation,
            dropout_mask,
            output,
        };
        (trace, batch_stats)
    }

    fn rejected(&self, status: UpdateStatus) -> BackwardOutput {
        BackwardOutput {
            loss: self.last_good_loss.unwrap_or(self.config.loss_ceiling),
            status,
        }
    }

    /// Trains on one batch and reports whether the update was applied.
    ///
    /// `predictions` are normally `ctx.predictions()`. Rejected batches leave the network
    /// bit-for-bit unchanged.
    pub fn backward(
        &mut self,
        ctx: &ForwardContext,
        targets: &[f32],
        predictions: &[f32],
    ) -> BackwardOutput {
        let n = ctx.batch_size();
        let shapes_match = n > 0
            && predictions.len() == n
            && targets.len() == n
            && ctx.hidden.len() + 1 == self.layers.len();
        let inputs_finite = predictions
            .iter()
            .chain(targets)
            .all(|v| v.is_finite());
        if !shapes_match || !inputs_finite {
            return self.rejected(UpdateStatus::NonFinite);
        }

        let (loss, output_grad) = loss::evaluate(self.config.loss, predictions, targets);
        if !loss.is_finite() {
            return self.rejected(UpdateStatus::NonFinite);
        }
        if loss > self.config.loss_ceiling {
            return BackwardOutput {
                loss,
                status: UpdateStatus::LossCeiling,
            };
        }

        let mut grads = self.gradients(ctx, &output_grad);
        self.clip_and_decay(&mut grads);
        if !grads.iter().all(LayerGradients::is_finite) {
            return self.rejected(UpdateStatus::NonFinite);
        }

        self.apply_gradients(&grads);
        self.normalize_weights();
        self.last_good_loss = Some(loss);
        BackwardOutput {
            loss,
            status: UpdateStatus::Applied,
        }
    }

    /// Raw gradients of the batch loss, one entry per layer in forward order.
    pub(crate) fn gradients(
        &self,
        ctx: &ForwardContext,
        output_grad: &[f32],
    ) -> Vec<LayerGradients> {
        let scale = self.config.output_scale;
        let out = &ctx.output;
        let mut delta = Matrix::from_fn(ctx.batch_size(), 1, |r, _| {
            if out.clip_mask[r] {
                output_grad[r] * scale * (1.0 - out.tanh[r] * out.tanh[r])
            } else {
                0.0
            }
        });

        let mut grads = Vec::with_capacity(self.layers.len());
        let mut norm_grad = None;
        for (idx, layer) in self.layers.iter().enumerate().rev() {
            let input = if idx == 0 {
                &ctx.inputs
            } else {
                &ctx.hidden[idx - 1].output
            };
            grads.push(LayerGradients {
                weights: input.transposed_matmul(&delta),
                bias: delta.sum_rows(),
                norm: norm_grad.take(),
            });
            if idx > 0 {
                let d_hidden = delta.matmul_transposed(&layer.weights);
                let (d_z, ng) = self.hidden_backward(
                    &self.layers[idx - 1],
                    &ctx.hidden[idx - 1],
                    d_hidden,
                    ctx.training,
                );
                delta = d_z;
                norm_grad = ng;
            }
        }
        grads.reverse();
        grads
    }

    /// Maps `dL/d(output)` of a hidden layer to `dL/d(affine output)`.
    #[expect(clippy::cast_precision_loss)]
    fn hidden_backward(
        &self,
        layer: &DenseLayer,
        trace: &HiddenTrace,
        mut d: Matrix,
        training: bool,
    ) -> (Matrix, FeaturePair) {
        if let Some(mask) = &trace.dropout_mask {
            for (v, m) in d.as_mut_slice().iter_mut().zip(mask) {
                *v *= m;
            }
        }
        let activation = self.config.activation;
        for (v, &y) in d
            .as_mut_slice()
            .iter_mut()
            .zip(trace.pre_activation.as_slice())
        {
            *v *= activation.derivative(y);
        }

        let mut norm_grad = None;
        if let (Some(norm), Some(nt)) = (&layer.norm, &trace.norm) {
            let (rows, width) = (d.rows(), d.cols());
            let x_hat = &nt.normalized;
            let d_beta = d.sum_rows();
            let mut d_gamma = vec![0.0; width];
            for (d_row, x_row) in d.iter_rows().zip(x_hat.iter_rows()) {
                for ((acc, dv), xv) in d_gamma.iter_mut().zip(d_row).zip(x_row) {
                    *acc += dv * xv;
                }
            }
            let d_xhat = Matrix::from_fn(rows, width, |r, c| d.get(r, c) * norm.gamma[c]);
            d = if training {
                let n = rows as f32;
                let sum_dxhat = d_xhat.sum_rows();
                let mut sum_dxhat_xhat = vec![0.0; width];
                for (g_row, x_row) in d_xhat.iter_rows().zip(x_hat.iter_rows()) {
                    for ((acc, gv), xv) in sum_dxhat_xhat.iter_mut().zip(g_row).zip(x_row) {
                        *acc += gv * xv;
                    }
                }
                Matrix::from_fn(rows, width, |r, c| {
                    let centered = n * d_xhat.get(r, c)
                        - sum_dxhat[c]
                        - x_hat.get(r, c) * sum_dxhat_xhat[c];
                    nt.inv_std[c] / n * centered
                })
            } else {
                Matrix::from_fn(rows, width, |r, c| d_xhat.get(r, c) * nt.inv_std[c])
            };
            norm_grad = Some((d_gamma, d_beta));
        }

        for (v, &inside) in d.as_mut_slice().iter_mut().zip(&trace.clip_mask) {
            if !inside {
                *v = 0.0;
            }
        }
        (d, norm_grad)
    }

    fn clip_and_decay(&self, grads: &mut [LayerGradients]) {
        let cap = self.config.optimizer.grad_norm_cap;
        let decay = self.config.optimizer.weight_decay;
        for (layer, grad) in self.layers.iter().zip(grads) {
            let norm = grad.norm();
            if norm > cap {
                let factor = cap / norm;
                for g in grad.tensors_mut().flatten() {
                    *g *= factor;
                }
            }
            for (g, w) in grad
                .weights
                .as_mut_slice()
                .iter_mut()
                .zip(layer.weights.as_slice())
            {
                *g += decay * w;
            }
        }
    }

    fn apply_gradients(&mut self, grads: &[LayerGradients]) {
        self.step += 1;
        let step = AdamStep::new(
            &self.config.optimizer,
            self.effective_learning_rate(),
            self.step,
        );
        for (layer, grad) in self.layers.iter_mut().zip(grads) {
            step.apply(
                layer.weights.as_mut_slice(),
                grad.weights.as_slice(),
                &mut layer.weight_moments,
            );
            step.apply(&mut layer.bias, &grad.bias, &mut layer.bias_moments);
            if let (Some(norm), Some((d_gamma, d_beta))) = (&mut layer.norm, &grad.norm) {
                step.apply(&mut norm.gamma, d_gamma, &mut norm.gamma_moments);
                step.apply(&mut norm.beta, d_beta, &mut norm.beta_moments);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use rand::SeedableRng as _;
    use rand_pcg::Pcg32;

    use super::*;
    use crate::position_encoder::FEATURE_COUNT;

    fn rng() -> Pcg32 {
        Pcg32::seed_from_u64(7)
    }

    fn random_inputs(rng: &mut Pcg32, rows: usize, cols: usize, range: f32) -> Matrix {
        Matrix::from_fn(rows, cols, |_, _| rng.random_range(-range..=range))
    }

    fn small_config() -> NetworkConfig {
        NetworkConfig {
            input_size: 5,
            hidden_sizes: vec![4, 3],
            dropout: None,
            ..NetworkConfig::default()
        }
    }

    mod forward {
        use super::*;

        #[test]
        fn test_outputs_within_scale() {
            let mut rng = rng();
            let mut network = Network::new(NetworkConfig::default(), &mut rng).unwrap();
            for (_, tensor) in network.parameters_mut() {
                for v in tensor {
                    *v = rng.random_range(-2.0..=2.0);
                }
            }
            let inputs = random_inputs(&mut rng, 16, FEATURE_COUNT, 50.0);
            let scale = network.config().output_scale;

            let ctx = network.forward_inference(inputs.clone());
            assert_eq!(ctx.batch_size(), 16);
            assert!(!ctx.is_training());
            for p in ctx.predictions() {
                assert!(p.abs() <= scale, "{p} outside ±{scale}");
            }

            let ctx = network.forward_training(inputs, &mut rng);
            assert!(ctx.is_training());
            assert!(ctx.predictions().iter().all(|p| p.abs() <= scale));
        }

        #[test]
        fn test_inference_is_deterministic_and_pure() {
            let mut rng = rng();
            let network = Network::new(NetworkConfig::default(), &mut rng).unwrap();
            let inputs = random_inputs(&mut rng, 4, FEATURE_COUNT, 1.0);
            let before = network.clone();
            let a = network.forward_inference(inputs.clone()).into_predictions();
            let b = network.forward_inference(inputs).into_predictions();
            assert_eq!(a, b);
            assert_eq!(network, before);
        }

        #[test]
        fn test_training_updates_running_statistics() {
            let mut rng = rng();
            let mut network = Network::new(small_config(), &mut rng).unwrap();
            let inputs = random_inputs(&mut rng, 8, 5, 1.0);
            network.forward_training(inputs, &mut rng);
            let norm = network.layers()[0].norm().unwrap();
            assert!(norm.running_mean().iter().any(|m| *m != 0.0));
            assert!(network.layers().last().unwrap().norm().is_none());
        }

        #[test]
        fn test_non_finite_batch_keeps_running_statistics() {
            let mut rng = rng();
            let mut network = Network::new(small_config(), &mut rng).unwrap();
            let mut inputs = random_inputs(&mut rng, 8, 5, 1.0);
            inputs.as_mut_slice()[0] = f32::NAN;
            let before = network.layers()[0].norm().unwrap().clone();
            network.forward_training(inputs, &mut rng);
            assert_eq!(network.layers()[0].norm().unwrap(), &before);
        }
    }

    mod backward {
        use super::*;

        #[test]
        fn test_non_finite_targets_are_a_no_op() {
            let mut rng = rng();
            let mut network = Network::new(NetworkConfig::default(), &mut rng).unwrap();
            let inputs = random_inputs(&mut rng, 8, FEATURE_COUNT, 1.0);
            let ctx = network.forward_training(inputs, &mut rng);
            let before = network.clone();

            let mut targets = vec![10.0; 8];
            targets[3] = f32::NAN;
            let out = network.backward(&ctx, &targets, ctx.predictions());
            assert_eq!(out.status, UpdateStatus::NonFinite);
            assert!(out.loss.is_finite());
            assert_eq!(network, before);

            let mut predictions = ctx.predictions().to_vec();
            predictions[0] = f32::INFINITY;
            let out = network.backward(&ctx, &[10.0; 8], &predictions);
            assert!(out.status.is_non_finite());
            assert!(out.loss.is_finite());
            assert_eq!(network, before);
        }

        #[test]
        fn test_mismatched_batch_is_rejected() {
            let mut rng = rng();
            let mut network = Network::new(small_config(), &mut rng).unwrap();
            let ctx = network.forward_training(random_inputs(&mut rng, 4, 5, 1.0), &mut rng);
            let before = network.clone();
            let out = network.backward(&ctx, &[0.0; 3], &ctx.predictions()[..3]);
            assert!(out.status.is_non_finite());
            assert_eq!(network, before);
        }

        #[test]
        fn test_loss_ceiling_skips_update() {
            let mut rng = rng();
            let config = NetworkConfig {
                loss: LossKind::Mse,
                ..small_config()
            };
            let mut network = Network::new(config, &mut rng).unwrap();
            let ctx = network.forward_training(random_inputs(&mut rng, 4, 5, 1.0), &mut rng);
            let before = network.clone();
            let out = network.backward(&ctx, &[1000.0; 4], ctx.predictions());
            assert_eq!(out.status, UpdateStatus::LossCeiling);
            assert!(out.loss > network.config().loss_ceiling);
            assert_eq!(network, before);
        }

        #[test]
        fn test_training_reduces_loss() {
            let mut rng = rng();
            let mut network = Network::new(small_config(), &mut rng).unwrap();
            let inputs = random_inputs(&mut rng, 16, 5, 1.0);
            let targets = vec![50.0; 16];

            let mut first = None;
            let mut last = 0.0;
            for _ in 0..150 {
                let ctx = network.forward_training(inputs.clone(), &mut rng);
                let out = network.backward(&ctx, &targets, ctx.predictions());
                assert_eq!(out.status, UpdateStatus::Applied);
                first.get_or_insert(out.loss);
                last = out.loss;
            }
            assert!(last < first.unwrap(), "{last} >= {first:?}");
            assert_eq!(network.step(), 150);
            assert_eq!(network.last_good_loss(), Some(last));
        }

        #[test]
        fn test_gradients_match_finite_differences() {
            const EPS: f32 = 1e-3;
            let mut rng = rng();
            let config = NetworkConfig {
                loss: LossKind::Mse,
                pre_activation_clip: 100.0,
                output_scale: 1.0,
                ..small_config()
            };
            let mut network = Network::new(config, &mut rng).unwrap();
            for (_, tensor) in network.parameters_mut() {
                for v in tensor {
                    *v = rng.random_range(-1.0..=1.0);
                }
            }
            let inputs = random_inputs(&mut rng, 6, 5, 1.0);
            let targets: Vec<f32> = (0..6).map(|_| rng.random_range(-0.5..=0.5)).collect();

            let mut batch_loss = |network: &mut Network| {
                let ctx = network.forward_training(inputs.clone(), &mut rng);
                loss::evaluate(LossKind::Mse, ctx.predictions(), &targets).0
            };

            let ctx = network.forward_training(inputs.clone(), &mut Pcg32::seed_from_u64(0));
            let (_, output_grad) = loss::evaluate(LossKind::Mse, ctx.predictions(), &targets);
            let analytic: Vec<f32> = network
                .gradients(&ctx, &output_grad)
                .iter()
                .flat_map(|g| g.tensors().flatten().copied().collect::<Vec<_>>())
                .collect();

            let mut numeric = Vec::with_capacity(analytic.len());
            let tensor_lens: Vec<usize> = network.parameters_mut().map(|(_, t)| t.len()).collect();
            for (t, len) in tensor_lens.into_iter().enumerate() {
                for j in 0..len {
                    let nudge = |network: &mut Network, delta: f32| {
                        if let Some((_, tensor)) = network.parameters_mut().nth(t) {
                            tensor[j] += delta;
                        }
                    };
                    nudge(&mut network, EPS);
                    let plus = batch_loss(&mut network);
                    nudge(&mut network, -2.0 * EPS);
                    let minus = batch_loss(&mut network);
                    nudge(&mut network, EPS);
                    numeric.push((plus - minus) / (2.0 * EPS));
                }
            }

            assert_eq!(numeric.len(), analytic.len());
            let dot: f32 = numeric.iter().zip(&analytic).map(|(a, b)| a * b).sum();
            let norm_a = numeric.iter().map(|v| v * v).sum::<f32>().sqrt();
            let norm_b = analytic.iter().map(|v| v * v).sum::<f32>().sqrt();
            let cosine = dot / (norm_a * norm_b);
            assert!(cosine > 0.99, "cosine similarity {cosine}");
            assert!((norm_a - norm_b).abs() / norm_b < 0.05);
        }
    }

    mod safeguards {
        use super::*;

        #[test]
        fn test_normalize_weights_caps_and_is_idempotent() {
            let mut rng = rng();
            let mut network = Network::new(small_config(), &mut rng).unwrap();
            for (role, tensor) in network.parameters_mut() {
                if role.kind == ParamKind::Weights {
                    for v in tensor {
                        *v = 3.0;
                    }
                }
            }
            let cap = network.config().max_weight_norm;
            network.normalize_weights();
            for layer in network.layers() {
                let norm = layer.weights().frobenius_norm();
                assert!(norm <= cap * (1.0 + 1e-5), "{norm} > {cap}");
                assert!((norm - cap).abs() < 1e-3);
            }
            let once = network.clone();
            network.normalize_weights();
            assert_eq!(network, once);
        }

        #[test]
        fn test_small_weights_untouched() {
            let mut rng = rng();
            let mut network = Network::new(small_config(), &mut rng).unwrap();
            let before = network.clone();
            network.normalize_weights();
            assert_eq!(network, before);
        }

        #[test]
        fn test_snapshot_restore() {
            let mut rng = rng();
            let mut network = Network::new(small_config(), &mut rng).unwrap();
            let snapshot = network.snapshot();
            let ctx = network.forward_training(random_inputs(&mut rng, 4, 5, 1.0), &mut rng);
            network.backward(&ctx, &[20.0; 4], ctx.predictions());
            assert_ne!(network.snapshot(), snapshot);
            network.restore(&snapshot);
            assert_eq!(network.snapshot(), snapshot);
        }

        #[test]
        fn test_clone_trains_independently() {
            let mut rng = rng();
            let original = Network::new(small_config(), &mut rng).unwrap();
            let checkpoint = original.to_checkpoint();
            let moments = |network: &Network| {
                network
                    .layers()
                    .iter()
                    .map(|l| (l.weight_moments.clone(), l.bias_moments.clone()))
                    .collect::<Vec<_>>()
            };
            let original_moments = moments(&original);

            let mut copy = original.clone();
            for _ in 0..3 {
                let ctx = copy.forward_training(random_inputs(&mut rng, 4, 5, 1.0), &mut rng);
                let out = copy.backward(&ctx, &[20.0; 4], ctx.predictions());
                assert_eq!(out.status, UpdateStatus::Applied);
            }
            assert_eq!(copy.step(), 3);
            assert_ne!(copy.to_checkpoint().layers, checkpoint.layers);
            assert_ne!(moments(&copy), original_moments);

            assert_eq!(original.to_checkpoint(), checkpoint);
            assert_eq!(moments(&original), original_moments);
            assert_eq!(original.step(), 0);
            assert_eq!(original.last_good_loss(), None);
        }

        #[test]
        fn test_learning_rate_decay_and_floor() {
            let mut rng = rng();
            let mut network = Network::new(small_config(), &mut rng).unwrap();
            assert!((network.effective_learning_rate() - 1e-3).abs() < 1e-9);
            network.set_generation(100);
            let expected = 1e-3 * 0.995_f32.powi(100);
            assert!((network.effective_learning_rate() - expected).abs() < 1e-7);
            network.set_generation(5000);
            assert_eq!(network.effective_learning_rate(), 1e-5);
            network.scale_learning_rate(1e-9);
            assert_eq!(network.learning_rate(), 1e-5);
        }
    }

    #[test]
    fn test_parameter_count() {
        let network = Network::new(NetworkConfig::default(), &mut rng()).unwrap();
        // 192*64+64 + 2*64, 64*32+32 + 2*32, 32+1
        let expected = 192 * 64 + 64 + 128 + 64 * 32 + 32 + 64 + 32 + 1;
        assert_eq!(network.parameter_count(), expected);
    }
}
