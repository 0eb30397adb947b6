use serde::{Deserialize, Serialize};

use crate::position_encoder::FEATURE_COUNT;

/// Hidden-layer non-linearity.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", tag = "kind")]
pub enum Activation {
    Relu,
    LeakyRelu { slope: f32 },
}

impl Activation {
    #[inline]
    #[must_use]
    pub fn apply(self, x: f32) -> f32 {
        match self {
            Self::Relu => x.max(0.0),
            Self::LeakyRelu { slope } => {
                if x > 0.0 {
                    x
                } else {
                    x * slope
                }
            }
        }
    }

    #[inline]
    #[must_use]
    pub fn derivative(self, x: f32) -> f32 {
        match self {
            Self::Relu => {
                if x > 0.0 {
                    1.0
                } else {
                    0.0
                }
            }
            Self::LeakyRelu { slope } => {
                if x > 0.0 {
                    1.0
                } else {
                    slope
                }
            }
        }
    }

    #[must_use]
    pub fn negative_slope(self) -> f32 {
        match self {
            Self::Relu => 0.0,
            Self::LeakyRelu { slope } => slope,
        }
    }
}

/// Regression loss between predictions and labels.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", tag = "kind")]
pub enum LossKind {
    /// Quadratic within `±delta`, linear outside.
    Huber { delta: f32 },
    Mse,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AdamConfig {
    pub learning_rate: f32,
    pub beta1: f32,
    pub beta2: f32,
    pub epsilon: f32,
    /// L2 coefficient added to weight gradients (biases and normalization are exempt).
    pub weight_decay: f32,
    /// Per-layer cap on the gradient norm.
    pub grad_norm_cap: f32,
    /// Largest change a single step may apply to any parameter.
    pub update_clamp: f32,
    /// Parameters are kept inside `±param_clamp`.
    pub param_clamp: f32,
    /// Multiplier applied to the learning rate per generation.
    pub generation_decay: f32,
    pub min_learning_rate: f32,
}

impl Default for AdamConfig {
    fn default() -> Self {
        Self {
            learning_rate: 1e-3,
            beta1: 0.9,
            beta2: 0.999,
            epsilon: 1e-8,
            weight_decay: 1e-4,
            grad_norm_cap: 1.0,
            update_clamp: 0.01,
            param_clamp: 2.0,
            generation_decay: 0.995,
            min_learning_rate: 1e-5,
        }
    }
}

/// Shape and training hyper-parameters of a value network.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct NetworkConfig {
    pub input_size: usize,
    pub hidden_sizes: Vec<usize>,
    pub activation: Activation,
    /// Batch normalization after every hidden affine transform.
    pub normalization: bool,
    pub norm_momentum: f32,
    pub norm_epsilon: f32,
    /// Drop probability on hidden activations during training.
    pub dropout: Option<f32>,
    pub pre_activation_clip: f32,
    /// Outputs lie in `±output_scale`.
    pub output_scale: f32,
    pub loss: LossKind,
    pub optimizer: AdamConfig,
    /// Frobenius-norm cap applied to every weight matrix after each update.
    pub max_weight_norm: f32,
    /// Batches whose loss exceeds this are not applied.
    pub loss_ceiling: f32,
}

impl Default for NetworkConfig {
    fn default() -> Self {
        Self {
            input_size: FEATURE_COUNT,
            hidden_sizes: vec![64, 32],
            activation: Activation::LeakyRelu { slope: 0.01 },
            normalization: true,
            norm_momentum: 0.1,
            norm_epsilon: 1e-5,
            dropout: Some(0.1),
            pre_activation_clip: 5.0,
            output_scale: 200.0,
            loss: LossKind::Huber { delta: 10.0 },
            optimizer: AdamConfig::default(),
            max_weight_norm: 5.0,
            loss_ceiling: 10_000.0,
        }
    }
}

#[derive(Debug, Clone, PartialEq, derive_more::Display, derive_more::Error)]
pub enum ConfigError {
    #[display("layer sizes must be non-zero")]
    EmptyLayer,
    #[display("dropout probability must be in [0, 1), got {_0}")]
    Dropout(#[error(not(source))] f32),
    #[display("{name} must be positive and finite, got {value}")]
    NonPositive { name: &'static str, value: f32 },
}

impl NetworkConfig {
    /// Sizes of every layer boundary: input, hidden..., output (always 1).
    #[must_use]
    pub fn layer_sizes(&self) -> Vec<usize> {
        let mut sizes = Vec::with_capacity(self.hidden_sizes.len() + 2);
        sizes.push(self.input_size);
        sizes.extend(&self.hidden_sizes);
        sizes.push(1);
        sizes
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.input_size == 0 || self.hidden_sizes.contains(&0) {
            return Err(ConfigError::EmptyLayer);
        }
        if let Some(p) = self.dropout
            && !(0.0..1.0).contains(&p)
        {
            return Err(ConfigError::Dropout(p));
        }
        let positive = [
            ("output_scale", self.output_scale),
            ("pre_activation_clip", self.pre_activation_clip),
            ("max_weight_norm", self.max_weight_norm),
            ("loss_ceiling", self.loss_ceiling),
            ("norm_epsilon", self.norm_epsilon),
            ("learning_rate", self.optimizer.learning_rate),
            ("param_clamp", self.optimizer.param_clamp),
            ("update_clamp", self.optimizer.update_clamp),
            ("grad_norm_cap", self.optimizer.grad_norm_cap),
        ];
        for (name, value) in positive {
            if !(value.is_finite() && value > 0.0) {
                return Err(ConfigError::NonPositive { name, value });
            }
        }
        Ok(())
    }
}
