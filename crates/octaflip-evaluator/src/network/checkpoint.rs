use serde::{Deserialize, Serialize};

use super::{BatchNorm, DenseLayer, Matrix, Network, NetworkConfig, config::ConfigError};

/// Version written into every checkpoint; loading any other version fails.
pub const CHECKPOINT_FORMAT_VERSION: u32 = 1;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NormCheckpoint {
    pub gamma: Vec<f32>,
    pub beta: Vec<f32>,
    pub running_mean: Vec<f32>,
    pub running_var: Vec<f32>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LayerCheckpoint {
    /// One row per input, one column per output.
    pub weights: Vec<Vec<f32>>,
    pub bias: Vec<f32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub norm: Option<NormCheckpoint>,
}

/// Serializable network parameters.
///
/// Optimizer moments are not stored; a restored network starts with fresh moments but
/// keeps its step counter, learning rate and generation tag.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Checkpoint {
    pub format_version: u32,
    pub config: NetworkConfig,
    pub layers: Vec<LayerCheckpoint>,
    pub learning_rate: f32,
    pub step: u64,
    pub generation: u32,
}

#[derive(Debug, Clone, PartialEq, derive_more::Display, derive_more::Error, derive_more::From)]
pub enum CheckpointError {
    #[display("unsupported checkpoint format version {found} (expected {expected})")]
    #[from(ignore)]
    UnsupportedVersion { found: u32, expected: u32 },
    #[display("invalid network configuration: {_0}")]
    Config(ConfigError),
    #[display("expected {expected} layers, found {found}")]
    #[from(ignore)]
    LayerCount { expected: usize, found: usize },
    #[display("layer {layer}: {what} has shape {found}, expected {expected}")]
    #[from(ignore)]
    Shape {
        layer: usize,
        what: &'static str,
        found: String,
        expected: String,
    },
    #[display("layer {layer}: normalization parameters are {state}")]
    #[from(ignore)]
    Normalization { layer: usize, state: &'static str },
    #[display("layer {layer} contains non-finite values")]
    #[from(ignore)]
    NonFinite { layer: usize },
}

fn check_len(
    layer: usize,
    what: &'static str,
    values: &[f32],
    expected: usize,
) -> Result<(), CheckpointError> {
    if values.len() == expected {
        Ok(())
    } else {
        Err(CheckpointError::Shape {
            layer,
            what,
            found: values.len().to_string(),
            expected: expected.to_string(),
        })
    }
}

impl LayerCheckpoint {
    fn from_layer(layer: &DenseLayer) -> Self {
        Self {
            weights: layer.weights.iter_rows().map(<[f32]>::to_vec).collect(),
            bias: layer.bias.clone(),
            norm: layer.norm.as_ref().map(|norm| NormCheckpoint {
                gamma: norm.gamma.clone(),
                beta: norm.beta.clone(),
                running_mean: norm.running_mean.clone(),
                running_var: norm.running_var.clone(),
            }),
        }
    }

    fn to_layer(
        &self,
        index: usize,
        inputs: usize,
        outputs: usize,
        normalized: bool,
    ) -> Result<DenseLayer, CheckpointError> {
        let shape_error = || CheckpointError::Shape {
            layer: index,
            what: "weights",
            found: format!(
                "{}x{}",
                self.weights.len(),
                self.weights.first().map_or(0, Vec::len)
            ),
            expected: format!("{inputs}x{outputs}"),
        };
        if self.weights.len() != inputs || self.weights.iter().any(|row| row.len() != outputs) {
            return Err(shape_error());
        }
        check_len(index, "bias", &self.bias, outputs)?;

        let norm = match (&self.norm, normalized) {
            (None, false) => None,
            (Some(norm), true) => {
                for (what, values) in [
                    ("gamma", &norm.gamma),
                    ("beta", &norm.beta),
                    ("running_mean", &norm.running_mean),
                    ("running_var", &norm.running_var),
                ] {
                    check_len(index, what, values, outputs)?;
                }
                let mut layer_norm = BatchNorm::new(outputs);
                layer_norm.gamma.clone_from(&norm.gamma);
                layer_norm.beta.clone_from(&norm.beta);
                layer_norm.running_mean.clone_from(&norm.running_mean);
                layer_norm.running_var.clone_from(&norm.running_var);
                Some(layer_norm)
            }
            (None, true) => {
                return Err(CheckpointError::Normalization {
                    layer: index,
                    state: "missing",
                });
            }
            (Some(_), false) => {
                return Err(CheckpointError::Normalization {
                    layer: index,
                    state: "unexpected",
                });
            }
        };

        let weights = Matrix::from_fn(inputs, outputs, |r, c| self.weights[r][c]);
        let layer = DenseLayer::from_parts(weights, self.bias.clone(), norm);
        let finite = layer.weights.is_finite()
            && layer.bias.iter().all(|v| v.is_finite())
            && layer.norm.as_ref().is_none_or(|n| {
                n.gamma
                    .iter()
                    .chain(&n.beta)
                    .chain(&n.running_mean)
                    .chain(&n.running_var)
                    .all(|v| v.is_finite())
            });
        if !finite {
            return Err(CheckpointError::NonFinite { layer: index });
        }
        Ok(layer)
    }
}

impl Network {
    #[must_use]
    pub fn to_checkpoint(&self) -> Checkpoint {
        Checkpoint {
            format_version: CHECKPOINT_FORMAT_VERSION,
            config: self.config.clone(),
            layers: self.layers.iter().map(LayerCheckpoint::from_layer).collect(),
            learning_rate: self.learning_rate,
            step: self.step,
            generation: self.generation,
        }
    }

    /// Rebuilds a network, checking the version and every tensor shape against the
    /// embedded configuration.
    pub fn from_checkpoint(checkpoint: &Checkpoint) -> Result<Self, CheckpointError> {
        if checkpoint.format_version != CHECKPOINT_FORMAT_VERSION {
            return Err(CheckpointError::UnsupportedVersion {
                found: checkpoint.format_version,
                expected: CHECKPOINT_FORMAT_VERSION,
            });
        }
        let config = &checkpoint.config;
        config.validate()?;

        let sizes = config.layer_sizes();
        let expected = sizes.len() - 1;
        if checkpoint.layers.len() != expected {
            return Err(CheckpointError::LayerCount {
                expected,
                found: checkpoint.layers.len(),
            });
        }
        let layers = checkpoint
            .layers
            .iter()
            .zip(sizes.windows(2))
            .enumerate()
            .map(|(i, (layer, w))| {
                layer.to_layer(i, w[0], w[1], config.normalization && i + 1 < expected)
            })
            .collect::<Result<Vec<_>, _>>()?;

        Ok(Self::from_layers(
            config.clone(),
            layers,
            checkpoint.learning_rate,
            checkpoint.step,
            checkpoint.generation,
        ))
    }
}
