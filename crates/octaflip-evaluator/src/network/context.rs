use super::matrix::Matrix;

/// Everything a forward pass produced that the backward pass needs.
///
/// Owned by the caller, so a network can run several forward passes before deciding
/// which one to train on.
#[derive(Debug, Clone)]
pub struct ForwardContext {
    pub(crate) inputs: Matrix,
    pub(crate) hidden: Vec<HiddenTrace>,
    pub(crate) output: OutputTrace,
    pub(crate) training: bool,
}

#[derive(Debug, Clone)]
pub(crate) struct HiddenTrace {
    /// `true` where the affine output was strictly inside the clip range.
    pub(crate) clip_mask: Vec<bool>,
    pub(crate) norm: Option<NormTrace>,
    /// Input of the non-linearity (after normalization when enabled).
    pub(crate) pre_activation: Matrix,
    /// Per-element dropout factor: `0` or `1 / keep`.
    pub(crate) dropout_mask: Option<Vec<f32>>,
    pub(crate) output: Matrix,
}

#[derive(Debug, Clone)]
pub(crate) struct NormTrace {
    pub(crate) normalized: Matrix,
    pub(crate) inv_std: Vec<f32>,
}

#[derive(Debug, Clone)]
pub(crate) struct OutputTrace {
    pub(crate) clip_mask: Vec<bool>,
    pub(crate) tanh: Vec<f32>,
    pub(crate) predictions: Vec<f32>,
}

impl ForwardContext {
    /// One scaled prediction per input row.
    #[must_use]
    pub fn predictions(&self) -> &[f32] {
        &self.output.predictions
    }

    #[must_use]
    pub fn into_predictions(self) -> Vec<f32> {
        self.output.predictions
    }

    #[must_use]
    pub fn batch_size(&self) -> usize {
        self.inputs.rows()
    }

    /// Whether batch statistics and dropout were used.
    #[must_use]
    pub fn is_training(&self) -> bool {
        self.training
    }
}
