use super::config::LossKind;

/// Mean loss over the batch and its gradient with respect to each prediction.
#[expect(clippy::cast_precision_loss)]
#[must_use]
pub fn evaluate(kind: LossKind, predictions: &[f32], targets: &[f32]) -> (f32, Vec<f32>) {
    debug_assert_eq!(predictions.len(), targets.len());
    if predictions.is_empty() {
        return (0.0, Vec::new());
    }
    let n = predictions.len() as f32;
    let mut total = 0.0;
    let grad = predictions
        .iter()
        .zip(targets)
        .map(|(&p, &t)| {
            let r = p - t;
            let (loss, slope) = match kind {
                LossKind::Huber { delta } if r.abs() > delta => {
                    (delta * (r.abs() - 0.5 * delta), delta * r.signum())
                }
                LossKind::Huber { .. } => (0.5 * r * r, r),
                LossKind::Mse => (r * r, 2.0 * r),
            };
            total += loss;
            slope / n
        })
        .collect();
    (total / n, grad)
}
