//! Loss and metric collections, plus the ray alignment loss used by the trainer.

use std::collections::BTreeMap;

use nalgebra::Vector3;

/// Named scalar loss terms, summed by the training loop.
pub type LossDict = BTreeMap<String, f32>;

/// Named scalar diagnostics.
pub type MetricsDict = BTreeMap<String, f32>;

/// Sum of all loss terms.
pub fn total_loss(losses: &LossDict) -> f32 {
    losses.values().sum()
}

/// Mean squared misalignment between corrected rays and target rays.
///
/// Per ray the error is `|o - o*|² + |d - d*|²`; the loss is the mean over rays.
/// Returns `(loss, dL/d_origins, dL/d_directions)`.
pub fn ray_alignment_loss_and_grad(
    origins: &[Vector3<f32>],
    directions: &[Vector3<f32>],
    target_origins: &[Vector3<f32>],
    target_directions: &[Vector3<f32>],
) -> (f32, Vec<Vector3<f32>>, Vec<Vector3<f32>>) {
    assert_eq!(origins.len(), directions.len());
    assert_eq!(origins.len(), target_origins.len());
    assert_eq!(origins.len(), target_directions.len());

    if origins.is_empty() {
        return (0.0, Vec::new(), Vec::new());
    }

    let n = origins.len() as f32;
    let mut loss = 0.0f32;
    let mut d_origins = vec![Vector3::<f32>::zeros(); origins.len()];
    let mut d_directions = vec![Vector3::<f32>::zeros(); origins.len()];

    for i in 0..origins.len() {
        let diff_o = origins[i] - target_origins[i];
        let diff_d = directions[i] - target_directions[i];
        loss += diff_o.dot(&diff_o) + diff_d.dot(&diff_d);
        d_origins[i] = diff_o * (2.0 / n);
        d_directions[i] = diff_d * (2.0 / n);
    }

    (loss / n, d_origins, d_directions)
}
