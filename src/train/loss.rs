//! Loss functions for training
//!
//! A loss returns its scalar value together with the gradient with
//! respect to the prediction; the caller feeds that gradient into the
//! network backward pass.

use crate::error::{Error, Result};
use ndarray::Array4;

/// Mean absolute error and its gradient.
///
/// L = mean(|pred - target|)
///
/// Gradient: sign(pred - target) / n, with the subgradient 0 at zero.
pub fn l1_loss(pred: &Array4<f32>, target: &Array4<f32>) -> Result<(f32, Array4<f32>)> {
    if pred.shape() != target.shape() {
        return Err(Error::ShapeMismatch {
            expected: target.shape().to_vec(),
            got: pred.shape().to_vec(),
        });
    }

    let n = pred.len() as f32;
    let diff = pred - target;
    let value = diff.mapv(f32::abs).sum() / n;
    let grad = diff.mapv(|d| {
        if d > 0.0 {
            1.0 / n
        } else if d < 0.0 {
            -1.0 / n
        } else {
            0.0
        }
    });
    Ok((value, grad))
}
