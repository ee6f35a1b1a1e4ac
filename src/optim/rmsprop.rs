//! RMSprop optimizer

use super::Optimizer;
use crate::nn::Param;
use ndarray::ArrayD;

/// RMSprop optimizer
///
/// Normalizes each gradient element by the root of a running average of its
/// square. With momentum enabled the normalized gradient feeds a velocity
/// buffer instead of the parameter directly:
///
/// s_t = α * s_{t-1} + (1 - α) * g²
/// θ_t = θ_{t-1} - lr * g / (√s_t + ε)
#[derive(Debug)]
pub struct RMSprop {
    lr: f32,
    alpha: f32,
    eps: f32,
    momentum: f32,
    weight_decay: f32,
    square_avg: Vec<Option<ArrayD<f32>>>,
    velocities: Vec<Option<ArrayD<f32>>>,
}

impl RMSprop {
    /// Create a new RMSprop optimizer
    pub fn new(lr: f32, alpha: f32, eps: f32, momentum: f32, weight_decay: f32) -> Self {
        Self {
            lr,
            alpha,
            eps,
            momentum,
            weight_decay,
            square_avg: Vec::new(),
            velocities: Vec::new(),
        }
    }

    /// Initialize buffers if needed
    fn ensure_buffers(&mut self, count: usize) {
        if self.square_avg.is_empty() {
            self.square_avg = vec![None; count];
            self.velocities = vec![None; count];
        }
    }
}

impl Optimizer for RMSprop {
    fn step(&mut self, params: &mut [&mut Param]) {
        self.ensure_buffers(params.len());

        for (i, param) in params.iter_mut().enumerate() {
            if let Some(grad) = param.grad().cloned() {
                let grad = if self.weight_decay > 0.0 {
                    grad + &(param.data() * self.weight_decay)
                } else {
                    grad
                };

                let sq = match &self.square_avg[i] {
                    Some(s) => s * self.alpha + &grad * &grad * (1.0 - self.alpha),
                    None => &grad * &grad * (1.0 - self.alpha),
                };

                let normalized = &grad / &(sq.mapv(f32::sqrt) + self.eps);

                if self.momentum > 0.0 {
                    let velocity = match &self.velocities[i] {
                        Some(v) => v * self.momentum + &normalized,
                        None => normalized,
                    };

                    *param.data_mut() -= &(&velocity * self.lr);
                    self.velocities[i] = Some(velocity);
                } else {
                    *param.data_mut() -= &(&normalized * self.lr);
                }

                self.square_avg[i] = Some(sq);
            }
        }
    }

    fn lr(&self) -> f32 {
        self.lr
    }

    fn set_lr(&mut self, lr: f32) {
        self.lr = lr;
    }
}
