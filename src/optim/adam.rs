//! Adam optimizer

use super::Optimizer;
use crate::nn::Param;
use ndarray::ArrayD;

/// Adam optimizer with bias-corrected moment estimates
///
/// Maintains first and second moment buffers per parameter. Weight decay,
/// when enabled, is added to the gradient before the moment update.
#[derive(Debug)]
pub struct Adam {
    lr: f32,
    beta1: f32,
    beta2: f32,
    eps: f32,
    weight_decay: f32,
    t: i32,
    m: Vec<Option<ArrayD<f32>>>,
    v: Vec<Option<ArrayD<f32>>>,
}

impl Adam {
    /// Create a new Adam optimizer
    pub fn new(lr: f32, beta1: f32, beta2: f32, eps: f32, weight_decay: f32) -> Self {
        Self {
            lr,
            beta1,
            beta2,
            eps,
            weight_decay,
            t: 0,
            m: Vec::new(),
            v: Vec::new(),
        }
    }

    /// Initialize moment buffers if needed
    fn ensure_buffers(&mut self, count: usize) {
        if self.m.is_empty() {
            self.m = vec![None; count];
            self.v = vec![None; count];
        }
    }
}

impl Optimizer for Adam {
    fn step(&mut self, params: &mut [&mut Param]) {
        self.ensure_buffers(params.len());
        self.t += 1;

        // Bias-corrected step size for this iteration
        let lr_t =
            self.lr * ((1.0 - self.beta2.powi(self.t)).sqrt() / (1.0 - self.beta1.powi(self.t)));

        for (i, param) in params.iter_mut().enumerate() {
            if let Some(grad) = param.grad().cloned() {
                let grad = if self.weight_decay > 0.0 {
                    grad + &(param.data() * self.weight_decay)
                } else {
                    grad
                };

                // m = beta1 * m + (1 - beta1) * grad
                let m = match &self.m[i] {
                    Some(m) => m * self.beta1 + &grad * (1.0 - self.beta1),
                    None => &grad * (1.0 - self.beta1),
                };

                // v = beta2 * v + (1 - beta2) * grad^2
                let v = match &self.v[i] {
                    Some(v) => v * self.beta2 + &grad * &grad * (1.0 - self.beta2),
                    None => &grad * &grad * (1.0 - self.beta2),
                };

                let denom = v.mapv(f32::sqrt) + self.eps;
                *param.data_mut() -= &(&m / &denom * lr_t);

                self.m[i] = Some(m);
                self.v[i] = Some(v);
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
