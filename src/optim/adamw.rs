//! AdamW optimizer (Adam with decoupled weight decay)

use super::Optimizer;
use crate::nn::Param;
use ndarray::ArrayD;

/// AdamW optimizer
///
/// Decouples weight decay from the gradient-based update. Instead of adding
/// the decay term to the gradient, it scales the parameters directly:
///
/// θ_t = (1 - lr * λ) * θ_{t-1} - lr_t * m_t / (√v_t + ε)
#[derive(Debug)]
pub struct AdamW {
    lr: f32,
    beta1: f32,
    beta2: f32,
    eps: f32,
    weight_decay: f32,
    t: i32,
    m: Vec<Option<ArrayD<f32>>>,
    v: Vec<Option<ArrayD<f32>>>,
}

impl AdamW {
    /// Create a new AdamW optimizer
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

impl Optimizer for AdamW {
    fn step(&mut self, params: &mut [&mut Param]) {
        self.ensure_buffers(params.len());
        self.t += 1;

        let lr_t =
            self.lr * ((1.0 - self.beta2.powi(self.t)).sqrt() / (1.0 - self.beta1.powi(self.t)));

        for (i, param) in params.iter_mut().enumerate() {
            if let Some(grad) = param.grad().cloned() {
                // m_t = β1 * m_{t-1} + (1 - β1) * g
                let m = match &self.m[i] {
                    Some(m) => m * self.beta1 + &grad * (1.0 - self.beta1),
                    None => &grad * (1.0 - self.beta1),
                };

                // v_t = β2 * v_{t-1} + (1 - β2) * g²
                let v = match &self.v[i] {
                    Some(v) => v * self.beta2 + &grad * &grad * (1.0 - self.beta2),
                    None => &grad * &grad * (1.0 - self.beta2),
                };

                let adaptive = &m / &(v.mapv(f32::sqrt) + self.eps) * lr_t;

                // Weight decay scales the parameters, not the gradient
                let decay_factor = 1.0 - self.lr * self.weight_decay;
                *param.data_mut() = param.data() * decay_factor - &adaptive;

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
