//! Adamax optimizer (Adam variant based on the infinity norm)

use super::Optimizer;
use crate::nn::Param;
use ndarray::{ArrayD, Zip};

/// Adamax optimizer
///
/// Replaces Adam's second moment with an exponentially weighted infinity
/// norm, which makes the per-element denominator a running max instead of
/// a running mean of squares:
///
/// u_t = max(β2 * u_{t-1}, |g| + ε)
/// θ_t = θ_{t-1} - (lr / (1 - β1^t)) * m_t / u_t
#[derive(Debug)]
pub struct Adamax {
    lr: f32,
    beta1: f32,
    beta2: f32,
    eps: f32,
    weight_decay: f32,
    t: i32,
    m: Vec<Option<ArrayD<f32>>>,
    u: Vec<Option<ArrayD<f32>>>,
}

impl Adamax {
    /// Create a new Adamax optimizer
    pub fn new(lr: f32, beta1: f32, beta2: f32, eps: f32, weight_decay: f32) -> Self {
        Self {
            lr,
            beta1,
            beta2,
            eps,
            weight_decay,
            t: 0,
            m: Vec::new(),
            u: Vec::new(),
        }
    }

    /// Initialize moment buffers if needed
    fn ensure_buffers(&mut self, count: usize) {
        if self.m.is_empty() {
            self.m = vec![None; count];
            self.u = vec![None; count];
        }
    }
}

impl Optimizer for Adamax {
    fn step(&mut self, params: &mut [&mut Param]) {
        self.ensure_buffers(params.len());
        self.t += 1;

        // Only the first moment needs bias correction
        let lr_t = self.lr / (1.0 - self.beta1.powi(self.t));

        for (i, param) in params.iter_mut().enumerate() {
            if let Some(grad) = param.grad().cloned() {
                let grad = if self.weight_decay > 0.0 {
                    grad + &(param.data() * self.weight_decay)
                } else {
                    grad
                };

                let m = match &self.m[i] {
                    Some(m) => m * self.beta1 + &grad * (1.0 - self.beta1),
                    None => &grad * (1.0 - self.beta1),
                };

                let u = match &self.u[i] {
                    Some(u) => Zip::from(u)
                        .and(&grad)
                        .map_collect(|&u, &g| (u * self.beta2).max(g.abs() + self.eps)),
                    None => grad.mapv(|g| g.abs() + self.eps),
                };

                *param.data_mut() -= &(&m / &u * lr_t);

                self.m[i] = Some(m);
                self.u[i] = Some(u);
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

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::arr1;

    #[test]
    fn test_adamax_converges_on_quadratic() {
        let mut opt = Adamax::new(0.2, 0.9, 0.999, 1e-8, 0.0);
        let mut x = Param::new(arr1(&[5.0f32]).into_dyn());

        for _ in 0..100 {
            let g = x.data() * 2.0;
            x.add_grad(g);
            opt.step(&mut [&mut x]);
            opt.zero_grad(&mut [&mut x]);
        }

        assert!(x.data()[[0]].abs() < 0.5, "did not converge: {}", x.data()[[0]]);
    }

    #[test]
    fn test_adamax_denominator_tracks_max() {
        // A large early gradient keeps dominating the infinity norm, so a
        // later small gradient produces a small step
        let mut opt = Adamax::new(0.1, 0.0, 1.0, 0.0, 0.0);
        let mut x = Param::new(arr1(&[0.0f32]).into_dyn());

        x.add_grad(arr1(&[10.0f32]).into_dyn());
        opt.step(&mut [&mut x]);
        x.zero_grad();
        let after_first = x.data()[[0]];

        x.add_grad(arr1(&[0.1f32]).into_dyn());
        opt.step(&mut [&mut x]);
        let second_step = (x.data()[[0]] - after_first).abs();

        // beta1 = 0 makes m the raw gradient; u stays at 10, so the second
        // step is lr * 0.1 / 10
        assert!((second_step - 0.1 * 0.1 / 10.0).abs() < 1e-6);
    }
}
