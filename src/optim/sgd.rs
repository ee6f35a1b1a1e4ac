//! Stochastic Gradient Descent optimizer

use super::Optimizer;
use crate::nn::Param;
use ndarray::ArrayD;

/// SGD optimizer with optional momentum
#[derive(Debug)]
pub struct SGD {
    lr: f32,
    momentum: f32,
    weight_decay: f32,
    velocities: Vec<Option<ArrayD<f32>>>,
}

impl SGD {
    /// Create a new SGD optimizer
    pub fn new(lr: f32, momentum: f32, weight_decay: f32) -> Self {
        Self {
            lr,
            momentum,
            weight_decay,
            velocities: Vec::new(),
        }
    }

    /// Initialize velocities if needed
    fn ensure_velocities(&mut self, count: usize) {
        if self.velocities.is_empty() {
            self.velocities = vec![None; count];
        }
    }
}

impl Optimizer for SGD {
    fn step(&mut self, params: &mut [&mut Param]) {
        self.ensure_velocities(params.len());

        for (i, param) in params.iter_mut().enumerate() {
            if let Some(grad) = param.grad().cloned() {
                let grad = if self.weight_decay > 0.0 {
                    grad + &(param.data() * self.weight_decay)
                } else {
                    grad
                };

                if self.momentum > 0.0 {
                    // v = momentum * v - lr * grad
                    let velocity = match &self.velocities[i] {
                        Some(v) => v * self.momentum - &grad * self.lr,
                        None => &grad * (-self.lr),
                    };

                    *param.data_mut() += &velocity;
                    self.velocities[i] = Some(velocity);
                } else {
                    *param.data_mut() -= &(&grad * self.lr);
                }
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
    fn test_sgd_basic_step() {
        let mut opt = SGD::new(0.1, 0.0, 0.0);
        let mut x = Param::new(arr1(&[1.0f32, 2.0]).into_dyn());
        x.add_grad(arr1(&[0.5f32, 1.0]).into_dyn());

        opt.step(&mut [&mut x]);

        assert!((x.data()[[0]] - 0.95).abs() < 1e-6);
        assert!((x.data()[[1]] - 1.9).abs() < 1e-6);
    }

    #[test]
    fn test_sgd_momentum_accumulates() {
        let mut opt = SGD::new(0.1, 0.9, 0.0);
        let mut x = Param::new(arr1(&[0.0f32]).into_dyn());

        // Constant gradient: first step -lr*g, second step includes the
        // carried velocity
        x.add_grad(arr1(&[1.0f32]).into_dyn());
        opt.step(&mut [&mut x]);
        assert!((x.data()[[0]] + 0.1).abs() < 1e-6);

        x.zero_grad();
        x.add_grad(arr1(&[1.0f32]).into_dyn());
        opt.step(&mut [&mut x]);
        // v = 0.9 * (-0.1) - 0.1 = -0.19; x = -0.1 - 0.19
        assert!((x.data()[[0]] + 0.29).abs() < 1e-6);
    }

    #[test]
    fn test_sgd_converges_on_quadratic() {
        let mut opt = SGD::new(0.1, 0.9, 0.0);
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
    fn test_sgd_weight_decay_adds_l2_term() {
        let mut opt = SGD::new(0.1, 0.0, 0.1);
        let mut x = Param::new(arr1(&[2.0f32]).into_dyn());
        x.add_grad(arr1(&[0.0f32]).into_dyn());

        opt.step(&mut [&mut x]);

        // grad = 0 + 0.1 * 2.0; x = 2.0 - 0.1 * 0.2
        assert!((x.data()[[0]] - 1.98).abs() < 1e-6);
    }
}
