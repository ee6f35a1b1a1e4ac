//! Averaged Stochastic Gradient Descent optimizer

use super::Optimizer;
use crate::nn::Param;
use ndarray::ArrayD;

/// ASGD optimizer
///
/// SGD with a decaying step size `eta` and a Polyak running average of the
/// iterates. The averaging weight `mu` stays at 1 (plain copy) until `t0`
/// steps have passed, then shrinks as 1 / (t - t0):
///
/// θ_t = (1 - λ * η) * θ_{t-1} - η * g
/// η   = lr / (1 + λ * lr * t)^α
#[derive(Debug)]
pub struct ASGD {
    lr: f32,
    lambda: f32,
    alpha: f32,
    t0: f32,
    weight_decay: f32,
    t: u64,
    eta: f32,
    mu: f32,
    ax: Vec<Option<ArrayD<f32>>>,
}

impl ASGD {
    /// Create a new ASGD optimizer
    pub fn new(lr: f32, lambda: f32, alpha: f32, t0: f32, weight_decay: f32) -> Self {
        Self {
            lr,
            lambda,
            alpha,
            t0,
            weight_decay,
            t: 0,
            eta: lr,
            mu: 1.0,
            ax: Vec::new(),
        }
    }

    /// Initialize averaging buffers if needed
    fn ensure_buffers(&mut self, count: usize) {
        if self.ax.is_empty() {
            self.ax = vec![None; count];
        }
    }

    /// Running Polyak averages of the parameters, one per parameter slot
    pub fn averaged(&self) -> &[Option<ArrayD<f32>>] {
        &self.ax
    }
}

impl Optimizer for ASGD {
    fn step(&mut self, params: &mut [&mut Param]) {
        self.ensure_buffers(params.len());
        self.t += 1;

        let eta = self.eta;
        let mu = self.mu;
        let decay = 1.0 - self.lambda * eta;

        for (i, param) in params.iter_mut().enumerate() {
            if let Some(grad) = param.grad().cloned() {
                let grad = if self.weight_decay > 0.0 {
                    grad + &(param.data() * self.weight_decay)
                } else {
                    grad
                };

                param.data_mut().mapv_inplace(|w| w * decay);
                *param.data_mut() -= &(&grad * eta);

                let ax = match self.ax[i].take() {
                    Some(mut ax) if mu < 1.0 => {
                        ax.zip_mut_with(param.data(), |a, &w| *a += mu * (w - *a));
                        ax
                    }
                    _ => param.data().clone(),
                };
                self.ax[i] = Some(ax);
            }
        }

        self.eta = self.lr / (1.0 + self.lambda * self.lr * self.t as f32).powf(self.alpha);
        self.mu = 1.0 / (self.t as f32 - self.t0).max(1.0);
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
    fn test_asgd_converges_on_quadratic() {
        let mut opt = ASGD::new(0.1, 1e-4, 0.75, 1e6, 0.0);
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
    fn test_asgd_eta_decays_with_lambda() {
        // Constant gradient, large lambda: each step is smaller than the last
        let mut opt = ASGD::new(0.5, 1.0, 0.75, 1e6, 0.0);
        let mut x = Param::new(arr1(&[0.0f32]).into_dyn());

        x.add_grad(arr1(&[1.0f32]).into_dyn());
        opt.step(&mut [&mut x]);
        x.zero_grad();
        let first = x.data()[[0]].abs();

        let before = x.data()[[0]];
        x.add_grad(arr1(&[1.0f32]).into_dyn());
        opt.step(&mut [&mut x]);
        let second = (x.data()[[0]] - before).abs();

        assert!(second < first, "steps did not shrink: {first} then {second}");
    }

    #[test]
    fn test_asgd_averages_iterates_past_t0() {
        // t0 = 0: mu stays 1 (plain copy) through step 2, then the third
        // step blends with mu = 1/2
        let mut opt = ASGD::new(0.1, 0.0, 0.75, 0.0, 0.0);
        let mut x = Param::new(arr1(&[1.0f32]).into_dyn());

        let mut iterates = Vec::new();
        for _ in 0..3 {
            x.add_grad(arr1(&[1.0f32]).into_dyn());
            opt.step(&mut [&mut x]);
            x.zero_grad();
            iterates.push(x.data()[[0]]);
        }

        let ax = opt.averaged()[0].as_ref().unwrap();
        assert!((ax[[0]] - (iterates[1] + iterates[2]) / 2.0).abs() < 1e-6);
    }
}
