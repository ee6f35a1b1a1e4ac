//! Rprop optimizer (resilient backpropagation)

use super::Optimizer;
use crate::nn::Param;
use ndarray::{ArrayD, Zip};

/// Rprop optimizer
///
/// Full-batch method that adapts a per-element step size from the sign of
/// successive gradients and ignores their magnitude. A sign agreement grows
/// the step by `eta_plus`, a sign flip shrinks it by `eta_minus` and skips
/// the update for that element. The learning rate seeds the initial step
/// size.
#[derive(Debug)]
pub struct Rprop {
    lr: f32,
    eta_minus: f32,
    eta_plus: f32,
    step_min: f32,
    step_max: f32,
    prev_grad: Vec<Option<ArrayD<f32>>>,
    step_sizes: Vec<Option<ArrayD<f32>>>,
}

impl Rprop {
    /// Create a new Rprop optimizer
    pub fn new(lr: f32, eta_minus: f32, eta_plus: f32, step_min: f32, step_max: f32) -> Self {
        Self {
            lr,
            eta_minus,
            eta_plus,
            step_min,
            step_max,
            prev_grad: Vec::new(),
            step_sizes: Vec::new(),
        }
    }

    /// Initialize sign and step buffers if needed
    fn ensure_buffers(&mut self, count: usize) {
        if self.prev_grad.is_empty() {
            self.prev_grad = vec![None; count];
            self.step_sizes = vec![None; count];
        }
    }
}

impl Optimizer for Rprop {
    fn step(&mut self, params: &mut [&mut Param]) {
        self.ensure_buffers(params.len());

        let eta_minus = self.eta_minus;
        let eta_plus = self.eta_plus;
        let step_min = self.step_min;
        let step_max = self.step_max;

        for (i, param) in params.iter_mut().enumerate() {
            if let Some(mut grad) = param.grad().cloned() {
                let prev = self.prev_grad[i]
                    .take()
                    .unwrap_or_else(|| ArrayD::zeros(grad.raw_dim()));
                let mut step = self.step_sizes[i]
                    .take()
                    .unwrap_or_else(|| ArrayD::from_elem(grad.raw_dim(), self.lr));

                // Grow steps on sign agreement, shrink and hold on a flip.
                // A flipped element zeroes its gradient so the element skips
                // this update and the next comparison starts fresh.
                Zip::from(&mut grad).and(&prev).and(&mut step).for_each(|g, &p, s| {
                    let sign = *g * p;
                    if sign > 0.0 {
                        *s = (*s * eta_plus).min(step_max);
                    } else if sign < 0.0 {
                        *s = (*s * eta_minus).max(step_min);
                        *g = 0.0;
                    }
                });

                Zip::from(param.data_mut()).and(&grad).and(&step).for_each(|w, &g, &s| {
                    if g > 0.0 {
                        *w -= s;
                    } else if g < 0.0 {
                        *w += s;
                    }
                });

                self.prev_grad[i] = Some(grad);
                self.step_sizes[i] = Some(step);
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
