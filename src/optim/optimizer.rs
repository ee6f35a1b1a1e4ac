//! Optimizer trait

use crate::nn::Param;

/// Trait for optimization algorithms
///
/// Implementations own their moment buffers and update parameters in place.
/// Parameters are passed as mutable references borrowed from the network for
/// the duration of the step.
pub trait Optimizer: std::fmt::Debug {
    /// Perform a single optimization step
    fn step(&mut self, params: &mut [&mut Param]);

    /// Zero out all gradients
    fn zero_grad(&mut self, params: &mut [&mut Param]) {
        for param in params.iter_mut() {
            param.zero_grad();
        }
    }

    /// Get learning rate
    fn lr(&self) -> f32;

    /// Set learning rate
    fn set_lr(&mut self, lr: f32);
}
