//! Learning rate schedulers
//!
//! Provides epoch-granular learning rate schedules:
//! - `MultiStepLR` - step decay at explicit epoch milestones
//! - `CosineAnnealingLR` - smooth cosine decay over a fixed period

mod cosine_annealing;
mod multi_step;

pub use cosine_annealing::CosineAnnealingLR;
pub use multi_step::MultiStepLR;

use super::Optimizer;

/// Learning rate scheduler trait
pub trait LRScheduler: std::fmt::Debug {
    /// Get the current learning rate
    fn get_lr(&self) -> f32;

    /// Step the scheduler (called once per epoch)
    fn step(&mut self);

    /// Apply the current learning rate to an optimizer
    fn apply(&self, optimizer: &mut dyn Optimizer) {
        optimizer.set_lr(self.get_lr());
    }
}
