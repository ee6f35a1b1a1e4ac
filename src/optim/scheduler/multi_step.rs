//! Milestone-based step decay learning rate scheduler

use super::LRScheduler;

/// Multi-Step Learning Rate Scheduler
///
/// Multiplies the learning rate by gamma at each configured milestone epoch.
///
/// Formula: lr_t = lr_initial * gamma^(milestones passed by epoch t)
#[derive(Debug)]
pub struct MultiStepLR {
    lr_initial: f32,
    gamma: f32,
    milestones: Vec<usize>,
    current_epoch: usize,
}

impl MultiStepLR {
    /// Create a new multi-step scheduler
    ///
    /// # Arguments
    /// * `lr_initial` - Initial learning rate
    /// * `milestones` - Epochs at which the learning rate decays
    /// * `gamma` - Multiplicative factor (e.g., 0.1 for 10x reduction)
    pub fn new(lr_initial: f32, milestones: Vec<usize>, gamma: f32) -> Self {
        Self { lr_initial, gamma, milestones, current_epoch: 0 }
    }
}

impl LRScheduler for MultiStepLR {
    fn get_lr(&self) -> f32 {
        let decays = self.milestones.iter().filter(|&&m| m <= self.current_epoch).count();
        self.lr_initial * self.gamma.powi(decays as i32)
    }

    fn step(&mut self) {
        self.current_epoch += 1;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_multi_step_decays_at_milestones() {
        let mut sched = MultiStepLR::new(1.0, vec![2, 4], 0.1);

        let mut lrs = Vec::new();
        for _ in 0..5 {
            lrs.push(sched.get_lr());
            sched.step();
        }

        let expected = [1.0f32, 1.0, 0.1, 0.1, 0.01];
        for (got, want) in lrs.iter().zip(expected.iter()) {
            assert!((got - want).abs() < 1e-9, "{lrs:?}");
        }
    }

    #[test]
    fn test_multi_step_without_milestones_is_constant() {
        let mut sched = MultiStepLR::new(0.5, Vec::new(), 0.1);
        for _ in 0..10 {
            assert_eq!(sched.get_lr(), 0.5);
            sched.step();
        }
    }

    #[test]
    fn test_multi_step_repeated_milestone_decays_twice() {
        let mut sched = MultiStepLR::new(1.0, vec![1, 1], 0.5);
        sched.step();
        assert!((sched.get_lr() - 0.25).abs() < 1e-9);
    }
}
