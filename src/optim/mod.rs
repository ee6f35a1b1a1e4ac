//! Optimizers and learning rate schedulers for training
//!
//! The factories consume the optimizer and scheduler sections of the
//! options file. Algorithm-specific knobs ride in the flattened parameter
//! map and fall back to the conventional defaults when absent.

mod adam;
mod adamax;
mod adamw;
mod asgd;
mod optimizer;
mod rmsprop;
mod rprop;
mod scheduler;
mod sgd;

pub use adam::Adam;
pub use adamax::Adamax;
pub use adamw::AdamW;
pub use asgd::ASGD;
pub use optimizer::Optimizer;
pub use rmsprop::RMSprop;
pub use rprop::Rprop;
pub use scheduler::{CosineAnnealingLR, LRScheduler, MultiStepLR};
pub use sgd::SGD;

use crate::config::{OptimOptions, SchedulerOptions};
use crate::error::{Error, Result};
use std::collections::HashMap;

fn param_f32(params: &HashMap<String, serde_json::Value>, key: &str, default: f32) -> f32 {
    params.get(key).and_then(serde_json::Value::as_f64).map_or(default, |v| v as f32)
}

/// Build an optimizer from its options section
///
/// The algorithm tag is matched case-insensitively. Unrecognized tags are
/// rejected with the offending string.
pub fn build_optimizer(opts: &OptimOptions) -> Result<Box<dyn Optimizer>> {
    let p = &opts.params;

    match opts.optim_type.to_lowercase().as_str() {
        "adam" => Ok(Box::new(Adam::new(
            opts.lr,
            param_f32(p, "beta1", 0.9),
            param_f32(p, "beta2", 0.999),
            param_f32(p, "eps", 1e-8),
            param_f32(p, "weight_decay", 0.0),
        ))),
        "adamw" => Ok(Box::new(AdamW::new(
            opts.lr,
            param_f32(p, "beta1", 0.9),
            param_f32(p, "beta2", 0.999),
            param_f32(p, "eps", 1e-8),
            param_f32(p, "weight_decay", 0.01),
        ))),
        "adamax" => Ok(Box::new(Adamax::new(
            opts.lr,
            param_f32(p, "beta1", 0.9),
            param_f32(p, "beta2", 0.999),
            param_f32(p, "eps", 1e-8),
            param_f32(p, "weight_decay", 0.0),
        ))),
        "sgd" => Ok(Box::new(SGD::new(
            opts.lr,
            param_f32(p, "momentum", 0.0),
            param_f32(p, "weight_decay", 0.0),
        ))),
        "asgd" => Ok(Box::new(ASGD::new(
            opts.lr,
            param_f32(p, "lambda", 1e-4),
            param_f32(p, "alpha", 0.75),
            param_f32(p, "t0", 1e6),
            param_f32(p, "weight_decay", 0.0),
        ))),
        "rmsprop" => Ok(Box::new(RMSprop::new(
            opts.lr,
            param_f32(p, "alpha", 0.99),
            param_f32(p, "eps", 1e-8),
            param_f32(p, "momentum", 0.0),
            param_f32(p, "weight_decay", 0.0),
        ))),
        "rprop" => Ok(Box::new(Rprop::new(
            opts.lr,
            param_f32(p, "eta_minus", 0.5),
            param_f32(p, "eta_plus", 1.2),
            param_f32(p, "step_min", 1e-6),
            param_f32(p, "step_max", 50.0),
        ))),
        _ => Err(Error::UnsupportedOptimizer(opts.optim_type.clone())),
    }
}

/// Build a scheduler from its options section
///
/// The restart spellings map onto the plain schedules; restarts beyond the
/// first period are not modeled.
pub fn build_scheduler(opts: &SchedulerOptions, lr_initial: f32) -> Result<Box<dyn LRScheduler>> {
    match opts.scheduler_type.to_lowercase().as_str() {
        "multisteplr" | "multisteprestartlr" => {
            Ok(Box::new(MultiStepLR::new(lr_initial, opts.milestones.clone(), opts.gamma)))
        }
        "cosineannealinglr" | "cosineannealingrestartlr" => {
            Ok(Box::new(CosineAnnealingLR::new(lr_initial, opts.period, opts.eta_min)))
        }
        _ => Err(Error::UnsupportedScheduler(opts.scheduler_type.clone())),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn optim_opts(yaml: &str) -> OptimOptions {
        serde_yaml::from_str(yaml).unwrap()
    }

    fn sched_opts(yaml: &str) -> SchedulerOptions {
        serde_yaml::from_str(yaml).unwrap()
    }

    #[test]
    fn test_build_optimizer_all_supported_tags() {
        for tag in ["Adam", "AdamW", "Adamax", "SGD", "ASGD", "RMSprop", "Rprop"] {
            let opts = optim_opts(&format!("type: {tag}\nlr: 0.001"));
            let opt = build_optimizer(&opts).unwrap();
            assert!((opt.lr() - 0.001).abs() < 1e-9, "{tag}");
        }
    }

    #[test]
    fn test_build_optimizer_is_case_insensitive() {
        let opts = optim_opts("type: aDaM\nlr: 0.01");
        assert!(build_optimizer(&opts).is_ok());
    }

    #[test]
    fn test_build_optimizer_rejects_unknown_tag() {
        let opts = optim_opts("type: LBFGS\nlr: 0.01");
        let err = build_optimizer(&opts).unwrap_err();
        match err {
            Error::UnsupportedOptimizer(tag) => assert_eq!(tag, "LBFGS"),
            other => panic!("wrong error: {other}"),
        }
    }

    #[test]
    fn test_build_scheduler_plain_and_restart_spellings() {
        for tag in ["MultiStepLR", "MultiStepRestartLR"] {
            let opts = sched_opts(&format!("type: {tag}\nmilestones: [3]\ngamma: 0.1"));
            let mut sched = build_scheduler(&opts, 1.0).unwrap();
            for _ in 0..3 {
                sched.step();
            }
            assert!((sched.get_lr() - 0.1).abs() < 1e-9, "{tag}");
        }

        for tag in ["CosineAnnealingLR", "CosineAnnealingRestartLR"] {
            let opts = sched_opts(&format!("type: {tag}\nperiod: 10\neta_min: 0.0"));
            let sched = build_scheduler(&opts, 1.0).unwrap();
            assert!((sched.get_lr() - 1.0).abs() < 1e-9, "{tag}");
        }
    }

    #[test]
    fn test_build_scheduler_rejects_unknown_tag() {
        let opts = sched_opts("type: OneCycleLR");
        let err = build_scheduler(&opts, 1.0).unwrap_err();
        match err {
            Error::UnsupportedScheduler(tag) => assert_eq!(tag, "OneCycleLR"),
            other => panic!("wrong error: {other}"),
        }
    }

    #[test]
    fn test_scheduler_apply_sets_optimizer_lr() {
        let opts = sched_opts("type: MultiStepLR\nmilestones: [1]\ngamma: 0.5");
        let mut sched = build_scheduler(&opts, 0.2).unwrap();
        let mut opt = build_optimizer(&optim_opts("type: SGD\nlr: 0.2")).unwrap();

        sched.step();
        sched.apply(&mut *opt);

        assert!((opt.lr() - 0.1).abs() < 1e-9);
    }
}
