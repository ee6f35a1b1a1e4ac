//! Options file loading and validation

use crate::config::schema::Options;
use crate::error::{Error, Result};
use std::fs;
use std::path::Path;

/// Read an options file, then normalize and validate it.
pub fn load_options(path: impl AsRef<Path>) -> Result<Options> {
    let text = fs::read_to_string(path.as_ref())?;
    let mut opts: Options = serde_yaml::from_str(&text)?;
    normalize(&mut opts);
    validate(&opts)?;
    Ok(opts)
}

/// Fill derived fields: a dataset section without an explicit phase takes
/// it from its key, with any `_<n>` suffix dropped (`val_1` -> `val`).
pub fn normalize(opts: &mut Options) {
    for (key, dataset) in opts.datasets.iter_mut() {
        if dataset.phase.is_empty() {
            dataset.phase = key.split('_').next().unwrap_or(key).to_string();
        }
    }
}

/// Reject configurations that cannot produce a meaningful run.
pub fn validate(opts: &Options) -> Result<()> {
    for (key, dataset) in &opts.datasets {
        if dataset.dataset_type.is_empty() {
            return Err(Error::ConfigError(format!(
                "dataset '{key}' has no type"
            )));
        }
        if dataset.batch_size_per_gpu == 0 {
            return Err(Error::ConfigError(format!(
                "dataset '{key}': batch_size_per_gpu must be at least 1"
            )));
        }
        if dataset.num_prefetch_queue == 0 {
            return Err(Error::ConfigError(format!(
                "dataset '{key}': num_prefetch_queue must be at least 1"
            )));
        }
    }

    let train = &opts.train;
    if train.optim_g.lr <= 0.0 {
        return Err(Error::ConfigError(format!(
            "learning rate must be positive, got {}",
            train.optim_g.lr
        )));
    }
    if !(0.0..1.0).contains(&train.ema_decay) {
        return Err(Error::ConfigError(format!(
            "ema_decay must be in [0, 1), got {}",
            train.ema_decay
        )));
    }
    if train.scheduler.gamma <= 0.0 || train.scheduler.gamma > 1.0 {
        return Err(Error::ConfigError(format!(
            "scheduler gamma must be in (0, 1], got {}",
            train.scheduler.gamma
        )));
    }
    if train.scheduler.period == 0 {
        return Err(Error::ConfigError(
            "scheduler period must be at least 1".to_string(),
        ));
    }

    for (name, metric) in &opts.val.metrics {
        if metric.metric_type.is_empty() {
            return Err(Error::ConfigError(format!(
                "metric '{name}' has no type"
            )));
        }
    }
    Ok(())
}
