//! Training module built around a single generator network
//!
//! [`BaseModel`] owns the network and its optional EMA copy. The runner
//! drives it through [`BaseModel::train_step`] and the validation
//! lifecycle; validation results accumulate inside the model for the
//! duration of one validation epoch.

mod ema;

pub use ema::ModelEma;

use crate::archs::{build_network, ReflectionNet};
use crate::config::Options;
use crate::data::Batch;
use crate::error::{Error, Result};
use crate::imgproc::{imwrite, tensor2img};
use crate::io::{load_checkpoint, Checkpoint};
use crate::metrics::calculate_metric;
use crate::nn::StateDict;
use crate::optim::{build_optimizer, build_scheduler, LRScheduler, Optimizer};
use crate::report::Reporter;
use crate::train::loss::l1_loss;
use ndarray::{concatenate, s, Array4, Axis};
use std::collections::{BTreeMap, HashMap};
use std::path::Path;

/// Cadence unit for scheduler stepping. Every bundled scheduler
/// advances on epoch boundaries.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScheduleInterval {
    Epoch,
}

/// Optimizer and scheduler paired with the bookkeeping the runner
/// drives them with.
pub struct OptimizerBundle {
    pub optimizer: Box<dyn Optimizer>,
    pub scheduler: Box<dyn LRScheduler>,

    /// Metric key watched by checkpoint selection
    pub monitor: String,

    pub interval: ScheduleInterval,

    /// Scheduler steps per interval
    pub frequency: usize,
}

/// What a weight load actually did.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LoadReport {
    /// Checkpoint group the weights came from; `None` means the whole
    /// flat checkpoint was used.
    pub group: Option<String>,

    /// Number of parameters copied into the network
    pub applied: usize,

    /// Parameter names absent from the checkpoint
    pub missing: Vec<String>,

    /// Checkpoint keys with no matching parameter
    pub unexpected: Vec<String>,

    /// Keys skipped for a shape mismatch (non-strict mode)
    pub ignored: Vec<String>,
}

/// What a validation step did with its batch.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StepOutcome {
    /// Inference ran; metrics and images were produced as configured
    Evaluated,
    /// The batch was unusable; a warning names the reason
    Skipped,
}

/// Split a staged network output into its clean and reflection images.
///
/// The last stage carries 3 clean channels followed by at least one
/// reflection channel.
pub fn split_last_stage(outputs: &[Array4<f32>]) -> Result<(Array4<f32>, Array4<f32>)> {
    let last = outputs
        .last()
        .ok_or_else(|| Error::InvalidArgument("network produced no stage outputs".to_string()))?;
    let channels = last.shape()[1];
    if channels <= 3 {
        return Err(Error::InvalidArgument(format!(
            "last stage must carry clean and reflection channels, got {channels}"
        )));
    }
    let clean = last.slice(s![.., ..3, .., ..]).to_owned();
    let reflection = last.slice(s![.., 3.., .., ..]).to_owned();
    Ok((clean, reflection))
}

/// The reflection-removal training module.
///
/// Holds the generator and its optional averaged copy. The validation
/// accumulator inside lives for exactly one validation epoch.
pub struct BaseModel {
    opts: Options,
    net_g: Box<dyn ReflectionNet>,
    ema: Option<ModelEma>,
    val_metrics: HashMap<String, HashMap<String, Vec<f64>>>,
    val_dataset_names: HashMap<usize, String>,
}

impl BaseModel {
    /// Build the network named by the options. The EMA copy exists only
    /// when `train.ema_decay` is positive.
    pub fn new(opts: Options) -> Result<Self> {
        let net_g = build_network(&opts.network_g, opts.manual_seed)?;
        let ema = (opts.train.ema_decay > 0.0)
            .then(|| ModelEma::new(net_g.as_ref(), opts.train.ema_decay));
        Ok(Self {
            opts,
            net_g,
            ema,
            val_metrics: HashMap::new(),
            val_dataset_names: HashMap::new(),
        })
    }

    pub fn options(&self) -> &Options {
        &self.opts
    }

    pub fn net(&self) -> &dyn ReflectionNet {
        self.net_g.as_ref()
    }

    pub fn net_mut(&mut self) -> &mut dyn ReflectionNet {
        self.net_g.as_mut()
    }

    pub fn ema(&self) -> Option<&ModelEma> {
        self.ema.as_ref()
    }

    /// Load pretrained weights from a checkpoint.
    ///
    /// The weight group is chosen by trying `param_key`, then
    /// `params_ema`, then `params`, then the whole flat checkpoint.
    /// The fallback is presence-based: a configured key that is absent
    /// falls through to the other group names before the flat view.
    /// `_orig_mod.` and `module.` wrapper prefixes are stripped from
    /// every key before matching. Strict mode fails on any key or shape
    /// difference; non-strict mode reports differences, marks
    /// shape-mismatched keys `.ignore`, and copies the intersection.
    pub fn load_weights(
        &mut self,
        path: &Path,
        param_key: &str,
        strict: bool,
        reporter: &Reporter,
    ) -> Result<LoadReport> {
        let ckpt = load_checkpoint(path)?;
        reporter.info(format!(
            "Loading weights for network_g from {}",
            path.display()
        ));

        let (weights, group) = select_weights(&ckpt, param_key, reporter);
        let mut weights = strip_wrapper_prefixes(weights);

        let current = self.net_g.state_dict();
        let (missing, unexpected, ignored) =
            reconcile_keys(&current, &mut weights, strict, reporter)?;

        let applicable: StateDict = weights
            .iter()
            .filter(|(name, _)| current.contains_key(*name))
            .map(|(name, tensor)| (name.clone(), tensor.clone()))
            .collect();
        self.net_g.apply_state(&applicable)?;

        if let Some(ema) = &mut self.ema {
            // The averaged copy reloads from its own checkpoint group
            // when one exists, otherwise it restarts from the freshly
            // loaded weights.
            match ckpt.group("params_ema") {
                Some(shadow) => ema.apply_state(&strip_wrapper_prefixes(shadow)),
                None => ema.apply_state(&applicable),
            }
        }

        Ok(LoadReport {
            group,
            applied: applicable.len(),
            missing,
            unexpected,
            ignored,
        })
    }

    /// Run one training batch: forward, dual L1 loss, backward.
    ///
    /// The clean channels are penalized against the ground truth and
    /// the reflection channels against `input - gt`. Gradients land in
    /// the network parameters; the caller owns the optimizer step.
    pub fn train_step(&mut self, batch: &Batch) -> Result<f32> {
        let input = batch.input.as_ref().ok_or_else(|| {
            Error::InvalidArgument("training batch carries no input tensor".to_string())
        })?;
        let gt = batch.gt.as_ref().ok_or_else(|| {
            Error::InvalidArgument("training batch carries no ground truth".to_string())
        })?;

        let outputs = self.net_g.forward_train(input)?;
        let (clean, reflection) = split_last_stage(&outputs)?;

        let residual = input - gt;
        let (clean_loss, d_clean) = l1_loss(&clean, gt)?;
        let (refl_loss, d_reflection) = l1_loss(&reflection, &residual)?;

        let d_last = concatenate(Axis(1), &[d_clean.view(), d_reflection.view()]).map_err(|_| {
            Error::ShapeMismatch {
                expected: d_clean.shape().to_vec(),
                got: d_reflection.shape().to_vec(),
            }
        })?;
        self.net_g.backward(&d_last)?;

        Ok(clean_loss + refl_loss)
    }

    /// Blend the live weights into the EMA copy, if one is configured.
    pub fn update_ema(&mut self) {
        if let Some(ema) = &mut self.ema {
            ema.update(self.net_g.as_ref());
        }
    }

    /// Pair the configured optimizer and scheduler with the monitored
    /// metric and the per-epoch stepping cadence.
    pub fn configure_optimizers(&self) -> Result<OptimizerBundle> {
        let optimizer = build_optimizer(&self.opts.train.optim_g)?;
        let scheduler = build_scheduler(&self.opts.train.scheduler, self.opts.train.optim_g.lr)?;
        Ok(OptimizerBundle {
            optimizer,
            scheduler,
            monitor: self.opts.checkpoint.monitor.clone(),
            interval: ScheduleInterval::Epoch,
            frequency: 1,
        })
    }

    /// Start a validation epoch: reset the accumulator and rebuild the
    /// loader index to dataset name map. A loader with no name gets
    /// `val_<idx>`.
    pub fn validation_begin(&mut self, dataset_names: &[&str]) {
        self.val_metrics.clear();
        self.val_dataset_names.clear();
        for (idx, name) in dataset_names.iter().enumerate() {
            let name = if name.is_empty() {
                format!("val_{idx}")
            } else {
                (*name).to_string()
            };
            self.val_dataset_names.insert(idx, name);
        }
    }

    /// Validate one batch.
    ///
    /// A batch without an input tensor is skipped with a warning rather
    /// than aborting the epoch. Image persistence and per-metric
    /// failures are likewise contained: each is reported and the step
    /// carries on.
    pub fn validation_step(
        &mut self,
        batch: &Batch,
        batch_idx: usize,
        loader_idx: usize,
        current_iter: u64,
        reporter: &Reporter,
    ) -> Result<StepOutcome> {
        let Some(input) = batch.input.as_ref() else {
            reporter.warn(format!(
                "Validation batch {batch_idx} carries no input tensor, skipped"
            ));
            return Ok(StepOutcome::Skipped);
        };

        let outputs = self.infer(input)?;
        let (clean, reflection) = split_last_stage(&outputs)?;

        let dataset = self
            .val_dataset_names
            .get(&loader_idx)
            .cloned()
            .unwrap_or_else(|| format!("val_{loader_idx}"));

        let stem = batch
            .paths
            .first()
            .and_then(Option::as_ref)
            .and_then(|path| path.file_stem())
            .map(|stem| stem.to_string_lossy().into_owned());
        let sample_name = match stem {
            Some(name) => name,
            None => {
                reporter.warn(format!(
                    "Validation batch {batch_idx} has no input path, using sample_{batch_idx}"
                ));
                format!("sample_{batch_idx}")
            }
        };

        if self.opts.val.save_img && reporter.is_primary() {
            self.save_images(
                &clean,
                &reflection,
                &dataset,
                &sample_name,
                current_iter,
                reporter,
            );
        }

        if !self.opts.val.metrics.is_empty() {
            // Metric accumulation needs a ground-truth image; test sets
            // without one only save outputs.
            if let Some(gt) = batch.gt.as_ref() {
                let clean_img = tensor2img(clean.index_axis(Axis(0), 0))?;
                let gt_img = tensor2img(gt.index_axis(Axis(0), 0))?;
                let slot = self.val_metrics.entry(dataset).or_default();
                for (metric_name, metric_opts) in &self.opts.val.metrics {
                    match calculate_metric(&clean_img, &gt_img, metric_opts) {
                        Ok(value) => slot.entry(metric_name.clone()).or_default().push(value),
                        Err(err) => reporter.warn(format!(
                            "Metric {metric_name} failed on {sample_name}: {err}"
                        )),
                    }
                }
            }
        }

        Ok(StepOutcome::Evaluated)
    }

    /// Finish a validation epoch: report per-dataset means and the
    /// sample-weighted overall mean per metric, then discard the
    /// accumulator. Returns the overall means keyed by metric name.
    pub fn validation_end(&mut self, epoch: usize, reporter: &Reporter) -> HashMap<String, f64> {
        let accumulated = std::mem::take(&mut self.val_metrics);
        let mut totals: BTreeMap<String, (f64, usize)> = BTreeMap::new();

        let mut datasets: Vec<&String> = accumulated.keys().collect();
        datasets.sort();
        for dataset in datasets {
            let metrics = &accumulated[dataset];
            let mut line = format!("Validation [{dataset}] epoch {epoch}");
            let mut names: Vec<&String> = metrics.keys().collect();
            names.sort();
            for name in names {
                let values = &metrics[name];
                if values.is_empty() {
                    continue;
                }
                let sum: f64 = values.iter().sum();
                let mean = sum / values.len() as f64;
                line.push_str(&format!("\n\t# {name}: {mean:.4}"));
                reporter.scalar(&format!("metrics/{dataset}/{name}"), epoch as u64, mean);

                let total = totals.entry(name.clone()).or_insert((0.0, 0));
                total.0 += sum;
                total.1 += values.len();
            }
            reporter.info(&line);
        }

        let mut averages = HashMap::new();
        if !totals.is_empty() {
            let mut line = format!("Validation [average] epoch {epoch}");
            for (name, (sum, count)) in &totals {
                if *count == 0 {
                    continue;
                }
                let mean = sum / *count as f64;
                line.push_str(&format!("\n\t# {name}: {mean:.4}"));
                reporter.scalar(&format!("metrics/average/{name}"), epoch as u64, mean);
                averages.insert(name.clone(), mean);
            }
            reporter.info(&line);
        }
        averages
    }

    /// Snapshot the weight groups a checkpoint should carry.
    pub fn checkpoint_groups(&self) -> BTreeMap<String, StateDict> {
        let mut groups = BTreeMap::new();
        groups.insert("params".to_string(), self.net_g.state_dict());
        if let Some(ema) = &self.ema {
            groups.insert("params_ema".to_string(), ema.state_dict().clone());
        }
        groups
    }

    /// Inference on the averaged weights when EMA is active, otherwise
    /// on the live network. Live weights are restored before returning.
    fn infer(&mut self, input: &Array4<f32>) -> Result<Vec<Array4<f32>>> {
        match &self.ema {
            Some(ema) => {
                let live = self.net_g.state_dict();
                self.net_g.apply_state(ema.state_dict())?;
                let outputs = self.net_g.forward(input);
                self.net_g.apply_state(&live)?;
                outputs
            }
            None => self.net_g.forward(input),
        }
    }

    fn save_images(
        &self,
        clean: &Array4<f32>,
        reflection: &Array4<f32>,
        dataset: &str,
        sample_name: &str,
        current_iter: u64,
        reporter: &Reporter,
    ) {
        let mut dir = self.opts.path.visualization.clone();
        if self.opts.is_train {
            dir = dir.join(dataset);
        }
        let dir = dir.join(sample_name);
        let tag = if self.opts.is_train {
            current_iter.to_string()
        } else {
            self.opts
                .val
                .suffix
                .clone()
                .unwrap_or_else(|| self.opts.name.clone())
        };

        for (role, tensor) in [("clean", clean), ("reflection", reflection)] {
            let path = dir.join(format!("{sample_name}_{role}_{tag}.png"));
            let saved =
                tensor2img(tensor.index_axis(Axis(0), 0)).and_then(|img| imwrite(&img, &path));
            if let Err(err) = saved {
                reporter.warn(format!("Could not save {}: {err}", path.display()));
            }
        }
    }
}

fn select_weights(
    ckpt: &Checkpoint,
    param_key: &str,
    reporter: &Reporter,
) -> (StateDict, Option<String>) {
    if let Some(group) = ckpt.group(param_key) {
        return (group, Some(param_key.to_string()));
    }
    for fallback in ["params_ema", "params"] {
        if param_key != fallback {
            if let Some(group) = ckpt.group(fallback) {
                reporter.info(format!(
                    "Checkpoint has no [{param_key}] group, loading [{fallback}] instead"
                ));
                return (group, Some(fallback.to_string()));
            }
        }
    }
    reporter.info(format!(
        "Checkpoint has no [{param_key}] group, loading the whole file"
    ));
    (ckpt.tensors().clone(), None)
}

fn strip_wrapper_prefixes(state: StateDict) -> StateDict {
    let stripped = strip_key_prefix(state, "_orig_mod.");
    strip_key_prefix(stripped, "module.")
}

fn strip_key_prefix(state: StateDict, prefix: &str) -> StateDict {
    state
        .into_iter()
        .map(|(name, tensor)| match name.strip_prefix(prefix) {
            Some(rest) => (rest.to_string(), tensor),
            None => (name, tensor),
        })
        .collect()
}

/// Compare the loaded keys against the live network's.
///
/// Key-set differences are reported in both directions. A shape
/// mismatch on a common key is fatal in strict mode; in non-strict
/// mode the key is renamed with an `.ignore` suffix so it can never
/// match a parameter. Returns (missing, unexpected, ignored).
fn reconcile_keys(
    current: &StateDict,
    loaded: &mut StateDict,
    strict: bool,
    reporter: &Reporter,
) -> Result<(Vec<String>, Vec<String>, Vec<String>)> {
    let missing: Vec<String> = current
        .keys()
        .filter(|name| !loaded.contains_key(*name))
        .cloned()
        .collect();
    let unexpected: Vec<String> = loaded
        .keys()
        .filter(|name| !current.contains_key(*name))
        .cloned()
        .collect();

    if !missing.is_empty() || !unexpected.is_empty() {
        if !missing.is_empty() {
            reporter.warn("Parameters missing from the checkpoint:");
            for name in &missing {
                reporter.warn(format!("  {name}"));
            }
        }
        if !unexpected.is_empty() {
            reporter.warn("Checkpoint keys with no matching parameter:");
            for name in &unexpected {
                reporter.warn(format!("  {name}"));
            }
        }
        if strict {
            return Err(Error::StateDictMismatch(format!(
                "{} missing and {} unexpected keys",
                missing.len(),
                unexpected.len()
            )));
        }
    }

    let mismatched: Vec<String> = loaded
        .iter()
        .filter(|(name, tensor)| {
            current
                .get(*name)
                .is_some_and(|have| have.shape() != tensor.shape())
        })
        .map(|(name, _)| name.clone())
        .collect();

    let mut ignored = Vec::new();
    for name in mismatched {
        let got = loaded[&name].shape().to_vec();
        let expected = current[&name].shape().to_vec();
        if strict {
            return Err(Error::StateDictMismatch(format!(
                "size mismatch for [{name}]: checkpoint {got:?}, network {expected:?}"
            )));
        }
        reporter.warn(format!(
            "Size mismatch for [{name}]: checkpoint {got:?}, network {expected:?}, ignored"
        ));
        if let Some(tensor) = loaded.remove(&name) {
            loaded.insert(format!("{name}.ignore"), tensor);
        }
        ignored.push(name);
    }
    Ok((missing, unexpected, ignored))
}
