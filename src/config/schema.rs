//! YAML schema definitions for the options file
//!
//! The options file drives a whole run: datasets, network, optimizer,
//! scheduler, validation and checkpointing. Algorithm-specific knobs
//! live in flattened maps on the optimizer, scheduler and metric
//! sections and are forwarded verbatim to the factories.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::PathBuf;

/// Top-level options for one run
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Options {
    /// Run name, used for visualization suffixes in test mode
    #[serde(default = "default_name")]
    pub name: String,

    /// Seed for weight init, shuffling and worker RNGs
    #[serde(default)]
    pub manual_seed: u64,

    /// Training run (true) or evaluation-only run (false)
    #[serde(default = "default_true")]
    pub is_train: bool,

    /// Dataset sections keyed by role (`train`, `val`, `val_1`, `test`, ...)
    #[serde(default)]
    pub datasets: HashMap<String, DatasetOptions>,

    /// Generator network
    #[serde(default)]
    pub network_g: NetworkOptions,

    /// Paths: pretrained weights, visualization and checkpoint roots
    #[serde(default)]
    pub path: PathOptions,

    /// Training hyperparameters
    #[serde(default)]
    pub train: TrainSection,

    /// Validation behavior and metrics
    #[serde(default)]
    pub val: ValSection,

    /// Checkpoint selection
    #[serde(default)]
    pub checkpoint: CheckpointSection,
}

impl Default for Options {
    fn default() -> Self {
        Self {
            name: default_name(),
            manual_seed: 0,
            is_train: true,
            datasets: HashMap::new(),
            network_g: NetworkOptions::default(),
            path: PathOptions::default(),
            train: TrainSection::default(),
            val: ValSection::default(),
            checkpoint: CheckpointSection::default(),
        }
    }
}

fn default_name() -> String {
    "despejar".to_string()
}

fn default_true() -> bool {
    true
}

/// One dataset section
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DatasetOptions {
    /// Display name used in metric keys and visualization paths
    pub name: String,

    /// Dataset implementation: "PairedImage" | "SyntheticBlend"
    #[serde(rename = "type")]
    pub dataset_type: String,

    /// Loader phase: "train" | "val" | "test". Filled from the section
    /// key when omitted.
    pub phase: String,

    /// Directory of input (blended) images
    #[serde(skip_serializing_if = "Option::is_none")]
    pub dataroot_input: Option<PathBuf>,

    /// Directory of ground-truth (clean) images
    #[serde(skip_serializing_if = "Option::is_none")]
    pub dataroot_gt: Option<PathBuf>,

    /// Sample count for synthetic datasets
    pub num_samples: usize,

    /// Square patch size for synthetic datasets
    pub patch_size: usize,

    /// Training batch size
    pub batch_size_per_gpu: usize,

    /// Training loader worker count
    pub num_worker_per_gpu: usize,

    /// Shuffle flag, consulted only in the val/test phases
    pub use_shuffle: bool,

    /// Accepted for compatibility with GPU loaders; unused here
    pub pin_memory: bool,

    /// Accepted for compatibility with GPU loaders; unused here
    pub persistent_workers: bool,

    /// Background prefetch: absent/"none" disables, "cpu" enables
    #[serde(skip_serializing_if = "Option::is_none")]
    pub prefetch_mode: Option<String>,

    /// Bounded queue depth for cpu prefetch
    pub num_prefetch_queue: usize,

    /// Implementation-specific knobs
    #[serde(flatten)]
    pub extra: HashMap<String, serde_json::Value>,
}

impl Default for DatasetOptions {
    fn default() -> Self {
        Self {
            name: String::new(),
            dataset_type: String::new(),
            phase: String::new(),
            dataroot_input: None,
            dataroot_gt: None,
            num_samples: 16,
            patch_size: 32,
            batch_size_per_gpu: 1,
            num_worker_per_gpu: 0,
            use_shuffle: false,
            pin_memory: false,
            persistent_workers: false,
            prefetch_mode: None,
            num_prefetch_queue: 1,
            extra: HashMap::new(),
        }
    }
}

/// Generator network section
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct NetworkOptions {
    /// Architecture tag
    #[serde(rename = "type")]
    pub network_type: String,

    /// Hidden feature width
    pub num_feat: usize,

    /// Reflection channels in the last stage (in addition to 3 clean)
    pub num_refl: usize,

    /// Architecture-specific knobs
    #[serde(flatten)]
    pub extra: HashMap<String, serde_json::Value>,
}

impl Default for NetworkOptions {
    fn default() -> Self {
        Self {
            network_type: "DualStream".to_string(),
            num_feat: 16,
            num_refl: 3,
            extra: HashMap::new(),
        }
    }
}

/// Filesystem paths
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PathOptions {
    /// Pretrained generator checkpoint to load before running
    #[serde(skip_serializing_if = "Option::is_none")]
    pub pretrain_network_g: Option<PathBuf>,

    /// Checkpoint group to load the generator from
    pub param_key_g: String,

    /// Fail on any key or shape mismatch when loading
    pub strict_load_g: bool,

    /// Root directory for saved validation images
    pub visualization: PathBuf,

    /// Directory for saved checkpoints
    pub checkpoints: PathBuf,
}

impl Default for PathOptions {
    fn default() -> Self {
        Self {
            pretrain_network_g: None,
            param_key_g: "params".to_string(),
            strict_load_g: true,
            visualization: PathBuf::from("visualization"),
            checkpoints: PathBuf::from("checkpoints"),
        }
    }
}

/// Optimizer section
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OptimOptions {
    /// Algorithm tag: Adam | AdamW | Adamax | SGD | ASGD | RMSprop | Rprop
    #[serde(rename = "type", default = "default_optim_type")]
    pub optim_type: String,

    /// Learning rate
    #[serde(default = "default_lr")]
    pub lr: f32,

    /// Algorithm-specific parameters (betas, momentum, alpha, ...)
    #[serde(flatten)]
    pub params: HashMap<String, serde_json::Value>,
}

impl Default for OptimOptions {
    fn default() -> Self {
        Self {
            optim_type: default_optim_type(),
            lr: default_lr(),
            params: HashMap::new(),
        }
    }
}

fn default_optim_type() -> String {
    "Adam".to_string()
}

fn default_lr() -> f32 {
    1e-4
}

/// Learning-rate scheduler section
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SchedulerOptions {
    /// Algorithm tag: MultiStepLR | MultiStepRestartLR |
    /// CosineAnnealingLR | CosineAnnealingRestartLR
    #[serde(rename = "type")]
    pub scheduler_type: String,

    /// Epochs at which the step-decay schedulers multiply by gamma
    pub milestones: Vec<usize>,

    /// Step-decay factor
    pub gamma: f32,

    /// Cosine annealing period in epochs
    pub period: usize,

    /// Cosine annealing floor
    pub eta_min: f32,

    /// Unrecognized knobs ride along and are ignored
    #[serde(flatten)]
    pub extra: HashMap<String, serde_json::Value>,
}

impl Default for SchedulerOptions {
    fn default() -> Self {
        Self {
            scheduler_type: "MultiStepLR".to_string(),
            milestones: Vec::new(),
            gamma: 0.5,
            period: 10,
            eta_min: 0.0,
            extra: HashMap::new(),
        }
    }
}

/// Training hyperparameters
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct TrainSection {
    /// Total training epochs
    pub epochs: usize,

    /// Generator optimizer
    pub optim_g: OptimOptions,

    /// Learning-rate scheduler
    pub scheduler: SchedulerOptions,

    /// EMA decay; 0 disables the EMA copy
    pub ema_decay: f32,

    /// Report training loss every N iterations
    pub print_freq: usize,

    /// Save a checkpoint every N epochs
    pub save_freq: usize,
}

impl Default for TrainSection {
    fn default() -> Self {
        Self {
            epochs: 1,
            optim_g: OptimOptions::default(),
            scheduler: SchedulerOptions::default(),
            ema_decay: 0.0,
            print_freq: 100,
            save_freq: 1,
        }
    }
}

/// Validation behavior
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ValSection {
    /// Run validation every N epochs
    pub val_freq: usize,

    /// Persist clean/reflection images for every validated sample
    pub save_img: bool,

    /// Filename tag in test mode; falls back to the run name
    #[serde(skip_serializing_if = "Option::is_none")]
    pub suffix: Option<String>,

    /// Metric sections keyed by display name
    pub metrics: HashMap<String, MetricOptions>,
}

impl Default for ValSection {
    fn default() -> Self {
        Self {
            val_freq: 1,
            save_img: false,
            suffix: None,
            metrics: HashMap::new(),
        }
    }
}

/// One metric section
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct MetricOptions {
    /// Metric implementation: "psnr" | "ssim"
    #[serde(rename = "type")]
    pub metric_type: String,

    /// Pixels trimmed from every edge before comparison
    pub crop_border: usize,

    /// Compare on the BT.601 luma plane instead of RGB
    pub test_y_channel: bool,

    /// Implementation-specific knobs
    #[serde(flatten)]
    pub extra: HashMap<String, serde_json::Value>,
}

impl Default for MetricOptions {
    fn default() -> Self {
        Self {
            metric_type: String::new(),
            crop_border: 0,
            test_y_channel: false,
            extra: HashMap::new(),
        }
    }
}

/// Checkpoint selection
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CheckpointSection {
    /// Metric key watched by checkpoint selection and early stopping
    pub monitor: String,
}

impl Default for CheckpointSection {
    fn default() -> Self {
        Self {
            monitor: "val/psnr".to_string(),
        }
    }
}
