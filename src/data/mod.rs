//! Datasets, phase-aware dataloaders, background prefetching
//!
//! [`build_dataset`] maps the options `type` tag onto a registered
//! dataset implementation; [`build_dataloader`] wraps a dataset in the
//! loader its phase calls for.

mod dataset;
pub mod loader;
mod paired;
pub mod prefetch;
mod synthetic;

pub use dataset::{Batch, ImageDataset, Sample};
pub use loader::{build_dataloader, loader_policy, DataLoader, Loader, LoaderPolicy, Phase};
pub use paired::PairedImageDataset;
pub use prefetch::PrefetchLoader;
pub use synthetic::SyntheticBlendDataset;

use crate::config::DatasetOptions;
use crate::error::{Error, Result};

/// Registered dataset tags
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DatasetKind {
    PairedImage,
    SyntheticBlend,
}

impl DatasetKind {
    /// Parse the `type` tag from a dataset section
    pub fn from_tag(tag: &str) -> Result<Self> {
        match tag.to_lowercase().as_str() {
            "pairedimage" | "pairedimagedataset" => Ok(DatasetKind::PairedImage),
            "syntheticblend" | "syntheticblenddataset" => Ok(DatasetKind::SyntheticBlend),
            _ => Err(Error::UnknownDataset(tag.to_string())),
        }
    }
}

/// Construct the dataset named by the options.
///
/// The implementation receives its own copy of the options, so it can
/// never mutate the caller's configuration.
pub fn build_dataset(opts: &DatasetOptions) -> Result<Box<dyn ImageDataset>> {
    match DatasetKind::from_tag(&opts.dataset_type)? {
        DatasetKind::PairedImage => Ok(Box::new(PairedImageDataset::new(opts.clone())?)),
        DatasetKind::SyntheticBlend => Ok(Box::new(SyntheticBlendDataset::new(opts.clone()))),
    }
}
