//! Dataset trait and the sample/batch records loaders produce

use crate::error::{Error, Result};
use ndarray::{stack, Array3, Array4, Axis};
use rand::rngs::StdRng;
use std::path::PathBuf;

/// One sample as produced by a dataset.
///
/// Fields are optional because not every dataset provides every tensor;
/// consumers check presence explicitly.
#[derive(Debug, Clone)]
pub struct Sample {
    /// Blended (input) image, CHW in `[0, 1]`
    pub input: Option<Array3<f32>>,

    /// Clean ground-truth image, CHW in `[0, 1]`
    pub gt: Option<Array3<f32>>,

    /// Source file of the input image, when one exists
    pub input_path: Option<PathBuf>,
}

/// A stack of samples as produced by a loader.
///
/// A tensor field is present only when every collated sample carried it.
#[derive(Debug, Clone)]
pub struct Batch {
    /// NCHW input images
    pub input: Option<Array4<f32>>,

    /// NCHW ground-truth images
    pub gt: Option<Array4<f32>>,

    /// Per-sample source paths, aligned with the batch dimension
    pub paths: Vec<Option<PathBuf>>,
}

impl Batch {
    /// Stack samples along a new batch axis.
    pub fn collate(samples: Vec<Sample>) -> Result<Self> {
        let paths: Vec<Option<PathBuf>> = samples.iter().map(|s| s.input_path.clone()).collect();
        let input = stack_field(&samples, |s| s.input.as_ref())?;
        let gt = stack_field(&samples, |s| s.gt.as_ref())?;
        Ok(Self { input, gt, paths })
    }

    /// Number of samples in the batch
    pub fn len(&self) -> usize {
        self.paths.len()
    }

    pub fn is_empty(&self) -> bool {
        self.paths.is_empty()
    }
}

fn stack_field<F>(samples: &[Sample], field: F) -> Result<Option<Array4<f32>>>
where
    F: Fn(&Sample) -> Option<&Array3<f32>>,
{
    let tensors: Vec<&Array3<f32>> = samples.iter().filter_map(&field).collect();
    if tensors.is_empty() || tensors.len() != samples.len() {
        return Ok(None);
    }
    let views: Vec<_> = tensors.iter().map(|t| t.view()).collect();
    let stacked = stack(Axis(0), &views).map_err(|_| Error::ShapeMismatch {
        expected: tensors.first().map(|t| t.shape().to_vec()).unwrap_or_default(),
        got: tensors.last().map(|t| t.shape().to_vec()).unwrap_or_default(),
    })?;
    Ok(Some(stacked))
}

/// A collection of image samples a loader can draw from.
pub trait ImageDataset: Send + std::fmt::Debug {
    /// Display name used in metric keys and visualization paths
    fn name(&self) -> &str;

    /// Number of samples
    fn len(&self) -> usize;

    fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Fetch one sample. `rng`, when supplied by a training loader
    /// worker, drives per-fetch randomness such as blend jitter; without
    /// it the fetch is deterministic.
    fn fetch(&self, index: usize, rng: Option<&mut StdRng>) -> Result<Sample>;

    /// Regenerate the internal sample index. Datasets with fixed contents
    /// leave this a no-op.
    fn reset(&mut self) {}
}
