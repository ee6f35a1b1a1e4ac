//! Paired folder dataset: blended inputs with clean ground truth

use crate::config::DatasetOptions;
use crate::data::dataset::{ImageDataset, Sample};
use crate::error::{Error, Result};
use crate::imgproc;
use rand::rngs::StdRng;
use std::fs;
use std::path::{Path, PathBuf};

const IMAGE_EXTENSIONS: &[&str] = &["png", "jpg", "jpeg", "bmp"];

/// Input/ground-truth image pairs read from two directories.
///
/// Files are paired by sorted filename position, so both directories must
/// contain the same number of images in the same order.
#[derive(Debug)]
pub struct PairedImageDataset {
    name: String,
    inputs: Vec<PathBuf>,
    gts: Vec<PathBuf>,
}

fn scan_images(dir: &Path) -> Result<Vec<PathBuf>> {
    let mut files = Vec::new();
    for entry in fs::read_dir(dir)? {
        let path = entry?.path();
        let is_image = path
            .extension()
            .and_then(|e| e.to_str())
            .map(|e| IMAGE_EXTENSIONS.contains(&e.to_lowercase().as_str()))
            .unwrap_or(false);
        if is_image {
            files.push(path);
        }
    }
    files.sort();
    Ok(files)
}

impl PairedImageDataset {
    pub fn new(opts: DatasetOptions) -> Result<Self> {
        let input_root = opts.dataroot_input.as_ref().ok_or_else(|| {
            Error::ConfigError(format!("dataset '{}' has no dataroot_input", opts.name))
        })?;
        let gt_root = opts.dataroot_gt.as_ref().ok_or_else(|| {
            Error::ConfigError(format!("dataset '{}' has no dataroot_gt", opts.name))
        })?;

        let inputs = scan_images(input_root)?;
        let gts = scan_images(gt_root)?;
        if inputs.len() != gts.len() {
            return Err(Error::ConfigError(format!(
                "dataset '{}': {} input images but {} ground-truth images",
                opts.name,
                inputs.len(),
                gts.len()
            )));
        }
        Ok(Self {
            name: opts.name,
            inputs,
            gts,
        })
    }
}

impl ImageDataset for PairedImageDataset {
    fn name(&self) -> &str {
        &self.name
    }

    fn len(&self) -> usize {
        self.inputs.len()
    }

    fn fetch(&self, index: usize, _rng: Option<&mut StdRng>) -> Result<Sample> {
        let input_path = &self.inputs[index];
        let input = imgproc::img2tensor(&image::open(input_path)?.to_rgb8());
        let gt = imgproc::img2tensor(&image::open(&self.gts[index])?.to_rgb8());
        Ok(Sample {
            input: Some(input),
            gt: Some(gt),
            input_path: Some(input_path.clone()),
        })
    }
}
