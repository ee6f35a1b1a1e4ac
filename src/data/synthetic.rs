//! Synthetic blend dataset: procedural transmission/reflection pairs
//!
//! Each sample blends two procedural patterns as `input = T + alpha * R`
//! with the transmission pattern as ground truth. `reset()` draws a new
//! pairing table so epochs see fresh combinations.

use crate::config::DatasetOptions;
use crate::data::dataset::{ImageDataset, Sample};
use crate::error::Result;
use ndarray::Array3;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

/// One pairing: pattern seeds and the blend weight
#[derive(Debug, Clone, Copy)]
struct BlendRecipe {
    transmission_seed: u64,
    reflection_seed: u64,
    alpha: f32,
}

#[derive(Debug)]
pub struct SyntheticBlendDataset {
    name: String,
    num_samples: usize,
    patch_size: usize,
    rng: StdRng,
    pairing: Vec<BlendRecipe>,
}

/// Smooth procedural RGB pattern, values in `[0, 1]`
fn pattern(seed: u64, size: usize) -> Array3<f32> {
    let mut rng = StdRng::seed_from_u64(seed);
    let base: [f32; 3] = [
        rng.gen_range(0.2..0.8),
        rng.gen_range(0.2..0.8),
        rng.gen_range(0.2..0.8),
    ];
    let fx: f32 = rng.gen_range(0.5..3.0);
    let fy: f32 = rng.gen_range(0.5..3.0);
    let phase: f32 = rng.gen_range(0.0..std::f32::consts::TAU);

    let scale = std::f32::consts::TAU / size as f32;
    Array3::from_shape_fn((3, size, size), |(c, y, x)| {
        let wave = (fx * x as f32 * scale + phase).sin() * (fy * y as f32 * scale).cos();
        (base[c] + 0.25 * wave).clamp(0.0, 1.0)
    })
}

impl SyntheticBlendDataset {
    pub fn new(opts: DatasetOptions) -> Self {
        let seed = opts
            .extra
            .get("seed")
            .and_then(serde_json::Value::as_u64)
            .unwrap_or(0);
        let mut dataset = Self {
            name: opts.name,
            num_samples: opts.num_samples,
            patch_size: opts.patch_size,
            rng: StdRng::seed_from_u64(seed),
            pairing: Vec::new(),
        };
        dataset.regenerate();
        dataset
    }

    fn regenerate(&mut self) {
        self.pairing = (0..self.num_samples)
            .map(|_| BlendRecipe {
                transmission_seed: self.rng.gen(),
                reflection_seed: self.rng.gen(),
                alpha: self.rng.gen_range(0.3..0.7),
            })
            .collect();
    }
}

impl ImageDataset for SyntheticBlendDataset {
    fn name(&self) -> &str {
        &self.name
    }

    fn len(&self) -> usize {
        self.num_samples
    }

    fn fetch(&self, index: usize, rng: Option<&mut StdRng>) -> Result<Sample> {
        let recipe = self.pairing[index];
        let transmission = pattern(recipe.transmission_seed, self.patch_size);
        let reflection = pattern(recipe.reflection_seed, self.patch_size);

        // worker rng jitters the blend weight; deterministic otherwise
        let alpha = match rng {
            Some(r) => (recipe.alpha + r.gen_range(-0.05..0.05)).clamp(0.0, 1.0),
            None => recipe.alpha,
        };

        let mut input = transmission.clone();
        input.zip_mut_with(&reflection, |t, &r| *t = (*t + alpha * r).min(1.0));

        Ok(Sample {
            input: Some(input),
            gt: Some(transmission),
            input_path: None,
        })
    }

    fn reset(&mut self) {
        self.regenerate();
    }
}
