//! Structural similarity index

use super::{prepare_pair, to_y_channel};
use crate::error::{Error, Result};
use image::RgbImage;
use ndarray::{Array2, Axis};

const WINDOW: usize = 11;
const SIGMA: f64 = 1.5;

// Stabilizers on the u8 range: (0.01 * 255)^2 and (0.03 * 255)^2
const C1: f64 = 6.5025;
const C2: f64 = 58.5225;

/// Compute SSIM between two images
///
/// Local statistics come from an 11x11 Gaussian window evaluated on fully
/// valid positions only, so each plane loses a 5 pixel rim. Channels are
/// scored independently and averaged; with `test_y_channel` only the luma
/// plane is scored.
pub fn calculate_ssim(
    img: &RgbImage,
    img2: &RgbImage,
    crop_border: usize,
    test_y_channel: bool,
) -> Result<f64> {
    let (a, b) = prepare_pair(img, img2, crop_border)?;

    let (a, b) = if test_y_channel {
        (to_y_channel(a.view()), to_y_channel(b.view()))
    } else {
        (a, b)
    };

    let (h, w, channels) = a.dim();
    if h < WINDOW || w < WINDOW {
        return Err(Error::InvalidArgument(format!(
            "image {h}x{w} is smaller than the {WINDOW}x{WINDOW} ssim window"
        )));
    }

    let window = gaussian_window();
    let mut total = 0.0;
    for c in 0..channels {
        let pa = a.index_axis(Axis(2), c).to_owned();
        let pb = b.index_axis(Axis(2), c).to_owned();
        total += ssim_plane(&pa, &pb, &window);
    }
    Ok(total / channels as f64)
}

/// 11x11 Gaussian window with sigma 1.5, normalized to unit sum
fn gaussian_window() -> Array2<f64> {
    let center = (WINDOW / 2) as f64;
    let mut g1 = [0.0f64; WINDOW];
    let mut sum = 0.0;
    for (i, g) in g1.iter_mut().enumerate() {
        let d = i as f64 - center;
        *g = (-d * d / (2.0 * SIGMA * SIGMA)).exp();
        sum += *g;
    }
    for g in g1.iter_mut() {
        *g /= sum;
    }

    Array2::from_shape_fn((WINDOW, WINDOW), |(i, j)| g1[i] * g1[j])
}

/// Correlate with the window at every fully covered position
fn filter_valid(img: &Array2<f64>, window: &Array2<f64>) -> Array2<f64> {
    let (h, w) = img.dim();
    Array2::from_shape_fn((h - WINDOW + 1, w - WINDOW + 1), |(y, x)| {
        let mut acc = 0.0;
        for dy in 0..WINDOW {
            for dx in 0..WINDOW {
                acc += img[[y + dy, x + dx]] * window[[dy, dx]];
            }
        }
        acc
    })
}

fn ssim_plane(a: &Array2<f64>, b: &Array2<f64>, window: &Array2<f64>) -> f64 {
    let mu1 = filter_valid(a, window);
    let mu2 = filter_valid(b, window);

    let mu1_sq = &mu1 * &mu1;
    let mu2_sq = &mu2 * &mu2;
    let mu1_mu2 = &mu1 * &mu2;

    let sigma1_sq = filter_valid(&(a * a), window) - &mu1_sq;
    let sigma2_sq = filter_valid(&(b * b), window) - &mu2_sq;
    let sigma12 = filter_valid(&(a * b), window) - &mu1_mu2;

    let numer = (mu1_mu2 * 2.0 + C1) * (sigma12 * 2.0 + C2);
    let denom = (mu1_sq + mu2_sq + C1) * (sigma1_sq + sigma2_sq + C2);
    let map = numer / denom;

    map.sum() / map.len() as f64
}
