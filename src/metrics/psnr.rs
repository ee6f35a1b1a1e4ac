//! Peak signal-to-noise ratio

use super::{prepare_pair, to_y_channel};
use crate::error::Result;
use image::RgbImage;

/// Compute PSNR between two images in dB
///
/// Values are compared on the u8 range with a fixed peak of 255, so
/// identical images score infinity. With `test_y_channel` the comparison
/// runs on the luma plane only.
pub fn calculate_psnr(
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

    let mut sum = 0.0f64;
    for (&x, &y) in a.iter().zip(b.iter()) {
        let d = x - y;
        sum += d * d;
    }
    let mse = sum / a.len() as f64;

    if mse == 0.0 {
        return Ok(f64::INFINITY);
    }
    Ok(10.0 * (255.0 * 255.0 / mse).log10())
}
