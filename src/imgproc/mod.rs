//! Tensor/image conversion and image writing
//!
//! Network activations are CHW `f32` in `[0, 1]`; files are 8-bit RGB.
//! Conversion clamps and rounds rather than erroring on out-of-range
//! values so slightly overshooting activations still save cleanly.

use crate::error::{Error, Result};
use image::{Rgb, RgbImage};
use ndarray::{Array3, ArrayView3};
use std::fs;
use std::path::Path;

/// Convert a CHW float tensor in `[0, 1]` to an 8-bit RGB image.
pub fn tensor2img(chw: ArrayView3<'_, f32>) -> Result<RgbImage> {
    let shape = chw.shape();
    if shape[0] != 3 {
        return Err(Error::InvalidArgument(format!(
            "expected 3 channels for image conversion, got {}",
            shape[0]
        )));
    }
    let (h, w) = (shape[1], shape[2]);
    let img = RgbImage::from_fn(w as u32, h as u32, |x, y| {
        let px = |c: usize| {
            let v = chw[[c, y as usize, x as usize]];
            (v.clamp(0.0, 1.0) * 255.0).round() as u8
        };
        Rgb([px(0), px(1), px(2)])
    });
    Ok(img)
}

/// Convert an 8-bit RGB image to a CHW float tensor in `[0, 1]`.
pub fn img2tensor(img: &RgbImage) -> Array3<f32> {
    let (w, h) = (img.width() as usize, img.height() as usize);
    Array3::from_shape_fn((3, h, w), |(c, y, x)| {
        f32::from(img.get_pixel(x as u32, y as u32).0[c]) / 255.0
    })
}

/// Write an image, creating parent directories as needed.
pub fn imwrite(img: &RgbImage, path: &Path) -> Result<()> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)?;
    }
    img.save(path)?;
    Ok(())
}
