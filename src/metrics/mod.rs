//! Image quality metrics
//!
//! Metrics compare a restored image against its ground truth on the u8
//! value range. Both support trimming a border before comparison and
//! evaluating on the BT.601 luma plane instead of RGB.

mod psnr;
mod ssim;

pub use psnr::calculate_psnr;
pub use ssim::calculate_ssim;

use crate::config::MetricOptions;
use crate::error::{Error, Result};
use image::RgbImage;
use ndarray::{Array3, ArrayView3};

/// Supported metric implementations
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MetricKind {
    Psnr,
    Ssim,
}

impl MetricKind {
    /// Resolve a metric tag from the options file
    pub fn from_tag(tag: &str) -> Result<Self> {
        match tag.to_lowercase().as_str() {
            "psnr" => Ok(MetricKind::Psnr),
            "ssim" => Ok(MetricKind::Ssim),
            _ => Err(Error::UnknownMetric(tag.to_string())),
        }
    }
}

/// Compute the metric named by an options section on an image pair
pub fn calculate_metric(img: &RgbImage, img2: &RgbImage, opts: &MetricOptions) -> Result<f64> {
    match MetricKind::from_tag(&opts.metric_type)? {
        MetricKind::Psnr => calculate_psnr(img, img2, opts.crop_border, opts.test_y_channel),
        MetricKind::Ssim => calculate_ssim(img, img2, opts.crop_border, opts.test_y_channel),
    }
}

/// Convert an RGB image into an (H, W, 3) array of u8-range floats
pub(crate) fn image_to_array(img: &RgbImage) -> Array3<f64> {
    let (w, h) = img.dimensions();
    Array3::from_shape_fn((h as usize, w as usize, 3), |(y, x, c)| {
        f64::from(img.get_pixel(x as u32, y as u32)[c])
    })
}

/// Check the pair for equal dimensions and return them as arrays with the
/// border trimmed
pub(crate) fn prepare_pair(
    img: &RgbImage,
    img2: &RgbImage,
    crop_border: usize,
) -> Result<(Array3<f64>, Array3<f64>)> {
    if img.dimensions() != img2.dimensions() {
        let (w, h) = img2.dimensions();
        return Err(Error::ShapeMismatch {
            expected: vec![img.height() as usize, img.width() as usize],
            got: vec![h as usize, w as usize],
        });
    }

    let a = image_to_array(img);
    let b = image_to_array(img2);

    if crop_border == 0 {
        return Ok((a, b));
    }

    let (h, w, _) = a.dim();
    if 2 * crop_border >= h || 2 * crop_border >= w {
        return Err(Error::InvalidArgument(format!(
            "crop_border {crop_border} leaves no pixels in a {h}x{w} image"
        )));
    }

    let sliced = |arr: &Array3<f64>| {
        arr.slice(ndarray::s![
            crop_border..h - crop_border,
            crop_border..w - crop_border,
            ..
        ])
        .to_owned()
    };
    Ok((sliced(&a), sliced(&b)))
}

/// Collapse an (H, W, 3) RGB array to its (H, W, 1) BT.601 luma plane
///
/// Uses the studio-swing transform, mapping full-range RGB onto Y in
/// [16, 235].
pub(crate) fn to_y_channel(arr: ArrayView3<'_, f64>) -> Array3<f64> {
    let (h, w, _) = arr.dim();
    Array3::from_shape_fn((h, w, 1), |(y, x, _)| {
        let r = arr[[y, x, 0]];
        let g = arr[[y, x, 1]];
        let b = arr[[y, x, 2]];
        (65.481 * r + 128.553 * g + 24.966 * b) / 255.0 + 16.0
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn solid(w: u32, h: u32, rgb: [u8; 3]) -> RgbImage {
        RgbImage::from_pixel(w, h, image::Rgb(rgb))
    }

    #[test]
    fn test_metric_kind_tags() {
        assert_eq!(MetricKind::from_tag("psnr").unwrap(), MetricKind::Psnr);
        assert_eq!(MetricKind::from_tag("SSIM").unwrap(), MetricKind::Ssim);
        assert!(matches!(
            MetricKind::from_tag("lpips"),
            Err(Error::UnknownMetric(tag)) if tag == "lpips"
        ));
    }

    #[test]
    fn test_calculate_metric_dispatches() {
        let img = solid(16, 16, [120, 60, 200]);
        let opts: MetricOptions = serde_yaml::from_str("type: psnr").unwrap();
        let v = calculate_metric(&img, &img, &opts).unwrap();
        assert!(v.is_infinite());

        let opts: MetricOptions = serde_yaml::from_str("type: ssim").unwrap();
        let v = calculate_metric(&img, &img, &opts).unwrap();
        assert!((v - 1.0).abs() < 1e-9);
    }

    #[test]
    fn test_prepare_pair_rejects_size_mismatch() {
        let a = solid(8, 8, [0, 0, 0]);
        let b = solid(8, 9, [0, 0, 0]);
        assert!(matches!(
            prepare_pair(&a, &b, 0),
            Err(Error::ShapeMismatch { .. })
        ));
    }

    #[test]
    fn test_prepare_pair_crops_border() {
        let a = solid(10, 6, [50, 50, 50]);
        let (cropped, _) = prepare_pair(&a, &a, 2).unwrap();
        assert_eq!(cropped.dim(), (2, 6, 3));
    }

    #[test]
    fn test_prepare_pair_rejects_overlarge_border() {
        let a = solid(6, 6, [0, 0, 0]);
        assert!(prepare_pair(&a, &a, 3).is_err());
    }

    #[test]
    fn test_y_channel_range_and_gray() {
        // Gray pixels keep r = g = b, so Y = 219 * v / 255 + 16
        let arr = image_to_array(&solid(4, 4, [100, 100, 100]));
        let y = to_y_channel(arr.view());
        assert_eq!(y.dim(), (4, 4, 1));
        let expected = 219.0 * 100.0 / 255.0 + 16.0;
        assert!((y[[0, 0, 0]] - expected).abs() < 1e-6);

        let white = to_y_channel(image_to_array(&solid(1, 1, [255, 255, 255])).view());
        assert!((white[[0, 0, 0]] - 235.0).abs() < 1e-6);
        let black = to_y_channel(image_to_array(&solid(1, 1, [0, 0, 0])).view());
        assert!((black[[0, 0, 0]] - 16.0).abs() < 1e-6);
    }
}
