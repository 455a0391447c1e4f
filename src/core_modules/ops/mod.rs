// THEORY:
// Built-in operation kernels, one file per backend family. Each kernel is a
// plain struct holding its tunables, built once from `OperationParams` and
// shared read-only by every worker afterwards. All randomness is drawn from the
// RNG handed in per call.
//
// The helpers below are the pieces the families share: channel-wise filtering
// for filters that only exist for single-channel buffers, parameter draws, and
// standard normal samples.

pub mod degradation;
pub mod filters;
pub mod rescale;

use crate::config::OperationParams;
use crate::core_modules::raster::RasterImage;
use crate::error::Result;
use image::{GrayImage, Luma, Rgb, RgbImage};
use rand::{Rng, RngCore};

/// Runs `f` over each channel plane independently and reassembles the layout.
pub(crate) fn map_channels(image: RasterImage, f: impl Fn(&GrayImage) -> GrayImage) -> RasterImage {
    match image {
        RasterImage::Gray(img) => RasterImage::Gray(f(&img)),
        RasterImage::Rgb(img) => {
            let planes: Vec<GrayImage> = (0..3).map(|c| f(&channel_plane(&img, c))).collect();
            RasterImage::Rgb(RgbImage::from_fn(img.width(), img.height(), |x, y| {
                Rgb([
                    planes[0].get_pixel(x, y).0[0],
                    planes[1].get_pixel(x, y).0[0],
                    planes[2].get_pixel(x, y).0[0],
                ])
            }))
        }
    }
}

fn channel_plane(img: &RgbImage, channel: usize) -> GrayImage {
    GrayImage::from_fn(img.width(), img.height(), |x, y| Luma([img.get_pixel(x, y).0[channel]]))
}

/// Uniform draw from an inclusive range; a degenerate range returns its bound.
pub(crate) fn draw(rng: &mut dyn RngCore, (low, high): (f64, f64)) -> f64 {
    if low >= high {
        low
    } else {
        rng.random_range(low..=high)
    }
}

/// Odd kernel size drawn from `[3, limit]`.
pub(crate) fn draw_odd_kernel(rng: &mut dyn RngCore, limit: u32) -> u32 {
    let steps = limit.saturating_sub(3) / 2;
    3 + 2 * rng.random_range(0..=steps)
}

/// Reads `blur_limit` and rejects limits that admit no odd kernel of at least 3.
pub(crate) fn blur_limit(params: &OperationParams) -> Result<u32> {
    let limit = params.u32_or("blur_limit", 7)?;
    if limit < 3 {
        return Err(params.invalid("blur_limit", "must be at least 3"));
    }
    Ok(limit)
}

/// Standard normal sample (Box-Muller).
pub(crate) fn standard_normal(rng: &mut dyn RngCore) -> f64 {
    let u1: f64 = 1.0 - rng.random::<f64>();
    let u2: f64 = rng.random();
    (-2.0 * u1.ln()).sqrt() * (2.0 * std::f64::consts::PI * u2).cos()
}
