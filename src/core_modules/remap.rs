// THEORY:
// Backward-mapping resampler shared by every operation that moves pixels around.
// A `CoordinateMap` stores, for each destination pixel, the source coordinate it
// should be sampled from. `remap_cubic` evaluates the source there with bicubic
// convolution (a = -0.75, the OpenCV kernel) and treats everything outside the
// source as black.
//
// Integer source coordinates reproduce the source exactly, so an identity map is
// a bit-exact copy.

use crate::core_modules::raster::RasterImage;
use image::{ImageBuffer, Pixel};

const CUBIC_A: f32 = -0.75;

/// Per-pixel source coordinates for a `width` x `height` destination.
#[derive(Debug, Clone, PartialEq)]
pub struct CoordinateMap {
    pub width: u32,
    pub height: u32,
    pub map_x: Vec<f32>,
    pub map_y: Vec<f32>,
}

impl CoordinateMap {
    /// Every destination pixel samples its own position.
    pub fn identity(width: u32, height: u32) -> Self {
        let len = width as usize * height as usize;
        let mut map_x = Vec::with_capacity(len);
        let mut map_y = Vec::with_capacity(len);
        for y in 0..height {
            for x in 0..width {
                map_x.push(x as f32);
                map_y.push(y as f32);
            }
        }
        Self {
            width,
            height,
            map_x,
            map_y,
        }
    }

    #[inline]
    pub fn index(&self, x: u32, y: u32) -> usize {
        y as usize * self.width as usize + x as usize
    }

    #[inline]
    pub fn get(&self, x: u32, y: u32) -> (f32, f32) {
        let i = self.index(x, y);
        (self.map_x[i], self.map_y[i])
    }
}

/// Resamples `image` through `map`. The output has the map's dimensions.
pub fn remap_cubic(image: &RasterImage, map: &CoordinateMap) -> RasterImage {
    match image {
        RasterImage::Gray(img) => RasterImage::Gray(remap_buffer(img, map)),
        RasterImage::Rgb(img) => RasterImage::Rgb(remap_buffer(img, map)),
    }
}

fn remap_buffer<P>(src: &ImageBuffer<P, Vec<u8>>, map: &CoordinateMap) -> ImageBuffer<P, Vec<u8>>
where
    P: Pixel<Subpixel = u8>,
{
    let (src_width, src_height) = (src.width() as i64, src.height() as i64);
    let channels = P::CHANNEL_COUNT as usize;
    let raw = src.as_raw();
    let mut out: ImageBuffer<P, Vec<u8>> = ImageBuffer::new(map.width, map.height);

    for y in 0..map.height {
        for x in 0..map.width {
            let (sx, sy) = map.get(x, y);
            let mut acc = [0.0f32; 4];
            if sx.is_finite() && sy.is_finite() {
                let x0 = sx.floor();
                let y0 = sy.floor();
                let wx = cubic_weights(sx - x0);
                let wy = cubic_weights(sy - y0);
                for (j, weight_y) in wy.iter().enumerate() {
                    let yy = y0 as i64 - 1 + j as i64;
                    if yy < 0 || yy >= src_height {
                        continue;
                    }
                    for (i, weight_x) in wx.iter().enumerate() {
                        let xx = x0 as i64 - 1 + i as i64;
                        if xx < 0 || xx >= src_width {
                            continue;
                        }
                        let base = (yy as usize * src_width as usize + xx as usize) * channels;
                        let weight = weight_y * weight_x;
                        for c in 0..channels {
                            acc[c] += weight * raw[base + c] as f32;
                        }
                    }
                }
            }
            let pixel = out.get_pixel_mut(x, y);
            for (value, sample) in pixel.channels_mut().iter_mut().zip(acc) {
                *value = sample.round().clamp(0.0, 255.0) as u8;
            }
        }
    }
    out
}

/// Weights of the four taps at offsets -1, 0, 1, 2 for fractional position `t`.
fn cubic_weights(t: f32) -> [f32; 4] {
    let w0 = ((CUBIC_A * (t + 1.0) - 5.0 * CUBIC_A) * (t + 1.0) + 8.0 * CUBIC_A) * (t + 1.0) - 4.0 * CUBIC_A;
    let w1 = ((CUBIC_A + 2.0) * t - (CUBIC_A + 3.0)) * t * t + 1.0;
    let u = 1.0 - t;
    let w2 = ((CUBIC_A + 2.0) * u - (CUBIC_A + 3.0)) * u * u + 1.0;
    [w0, w1, w2, 1.0 - w0 - w1 - w2]
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::{GrayImage, Luma, Rgb, RgbImage};

    #[test]
    fn identity_map_is_exact() {
        let img = RgbImage::from_fn(7, 5, |x, y| Rgb([(x * 30) as u8, (y * 40) as u8, 99]));
        let raster = RasterImage::Rgb(img);
        let out = remap_cubic(&raster, &CoordinateMap::identity(7, 5));
        assert_eq!(out, raster);
    }

    #[test]
    fn weights_sum_to_one() {
        for t in [0.0, 0.25, 0.5, 0.9] {
            let sum: f32 = cubic_weights(t).iter().sum();
            assert!((sum - 1.0).abs() < 1e-6);
        }
    }

    #[test]
    fn integer_shift_moves_pixels() {
        let img = GrayImage::from_fn(6, 6, |x, _| Luma([(x * 10) as u8]));
        let mut map = CoordinateMap::identity(6, 6);
        for v in map.map_x.iter_mut() {
            *v += 2.0;
        }
        let out = remap_cubic(&RasterImage::Gray(img), &map).to_gray();
        assert_eq!(out.get_pixel(0, 3), &Luma([20]));
        assert_eq!(out.get_pixel(3, 3), &Luma([50]));
        // Samples beyond the right edge fall back to black.
        assert_eq!(out.get_pixel(5, 3), &Luma([0]));
    }

    #[test]
    fn non_finite_coordinates_are_black() {
        let img = GrayImage::from_pixel(3, 3, Luma([200]));
        let mut map = CoordinateMap::identity(3, 3);
        map.map_x[4] = f32::NAN;
        let out = remap_cubic(&RasterImage::Gray(img), &map).to_gray();
        assert_eq!(out.get_pixel(1, 1), &Luma([0]));
        assert_eq!(out.get_pixel(0, 0), &Luma([200]));
    }
}
