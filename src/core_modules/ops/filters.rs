// THEORY:
// Pixel filters in the albumentations / imgaug mould. None of them moves
// content, so all of them are `Kernel::Image` and never see ground truth.
// Each keeps the incoming layout: a single-channel page stays single-channel.

use super::{blur_limit, draw, draw_odd_kernel, map_channels, standard_normal};
use crate::config::OperationParams;
use crate::core_modules::operation::ImageFilter;
use crate::core_modules::raster::RasterImage;
use crate::error::Result;
use image::codecs::jpeg::JpegEncoder;
use image::{GrayImage, ImageFormat};
use imageproc::filter::{box_filter, median_filter};
use imageproc::noise::gaussian_noise;
use rand::RngCore;

/// JPEG re-encode at a random quality.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ImageCompression {
    pub quality: (f64, f64),
}

impl ImageCompression {
    pub fn from_params(params: &OperationParams) -> Result<Self> {
        let quality = params.range_or("quality_lower", "quality_upper", (90.0, 100.0))?;
        if quality.0 < 1.0 || quality.1 > 100.0 {
            return Err(params.invalid("quality_lower", "quality must lie in [1, 100]"));
        }
        Ok(Self { quality })
    }
}

impl ImageFilter for ImageCompression {
    fn filter(&self, image: RasterImage, rng: &mut dyn RngCore) -> Result<RasterImage> {
        let quality = draw(rng, self.quality).round() as u8;
        let gray = matches!(image, RasterImage::Gray(_));
        let mut encoded = Vec::new();
        image
            .into_dynamic()
            .write_with_encoder(JpegEncoder::new_with_quality(&mut encoded, quality))?;
        let decoded = image::load_from_memory_with_format(&encoded, ImageFormat::Jpeg)?;
        Ok(if gray {
            RasterImage::Gray(decoded.to_luma8())
        } else {
            RasterImage::Rgb(decoded.to_rgb8())
        })
    }
}

/// Keeps the top `num_bits` bits of every channel.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Posterize {
    pub num_bits: u32,
}

impl Posterize {
    pub fn from_params(params: &OperationParams) -> Result<Self> {
        let num_bits = params.u32_or("num_bits", 4)?;
        if num_bits > 8 {
            return Err(params.invalid("num_bits", "must be at most 8"));
        }
        Ok(Self { num_bits })
    }

    fn mask(&self) -> u8 {
        (0xFFu16 << (8 - self.num_bits)) as u8
    }
}

impl ImageFilter for Posterize {
    fn filter(&self, mut image: RasterImage, _rng: &mut dyn RngCore) -> Result<RasterImage> {
        let mask = self.mask();
        match &mut image {
            RasterImage::Gray(img) => img.iter_mut().for_each(|v| *v &= mask),
            RasterImage::Rgb(img) => img.iter_mut().for_each(|v| *v &= mask),
        }
        Ok(image)
    }
}

/// Box blur with a random odd kernel.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Blur {
    pub blur_limit: u32,
}

impl Blur {
    pub fn from_params(params: &OperationParams) -> Result<Self> {
        Ok(Self {
            blur_limit: blur_limit(params)?,
        })
    }
}

impl ImageFilter for Blur {
    fn filter(&self, image: RasterImage, rng: &mut dyn RngCore) -> Result<RasterImage> {
        let radius = draw_odd_kernel(rng, self.blur_limit) / 2;
        Ok(map_channels(image, |plane| box_filter(plane, radius, radius)))
    }
}

/// Median filter with a random odd kernel.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct MedianBlur {
    pub blur_limit: u32,
}

impl MedianBlur {
    pub fn from_params(params: &OperationParams) -> Result<Self> {
        Ok(Self {
            blur_limit: blur_limit(params)?,
        })
    }
}

impl ImageFilter for MedianBlur {
    fn filter(&self, image: RasterImage, rng: &mut dyn RngCore) -> Result<RasterImage> {
        let radius = draw_odd_kernel(rng, self.blur_limit) / 2;
        Ok(map_channels(image, |plane| median_filter(plane, radius, radius)))
    }
}

/// Camera sensor noise: per-channel colour jitter plus luminance noise scaled
/// by the page's own luminance spread.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct IsoNoise {
    pub color_shift: (f64, f64),
    pub intensity: (f64, f64),
}

impl IsoNoise {
    pub fn from_params(params: &OperationParams) -> Result<Self> {
        Ok(Self {
            color_shift: params.range_or("min_color_shift", "max_color_shift", (0.01, 0.05))?,
            intensity: params.range_or("min_intensity", "max_intensity", (0.1, 0.5))?,
        })
    }
}

impl ImageFilter for IsoNoise {
    fn filter(&self, image: RasterImage, rng: &mut dyn RngCore) -> Result<RasterImage> {
        let color_shift = draw(rng, self.color_shift);
        let intensity = draw(rng, self.intensity);

        let gray = image.to_gray();
        let luminance_std = std_dev(&gray);
        let luminance: Vec<f64> = (0..gray.len())
            .map(|_| standard_normal(rng) * luminance_std * intensity)
            .collect();

        let mut out = match image {
            RasterImage::Rgb(img) => {
                RasterImage::Rgb(gaussian_noise(&img, 0.0, color_shift * 255.0, rng.next_u64()))
            }
            gray_image => gray_image,
        };
        let channels = out.channels() as usize;
        let bytes = match &mut out {
            RasterImage::Gray(img) => &mut **img,
            RasterImage::Rgb(img) => &mut **img,
        };
        for (chunk, noise) in bytes.chunks_mut(channels).zip(&luminance) {
            for value in chunk {
                *value = (*value as f64 + noise).round().clamp(0.0, 255.0) as u8;
            }
        }
        Ok(out)
    }
}

fn std_dev(gray: &GrayImage) -> f64 {
    let n = gray.len().max(1) as f64;
    let mean = gray.iter().map(|&v| v as f64).sum::<f64>() / n;
    (gray.iter().map(|&v| (v as f64 - mean).powi(2)).sum::<f64>() / n).sqrt()
}

/// Additive gaussian noise. The per-image upper scale is drawn first, then the
/// standard deviation from `[0, upper]`, both as fractions of 255.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct GaussianNoise {
    pub scale: (f64, f64),
}

impl GaussianNoise {
    pub fn from_params(params: &OperationParams) -> Result<Self> {
        let scale = params.range_or("min_scale", "max_scale", (0.0, 0.1))?;
        if scale.0 < 0.0 {
            return Err(params.invalid("min_scale", "must be non-negative"));
        }
        Ok(Self { scale })
    }
}

impl ImageFilter for GaussianNoise {
    fn filter(&self, image: RasterImage, rng: &mut dyn RngCore) -> Result<RasterImage> {
        let upper = draw(rng, self.scale);
        let stddev = draw(rng, (0.0, upper)) * 255.0;
        let seed = rng.next_u64();
        Ok(match image {
            RasterImage::Gray(img) => RasterImage::Gray(gaussian_noise(&img, 0.0, stddev, seed)),
            RasterImage::Rgb(img) => RasterImage::Rgb(gaussian_noise(&img, 0.0, stddev, seed)),
        })
    }
}
