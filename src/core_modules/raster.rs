// THEORY:
// `RasterImage` is the pixel grid that flows through the pipeline. Every
// operation consumes one and returns a fresh one; nothing is mutated in place
// across operation boundaries, so an operation that bails out part way never
// leaves a half-written image behind.
//
// Only two layouts exist: a single-channel grid (what print/scan degradations
// produce) and a 3-channel RGB grid (what documents are rendered as). Alpha is
// dropped at load time, matching what the rest of the engine expects.

use image::{DynamicImage, GrayImage, RgbImage};

/// A 2D pixel grid, either single-channel or RGB.
#[derive(Debug, Clone, PartialEq)]
pub enum RasterImage {
    Gray(GrayImage),
    Rgb(RgbImage),
}

impl RasterImage {
    pub fn width(&self) -> u32 {
        match self {
            RasterImage::Gray(img) => img.width(),
            RasterImage::Rgb(img) => img.width(),
        }
    }

    pub fn height(&self) -> u32 {
        match self {
            RasterImage::Gray(img) => img.height(),
            RasterImage::Rgb(img) => img.height(),
        }
    }

    /// `(width, height)`
    pub fn dimensions(&self) -> (u32, u32) {
        (self.width(), self.height())
    }

    pub fn channels(&self) -> u8 {
        match self {
            RasterImage::Gray(_) => 1,
            RasterImage::Rgb(_) => 3,
        }
    }

    /// Raw interleaved bytes, row-major.
    pub fn as_bytes(&self) -> &[u8] {
        match self {
            RasterImage::Gray(img) => img.as_raw(),
            RasterImage::Rgb(img) => img.as_raw(),
        }
    }

    /// Luminance view of the image; a clone for single-channel input.
    pub fn to_gray(&self) -> GrayImage {
        match self {
            RasterImage::Gray(img) => img.clone(),
            RasterImage::Rgb(img) => DynamicImage::ImageRgb8(img.clone()).to_luma8(),
        }
    }

    /// RGB view of the image; grey values are replicated across channels.
    pub fn to_rgb(&self) -> RgbImage {
        match self {
            RasterImage::Gray(img) => DynamicImage::ImageLuma8(img.clone()).to_rgb8(),
            RasterImage::Rgb(img) => img.clone(),
        }
    }

    pub fn into_dynamic(self) -> DynamicImage {
        match self {
            RasterImage::Gray(img) => DynamicImage::ImageLuma8(img),
            RasterImage::Rgb(img) => DynamicImage::ImageRgb8(img),
        }
    }

    /// Crops the rectangle `(x, y, width, height)`; the rectangle must lie inside the image.
    pub fn crop(&self, x: u32, y: u32, width: u32, height: u32) -> RasterImage {
        match self {
            RasterImage::Gray(img) => {
                RasterImage::Gray(image::imageops::crop_imm(img, x, y, width, height).to_image())
            }
            RasterImage::Rgb(img) => {
                RasterImage::Rgb(image::imageops::crop_imm(img, x, y, width, height).to_image())
            }
        }
    }
}

impl From<DynamicImage> for RasterImage {
    fn from(image: DynamicImage) -> Self {
        match image {
            DynamicImage::ImageLuma8(img) => RasterImage::Gray(img),
            DynamicImage::ImageLumaA8(_) | DynamicImage::ImageLuma16(_) | DynamicImage::ImageLumaA16(_) => {
                RasterImage::Gray(image.to_luma8())
            }
            DynamicImage::ImageRgb8(img) => RasterImage::Rgb(img),
            other => RasterImage::Rgb(other.to_rgb8()),
        }
    }
}

impl From<GrayImage> for RasterImage {
    fn from(image: GrayImage) -> Self {
        RasterImage::Gray(image)
    }
}

impl From<RgbImage> for RasterImage {
    fn from(image: RgbImage) -> Self {
        RasterImage::Rgb(image)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::{Luma, Rgb, Rgba, RgbaImage};

    #[test]
    fn rgba_input_drops_alpha() {
        let rgba = RgbaImage::from_pixel(4, 3, Rgba([10, 20, 30, 0]));
        let raster = RasterImage::from(DynamicImage::ImageRgba8(rgba));
        assert_eq!(raster.channels(), 3);
        assert_eq!(raster.dimensions(), (4, 3));
        assert_eq!(raster.to_rgb().get_pixel(0, 0), &Rgb([10, 20, 30]));
    }

    #[test]
    fn gray_input_stays_single_channel() {
        let gray = GrayImage::from_pixel(5, 2, Luma([77]));
        let raster = RasterImage::from(DynamicImage::ImageLuma8(gray));
        assert_eq!(raster.channels(), 1);
        assert_eq!(raster.as_bytes().len(), 10);
    }

    #[test]
    fn crop_keeps_layout() {
        let mut rgb = RgbImage::new(6, 6);
        rgb.put_pixel(3, 4, Rgb([1, 2, 3]));
        let cropped = RasterImage::Rgb(rgb).crop(2, 2, 3, 3);
        assert_eq!(cropped.dimensions(), (3, 3));
        assert_eq!(cropped.to_rgb().get_pixel(1, 2), &Rgb([1, 2, 3]));
    }
}
