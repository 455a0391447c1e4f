// Box-aware geometry. Resizing is axis-aligned, so boxes survive it exactly and
// the cheaper box representation is all this kernel asks for.

use super::draw;
use crate::config::OperationParams;
use crate::core_modules::geometry::BoxCoco;
use crate::core_modules::operation::BoxTransform;
use crate::core_modules::raster::RasterImage;
use crate::error::Result;
use image::imageops::{self, FilterType};
use rand::RngCore;

/// Uniform resize by a random factor.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Rescale {
    pub scale: (f64, f64),
}

impl Rescale {
    pub fn from_params(params: &OperationParams) -> Result<Self> {
        let scale = params.range_or("min_scale", "max_scale", (0.75, 1.25))?;
        if scale.0 <= 0.0 {
            return Err(params.invalid("min_scale", "must be positive"));
        }
        Ok(Self { scale })
    }
}

impl BoxTransform for Rescale {
    fn transform(
        &self,
        image: RasterImage,
        boxes: Vec<BoxCoco>,
        rng: &mut dyn RngCore,
    ) -> Result<(RasterImage, Vec<BoxCoco>)> {
        let factor = draw(rng, self.scale);
        let (width, height) = image.dimensions();
        let new_width = ((width as f64 * factor).round() as u32).max(1);
        let new_height = ((height as f64 * factor).round() as u32).max(1);
        let resized = match &image {
            RasterImage::Gray(img) => {
                RasterImage::Gray(imageops::resize(img, new_width, new_height, FilterType::Triangle))
            }
            RasterImage::Rgb(img) => {
                RasterImage::Rgb(imageops::resize(img, new_width, new_height, FilterType::Triangle))
            }
        };

        let sx = new_width as f64 / width.max(1) as f64;
        let sy = new_height as f64 / height.max(1) as f64;
        let boxes = boxes.into_iter().map(|b| b.scale(sx, sy)).collect();
        Ok((resized, boxes))
    }
}
