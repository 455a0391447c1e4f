// THEORY:
// The `MeshWarpEngine` simulates paper that has been folded and curled: crease
// lines and soft bends drag the page content sideways by an amount that decays
// with the distance from the crease. It is the one transform in the engine that
// is neither affine nor invertible, which makes keeping the ground truth honest
// the hard part.
//
// Algorithm:
// 1.  **Pad** the page with black on every side so content has room to move, and
//     shift every polygon by the same offset.
// 2.  **Displacement field**: start from the identity coordinate grid and, for each
//     deformation round, pick a crease vertex in the central 30–70% of the page,
//     a diagonal-ish direction, a magnitude and a falloff kind ("line" crease or
//     "curve" fold). Every grid coordinate is pushed against the crease direction,
//     weighted by its distance to the crease line.
// 3.  **Forward warp**: resample the padded page through that field (bicubic).
// 4.  **Approximate inverse**: scatter each destination pixel's own position into
//     the cell addressed by its truncated source coordinate. Cells nobody hit
//     inherit the nearest defined cell to their left on the same row. This is a
//     lookup table, not a mathematical inverse: neighbours can overwrite each
//     other and a leading run of empty cells in a row stays empty.
// 5.  **Transport** every polygon point through that table.
// 6.  **De-letterbox**: crop to the bounding rectangle of the largest outer
//     contour of the non-black content and shift points by the crop origin. Curved
//     folds can pull stray slivers of page into the padding; those are ignored.
//     With no foreground at all the padded result is returned as is.
//
// All randomness comes from the caller's RNG, so a fixed seed reproduces the warp
// bit for bit.

use crate::config::OperationParams;
use crate::core_modules::ground_truth::Point;
use crate::core_modules::operation::PolygonTransform;
use crate::core_modules::raster::RasterImage;
use crate::core_modules::remap::{CoordinateMap, remap_cubic};
use crate::error::{AugmentError, Result};
use image::{GrayImage, ImageBuffer, Luma, Pixel};
use imageproc::contours::{BorderType, find_contours};
use rand::{Rng, RngCore};
use std::f64::consts::PI;

/// Central band of each axis the crease vertex is drawn from.
const VERTEX_BAND: (f64, f64) = (0.30, 0.70);
/// Magnitude as a fraction of the mean page side.
const MAGNITUDE_BAND: (f64, f64) = (1.0 / 15.0, 1.0 / 12.0);
/// Falloff exponent for curved folds.
const CURVE_ALPHA: f64 = 1.5;
/// Grey level a pixel must exceed to count as page content when cropping.
const FOREGROUND_THRESHOLD: u8 = 1;

/// Tunables of the creases-and-curls distortion.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct MeshWarpConfig {
    /// Independent creases/folds accumulated into one field.
    pub num_deform_rounds: u32,
    /// Padding on each side is the page dimension divided by this ratio.
    pub img_pad_ratio: u32,
    /// Chance that a round is a curved fold instead of a straight crease.
    pub folding_prob: f64,
}

impl Default for MeshWarpConfig {
    fn default() -> Self {
        Self {
            num_deform_rounds: 2,
            img_pad_ratio: 3,
            folding_prob: 0.3,
        }
    }
}

impl MeshWarpConfig {
    pub fn from_params(params: &OperationParams) -> Result<Self> {
        let defaults = Self::default();
        let config = Self {
            num_deform_rounds: params.u32_or("num_deform_rounds", defaults.num_deform_rounds)?,
            img_pad_ratio: params.u32_or("img_pad_ratio", defaults.img_pad_ratio)?,
            folding_prob: params.f64_or("folding_prob", defaults.folding_prob)?,
        };
        if config.img_pad_ratio == 0 {
            return Err(params.invalid("img_pad_ratio", "must be at least 1"));
        }
        if !(0.0..=1.0).contains(&config.folding_prob) {
            return Err(params.invalid("folding_prob", "must lie in [0, 1]"));
        }
        Ok(config)
    }
}

/// How a deformation's weight decays with distance from the crease line.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Falloff {
    /// Sharp crease: `alpha / (dist + alpha)`.
    Line { alpha: f64 },
    /// Soft fold: `1 - (dist / (rows / 2))^alpha`.
    Curve { alpha: f64 },
}

impl Falloff {
    fn weight(&self, dist: f64, rows: f64) -> f64 {
        match *self {
            Falloff::Line { alpha } => alpha / (dist + alpha),
            Falloff::Curve { alpha } => 1.0 - (dist / (rows / 2.0)).powf(alpha),
        }
    }
}

/// One randomly drawn crease or fold.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Deformation {
    pub vertex: (f64, f64),
    /// Direction in radians.
    pub angle: f64,
    pub magnitude: f64,
    pub falloff: Falloff,
}

impl Deformation {
    /// Draws a deformation for a `cols` x `rows` grid.
    pub fn random(cols: u32, rows: u32, folding_prob: f64, rng: &mut dyn RngCore) -> Self {
        let vertex_x = draw_band(cols, rng);
        let vertex_y = draw_band(rows, rng);
        let angle = draw_angle(rng);
        let avg = (rows as f64 + cols as f64) / 2.0;
        let magnitude = avg * rng.random_range(MAGNITUDE_BAND.0..=MAGNITUDE_BAND.1);
        let falloff = if rng.random::<f64>() >= folding_prob {
            Falloff::Line { alpha: avg / 3.0 }
        } else {
            Falloff::Curve { alpha: CURVE_ALPHA }
        };
        Self {
            vertex: (vertex_x, vertex_y),
            angle,
            magnitude,
            falloff,
        }
    }

    /// Pushes every coordinate of `field` against the deformation direction.
    pub fn accumulate(&self, field: &mut CoordinateMap) {
        let rows = field.height as f64;
        let (sin, cos) = self.angle.sin_cos();
        let (vx, vy) = self.vertex;
        for (x, y) in field.map_x.iter_mut().zip(field.map_y.iter_mut()) {
            let dist = ((*x as f64 - vx) * sin - (*y as f64 - vy) * cos).abs();
            let weight = self.falloff.weight(dist, rows);
            *x -= (self.magnitude * cos * weight) as f32;
            *y -= (self.magnitude * sin * weight) as f32;
        }
    }
}

fn draw_band(extent: u32, rng: &mut dyn RngCore) -> f64 {
    let low = (VERTEX_BAND.0 * extent as f64) as u32;
    let high = (VERTEX_BAND.1 * extent as f64) as u32;
    rng.random_range(low..=high) as f64
}

/// Uniform angle in (0, 2π), redrawn until it sits at least 15° away from both axes.
fn draw_angle(rng: &mut dyn RngCore) -> f64 {
    const BANDS: [(f64, f64); 4] = [(1.0, 5.0), (7.0, 11.0), (13.0, 17.0), (19.0, 23.0)];
    loop {
        let angle = rng.random_range(0.0..2.0 * PI);
        let twelfths = angle / (PI / 12.0);
        if BANDS.iter().any(|&(low, high)| twelfths > low && twelfths < high) {
            return angle;
        }
    }
}

/// Destination position of each source cell, `None` where unknown.
#[derive(Debug, Clone, PartialEq)]
pub struct InverseMap {
    width: u32,
    height: u32,
    cells: Vec<Option<(f32, f32)>>,
}

impl InverseMap {
    /// Scatters the forward field into source space, then fills holes row by row
    /// from the left. Out-of-range source coordinates are dropped.
    pub fn from_forward(field: &CoordinateMap) -> Self {
        let (width, height) = (field.width, field.height);
        let mut cells = vec![None; width as usize * height as usize];
        for y in 0..height {
            for x in 0..width {
                let (sx, sy) = field.get(x, y);
                if sx >= 0.0 && sy >= 0.0 && sx < width as f32 && sy < height as f32 {
                    let index = sy as usize * width as usize + sx as usize;
                    cells[index] = Some((x as f32, y as f32));
                }
            }
        }

        for row in cells.chunks_mut(width.max(1) as usize) {
            let mut last = None;
            for cell in row.iter_mut() {
                if cell.is_some() {
                    last = *cell;
                } else {
                    *cell = last;
                }
            }
        }

        Self { width, height, cells }
    }

    /// Destination of the source cell containing `(x, y)`; coordinates are clamped
    /// into the grid.
    pub fn lookup(&self, x: f64, y: f64) -> Option<(f32, f32)> {
        if self.width == 0 || self.height == 0 {
            return None;
        }
        let col = x.clamp(0.0, (self.width - 1) as f64) as usize;
        let row = y.clamp(0.0, (self.height - 1) as f64) as usize;
        self.cells[row * self.width as usize + col]
    }

    /// Moves a point through the table; points landing on an unknown cell keep
    /// their position.
    pub fn transport(&self, point: Point) -> Point {
        match self.lookup(point.x, point.y) {
            Some((x, y)) => Point::new(x as f64, y as f64),
            None => point,
        }
    }
}

/// Creases-and-curls distortion.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct MeshWarpEngine {
    config: MeshWarpConfig,
}

impl MeshWarpEngine {
    pub fn new(config: MeshWarpConfig) -> Self {
        Self { config }
    }

    pub fn from_params(params: &OperationParams) -> Result<Self> {
        Ok(Self::new(MeshWarpConfig::from_params(params)?))
    }

    pub fn config(&self) -> &MeshWarpConfig {
        &self.config
    }

    /// Warps `image` and carries `polygons` along. See the module notes for the steps.
    pub fn warp(
        &self,
        image: &RasterImage,
        polygons: &[Vec<Point>],
        rng: &mut dyn RngCore,
    ) -> Result<(RasterImage, Vec<Vec<Point>>)> {
        if self.config.img_pad_ratio == 0 {
            return Err(AugmentError::operation("creases_and_curls", "img_pad_ratio must be at least 1"));
        }
        let pad_x = image.width() / self.config.img_pad_ratio;
        let pad_y = image.height() / self.config.img_pad_ratio;
        let padded = pad(image, pad_x, pad_y);
        let padded_polygons: Vec<Vec<Point>> = polygons
            .iter()
            .map(|polygon| {
                polygon
                    .iter()
                    .map(|p| p.offset(pad_x as f64, pad_y as f64))
                    .collect()
            })
            .collect();

        let field = self.displacement_field(padded.width(), padded.height(), rng);
        let warped = remap_cubic(&padded, &field);

        let inverse = InverseMap::from_forward(&field);
        let moved: Vec<Vec<Point>> = padded_polygons
            .into_iter()
            .map(|polygon| polygon.into_iter().map(|p| inverse.transport(p)).collect())
            .collect();

        Ok(crop_black_borders(warped, moved))
    }

    /// Identity grid plus `num_deform_rounds` accumulated deformations.
    pub fn displacement_field(&self, width: u32, height: u32, rng: &mut dyn RngCore) -> CoordinateMap {
        let mut field = CoordinateMap::identity(width, height);
        for _ in 0..self.config.num_deform_rounds {
            let deformation = Deformation::random(width, height, self.config.folding_prob, rng);
            deformation.accumulate(&mut field);
        }
        field
    }
}

impl PolygonTransform for MeshWarpEngine {
    fn transform(
        &self,
        image: RasterImage,
        polygons: Vec<Vec<Point>>,
        rng: &mut dyn RngCore,
    ) -> Result<(RasterImage, Vec<Vec<Point>>)> {
        self.warp(&image, &polygons, rng)
    }
}

/// Black border of `pad_x` columns left and right and `pad_y` rows top and bottom.
fn pad(image: &RasterImage, pad_x: u32, pad_y: u32) -> RasterImage {
    match image {
        RasterImage::Gray(img) => RasterImage::Gray(pad_buffer(img, pad_x, pad_y)),
        RasterImage::Rgb(img) => RasterImage::Rgb(pad_buffer(img, pad_x, pad_y)),
    }
}

fn pad_buffer<P>(img: &ImageBuffer<P, Vec<u8>>, pad_x: u32, pad_y: u32) -> ImageBuffer<P, Vec<u8>>
where
    P: Pixel<Subpixel = u8>,
{
    let mut canvas = ImageBuffer::new(img.width() + 2 * pad_x, img.height() + 2 * pad_y);
    image::imageops::replace(&mut canvas, img, pad_x as i64, pad_y as i64);
    canvas
}

/// Crops to the bounding rectangle of the largest non-black region.
fn crop_black_borders(image: RasterImage, polygons: Vec<Vec<Point>>) -> (RasterImage, Vec<Vec<Point>>) {
    let Some((x, y, width, height)) = foreground_rect(&image.to_gray()) else {
        return (image, polygons);
    };
    let cropped = image.crop(x, y, width, height);
    let shifted = polygons
        .into_iter()
        .map(|polygon| {
            polygon
                .into_iter()
                .map(|p| p.offset(-(x as f64), -(y as f64)))
                .collect()
        })
        .collect();
    (cropped, shifted)
}

/// `(x, y, width, height)` of the largest outer contour, if any pixel is foreground.
fn foreground_rect(gray: &GrayImage) -> Option<(u32, u32, u32, u32)> {
    let mask = GrayImage::from_fn(gray.width(), gray.height(), |x, y| {
        if gray.get_pixel(x, y).0[0] > FOREGROUND_THRESHOLD {
            Luma([255])
        } else {
            Luma([0])
        }
    });
    find_contours::<u32>(&mask)
        .iter()
        .filter(|contour| contour.border_type == BorderType::Outer)
        .filter_map(|contour| bounding_rect(&contour.points))
        .max_by_key(|&(_, _, width, height)| width as u64 * height as u64)
}

fn bounding_rect(points: &[imageproc::point::Point<u32>]) -> Option<(u32, u32, u32, u32)> {
    let min_x = points.iter().map(|p| p.x).min()?;
    let max_x = points.iter().map(|p| p.x).max()?;
    let min_y = points.iter().map(|p| p.y).min()?;
    let max_y = points.iter().map(|p| p.y).max()?;
    Some((min_x, min_y, max_x - min_x + 1, max_y - min_y + 1))
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::{Rgb, RgbImage};
    use rand::SeedableRng;
    use rand::rngs::StdRng;

    fn square() -> Vec<Point> {
        vec![
            Point::new(30.0, 30.0),
            Point::new(70.0, 30.0),
            Point::new(70.0, 70.0),
            Point::new(30.0, 70.0),
        ]
    }

    fn white_page() -> RasterImage {
        RasterImage::Rgb(RgbImage::from_pixel(100, 100, Rgb([255, 255, 255])))
    }

    fn engine(rounds: u32, folding_prob: f64) -> MeshWarpEngine {
        MeshWarpEngine::new(MeshWarpConfig {
            num_deform_rounds: rounds,
            img_pad_ratio: 3,
            folding_prob,
        })
    }

    #[test]
    fn angles_avoid_axis_aligned_directions() {
        let mut rng = StdRng::seed_from_u64(5);
        for _ in 0..500 {
            let angle = draw_angle(&mut rng);
            let twelfths = angle / (PI / 12.0);
            assert!(twelfths > 1.0 && twelfths < 23.0);
            for axis in [0.0, 6.0, 12.0, 18.0, 24.0] {
                assert!((twelfths - axis).abs() > 1.0);
            }
        }
    }

    #[test]
    fn deformation_draws_stay_in_bands() {
        let mut rng = StdRng::seed_from_u64(9);
        for _ in 0..200 {
            let d = Deformation::random(200, 100, 0.0, &mut rng);
            assert!(d.vertex.0 >= 60.0 && d.vertex.0 <= 140.0);
            assert!(d.vertex.1 >= 30.0 && d.vertex.1 <= 70.0);
            assert!(d.magnitude >= 150.0 / 15.0 - 1e-9 && d.magnitude <= 150.0 / 12.0 + 1e-9);
            assert_eq!(d.falloff, Falloff::Line { alpha: 50.0 });
        }
    }

    #[test]
    fn folding_prob_one_always_curves() {
        let mut rng = StdRng::seed_from_u64(9);
        for _ in 0..50 {
            let d = Deformation::random(50, 50, 1.0, &mut rng);
            assert_eq!(d.falloff, Falloff::Curve { alpha: CURVE_ALPHA });
        }
    }

    #[test]
    fn inverse_map_fills_from_the_left() {
        let mut field = CoordinateMap::identity(4, 1);
        // Destination pixels 1 and 2 both sample source column 3; columns 1 and 2 get no hit.
        field.map_x = vec![0.0, 3.0, 3.0, 9.0];
        let inverse = InverseMap::from_forward(&field);
        assert_eq!(inverse.lookup(0.0, 0.0), Some((0.0, 0.0)));
        assert_eq!(inverse.lookup(1.0, 0.0), Some((0.0, 0.0)));
        assert_eq!(inverse.lookup(2.0, 0.0), Some((0.0, 0.0)));
        assert_eq!(inverse.lookup(3.0, 0.0), Some((2.0, 0.0)));
    }

    #[test]
    fn leading_holes_keep_points_in_place() {
        let mut field = CoordinateMap::identity(3, 1);
        field.map_x = vec![2.0, 2.0, -4.0];
        let inverse = InverseMap::from_forward(&field);
        assert_eq!(inverse.lookup(0.0, 0.0), None);
        assert_eq!(inverse.transport(Point::new(0.5, 0.0)), Point::new(0.5, 0.0));
        assert_eq!(inverse.transport(Point::new(2.2, 0.0)), Point::new(1.0, 0.0));
    }

    #[test]
    fn zero_rounds_only_pads_and_crops() {
        let mut rng = StdRng::seed_from_u64(1);
        let (out, polygons) = engine(0, 0.0).warp(&white_page(), &[square()], &mut rng).unwrap();
        assert_eq!(out, white_page());
        assert_eq!(polygons[0], square());
    }

    #[test]
    fn single_crease_scenario_is_bounded_and_reproducible() {
        let page = white_page();
        let run = |seed: u64| {
            let mut rng = StdRng::seed_from_u64(seed);
            engine(1, 0.0).warp(&page, &[square()], &mut rng).unwrap()
        };
        let (out, polygons) = run(42);
        assert!(out.width() <= 166 && out.height() <= 166);
        assert_eq!(out.channels(), 3);
        for p in &polygons[0] {
            assert!(p.x >= 0.0 && p.x <= out.width() as f64, "x out of bounds: {p:?}");
            assert!(p.y >= 0.0 && p.y <= out.height() as f64, "y out of bounds: {p:?}");
        }

        let (again, polygons_again) = run(42);
        assert_eq!(out, again);
        assert_eq!(polygons, polygons_again);
    }

    #[test]
    fn single_channel_pages_stay_single_channel() {
        let page = RasterImage::Gray(GrayImage::from_pixel(60, 40, Luma([230])));
        let mut rng = StdRng::seed_from_u64(3);
        let (out, _) = engine(2, 0.5).warp(&page, &[], &mut rng).unwrap();
        assert_eq!(out.channels(), 1);
    }

    #[test]
    fn all_black_page_skips_the_crop() {
        let page = RasterImage::Gray(GrayImage::new(30, 30));
        let mut rng = StdRng::seed_from_u64(3);
        let (out, polygons) = engine(1, 0.0)
            .warp(&page, &[vec![Point::new(3.0, 3.0)]], &mut rng)
            .unwrap();
        assert_eq!(out.dimensions(), (50, 50));
        assert_eq!(polygons.len(), 1);
    }

    #[test]
    fn zero_pad_ratio_is_rejected() {
        let params = OperationParams::new("creases_and_curls", &serde_json::json!({"img_pad_ratio": 0})).unwrap();
        assert!(MeshWarpConfig::from_params(&params).is_err());
    }
}
