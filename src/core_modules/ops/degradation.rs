// THEORY:
// Print and scan degradations in the ocrodeg mould. They model what happens to a
// page between printer and scanner, from ink bleeding into hard binarized edges
// to a page that does not lie flat on the glass.
//
// `binarized_blur`, `blotches` and the two print-like noises collapse the page
// to one channel, exactly like a bilevel scan. The print-like noises re-render
// the page: an ink mask is taken from the dark side of the image, speckled,
// softened, and used to mix a noisy ink layer over a noisy paper layer.
//
// `gaussian_warp` and `1d_surface_distort` move content, but only by a few
// pixels of smooth jitter, and are treated as pixel-only: ground truth is not
// transported.

use super::{draw, standard_normal};
use crate::config::OperationParams;
use crate::core_modules::operation::ImageFilter;
use crate::core_modules::raster::RasterImage;
use crate::core_modules::remap::{CoordinateMap, remap_cubic};
use crate::error::Result;
use image::imageops::{self, FilterType};
use image::{GrayImage, ImageBuffer, Luma};
use imageproc::drawing::draw_filled_circle_mut;
use imageproc::filter::gaussian_blur_f32;
use rand::{Rng, RngCore};

type FloatImage = ImageBuffer<Luma<f32>, Vec<f32>>;

/// Radius of a single blotch, in pixels.
const BLOB_SCALE: i32 = 10;
/// Smoothing applied to the per-column noise of the surface distortion.
const SURFACE_SIGMA: f64 = 100.0;

/// Feature sizes (pixels) and weights of the layered paper and ink noise.
const NOISE_SCALES: [(f32, f32); 4] = [(1.0, 1.0), (5.0, 0.3), (10.0, 0.5), (50.0, 0.3)];
const PAPER_RANGE: (f32, f32) = (0.8, 1.0);
const INK_RANGE: (f32, f32) = (0.0, 0.2);

const FIBER_COUNT: usize = 300;
const FIBER_STEPS: usize = 500;
const FIBER_STEP_SIZE: f64 = 0.5;
const FIBER_CURL: f64 = 0.01;
const FIBER_BLUR: f32 = 0.5;
/// How much a fiber darkens the paper at most.
const FIBER_RANGE: (f32, f32) = (0.0, 0.25);

/// Gaussian blur followed by a hard mid-grey threshold.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BinarizedBlur {
    pub sigma: (f64, f64),
}

impl BinarizedBlur {
    pub fn from_params(params: &OperationParams) -> Result<Self> {
        let sigma = params.range_or("min_sigma", "max_sigma", (0.2, 2.0))?;
        if sigma.0 <= 0.0 {
            return Err(params.invalid("min_sigma", "must be positive"));
        }
        Ok(Self { sigma })
    }
}

impl ImageFilter for BinarizedBlur {
    fn filter(&self, image: RasterImage, rng: &mut dyn RngCore) -> Result<RasterImage> {
        let sigma = draw(rng, self.sigma) as f32;
        let blurred = gaussian_blur_f32(&image.to_gray(), sigma);
        Ok(RasterImage::Gray(binarize(&blurred)))
    }
}

fn binarize(gray: &GrayImage) -> GrayImage {
    GrayImage::from_fn(gray.width(), gray.height(), |x, y| {
        if gray.get_pixel(x, y).0[0] >= 128 {
            Luma([255])
        } else {
            Luma([0])
        }
    })
}

/// White specks over ink and black specks over paper.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Blotches {
    /// White blobs per pixel.
    pub fgblobs: (f64, f64),
    /// Black blobs per pixel.
    pub bgblobs: (f64, f64),
}

impl Blotches {
    pub fn from_params(params: &OperationParams) -> Result<Self> {
        let fgblobs = params.range_or("min_fgblobs", "max_fgblobs", (0.0005, 0.005))?;
        let bgblobs = params.range_or("min_bgblobs", "max_bgblobs", (0.0005, 0.005))?;
        if fgblobs.0 < 0.0 || bgblobs.0 < 0.0 {
            return Err(params.invalid("min_fgblobs", "blob densities must be non-negative"));
        }
        Ok(Self { fgblobs, bgblobs })
    }
}

impl ImageFilter for Blotches {
    fn filter(&self, image: RasterImage, rng: &mut dyn RngCore) -> Result<RasterImage> {
        let white = draw(rng, self.fgblobs);
        let black = draw(rng, self.bgblobs);
        let mut gray = image.to_gray();
        scatter_blobs(&mut gray, white, Luma([255]), rng);
        scatter_blobs(&mut gray, black, Luma([0]), rng);
        Ok(RasterImage::Gray(gray))
    }
}

fn scatter_blobs(gray: &mut GrayImage, density: f64, colour: Luma<u8>, rng: &mut dyn RngCore) {
    let (width, height) = gray.dimensions();
    if width == 0 || height == 0 {
        return;
    }
    let count = (density * width as f64 * height as f64) as usize;
    for _ in 0..count {
        let center = (
            rng.random_range(0..width) as i32,
            rng.random_range(0..height) as i32,
        );
        let radius = rng.random_range(1..=BLOB_SCALE);
        draw_filled_circle_mut(gray, center, radius, colour);
    }
}

/// Smooth vertical displacement of every column, as from a page that is not flat.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SurfaceDistort1d {
    pub magnitude: (f64, f64),
}

impl SurfaceDistort1d {
    pub fn from_params(params: &OperationParams) -> Result<Self> {
        Ok(Self {
            magnitude: params.range_or("min_magnitude", "max_magnitude", (20.0, 40.0))?,
        })
    }

    /// One vertical offset per column, smoothed and scaled so the largest is `magnitude`.
    pub fn column_offsets(width: u32, magnitude: f64, rng: &mut dyn RngCore) -> Vec<f64> {
        let raw: Vec<f64> = (0..width).map(|_| standard_normal(rng)).collect();
        let smooth = gaussian_smooth_1d(&raw, SURFACE_SIGMA);
        let peak = smooth.iter().fold(0.0f64, |acc, v| acc.max(v.abs()));
        if peak == 0.0 {
            return smooth;
        }
        smooth.into_iter().map(|v| v * magnitude / peak).collect()
    }
}

impl ImageFilter for SurfaceDistort1d {
    fn filter(&self, image: RasterImage, rng: &mut dyn RngCore) -> Result<RasterImage> {
        let magnitude = draw(rng, self.magnitude);
        let offsets = Self::column_offsets(image.width(), magnitude, rng);
        let mut field = CoordinateMap::identity(image.width(), image.height());
        for y in 0..field.height {
            for (x, offset) in offsets.iter().enumerate() {
                let index = field.index(x as u32, y);
                field.map_y[index] += *offset as f32;
            }
        }
        Ok(remap_cubic(&image, &field))
    }
}

/// Small elastic jitter in both axes from independently smoothed noise fields.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct GaussianWarp {
    pub sigma: (f64, f64),
    pub maxdelta: (f64, f64),
}

impl GaussianWarp {
    pub fn from_params(params: &OperationParams) -> Result<Self> {
        let sigma = params.range_or("min_sigma", "max_sigma", (0.2, 0.5))?;
        if sigma.0 <= 0.0 {
            return Err(params.invalid("min_sigma", "must be positive"));
        }
        let maxdelta = params.range_or("min_delta", "max_delta", (4.0, 6.0))?;
        Ok(Self { sigma, maxdelta })
    }

    /// Uniform noise smoothed with `sigma` and scaled so its largest magnitude is `maxdelta`.
    pub fn displacement(width: u32, height: u32, sigma: f32, maxdelta: f32, rng: &mut dyn RngCore) -> Vec<f32> {
        let noise = FloatImage::from_fn(width, height, |_, _| Luma([rng.random_range(-1.0f32..=1.0)]));
        let smooth = gaussian_blur_f32(&noise, sigma).into_raw();
        let peak = smooth.iter().fold(0.0f32, |acc, v| acc.max(v.abs()));
        if peak == 0.0 {
            return smooth;
        }
        smooth.into_iter().map(|v| v * maxdelta / peak).collect()
    }
}

impl ImageFilter for GaussianWarp {
    fn filter(&self, image: RasterImage, rng: &mut dyn RngCore) -> Result<RasterImage> {
        let sigma = draw(rng, self.sigma) as f32;
        let maxdelta = draw(rng, self.maxdelta) as f32;
        let (width, height) = image.dimensions();
        let dx = Self::displacement(width, height, sigma, maxdelta, rng);
        let dy = Self::displacement(width, height, sigma, maxdelta, rng);
        let mut field = CoordinateMap::identity(width, height);
        for (i, (x, y)) in field.map_x.iter_mut().zip(field.map_y.iter_mut()).enumerate() {
            *x += dx[i];
            *y += dy[i];
        }
        Ok(remap_cubic(&image, &field))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PaperTexture {
    /// Layered blotchy noise.
    Multiscale,
    /// Layered noise crossed by dark curling fibers.
    Fibrous,
}

/// Re-prints the page with noisy ink on noisy paper.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PrintNoise {
    /// Softening of the ink mask.
    pub blur: (f64, f64),
    /// Black blobs per pixel added to the ink mask; three times as many are punched out of it.
    pub blotches: (f64, f64),
    pub paper: PaperTexture,
}

impl PrintNoise {
    /// `multiscale_black_noise`.
    pub fn multiscale_from_params(params: &OperationParams) -> Result<Self> {
        Self::from_params(params, PaperTexture::Multiscale, (6e-6, 2e-5))
    }

    /// `fibrous_noise`.
    pub fn fibrous_from_params(params: &OperationParams) -> Result<Self> {
        Self::from_params(params, PaperTexture::Fibrous, (2e-5, 3e-5))
    }

    fn from_params(params: &OperationParams, paper: PaperTexture, blotches: (f64, f64)) -> Result<Self> {
        let blur = params.range_or("min_blur", "max_blur", (0.5, 0.5))?;
        if blur.0 <= 0.0 {
            return Err(params.invalid("min_blur", "must be positive"));
        }
        let blotches = params.range_or("min_blotches", "max_blotches", blotches)?;
        if blotches.0 < 0.0 {
            return Err(params.invalid("min_blotches", "must be non-negative"));
        }
        Ok(Self { blur, blotches, paper })
    }
}

impl ImageFilter for PrintNoise {
    fn filter(&self, image: RasterImage, rng: &mut dyn RngCore) -> Result<RasterImage> {
        let blur = draw(rng, self.blur) as f32;
        let density = draw(rng, self.blotches);
        let (width, height) = image.dimensions();

        let mut mask = ink_mask(&image.to_gray());
        scatter_blobs(&mut mask, 3.0 * density, Luma([255]), rng);
        scatter_blobs(&mut mask, density, Luma([0]), rng);
        let mask = FloatImage::from_fn(width, height, |x, y| Luma([mask.get_pixel(x, y).0[0] as f32 / 255.0]));
        let selector = gaussian_blur_f32(&mask, blur).into_raw();

        let mut paper = multiscale_noise(width, height, PAPER_RANGE, rng);
        if self.paper == PaperTexture::Fibrous {
            let fibers = fibrous_field(width, height, rng);
            for (p, f) in paper.iter_mut().zip(&fibers) {
                *p -= f;
            }
        }
        let ink = multiscale_noise(width, height, INK_RANGE, rng);

        let printed: Vec<u8> = selector
            .iter()
            .zip(paper.iter().zip(&ink))
            .map(|(s, (p, i))| {
                let s = s.clamp(0.0, 1.0);
                (((1.0 - s) * p + s * i) * 255.0).round().clamp(0.0, 255.0) as u8
            })
            .collect();
        Ok(RasterImage::Gray(GrayImage::from_fn(width, height, |x, y| {
            Luma([printed[(y * width + x) as usize]])
        })))
    }
}

/// Ink at 255, paper at 0. The majority tone is taken to be paper.
fn ink_mask(gray: &GrayImage) -> GrayImage {
    let total: u64 = gray.as_raw().iter().map(|&v| v as u64).sum();
    let count = gray.as_raw().len().max(1) as u64;
    if total / count > 127 {
        let mut inverted = gray.clone();
        imageops::invert(&mut inverted);
        inverted
    } else {
        gray.clone()
    }
}

/// Weighted sum of upsampled uniform noise at several feature sizes, spread over `limits`.
fn multiscale_noise(width: u32, height: u32, limits: (f32, f32), rng: &mut dyn RngCore) -> Vec<f32> {
    let mut total = vec![0.0f32; width as usize * height as usize];
    if total.is_empty() {
        return total;
    }
    for (scale, weight) in NOISE_SCALES {
        let grid_w = (width as f32 / scale).ceil() as u32 + 1;
        let grid_h = (height as f32 / scale).ceil() as u32 + 1;
        let grid = FloatImage::from_fn(grid_w, grid_h, |_, _| Luma([rng.random::<f32>()]));
        let layer = imageops::resize(&grid, width, height, FilterType::Triangle);
        for (t, v) in total.iter_mut().zip(layer.as_raw()) {
            *t += weight * v;
        }
    }
    spread(&mut total, limits);
    total
}

/// Random-walk fibers, softened and spread over `FIBER_RANGE`.
fn fibrous_field(width: u32, height: u32, rng: &mut dyn RngCore) -> Vec<f32> {
    let mut canvas = FloatImage::new(width, height);
    if width == 0 || height == 0 {
        return canvas.into_raw();
    }
    for _ in 0..FIBER_COUNT {
        let mut x = rng.random_range(0.0..width as f64);
        let mut y = rng.random_range(0.0..height as f64);
        let mut angle = rng.random_range(0.0..std::f64::consts::TAU);
        for _ in 0..FIBER_STEPS {
            x += FIBER_STEP_SIZE * angle.cos();
            y += FIBER_STEP_SIZE * angle.sin();
            angle += FIBER_CURL * standard_normal(rng);
            if x >= 0.0 && y >= 0.0 && x < width as f64 && y < height as f64 {
                canvas.put_pixel(x as u32, y as u32, Luma([1.0]));
            }
        }
    }
    let mut field = gaussian_blur_f32(&canvas, FIBER_BLUR).into_raw();
    spread(&mut field, FIBER_RANGE);
    field
}

/// Maps the minimum of `values` to `limits.0` and the maximum to `limits.1`.
fn spread(values: &mut [f32], (low, high): (f32, f32)) {
    let (min, max) = values
        .iter()
        .fold((f32::INFINITY, f32::NEG_INFINITY), |(lo, hi), &v| (lo.min(v), hi.max(v)));
    let span = max - min;
    for v in values.iter_mut() {
        *v = if span > 0.0 {
            low + (*v - min) / span * (high - low)
        } else {
            low
        };
    }
}

/// Gaussian smoothing with edge samples repeated past both ends.
fn gaussian_smooth_1d(values: &[f64], sigma: f64) -> Vec<f64> {
    if values.is_empty() {
        return Vec::new();
    }
    let radius = (4.0 * sigma).ceil() as i64;
    let kernel: Vec<f64> = (-radius..=radius)
        .map(|i| (-(i * i) as f64 / (2.0 * sigma * sigma)).exp())
        .collect();
    let norm: f64 = kernel.iter().sum();
    let last = values.len() as i64 - 1;
    (0..values.len() as i64)
        .map(|center| {
            kernel
                .iter()
                .enumerate()
                .map(|(k, weight)| {
                    let index = (center + k as i64 - radius).clamp(0, last) as usize;
                    weight * values[index]
                })
                .sum::<f64>()
                / norm
        })
        .collect()
}
