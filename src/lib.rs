// THEORY:
// This file is the library entry point for `docsim_augment`, the augmentation
// engine that turns clean synthetic documents into realistic training data.
//
// The public surface is small. Build an `AugmentationPipeline` from a
// `PipelineConfig` and an `OperationRegistry`, then feed it one
// `(RasterImage, GroundTruthSet)` pair at a time, or hand a whole folder to the
// `ParallelAugmentor`. Everything under `core_modules` is the machinery that
// keeps ground-truth polygons consistent with the pixels through every transform.

pub mod config;
pub mod core_modules;
pub mod error;
pub mod parallel_pipeline;
pub mod pipeline;

pub use config::{OperationParams, PipelineConfig};
pub use core_modules::ground_truth::{GroundTruthElement, GroundTruthSet, Point};
pub use core_modules::raster::RasterImage;
pub use core_modules::registry::OperationRegistry;
pub use error::{AugmentError, Result};
pub use parallel_pipeline::{BatchSummary, ParallelAugmentor};
pub use pipeline::AugmentationPipeline;
