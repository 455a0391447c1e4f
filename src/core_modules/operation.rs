// THEORY:
// An `Operation` is one augmentation with a uniform face, no matter which
// backend family implements it. Underneath sits a `Kernel`, and the kernel's
// variant *is* the capability tag:
//
// - `Kernel::Image`: pixel-only. It never sees ground truth, so ground truth is
//   bit-identical before and after by construction.
// - `Kernel::Boxes`: box-aware. Polygons are converted to COCO boxes by the
//   `geometry_adapter` on the way in and rebuilt on the way out.
// - `Kernel::Polygons`: polygon-aware. Receives and returns every polygon.
//
// `attempt` is the gating logic every group runs per operation: probability
// draw, budget, mutual exclusion. `apply` is the unconditional transform.

use crate::core_modules::geometry::{BoxCoco, geometry_adapter};
use crate::core_modules::ground_truth::{GroundTruthSet, Point};
use crate::core_modules::raster::RasterImage;
use crate::core_modules::state::{AugmentationPolicy, GroupId, PipelineState};
use crate::error::Result;
use rand::{Rng, RngCore};
use std::collections::BTreeSet;
use std::fmt;
use tracing::debug;

/// What kind of ground-truth geometry an operation needs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Capability {
    ImageOnly,
    ImageAndBoxes,
    ImageAndPolygons,
}

/// Static description of a configured operation. Immutable once the pipeline is built.
#[derive(Debug, Clone, PartialEq)]
pub struct OperationDescriptor {
    pub name: String,
    /// Chance in `[0, 1]` that the operation fires when attempted.
    pub probability: f64,
    pub exclusion_group_ids: BTreeSet<GroupId>,
    pub capability: Capability,
}

/// A transform that only touches pixels.
pub trait ImageFilter: Send + Sync {
    fn filter(&self, image: RasterImage, rng: &mut dyn RngCore) -> Result<RasterImage>;
}

/// A transform that moves axis-aligned boxes along with the pixels.
pub trait BoxTransform: Send + Sync {
    fn transform(
        &self,
        image: RasterImage,
        boxes: Vec<BoxCoco>,
        rng: &mut dyn RngCore,
    ) -> Result<(RasterImage, Vec<BoxCoco>)>;
}

/// A transform that moves arbitrary polygons along with the pixels.
pub trait PolygonTransform: Send + Sync {
    fn transform(
        &self,
        image: RasterImage,
        polygons: Vec<Vec<Point>>,
        rng: &mut dyn RngCore,
    ) -> Result<(RasterImage, Vec<Vec<Point>>)>;
}

/// The implementation behind an operation, tagged by capability.
pub enum Kernel {
    Image(Box<dyn ImageFilter>),
    Boxes(Box<dyn BoxTransform>),
    Polygons(Box<dyn PolygonTransform>),
}

impl Kernel {
    pub fn capability(&self) -> Capability {
        match self {
            Kernel::Image(_) => Capability::ImageOnly,
            Kernel::Boxes(_) => Capability::ImageAndBoxes,
            Kernel::Polygons(_) => Capability::ImageAndPolygons,
        }
    }
}

/// A configured, ready-to-run augmentation.
pub struct Operation {
    descriptor: OperationDescriptor,
    kernel: Kernel,
}

impl fmt::Debug for Operation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Operation")
            .field("descriptor", &self.descriptor)
            .finish_non_exhaustive()
    }
}

impl Operation {
    pub fn new(
        name: impl Into<String>,
        probability: f64,
        exclusion_group_ids: BTreeSet<GroupId>,
        kernel: Kernel,
    ) -> Self {
        let descriptor = OperationDescriptor {
            name: name.into(),
            probability,
            exclusion_group_ids,
            capability: kernel.capability(),
        };
        Self { descriptor, kernel }
    }

    pub fn name(&self) -> &str {
        &self.descriptor.name
    }

    pub fn probability(&self) -> f64 {
        self.descriptor.probability
    }

    pub fn exclusion_groups(&self) -> &BTreeSet<GroupId> {
        &self.descriptor.exclusion_group_ids
    }

    pub fn capability(&self) -> Capability {
        self.descriptor.capability
    }

    pub fn descriptor(&self) -> &OperationDescriptor {
        &self.descriptor
    }

    /// Runs the transform unconditionally.
    pub fn apply(
        &self,
        image: RasterImage,
        mut ground_truth: GroundTruthSet,
        rng: &mut dyn RngCore,
    ) -> Result<(RasterImage, GroundTruthSet)> {
        match &self.kernel {
            Kernel::Image(filter) => {
                let image = filter.filter(image, rng)?;
                Ok((image, ground_truth))
            }
            Kernel::Boxes(transform) => {
                let (boxes, labels) = geometry_adapter::polygons_to_boxes(&ground_truth.data);
                let (image, boxes) = transform.transform(image, boxes, rng)?;
                let rebuilt = geometry_adapter::boxes_to_polygons(&boxes, &labels, Some(image.dimensions()));
                ground_truth.set_polygons(rebuilt.into_iter().map(|element| element.points).collect());
                Ok((image, ground_truth))
            }
            Kernel::Polygons(transform) => {
                let (image, polygons) = transform.transform(image, ground_truth.polygons(), rng)?;
                ground_truth.set_polygons(polygons);
                Ok((image, ground_truth))
            }
        }
    }

    /// Applies the operation if the probability draw, the budget and the exclusion
    /// groups allow it. The returned flag says whether it ran.
    pub fn attempt(
        &self,
        image: RasterImage,
        ground_truth: GroundTruthSet,
        state: &mut PipelineState,
        policy: &AugmentationPolicy,
        rng: &mut dyn RngCore,
    ) -> Result<(RasterImage, GroundTruthSet, bool)> {
        let draw: f64 = rng.random();
        if draw >= self.probability() || state.budget_exhausted(policy) {
            return Ok((image, ground_truth, false));
        }
        if state.is_excluded(self.exclusion_groups()) {
            debug!("Skipping {}: exclusion group already used", self.name());
            return Ok((image, ground_truth, false));
        }

        state.complete_groups(self.exclusion_groups());
        let (image, ground_truth) = self.apply(image, ground_truth, rng)?;
        state.record_applied();
        debug!(
            "Applied {} ({}/{})",
            self.name(),
            state.applied_count,
            policy.max_augmentations_per_image
        );
        Ok((image, ground_truth, true))
    }
}
