// THEORY:
// An `OperationGroup` is one backend family: every pixel filter in one group,
// every print/scan degradation in another, and so on. The group does not know
// how its members work. It only runs the shared scheduling loop over them:
//
// 1.  Optionally shuffle the member order, fresh for each image. The permutation
//     lives on the stack, so a group can serve many images concurrently.
// 2.  `attempt` each member once, in that order, threading the image, the ground
//     truth and the per-image `PipelineState` through.
// 3.  Append the names that actually ran to the ground truth's audit trail.

use crate::core_modules::ground_truth::GroundTruthSet;
use crate::core_modules::operation::Operation;
use crate::core_modules::raster::RasterImage;
use crate::core_modules::state::{AugmentationPolicy, PipelineState};
use crate::error::Result;
use rand::RngCore;
use rand::seq::SliceRandom;
use std::fmt;

/// Backend family of an operation. The declaration order is the default group order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum GroupKind {
    /// Pixel filters in the style of albumentations / imgaug.
    Filters,
    /// Print and scan degradations in the style of ocrodeg.
    Degradation,
    /// Box-aware geometric transforms.
    Geometry,
    /// Polygon-aware custom transforms (creases and curls).
    Custom,
}

impl GroupKind {
    pub const ALL: [GroupKind; 4] = [
        GroupKind::Filters,
        GroupKind::Degradation,
        GroupKind::Geometry,
        GroupKind::Custom,
    ];
}

impl fmt::Display for GroupKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            GroupKind::Filters => "filters",
            GroupKind::Degradation => "degradation",
            GroupKind::Geometry => "geometry",
            GroupKind::Custom => "custom",
        };
        f.write_str(name)
    }
}

/// An ordered collection of operations from one backend family.
#[derive(Debug)]
pub struct OperationGroup {
    kind: GroupKind,
    operations: Vec<Operation>,
}

impl OperationGroup {
    pub fn new(kind: GroupKind, operations: Vec<Operation>) -> Self {
        Self { kind, operations }
    }

    pub fn kind(&self) -> GroupKind {
        self.kind
    }

    pub fn operations(&self) -> &[Operation] {
        &self.operations
    }

    pub fn is_empty(&self) -> bool {
        self.operations.is_empty()
    }

    /// Attempts every member once for this image and returns the names applied,
    /// in application order. Those names are also appended to `augs_done`.
    pub fn attempt_all(
        &self,
        mut image: RasterImage,
        mut ground_truth: GroundTruthSet,
        state: &mut PipelineState,
        policy: &AugmentationPolicy,
        rng: &mut dyn RngCore,
    ) -> Result<(RasterImage, GroundTruthSet, Vec<String>)> {
        let mut order: Vec<usize> = (0..self.operations.len()).collect();
        if policy.shuffle {
            order.shuffle(rng);
        }

        let mut applied_names = Vec::new();
        for index in order {
            let operation = &self.operations[index];
            let (next_image, next_ground_truth, applied) =
                operation.attempt(image, ground_truth, state, policy, rng)?;
            image = next_image;
            ground_truth = next_ground_truth;
            if applied {
                applied_names.push(operation.name().to_string());
            }
        }

        ground_truth.augs_done.extend(applied_names.iter().cloned());
        Ok((image, ground_truth, applied_names))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core_modules::operation::{ImageFilter, Kernel};
    use image::{GrayImage, Luma};
    use rand::SeedableRng;
    use rand::rngs::StdRng;
    use std::collections::BTreeSet;

    struct AddOne;

    impl ImageFilter for AddOne {
        fn filter(&self, image: RasterImage, _rng: &mut dyn RngCore) -> Result<RasterImage> {
            let mut gray = image.to_gray();
            for pixel in gray.pixels_mut() {
                pixel.0[0] = pixel.0[0].saturating_add(1);
            }
            Ok(RasterImage::Gray(gray))
        }
    }

    fn op(name: &str, probability: f64, groups: &[usize]) -> Operation {
        Operation::new(
            name,
            probability,
            groups.iter().copied().collect::<BTreeSet<_>>(),
            Kernel::Image(Box::new(AddOne)),
        )
    }

    fn blank() -> (RasterImage, GroundTruthSet) {
        (
            RasterImage::Gray(GrayImage::from_pixel(4, 4, Luma([0]))),
            GroundTruthSet::new("doc", Vec::new()),
        )
    }

    #[test]
    fn applies_in_order_and_records_names() {
        let group = OperationGroup::new(GroupKind::Filters, vec![op("a", 1.0, &[]), op("b", 1.0, &[])]);
        let policy = AugmentationPolicy {
            shuffle: false,
            max_augmentations_per_image: 10,
        };
        let mut state = PipelineState::new();
        let mut rng = StdRng::seed_from_u64(3);
        let (image, gt) = blank();
        let (image, gt, names) = group.attempt_all(image, gt, &mut state, &policy, &mut rng).unwrap();
        assert_eq!(names, vec!["a", "b"]);
        assert_eq!(gt.augs_done, vec!["a", "b"]);
        assert_eq!(state.applied_count, 2);
        assert_eq!(image.to_gray().get_pixel(0, 0), &Luma([2]));
    }

    #[test]
    fn budget_stops_the_group() {
        let group = OperationGroup::new(
            GroupKind::Filters,
            vec![op("a", 1.0, &[]), op("b", 1.0, &[]), op("c", 1.0, &[])],
        );
        let policy = AugmentationPolicy {
            shuffle: true,
            max_augmentations_per_image: 2,
        };
        let mut state = PipelineState::new();
        let mut rng = StdRng::seed_from_u64(11);
        let (image, gt) = blank();
        let (_, gt, names) = group.attempt_all(image, gt, &mut state, &policy, &mut rng).unwrap();
        assert_eq!(names.len(), 2);
        assert_eq!(gt.augs_done.len(), 2);
    }

    #[test]
    fn exclusive_members_apply_at_most_once() {
        let group = OperationGroup::new(
            GroupKind::Filters,
            vec![op("blur", 1.0, &[0]), op("median_blur", 1.0, &[0]), op("posterize", 1.0, &[])],
        );
        let policy = AugmentationPolicy {
            shuffle: true,
            max_augmentations_per_image: 10,
        };
        for seed in 0..20 {
            let mut state = PipelineState::new();
            let mut rng = StdRng::seed_from_u64(seed);
            let (image, gt) = blank();
            let (_, _, names) = group.attempt_all(image, gt, &mut state, &policy, &mut rng).unwrap();
            let exclusive = names.iter().filter(|n| *n == "blur" || *n == "median_blur").count();
            assert_eq!(exclusive, 1);
            assert!(names.contains(&"posterize".to_string()));
        }
    }
}
