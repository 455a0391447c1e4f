// THEORY:
// The `pipeline` module is the top-level API for augmenting one document. It
// owns the ordered list of `OperationGroup`s and the policy they share, and is
// immutable once built: every call to `process` creates its own
// `PipelineState`, its own group order and draws only from the RNG it is given.
// One pipeline can therefore sit behind an `Arc` and serve every worker at once.
//
// A pass over one image:
// 1.  Reset the audit trail (`augs_done`) of the incoming ground truth.
// 2.  Optionally shuffle the group order for this image.
// 3.  Let each group attempt its operations, threading image, ground truth and
//     state through. The budget is global across groups.
// 4.  Drop the state and return the final pair.

use crate::config::PipelineConfig;
use crate::core_modules::ground_truth::GroundTruthSet;
use crate::core_modules::group::OperationGroup;
use crate::core_modules::raster::RasterImage;
use crate::core_modules::registry::OperationRegistry;
use crate::core_modules::state::{AugmentationPolicy, ExclusionGroups, PipelineState};
use crate::error::Result;
use image::Rgb;
use imageproc::drawing::draw_line_segment_mut;
use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::{RngCore, SeedableRng};
use tracing::debug;

// Re-export key data structures for the public API.
pub use crate::core_modules::group::GroupKind;
pub use crate::core_modules::operation::{Capability, OperationDescriptor};
pub use crate::core_modules::state::GroupId;

const OVERLAY_COLOUR: Rgb<u8> = Rgb([255, 0, 0]);

/// Ordered groups of configured operations plus the policy they run under.
#[derive(Debug)]
pub struct AugmentationPipeline {
    groups: Vec<OperationGroup>,
    policy: AugmentationPolicy,
    debug: bool,
}

impl AugmentationPipeline {
    pub fn new(groups: Vec<OperationGroup>, policy: AugmentationPolicy) -> Self {
        let groups = groups.into_iter().filter(|group| !group.is_empty()).collect();
        Self {
            groups,
            policy,
            debug: false,
        }
    }

    /// Builds every configured operation through `registry`.
    pub fn from_config(config: &PipelineConfig, registry: &OperationRegistry) -> Result<Self> {
        let exclusions = ExclusionGroups::from_config(&config.mutually_exclusive_augmentations);
        let groups = registry.build_groups(config, &exclusions);
        let policy = AugmentationPolicy {
            shuffle: config.random_sequence,
            max_augmentations_per_image: config.max_augmentations_per_image,
        };
        let mut pipeline = Self::new(groups, policy);
        pipeline.debug = config.debug;
        Ok(pipeline)
    }

    pub fn groups(&self) -> &[OperationGroup] {
        &self.groups
    }

    pub fn policy(&self) -> &AugmentationPolicy {
        &self.policy
    }

    /// Whether saved images should carry the ground-truth overlay.
    pub fn debug(&self) -> bool {
        self.debug
    }

    /// Descriptors of every configured operation, in group order.
    pub fn descriptors(&self) -> Vec<&OperationDescriptor> {
        self.groups
            .iter()
            .flat_map(|group| group.operations().iter().map(|op| op.descriptor()))
            .collect()
    }

    /// Runs one augmentation pass over a document.
    pub fn process(
        &self,
        mut image: RasterImage,
        mut ground_truth: GroundTruthSet,
        rng: &mut dyn RngCore,
    ) -> Result<(RasterImage, GroundTruthSet)> {
        ground_truth.augs_done.clear();
        let mut state = PipelineState::new();

        let mut order: Vec<usize> = (0..self.groups.len()).collect();
        if self.policy.shuffle {
            order.shuffle(rng);
        }

        for index in order {
            let group = &self.groups[index];
            let (next_image, next_ground_truth, applied) =
                group.attempt_all(image, ground_truth, &mut state, &self.policy, rng)?;
            image = next_image;
            ground_truth = next_ground_truth;
            if !applied.is_empty() {
                debug!("{} group applied {:?}", group.kind(), applied);
            }
        }

        debug!(
            "{}: {} augmentation(s) applied",
            ground_truth.doc_name,
            ground_truth.augs_done.len()
        );
        Ok((image, ground_truth))
    }

    /// `process` with a fresh `StdRng` seeded from `seed`.
    pub fn process_seeded(
        &self,
        image: RasterImage,
        ground_truth: GroundTruthSet,
        seed: u64,
    ) -> Result<(RasterImage, GroundTruthSet)> {
        let mut rng = StdRng::seed_from_u64(seed);
        self.process(image, ground_truth, &mut rng)
    }
}

/// Outlines every ground-truth polygon in red. The result is always RGB.
pub fn draw_ground_truth(image: &RasterImage, ground_truth: &GroundTruthSet) -> RasterImage {
    let mut canvas = image.to_rgb();
    for element in &ground_truth.data {
        let points = &element.points;
        for (i, start) in points.iter().enumerate() {
            let end = points[(i + 1) % points.len()];
            draw_line_segment_mut(
                &mut canvas,
                (start.x as f32, start.y as f32),
                (end.x as f32, end.y as f32),
                OVERLAY_COLOUR,
            );
        }
    }
    RasterImage::Rgb(canvas)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core_modules::ground_truth::{GroundTruthElement, Point};
    use image::{GrayImage, Luma, RgbImage};

    fn config(json: &str) -> PipelineConfig {
        PipelineConfig::from_json_str(json).unwrap()
    }

    fn document() -> (RasterImage, GroundTruthSet) {
        let image = RasterImage::Rgb(RgbImage::from_fn(24, 24, |x, y| Rgb([(x * 10) as u8, (y * 10) as u8, 200])));
        let element = GroundTruthElement::new(
            "name",
            vec![
                Point::new(4.0, 4.0),
                Point::new(12.0, 4.0),
                Point::new(12.0, 8.0),
                Point::new(4.0, 8.0),
            ],
        );
        (image, GroundTruthSet::new("doc", vec![element]))
    }

    #[test]
    fn stale_audit_trail_is_reset() {
        let pipeline = AugmentationPipeline::from_config(
            &config(r#"{"max_augmentations_per_image": 2, "augmentations": {}}"#),
            &OperationRegistry::with_defaults(),
        )
        .unwrap();
        let (image, mut gt) = document();
        gt.augs_done.push("from_a_previous_run".into());
        let (out, out_gt) = pipeline.process_seeded(image.clone(), gt, 1).unwrap();
        assert_eq!(out, image);
        assert!(out_gt.augs_done.is_empty());
    }

    #[test]
    fn bad_parameter_drops_only_its_own_operation() {
        let pipeline = AugmentationPipeline::from_config(
            &config(
                r#"{
                    "max_augmentations_per_image": 2,
                    "augmentations": {
                        "blur": {"blur_limit": "seven"},
                        "posterize": {"probability": 1.0}
                    }
                }"#,
            ),
            &OperationRegistry::with_defaults(),
        )
        .unwrap();
        let descriptors = pipeline.descriptors();
        let names: Vec<_> = descriptors.iter().map(|d| d.name.as_str()).collect();
        assert_eq!(names, vec!["posterize"]);

        let (image, gt) = document();
        let (_, out_gt) = pipeline.process_seeded(image, gt, 2).unwrap();
        assert_eq!(out_gt.augs_done, vec!["posterize"]);
    }

    #[test]
    fn budget_is_shared_across_groups() {
        let pipeline = AugmentationPipeline::from_config(
            &config(
                r#"{
                    "random_sequence": true,
                    "max_augmentations_per_image": 2,
                    "augmentations": {
                        "posterize": {"probability": 1.0},
                        "blur": {"probability": 1.0},
                        "blotches": {"probability": 1.0, "max_fgblobs": 0.001, "max_bgblobs": 0.001},
                        "rescale": {"probability": 1.0}
                    }
                }"#,
            ),
            &OperationRegistry::with_defaults(),
        )
        .unwrap();
        assert_eq!(pipeline.groups().len(), 3);
        for seed in 0..10 {
            let (image, gt) = document();
            let (_, out_gt) = pipeline.process_seeded(image, gt, seed).unwrap();
            assert_eq!(out_gt.augs_done.len(), 2);
        }
    }

    #[test]
    fn same_seed_same_result() {
        let pipeline = AugmentationPipeline::from_config(
            &config(
                r#"{
                    "random_sequence": true,
                    "max_augmentations_per_image": 3,
                    "augmentations": {
                        "gaussian_noise": {"probability": 0.7},
                        "rescale": {"probability": 0.7},
                        "creases_and_curls": {"probability": 0.7, "num_deform_rounds": 1}
                    }
                }"#,
            ),
            &OperationRegistry::with_defaults(),
        )
        .unwrap();
        let (image, gt) = document();
        let first = pipeline.process_seeded(image.clone(), gt.clone(), 77).unwrap();
        let second = pipeline.process_seeded(image, gt, 77).unwrap();
        assert_eq!(first, second);
    }

    #[test]
    fn overlay_marks_polygon_edges() {
        let image = RasterImage::Gray(GrayImage::from_pixel(16, 16, Luma([255])));
        let (_, gt) = document();
        let out = draw_ground_truth(&image, &gt);
        assert_eq!(out.channels(), 3);
        assert_eq!(out.to_rgb().get_pixel(8, 4), &OVERLAY_COLOUR);
        assert_eq!(out.to_rgb().get_pixel(8, 6), &Rgb([255, 255, 255]));
    }
}
