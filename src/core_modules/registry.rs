// THEORY:
// The `OperationRegistry` turns configuration into runnable groups. It maps an
// operation name to the backend family it belongs to and a constructor closure
// that builds the kernel from that operation's parameters.
//
// Construction happens once, when the pipeline is built. A configured operation
// that cannot be built is reported and skipped, whether its name is unknown or
// its parameters are malformed. The remaining operations still run.

use crate::config::{OperationParams, PipelineConfig};
use crate::core_modules::group::{GroupKind, OperationGroup};
use crate::core_modules::mesh_warp::MeshWarpEngine;
use crate::core_modules::operation::{Kernel, Operation};
use crate::core_modules::ops::degradation::{BinarizedBlur, Blotches, GaussianWarp, PrintNoise, SurfaceDistort1d};
use crate::core_modules::ops::filters::{Blur, GaussianNoise, ImageCompression, IsoNoise, MedianBlur, Posterize};
use crate::core_modules::ops::rescale::Rescale;
use crate::core_modules::state::ExclusionGroups;
use crate::error::Result;
use serde_json::Value;
use std::collections::{BTreeMap, HashMap};
use tracing::{debug, warn};

/// Builds a kernel from one operation's parameters.
pub type KernelConstructor = Box<dyn Fn(&OperationParams) -> Result<Kernel> + Send + Sync>;

struct Entry {
    kind: GroupKind,
    constructor: KernelConstructor,
}

/// Name to `(GroupKind, constructor)` lookup.
#[derive(Default)]
pub struct OperationRegistry {
    entries: HashMap<String, Entry>,
}

impl OperationRegistry {
    /// An empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Registry with every built-in operation.
    pub fn with_defaults() -> Self {
        let mut registry = Self::new();

        registry.register("image_compression", GroupKind::Filters, |p| {
            Ok(Kernel::Image(Box::new(ImageCompression::from_params(p)?)))
        });
        registry.register("posterize", GroupKind::Filters, |p| {
            Ok(Kernel::Image(Box::new(Posterize::from_params(p)?)))
        });
        registry.register("blur", GroupKind::Filters, |p| {
            Ok(Kernel::Image(Box::new(Blur::from_params(p)?)))
        });
        registry.register("median_blur", GroupKind::Filters, |p| {
            Ok(Kernel::Image(Box::new(MedianBlur::from_params(p)?)))
        });
        registry.register("iso_noise", GroupKind::Filters, |p| {
            Ok(Kernel::Image(Box::new(IsoNoise::from_params(p)?)))
        });
        registry.register("gaussian_noise", GroupKind::Filters, |p| {
            Ok(Kernel::Image(Box::new(GaussianNoise::from_params(p)?)))
        });

        registry.register("gaussian_warp", GroupKind::Degradation, |p| {
            Ok(Kernel::Image(Box::new(GaussianWarp::from_params(p)?)))
        });
        registry.register("binarized_blur", GroupKind::Degradation, |p| {
            Ok(Kernel::Image(Box::new(BinarizedBlur::from_params(p)?)))
        });
        registry.register("blotches", GroupKind::Degradation, |p| {
            Ok(Kernel::Image(Box::new(Blotches::from_params(p)?)))
        });
        registry.register("1d_surface_distort", GroupKind::Degradation, |p| {
            Ok(Kernel::Image(Box::new(SurfaceDistort1d::from_params(p)?)))
        });
        registry.register("multiscale_black_noise", GroupKind::Degradation, |p| {
            Ok(Kernel::Image(Box::new(PrintNoise::multiscale_from_params(p)?)))
        });
        registry.register("fibrous_noise", GroupKind::Degradation, |p| {
            Ok(Kernel::Image(Box::new(PrintNoise::fibrous_from_params(p)?)))
        });

        registry.register("rescale", GroupKind::Geometry, |p| {
            Ok(Kernel::Boxes(Box::new(Rescale::from_params(p)?)))
        });

        registry.register("creases_and_curls", GroupKind::Custom, |p| {
            Ok(Kernel::Polygons(Box::new(MeshWarpEngine::from_params(p)?)))
        });

        registry
    }

    /// Adds or replaces the operation called `name`.
    pub fn register<F>(&mut self, name: impl Into<String>, kind: GroupKind, constructor: F)
    where
        F: Fn(&OperationParams) -> Result<Kernel> + Send + Sync + 'static,
    {
        self.entries.insert(
            name.into(),
            Entry {
                kind,
                constructor: Box::new(constructor),
            },
        );
    }

    pub fn contains(&self, name: &str) -> bool {
        self.entries.contains_key(name)
    }

    pub fn kind_of(&self, name: &str) -> Option<GroupKind> {
        self.entries.get(name).map(|entry| entry.kind)
    }

    /// Builds one group per family that has at least one configured operation,
    /// in `GroupKind` order. Inside a group, operations keep configuration order.
    pub fn build_groups(&self, config: &PipelineConfig, exclusions: &ExclusionGroups) -> Vec<OperationGroup> {
        let mut by_kind: BTreeMap<GroupKind, Vec<Operation>> = BTreeMap::new();
        for (name, value) in &config.augmentations {
            let Some(entry) = self.entries.get(name) else {
                warn!("No augmentation registered for: {}", name);
                continue;
            };
            let (kernel, probability) = match Self::build_one(entry, name, value) {
                Ok(built) => built,
                Err(e) => {
                    warn!("Skipping {}: {}", name, e);
                    continue;
                }
            };
            let operation = Operation::new(name.as_str(), probability, exclusions.groups_of(name), kernel);
            debug!(
                "Registered {} in {} group (p = {})",
                operation.name(),
                entry.kind,
                operation.probability()
            );
            by_kind.entry(entry.kind).or_default().push(operation);
        }

        by_kind
            .into_iter()
            .map(|(kind, operations)| OperationGroup::new(kind, operations))
            .collect()
    }

    fn build_one(entry: &Entry, name: &str, value: &Value) -> Result<(Kernel, f64)> {
        let params = OperationParams::new(name, value)?;
        let kernel = (entry.constructor)(&params)?;
        Ok((kernel, params.probability()?))
    }
}
