// THEORY:
// Shared policy and per-image bookkeeping for one augmentation pass.
//
// `PipelineState` is created fresh for every image and dropped when the image is
// done. It is passed by `&mut` through every group and operation call of that pass
// and never crosses into another image, so parallel workers need no locking.
//
// `ExclusionGroups` is built once from configuration: each list of mutually
// exclusive operation names gets the id of its position in the config, and every
// name maps to the set of ids it belongs to.

use std::collections::{BTreeSet, HashMap};

/// Identifier of a mutual-exclusion group (its index in the configuration).
pub type GroupId = usize;

/// Limits shared by every group of a pipeline.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AugmentationPolicy {
    /// Shuffle group order, and operation order inside each group, per image.
    pub shuffle: bool,
    /// Upper bound on operations applied to a single image across all groups.
    pub max_augmentations_per_image: usize,
}

/// Mutable bookkeeping for a single image's pass.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PipelineState {
    /// Number of operations applied so far. Only ever incremented right after an
    /// operation has actually run.
    pub applied_count: usize,
    /// Exclusion groups that already had a member applied.
    pub completed_groups: BTreeSet<GroupId>,
}

impl PipelineState {
    pub fn new() -> Self {
        Self::default()
    }

    /// True once the image has used its whole budget.
    pub fn budget_exhausted(&self, policy: &AugmentationPolicy) -> bool {
        self.applied_count >= policy.max_augmentations_per_image
    }

    /// True if any of `groups` already had a member applied.
    pub fn is_excluded(&self, groups: &BTreeSet<GroupId>) -> bool {
        !self.completed_groups.is_disjoint(groups)
    }

    /// Records that an operation belonging to `groups` is about to run.
    pub fn complete_groups(&mut self, groups: &BTreeSet<GroupId>) {
        self.completed_groups.extend(groups.iter().copied());
    }

    pub fn record_applied(&mut self) {
        self.applied_count += 1;
    }
}

/// Mapping from operation name to the exclusion groups it belongs to.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ExclusionGroups {
    by_name: HashMap<String, BTreeSet<GroupId>>,
}

impl ExclusionGroups {
    pub fn from_config(groups: &[Vec<String>]) -> Self {
        let mut by_name: HashMap<String, BTreeSet<GroupId>> = HashMap::new();
        for (group_id, names) in groups.iter().enumerate() {
            for name in names {
                by_name.entry(name.clone()).or_default().insert(group_id);
            }
        }
        Self { by_name }
    }

    /// Group ids for `name`; empty when the operation is in no group.
    pub fn groups_of(&self, name: &str) -> BTreeSet<GroupId> {
        self.by_name.get(name).cloned().unwrap_or_default()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn membership_is_collected_across_groups() {
        let groups = ExclusionGroups::from_config(&[
            vec!["blur".into(), "median_blur".into()],
            vec!["blur".into(), "posterize".into()],
        ]);
        assert_eq!(groups.groups_of("blur"), BTreeSet::from([0, 1]));
        assert_eq!(groups.groups_of("posterize"), BTreeSet::from([1]));
        assert!(groups.groups_of("iso_noise").is_empty());
    }

    #[test]
    fn completed_groups_exclude_intersecting_members() {
        let mut state = PipelineState::new();
        state.complete_groups(&BTreeSet::from([1]));
        assert!(state.is_excluded(&BTreeSet::from([0, 1])));
        assert!(!state.is_excluded(&BTreeSet::from([0])));
        assert!(!state.is_excluded(&BTreeSet::new()));
    }

    #[test]
    fn budget_counts_applied_operations() {
        let policy = AugmentationPolicy {
            shuffle: false,
            max_augmentations_per_image: 2,
        };
        let mut state = PipelineState::new();
        assert!(!state.budget_exhausted(&policy));
        state.record_applied();
        state.record_applied();
        assert!(state.budget_exhausted(&policy));
    }
}
