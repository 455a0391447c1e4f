// THEORY:
// Configuration arrives as one JSON document. The pipeline-level keys decide
// scheduling (shuffle, budget, exclusion groups); the `augmentations` object maps
// each operation name to its own parameter object. The order of that object is
// the order operations are registered in, so `serde_json` is built with
// `preserve_order`.
//
// Per-operation parameters are loose: each operation picks the keys
// it understands through `OperationParams` and falls back to its own defaults.

use crate::error::{AugmentError, Result};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::fs::File;
use std::io::BufReader;
use std::path::Path;

/// Probability used when an operation's config omits `probability`.
pub const DEFAULT_PROBABILITY: f64 = 0.5;

/// Top-level augmentation configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PipelineConfig {
    /// Draw every ground-truth polygon onto the saved images.
    #[serde(default)]
    pub debug: bool,
    /// Shuffle group order and operation order for every image.
    #[serde(default)]
    pub random_sequence: bool,
    /// Global per-image budget of applied operations.
    pub max_augmentations_per_image: usize,
    /// Lists of operation names that must not be combined on one image.
    #[serde(default)]
    pub mutually_exclusive_augmentations: Vec<Vec<String>>,
    /// Operation name to parameter object, in registration order.
    #[serde(default)]
    pub augmentations: Map<String, Value>,
    /// Base seed for reproducible batch runs.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub seed: Option<u64>,
}

impl PipelineConfig {
    pub fn from_json_file(path: impl AsRef<Path>) -> Result<Self> {
        let reader = BufReader::new(File::open(path)?);
        Ok(serde_json::from_reader(reader)?)
    }

    pub fn from_json_str(json: &str) -> Result<Self> {
        Ok(serde_json::from_str(json)?)
    }
}

/// The parameter object of one configured operation.
#[derive(Debug, Clone, PartialEq)]
pub struct OperationParams {
    name: String,
    values: Map<String, Value>,
}

impl OperationParams {
    pub fn new(name: &str, value: &Value) -> Result<Self> {
        let values = match value {
            Value::Object(map) => map.clone(),
            Value::Null => Map::new(),
            other => {
                return Err(AugmentError::Config(format!(
                    "parameters for `{name}` must be an object, got {other}"
                )));
            }
        };
        Ok(Self {
            name: name.to_string(),
            values,
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// `probability`, defaulting to 0.5 and clamped into `[0, 1]`.
    pub fn probability(&self) -> Result<f64> {
        Ok(self.f64_or("probability", DEFAULT_PROBABILITY)?.clamp(0.0, 1.0))
    }

    pub fn f64_or(&self, key: &str, default: f64) -> Result<f64> {
        match self.values.get(key) {
            None | Some(Value::Null) => Ok(default),
            Some(value) => value.as_f64().ok_or_else(|| self.invalid(key, "expected a number")),
        }
    }

    pub fn u32_or(&self, key: &str, default: u32) -> Result<u32> {
        match self.values.get(key) {
            None | Some(Value::Null) => Ok(default),
            Some(value) => value
                .as_u64()
                .and_then(|v| u32::try_from(v).ok())
                .ok_or_else(|| self.invalid(key, "expected a non-negative integer")),
        }
    }

    /// Reads `min_key`/`max_key` as an inclusive range; reversed bounds are swapped.
    pub fn range_or(&self, min_key: &str, max_key: &str, default: (f64, f64)) -> Result<(f64, f64)> {
        let low = self.f64_or(min_key, default.0)?;
        let high = self.f64_or(max_key, default.1)?;
        Ok(if low <= high { (low, high) } else { (high, low) })
    }

    pub fn invalid(&self, key: &str, reason: &str) -> AugmentError {
        AugmentError::InvalidParameter {
            operation: self.name.clone(),
            param: key.to_string(),
            reason: reason.to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn parses_pipeline_keys_in_order() {
        let config = PipelineConfig::from_json_str(
            r#"{
                "random_sequence": true,
                "max_augmentations_per_image": 3,
                "mutually_exclusive_augmentations": [["blur", "median_blur"]],
                "augmentations": {
                    "posterize": {"probability": 0.2},
                    "blur": {},
                    "creases_and_curls": {"probability": 1.0}
                }
            }"#,
        )
        .unwrap();
        assert!(config.random_sequence);
        assert!(!config.debug);
        assert_eq!(config.max_augmentations_per_image, 3);
        let names: Vec<_> = config.augmentations.keys().cloned().collect();
        assert_eq!(names, vec!["posterize", "blur", "creases_and_curls"]);
    }

    #[test]
    fn missing_budget_is_an_error() {
        let err = PipelineConfig::from_json_str(r#"{"augmentations": {}}"#).unwrap_err();
        assert!(matches!(err, AugmentError::Json(_)));
    }

    #[test]
    fn probability_defaults_and_clamps() {
        let params = OperationParams::new("blur", &json!({})).unwrap();
        assert_eq!(params.probability().unwrap(), DEFAULT_PROBABILITY);
        let params = OperationParams::new("blur", &json!({"probability": 1.7})).unwrap();
        assert_eq!(params.probability().unwrap(), 1.0);
    }

    #[test]
    fn typed_getters_report_bad_values() {
        let params = OperationParams::new("blur", &json!({"blur_limit": "seven"})).unwrap();
        let err = params.u32_or("blur_limit", 7).unwrap_err();
        assert!(matches!(err, AugmentError::InvalidParameter { ref param, .. } if param == "blur_limit"));
    }

    #[test]
    fn range_swaps_reversed_bounds() {
        let params = OperationParams::new("blotches", &json!({"min_fgblobs": 0.005, "max_fgblobs": 0.0005})).unwrap();
        let (low, high) = params.range_or("min_fgblobs", "max_fgblobs", (0.0, 1.0)).unwrap();
        assert_eq!((low, high), (0.0005, 0.005));
    }

    #[test]
    fn non_object_params_are_rejected() {
        assert!(OperationParams::new("blur", &json!(3)).is_err());
        assert!(OperationParams::new("blur", &Value::Null).is_ok());
    }
}
