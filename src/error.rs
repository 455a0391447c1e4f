// THEORY:
// One error type for the whole engine. Most failures inside an augmentation pass
// are absorbed with a documented fallback (unknown operation names, missing
// ground truth, a warp with no foreground) and never reach this enum. What does
// reach it is genuinely fatal for the current image or for pipeline construction:
// unreadable files, malformed JSON, an operation whose parameters cannot be used.

use std::path::PathBuf;
use thiserror::Error;

/// Errors raised while building or running an augmentation pipeline.
#[derive(Debug, Error)]
pub enum AugmentError {
    #[error("Invalid configuration: {0}")]
    Config(String),

    #[error("Invalid parameter `{param}` for operation `{operation}`: {reason}")]
    InvalidParameter {
        operation: String,
        param: String,
        reason: String,
    },

    #[error("Operation `{name}` failed: {reason}")]
    Operation { name: String, reason: String },

    #[error("No ground truth for: {0}")]
    MissingGroundTruth(PathBuf),

    #[error("No images found in: {0}")]
    NoImages(PathBuf),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Image processing error: {0}")]
    Image(#[from] image::ImageError),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Worker pool error: {0}")]
    Worker(String),
}

impl AugmentError {
    pub fn operation(name: impl Into<String>, reason: impl ToString) -> Self {
        AugmentError::Operation {
            name: name.into(),
            reason: reason.to_string(),
        }
    }
}

/// Result type for augmentation operations
pub type Result<T> = std::result::Result<T, AugmentError>;
