//! Errors that can occur while analysing a batch of uploads. Only
//! `EmptyBatch` rejects a whole request; every other variant is reported
//! against the single file that caused it.

use thiserror::Error;

#[derive(Debug, Error, Clone, PartialEq)]
pub enum AnalysisError {
    #[error("No files uploaded")]
    EmptyBatch,

    #[error("Invalid file type. Supported: JPG, PNG, WebP")]
    UnsupportedFileType,

    #[error("Invalid image: {0}")]
    InvalidImage(String),

    #[error("Failed to encode image: {0}")]
    Encode(String),

    #[error("{0}")]
    Inference(String),
}

impl From<image::ImageError> for AnalysisError {
    fn from(err: image::ImageError) -> Self {
        AnalysisError::Encode(err.to_string())
    }
}
