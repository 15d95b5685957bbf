//! Error Handling Module
//!
//! Defines the crate-wide error type for dataset, training and inference
//! operations. Uses thiserror for ergonomic error definitions.

use std::path::PathBuf;

use thiserror::Error;

/// Main error type for protein atlas operations
#[derive(Error, Debug)]
pub enum AtlasError {
    /// A channel image file is missing or could not be decoded.
    /// Surfaced immediately; the batch it belongs to is invalid.
    #[error("failed to load channel image '{0}': {1}")]
    ImageLoad(PathBuf, String),

    /// An identifier has zero or more than one row in the label table
    #[error("label table violation for identifier '{id}': {reason}")]
    LabelIntegrity { id: String, reason: String },

    /// Invalid configuration, rejected before any training starts
    #[error("configuration error: {0}")]
    Config(String),

    /// Error with dataset operations
    #[error("dataset error: {0}")]
    Dataset(String),

    /// Error with model persistence or the backend
    #[error("model error: {0}")]
    Model(String),

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// CSV parsing error
    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),
}

/// Convenience Result type for protein atlas operations
pub type Result<T> = std::result::Result<T, AtlasError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = AtlasError::Dataset("test error".to_string());
        assert_eq!(format!("{}", err), "dataset error: test error");
    }

    #[test]
    fn test_image_load_error() {
        let path = PathBuf::from("/data/abc123_green.png");
        let err = AtlasError::ImageLoad(path, "file not found".to_string());
        assert!(format!("{}", err).contains("abc123_green.png"));
    }

    #[test]
    fn test_label_integrity_names_identifier() {
        let err = AtlasError::LabelIntegrity {
            id: "sample-42".to_string(),
            reason: "duplicate row".to_string(),
        };
        assert!(format!("{}", err).contains("sample-42"));
    }
}
