//! Report validation and storage errors

use std::path::PathBuf;
use thiserror::Error;

/// A submission or edit that does not meet the field rules
#[derive(Error, Debug, PartialEq, Eq)]
pub enum ValidationError {
    #[error("{field} is required")]
    Required { field: &'static str },

    #[error("{field} must be at most {max} characters")]
    TooLong { field: &'static str, max: usize },

    #[error("no fields to update")]
    NoChanges,
}

/// Report storage errors
#[derive(Error, Debug)]
pub enum StoreError {
    #[error("report not found: {id}")]
    NotFound { id: String },

    #[error("Failed to access report file {path}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Report file {path} is corrupted or has an invalid format")]
    Corrupt {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },

    #[error("Failed to serialize reports")]
    Serialize {
        #[source]
        source: serde_json::Error,
    },
}
