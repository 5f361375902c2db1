use std::path::PathBuf;
use thiserror::Error;

use crate::validation::ValidationReport;

/// The main error type for merge operations.
///
/// Every variant is fatal for the merge that raised it. Per-image problems
/// (missing or uncopyable files) are not errors; they are reported as
/// warnings in the [`MergeReport`](crate::merge::MergeReport).
#[derive(Debug, Error)]
pub enum CocoMergeError {
    #[error("Invalid merge configuration: {message}")]
    Config { message: String },

    #[error("Unexpected dataset layout in {path}: {message}")]
    DatasetLayout { path: PathBuf, message: String },

    #[error("Failed to parse COCO JSON from {path}: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },

    #[error("Invalid COCO document {path}: {message}")]
    Schema { path: PathBuf, message: String },

    #[error("Cannot write output to {path}: {message}")]
    Output { path: PathBuf, message: String },

    #[error("Failed to write COCO JSON to {path}: {source}")]
    Write {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Merge cancelled after loading {completed} source dataset(s)")]
    Cancelled { completed: usize },

    #[error("Validation failed with {error_count} error(s) and {warning_count} warning(s)")]
    ValidationFailed {
        error_count: usize,
        warning_count: usize,
        report: ValidationReport,
    },
}

impl CocoMergeError {
    pub(crate) fn config(message: impl Into<String>) -> Self {
        Self::Config {
            message: message.into(),
        }
    }

    pub(crate) fn layout(path: impl Into<PathBuf>, message: impl Into<String>) -> Self {
        Self::DatasetLayout {
            path: path.into(),
            message: message.into(),
        }
    }

    pub(crate) fn schema(path: impl Into<PathBuf>, message: impl Into<String>) -> Self {
        Self::Schema {
            path: path.into(),
            message: message.into(),
        }
    }

    pub(crate) fn output(path: impl Into<PathBuf>, message: impl Into<String>) -> Self {
        Self::Output {
            path: path.into(),
            message: message.into(),
        }
    }
}
