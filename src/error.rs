use std::path::PathBuf;
use thiserror::Error;

/// Fatal setup problems. Anything else degrades to "not installed".
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Manifest not found: {}", .0.display())]
    ManifestNotFound(PathBuf),

    #[error("Failed to parse manifest {}: {source}", .path.display())]
    InvalidManifest {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },

    #[error("Invalid record for sample '{sample}': {source}")]
    InvalidSample {
        sample: String,
        #[source]
        source: serde_json::Error,
    },

    #[error("pyproject.toml not found: {}", .0.display())]
    PyprojectNotFound(PathBuf),

    #[error("Failed to parse {}: {source}", .path.display())]
    InvalidPyproject {
        path: PathBuf,
        #[source]
        source: toml::de::Error,
    },

    #[error("Invalid python version constraint: {0:?}")]
    InvalidVersionConstraint(String),

    #[error("Failed to inspect interpreter '{python}': {reason}")]
    InterpreterProbe { python: String, reason: String },

    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),
}
