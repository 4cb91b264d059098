//! Error types for scan operations.
//!
//! Only setup failures are surfaced through [`ScanError`]. Problems with a
//! single directory or file during a scan are logged, counted in the report,
//! and the scan carries on:
//!
//! ```rust,ignore
//! match treescan::scan(root, "todo", &options) {
//!     Ok(report) if !report.complete => // Partial results, deadline hit,
//!     Ok(report) => // Full results,
//!     Err(ScanError::RootNotFound(path)) => // Nothing to scan,
//!     Err(e) => // Other setup error
//! }
//! ```
use std::path::{Path, PathBuf};
use thiserror::Error;

/// Result type for scan operations
pub type ScanResult<T> = Result<T, ScanError>;

/// Errors that abort a scan before it produces a report
#[derive(Error, Debug)]
pub enum ScanError {
    #[error("Root not found: {0}")]
    RootNotFound(PathBuf),
    #[error("Root is not a directory: {0}")]
    RootNotDirectory(PathBuf),
    #[error("Permission denied: {0}")]
    PermissionDenied(PathBuf),
    #[error("Invalid pattern: {0}")]
    InvalidPattern(String),
    #[error("Configuration error: {0}")]
    ConfigError(String),
    #[error("Failed to spawn {name}: {source}")]
    WorkerSpawn {
        name: String,
        source: std::io::Error,
    },
    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),
    #[error("JSON error: {0}")]
    JsonError(#[from] serde_json::Error),
}

impl ScanError {
    pub fn root_not_found(path: impl Into<PathBuf>) -> Self {
        Self::RootNotFound(path.into())
    }

    pub fn root_not_directory(path: impl Into<PathBuf>) -> Self {
        Self::RootNotDirectory(path.into())
    }

    pub fn permission_denied(path: impl Into<PathBuf>) -> Self {
        Self::PermissionDenied(path.into())
    }

    pub fn invalid_pattern(msg: impl Into<String>) -> Self {
        Self::InvalidPattern(msg.into())
    }

    pub fn config_error(msg: impl Into<String>) -> Self {
        Self::ConfigError(msg.into())
    }

    pub fn worker_spawn(name: impl Into<String>, source: std::io::Error) -> Self {
        Self::WorkerSpawn {
            name: name.into(),
            source,
        }
    }

    /// Maps an I/O error on the scan root to the matching fatal variant
    pub fn from_root_io(path: &Path, err: std::io::Error) -> Self {
        match err.kind() {
            std::io::ErrorKind::NotFound => Self::root_not_found(path),
            std::io::ErrorKind::PermissionDenied => Self::permission_denied(path),
            _ => Self::IoError(err),
        }
    }
}

impl From<config::ConfigError> for ScanError {
    fn from(err: config::ConfigError) -> Self {
        Self::ConfigError(err.to_string())
    }
}
